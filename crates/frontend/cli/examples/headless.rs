use std::env;
use std::fs;

use emu8086_dos::DosMachine;

/// MOV AH, 09 ; MOV DX, 0x010C ; INT 21h ; MOV AX, 0x4C00 ; INT 21h ; "Hello$"
const HELLO: &[u8] = &[
    0xB4, 0x09, 0xBA, 0x0C, 0x01, 0xCD, 0x21, 0xB8, 0x00, 0x4C, 0xCD, 0x21, b'H', b'e', b'l',
    b'l', b'o', b'$',
];

fn main() {
    let args: Vec<String> = env::args().collect();
    let image = match args.get(1) {
        Some(path) => fs::read(path).unwrap(),
        None => HELLO.to_vec(),
    };

    let mut machine = DosMachine::new();
    machine.load_com(&image).unwrap();
    let summary = machine.run(100_000).unwrap();

    println!("Output: {}", String::from_utf8_lossy(&machine.take_output()));
    println!("Ran {} steps, {} cycles", summary.steps, summary.cycles);
    println!("{}", machine.register_snapshot());
    println!("State: {}", machine.report().to_json_pretty().unwrap());
}
