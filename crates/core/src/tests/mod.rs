//! Instruction-level tests for the 8086 core
//!
//! Programs are loaded at 1000:0000 with the stack at 2000:0100, DS at
//! 3000h and ES at 4000h, then driven through `CpuCore`.
//! - `tests_arith`: ADD/SUB family, INC/DEC/NEG, MUL/DIV, BCD adjust
//! - `tests_logic`: AND/OR/XOR/TEST/NOT, shifts and rotates
//! - `tests_data`: MOV forms, XCHG, LEA/LDS/LES, XLAT, addressing modes
//! - `tests_stack`: PUSH/POP, PUSHF/POPF, LAHF/SAHF
//! - `tests_jumps`: jumps, loops, calls, returns, interrupts
//! - `tests_strings`: string instructions and repeat prefixes
//! - `tests_core`: step/run control, policies, faults, hooks

mod tests_arith;
mod tests_jumps;

use crate::config::CpuConfig;
use crate::cpu::{CpuCore, EntryPoint};
use crate::error::CpuError;
use crate::memory::{ArrayMemory, Memory8086, Width};

pub(crate) const CODE_SEG: u16 = 0x1000;
pub(crate) const STACK_SEG: u16 = 0x2000;
pub(crate) const STACK_TOP: u16 = 0x0100;
pub(crate) const DATA_SEG: u16 = 0x3000;
pub(crate) const EXTRA_SEG: u16 = 0x4000;

pub(crate) fn entry() -> EntryPoint {
    EntryPoint::new(CODE_SEG, 0x0000, STACK_SEG, STACK_TOP).with_data_segments(DATA_SEG, EXTRA_SEG)
}

pub(crate) fn machine(program: &[u8]) -> CpuCore<ArrayMemory> {
    machine_with(CpuConfig::default(), program)
}

pub(crate) fn machine_with(config: CpuConfig, program: &[u8]) -> CpuCore<ArrayMemory> {
    let mut cpu = CpuCore::with_config(ArrayMemory::new(), config);
    cpu.load(program, entry()).unwrap();
    cpu
}

pub(crate) fn write_word(cpu: &mut CpuCore<ArrayMemory>, segment: u16, offset: u16, value: u16) {
    let addr = cpu.memory().physical_address(segment, offset);
    cpu.memory_mut().write(addr, Width::Word, value as u32).unwrap();
}

pub(crate) fn write_bytes(cpu: &mut CpuCore<ArrayMemory>, segment: u16, offset: u16, bytes: &[u8]) {
    let addr = cpu.memory().physical_address(segment, offset);
    cpu.memory_mut().load_program(addr, bytes).unwrap();
}

pub(crate) fn read_word(cpu: &CpuCore<ArrayMemory>, segment: u16, offset: u16) -> u16 {
    cpu.state().read_word(segment, offset).unwrap()
}

pub(crate) fn read_byte(cpu: &CpuCore<ArrayMemory>, segment: u16, offset: u16) -> u8 {
    cpu.state().read_byte(segment, offset).unwrap()
}

/// 64 KiB of RAM behind an address decoder that does not wrap, so any
/// segment:offset translating past 0xFFFF is unmapped
pub(crate) struct LinearBus(ArrayMemory);

impl LinearBus {
    pub(crate) fn new() -> Self {
        Self(ArrayMemory::with_size(0x10000))
    }
}

impl Memory8086 for LinearBus {
    fn size(&self) -> u32 {
        self.0.size()
    }

    fn read_u8(&self, addr: u32) -> Result<u8, CpuError> {
        self.0.read_u8(addr)
    }

    fn write_u8(&mut self, addr: u32, val: u8) -> Result<(), CpuError> {
        self.0.write_u8(addr, val)
    }

    fn physical_address(&self, segment: u16, offset: u16) -> u32 {
        ((segment as u32) << 4) + offset as u32
    }
}

/// Point interrupt `vector` at `segment:offset`
pub(crate) fn set_vector(cpu: &mut CpuCore<ArrayMemory>, vector: u8, segment: u16, offset: u16) {
    let entry = vector as u16 * 4;
    write_word(cpu, 0, entry, offset);
    write_word(cpu, 0, entry + 2, segment);
}
