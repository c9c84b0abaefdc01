use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use emu8086_core::{ArrayMemory, CpuCore, EntryPoint};

/// Tight loop exercising ALU, memory, stack and string paths
const LOOP_PROGRAM: &[u8] = &[
    0xB8, 0x42, 0x00, // MOV AX, 0x42
    0xA3, 0x00, 0x20, // MOV [0x2000], AX
    0xBB, 0x10, 0x00, // MOV BX, 0x10
    0x01, 0xD8, // ADD AX, BX
    0x50, // PUSH AX
    0x5A, // POP DX
    0xD1, 0xE0, // SHL AX, 1
    0xB9, 0x04, 0x00, // MOV CX, 4
    0xBF, 0x00, 0x30, // MOV DI, 0x3000
    0xF3, 0xAB, // REP STOSW
    0xEB, 0xE7, // JMP back to start
];

fn core() -> CpuCore<ArrayMemory> {
    let mut cpu = CpuCore::new(ArrayMemory::new());
    cpu.load(LOOP_PROGRAM, EntryPoint::com(0x0700))
        .expect("bench program fits in memory");
    cpu
}

fn bench_cpu_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("cpu_8086_step");

    group.bench_function("single_instruction", |b| {
        let mut cpu = core();
        b.iter(|| {
            cpu.reset();
            black_box(cpu.step().ok());
        });
    });

    group.finish();
}

fn bench_cpu_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("cpu_8086_run");

    for step_count in [10u64, 100, 1000].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(step_count),
            step_count,
            |b, &count| {
                let mut cpu = core();
                b.iter(|| {
                    cpu.reset();
                    black_box(cpu.run(count).ok());
                    black_box(cpu.cycles());
                });
            },
        );
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    c.bench_function("cpu_8086_decode", |b| {
        let cpu = core();
        b.iter(|| black_box(cpu.decode_next().ok()));
    });
}

fn bench_cpu_reset(c: &mut Criterion) {
    c.bench_function("cpu_8086_reset", |b| {
        let mut cpu = core();
        b.iter(|| {
            cpu.reset();
            black_box(cpu.registers().ip);
        });
    });
}

criterion_group!(
    benches,
    bench_cpu_step,
    bench_cpu_run,
    bench_decode,
    bench_cpu_reset
);
criterion_main!(benches);
