//! Control transfer: jumps, loops, calls, returns, interrupts

use super::*;
use crate::cpu::{CpuStatus, HaltReason};
use crate::registers::Flag;

#[test]
fn test_jump_to_self_runs_out_of_budget() {
    // JMP $
    let mut cpu = machine(&[0xEB, 0xFE]);
    let summary = cpu.run(1000).unwrap();

    assert_eq!(summary.steps, 1000);
    assert!(!summary.halted);
    assert!(!cpu.is_halted());
    assert_eq!(cpu.registers().ip, 0);
}

#[test]
fn test_short_jump_skips_code() {
    // JMP +3 ; MOV AX, 0xFFFF ; HLT
    let mut cpu = machine(&[0xEB, 0x03, 0xB8, 0xFF, 0xFF, 0xF4]);
    let summary = cpu.run(10).unwrap();

    assert_eq!(summary.steps, 2);
    assert_eq!(cpu.registers().ax, 0);
    assert_eq!(cpu.status(), &CpuStatus::Halted(HaltReason::HltInstruction));
}

#[test]
fn test_near_jump() {
    // JMP +0x100
    let mut cpu = machine(&[0xE9, 0x00, 0x01]);
    assert_eq!(cpu.step().unwrap(), 15);
    assert_eq!(cpu.registers().ip, 0x0103);
    assert_eq!(cpu.registers().cs, CODE_SEG);
}

#[test]
fn test_far_jump() {
    // JMP 5000:0010
    let mut cpu = machine(&[0xEA, 0x10, 0x00, 0x00, 0x50]);
    cpu.step().unwrap();

    assert_eq!(cpu.registers().cs, 0x5000);
    assert_eq!(cpu.registers().ip, 0x0010);
}

#[test]
fn test_indirect_jumps() {
    // JMP BX
    let mut cpu = machine(&[0xFF, 0xE3]);
    cpu.registers_mut().bx = 0x0456;
    cpu.step().unwrap();
    assert_eq!(cpu.registers().ip, 0x0456);

    // JMP FAR [0x0040]
    let mut cpu = machine(&[0xFF, 0x2E, 0x40, 0x00]);
    write_word(&mut cpu, DATA_SEG, 0x0040, 0x0020);
    write_word(&mut cpu, DATA_SEG, 0x0042, 0x6000);
    cpu.step().unwrap();
    assert_eq!(cpu.registers().cs, 0x6000);
    assert_eq!(cpu.registers().ip, 0x0020);
}

#[test]
fn test_conditional_jumps_signed_and_unsigned() {
    // CMP AX, BX ; JB +5 ; JL +5
    let mut cpu = machine(&[0x39, 0xD8, 0x72, 0x05, 0x7C, 0x05]);
    cpu.registers_mut().ax = 0xFFFF;
    cpu.registers_mut().bx = 0x0001;
    cpu.step().unwrap();

    // 0xFFFF is above 1 unsigned
    assert_eq!(cpu.step().unwrap(), 4);
    assert_eq!(cpu.registers().ip, 4);

    // -1 is less than 1 signed
    assert_eq!(cpu.step().unwrap(), 16);
    assert_eq!(cpu.registers().ip, 11);
}

#[test]
fn test_conditional_jump_backward() {
    // DEC CX ; JNZ -3 ; HLT
    let mut cpu = machine(&[0x49, 0x75, 0xFD, 0xF4]);
    cpu.registers_mut().cx = 4;
    let summary = cpu.run(100).unwrap();

    assert!(summary.halted);
    assert_eq!(summary.steps, 9);
    assert_eq!(cpu.registers().cx, 0);
}

#[test]
fn test_loop_counts_down_cx() {
    // MOV CX, 3 ; INC AX ; LOOP -3 ; HLT
    let mut cpu = machine(&[0xB9, 0x03, 0x00, 0x40, 0xE2, 0xFD, 0xF4]);
    let summary = cpu.run(100).unwrap();

    assert_eq!(summary.steps, 8);
    assert_eq!(cpu.registers().ax, 3);
    assert_eq!(cpu.registers().cx, 0);
    assert!(cpu.is_halted());
}

#[test]
fn test_loope_stops_on_mismatch() {
    // LOOPE -2 with ZF clear falls through at once
    let mut cpu = machine(&[0xE1, 0xFE]);
    cpu.registers_mut().cx = 10;
    cpu.registers_mut().set_flag(Flag::ZF, false);
    cpu.step().unwrap();

    assert_eq!(cpu.registers().cx, 9);
    assert_eq!(cpu.registers().ip, 2);
}

#[test]
fn test_loopne_exits_on_match() {
    // MOV CX, 5 ; INC AX ; CMP AX, 3 ; LOOPNE -6 ; HLT
    let mut cpu = machine(&[0xB9, 0x05, 0x00, 0x40, 0x3D, 0x03, 0x00, 0xE0, 0xFA, 0xF4]);
    let summary = cpu.run(100).unwrap();

    assert_eq!(summary.steps, 11);
    assert_eq!(cpu.registers().ax, 3);
    assert_eq!(cpu.registers().cx, 2);
    assert!(cpu.registers().get_flag(Flag::ZF));
    assert!(cpu.is_halted());
}

#[test]
fn test_jcxz() {
    // JCXZ +2
    let mut cpu = machine(&[0xE3, 0x02]);
    cpu.step().unwrap();
    assert_eq!(cpu.registers().ip, 4);

    let mut cpu = machine(&[0xE3, 0x02]);
    cpu.registers_mut().cx = 1;
    cpu.step().unwrap();
    assert_eq!(cpu.registers().ip, 2);
}

#[test]
fn test_call_and_return() {
    // CALL +3 ; HLT ; NOP ; NOP ; MOV AX, 7 ; RET
    let mut cpu = machine(&[0xE8, 0x03, 0x00, 0xF4, 0x90, 0x90, 0xB8, 0x07, 0x00, 0xC3]);
    cpu.step().unwrap();
    assert_eq!(cpu.registers().ip, 6);
    assert_eq!(read_word(&cpu, STACK_SEG, STACK_TOP - 2), 3);

    let summary = cpu.run(10).unwrap();
    assert_eq!(summary.steps, 3);
    assert_eq!(cpu.registers().ax, 7);
    assert_eq!(cpu.registers().sp, STACK_TOP);
    assert_eq!(cpu.registers().ip, 4);
}

#[test]
fn test_return_releases_arguments() {
    // RET 4
    let mut cpu = machine(&[0xC2, 0x04, 0x00]);
    cpu.registers_mut().sp = STACK_TOP - 6;
    write_word(&mut cpu, STACK_SEG, STACK_TOP - 6, 0x0010);
    cpu.step().unwrap();

    assert_eq!(cpu.registers().ip, 0x0010);
    assert_eq!(cpu.registers().sp, STACK_TOP);
}

#[test]
fn test_far_call_and_return() {
    // CALL 5000:0000, where RETF waits
    let mut cpu = machine(&[0x9A, 0x00, 0x00, 0x00, 0x50]);
    write_bytes(&mut cpu, 0x5000, 0x0000, &[0xCB]);
    cpu.step().unwrap();

    assert_eq!(cpu.registers().cs, 0x5000);
    assert_eq!(cpu.registers().ip, 0);
    assert_eq!(read_word(&cpu, STACK_SEG, STACK_TOP - 4), 5);
    assert_eq!(read_word(&cpu, STACK_SEG, STACK_TOP - 2), CODE_SEG);

    cpu.step().unwrap();
    assert_eq!(cpu.registers().cs, CODE_SEG);
    assert_eq!(cpu.registers().ip, 5);
    assert_eq!(cpu.registers().sp, STACK_TOP);
}

#[test]
fn test_software_interrupt_through_vector_table() {
    // STI ; INT 60h ; HLT, with IRET at 5000:0000
    let mut cpu = machine(&[0xFB, 0xCD, 0x60, 0xF4]);
    set_vector(&mut cpu, 0x60, 0x5000, 0x0000);
    write_bytes(&mut cpu, 0x5000, 0x0000, &[0xCF]);
    cpu.run(2).unwrap();

    let regs = cpu.registers();
    assert_eq!((regs.cs, regs.ip), (0x5000, 0x0000));
    assert!(!regs.get_flag(Flag::IF));
    assert_eq!(regs.sp, STACK_TOP - 6);
    assert_eq!(read_word(&cpu, STACK_SEG, STACK_TOP - 6), 3);
    assert_eq!(read_word(&cpu, STACK_SEG, STACK_TOP - 4), CODE_SEG);

    cpu.run(10).unwrap();
    let regs = cpu.registers();
    assert_eq!((regs.cs, regs.ip), (CODE_SEG, 4));
    assert!(regs.get_flag(Flag::IF));
    assert_eq!(regs.sp, STACK_TOP);
    assert_eq!(cpu.status(), &CpuStatus::Halted(HaltReason::HltInstruction));
}

#[test]
fn test_breakpoint_interrupt_is_one_byte() {
    // INT 3
    let mut cpu = machine(&[0xCC]);
    set_vector(&mut cpu, 3, 0x5000, 0x0100);
    assert_eq!(cpu.step().unwrap(), 52);

    assert_eq!(cpu.registers().ip, 0x0100);
    assert_eq!(read_word(&cpu, STACK_SEG, STACK_TOP - 6), 1);
}

#[test]
fn test_into() {
    // INTO with OF clear does nothing
    let mut cpu = machine(&[0xCE]);
    cpu.step().unwrap();
    assert_eq!(cpu.registers().ip, 1);

    let mut cpu = machine(&[0xCE]);
    set_vector(&mut cpu, 4, 0x5000, 0x0040);
    cpu.registers_mut().set_flag(Flag::OF, true);
    cpu.step().unwrap();
    assert_eq!(cpu.registers().cs, 0x5000);
    assert_eq!(cpu.registers().ip, 0x0040);
}

#[test]
fn test_dos_exit_terminates() {
    // MOV AX, 0x4C05 ; INT 21h ; HLT
    let mut cpu = machine(&[0xB8, 0x05, 0x4C, 0xCD, 0x21, 0xF4]);
    let summary = cpu.run(10).unwrap();

    assert_eq!(summary.steps, 2);
    assert!(summary.halted);
    assert_eq!(cpu.exit_code(), Some(5));
    assert_eq!(
        cpu.status(),
        &CpuStatus::Halted(HaltReason::Terminated { exit_code: 5 })
    );
}

#[test]
fn test_int_20h_terminates_with_zero() {
    // INT 20h
    let mut cpu = machine(&[0xCD, 0x20]);
    cpu.run(10).unwrap();

    assert_eq!(cpu.exit_code(), Some(0));
    assert_eq!(cpu.registers().ip, 2);
}
