//! Arithmetic instructions and their flag updates

use super::*;
use crate::config::DivideErrorPolicy;
use crate::cpu::{CpuStatus, HaltReason};
use crate::error::CpuError;
use crate::registers::Flag;

#[test]
fn test_add_16bit_signed_overflow() {
    // MOV AX, 0x7FFF ; ADD AX, 1
    let mut cpu = machine(&[0xB8, 0xFF, 0x7F, 0x05, 0x01, 0x00]);
    cpu.step().unwrap();
    cpu.step().unwrap();

    let regs = cpu.registers();
    assert_eq!(regs.ax, 0x8000);
    assert!(regs.get_flag(Flag::OF));
    assert!(!regs.get_flag(Flag::CF));
    assert!(regs.get_flag(Flag::SF));
    assert!(!regs.get_flag(Flag::ZF));
    assert!(regs.get_flag(Flag::AF));
    assert!(regs.get_flag(Flag::PF));
}

#[test]
fn test_add_8bit_carry_keeps_high_half() {
    // ADD AL, 1
    let mut cpu = machine(&[0x04, 0x01]);
    cpu.registers_mut().ax = 0x12FF;
    cpu.step().unwrap();

    let regs = cpu.registers();
    assert_eq!(regs.ax, 0x1200);
    assert!(regs.get_flag(Flag::CF));
    assert!(regs.get_flag(Flag::ZF));
    assert!(regs.get_flag(Flag::AF));
    assert!(!regs.get_flag(Flag::OF));
}

#[test]
fn test_sub_borrow() {
    // SUB AX, 1
    let mut cpu = machine(&[0x2D, 0x01, 0x00]);
    cpu.step().unwrap();

    let regs = cpu.registers();
    assert_eq!(regs.ax, 0xFFFF);
    assert!(regs.get_flag(Flag::CF));
    assert!(regs.get_flag(Flag::SF));
    assert!(regs.get_flag(Flag::AF));
    assert!(!regs.get_flag(Flag::OF));
}

#[test]
fn test_sub_signed_overflow() {
    // SUB AX, 1
    let mut cpu = machine(&[0x2D, 0x01, 0x00]);
    cpu.registers_mut().ax = 0x8000;
    cpu.step().unwrap();

    assert_eq!(cpu.registers().ax, 0x7FFF);
    assert!(cpu.registers().get_flag(Flag::OF));
    assert!(!cpu.registers().get_flag(Flag::CF));
}

#[test]
fn test_cmp_does_not_write() {
    // CMP AX, 5
    let mut cpu = machine(&[0x3D, 0x05, 0x00]);
    cpu.registers_mut().ax = 5;
    cpu.step().unwrap();

    assert_eq!(cpu.registers().ax, 5);
    assert!(cpu.registers().get_flag(Flag::ZF));
    assert!(!cpu.registers().get_flag(Flag::CF));
}

#[test]
fn test_cmp_memory_with_sign_extended_immediate() {
    // CMP WORD PTR [0x0010], -1
    let mut cpu = machine(&[0x83, 0x3E, 0x10, 0x00, 0xFF]);
    write_word(&mut cpu, DATA_SEG, 0x0010, 0xFFFF);
    cpu.step().unwrap();

    assert!(cpu.registers().get_flag(Flag::ZF));
    assert_eq!(cpu.registers().ip, 5);
}

#[test]
fn test_adc_and_sbb_use_carry() {
    // STC ; ADC AL, 1 ; STC ; SBB AL, 1
    let mut cpu = machine(&[0xF9, 0x14, 0x01, 0xF9, 0x1C, 0x01]);
    cpu.registers_mut().ax = 0x0001;

    cpu.step().unwrap();
    cpu.step().unwrap();
    assert_eq!(cpu.registers().ax, 0x0003);
    assert!(!cpu.registers().get_flag(Flag::CF));

    cpu.step().unwrap();
    cpu.step().unwrap();
    assert_eq!(cpu.registers().ax, 0x0001);
}

#[test]
fn test_add_to_memory() {
    // ADD [BX+SI+2], AX
    let mut cpu = machine(&[0x01, 0x40, 0x02]);
    cpu.registers_mut().ax = 0x0101;
    cpu.registers_mut().bx = 0x0010;
    cpu.registers_mut().si = 0x0004;
    write_word(&mut cpu, DATA_SEG, 0x0016, 0x1000);
    cpu.step().unwrap();

    assert_eq!(read_word(&cpu, DATA_SEG, 0x0016), 0x1101);
}

#[test]
fn test_inc_preserves_carry() {
    // STC ; INC AX
    let mut cpu = machine(&[0xF9, 0x40]);
    cpu.registers_mut().ax = 0xFFFF;
    cpu.step().unwrap();
    cpu.step().unwrap();

    assert_eq!(cpu.registers().ax, 0);
    assert!(cpu.registers().get_flag(Flag::ZF));
    assert!(cpu.registers().get_flag(Flag::CF));
}

#[test]
fn test_dec_signed_overflow() {
    // DEC CX
    let mut cpu = machine(&[0x49]);
    cpu.registers_mut().cx = 0x8000;
    cpu.step().unwrap();

    assert_eq!(cpu.registers().cx, 0x7FFF);
    assert!(cpu.registers().get_flag(Flag::OF));
}

#[test]
fn test_inc_byte_memory() {
    // INC BYTE PTR [DI]
    let mut cpu = machine(&[0xFE, 0x05]);
    cpu.registers_mut().di = 0x0020;
    write_bytes(&mut cpu, DATA_SEG, 0x0020, &[0x7F]);
    cpu.step().unwrap();

    assert_eq!(read_byte(&cpu, DATA_SEG, 0x0020), 0x80);
    assert!(cpu.registers().get_flag(Flag::OF));
}

#[test]
fn test_neg() {
    // NEG AL ; NEG AL
    let mut cpu = machine(&[0xF6, 0xD8, 0xF6, 0xD8]);
    cpu.registers_mut().ax = 0x0001;
    cpu.step().unwrap();
    assert_eq!(cpu.registers().ax, 0x00FF);
    assert!(cpu.registers().get_flag(Flag::CF));

    cpu.registers_mut().ax = 0;
    cpu.step().unwrap();
    assert_eq!(cpu.registers().ax, 0);
    assert!(!cpu.registers().get_flag(Flag::CF));
    assert!(cpu.registers().get_flag(Flag::ZF));
}

#[test]
fn test_neg_most_negative_overflows() {
    // NEG AL
    let mut cpu = machine(&[0xF6, 0xD8]);
    cpu.registers_mut().ax = 0x0080;
    cpu.step().unwrap();

    assert_eq!(cpu.registers().ax, 0x0080);
    assert!(cpu.registers().get_flag(Flag::OF));
}

#[test]
fn test_mul_byte() {
    // MUL BL
    let mut cpu = machine(&[0xF6, 0xE3]);
    cpu.registers_mut().ax = 0x0010;
    cpu.registers_mut().bx = 0x0010;
    cpu.step().unwrap();

    assert_eq!(cpu.registers().ax, 0x0100);
    assert!(cpu.registers().get_flag(Flag::CF));
    assert!(cpu.registers().get_flag(Flag::OF));
}

#[test]
fn test_mul_word() {
    // MUL CX
    let mut cpu = machine(&[0xF7, 0xE1]);
    cpu.registers_mut().ax = 0x1234;
    cpu.registers_mut().cx = 0x0100;
    cpu.step().unwrap();

    assert_eq!(cpu.registers().ax, 0x3400);
    assert_eq!(cpu.registers().dx, 0x0012);
    assert!(cpu.registers().get_flag(Flag::CF));
}

#[test]
fn test_imul_byte_fits() {
    // IMUL BL: -2 * 3
    let mut cpu = machine(&[0xF6, 0xEB]);
    cpu.registers_mut().ax = 0x00FE;
    cpu.registers_mut().bx = 0x0003;
    cpu.step().unwrap();

    assert_eq!(cpu.registers().ax, 0xFFFA);
    assert!(!cpu.registers().get_flag(Flag::CF));
    assert!(!cpu.registers().get_flag(Flag::OF));
}

#[test]
fn test_imul_word_overflows_into_dx() {
    // IMUL CX: 0x4000 * 4
    let mut cpu = machine(&[0xF7, 0xE9]);
    cpu.registers_mut().ax = 0x4000;
    cpu.registers_mut().cx = 0x0004;
    cpu.step().unwrap();

    assert_eq!(cpu.registers().ax, 0x0000);
    assert_eq!(cpu.registers().dx, 0x0001);
    assert!(cpu.registers().get_flag(Flag::OF));
}

#[test]
fn test_div_byte() {
    // DIV BL: 100 / 7
    let mut cpu = machine(&[0xF6, 0xF3]);
    cpu.registers_mut().ax = 100;
    cpu.registers_mut().bx = 7;
    cpu.step().unwrap();

    assert_eq!(cpu.registers().ax, 0x020E);
}

#[test]
fn test_div_word() {
    // DIV CX: 0x10000 / 0x10
    let mut cpu = machine(&[0xF7, 0xF1]);
    cpu.registers_mut().dx = 0x0001;
    cpu.registers_mut().ax = 0x0000;
    cpu.registers_mut().cx = 0x0010;
    cpu.step().unwrap();

    assert_eq!(cpu.registers().ax, 0x1000);
    assert_eq!(cpu.registers().dx, 0x0000);
}

#[test]
fn test_idiv_truncates_toward_zero() {
    // IDIV BL: -7 / 2
    let mut cpu = machine(&[0xF6, 0xFB]);
    cpu.registers_mut().ax = 0xFFF9;
    cpu.registers_mut().bx = 0x0002;
    cpu.step().unwrap();

    assert_eq!(cpu.registers().ax, 0xFFFD);
}

#[test]
fn test_div_by_zero_halts_without_writing() {
    // DIV BL with BL = 0
    let mut cpu = machine(&[0xF6, 0xF3]);
    cpu.registers_mut().ax = 10;

    let err = cpu.step().unwrap_err();
    assert_eq!(err, CpuError::DivideByZero { address: 0x10000 });
    assert_eq!(cpu.registers().ax, 10);
    assert_eq!(cpu.registers().ip, 0);
    assert_eq!(
        cpu.status(),
        &CpuStatus::Halted(HaltReason::Fault(CpuError::DivideByZero { address: 0x10000 }))
    );
}

#[test]
fn test_div_quotient_overflow_is_divide_error() {
    // DIV BL: 0x1000 / 2 does not fit in AL
    let mut cpu = machine(&[0xF6, 0xF3]);
    cpu.registers_mut().ax = 0x1000;
    cpu.registers_mut().bx = 2;

    assert!(matches!(cpu.step(), Err(CpuError::DivideByZero { .. })));
    assert_eq!(cpu.registers().ax, 0x1000);
}

#[test]
fn test_div_by_zero_raises_interrupt_zero() {
    let config = CpuConfig {
        divide_error: DivideErrorPolicy::Interrupt,
        ..CpuConfig::default()
    };
    // DIV BL ; HLT
    let mut cpu = machine_with(config, &[0xF6, 0xF3, 0xF4]);
    set_vector(&mut cpu, 0, 0x5000, 0x0000);
    cpu.registers_mut().ax = 10;

    cpu.step().unwrap();
    assert!(!cpu.is_halted());
    assert_eq!(cpu.registers().ax, 10);
    assert_eq!(cpu.registers().cs, 0x5000);
    assert_eq!(cpu.registers().ip, 0x0000);

    // Return address is the instruction after DIV
    let sp = cpu.registers().sp;
    assert_eq!(sp, STACK_TOP - 6);
    assert_eq!(read_word(&cpu, STACK_SEG, sp), 0x0002);
    assert_eq!(read_word(&cpu, STACK_SEG, sp + 2), CODE_SEG);
}

#[test]
fn test_daa_after_add() {
    // ADD AL, 8 ; DAA
    let mut cpu = machine(&[0x04, 0x08, 0x27]);
    cpu.registers_mut().ax = 0x0009;
    cpu.step().unwrap();
    cpu.step().unwrap();

    assert_eq!(cpu.registers().ax, 0x0017);
    assert!(!cpu.registers().get_flag(Flag::CF));
}

#[test]
fn test_daa_decimal_carry() {
    // ADD AL, 1 ; DAA  (99 + 1 = 100)
    let mut cpu = machine(&[0x04, 0x01, 0x27]);
    cpu.registers_mut().ax = 0x0099;
    cpu.step().unwrap();
    cpu.step().unwrap();

    assert_eq!(cpu.registers().ax, 0x0000);
    assert!(cpu.registers().get_flag(Flag::CF));
    assert!(cpu.registers().get_flag(Flag::ZF));
}

#[test]
fn test_das_after_sub() {
    // SUB AL, 0x09 ; DAS  (0x15 - 0x09 = 06 in BCD)
    let mut cpu = machine(&[0x2C, 0x09, 0x2F]);
    cpu.registers_mut().ax = 0x0015;
    cpu.step().unwrap();
    cpu.step().unwrap();

    assert_eq!(cpu.registers().ax, 0x0006);
    assert!(!cpu.registers().get_flag(Flag::CF));
}

#[test]
fn test_aaa_and_aas() {
    // ADD AL, 3 ; AAA
    let mut cpu = machine(&[0x04, 0x03, 0x37]);
    cpu.registers_mut().ax = 0x0009;
    cpu.step().unwrap();
    cpu.step().unwrap();
    assert_eq!(cpu.registers().ax, 0x0102);
    assert!(cpu.registers().get_flag(Flag::CF));

    // SUB AL, 3 ; AAS  (unpacked 1,2 - 3 = 0,9)
    let mut cpu = machine(&[0x2C, 0x03, 0x3F]);
    cpu.registers_mut().ax = 0x0102;
    cpu.step().unwrap();
    cpu.step().unwrap();
    assert_eq!(cpu.registers().ax, 0x0009);
    assert!(cpu.registers().get_flag(Flag::CF));
}

#[test]
fn test_aam_and_aad() {
    // AAM ; AAD
    let mut cpu = machine(&[0xD4, 0x0A, 0xD5, 0x0A]);
    cpu.registers_mut().ax = 0x003F;
    cpu.step().unwrap();
    assert_eq!(cpu.registers().ax, 0x0603);

    cpu.step().unwrap();
    assert_eq!(cpu.registers().ax, 0x003F);
}

#[test]
fn test_aam_zero_base_is_divide_error() {
    // AAM 0
    let mut cpu = machine(&[0xD4, 0x00]);
    cpu.registers_mut().ax = 0x0050;
    assert!(matches!(cpu.step(), Err(CpuError::DivideByZero { .. })));
    assert_eq!(cpu.registers().ax, 0x0050);
}
