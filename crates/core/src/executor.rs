//! Instruction execution
//!
//! Applies one decoded `Instruction` to a `CpuState`. IP is moved past the
//! instruction before anything else runs, so relative targets and pushed
//! return addresses are computed from the next instruction. Errors leave
//! the registers half updated; `CpuCore::step` restores them.
//!
//! Flag rules by operation class:
//! - ADD/ADC/SUB/SBB/CMP/NEG: all six arithmetic flags
//! - INC/DEC: like ADD/SUB but CF is preserved
//! - AND/OR/XOR/TEST: CF, OF and AF cleared
//! - shifts and rotates: CF is the last bit shifted out, OF only defined
//!   for a count of 1, rotates leave SF/ZF/PF alone
//! - MUL/IMUL: CF = OF = upper half is significant

use crate::cpu::CpuState;
use crate::error::CpuError;
use crate::instruction::{
    Condition, Displacement, EffectiveAddress, Instruction, MemoryOperand, Operand, Operation, RepPrefix,
};
use crate::interrupts::{raise_interrupt, InterruptHandler};
use crate::memory::{Memory8086, Width};
use crate::registers::{Flag, Reg16, Reg8, SegReg};

/// How the core should proceed after an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEffect {
    Continue,
    /// HLT
    Halt,
    /// Program exit requested through an interrupt service
    Terminate(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecResult {
    /// Approximate 8086 clock count
    pub cycles: u32,
    pub effect: StepEffect,
}

impl ExecResult {
    fn proceed(cycles: u32) -> Self {
        Self {
            cycles,
            effect: StepEffect::Continue,
        }
    }
}

/// Execute `instr` against `state`, routing INT and port I/O to `interrupts`
pub fn execute<M, H>(
    instr: &Instruction,
    state: &mut CpuState<M>,
    interrupts: &mut H,
) -> Result<ExecResult, CpuError>
where
    M: Memory8086,
    H: InterruptHandler<M> + ?Sized,
{
    state.execute(instr, interrupts)
}

#[inline]
fn sign_bit(width: Width) -> u32 {
    match width {
        Width::Byte => 0x80,
        Width::Word => 0x8000,
        Width::Dword => 0x8000_0000,
    }
}

/// Even number of set bits in the low byte
#[inline]
fn parity(val: u32) -> bool {
    (val as u8).count_ones() % 2 == 0
}

/// Sign-extend a byte or word to i32
#[inline]
fn signed(val: u16, width: Width) -> i32 {
    match width {
        Width::Byte => val as u8 as i8 as i32,
        _ => val as i16 as i32,
    }
}

fn malformed(instr: &Instruction) -> CpuError {
    CpuError::InvalidRegister(format!(
        "{} has no usable operand in {:?}",
        instr.operation.mnemonic(),
        instr
    ))
}

/// Extra clocks to form an effective address
fn ea_cycles(mem: &MemoryOperand) -> u32 {
    let base = match mem.address {
        EffectiveAddress::Direct(_) => 6,
        EffectiveAddress::Indirect { disp, .. } => {
            if disp == Displacement::None {
                5
            } else {
                9
            }
        }
        EffectiveAddress::BaseIndex { base, index, disp } => {
            let fast = matches!(
                (base, index),
                (Reg16::BP, Reg16::DI) | (Reg16::BX, Reg16::SI)
            );
            let with_disp = disp != Displacement::None;
            match (fast, with_disp) {
                (true, false) => 7,
                (false, false) => 8,
                (true, true) => 11,
                (false, true) => 12,
            }
        }
    };
    if mem.segment_override {
        base + 2
    } else {
        base
    }
}

impl<M: Memory8086> CpuState<M> {
    /// Execute one decoded instruction
    pub fn execute<H>(&mut self, instr: &Instruction, interrupts: &mut H) -> Result<ExecResult, CpuError>
    where
        H: InterruptHandler<M> + ?Sized,
    {
        let start_ip = self.regs.ip;
        let next_ip = start_ip.wrapping_add(instr.length as u16);
        self.regs.ip = next_ip;

        let width = instr.width;
        let mem_cost = [instr.dst, instr.src]
            .iter()
            .flatten()
            .find_map(|op| match op {
                Operand::Memory(mem) => Some(ea_cycles(mem)),
                _ => None,
            });
        // Register form cost, memory form cost (plus EA)
        let cost = |reg: u32, mem: u32| match mem_cost {
            Some(ea) => mem + ea,
            None => reg,
        };

        let result = match instr.operation {
            Operation::Mov => {
                let (dst, src) = self.operands(instr)?;
                let value = self.read_operand(&src, width)?;
                self.write_operand(&dst, width, value)?;
                let cycles = match src {
                    Operand::Imm8(_) | Operand::Imm16(_) if mem_cost.is_none() => 4,
                    _ => cost(2, 9),
                };
                ExecResult::proceed(cycles)
            }

            Operation::Add
            | Operation::Adc
            | Operation::Sub
            | Operation::Sbb
            | Operation::Cmp
            | Operation::And
            | Operation::Or
            | Operation::Xor
            | Operation::Test => {
                let (dst, src) = self.operands(instr)?;
                let a = self.read_operand(&dst, width)?;
                let b = self.read_operand(&src, width)?;
                let value = self.alu(instr.operation, a, b, width);
                if !matches!(instr.operation, Operation::Cmp | Operation::Test) {
                    self.write_operand(&dst, width, value)?;
                }
                ExecResult::proceed(cost(3, 16))
            }

            Operation::Inc | Operation::Dec => {
                let dst = self.dst(instr)?;
                let value = self.read_operand(&dst, width)?;
                let carry = self.regs.get_flag(Flag::CF);
                let value = if instr.operation == Operation::Inc {
                    self.add(value, 1, false, width)
                } else {
                    self.sub(value, 1, false, width)
                };
                self.regs.set_flag(Flag::CF, carry);
                self.write_operand(&dst, width, value)?;
                ExecResult::proceed(cost(3, 15))
            }

            Operation::Neg => {
                let dst = self.dst(instr)?;
                let value = self.read_operand(&dst, width)?;
                let value = self.sub(0, value, false, width);
                self.write_operand(&dst, width, value)?;
                ExecResult::proceed(cost(3, 16))
            }

            Operation::Not => {
                let dst = self.dst(instr)?;
                let value = self.read_operand(&dst, width)?;
                self.write_operand(&dst, width, !value & width.mask() as u16)?;
                ExecResult::proceed(cost(3, 16))
            }

            Operation::Mul | Operation::Imul => {
                let src = self.src(instr)?;
                let value = self.read_operand(&src, width)?;
                self.multiply(instr.operation == Operation::Imul, value, width);
                let cycles = match width {
                    Width::Byte => cost(77, 83),
                    _ => cost(118, 124),
                };
                ExecResult::proceed(cycles)
            }

            Operation::Div | Operation::Idiv => {
                let src = self.src(instr)?;
                let divisor = self.read_operand(&src, width)?;
                let address = self.physical_address(self.regs.cs, start_ip);
                self.divide(instr.operation == Operation::Idiv, divisor, width, address)?;
                let cycles = match width {
                    Width::Byte => cost(90, 96),
                    _ => cost(155, 161),
                };
                ExecResult::proceed(cycles)
            }

            Operation::Rol
            | Operation::Ror
            | Operation::Rcl
            | Operation::Rcr
            | Operation::Shl
            | Operation::Shr
            | Operation::Sar => {
                let (dst, src) = self.operands(instr)?;
                let count = self.read_operand(&src, Width::Byte)? as u8;
                let value = self.read_operand(&dst, width)?;
                let value = self.shift_rotate(instr.operation, value, count, width);
                self.write_operand(&dst, width, value)?;
                let cycles = match src {
                    Operand::Imm8(_) => cost(2, 15),
                    _ => cost(8, 20) + 4 * count as u32,
                };
                ExecResult::proceed(cycles)
            }

            Operation::Daa => {
                self.decimal_adjust(true);
                ExecResult::proceed(4)
            }
            Operation::Das => {
                self.decimal_adjust(false);
                ExecResult::proceed(4)
            }
            Operation::Aaa => {
                self.ascii_adjust(true);
                ExecResult::proceed(4)
            }
            Operation::Aas => {
                self.ascii_adjust(false);
                ExecResult::proceed(4)
            }
            Operation::Aam => {
                let base = self.read_operand(&self.src(instr)?, Width::Byte)? as u8;
                if base == 0 {
                    return Err(CpuError::DivideByZero {
                        address: self.physical_address(self.regs.cs, start_ip),
                    });
                }
                let al = self.regs.get8(Reg8::AL);
                self.regs.set8(Reg8::AH, al / base);
                self.regs.set8(Reg8::AL, al % base);
                self.set_szp(self.regs.get8(Reg8::AL) as u16, Width::Byte);
                ExecResult::proceed(83)
            }
            Operation::Aad => {
                let base = self.read_operand(&self.src(instr)?, Width::Byte)? as u8;
                let al = self.regs.get8(Reg8::AL);
                let ah = self.regs.get8(Reg8::AH);
                let value = ah.wrapping_mul(base).wrapping_add(al);
                self.regs.ax = value as u16;
                self.set_szp(value as u16, Width::Byte);
                ExecResult::proceed(60)
            }

            Operation::Cbw => {
                self.regs.ax = self.regs.get8(Reg8::AL) as i8 as i16 as u16;
                ExecResult::proceed(2)
            }
            Operation::Cwd => {
                self.regs.dx = if self.regs.ax & 0x8000 != 0 { 0xFFFF } else { 0 };
                ExecResult::proceed(5)
            }

            Operation::Xchg => {
                let (dst, src) = self.operands(instr)?;
                let a = self.read_operand(&dst, width)?;
                let b = self.read_operand(&src, width)?;
                self.write_operand(&dst, width, b)?;
                self.write_operand(&src, width, a)?;
                ExecResult::proceed(cost(4, 17))
            }

            Operation::Lea => {
                let (dst, src) = self.operands(instr)?;
                let mem = self.memory_operand(instr, &src)?;
                let offset = self.offset_of(&mem.address);
                self.write_operand(&dst, Width::Word, offset)?;
                ExecResult::proceed(cost(2, 2))
            }

            Operation::Lds | Operation::Les => {
                let (dst, src) = self.operands(instr)?;
                let mem = self.memory_operand(instr, &src)?;
                let (segment, offset) = self.read_far_pointer(&mem)?;
                self.write_operand(&dst, Width::Word, offset)?;
                let seg = if instr.operation == Operation::Lds {
                    SegReg::DS
                } else {
                    SegReg::ES
                };
                self.regs.set_seg(seg, segment);
                ExecResult::proceed(cost(16, 16))
            }

            Operation::Xlat => {
                let src = self.src(instr)?;
                let mem = self.memory_operand(instr, &src)?;
                let offset = self
                    .regs
                    .bx
                    .wrapping_add(self.regs.get8(Reg8::AL) as u16);
                let value = self.read_byte(self.regs.get_seg(mem.segment), offset)?;
                self.regs.set8(Reg8::AL, value);
                ExecResult::proceed(11)
            }

            Operation::Lahf => {
                self.regs.set8(Reg8::AH, self.regs.flags() as u8);
                ExecResult::proceed(4)
            }
            Operation::Sahf => {
                let flags = (self.regs.flags() & 0xFF00) | self.regs.get8(Reg8::AH) as u16;
                self.regs.set_flags(flags);
                ExecResult::proceed(4)
            }
            Operation::Pushf => {
                self.push(self.regs.flags())?;
                ExecResult::proceed(10)
            }
            Operation::Popf => {
                let flags = self.pop()?;
                self.regs.set_flags(flags);
                ExecResult::proceed(8)
            }

            Operation::Push => {
                let src = self.src(instr)?;
                let value = match src {
                    // The 8086 stores SP after the decrement
                    Operand::Reg16(Reg16::SP) => self.regs.sp.wrapping_sub(2),
                    _ => self.read_operand(&src, Width::Word)?,
                };
                self.push(value)?;
                ExecResult::proceed(cost(11, 16))
            }
            Operation::Pop => {
                let dst = self.dst(instr)?;
                let value = self.pop()?;
                self.write_operand(&dst, Width::Word, value)?;
                ExecResult::proceed(cost(8, 17))
            }

            Operation::In => {
                let (dst, src) = self.operands(instr)?;
                let port = self.read_operand(&src, Width::Word)?;
                let value = interrupts.port_in(port, width) & width.mask() as u16;
                self.write_operand(&dst, width, value)?;
                ExecResult::proceed(10)
            }
            Operation::Out => {
                let (dst, src) = self.operands(instr)?;
                let port = self.read_operand(&dst, Width::Word)?;
                let value = self.read_operand(&src, width)?;
                interrupts.port_out(port, width, value);
                ExecResult::proceed(10)
            }

            Operation::Jmp => {
                let target = self.near_target(instr, next_ip)?;
                self.regs.ip = target;
                ExecResult::proceed(15)
            }
            Operation::JmpFar => {
                let (segment, offset) = self.far_target(instr)?;
                self.regs.cs = segment;
                self.regs.ip = offset;
                ExecResult::proceed(cost(15, 24))
            }
            Operation::Jcc(cond) => {
                if self.condition(cond) {
                    self.regs.ip = self.near_target(instr, next_ip)?;
                    ExecResult::proceed(16)
                } else {
                    ExecResult::proceed(4)
                }
            }
            Operation::Jcxz => {
                if self.regs.cx == 0 {
                    self.regs.ip = self.near_target(instr, next_ip)?;
                    ExecResult::proceed(18)
                } else {
                    ExecResult::proceed(6)
                }
            }
            Operation::Loop | Operation::Loope | Operation::Loopne => {
                self.regs.cx = self.regs.cx.wrapping_sub(1);
                let zf = self.regs.get_flag(Flag::ZF);
                let taken = self.regs.cx != 0
                    && match instr.operation {
                        Operation::Loope => zf,
                        Operation::Loopne => !zf,
                        _ => true,
                    };
                if taken {
                    self.regs.ip = self.near_target(instr, next_ip)?;
                    ExecResult::proceed(17)
                } else {
                    ExecResult::proceed(5)
                }
            }

            Operation::Call => {
                let target = self.near_target(instr, next_ip)?;
                self.push(next_ip)?;
                self.regs.ip = target;
                ExecResult::proceed(cost(19, 21))
            }
            Operation::CallFar => {
                let (segment, offset) = self.far_target(instr)?;
                self.push(self.regs.cs)?;
                self.push(next_ip)?;
                self.regs.cs = segment;
                self.regs.ip = offset;
                ExecResult::proceed(cost(28, 37))
            }
            Operation::Ret => {
                self.regs.ip = self.pop()?;
                let release = self.release_count(instr)?;
                self.regs.sp = self.regs.sp.wrapping_add(release);
                ExecResult::proceed(if release > 0 { 20 } else { 16 })
            }
            Operation::RetFar => {
                self.regs.ip = self.pop()?;
                self.regs.cs = self.pop()?;
                let release = self.release_count(instr)?;
                self.regs.sp = self.regs.sp.wrapping_add(release);
                ExecResult::proceed(if release > 0 { 25 } else { 26 })
            }

            Operation::Int => {
                let vector = self.read_operand(&self.src(instr)?, Width::Byte)? as u8;
                let effect = raise_interrupt(self, interrupts, vector)?;
                ExecResult {
                    cycles: if instr.opcode == 0xCC { 52 } else { 51 },
                    effect,
                }
            }
            Operation::Into => {
                if self.regs.get_flag(Flag::OF) {
                    let effect = raise_interrupt(self, interrupts, 4)?;
                    ExecResult { cycles: 53, effect }
                } else {
                    ExecResult::proceed(4)
                }
            }
            Operation::Iret => {
                self.regs.ip = self.pop()?;
                self.regs.cs = self.pop()?;
                let flags = self.pop()?;
                self.regs.set_flags(flags);
                ExecResult::proceed(24)
            }

            Operation::Movs | Operation::Cmps | Operation::Scas | Operation::Lods | Operation::Stos => {
                let iterations = self.string_op(instr)?;
                let per = match instr.operation {
                    Operation::Movs => 17,
                    Operation::Cmps => 22,
                    Operation::Scas => 15,
                    Operation::Lods => 13,
                    _ => 10,
                };
                let cycles = match instr.rep {
                    Some(_) => 9 + per * iterations,
                    None => per + 1,
                };
                ExecResult::proceed(cycles)
            }

            Operation::Clc => self.flag_op(Flag::CF, false),
            Operation::Stc => self.flag_op(Flag::CF, true),
            Operation::Cmc => {
                let carry = self.regs.get_flag(Flag::CF);
                self.flag_op(Flag::CF, !carry)
            }
            Operation::Cld => self.flag_op(Flag::DF, false),
            Operation::Std => self.flag_op(Flag::DF, true),
            Operation::Cli => self.flag_op(Flag::IF, false),
            Operation::Sti => self.flag_op(Flag::IF, true),

            Operation::Hlt => ExecResult {
                cycles: 2,
                effect: StepEffect::Halt,
            },
            Operation::Nop => ExecResult::proceed(3),
            Operation::Wait => ExecResult::proceed(3),
            Operation::Esc => ExecResult::proceed(cost(2, 8)),
        };

        Ok(result)
    }

    fn flag_op(&mut self, flag: Flag, value: bool) -> ExecResult {
        self.regs.set_flag(flag, value);
        ExecResult::proceed(2)
    }

    fn dst(&self, instr: &Instruction) -> Result<Operand, CpuError> {
        instr.dst.ok_or_else(|| malformed(instr))
    }

    fn src(&self, instr: &Instruction) -> Result<Operand, CpuError> {
        instr.src.ok_or_else(|| malformed(instr))
    }

    fn operands(&self, instr: &Instruction) -> Result<(Operand, Operand), CpuError> {
        Ok((self.dst(instr)?, self.src(instr)?))
    }

    fn memory_operand(&self, instr: &Instruction, op: &Operand) -> Result<MemoryOperand, CpuError> {
        match op {
            Operand::Memory(mem) => Ok(*mem),
            _ => Err(malformed(instr)),
        }
    }

    /// Offset part of an effective address, wrapping at 64 KiB
    pub fn offset_of(&self, address: &EffectiveAddress) -> u16 {
        match *address {
            EffectiveAddress::Direct(offset) => offset,
            EffectiveAddress::Indirect { base, disp } => {
                self.regs.get16(base).wrapping_add(disp.value())
            }
            EffectiveAddress::BaseIndex { base, index, disp } => self
                .regs
                .get16(base)
                .wrapping_add(self.regs.get16(index))
                .wrapping_add(disp.value()),
        }
    }

    fn read_operand(&self, op: &Operand, width: Width) -> Result<u16, CpuError> {
        Ok(match *op {
            Operand::Reg8(r) => self.regs.get8(r) as u16,
            Operand::Reg16(r) => self.regs.get16(r),
            Operand::Seg(s) => self.regs.get_seg(s),
            Operand::Imm8(v) => v as u16,
            Operand::Imm16(v) => v,
            Operand::Memory(mem) => {
                let offset = self.offset_of(&mem.address);
                self.read_at(self.regs.get_seg(mem.segment), offset, width)?
            }
            Operand::Relative(_) | Operand::Far { .. } => {
                return Err(CpuError::InvalidRegister(format!(
                    "{:?} cannot be read as a value",
                    op
                )))
            }
        })
    }

    fn write_operand(&mut self, op: &Operand, width: Width, value: u16) -> Result<(), CpuError> {
        match *op {
            Operand::Reg8(r) => self.regs.set8(r, value as u8),
            Operand::Reg16(r) => self.regs.set16(r, value),
            Operand::Seg(s) => self.regs.set_seg(s, value),
            Operand::Memory(mem) => {
                let offset = self.offset_of(&mem.address);
                self.write_at(self.regs.get_seg(mem.segment), offset, width, value)?;
            }
            Operand::Imm8(_) | Operand::Imm16(_) | Operand::Relative(_) | Operand::Far { .. } => {
                return Err(CpuError::InvalidRegister(format!(
                    "{:?} cannot be written",
                    op
                )))
            }
        }
        Ok(())
    }

    /// Offset then segment, as LDS/LES and far indirect jumps store them
    fn read_far_pointer(&self, mem: &MemoryOperand) -> Result<(u16, u16), CpuError> {
        let segment = self.regs.get_seg(mem.segment);
        let offset = self.offset_of(&mem.address);
        let target_offset = self.read_word(segment, offset)?;
        let target_segment = self.read_word(segment, offset.wrapping_add(2))?;
        Ok((target_segment, target_offset))
    }

    fn near_target(&self, instr: &Instruction, next_ip: u16) -> Result<u16, CpuError> {
        match self.dst(instr)? {
            Operand::Relative(rel) => Ok(next_ip.wrapping_add(rel as u16)),
            op => self.read_operand(&op, Width::Word),
        }
    }

    fn far_target(&self, instr: &Instruction) -> Result<(u16, u16), CpuError> {
        match self.dst(instr)? {
            Operand::Far { segment, offset } => Ok((segment, offset)),
            Operand::Memory(mem) => self.read_far_pointer(&mem),
            _ => Err(malformed(instr)),
        }
    }

    fn release_count(&self, instr: &Instruction) -> Result<u16, CpuError> {
        match instr.src {
            Some(op) => self.read_operand(&op, Width::Word),
            None => Ok(0),
        }
    }

    fn condition(&self, cond: Condition) -> bool {
        let cf = self.regs.get_flag(Flag::CF);
        let zf = self.regs.get_flag(Flag::ZF);
        let sf = self.regs.get_flag(Flag::SF);
        let of = self.regs.get_flag(Flag::OF);
        let pf = self.regs.get_flag(Flag::PF);
        match cond {
            Condition::Overflow => of,
            Condition::NotOverflow => !of,
            Condition::Below => cf,
            Condition::AboveOrEqual => !cf,
            Condition::Equal => zf,
            Condition::NotEqual => !zf,
            Condition::BelowOrEqual => cf || zf,
            Condition::Above => !cf && !zf,
            Condition::Sign => sf,
            Condition::NotSign => !sf,
            Condition::Parity => pf,
            Condition::NotParity => !pf,
            Condition::Less => sf != of,
            Condition::GreaterOrEqual => sf == of,
            Condition::LessOrEqual => zf || sf != of,
            Condition::Greater => !zf && sf == of,
        }
    }

    fn set_szp(&mut self, result: u16, width: Width) {
        let result = result as u32 & width.mask();
        self.regs.set_flag(Flag::ZF, result == 0);
        self.regs.set_flag(Flag::SF, result & sign_bit(width) != 0);
        self.regs.set_flag(Flag::PF, parity(result));
    }

    fn add(&mut self, a: u16, b: u16, carry: bool, width: Width) -> u16 {
        let (a, b) = (a as u32, b as u32);
        let full = a + b + carry as u32;
        let result = full & width.mask();
        self.regs.set_flag(Flag::CF, full > width.mask());
        self.regs
            .set_flag(Flag::OF, (a ^ result) & (b ^ result) & sign_bit(width) != 0);
        self.regs.set_flag(Flag::AF, (a ^ b ^ result) & 0x10 != 0);
        self.set_szp(result as u16, width);
        result as u16
    }

    fn sub(&mut self, a: u16, b: u16, borrow: bool, width: Width) -> u16 {
        let (a, b) = (a as u32, b as u32);
        let result = a.wrapping_sub(b).wrapping_sub(borrow as u32) & width.mask();
        self.regs.set_flag(Flag::CF, b + borrow as u32 > a);
        self.regs
            .set_flag(Flag::OF, (a ^ b) & (a ^ result) & sign_bit(width) != 0);
        self.regs.set_flag(Flag::AF, (a ^ b ^ result) & 0x10 != 0);
        self.set_szp(result as u16, width);
        result as u16
    }

    fn logic(&mut self, result: u16, width: Width) -> u16 {
        self.regs.set_flag(Flag::CF, false);
        self.regs.set_flag(Flag::OF, false);
        self.regs.set_flag(Flag::AF, false);
        self.set_szp(result, width);
        result & width.mask() as u16
    }

    fn alu(&mut self, op: Operation, a: u16, b: u16, width: Width) -> u16 {
        let carry = self.regs.get_flag(Flag::CF);
        match op {
            Operation::Add => self.add(a, b, false, width),
            Operation::Adc => self.add(a, b, carry, width),
            Operation::Sub | Operation::Cmp => self.sub(a, b, false, width),
            Operation::Sbb => self.sub(a, b, carry, width),
            Operation::And | Operation::Test => self.logic(a & b, width),
            Operation::Or => self.logic(a | b, width),
            _ => self.logic(a ^ b, width),
        }
    }

    fn multiply(&mut self, signed_mul: bool, value: u16, width: Width) {
        let significant = match (width, signed_mul) {
            (Width::Byte, false) => {
                let product = self.regs.get8(Reg8::AL) as u16 * (value as u8) as u16;
                self.regs.ax = product;
                product > 0xFF
            }
            (Width::Byte, true) => {
                let product = (self.regs.get8(Reg8::AL) as i8 as i16) * (value as u8 as i8 as i16);
                self.regs.ax = product as u16;
                product != product as i8 as i16
            }
            (_, false) => {
                let product = self.regs.ax as u32 * value as u32;
                self.regs.ax = product as u16;
                self.regs.dx = (product >> 16) as u16;
                self.regs.dx != 0
            }
            (_, true) => {
                let product = (self.regs.ax as i16 as i32) * (value as i16 as i32);
                self.regs.ax = product as u16;
                self.regs.dx = (product >> 16) as u16;
                product != product as i16 as i32
            }
        };
        self.regs.set_flag(Flag::CF, significant);
        self.regs.set_flag(Flag::OF, significant);
    }

    /// DIV/IDIV; a zero divisor or an oversized quotient fails before any
    /// register is written
    fn divide(&mut self, signed_div: bool, divisor: u16, width: Width, address: u32) -> Result<(), CpuError> {
        let fault = CpuError::DivideByZero { address };
        match (width, signed_div) {
            (Width::Byte, false) => {
                let divisor = divisor as u8 as u16;
                if divisor == 0 {
                    return Err(fault);
                }
                let quotient = self.regs.ax / divisor;
                if quotient > 0xFF {
                    return Err(fault);
                }
                let remainder = self.regs.ax % divisor;
                self.regs.set8(Reg8::AL, quotient as u8);
                self.regs.set8(Reg8::AH, remainder as u8);
            }
            (Width::Byte, true) => {
                let divisor = signed(divisor, Width::Byte);
                if divisor == 0 {
                    return Err(fault);
                }
                let dividend = self.regs.ax as i16 as i32;
                let quotient = dividend / divisor;
                if !(-128..=127).contains(&quotient) {
                    return Err(fault);
                }
                let remainder = dividend % divisor;
                self.regs.set8(Reg8::AL, quotient as u8);
                self.regs.set8(Reg8::AH, remainder as u8);
            }
            (_, false) => {
                let divisor = divisor as u32;
                if divisor == 0 {
                    return Err(fault);
                }
                let dividend = ((self.regs.dx as u32) << 16) | self.regs.ax as u32;
                let quotient = dividend / divisor;
                if quotient > 0xFFFF {
                    return Err(fault);
                }
                self.regs.ax = quotient as u16;
                self.regs.dx = (dividend % divisor) as u16;
            }
            (_, true) => {
                let divisor = signed(divisor, Width::Word) as i64;
                if divisor == 0 {
                    return Err(fault);
                }
                let dividend = (((self.regs.dx as u32) << 16) | self.regs.ax as u32) as i32 as i64;
                let quotient = dividend / divisor;
                if !(-32768..=32767).contains(&quotient) {
                    return Err(fault);
                }
                self.regs.ax = quotient as u16;
                self.regs.dx = (dividend % divisor) as u16;
            }
        }
        Ok(())
    }

    /// Shift or rotate by `count`; the 8086 does not mask the count
    fn shift_rotate(&mut self, op: Operation, val: u16, count: u8, width: Width) -> u16 {
        if count == 0 {
            return val;
        }

        let mask = width.mask() as u16;
        let msb = sign_bit(width) as u16;
        let mut result = val & mask;

        match op {
            Operation::Rol => {
                for _ in 0..count {
                    let carry_out = result & msb != 0;
                    result = ((result << 1) | carry_out as u16) & mask;
                    self.regs.set_flag(Flag::CF, carry_out);
                }
                if count == 1 {
                    let top = result & msb != 0;
                    self.regs.set_flag(Flag::OF, top != self.regs.get_flag(Flag::CF));
                }
            }
            Operation::Ror => {
                for _ in 0..count {
                    let carry_out = result & 1 != 0;
                    result = (result >> 1) | if carry_out { msb } else { 0 };
                    self.regs.set_flag(Flag::CF, carry_out);
                }
                if count == 1 {
                    let top = result & msb != 0;
                    let next = result & (msb >> 1) != 0;
                    self.regs.set_flag(Flag::OF, top != next);
                }
            }
            Operation::Rcl => {
                for _ in 0..count {
                    let carry_in = self.regs.get_flag(Flag::CF) as u16;
                    let carry_out = result & msb != 0;
                    result = ((result << 1) | carry_in) & mask;
                    self.regs.set_flag(Flag::CF, carry_out);
                }
                if count == 1 {
                    let top = result & msb != 0;
                    self.regs.set_flag(Flag::OF, top != self.regs.get_flag(Flag::CF));
                }
            }
            Operation::Rcr => {
                for _ in 0..count {
                    let carry_in = if self.regs.get_flag(Flag::CF) { msb } else { 0 };
                    let carry_out = result & 1 != 0;
                    result = (result >> 1) | carry_in;
                    self.regs.set_flag(Flag::CF, carry_out);
                }
                if count == 1 {
                    let top = result & msb != 0;
                    let next = result & (msb >> 1) != 0;
                    self.regs.set_flag(Flag::OF, top != next);
                }
            }
            Operation::Shl => {
                for _ in 0..count {
                    let carry_out = result & msb != 0;
                    result = (result << 1) & mask;
                    self.regs.set_flag(Flag::CF, carry_out);
                }
                self.set_szp(result, width);
                if count == 1 {
                    let top = result & msb != 0;
                    self.regs.set_flag(Flag::OF, top != self.regs.get_flag(Flag::CF));
                }
            }
            Operation::Shr => {
                if count == 1 {
                    self.regs.set_flag(Flag::OF, val & msb != 0);
                }
                for _ in 0..count {
                    self.regs.set_flag(Flag::CF, result & 1 != 0);
                    result >>= 1;
                }
                self.set_szp(result, width);
            }
            _ => {
                let sign = val & msb;
                if count == 1 {
                    self.regs.set_flag(Flag::OF, false);
                }
                for _ in 0..count {
                    self.regs.set_flag(Flag::CF, result & 1 != 0);
                    result = (result >> 1) | sign;
                }
                self.set_szp(result, width);
            }
        }

        result
    }

    /// DAA (`addition`) or DAS
    fn decimal_adjust(&mut self, addition: bool) {
        let al = self.regs.get8(Reg8::AL);
        let carry = self.regs.get_flag(Flag::CF);
        let aux = self.regs.get_flag(Flag::AF);
        let mut result = al;

        let low_adjust = al & 0x0F > 9 || aux;
        if low_adjust {
            result = if addition {
                result.wrapping_add(0x06)
            } else {
                result.wrapping_sub(0x06)
            };
        }
        let high_adjust = al > 0x99 || carry;
        if high_adjust {
            result = if addition {
                result.wrapping_add(0x60)
            } else {
                result.wrapping_sub(0x60)
            };
        }

        self.regs.set8(Reg8::AL, result);
        self.regs.set_flag(Flag::AF, low_adjust);
        self.regs.set_flag(Flag::CF, high_adjust);
        self.set_szp(result as u16, Width::Byte);
    }

    /// AAA (`addition`) or AAS
    fn ascii_adjust(&mut self, addition: bool) {
        let al = self.regs.get8(Reg8::AL);
        let ah = self.regs.get8(Reg8::AH);
        let adjust = al & 0x0F > 9 || self.regs.get_flag(Flag::AF);

        let (al, ah) = match (adjust, addition) {
            (false, _) => (al, ah),
            (true, true) => (al.wrapping_add(6), ah.wrapping_add(1)),
            (true, false) => (al.wrapping_sub(6), ah.wrapping_sub(1)),
        };

        self.regs.set8(Reg8::AL, al & 0x0F);
        self.regs.set8(Reg8::AH, ah);
        self.regs.set_flag(Flag::AF, adjust);
        self.regs.set_flag(Flag::CF, adjust);
    }

    /// Run a string instruction, honouring any repeat prefix.
    /// Returns the number of iterations performed.
    fn string_op(&mut self, instr: &Instruction) -> Result<u32, CpuError> {
        let width = instr.width;
        let step = width.bytes() as u16;
        let delta = if self.regs.get_flag(Flag::DF) {
            step.wrapping_neg()
        } else {
            step
        };
        let source = self.regs.get_seg(instr.segment_override.unwrap_or(SegReg::DS));
        let compares = matches!(instr.operation, Operation::Cmps | Operation::Scas);

        let rep = match instr.rep {
            None => {
                self.string_iteration(instr.operation, width, source, delta)?;
                return Ok(1);
            }
            Some(rep) => rep,
        };

        let mut iterations = 0;
        while self.regs.cx != 0 {
            self.string_iteration(instr.operation, width, source, delta)?;
            self.regs.cx = self.regs.cx.wrapping_sub(1);
            iterations += 1;

            if compares {
                let zf = self.regs.get_flag(Flag::ZF);
                let done = match rep {
                    RepPrefix::Rep => !zf,
                    RepPrefix::RepNe => zf,
                };
                if done {
                    break;
                }
            }
        }
        Ok(iterations)
    }

    fn string_iteration(
        &mut self,
        op: Operation,
        width: Width,
        source: u16,
        delta: u16,
    ) -> Result<(), CpuError> {
        let (si, di, es) = (self.regs.si, self.regs.di, self.regs.es);
        let acc = match width {
            Width::Byte => Operand::Reg8(Reg8::AL),
            _ => Operand::Reg16(Reg16::AX),
        };

        match op {
            Operation::Movs => {
                let value = self.read_at(source, si, width)?;
                self.write_at(es, di, width, value)?;
                self.regs.si = si.wrapping_add(delta);
                self.regs.di = di.wrapping_add(delta);
            }
            Operation::Cmps => {
                let a = self.read_at(source, si, width)?;
                let b = self.read_at(es, di, width)?;
                self.sub(a, b, false, width);
                self.regs.si = si.wrapping_add(delta);
                self.regs.di = di.wrapping_add(delta);
            }
            Operation::Scas => {
                let a = self.read_operand(&acc, width)?;
                let b = self.read_at(es, di, width)?;
                self.sub(a, b, false, width);
                self.regs.di = di.wrapping_add(delta);
            }
            Operation::Lods => {
                let value = self.read_at(source, si, width)?;
                self.write_operand(&acc, width, value)?;
                self.regs.si = si.wrapping_add(delta);
            }
            _ => {
                let value = self.read_operand(&acc, width)?;
                self.write_at(es, di, width, value)?;
                self.regs.di = di.wrapping_add(delta);
            }
        }
        Ok(())
    }
}
