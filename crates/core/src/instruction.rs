//! Decoded instruction representation
//!
//! The decoder produces an `Instruction` describing one operation: what it
//! does, on which operands, with which prefixes, and how many bytes it
//! occupies. The executor consumes it and it is dropped after the step.

use std::fmt;

use crate::memory::Width;
use crate::registers::{Reg16, Reg8, SegReg};

/// Optional displacement of a memory operand, kept at its encoded size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Displacement {
    None,
    Byte(i8),
    Word(i16),
}

impl Displacement {
    /// Displacement as a wrapping 16-bit addend
    #[inline]
    pub fn value(self) -> u16 {
        match self {
            Displacement::None => 0,
            Displacement::Byte(d) => d as i16 as u16,
            Displacement::Word(d) => d as u16,
        }
    }
}

/// How a memory operand's offset is formed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectiveAddress {
    /// `[disp16]`
    Direct(u16),
    /// `[BX]`, `[BP]`, `[SI]`, `[DI]` with optional displacement
    Indirect { base: Reg16, disp: Displacement },
    /// `[BX|BP + SI|DI]` with optional displacement
    BaseIndex {
        base: Reg16,
        index: Reg16,
        disp: Displacement,
    },
}

/// Memory operand: offset form plus the segment it is relative to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryOperand {
    pub address: EffectiveAddress,
    /// Segment after applying any override prefix
    pub segment: SegReg,
    /// True when `segment` came from an override prefix
    pub segment_override: bool,
}

/// One instruction operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Reg8(Reg8),
    Reg16(Reg16),
    Seg(SegReg),
    Imm8(u8),
    Imm16(u16),
    Memory(MemoryOperand),
    /// Displacement relative to the next instruction
    Relative(i16),
    /// Immediate `segment:offset` pointer
    Far { segment: u16, offset: u16 },
}

/// Condition codes in encoding order (low nibble of 0x70-0x7F)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Overflow,
    NotOverflow,
    Below,
    AboveOrEqual,
    Equal,
    NotEqual,
    BelowOrEqual,
    Above,
    Sign,
    NotSign,
    Parity,
    NotParity,
    Less,
    GreaterOrEqual,
    LessOrEqual,
    Greater,
}

impl Condition {
    pub fn from_code(code: u8) -> Self {
        match code & 0x0F {
            0x0 => Condition::Overflow,
            0x1 => Condition::NotOverflow,
            0x2 => Condition::Below,
            0x3 => Condition::AboveOrEqual,
            0x4 => Condition::Equal,
            0x5 => Condition::NotEqual,
            0x6 => Condition::BelowOrEqual,
            0x7 => Condition::Above,
            0x8 => Condition::Sign,
            0x9 => Condition::NotSign,
            0xA => Condition::Parity,
            0xB => Condition::NotParity,
            0xC => Condition::Less,
            0xD => Condition::GreaterOrEqual,
            0xE => Condition::LessOrEqual,
            _ => Condition::Greater,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Condition::Overflow => "JO",
            Condition::NotOverflow => "JNO",
            Condition::Below => "JB",
            Condition::AboveOrEqual => "JAE",
            Condition::Equal => "JE",
            Condition::NotEqual => "JNE",
            Condition::BelowOrEqual => "JBE",
            Condition::Above => "JA",
            Condition::Sign => "JS",
            Condition::NotSign => "JNS",
            Condition::Parity => "JP",
            Condition::NotParity => "JNP",
            Condition::Less => "JL",
            Condition::GreaterOrEqual => "JGE",
            Condition::LessOrEqual => "JLE",
            Condition::Greater => "JG",
        }
    }
}

/// Repeat prefix on string instructions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepPrefix {
    /// 0xF3: REP, or REPE/REPZ on CMPS/SCAS
    Rep,
    /// 0xF2: REPNE/REPNZ
    RepNe,
}

/// Operation performed by an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    // Data movement
    Mov,
    Xchg,
    Lea,
    Lds,
    Les,
    Xlat,
    Lahf,
    Sahf,
    Pushf,
    Popf,
    Cbw,
    Cwd,
    In,
    Out,
    Push,
    Pop,

    // Arithmetic
    Add,
    Adc,
    Sub,
    Sbb,
    Cmp,
    Inc,
    Dec,
    Neg,
    Mul,
    Imul,
    Div,
    Idiv,
    Daa,
    Das,
    Aaa,
    Aas,
    Aam,
    Aad,

    // Logic
    And,
    Or,
    Xor,
    Test,
    Not,
    Rol,
    Ror,
    Rcl,
    Rcr,
    Shl,
    Shr,
    Sar,

    // Control transfer
    Jmp,
    JmpFar,
    Jcc(Condition),
    Jcxz,
    Loop,
    Loope,
    Loopne,
    Call,
    CallFar,
    Ret,
    RetFar,
    Int,
    Into,
    Iret,

    // Strings
    Movs,
    Cmps,
    Scas,
    Lods,
    Stos,

    // Processor control
    Clc,
    Stc,
    Cmc,
    Cld,
    Std,
    Cli,
    Sti,
    Hlt,
    Nop,
    Wait,
    /// Coprocessor escape; decoded for length, executed as a no-op
    Esc,
}

impl Operation {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Operation::Mov => "MOV",
            Operation::Xchg => "XCHG",
            Operation::Lea => "LEA",
            Operation::Lds => "LDS",
            Operation::Les => "LES",
            Operation::Xlat => "XLAT",
            Operation::Lahf => "LAHF",
            Operation::Sahf => "SAHF",
            Operation::Pushf => "PUSHF",
            Operation::Popf => "POPF",
            Operation::Cbw => "CBW",
            Operation::Cwd => "CWD",
            Operation::In => "IN",
            Operation::Out => "OUT",
            Operation::Push => "PUSH",
            Operation::Pop => "POP",
            Operation::Add => "ADD",
            Operation::Adc => "ADC",
            Operation::Sub => "SUB",
            Operation::Sbb => "SBB",
            Operation::Cmp => "CMP",
            Operation::Inc => "INC",
            Operation::Dec => "DEC",
            Operation::Neg => "NEG",
            Operation::Mul => "MUL",
            Operation::Imul => "IMUL",
            Operation::Div => "DIV",
            Operation::Idiv => "IDIV",
            Operation::Daa => "DAA",
            Operation::Das => "DAS",
            Operation::Aaa => "AAA",
            Operation::Aas => "AAS",
            Operation::Aam => "AAM",
            Operation::Aad => "AAD",
            Operation::And => "AND",
            Operation::Or => "OR",
            Operation::Xor => "XOR",
            Operation::Test => "TEST",
            Operation::Not => "NOT",
            Operation::Rol => "ROL",
            Operation::Ror => "ROR",
            Operation::Rcl => "RCL",
            Operation::Rcr => "RCR",
            Operation::Shl => "SHL",
            Operation::Shr => "SHR",
            Operation::Sar => "SAR",
            Operation::Jmp => "JMP",
            Operation::JmpFar => "JMP FAR",
            Operation::Jcc(cond) => cond.mnemonic(),
            Operation::Jcxz => "JCXZ",
            Operation::Loop => "LOOP",
            Operation::Loope => "LOOPE",
            Operation::Loopne => "LOOPNE",
            Operation::Call => "CALL",
            Operation::CallFar => "CALL FAR",
            Operation::Ret => "RET",
            Operation::RetFar => "RETF",
            Operation::Int => "INT",
            Operation::Into => "INTO",
            Operation::Iret => "IRET",
            Operation::Movs => "MOVS",
            Operation::Cmps => "CMPS",
            Operation::Scas => "SCAS",
            Operation::Lods => "LODS",
            Operation::Stos => "STOS",
            Operation::Clc => "CLC",
            Operation::Stc => "STC",
            Operation::Cmc => "CMC",
            Operation::Cld => "CLD",
            Operation::Std => "STD",
            Operation::Cli => "CLI",
            Operation::Sti => "STI",
            Operation::Hlt => "HLT",
            Operation::Nop => "NOP",
            Operation::Wait => "WAIT",
            Operation::Esc => "ESC",
        }
    }

    pub fn is_string(self) -> bool {
        matches!(
            self,
            Operation::Movs | Operation::Cmps | Operation::Scas | Operation::Lods | Operation::Stos
        )
    }
}

/// One decoded instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub operation: Operation,
    /// Operand size; `Word` for instructions without a data operand
    pub width: Width,
    pub dst: Option<Operand>,
    pub src: Option<Operand>,
    pub segment_override: Option<SegReg>,
    pub rep: Option<RepPrefix>,
    pub lock: bool,
    /// Primary opcode byte (after prefixes)
    pub opcode: u8,
    /// Encoded length in bytes, prefixes included
    pub length: u32,
}

impl Instruction {
    /// True when the instruction touches memory through a ModR/M or
    /// direct-address operand
    pub fn has_memory_operand(&self) -> bool {
        matches!(self.dst, Some(Operand::Memory(_))) || matches!(self.src, Some(Operand::Memory(_)))
    }

    fn fmt_operand(&self, op: &Operand, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match op {
            Operand::Reg8(r) => write!(f, "{}", r),
            Operand::Reg16(r) => write!(f, "{}", r),
            Operand::Seg(s) => write!(f, "{}", s),
            Operand::Imm8(v) => write!(f, "0x{:02X}", v),
            Operand::Imm16(v) => write!(f, "0x{:04X}", v),
            Operand::Relative(rel) => {
                let from_start = *rel as i32 + self.length as i32;
                match from_start {
                    0 => write!(f, "$"),
                    n if n > 0 => write!(f, "$+{}", n),
                    n => write!(f, "$-{}", -n),
                }
            }
            Operand::Far { segment, offset } => write!(f, "0x{:04X}:0x{:04X}", segment, offset),
            Operand::Memory(mem) => {
                // Size is ambiguous only when no register operand pins it
                let needs_size = !matches!(
                    (self.dst, self.src),
                    (Some(Operand::Reg8(_) | Operand::Reg16(_) | Operand::Seg(_)), _)
                        | (_, Some(Operand::Reg8(_) | Operand::Reg16(_) | Operand::Seg(_)))
                );
                if needs_size {
                    match self.width {
                        Width::Byte => f.write_str("BYTE PTR ")?,
                        _ => f.write_str("WORD PTR ")?,
                    }
                }
                if mem.segment_override {
                    write!(f, "{}:", mem.segment)?;
                }
                match mem.address {
                    EffectiveAddress::Direct(addr) => write!(f, "[0x{:04X}]", addr),
                    EffectiveAddress::Indirect { base, disp } => {
                        write!(f, "[{}", base)?;
                        fmt_disp(disp, f)?;
                        f.write_str("]")
                    }
                    EffectiveAddress::BaseIndex { base, index, disp } => {
                        write!(f, "[{}+{}", base, index)?;
                        fmt_disp(disp, f)?;
                        f.write_str("]")
                    }
                }
            }
        }
    }
}

fn fmt_disp(disp: Displacement, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let value = match disp {
        Displacement::None => return Ok(()),
        Displacement::Byte(d) => d as i32,
        Displacement::Word(d) => d as i32,
    };
    if value < 0 {
        write!(f, "-0x{:X}", -value)
    } else {
        write!(f, "+0x{:X}", value)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.lock {
            f.write_str("LOCK ")?;
        }
        if let (Some(rep), true) = (self.rep, self.operation.is_string()) {
            let prefix = match (rep, self.operation) {
                (RepPrefix::Rep, Operation::Cmps | Operation::Scas) => "REPE ",
                (RepPrefix::Rep, _) => "REP ",
                (RepPrefix::RepNe, _) => "REPNE ",
            };
            f.write_str(prefix)?;
        }

        f.write_str(self.operation.mnemonic())?;
        if self.operation.is_string() {
            f.write_str(if self.width == Width::Byte { "B" } else { "W" })?;
            return Ok(());
        }

        let mut first = true;
        for op in [self.dst, self.src].iter().flatten() {
            f.write_str(if first { " " } else { ", " })?;
            first = false;
            self.fmt_operand(op, f)?;
        }
        Ok(())
    }
}
