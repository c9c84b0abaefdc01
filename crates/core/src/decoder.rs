//! 8086 instruction decoder
//!
//! Turns the bytes at a physical address, or at segment:offset, into an
//! `Instruction`. Decoding never touches CPU state: memory operands are
//! described symbolically and resolved by the executor, so the same bytes
//! always decode the same way.
//!
//! ModR/M layout: `mod` (bits 7-6) selects register or memory form and the
//! displacement size, `reg` (bits 5-3) is a register or a group extension,
//! `r/m` (bits 2-0) picks the register or addressing mode.
//!
//! ```text
//! | r/m | mod=00      | mod=01         | mod=10          |
//! |-----+-------------+----------------+-----------------|
//! | 000 | [BX+SI]     | [BX+SI+disp8]  | [BX+SI+disp16]  |
//! | 001 | [BX+DI]     | [BX+DI+disp8]  | [BX+DI+disp16]  |
//! | 010 | [BP+SI]     | [BP+SI+disp8]  | [BP+SI+disp16]  |
//! | 011 | [BP+DI]     | [BP+DI+disp8]  | [BP+DI+disp16]  |
//! | 100 | [SI]        | [SI+disp8]     | [SI+disp16]     |
//! | 101 | [DI]        | [DI+disp8]     | [DI+disp16]     |
//! | 110 | [disp16]    | [BP+disp8]     | [BP+disp16]     |
//! | 111 | [BX]        | [BX+disp8]     | [BX+disp16]     |
//! ```

use crate::error::CpuError;
use crate::instruction::{
    Condition, Displacement, EffectiveAddress, Instruction, MemoryOperand, Operand, Operation,
    RepPrefix,
};
use crate::logging::{log, LogCategory, LogLevel};
use crate::memory::{Memory8086, Width};
use crate::registers::{Reg16, Reg8, SegReg};

/// Where the instruction bytes come from
#[derive(Clone, Copy)]
enum Origin {
    /// Consecutive physical addresses
    Linear,
    /// segment:offset, the offset wrapping at 64 KiB like IP does
    Segment { segment: u16, offset: u16 },
}

/// Sequential byte reader over memory
struct Cursor<'a, M: Memory8086 + ?Sized> {
    memory: &'a M,
    origin: Origin,
    start: u32,
    pos: u32,
}

impl<'a, M: Memory8086 + ?Sized> Cursor<'a, M> {
    fn linear(memory: &'a M, start: u32) -> Self {
        Self {
            memory,
            origin: Origin::Linear,
            start,
            pos: 0,
        }
    }

    fn segmented(memory: &'a M, segment: u16, offset: u16) -> Self {
        Self {
            memory,
            origin: Origin::Segment { segment, offset },
            start: memory.physical_address(segment, offset),
            pos: 0,
        }
    }

    /// Physical address of the byte `pos` bytes into the instruction
    fn address(&self, pos: u32) -> u64 {
        match self.origin {
            Origin::Linear => self.start as u64 + pos as u64,
            Origin::Segment { segment, offset } => self
                .memory
                .physical_address(segment, offset.wrapping_add(pos as u16))
                as u64,
        }
    }

    fn next_u8(&mut self) -> Result<u8, CpuError> {
        let addr = self.address(self.pos);
        // A prefix run covering a whole segment never reaches an opcode
        if self.pos > 0xFFFF || addr >= self.memory.size() as u64 {
            return Err(CpuError::Truncated {
                address: self.start,
            });
        }
        let val = self.memory.read_u8(addr as u32)?;
        self.pos += 1;
        Ok(val)
    }

    fn next_u16(&mut self) -> Result<u16, CpuError> {
        // Little-endian: low byte first
        let low = self.next_u8()? as u16;
        let high = self.next_u8()? as u16;
        Ok((high << 8) | low)
    }

    fn next_i8(&mut self) -> Result<i8, CpuError> {
        Ok(self.next_u8()? as i8)
    }
}

/// Prefix state accumulated before the opcode byte
#[derive(Default)]
struct Prefixes {
    segment: Option<SegReg>,
    rep: Option<RepPrefix>,
    lock: bool,
}

/// Decoded ModR/M byte with its memory operand already resolved
#[derive(Clone, Copy)]
struct ModRm {
    reg: u8,
    rm: u8,
    memory: Option<MemoryOperand>,
}

impl ModRm {
    /// The r/m side as an operand of the given width
    fn rm_operand(&self, width: Width) -> Operand {
        match self.memory {
            Some(mem) => Operand::Memory(mem),
            None => reg_operand(self.rm, width),
        }
    }

    /// The reg side as a register operand of the given width
    fn reg_operand(&self, width: Width) -> Operand {
        reg_operand(self.reg, width)
    }
}

fn reg_operand(index: u8, width: Width) -> Operand {
    // Indices come from 3-bit fields, so conversion cannot fail
    match width {
        Width::Byte => Operand::Reg8(REG8[(index & 7) as usize]),
        _ => Operand::Reg16(REG16[(index & 7) as usize]),
    }
}

const REG8: [Reg8; 8] = [
    Reg8::AL,
    Reg8::CL,
    Reg8::DL,
    Reg8::BL,
    Reg8::AH,
    Reg8::CH,
    Reg8::DH,
    Reg8::BH,
];

const REG16: [Reg16; 8] = [
    Reg16::AX,
    Reg16::CX,
    Reg16::DX,
    Reg16::BX,
    Reg16::SP,
    Reg16::BP,
    Reg16::SI,
    Reg16::DI,
];

const SEGS: [SegReg; 4] = [SegReg::ES, SegReg::CS, SegReg::SS, SegReg::DS];

const ALU_OPS: [Operation; 8] = [
    Operation::Add,
    Operation::Or,
    Operation::Adc,
    Operation::Sbb,
    Operation::And,
    Operation::Sub,
    Operation::Xor,
    Operation::Cmp,
];

/// Shift group by ModR/M reg field; slot 6 is undocumented
const SHIFT_OPS: [Option<Operation>; 8] = [
    Some(Operation::Rol),
    Some(Operation::Ror),
    Some(Operation::Rcl),
    Some(Operation::Rcr),
    Some(Operation::Shl),
    Some(Operation::Shr),
    None,
    Some(Operation::Sar),
];

/// Working state for one decode
struct Decoder<'a, M: Memory8086 + ?Sized> {
    cur: Cursor<'a, M>,
    prefixes: Prefixes,
    opcode: u8,
    opcode_address: u32,
}

/// Decode one instruction starting at a physical address.
///
/// Bytes are read from consecutive addresses. The returned instruction's
/// `length` is the exact number of bytes the 8086 consumes, prefixes
/// included.
pub fn decode_at<M: Memory8086 + ?Sized>(memory: &M, address: u32) -> Result<Instruction, CpuError> {
    decode_from(Cursor::linear(memory, address))
}

/// Decode one instruction at segment:offset, the way the CPU fetches from
/// CS:IP. Bytes past offset 0xFFFF come from the start of the segment.
pub fn decode_segmented<M: Memory8086 + ?Sized>(
    memory: &M,
    segment: u16,
    offset: u16,
) -> Result<Instruction, CpuError> {
    decode_from(Cursor::segmented(memory, segment, offset))
}

fn decode_from<M: Memory8086 + ?Sized>(mut cur: Cursor<'_, M>) -> Result<Instruction, CpuError> {
    let mut prefixes = Prefixes::default();

    let opcode = loop {
        let byte = cur.next_u8()?;
        match byte {
            0x26 => prefixes.segment = Some(SegReg::ES),
            0x2E => prefixes.segment = Some(SegReg::CS),
            0x36 => prefixes.segment = Some(SegReg::SS),
            0x3E => prefixes.segment = Some(SegReg::DS),
            0xF0 => prefixes.lock = true,
            0xF2 => prefixes.rep = Some(RepPrefix::RepNe),
            0xF3 => prefixes.rep = Some(RepPrefix::Rep),
            _ => break byte,
        }
    };

    let opcode_address = cur.address(cur.pos - 1) as u32;
    let mut decoder = Decoder {
        cur,
        prefixes,
        opcode,
        opcode_address,
    };

    let (operation, width, dst, src) = decoder.decode_opcode().map_err(|err| {
        if let CpuError::IllegalOpcode { .. } = err {
            log(LogCategory::Decode, LogLevel::Debug, || {
                format!("[DECODE] {}", err)
            });
        }
        err
    })?;

    Ok(Instruction {
        operation,
        width,
        dst,
        src,
        segment_override: decoder.prefixes.segment,
        rep: decoder.prefixes.rep,
        lock: decoder.prefixes.lock,
        opcode,
        length: decoder.cur.pos,
    })
}

type Decoded = (Operation, Width, Option<Operand>, Option<Operand>);

impl<'a, M: Memory8086 + ?Sized> Decoder<'a, M> {
    fn illegal(&self, extension: Option<u8>) -> CpuError {
        CpuError::IllegalOpcode {
            opcode: self.opcode,
            extension,
            address: self.opcode_address,
        }
    }

    /// Width selected by the opcode's low `w` bit
    fn w_bit(&self) -> Width {
        if self.opcode & 1 == 0 {
            Width::Byte
        } else {
            Width::Word
        }
    }

    fn modrm(&mut self) -> Result<ModRm, CpuError> {
        let byte = self.cur.next_u8()?;
        let modbits = (byte >> 6) & 0x03;
        let reg = (byte >> 3) & 0x07;
        let rm = byte & 0x07;

        let memory = if modbits == 0b11 {
            None
        } else {
            let disp = match modbits {
                0b00 => Displacement::None,
                0b01 => Displacement::Byte(self.cur.next_i8()?),
                _ => Displacement::Word(self.cur.next_u16()? as i16),
            };
            let (address, default_seg) = match (rm, modbits) {
                (0b110, 0b00) => (EffectiveAddress::Direct(self.cur.next_u16()?), SegReg::DS),
                (0b000, _) => (base_index(Reg16::BX, Reg16::SI, disp), SegReg::DS),
                (0b001, _) => (base_index(Reg16::BX, Reg16::DI, disp), SegReg::DS),
                (0b010, _) => (base_index(Reg16::BP, Reg16::SI, disp), SegReg::SS),
                (0b011, _) => (base_index(Reg16::BP, Reg16::DI, disp), SegReg::SS),
                (0b100, _) => (indirect(Reg16::SI, disp), SegReg::DS),
                (0b101, _) => (indirect(Reg16::DI, disp), SegReg::DS),
                (0b110, _) => (indirect(Reg16::BP, disp), SegReg::SS),
                _ => (indirect(Reg16::BX, disp), SegReg::DS),
            };
            Some(self.memory_operand(address, default_seg))
        };

        Ok(ModRm { reg, rm, memory })
    }

    fn memory_operand(&self, address: EffectiveAddress, default_seg: SegReg) -> MemoryOperand {
        MemoryOperand {
            address,
            segment: self.prefixes.segment.unwrap_or(default_seg),
            segment_override: self.prefixes.segment.is_some(),
        }
    }

    fn immediate(&mut self, width: Width) -> Result<Operand, CpuError> {
        Ok(match width {
            Width::Byte => Operand::Imm8(self.cur.next_u8()?),
            _ => Operand::Imm16(self.cur.next_u16()?),
        })
    }

    fn rel8(&mut self) -> Result<Option<Operand>, CpuError> {
        Ok(Some(Operand::Relative(self.cur.next_i8()? as i16)))
    }

    fn rel16(&mut self) -> Result<Option<Operand>, CpuError> {
        Ok(Some(Operand::Relative(self.cur.next_u16()? as i16)))
    }

    /// Memory-only ModR/M operand (LEA, LDS, LES, far indirect)
    fn require_memory(&self, modrm: &ModRm) -> Result<Operand, CpuError> {
        match modrm.memory {
            Some(mem) => Ok(Operand::Memory(mem)),
            None => Err(self.illegal(Some(modrm.reg))),
        }
    }

    fn decode_opcode(&mut self) -> Result<Decoded, CpuError> {
        let opcode = self.opcode;
        let word = Width::Word;

        let decoded = match opcode {
            // ALU block: ADD OR ADC SBB AND SUB XOR CMP, six forms each
            0x00..=0x3F if opcode & 0x07 < 6 => {
                let op = ALU_OPS[(opcode >> 3) as usize];
                let width = self.w_bit();
                match opcode & 0x07 {
                    0 | 1 => {
                        let m = self.modrm()?;
                        (op, width, Some(m.rm_operand(width)), Some(m.reg_operand(width)))
                    }
                    2 | 3 => {
                        let m = self.modrm()?;
                        (op, width, Some(m.reg_operand(width)), Some(m.rm_operand(width)))
                    }
                    _ => {
                        let acc = reg_operand(0, width);
                        let imm = self.immediate(width)?;
                        (op, width, Some(acc), Some(imm))
                    }
                }
            }

            // PUSH/POP segment register; 0x0F (POP CS) is undocumented
            0x06 | 0x0E | 0x16 | 0x1E => {
                let seg = SEGS[(opcode >> 3) as usize];
                (Operation::Push, word, None, Some(Operand::Seg(seg)))
            }
            0x07 | 0x17 | 0x1F => {
                let seg = SEGS[(opcode >> 3) as usize];
                (Operation::Pop, word, Some(Operand::Seg(seg)), None)
            }

            0x27 => (Operation::Daa, Width::Byte, None, None),
            0x2F => (Operation::Das, Width::Byte, None, None),
            0x37 => (Operation::Aaa, Width::Byte, None, None),
            0x3F => (Operation::Aas, Width::Byte, None, None),

            0x40..=0x47 => (Operation::Inc, word, Some(reg_operand(opcode, word)), None),
            0x48..=0x4F => (Operation::Dec, word, Some(reg_operand(opcode, word)), None),
            0x50..=0x57 => (Operation::Push, word, None, Some(reg_operand(opcode, word))),
            0x58..=0x5F => (Operation::Pop, word, Some(reg_operand(opcode, word)), None),

            0x70..=0x7F => {
                let rel = self.rel8()?;
                (Operation::Jcc(Condition::from_code(opcode)), word, rel, None)
            }

            // Group 1: ALU op with immediate; 0x82 mirrors 0x80
            0x80..=0x83 => {
                let width = self.w_bit();
                let m = self.modrm()?;
                let op = ALU_OPS[m.reg as usize];
                let imm = match opcode {
                    0x81 => Operand::Imm16(self.cur.next_u16()?),
                    // Sign-extended imm8
                    0x83 => Operand::Imm16(self.cur.next_i8()? as i16 as u16),
                    _ => Operand::Imm8(self.cur.next_u8()?),
                };
                (op, width, Some(m.rm_operand(width)), Some(imm))
            }

            0x84 | 0x85 | 0x86 | 0x87 | 0x88 | 0x89 => {
                let width = self.w_bit();
                let op = match opcode {
                    0x84 | 0x85 => Operation::Test,
                    0x86 | 0x87 => Operation::Xchg,
                    _ => Operation::Mov,
                };
                let m = self.modrm()?;
                (op, width, Some(m.rm_operand(width)), Some(m.reg_operand(width)))
            }
            0x8A | 0x8B => {
                let width = self.w_bit();
                let m = self.modrm()?;
                (Operation::Mov, width, Some(m.reg_operand(width)), Some(m.rm_operand(width)))
            }

            // MOV r/m16, Sreg and MOV Sreg, r/m16
            0x8C | 0x8E => {
                let m = self.modrm()?;
                let seg = match SEGS.get(m.reg as usize) {
                    // Loading CS through MOV is not a documented form
                    Some(SegReg::CS) if opcode == 0x8E => return Err(self.illegal(Some(m.reg))),
                    Some(&seg) => Operand::Seg(seg),
                    None => return Err(self.illegal(Some(m.reg))),
                };
                if opcode == 0x8C {
                    (Operation::Mov, word, Some(m.rm_operand(word)), Some(seg))
                } else {
                    (Operation::Mov, word, Some(seg), Some(m.rm_operand(word)))
                }
            }

            0x8D => {
                let m = self.modrm()?;
                let mem = self.require_memory(&m)?;
                (Operation::Lea, word, Some(m.reg_operand(word)), Some(mem))
            }

            0x8F => {
                let m = self.modrm()?;
                if m.reg != 0 {
                    return Err(self.illegal(Some(m.reg)));
                }
                (Operation::Pop, word, Some(m.rm_operand(word)), None)
            }

            0x90 => (Operation::Nop, word, None, None),
            0x91..=0x97 => (
                Operation::Xchg,
                word,
                Some(Operand::Reg16(Reg16::AX)),
                Some(reg_operand(opcode, word)),
            ),
            0x98 => (Operation::Cbw, word, None, None),
            0x99 => (Operation::Cwd, word, None, None),
            0x9A => {
                let offset = self.cur.next_u16()?;
                let segment = self.cur.next_u16()?;
                (Operation::CallFar, word, Some(Operand::Far { segment, offset }), None)
            }
            0x9B => (Operation::Wait, word, None, None),
            0x9C => (Operation::Pushf, word, None, None),
            0x9D => (Operation::Popf, word, None, None),
            0x9E => (Operation::Sahf, Width::Byte, None, None),
            0x9F => (Operation::Lahf, Width::Byte, None, None),

            // MOV accumulator <-> direct memory
            0xA0..=0xA3 => {
                let width = self.w_bit();
                let addr = self.cur.next_u16()?;
                let mem = Operand::Memory(self.memory_operand(EffectiveAddress::Direct(addr), SegReg::DS));
                let acc = reg_operand(0, width);
                if opcode < 0xA2 {
                    (Operation::Mov, width, Some(acc), Some(mem))
                } else {
                    (Operation::Mov, width, Some(mem), Some(acc))
                }
            }

            0xA4 | 0xA5 => (Operation::Movs, self.w_bit(), None, None),
            0xA6 | 0xA7 => (Operation::Cmps, self.w_bit(), None, None),
            0xA8 | 0xA9 => {
                let width = self.w_bit();
                let imm = self.immediate(width)?;
                (Operation::Test, width, Some(reg_operand(0, width)), Some(imm))
            }
            0xAA | 0xAB => (Operation::Stos, self.w_bit(), None, None),
            0xAC | 0xAD => (Operation::Lods, self.w_bit(), None, None),
            0xAE | 0xAF => (Operation::Scas, self.w_bit(), None, None),

            0xB0..=0xB7 => {
                let imm = Operand::Imm8(self.cur.next_u8()?);
                (Operation::Mov, Width::Byte, Some(reg_operand(opcode, Width::Byte)), Some(imm))
            }
            0xB8..=0xBF => {
                let imm = Operand::Imm16(self.cur.next_u16()?);
                (Operation::Mov, word, Some(reg_operand(opcode, word)), Some(imm))
            }

            0xC2 => {
                let imm = Operand::Imm16(self.cur.next_u16()?);
                (Operation::Ret, word, None, Some(imm))
            }
            0xC3 => (Operation::Ret, word, None, None),
            0xC4 | 0xC5 => {
                let op = if opcode == 0xC4 { Operation::Les } else { Operation::Lds };
                let m = self.modrm()?;
                let mem = self.require_memory(&m)?;
                (op, word, Some(m.reg_operand(word)), Some(mem))
            }
            0xC6 | 0xC7 => {
                let width = self.w_bit();
                let m = self.modrm()?;
                if m.reg != 0 {
                    return Err(self.illegal(Some(m.reg)));
                }
                let imm = self.immediate(width)?;
                (Operation::Mov, width, Some(m.rm_operand(width)), Some(imm))
            }
            0xCA => {
                let imm = Operand::Imm16(self.cur.next_u16()?);
                (Operation::RetFar, word, None, Some(imm))
            }
            0xCB => (Operation::RetFar, word, None, None),
            0xCC => (Operation::Int, word, None, Some(Operand::Imm8(3))),
            0xCD => {
                let vector = Operand::Imm8(self.cur.next_u8()?);
                (Operation::Int, word, None, Some(vector))
            }
            0xCE => (Operation::Into, word, None, None),
            0xCF => (Operation::Iret, word, None, None),

            // Group 2: shifts and rotates by 1 or by CL
            0xD0..=0xD3 => {
                let width = self.w_bit();
                let m = self.modrm()?;
                let op = SHIFT_OPS[m.reg as usize].ok_or_else(|| self.illegal(Some(m.reg)))?;
                let count = if opcode < 0xD2 {
                    Operand::Imm8(1)
                } else {
                    Operand::Reg8(Reg8::CL)
                };
                (op, width, Some(m.rm_operand(width)), Some(count))
            }
            0xD4 => {
                let base = Operand::Imm8(self.cur.next_u8()?);
                (Operation::Aam, Width::Byte, None, Some(base))
            }
            0xD5 => {
                let base = Operand::Imm8(self.cur.next_u8()?);
                (Operation::Aad, Width::Byte, None, Some(base))
            }
            0xD7 => {
                let table = self.memory_operand(
                    EffectiveAddress::Indirect {
                        base: Reg16::BX,
                        disp: Displacement::None,
                    },
                    SegReg::DS,
                );
                (Operation::Xlat, Width::Byte, None, Some(Operand::Memory(table)))
            }
            0xD8..=0xDF => {
                let m = self.modrm()?;
                (Operation::Esc, word, None, Some(m.rm_operand(word)))
            }

            0xE0 => (Operation::Loopne, word, self.rel8()?, None),
            0xE1 => (Operation::Loope, word, self.rel8()?, None),
            0xE2 => (Operation::Loop, word, self.rel8()?, None),
            0xE3 => (Operation::Jcxz, word, self.rel8()?, None),

            // Port I/O with immediate port
            0xE4..=0xE7 => {
                let width = self.w_bit();
                let port = Operand::Imm8(self.cur.next_u8()?);
                let acc = reg_operand(0, width);
                if opcode < 0xE6 {
                    (Operation::In, width, Some(acc), Some(port))
                } else {
                    (Operation::Out, width, Some(port), Some(acc))
                }
            }
            0xE8 => (Operation::Call, word, self.rel16()?, None),
            0xE9 => (Operation::Jmp, word, self.rel16()?, None),
            0xEA => {
                let offset = self.cur.next_u16()?;
                let segment = self.cur.next_u16()?;
                (Operation::JmpFar, word, Some(Operand::Far { segment, offset }), None)
            }
            0xEB => (Operation::Jmp, word, self.rel8()?, None),
            // Port I/O through DX
            0xEC..=0xEF => {
                let width = self.w_bit();
                let port = Operand::Reg16(Reg16::DX);
                let acc = reg_operand(0, width);
                if opcode < 0xEE {
                    (Operation::In, width, Some(acc), Some(port))
                } else {
                    (Operation::Out, width, Some(port), Some(acc))
                }
            }

            0xF4 => (Operation::Hlt, word, None, None),
            0xF5 => (Operation::Cmc, word, None, None),

            // Group 3: TEST NOT NEG MUL IMUL DIV IDIV; slot 1 is undocumented
            0xF6 | 0xF7 => {
                let width = self.w_bit();
                let m = self.modrm()?;
                let rm = Some(m.rm_operand(width));
                match m.reg {
                    0 => {
                        let imm = self.immediate(width)?;
                        (Operation::Test, width, rm, Some(imm))
                    }
                    2 => (Operation::Not, width, rm, None),
                    3 => (Operation::Neg, width, rm, None),
                    4 => (Operation::Mul, width, None, rm),
                    5 => (Operation::Imul, width, None, rm),
                    6 => (Operation::Div, width, None, rm),
                    7 => (Operation::Idiv, width, None, rm),
                    ext => return Err(self.illegal(Some(ext))),
                }
            }

            0xF8 => (Operation::Clc, word, None, None),
            0xF9 => (Operation::Stc, word, None, None),
            0xFA => (Operation::Cli, word, None, None),
            0xFB => (Operation::Sti, word, None, None),
            0xFC => (Operation::Cld, word, None, None),
            0xFD => (Operation::Std, word, None, None),

            // Group 4: INC/DEC r/m8
            0xFE => {
                let m = self.modrm()?;
                let rm = Some(m.rm_operand(Width::Byte));
                match m.reg {
                    0 => (Operation::Inc, Width::Byte, rm, None),
                    1 => (Operation::Dec, Width::Byte, rm, None),
                    ext => return Err(self.illegal(Some(ext))),
                }
            }

            // Group 5: INC DEC CALL CALLF JMP JMPF PUSH on r/m16
            0xFF => {
                let m = self.modrm()?;
                let rm = Some(m.rm_operand(word));
                match m.reg {
                    0 => (Operation::Inc, word, rm, None),
                    1 => (Operation::Dec, word, rm, None),
                    2 => (Operation::Call, word, rm, None),
                    3 => (Operation::CallFar, word, Some(self.require_memory(&m)?), None),
                    4 => (Operation::Jmp, word, rm, None),
                    5 => (Operation::JmpFar, word, Some(self.require_memory(&m)?), None),
                    6 => (Operation::Push, word, None, rm),
                    ext => return Err(self.illegal(Some(ext))),
                }
            }

            // 0x0F, 0x60-0x6F, 0xC0, 0xC1, 0xC8, 0xC9, 0xD6, 0xF1
            _ => return Err(self.illegal(None)),
        };

        Ok(decoded)
    }
}

fn indirect(base: Reg16, disp: Displacement) -> EffectiveAddress {
    EffectiveAddress::Indirect { base, disp }
}

fn base_index(base: Reg16, index: Reg16, disp: Displacement) -> EffectiveAddress {
    EffectiveAddress::BaseIndex { base, index, disp }
}
