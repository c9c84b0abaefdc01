//! 8086 register file
//!
//! General registers, segment registers, IP and the packed FLAGS word.
//! AX/BX/CX/DX are also addressable through their 8-bit halves.

use std::fmt;
use std::str::FromStr;

use crate::error::CpuError;
use crate::memory::Memory8086;

// Flag bit positions in FLAGS register
pub const FLAG_CF: u16 = 0x0001; // Carry
pub const FLAG_PF: u16 = 0x0004; // Parity
pub const FLAG_AF: u16 = 0x0010; // Auxiliary carry
pub const FLAG_ZF: u16 = 0x0040; // Zero
pub const FLAG_SF: u16 = 0x0080; // Sign
pub const FLAG_TF: u16 = 0x0100; // Trap
pub const FLAG_IF: u16 = 0x0200; // Interrupt enable
pub const FLAG_DF: u16 = 0x0400; // Direction
pub const FLAG_OF: u16 = 0x0800; // Overflow

/// Bits an 8086 always reads as 1 (bit 1 and bits 12-15)
pub const FLAGS_FIXED_ONES: u16 = 0xF002;

/// Bits software can change
pub const FLAGS_WRITABLE: u16 =
    FLAG_CF | FLAG_PF | FLAG_AF | FLAG_ZF | FLAG_SF | FLAG_TF | FLAG_IF | FLAG_DF | FLAG_OF;

/// 8-bit register, in ModR/M encoding order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg8 {
    AL,
    CL,
    DL,
    BL,
    AH,
    CH,
    DH,
    BH,
}

impl Reg8 {
    const ALL: [Reg8; 8] = [
        Reg8::AL,
        Reg8::CL,
        Reg8::DL,
        Reg8::BL,
        Reg8::AH,
        Reg8::CH,
        Reg8::DH,
        Reg8::BH,
    ];

    pub fn from_index(index: u8) -> Result<Self, CpuError> {
        Self::ALL
            .get(index as usize)
            .copied()
            .ok_or_else(|| CpuError::InvalidRegister(format!("8-bit register index {}", index)))
    }

    /// The 16-bit register this half belongs to
    pub fn parent(self) -> Reg16 {
        match self {
            Reg8::AL | Reg8::AH => Reg16::AX,
            Reg8::CL | Reg8::CH => Reg16::CX,
            Reg8::DL | Reg8::DH => Reg16::DX,
            Reg8::BL | Reg8::BH => Reg16::BX,
        }
    }

    pub fn is_high(self) -> bool {
        matches!(self, Reg8::AH | Reg8::CH | Reg8::DH | Reg8::BH)
    }

    pub fn name(self) -> &'static str {
        match self {
            Reg8::AL => "AL",
            Reg8::CL => "CL",
            Reg8::DL => "DL",
            Reg8::BL => "BL",
            Reg8::AH => "AH",
            Reg8::CH => "CH",
            Reg8::DH => "DH",
            Reg8::BH => "BH",
        }
    }
}

/// 16-bit general register, in ModR/M encoding order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg16 {
    AX,
    CX,
    DX,
    BX,
    SP,
    BP,
    SI,
    DI,
}

impl Reg16 {
    const ALL: [Reg16; 8] = [
        Reg16::AX,
        Reg16::CX,
        Reg16::DX,
        Reg16::BX,
        Reg16::SP,
        Reg16::BP,
        Reg16::SI,
        Reg16::DI,
    ];

    pub fn from_index(index: u8) -> Result<Self, CpuError> {
        Self::ALL
            .get(index as usize)
            .copied()
            .ok_or_else(|| CpuError::InvalidRegister(format!("16-bit register index {}", index)))
    }

    pub fn name(self) -> &'static str {
        match self {
            Reg16::AX => "AX",
            Reg16::CX => "CX",
            Reg16::DX => "DX",
            Reg16::BX => "BX",
            Reg16::SP => "SP",
            Reg16::BP => "BP",
            Reg16::SI => "SI",
            Reg16::DI => "DI",
        }
    }
}

/// Segment register, in ModR/M `sreg` encoding order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegReg {
    ES,
    CS,
    SS,
    DS,
}

impl SegReg {
    const ALL: [SegReg; 4] = [SegReg::ES, SegReg::CS, SegReg::SS, SegReg::DS];

    pub fn from_index(index: u8) -> Result<Self, CpuError> {
        Self::ALL
            .get(index as usize)
            .copied()
            .ok_or_else(|| CpuError::InvalidRegister(format!("segment register index {}", index)))
    }

    pub fn name(self) -> &'static str {
        match self {
            SegReg::ES => "ES",
            SegReg::CS => "CS",
            SegReg::SS => "SS",
            SegReg::DS => "DS",
        }
    }
}

/// Individually addressable flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    CF,
    PF,
    AF,
    ZF,
    SF,
    TF,
    IF,
    DF,
    OF,
}

impl Flag {
    pub const ALL: [Flag; 9] = [
        Flag::CF,
        Flag::PF,
        Flag::AF,
        Flag::ZF,
        Flag::SF,
        Flag::TF,
        Flag::IF,
        Flag::DF,
        Flag::OF,
    ];

    pub fn mask(self) -> u16 {
        match self {
            Flag::CF => FLAG_CF,
            Flag::PF => FLAG_PF,
            Flag::AF => FLAG_AF,
            Flag::ZF => FLAG_ZF,
            Flag::SF => FLAG_SF,
            Flag::TF => FLAG_TF,
            Flag::IF => FLAG_IF,
            Flag::DF => FLAG_DF,
            Flag::OF => FLAG_OF,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Flag::CF => "CF",
            Flag::PF => "PF",
            Flag::AF => "AF",
            Flag::ZF => "ZF",
            Flag::SF => "SF",
            Flag::TF => "TF",
            Flag::IF => "IF",
            Flag::DF => "DF",
            Flag::OF => "OF",
        }
    }
}

macro_rules! impl_name_parsing {
    ($ty:ident, $what:literal) => {
        impl FromStr for $ty {
            type Err = CpuError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let upper = s.trim().to_ascii_uppercase();
                $ty::ALL
                    .iter()
                    .copied()
                    .find(|r| r.name() == upper)
                    .ok_or_else(|| CpuError::InvalidRegister(format!("{} {:?}", $what, s)))
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

impl_name_parsing!(Reg8, "8-bit register");
impl_name_parsing!(Reg16, "16-bit register");
impl_name_parsing!(SegReg, "segment register");
impl_name_parsing!(Flag, "flag");

/// Complete register state of one CPU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterFile {
    pub ax: u16,
    pub bx: u16,
    pub cx: u16,
    pub dx: u16,
    pub sp: u16,
    pub bp: u16,
    pub si: u16,
    pub di: u16,
    pub cs: u16,
    pub ds: u16,
    pub ss: u16,
    pub es: u16,
    pub ip: u16,
    /// Always holds `FLAGS_FIXED_ONES` and no bit outside `FLAGS_WRITABLE`
    flags: u16,
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterFile {
    /// All registers zero, flags at their reset value
    pub fn new() -> Self {
        Self {
            ax: 0,
            bx: 0,
            cx: 0,
            dx: 0,
            sp: 0,
            bp: 0,
            si: 0,
            di: 0,
            cs: 0,
            ds: 0,
            ss: 0,
            es: 0,
            ip: 0,
            flags: FLAGS_FIXED_ONES,
        }
    }

    #[inline]
    pub fn get16(&self, reg: Reg16) -> u16 {
        match reg {
            Reg16::AX => self.ax,
            Reg16::CX => self.cx,
            Reg16::DX => self.dx,
            Reg16::BX => self.bx,
            Reg16::SP => self.sp,
            Reg16::BP => self.bp,
            Reg16::SI => self.si,
            Reg16::DI => self.di,
        }
    }

    #[inline]
    pub fn set16(&mut self, reg: Reg16, val: u16) {
        match reg {
            Reg16::AX => self.ax = val,
            Reg16::CX => self.cx = val,
            Reg16::DX => self.dx = val,
            Reg16::BX => self.bx = val,
            Reg16::SP => self.sp = val,
            Reg16::BP => self.bp = val,
            Reg16::SI => self.si = val,
            Reg16::DI => self.di = val,
        }
    }

    #[inline]
    pub fn get8(&self, reg: Reg8) -> u8 {
        let word = self.get16(reg.parent());
        if reg.is_high() {
            (word >> 8) as u8
        } else {
            (word & 0xFF) as u8
        }
    }

    /// Write one half, leaving the other half of the parent untouched
    #[inline]
    pub fn set8(&mut self, reg: Reg8, val: u8) {
        let parent = reg.parent();
        let word = self.get16(parent);
        let merged = if reg.is_high() {
            (word & 0x00FF) | ((val as u16) << 8)
        } else {
            (word & 0xFF00) | val as u16
        };
        self.set16(parent, merged);
    }

    #[inline]
    pub fn get_seg(&self, seg: SegReg) -> u16 {
        match seg {
            SegReg::ES => self.es,
            SegReg::CS => self.cs,
            SegReg::SS => self.ss,
            SegReg::DS => self.ds,
        }
    }

    #[inline]
    pub fn set_seg(&mut self, seg: SegReg, val: u16) {
        match seg {
            SegReg::ES => self.es = val,
            SegReg::CS => self.cs = val,
            SegReg::SS => self.ss = val,
            SegReg::DS => self.ds = val,
        }
    }

    #[inline]
    pub fn get_flag(&self, flag: Flag) -> bool {
        self.flags & flag.mask() != 0
    }

    #[inline]
    pub fn set_flag(&mut self, flag: Flag, value: bool) {
        if value {
            self.flags |= flag.mask();
        } else {
            self.flags &= !flag.mask();
        }
    }

    /// Packed FLAGS word as PUSHF would store it
    #[inline]
    pub fn flags(&self) -> u16 {
        self.flags
    }

    /// Load the packed FLAGS word; reserved bits keep their fixed values
    #[inline]
    pub fn set_flags(&mut self, val: u16) {
        self.flags = (val & FLAGS_WRITABLE) | FLAGS_FIXED_ONES;
    }

    /// Physical address of `seg:offset` as `memory` translates it
    #[inline]
    pub fn effective_address<M: Memory8086 + ?Sized>(
        &self,
        memory: &M,
        seg: SegReg,
        offset: u16,
    ) -> u32 {
        memory.physical_address(self.get_seg(seg), offset)
    }

    /// Read a 16-bit register by name: general, segment, `IP` or `FLAGS`
    pub fn get16_named(&self, name: &str) -> Result<u16, CpuError> {
        if let Ok(reg) = name.parse::<Reg16>() {
            return Ok(self.get16(reg));
        }
        if let Ok(seg) = name.parse::<SegReg>() {
            return Ok(self.get_seg(seg));
        }
        match name.trim().to_ascii_uppercase().as_str() {
            "IP" => Ok(self.ip),
            "FLAGS" => Ok(self.flags),
            _ => Err(CpuError::InvalidRegister(name.to_string())),
        }
    }

    /// Write a 16-bit register by name: general, segment, `IP` or `FLAGS`
    pub fn set16_named(&mut self, name: &str, val: u16) -> Result<(), CpuError> {
        if let Ok(reg) = name.parse::<Reg16>() {
            self.set16(reg, val);
            return Ok(());
        }
        if let Ok(seg) = name.parse::<SegReg>() {
            self.set_seg(seg, val);
            return Ok(());
        }
        match name.trim().to_ascii_uppercase().as_str() {
            "IP" => self.ip = val,
            "FLAGS" => self.set_flags(val),
            _ => return Err(CpuError::InvalidRegister(name.to_string())),
        }
        Ok(())
    }

    pub fn get8_named(&self, name: &str) -> Result<u8, CpuError> {
        Ok(self.get8(name.parse()?))
    }

    pub fn set8_named(&mut self, name: &str, val: u8) -> Result<(), CpuError> {
        self.set8(name.parse()?, val);
        Ok(())
    }

    pub fn get_flag_named(&self, name: &str) -> Result<bool, CpuError> {
        Ok(self.get_flag(name.parse()?))
    }

    pub fn set_flag_named(&mut self, name: &str, value: bool) -> Result<(), CpuError> {
        self.set_flag(name.parse()?, value);
        Ok(())
    }
}
