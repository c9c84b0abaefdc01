//! Immutable register-state record
//!
//! Serializes to JSON for tooling and renders as the text report drivers
//! print after a run.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::registers::{Flag, RegisterFile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterSnapshot {
    pub ax: u16,
    pub bx: u16,
    pub cx: u16,
    pub dx: u16,
    pub si: u16,
    pub di: u16,
    pub bp: u16,
    pub sp: u16,
    pub cs: u16,
    pub ds: u16,
    pub es: u16,
    pub ss: u16,
    pub ip: u16,
    /// Packed FLAGS word
    pub flags: u16,
    pub cf: bool,
    pub pf: bool,
    pub af: bool,
    pub zf: bool,
    pub sf: bool,
    pub tf: bool,
    #[serde(rename = "if")]
    pub if_: bool,
    pub df: bool,
    pub of: bool,
    pub halted: bool,
}

impl RegisterSnapshot {
    pub fn capture(regs: &RegisterFile, halted: bool) -> Self {
        Self {
            ax: regs.ax,
            bx: regs.bx,
            cx: regs.cx,
            dx: regs.dx,
            si: regs.si,
            di: regs.di,
            bp: regs.bp,
            sp: regs.sp,
            cs: regs.cs,
            ds: regs.ds,
            es: regs.es,
            ss: regs.ss,
            ip: regs.ip,
            flags: regs.flags(),
            cf: regs.get_flag(Flag::CF),
            pf: regs.get_flag(Flag::PF),
            af: regs.get_flag(Flag::AF),
            zf: regs.get_flag(Flag::ZF),
            sf: regs.get_flag(Flag::SF),
            tf: regs.get_flag(Flag::TF),
            if_: regs.get_flag(Flag::IF),
            df: regs.get_flag(Flag::DF),
            of: regs.get_flag(Flag::OF),
            halted,
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Flags in report order: OF DF IF TF SF ZF AF PF CF
    fn report_flags(&self) -> [(&'static str, bool); 9] {
        [
            ("OF", self.of),
            ("DF", self.df),
            ("IF", self.if_),
            ("TF", self.tf),
            ("SF", self.sf),
            ("ZF", self.zf),
            ("AF", self.af),
            ("PF", self.pf),
            ("CF", self.cf),
        ]
    }
}

impl fmt::Display for RegisterSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Register state")?;
        let registers = [
            ("AX", self.ax),
            ("BX", self.bx),
            ("CX", self.cx),
            ("DX", self.dx),
            ("SI", self.si),
            ("DI", self.di),
            ("BP", self.bp),
            ("SP", self.sp),
            ("CS", self.cs),
            ("DS", self.ds),
            ("ES", self.es),
            ("SS", self.ss),
            ("IP", self.ip),
        ];
        for (name, value) in registers {
            writeln!(f, "{}: 0x{:04x}", name, value)?;
        }

        let flags = self.report_flags();
        let border = format!("+{}", "-----+".repeat(flags.len()));
        writeln!(f, "{}", border)?;
        for (name, _) in flags {
            write!(f, "|  {} ", name)?;
        }
        writeln!(f, "|")?;
        for (_, set) in flags {
            write!(f, "|  {}  ", set as u8)?;
        }
        writeln!(f, "|")?;
        writeln!(f, "{}", border)
    }
}
