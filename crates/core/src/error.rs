//! Fault taxonomy for the 8086 core.
//!
//! Every fault is local to one CPU instance and carries enough context
//! (physical address, opcode) for a driver to report it precisely.

use thiserror::Error;

/// Errors raised by memory, decoder, executor and core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    /// Memory access past the end of the addressable range
    #[error("memory access of {width} byte(s) at 0x{address:05X} exceeds memory size 0x{size:05X}")]
    OutOfBounds { address: u32, width: u8, size: u32 },

    /// Byte sequence that does not match a supported encoding.
    /// `extension` is the ModR/M reg field for group opcodes.
    #[error("illegal opcode 0x{opcode:02X}{ext} at 0x{address:05X}", ext = fmt_extension(.extension))]
    IllegalOpcode {
        opcode: u8,
        extension: Option<u8>,
        address: u32,
    },

    /// Instruction encoding runs past the end of memory
    #[error("instruction at 0x{address:05X} is truncated by the end of memory")]
    Truncated { address: u32 },

    /// Unknown register name or encoding index
    #[error("invalid register: {0}")]
    InvalidRegister(String),

    /// DIV/IDIV with a zero divisor or a quotient that does not fit
    #[error("divide error at 0x{address:05X}")]
    DivideByZero { address: u32 },
}

fn fmt_extension(extension: &Option<u8>) -> String {
    match extension {
        Some(ext) => format!(" /{}", ext),
        None => String::new(),
    }
}

impl CpuError {
    /// Physical address associated with the fault, if any
    pub fn address(&self) -> Option<u32> {
        match self {
            CpuError::OutOfBounds { address, .. }
            | CpuError::IllegalOpcode { address, .. }
            | CpuError::Truncated { address }
            | CpuError::DivideByZero { address } => Some(*address),
            CpuError::InvalidRegister(_) => None,
        }
    }

    /// Short machine-readable name of the fault kind
    pub fn kind(&self) -> &'static str {
        match self {
            CpuError::OutOfBounds { .. } => "OutOfBounds",
            CpuError::IllegalOpcode { .. } => "IllegalOpcode",
            CpuError::Truncated { .. } => "Truncated",
            CpuError::InvalidRegister(_) => "InvalidRegister",
            CpuError::DivideByZero { .. } => "DivideByZero",
        }
    }
}
