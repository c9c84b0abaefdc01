//! Intel 8086 emulation core.
//!
//! A driver owns a `CpuCore`, loads a flat image into its memory and steps
//! it in-process:
//!
//! ```rust
//! use emu8086_core::{ArrayMemory, CpuCore, EntryPoint};
//!
//! let mut core = CpuCore::new(ArrayMemory::new());
//! // MOV AX, 5 ; HLT
//! core.load(&[0xB8, 0x05, 0x00, 0xF4], EntryPoint::com(0x0700)).unwrap();
//! core.run(100).unwrap();
//! assert_eq!(core.register_snapshot().ax, 5);
//! ```

pub mod config;
pub mod cpu;
pub mod decoder;
pub mod error;
pub mod executor;
pub mod instruction;
pub mod interrupts;
pub mod logging;
pub mod memory;
pub mod registers;
pub mod snapshot;

pub use config::{CpuConfig, DivideErrorPolicy, IllegalOpcodePolicy};
pub use cpu::{CpuCore, CpuState, CpuStatus, EntryPoint, HaltReason, RunSummary};
pub use decoder::{decode_at, decode_segmented};
pub use error::CpuError;
pub use executor::{execute, ExecResult, StepEffect};
pub use instruction::{Instruction, Operand, Operation};
pub use interrupts::{InterruptAction, InterruptHandler, TerminateHandler};
pub use memory::{ArrayMemory, Memory8086, Width};
pub use registers::{Flag, Reg16, Reg8, RegisterFile, SegReg};
pub use snapshot::RegisterSnapshot;

#[cfg(test)]
mod tests;
