//! Software interrupt and port I/O hooks
//!
//! `INT n` first offers the interrupt to the core's `InterruptHandler`. A
//! handler can service it in Rust, ask the core to terminate, or decline; a
//! declined interrupt vectors through the table at 0000:0000 the way the
//! hardware does.

use crate::cpu::CpuState;
use crate::error::CpuError;
use crate::executor::StepEffect;
use crate::logging::{log, LogCategory, LogLevel};
use crate::memory::{Memory8086, Width};

/// What a handler did with an interrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    /// Serviced; execution continues after the INT instruction
    Handled,
    /// Stop the core with this exit code
    Terminate { exit_code: u8 },
    /// Not serviced; dispatch through the interrupt vector table
    Unhandled,
}

/// Host-side services reachable from guest code.
///
/// Handlers see the state with IP already past the INT instruction and may
/// read or change registers and memory.
pub trait InterruptHandler<M: Memory8086> {
    fn handle(&mut self, vector: u8, state: &mut CpuState<M>) -> Result<InterruptAction, CpuError>;

    /// Value read by IN; an unconnected port floats high
    fn port_in(&mut self, _port: u16, width: Width) -> u16 {
        width.mask() as u16
    }

    /// Value written by OUT
    fn port_out(&mut self, _port: u16, _width: Width, _value: u16) {}
}

/// Default handler: program termination only.
///
/// INT 20h exits with code 0 and INT 21h AH=4Ch exits with the code in AL.
/// Every other interrupt goes through the vector table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TerminateHandler;

impl<M: Memory8086> InterruptHandler<M> for TerminateHandler {
    fn handle(&mut self, vector: u8, state: &mut CpuState<M>) -> Result<InterruptAction, CpuError> {
        let regs = &state.regs;
        Ok(match vector {
            0x20 => InterruptAction::Terminate { exit_code: 0 },
            0x21 if regs.ax >> 8 == 0x4C => InterruptAction::Terminate {
                exit_code: regs.ax as u8,
            },
            _ => InterruptAction::Unhandled,
        })
    }
}

/// Offer `vector` to the handler, falling back to the vector table
pub fn raise_interrupt<M, H>(
    state: &mut CpuState<M>,
    handler: &mut H,
    vector: u8,
) -> Result<StepEffect, CpuError>
where
    M: Memory8086,
    H: InterruptHandler<M> + ?Sized,
{
    match handler.handle(vector, state)? {
        InterruptAction::Handled => Ok(StepEffect::Continue),
        InterruptAction::Terminate { exit_code } => {
            log(LogCategory::Interrupts, LogLevel::Info, || {
                format!("[INT] {:02X}h terminated the program, exit code {}", vector, exit_code)
            });
            Ok(StepEffect::Terminate(exit_code))
        }
        InterruptAction::Unhandled => {
            state.vector_interrupt(vector)?;
            Ok(StepEffect::Continue)
        }
    }
}
