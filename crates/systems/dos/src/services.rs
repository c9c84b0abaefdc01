//! DOS and BIOS console services
//!
//! Enough of INT 21h and INT 10h for flat `.com` programs that talk to the
//! console and exit. Console bytes go to an in-memory buffer; input comes
//! from a queue the driver fills.

use std::collections::VecDeque;

use emu8086_core::logging::{log, LogCategory, LogLevel};
use emu8086_core::{
    CpuError, CpuState, Flag, InterruptAction, InterruptHandler, Memory8086, Reg8,
};

/// Byte returned by the input services once the queue is empty (Ctrl-Z)
pub const END_OF_INPUT: u8 = 0x1A;

/// Version reported by INT 21h AH=30h (major, minor)
pub const DOS_VERSION: (u8, u8) = (5, 0);

/// Longest `$`-terminated string AH=09h will print
const MAX_STRING_LEN: u32 = 0x10000;

#[derive(Debug, Clone, Default)]
pub struct DosServices {
    output: Vec<u8>,
    input: VecDeque<u8>,
}

impl DosServices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Console output produced so far
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Drain the console output buffer
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }

    /// Queue bytes for the console input services
    pub fn push_input(&mut self, bytes: &[u8]) {
        self.input.extend(bytes);
    }

    pub fn pending_input(&self) -> usize {
        self.input.len()
    }

    /// Drop buffered output and pending input
    pub fn clear(&mut self) {
        self.output.clear();
        self.input.clear();
    }

    fn put(&mut self, byte: u8) {
        self.output.push(byte);
    }

    fn read_input(&mut self) -> u8 {
        self.input.pop_front().unwrap_or(END_OF_INPUT)
    }

    fn dos<M: Memory8086>(&mut self, state: &mut CpuState<M>) -> Result<InterruptAction, CpuError> {
        let ah = state.regs.get8(Reg8::AH);
        match ah {
            // Read character with echo
            0x01 => {
                let ch = self.read_input();
                self.put(ch);
                state.regs.set8(Reg8::AL, ch);
            }
            // Display character in DL
            0x02 => {
                let ch = state.regs.get8(Reg8::DL);
                self.put(ch);
                state.regs.set8(Reg8::AL, ch);
            }
            // Direct console I/O: DL=FFh reads, anything else writes
            0x06 => {
                let dl = state.regs.get8(Reg8::DL);
                if dl == 0xFF {
                    match self.input.pop_front() {
                        Some(ch) => {
                            state.regs.set8(Reg8::AL, ch);
                            state.regs.set_flag(Flag::ZF, false);
                        }
                        None => {
                            state.regs.set8(Reg8::AL, 0);
                            state.regs.set_flag(Flag::ZF, true);
                        }
                    }
                } else {
                    self.put(dl);
                    state.regs.set8(Reg8::AL, dl);
                }
            }
            // Read character without echo
            0x08 => {
                let ch = self.read_input();
                state.regs.set8(Reg8::AL, ch);
            }
            // Display string at DS:DX up to '$'
            0x09 => {
                let (ds, mut offset) = (state.regs.ds, state.regs.dx);
                for _ in 0..MAX_STRING_LEN {
                    let ch = state.read_byte(ds, offset)?;
                    if ch == b'$' {
                        break;
                    }
                    self.put(ch);
                    offset = offset.wrapping_add(1);
                }
                state.regs.set8(Reg8::AL, b'$');
            }
            0x30 => {
                let (major, minor) = DOS_VERSION;
                state.regs.set8(Reg8::AL, major);
                state.regs.set8(Reg8::AH, minor);
                state.regs.bx = 0;
                state.regs.cx = 0;
            }
            0x4C => {
                return Ok(InterruptAction::Terminate {
                    exit_code: state.regs.get8(Reg8::AL),
                })
            }
            _ => {
                log(LogCategory::Dos, LogLevel::Warn, || {
                    format!(
                        "[DOS] unhandled INT 21h AH={:02X}h at {:04X}:{:04X}",
                        ah, state.regs.cs, state.regs.ip
                    )
                });
                return Ok(InterruptAction::Unhandled);
            }
        }

        log(LogCategory::Dos, LogLevel::Trace, || {
            format!("[DOS] INT 21h AH={:02X}h", ah)
        });
        Ok(InterruptAction::Handled)
    }

    fn video<M: Memory8086>(&mut self, state: &mut CpuState<M>) -> InterruptAction {
        let ah = state.regs.get8(Reg8::AH);
        match ah {
            // Teletype output
            0x0E => {
                self.put(state.regs.get8(Reg8::AL));
                InterruptAction::Handled
            }
            _ => {
                log(LogCategory::Dos, LogLevel::Warn, || {
                    format!("[DOS] unhandled INT 10h AH={:02X}h", ah)
                });
                InterruptAction::Unhandled
            }
        }
    }
}

impl<M: Memory8086> InterruptHandler<M> for DosServices {
    fn handle(&mut self, vector: u8, state: &mut CpuState<M>) -> Result<InterruptAction, CpuError> {
        match vector {
            0x20 => Ok(InterruptAction::Terminate { exit_code: 0 }),
            0x21 => self.dos(state),
            0x10 => Ok(self.video(state)),
            _ => Ok(InterruptAction::Unhandled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emu8086_core::ArrayMemory;

    fn state() -> CpuState<ArrayMemory> {
        let mut state = CpuState::new(ArrayMemory::new());
        state.regs.cs = 0x0700;
        state.regs.ds = 0x0700;
        state.regs.ip = 0x0102;
        state
    }

    fn call(services: &mut DosServices, state: &mut CpuState<ArrayMemory>, vector: u8) -> InterruptAction {
        services.handle(vector, state).unwrap()
    }

    #[test]
    fn test_write_character() {
        let mut services = DosServices::new();
        let mut state = state();
        state.regs.ax = 0x0200;
        state.regs.dx = b'A' as u16;

        assert_eq!(call(&mut services, &mut state, 0x21), InterruptAction::Handled);
        assert_eq!(services.output(), b"A");
        assert_eq!(state.regs.get8(Reg8::AL), b'A');
    }

    #[test]
    fn test_write_dollar_string() {
        let mut services = DosServices::new();
        let mut state = state();
        state.regs.ax = 0x0900;
        state.regs.dx = 0x0200;
        state
            .memory
            .load_program(0x7200, b"Hello, World!\r\n$ignored")
            .unwrap();

        call(&mut services, &mut state, 0x21);
        assert_eq!(services.take_output(), b"Hello, World!\r\n".to_vec());
        assert!(services.output().is_empty());
    }

    #[test]
    fn test_read_character_with_and_without_echo() {
        let mut services = DosServices::new();
        let mut state = state();
        services.push_input(b"xy");
        assert_eq!(services.pending_input(), 2);

        state.regs.ax = 0x0100;
        call(&mut services, &mut state, 0x21);
        assert_eq!(state.regs.get8(Reg8::AL), b'x');

        state.regs.ax = 0x0800;
        call(&mut services, &mut state, 0x21);
        assert_eq!(state.regs.get8(Reg8::AL), b'y');
        assert_eq!(services.output(), b"x");

        // Queue exhausted
        assert_eq!(services.pending_input(), 0);
        call(&mut services, &mut state, 0x21);
        assert_eq!(state.regs.get8(Reg8::AL), END_OF_INPUT);

        services.push_input(b"z");
        services.clear();
        assert_eq!(services.pending_input(), 0);
    }

    #[test]
    fn test_direct_console_io() {
        let mut services = DosServices::new();
        let mut state = state();
        state.regs.ax = 0x0600;
        state.regs.dx = 0x00FF;

        call(&mut services, &mut state, 0x21);
        assert!(state.regs.get_flag(Flag::ZF));
        assert_eq!(state.regs.get8(Reg8::AL), 0);

        services.push_input(b"k");
        call(&mut services, &mut state, 0x21);
        assert!(!state.regs.get_flag(Flag::ZF));
        assert_eq!(state.regs.get8(Reg8::AL), b'k');

        state.regs.dx = b'!' as u16;
        call(&mut services, &mut state, 0x21);
        assert_eq!(services.output(), b"!");
    }

    #[test]
    fn test_version_and_exit() {
        let mut services = DosServices::new();
        let mut state = state();
        state.regs.ax = 0x3000;
        state.regs.bx = 0xFFFF;
        call(&mut services, &mut state, 0x21);
        assert_eq!(state.regs.ax, 0x0005);
        assert_eq!(state.regs.bx, 0);

        state.regs.ax = 0x4C07;
        assert_eq!(
            call(&mut services, &mut state, 0x21),
            InterruptAction::Terminate { exit_code: 7 }
        );
        assert_eq!(
            call(&mut services, &mut state, 0x20),
            InterruptAction::Terminate { exit_code: 0 }
        );
    }

    #[test]
    fn test_teletype_output() {
        let mut services = DosServices::new();
        let mut state = state();
        state.regs.ax = 0x0E41;

        assert_eq!(call(&mut services, &mut state, 0x10), InterruptAction::Handled);
        assert_eq!(services.output(), b"A");
    }

    #[test]
    fn test_unknown_services_decline() {
        let mut services = DosServices::new();
        let mut state = state();

        state.regs.ax = 0x3D00;
        assert_eq!(call(&mut services, &mut state, 0x21), InterruptAction::Unhandled);
        state.regs.ax = 0x0000;
        assert_eq!(call(&mut services, &mut state, 0x10), InterruptAction::Unhandled);
        assert_eq!(call(&mut services, &mut state, 0x16), InterruptAction::Unhandled);
    }
}
