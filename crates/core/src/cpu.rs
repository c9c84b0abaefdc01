//! 8086 CPU core
//!
//! `CpuState` is the architectural state an instruction can touch: the
//! register file and memory. `CpuCore` owns a state plus its interrupt
//! handler and configuration, and drives fetch/decode/execute.
//!
//! Lifecycle: Reset -> Running -> Halted. `reset()` goes back to Running
//! with registers taken from the entry point; memory is kept.

use serde::{Deserialize, Serialize};

use crate::config::{CpuConfig, DivideErrorPolicy, IllegalOpcodePolicy};
use crate::decoder::decode_segmented;
use crate::error::CpuError;
use crate::executor::StepEffect;
use crate::instruction::Instruction;
use crate::interrupts::{raise_interrupt, InterruptHandler, TerminateHandler};
use crate::logging::{log, LogCategory, LogLevel};
use crate::memory::{ArrayMemory, Memory8086, Width};
use crate::registers::{Flag, RegisterFile};
use crate::snapshot::RegisterSnapshot;

/// Cycles charged when an illegal opcode is skipped
const SKIP_CYCLES: u32 = 3;

/// Cycles charged for raising interrupt 0 after a divide error
const DIVIDE_INTERRUPT_CYCLES: u32 = 51;

/// Interrupt vector for divide errors
pub const DIVIDE_ERROR_VECTOR: u8 = 0;

/// Register values applied at reset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntryPoint {
    pub cs: u16,
    pub ip: u16,
    pub ss: u16,
    pub sp: u16,
    #[serde(default)]
    pub ds: u16,
    #[serde(default)]
    pub es: u16,
}

impl EntryPoint {
    /// Code and stack origin; DS and ES start at zero
    pub fn new(cs: u16, ip: u16, ss: u16, sp: u16) -> Self {
        Self {
            cs,
            ip,
            ss,
            sp,
            ds: 0,
            es: 0,
        }
    }

    pub fn with_data_segments(mut self, ds: u16, es: u16) -> Self {
        self.ds = ds;
        self.es = es;
        self
    }

    /// `.com` layout: every segment at `segment`, code at 0x100, stack at
    /// the top of the segment
    pub fn com(segment: u16) -> Self {
        Self::new(segment, 0x0100, segment, 0xFFFE).with_data_segments(segment, segment)
    }

    fn apply(&self, regs: &mut RegisterFile) {
        regs.cs = self.cs;
        regs.ip = self.ip;
        regs.ss = self.ss;
        regs.sp = self.sp;
        regs.ds = self.ds;
        regs.es = self.es;
    }
}

/// Why a core stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltReason {
    /// HLT executed
    HltInstruction,
    /// The program asked to exit through an interrupt service
    Terminated { exit_code: u8 },
    /// A fault the core cannot continue past
    Fault(CpuError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CpuStatus {
    Running,
    Halted(HaltReason),
}

/// Outcome of `CpuCore::run`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Steps executed by this call
    pub steps: u64,
    /// Cycles consumed by this call
    pub cycles: u64,
    pub halted: bool,
}

/// Registers plus memory
#[derive(Debug, Clone)]
pub struct CpuState<M: Memory8086> {
    pub regs: RegisterFile,
    pub memory: M,
}

impl<M: Memory8086> CpuState<M> {
    pub fn new(memory: M) -> Self {
        Self {
            regs: RegisterFile::new(),
            memory,
        }
    }

    #[inline]
    pub fn physical_address(&self, segment: u16, offset: u16) -> u32 {
        self.memory.physical_address(segment, offset)
    }

    /// Physical address of CS:IP
    #[inline]
    pub fn code_address(&self) -> u32 {
        self.physical_address(self.regs.cs, self.regs.ip)
    }

    /// Physical addresses of the low and high byte of a word at
    /// segment:offset. The high byte wraps to offset 0 of the same segment.
    #[inline]
    fn word_addresses(&self, segment: u16, offset: u16) -> (u32, u32) {
        (
            self.physical_address(segment, offset),
            self.physical_address(segment, offset.wrapping_add(1)),
        )
    }

    /// Read a byte or word at segment:offset
    pub fn read_at(&self, segment: u16, offset: u16, width: Width) -> Result<u16, CpuError> {
        let (low, high) = self.word_addresses(segment, offset);
        if width == Width::Byte || high == low.wrapping_add(1) {
            return Ok(self.memory.read(low, width)? as u16);
        }
        let lo = self.memory.read(low, Width::Byte)? as u16;
        let hi = self.memory.read(high, Width::Byte)? as u16;
        Ok((hi << 8) | lo)
    }

    /// Write a byte or word at segment:offset. Nothing is written when
    /// either byte is out of range.
    pub fn write_at(
        &mut self,
        segment: u16,
        offset: u16,
        width: Width,
        value: u16,
    ) -> Result<(), CpuError> {
        let (low, high) = self.word_addresses(segment, offset);
        if width == Width::Byte || high == low.wrapping_add(1) {
            return self.memory.write(low, width, value as u32);
        }
        self.memory.check_range(low, Width::Byte)?;
        self.memory.check_range(high, Width::Byte)?;
        self.memory.write(low, Width::Byte, value as u32)?;
        self.memory.write(high, Width::Byte, (value >> 8) as u32)
    }

    #[inline]
    pub fn read_byte(&self, segment: u16, offset: u16) -> Result<u8, CpuError> {
        Ok(self.read_at(segment, offset, Width::Byte)? as u8)
    }

    #[inline]
    pub fn read_word(&self, segment: u16, offset: u16) -> Result<u16, CpuError> {
        self.read_at(segment, offset, Width::Word)
    }

    #[inline]
    pub fn write_word(&mut self, segment: u16, offset: u16, value: u16) -> Result<(), CpuError> {
        self.write_at(segment, offset, Width::Word, value)
    }

    /// Push a word onto SS:SP
    pub fn push(&mut self, value: u16) -> Result<(), CpuError> {
        let sp = self.regs.sp.wrapping_sub(2);
        self.write_word(self.regs.ss, sp, value)?;
        self.regs.sp = sp;
        Ok(())
    }

    /// Pop a word from SS:SP
    pub fn pop(&mut self) -> Result<u16, CpuError> {
        let value = self.read_word(self.regs.ss, self.regs.sp)?;
        self.regs.sp = self.regs.sp.wrapping_add(2);
        Ok(value)
    }

    /// Enter the handler stored in the interrupt vector table at 0000:vector*4.
    ///
    /// Pushes FLAGS, CS and IP (in that order) and clears IF and TF. IP must
    /// already hold the return address.
    pub fn vector_interrupt(&mut self, vector: u8) -> Result<(), CpuError> {
        let entry = (vector as u16) * 4;
        let new_ip = self.read_word(0, entry)?;
        let new_cs = self.read_word(0, entry.wrapping_add(2))?;

        self.push(self.regs.flags())?;
        self.push(self.regs.cs)?;
        self.push(self.regs.ip)?;
        self.regs.set_flag(Flag::IF, false);
        self.regs.set_flag(Flag::TF, false);

        log(LogCategory::Interrupts, LogLevel::Debug, || {
            format!(
                "[INT] vector {:02X}h -> {:04X}:{:04X}, return {:04X}:{:04X}",
                vector, new_cs, new_ip, self.regs.cs, self.regs.ip
            )
        });

        self.regs.ip = new_ip;
        self.regs.cs = new_cs;
        Ok(())
    }
}

/// Fetch/decode/execute driver for one CPU instance
pub struct CpuCore<M: Memory8086, H: InterruptHandler<M> = TerminateHandler> {
    state: CpuState<M>,
    interrupts: H,
    config: CpuConfig,
    entry: EntryPoint,
    status: CpuStatus,
    steps: u64,
    cycles: u64,
}

impl<M: Memory8086> CpuCore<M, TerminateHandler> {
    pub fn new(memory: M) -> Self {
        Self::with_handler(memory, CpuConfig::default(), TerminateHandler)
    }

    pub fn with_config(memory: M, config: CpuConfig) -> Self {
        Self::with_handler(memory, config, TerminateHandler)
    }
}

impl CpuCore<ArrayMemory, TerminateHandler> {
    /// Core over zeroed memory sized by `config.memory_size`
    pub fn from_config(config: CpuConfig) -> Self {
        let memory = ArrayMemory::with_size(config.memory_size);
        Self::with_config(memory, config)
    }
}

impl<M: Memory8086, H: InterruptHandler<M>> CpuCore<M, H> {
    pub fn with_handler(memory: M, config: CpuConfig, interrupts: H) -> Self {
        let mut core = Self {
            state: CpuState::new(memory),
            interrupts,
            config,
            entry: EntryPoint::default(),
            status: CpuStatus::Running,
            steps: 0,
            cycles: 0,
        };
        core.reset();
        core
    }

    /// Copy `image` to the entry point's CS:IP and reset to it
    pub fn load(&mut self, image: &[u8], entry: EntryPoint) -> Result<(), CpuError> {
        self.state.memory.load_image(image, entry.cs, entry.ip)?;
        self.set_entry_point(entry);
        Ok(())
    }

    /// Replace the entry point and reset to it
    pub fn set_entry_point(&mut self, entry: EntryPoint) {
        self.entry = entry;
        self.reset();
    }

    pub fn entry_point(&self) -> EntryPoint {
        self.entry
    }

    /// Zero every register, apply the entry point and return to Running
    pub fn reset(&mut self) {
        self.state.regs = RegisterFile::new();
        self.entry.apply(&mut self.state.regs);
        self.status = CpuStatus::Running;
        self.steps = 0;
        self.cycles = 0;
        log(LogCategory::Cpu, LogLevel::Debug, || {
            format!(
                "[CPU] reset to {:04X}:{:04X}, stack {:04X}:{:04X}",
                self.entry.cs, self.entry.ip, self.entry.ss, self.entry.sp
            )
        });
    }

    /// Decode the instruction at CS:IP without executing it
    pub fn decode_next(&self) -> Result<Instruction, CpuError> {
        decode_segmented(&self.state.memory, self.state.regs.cs, self.state.regs.ip)
    }

    /// Execute one instruction and return the cycles it took.
    ///
    /// Does nothing and returns 0 once halted. On a fault the registers are
    /// restored to their values before the instruction and the fault is
    /// returned, unless the configured policy recovers from it.
    pub fn step(&mut self) -> Result<u32, CpuError> {
        if self.is_halted() {
            return Ok(0);
        }

        let saved = self.state.regs;
        let instr = match self.decode_next() {
            Ok(instr) => instr,
            Err(err) => return self.recover_decode(err),
        };

        log(LogCategory::Cpu, LogLevel::Trace, || {
            format!("[CPU] {:04X}:{:04X}  {}", saved.cs, saved.ip, instr)
        });

        match self.state.execute(&instr, &mut self.interrupts) {
            Ok(result) => {
                self.steps += 1;
                self.cycles += result.cycles as u64;
                match result.effect {
                    StepEffect::Continue => {}
                    StepEffect::Halt => self.halt(HaltReason::HltInstruction),
                    StepEffect::Terminate(exit_code) => {
                        self.halt(HaltReason::Terminated { exit_code })
                    }
                }
                Ok(result.cycles)
            }
            Err(err) => {
                self.state.regs = saved;
                match err {
                    CpuError::DivideByZero { .. }
                        if self.config.divide_error == DivideErrorPolicy::Interrupt =>
                    {
                        self.raise_divide_error(&instr, err)
                    }
                    err => Err(self.fault(err)),
                }
            }
        }
    }

    /// Step until halted or `max_steps` steps have executed
    pub fn run(&mut self, max_steps: u64) -> Result<RunSummary, CpuError> {
        let start_steps = self.steps;
        let start_cycles = self.cycles;

        while !self.is_halted() && self.steps - start_steps < max_steps {
            self.step()?;
        }

        Ok(RunSummary {
            steps: self.steps - start_steps,
            cycles: self.cycles - start_cycles,
            halted: self.is_halted(),
        })
    }

    #[inline]
    pub fn is_halted(&self) -> bool {
        matches!(self.status, CpuStatus::Halted(_))
    }

    pub fn status(&self) -> &CpuStatus {
        &self.status
    }

    /// Exit code when the program terminated itself
    pub fn exit_code(&self) -> Option<u8> {
        match self.status {
            CpuStatus::Halted(HaltReason::Terminated { exit_code }) => Some(exit_code),
            _ => None,
        }
    }

    pub fn register_snapshot(&self) -> RegisterSnapshot {
        RegisterSnapshot::capture(&self.state.regs, self.is_halted())
    }

    /// Instructions executed since the last reset
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Approximate cycles consumed since the last reset
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.state.regs
    }

    pub fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.state.regs
    }

    pub fn memory(&self) -> &M {
        &self.state.memory
    }

    pub fn memory_mut(&mut self) -> &mut M {
        &mut self.state.memory
    }

    pub fn state(&self) -> &CpuState<M> {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut CpuState<M> {
        &mut self.state
    }

    pub fn interrupts(&self) -> &H {
        &self.interrupts
    }

    pub fn interrupts_mut(&mut self) -> &mut H {
        &mut self.interrupts
    }

    pub fn config(&self) -> &CpuConfig {
        &self.config
    }

    fn recover_decode(&mut self, err: CpuError) -> Result<u32, CpuError> {
        match err {
            CpuError::IllegalOpcode { .. }
                if self.config.illegal_opcode == IllegalOpcodePolicy::Skip =>
            {
                log(LogCategory::Cpu, LogLevel::Warn, || {
                    format!("[CPU] skipping {}", err)
                });
                let regs = &mut self.state.regs;
                regs.ip = regs.ip.wrapping_add(1);
                self.steps += 1;
                self.cycles += SKIP_CYCLES as u64;
                Ok(SKIP_CYCLES)
            }
            err => Err(self.fault(err)),
        }
    }

    /// Resume after the faulting instruction through interrupt 0
    fn raise_divide_error(&mut self, instr: &Instruction, err: CpuError) -> Result<u32, CpuError> {
        log(LogCategory::Cpu, LogLevel::Debug, || {
            format!("[CPU] {}, raising INT 0", err)
        });

        let saved = self.state.regs;
        let regs = &mut self.state.regs;
        regs.ip = regs.ip.wrapping_add(instr.length as u16);

        match raise_interrupt(&mut self.state, &mut self.interrupts, DIVIDE_ERROR_VECTOR) {
            Ok(effect) => {
                self.steps += 1;
                self.cycles += DIVIDE_INTERRUPT_CYCLES as u64;
                if let StepEffect::Terminate(exit_code) = effect {
                    self.halt(HaltReason::Terminated { exit_code });
                }
                Ok(DIVIDE_INTERRUPT_CYCLES)
            }
            Err(fault) => {
                self.state.regs = saved;
                Err(self.fault(fault))
            }
        }
    }

    fn fault(&mut self, err: CpuError) -> CpuError {
        log(LogCategory::Cpu, LogLevel::Error, || {
            format!(
                "[CPU] halted at {:04X}:{:04X}: {}",
                self.state.regs.cs, self.state.regs.ip, err
            )
        });
        self.status = CpuStatus::Halted(HaltReason::Fault(err.clone()));
        err
    }

    fn halt(&mut self, reason: HaltReason) {
        log(LogCategory::Cpu, LogLevel::Debug, || {
            format!(
                "[CPU] halted at {:04X}:{:04X} after {} steps: {:?}",
                self.state.regs.cs, self.state.regs.ip, self.steps, reason
            )
        });
        self.status = CpuStatus::Halted(reason);
    }
}
