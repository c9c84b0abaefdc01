//! DOS `.com` machine built on the 8086 core
//!
//! Loads a flat `.com` image behind a minimal Program Segment Prefix and runs
//! it with the console services in [`DosServices`]. Every interrupt vector
//! points at an IRET stub, so services the machine does not provide return
//! straight to the caller.

pub mod ffi;
mod services;

use emu8086_core::logging::{log, LogCategory, LogLevel};
use emu8086_core::{
    ArrayMemory, CpuConfig, CpuCore, CpuError, CpuStatus, EntryPoint, HaltReason,
    RegisterSnapshot, RunSummary, Width,
};
use serde::Serialize;
use thiserror::Error;

pub use services::{DosServices, DOS_VERSION, END_OF_INPUT};

/// Segment the program (and its PSP) is loaded at by default
pub const DEFAULT_LOAD_SEGMENT: u16 = 0x0700;

/// Offset of the image within its segment; the PSP fills 0000-00FF
pub const COM_ORIGIN: u16 = 0x0100;

/// Largest image that fits between the PSP and the initial stack
pub const MAX_COM_SIZE: usize = 0xFF00;

/// Segment just past conventional memory, stored in the PSP
const MEMORY_TOP_SEGMENT: u16 = 0xA000;

/// Where the shared IRET stub lives
const IRET_STUB_SEGMENT: u16 = 0x0050;

#[derive(Debug, Error)]
pub enum DosError {
    #[error("No executable loaded")]
    NoExecutable,
    #[error("Invalid executable: {0}")]
    InvalidExecutable(String),
    #[error(transparent)]
    Cpu(#[from] CpuError),
}

/// Machine state after a run, for tooling
#[derive(Debug, Clone, Serialize)]
pub struct MachineReport {
    pub registers: RegisterSnapshot,
    pub steps: u64,
    pub cycles: u64,
    pub status: String,
    pub exit_code: Option<u8>,
}

impl MachineReport {
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

pub struct DosMachine {
    core: CpuCore<ArrayMemory, DosServices>,
    segment: u16,
    image: Option<Vec<u8>>,
}

impl Default for DosMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl DosMachine {
    pub fn new() -> Self {
        Self::with_config(CpuConfig::default())
    }

    pub fn with_config(config: CpuConfig) -> Self {
        let memory = ArrayMemory::with_size(config.memory_size);
        Self {
            core: CpuCore::with_handler(memory, config, DosServices::new()),
            segment: DEFAULT_LOAD_SEGMENT,
            image: None,
        }
    }

    /// Segment used by the next `load_com`/`reset`
    pub fn set_load_segment(&mut self, segment: u16) {
        self.segment = segment;
    }

    pub fn load_segment(&self) -> u16 {
        self.segment
    }

    /// Load a `.com` image and prepare it to run
    pub fn load_com(&mut self, image: &[u8]) -> Result<(), DosError> {
        if image.is_empty() {
            return Err(DosError::InvalidExecutable("image is empty".to_string()));
        }
        if image.len() > MAX_COM_SIZE {
            return Err(DosError::InvalidExecutable(format!(
                "{} bytes exceeds the .com limit of {} bytes",
                image.len(),
                MAX_COM_SIZE
            )));
        }

        self.install(image)?;
        self.image = Some(image.to_vec());
        Ok(())
    }

    /// Reload the last image into fresh memory and registers
    pub fn reset(&mut self) -> Result<(), DosError> {
        let image = self.image.take().ok_or(DosError::NoExecutable)?;
        let result = self.install(&image);
        self.image = Some(image);
        result
    }

    pub fn step(&mut self) -> Result<u32, DosError> {
        self.require_image()?;
        Ok(self.core.step()?)
    }

    /// Run until the program exits, halts or faults, or `max_steps` pass
    pub fn run(&mut self, max_steps: u64) -> Result<RunSummary, DosError> {
        self.require_image()?;
        let summary = self.core.run(max_steps)?;
        if !summary.halted {
            log(LogCategory::Dos, LogLevel::Warn, || {
                format!("[DOS] step budget of {} exhausted", max_steps)
            });
        }
        Ok(summary)
    }

    pub fn is_halted(&self) -> bool {
        self.core.is_halted()
    }

    pub fn status(&self) -> &CpuStatus {
        self.core.status()
    }

    pub fn exit_code(&self) -> Option<u8> {
        self.core.exit_code()
    }

    pub fn register_snapshot(&self) -> RegisterSnapshot {
        self.core.register_snapshot()
    }

    pub fn report(&self) -> MachineReport {
        let status = match self.core.status() {
            CpuStatus::Running => "running".to_string(),
            CpuStatus::Halted(HaltReason::HltInstruction) => "halted".to_string(),
            CpuStatus::Halted(HaltReason::Terminated { .. }) => "terminated".to_string(),
            CpuStatus::Halted(HaltReason::Fault(err)) => format!("fault: {}", err),
        };
        MachineReport {
            registers: self.register_snapshot(),
            steps: self.core.steps(),
            cycles: self.core.cycles(),
            status,
            exit_code: self.exit_code(),
        }
    }

    /// Drain console output
    pub fn take_output(&mut self) -> Vec<u8> {
        self.core.interrupts_mut().take_output()
    }

    /// Queue console input
    pub fn push_input(&mut self, bytes: &[u8]) {
        self.core.interrupts_mut().push_input(bytes);
    }

    pub fn core(&self) -> &CpuCore<ArrayMemory, DosServices> {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut CpuCore<ArrayMemory, DosServices> {
        &mut self.core
    }

    fn require_image(&self) -> Result<(), DosError> {
        match self.image {
            Some(_) => Ok(()),
            None => Err(DosError::NoExecutable),
        }
    }

    fn install(&mut self, image: &[u8]) -> Result<(), DosError> {
        let segment = self.segment;
        self.core.memory_mut().clear();
        self.core.interrupts_mut().clear();
        self.install_vector_table()?;

        self.core.load(image, EntryPoint::com(segment))?;

        let state = self.core.state_mut();
        // PSP: INT 20h, top of memory, empty command tail
        state.write_word(segment, 0x0000, 0x20CD)?;
        state.write_word(segment, 0x0002, MEMORY_TOP_SEGMENT)?;
        state.write_at(segment, 0x0080, Width::Byte, 0)?;
        state.write_at(segment, 0x0081, Width::Byte, 0x0D)?;
        // A near RET from the program lands on the INT 20h at PSP:0000
        state.push(0x0000)?;

        log(LogCategory::Dos, LogLevel::Info, || {
            format!(
                "[DOS] loaded {} byte .com at {:04X}:{:04X}",
                image.len(),
                segment,
                COM_ORIGIN
            )
        });
        Ok(())
    }

    fn install_vector_table(&mut self) -> Result<(), DosError> {
        let state = self.core.state_mut();
        state.write_at(IRET_STUB_SEGMENT, 0x0000, Width::Byte, 0xCF)?;
        for vector in 0..=0xFFu16 {
            state.write_word(0, vector * 4, 0x0000)?;
            state.write_word(0, vector * 4 + 2, IRET_STUB_SEGMENT)?;
        }
        Ok(())
    }
}
