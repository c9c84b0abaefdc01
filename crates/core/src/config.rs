//! CPU configuration
//!
//! Loaded from JSON with serde; every field has a default so a partial
//! file (or `{}`) is valid.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::memory::DEFAULT_MEMORY_SIZE;

/// What the core does when it meets an illegal opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IllegalOpcodePolicy {
    /// Stop with `IllegalOpcode`
    #[default]
    Halt,
    /// Advance IP by one byte and keep going
    Skip,
}

/// What the core does when DIV/IDIV/AAM faults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DivideErrorPolicy {
    /// Stop with `DivideByZero`
    #[default]
    Halt,
    /// Raise interrupt 0 like the hardware
    Interrupt,
}

impl FromStr for IllegalOpcodePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "halt" => Ok(Self::Halt),
            "skip" => Ok(Self::Skip),
            other => Err(format!(
                "unknown illegal-opcode policy '{}' (expected halt or skip)",
                other
            )),
        }
    }
}

impl fmt::Display for IllegalOpcodePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Halt => "halt",
            Self::Skip => "skip",
        })
    }
}

impl FromStr for DivideErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "halt" => Ok(Self::Halt),
            "interrupt" | "int" => Ok(Self::Interrupt),
            other => Err(format!(
                "unknown divide-error policy '{}' (expected halt or interrupt)",
                other
            )),
        }
    }
}

impl fmt::Display for DivideErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Halt => "halt",
            Self::Interrupt => "interrupt",
        })
    }
}

fn default_memory_size() -> u32 {
    DEFAULT_MEMORY_SIZE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuConfig {
    /// Bytes of memory for cores that allocate their own
    #[serde(default = "default_memory_size")]
    pub memory_size: u32,
    #[serde(default)]
    pub illegal_opcode: IllegalOpcodePolicy,
    #[serde(default)]
    pub divide_error: DivideErrorPolicy,
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            memory_size: DEFAULT_MEMORY_SIZE,
            illegal_opcode: IllegalOpcodePolicy::default(),
            divide_error: DivideErrorPolicy::default(),
        }
    }
}

impl CpuConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
