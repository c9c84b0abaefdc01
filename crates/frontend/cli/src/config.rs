use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use emu8086_core::CpuConfig;
use emu8086_dos::DEFAULT_LOAD_SEGMENT;
use serde::{Deserialize, Serialize};

/// Step budget when neither the config file nor `--max-steps` sets one
pub const DEFAULT_MAX_STEPS: u64 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    pub cpu: CpuConfig,
    pub load_segment: u16,
    pub max_steps: u64,
    /// Log every executed instruction
    pub trace: bool,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            cpu: CpuConfig::default(),
            load_segment: DEFAULT_LOAD_SEGMENT,
            max_steps: DEFAULT_MAX_STEPS,
            trace: false,
        }
    }
}

impl EmulatorConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_json(&contents).with_context(|| format!("parsing config {}", path.display()))
    }
}
