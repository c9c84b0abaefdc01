mod config;

use std::fs::{self, File};
use std::io::{self, IsTerminal, Read, Write};
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use emu8086_core::logging::{LogCategory, LogConfig, LogLevel};
use emu8086_core::{CpuStatus, DivideErrorPolicy, HaltReason, IllegalOpcodePolicy};
use emu8086_dos::{DosError, DosMachine};
use log::{info, warn};

use config::EmulatorConfig;

/// Exit status when the core stops on a fault
const FAULT_EXIT_CODE: i32 = 1;

/// Exit status when the step budget runs out first
const BUDGET_EXIT_CODE: i32 = 2;

#[derive(Parser)]
#[command(name = "emu8086", about = "Run a DOS .com image on an emulated 8086")]
struct Args {
    /// Path to the .com image
    image: PathBuf,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Load segment, decimal or 0x-prefixed hex
    #[arg(long, value_parser = parse_u16)]
    segment: Option<u16>,

    /// Maximum instructions to execute
    #[arg(long)]
    max_steps: Option<u64>,

    /// Illegal opcode policy: halt or skip
    #[arg(long)]
    illegal_opcode: Option<IllegalOpcodePolicy>,

    /// Divide error policy: halt or interrupt
    #[arg(long)]
    divide_error: Option<DivideErrorPolicy>,

    /// Log every executed instruction
    #[arg(long, default_value_t = false)]
    trace: bool,

    /// Global core log level (off, error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<LogLevel>,

    /// Log level for CPU stepping
    #[arg(long)]
    log_cpu: Option<LogLevel>,

    /// Write core logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Dump the final machine state to this file as JSON
    #[arg(long)]
    state: Option<PathBuf>,

    /// Suppress the register report
    #[arg(long, default_value_t = false)]
    quiet: bool,
}

impl Args {
    /// Command-line flags override the config file
    fn apply(&self, config: &mut EmulatorConfig) {
        if let Some(segment) = self.segment {
            config.load_segment = segment;
        }
        if let Some(max_steps) = self.max_steps {
            config.max_steps = max_steps;
        }
        if let Some(policy) = self.illegal_opcode {
            config.cpu.illegal_opcode = policy;
        }
        if let Some(policy) = self.divide_error {
            config.cpu.divide_error = policy;
        }
        config.trace |= self.trace;
    }
}

fn parse_u16(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid segment '{}': {}", s, e))
}

fn configure_logging(args: &Args, config: &EmulatorConfig) -> Result<()> {
    let log_config = LogConfig::global();
    if let Some(level) = args.log_level {
        log_config.set_global_level(level);
    }
    if let Some(level) = args.log_cpu {
        log_config.set_level(LogCategory::Cpu, level);
    }
    if config.trace {
        log_config.set_level(LogCategory::Cpu, LogLevel::Trace);
    }
    if let Some(path) = &args.log_file {
        log_config
            .set_log_file(path.clone())
            .with_context(|| format!("opening log file {}", path.display()))?;
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => EmulatorConfig::load(path)?,
        None => EmulatorConfig::default(),
    };
    args.apply(&mut config);
    configure_logging(&args, &config)?;

    let image = fs::read(&args.image)
        .with_context(|| format!("reading image {}", args.image.display()))?;

    let mut machine = DosMachine::with_config(config.cpu);
    machine.set_load_segment(config.load_segment);
    machine
        .load_com(&image)
        .with_context(|| format!("loading {}", args.image.display()))?;
    info!(
        "loaded {} ({} bytes) at {:04X}:0100",
        args.image.display(),
        image.len(),
        config.load_segment
    );

    // Piped stdin becomes console input; an interactive terminal is left alone
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        let mut input = Vec::new();
        stdin.lock().read_to_end(&mut input).context("reading stdin")?;
        machine.push_input(&input);
    }

    let result = machine.run(config.max_steps);

    let mut stdout = io::stdout().lock();
    stdout.write_all(&machine.take_output())?;
    stdout.flush()?;

    let exit_code = match &result {
        Ok(summary) if !summary.halted => {
            warn!("step budget of {} exhausted", config.max_steps);
            BUDGET_EXIT_CODE
        }
        Ok(_) => match machine.status() {
            CpuStatus::Halted(HaltReason::Terminated { exit_code }) => *exit_code as i32,
            _ => 0,
        },
        Err(DosError::Cpu(err)) => {
            eprintln!("emu8086: {} ({})", err, err.kind());
            FAULT_EXIT_CODE
        }
        Err(err) => anyhow::bail!("{}", err),
    };

    if !args.quiet {
        let snapshot = machine.register_snapshot();
        writeln!(stdout)?;
        write!(stdout, "{}", snapshot)?;
        stdout.flush()?;
    }

    if let Some(path) = &args.state {
        let mut f = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        write!(f, "{}", machine.report().to_json_pretty()?)?;
    }

    LogConfig::global().clear_log_file();
    process::exit(exit_code);
}
