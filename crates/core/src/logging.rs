//! Category-based logging for the 8086 core.
//!
//! - **LogConfig**: process-wide configuration held in atomics
//! - **LogLevel**: Off < Error < Warn < Info < Debug < Trace
//! - **LogCategory**: CPU stepping, decoding, memory, interrupts, DOS services
//! - **log()**: lazily formatted output to stderr or a background file writer
//!
//! Each category can carry its own level; a category left at `Off` follows
//! the global level. Output per category is rate limited over a one second
//! sliding window so a tight trace loop cannot swamp the terminal.
//!
//! ```rust
//! use emu8086_core::logging::{log, LogCategory, LogLevel};
//!
//! log(LogCategory::Cpu, LogLevel::Debug, || {
//!     format!("[CPU] HLT at {:04X}:{:04X}", 0x0700, 0x0105)
//! });
//! ```

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Default per-category output limit, in messages per second
pub const DEFAULT_RATE_LIMIT: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    fn from_u8(val: u8) -> Self {
        match val {
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            5 => LogLevel::Trace,
            _ => LogLevel::Off,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "0" => Ok(LogLevel::Off),
            "error" | "err" | "1" => Ok(LogLevel::Error),
            "warn" | "warning" | "2" => Ok(LogLevel::Warn),
            "info" | "3" => Ok(LogLevel::Info),
            "debug" | "4" => Ok(LogLevel::Debug),
            "trace" | "5" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    /// Instruction stepping and halts
    Cpu,
    /// Decoding and illegal encodings
    Decode,
    /// Memory faults and image loading
    Memory,
    /// Software interrupts and vector dispatch
    Interrupts,
    /// DOS service emulation
    Dos,
}

const CATEGORY_COUNT: usize = 5;

impl LogCategory {
    pub const ALL: [LogCategory; CATEGORY_COUNT] = [
        LogCategory::Cpu,
        LogCategory::Decode,
        LogCategory::Memory,
        LogCategory::Interrupts,
        LogCategory::Dos,
    ];

    fn index(self) -> usize {
        match self {
            LogCategory::Cpu => 0,
            LogCategory::Decode => 1,
            LogCategory::Memory => 2,
            LogCategory::Interrupts => 3,
            LogCategory::Dos => 4,
        }
    }
}

/// Lock a mutex, recovering the data if another thread panicked holding it
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Per-category window of recent log timestamps
#[derive(Default)]
struct Window {
    stamps: VecDeque<Instant>,
    dropped: usize,
    last_drop_report: Option<Instant>,
}

struct RateLimiter {
    max_per_second: AtomicUsize,
    windows: Mutex<[Window; CATEGORY_COUNT]>,
}

impl RateLimiter {
    fn new(max_per_second: usize) -> Self {
        Self {
            max_per_second: AtomicUsize::new(max_per_second),
            windows: Mutex::new(Default::default()),
        }
    }

    /// Returns whether the message may be written, plus a count of dropped
    /// messages to report when one is due
    fn should_allow(&self, category: LogCategory) -> (bool, Option<usize>) {
        let now = Instant::now();
        let second = Duration::from_secs(1);
        let mut windows = lock(&self.windows);
        let window = &mut windows[category.index()];

        while let Some(&front) = window.stamps.front() {
            if now.duration_since(front) > second {
                window.stamps.pop_front();
            } else {
                break;
            }
        }

        if window.stamps.len() < self.max_per_second.load(Ordering::Relaxed) {
            window.stamps.push_back(now);
            if window.dropped > 0 {
                let dropped = std::mem::take(&mut window.dropped);
                window.last_drop_report = Some(now);
                return (true, Some(dropped));
            }
            return (true, None);
        }

        window.dropped += 1;
        let report_due = window
            .last_drop_report
            .map_or(true, |last| now.duration_since(last) >= second);
        if report_due {
            let dropped = std::mem::take(&mut window.dropped);
            window.last_drop_report = Some(now);
            (false, Some(dropped))
        } else {
            (false, None)
        }
    }
}

pub struct LogConfig {
    global_level: AtomicU8,
    levels: [AtomicU8; CATEGORY_COUNT],
    log_sender: Mutex<Option<Sender<String>>>,
    log_writer: Mutex<Option<JoinHandle<()>>>,
    file_logging_enabled: AtomicBool,
    rate_limiter: RateLimiter,
}

impl LogConfig {
    fn new() -> Self {
        Self {
            global_level: AtomicU8::new(LogLevel::Off as u8),
            levels: Default::default(),
            log_sender: Mutex::new(None),
            log_writer: Mutex::new(None),
            file_logging_enabled: AtomicBool::new(false),
            rate_limiter: RateLimiter::new(DEFAULT_RATE_LIMIT),
        }
    }

    /// Process-wide instance
    pub fn global() -> &'static Self {
        static INSTANCE: OnceLock<LogConfig> = OnceLock::new();
        INSTANCE.get_or_init(LogConfig::new)
    }

    pub fn set_global_level(&self, level: LogLevel) {
        self.global_level.store(level as u8, Ordering::Relaxed);
    }

    pub fn get_global_level(&self) -> LogLevel {
        LogLevel::from_u8(self.global_level.load(Ordering::Relaxed))
    }

    pub fn set_level(&self, category: LogCategory, level: LogLevel) {
        self.levels[category.index()].store(level as u8, Ordering::Relaxed);
    }

    pub fn get_level(&self, category: LogCategory) -> LogLevel {
        LogLevel::from_u8(self.levels[category.index()].load(Ordering::Relaxed))
    }

    /// A category level other than `Off` wins over the global level
    pub fn should_log(&self, category: LogCategory, level: LogLevel) -> bool {
        if level == LogLevel::Off {
            return false;
        }
        match self.get_level(category) {
            LogLevel::Off => level <= self.get_global_level(),
            category_level => level <= category_level,
        }
    }

    /// Turn every level back off
    pub fn reset(&self) {
        self.set_global_level(LogLevel::Off);
        for category in LogCategory::ALL {
            self.set_level(category, LogLevel::Off);
        }
    }

    pub fn set_rate_limit(&self, max_per_second: usize) {
        self.rate_limiter
            .max_per_second
            .store(max_per_second, Ordering::Relaxed);
    }

    pub fn get_rate_limit(&self) -> usize {
        self.rate_limiter.max_per_second.load(Ordering::Relaxed)
    }

    /// Append log output to `path` from a background writer thread.
    /// Replaces any writer started earlier.
    pub fn set_log_file(&self, path: PathBuf) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let (sender, receiver) = channel::<String>();

        let writer = thread::Builder::new()
            .name("emu8086-log".to_string())
            .spawn(move || {
                while let Ok(message) = receiver.recv() {
                    let _ = writeln!(file, "{}", message);
                    let _ = file.flush();
                }
            })?;

        self.clear_log_file();
        *lock(&self.log_sender) = Some(sender);
        *lock(&self.log_writer) = Some(writer);
        self.file_logging_enabled.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Stop file output and wait for queued messages to reach the file
    pub fn clear_log_file(&self) {
        self.file_logging_enabled.store(false, Ordering::Relaxed);
        *lock(&self.log_sender) = None;
        if let Some(writer) = lock(&self.log_writer).take() {
            let _ = writer.join();
        }
    }

    fn write_message(&self, message: String) {
        if self.file_logging_enabled.load(Ordering::Relaxed) {
            if let Some(sender) = lock(&self.log_sender).as_ref() {
                if let Err(failed) = sender.send(message) {
                    eprintln!("{}", failed.0);
                }
                return;
            }
        }
        eprintln!("{}", message);
    }
}

/// Log a lazily built message under `category` at `level`.
///
/// The closure only runs when the level is enabled and the category is
/// under its rate limit.
pub fn log<F>(category: LogCategory, level: LogLevel, message_fn: F)
where
    F: FnOnce() -> String,
{
    let config = LogConfig::global();
    if !config.should_log(category, level) {
        return;
    }

    let (allowed, dropped) = config.rate_limiter.should_allow(category);
    if let Some(count) = dropped.filter(|&n| n > 0) {
        config.write_message(format!(
            "[{:?}] rate limit exceeded, {} message(s) dropped",
            category, count
        ));
    }
    if allowed {
        config.write_message(message_fn());
    }
}
