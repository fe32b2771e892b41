//! File-backed logger shared by the bridge and forwarded-to by workers.
//!
//! All writes go to a single append-only file and are serialized by one
//! mutex, so log events arriving from concurrently running workers never
//! interleave mid-line. The formatting rules are part of the host-facing
//! contract: primitives render as their literal text, objects as indented
//! JSON blocks, and sequence-typed values are dropped from the line.

use std::fmt;
use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::Local;
use serde_json::Value;

use crate::error::Result;

/// Name of the log file inside the configured log directory.
pub const LOG_FILE_NAME: &str = "bridge.log";

const LOG_TIMESTAMP_FORMAT: &str = "%d-%b-%Y %I:%M:%S %p %z";

/// Severity of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Fatal,
    Error,
    Warning,
    Information,
    Debug,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Fatal => write!(f, "Fatal"),
            LogLevel::Error => write!(f, "Error"),
            LogLevel::Warning => write!(f, "Warning"),
            LogLevel::Information => write!(f, "Information"),
            LogLevel::Debug => write!(f, "Debug"),
        }
    }
}

/// Append-only log sink backed by a single file handle.
///
/// Constructed once at startup and shared by reference; components that run
/// downstream of a worker must be able to log without an error ever being
/// raised back to them, so [`Logger::log`] is infallible by contract.
#[derive(Debug)]
pub struct Logger {
    file: Mutex<File>,
}

impl Logger {
    /// Open (or create) the log file under `directory`, creating the
    /// directory itself if needed.
    pub fn new(directory: impl AsRef<Path>) -> Result<Self> {
        let directory = directory.as_ref();
        std::fs::create_dir_all(directory)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(directory.join(LOG_FILE_NAME))?;

        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Format and append one log line. Write failures are swallowed; logging
    /// never raises back to the caller.
    pub fn log(&self, level: LogLevel, context: &str, values: &[Value]) {
        let line = format_line(level, context, values);

        let mut file = match self.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let _ = writeln!(file, "{}", line);
        let _ = file.flush();
    }

    pub fn fatal(&self, context: &str, values: &[Value]) {
        self.log(LogLevel::Fatal, context, values);
    }

    pub fn error(&self, context: &str, values: &[Value]) {
        self.log(LogLevel::Error, context, values);
    }

    pub fn warning(&self, context: &str, values: &[Value]) {
        self.log(LogLevel::Warning, context, values);
    }

    pub fn information(&self, context: &str, values: &[Value]) {
        self.log(LogLevel::Information, context, values);
    }

    pub fn debug(&self, context: &str, values: &[Value]) {
        self.log(LogLevel::Debug, context, values);
    }
}

/// Render one log line: `timestamp [Level] [context] value value …`.
///
/// Arrays are dropped from the line entirely. Objects become an indented
/// JSON block framed by newlines, falling back to the value's compact text
/// if pretty-encoding fails. The finished line is trimmed.
fn format_line(level: LogLevel, context: &str, values: &[Value]) -> String {
    let timestamp = Local::now().format(LOG_TIMESTAMP_FORMAT);
    let mut line = format!("{} [{}] [{}] ", timestamp, level, context);

    for value in values {
        match value {
            Value::Null => line.push_str("null "),
            Value::Bool(flag) => {
                let _ = write!(line, "{} ", flag);
            }
            Value::Number(number) => {
                let _ = write!(line, "{} ", number);
            }
            Value::String(text) => {
                line.push_str(text);
                line.push(' ');
            }
            // sequence-typed values stay out of the formatted line
            Value::Array(_) => continue,
            Value::Object(_) => match serde_json::to_string_pretty(value) {
                Ok(block) => {
                    line.push('\n');
                    line.push_str(&block);
                    line.push('\n');
                }
                Err(_) => {
                    let _ = write!(line, "{} ", value);
                }
            },
        }
    }

    line.trim().to_string()
}
