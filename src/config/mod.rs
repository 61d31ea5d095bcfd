pub mod parser;
pub mod validator;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use anyhow::Result;

/// Severity of a captured log entry.
///
/// Ordering follows severity: `Debug < Info < Warn < Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for the request logger and its rotating file sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Path of the active log file. Parent directories are created on first write.
    pub filename: PathBuf,
    /// Maximum size of the active file in megabytes before rotation.
    #[serde(default = "default_max_size")]
    pub max_size: u64,
    /// Number of rotated backups to retain. 0 keeps all.
    #[serde(default)]
    pub max_backups: usize,
    /// Maximum age of rotated backups in days. 0 keeps all.
    #[serde(default)]
    pub max_age: u32,
    /// Gzip rotated backups.
    #[serde(default)]
    pub compress: bool,
    /// Minimum severity an entry must reach to be written.
    #[serde(default = "default_log_level")]
    pub log_level: Level,
    /// Request path prefixes that bypass capture entirely.
    #[serde(default)]
    pub skip_paths: Vec<String>,
    /// Maximum number of body bytes captured per entry, request and response alike.
    #[serde(default = "default_max_body_size")]
    pub max_body_size: u64,
    /// Inbound header carrying the request ID. Never generated here.
    #[serde(default = "default_request_id_header")]
    pub request_id_header: String,
    /// Disable request header/body capture.
    #[serde(default)]
    pub disable_request_log: bool,
    /// Disable stack trace capture on downstream errors.
    #[serde(default)]
    pub disable_stack_trace: bool,
    /// Emit JSON lines instead of the human-readable text format.
    #[serde(default)]
    pub json_output: bool,
}

// Default values
fn default_max_size() -> u64 {
    100
}

fn default_max_body_size() -> u64 {
    1024 * 1024 // 1MB
}

fn default_request_id_header() -> String {
    "X-Request-ID".to_string()
}

fn default_log_level() -> Level {
    Level::Info
}

impl LoggerConfig {
    /// Minimal configuration writing text lines to `filename` with defaults everywhere else.
    pub fn new(filename: impl Into<PathBuf>) -> Self {
        Self {
            filename: filename.into(),
            max_size: default_max_size(),
            max_backups: 0,
            max_age: 0,
            compress: false,
            log_level: default_log_level(),
            skip_paths: Vec::new(),
            max_body_size: default_max_body_size(),
            request_id_header: default_request_id_header(),
            disable_request_log: false,
            disable_stack_trace: false,
            json_output: false,
        }
    }

    pub fn from_file(path: &PathBuf) -> Result<Self> {
        parser::parse_config(path)
    }

    pub fn validate(&self) -> Result<Vec<String>> {
        validator::validate_config(self)
    }

    /// Apply the documented zero-value fallbacks.
    ///
    /// A zero `max_body_size` becomes 1MB, an empty `request_id_header` becomes
    /// `X-Request-ID` and a zero `max_size` becomes 100MB.
    pub fn normalized(mut self) -> Self {
        if self.max_body_size == 0 {
            self.max_body_size = default_max_body_size();
        }
        if self.request_id_header.is_empty() {
            self.request_id_header = default_request_id_header();
        }
        if self.max_size == 0 {
            self.max_size = default_max_size();
        }
        self
    }
}
