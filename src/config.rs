//! Application configuration.
//!
//! Defaults can be set in a TOML file looked up at:
//! 1. the `--config` flag or `$PGO2MBOX_CONFIG`
//! 2. `~/.config/pgo2mbox/config.toml` (Linux/macOS)
//!    `%APPDATA%\pgo2mbox\config.toml` (Windows)
//! 3. Built-in defaults
//!
//! Command-line flags override file values. The effective settings for one
//! run are gathered in [`ConvertOptions`], which is validated before the
//! archive is opened.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Conversion defaults.
    pub conversion: ConversionConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Conversion defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Flush every N messages; `-1` disables periodic flushing.
    pub flush_after: FlushPolicy,
    /// Split mailboxes at this size in MiB; `-1` means unlimited.
    pub max_size_mb: SizeLimit,
    /// Time zone assumed for archive timestamps: "local" or "utc".
    pub dates: DateMode,
    /// Output directory. Defaults to a directory named after the source file.
    pub output_dir: Option<PathBuf>,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: String,
    /// Also write `pgo2mbox.log` in the output directory.
    pub log_file: bool,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            flush_after: FlushPolicy::Every(100),
            max_size_mb: SizeLimit::Unlimited,
            dates: DateMode::Local,
            output_dir: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_file: true,
        }
    }
}

// ── Flush policy ────────────────────────────────────────────────

/// How often the active mailbox is forced to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum FlushPolicy {
    /// Flush after every `n` appended messages (`n > 0`).
    Every(u64),
    /// Only flush when a mailbox is closed.
    Disabled,
}

impl TryFrom<i64> for FlushPolicy {
    type Error = String;

    fn try_from(value: i64) -> std::result::Result<Self, Self::Error> {
        match value {
            -1 => Ok(Self::Disabled),
            n if n > 0 => Ok(Self::Every(n as u64)),
            n => Err(format!(
                "flush interval must be a positive number of messages or -1 to disable, got {n}"
            )),
        }
    }
}

impl From<FlushPolicy> for i64 {
    fn from(policy: FlushPolicy) -> Self {
        match policy {
            FlushPolicy::Every(n) => i64::try_from(n).unwrap_or(i64::MAX),
            FlushPolicy::Disabled => -1,
        }
    }
}

impl FromStr for FlushPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disabled" | "never" => Ok(Self::Disabled),
            other => {
                let n: i64 = other
                    .parse()
                    .map_err(|_| format!("expected a number of messages or 'disabled', got '{s}'"))?;
                Self::try_from(n)
            }
        }
    }
}

impl fmt::Display for FlushPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Every(n) => write!(f, "every {n} messages"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

// ── Size limit ──────────────────────────────────────────────────

/// Target maximum size of one mailbox file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum SizeLimit {
    /// Never split.
    Unlimited,
    /// Start a new file once the active one reaches this many MiB.
    Megabytes(u64),
}

impl SizeLimit {
    /// The threshold in bytes, if any.
    pub fn bytes(&self) -> Option<u64> {
        match self {
            Self::Unlimited => None,
            Self::Megabytes(mb) => Some(mb.saturating_mul(1024 * 1024)),
        }
    }
}

impl TryFrom<i64> for SizeLimit {
    type Error = String;

    fn try_from(value: i64) -> std::result::Result<Self, Self::Error> {
        match value {
            -1 => Ok(Self::Unlimited),
            n if n > 0 => Ok(Self::Megabytes(n as u64)),
            n => Err(format!(
                "maximum size must be a positive number of MiB or -1 for unlimited, got {n}"
            )),
        }
    }
}

impl From<SizeLimit> for i64 {
    fn from(limit: SizeLimit) -> Self {
        match limit {
            SizeLimit::Unlimited => -1,
            SizeLimit::Megabytes(n) => i64::try_from(n).unwrap_or(i64::MAX),
        }
    }
}

impl FromStr for SizeLimit {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unlimited" | "none" => Ok(Self::Unlimited),
            other => {
                let n: i64 = other
                    .parse()
                    .map_err(|_| format!("expected a size in MiB or 'unlimited', got '{s}'"))?;
                Self::try_from(n)
            }
        }
    }
}

impl fmt::Display for SizeLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unlimited => write!(f, "unlimited"),
            Self::Megabytes(n) => write!(f, "{n} MiB"),
        }
    }
}

// ── Date interpretation ─────────────────────────────────────────

/// Offset given to the naive timestamps stored in the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateMode {
    /// The time zone of the machine running the conversion.
    #[default]
    Local,
    /// UTC, for output that does not depend on the machine.
    Utc,
}

impl FromStr for DateMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "utc" => Ok(Self::Utc),
            _ => Err(format!("expected 'local' or 'utc', got '{s}'")),
        }
    }
}

// ── Per-run options ─────────────────────────────────────────────

/// Effective settings for one conversion run, passed explicitly to the
/// converter and the mailbox writer.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Directory receiving the mailboxes.
    pub output_dir: PathBuf,
    /// File name of the source archive, recorded in provenance headers.
    pub source_name: String,
    pub flush: FlushPolicy,
    pub size_limit: SizeLimit,
    pub dates: DateMode,
}

impl ConvertOptions {
    /// Build and validate options.
    ///
    /// Size limits are only checked after a flush, so a size limit without
    /// periodic flushing is rejected.
    pub fn new(
        output_dir: impl Into<PathBuf>,
        source_name: impl Into<String>,
        flush: FlushPolicy,
        size_limit: SizeLimit,
        dates: DateMode,
    ) -> Result<Self> {
        let options = Self {
            output_dir: output_dir.into(),
            source_name: source_name.into(),
            flush,
            size_limit,
            dates,
        };
        options.validate()?;
        Ok(options)
    }

    /// Reject contradictory combinations.
    pub fn validate(&self) -> Result<()> {
        if let FlushPolicy::Every(0) = self.flush {
            return Err(ConvertError::InvalidConfig(
                "flush interval must be at least 1 message".to_string(),
            ));
        }
        if let SizeLimit::Megabytes(0) = self.size_limit {
            return Err(ConvertError::InvalidConfig(
                "maximum size must be at least 1 MiB".to_string(),
            ));
        }
        if self.flush == FlushPolicy::Disabled && self.size_limit != SizeLimit::Unlimited {
            return Err(ConvertError::InvalidConfig(format!(
                "a maximum size ({}) requires periodic flushing, but flushing is disabled",
                self.size_limit
            )));
        }
        Ok(())
    }
}

// ── Load ────────────────────────────────────────────────────────

/// Load configuration from `explicit`, or else from the standard location.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config(explicit: Option<&Path>) -> Config {
    let path = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => config_file_path(),
    };

    if let Some(path) = path {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("PGO2MBOX_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("pgo2mbox").join("config.toml"))
}
