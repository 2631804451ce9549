use std::path::PathBuf;
use std::time::Duration;

use crate::clock::DEFAULT_CALIBRATION;
use crate::error::ConfigError;
use crate::level::LogLevel;
use crate::ring_buffer::{MAX_CAPACITY, MIN_CAPACITY};

pub const ENV_LEVEL: &str = "FAST_LOGGER_LEVEL";
pub const ENV_FILE: &str = "FAST_LOGGER_FILE";
pub const ENV_BUFFER_BYTES: &str = "FAST_LOGGER_BUFFER_BYTES";

/// Settings a [`Logger`](crate::Logger) is built from.
///
/// # Examples
///
/// ```
/// # use fast_logger::{LoggerConfig, LogLevel};
/// let config = LoggerConfig::default()
///     .with_level(LogLevel::Info)
///     .with_buffer_capacity(1 << 20);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct LoggerConfig {
    /// Bytes reserved for each producing thread's staging buffer.
    pub buffer_capacity: usize,
    /// Records below this level are discarded before encoding.
    pub level: LogLevel,
    /// Destination file; standard output when unset.
    pub log_file: Option<PathBuf>,
    /// Window used to calibrate the cycle counter against the wall clock.
    pub calibration: Duration,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: Self::DEFAULT_BUFFER_CAPACITY,
            level: LogLevel::Trace,
            log_file: None,
            calibration: DEFAULT_CALIBRATION,
        }
    }
}

impl LoggerConfig {
    pub const DEFAULT_BUFFER_CAPACITY: usize = 4 * 1024 * 1024;

    pub fn with_buffer_capacity(mut self, bytes: usize) -> Self {
        self.buffer_capacity = bytes;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    pub fn with_calibration(mut self, window: Duration) -> Self {
        self.calibration = window;
        self
    }

    /// Defaults overridden by `FAST_LOGGER_LEVEL`, `FAST_LOGGER_FILE` and
    /// `FAST_LOGGER_BUFFER_BYTES`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env(|key| std::env::var(key).ok())
    }

    /// Applies overrides looked up through `lookup`.
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_LEVEL) {
            self.level = value.parse().map_err(|_| ConfigError::InvalidValue {
                key: ENV_LEVEL,
                value,
            })?;
        }
        if let Some(value) = lookup(ENV_FILE) {
            if !value.is_empty() {
                self.log_file = Some(PathBuf::from(value));
            }
        }
        if let Some(value) = lookup(ENV_BUFFER_BYTES) {
            self.buffer_capacity = value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: ENV_BUFFER_BYTES,
                value,
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_capacity < MIN_CAPACITY {
            return Err(ConfigError::BufferTooSmall {
                bytes: self.buffer_capacity,
                min: MIN_CAPACITY,
            });
        }
        if self.buffer_capacity > MAX_CAPACITY {
            return Err(ConfigError::BufferTooLarge {
                bytes: self.buffer_capacity,
                max: MAX_CAPACITY,
            });
        }
        Ok(())
    }
}
