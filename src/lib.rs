//! # Fast Logger
//!
//! A deferred-formatting logging library for latency-sensitive code:
//!
//! * **Nanosecond log calls**: a call copies its arguments into a per-thread
//!   lock-free ring buffer and returns; no formatting, no locks, no I/O
//! * **printf formats**: format strings are compiled once per call site into
//!   a fragment program and replayed against the queued arguments later
//! * **Cycle-counter timestamps** converted to wall-clock time off the hot path
//! * **Merged output**: a poll pass merges all thread buffers in timestamp
//!   order and writes flat text lines to a file or standard output
//!
//! ## Main Components
//!
//! * [`Logger`]: the context object; owns the registry, the poller and the sink
//! * [`ring_buffer`] / [`staging_buffer`]: the per-thread SPSC queues
//! * [`fragment`] and [`printf`]: format compilation and value rendering
//! * [`codec`]: record payload encoding and replay
//! * [`registry`]: call-site ids and compiled formats
//! * [`poller`]: the watermark-bounded k-way merge
//! * [`clock`]: hardware counter timestamps
//!
//! ## Quick Start
//!
//! ```
//! use fast_logger::{log_debug, log_info, Logger, LoggerConfig, LogLevel};
//! use std::time::Duration;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let config = LoggerConfig::default()
//!     .with_log_file(dir.path().join("app.log"))
//!     .with_calibration(Duration::from_millis(1));
//! let logger = Logger::new(config).unwrap();
//!
//! log_debug!(logger, "%d %d %s %lf", 10, 111, "test", 1.020215);
//! log_info!(logger, "ready");
//!
//! // Formatting and I/O happen here, on whichever thread calls poll.
//! logger.poll();
//! logger.flush().unwrap();
//! assert_eq!(logger.stats().emitted, 2);
//! ```

pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod fragment;
pub mod level;
pub mod loggable;
pub mod logger;
pub mod poller;
pub mod printf;
pub mod registry;
pub mod ring_buffer;
pub mod sink;
pub mod staging_buffer;

pub use clock::{Clock, ManualClock, TscClock};
pub use config::LoggerConfig;
pub use error::{CompileError, ConfigError, ParseLevelError};
pub use level::LogLevel;
pub use loggable::{ArgKind, Loggable};
pub use logger::{Logger, StatsSnapshot};
pub use poller::PassReport;
pub use sink::{ConsoleSink, FileAppender, Sink};
