use std::cell::RefCell;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::clock::{Clock, TscClock};
use crate::codec;
use crate::config::LoggerConfig;
use crate::error::ConfigError;
use crate::level::LogLevel;
use crate::loggable::Loggable;
use crate::poller::{PassReport, Poller};
use crate::registry::{CallSite, Registry};
use crate::sink::{ConsoleSink, FileAppender, Sink};
use crate::staging_buffer::{current_thread_label, staging_buffer, StagingConsumer, StagingProducer};

static NEXT_INSTANCE: AtomicU32 = AtomicU32::new(1);

thread_local! {
    /// This thread's staging buffers, one per logger it has logged to.
    static PRODUCERS: RefCell<Vec<(u32, StagingProducer)>> = const { RefCell::new(Vec::new()) };
}

#[derive(Debug, Default)]
struct Stats {
    emitted: AtomicU64,
    dropped: AtomicU64,
    corrupt_arguments: AtomicU64,
    sink_errors: AtomicU64,
    buffers_retired: AtomicU64,
}

impl Stats {
    fn record(&self, report: &PassReport) {
        self.emitted.fetch_add(report.emitted, Ordering::Relaxed);
        self.corrupt_arguments
            .fetch_add(report.corrupt_arguments, Ordering::Relaxed);
        self.sink_errors.fetch_add(report.sink_errors, Ordering::Relaxed);
        self.buffers_retired.fetch_add(report.retired, Ordering::Relaxed);
    }
}

/// Counters accumulated over a logger's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Records written to the sink.
    pub emitted: u64,
    /// Records discarded because the producing thread's buffer was full.
    pub dropped: u64,
    /// Call sites whose format failed to compile.
    pub format_errors: u64,
    pub corrupt_arguments: u64,
    pub sink_errors: u64,
    pub buffers_retired: u64,
}

/// A deferred-formatting logger.
///
/// Logging threads only encode their arguments into a per-thread staging
/// buffer; formatting and I/O happen when some thread calls
/// [`poll`](Logger::poll). The logger is an ordinary value: create one at
/// startup, share it by reference or `Arc`, and drive `poll` from whichever
/// thread suits the application.
///
/// # Thread Safety
///
/// `log` may be called from any number of threads concurrently. Each thread
/// gets its own staging buffer the first time it logs, so producers never
/// contend with each other. `poll` may also be called from any thread, but
/// passes are serialized: a call made while another pass is running returns
/// `None` immediately.
///
/// # Examples
///
/// ```
/// # use fast_logger::{log_info, Logger, LoggerConfig};
/// # use std::time::Duration;
/// let logger = Logger::new(LoggerConfig::default().with_calibration(Duration::ZERO)).unwrap();
/// log_info!(logger, "listening on port %d", 8080);
/// logger.poll();
/// ```
pub struct Logger {
    instance: u32,
    level: AtomicU8,
    buffer_capacity: usize,
    clock: Arc<dyn Clock>,
    registry: Registry,
    new_buffers: Mutex<Vec<StagingConsumer>>,
    poller: Mutex<Poller>,
    file_configured: AtomicBool,
    stats: Stats,
}

impl Logger {
    /// Creates a logger using a calibrated hardware cycle counter.
    ///
    /// Calibration blocks the caller for `config.calibration`.
    pub fn new(config: LoggerConfig) -> Result<Self, ConfigError> {
        let clock = Arc::new(TscClock::calibrate_for(config.calibration));
        Self::with_clock(config, clock)
    }

    pub fn with_clock(config: LoggerConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        config.validate()?;
        let sink: Box<dyn Sink> = match &config.log_file {
            Some(path) => Box::new(FileAppender::open(path)?),
            None => Box::new(ConsoleSink::new()),
        };

        let instance = NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            instance,
            buffer_capacity = config.buffer_capacity,
            level = %config.level,
            "created logger"
        );

        Ok(Self {
            instance,
            level: AtomicU8::new(config.level as u8),
            buffer_capacity: config.buffer_capacity,
            clock,
            registry: Registry::new(instance),
            new_buffers: Mutex::new(Vec::new()),
            poller: Mutex::new(Poller::new(sink)),
            file_configured: AtomicBool::new(config.log_file.is_some()),
            stats: Stats::default(),
        })
    }

    pub fn level(&self) -> LogLevel {
        LogLevel::from_u8(self.level.load(Ordering::Relaxed)).unwrap_or(LogLevel::Trace)
    }

    pub fn set_level(&self, level: LogLevel) {
        self.level.store(level as u8, Ordering::Relaxed);
    }

    #[inline]
    pub fn enabled(&self, level: LogLevel) -> bool {
        level as u8 >= self.level.load(Ordering::Relaxed)
    }

    /// Directs output to `path`.
    ///
    /// Only the first file takes effect; later calls, and calls on a logger
    /// configured with a file, are ignored.
    pub fn set_log_file(&self, path: impl AsRef<Path>) -> io::Result<()> {
        if self.file_configured.swap(true, Ordering::AcqRel) {
            tracing::debug!(path = %path.as_ref().display(), "log file already set, ignoring");
            return Ok(());
        }
        match FileAppender::open(path) {
            Ok(appender) => {
                self.install_sink(Box::new(appender));
                Ok(())
            }
            Err(err) => {
                self.file_configured.store(false, Ordering::Release);
                Err(err)
            }
        }
    }

    /// Replaces the sink. The previous sink is flushed and dropped.
    pub fn set_sink(&self, sink: impl Sink + 'static) {
        self.install_sink(Box::new(sink));
    }

    fn install_sink(&self, sink: Box<dyn Sink>) {
        let mut previous = self.poller.lock().set_sink(sink);
        if let Err(err) = previous.flush() {
            tracing::error!(error = %err, "failed to flush replaced sink");
        }
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            emitted: self.stats.emitted.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
            format_errors: self.registry.compile_failures(),
            corrupt_arguments: self.stats.corrupt_arguments.load(Ordering::Relaxed),
            sink_errors: self.stats.sink_errors.load(Ordering::Relaxed),
            buffers_retired: self.stats.buffers_retired.load(Ordering::Relaxed),
        }
    }

    /// Queues one record for `site`. Normally called through [`fast_log!`](crate::fast_log).
    ///
    /// Never blocks: if the calling thread's staging buffer has no room the
    /// record is dropped and counted.
    pub fn log(&self, site: &'static CallSite, args: &[&dyn Loggable]) {
        if !self.enabled(site.level()) {
            return;
        }
        let Some(id) = self.registry.resolve(site, args) else {
            return;
        };

        let timestamp = self.clock.now_cycles();
        let size = codec::record_size(args);
        let queued = self.with_producer(|producer| match producer.allocate(size) {
            Some(mut reservation) => {
                codec::encode_record(reservation.payload_mut(), timestamp, args);
                reservation.commit(id);
                true
            }
            None => false,
        });

        if queued != Some(true) {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Runs `f` on this thread's producer for this logger, creating it on first use.
    ///
    /// Returns `None` during thread teardown or on reentrant use.
    fn with_producer<R>(&self, f: impl FnOnce(&mut StagingProducer) -> R) -> Option<R> {
        PRODUCERS
            .try_with(|cell| {
                let mut producers = cell.try_borrow_mut().ok()?;
                let index = match producers.iter().position(|(instance, _)| *instance == self.instance) {
                    Some(index) => index,
                    None => {
                        producers.retain(|(_, producer)| !producer.is_orphaned());
                        producers.push((self.instance, self.create_producer()));
                        producers.len() - 1
                    }
                };
                Some(f(&mut producers[index].1))
            })
            .ok()
            .flatten()
    }

    #[cold]
    fn create_producer(&self) -> StagingProducer {
        let (producer, consumer) = staging_buffer(self.buffer_capacity, current_thread_label());
        tracing::trace!(thread = producer.thread_label(), "created staging buffer");
        self.new_buffers.lock().push(consumer);
        producer
    }

    /// Runs one poll pass: publishes new call sites, adopts new staging
    /// buffers, then emits every record timestamped before the start of the
    /// pass in approximate time order.
    ///
    /// Returns `None` without doing anything if another pass is in progress.
    pub fn poll(&self) -> Option<PassReport> {
        let mut poller = self.poller.try_lock()?;
        let watermark = self.clock.now_cycles();
        Some(self.run_pass(&mut poller, watermark))
    }

    /// Like [`poll`](Logger::poll) but without the timestamp cutoff.
    ///
    /// Only use once producers have stopped, e.g. at shutdown; records still
    /// being written by a live thread are not guaranteed to be seen.
    pub fn drain(&self) -> PassReport {
        let mut poller = self.poller.lock();
        self.run_pass(&mut poller, u64::MAX)
    }

    fn run_pass(&self, poller: &mut Poller, watermark: u64) -> PassReport {
        poller.publish(self.registry.drain_pending());
        let adopted = std::mem::take(&mut *self.new_buffers.lock());
        poller.adopt(adopted);
        let report = poller.run(watermark, self.clock.as_ref());
        self.stats.record(&report);
        report
    }

    pub fn flush(&self) -> io::Result<()> {
        self.poller.lock().flush()
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        if let Err(err) = self.poller.get_mut().flush() {
            tracing::error!(error = %err, "failed to flush log sink");
        }
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! __unit {
    ($($t:tt)*) => {
        ()
    };
}

/// Logs a printf-style record at a constant level.
///
/// Each invocation owns a static [`CallSite`](crate::registry::CallSite); the
/// format is compiled the first time the statement runs. Arguments are any
/// [`Loggable`](crate::Loggable) values and must match the conversions (see
/// the table on `Loggable`). A format that does not compile, whose conversion
/// count differs from the argument count, or whose conversions do not accept
/// the argument kinds, disables the statement.
///
/// # Examples
///
/// ```
/// # use fast_logger::{fast_log, Logger, LoggerConfig, LogLevel};
/// # use std::time::Duration;
/// # let logger = Logger::new(LoggerConfig::default().with_calibration(Duration::ZERO)).unwrap();
/// fast_log!(logger, LogLevel::Debug, "%d %d %s %lf", 10, 111, "test", 1.020215);
/// ```
#[macro_export]
macro_rules! fast_log {
    ($logger:expr, $level:expr, $fmt:literal $(, $arg:expr)* $(,)?) => {{
        static __SITE: $crate::registry::CallSite = $crate::registry::CallSite::new(
            file!(),
            line!(),
            $level,
            $fmt,
            <[()]>::len(&[$($crate::__unit!($arg)),*]),
        );
        let logger: &$crate::Logger = &$logger;
        if logger.enabled($level) {
            logger.log(&__SITE, &[$(&$arg as &dyn $crate::Loggable),*]);
        }
    }};
}

#[macro_export]
macro_rules! log_trace {
    ($logger:expr, $($rest:tt)+) => {
        $crate::fast_log!($logger, $crate::LogLevel::Trace, $($rest)+)
    };
}

#[macro_export]
macro_rules! log_debug {
    ($logger:expr, $($rest:tt)+) => {
        $crate::fast_log!($logger, $crate::LogLevel::Debug, $($rest)+)
    };
}

#[macro_export]
macro_rules! log_info {
    ($logger:expr, $($rest:tt)+) => {
        $crate::fast_log!($logger, $crate::LogLevel::Info, $($rest)+)
    };
}

#[macro_export]
macro_rules! log_warn {
    ($logger:expr, $($rest:tt)+) => {
        $crate::fast_log!($logger, $crate::LogLevel::Warn, $($rest)+)
    };
}

#[macro_export]
macro_rules! log_error {
    ($logger:expr, $($rest:tt)+) => {
        $crate::fast_log!($logger, $crate::LogLevel::Error, $($rest)+)
    };
}

#[macro_export]
macro_rules! log_fatal {
    ($logger:expr, $($rest:tt)+) => {
        $crate::fast_log!($logger, $crate::LogLevel::Fatal, $($rest)+)
    };
}
