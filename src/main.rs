use std::path::PathBuf;
use std::time::Instant;

use fast_logger::{log_debug, LogLevel, Logger, LoggerConfig};
use tracing_subscriber::EnvFilter;

/// Exercises a few loggers and prints the mean cost of a log call.
///
/// Usage: `fast_logger [OUTPUT_DIR]` (defaults to the current directory).
/// `FAST_LOGGER_*` variables override the logger defaults; `RUST_LOG` controls
/// the library's own diagnostics on stderr.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (writer, _guard) = tracing_appender::non_blocking(std::io::stderr());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(writer)
        .init();

    let out_dir = std::env::args().nth(1).map(PathBuf::from).unwrap_or_default();
    let base = LoggerConfig::from_env()?;

    let log = Logger::new(base.clone().with_log_file(out_dir.join("test.log")))?;
    log_debug!(log, "%d %d %s %lf", 10, 111, "test", 1.020215);
    log.poll();
    log_debug!(log, "%d %d %s %lf", 10, 111, "test2", 1.020215);
    log.poll();

    let log_1 = Logger::new(base.clone().with_log_file(out_dir.join("test1.log")))?;
    log_debug!(log_1, "%d %d %s %.1lf", 10, 111, "test", 1.020215);
    log_1.poll();
    log_debug!(log_1, "%d %d %s %lf", 10, 111, "test2", 1.020215);
    log_1.poll();

    // Filtered out: nothing reaches test2.log.
    let log_2 = Logger::new(base.with_log_file(out_dir.join("test2.log")))?;
    log_2.set_level(LogLevel::Info);
    log_debug!(log_2, "%d %d %s %lf", 10, 111, "test", 1.020215);
    log_2.poll();
    log_debug!(log_2, "%d %d %s %.1lf", 10, 111, "test2", 1.020215);
    log_2.poll();

    let t0 = Instant::now();
    log_debug!(log_1, "%d %d %s %lf", 10, 111, "tesdafdafdafdat", 1.020215);
    log_debug!(log_1, "%d %d %s %lf", 1100, 111, "teeeeest", 1.877);
    log_debug!(log_1, "%d %d %s %lf %s %.6lf", 1545, 111, "tesgdagfdasect", 1.11, "dadfasefdaf", 1.15555555333);
    println!("{}", t0.elapsed().as_nanos() as f64 / 3.0);

    let mut t0 = Instant::now();
    for i in 0..1500 {
        if i == 1 {
            t0 = Instant::now();
        }
        log_debug!(log_1, "%d %d %s %lf", 10, 111, "tesdafdafdafdat", 1.020215);
        log_debug!(log_1, "%d %d %s %lf", 1100, 111, "teeeeest", 1.877);
        log_debug!(log_1, "%d %d %s %lf %s %.6lf", 1545, 111, "tesgdagfdasect", 1.11, "dadfasefdaf", 1.15555555333);
    }
    println!("{}", t0.elapsed().as_nanos() as f64 / 4500.0);
    log_1.poll();

    for logger in [&log, &log_1, &log_2] {
        logger.flush()?;
        let stats = logger.stats();
        tracing::info!(emitted = stats.emitted, dropped = stats.dropped, "logger finished");
    }
    Ok(())
}
