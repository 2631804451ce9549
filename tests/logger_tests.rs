use fast_logger::{
    fast_log, log_debug, log_error, log_info, log_warn, LogLevel, Logger, LoggerConfig, ManualClock, Sink,
};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Captures every appended line in memory.
#[derive(Clone, Default)]
struct CollectingSink {
    data: Arc<Mutex<Vec<u8>>>,
}

impl CollectingSink {
    fn lines(&self) -> Vec<String> {
        let data = self.data.lock();
        String::from_utf8(data.clone())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn messages(&self) -> Vec<String> {
        self.lines().iter().map(|line| parse_line(line).2.to_string()).collect()
    }
}

impl Sink for CollectingSink {
    fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.data.lock().extend_from_slice(bytes);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn written_bytes(&self) -> u64 {
        self.data.lock().len() as u64
    }
}

struct FailingSink;

impl Sink for FailingSink {
    fn append(&mut self, _bytes: &[u8]) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Other, "disk full"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn written_bytes(&self) -> u64 {
        0
    }
}

/// Splits `[tid] [time] [LEVEL] message` into (tid, level, message).
fn parse_line(line: &str) -> (&str, &str, &str) {
    let rest = line.strip_prefix('[').expect("line starts with [");
    let (tid, rest) = rest.split_once("] [").expect("thread id");
    let (_time, rest) = rest.split_once("] [").expect("time");
    let (level, message) = rest.split_once("] ").expect("level");
    (tid, level, message)
}

fn test_config() -> LoggerConfig {
    LoggerConfig::default()
        .with_buffer_capacity(1 << 20)
        .with_calibration(Duration::from_millis(1))
}

fn collecting_logger(config: LoggerConfig) -> (Logger, CollectingSink) {
    let logger = Logger::new(config).unwrap();
    let sink = CollectingSink::default();
    logger.set_sink(sink.clone());
    (logger, sink)
}

fn manual_logger(start: u64) -> (Logger, CollectingSink, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start));
    let logger = Logger::with_clock(test_config(), clock.clone()).unwrap();
    let sink = CollectingSink::default();
    logger.set_sink(sink.clone());
    (logger, sink, clock)
}

#[test]
fn test_scenario_single_record() {
    let (logger, sink) = collecting_logger(test_config());
    log_debug!(logger, "%d %d %s %lf", 10, 111, "test", 1.020215);
    let report = logger.poll().unwrap();
    assert_eq!(report.emitted, 1);

    let lines = sink.lines();
    assert_eq!(lines.len(), 1);
    let (tid, level, message) = parse_line(&lines[0]);
    assert!(!tid.is_empty() && tid.chars().all(|c| c.is_ascii_digit()), "{tid}");
    assert_eq!(level, "DEBUG");
    assert_eq!(message, "10 111 test 1.020215");
}

#[test]
fn test_line_time_field_layout() {
    let (logger, sink) = collecting_logger(test_config());
    log_info!(logger, "x");
    logger.poll();
    let line = &sink.lines()[0];
    // "[tid] [YYYY-MM-DD HH:MM:SS mmm.uuu] [INFO] x"
    let time = line.split_once("] [").unwrap().1.split_once("] [").unwrap().0;
    assert_eq!(time.len(), 27, "{time}");
    let bytes = time.as_bytes();
    assert_eq!((bytes[4], bytes[7], bytes[10], bytes[13], bytes[16]), (b'-', b'-', b' ', b':', b':'));
    assert_eq!((bytes[19], bytes[23]), (b' ', b'.'));
}

#[test]
fn test_scenario_level_filter() {
    let (logger, sink) = collecting_logger(test_config());
    logger.set_level(LogLevel::Info);
    assert!(!logger.enabled(LogLevel::Debug));
    assert!(logger.enabled(LogLevel::Error));

    log_debug!(logger, "%d %d %s %lf", 10, 111, "test", 1.020215);
    let report = logger.poll().unwrap();
    assert_eq!(report.emitted, 0);
    assert!(sink.lines().is_empty());

    log_error!(logger, "kept %d", 1);
    logger.poll();
    assert_eq!(sink.messages(), ["kept 1"]);
    assert_eq!(logger.stats().dropped, 0);
}

#[test]
fn test_scenario_burst_single_poll() {
    let (logger, sink) = collecting_logger(test_config());
    for i in 0..1500 {
        log_debug!(logger, "i=%d", i);
    }
    let report = logger.poll().unwrap();
    assert_eq!(report.emitted, 1500);

    let expected: Vec<String> = (0..1500).map(|i| format!("i={i}")).collect();
    assert_eq!(sink.messages(), expected);
    assert_eq!(logger.stats().dropped, 0);
}

#[test]
fn test_scenario_malformed_format() {
    let (logger, sink) = collecting_logger(test_config());
    // Each disabled site is reported once, however often it runs.
    for _ in 0..3 {
        log_warn!(logger, "progress 50%");
        log_info!(logger, "%d %d", 1);
    }
    log_info!(logger, "still %s", "fine");
    logger.poll();

    assert_eq!(sink.messages(), ["still fine"]);
    let stats = logger.stats();
    assert_eq!(stats.format_errors, 2);
    assert_eq!(stats.emitted, 1);
    assert_eq!(stats.dropped, 0);
}

#[test]
fn test_argument_kind_mismatch_disables_site() {
    let (logger, sink) = collecting_logger(test_config());
    for _ in 0..2 {
        log_info!(logger, "count=%s", 10);
        log_info!(logger, "n=%d", "abcd");
        log_info!(logger, "ratio=%f", 7i64);
    }
    log_info!(logger, "char %c code %d", 'x', 'x');
    logger.poll();

    assert_eq!(sink.messages(), ["char x code 120"]);
    let stats = logger.stats();
    assert_eq!(stats.format_errors, 3);
    assert_eq!(stats.corrupt_arguments, 0);
    assert_eq!(stats.emitted, 1);
}

#[test]
fn test_threads_keep_their_own_order() {
    const THREADS: usize = 4;
    const PER_THREAD: i32 = 500;
    let (logger, sink) = collecting_logger(test_config());
    let logger = Arc::new(logger);

    let handles: Vec<_> = (0..THREADS as i32)
        .map(|t| {
            let logger = Arc::clone(&logger);
            thread::spawn(move || {
                for seq in 0..PER_THREAD {
                    log_info!(logger, "%d %d", t, seq);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    logger.poll();
    let mut next = [0i32; THREADS];
    let messages = sink.messages();
    assert_eq!(messages.len(), THREADS * PER_THREAD as usize);
    for message in messages {
        let (t, seq) = message.split_once(' ').unwrap();
        let t: usize = t.parse().unwrap();
        let seq: i32 = seq.parse().unwrap();
        assert_eq!(seq, next[t], "thread {t} out of order");
        next[t] += 1;
    }
}

#[test]
fn test_merge_orders_by_timestamp() {
    let (logger, sink, clock) = manual_logger(20);
    log_info!(logger, "second");

    thread::scope(|scope| {
        scope.spawn(|| {
            clock.set(10);
            log_info!(logger, "first");
        });
    });

    clock.set(30);
    log_info!(logger, "third");
    clock.set(100);
    logger.poll();
    assert_eq!(sink.messages(), ["first", "second", "third"]);
}

#[test]
fn test_watermark_holds_back_current_records() {
    let (logger, sink, clock) = manual_logger(1_000);
    log_info!(logger, "at watermark");
    assert_eq!(logger.poll().unwrap().emitted, 0);
    assert!(sink.lines().is_empty());

    clock.advance(1);
    log_info!(logger, "after watermark");
    assert_eq!(logger.poll().unwrap().emitted, 1);
    assert_eq!(sink.messages(), ["at watermark"]);

    clock.advance(1);
    logger.poll();
    assert_eq!(sink.messages(), ["at watermark", "after watermark"]);
}

#[test]
fn test_drain_ignores_watermark() {
    let (logger, sink, _clock) = manual_logger(5);
    log_info!(logger, "pending");
    assert_eq!(logger.poll().unwrap().emitted, 0);
    assert_eq!(logger.drain().emitted, 1);
    assert_eq!(sink.messages(), ["pending"]);
}

#[test]
fn test_exited_thread_buffer_is_retired_after_drain() {
    let (logger, sink) = collecting_logger(test_config());
    let logger = Arc::new(logger);

    let worker = {
        let logger = Arc::clone(&logger);
        thread::spawn(move || {
            for i in 0..3 {
                log_info!(logger, "worker %d", i);
            }
        })
    };
    worker.join().unwrap();

    let first = logger.poll().unwrap();
    assert_eq!(first.emitted, 3);
    assert_eq!(first.retired, 0);

    let second = logger.poll().unwrap();
    assert_eq!(second.retired, 1);
    assert_eq!(logger.stats().buffers_retired, 1);
    assert_eq!(sink.messages(), ["worker 0", "worker 1", "worker 2"]);
}

#[test]
fn test_buffer_with_unread_records_is_not_retired() {
    let (logger, sink, clock) = manual_logger(5);
    let logger = Arc::new(logger);

    let worker = {
        let logger = Arc::clone(&logger);
        thread::spawn(move || log_info!(logger, "late"))
    };
    worker.join().unwrap();

    // The record sits at the watermark; the exited thread's buffer must stay.
    for _ in 0..3 {
        let report = logger.poll().unwrap();
        assert_eq!((report.emitted, report.retired), (0, 0));
    }

    clock.advance(1);
    assert_eq!(logger.poll().unwrap().emitted, 1);
    assert_eq!(logger.poll().unwrap().retired, 1);
    assert_eq!(sink.messages(), ["late"]);
}

#[test]
fn test_full_buffer_drops_records() {
    // 32 blocks; each "%d" record takes 3, with one block kept spare.
    let (logger, sink) = collecting_logger(test_config().with_buffer_capacity(256));
    for i in 0..100 {
        log_info!(logger, "%d", i);
    }
    assert_eq!(logger.stats().dropped, 90);

    logger.poll();
    let expected: Vec<String> = (0..10).map(|i| i.to_string()).collect();
    assert_eq!(sink.messages(), expected);

    // Space is reclaimed once the poller has consumed the records.
    log_info!(logger, "%d", 100);
    logger.poll();
    assert_eq!(sink.messages().last().map(String::as_str), Some("100"));
}

fn shared_site(logger: &Logger, n: i32) {
    log_info!(logger, "n=%d", n);
}

#[test]
fn test_loggers_are_independent() {
    let (a, sink_a) = collecting_logger(test_config());
    let (b, sink_b) = collecting_logger(test_config());

    log_info!(b, "only in b");
    shared_site(&a, 1);
    shared_site(&b, 2);
    shared_site(&a, 3);
    a.poll();
    b.poll();

    assert_eq!(sink_a.messages(), ["n=1", "n=3"]);
    assert_eq!(sink_b.messages(), ["only in b", "n=2"]);
}

#[test]
fn test_sink_errors_are_counted_and_pass_continues() {
    let logger = Logger::new(test_config()).unwrap();
    logger.set_sink(FailingSink);
    log_info!(logger, "a");
    log_info!(logger, "b");
    let report = logger.poll().unwrap();
    assert_eq!(report.sink_errors, 2);
    assert_eq!(report.emitted, 0);
    assert_eq!(logger.stats().sink_errors, 2);
}

#[test]
fn test_explicit_level_macro() {
    let (logger, sink) = collecting_logger(test_config());
    fast_log!(logger, LogLevel::Fatal, "code=%#x", 255u32);
    logger.poll();
    let lines = sink.lines();
    let (_, level, message) = parse_line(&lines[0]);
    assert_eq!((level, message), ("FATAL", "code=0xff"));
}

#[test]
fn test_log_file_set_once() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.log");
    let second = dir.path().join("second.log");

    let logger = Logger::new(test_config()).unwrap();
    logger.set_log_file(&first).unwrap();
    logger.set_log_file(&second).unwrap();
    log_info!(logger, "to file %s", "first");
    logger.poll();
    logger.flush().unwrap();

    let contents = std::fs::read_to_string(&first).unwrap();
    assert!(contents.ends_with("] [INFO] to file first\n"), "{contents}");
    assert!(!second.exists());
}

#[test]
fn test_configured_log_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("configured.log");
    {
        let logger = Logger::new(test_config().with_log_file(&path)).unwrap();
        log_info!(logger, "%s=%u", "answer", 42u32);
        logger.poll();
    }
    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents.lines().count(), 1);
    assert!(contents.ends_with("answer=42\n"), "{contents}");
}
