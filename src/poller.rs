//! Merge and emission of queued records.
//!
//! One pass of [`Poller::run`] takes the watermark `T` sampled by the caller
//! and emits every record that is safe to decode, in timestamp order across
//! all staging buffers:
//!
//! 1. buffers without a cached head are peeked; empty buffers whose thread
//!    has exited are retired and freed here;
//! 2. a min-heap keyed by head timestamp is built over the remaining buffers;
//! 3. the root is decoded and emitted while its call site is visible and its
//!    timestamp is below `T`; the buffer is then advanced, its head refreshed
//!    and pushed back.
//!
//! Records from one buffer always leave in the order they were queued.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{Local, TimeZone};

use crate::clock::Clock;
use crate::codec;
use crate::level::LogLevel;
use crate::registry::CallSiteInfo;
use crate::sink::Sink;
use crate::staging_buffer::StagingConsumer;

/// Renders the line prefix `[tid] [YYYY-MM-DD HH:MM:SS mmm.uuu] [LEVEL] `.
///
/// The date and time part is rendered in local time and cached until the
/// integer second changes.
#[derive(Debug, Default)]
pub struct RecordFormatter {
    cached_second: Option<u64>,
    cached_text: String,
}

impl RecordFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_prefix(&mut self, out: &mut String, thread_label: &str, timestamp_ns: u64, level: LogLevel) {
        let second = timestamp_ns / 1_000_000_000;
        let fraction = timestamp_ns % 1_000_000_000;
        if self.cached_second != Some(second) {
            self.cached_text = render_second(second);
            self.cached_second = Some(second);
        }
        let _ = write!(
            out,
            "[{thread_label}] [{} {:03}.{:03}] [{level}] ",
            self.cached_text,
            fraction / 1_000_000,
            (fraction / 1_000) % 1_000
        );
    }
}

fn render_second(second: u64) -> String {
    match Local.timestamp_opt(second as i64, 0).earliest() {
        Some(time) => time.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => second.to_string(),
    }
}

/// Counts from one poll pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub emitted: u64,
    pub corrupt_arguments: u64,
    pub sink_errors: u64,
    pub retired: u64,
}

#[derive(Debug, Clone, Copy)]
struct Head {
    timestamp: u64,
    site: u32,
}

struct ManagedBuffer {
    consumer: StagingConsumer,
    head: Option<Head>,
}

fn peek(consumer: &mut StagingConsumer) -> Option<Head> {
    consumer.front().map(|message| Head {
        // A payload too short to hold a timestamp sorts first and decodes as corrupt.
        timestamp: codec::record_timestamp(message.payload).unwrap_or(0),
        site: message.header.userdata,
    })
}

/// Consumer side of a logger: owns every staging buffer, the decoder-visible
/// call sites and the sink.
///
/// Not reentrant; the owning logger serializes passes.
pub struct Poller {
    buffers: Vec<ManagedBuffer>,
    sites: Vec<Arc<CallSiteInfo>>,
    formatter: RecordFormatter,
    line: String,
    sink: Box<dyn Sink>,
}

impl Poller {
    pub fn new(sink: Box<dyn Sink>) -> Self {
        Self {
            buffers: Vec::new(),
            sites: Vec::new(),
            formatter: RecordFormatter::new(),
            line: String::with_capacity(256),
            sink,
        }
    }

    /// Replaces the sink, returning the previous one.
    pub fn set_sink(&mut self, sink: Box<dyn Sink>) -> Box<dyn Sink> {
        std::mem::replace(&mut self.sink, sink)
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.sink.flush()
    }

    /// Makes call sites visible to the decoder. Sites must arrive in id order.
    pub fn publish(&mut self, sites: impl IntoIterator<Item = Arc<CallSiteInfo>>) {
        for site in sites {
            debug_assert_eq!(site.id as usize, self.sites.len(), "call sites published out of order");
            self.sites.push(site);
        }
    }

    /// Takes ownership of newly created staging buffers.
    pub fn adopt(&mut self, consumers: impl IntoIterator<Item = StagingConsumer>) {
        for consumer in consumers {
            tracing::debug!(thread = consumer.thread_label(), "adopted staging buffer");
            self.buffers.push(ManagedBuffer { consumer, head: None });
        }
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn visible_sites(&self) -> usize {
        self.sites.len()
    }

    /// Runs one merge pass, emitting records timestamped strictly before `watermark`.
    pub fn run(&mut self, watermark: u64, clock: &dyn Clock) -> PassReport {
        let mut report = PassReport::default();
        let Poller {
            buffers,
            sites,
            formatter,
            line,
            sink,
        } = self;

        let mut index = 0;
        while index < buffers.len() {
            let buffer = &mut buffers[index];
            if buffer.head.is_none() {
                buffer.head = peek(&mut buffer.consumer);
                if buffer.head.is_none() && buffer.consumer.is_retirable() {
                    let retired = buffers.swap_remove(index);
                    tracing::debug!(thread = retired.consumer.thread_label(), "retired staging buffer");
                    report.retired += 1;
                    continue;
                }
            }
            index += 1;
        }

        let mut heap: BinaryHeap<Reverse<(u64, usize)>> = buffers
            .iter()
            .enumerate()
            .filter_map(|(index, buffer)| buffer.head.map(|head| Reverse((head.timestamp, index))))
            .collect();

        while let Some(&Reverse((timestamp, index))) = heap.peek() {
            if timestamp >= watermark {
                break;
            }
            let buffer = &mut buffers[index];
            let Some(head) = buffer.head else {
                heap.pop();
                continue;
            };
            let Some(site) = sites.get(head.site as usize) else {
                break;
            };
            heap.pop();

            line.clear();
            formatter.write_prefix(
                line,
                buffer.consumer.thread_label(),
                clock.cycles_to_nanoseconds(head.timestamp),
                site.level,
            );
            let corrupt = match buffer.consumer.front() {
                Some(message) => codec::decode_record(&site.program, message.payload, line),
                None => 0,
            };
            line.push('\n');
            buffer.consumer.advance();

            if corrupt > 0 {
                tracing::warn!(site = site.id, corrupt, "record arguments did not match the call-site format");
                report.corrupt_arguments += corrupt as u64;
            }
            match sink.append(line.as_bytes()) {
                Ok(()) => report.emitted += 1,
                Err(err) => {
                    tracing::error!(error = %err, "failed to write log record");
                    report.sink_errors += 1;
                }
            }

            buffer.head = peek(&mut buffer.consumer);
            if let Some(next) = buffer.head {
                heap.push(Reverse((next.timestamp, index)));
            }
        }

        report
    }
}
