//! Per-thread staging buffers.
//!
//! A staging buffer is a ring buffer plus the bookkeeping the poller needs to
//! manage it across thread lifetimes: a label naming the producing thread and
//! a drop-request flag. The producing thread owns the [`StagingProducer`];
//! dropping it (normally from the thread's thread-local destructor) raises the
//! flag. The poller owns the [`StagingConsumer`] and is the only party that
//! releases the arena, once it has seen the flag and an empty queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::ring_buffer::{self, Consumer, Message, Producer, Reservation};

#[derive(Debug)]
struct StagingState {
    thread_label: String,
    drop_requested: AtomicBool,
    consumer_dropped: AtomicBool,
}

/// Creates a staging buffer of `capacity` bytes for the thread named `thread_label`.
pub fn staging_buffer(capacity: usize, thread_label: impl Into<String>) -> (StagingProducer, StagingConsumer) {
    let (producer, consumer) = ring_buffer::channel(capacity);
    let state = Arc::new(StagingState {
        thread_label: thread_label.into(),
        drop_requested: AtomicBool::new(false),
        consumer_dropped: AtomicBool::new(false),
    });
    (
        StagingProducer {
            queue: producer,
            state: Arc::clone(&state),
        },
        StagingConsumer {
            queue: consumer,
            state,
        },
    )
}

pub struct StagingProducer {
    queue: Producer,
    state: Arc<StagingState>,
}

impl StagingProducer {
    #[inline]
    pub fn allocate(&mut self, len: usize) -> Option<Reservation<'_>> {
        self.queue.allocate(len)
    }

    pub fn thread_label(&self) -> &str {
        &self.state.thread_label
    }

    /// True once the consumer is gone; nothing queued here will be read.
    pub fn is_orphaned(&self) -> bool {
        self.state.consumer_dropped.load(Ordering::Acquire)
    }
}

impl Drop for StagingProducer {
    fn drop(&mut self) {
        // Release: every commit made by this producer happens-before the flag.
        self.state.drop_requested.store(true, Ordering::Release);
    }
}

pub struct StagingConsumer {
    queue: Consumer,
    state: Arc<StagingState>,
}

impl StagingConsumer {
    #[inline]
    pub fn front(&mut self) -> Option<Message<'_>> {
        self.queue.front()
    }

    #[inline]
    pub fn advance(&mut self) {
        self.queue.advance()
    }

    pub fn thread_label(&self) -> &str {
        &self.state.thread_label
    }

    pub fn drop_requested(&self) -> bool {
        self.state.drop_requested.load(Ordering::Acquire)
    }

    /// True when the owning thread has gone and every message has been read.
    ///
    /// The flag is sampled before the queue so that a message committed just
    /// before the flag was raised is always observed.
    pub fn is_retirable(&mut self) -> bool {
        let drop_requested = self.drop_requested();
        drop_requested && self.queue.is_empty()
    }
}

impl Drop for StagingConsumer {
    fn drop(&mut self) {
        self.state.consumer_dropped.store(true, Ordering::Release);
    }
}

/// Label for the calling thread: the kernel thread id.
#[cfg(target_os = "linux")]
pub fn current_thread_label() -> String {
    // SAFETY: gettid has no preconditions.
    let tid = unsafe { libc::syscall(libc::SYS_gettid) };
    tid.to_string()
}

/// Label for the calling thread: the numeric part of the Rust thread id.
#[cfg(not(target_os = "linux"))]
pub fn current_thread_label() -> String {
    let id = format!("{:?}", std::thread::current().id());
    id.chars().filter(char::is_ascii_digit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_sets_flag() {
        let (producer, mut consumer) = staging_buffer(256, "t1");
        assert!(!consumer.drop_requested());
        assert!(!consumer.is_retirable());
        drop(producer);
        assert!(consumer.drop_requested());
        assert!(consumer.is_retirable());
    }

    #[test]
    fn test_not_retirable_while_messages_remain() {
        let (mut producer, mut consumer) = staging_buffer(256, "t2");
        producer.allocate(4).unwrap().commit(0);
        drop(producer);
        assert!(!consumer.is_retirable());
        consumer.advance();
        assert!(consumer.is_retirable());
        assert_eq!(consumer.thread_label(), "t2");
    }

    #[test]
    fn test_consumer_drop_orphans_producer() {
        let (producer, consumer) = staging_buffer(256, "t3");
        assert!(!producer.is_orphaned());
        drop(consumer);
        assert!(producer.is_orphaned());
    }

    #[test]
    fn test_current_thread_label_is_numeric() {
        let label = current_thread_label();
        assert!(!label.is_empty());
        assert!(label.chars().all(|c| c.is_ascii_digit()));
    }
}
