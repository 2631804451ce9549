//! Variable-length single-producer/single-consumer byte queue.
//!
//! The arena is an array of 8-byte blocks. Every message starts with a
//! one-block [`MessageHeader`] followed by its payload, rounded up to whole
//! blocks. The header's `size` field doubles as the slot state:
//!
//! * `0` - empty, nothing published here yet
//! * `1` - wrap marker, the reader continues at block 0
//! * `n` - a complete message of `n` bytes including the header
//!
//! The producer always zeroes the block after a message before publishing the
//! message header with `Release`, so the reader (which loads headers with
//! `Acquire`) stops at the first block that was never written. The reader
//! publishes its cursor with `Release` and the producer re-reads it with
//! `Acquire` only when its cached free-space hint looks too small.
//!
//! [`channel`] returns the two halves; each half is `Send` but owns its side
//! of the cursors exclusively, so the single-writer/single-reader discipline
//! is enforced by ownership.

use std::slice;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Size of one arena block, which is also the size of a message header.
pub const BLOCK_SIZE: usize = std::mem::size_of::<u64>();

pub const HEADER_SIZE: usize = BLOCK_SIZE;

/// Largest payload a single message can carry (the header size field is 16 bits).
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize - HEADER_SIZE;

/// Smallest arena that can hold a message plus its terminator block.
pub const MIN_CAPACITY: usize = 4 * BLOCK_SIZE;

/// Largest arena addressable with 32-bit block indices.
pub const MAX_CAPACITY: usize = u32::MAX as usize * BLOCK_SIZE;

const EMPTY: u16 = 0;
const WRAP_MARKER: u16 = 1;

/// Decoded state of the header word at a block position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Empty,
    WrapMarker,
    /// A published message of this many bytes, header included.
    Sized(u16),
}

/// One-block message header.
///
/// `msg_type` is reserved; `userdata` carries the caller's tag (the logger
/// stores the call-site id there).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageHeader {
    pub size: u16,
    pub msg_type: u16,
    pub userdata: u32,
}

impl MessageHeader {
    const fn pack(self) -> u64 {
        self.size as u64 | (self.msg_type as u64) << 16 | (self.userdata as u64) << 32
    }

    const fn unpack(word: u64) -> Self {
        Self {
            size: word as u16,
            msg_type: (word >> 16) as u16,
            userdata: (word >> 32) as u32,
        }
    }

    pub const fn state(&self) -> SlotState {
        match self.size {
            EMPTY => SlotState::Empty,
            WRAP_MARKER => SlotState::WrapMarker,
            n => SlotState::Sized(n),
        }
    }
}

#[inline]
const fn blocks_for(size: u16) -> u32 {
    (size as u32).div_ceil(BLOCK_SIZE as u32)
}

#[repr(align(64))]
struct CacheAligned<T>(T);

struct RingBuffer {
    blocks: Box<[AtomicU64]>,
    read_idx: CacheAligned<AtomicU32>,
}

impl RingBuffer {
    fn block_count(&self) -> u32 {
        self.blocks.len() as u32
    }

    #[inline]
    fn header(&self, idx: u32) -> MessageHeader {
        MessageHeader::unpack(self.blocks[idx as usize].load(Ordering::Acquire))
    }

    /// Pointer to the first payload byte of the message whose header is at `idx`.
    ///
    /// The pointer is derived from the whole arena so it may span several
    /// blocks; the blocks are atomics and therefore interior-mutable.
    #[inline]
    fn payload_ptr(&self, idx: u32) -> *mut u8 {
        let base = self.blocks.as_ptr().cast_mut().cast::<u8>();
        // SAFETY: idx + 1 <= block_count; callers only build slices that end
        // inside the message's own blocks.
        unsafe { base.add((idx as usize + 1) * BLOCK_SIZE) }
    }
}

/// Creates a queue with `capacity` bytes of arena (rounded down to whole blocks).
///
/// # Panics
///
/// Panics if `capacity` is outside `MIN_CAPACITY..=MAX_CAPACITY`.
///
/// # Examples
///
/// ```
/// # use fast_logger::ring_buffer::channel;
/// let (mut tx, mut rx) = channel(1024);
/// assert!(tx.try_push(5, 7, |buf| buf.copy_from_slice(b"hello")));
///
/// let msg = rx.front().unwrap();
/// assert_eq!(msg.header.userdata, 7);
/// assert_eq!(msg.payload, b"hello");
/// rx.advance();
/// assert!(rx.front().is_none());
/// ```
pub fn channel(capacity: usize) -> (Producer, Consumer) {
    assert!(
        (MIN_CAPACITY..=MAX_CAPACITY).contains(&capacity),
        "ring capacity {capacity} outside {MIN_CAPACITY}..={MAX_CAPACITY}"
    );
    let block_count = capacity / BLOCK_SIZE;
    let blocks: Box<[AtomicU64]> = (0..block_count).map(|_| AtomicU64::new(0)).collect();
    let ring = Arc::new(RingBuffer {
        blocks,
        read_idx: CacheAligned(AtomicU32::new(0)),
    });

    let producer = Producer {
        ring: Arc::clone(&ring),
        write_idx: 0,
        free_blocks: block_count as u32,
    };
    let consumer = Consumer { ring, read_idx: 0 };
    (producer, consumer)
}

/// Writing half of the queue.
pub struct Producer {
    ring: Arc<RingBuffer>,
    write_idx: u32,
    /// Lower bound on contiguous free blocks at `write_idx`; refreshed lazily.
    free_blocks: u32,
}

impl Producer {
    pub fn capacity_blocks(&self) -> u32 {
        self.ring.block_count()
    }

    /// Reserves room for a `len`-byte payload.
    ///
    /// Returns `None` when the request does not fit, either at the write
    /// cursor or after wrapping to the start of the arena. Nothing becomes
    /// visible to the consumer until [`Reservation::commit`]; dropping the
    /// reservation abandons it.
    pub fn allocate(&mut self, len: usize) -> Option<Reservation<'_>> {
        if len > MAX_PAYLOAD_SIZE {
            return None;
        }
        let size = (len + HEADER_SIZE) as u16;
        let needed = blocks_for(size);

        // One spare block is always kept for the terminator written on commit.
        if needed >= self.free_blocks {
            let block_count = self.ring.block_count();
            let read_idx = self.ring.read_idx.0.load(Ordering::Acquire);
            if read_idx <= self.write_idx {
                self.free_blocks = block_count - self.write_idx;
                if needed >= self.free_blocks && read_idx != 0 {
                    self.ring.blocks[0].store(0, Ordering::Relaxed);
                    let marker = MessageHeader {
                        size: WRAP_MARKER,
                        ..MessageHeader::default()
                    };
                    self.ring.blocks[self.write_idx as usize].store(marker.pack(), Ordering::Release);
                    self.write_idx = 0;
                    self.free_blocks = read_idx;
                }
            } else {
                self.free_blocks = read_idx - self.write_idx;
            }
            if self.free_blocks <= needed {
                return None;
            }
        }

        Some(Reservation {
            producer: self,
            len,
            size,
        })
    }

    /// Allocates, fills through `write` and commits in one step.
    pub fn try_push<F>(&mut self, len: usize, userdata: u32, write: F) -> bool
    where
        F: FnOnce(&mut [u8]),
    {
        match self.allocate(len) {
            Some(mut reservation) => {
                write(reservation.payload_mut());
                reservation.commit(userdata);
                true
            }
            None => false,
        }
    }
}

/// Space reserved by [`Producer::allocate`], not yet visible to the consumer.
pub struct Reservation<'a> {
    producer: &'a mut Producer,
    len: usize,
    size: u16,
}

impl Reservation<'_> {
    pub fn payload_mut(&mut self) -> &mut [u8] {
        let ptr = self.producer.ring.payload_ptr(self.producer.write_idx);
        // SAFETY: allocate() guaranteed blocks write_idx..write_idx+needed are
        // free and not read by the consumer, which stops at the unpublished
        // header of this slot. The slice ends inside those blocks.
        unsafe { slice::from_raw_parts_mut(ptr, self.len) }
    }

    /// Publishes the message with `userdata` in its header.
    pub fn commit(self, userdata: u32) {
        let producer = self.producer;
        let ring = &producer.ring;
        let needed = blocks_for(self.size);
        let header = MessageHeader {
            size: self.size,
            msg_type: 0,
            userdata,
        };

        ring.blocks[(producer.write_idx + needed) as usize].store(0, Ordering::Relaxed);
        ring.blocks[producer.write_idx as usize].store(header.pack(), Ordering::Release);
        producer.write_idx += needed;
        producer.free_blocks -= needed;
    }
}

/// A published message borrowed from the consumer.
#[derive(Debug, Clone, Copy)]
pub struct Message<'a> {
    pub header: MessageHeader,
    pub payload: &'a [u8],
}

/// Reading half of the queue.
pub struct Consumer {
    ring: Arc<RingBuffer>,
    read_idx: u32,
}

impl Consumer {
    /// The oldest unread message, following a wrap marker if one is in the way.
    pub fn front(&mut self) -> Option<Message<'_>> {
        let mut header = self.ring.header(self.read_idx);
        if header.state() == SlotState::WrapMarker {
            self.read_idx = 0;
            self.ring.read_idx.0.store(0, Ordering::Release);
            header = self.ring.header(0);
        }

        match header.state() {
            SlotState::Sized(size) => {
                let len = (size as usize).saturating_sub(HEADER_SIZE);
                let ptr = self.ring.payload_ptr(self.read_idx);
                // SAFETY: the Acquire load of a Sized header makes the
                // producer's payload writes visible; the producer does not
                // touch these blocks again until read_idx moves past them.
                let payload = unsafe { slice::from_raw_parts(ptr.cast_const(), len) };
                Some(Message { header, payload })
            }
            SlotState::Empty | SlotState::WrapMarker => None,
        }
    }

    /// Releases the current front message. No-op when the queue is empty.
    pub fn advance(&mut self) {
        let size = match self.front() {
            Some(message) => message.header.size,
            None => return,
        };
        self.read_idx += blocks_for(size);
        self.ring.read_idx.0.store(self.read_idx, Ordering::Release);
    }

    pub fn try_pop<F>(&mut self, read: F) -> bool
    where
        F: FnOnce(Message<'_>),
    {
        match self.front() {
            Some(message) => {
                read(message);
                self.advance();
                true
            }
            None => false,
        }
    }

    pub fn is_empty(&mut self) -> bool {
        self.front().is_none()
    }
}
