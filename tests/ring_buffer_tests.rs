use fast_logger::ring_buffer::{channel, SlotState, BLOCK_SIZE, MAX_PAYLOAD_SIZE};
use std::thread;

#[test]
fn test_fifo_order() {
    let (mut tx, mut rx) = channel(1024);
    for i in 0..10u32 {
        assert!(tx.try_push(4, i, |buf| buf.copy_from_slice(&i.to_le_bytes())));
    }
    for i in 0..10u32 {
        assert!(rx.try_pop(|msg| {
            assert_eq!(msg.header.userdata, i);
            assert_eq!(msg.header.state(), SlotState::Sized(12));
            assert_eq!(msg.payload, i.to_le_bytes());
        }));
    }
    assert!(!rx.try_pop(|_| panic!("queue should be empty")));
}

#[test]
fn test_capacity_invariant() {
    // 128 blocks; an 8-byte payload plus header takes 2, and one block is
    // always kept free.
    let (mut tx, mut rx) = channel(128 * BLOCK_SIZE);
    let mut accepted = 0u32;
    while tx.try_push(8, accepted, |buf| buf.fill(0xab)) {
        accepted += 1;
    }
    assert_eq!(accepted, 63);
    assert!(tx.allocate(8).is_none());

    // One free slot at the front is not enough: the spare block is kept.
    rx.advance();
    assert!(tx.allocate(8).is_none());
    rx.advance();
    assert!(tx.try_push(8, 1000, |buf| buf.fill(0xcd)));

    let mut seen = Vec::new();
    while rx.try_pop(|msg| seen.push(msg.header.userdata)) {}
    let expected: Vec<u32> = (2..63).chain(std::iter::once(1000)).collect();
    assert_eq!(seen, expected);
}

#[test]
fn test_wraparound_many_laps() {
    let (mut tx, mut rx) = channel(256);
    for i in 0..10_000u32 {
        let len = (i % 23) as usize;
        assert!(tx.try_push(len, i, |buf| buf.fill(i as u8)), "push {i} failed");
        assert!(rx.try_pop(|msg| {
            assert_eq!(msg.header.userdata, i);
            assert_eq!(msg.payload.len(), len);
            assert!(msg.payload.iter().all(|&b| b == i as u8));
        }));
    }
}

#[test]
fn test_rejects_payload_larger_than_header_allows() {
    let (mut tx, _rx) = channel(1 << 20);
    assert!(tx.allocate(MAX_PAYLOAD_SIZE + 1).is_none());
    assert!(tx.allocate(MAX_PAYLOAD_SIZE).is_some());
}

#[test]
fn test_front_is_stable_until_advance() {
    let (mut tx, mut rx) = channel(1024);
    assert!(tx.try_push(3, 9, |buf| buf.copy_from_slice(b"abc")));
    let first = rx.front().map(|m| m.payload.to_vec());
    let second = rx.front().map(|m| m.payload.to_vec());
    assert_eq!(first, second);
    rx.advance();
    assert!(rx.is_empty());
}

#[test]
fn test_spsc_threads_preserve_order() {
    const MESSAGES: u32 = 100_000;
    let (mut tx, mut rx) = channel(4096);

    let producer = thread::spawn(move || {
        for i in 0..MESSAGES {
            let len = (i % 41) as usize;
            while !tx.try_push(len, i, |buf| buf.fill(i as u8)) {
                thread::yield_now();
            }
        }
    });

    let mut next = 0u32;
    while next < MESSAGES {
        let popped = rx.try_pop(|msg| {
            assert_eq!(msg.header.userdata, next);
            assert_eq!(msg.payload.len(), (next % 41) as usize);
            assert!(msg.payload.iter().all(|&b| b == next as u8));
        });
        if popped {
            next += 1;
        } else {
            thread::yield_now();
        }
    }

    producer.join().unwrap();
    assert!(rx.is_empty());
}
