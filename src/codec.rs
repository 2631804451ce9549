//! Record payload encoding and replay.
//!
//! A queued record payload is the producer's timestamp followed by one blob
//! per argument, in call order:
//!
//! ```text
//! timestamp u64 | prefix u32 | bytes | prefix u32 | bytes | ...
//! ```
//!
//! Each prefix holds the blob length in its low 24 bits and the argument's
//! [`ArgKind`] in the top byte.
//!
//! The decoder walks a call site's [`FragmentProgram`] and the blobs in
//! lockstep. A blob whose kind or length does not fit the conversion's
//! argument type is rendered as [`ERROR_ARG`] and counted; it never stops the
//! decoder.

use crate::fragment::{ArgType, Fragment, FragmentProgram};
use crate::loggable::{ArgKind, Loggable};
use crate::printf::{self, ConversionSpec, Value};

pub const TIMESTAMP_SIZE: usize = 8;
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Largest blob a length prefix can describe.
pub const MAX_BLOB_LEN: usize = (1 << KIND_SHIFT) - 1;

const KIND_SHIFT: u32 = 24;

/// Marker written in place of an argument that cannot be decoded.
pub const ERROR_ARG: &str = "[error arg]";

/// Payload bytes needed to queue a record with `args`.
#[inline]
pub fn record_size(args: &[&dyn Loggable]) -> usize {
    args.iter()
        .fold(TIMESTAMP_SIZE, |size, arg| size + LENGTH_PREFIX_SIZE + arg.encoded_len())
}

/// Serializes a record into `buf`, which must hold `record_size(args)` bytes.
///
/// Returns the number of bytes written.
#[inline]
pub fn encode_record(buf: &mut [u8], timestamp: u64, args: &[&dyn Loggable]) -> usize {
    buf[..TIMESTAMP_SIZE].copy_from_slice(&timestamp.to_le_bytes());
    let mut at = TIMESTAMP_SIZE;
    for arg in args {
        let len = arg.encoded_len();
        debug_assert!(len <= MAX_BLOB_LEN, "argument of {len} bytes does not fit a blob prefix");
        let prefix = (len as u32 & MAX_BLOB_LEN as u32) | ((arg.kind() as u32) << KIND_SHIFT);
        buf[at..at + LENGTH_PREFIX_SIZE].copy_from_slice(&prefix.to_le_bytes());
        at += LENGTH_PREFIX_SIZE;
        arg.encode(&mut buf[at..at + len]);
        at += len;
    }
    at
}

/// Timestamp of an encoded record, `None` if the payload is too short.
pub fn record_timestamp(payload: &[u8]) -> Option<u64> {
    let bytes = payload.get(..TIMESTAMP_SIZE)?;
    bytes.try_into().ok().map(u64::from_le_bytes)
}

/// One argument as found on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blob<'a> {
    /// `None` when the prefix carries an unknown kind.
    pub kind: Option<ArgKind>,
    pub bytes: &'a [u8],
}

/// Iterator over the length-prefixed argument blobs of a payload.
///
/// Stops at the first prefix that runs past the end of the payload.
pub struct Blobs<'a> {
    data: &'a [u8],
}

impl<'a> Blobs<'a> {
    /// Blobs of a full record payload, timestamp included.
    pub fn new(payload: &'a [u8]) -> Self {
        Self {
            data: payload.get(TIMESTAMP_SIZE..).unwrap_or(&[]),
        }
    }
}

impl<'a> Iterator for Blobs<'a> {
    type Item = Blob<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let prefix = self.data.get(..LENGTH_PREFIX_SIZE)?;
        let prefix = u32::from_le_bytes(prefix.try_into().ok()?);
        let len = (prefix & MAX_BLOB_LEN as u32) as usize;
        let kind = ArgKind::from_u8((prefix >> KIND_SHIFT) as u8);
        let rest = &self.data[LENGTH_PREFIX_SIZE..];
        if len > rest.len() {
            self.data = &[];
            return None;
        }
        let (bytes, rest) = rest.split_at(len);
        self.data = rest;
        Some(Blob { kind, bytes })
    }
}

fn read_unsigned(blob: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes[..blob.len()].copy_from_slice(blob);
    u64::from_le_bytes(bytes)
}

fn read_signed(blob: &[u8]) -> i64 {
    let shift = 64 - 8 * blob.len() as u32;
    ((read_unsigned(blob) << shift) as i64) >> shift
}

fn decode_value<'a>(spec: &ConversionSpec, arg_type: ArgType, blob: Blob<'a>) -> Option<Value<'a>> {
    if !blob.kind.is_some_and(|kind| arg_type.accepts(kind)) {
        return None;
    }
    let blob = blob.bytes;
    if arg_type.is_string() {
        return std::str::from_utf8(blob).ok().map(Value::Str);
    }
    if arg_type.wire_size() != Some(blob.len()) || blob.is_empty() {
        return None;
    }
    let value = match arg_type {
        ArgType::Double | ArgType::LongDouble => Value::Float(f64::from_le_bytes(blob.try_into().ok()?)),
        ArgType::Pointer => Value::Pointer(read_unsigned(blob) as usize),
        _ if spec.conversion == b'c' => Value::Char(read_unsigned(blob) as u32),
        _ if spec.is_signed_conversion() => Value::Signed(read_signed(blob)),
        _ => Value::Unsigned(read_unsigned(blob)),
    };
    Some(value)
}

/// Replays a record payload through `program`, appending the message to `out`.
///
/// Returns the number of arguments rendered as [`ERROR_ARG`].
pub fn decode_record(program: &FragmentProgram, payload: &[u8], out: &mut String) -> usize {
    let mut blobs = Blobs::new(payload);
    let mut corrupt = 0;

    for fragment in program {
        match fragment {
            Fragment::Literal(text) => printf::write_literal(text, out),
            Fragment::Typed {
                prefix,
                spec,
                suffix,
                arg_type,
                ..
            } => {
                printf::write_literal(prefix, out);
                match blobs.next().and_then(|blob| decode_value(spec, arg_type, blob)) {
                    Some(value) => spec.render(value, out),
                    None => {
                        out.push_str(ERROR_ARG);
                        corrupt += 1;
                    }
                }
                printf::write_literal(suffix, out);
            }
        }
    }
    corrupt
}
