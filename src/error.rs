use std::io;

use crate::fragment::ArgType;
use crate::loggable::ArgKind;

/// Reasons a format string cannot be turned into a fragment program.
///
/// A call site whose format fails to compile is disabled: it is reported once
/// and never queues records.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    /// A `%` that is not part of a `%%` pair and does not start a valid conversion.
    #[error("malformed conversion at byte {offset}: {text:?}")]
    MalformedSpecifier { offset: usize, text: String },

    /// The conversion parsed but its length/specifier pair has no argument type.
    #[error("unsupported conversion {spec:?}")]
    UnsupportedConversion { spec: String },

    /// `*` width or precision; the extra argument is not carried on the wire.
    #[error("dynamic width or precision is not supported: {spec:?}")]
    DynamicWidthOrPrecision { spec: String },

    #[error("format expects {expected} arguments but the call site passes {declared}")]
    ArgumentCountMismatch { expected: usize, declared: usize },

    /// An argument's value family cannot feed its conversion, e.g. a string for `%d`.
    #[error("argument {index} is {found:?} but the conversion expects {expected:?}")]
    ArgumentTypeMismatch { index: usize, expected: ArgType, found: ArgKind },

    #[error("format string is {len} bytes, the fragment program holds at most {max}")]
    FormatTooLong { len: usize, max: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("buffer capacity of {bytes} bytes is below the minimum of {min}")]
    BufferTooSmall { bytes: usize, min: usize },

    #[error("buffer capacity of {bytes} bytes exceeds the maximum of {max}")]
    BufferTooLarge { bytes: usize, max: usize },

    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level {0:?}")]
pub struct ParseLevelError(pub String);
