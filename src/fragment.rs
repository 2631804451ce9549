//! Format string compilation.
//!
//! [`compile`] splits a printf-style format into fragments, each holding the
//! literal text up to and including at most one conversion, and classifies the
//! argument every conversion expects. The result is a [`FragmentProgram`]: a
//! compact byte-code owned by the call site, replayed by the decoder for every
//! record the site produces.
//!
//! Byte-code layout, one entry per fragment, integers little-endian:
//!
//! ```text
//! literal: tag=0 | text_len u16 | text
//! typed:   tag   | prefix_len u16 | spec_len u16 | suffix_len u16 | prefix | spec | suffix
//! ```
//!
//! The tag's low five bits hold the [`ArgType`]; the upper bits are reserved.

use std::ops::Range;

use crate::error::CompileError;
use crate::loggable::ArgKind;
use crate::printf::{ConversionSpec, LengthModifier};

/// Longest format string a program can describe.
pub const MAX_FORMAT_LEN: usize = u16::MAX as usize;

const TAG_MASK: u8 = 0x1f;

/// Argument type expected by a conversion, named after the C type it stands for.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgType {
    /// Literal-only fragment.
    None = 0,
    Int,
    SignedChar,
    Short,
    Long,
    LongLong,
    IntMax,
    Size,
    PtrDiff,
    UnsignedInt,
    UnsignedChar,
    UnsignedShort,
    UnsignedLong,
    UnsignedLongLong,
    UIntMax,
    Double,
    LongDouble,
    Pointer,
    Str,
    WideStr,
    WInt,
}

impl ArgType {
    const TABLE: [ArgType; 21] = [
        ArgType::None,
        ArgType::Int,
        ArgType::SignedChar,
        ArgType::Short,
        ArgType::Long,
        ArgType::LongLong,
        ArgType::IntMax,
        ArgType::Size,
        ArgType::PtrDiff,
        ArgType::UnsignedInt,
        ArgType::UnsignedChar,
        ArgType::UnsignedShort,
        ArgType::UnsignedLong,
        ArgType::UnsignedLongLong,
        ArgType::UIntMax,
        ArgType::Double,
        ArgType::LongDouble,
        ArgType::Pointer,
        ArgType::Str,
        ArgType::WideStr,
        ArgType::WInt,
    ];

    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::TABLE.get((tag & TAG_MASK) as usize).copied()
    }

    /// Maps a length modifier and conversion character to the argument type.
    ///
    /// Returns `None` for combinations printf leaves undefined and for `%n`.
    pub fn classify(length: LengthModifier, conversion: u8) -> Option<Self> {
        use LengthModifier as L;
        let ty = match (conversion, length) {
            (b'd' | b'i', L::None) => ArgType::Int,
            (b'd' | b'i', L::Hh) => ArgType::SignedChar,
            (b'd' | b'i', L::H) => ArgType::Short,
            (b'd' | b'i', L::L) => ArgType::Long,
            (b'd' | b'i', L::Ll) => ArgType::LongLong,
            (b'd' | b'i', L::J) => ArgType::IntMax,
            (b'd' | b'i', L::Z | L::BigZ) => ArgType::Size,
            (b'd' | b'i', L::T) => ArgType::PtrDiff,

            (b'u' | b'o' | b'x' | b'X', L::None) => ArgType::UnsignedInt,
            (b'u' | b'o' | b'x' | b'X', L::Hh) => ArgType::UnsignedChar,
            (b'u' | b'o' | b'x' | b'X', L::H) => ArgType::UnsignedShort,
            (b'u' | b'o' | b'x' | b'X', L::L) => ArgType::UnsignedLong,
            (b'u' | b'o' | b'x' | b'X', L::Ll) => ArgType::UnsignedLongLong,
            (b'u' | b'o' | b'x' | b'X', L::J) => ArgType::UIntMax,
            (b'u' | b'o' | b'x' | b'X', L::Z | L::BigZ) => ArgType::Size,
            (b'u' | b'o' | b'x' | b'X', L::T) => ArgType::PtrDiff,

            (b's', L::None) => ArgType::Str,
            (b's', L::L) => ArgType::WideStr,
            (b'p', L::None) => ArgType::Pointer,
            (b'c', L::None) => ArgType::Int,
            (b'c', L::L) => ArgType::WInt,

            (b'f' | b'F' | b'e' | b'E' | b'g' | b'G' | b'a' | b'A', L::BigL) => ArgType::LongDouble,
            (b'f' | b'F' | b'e' | b'E' | b'g' | b'G' | b'a' | b'A', _) => ArgType::Double,

            _ => return None,
        };
        Some(ty)
    }

    /// Bytes the argument occupies on the wire, `None` for strings.
    pub const fn wire_size(self) -> Option<usize> {
        match self {
            ArgType::None => Some(0),
            ArgType::SignedChar | ArgType::UnsignedChar => Some(1),
            ArgType::Short | ArgType::UnsignedShort => Some(2),
            ArgType::Int | ArgType::UnsignedInt | ArgType::WInt => Some(4),
            ArgType::Long
            | ArgType::LongLong
            | ArgType::IntMax
            | ArgType::UnsignedLong
            | ArgType::UnsignedLongLong
            | ArgType::UIntMax
            | ArgType::Double
            | ArgType::LongDouble => Some(8),
            ArgType::Size | ArgType::PtrDiff | ArgType::Pointer => Some(std::mem::size_of::<usize>()),
            ArgType::Str | ArgType::WideStr => None,
        }
    }

    pub const fn is_string(self) -> bool {
        matches!(self, ArgType::Str | ArgType::WideStr)
    }

    /// Whether an argument of `kind` may feed a conversion of this type.
    ///
    /// Integer conversions (`%c` included) take any integer or character,
    /// `%p` takes a pointer or an unsigned address.
    pub const fn accepts(self, kind: ArgKind) -> bool {
        match self {
            ArgType::None => false,
            ArgType::Double | ArgType::LongDouble => matches!(kind, ArgKind::Float),
            ArgType::Str | ArgType::WideStr => matches!(kind, ArgKind::Str),
            ArgType::Pointer => matches!(kind, ArgKind::Pointer | ArgKind::Unsigned),
            _ => matches!(kind, ArgKind::Signed | ArgKind::Unsigned | ArgKind::Char),
        }
    }
}

/// One fragment of a compiled format.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fragment<'a> {
    /// The whole format, which contains no conversion.
    Literal(&'a str),
    Typed {
        /// Text since the previous conversion. May contain `%%`.
        prefix: &'a str,
        spec_text: &'a str,
        spec: &'a ConversionSpec,
        /// Trailing text after the final conversion; empty on all other fragments.
        suffix: &'a str,
        arg_type: ArgType,
    },
}

/// A compiled format string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentProgram {
    code: Vec<u8>,
    specs: Vec<ConversionSpec>,
    fragment_count: usize,
}

impl FragmentProgram {
    pub fn fragment_count(&self) -> usize {
        self.fragment_count
    }

    /// Number of arguments a record for this program carries.
    pub fn typed_count(&self) -> usize {
        self.specs.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.code
    }

    pub fn iter(&self) -> Fragments<'_> {
        Fragments {
            code: &self.code,
            specs: self.specs.iter(),
        }
    }

    /// Argument types in call order.
    pub fn arg_types(&self) -> impl Iterator<Item = ArgType> + '_ {
        self.iter().filter_map(|fragment| match fragment {
            Fragment::Typed { arg_type, .. } => Some(arg_type),
            Fragment::Literal(_) => None,
        })
    }

    /// Checks argument kinds, in call order, against the program's conversions.
    pub fn check_arguments(&self, kinds: impl IntoIterator<Item = ArgKind>) -> Result<(), CompileError> {
        for (index, (expected, found)) in self.arg_types().zip(kinds).enumerate() {
            if !expected.accepts(found) {
                return Err(CompileError::ArgumentTypeMismatch { index, expected, found });
            }
        }
        Ok(())
    }

    /// Appends the format string the program was compiled from.
    pub fn write_source(&self, out: &mut String) {
        for fragment in self.iter() {
            match fragment {
                Fragment::Literal(text) => out.push_str(text),
                Fragment::Typed {
                    prefix,
                    spec_text,
                    suffix,
                    ..
                } => {
                    out.push_str(prefix);
                    out.push_str(spec_text);
                    out.push_str(suffix);
                }
            }
        }
    }

    fn push_literal(&mut self, text: &str) {
        self.code.push(ArgType::None as u8);
        push_len(&mut self.code, text.len());
        self.code.extend_from_slice(text.as_bytes());
        self.fragment_count += 1;
    }

    fn push_typed(&mut self, prefix: &str, spec_text: &str, suffix: &str, arg_type: ArgType) {
        self.code.push(arg_type as u8);
        push_len(&mut self.code, prefix.len());
        push_len(&mut self.code, spec_text.len());
        push_len(&mut self.code, suffix.len());
        self.code.extend_from_slice(prefix.as_bytes());
        self.code.extend_from_slice(spec_text.as_bytes());
        self.code.extend_from_slice(suffix.as_bytes());
        self.fragment_count += 1;
    }
}

impl<'a> IntoIterator for &'a FragmentProgram {
    type Item = Fragment<'a>;
    type IntoIter = Fragments<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn push_len(code: &mut Vec<u8>, len: usize) {
    debug_assert!(len <= MAX_FORMAT_LEN);
    code.extend_from_slice(&(len as u16).to_le_bytes());
}

/// Iterator over the fragments of a [`FragmentProgram`].
pub struct Fragments<'a> {
    code: &'a [u8],
    specs: std::slice::Iter<'a, ConversionSpec>,
}

impl<'a> Fragments<'a> {
    fn take_u16(&mut self) -> usize {
        let (head, rest) = self.code.split_at(2);
        self.code = rest;
        u16::from_le_bytes([head[0], head[1]]) as usize
    }

    fn take_str(&mut self, len: usize) -> &'a str {
        let (head, rest) = self.code.split_at(len);
        self.code = rest;
        // SAFETY: the byte-code is only built by `compile`, which copies whole
        // `&str` slices cut at ASCII positions.
        unsafe { std::str::from_utf8_unchecked(head) }
    }
}

impl<'a> Iterator for Fragments<'a> {
    type Item = Fragment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let (&tag, rest) = self.code.split_first()?;
        self.code = rest;
        let arg_type = ArgType::from_tag(tag)
            .unwrap_or_else(|| panic!("fragment program holds unknown tag {tag:#04x}"));

        if arg_type == ArgType::None {
            let len = self.take_u16();
            return Some(Fragment::Literal(self.take_str(len)));
        }

        let prefix_len = self.take_u16();
        let spec_len = self.take_u16();
        let suffix_len = self.take_u16();
        let spec = self
            .specs
            .next()
            .unwrap_or_else(|| panic!("fragment program has more typed fragments than conversions"));
        Some(Fragment::Typed {
            prefix: self.take_str(prefix_len),
            spec_text: self.take_str(spec_len),
            spec,
            suffix: self.take_str(suffix_len),
            arg_type,
        })
    }
}

fn excerpt(format: &str, at: usize) -> String {
    format[at..].chars().take(8).collect()
}

struct Conversion {
    prefix: Range<usize>,
    spec: Range<usize>,
    arg_type: ArgType,
}

/// Compiles `format` for a call site passing `declared_args` arguments.
///
/// A backslash makes the scanner skip the following character. A run of
/// consecutive `%` of even length is literal text; an odd run must end in a
/// valid conversion.
///
/// # Examples
///
/// ```
/// # use fast_logger::fragment::{compile, ArgType};
/// let program = compile("%d items in %s", 2).unwrap();
/// let types: Vec<_> = program.arg_types().collect();
/// assert_eq!(types, [ArgType::Int, ArgType::Str]);
/// ```
pub fn compile(format: &str, declared_args: usize) -> Result<FragmentProgram, CompileError> {
    if format.len() > MAX_FORMAT_LEN {
        return Err(CompileError::FormatTooLong {
            len: format.len(),
            max: MAX_FORMAT_LEN,
        });
    }

    let bytes = format.as_bytes();
    let mut conversions: Vec<Conversion> = Vec::new();
    let mut specs = Vec::new();
    let mut fragment_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'%' => {
                let run_start = i;
                while bytes.get(i) == Some(&b'%') {
                    i += 1;
                }
                if (i - run_start) % 2 == 0 {
                    continue;
                }

                let at = i - 1;
                let spec = ConversionSpec::parse(&format[at..]).ok_or_else(|| {
                    CompileError::MalformedSpecifier {
                        offset: at,
                        text: excerpt(format, at),
                    }
                })?;
                let end = at + spec.len;
                if spec.has_dynamic_width() || spec.has_dynamic_precision() {
                    return Err(CompileError::DynamicWidthOrPrecision {
                        spec: format[at..end].to_string(),
                    });
                }
                let arg_type = ArgType::classify(spec.length, spec.conversion).ok_or_else(|| {
                    CompileError::UnsupportedConversion {
                        spec: format[at..end].to_string(),
                    }
                })?;

                conversions.push(Conversion {
                    prefix: fragment_start..at,
                    spec: at..end,
                    arg_type,
                });
                specs.push(spec);
                fragment_start = end;
                i = end;
            }
            _ => i += 1,
        }
    }

    if conversions.len() != declared_args {
        return Err(CompileError::ArgumentCountMismatch {
            expected: conversions.len(),
            declared: declared_args,
        });
    }

    let mut program = FragmentProgram {
        code: Vec::with_capacity(format.len() + 7 * conversions.len().max(1)),
        specs,
        fragment_count: 0,
    };

    if conversions.is_empty() {
        program.push_literal(format);
        return Ok(program);
    }

    let last = conversions.len() - 1;
    for (index, conversion) in conversions.into_iter().enumerate() {
        let suffix = if index == last { &format[fragment_start..] } else { "" };
        program.push_typed(
            &format[conversion.prefix],
            &format[conversion.spec],
            suffix,
            conversion.arg_type,
        );
    }
    Ok(program)
}
