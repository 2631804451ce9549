//! printf conversion grammar and single-value rendering.
//!
//! [`ConversionSpec::parse`] recognises
//! `%[flags][width][.precision][length]conversion` with flags `-+ #0`, decimal
//! or `*` width/precision, lengths `hh h l ll j z Z t L` and conversions
//! `d i u o x X f F e E g G a A c s p n`. [`ConversionSpec::render`] formats one
//! value the way glibc's `printf` does for that conversion.

use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags {
    pub left: bool,
    pub plus: bool,
    pub space: bool,
    pub alternate: bool,
    pub zero: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Count {
    Fixed(usize),
    /// `*`: taken from an extra argument in C.
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LengthModifier {
    #[default]
    None,
    Hh,
    H,
    L,
    Ll,
    J,
    Z,
    BigZ,
    T,
    BigL,
}

impl LengthModifier {
    pub const fn as_str(self) -> &'static str {
        match self {
            LengthModifier::None => "",
            LengthModifier::Hh => "hh",
            LengthModifier::H => "h",
            LengthModifier::L => "l",
            LengthModifier::Ll => "ll",
            LengthModifier::J => "j",
            LengthModifier::Z => "z",
            LengthModifier::BigZ => "Z",
            LengthModifier::T => "t",
            LengthModifier::BigL => "L",
        }
    }
}

const CONVERSIONS: &[u8] = b"diuoxXfFeEgGaAcspn";

/// A value ready to be rendered by a conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    Signed(i64),
    Unsigned(u64),
    Float(f64),
    Char(u32),
    Str(&'a str),
    Pointer(usize),
}

impl Value<'_> {
    fn as_i64(self) -> i64 {
        match self {
            Value::Signed(v) => v,
            Value::Unsigned(v) => v as i64,
            Value::Float(v) => v as i64,
            Value::Char(v) => v as i64,
            Value::Pointer(v) => v as i64,
            Value::Str(_) => 0,
        }
    }

    fn as_u64(self) -> u64 {
        match self {
            Value::Signed(v) => v as u64,
            Value::Unsigned(v) => v,
            Value::Float(v) => v as u64,
            Value::Char(v) => v as u64,
            Value::Pointer(v) => v as u64,
            Value::Str(_) => 0,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Value::Signed(v) => v as f64,
            Value::Unsigned(v) => v as f64,
            Value::Float(v) => v,
            Value::Char(v) => v as f64,
            Value::Pointer(v) => v as f64,
            Value::Str(_) => 0.0,
        }
    }
}

/// One parsed `%...` conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionSpec {
    pub flags: Flags,
    pub width: Option<Count>,
    pub precision: Option<Count>,
    pub length: LengthModifier,
    pub conversion: u8,
    /// Bytes consumed from the input, including the leading `%`.
    pub len: usize,
}

/// Largest fixed width or precision a conversion may carry.
pub const MAX_COUNT: usize = u16::MAX as usize;

fn parse_count(bytes: &[u8], i: &mut usize) -> Option<Option<Count>> {
    if bytes.get(*i) == Some(&b'*') {
        *i += 1;
        return Some(Some(Count::Dynamic));
    }
    let start = *i;
    while bytes.get(*i).is_some_and(u8::is_ascii_digit) {
        *i += 1;
    }
    if start == *i {
        return Some(None);
    }
    let digits = std::str::from_utf8(&bytes[start..*i]).ok()?;
    digits
        .parse::<usize>()
        .ok()
        .filter(|&n| n <= MAX_COUNT)
        .map(|n| Some(Count::Fixed(n)))
}

impl ConversionSpec {
    /// Parses a conversion at the start of `text`, which must begin with `%`.
    ///
    /// Returns `None` if the text does not match the grammar.
    pub fn parse(text: &str) -> Option<Self> {
        let bytes = text.as_bytes();
        if bytes.first() != Some(&b'%') {
            return None;
        }
        let mut i = 1;

        let mut flags = Flags::default();
        while let Some(&c) = bytes.get(i) {
            match c {
                b'-' => flags.left = true,
                b'+' => flags.plus = true,
                b' ' => flags.space = true,
                b'#' => flags.alternate = true,
                b'0' => flags.zero = true,
                _ => break,
            }
            i += 1;
        }

        let width = parse_count(bytes, &mut i)?;
        let precision = if bytes.get(i) == Some(&b'.') {
            i += 1;
            // A bare '.' means precision zero.
            Some(parse_count(bytes, &mut i)?.unwrap_or(Count::Fixed(0)))
        } else {
            None
        };

        let (length, consumed) = match (bytes.get(i), bytes.get(i + 1)) {
            (Some(b'h'), Some(b'h')) => (LengthModifier::Hh, 2),
            (Some(b'h'), _) => (LengthModifier::H, 1),
            (Some(b'l'), Some(b'l')) => (LengthModifier::Ll, 2),
            (Some(b'l'), _) => (LengthModifier::L, 1),
            (Some(b'j'), _) => (LengthModifier::J, 1),
            (Some(b'z'), _) => (LengthModifier::Z, 1),
            (Some(b'Z'), _) => (LengthModifier::BigZ, 1),
            (Some(b't'), _) => (LengthModifier::T, 1),
            (Some(b'L'), _) => (LengthModifier::BigL, 1),
            _ => (LengthModifier::None, 0),
        };
        i += consumed;

        let conversion = *bytes.get(i)?;
        if !CONVERSIONS.contains(&conversion) {
            return None;
        }
        i += 1;

        Some(Self {
            flags,
            width,
            precision,
            length,
            conversion,
            len: i,
        })
    }

    pub fn has_dynamic_width(&self) -> bool {
        self.width == Some(Count::Dynamic)
    }

    pub fn has_dynamic_precision(&self) -> bool {
        self.precision == Some(Count::Dynamic)
    }

    pub fn is_signed_conversion(&self) -> bool {
        matches!(self.conversion, b'd' | b'i')
    }

    fn width(&self) -> usize {
        match self.width {
            Some(Count::Fixed(w)) => w,
            _ => 0,
        }
    }

    fn precision(&self) -> Option<usize> {
        match self.precision {
            Some(Count::Fixed(p)) => Some(p),
            _ => None,
        }
    }

    /// Appends `value` formatted by this conversion to `out`.
    pub fn render(&self, value: Value<'_>, out: &mut String) {
        match self.conversion {
            b'd' | b'i' => self.render_signed(value.as_i64(), out),
            b'u' | b'o' | b'x' | b'X' => self.render_unsigned(value.as_u64(), out),
            b'c' => {
                let code = match value {
                    Value::Char(c) => c,
                    other => other.as_u64() as u32,
                };
                let c = char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER);
                let mut buf = [0u8; 4];
                self.pad(out, "", "", c.encode_utf8(&mut buf), false);
            }
            b's' => {
                let s = match value {
                    Value::Str(s) => s,
                    _ => "",
                };
                let s = match self.precision() {
                    Some(p) if p < s.len() => truncate_at_boundary(s, p),
                    _ => s,
                };
                self.pad(out, "", "", s, false);
            }
            b'p' => {
                let addr = value.as_u64();
                if addr == 0 {
                    self.pad(out, "", "", "(nil)", false);
                } else {
                    let digits = self.integer_digits(addr, 16, false);
                    self.pad(out, "", "0x", &digits, self.precision.is_none());
                }
            }
            b'f' | b'F' | b'e' | b'E' | b'g' | b'G' | b'a' | b'A' => {
                self.render_float(value.as_f64(), out)
            }
            _ => out.push_str("[error arg]"),
        }
    }

    fn render_signed(&self, v: i64, out: &mut String) {
        let digits = self.integer_digits(v.unsigned_abs(), 10, false);
        let sign = if v < 0 {
            "-"
        } else if self.flags.plus {
            "+"
        } else if self.flags.space {
            " "
        } else {
            ""
        };
        self.pad(out, sign, "", &digits, self.precision.is_none());
    }

    fn render_unsigned(&self, v: u64, out: &mut String) {
        let zero_ok = self.precision.is_none();
        match self.conversion {
            b'o' => {
                let mut digits = self.integer_digits(v, 8, false);
                if self.flags.alternate && !digits.starts_with('0') {
                    digits.insert(0, '0');
                }
                self.pad(out, "", "", &digits, zero_ok);
            }
            b'x' | b'X' => {
                let upper = self.conversion == b'X';
                let digits = self.integer_digits(v, 16, upper);
                let prefix = match (self.flags.alternate && v != 0, upper) {
                    (false, _) => "",
                    (true, false) => "0x",
                    (true, true) => "0X",
                };
                self.pad(out, "", prefix, &digits, zero_ok);
            }
            _ => {
                let digits = self.integer_digits(v, 10, false);
                self.pad(out, "", "", &digits, zero_ok);
            }
        }
    }

    /// Digits of `v` in `radix`, left-padded with zeros to the precision.
    fn integer_digits(&self, v: u64, radix: u32, upper: bool) -> String {
        let precision = self.precision();
        if precision == Some(0) && v == 0 {
            return String::new();
        }
        let digits = match (radix, upper) {
            (8, _) => format!("{v:o}"),
            (16, false) => format!("{v:x}"),
            (16, true) => format!("{v:X}"),
            _ => v.to_string(),
        };
        match precision {
            Some(p) if p > digits.len() => format!("{}{}", "0".repeat(p - digits.len()), digits),
            _ => digits,
        }
    }

    fn render_float(&self, v: f64, out: &mut String) {
        let upper = self.conversion.is_ascii_uppercase();
        let sign = if v.is_sign_negative() {
            "-"
        } else if self.flags.plus {
            "+"
        } else if self.flags.space {
            " "
        } else {
            ""
        };

        if !v.is_finite() {
            let body = match (v.is_nan(), upper) {
                (true, false) => "nan",
                (true, true) => "NAN",
                (false, false) => "inf",
                (false, true) => "INF",
            };
            self.pad(out, sign, "", body, false);
            return;
        }

        let a = v.abs();
        let alt = self.flags.alternate;
        let precision = self.precision();
        match self.conversion.to_ascii_lowercase() {
            b'f' => self.pad(out, sign, "", &fixed(a, precision.unwrap_or(6), alt), true),
            b'e' => self.pad(out, sign, "", &exponential(a, precision.unwrap_or(6), alt, upper), true),
            b'g' => self.pad(out, sign, "", &general(a, precision.unwrap_or(6), alt, upper), true),
            _ => {
                let prefix = if upper { "0X" } else { "0x" };
                self.pad(out, sign, prefix, &hex_float(a, precision, alt, upper), true)
            }
        }
    }

    /// Applies width, justification and zero padding.
    ///
    /// Widths count bytes, as C does.
    fn pad(&self, out: &mut String, sign: &str, prefix: &str, body: &str, zero_ok: bool) {
        let content = sign.len() + prefix.len() + body.len();
        let width = self.width();
        if content >= width {
            out.push_str(sign);
            out.push_str(prefix);
            out.push_str(body);
            return;
        }
        let fill = width - content;
        if self.flags.left {
            out.push_str(sign);
            out.push_str(prefix);
            out.push_str(body);
            out.extend(std::iter::repeat(' ').take(fill));
        } else if self.flags.zero && zero_ok {
            out.push_str(sign);
            out.push_str(prefix);
            out.extend(std::iter::repeat('0').take(fill));
            out.push_str(body);
        } else {
            out.extend(std::iter::repeat(' ').take(fill));
            out.push_str(sign);
            out.push_str(prefix);
            out.push_str(body);
        }
    }
}

fn truncate_at_boundary(s: &str, max: usize) -> &str {
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn fixed(a: f64, precision: usize, alt: bool) -> String {
    let mut s = format!("{a:.precision$}");
    if alt && precision == 0 {
        s.push('.');
    }
    s
}

/// Splits Rust's `{:e}` output into mantissa and decimal exponent.
fn rust_exponential(a: f64, precision: usize) -> (String, i32) {
    let s = format!("{a:.precision$e}");
    match s.split_once('e') {
        Some((mantissa, exp)) => (mantissa.to_string(), exp.parse().unwrap_or(0)),
        None => (s, 0),
    }
}

fn exponential(a: f64, precision: usize, alt: bool, upper: bool) -> String {
    let (mut s, exp) = rust_exponential(a, precision);
    if alt && precision == 0 {
        s.push('.');
    }
    s.push(if upper { 'E' } else { 'e' });
    s.push(if exp < 0 { '-' } else { '+' });
    let _ = write!(s, "{:02}", exp.unsigned_abs());
    s
}

fn general(a: f64, precision: usize, alt: bool, upper: bool) -> String {
    let p = precision.max(1);
    let exp = if a == 0.0 { 0 } else { rust_exponential(a, p - 1).1 };
    let mut s = if exp < -4 || exp >= p as i32 {
        exponential(a, p - 1, alt, upper)
    } else {
        fixed(a, (p as i32 - 1 - exp) as usize, alt)
    };
    if !alt {
        strip_fraction_zeros(&mut s);
    }
    s
}

fn strip_fraction_zeros(s: &mut String) {
    let exp_at = s.find(['e', 'E']).unwrap_or(s.len());
    let (mantissa, exponent) = s.split_at(exp_at);
    if mantissa.contains('.') {
        let trimmed = mantissa.trim_end_matches('0').trim_end_matches('.');
        *s = format!("{trimmed}{exponent}");
    }
}

/// `%a` body without the `0x` prefix, e.g. `1.8p+1` for 3.0.
fn hex_float(a: f64, precision: Option<usize>, alt: bool, upper: bool) -> String {
    const MANTISSA_BITS: u32 = 52;
    const MANTISSA_DIGITS: usize = 13;

    let bits = a.to_bits();
    let biased = ((bits >> MANTISSA_BITS) & 0x7ff) as i32;
    let mantissa = bits & ((1u64 << MANTISSA_BITS) - 1);
    let (lead, exp) = match (a == 0.0, biased) {
        (true, _) => (0u64, 0),
        (false, 0) => (0u64, -1022),
        (false, _) => (1u64, biased - 1023),
    };

    let (lead, digits) = match precision {
        None => {
            let full = format!("{mantissa:013x}");
            (lead, full.trim_end_matches('0').to_string())
        }
        Some(p) if p >= MANTISSA_DIGITS => {
            let zeros = "0".repeat(p - MANTISSA_DIGITS);
            (lead, format!("{mantissa:013x}{zeros}"))
        }
        Some(p) => {
            // Round half to even at the requested hex digit.
            let shift = ((MANTISSA_DIGITS - p) * 4) as u32;
            let full = (lead << MANTISSA_BITS) | mantissa;
            let rem = full & ((1u64 << shift) - 1);
            let half = 1u64 << (shift - 1);
            let mut q = full >> shift;
            if rem > half || (rem == half && q & 1 == 1) {
                q += 1;
            }
            let frac_bits = (p * 4) as u32;
            let frac = q & ((1u64 << frac_bits) - 1);
            let digits = if p == 0 {
                String::new()
            } else {
                format!("{frac:0p$x}")
            };
            (q >> frac_bits, digits)
        }
    };

    let mut s = lead.to_string();
    if !digits.is_empty() || alt {
        s.push('.');
    }
    s.push_str(&digits);
    s.push('p');
    s.push(if exp < 0 { '-' } else { '+' });
    let _ = write!(s, "{}", exp.unsigned_abs());
    if upper {
        s.make_ascii_uppercase();
    }
    s
}

/// Appends literal format text, collapsing `%%` to `%`.
pub fn write_literal(text: &str, out: &mut String) {
    let mut rest = text;
    while let Some(at) = rest.find('%') {
        out.push_str(&rest[..=at]);
        rest = &rest[at + 1..];
        if let Some(stripped) = rest.strip_prefix('%') {
            rest = stripped;
        }
    }
    out.push_str(rest);
}
