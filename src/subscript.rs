//! Subscript values and integer classification.
//!
//! A subscript is routed to an integer backend only when it is a "clean" 32-bit
//! integer: a number with no fractional part, or text that is exactly what decimal
//! formatting of that number would produce. `"3"` and `3` name the same element;
//! `"03"`, `"+3"` and `"3.0"` do not.

use std::borrow::Cow;
use std::fmt;

/// A subscript as handed over by the interpreter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Subscript<'a> {
    /// A pure number.
    Num(f64),
    /// A pure string.
    Str(&'a str),
    /// A value that carries both forms (e.g. numeric-looking user input).
    StrNum(f64, &'a str),
}

/// Outcome of [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyClass {
    /// Integer in `0..=i32::MAX`.
    Integer(u32),
    /// Integer in `i32::MIN..=-1`.
    Negative(i32),
    /// Anything else: fractional, out of range, or non-canonical text.
    Opaque,
}

impl KeyClass {
    /// The key as a signed 32-bit integer, for backends that accept negatives.
    #[inline]
    pub fn as_i32(self) -> Option<i32> {
        match self {
            KeyClass::Integer(k) => Some(k as i32),
            KeyClass::Negative(k) => Some(k),
            KeyClass::Opaque => None,
        }
    }

    #[inline]
    pub fn is_integer(self) -> bool {
        !matches!(self, KeyClass::Opaque)
    }
}

/// Classify a subscript. Pure: computed once per operation and threaded through.
pub fn classify(sub: &Subscript<'_>) -> KeyClass {
    match *sub {
        Subscript::Num(d) => classify_number(d),
        Subscript::Str(s) => parse_standard_integer(s).map_or(KeyClass::Opaque, classify_i32),
        Subscript::StrNum(d, s) => {
            if standard_integer_string(s) {
                classify_number(d)
            } else {
                KeyClass::Opaque
            }
        }
    }
}

#[inline]
fn classify_i32(n: i32) -> KeyClass {
    if n >= 0 {
        KeyClass::Integer(n as u32)
    } else {
        KeyClass::Negative(n)
    }
}

fn classify_number(d: f64) -> KeyClass {
    if d >= f64::from(i32::MIN) && d <= f64::from(i32::MAX) && d == d.trunc() {
        classify_i32(d as i32)
    } else {
        KeyClass::Opaque
    }
}

/// `true` iff `s` looks like `0` or `-?[1-9][0-9]*`.
fn standard_integer_string(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes == b"0" {
        return true;
    }
    let digits = bytes.strip_prefix(b"-").unwrap_or(bytes);
    match digits.split_first() {
        Some((first, rest)) => matches!(*first, b'1'..=b'9') && rest.iter().all(u8::is_ascii_digit),
        None => false,
    }
}

/// Parse `s` as a standard integer string that fits in 32 bits.
fn parse_standard_integer(s: &str) -> Option<i32> {
    if !standard_integer_string(s) {
        return None;
    }
    // Canonical digits only, so the only failure left is overflow.
    s.parse::<i32>().ok()
}

impl<'a> Subscript<'a> {
    #[inline]
    pub fn classify(&self) -> KeyClass {
        classify(self)
    }

    /// The textual form used by string-keyed storage.
    pub fn to_text(&self) -> Cow<'a, str> {
        match *self {
            Subscript::Str(s) | Subscript::StrNum(_, s) => Cow::Borrowed(s),
            Subscript::Num(d) => Cow::Owned(format_number(d)),
        }
    }
}

/// Integral values print without a fraction; everything else uses the shortest
/// representation that round-trips.
pub(crate) fn format_number(d: f64) -> String {
    if d.is_finite() && d == d.trunc() && d.abs() < 1e16 {
        format!("{}", d as i64)
    } else if d.is_nan() {
        String::from("nan")
    } else if d.is_infinite() {
        String::from(if d > 0.0 { "inf" } else { "-inf" })
    } else {
        format!("{d}")
    }
}

impl From<f64> for Subscript<'_> {
    fn from(d: f64) -> Self {
        Subscript::Num(d)
    }
}

impl From<i32> for Subscript<'_> {
    fn from(n: i32) -> Self {
        Subscript::Num(f64::from(n))
    }
}

impl From<u32> for Subscript<'_> {
    fn from(n: u32) -> Self {
        Subscript::Num(f64::from(n))
    }
}

impl<'a> From<&'a str> for Subscript<'a> {
    fn from(s: &'a str) -> Self {
        Subscript::Str(s)
    }
}

impl<'a> From<&'a String> for Subscript<'a> {
    fn from(s: &'a String) -> Self {
        Subscript::Str(s.as_str())
    }
}

// =============================================================================
// Keys produced by iteration
// =============================================================================

/// An index yielded by iteration, borrowed from the array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key<'a> {
    Int(i64),
    Str(&'a str),
}

impl Key<'_> {
    pub fn to_owned_key(&self) -> OwnedKey {
        match *self {
            Key::Int(n) => OwnedKey::Int(n),
            Key::Str(s) => OwnedKey::Str(s.into()),
        }
    }
}

impl fmt::Display for Key<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(n) => write!(f, "{n}"),
            Key::Str(s) => f.write_str(s),
        }
    }
}

/// An owned [`Key`], e.g. for delete-while-iterating loops.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OwnedKey {
    Int(i64),
    Str(Box<str>),
}

impl OwnedKey {
    /// A subscript that resolves to the element this key was read from.
    pub fn as_subscript(&self) -> Subscript<'_> {
        match self {
            OwnedKey::Int(n) => Subscript::Num(*n as f64),
            OwnedKey::Str(s) => Subscript::Str(s),
        }
    }
}

impl fmt::Display for OwnedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnedKey::Int(n) => write!(f, "{n}"),
            OwnedKey::Str(s) => f.write_str(s),
        }
    }
}
