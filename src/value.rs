//! A scalar-or-array element, for arrays of arrays.

use std::fmt;
use std::io::{self, Write};

use thiserror::Error;

use crate::dump::{self, DumpOptions, DumpValue};
use crate::subscript::{format_number, Subscript};
use crate::Array;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValueError {
    #[error("attempt to use scalar `{key}` as an array")]
    ScalarAsArray { key: String },
}

/// An element that is either a scalar or a nested array owned by its slot.
///
/// `Clone` copies nested arrays deeply.
#[derive(Clone, Default)]
pub enum Value {
    /// Installed by a lookup and never assigned.
    #[default]
    Uninit,
    Num(f64),
    Str(String),
    Array(Box<Array<Value>>),
}

impl Value {
    #[inline]
    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    pub fn as_num(&self) -> Option<f64> {
        match self {
            Value::Num(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array<Value>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Num(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Uninit => f.write_str("<uninit>"),
            Value::Num(n) => f.write_str(&format_number(*n)),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Array(a) => fmt::Debug::fmt(&**a, f),
        }
    }
}

impl DumpValue for Value {
    fn dump_element(&self, out: &mut dyn Write, path: &str, opts: &DumpOptions) -> io::Result<()> {
        match self {
            Value::Array(a) => a.dump_labeled(out, "sub-array", path, opts),
            scalar => {
                dump::indent(out, opts.level)?;
                writeln!(out, "{path} = {scalar:?}")
            }
        }
    }
}

impl Array<Value> {
    /// The array nested at `key` (`a[key][...]`), created if the slot is unset.
    pub fn subarray<'k>(
        &mut self,
        key: impl Into<Subscript<'k>>,
    ) -> Result<&mut Array<Value>, ValueError> {
        let sub = key.into();
        let config = *self.config();
        let slot = self.lookup(sub);
        if let Value::Uninit = slot {
            *slot = Value::Array(Box::new(Array::with_config(config)));
        }
        match slot {
            Value::Array(a) => Ok(&mut **a),
            _ => Err(ValueError::ScalarAsArray {
                key: sub.to_text().into_owned(),
            }),
        }
    }
}
