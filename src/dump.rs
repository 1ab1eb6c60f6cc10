//! Diagnostic dumps.
//!
//! Every representation prints a short header (backend, tunables, element counts,
//! estimated memory) and, when asked, one line per element. Elements that are
//! themselves arrays dump recursively under their full path, e.g. `a[1][x]`.

use std::io::{self, Write};

use crate::subscript::Key;

/// What a dump prints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DumpOptions {
    /// List every element after the header.
    pub elements: bool,
    /// Indentation depth, four spaces per level.
    pub level: usize,
}

impl DumpOptions {
    pub fn summary() -> Self {
        Self::default()
    }

    pub fn full() -> Self {
        Self {
            elements: true,
            level: 0,
        }
    }

    /// The same options one level deeper.
    pub fn nested(&self) -> Self {
        Self {
            level: self.level + 1,
            ..*self
        }
    }
}

/// How an element describes itself in a dump.
pub trait DumpValue {
    fn dump_element(&self, out: &mut dyn Write, path: &str, opts: &DumpOptions) -> io::Result<()>;
}

macro_rules! scalar_dump_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl DumpValue for $ty {
                fn dump_element(
                    &self,
                    out: &mut dyn Write,
                    path: &str,
                    opts: &DumpOptions,
                ) -> io::Result<()> {
                    indent(out, opts.level)?;
                    writeln!(out, "{path} = {self:?}")
                }
            }
        )*
    };
}

scalar_dump_value!(bool, i32, i64, u32, u64, usize, f64, String);

pub(crate) fn indent(out: &mut dyn Write, level: usize) -> io::Result<()> {
    write!(out, "{:width$}", "", width = level * 4)
}

/// `name: value` at the given level.
pub(crate) fn field(
    out: &mut dyn Write,
    level: usize,
    name: &str,
    value: impl std::fmt::Display,
) -> io::Result<()> {
    indent(out, level)?;
    writeln!(out, "{name}: {value}")
}

pub(crate) fn elements<'a, V, I>(
    out: &mut dyn Write,
    name: &str,
    entries: I,
    opts: &DumpOptions,
) -> io::Result<()>
where
    V: DumpValue + 'a,
    I: Iterator<Item = (Key<'a>, &'a V)>,
{
    for (key, value) in entries {
        value.dump_element(out, &format!("{name}[{key}]"), opts)?;
    }
    Ok(())
}

#[inline]
pub(crate) fn to_kilobytes(bytes: usize) -> f64 {
    bytes as f64 / 1024.0
}
