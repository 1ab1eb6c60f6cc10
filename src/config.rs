//! Tunables shared by the integer backends.
//!
//! The values are fixed at construction time. [`ArrayConfig::from_env`] mirrors the
//! `NHAT` / `INT_CHAIN_MAX` environment overrides, and [`ArrayConfig::environment`]
//! reads them once per process.

use std::sync::OnceLock;

use thiserror::Error;

/// Default leaf-size exponent: leaf arrays hold at most `2^10` elements.
pub const DEFAULT_LEAF_EXPONENT: u32 = 10;
/// Smallest accepted leaf-size exponent.
pub const MIN_LEAF_EXPONENT: u32 = 2;
/// Largest accepted leaf-size exponent; keeps the bucket table from overflowing.
pub const MAX_LEAF_EXPONENT: u32 = 30;
/// Default average chain depth that triggers hash-table growth.
pub const DEFAULT_CHAIN_MAX: usize = 2;

const NHAT_VAR: &str = "NHAT";
const CHAIN_MAX_VAR: &str = "INT_CHAIN_MAX";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("leaf exponent {value} is outside [2, 30]")]
    LeafExponentOutOfRange { value: u32 },
    #[error("chain max must be at least 1")]
    ZeroChainMax,
}

/// Which engine stores non-negative integer subscripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegerBackend {
    /// Hashed array trees bucketed by bit length (`CintArray`).
    #[default]
    Hat,
    /// Prime-sized chained hash table (`IntArray`).
    Hashed,
}

/// Construction-time tunables for an [`Array`](crate::Array) and its backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayConfig {
    leaf_exponent: u32,
    chain_max: usize,
    integer_backend: IntegerBackend,
}

impl Default for ArrayConfig {
    fn default() -> Self {
        Self {
            leaf_exponent: DEFAULT_LEAF_EXPONENT,
            chain_max: DEFAULT_CHAIN_MAX,
            integer_backend: IntegerBackend::Hat,
        }
    }
}

impl ArrayConfig {
    pub fn new(leaf_exponent: u32, chain_max: usize) -> Result<Self, ConfigError> {
        if !(MIN_LEAF_EXPONENT..=MAX_LEAF_EXPONENT).contains(&leaf_exponent) {
            return Err(ConfigError::LeafExponentOutOfRange {
                value: leaf_exponent,
            });
        }
        if chain_max == 0 {
            return Err(ConfigError::ZeroChainMax);
        }
        Ok(Self {
            leaf_exponent,
            chain_max,
            integer_backend: IntegerBackend::Hat,
        })
    }

    pub fn with_integer_backend(mut self, backend: IntegerBackend) -> Self {
        self.integer_backend = backend;
        self
    }

    /// Defaults overridden by `NHAT` and `INT_CHAIN_MAX`.
    ///
    /// `NHAT` is honoured when `1 < NHAT < 32` and then clamped to
    /// [`MAX_LEAF_EXPONENT`]; `INT_CHAIN_MAX` when it is positive. Anything else is
    /// ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// The environment configuration, read on first use and cached for the process.
    pub fn environment() -> &'static ArrayConfig {
        static ENV: OnceLock<ArrayConfig> = OnceLock::new();
        ENV.get_or_init(Self::from_env)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(NHAT_VAR) {
            match raw.trim().parse::<i64>() {
                Ok(v) if v > 1 && v < 32 => {
                    config.leaf_exponent = (v as u32).min(MAX_LEAF_EXPONENT);
                }
                _ => tracing::warn!(value = %raw, "ignoring {NHAT_VAR}"),
            }
        }

        if let Some(raw) = lookup(CHAIN_MAX_VAR) {
            match raw.trim().parse::<i64>() {
                Ok(v) if v > 0 => config.chain_max = v as usize,
                _ => tracing::warn!(value = %raw, "ignoring {CHAIN_MAX_VAR}"),
            }
        }

        tracing::debug!(
            leaf_exponent = config.leaf_exponent,
            chain_max = config.chain_max,
            "array configuration loaded"
        );
        config
    }

    /// `NHAT`: leaf arrays hold at most `2^leaf_exponent` elements.
    #[inline]
    pub fn leaf_exponent(&self) -> u32 {
        self.leaf_exponent
    }

    #[inline]
    pub fn chain_max(&self) -> usize {
        self.chain_max
    }

    #[inline]
    pub fn integer_backend(&self) -> IntegerBackend {
        self.integer_backend
    }

    /// Maximum tolerated capacity waste of the HAT backend, `2^(NHAT + 1)`.
    #[inline]
    pub fn threshold(&self) -> usize {
        1usize << (self.leaf_exponent + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name: &str| {
            vars.iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn defaults() {
        let c = ArrayConfig::default();
        assert_eq!(c.leaf_exponent(), 10);
        assert_eq!(c.chain_max(), 2);
        assert_eq!(c.threshold(), 2048);
        assert_eq!(c.integer_backend(), IntegerBackend::Hat);
    }

    #[test]
    fn new_validates() {
        assert_eq!(
            ArrayConfig::new(1, 2),
            Err(ConfigError::LeafExponentOutOfRange { value: 1 })
        );
        assert_eq!(
            ArrayConfig::new(31, 2),
            Err(ConfigError::LeafExponentOutOfRange { value: 31 })
        );
        assert_eq!(ArrayConfig::new(4, 0), Err(ConfigError::ZeroChainMax));
        let c = ArrayConfig::new(4, 3).unwrap();
        assert_eq!(c.threshold(), 32);
        assert_eq!(c.chain_max(), 3);
    }

    #[test]
    fn env_overrides() {
        let c = ArrayConfig::from_lookup(lookup_from(&[("NHAT", "6"), ("INT_CHAIN_MAX", "5")]));
        assert_eq!(c.leaf_exponent(), 6);
        assert_eq!(c.chain_max(), 5);
    }

    #[test]
    fn env_clamps_and_rejects() {
        let c = ArrayConfig::from_lookup(lookup_from(&[("NHAT", "31")]));
        assert_eq!(c.leaf_exponent(), MAX_LEAF_EXPONENT);

        for bad in ["1", "32", "-4", "ten", ""] {
            let c = ArrayConfig::from_lookup(lookup_from(&[("NHAT", bad)]));
            assert_eq!(c, ArrayConfig::default(), "NHAT {bad:?}");
        }
        for bad in ["0", "-1", "two"] {
            let c = ArrayConfig::from_lookup(lookup_from(&[("INT_CHAIN_MAX", bad)]));
            assert_eq!(c, ArrayConfig::default(), "INT_CHAIN_MAX {bad:?}");
        }
    }

    #[test]
    fn error_messages() {
        assert_eq!(
            ConfigError::LeafExponentOutOfRange { value: 40 }.to_string(),
            "leaf exponent 40 is outside [2, 30]"
        );
    }
}
