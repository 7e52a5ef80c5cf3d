//! Driver configuration
//!
//! Defaults are the deployed bitstream's values. `from_env` lets a board
//! with a different address assignment or Q-format override them without a
//! rebuild; command-line flags override the environment in turn.
//!
//! | Variable | Field |
//! |----------|-------|
//! | `CFD_BASE_ADDR` | `base_addr` (hex with `0x`, or decimal) |
//! | `CFD_FRACTIONAL_BITS` | `fractional_bits` |
//! | `CFD_DEVICE` | `device_path` |
//! | `CFD_MAX_POLLS` | `wait = Bounded { max_polls }` |

use crate::error::{CfdError, Result};
use cfd_chip::axi::{BLOCK_LEN, DEFAULT_BASE_ADDR, DEFAULT_FRACTIONAL_BITS};
use cfd_chip::QFormat;
use std::path::PathBuf;
use tracing::debug;

/// Default device node used to map the block.
pub const DEFAULT_DEVICE_PATH: &str = "/dev/mem";

/// How the orchestrator waits for a triggered batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitStrategy {
    /// Spin on the busy bit with no limit. Matches the verified hardware
    /// behaviour; a stuck engine hangs the caller.
    #[default]
    Spin,

    /// Give up with `CfdError::Timeout` after `max_polls` status reads.
    Bounded {
        /// Status reads before giving up
        max_polls: u64,
    },
}

/// Configuration of one CFD block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// Physical base address of the register block
    pub base_addr: u64,

    /// Fractional bits of the Q-format, shared by every engine
    pub fractional_bits: u32,

    /// Device node mapped for register access (`/dev/mem` or `/dev/uioN`)
    pub device_path: PathBuf,

    /// Bytes to map from `base_addr`
    pub block_len: usize,

    /// Completion wait used by the orchestrator
    pub wait: WaitStrategy,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            base_addr: DEFAULT_BASE_ADDR,
            fractional_bits: DEFAULT_FRACTIONAL_BITS,
            device_path: PathBuf::from(DEFAULT_DEVICE_PATH),
            block_len: BLOCK_LEN,
            wait: WaitStrategy::Spin,
        }
    }
}

impl DriverConfig {
    /// Defaults overridden by `CFD_*` environment variables
    ///
    /// # Errors
    ///
    /// Returns error if a variable is set but cannot be parsed, or the
    /// resulting configuration is invalid.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    ///
    /// # Errors
    ///
    /// Returns error if a value cannot be parsed or fails validation.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(v) = lookup("CFD_BASE_ADDR") {
            self.base_addr = parse_u64(&v)
                .ok_or_else(|| CfdError::invalid_config(format!("CFD_BASE_ADDR={v}")))?;
        }
        if let Some(v) = lookup("CFD_FRACTIONAL_BITS") {
            self.fractional_bits = v
                .trim()
                .parse()
                .map_err(|_| CfdError::invalid_config(format!("CFD_FRACTIONAL_BITS={v}")))?;
        }
        if let Some(v) = lookup("CFD_DEVICE") {
            self.device_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("CFD_MAX_POLLS") {
            let max_polls = parse_u64(&v)
                .ok_or_else(|| CfdError::invalid_config(format!("CFD_MAX_POLLS={v}")))?;
            self.wait = WaitStrategy::Bounded { max_polls };
        }

        self.validate()?;
        debug!("Driver config: {self:?}");
        Ok(self)
    }

    /// Check the configuration against the register map
    ///
    /// # Errors
    ///
    /// Returns error if the fractional width does not fit a 32-bit register,
    /// the block is too short for the register map, or a bounded wait has a
    /// zero poll limit.
    pub fn validate(&self) -> Result<()> {
        self.qformat()?;
        if self.block_len < BLOCK_LEN {
            return Err(CfdError::invalid_config(format!(
                "block length {} bytes is shorter than the register map ({BLOCK_LEN} bytes)",
                self.block_len
            )));
        }
        if self.base_addr % 4 != 0 {
            return Err(CfdError::invalid_config(format!(
                "base address {:#x} is not word aligned",
                self.base_addr
            )));
        }
        if self.wait == (WaitStrategy::Bounded { max_polls: 0 }) {
            return Err(CfdError::invalid_config("bounded wait needs at least one poll"));
        }
        Ok(())
    }

    /// Q-format described by `fractional_bits`
    ///
    /// # Errors
    ///
    /// Returns error if `fractional_bits` exceeds 31.
    pub fn qformat(&self) -> Result<QFormat> {
        QFormat::new(self.fractional_bits).ok_or_else(|| {
            CfdError::invalid_config(format!(
                "{} fractional bits do not fit a 32-bit register",
                self.fractional_bits
            ))
        })
    }
}

/// Parse `0x`-prefixed hex or decimal, allowing `_` separators.
fn parse_u64(s: &str) -> Option<u64> {
    let s = s.trim().replace('_', "");
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_deployment() {
        let cfg = DriverConfig::default();
        assert_eq!(cfg.fractional_bits, 15);
        assert_eq!(cfg.block_len, 200);
        assert_eq!(cfg.wait, WaitStrategy::Spin);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn env_overrides() {
        let cfg = DriverConfig::default()
            .with_overrides(lookup(&[
                ("CFD_BASE_ADDR", "0x8000_0000"),
                ("CFD_FRACTIONAL_BITS", "12"),
                ("CFD_DEVICE", "/dev/uio0"),
                ("CFD_MAX_POLLS", "5000"),
            ]))
            .unwrap();
        assert_eq!(cfg.base_addr, 0x8000_0000);
        assert_eq!(cfg.qformat().unwrap().frac_bits(), 12);
        assert_eq!(cfg.device_path, PathBuf::from("/dev/uio0"));
        assert_eq!(cfg.wait, WaitStrategy::Bounded { max_polls: 5000 });
    }

    #[test]
    fn rejects_bad_values() {
        let bad = [
            ("CFD_BASE_ADDR", "nowhere"),
            ("CFD_BASE_ADDR", "0x43c00002"),
            ("CFD_FRACTIONAL_BITS", "32"),
            ("CFD_MAX_POLLS", "0"),
        ];
        for (k, v) in bad {
            let err = DriverConfig::default().with_overrides(lookup(&[(k, v)]));
            assert!(
                matches!(err, Err(CfdError::InvalidConfig { .. })),
                "{k}={v} accepted"
            );
        }
    }

    #[test]
    fn short_block_rejected() {
        let cfg = DriverConfig {
            block_len: 64,
            ..DriverConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parses_decimal_and_hex() {
        assert_eq!(parse_u64("1136656384"), Some(0x43C0_0000));
        assert_eq!(parse_u64(" 0X43C0_0000 "), Some(0x43C0_0000));
        assert_eq!(parse_u64("0xZZ"), None);
    }
}
