// SPDX-License-Identifier: AGPL-3.0-only

//! Optional timing breakdown of a prediction run
//!
//! A `CfdModel` built `with_telemetry()` charges wall time to four buckets:
//!
//! ```text
//! conversion  f64 ⇄ Q-format encode/decode
//! axi         register loads/stores of inputs and outputs
//! hardware    start pulse + completion wait (charged by the orchestrator)
//! total       whole run (charged by the orchestrator)
//! other       total − hardware − axi − conversion
//! ```
//!
//! Without telemetry no clock is read at all.

use std::fmt;
use std::time::Duration;

/// Accumulated time per phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerfCounters {
    /// Start pulse and completion wait
    pub hardware: Duration,
    /// Register traffic for inputs and outputs
    pub axi: Duration,
    /// Q-format encode/decode
    pub conversion: Duration,
    /// Whole run
    pub total: Duration,
    /// Batches dispatched
    pub batches: u64,
}

/// Phase a span of time is charged to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Start pulse and completion wait
    Hardware,
    /// Register traffic
    Axi,
    /// Q-format conversion
    Conversion,
    /// Whole run
    Total,
}

impl PerfCounters {
    /// Add `elapsed` to `phase`.
    pub fn charge(&mut self, phase: Phase, elapsed: Duration) {
        let slot = match phase {
            Phase::Hardware => &mut self.hardware,
            Phase::Axi => &mut self.axi,
            Phase::Conversion => &mut self.conversion,
            Phase::Total => &mut self.total,
        };
        *slot += elapsed;
    }

    /// Breakdown with shares of the total.
    #[must_use]
    pub fn report(&self) -> PerfReport {
        let other = self
            .total
            .saturating_sub(self.hardware)
            .saturating_sub(self.axi)
            .saturating_sub(self.conversion);
        PerfReport {
            total: self.total,
            hardware: self.hardware,
            axi: self.axi,
            conversion: self.conversion,
            other,
            batches: self.batches,
        }
    }
}

/// Timing breakdown of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerfReport {
    /// Whole run
    pub total: Duration,
    /// Start pulse and completion wait
    pub hardware: Duration,
    /// Register traffic
    pub axi: Duration,
    /// Q-format conversion
    pub conversion: Duration,
    /// Everything else (loop, buffers)
    pub other: Duration,
    /// Batches dispatched
    pub batches: u64,
}

impl PerfReport {
    /// Fraction of the total spent in `part` (0 when nothing was measured).
    #[must_use]
    pub fn share(&self, part: Duration) -> f64 {
        let total = self.total.as_secs_f64();
        if total == 0.0 {
            return 0.0;
        }
        part.as_secs_f64() / total
    }

    /// Hardware time over register-traffic time.
    #[must_use]
    pub fn hardware_to_memory_ratio(&self) -> f64 {
        let axi = self.axi.as_secs_f64();
        if axi == 0.0 {
            return 0.0;
        }
        self.hardware.as_secs_f64() / axi
    }
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1_000.0
}

impl fmt::Display for PerfReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total elapsed        : {:.3} ms ({} batches)", ms(self.total), self.batches)?;
        writeln!(
            f,
            "  Hardware           : {:.3} ms  ({:.1}%)",
            ms(self.hardware),
            100.0 * self.share(self.hardware)
        )?;
        writeln!(
            f,
            "  Memory (AXI-Lite)  : {:.3} ms  ({:.1}%)",
            ms(self.axi),
            100.0 * self.share(self.axi)
        )?;
        writeln!(
            f,
            "  FP ⇄ Q conversion  : {:.3} ms  ({:.1}%)",
            ms(self.conversion),
            100.0 * self.share(self.conversion)
        )?;
        writeln!(
            f,
            "  Other              : {:.3} ms  ({:.1}%)",
            ms(self.other),
            100.0 * self.share(self.other)
        )?;
        write!(f, "Hardware/memory ratio: {:.3}", self.hardware_to_memory_ratio())
    }
}
