//! Register map of the CFD block.
//!
//! All offsets here are **register indices**, not byte offsets; use
//! [`crate::axi::byte_offset`] for the bus address. Each engine owns a
//! 12-register window starting at `2 + 12·e`: eight inputs followed by four
//! outputs.
//!
//! ## Input order is reversed
//!
//! The input registers of a window are wired in the opposite order to the
//! logical feature vector: feature 0 lands in the *highest* input register of
//! the window and feature 7 in the lowest. This is fixed in the bitstream and
//! [`reversed_input_slot`] is the single place that encodes it. Outputs are
//! not reversed.
//!
//! ```text
//! engine e window (base = 2 + 12·e)
//!   base+0 .. base+7   inputs   x7 x6 x5 x4 x3 x2 x1 x0
//!   base+8 .. base+11  outputs  y0 y1 y2 y3
//! ```

use crate::engine::{EngineIndex, ENGINE_COUNT};

// ── Global registers ─────────────────────────────────────────────────────────

/// Control register. Writing a start mask then `0` pulses the selected engines.
pub const CONTROL: usize = 0;

/// Status register. Bit `2·e + 1` is set while engine `e` is busy.
pub const STATUS: usize = 1;

// ── Engine windows ───────────────────────────────────────────────────────────

/// Features per input sample.
pub const FEATURE_COUNT: usize = 8;

/// Values per prediction result.
pub const RESULT_COUNT: usize = 4;

/// Registers per engine window.
pub const WINDOW_STRIDE: usize = FEATURE_COUNT + RESULT_COUNT;

/// First input register of engine 0.
pub const INPUT_BASE: usize = 2;

/// First output register of engine 0.
pub const OUTPUT_BASE: usize = INPUT_BASE + FEATURE_COUNT;

/// Registers in the block: two globals plus one window per engine.
pub const REGISTER_COUNT: usize = INPUT_BASE + ENGINE_COUNT * WINDOW_STRIDE;

/// Physical slot of logical feature `feature` inside an input window.
///
/// # Panics
///
/// Panics if `feature >= FEATURE_COUNT`.
#[must_use]
pub const fn reversed_input_slot(feature: usize) -> usize {
    assert!(feature < FEATURE_COUNT, "feature index out of range");
    FEATURE_COUNT - 1 - feature
}

/// Register index of input feature `feature` of `engine`:
/// `2 + 12·engine + (7 − feature)`.
///
/// # Panics
///
/// Panics if `feature >= FEATURE_COUNT`.
#[must_use]
pub const fn input_offset(engine: EngineIndex, feature: usize) -> usize {
    INPUT_BASE + WINDOW_STRIDE * engine.get() + reversed_input_slot(feature)
}

/// Register index of output `result` of `engine`: `10 + 12·engine + result`.
///
/// # Panics
///
/// Panics if `result >= RESULT_COUNT`.
#[must_use]
pub const fn output_offset(engine: EngineIndex, result: usize) -> usize {
    assert!(result < RESULT_COUNT, "result index out of range");
    OUTPUT_BASE + WINDOW_STRIDE * engine.get() + result
}

/// Index of the control register.
#[must_use]
pub const fn control_offset() -> usize {
    CONTROL
}

/// Index of the status register.
#[must_use]
pub const fn status_offset() -> usize {
    STATUS
}

// ── Status register bit definitions ──────────────────────────────────────────

pub mod status {
    //! Status register bits.

    use crate::engine::EngineIndex;

    /// Busy bit of `engine`: `1 << (2·engine + 1)`.
    #[must_use]
    pub const fn busy(engine: EngineIndex) -> u32 {
        1 << (2 * engine.get() + 1)
    }

    /// Busy bits of every engine.
    pub const ALL_BUSY: u32 = 0b1010_1010;

    /// Whether `engine` reads busy in a raw status word.
    #[must_use]
    pub const fn is_busy(status: u32, engine: EngineIndex) -> bool {
        status & busy(engine) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_offsets_follow_reversed_formula() {
        for e in EngineIndex::ALL {
            for f in 0..FEATURE_COUNT {
                assert_eq!(input_offset(e, f), 2 + 12 * e.get() + (7 - f));
            }
        }
        // Feature 0 of engine 0 is wired to register 9, feature 7 to register 2.
        assert_eq!(input_offset(EngineIndex::E0, 0), 9);
        assert_eq!(input_offset(EngineIndex::E0, 7), 2);
    }

    #[test]
    fn output_offsets_are_ascending() {
        for e in EngineIndex::ALL {
            for r in 0..RESULT_COUNT {
                assert_eq!(output_offset(e, r), 10 + 12 * e.get() + r);
            }
        }
        assert_eq!(output_offset(EngineIndex::E3, 3), REGISTER_COUNT - 1);
    }

    #[test]
    fn windows_are_disjoint() {
        let mut seen = [false; REGISTER_COUNT];
        seen[control_offset()] = true;
        seen[status_offset()] = true;
        for e in EngineIndex::ALL {
            let regs = (0..FEATURE_COUNT)
                .map(|f| input_offset(e, f))
                .chain((0..RESULT_COUNT).map(|r| output_offset(e, r)));
            for idx in regs {
                assert!(!seen[idx], "register {idx} mapped twice");
                seen[idx] = true;
            }
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn busy_bits() {
        assert_eq!(status::busy(EngineIndex::E0), 0b10);
        assert_eq!(status::busy(EngineIndex::E3), 0b1000_0000);
        let all = EngineIndex::ALL.iter().fold(0, |m, e| m | status::busy(*e));
        assert_eq!(all, status::ALL_BUSY);
        assert!(status::is_busy(0b1000, EngineIndex::E1));
        assert!(!status::is_busy(0b0101_0101, EngineIndex::E2));
    }

    #[test]
    #[should_panic(expected = "feature index out of range")]
    fn feature_index_checked() {
        let _ = input_offset(EngineIndex::E0, FEATURE_COUNT);
    }
}
