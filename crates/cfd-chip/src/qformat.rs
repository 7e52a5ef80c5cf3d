//! Signed Q-format codec for the engine data registers.
//!
//! Every input and output register carries a two's-complement 32-bit value
//! scaled by `2^frac_bits`. The fractional width is a synthesis parameter of
//! the bitstream (15 on the deployed design), so it travels as run-time
//! configuration rather than a constant.
//!
//! Out-of-range values are **not** saturated: the scaled value is reduced
//! modulo 2^32 into `i32`, exactly like a native integer store would. The
//! register consumers in the fabric depend on that bit pattern.

/// Widest fractional part that keeps `2^frac_bits` inside a 32-bit word.
pub const MAX_FRACTIONAL_BITS: u32 = 31;

/// Encode `x` as `round(x · 2^frac_bits)` reduced to 32-bit two's complement.
///
/// Rounds half away from zero. Values whose scaled magnitude is at or above
/// 2^31 wrap; nothing saturates, however large the value. `NaN` and the
/// infinities have no residue modulo 2^32 and encode as `0`.
#[must_use]
pub fn encode(x: f64, frac_bits: i32) -> i32 {
    wrap_to_i32((x * 2f64.powi(frac_bits)).round())
}

/// Decode a register value: `q · 2^-frac_bits`.
#[must_use]
pub fn decode(q: i32, frac_bits: i32) -> f64 {
    f64::from(q) * 2f64.powi(-frac_bits)
}

const WORD_MODULUS: f64 = 4_294_967_296.0;

// Exact modulo-2^32 reduction for every finite integral `v`; non-finite gives 0.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_possible_wrap)]
fn wrap_to_i32(v: f64) -> i32 {
    v.rem_euclid(WORD_MODULUS) as u32 as i32
}

/// A fixed fractional-bit width, shared by every engine of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QFormat {
    frac_bits: u32,
}

impl QFormat {
    /// Q16.15, the format of the deployed bitstream.
    pub const DEPLOYED: Self = Self {
        frac_bits: crate::axi::DEFAULT_FRACTIONAL_BITS,
    };

    /// Build a format; `None` when `frac_bits` exceeds [`MAX_FRACTIONAL_BITS`].
    #[must_use]
    pub const fn new(frac_bits: u32) -> Option<Self> {
        if frac_bits <= MAX_FRACTIONAL_BITS {
            Some(Self { frac_bits })
        } else {
            None
        }
    }

    /// Fractional bit count.
    #[must_use]
    pub const fn frac_bits(self) -> u32 {
        self.frac_bits
    }

    /// Weight of one least-significant bit, `2^-frac_bits`.
    #[must_use]
    pub fn resolution(self) -> f64 {
        decode(1, self.shift())
    }

    /// Encode a real value to its register bit pattern.
    #[must_use]
    pub fn encode(self, x: f64) -> i32 {
        encode(x, self.shift())
    }

    /// Decode a register bit pattern to a real value.
    #[must_use]
    pub fn decode(self, q: i32) -> f64 {
        decode(q, self.shift())
    }

    /// Encode straight to the raw 32-bit register word.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn to_register(self, x: f64) -> u32 {
        self.encode(x) as u32
    }

    /// Decode a raw 32-bit register word.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn from_register(self, word: u32) -> f64 {
        self.decode(word as i32)
    }

    #[allow(clippy::cast_possible_wrap)]
    const fn shift(self) -> i32 {
        // Bounded by MAX_FRACTIONAL_BITS.
        self.frac_bits as i32
    }
}

impl Default for QFormat {
    fn default() -> Self {
        Self::DEPLOYED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_encodes_to_zero_for_every_width() {
        for f in 0..=31 {
            assert_eq!(encode(0.0, f), 0);
            assert_eq!(encode(-0.0, f), 0);
        }
    }

    #[test]
    fn round_trip_within_one_lsb() {
        let q = QFormat::DEPLOYED;
        let lsb = q.resolution();
        let mut x = -65_535.0_f64;
        while x < 65_535.0 {
            let back = q.decode(q.encode(x));
            assert!((back - x).abs() <= lsb, "x={x} back={back}");
            x += 1.618_033_988_7;
        }
        for f in [0, 4, 8, 15, 20, 24] {
            let lsb = decode(1, f);
            for x in [0.1, -0.3, 1.0 / 3.0, -2.75, 7.0e-3] {
                let back = decode(encode(x, f), f);
                assert!((back - x).abs() <= lsb, "f={f} x={x} back={back}");
            }
        }
    }

    #[test]
    fn rounds_to_nearest() {
        let lsb = QFormat::DEPLOYED.resolution();
        assert_eq!(QFormat::DEPLOYED.encode(0.4 * lsb), 0);
        assert_eq!(QFormat::DEPLOYED.encode(0.6 * lsb), 1);
        assert_eq!(QFormat::DEPLOYED.encode(-0.6 * lsb), -1);
        assert_eq!(QFormat::DEPLOYED.encode(1.0), 32_768);
        assert_eq!(QFormat::DEPLOYED.encode(-1.5), -49_152);
    }

    #[test]
    fn overflow_wraps_instead_of_saturating() {
        // 65536.0 · 2^15 = 2^31, one past i32::MAX.
        assert_eq!(encode(65_536.0, 15), i32::MIN);
        assert_eq!(encode(-65_536.0, 15), i32::MIN);
        assert_eq!(encode(65_536.0 + decode(1, 15), 15), i32::MIN + 1);
        // 2^32 reduces to zero.
        assert_eq!(encode(131_072.0, 15), 0);
        assert_eq!(decode(i32::MIN, 15), -65_536.0);
        // Far beyond the i64 range the residue is still exact.
        assert_eq!(encode(281_474_976_710_656.0, 15), 0); // 2^48 · 2^15 = 2^63
        assert_eq!(encode(-281_474_976_710_656.0, 15), 0);
        assert_eq!(encode(2f64.powi(70) + 2f64.powi(40), 0), 0);
        assert_eq!(encode(2f64.powi(62) + 3.0 * 2f64.powi(30), 0), -(1 << 30));
        assert_eq!(encode(f64::INFINITY, 15), 0);
        assert_eq!(encode(f64::NEG_INFINITY, 15), 0);
        assert_eq!(encode(f64::NAN, 15), 0);
    }

    #[test]
    fn register_words_are_twos_complement() {
        let q = QFormat::DEPLOYED;
        assert_eq!(q.to_register(-1.0), 0xFFFF_8000);
        assert_eq!(q.from_register(0xFFFF_8000), -1.0);
        assert_eq!(q.from_register(0x0000_4000), 0.5);
    }

    #[test]
    fn width_validation() {
        assert_eq!(QFormat::new(31).map(QFormat::frac_bits), Some(31));
        assert!(QFormat::new(32).is_none());
        assert_eq!(QFormat::default(), QFormat::DEPLOYED);
    }
}
