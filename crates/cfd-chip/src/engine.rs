//! Engine indices and control-register start masks.

/// Number of prediction engines in the block.
pub const ENGINE_COUNT: usize = 4;

/// Index of one of the four prediction engines, always in `0..4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EngineIndex(u8);

impl EngineIndex {
    /// Engine 0.
    pub const E0: Self = Self(0);
    /// Engine 1.
    pub const E1: Self = Self(1);
    /// Engine 2.
    pub const E2: Self = Self(2);
    /// Engine 3.
    pub const E3: Self = Self(3);

    /// All engines in dispatch order.
    pub const ALL: [Self; ENGINE_COUNT] = [Self::E0, Self::E1, Self::E2, Self::E3];

    /// Validate a raw engine number. Returns `None` outside `0..4`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn new(index: usize) -> Option<Self> {
        if index < ENGINE_COUNT {
            Some(Self(index as u8))
        } else {
            None
        }
    }

    /// Engine number as `usize`, for address arithmetic.
    #[must_use]
    pub const fn get(self) -> usize {
        self.0 as usize
    }

    /// Start mask selecting only this engine.
    #[must_use]
    pub const fn mask(self) -> EngineMask {
        EngineMask(1 << self.0)
    }
}

impl std::fmt::Display for EngineIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "engine{}", self.0)
    }
}

/// Engine-start bits written to the control register. Bit `e` starts engine `e`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EngineMask(u8);

impl EngineMask {
    /// No engine. Writing it still produces a (no-op) pulse.
    pub const NONE: Self = Self(0);
    /// Engine 0 only.
    pub const ENGINE_0: Self = Self(0b0001);
    /// Engine 1 only.
    pub const ENGINE_1: Self = Self(0b0010);
    /// Engine 2 only.
    pub const ENGINE_2: Self = Self(0b0100);
    /// Engine 3 only.
    pub const ENGINE_3: Self = Self(0b1000);
    /// Every engine.
    pub const ALL: Self = Self(0b1111);

    /// Build a mask from raw bits; bits above the engine count are dropped.
    #[must_use]
    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether `engine` is selected.
    #[must_use]
    pub const fn contains(self, engine: EngineIndex) -> bool {
        self.0 & (1 << engine.0) != 0
    }

    /// Union of two masks.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Selected engines in ascending order.
    pub fn engines(self) -> impl Iterator<Item = EngineIndex> {
        EngineIndex::ALL.into_iter().filter(move |e| self.contains(*e))
    }
}

impl From<EngineIndex> for EngineMask {
    fn from(engine: EngineIndex) -> Self {
        engine.mask()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_index_range() {
        assert_eq!(EngineIndex::new(3), Some(EngineIndex::E3));
        assert_eq!(EngineIndex::new(4), None);
        assert_eq!(EngineIndex::E2.get(), 2);
    }

    #[test]
    fn single_engine_masks() {
        assert_eq!(EngineIndex::E0.mask(), EngineMask::ENGINE_0);
        assert_eq!(EngineIndex::E3.mask(), EngineMask::ENGINE_3);
        let all = EngineIndex::ALL
            .iter()
            .fold(EngineMask::NONE, |m, e| m.union(e.mask()));
        assert_eq!(all, EngineMask::ALL);
    }

    #[test]
    fn mask_iteration() {
        let m = EngineMask::from_bits_truncate(0b1010_0101);
        assert_eq!(m.bits(), 0b0101);
        let engines: Vec<_> = m.engines().collect();
        assert_eq!(engines, vec![EngineIndex::E0, EngineIndex::E2]);
    }
}
