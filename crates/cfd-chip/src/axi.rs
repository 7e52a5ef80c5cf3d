//! AXI-Lite slave constants for the CFD block.
//!
//! The block sits behind the Zynq PS general-purpose master port. Vivado
//! assigns its base address at block-design time, so the value below is the
//! deployment default and every consumer takes the address as configuration.

use crate::regs::REGISTER_COUNT;

/// Physical base address of the CFD register block (default assignment on
/// the M_AXI_GP0 window).
pub const DEFAULT_BASE_ADDR: u64 = 0x43C0_0000;

/// Register width in bytes. Every register is 32 bits.
pub const REGISTER_BYTES: usize = 4;

/// Bytes spanned by the register map.
pub const BLOCK_LEN: usize = REGISTER_COUNT * REGISTER_BYTES;

/// Fractional bits of the Q-format synthesised into the deployed bitstream.
pub const DEFAULT_FRACTIONAL_BITS: u32 = 15;

/// Byte offset of a register index from the block base.
#[must_use]
pub const fn byte_offset(index: usize) -> usize {
    index * REGISTER_BYTES
}

/// Absolute physical address of a register index.
#[must_use]
pub const fn register_addr(base: u64, index: usize) -> u64 {
    base + byte_offset(index) as u64
}
