//! Register I/O abstraction
//!
//! The driver never touches memory directly: every load and store of the CFD
//! block goes through [`RegisterIo`], which the platform layer implements as
//! volatile 32-bit accesses on the mapped AXI-Lite window. A software block
//! implements the same trait for host-only builds and tests.

use crate::backends::{MappedBlock, SoftwareBlock};
use crate::config::DriverConfig;
use crate::error::Result;
use std::fmt::Debug;

/// 32-bit register access to one CFD block.
///
/// Indices are register indices (see `cfd_chip::regs`); implementations
/// translate to byte offsets. Writes take `&mut self`: the owner of the block
/// is its only writer.
pub trait RegisterIo: Debug {
    /// Read the register at `index`.
    ///
    /// # Errors
    ///
    /// Returns error if `index` is outside the block.
    fn read32(&self, index: usize) -> Result<u32>;

    /// Write `value` to the register at `index`.
    ///
    /// # Errors
    ///
    /// Returns error if `index` is outside the block.
    fn write32(&mut self, index: usize, value: u32) -> Result<()>;

    /// Physical base address of the block (`0` for software blocks).
    fn base_addr(&self) -> u64;

    /// Backend type for diagnostics
    fn backend_type(&self) -> BackendType;
}

impl<R: RegisterIo + ?Sized> RegisterIo for Box<R> {
    fn read32(&self, index: usize) -> Result<u32> {
        (**self).read32(index)
    }

    fn write32(&mut self, index: usize, value: u32) -> Result<()> {
        (**self).write32(index, value)
    }

    fn base_addr(&self) -> u64 {
        (**self).base_addr()
    }

    fn backend_type(&self) -> BackendType {
        (**self).backend_type()
    }
}

/// Backend type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// Physical block mapped through `/dev/mem` or a UIO node
    Mapped,

    /// Simulated block, no hardware required
    Software,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mapped => write!(f, "Mapped (AXI-Lite)"),
            Self::Software => write!(f, "Software (simulated block)"),
        }
    }
}

/// Backend selection strategy
///
/// There is no fallback between the two: a hardware run that cannot map the
/// block fails instead of producing simulated predictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendSelection {
    /// The hardware block
    Mapped,

    /// The software block
    Software,
}

/// Open the register block described by `config`
///
/// # Errors
///
/// Returns error if the configuration is invalid, or the hardware block is
/// selected and cannot be mapped.
pub fn select_backend(
    selection: BackendSelection,
    config: &DriverConfig,
) -> Result<Box<dyn RegisterIo>> {
    match selection {
        BackendSelection::Mapped => {
            let block = MappedBlock::open(config)?;
            tracing::info!("Using mapped block at {:#x}", config.base_addr);
            Ok(Box::new(block))
        }

        BackendSelection::Software => {
            tracing::info!("Using software block");
            Ok(Box::new(SoftwareBlock::new(config.qformat()?)))
        }
    }
}
