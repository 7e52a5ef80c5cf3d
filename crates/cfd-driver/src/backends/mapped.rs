//! Memory-mapped CFD register block
//!
//! Maps the block's AXI-Lite window into the process with `rustix::mm::mmap`
//! and performs volatile 32-bit loads and stores on it. Two device nodes are
//! supported:
//!
//! - `/dev/mem`: mapped at the physical base address (page aligned down, the
//!   remainder kept as an in-page offset); opened `O_SYNC` so the kernel maps
//!   the range uncached.
//! - `/dev/uioN`: map 0 of the UIO device already starts at the block base,
//!   so the mapping offset is 0.

use crate::backend::{BackendType, RegisterIo};
use crate::config::DriverConfig;
use crate::error::{CfdError, Result};
use cfd_chip::axi::{byte_offset, REGISTER_BYTES};
use rustix::fs::OFlags;
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsFd;
use std::path::Path;
use std::ptr::NonNull;

/// Physical CFD register block
#[derive(Debug)]
pub struct MappedBlock {
    ptr: NonNull<u8>,
    map_len: usize,
    /// Distance from the start of the mapping to register 0
    page_offset: usize,
    registers: usize,
    base_addr: u64,
    _file: File,
}

impl MappedBlock {
    /// Map the block described by `config`
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The configuration is invalid
    /// - The device node cannot be opened (missing, no permission)
    /// - mmap fails
    pub fn open(config: &DriverConfig) -> Result<Self> {
        config.validate()?;
        let path = config.device_path.as_path();

        tracing::debug!(
            "Mapping CFD block {:#x}+{:#x} via {}",
            config.base_addr,
            config.block_len,
            path.display()
        );

        #[allow(clippy::cast_possible_wrap)]
        let sync_flag = OFlags::SYNC.bits() as i32;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(sync_flag)
            .open(path)
            .map_err(|e| CfdError::map_failed(format!("Cannot open {}: {e}", path.display())))?;

        let page = rustix::param::page_size() as u64;
        let (map_offset, page_offset) = if is_uio(path) {
            (0, 0)
        } else {
            let aligned = config.base_addr & !(page - 1);
            (aligned, config.base_addr - aligned)
        };

        #[allow(clippy::cast_possible_truncation)]
        let page_offset = page_offset as usize;
        let map_len = (page_offset + config.block_len).next_multiple_of(page as usize);

        // SAFETY: mmap of a device node.
        // - fd is valid (just opened, kept alive in `_file` for the mapping's lifetime)
        // - map_len is non-zero and a multiple of the page size; map_offset is page aligned
        // - MAP_SHARED + PROT_READ|PROT_WRITE: stores must reach the device
        // - rustix returns Err on failure; the mapping is released in Drop
        let addr = unsafe {
            mmap(
                std::ptr::null_mut(),
                map_len,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                file.as_fd(),
                map_offset,
            )
        }
        .map_err(|e| CfdError::map_failed(format!("mmap of {} failed: {e}", path.display())))?;

        let ptr = NonNull::new(addr.cast::<u8>())
            .ok_or_else(|| CfdError::map_failed("mmap returned a null mapping"))?;

        tracing::info!(
            "Mapped CFD block {:#x} ({} registers) at {ptr:p}",
            config.base_addr,
            config.block_len / REGISTER_BYTES
        );

        Ok(Self {
            ptr,
            map_len,
            page_offset,
            registers: config.block_len / REGISTER_BYTES,
            base_addr: config.base_addr,
            _file: file,
        })
    }

    /// Registers reachable through this mapping
    #[must_use]
    pub const fn register_count(&self) -> usize {
        self.registers
    }

    fn register_ptr(&self, index: usize) -> Result<*mut u32> {
        if index >= self.registers {
            return Err(CfdError::OutOfBounds {
                index,
                limit: self.registers,
            });
        }
        // SAFETY: page_offset + byte_offset(index) + 4 <= page_offset + block_len <= map_len,
        // so the pointer stays inside the mapping.
        #[allow(clippy::cast_ptr_alignment)]
        let reg = unsafe {
            self.ptr
                .as_ptr()
                .add(self.page_offset + byte_offset(index))
                .cast::<u32>()
        };
        Ok(reg)
    }
}

impl RegisterIo for MappedBlock {
    fn read32(&self, index: usize) -> Result<u32> {
        let reg = self.register_ptr(index)?;
        // SAFETY: Volatile read from a mapped device register.
        // - reg is in bounds (checked by register_ptr)
        // - base_addr is word aligned (validated) and the in-page offset preserves that
        // - volatile: the fabric changes STATUS and the outputs behind our back
        let value = unsafe { reg.read_volatile() };
        tracing::trace!("Read r{index} = {value:#010x}");
        Ok(value)
    }

    fn write32(&mut self, index: usize, value: u32) -> Result<()> {
        let reg = self.register_ptr(index)?;
        tracing::trace!("Write r{index} = {value:#010x}");
        // SAFETY: Volatile write to a mapped device register.
        // - reg is in bounds and word aligned (see read32)
        // - volatile: every store has a side effect (CONTROL pulses must not be merged)
        unsafe { reg.write_volatile(value) };
        Ok(())
    }

    fn base_addr(&self) -> u64 {
        self.base_addr
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Mapped
    }
}

impl Drop for MappedBlock {
    fn drop(&mut self) {
        tracing::debug!("Unmapping CFD block {:#x}", self.base_addr);

        // SAFETY: ptr/map_len are exactly what mmap returned/was given in open();
        // Drop runs once and no references into the mapping outlive self.
        unsafe {
            if let Err(e) = munmap(self.ptr.as_ptr().cast(), self.map_len) {
                tracing::error!("munmap failed during drop: {e}");
            }
        }
    }
}

// SAFETY: MappedBlock owns its mapping exclusively; moving it to another thread
// does not invalidate the mapping (mmap'd memory is process-wide).
unsafe impl Send for MappedBlock {}

fn is_uio(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with("uio"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn missing_device_node_is_a_map_error() {
        let cfg = DriverConfig {
            device_path: PathBuf::from("/nonexistent/cfd-mem"),
            ..DriverConfig::default()
        };
        let err = MappedBlock::open(&cfg).unwrap_err();
        assert!(matches!(err, CfdError::MapFailed { .. }), "{err}");
    }

    #[test]
    fn invalid_config_rejected_before_open() {
        let cfg = DriverConfig {
            fractional_bits: 40,
            ..DriverConfig::default()
        };
        assert!(matches!(
            MappedBlock::open(&cfg),
            Err(CfdError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn uio_nodes_detected() {
        assert!(is_uio(Path::new("/dev/uio0")));
        assert!(!is_uio(Path::new("/dev/mem")));
    }

    #[test]
    #[ignore] // Requires hardware
    fn reads_status_on_board() {
        let block = MappedBlock::open(&DriverConfig::default()).expect("map CFD block");
        let status = block.read32(cfd_chip::regs::STATUS).expect("status");
        println!("STATUS = {status:#010x}");
        assert!(block.read32(block.register_count()).is_err());
    }
}
