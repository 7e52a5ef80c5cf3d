//! Register block backends
//!
//! Two backends available:
//! - **Mapped**: the physical AXI-Lite window through `/dev/mem` or a UIO node
//! - **Software**: an in-memory block that simulates the four engines

pub mod mapped;
pub mod software;

pub use mapped::MappedBlock;
pub use software::{SoftwareBlock, SoftwareKernel};
