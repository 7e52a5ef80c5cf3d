//! Pure Rust driver for the CFD inference accelerator.
//!
//! The accelerator is a programmable-logic block with four prediction
//! engines behind one AXI-Lite register window. This crate drives it from
//! Linux userspace on the Zynq PS (or against a simulated block on any host):
//!
//! - [`CfdModel`]: the handle. Loads inputs, pulses engines, waits, reads
//!   results, converting through the block's Q-format.
//! - [`BatchRunner`]: lock-step dispatch of four samples at a time.
//! - [`ResultStreamer`]: `'+' '+'` / `'!' '!'` framing of results onto a
//!   serial link.
//!
//! # Backends
//!
//! ```text
//! MappedBlock   : /dev/mem or /dev/uioN mmap, volatile 32-bit access
//! SoftwareBlock : in-memory block simulating the engines (no hardware)
//! ```
//!
//! # Quick start
//!
//! ```
//! use cfd_driver::{BatchRunner, CfdModel, InputSample, SoftwareBlock};
//! use cfd_driver::chip::QFormat;
//!
//! # fn main() -> cfd_driver::Result<()> {
//! let mut model = CfdModel::init(SoftwareBlock::new(QFormat::DEPLOYED));
//! let samples = vec![InputSample::new([0.5; 8]); 8];
//! let results = BatchRunner::default().run(&mut model, &samples)?;
//! assert_eq!(results.len(), 8);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

mod backend;
pub mod backends;
pub mod batch;
pub mod config;
mod device;
mod error;
pub mod samples;
pub mod stream;
pub mod telemetry;

/// Register map and Q-format (re-exported from cfd-chip).
pub mod chip {
    pub use cfd_chip::axi::{BLOCK_LEN, DEFAULT_BASE_ADDR, DEFAULT_FRACTIONAL_BITS};
    pub use cfd_chip::regs::{input_offset, output_offset, FEATURE_COUNT, RESULT_COUNT};
    pub use cfd_chip::{EngineIndex, EngineMask, QFormat, ENGINE_COUNT};
}

pub use backend::{select_backend, BackendSelection, BackendType, RegisterIo};
pub use backends::{MappedBlock, SoftwareBlock, SoftwareKernel};
pub use batch::{BatchRunner, BATCH_SIZE};
pub use config::{DriverConfig, WaitStrategy};
pub use device::{engine, CfdModel, InputSample, PredictionResult};
pub use error::{CfdError, Result};
pub use stream::{decode_stream, frame, ResultStreamer, SerialSink, WriteSink};
pub use telemetry::{PerfCounters, PerfReport};
