// SPDX-License-Identifier: AGPL-3.0-only

//! Software (simulated) CFD block
//!
//! Implements [`RegisterIo`] over an in-memory copy of the 50-register map
//! and behaves like the fabric as seen from the bus:
//!
//! 1. **Edge-triggered start**: a CONTROL store starts every engine whose bit
//!    rises relative to the previous CONTROL value. Holding a bit high does
//!    not restart the engine; the driver's mask-then-zero pulse does.
//! 2. **Per-engine compute**: a started engine decodes *its own* eight input
//!    registers (through the reversed input map) and runs a Q-format linear
//!    readout. The four encoded outputs stay pending while the engine runs.
//! 3. **Busy bits**: each started engine reports busy for `latency_polls`
//!    STATUS reads, then clears. A stuck block never clears.
//! 4. **Result visibility**: pending outputs land in the engine's output
//!    registers on the STATUS read that first reports the engine idle.
//!    Reading outputs earlier returns the previous run's values. With zero
//!    latency the outputs land on the start edge.
//!
//! Every store is logged so protocol tests can assert the exact sequence the
//! driver put on the bus.
//!
//! ## Precision model
//!
//! ```text
//! host f64 ──encode──▶ i32 input regs ──decode──▶ f64 readout ──encode──▶ i32 output regs
//! ```
//!
//! Both quantisation steps use the block's `QFormat`, so
//! [`SoftwareKernel::expected`] reproduces the register contents bit-exactly.

use crate::backend::{BackendType, RegisterIo};
use crate::error::{CfdError, Result};
use cfd_chip::regs::{
    self, input_offset, CONTROL, FEATURE_COUNT, REGISTER_COUNT, RESULT_COUNT, STATUS,
};
use cfd_chip::{EngineIndex, EngineMask, QFormat, ENGINE_COUNT};
use std::cell::Cell;
use tracing::{debug, trace};

/// Linear readout run by each simulated engine: `y = W·x + b`.
#[derive(Debug, Clone, PartialEq)]
pub struct SoftwareKernel {
    /// Row-major weights, one row per output
    pub weights: [[f64; FEATURE_COUNT]; RESULT_COUNT],
    /// One bias per output
    pub bias: [f64; RESULT_COUNT],
}

impl Default for SoftwareKernel {
    fn default() -> Self {
        let mut weights = [[0.0; FEATURE_COUNT]; RESULT_COUNT];
        for (r, row) in weights.iter_mut().enumerate() {
            for (f, w) in row.iter_mut().enumerate() {
                let sign = if (r + f) % 2 == 0 { 1.0 } else { -0.5 };
                #[allow(clippy::cast_precision_loss)]
                let scale = (f + 1) as f64;
                *w = sign / scale;
            }
        }
        Self {
            weights,
            bias: [0.0, 0.25, 0.5, 0.75],
        }
    }
}

impl SoftwareKernel {
    /// Evaluate the readout in `f64`.
    #[must_use]
    pub fn eval(&self, x: &[f64; FEATURE_COUNT]) -> [f64; RESULT_COUNT] {
        let mut y = self.bias;
        for (out, row) in y.iter_mut().zip(&self.weights) {
            *out += row.iter().zip(x).map(|(w, xi)| w * xi).sum::<f64>();
        }
        y
    }

    /// What the block reports for `sample` under `q`: inputs and outputs both
    /// pass through the register format.
    #[must_use]
    pub fn expected(&self, q: QFormat, sample: &[f64; FEATURE_COUNT]) -> [f64; RESULT_COUNT] {
        let x = sample.map(|v| q.decode(q.encode(v)));
        self.eval(&x).map(|v| q.decode(q.encode(v)))
    }
}

/// Simulated CFD register block
#[derive(Debug)]
pub struct SoftwareBlock {
    regs: [u32; REGISTER_COUNT],
    qformat: QFormat,
    kernel: SoftwareKernel,
    latency_polls: u32,
    stuck: bool,
    /// Busy countdown per engine, in STATUS reads
    remaining: [Cell<u32>; ENGINE_COUNT],
    /// Output words visible on the bus
    outputs: [Cell<[u32; RESULT_COUNT]>; ENGINE_COUNT],
    /// Outputs of a running engine, published once it reports idle
    pending: [Cell<Option<[u32; RESULT_COUNT]>>; ENGINE_COUNT],
    status_reads: Cell<u64>,
    starts: [u64; ENGINE_COUNT],
    writes: Vec<(usize, u32)>,
}

impl SoftwareBlock {
    /// Default STATUS reads an engine stays busy after a start.
    pub const DEFAULT_LATENCY_POLLS: u32 = 3;

    /// Create a block using `qformat` for every engine.
    #[must_use]
    pub fn new(qformat: QFormat) -> Self {
        Self {
            regs: [0; REGISTER_COUNT],
            qformat,
            kernel: SoftwareKernel::default(),
            latency_polls: Self::DEFAULT_LATENCY_POLLS,
            stuck: false,
            remaining: Default::default(),
            outputs: Default::default(),
            pending: Default::default(),
            status_reads: Cell::new(0),
            starts: [0; ENGINE_COUNT],
            writes: Vec::new(),
        }
    }

    /// Replace the readout kernel.
    #[must_use]
    pub fn with_kernel(mut self, kernel: SoftwareKernel) -> Self {
        self.kernel = kernel;
        self
    }

    /// STATUS reads an engine reports busy after each start (0 = finishes instantly).
    #[must_use]
    pub const fn with_latency(mut self, polls: u32) -> Self {
        self.latency_polls = polls;
        self
    }

    /// Started engines never clear their busy bit.
    #[must_use]
    pub const fn stuck(mut self) -> Self {
        self.stuck = true;
        self
    }

    /// Readout kernel in use.
    #[must_use]
    pub const fn kernel(&self) -> &SoftwareKernel {
        &self.kernel
    }

    /// Q-format in use.
    #[must_use]
    pub const fn qformat(&self) -> QFormat {
        self.qformat
    }

    /// Every store seen on the bus, in order.
    #[must_use]
    pub fn writes(&self) -> &[(usize, u32)] {
        &self.writes
    }

    /// Values stored to CONTROL, in order.
    #[must_use]
    pub fn control_writes(&self) -> Vec<u32> {
        self.writes
            .iter()
            .filter(|(idx, _)| *idx == CONTROL)
            .map(|(_, v)| *v)
            .collect()
    }

    /// STATUS reads so far.
    #[must_use]
    pub fn status_reads(&self) -> u64 {
        self.status_reads.get()
    }

    /// Times `engine` has been started.
    #[must_use]
    pub const fn starts(&self, engine: EngineIndex) -> u64 {
        self.starts[engine.get()]
    }

    /// Raw register contents, without the side effects of a bus read.
    #[must_use]
    pub fn peek(&self, index: usize) -> Option<u32> {
        match output_slot(index) {
            Some((engine, result)) => Some(self.outputs[engine].get()[result]),
            None => self.regs.get(index).copied(),
        }
    }

    /// Whether `engine` has computed outputs not yet visible on the bus.
    #[must_use]
    pub fn has_pending(&self, engine: EngineIndex) -> bool {
        self.pending[engine.get()].get().is_some()
    }

    fn publish_finished(&self) {
        let slots = self.remaining.iter().zip(&self.pending).zip(&self.outputs);
        for ((left, pending), outputs) in slots {
            if left.get() == 0 {
                if let Some(words) = pending.take() {
                    outputs.set(words);
                }
            }
        }
    }

    fn current_status(&self) -> u32 {
        EngineIndex::ALL
            .iter()
            .filter(|e| self.remaining[e.get()].get() > 0)
            .fold(0, |s, e| s | regs::status::busy(*e))
    }

    fn start(&mut self, engine: EngineIndex) {
        let q = self.qformat;
        let mut x = [0.0; FEATURE_COUNT];
        for (f, xi) in x.iter_mut().enumerate() {
            *xi = q.from_register(self.regs[input_offset(engine, f)]);
        }
        let y = self.kernel.eval(&x);
        let words = y.map(|v| q.to_register(v));
        if self.latency_polls == 0 && !self.stuck {
            self.outputs[engine.get()].set(words);
            self.pending[engine.get()].set(None);
        } else {
            self.pending[engine.get()].set(Some(words));
            self.remaining[engine.get()].set(self.latency_polls.max(1));
        }
        self.starts[engine.get()] += 1;
        debug!("Simulated {engine} started: x={x:?} y={y:?}");
    }
}

impl RegisterIo for SoftwareBlock {
    fn read32(&self, index: usize) -> Result<u32> {
        if index >= REGISTER_COUNT {
            return Err(CfdError::OutOfBounds {
                index,
                limit: REGISTER_COUNT,
            });
        }
        if index != STATUS {
            return Ok(self.peek(index).unwrap_or_default());
        }

        self.status_reads.set(self.status_reads.get() + 1);
        self.publish_finished();
        let status = self.current_status();
        if !self.stuck {
            for left in &self.remaining {
                left.set(left.get().saturating_sub(1));
            }
        }
        trace!("Simulated STATUS = {status:#010x}");
        Ok(status)
    }

    fn write32(&mut self, index: usize, value: u32) -> Result<()> {
        if index >= REGISTER_COUNT {
            return Err(CfdError::OutOfBounds {
                index,
                limit: REGISTER_COUNT,
            });
        }
        self.writes.push((index, value));

        match index {
            CONTROL => {
                let previous = self.regs[CONTROL];
                self.regs[CONTROL] = value;
                #[allow(clippy::cast_possible_truncation)]
                let rising = EngineMask::from_bits_truncate((value & !previous) as u8);
                for engine in rising.engines() {
                    self.start(engine);
                }
            }
            // Read-only from the bus.
            STATUS => {}
            i if is_output(i) => {}
            _ => self.regs[index] = value,
        }
        Ok(())
    }

    fn base_addr(&self) -> u64 {
        0
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Software
    }
}

fn is_output(index: usize) -> bool {
    output_slot(index).is_some()
}

/// `(engine, result)` of an output register index.
fn output_slot(index: usize) -> Option<(usize, usize)> {
    let offset = index.checked_sub(regs::INPUT_BASE)?;
    let (engine, slot) = (offset / regs::WINDOW_STRIDE, offset % regs::WINDOW_STRIDE);
    (engine < ENGINE_COUNT && slot >= FEATURE_COUNT).then(|| (engine, slot - FEATURE_COUNT))
}
