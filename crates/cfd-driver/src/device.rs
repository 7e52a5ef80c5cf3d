//! CFD accelerator handle and per-engine operations
//!
//! [`CfdModel`] is the only path to the register block: it owns the
//! [`RegisterIo`] and the Q-format, and every operation goes through the
//! register map in `cfd_chip::regs`.
//!
//! # Protocol
//!
//! ```text
//! set_input(e, x)        8 stores, ascending register index (x7 first, x0 last)
//! start_prediction(m)    CONTROL ← m, CONTROL ← 0   (edge pulse)
//! wait_for_prediction(e) spin while STATUS bit 2e+1 is set
//! prediction_result(e)   4 loads, ascending (y0..y3)
//! ```
//!
//! Engines started by the same pulse finish together on the deployed
//! bitstream, so waiting on any one of them covers the batch. That is a
//! property of the hardware, not something the driver checks.

use crate::backend::RegisterIo;
use crate::config::DriverConfig;
use crate::error::{CfdError, Result};
use crate::telemetry::{PerfCounters, Phase};
use cfd_chip::regs::{self, input_offset, output_offset, FEATURE_COUNT, RESULT_COUNT};
use cfd_chip::{EngineIndex, EngineMask, QFormat};
use std::cell::Cell;
use std::time::Instant;

/// Eight input features for one prediction
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InputSample {
    /// Features in logical order
    pub features: [f64; FEATURE_COUNT],
}

impl InputSample {
    /// Wrap a feature vector
    pub const fn new(features: [f64; FEATURE_COUNT]) -> Self {
        Self { features }
    }
}

impl From<[f64; FEATURE_COUNT]> for InputSample {
    fn from(features: [f64; FEATURE_COUNT]) -> Self {
        Self { features }
    }
}

/// Four outputs of one engine
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PredictionResult {
    /// Outputs in register order
    pub values: [f64; RESULT_COUNT],
}

impl PredictionResult {
    /// Bytes of one result on the wire
    pub const WIRE_BYTES: usize = RESULT_COUNT * std::mem::size_of::<f64>();

    /// Native in-memory bytes of the four values
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.values)
    }
}

/// Validate a raw engine number
///
/// # Errors
///
/// Returns error if `index` is not in `0..4`.
pub fn engine(index: usize) -> Result<EngineIndex> {
    EngineIndex::new(index).ok_or(CfdError::invalid_engine(index))
}

/// Handle to one CFD block
#[derive(Debug)]
pub struct CfdModel<R: RegisterIo> {
    io: R,
    qformat: QFormat,
    telemetry: Option<Cell<PerfCounters>>,
}

impl<R: RegisterIo> CfdModel<R> {
    /// Bind a handle to `io` with the deployed Q-format (15 fractional bits)
    ///
    /// Does not touch the hardware.
    pub fn init(io: R) -> Self {
        Self::with_qformat(io, QFormat::DEPLOYED)
    }

    /// Bind a handle with an explicit Q-format
    pub fn with_qformat(io: R, qformat: QFormat) -> Self {
        tracing::info!(
            "CFD model bound: {} @ {:#x}, Q{}",
            io.backend_type(),
            io.base_addr(),
            qformat.frac_bits()
        );
        Self {
            io,
            qformat,
            telemetry: None,
        }
    }

    /// Bind a handle using the configured Q-format
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid.
    pub fn with_config(io: R, config: &DriverConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_qformat(io, config.qformat()?))
    }

    /// Enable the timing breakdown
    #[must_use]
    pub fn with_telemetry(mut self) -> Self {
        self.telemetry = Some(Cell::new(PerfCounters::default()));
        self
    }

    /// Q-format shared by every engine
    pub const fn qformat(&self) -> QFormat {
        self.qformat
    }

    /// Underlying register block
    pub const fn io(&self) -> &R {
        &self.io
    }

    /// Timing collected so far (`None` without telemetry)
    pub fn telemetry(&self) -> Option<PerfCounters> {
        self.telemetry.as_ref().map(Cell::get)
    }

    /// Zero the timing counters
    pub fn reset_telemetry(&self) {
        if let Some(cell) = &self.telemetry {
            cell.set(PerfCounters::default());
        }
    }

    /// Load one sample into `engine`'s input registers
    ///
    /// All features are encoded first, then stored in ascending register
    /// order, i.e. feature 7 first and feature 0 last (see the reversed input
    /// map in `cfd_chip::regs`).
    ///
    /// # Errors
    ///
    /// Returns error if a register store fails.
    pub fn set_input(&mut self, engine: EngineIndex, sample: &InputSample) -> Result<()> {
        let t0 = self.clock();
        let words = sample.features.map(|x| self.qformat.to_register(x));
        let t1 = self.clock();

        for feature in (0..FEATURE_COUNT).rev() {
            self.io.write32(input_offset(engine, feature), words[feature])?;
        }

        self.charge(Phase::Conversion, t0, t1);
        self.charge(Phase::Axi, t1, self.clock());
        tracing::trace!("{engine} loaded");
        Ok(())
    }

    /// Pulse the control register: store `mask`, then `0`
    ///
    /// Every engine whose bit is set starts; others are untouched. A zero
    /// mask is a harmless empty pulse. Pulsing engines that are still busy is
    /// not defined by the hardware and is the caller's responsibility.
    ///
    /// # Errors
    ///
    /// Returns error if a register store fails.
    pub fn start_prediction(&mut self, mask: EngineMask) -> Result<()> {
        self.io.write32(regs::CONTROL, u32::from(mask.bits()))?;
        self.io.write32(regs::CONTROL, 0)?;
        tracing::trace!("Start pulse {:#06b}", mask.bits());
        Ok(())
    }

    /// Spin until `engine`'s busy bit clears
    ///
    /// There is no timeout and no yield: an engine that never finishes hangs
    /// the caller. Use [`Self::wait_for_prediction_bounded`] where that is
    /// not acceptable.
    ///
    /// # Errors
    ///
    /// Returns error only if reading STATUS fails.
    pub fn wait_for_prediction(&self, engine: EngineIndex) -> Result<()> {
        while regs::status::is_busy(self.io.read32(regs::STATUS)?, engine) {
            std::hint::spin_loop();
        }
        Ok(())
    }

    /// Poll `engine`'s busy bit at most `max_polls` times
    ///
    /// Returns the number of STATUS reads it took to see the bit clear.
    ///
    /// # Errors
    ///
    /// Returns [`CfdError::Timeout`] if the bit is still set after
    /// `max_polls` reads, or an error if reading STATUS fails.
    pub fn wait_for_prediction_bounded(&self, engine: EngineIndex, max_polls: u64) -> Result<u64> {
        let mut status = 0;
        for polls in 1..=max_polls {
            status = self.io.read32(regs::STATUS)?;
            if !regs::status::is_busy(status, engine) {
                return Ok(polls);
            }
            std::hint::spin_loop();
        }
        tracing::warn!("{engine} still busy after {max_polls} polls (status={status:#x})");
        Err(CfdError::Timeout {
            polls: max_polls,
            status,
        })
    }

    /// Raw STATUS word, for diagnostics
    ///
    /// # Errors
    ///
    /// Returns error if the load fails.
    pub fn status(&self) -> Result<u32> {
        self.io.read32(regs::STATUS)
    }

    /// Read and decode `engine`'s four outputs
    ///
    /// # Errors
    ///
    /// Returns error if a register load fails.
    pub fn prediction_result(&self, engine: EngineIndex) -> Result<PredictionResult> {
        let t0 = self.clock();
        let mut words = [0u32; RESULT_COUNT];
        for (result, word) in words.iter_mut().enumerate() {
            *word = self.io.read32(output_offset(engine, result))?;
        }
        let t1 = self.clock();
        let values = words.map(|w| self.qformat.from_register(w));

        self.charge(Phase::Axi, t0, t1);
        self.charge(Phase::Conversion, t1, self.clock());
        Ok(PredictionResult { values })
    }

    /// Run one sample on one engine: load, pulse, wait, read
    ///
    /// # Errors
    ///
    /// Returns error if any register access fails.
    pub fn predict_one(
        &mut self,
        engine: EngineIndex,
        sample: &InputSample,
    ) -> Result<PredictionResult> {
        self.set_input(engine, sample)?;
        self.start_prediction(engine.mask())?;
        self.wait_for_prediction(engine)?;
        self.prediction_result(engine)
    }

    /// Current time when telemetry is on.
    pub(crate) fn clock(&self) -> Option<Instant> {
        self.telemetry.as_ref().map(|_| Instant::now())
    }

    /// Charge `to − from` to `phase` when telemetry is on.
    fn charge(&self, phase: Phase, from: Option<Instant>, to: Option<Instant>) {
        if let (Some(cell), Some(from), Some(to)) = (&self.telemetry, from, to) {
            let mut perf = cell.get();
            perf.charge(phase, to.duration_since(from));
            cell.set(perf);
        }
    }

    /// Record a span measured outside the handle (orchestrator phases).
    pub(crate) fn record(&self, phase: Phase, start: Option<Instant>) {
        self.charge(phase, start, self.clock());
    }

    pub(crate) fn count_batch(&self) {
        if let Some(cell) = &self.telemetry {
            let mut perf = cell.get();
            perf.batches += 1;
            cell.set(perf);
        }
    }
}
