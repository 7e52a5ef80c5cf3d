// SPDX-License-Identifier: AGPL-3.0-only

//! Four-engine lock-step orchestration
//!
//! Samples are dispatched in batches of four, one per engine:
//!
//! ```text
//! for each batch:
//!   set_input(e0, s0) set_input(e1, s1) set_input(e2, s2) set_input(e3, s3)
//!   start_prediction(ALL)
//!   wait on engine 0          (all engines of one pulse finish together)
//!   prediction_result(e0..e3) → results, in sample order
//! ```
//!
//! Batches run strictly one after another: batch N+1 is not loaded while
//! batch N is in flight. A trailing partial batch is dropped.

use crate::backend::RegisterIo;
use crate::config::{DriverConfig, WaitStrategy};
use crate::device::{CfdModel, InputSample, PredictionResult};
use crate::error::Result;
use crate::telemetry::Phase;
use cfd_chip::regs::status::ALL_BUSY;
use cfd_chip::{EngineIndex, EngineMask, ENGINE_COUNT};
use tracing::{debug, info, warn};

/// Samples per batch (one per engine)
pub const BATCH_SIZE: usize = ENGINE_COUNT;

/// Samples that a run over `count` samples actually processes.
#[must_use]
pub const fn full_batch_samples(count: usize) -> usize {
    count - count % BATCH_SIZE
}

/// Drives the four engines over a sample sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchRunner {
    wait: WaitStrategy,
    verify_all_idle: bool,
}

impl BatchRunner {
    /// Runner using `wait` for batch completion
    pub const fn new(wait: WaitStrategy) -> Self {
        Self {
            wait,
            verify_all_idle: false,
        }
    }

    /// Runner using the configured wait strategy
    pub const fn from_config(config: &DriverConfig) -> Self {
        Self::new(config.wait)
    }

    /// After each wait on engine 0, re-read STATUS and warn if any other
    /// engine of the batch is still busy.
    #[must_use]
    pub const fn verify_all_idle(mut self, enabled: bool) -> Self {
        self.verify_all_idle = enabled;
        self
    }

    /// Wait strategy in use
    pub const fn wait_strategy(&self) -> WaitStrategy {
        self.wait
    }

    /// Run every full batch in `samples`
    ///
    /// Returns one result per processed sample, in sample order. Samples
    /// after the last full batch are dropped.
    ///
    /// # Errors
    ///
    /// Returns error if a register access fails or a bounded wait times out.
    pub fn run<R: RegisterIo>(
        &self,
        model: &mut CfdModel<R>,
        samples: &[InputSample],
    ) -> Result<Vec<PredictionResult>> {
        let processed = full_batch_samples(samples.len());
        if processed < samples.len() {
            warn!(
                "Dropping {} trailing samples (not a full batch of {BATCH_SIZE})",
                samples.len() - processed
            );
        }

        info!(
            "Running {} batches ({processed} samples, wait={:?})",
            processed / BATCH_SIZE,
            self.wait
        );

        let start = model.clock();
        let mut results = Vec::with_capacity(processed);
        for base in (0..processed).step_by(BATCH_SIZE) {
            let batch: [InputSample; BATCH_SIZE] = std::array::from_fn(|i| samples[base + i]);
            results.extend(self.run_batch(model, &batch)?);
        }
        model.record(Phase::Total, start);

        info!("Finished {} predictions", results.len());
        Ok(results)
    }

    /// Run one batch: sample `i` goes to engine `i`
    ///
    /// # Errors
    ///
    /// Returns error if a register access fails or a bounded wait times out.
    pub fn run_batch<R: RegisterIo>(
        &self,
        model: &mut CfdModel<R>,
        batch: &[InputSample; BATCH_SIZE],
    ) -> Result<[PredictionResult; BATCH_SIZE]> {
        for (engine, sample) in EngineIndex::ALL.into_iter().zip(batch) {
            model.set_input(engine, sample)?;
        }

        let hw_start = model.clock();
        model.start_prediction(EngineMask::ALL)?;
        self.wait_batch(model)?;
        model.record(Phase::Hardware, hw_start);
        model.count_batch();

        if self.verify_all_idle {
            let status = model.status()?;
            if status & ALL_BUSY != 0 {
                warn!("Engines still busy after engine 0 finished (status={status:#x})");
            }
        }

        let mut out = [PredictionResult::default(); BATCH_SIZE];
        for (slot, engine) in out.iter_mut().zip(EngineIndex::ALL) {
            *slot = model.prediction_result(engine)?;
        }
        debug!("Batch done: {out:?}");
        Ok(out)
    }

    fn wait_batch<R: RegisterIo>(&self, model: &CfdModel<R>) -> Result<()> {
        match self.wait {
            WaitStrategy::Spin => model.wait_for_prediction(EngineIndex::E0),
            WaitStrategy::Bounded { max_polls } => model
                .wait_for_prediction_bounded(EngineIndex::E0, max_polls)
                .map(|polls| debug!("Batch finished after {polls} polls")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::SoftwareBlock;
    use crate::error::CfdError;
    use cfd_chip::QFormat;

    fn samples(n: usize) -> Vec<InputSample> {
        (0..n)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let base = i as f64;
                InputSample::new(std::array::from_fn(|f| base + 0.125 * f as f64))
            })
            .collect()
    }

    #[test]
    fn eight_samples_make_two_batches_in_order() {
        let mut model = CfdModel::init(SoftwareBlock::new(QFormat::DEPLOYED));
        let input = samples(8);
        let results = BatchRunner::default().run(&mut model, &input).unwrap();

        assert_eq!(results.len(), 8);
        assert_eq!(model.io().control_writes(), vec![0b1111, 0, 0b1111, 0]);
        let kernel = model.io().kernel().clone();
        for (sample, result) in input.iter().zip(&results) {
            assert_eq!(result.values, kernel.expected(QFormat::DEPLOYED, &sample.features));
        }
    }

    #[test]
    fn remainder_is_dropped() {
        let mut model = CfdModel::init(SoftwareBlock::new(QFormat::DEPLOYED));
        let results = BatchRunner::default().run(&mut model, &samples(11)).unwrap();
        assert_eq!(results.len(), 8);
        assert_eq!(full_batch_samples(3), 0);
        assert!(BatchRunner::default().run(&mut model, &samples(3)).unwrap().is_empty());
    }

    #[test]
    fn inputs_loaded_before_single_pulse() {
        let mut model = CfdModel::init(SoftwareBlock::new(QFormat::DEPLOYED));
        BatchRunner::default().run(&mut model, &samples(4)).unwrap();

        let writes = model.io().writes();
        assert_eq!(writes.len(), 4 * 8 + 2);
        assert!(writes[..32].iter().all(|(idx, _)| *idx >= 2));
        assert_eq!(&writes[32..], &[(0, 0b1111), (0, 0)]);
    }

    #[test]
    fn bounded_wait_surfaces_timeout() {
        let mut model = CfdModel::init(SoftwareBlock::new(QFormat::DEPLOYED).stuck());
        let config = DriverConfig {
            wait: WaitStrategy::Bounded { max_polls: 64 },
            ..DriverConfig::default()
        };
        let runner = BatchRunner::from_config(&config);
        assert_eq!(runner.wait_strategy(), config.wait);
        let err = runner.run(&mut model, &samples(4)).unwrap_err();
        assert!(matches!(err, CfdError::Timeout { polls: 64, .. }));
    }

    #[test]
    fn telemetry_counts_batches() {
        let mut model = CfdModel::init(SoftwareBlock::new(QFormat::DEPLOYED)).with_telemetry();
        BatchRunner::default()
            .verify_all_idle(true)
            .run(&mut model, &samples(12))
            .unwrap();
        let perf = model.telemetry().unwrap();
        assert_eq!(perf.batches, 3);
        assert!(perf.total >= perf.hardware);
    }
}
