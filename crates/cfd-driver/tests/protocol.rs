//! End-to-end protocol tests against the software block
//!
//! Each test drives the public API and checks what reached the bus.

use cfd_driver::chip::{input_offset, output_offset, EngineIndex, EngineMask, QFormat};
use cfd_driver::{
    select_backend, BackendSelection, BackendType, BatchRunner, CfdModel, DriverConfig,
    InputSample, SoftwareBlock, SoftwareKernel, WaitStrategy,
};

fn distinct_samples(n: usize) -> Vec<InputSample> {
    (0..n)
        .map(|i| {
            let s = i as f64 + 1.0;
            InputSample::new([s, -s, 0.5 * s, 0.25, s * s / 64.0, -1.0, 2.0 - s / 8.0, 0.125 * s])
        })
        .collect()
}

#[test]
fn no_cross_engine_bleed() {
    let mut model = CfdModel::init(SoftwareBlock::new(QFormat::DEPLOYED));
    let samples = distinct_samples(4);
    for (engine, sample) in EngineIndex::ALL.into_iter().zip(&samples) {
        model.set_input(engine, sample).unwrap();
    }
    model.start_prediction(EngineMask::ALL).unwrap();
    model.wait_for_prediction(EngineIndex::E0).unwrap();

    let kernel = model.io().kernel().clone();
    for (engine, sample) in EngineIndex::ALL.into_iter().zip(&samples) {
        let got = model.prediction_result(engine).unwrap();
        assert_eq!(got.values, kernel.expected(QFormat::DEPLOYED, &sample.features), "{engine}");
    }
    // Engines of one pulse finish together: one wait covered all four.
    assert_eq!(model.status().unwrap(), 0);
}

#[test]
fn input_register_order_matches_wiring() {
    let mut model = CfdModel::init(SoftwareBlock::new(QFormat::DEPLOYED));
    let sample = InputSample::new([10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0, 17.0]);
    model.set_input(EngineIndex::E3, &sample).unwrap();

    let q = QFormat::DEPLOYED;
    // Engine 3's window starts at 38; feature 0 sits at 45, feature 7 at 38.
    let expected: Vec<(usize, u32)> = (0..8)
        .map(|k| (38 + k, q.to_register(17.0 - k as f64)))
        .collect();
    assert_eq!(model.io().writes(), expected.as_slice());
    assert_eq!(input_offset(EngineIndex::E3, 0), 45);
}

#[test]
fn single_engine_mask_leaves_others_alone() {
    let mut model = CfdModel::init(SoftwareBlock::new(QFormat::DEPLOYED));
    let samples = distinct_samples(4);
    for (engine, sample) in EngineIndex::ALL.into_iter().zip(&samples) {
        model.set_input(engine, sample).unwrap();
    }
    model.start_prediction(EngineMask::ENGINE_1).unwrap();
    model.wait_for_prediction(EngineIndex::E1).unwrap();

    let block = model.io();
    assert_eq!(block.starts(EngineIndex::E1), 1);
    for engine in [EngineIndex::E0, EngineIndex::E2, EngineIndex::E3] {
        assert_eq!(block.starts(engine), 0);
        assert_eq!(block.peek(output_offset(engine, 0)), Some(0));
    }
}

#[test]
fn zero_mask_is_an_empty_pulse() {
    let mut model = CfdModel::init(SoftwareBlock::new(QFormat::DEPLOYED));
    model.start_prediction(EngineMask::NONE).unwrap();
    assert_eq!(model.io().control_writes(), vec![0, 0]);
    assert!(EngineIndex::ALL.iter().all(|e| model.io().starts(*e) == 0));
}

#[test]
fn batch_run_waits_out_engine_latency() {
    let mut model = CfdModel::init(SoftwareBlock::new(QFormat::DEPLOYED).with_latency(25));
    let samples = distinct_samples(8);
    let results = BatchRunner::default().run(&mut model, &samples).unwrap();

    let kernel = model.io().kernel().clone();
    for (got, sample) in results.iter().zip(&samples) {
        assert_eq!(got.values, kernel.expected(QFormat::DEPLOYED, &sample.features));
    }
    // Two batches, each polled through the full latency.
    assert!(model.io().status_reads() >= 2 * 26);
}

#[test]
fn results_read_before_wait_are_stale() {
    let mut model = CfdModel::init(SoftwareBlock::new(QFormat::DEPLOYED).with_latency(10));
    let samples = distinct_samples(2);
    let kernel = model.io().kernel().clone();

    let first = model.predict_one(EngineIndex::E0, &samples[0]).unwrap();
    assert_eq!(first.values, kernel.expected(QFormat::DEPLOYED, &samples[0].features));

    model.set_input(EngineIndex::E0, &samples[1]).unwrap();
    model.start_prediction(EngineMask::ENGINE_0).unwrap();
    let early = model.prediction_result(EngineIndex::E0).unwrap();
    assert_eq!(early, first);

    model.wait_for_prediction(EngineIndex::E0).unwrap();
    let done = model.prediction_result(EngineIndex::E0).unwrap();
    assert_eq!(done.values, kernel.expected(QFormat::DEPLOYED, &samples[1].features));
    assert_ne!(done, first);
}

#[test]
fn batches_preserve_sample_order() {
    let kernel = SoftwareKernel {
        weights: [[1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]; 4],
        bias: [0.0; 4],
    };
    let mut model = CfdModel::init(SoftwareBlock::new(QFormat::DEPLOYED).with_kernel(kernel));
    let samples: Vec<InputSample> = (0..8)
        .map(|i| InputSample::new([i as f64, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]))
        .collect();

    let results = BatchRunner::default().run(&mut model, &samples).unwrap();
    let firsts: Vec<f64> = results.iter().map(|r| r.values[0]).collect();
    assert_eq!(firsts, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
}

#[test]
fn configured_fractional_bits_flow_through() {
    let cfg = DriverConfig {
        fractional_bits: 8,
        wait: WaitStrategy::Bounded { max_polls: 1_000 },
        ..DriverConfig::default()
    };
    let q = cfg.qformat().unwrap();
    let mut model = CfdModel::with_config(SoftwareBlock::new(q), &cfg).unwrap();
    model
        .set_input(EngineIndex::E0, &InputSample::new([1.0; 8]))
        .unwrap();
    // 1.0 in Q.8 is 256.
    assert!(model.io().writes().iter().all(|(_, v)| *v == 256));

    let results = BatchRunner::from_config(&cfg)
        .run(&mut model, &distinct_samples(4))
        .unwrap();
    assert_eq!(results.len(), 4);
}

#[test]
fn software_selection_needs_no_hardware() {
    let io = select_backend(BackendSelection::Software, &DriverConfig::default()).unwrap();
    assert_eq!(io.backend_type(), BackendType::Software);
    let mut model = CfdModel::init(io);
    let results = BatchRunner::default()
        .run(&mut model, &distinct_samples(8))
        .unwrap();
    assert_eq!(results.len(), 8);
}

#[test]
#[ignore] // Requires hardware
fn board_batch_run() {
    let cfg = DriverConfig::from_env().expect("config");
    let io = select_backend(BackendSelection::Mapped, &cfg).expect("map CFD block");
    let mut model = CfdModel::with_config(io, &cfg).expect("bind");
    let runner = BatchRunner::new(WaitStrategy::Bounded { max_polls: 10_000_000 });
    let results = runner.run(&mut model, &distinct_samples(16)).expect("run");
    assert_eq!(results.len(), 16);
    println!("status after run: {:#x}", model.status().unwrap());
}
