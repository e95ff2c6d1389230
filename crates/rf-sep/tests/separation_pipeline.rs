//! Separation Pipeline Tests
//!
//! Runs the full pad -> slice -> batch -> reassemble -> trim path with
//! stand-in models.
//! Verifies:
//! - Identity model reproduces the input for any length / batch size
//! - Results do not depend on the batch size
//! - Condition vectors reach the model once per segment
//! - Model failures and malformed outputs surface as errors

use ndarray::{Array, Array2, ArrayD, Axis, Ix3, array, s};
use rf_sep::{
    BatchRunner, FnModel, Framer, SepError, SepResult, SeparationModel, Separator,
    SeparatorConfig, SubbandCodec, TensorDict, separate,
};

const SAMPLE_RATE: u32 = 64;

/// Deterministic pseudo-noise in [-1, 1]
fn generate_noise(channels: usize, samples: usize) -> Array2<f32> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    Array::from_shape_fn((channels, samples), |(ch, i)| {
        let mut hasher = DefaultHasher::new();
        (ch, i).hash(&mut hasher);
        let h = hasher.finish();
        (h as f64 / u64::MAX as f64 * 2.0 - 1.0) as f32
    })
}

fn identity() -> impl SeparationModel {
    FnModel::new("identity", |batch: &TensorDict| Ok(batch.clone()))
}

fn scaling(gain: f32) -> impl SeparationModel {
    FnModel::new("scaling", move |batch: &TensorDict| {
        let x = batch.get("waveform").unwrap();
        Ok(TensorDict::new().with("waveform", x * gain))
    })
}

/// Position-dependent model: output depends on where inside the segment a
/// sample sits, so seams would show if reassembly picked the wrong parts
fn ramp_gain() -> impl SeparationModel {
    FnModel::new("ramp-gain", |batch: &TensorDict| {
        let mut x = batch.get("waveform").unwrap().clone();
        let len = x.shape()[2];
        for (i, mut column) in x.axis_iter_mut(Axis(2)).enumerate() {
            column.mapv_inplace(|v| v * (1.0 + i as f32 / len as f32));
        }
        Ok(TensorDict::new().with("waveform", x))
    })
}

#[test]
fn test_identity_reproduces_input() {
    for samples in [1, 3, 16, 17, 31, 32, 33, 100, 257] {
        for segment in [4, 8, 16] {
            for batch_size in [1, 2, 3, 64] {
                let audio = generate_noise(2, samples);
                let output = separate(audio.view(), segment, batch_size, &identity(), None)
                    .unwrap_or_else(|e| {
                        panic!(
                            "samples={} segment={} batch={}: {}",
                            samples, segment, batch_size, e
                        )
                    });

                assert_eq!(output, audio, "samples={} segment={}", samples, segment);
            }
        }
    }
}

#[test]
fn test_concrete_two_channel_scenario() {
    let audio = array![
        [0.1, -0.2, 0.3, -0.4, 0.5, -0.6, 0.7, -0.8, 0.9, -1.0],
        [1.0, 0.9, 0.8, 0.7, 0.6, 0.5, 0.4, 0.3, 0.2, 0.1f32]
    ];

    let framer = Framer::new(4).unwrap();
    let padded = framer.pad(audio.view());
    assert_eq!(padded.ncols(), 12);

    let segments = framer.slice(padded.view()).unwrap();
    assert_eq!(segments.len_of(Axis(0)), 5);
    for (idx, segment) in segments.outer_iter().enumerate() {
        assert_eq!(segment, padded.slice(s![.., idx * 2..idx * 2 + 4]));
    }

    let output = separate(audio.view(), 4, 1, &identity(), None).unwrap();
    assert_eq!(output, audio);
}

#[test]
fn test_batch_size_invariance() {
    let audio = generate_noise(2, 203);

    let reference = separate(audio.view(), 16, 1, &ramp_gain(), None).unwrap();
    for batch_size in [2, 3, 5, 7, 100] {
        let output = separate(audio.view(), 16, batch_size, &ramp_gain(), None).unwrap();
        assert_eq!(output, reference, "batch_size = {}", batch_size);
    }
}

#[test]
fn test_scaling_model_scales_output() {
    let audio = generate_noise(1, 90);
    let output = separate(audio.view(), 8, 4, &scaling(0.5), None).unwrap();

    assert_eq!(output, &audio * 0.5);
}

#[test]
fn test_zeroing_model_gives_silence() {
    let model = FnModel::new("zero", |batch: &TensorDict| {
        let x = batch.get("waveform").unwrap();
        Ok(TensorDict::new().with("waveform", ArrayD::zeros(x.raw_dim())))
    });
    let audio = generate_noise(2, 50);

    let output = separate(audio.view(), 8, 2, &model, None).unwrap();
    assert_eq!(output.dim(), (2, 50));
    assert!(output.iter().all(|&x| x == 0.0));
}

#[test]
fn test_ramp_model_keeps_centre_regions() {
    // Segment 8: sample at segment offset i is scaled by 1 + i/8.
    // Output sample p comes from offset p (first segment) or from the
    // segment whose kept centre [2, 6) covers it.
    let audio = Array2::<f32>::ones((1, 24));
    let output = separate(audio.view(), 8, 3, &ramp_gain(), None).unwrap();

    let expected: Vec<f32> = (0..24)
        .map(|p| {
            let offset = if p < 6 {
                p
            } else if p >= 18 {
                p - 16
            } else {
                2 + (p - 2) % 4
            };
            1.0 + offset as f32 / 8.0
        })
        .collect();

    assert_eq!(output.row(0).to_vec(), expected);
}

#[test]
fn test_condition_tiled_per_segment() {
    let model = FnModel::new("conditioned", |batch: &TensorDict| {
        let wav = batch.get("waveform").unwrap();
        let cond = batch.get("condition").unwrap();

        assert_eq!(cond.shape(), &[wav.shape()[0], 3]);
        for row in cond.outer_iter() {
            assert_eq!(row.iter().copied().collect::<Vec<_>>(), vec![0.0f32, 1.0, 0.0]);
        }

        // Scale by the index of the hot entry
        let gain = cond.outer_iter().next().map(|r| r[[1]]).unwrap_or(0.0) * 2.0;
        Ok(TensorDict::new().with("waveform", wav * gain))
    });

    let config = SeparatorConfig::default()
        .with_sample_rate(SAMPLE_RATE)
        .with_segment_seconds(0.25)
        .with_batch_size(2)
        .with_sources(["vocals", "bass", "drums"]);
    let separator = Separator::new(model, config).unwrap();

    let audio = generate_noise(2, 70);
    let output = separator.separate_source(audio.view(), "bass").unwrap();
    assert_eq!(output, &audio * 2.0);
}

#[test]
fn test_model_failure_is_atomic() {
    let calls = std::sync::atomic::AtomicUsize::new(0);
    let model = FnModel::new("fails-late", |batch: &TensorDict| {
        if calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 2 {
            return Err(SepError::ModelInvocation {
                reason: "device lost".into(),
            });
        }
        Ok(batch.clone())
    });

    let audio = generate_noise(1, 64);
    let result = separate(audio.view(), 8, 2, &model, None);

    match result {
        Err(SepError::ModelInvocation { reason }) => assert_eq!(reason, "device lost"),
        other => panic!("expected model failure, got {:?}", other.map(|a| a.dim())),
    }
    // No retries
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
}

#[test]
fn test_wrong_output_segment_length() {
    let model = FnModel::new("shrinking", |batch: &TensorDict| {
        let x = batch.get("waveform").unwrap();
        let x = x.clone().into_dimensionality::<Ix3>().unwrap();
        let shorter = x.slice(s![.., .., ..4]).to_owned().into_dyn();
        Ok(TensorDict::new().with("waveform", shorter))
    });
    let audio = generate_noise(1, 40);

    assert!(matches!(
        separate(audio.view(), 8, 2, &model, None),
        Err(SepError::InvalidShape { .. })
    ));
}

#[test]
fn test_invalid_arguments() {
    let audio = generate_noise(1, 40);

    assert!(matches!(
        separate(audio.view(), 0, 1, &identity(), None),
        Err(SepError::InvalidArgument(_))
    ));
    assert!(matches!(
        separate(audio.view(), 8, 0, &identity(), None),
        Err(SepError::InvalidArgument(_))
    ));
}

#[test]
fn test_batch_runner_direct_use() -> SepResult<()> {
    let inputs = TensorDict::new().with("waveform", ArrayD::ones(vec![9, 2, 8]));
    let outputs = BatchRunner::new(4)?.run(&scaling(3.0), &inputs)?;

    assert_eq!(outputs.item_count()?, 9);
    assert!(outputs.get("waveform").unwrap().iter().all(|&x| x == 3.0));
    Ok(())
}

#[test]
fn test_subband_rejects_before_touching_data() {
    let codec = SubbandCodec::new(3).unwrap();
    let spec = Array::zeros((1, 2, 4, 10));

    assert!(matches!(
        codec.analyze(spec.view()),
        Err(SepError::NonDivisible { value: 10, divisor: 3, .. })
    ));
}
