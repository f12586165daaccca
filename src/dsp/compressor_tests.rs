use super::*;

const SPLITS: [f32; 3] = [750.0, 1_500.0, 3_000.0];

fn uniform(threshold_db: f32, ratio: f32, gain_db: f32) -> CompressorParams {
    CompressorParams {
        bands: vec![
            BandCompressorParams {
                threshold_db,
                ratio,
                attack_seconds: 0.005,
                release_seconds: 0.05,
                gain_db,
            };
            4
        ],
    }
}

fn sine(frequency_hz: f32, amplitude: f32, len: usize) -> Vec<i16> {
    (0..len)
        .map(|i| {
            let phase = 2.0 * std::f32::consts::PI * frequency_hz * i as f32 / 44_100.0;
            (phase.sin() * amplitude * 32_767.0) as i16
        })
        .collect()
}

fn peak(samples: &[i16]) -> i32 {
    samples.iter().map(|s| (*s as i32).abs()).max().unwrap_or(0)
}

#[test]
fn test_unity_ratio_scales_by_gain_only() {
    let params = uniform(-100.0, 1.0, 6.0);
    let mut compressor = MultiBandCompressor::new(44_100, &SPLITS, &params, 100.0).unwrap();
    let input = sine(1_000.0, 0.25, 2_048);
    let mut output = vec![0i16; input.len()];
    compressor.process(&input, &mut output);

    let gain = 10f32.powf(6.0 / 20.0);
    for (x, y) in input.iter().zip(&output) {
        let expected = (*x as f32 * gain).round() as i32;
        assert!((expected - *y as i32).abs() <= 1, "{} -> {} (expected {})", x, y, expected);
    }
}

#[test]
fn test_zero_parameters_pass_input_through() {
    // All-zero bands are what the fitting emits when a band has no data
    let params = CompressorParams {
        bands: vec![BandCompressorParams::default(); 4],
    };
    let mut compressor = MultiBandCompressor::new(44_100, &SPLITS, &params, 100.0).unwrap();
    let input = sine(440.0, 0.5, 1_024);
    let mut output = vec![0i16; input.len()];
    compressor.process(&input, &mut output);

    for (x, y) in input.iter().zip(&output) {
        assert!((*x as i32 - *y as i32).abs() <= 1);
    }
}

#[test]
fn test_compression_reduces_loud_signal() {
    let mut plain =
        MultiBandCompressor::new(44_100, &SPLITS, &uniform(60.0, 1.0, 0.0), 100.0).unwrap();
    let mut squeezed =
        MultiBandCompressor::new(44_100, &SPLITS, &uniform(60.0, 10.0, 0.0), 100.0).unwrap();
    let input = sine(500.0, 0.8, 8_820);
    let mut a = vec![0i16; input.len()];
    let mut b = vec![0i16; input.len()];
    plain.process(&input, &mut a);
    squeezed.process(&input, &mut b);

    let tail = 4_410..;
    assert!(peak(&b[tail.clone()]) < peak(&a[tail]) / 4);
}

#[test]
fn test_quiet_signal_below_threshold_is_untouched() {
    let params = uniform(90.0, 4.0, 0.0);
    let mut compressor = MultiBandCompressor::new(44_100, &SPLITS, &params, 100.0).unwrap();
    // -40 dBFS is 60 dB on the 100 dB reference, well under 90
    let input = sine(1_000.0, 0.01, 4_410);
    let mut output = vec![0i16; input.len()];
    compressor.process(&input, &mut output);
    for (x, y) in input.iter().zip(&output) {
        assert!((*x as i32 - *y as i32).abs() <= 1);
    }
}

#[test]
fn test_output_is_hard_clipped() {
    let params = uniform(-100.0, 1.0, 40.0);
    let mut compressor = MultiBandCompressor::new(44_100, &SPLITS, &params, 100.0).unwrap();
    let input = sine(250.0, 0.9, 2_000);
    let mut output = vec![0i16; input.len()];
    compressor.process(&input, &mut output);
    assert_eq!(output.iter().copied().max(), Some(i16::MAX));
    assert_eq!(output.iter().copied().min(), Some(i16::MIN));
}

#[test]
fn test_same_input_same_output() {
    let params = uniform(50.0, 3.0, 10.0);
    let input = sine(2_000.0, 0.6, 4_000);
    let mut first = MultiBandCompressor::new(44_100, &SPLITS, &params, 100.0).unwrap();
    let mut second = MultiBandCompressor::new(44_100, &SPLITS, &params, 100.0).unwrap();
    let mut a = vec![0i16; input.len()];
    let mut b = vec![0i16; input.len()];
    first.process(&input, &mut a);
    second.process(&input, &mut b);
    assert_eq!(a, b);

    first.reset();
    let mut c = vec![0i16; input.len()];
    first.process(&input, &mut c);
    assert_eq!(a, c);
}

#[test]
fn test_noise_gate_silences_low_level_input() {
    let params = uniform(-100.0, 1.0, 0.0);
    let mut compressor = MultiBandCompressor::new(44_100, &SPLITS, &params, 100.0)
        .unwrap()
        .with_noise_gate(0.01);
    let input = sine(1_000.0, 0.005, 1_000);
    let mut output = vec![1i16; input.len()];
    compressor.process(&input, &mut output);
    assert!(output.iter().all(|s| *s == 0));
}

#[test]
fn test_set_params_checks_band_count() {
    let mut compressor =
        MultiBandCompressor::new(44_100, &SPLITS, &uniform(50.0, 2.0, 0.0), 100.0).unwrap();
    let three_bands = CompressorParams {
        bands: vec![BandCompressorParams::passthrough(); 3],
    };
    assert!(compressor.set_params(&three_bands).is_err());
    assert_eq!(compressor.params(), uniform(50.0, 2.0, 0.0));

    compressor.set_params(&uniform(40.0, 3.0, 5.0)).unwrap();
    assert_eq!(compressor.params(), uniform(40.0, 3.0, 5.0));
}

#[test]
fn test_constructor_rejects_band_mismatch() {
    let params = CompressorParams {
        bands: vec![BandCompressorParams::passthrough(); 2],
    };
    assert!(MultiBandCompressor::new(44_100, &SPLITS, &params, 100.0).is_err());
}

#[test]
fn test_amplify_multiplies_and_clamps() {
    let input = [1_000i16, -1_000, 30_000];
    let mut output = [0i16; 3];
    amplify(&input, &mut output, 2.0);
    assert_eq!(output, [2_000, -2_000, i16::MAX]);
}
