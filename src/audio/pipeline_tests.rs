use super::*;
use crate::audio::backend::StubBackend;

const SPLIT_HZ: [f32; 3] = [750.5, 1_500.5, 3_000.5];

fn config() -> AudioConfig {
    AudioConfig {
        fallback_min_buffer_frames: 16,
        buffer_size_factor: 2,
        start_timeout_ms: 500,
        shutdown_timeout_ms: 500,
        read_timeout_ms: 2,
        stats_every_n_frames: 1,
        assume_permission_granted: true,
        ..AudioConfig::default()
    }
}

fn pipeline(backend: &StubBackend, config: AudioConfig) -> AudioPipeline {
    AudioPipeline::new(Arc::new(backend.clone()), config, SPLIT_HZ.to_vec())
}

fn ramp(len: usize) -> Vec<i16> {
    (0..len).map(|i| ((i as i16) % 200 - 100) * 50).collect()
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

fn params(gain_db: f32) -> CompressorParams {
    CompressorParams::from_arrays(
        &[60.0, 60.0, 55.0, 50.0],
        &[2.0, 2.0, 3.0, 3.0],
        &[0.005; 4],
        &[0.05; 4],
        &[gain_db, gain_db, gain_db + 5.0, gain_db + 10.0],
    )
    .unwrap()
}

#[test]
fn test_frame_size() {
    assert_eq!(frame_size(256, 8).unwrap(), 2048);
    assert_eq!(
        frame_size(0, 8),
        Err(AudioError::InvalidBufferSize {
            min_frames: 0,
            factor: 8
        })
    );
    assert!(frame_size(256, 0).is_err());
}

#[test]
fn test_permission_denied_before_any_device_call() {
    let backend = StubBackend::with_input(ramp(64));
    let pipeline = pipeline(
        &backend,
        AudioConfig {
            assume_permission_granted: false,
            ..config()
        },
    );

    assert_eq!(pipeline.start(), Err(AudioError::PermissionDenied));
    assert_eq!(backend.frames_read(), 0);
    assert_eq!(backend.open_streams(), 0);
    assert!(!pipeline.is_running());

    pipeline.set_permission_granted(true);
    pipeline.start().unwrap();
    pipeline.stop().unwrap();
}

#[test]
fn test_passthrough_reproduces_input() {
    let input = ramp(32 * 10);
    let backend = StubBackend::with_input(input.clone());
    let pipeline = pipeline(&backend, config());

    pipeline.start().unwrap();
    assert!(wait_for(|| backend.output().len() >= input.len()));
    pipeline.stop().unwrap();

    let output = backend.output();
    for (out, original) in output.iter().zip(&input) {
        assert!((out - original).abs() <= 2, "{} vs {}", out, original);
    }
}

#[test]
fn test_amplification_mode() {
    let input = vec![1_000_i16; 32 * 4];
    let backend = StubBackend::with_input(input.clone());
    let pipeline = pipeline(&backend, config());

    pipeline.set_amplification(2.5).unwrap();
    pipeline.start().unwrap();
    assert!(wait_for(|| backend.output().len() >= input.len()));
    pipeline.stop().unwrap();

    assert!(backend.output().iter().all(|&s| s == 2_500));
}

#[test]
fn test_start_twice_and_stop_idempotent() {
    let backend = StubBackend::looping(ramp(64));
    let pipeline = pipeline(&backend, config());

    pipeline.start().unwrap();
    assert!(pipeline.is_running());
    assert_eq!(pipeline.start(), Err(AudioError::AlreadyRunning));

    pipeline.stop().unwrap();
    assert!(!pipeline.is_running());
    pipeline.stop().unwrap();
    assert!(wait_for(|| backend.open_streams() == 0));
}

#[test]
fn test_zero_buffer_factor_rejected() {
    let backend = StubBackend::with_input(ramp(64));
    let pipeline = pipeline(
        &backend,
        AudioConfig {
            buffer_size_factor: 0,
            ..config()
        },
    );
    assert!(matches!(
        pipeline.start(),
        Err(AudioError::InvalidBufferSize { factor: 0, .. })
    ));

    let zero_min = StubBackend::with_input(ramp(64)).with_min_buffer_frames(0);
    let pipeline = AudioPipeline::new(Arc::new(zero_min), config(), SPLIT_HZ.to_vec());
    assert!(matches!(
        pipeline.start(),
        Err(AudioError::InvalidBufferSize { min_frames: 0, .. })
    ));
}

#[test]
fn test_device_failure_leaves_pipeline_stopped() {
    let backend = StubBackend::with_input(ramp(64)).failing_playback();
    let pipeline = pipeline(&backend, config());

    assert!(matches!(pipeline.start(), Err(AudioError::DeviceInit { .. })));
    assert!(!pipeline.is_running());
    // Capture opened first and was released when the worker bailed out
    assert_eq!(backend.open_streams(), 0);
}

#[test]
fn test_readiness_timeout_is_device_init() {
    let backend = StubBackend::with_input(ramp(64)).with_open_delay(Duration::from_millis(200));
    let pipeline = pipeline(
        &backend,
        AudioConfig {
            start_timeout_ms: 20,
            ..config()
        },
    );

    assert!(matches!(pipeline.start(), Err(AudioError::DeviceInit { .. })));
    assert!(!pipeline.is_running());

    // The abandoned worker is still inside its open call
    assert!(matches!(pipeline.start(), Err(AudioError::DeviceInit { .. })));
    assert!(wait_for(|| backend.open_streams() == 0));
}

#[test]
fn test_write_failures_drop_frames_and_continue() {
    let input = vec![500_i16; 32 * 6];
    let backend = StubBackend::with_input(input);
    backend.fail_next_writes(2);
    let pipeline = pipeline(&backend, config());
    pipeline.set_amplification(1.0).unwrap();

    let mut stats = pipeline.subscribe_stats();
    pipeline.start().unwrap();
    assert!(wait_for(|| backend.output().len() >= 32 * 4));
    pipeline.stop().unwrap();

    assert_eq!(backend.output().len(), 32 * 4);
    let mut last = PipelineStats::default();
    while let Ok(s) = stats.try_recv() {
        last = s;
    }
    assert_eq!(last.frames_dropped, 2);
    assert_eq!(last.frames_processed, 4);
    assert_eq!(last.frame_size, 32);
}

#[test]
fn test_hung_worker_reports_shutdown_timeout() {
    let backend = StubBackend::looping(ramp(64));
    let pipeline = pipeline(
        &backend,
        AudioConfig {
            shutdown_timeout_ms: 30,
            ..config()
        },
    );

    pipeline.start().unwrap();
    backend.set_hang_reads(true);
    // Let the worker enter the blocking read
    thread::sleep(Duration::from_millis(20));
    assert_eq!(
        pipeline.stop(),
        Err(AudioError::ShutdownTimeout { timeout_ms: 30 })
    );

    assert!(!pipeline.is_running());

    // The hung worker still owns both devices; no second pair is opened
    assert!(matches!(pipeline.start(), Err(AudioError::DeviceInit { .. })));
    assert_eq!(backend.open_streams(), 2);
    assert_eq!(
        pipeline.stop(),
        Err(AudioError::ShutdownTimeout { timeout_ms: 30 })
    );

    // Once unblocked it releases the devices and the slot frees up
    backend.set_hang_reads(false);
    assert!(wait_for(|| backend.open_streams() == 0));
    pipeline.stop().unwrap();
    pipeline.start().unwrap();
    assert_eq!(backend.open_streams(), 2);
    pipeline.stop().unwrap();
    assert!(wait_for(|| backend.open_streams() == 0));
}

#[test]
fn test_stereo_playback_duplicates_mono() {
    let input = vec![-700_i16; 32];
    let backend = StubBackend::with_input(input);
    let pipeline = pipeline(
        &backend,
        AudioConfig {
            playback_channels: 2,
            ..config()
        },
    );
    pipeline.set_amplification(1.0).unwrap();

    pipeline.start().unwrap();
    assert!(wait_for(|| backend.output().len() >= 64));
    pipeline.stop().unwrap();

    assert_eq!(backend.output(), vec![-700_i16; 64]);
}

#[test]
fn test_params_hot_swap_while_running() {
    let backend = StubBackend::looping(vec![8_000_i16; 32]);
    let pipeline = pipeline(&backend, config());
    pipeline.set_amplification(1.0).unwrap();

    pipeline.start().unwrap();
    assert!(wait_for(|| backend.output().len() >= 64));

    pipeline.set_amplification(0.0).unwrap();
    let mark = backend.output().len();
    assert!(wait_for(|| backend.output().len() >= mark + 32 * 3));
    pipeline.stop().unwrap();

    let output = backend.output();
    assert!(output[..32].iter().all(|&s| s == 8_000));
    assert!(output[output.len() - 32..].iter().all(|&s| s == 0));
}

#[test]
fn test_update_params_read_back_and_rejection() {
    let backend = StubBackend::new();
    let pipeline = pipeline(&backend, config());

    let installed = params(6.0);
    pipeline.update_params(installed.clone()).unwrap();
    let active = pipeline.active_params().unwrap();
    let compressor = active.compressor().unwrap();
    assert_eq!(compressor.threshold_db(), vec![60.0, 60.0, 55.0, 50.0]);
    assert_eq!(compressor.gain_db(), vec![6.0, 6.0, 11.0, 16.0]);
    assert_eq!(*compressor, installed);

    let wrong_bands = CompressorParams {
        bands: vec![BandCompressorParams::passthrough(); 2],
    };
    assert!(matches!(
        pipeline.update_params(wrong_bands),
        Err(AudioError::InvalidParameters { .. })
    ));
    let mut non_finite = params(0.0);
    non_finite.bands[1].ratio = f32::NAN;
    assert!(pipeline.update_params(non_finite).is_err());
    assert_eq!(*pipeline.active_params().unwrap().compressor().unwrap(), installed);

    assert!(pipeline.set_amplification(-1.0).is_err());
    assert!(pipeline.set_amplification(f32::INFINITY).is_err());
    assert!(pipeline.active_params().unwrap().compressor().is_some());
}
