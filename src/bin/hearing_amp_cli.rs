use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use hearing_amp::audio::{platform_backend, AudioPipeline, StubBackend};
use hearing_amp::audiometry::{
    ComfortOutcome, ComfortResponse, EarOrder, RecordHeader, SessionEvent, StaircaseOutcome,
    Stimulus, TestResultRecord, ThresholdResponse, Trial,
};
use hearing_amp::config::{AppConfig, TestOptions};
use hearing_amp::context::AppContext;
use hearing_amp::dsp::{amplify, BandCompressorParams, CompressorParams, MultiBandCompressor};
use hearing_amp::fitting::{BandParameterDeriver, EarSelection};
use hearing_amp::scheduler::ManualClock;
use hearing_amp::storage::{JsonFileRepository, ProfileRepository};
use tokio_stream::wrappers::BroadcastStream;

/// Upper bound on responses per simulated test before giving up
const MAX_SIMULATED_RESPONSES: usize = 5_000;

#[derive(Parser, Debug)]
#[command(
    name = "hearing_amp_cli",
    about = "Desktop harness for the hearing amplifier core"
)]
struct Cli {
    /// JSON config file (defaults to assets/hearing_amp_config.json)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Profile store directory (overrides the config's storage root)
    #[arg(long)]
    store: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stream microphone to speaker through the compressor
    Run {
        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(long)]
        seconds: Option<u64>,
        /// Use one global multiplier instead of band compression
        #[arg(long)]
        amplify: Option<f32>,
        /// Fit band parameters from this patient's stored results
        #[arg(long)]
        patient: Option<String>,
    },
    /// Run a 16-bit WAV file through the compressor
    Process {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long)]
        amplify: Option<f32>,
        #[arg(long)]
        patient: Option<String>,
    },
    /// Run threshold and MCL tests against a simulated listener
    Simulate {
        #[arg(long, default_value = "simulated")]
        patient: String,
        #[arg(long, default_value = "cli")]
        group: String,
        /// Quietest level the listener hears, dB HL
        #[arg(long, default_value_t = 30.0)]
        threshold_db_hl: f32,
        /// Level the listener finds most comfortable, dB HL
        #[arg(long, default_value_t = 60.0)]
        mcl_db_hl: f32,
        /// Comma-separated test frequencies in Hz (default: configured list)
        #[arg(long, value_delimiter = ',')]
        frequencies: Vec<f32>,
        #[arg(long, value_enum)]
        ear_order: Option<EarOrderArg>,
    },
    /// Print band parameters derived from stored results
    Derive {
        #[arg(long)]
        patient: Option<String>,
        #[arg(long, value_enum, default_value_t = EarArg::Combined)]
        ear: EarArg,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum EarArg {
    Combined,
    Left,
    Right,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum EarOrderArg {
    Left,
    Right,
    LeftRight,
    RightLeft,
}

impl From<EarOrderArg> for EarOrder {
    fn from(order: EarOrderArg) -> Self {
        match order {
            EarOrderArg::Left => EarOrder::LeftOnly,
            EarOrderArg::Right => EarOrder::RightOnly,
            EarOrderArg::LeftRight => EarOrder::LeftThenRight,
            EarOrderArg::RightLeft => EarOrder::RightThenLeft,
        }
    }
}

impl From<EarArg> for EarSelection {
    fn from(ear: EarArg) -> Self {
        match ear {
            EarArg::Combined => EarSelection::Combined,
            EarArg::Left => EarSelection::Left,
            EarArg::Right => EarSelection::Right,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    hearing_amp::init_logging();
    match run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path),
        None => AppConfig::load(),
    };
    if let Some(store) = cli.store {
        config.storage.root = store;
    }

    match cli.command {
        Commands::Run {
            seconds,
            amplify,
            patient,
        } => run_stream(config, seconds, amplify, patient).await,
        Commands::Process {
            input,
            output,
            amplify,
            patient,
        } => run_process(&config, &input, &output, amplify, patient),
        Commands::Simulate {
            patient,
            group,
            threshold_db_hl,
            mcl_db_hl,
            frequencies,
            ear_order,
        } => {
            let options = TestOptions {
                frequencies_hz: frequencies,
                ear_order: ear_order.map(EarOrder::from),
                presentation_mode: None,
            };
            run_simulate(config, &patient, &group, &options, threshold_db_hl, mcl_db_hl)
        }
        Commands::Derive { patient, ear } => run_derive(&config, patient, ear.into()),
    }
}

fn stored_records(config: &AppConfig, patient: Option<&str>) -> Result<Vec<TestResultRecord>> {
    let repository = JsonFileRepository::new(&config.storage.root);
    let records = repository
        .load_test_results()
        .with_context(|| format!("reading results under {}", config.storage.root.display()))?;
    Ok(records
        .into_iter()
        .filter(|r| patient.map_or(true, |name| r.header.patient_name == name))
        .collect())
}

fn fitted_params(
    config: &AppConfig,
    patient: Option<&str>,
    ear: EarSelection,
) -> Result<(BandParameterDeriver, CompressorParams)> {
    let deriver = BandParameterDeriver::new(&config.fitting)?.with_ear_selection(ear);
    let records = stored_records(config, patient)?;
    if records.is_empty() {
        bail!("no stored results to fit from");
    }
    let params = deriver.derive(&records);
    Ok((deriver, params))
}

async fn run_stream(
    mut config: AppConfig,
    seconds: Option<u64>,
    factor: Option<f32>,
    patient: Option<String>,
) -> Result<ExitCode> {
    // Desktop platforms grant microphone access outside the process
    config.audio.assume_permission_granted = true;
    let deriver = BandParameterDeriver::new(&config.fitting)?;
    let pipeline = AudioPipeline::new(
        platform_backend(),
        config.audio.clone(),
        deriver.crossover_points(),
    );

    if let Some(factor) = factor {
        pipeline.set_amplification(factor)?;
    } else if patient.is_some() {
        let (_, params) = fitted_params(&config, patient.as_deref(), EarSelection::Combined)?;
        pipeline.update_params(params)?;
    }

    let mut stats = BroadcastStream::new(pipeline.subscribe_stats());
    pipeline.start()?;
    println!("Streaming; press Ctrl-C to stop");

    let deadline = tokio::time::sleep(seconds.map_or(Duration::MAX, Duration::from_secs));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = &mut deadline => break,
            item = stats.next() => match item {
                Some(Ok(snapshot)) => println!("{}", serde_json::to_string(&snapshot)?),
                Some(Err(_)) => continue,
                None => break,
            },
        }
        if !pipeline.is_running() {
            eprintln!("Stream worker exited");
            break;
        }
    }

    pipeline.stop()?;
    Ok(ExitCode::from(0))
}

fn run_process(
    config: &AppConfig,
    input: &Path,
    output: &Path,
    factor: Option<f32>,
    patient: Option<String>,
) -> Result<ExitCode> {
    let mut reader = hound::WavReader::open(input)
        .with_context(|| format!("opening {}", input.display()))?;
    let spec = reader.spec();
    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        bail!("{} is not 16-bit PCM", input.display());
    }
    let channels = spec.channels.max(1) as usize;
    // Mono is processed; the first channel is taken from multichannel input
    let samples: Vec<i16> = reader
        .samples::<i16>()
        .step_by(channels)
        .collect::<Result<_, _>>()
        .context("decoding samples")?;

    let mut processed = vec![0i16; samples.len()];
    match factor {
        Some(factor) => amplify(&samples, &mut processed, factor),
        None => {
            let (deriver, params) = match patient {
                Some(name) => fitted_params(config, Some(&name), EarSelection::Combined)?,
                None => {
                    let deriver = BandParameterDeriver::new(&config.fitting)?;
                    let params = CompressorParams {
                        bands: vec![BandCompressorParams::passthrough(); deriver.bands().len()],
                    };
                    (deriver, params)
                }
            };
            let mut compressor = MultiBandCompressor::new(
                spec.sample_rate,
                &deriver.crossover_points(),
                &params,
                config.audio.reference_db,
            )?
            .with_noise_gate(config.audio.noise_gate_threshold);
            compressor.process(&samples, &mut processed);
        }
    }

    let out_spec = hound::WavSpec {
        channels: 1,
        ..spec
    };
    let mut writer = hound::WavWriter::create(output, out_spec)
        .with_context(|| format!("creating {}", output.display()))?;
    for sample in processed {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    println!(
        "Wrote {} samples at {} Hz to {}",
        samples.len(),
        spec.sample_rate,
        output.display()
    );
    Ok(ExitCode::from(0))
}

/// Present the pending trial to completion on the manual clock
fn present(context: &AppContext, clock: &ManualClock) -> Result<Trial> {
    let trial = context.sessions().begin_trial()?;
    loop {
        let wait = context
            .sessions()
            .status()
            .and_then(|status| status.next_event_in)
            .unwrap_or(Duration::from_millis(10));
        clock.advance(wait);
        if context
            .sessions()
            .pump()?
            .contains(&SessionEvent::PresentationComplete)
        {
            return Ok(trial);
        }
    }
}

fn threshold_answer(trial: &Trial, threshold_db_hl: f32) -> ThresholdResponse {
    if trial.level_db_hl < threshold_db_hl {
        return ThresholdResponse::IndicatedNoSound;
    }
    match trial.stimulus {
        Stimulus::ToneA => ThresholdResponse::IndicatedA,
        Stimulus::ToneB => ThresholdResponse::IndicatedB,
        Stimulus::NoTone => ThresholdResponse::IndicatedNoSound,
    }
}

fn comfort_answer(trial: &Trial, mcl_db_hl: f32) -> ComfortResponse {
    let offset = trial.level_db_hl - mcl_db_hl;
    if offset < -5.0 {
        ComfortResponse::TooSoft
    } else if offset < 0.0 {
        ComfortResponse::SlightlySoft
    } else if offset > 2.5 {
        ComfortResponse::TooLoud
    } else {
        ComfortResponse::MostComfortable
    }
}

fn run_simulate(
    config: AppConfig,
    patient: &str,
    group: &str,
    options: &TestOptions,
    threshold_db_hl: f32,
    mcl_db_hl: f32,
) -> Result<ExitCode> {
    let clock = Arc::new(ManualClock::new());
    let repository = Arc::new(JsonFileRepository::new(&config.storage.root));
    let context = AppContext::new(
        config,
        Arc::new(StubBackend::new()),
        repository,
        clock.clone(),
    );
    let setting = "default";

    context
        .sessions()
        .start_threshold(setting, RecordHeader::now(group, patient), options)?;
    let mut finished = false;
    for _ in 0..MAX_SIMULATED_RESPONSES {
        let trial = present(&context, &clock)?;
        let response = threshold_answer(&trial, threshold_db_hl);
        match context.sessions().submit_threshold_response(response)? {
            StaircaseOutcome::Terminated {
                point,
                threshold_db_hl,
                ..
            } => println!(
                "threshold {:>6.0} Hz {:?}: {threshold_db_hl} dB HL",
                point.frequency_hz, point.ear
            ),
            StaircaseOutcome::Completed {
                point,
                threshold_db_hl,
                record,
            } => {
                println!(
                    "threshold {:>6.0} Hz {:?}: {threshold_db_hl} dB HL",
                    point.frequency_hz, point.ear
                );
                println!("saved threshold record {}", record.test_id());
                finished = true;
                break;
            }
            _ => {}
        }
    }
    if !finished {
        bail!("threshold test did not finish in {MAX_SIMULATED_RESPONSES} responses");
    }

    context
        .sessions()
        .start_comfort(setting, RecordHeader::now(group, patient), options)?;
    finished = false;
    for _ in 0..MAX_SIMULATED_RESPONSES {
        let trial = present(&context, &clock)?;
        let response = comfort_answer(&trial, mcl_db_hl);
        match context.sessions().submit_comfort_response(response)? {
            ComfortOutcome::Finalized {
                point, mcl_db_hl, ..
            } => println!(
                "mcl       {:>6.0} Hz {:?}: {mcl_db_hl} dB HL",
                point.frequency_hz, point.ear
            ),
            ComfortOutcome::Completed {
                point,
                mcl_db_hl,
                record,
            } => {
                println!(
                    "mcl       {:>6.0} Hz {:?}: {mcl_db_hl} dB HL",
                    point.frequency_hz, point.ear
                );
                println!("saved mcl record {}", record.test_id());
                finished = true;
                break;
            }
            _ => {}
        }
    }
    if !finished {
        bail!("MCL test did not finish in {MAX_SIMULATED_RESPONSES} responses");
    }

    let params = context.apply_fitting(Some(patient), EarSelection::Combined)?;
    println!("{}", serde_json::to_string_pretty(&params)?);
    Ok(ExitCode::from(0))
}

fn run_derive(config: &AppConfig, patient: Option<String>, ear: EarSelection) -> Result<ExitCode> {
    let (_, params) = fitted_params(config, patient.as_deref(), ear)?;
    println!("{}", serde_json::to_string_pretty(&params)?);
    Ok(ExitCode::from(0))
}
