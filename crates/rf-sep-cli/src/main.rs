//! rf-sep: separate one source out of a recording
//!
//! Usage:
//!   rf-sep --model vocals.onnx --select vocals --audio-path mix.wav --output-path vocals.wav
//!   rf-sep --model query.onnx --select bass --config query.json \
//!          --audio-path mix.wav --output-path bass.wav --residual-path rest.wav

mod audio_io;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::Parser;
use rf_sep::{InferenceConfig, OnnxModel, Separator, SeparatorConfig, waveform};

#[derive(Parser, Debug)]
#[command(name = "rf-sep", version, about = "Segment-based neural source separation")]
struct Cli {
    /// Input WAV file
    #[arg(long)]
    audio_path: PathBuf,

    /// Where to write the separated source
    #[arg(long)]
    output_path: PathBuf,

    /// Exported ONNX separation model
    #[arg(long)]
    model: PathBuf,

    /// Source to extract (looked up in the config's sources for conditional
    /// models)
    #[arg(long)]
    select: String,

    /// Also write the mixture minus the separated source
    #[arg(long)]
    residual_path: Option<PathBuf>,

    /// Separator configuration (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured batch size
    #[arg(long)]
    batch_size: Option<usize>,

    /// Override the configured segment duration
    #[arg(long)]
    segment_seconds: Option<f32>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    run(&cli)
}

fn run(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;

    let audio = audio_io::read_wav(&cli.audio_path)?;
    if audio.sample_rate != config.sample_rate {
        bail!(
            "{} is {} Hz but the model expects {} Hz (resample it first)",
            cli.audio_path.display(),
            audio.sample_rate,
            config.sample_rate
        );
    }
    log::info!(
        "Loaded {}: {} channels, {:.2} s",
        cli.audio_path.display(),
        audio.channels(),
        audio.duration_secs()
    );

    let model = OnnxModel::load(&cli.model, inference_config(&config))
        .with_context(|| format!("failed to load model {}", cli.model.display()))?;
    let separator = Separator::new(model, config)?;

    let started = Instant::now();
    let separated = separator
        .separate_source(audio.samples.view(), &cli.select)
        .with_context(|| format!("separating '{}' failed", cli.select))?;
    log::info!(
        "Separated '{}' in {:.2} s",
        cli.select,
        started.elapsed().as_secs_f64()
    );

    audio_io::write_wav(&cli.output_path, separated.view(), audio.sample_rate)?;
    log::info!("Wrote {}", cli.output_path.display());

    if let Some(residual_path) = &cli.residual_path {
        let residual = waveform::residual(audio.samples.view(), separated.view())?;
        audio_io::write_wav(residual_path, residual.view(), audio.sample_rate)?;
        log::info!("Wrote {}", residual_path.display());
    }

    Ok(())
}

/// Config file (or defaults) with command-line overrides applied
fn load_config(cli: &Cli) -> Result<SeparatorConfig> {
    let mut config = match &cli.config {
        Some(path) => SeparatorConfig::from_json_file(path)
            .with_context(|| format!("invalid config {}", path.display()))?,
        None => SeparatorConfig::default(),
    };

    if let Some(batch_size) = cli.batch_size {
        config = config.with_batch_size(batch_size);
    }
    if let Some(seconds) = cli.segment_seconds {
        config = config.with_segment_seconds(seconds);
    }

    config.validate()?;
    Ok(config)
}

/// Graph inputs and outputs named after the configured signal keys
fn inference_config(config: &SeparatorConfig) -> InferenceConfig {
    let mut input_keys = vec![config.waveform_key.clone()];
    if config.conditional {
        input_keys.push(config.condition_key.clone());
    }

    InferenceConfig {
        input_keys,
        output_keys: vec![config.output_key.clone()],
        ..Default::default()
    }
}
