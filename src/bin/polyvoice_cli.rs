use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use polyvoice::config::EngineConfig;
use polyvoice::engine::{factory_from, BackendFactory, NullBackend};
use polyvoice::{AudioEngine, FormatRegistry, PlayOptions, PlaybackHandle, PlaybackState};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "polyvoice_cli",
    about = "Load and play sounds through the polyvoice engine"
)]
struct Cli {
    /// Engine configuration file (defaults to assets/polyvoice.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play one or more files simultaneously
    Play {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(long, default_value_t = 1.0)]
        volume: f32,
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        pan: f32,
        /// Loop the first file until the run ends
        #[arg(long)]
        loop_first: bool,
        /// How long to keep playing (defaults to the longest sound)
        #[arg(long)]
        seconds: Option<f64>,
        #[arg(long, value_enum, default_value_t = BackendKind::Null)]
        backend: BackendKind,
    },
    /// Decode a file and print its format as JSON
    Probe { file: PathBuf },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendKind {
    /// No audio output; tracks voices in memory
    Null,
    /// Default output device (requires the cpal-output feature)
    Cpal,
}

#[derive(Serialize)]
struct ProbeReport {
    path: PathBuf,
    sample_rate: u32,
    channels: u16,
    bits_per_sample: u16,
    frames: usize,
    duration_secs: f64,
}

#[derive(Serialize)]
struct PlaybackReport {
    handle: PlaybackHandle,
    file: PathBuf,
    looping: bool,
    state: PlaybackState,
}

fn main() -> ExitCode {
    init_tracing();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::load_from_file(path),
        None => EngineConfig::load(),
    };

    match cli.command {
        Commands::Play {
            files,
            volume,
            pan,
            loop_first,
            seconds,
            backend,
        } => run_play(config, &files, volume, pan, loop_first, seconds, backend),
        Commands::Probe { file } => run_probe(&file),
    }
}

fn run_probe(file: &Path) -> Result<ExitCode> {
    let data = FormatRegistry::with_defaults()
        .load(file)
        .with_context(|| format!("decoding {}", file.display()))?;
    let format = data.format();
    let report = ProbeReport {
        path: file.to_path_buf(),
        sample_rate: format.sample_rate,
        channels: format.channels,
        bits_per_sample: format.bits_per_sample,
        frames: data.num_frames(),
        duration_secs: data.duration().as_secs_f64(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(ExitCode::from(0))
}

fn run_play(
    config: EngineConfig,
    files: &[PathBuf],
    volume: f32,
    pan: f32,
    loop_first: bool,
    seconds: Option<f64>,
    backend: BackendKind,
) -> Result<ExitCode> {
    let factory = backend_factory(backend, &config)?;
    let engine = AudioEngine::with_factory(factory, config);

    let sounds = files
        .iter()
        .map(|file| {
            engine
                .load(file)
                .with_context(|| format!("loading {}", file.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    let run_for = match seconds {
        Some(secs) => Duration::try_from_secs_f64(secs)
            .with_context(|| format!("invalid --seconds value {}", secs))?,
        None => sounds
            .iter()
            .map(|s| s.duration())
            .max()
            .unwrap_or(Duration::ZERO),
    };

    let guard = engine.start_guarded().context("starting audio engine")?;

    let mut handles = Vec::with_capacity(sounds.len());
    for (index, sound) in sounds.iter().enumerate() {
        let looping = loop_first && index == 0;
        let options = PlayOptions::default()
            .volume(volume)
            .pan(pan)
            .looping(looping);
        let handle = guard
            .play(sound, options)
            .with_context(|| format!("playing {}", files[index].display()))?;
        handles.push((handle, index, looping));
    }

    thread::sleep(run_for);

    for (handle, index, looping) in &handles {
        let report = PlaybackReport {
            handle: *handle,
            file: files[*index].clone(),
            looping: *looping,
            state: guard.playback_state(*handle)?,
        };
        println!("{}", serde_json::to_string(&report)?);
    }

    drop(guard);
    Ok(ExitCode::from(0))
}

#[cfg(feature = "cpal-output")]
fn backend_factory(kind: BackendKind, config: &EngineConfig) -> Result<BackendFactory> {
    Ok(match kind {
        BackendKind::Null => factory_from(NullBackend::new()),
        BackendKind::Cpal => polyvoice::engine::CpalBackend::factory(config.output),
    })
}

#[cfg(not(feature = "cpal-output"))]
fn backend_factory(kind: BackendKind, _config: &EngineConfig) -> Result<BackendFactory> {
    match kind {
        BackendKind::Null => Ok(factory_from(NullBackend::new())),
        BackendKind::Cpal => {
            anyhow::bail!("cpal backend not available; rebuild with --features cpal-output")
        }
    }
}
