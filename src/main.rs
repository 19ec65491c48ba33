mod acquisition;
mod analyser;
mod audio_stream;
mod config;
mod conversion;
mod frequency_map;
mod make_waves;
mod palette;
mod plot;
mod presets;
mod render;
mod scheduler;
mod spectrogram;
mod utils;
mod wav_input;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use log::{error, info};

use acquisition::{Acquisition, AcquisitionPort, SourceKind};
use analyser::WindowType;
use audio_stream::{InputStream, PlaybackClock};
use config::{ConfigStore, VisualizerConfig};
use make_waves::ToneInput;
use plot::TerrainApp;
use presets::PresetManager;
use render::LogRenderer;
use scheduler::FrameScheduler;
use utils::DEFAULT_SAMPLE_RATE;
use wav_input::WavInput;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Live capture (needs the `portaudio` feature)
    Device,
    /// Built-in synthetic signal
    Tone,
    /// Loop a WAV file
    Wav,
}

#[derive(Parser, Debug)]
#[command(name = "spectral_terrain", version, about = "Scrolling 3D spectrogram of live audio")]
struct Args {
    /// Where audio comes from; defaults to `wav` when --wav is given
    #[arg(long, value_enum)]
    backend: Option<Backend>,

    #[arg(long)]
    wav: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = SourceKind::Microphone)]
    source: SourceKind,

    /// Power of two between 32 and 32768
    #[arg(long)]
    fft_size: Option<usize>,

    /// Taper applied before each transform
    #[arg(long, value_enum)]
    window: Option<WindowType>,

    /// Smaller field for slow machines
    #[arg(long)]
    compact: bool,

    #[arg(long)]
    preset: Option<String>,

    #[arg(long, default_value = "presets.yaml")]
    presets: PathBuf,

    /// Store the resolved startup configuration under this name and exit
    #[arg(long)]
    save_preset: Option<String>,

    /// Print the preset names in the presets file and exit
    #[arg(long)]
    list_presets: bool,

    /// Run without a window, logging frame summaries
    #[arg(long)]
    headless: bool,

    /// Headless tick rate
    #[arg(long, default_value_t = 60)]
    fps: u32,

    /// Stop after this many headless frames
    #[arg(long)]
    frames: Option<u64>,

    /// Advance tone and WAV input by exactly one tick of audio per read
    /// instead of following the wall clock
    #[arg(long)]
    stepped: bool,

    #[arg(long)]
    enable_logs: bool,
}

impl Args {
    fn clock(&self) -> PlaybackClock {
        if self.stepped {
            PlaybackClock::stepped(self.fps)
        } else {
            PlaybackClock::realtime()
        }
    }

    fn backend(&self) -> Backend {
        match (self.backend, &self.wav) {
            (Some(backend), _) => backend,
            (None, Some(_)) => Backend::Wav,
            (None, None) if cfg!(feature = "portaudio") => Backend::Device,
            (None, None) => Backend::Tone,
        }
    }
}

fn main() {
    let args = Args::parse();

    if args.enable_logs {
        // Don't override RUST_LOG if it's already set
        if std::env::var("RUST_LOG").is_err() {
            std::env::set_var("RUST_LOG", "spectral_terrain=info,scheduler=info,spectrogram=info");
        }
        env_logger::init();
    }

    if let Err(e) = run(&args) {
        if args.enable_logs {
            error!("Application encountered an error: {:?}", e);
        } else {
            eprintln!("Error: {:?}", e);
        }
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    if args.list_presets {
        for name in PresetManager::load(&args.presets)?.names() {
            println!("{}", name);
        }
        return Ok(());
    }

    let store = ConfigStore::new(initial_config(args)?).context("Invalid startup configuration")?;
    info!("Starting with {:?}", store.get());

    if let Some(name) = &args.save_preset {
        let mut presets = PresetManager::load(&args.presets)?;
        presets.insert(name, store.get().clone());
        presets.save()?;
        println!("Saved preset '{}' to {}", name, args.presets.display());
        return Ok(());
    }

    match args.backend() {
        Backend::Device => launch_device(args, store),
        Backend::Tone => launch(ToneInput::new(DEFAULT_SAMPLE_RATE, args.clock()), args, store),
        Backend::Wav => {
            let path = args
                .wav
                .clone()
                .ok_or_else(|| anyhow!("--backend wav needs --wav <FILE>"))?;
            launch(WavInput::new(path, args.clock()), args, store)
        }
    }
}

fn initial_config(args: &Args) -> Result<VisualizerConfig> {
    let mut config = match &args.preset {
        Some(name) => PresetManager::load(&args.presets)?.get(name)?,
        None => VisualizerConfig::default(),
    };
    if args.compact {
        let compact = VisualizerConfig::compact();
        config.width = compact.width;
        config.depth = compact.depth;
    }
    if let Some(fft_size) = args.fft_size {
        config.fft_size = fft_size;
    }
    if let Some(window) = args.window {
        config.analyser_window = window;
    }
    Ok(config)
}

#[cfg(feature = "portaudio")]
fn launch_device(args: &Args, store: ConfigStore) -> Result<()> {
    let input = audio_stream::PortAudioInput::new()?;
    launch(input, args, store)
}

#[cfg(not(feature = "portaudio"))]
fn launch_device(_args: &Args, _store: ConfigStore) -> Result<()> {
    Err(acquisition::AcquisitionError::Unsupported("portaudio").into())
}

fn launch<I: InputStream + 'static>(input: I, args: &Args, store: ConfigStore) -> Result<()> {
    let acquisition = Acquisition::new(input, store.get().analyser_settings());
    let scheduler = FrameScheduler::new(acquisition, store.get());
    if args.headless {
        run_headless(scheduler, store.get(), args)
    } else {
        let app = TerrainApp::new(scheduler, store, args.source);
        plot::run_native("Spectral Terrain", Box::new(app))
    }
}

fn run_headless<A: AcquisitionPort>(
    mut scheduler: FrameScheduler<A>,
    config: &VisualizerConfig,
    args: &Args,
) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    scheduler
        .start(args.source, config.fft_size)
        .with_context(|| format!("Failed to open {:?} input", args.source))?;

    let fps = args.fps.max(1);
    let period = Duration::from_secs_f64(1.0 / f64::from(fps));
    let mut renderer = LogRenderer::new(u64::from(fps));
    let mut ticks: u64 = 0;

    while running.load(Ordering::SeqCst) && args.frames.map_or(true, |limit| ticks < limit) {
        let started = Instant::now();
        scheduler.tick(config, &mut renderer);
        ticks += 1;
        if let Some(rest) = period.checked_sub(started.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    info!(
        "Stopped after {} ticks, {} slices ingested, {} frames dropped",
        ticks,
        scheduler.buffer().ingested(),
        scheduler.dropped_frames()
    );
    if let Some(summary) = renderer.last() {
        println!(
            "{} frames ({} waiting), {}x{} field, peak {:.2}, newest mean {:.2}",
            renderer.frames(),
            renderer.not_ready_frames(),
            summary.width,
            summary.depth,
            summary.peak,
            summary.newest_mean
        );
    }
    Ok(())
}
