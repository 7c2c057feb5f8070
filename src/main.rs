use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use tracing::info;

use voicewire::config::ClientConfig;
use voicewire::core::audio::{ActivityIndicator, AudioCapture};
use voicewire::core::realtime::{
    DataChannel, DataChannelState, DisplaySink, HttpTokenService, ItemRole, ProtocolEngine,
    RealtimeError, TokenService, transport::TransportResult,
};

/// voicewire - realtime voice session tools
#[derive(Parser, Debug)]
#[command(name = "voicewire")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Request an ephemeral credential and print its expiry
    Token,

    /// Run a WAV file through the capture pipeline, printing one append event per frame
    Encode {
        /// Input WAV file (mono or multi-channel, 16-bit integer or 32-bit float)
        #[arg(long = "wav", value_name = "FILE")]
        wav: PathBuf,
    },

    /// Feed recorded inbound events through the protocol engine
    Replay {
        /// JSON Lines file with one server event per line
        #[arg(long = "events", value_name = "FILE")]
        events: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration from file or environment
    let config = if let Some(config_path) = cli.config {
        info!("Loading configuration from {}", config_path.display());
        ClientConfig::from_file(&config_path)?
    } else {
        ClientConfig::from_env()?
    };

    match cli.command {
        Commands::Token => run_token(&config).await,
        Commands::Encode { wav } => run_encode(&config, &wav),
        Commands::Replay { events } => run_replay(&config, &events),
    }
}

// ===== token =====

async fn run_token(config: &ClientConfig) -> anyhow::Result<()> {
    let service = HttpTokenService::new(&config.token_service_url, config.api_key.clone());
    let credential = service.acquire(config.model, config.voice).await?;

    println!("model:      {}", config.model);
    println!("voice:      {}", config.voice);
    if let Some(session_id) = credential.session_id() {
        println!("session:    {}", session_id);
    }
    match credential.expires_at() {
        Some(expires_at) => println!("expires_at: {}", expires_at),
        None => println!("expires_at: unknown"),
    }
    Ok(())
}

// ===== encode =====

/// Data channel that writes every event to stdout as one JSON line.
struct StdoutChannel;

impl DataChannel for StdoutChannel {
    fn ready_state(&self) -> DataChannelState {
        DataChannelState::Open
    }

    fn send_text(&self, payload: &str) -> TransportResult<()> {
        println!("{}", payload);
        Ok(())
    }

    fn close(&self) {}
}

fn run_encode(config: &ClientConfig, path: &Path) -> anyhow::Result<()> {
    let (samples, sample_rate) = read_wav_mono(path)?;
    info!(
        "Encoding {} samples at {} Hz in frames of {}",
        samples.len(),
        sample_rate,
        config.frame_size
    );

    let display: Arc<dyn DisplaySink> = Arc::new(ConsoleDisplay);
    let indicator = ActivityIndicator::new(display.clone(), config.activity_hold);
    let mut engine = ProtocolEngine::new(display, indicator);
    engine.attach(Arc::new(StdoutChannel));

    let mut capture = AudioCapture::new(config.frame_size, config.activity_threshold);
    capture.set_recording(true, &mut engine);
    let mut frame = vec![0.0f32; config.frame_size];
    for chunk in samples.chunks(config.frame_size) {
        // Trailing chunk is padded with silence to a full frame
        frame[..chunk.len()].copy_from_slice(chunk);
        frame[chunk.len()..].fill(0.0);
        capture.process_frame(&frame, &mut engine);
    }
    capture.set_recording(false, &mut engine);

    let stats = capture.stats();
    eprintln!(
        "frames sent: {}, active frames: {}, commits: {}",
        stats.frames_sent, stats.active_frames, stats.commits_sent
    );
    Ok(())
}

/// Read a WAV file as mono float samples, averaging channels.
fn read_wav_mono(path: &Path) -> anyhow::Result<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file {}", path.display()))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    let mono = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();
    Ok((mono, spec.sample_rate))
}

// ===== replay =====

/// Display that prints conversation updates to stdout and indicators to stderr.
struct ConsoleDisplay;

impl DisplaySink for ConsoleDisplay {
    fn on_item_update(&self, item_id: &str, role: ItemRole, text: &str, is_final: bool) {
        let marker = if is_final { "final" } else { "partial" };
        println!("[{}] {} ({}): {}", role, item_id, marker, text);
    }

    fn on_activity(&self, active: bool) {
        eprintln!("activity: {}", if active { "on" } else { "off" });
    }

    fn on_connection_state(&self, connected: bool) {
        eprintln!("connected: {}", connected);
    }

    fn on_speech(&self, active: bool) {
        eprintln!("speech: {}", if active { "started" } else { "stopped" });
    }

    fn on_error(&self, error: &RealtimeError) {
        eprintln!("error: {}", error);
    }
}

fn run_replay(config: &ClientConfig, path: &Path) -> anyhow::Result<()> {
    let contents = fs::read_to_string(path)
        .map_err(|e| anyhow!("Failed to read events file {}: {}", path.display(), e))?;

    let display: Arc<dyn DisplaySink> = Arc::new(ConsoleDisplay);
    let indicator = ActivityIndicator::new(display.clone(), config.activity_hold);
    let mut engine = ProtocolEngine::new(display, indicator);

    for line in contents.lines().map(str::trim).filter(|l| !l.is_empty()) {
        engine.receive(line);
    }

    println!();
    println!("Conversation:");
    for item in engine.conversation().items() {
        println!("  {:<9} {}", item.role.to_string(), item.text);
    }

    let stats = engine.stats();
    eprintln!(
        "messages: {}, parse failures: {}, ignored: {}",
        stats.messages_received, stats.parse_failures, stats.ignored
    );
    Ok(())
}
