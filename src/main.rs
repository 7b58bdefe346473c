use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use aperture::audio::{samples_to_wav, AudioChunk, MicCapture, CAPTURE_SAMPLE_RATE};
use aperture::playback::{AudioOutput, PlaybackScheduler, SystemClock, PLAYBACK_SAMPLE_RATE};
use aperture::vision::{FrameSource, MediaFrame};
use aperture::{ChatLog, Config, LivePipeline, MemoryChatLog};

/// Aperture - live multimodal perception client for AI assistants
#[derive(Parser)]
#[command(name = "aperture", version, about)]
struct Cli {
    /// Path to a config file (defaults to ~/.config/aperture/config.toml)
    #[arg(short, long, env = "APERTURE_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,

        /// Save the captured audio to a WAV file
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Test speaker output
    TestSpeaker,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,aperture=info",
        1 => "info,aperture=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration, save } => test_mic(duration, save).await,
            Command::TestSpeaker => test_speaker().await,
        };
    }

    run_live(cli.config.as_deref()).await
}

/// Placeholder frame source for hosts without a camera integration
struct NoCamera;

impl FrameSource for NoCamera {
    fn next_frame(&mut self) -> aperture::Result<Option<MediaFrame>> {
        Ok(None)
    }
}

#[allow(clippy::future_not_send)]
async fn run_live(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = match config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if config.endpoint.api_key.is_none() {
        tracing::warn!(
            "{} not set - the endpoint will likely refuse the connect",
            aperture::config::API_KEY_ENV
        );
    }

    let chat = Arc::new(MemoryChatLog::new());

    // No camera integration is wired in on this host: run audio-only, with
    // the attention gate pinned open and no scene snapshots.
    tracing::info!("starting live session (audio only)");
    let (pipeline, handles) =
        LivePipeline::start(
            &config,
            Box::new(NoCamera),
            None,
            Arc::clone(&chat) as Arc<dyn ChatLog>,
        )
        .await?;

    // Ctrl-C tears the pipeline down
    let interrupt = handles.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt - shutting down");
            interrupt.cancel();
        }
    });

    // Mirror live captions to the log
    let mut caption_rx = handles.caption.clone();
    let caption_guard = handles.cancel.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = caption_guard.cancelled() => return,
                changed = caption_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    let caption = caption_rx.borrow_and_update().clone();
                    if !caption.user.is_empty() || !caption.model.is_empty() {
                        tracing::info!(user = %caption.user, model = %caption.model, "caption");
                    }
                }
            }
        }
    });

    tracing::info!("live session running - press Ctrl-C to stop");
    pipeline.run().await;

    let turns = chat.turns().await;
    tracing::info!(turns = turns.len(), "session ended");
    for turn in turns {
        println!("you:   {}", turn.user);
        println!("model: {}\n", turn.model);
    }

    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64, save: Option<PathBuf>) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let captured = Arc::new(std::sync::Mutex::new(Vec::<f32>::new()));
    let sink = Arc::clone(&captured);
    let mut mic = MicCapture::start(move |block| {
        if let Ok(mut samples) = sink.lock() {
            samples.extend(block);
        }
    })?;
    let meter = mic.meter();

    println!("Sample rate: {CAPTURE_SAMPLE_RATE} Hz");
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let level = *meter.borrow();

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (level * 100.0).min(50.0) as usize;
        let bar: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("[{:2}s] RMS: {:.4} | [{}]", i + 1, level, bar);
    }

    mic.stop();

    if let Some(path) = save {
        let samples = captured.lock().map(|s| s.clone()).unwrap_or_default();
        let wav = samples_to_wav(&samples, CAPTURE_SAMPLE_RATE)?;
        std::fs::write(&path, wav)?;
        println!("\nSaved {} samples to {}", samples.len(), path.display());
    }

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let output = AudioOutput::new()?;
    let cancel = CancellationToken::new();
    let scheduler = PlaybackScheduler::spawn(SystemClock::new(), output, cancel.clone());

    let frequency = 440.0_f32;
    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..PLAYBACK_SAMPLE_RATE * 2)
        .map(|i| {
            let t = i as f32 / PLAYBACK_SAMPLE_RATE as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3
        })
        .collect();

    println!("Playing {} samples at {PLAYBACK_SAMPLE_RATE} Hz...", samples.len());

    // Two chunks back to back should sound as one continuous tone
    let half = samples.len() / 2;
    scheduler.enqueue(AudioChunk::new(samples[..half].to_vec(), PLAYBACK_SAMPLE_RATE));
    scheduler.enqueue(AudioChunk::new(samples[half..].to_vec(), PLAYBACK_SAMPLE_RATE));

    tokio::time::sleep(Duration::from_millis(2300)).await;
    cancel.cancel();

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Try: pavucontrol (to check output levels)");

    Ok(())
}
