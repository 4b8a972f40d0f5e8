use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use beacon_talk::voice::{
    self, SAMPLE_RATE, SpeechRequest, SpeechToText, Synthesizer, TextToSpeech,
    Transcriber, VoiceActivityDetector,
};
use beacon_talk::{Activation, ApiServer, Config, TalkRuntime};

/// Beacon Talk - Hands-free voice conversations with an AI assistant
#[derive(Parser)]
#[command(name = "beacon-talk", version, about)]
struct Cli {
    /// Config file (defaults to ~/.config/omni/beacon/talk.toml)
    #[arg(short, long, env = "BEACON_TALK_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the control API and run the talk runtime (default)
    Run {
        /// Port for the control API
        #[arg(long)]
        port: Option<u16>,
        /// Start with talk mode on
        #[arg(long)]
        talk: bool,
        /// Start with wake listening on
        #[arg(long)]
        wake: bool,
    },
    /// Print voice activity for the configured microphone
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Play a test tone on the configured speaker
    TestSpeaker,
    /// Transcribe a WAV file with the configured STT provider
    Transcribe {
        /// Path to a WAV file
        path: PathBuf,
    },
    /// Speak text with the configured TTS provider
    ///
    /// A leading JSON directive line (e.g. `{"voice":"nova","speed":1.2}`)
    /// overrides voice settings, as in agent replies.
    Say {
        /// Text to speak
        text: String,
    },
    /// Show the status of a running instance
    Status {
        /// Port of the running instance
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,beacon_talk=info",
        1 => "info,beacon_talk=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!(?config, "loaded configuration");

    let command = cli.command.unwrap_or(Command::Run {
        port: None,
        talk: false,
        wake: false,
    });

    match command {
        Command::Run { port, talk, wake } => serve(config, port, talk, wake).await,
        Command::TestMic { duration } => test_mic(&config, duration).await,
        Command::TestSpeaker => test_speaker(&config).await,
        Command::Transcribe { path } => transcribe(&config, &path).await,
        Command::Say { text } => say(&config, &text).await,
        Command::Status { port } => status(port.unwrap_or(config.server.port)).await,
    }
}

/// Run the talk runtime behind the control API until ctrl-c
async fn serve(config: Config, port: Option<u16>, talk: bool, wake: bool) -> anyhow::Result<()> {
    let port = port.unwrap_or(config.server.port);
    let runtime = TalkRuntime::from_config(&config)?;

    if wake || config.wake.enabled {
        runtime.enable_wake();
    }
    if talk {
        runtime.enable(Activation::Manual);
    }

    let phrase = config.wake.phrase.as_str();
    if runtime.status().wake.enabled && !phrase.is_empty() {
        tracing::info!("beacon talk ready - say \"{phrase}\"");
    } else {
        tracing::info!(port, "beacon talk ready - POST /api/talk/on to start");
    }

    let server = ApiServer::new(runtime.clone(), port);
    server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down");
        })
        .await?;

    runtime.shutdown().await;
    Ok(())
}

/// Print per-second VAD verdicts for the microphone
async fn test_mic(config: &Config, duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let capture = voice::capture_from_config(&config.capture)?;
    let cancel = CancellationToken::new();
    let mut session = capture.open(cancel.clone()).await?;
    println!("Source: {} ({SAMPLE_RATE} Hz)", capture.name());
    println!("---");

    let mut vad = VoiceActivityDetector::default();
    let frames_per_second = voice::frames_for(Duration::from_secs(1));
    let deadline = Instant::now() + Duration::from_secs(duration);

    let mut second = 0;
    let mut seen = 0;
    let mut speech = 0;
    let mut peak = 0.0_f32;
    let mut threshold = 0.0_f32;

    while Instant::now() < deadline {
        let Ok(Some(frame)) = tokio::time::timeout(Duration::from_secs(1), session.recv()).await
        else {
            println!("(no audio received)");
            break;
        };

        let verdict = vad.note(&frame);
        seen += 1;
        if verdict.is_speech {
            speech += 1;
        }
        peak = peak.max(verdict.rms);
        threshold = verdict.threshold;

        if seen == frames_per_second {
            second += 1;
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let meter_len = (peak * 200.0).min(50.0) as usize;
            let meter = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);
            println!(
                "[{second:2}s] peak RMS: {peak:.4} | threshold: {threshold:.4} | speech frames: {speech:2} | [{meter}]"
            );
            seen = 0;
            speech = 0;
            peak = 0.0;
        }
    }

    cancel.cancel();
    session.release().await;

    println!("\n---");
    println!("If speech frames rose while you talked, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Play a 440Hz tone for 2 seconds
async fn test_speaker(config: &Config) -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let frequency = 440.0_f32;
    let samples: Vec<i16> = (0..SAMPLE_RATE * 2)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let t = i as f32 / SAMPLE_RATE as f32;
            // 30% volume
            voice::f32_to_i16((2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3)
        })
        .collect();
    let wav = voice::samples_to_wav(&samples, SAMPLE_RATE)?;

    let playback = voice::playback_from_config(&config.playback)?;
    let outcome = playback.play(wav, CancellationToken::new()).await?;
    tracing::debug!(?outcome, "test tone finished");

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}

/// Transcribe a WAV file
async fn transcribe(config: &Config, path: &std::path::Path) -> anyhow::Result<()> {
    let audio = tokio::fs::read(path).await?;
    let stt = SpeechToText::new(&config.stt)?;
    let text = stt.transcribe(audio, config.stt.language.as_deref()).await?;
    println!("{text}");
    Ok(())
}

/// Synthesize and play text, honoring a leading directive line
async fn say(config: &Config, text: &str) -> anyhow::Result<()> {
    let parsed = voice::parse_reply(text);
    if parsed.text.is_empty() {
        anyhow::bail!("nothing to say");
    }

    let mut request = SpeechRequest::from_config(&config.tts, parsed.text);
    if let Some(directive) = &parsed.directive {
        request = request.with_directive(directive);
    }

    let tts = TextToSpeech::new(&config.tts)?;
    let audio = tts.synthesize(&request).await?;
    tracing::debug!(bytes = audio.len(), "synthesized speech");

    let wav = voice::ensure_wav(audio)?;
    let playback = voice::playback_from_config(&config.playback)?;
    playback.play(wav, CancellationToken::new()).await?;

    Ok(())
}

/// Query a running instance
async fn status(port: u16) -> anyhow::Result<()> {
    let url = format!("http://127.0.0.1:{port}/api/talk/status");
    let response = reqwest::get(&url)
        .await
        .map_err(|e| anyhow::anyhow!("beacon talk not reachable on port {port}: {e}"))?;

    if !response.status().is_success() {
        anyhow::bail!("status request failed: {}", response.status());
    }

    let status: serde_json::Value = response.json().await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
