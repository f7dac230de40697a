use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use voxchat::chat::{connect_http, connect_socket};
use voxchat::recognition::{DeepgramBackend, MicCapture, audio_channel};
use voxchat::speech::{CpalSink, PlaybackQueue, SpeechSynthesizer, SynthesisClient};
use voxchat::{
    ChatMode, Config, ListeningState, PlaybackHandle, RecognitionSession, SessionEvent,
    VoiceSession,
};

/// voxchat - talk to a chat backend with your voice
#[derive(Parser)]
#[command(name = "voxchat", version, about)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "VOXCHAT_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Synthesize and play a line of text (checks speech configuration)
    Say {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,voxchat=info",
        1 => "info,voxchat=debug",
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
    let config = Config::load(cli.config.as_deref())?;
    config.validate()?;
    tracing::debug!(?config, "configuration loaded");

    if let Some(Command::Say { text }) = cli.command {
        return say(&config, &text).await;
    }

    // Speech pipeline (optional: disabled by config or missing key/device)
    let playback = build_playback(&config);

    // Microphone -> live recognition backend
    let (audio_tx, audio_rx) = audio_channel();
    let backend = DeepgramBackend::new(config.recognition.clone(), audio_rx)?;
    let recognition = RecognitionSession::new(Box::new(backend));

    // cpal streams aren't Send; the capture stays on this task
    let mut capture = MicCapture::new(audio_tx)?;
    capture.start()?;

    // Chat backend
    let transport = match config.chat.mode {
        ChatMode::Http => connect_http(config.chat.http_url.clone()),
        ChatMode::Socket => connect_socket(config.chat.socket_url.clone()).await?,
    };

    let (session, handle, mut events) = VoiceSession::new(
        recognition,
        transport,
        config.session.silence_timeout(),
        playback,
    );
    let session_task = tokio::spawn(session.run());

    // Rendering surface: print state changes as they happen
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::ListeningChanged(state) => match state {
                    ListeningState::Idle => println!("-- idle"),
                    ListeningState::Listening => println!("-- listening"),
                    ListeningState::Restarting => {}
                },
                SessionEvent::TranscriptChanged(text) => {
                    if !text.is_empty() {
                        println!("   ... {text}");
                    }
                }
                SessionEvent::MessageAppended(message)
                | SessionEvent::MessageUpdated(message) => {
                    let who = match message.sender {
                        voxchat::Sender::User => "you",
                        voxchat::Sender::Assistant => "assistant",
                    };
                    println!("[{who}] {}", message.text);
                }
                SessionEvent::RecognitionError(message) => {
                    eprintln!("!! {message}");
                }
            }
        }
    });

    println!("voxchat ready: Enter toggles listening, /send submits now, /quit exits");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line?.as_deref() {
                    Some("") => handle.toggle_listening().await?,
                    Some("/send") => handle.submit_now().await?,
                    Some("/quit") | None => break,
                    Some(other) => {
                        println!("unrecognized input {other:?}; Enter toggles, /send submits, /quit exits");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    capture.stop();
    handle.shutdown().await.ok();
    session_task.await.ok();
    printer.abort();

    Ok(())
}

/// Build the synthesis + playback pipeline, or disable speech with a warning
fn build_playback(config: &Config) -> Option<PlaybackHandle> {
    if !config.speech.enabled {
        tracing::info!("speech output disabled by configuration");
        return None;
    }

    let synthesizer = match SpeechSynthesizer::new(&config.speech) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "speech output disabled");
            return None;
        }
    };

    let sink = match CpalSink::new() {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "speech output disabled");
            return None;
        }
    };

    let (queue, handle) = PlaybackQueue::new(Arc::new(synthesizer), Arc::new(sink));
    let _worker = queue.spawn();
    Some(handle)
}

/// One-shot synthesis check
async fn say(config: &Config, text: &str) -> anyhow::Result<()> {
    use voxchat::AudioClip;
    use voxchat::AudioSink;

    let synthesizer = SpeechSynthesizer::new(&config.speech)?;
    let sink = CpalSink::new()?;

    tracing::info!(text, "synthesizing");
    let audio = synthesizer.synthesize(text).await?;
    let clip = AudioClip {
        text: text.to_string(),
        audio,
    };
    sink.play(&clip).await?;

    Ok(())
}
