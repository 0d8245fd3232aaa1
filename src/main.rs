use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use voice_session::audio::{AudioBackend, AudioBackendConfig, AudioLevelMonitor, WavFileBackend, DEFAULT_CADENCE};
use voice_session::{
    create_router, AppState, Config, LineRecognizer, LogPresenter, PacedSynthesizer, SessionConfig,
    SessionDeps, SessionSnapshot, VoiceSessionManager, VoiceState, WavFilePlayer, WebSocketConnector,
};

/// Terminal client for the voice assistant backend
///
/// Each line typed on stdin is sent as a final transcript. Replies are
/// "spoken" to the log, and every change of the session state is printed.
#[derive(Parser, Debug)]
#[command(name = "voice-session", version)]
struct Args {
    /// Config file (without extension)
    #[arg(long, default_value = "config/voice-session")]
    config: String,

    /// Override the backend WebSocket endpoint
    #[arg(long)]
    url: Option<String>,

    /// Resume listening after every reply
    #[arg(long)]
    continuous: bool,

    /// Drop final transcripts below this confidence
    #[arg(long)]
    min_confidence: Option<f32>,

    /// WAV file to replay as the microphone level source
    #[arg(long)]
    level_wav: Option<PathBuf>,

    /// Directory that remote audio references resolve against
    #[arg(long, default_value = ".")]
    audio_dir: PathBuf,

    /// Serve the local control API
    #[arg(long)]
    serve: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let mut cfg = Config::load(&args.config)?;

    if let Some(url) = args.url {
        cfg.transport.url = url;
    }
    if args.continuous {
        cfg.voice.continuous = true;
    }
    if let Some(min_confidence) = args.min_confidence {
        cfg.voice.min_confidence = min_confidence;
    }
    if args.serve {
        cfg.service.http.enabled = true;
    }

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Backend: {}", cfg.transport.url);
    info!(
        "Confidence gate {:.2}, response timeout {:?}, continuous {}",
        cfg.voice.min_confidence,
        cfg.voice.response_timeout(),
        cfg.voice.continuous
    );

    let connector = WebSocketConnector::new(&cfg.transport.url, cfg.transport.auth_token.as_deref())
        .context("Invalid backend URL")?;

    let level_backend: Option<Box<dyn AudioBackend>> = match &args.level_wav {
        Some(path) => {
            let config = AudioBackendConfig {
                loop_playback: true,
                ..AudioBackendConfig::default()
            };
            match WavFileBackend::open(path, config) {
                Ok(backend) => Some(Box::new(backend)),
                Err(e) => {
                    warn!("Level source {} unusable: {:#}", path.display(), e);
                    None
                }
            }
        }
        None => None,
    };
    let mut level = AudioLevelMonitor::start(level_backend, DEFAULT_CADENCE).await;

    let recognizer = LineRecognizer::new(BufReader::new(tokio::io::stdin()));
    let mut input_closed = recognizer.input_closed();

    let deps = SessionDeps {
        recognizer: Box::new(recognizer),
        connector: Arc::new(connector),
        synthesizer: Arc::new(PacedSynthesizer::default()),
        player: Arc::new(WavFilePlayer::new(&args.audio_dir)),
        level: level.subscribe(),
        presenter: Arc::new(LogPresenter),
    };

    let manager = VoiceSessionManager::new(SessionConfig::from(&cfg), deps);
    let (handle, manager_task) = manager.spawn();

    let mut server = None;
    if cfg.service.http.enabled {
        let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        info!("Control API listening on http://{}", addr);

        let router = create_router(AppState::new(handle.clone()));
        server = Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                warn!("Control API stopped: {}", e);
            }
        }));
    }

    println!("Type a command and press enter. Ctrl-D or Ctrl-C to quit.");
    handle.start()?;

    let mut updates = handle.subscribe();
    let mut last = handle.snapshot();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            _ = input_closed.wait_for(|closed| *closed) => {
                info!("Input closed");
                break;
            }
            snapshot = updates.changed() => {
                let Some(snapshot) = snapshot else { break };
                print_changes(&last, &snapshot);

                // No wake word here: an idle session means "listen for the next line"
                if snapshot.status == VoiceState::Idle && last.status != VoiceState::Idle {
                    handle.start()?;
                }
                last = snapshot;
            }
        }
    }

    let _ = handle.end();

    // The loop exits once every control handle is gone, including the API's
    if let Some(server) = server {
        server.abort();
        let _ = server.await;
    }
    drop(handle);
    manager_task.await.context("Voice session loop panicked")?;
    level.stop();

    if let Some(summary) = &updates.snapshot().last_session {
        info!(
            "Last session {}: {} commands, {} lost",
            summary.id,
            summary.commands.len(),
            summary.lost_commands
        );
    }

    Ok(())
}

fn print_changes(before: &SessionSnapshot, after: &SessionSnapshot) {
    if before.connection != after.connection {
        println!("[link] {:?}", after.connection);
    }
    if before.status != after.status {
        match &after.error {
            Some(reason) => println!("[state] {:?}: {:?}", after.status, reason),
            None => println!("[state] {:?}", after.status),
        }
    }
    if before.transcript != after.transcript {
        if let Some(t) = &after.transcript {
            println!("[heard] {} ({:.2})", t.text, t.confidence);
        }
    }
    if before.last_reply != after.last_reply {
        if let Some(reply) = &after.last_reply {
            println!("[reply] {}", reply.text);
        }
    }
    if before.lost_commands != after.lost_commands {
        println!("[lost] {} commands unanswered", after.lost_commands);
    }
}
