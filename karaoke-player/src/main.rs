//! Karaoke Player (karaoke-player) - Headless runner
//!
//! Drives the playback core with simulated engines over a playlist file and
//! prints every event as one JSON line on stdout. Useful for exercising
//! crossfade, shuffle and failure handling without a renderer.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use karaoke_common::config::{resolve_config_path, CONFIG_ENV_VAR};
use karaoke_common::events::KaraokeEvent;
use karaoke_player::config::validate_volume;
use karaoke_player::engine::SimulatedLibrary;
use karaoke_player::playlist::Playlist;
use karaoke_player::{CrossfadeDuration, PlaybackController, TomlConfig, TrackSource};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for karaoke-player
#[derive(Parser, Debug)]
#[command(name = "karaoke-player")]
#[command(about = "Headless karaoke playback core driven by simulated engines")]
#[command(version)]
struct Args {
    /// Playlist TOML file
    #[arg(env = "KARAOKE_PLAYLIST")]
    playlist: PathBuf,

    /// Bootstrap config file (default: $KARAOKE_CONFIG, then the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Crossfade window in seconds (1-20)
    #[arg(long)]
    crossfade: Option<u32>,

    /// Cut between tracks instead of fading
    #[arg(long)]
    no_crossfade: bool,

    /// Shuffle the queue
    #[arg(long)]
    shuffle: bool,

    /// Start over when the queue is exhausted
    #[arg(long)]
    repeat: bool,

    /// Global volume (0.0-1.0)
    #[arg(long)]
    volume: Option<f32>,

    /// Keep running after the queue is exhausted
    #[arg(long)]
    keep_running: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref(), CONFIG_ENV_VAR);
    let mut config =
        TomlConfig::load(config_path.as_deref()).context("Failed to load configuration")?;
    apply_overrides(&mut config, &args)?;

    // Initialize tracing
    let default_filter = format!(
        "karaoke_player={level},karaoke_common={level}",
        level = config.logging.level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting karaoke player");
    if let Some(path) = &config_path {
        info!("Config file: {}", path.display());
    }

    let playlist = Playlist::load(&args.playlist)
        .with_context(|| format!("Failed to load playlist {}", args.playlist.display()))?;
    info!("Playlist: {} tracks", playlist.tracks.len());

    let library = SimulatedLibrary::new();
    let queue = Arc::new(playlist.into_queue(&library));
    let first = queue.entries().into_iter().next();

    let (controller, core_task) =
        PlaybackController::spawn(library.factory(), queue.clone(), &config)
            .context("Failed to start playback controller")?;

    let events = controller.subscribe();
    match first {
        Some(handle) => controller.play(handle).await?,
        None => warn!("Playlist is empty, waiting for tracks"),
    }

    tokio::select! {
        _ = print_events(events, args.keep_running) => {
            info!("Queue finished");
        }
        _ = shutdown_signal() => {}
    }

    controller.shutdown().await?;
    core_task.await.context("Playback core task failed")?;
    info!("Shutdown complete");
    Ok(())
}

fn apply_overrides(config: &mut TomlConfig, args: &Args) -> Result<()> {
    let playback = &mut config.playback;
    if let Some(seconds) = args.crossfade {
        playback.crossfade_duration =
            CrossfadeDuration::new(seconds).context("Invalid --crossfade")?;
    }
    if args.no_crossfade {
        playback.crossfade_enabled = false;
    }
    if args.shuffle {
        playback.shuffle_enabled = true;
    }
    if args.repeat {
        playback.repeat_enabled = true;
    }
    if let Some(level) = args.volume {
        playback.global_volume = validate_volume(level).context("Invalid --volume")?;
    }
    Ok(())
}

/// Print events as JSON lines until the queue runs dry
async fn print_events(
    mut events: tokio::sync::broadcast::Receiver<KaraokeEvent>,
    keep_running: bool,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                match event.to_json() {
                    Ok(line) => println!("{}", line),
                    Err(e) => warn!("Failed to serialize {}: {}", event.event_type(), e),
                }
                if matches!(event, KaraokeEvent::WaitingForNext { .. }) && !keep_running {
                    return;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Event printer lagged, {} events dropped", skipped);
            }
            Err(RecvError::Closed) => return,
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
