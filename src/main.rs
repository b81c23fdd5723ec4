use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use wallpaper_rotator::config::Configuration;
use wallpaper_rotator::events::{PlaybackCommand, PlaybackEvent};
use wallpaper_rotator::platform::desktop::{CommandSurface, FileAmbientDisplay};
use wallpaper_rotator::processing::decode::{FileImageSource, ImageSource};
use wallpaper_rotator::render::RenderSink;
use wallpaper_rotator::sinks::ambient::AmbientSink;
use wallpaper_rotator::sinks::wallpaper::WallpaperSink;
use wallpaper_rotator::store::{ConfigSource, PreferencesStore, SelectionSource};
use wallpaper_rotator::tasks::scheduler::PlaybackContext;
use wallpaper_rotator::tasks::{control, files, session};

#[derive(Debug, Parser)]
#[command(
    name = "wallpaper-rotator",
    version,
    about = "Rotates a curated image selection across the wallpaper and an ambient display"
)]
struct Args {
    /// Path to YAML config
    #[arg(short, long, value_name = "FILE", default_value = "config.yaml")]
    config: PathBuf,
    /// Send one command (start, stop, next, prev, toggle) to a running daemon and exit
    #[arg(long, value_name = "COMMAND")]
    send: Option<PlaybackCommand>,
    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive(
            format!("wallpaper_rotator={level}")
                .parse()
                .context("invalid log directive")?,
        );
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let Args {
        config,
        send,
        verbose,
    } = Args::parse();
    init_tracing(verbose)?;

    let cfg = Configuration::from_yaml_file(&config)
        .with_context(|| format!("failed to load configuration from {}", config.display()))?
        .validated()
        .context("invalid configuration values")?;

    if let Some(command) = send {
        control::send_command(&cfg.control_socket_path, command).await?;
        tracing::info!(%command, "command delivered");
        return Ok(());
    }
    tracing::info!("Loaded configuration from {}:\n{:#?}", config.display(), cfg);

    let store = PreferencesStore::open(&cfg.preferences_dir)
        .context("failed to open preferences store")?;
    let selection = SelectionSource::new(Arc::clone(&store)).context("failed to load selection")?;
    let playback = ConfigSource::new(Arc::clone(&store)).context("failed to load playback preferences")?;

    let decoder: Arc<dyn ImageSource> = Arc::new(FileImageSource);
    let surface = CommandSurface::new(&cfg.output_dir, &cfg.wallpaper)
        .context("failed to prepare wallpaper surface")?;
    let mut sinks: Vec<Arc<dyn RenderSink>> = vec![Arc::new(WallpaperSink::new(
        Arc::clone(&decoder),
        Arc::new(surface),
    ))];
    if cfg.ambient.enabled {
        let display = FileAmbientDisplay::new(&cfg.output_dir)
            .context("failed to prepare ambient display")?;
        sinks.push(Arc::new(AmbientSink::attach(
            Arc::clone(&decoder),
            Arc::new(display),
            cfg.ambient.screen_size,
            cfg.ambient.use_24_hour_clock,
        )));
    }

    let ctx = PlaybackContext::new(selection.subscribe(), playback.subscribe(), sinks);
    let mut events = ctx.subscribe_events();
    let (commands, session) = session::channel(ctx);
    let mut status = session.status();

    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    // SIGUSR1 plays the role of the notification's play/pause action
    #[cfg(unix)]
    {
        let cancel = cancel.clone();
        let commands = commands.clone();
        tokio::spawn(async move {
            match signal(SignalKind::user_defined1()) {
                Ok(mut sigusr1) => loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        received = sigusr1.recv() => {
                            if received.is_none() {
                                break;
                            }
                            tracing::info!("SIGUSR1 received; toggling playback");
                            if let Err(err) = commands.send(PlaybackCommand::Toggle).await {
                                tracing::warn!("failed to forward toggle request: {err:#}");
                                break;
                            }
                        }
                    }
                },
                Err(err) => tracing::warn!("failed to register SIGUSR1 handler: {err}"),
            }
        });
    }

    // Host-facing status lines
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = status.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let current = *status.borrow_and_update();
                        tracing::info!(
                            running = current.running,
                            runs = current.runs_started,
                            last_stop = ?current.last_stop,
                            "session status"
                        );
                    }
                    event = events.recv() => match event {
                        Ok(PlaybackEvent::Applied { image, origin }) => {
                            tracing::info!(image = %image, ?origin, "now showing");
                        }
                        Ok(PlaybackEvent::SinkFailed { sink, image, error }) => {
                            tracing::warn!(%sink, image = %image, %error, "could not apply image");
                        }
                        Ok(other) => tracing::debug!(event = ?other, "playback event"),
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::debug!(skipped, "status reporter lagged");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        });
    }

    let mut tasks = JoinSet::new();

    // Preferences watcher
    tasks.spawn({
        let dir = store.dir().to_path_buf();
        let selection = Arc::clone(&selection);
        let playback = Arc::clone(&playback);
        let cancel = cancel.clone();
        async move {
            files::run(dir, selection, playback, cancel)
                .await
                .context("preferences watcher failed")
        }
    });

    // Playback session
    tasks.spawn({
        let cancel = cancel.clone();
        async move { session.run(cancel).await.context("playback session failed") }
    });

    // Control socket
    tasks.spawn({
        let socket = cfg.control_socket_path.clone();
        let commands = commands.clone();
        let cancel = cancel.clone();
        async move {
            control::run(socket, commands, cancel)
                .await
                .context("control socket failed")
        }
    });

    if cfg.autostart {
        tracing::info!("autostart enabled; starting playback");
        commands.start().await?;
    }
    drop(commands);

    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!("task error: {e:?}");
                cancel.cancel();
            }
            Err(e) => tracing::error!("join error: {e}"),
        }
    }

    Ok(())
}
