use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use notify::{Event, EventKind, RecursiveMode, Watcher, recommended_watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::store::{ConfigSource, PLAYBACK_FILE, SELECTION_FILE, SelectionSource};

/// Which preference files an event touched.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Touched {
    pub selection: bool,
    pub playback: bool,
}

pub fn touched(event: &Event) -> Touched {
    let relevant = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) | EventKind::Any
    );
    let mut out = Touched::default();
    if !relevant {
        return out;
    }
    for path in &event.paths {
        match path.file_name().and_then(OsStr::to_str) {
            Some(SELECTION_FILE) => out.selection = true,
            Some(PLAYBACK_FILE) => out.playback = true,
            _ => {}
        }
    }
    out
}

/// Watches the preferences directory and re-publishes whichever source's
/// backing file changed.
#[instrument(skip(selection, config, cancel), fields(dir = %dir.display()))]
pub async fn run(
    dir: PathBuf,
    selection: Arc<SelectionSource>,
    config: Arc<ConfigSource>,
    cancel: CancellationToken,
) -> Result<()> {
    // Bridge notify callback -> async channel
    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Result<Event>>(128);
    let mut watcher = recommended_watcher(move |res| {
        let _ = watch_tx.blocking_send(res);
    })?;
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    info!(watching = %display_abs(&dir), "preferences watcher initialized");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("cancel received; exiting preferences watcher");
                break;
            }
            Some(res) = watch_rx.recv() => match res {
                Ok(event) => {
                    debug!(kind = ?event.kind, paths = ?event.paths, "notify event");
                    let hit = touched(&event);
                    if hit.selection {
                        match selection.reload() {
                            Ok(true) => info!(images = selection.snapshot().len(), "selection reloaded"),
                            Ok(false) => debug!("selection unchanged"),
                            Err(err) => warn!(error = %err, "selection reload failed; keeping previous"),
                        }
                    }
                    if hit.playback {
                        match config.reload() {
                            Ok(true) => info!("playback preferences reloaded"),
                            Ok(false) => debug!("playback preferences unchanged"),
                            Err(err) => warn!(error = %err, "playback reload failed; keeping previous"),
                        }
                    }
                }
                Err(err) => error!("watch error: {err}"),
            }
        }
    }
    Ok(())
}

fn display_abs(dir: &Path) -> String {
    dir.canonicalize()
        .unwrap_or_else(|_| dir.to_path_buf())
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind, RenameMode};

    #[test]
    fn classifies_preference_files() {
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To)))
            .add_path(PathBuf::from("/prefs/selection.tmp"))
            .add_path(PathBuf::from("/prefs/selection.txt"));
        assert_eq!(
            touched(&event),
            Touched {
                selection: true,
                playback: false
            }
        );

        let event = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/prefs/playback.yaml"));
        assert!(touched(&event).playback);
    }

    #[test]
    fn ignores_access_and_unrelated_files() {
        let event = Event::new(EventKind::Access(AccessKind::Read))
            .add_path(PathBuf::from("/prefs/selection.txt"));
        assert_eq!(touched(&event), Touched::default());

        let event = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/prefs/notes.md"));
        assert_eq!(touched(&event), Touched::default());
    }
}
