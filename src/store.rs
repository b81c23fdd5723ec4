use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::PlaybackConfig;
use crate::error::StoreError;
use crate::model::{ImageRef, Orientation};

pub const SELECTION_FILE: &str = "selection.txt";
pub const PLAYBACK_FILE: &str = "playback.yaml";

pub type Selection = Arc<Vec<ImageRef>>;

/// File-backed preferences: the curated selection and the playback settings.
///
/// Constructed once by the binary and handed to the sources that need it.
#[derive(Debug)]
pub struct PreferencesStore {
    dir: PathBuf,
}

impl PreferencesStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Arc<Self>, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        info!(dir = %dir.display(), "preferences store opened");
        Ok(Arc::new(Self { dir }))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn selection_path(&self) -> PathBuf {
        self.dir.join(SELECTION_FILE)
    }

    pub fn playback_path(&self) -> PathBuf {
        self.dir.join(PLAYBACK_FILE)
    }

    /// A missing file is an empty selection.
    pub fn load_selection(&self) -> Result<Vec<ImageRef>, StoreError> {
        let path = self.selection_path();
        match read_optional(&path)? {
            Some(raw) => Ok(parse_selection(&raw)),
            None => Ok(Vec::new()),
        }
    }

    pub fn save_selection(&self, selection: &[ImageRef]) -> Result<(), StoreError> {
        write_replace(&self.selection_path(), &format_selection(selection))
    }

    /// `None` when no preferences were saved yet.
    pub fn load_playback(&self) -> Result<Option<PlaybackConfig>, StoreError> {
        let path = self.playback_path();
        let Some(raw) = read_optional(&path)? else {
            return Ok(None);
        };
        PlaybackConfig::from_yaml_str(&raw)
            .map(Some)
            .map_err(|err| StoreError::Config {
                path,
                message: format!("{err:#}"),
            })
    }

    pub fn save_playback(&self, config: &PlaybackConfig) -> Result<(), StoreError> {
        let path = self.playback_path();
        let yaml = config.to_yaml_string().map_err(|err| StoreError::Config {
            path: path.clone(),
            message: format!("{err:#}"),
        })?;
        write_replace(&path, &yaml)
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, StoreError> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

// Writes a sibling `.tmp` file, then renames it over `path`.
fn write_replace(path: &Path, contents: &str) -> Result<(), StoreError> {
    let tmp = path.with_extension("tmp");
    let io_err = |source: std::io::Error| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    fs::write(&tmp, contents).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)
}

/// One id per line with an optional `\t<orientation>` hint. Blank lines and
/// `#` comments are skipped; repeated ids keep their first position.
pub fn parse_selection(raw: &str) -> Vec<ImageRef> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for line in raw.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        let (id, hint) = match line.split_once('\t') {
            Some((id, hint)) => (id.trim(), Orientation::parse(hint)),
            None => (line.trim(), None),
        };
        if id.is_empty() || !seen.insert(id.to_string()) {
            continue;
        }
        let image = ImageRef::new(id);
        out.push(match hint {
            Some(orientation) => image.with_orientation(orientation),
            None => image,
        });
    }
    out
}

pub fn format_selection(selection: &[ImageRef]) -> String {
    let mut out = String::new();
    for image in selection {
        out.push_str(image.id());
        if image.orientation().is_known() {
            out.push('\t');
            out.push_str(image.orientation().as_str());
        }
        out.push('\n');
    }
    out
}

fn dedup(images: impl IntoIterator<Item = ImageRef>) -> Vec<ImageRef> {
    let mut seen = HashSet::new();
    images
        .into_iter()
        .filter(|image| !image.id().trim().is_empty() && seen.insert(image.id().to_string()))
        .collect()
}

/// Publishes the curated selection. The core only ever reads snapshots.
#[derive(Debug)]
pub struct SelectionSource {
    store: Arc<PreferencesStore>,
    tx: watch::Sender<Selection>,
    write_lock: Mutex<()>,
}

impl SelectionSource {
    pub fn new(store: Arc<PreferencesStore>) -> Result<Arc<Self>, StoreError> {
        let initial = store.load_selection()?;
        info!(images = initial.len(), "selection loaded");
        let (tx, _rx) = watch::channel(Arc::new(initial));
        Ok(Arc::new(Self {
            store,
            tx,
            write_lock: Mutex::new(()),
        }))
    }

    pub fn subscribe(&self) -> watch::Receiver<Selection> {
        self.tx.subscribe()
    }

    /// Freshest snapshot.
    pub fn snapshot(&self) -> Selection {
        self.tx.borrow().clone()
    }

    /// Replaces the selection. Duplicates are dropped keeping the first.
    pub fn set(&self, images: impl IntoIterator<Item = ImageRef>) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let next = dedup(images);
        self.store.save_selection(&next)?;
        self.publish(next);
        Ok(())
    }

    /// Adds images at the end; ids already selected are ignored.
    pub fn append(&self, images: impl IntoIterator<Item = ImageRef>) -> Result<usize, StoreError> {
        let _guard = self.write_lock.lock();
        let current = self.snapshot();
        let before = current.len();
        let next = dedup(current.iter().cloned().chain(images));
        let added = next.len() - before;
        if added > 0 {
            self.store.save_selection(&next)?;
            self.publish(next);
        }
        Ok(added)
    }

    /// Re-reads the backing file. Returns whether subscribers saw a change.
    pub fn reload(&self) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock();
        let next = self.store.load_selection()?;
        Ok(self.publish(next))
    }

    fn publish(&self, next: Vec<ImageRef>) -> bool {
        let len = next.len();
        let changed = self.tx.send_if_modified(|current| {
            if current.as_slice() == next.as_slice() {
                false
            } else {
                *current = Arc::new(next);
                true
            }
        });
        if changed {
            debug!(images = len, "selection published");
        }
        changed
    }
}

/// Publishes typed playback settings, decoded once at this boundary.
#[derive(Debug)]
pub struct ConfigSource {
    store: Arc<PreferencesStore>,
    tx: watch::Sender<PlaybackConfig>,
    write_lock: Mutex<()>,
}

impl ConfigSource {
    /// Falls back to defaults when nothing is saved yet or the saved file is invalid.
    pub fn new(store: Arc<PreferencesStore>) -> Result<Arc<Self>, StoreError> {
        let initial = match store.load_playback() {
            Ok(Some(config)) => config,
            Ok(None) => {
                info!("no playback preferences saved; using defaults");
                PlaybackConfig::default()
            }
            Err(err @ StoreError::Config { .. }) => {
                warn!(error = %err, "ignoring invalid playback preferences; using defaults");
                PlaybackConfig::default()
            }
            Err(err) => return Err(err),
        };
        let (tx, _rx) = watch::channel(initial);
        Ok(Arc::new(Self {
            store,
            tx,
            write_lock: Mutex::new(()),
        }))
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackConfig> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> PlaybackConfig {
        self.tx.borrow().clone()
    }

    /// Applies `change` to the current settings, validates, persists and publishes.
    pub fn update<F>(&self, change: F) -> Result<PlaybackConfig, StoreError>
    where
        F: FnOnce(PlaybackConfig) -> PlaybackConfig,
    {
        let _guard = self.write_lock.lock();
        let next = change(self.current())
            .validated()
            .map_err(|err| StoreError::Config {
                path: self.store.playback_path(),
                message: format!("{err:#}"),
            })?;
        self.store.save_playback(&next)?;
        self.publish(next.clone());
        Ok(next)
    }

    /// Re-reads the backing file. A deleted file means defaults; an invalid one
    /// is reported and the previous snapshot stays.
    pub fn reload(&self) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock();
        let next = self.store.load_playback()?.unwrap_or_default();
        Ok(self.publish(next))
    }

    fn publish(&self, next: PlaybackConfig) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            debug!("playback preferences published");
        }
        changed
    }
}
