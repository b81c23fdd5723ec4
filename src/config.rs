use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONTROL_SOCKET_PATH: &str = "/run/wallpaper-rotator/control.sock";

/// Smallest surface the wallpaper sink renders when the surface does not
/// declare a preferred size.
pub const FALLBACK_WALLPAPER_SIZE: Size = Size {
    width: 1080,
    height: 1920,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "[u32; 2]")]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl From<[u32; 2]> for Size {
    fn from([width, height]: [u32; 2]) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderMode {
    /// Keep the order in which images were selected.
    #[default]
    Sequential,
    /// Fresh shuffle on every regeneration.
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApplyScope {
    #[default]
    Lock,
    System,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExifPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
    Center,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisplayMode {
    #[default]
    FillScreen,
    FitCenter,
    Smart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrientationFilter {
    #[default]
    All,
    Landscape,
    Portrait,
}

/// One immutable snapshot of the playback preferences.
///
/// Decoded once where the preferences enter the process; the scheduler only
/// ever sees this typed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct PlaybackConfig {
    /// How long each image stays up before the next tick.
    #[serde(with = "humantime_serde")]
    pub per_item: Duration,
    /// Stop the rotation once this much time has elapsed since start.
    #[serde(with = "humantime_serde")]
    pub max_duration: Option<Duration>,
    /// Reserved inactivity timeout; parsed and validated but not acted on.
    #[serde(with = "humantime_serde")]
    pub idle_stop: Option<Duration>,
    pub order: OrderMode,
    /// Wallpaper surfaces to write.
    pub apply_scope: ApplyScope,
    pub enable_exif_tap: bool,
    pub exif_position: ExifPosition,
    /// Ambient display layout for portrait images.
    pub display_mode: DisplayMode,
    pub orientation_filter: OrientationFilter,
}

impl PlaybackConfig {
    const fn default_per_item() -> Duration {
        Duration::from_secs(10)
    }

    const fn default_idle_stop() -> Duration {
        Duration::from_secs(30 * 60)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let cfg: Self = if raw.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(raw).context("failed to parse playback preferences")?
        };
        cfg.validated()
    }

    /// Zero `max-duration`/`idle-stop` mean "unset"; `per-item` must be positive.
    pub fn validated(mut self) -> Result<Self> {
        ensure!(
            !self.per_item.is_zero(),
            "per-item must be greater than zero"
        );
        self.max_duration = self.max_duration.filter(|d| !d.is_zero());
        self.idle_stop = self.idle_stop.filter(|d| !d.is_zero());
        Ok(self)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).context("failed to serialize playback preferences")
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            per_item: Self::default_per_item(),
            max_duration: None,
            idle_stop: Some(Self::default_idle_stop()),
            order: OrderMode::default(),
            apply_scope: ApplyScope::default(),
            enable_exif_tap: true,
            exif_position: ExifPosition::default(),
            display_mode: DisplayMode::default(),
            orientation_filter: OrientationFilter::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct WallpaperSettings {
    /// Declared minimum surface size; the sink falls back to 1080x1920.
    pub target_size: Option<Size>,
    /// Shell command run after the home-screen bitmap is written (`@PATH@` is substituted).
    pub system_command: Option<String>,
    /// Shell command run after the lock-screen bitmap is written (`@PATH@` is substituted).
    pub lock_command: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct AmbientSettings {
    pub enabled: bool,
    pub screen_size: Size,
    pub use_24_hour_clock: bool,
}

impl Default for AmbientSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            screen_size: Size::new(1920, 1080),
            use_24_hour_clock: true,
        }
    }
}

/// Daemon settings, read once at startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Directory holding `selection.txt` and `playback.yaml`.
    pub preferences_dir: PathBuf,
    /// Unix domain socket accepting playback commands.
    pub control_socket_path: PathBuf,
    /// Where rendered bitmaps are written before being handed to the desktop.
    pub output_dir: PathBuf,
    pub wallpaper: WallpaperSettings,
    pub ambient: AmbientSettings,
    /// Issue a start command as soon as the daemon is up.
    pub autostart: bool,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    pub fn validated(self) -> Result<Self> {
        ensure!(
            !self.preferences_dir.as_os_str().is_empty(),
            "preferences-dir must not be empty"
        );
        ensure!(
            !self.output_dir.as_os_str().is_empty(),
            "output-dir must not be empty"
        );
        ensure!(
            self.control_socket_path.file_name().is_some(),
            "control-socket-path must include a socket file name"
        );
        if let Some(size) = self.wallpaper.target_size {
            ensure!(!size.is_empty(), "wallpaper.target-size must be positive");
        }
        ensure!(
            !self.ambient.screen_size.is_empty(),
            "ambient.screen-size must be positive"
        );
        for (label, cmd) in [
            ("wallpaper.system-command", &self.wallpaper.system_command),
            ("wallpaper.lock-command", &self.wallpaper.lock_command),
        ] {
            if let Some(cmd) = cmd {
                ensure!(!cmd.trim().is_empty(), "{label} must not be blank");
            }
        }
        Ok(self)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            preferences_dir: PathBuf::from("preferences"),
            control_socket_path: PathBuf::from(DEFAULT_CONTROL_SOCKET_PATH),
            output_dir: PathBuf::from("output"),
            wallpaper: WallpaperSettings::default(),
            ambient: AmbientSettings::default(),
            autostart: false,
        }
    }
}
