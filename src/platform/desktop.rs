use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use image::{ImageFormat, RgbaImage};
use tracing::{debug, info};

use crate::config::{Size, WallpaperSettings};
use crate::sinks::ambient::{AmbientDisplay, ClockText};
use crate::sinks::wallpaper::{SurfaceTarget, WallpaperSurface};

const PATH_PLACEHOLDER: &str = "@PATH@";

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

pub type CommandRunner = Arc<dyn Fn(&str) -> Result<CommandOutput> + Send + Sync>;

/// Wallpaper surface backed by PNG files plus optional desktop commands.
///
/// Each target's bitmap lands in `<output-dir>/wallpaper-<target>.png`; the
/// configured command for that target then runs through `sh -c` with
/// `@PATH@` replaced by the file path (for example
/// `gsettings set org.gnome.desktop.background picture-uri file://@PATH@`).
pub struct CommandSurface {
    output_dir: PathBuf,
    size: Option<Size>,
    system_command: Option<String>,
    lock_command: Option<String>,
    runner: CommandRunner,
}

impl fmt::Debug for CommandSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSurface")
            .field("output_dir", &self.output_dir)
            .field("size", &self.size)
            .field("system_command", &self.system_command)
            .field("lock_command", &self.lock_command)
            .finish()
    }
}

impl CommandSurface {
    pub fn new(output_dir: impl Into<PathBuf>, settings: &WallpaperSettings) -> Result<Self> {
        Self::with_runner(output_dir, settings, default_runner())
    }

    pub fn with_runner(
        output_dir: impl Into<PathBuf>,
        settings: &WallpaperSettings,
        runner: CommandRunner,
    ) -> Result<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir).with_context(|| {
            format!("failed to create output directory {}", output_dir.display())
        })?;
        Ok(Self {
            output_dir,
            size: settings.target_size,
            system_command: settings.system_command.clone(),
            lock_command: settings.lock_command.clone(),
            runner,
        })
    }

    pub fn bitmap_path(&self, target: SurfaceTarget) -> PathBuf {
        self.output_dir.join(format!("wallpaper-{target}.png"))
    }

    fn command_for(&self, target: SurfaceTarget) -> Option<&str> {
        match target {
            SurfaceTarget::System => self.system_command.as_deref(),
            SurfaceTarget::Lock => self.lock_command.as_deref(),
        }
    }
}

impl WallpaperSurface for CommandSurface {
    fn desired_size(&self) -> Option<Size> {
        self.size
    }

    fn write(&self, bitmap: &RgbaImage, target: SurfaceTarget) -> Result<()> {
        let path = self.bitmap_path(target);
        save_png(bitmap, &path)?;
        debug!(target = %target, path = %path.display(), "wallpaper bitmap saved");

        let Some(template) = self.command_for(target) else {
            return Ok(());
        };
        let command = template.replace(PATH_PLACEHOLDER, &path.to_string_lossy());
        let output = (self.runner)(&command)?;
        if !output.status.success() {
            bail!(
                "command exited with status {}: {command}{}",
                output.status.code().unwrap_or(-1),
                stderr_suffix(&output.stderr)
            );
        }
        info!(target = %target, command = %command, "wallpaper command applied");
        Ok(())
    }
}

/// Ambient display that mirrors its state into files for a kiosk viewer.
#[derive(Debug)]
pub struct FileAmbientDisplay {
    frame_path: PathBuf,
    clock_path: PathBuf,
}

impl FileAmbientDisplay {
    pub fn new(output_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = output_dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output directory {}", dir.display()))?;
        Ok(Self {
            frame_path: dir.join("ambient.png"),
            clock_path: dir.join("ambient-clock.txt"),
        })
    }

    pub fn frame_path(&self) -> &Path {
        &self.frame_path
    }

    pub fn clock_path(&self) -> &Path {
        &self.clock_path
    }
}

impl AmbientDisplay for FileAmbientDisplay {
    fn show_frame(&self, frame: &RgbaImage) -> Result<()> {
        save_png(frame, &self.frame_path)
    }

    fn show_clock(&self, clock: &ClockText) -> Result<()> {
        fs::write(&self.clock_path, format!("{}\n{}\n", clock.time, clock.date))
            .with_context(|| format!("failed to write {}", self.clock_path.display()))
    }
}

fn save_png(bitmap: &RgbaImage, path: &Path) -> Result<()> {
    let tmp = path.with_extension("png.tmp");
    bitmap
        .save_with_format(&tmp, ImageFormat::Png)
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("failed to replace {}", path.display()))
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(" ({trimmed})")
    }
}

fn default_runner() -> CommandRunner {
    Arc::new(run_shell)
}

fn run_shell(command: &str) -> Result<CommandOutput> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .output()
        .with_context(|| format!("failed to spawn shell for command: {command}"))?;

    Ok(CommandOutput {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::os::unix::process::ExitStatusExt;
    use std::sync::Mutex;

    fn status(code: i32) -> ExitStatus {
        ExitStatus::from_raw((code & 0xff) << 8)
    }

    fn recording_runner(code: i32) -> (CommandRunner, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let runner: CommandRunner = Arc::new(move |command: &str| -> Result<CommandOutput> {
            log.lock().unwrap().push(command.to_string());
            Ok(CommandOutput {
                status: status(code),
                stdout: String::new(),
                stderr: if code == 0 { String::new() } else { "denied".into() },
            })
        });
        (runner, seen)
    }

    fn settings() -> WallpaperSettings {
        WallpaperSettings {
            target_size: Some(Size::new(4, 6)),
            system_command: Some("set-bg @PATH@".into()),
            lock_command: None,
        }
    }

    #[test]
    fn writes_png_and_substitutes_path() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, seen) = recording_runner(0);
        let surface = CommandSurface::with_runner(dir.path(), &settings(), runner).unwrap();
        let bitmap = RgbaImage::new(4, 6);

        surface.write(&bitmap, SurfaceTarget::System).unwrap();
        surface.write(&bitmap, SurfaceTarget::Lock).unwrap();

        let system = surface.bitmap_path(SurfaceTarget::System);
        assert!(system.ends_with("wallpaper-system.png"));
        assert_eq!(image::open(&system).unwrap().to_rgba8().dimensions(), (4, 6));
        assert!(surface.bitmap_path(SurfaceTarget::Lock).exists());
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            [format!("set-bg {}", system.display())]
        );
        assert_eq!(surface.desired_size(), Some(Size::new(4, 6)));
    }

    #[test]
    fn non_zero_exit_is_a_write_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, _) = recording_runner(1);
        let surface = CommandSurface::with_runner(dir.path(), &settings(), runner).unwrap();
        let err = surface
            .write(&RgbaImage::new(4, 6), SurfaceTarget::System)
            .unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("status 1"), "{message}");
        assert!(message.contains("denied"), "{message}");
    }

    #[test]
    fn ambient_files_are_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let display = FileAmbientDisplay::new(dir.path()).unwrap();
        display.show_frame(&RgbaImage::new(8, 4)).unwrap();
        display
            .show_clock(&ClockText {
                time: "07:30".into(),
                date: "Monday, June 2".into(),
            })
            .unwrap();
        assert!(display.frame_path().exists());
        assert_eq!(
            fs::read_to_string(display.clock_path()).unwrap(),
            "07:30\nMonday, June 2\n"
        );
    }

    #[test]
    fn runs_through_the_shell() {
        let output = run_shell("printf hello; exit 3").unwrap();
        assert_eq!(output.stdout, "hello");
        assert_eq!(output.status.code(), Some(3));
    }

    #[test]
    fn missing_runner_error_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let runner: CommandRunner =
            Arc::new(|_: &str| -> Result<CommandOutput> { Err(anyhow!("no shell")) });
        let surface = CommandSurface::with_runner(dir.path(), &settings(), runner).unwrap();
        assert!(surface
            .write(&RgbaImage::new(4, 6), SurfaceTarget::System)
            .is_err());
    }
}
