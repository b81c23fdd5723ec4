use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Local, TimeZone};
use image::RgbaImage;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::{DisplayMode, PlaybackConfig, Size};
use crate::error::SinkError;
use crate::model::{ImageRef, Orientation};
use crate::processing::decode::ImageSource;
use crate::processing::fit::{crop_to_fill, fit_center, rotate_quarter};
use crate::render::{RenderOutcome, RenderSink, SinkKind};
use crate::tasks::periodic::PeriodicTask;

pub const CLOCK_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockText {
    pub time: String,
    pub date: String,
}

impl ClockText {
    pub fn format<Tz: TimeZone>(now: &DateTime<Tz>, use_24_hour: bool) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        let time = if use_24_hour {
            now.format("%H:%M").to_string()
        } else {
            now.format("%-I:%M %p").to_string()
        };
        Self {
            time,
            date: now.format("%A, %B %-d").to_string(),
        }
    }
}

/// An always-on display: one full-screen frame plus a clock overlay.
pub trait AmbientDisplay: Send + Sync {
    fn show_frame(&self, frame: &RgbaImage) -> Result<()>;

    fn show_clock(&self, clock: &ClockText) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmbientLayout {
    CropToFill,
    FitCenter,
    /// Quarter turn, then crop-to-fill.
    RotateThenCrop,
}

/// Unknown orientation takes the landscape path.
pub fn choose_layout(orientation: Orientation, mode: DisplayMode) -> AmbientLayout {
    match (orientation, mode) {
        (Orientation::Portrait, DisplayMode::FitCenter) => AmbientLayout::FitCenter,
        (Orientation::Portrait, DisplayMode::Smart) => AmbientLayout::RotateThenCrop,
        (Orientation::Portrait, DisplayMode::FillScreen)
        | (Orientation::Landscape | Orientation::Unknown, _) => AmbientLayout::CropToFill,
    }
}

/// Ambient renderer. Owns the clock overlay for as long as it is attached.
pub struct AmbientSink {
    source: Arc<dyn ImageSource>,
    display: Arc<dyn AmbientDisplay>,
    screen: Size,
    clock: Mutex<Option<PeriodicTask>>,
}

impl AmbientSink {
    /// Starts the clock overlay right away. Must be called inside a tokio runtime.
    pub fn attach(
        source: Arc<dyn ImageSource>,
        display: Arc<dyn AmbientDisplay>,
        screen: Size,
        use_24_hour: bool,
    ) -> Self {
        let clock_display = Arc::clone(&display);
        // displays do file or device I/O; keep it off the runtime workers
        let clock = PeriodicTask::spawn("ambient-clock", CLOCK_PERIOD, move || {
            let text = ClockText::format(&Local::now(), use_24_hour);
            let display = Arc::clone(&clock_display);
            tokio::task::spawn_blocking(move || {
                if let Err(err) = display.show_clock(&text) {
                    warn!(error = %format!("{err:#}"), "clock overlay update failed");
                }
            });
        });
        info!(screen = %screen, use_24_hour, "ambient sink attached");
        Self {
            source,
            display,
            screen,
            clock: Mutex::new(Some(clock)),
        }
    }

    pub fn screen(&self) -> Size {
        self.screen
    }

    pub fn is_attached(&self) -> bool {
        self.clock.lock().is_some()
    }

    /// Stops the clock overlay. Frames can still be rendered afterwards.
    pub fn detach(&self) {
        if let Some(clock) = self.clock.lock().take() {
            clock.stop();
            info!("ambient sink detached");
        }
    }

    pub fn show(
        &self,
        image: &ImageRef,
        mode: DisplayMode,
    ) -> Result<RenderOutcome, SinkError> {
        let pixels = match self.source.load(image) {
            Ok(pixels) => pixels,
            Err(err) => {
                warn!(image = %image, error = %err, "decode failed; skipping ambient frame");
                return Ok(RenderOutcome::decode_failed());
            }
        };
        let decoded = Orientation::from_dimensions(pixels.width(), pixels.height());
        let orientation = if image.orientation().is_known() {
            image.orientation()
        } else {
            decoded
        };

        let layout = choose_layout(orientation, mode);
        debug!(image = %image, orientation = %orientation, ?mode, ?layout, "ambient layout");
        let frame = match layout {
            AmbientLayout::CropToFill => crop_to_fill(&pixels, self.screen),
            AmbientLayout::FitCenter => fit_center(&pixels, self.screen),
            AmbientLayout::RotateThenCrop => crop_to_fill(&rotate_quarter(&pixels), self.screen),
        }
        .map_err(|err| SinkError::Render {
            sink: SinkKind::Ambient,
            message: format!("{err:#}"),
        })?;

        self.display
            .show_frame(&frame)
            .map_err(|err| SinkError::Display {
                sink: SinkKind::Ambient,
                message: format!("{err:#}"),
            })?;
        Ok(RenderOutcome::decoded(decoded))
    }
}

impl RenderSink for AmbientSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Ambient
    }

    fn render(
        &self,
        image: &ImageRef,
        config: &PlaybackConfig,
    ) -> Result<RenderOutcome, SinkError> {
        self.show(image, config.display_mode)
    }
}

impl Drop for AmbientSink {
    fn drop(&mut self) {
        self.detach();
    }
}
