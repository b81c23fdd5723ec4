use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use image::RgbaImage;
use tracing::{debug, warn};

use crate::config::{ApplyScope, FALLBACK_WALLPAPER_SIZE, PlaybackConfig, Size};
use crate::error::SinkError;
use crate::model::{ImageRef, Orientation};
use crate::processing::decode::ImageSource;
use crate::processing::fit::{crop_to_fill, placeholder};
use crate::render::{RenderOutcome, RenderSink, SinkKind};

/// A physical wallpaper surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceTarget {
    /// Home screen.
    System,
    Lock,
}

impl SurfaceTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Lock => "lock",
        }
    }

    /// Write order for a scope: `Both` is System then Lock.
    pub fn for_scope(scope: ApplyScope) -> &'static [SurfaceTarget] {
        match scope {
            ApplyScope::Lock => &[SurfaceTarget::Lock],
            ApplyScope::System => &[SurfaceTarget::System],
            ApplyScope::Both => &[SurfaceTarget::System, SurfaceTarget::Lock],
        }
    }
}

impl fmt::Display for SurfaceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where wallpaper bitmaps end up.
pub trait WallpaperSurface: Send + Sync {
    /// Declared minimum dimensions, if the surface knows them.
    fn desired_size(&self) -> Option<Size>;

    fn write(&self, bitmap: &RgbaImage, target: SurfaceTarget) -> Result<()>;
}

/// Crop-to-fill wallpaper renderer.
pub struct WallpaperSink {
    source: Arc<dyn ImageSource>,
    surface: Arc<dyn WallpaperSurface>,
}

impl WallpaperSink {
    pub fn new(source: Arc<dyn ImageSource>, surface: Arc<dyn WallpaperSurface>) -> Self {
        Self { source, surface }
    }

    pub fn target_size(&self) -> Size {
        self.surface
            .desired_size()
            .filter(|size| !size.is_empty())
            .unwrap_or(FALLBACK_WALLPAPER_SIZE)
    }

    pub fn apply(
        &self,
        image: &ImageRef,
        target: Size,
        scope: ApplyScope,
    ) -> Result<RenderOutcome, SinkError> {
        let (bitmap, outcome) = self.prepare(image, target)?;

        let mut failures = Vec::new();
        for &surface in SurfaceTarget::for_scope(scope) {
            match self.surface.write(&bitmap, surface) {
                Ok(()) => debug!(image = %image, target = %surface, "wallpaper written"),
                Err(err) => {
                    warn!(image = %image, target = %surface, error = %format!("{err:#}"), "wallpaper write failed");
                    failures.push((surface, format!("{err:#}")));
                }
            }
        }

        if failures.is_empty() {
            Ok(outcome)
        } else {
            Err(SinkError::Write {
                sink: SinkKind::Wallpaper,
                failures,
            })
        }
    }

    fn prepare(&self, image: &ImageRef, target: Size) -> Result<(RgbaImage, RenderOutcome), SinkError> {
        match self.source.load(image) {
            Ok(pixels) => {
                let orientation = Orientation::from_dimensions(pixels.width(), pixels.height());
                let bitmap = crop_to_fill(&pixels, target).map_err(|err| SinkError::Render {
                    sink: SinkKind::Wallpaper,
                    message: format!("{err:#}"),
                })?;
                Ok((bitmap, RenderOutcome::decoded(orientation)))
            }
            Err(err) => {
                warn!(image = %image, error = %err, size = %target, "decode failed; using placeholder");
                Ok((placeholder(target), RenderOutcome::decode_failed()))
            }
        }
    }
}

impl RenderSink for WallpaperSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Wallpaper
    }

    fn render(
        &self,
        image: &ImageRef,
        config: &PlaybackConfig,
    ) -> Result<RenderOutcome, SinkError> {
        self.apply(image, self.target_size(), config.apply_scope)
    }
}
