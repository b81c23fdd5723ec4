use std::fmt;

use crate::config::PlaybackConfig;
use crate::error::SinkError;
use crate::model::{ImageRef, Orientation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkKind {
    Wallpaper,
    Ambient,
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Wallpaper => "wallpaper",
            Self::Ambient => "ambient",
        })
    }
}

/// What a sink learned while rendering one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderOutcome {
    /// Orientation of the decoded pixels, `Unknown` when decoding failed.
    pub orientation: Orientation,
    /// Decoding failed and the sink substituted a placeholder or skipped the frame.
    pub decode_failed: bool,
}

impl RenderOutcome {
    pub fn decoded(orientation: Orientation) -> Self {
        Self {
            orientation,
            decode_failed: false,
        }
    }

    pub fn decode_failed() -> Self {
        Self {
            orientation: Orientation::Unknown,
            decode_failed: true,
        }
    }
}

/// Consumer of one chosen image.
///
/// Implementations block (decode, resize, file and process I/O), so callers run
/// them on the blocking pool. Decode failures are absorbed inside the sink; only
/// failures to produce the visible effect come back as [`SinkError`].
pub trait RenderSink: Send + Sync {
    fn kind(&self) -> SinkKind;

    fn render(&self, image: &ImageRef, config: &PlaybackConfig)
    -> Result<RenderOutcome, SinkError>;
}
