use std::path::PathBuf;

use thiserror::Error;

use crate::render::SinkKind;
use crate::sinks::wallpaper::SurfaceTarget;

/// An image could not be turned into pixels. Always scoped to one sink call.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to read {id}: {source}")]
    Io {
        id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {id}: {source}")]
    Image {
        id: String,
        #[source]
        source: image::ImageError,
    },

    #[error("decoded image {id} has no pixels")]
    Empty { id: String },
}

/// A sink could not produce its visible effect.
#[derive(Debug, Error)]
pub enum SinkError {
    /// One or more surface writes failed (for example permission denied).
    #[error("{sink} write failed for {}", describe_targets(.failures))]
    Write {
        sink: SinkKind,
        failures: Vec<(SurfaceTarget, String)>,
    },

    #[error("{sink} could not prepare a frame: {message}")]
    Render { sink: SinkKind, message: String },

    #[error("{sink} display rejected the frame: {message}")]
    Display { sink: SinkKind, message: String },

    #[error("{sink} task aborted: {message}")]
    Aborted { sink: SinkKind, message: String },
}

fn describe_targets(failures: &[(SurfaceTarget, String)]) -> String {
    failures
        .iter()
        .map(|(target, err)| format!("{target} ({err})"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors from the preferences store backing the selection and config sources.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid playback preferences in {}: {message}", .path.display())]
    Config { path: PathBuf, message: String },
}
