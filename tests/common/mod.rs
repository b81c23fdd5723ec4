#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, watch};
use wallpaper_rotator::config::PlaybackConfig;
use wallpaper_rotator::error::SinkError;
use wallpaper_rotator::events::{ApplyOrigin, PlaybackEvent};
use wallpaper_rotator::model::{ImageRef, Orientation};
use wallpaper_rotator::render::{RenderOutcome, RenderSink, SinkKind};
use wallpaper_rotator::store::Selection;
use wallpaper_rotator::tasks::scheduler::PlaybackContext;

/// Records every image it is asked to render and reports a fixed orientation per id.
#[derive(Default)]
pub struct RecordingSink {
    applied: Mutex<Vec<String>>,
    orientations: HashMap<String, Orientation>,
}

impl RecordingSink {
    pub fn with_orientations(pairs: &[(&str, Orientation)]) -> Self {
        Self {
            applied: Mutex::new(Vec::new()),
            orientations: pairs
                .iter()
                .map(|(id, o)| (id.to_string(), *o))
                .collect(),
        }
    }

    pub fn ids(&self) -> Vec<String> {
        self.applied.lock().unwrap().clone()
    }
}

impl RenderSink for RecordingSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Wallpaper
    }

    fn render(
        &self,
        image: &ImageRef,
        _config: &PlaybackConfig,
    ) -> Result<RenderOutcome, SinkError> {
        self.applied.lock().unwrap().push(image.id().to_string());
        let orientation = self
            .orientations
            .get(image.id())
            .copied()
            .unwrap_or(Orientation::Unknown);
        Ok(RenderOutcome::decoded(orientation))
    }
}

pub struct Harness {
    pub selection: watch::Sender<Selection>,
    pub config: watch::Sender<PlaybackConfig>,
    pub sink: Arc<RecordingSink>,
    pub ctx: PlaybackContext,
}

pub fn refs(ids: &[&str]) -> Vec<ImageRef> {
    ids.iter().map(|id| ImageRef::new(*id)).collect()
}

pub fn harness(ids: &[&str], config: PlaybackConfig) -> Harness {
    harness_with_sink(ids, config, RecordingSink::default())
}

pub fn harness_with_sink(ids: &[&str], config: PlaybackConfig, sink: RecordingSink) -> Harness {
    let (selection, selection_rx) = watch::channel(Arc::new(refs(ids)));
    let (config, config_rx) = watch::channel(config);
    let sink = Arc::new(sink);
    let sinks: Vec<Arc<dyn RenderSink>> = vec![Arc::clone(&sink) as Arc<dyn RenderSink>];
    let ctx = PlaybackContext::new(selection_rx, config_rx, sinks);
    Harness {
        selection,
        config,
        sink,
        ctx,
    }
}

impl Harness {
    pub fn set_selection(&self, ids: &[&str]) {
        self.selection.send_replace(Arc::new(refs(ids)));
    }
}

/// Drains whatever is buffered and keeps the `Applied` events.
pub fn drain_applied(events: &mut broadcast::Receiver<PlaybackEvent>) -> Vec<(String, ApplyOrigin)> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let PlaybackEvent::Applied { image, origin } = event {
            out.push((image.id().to_string(), origin));
        }
    }
    out
}
