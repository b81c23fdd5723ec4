use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::PlaybackConfig;
use crate::error::SinkError;
use crate::events::{ApplyOrigin, PlaybackEvent, SchedulerState, StopReason};
use crate::model::{ImageRef, OrientationCache, filtered_view};
use crate::playlist::{OrderGenerator, PlaylistState, Refresh};
use crate::render::RenderSink;
use crate::store::Selection;

/// Retry delay while the selection is empty.
pub const EMPTY_SELECTION_BACKOFF: Duration = Duration::from_secs(1);

const EVENT_CAPACITY: usize = 64;

/// Everything a playback loop or a manual step reads from and writes to.
///
/// Snapshots are read fresh at the top of every tick; nothing here is owned
/// by a single scheduler instance.
#[derive(Clone)]
pub struct PlaybackContext {
    selection: watch::Receiver<Selection>,
    config: watch::Receiver<PlaybackConfig>,
    sinks: Arc<[Arc<dyn RenderSink>]>,
    orientations: OrientationCache,
    events: broadcast::Sender<PlaybackEvent>,
}

impl PlaybackContext {
    pub fn new(
        selection: watch::Receiver<Selection>,
        config: watch::Receiver<PlaybackConfig>,
        sinks: Vec<Arc<dyn RenderSink>>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            selection,
            config,
            sinks: sinks.into(),
            orientations: OrientationCache::new(),
            events,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    pub fn orientations(&self) -> &OrientationCache {
        &self.orientations
    }

    /// Latest settings and the orientation-filtered view of the latest selection.
    pub fn snapshot(&self) -> (PlaybackConfig, Vec<ImageRef>) {
        let config = self.config.borrow().clone();
        let selection = self.selection.borrow().clone();
        let view = filtered_view(&selection, config.orientation_filter, &self.orientations);
        (config, view)
    }

    pub(crate) fn emit(&self, event: PlaybackEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    /// Hands one image to every sink, in order, each on the blocking pool.
    ///
    /// A sink that has started runs to completion. When `cancel` fires, the
    /// remaining sinks are not started. Failures are logged and reported as
    /// events; nothing propagates.
    pub async fn apply(
        &self,
        image: &ImageRef,
        config: &PlaybackConfig,
        origin: ApplyOrigin,
        cancel: Option<&CancellationToken>,
    ) {
        let mut rendered = 0usize;
        for sink in self.sinks.iter() {
            let kind = sink.kind();
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                debug!(sink = %kind, image = %image, "stopped; remaining sinks skipped");
                break;
            }
            let task_sink = Arc::clone(sink);
            let task_image = image.clone();
            let task_config = config.clone();
            let result = tokio::task::spawn_blocking(move || {
                task_sink.render(&task_image, &task_config)
            })
            .await
            .unwrap_or_else(|err| {
                Err(SinkError::Aborted {
                    sink: kind,
                    message: err.to_string(),
                })
            });
            rendered += 1;

            match result {
                Ok(outcome) => {
                    if self.orientations.record(image, outcome.orientation) {
                        debug!(image = %image, orientation = %outcome.orientation, "orientation learned");
                    }
                }
                Err(err) => {
                    warn!(sink = %kind, image = %image, error = %err, "sink failed; playback continues");
                    self.emit(PlaybackEvent::SinkFailed {
                        sink: kind,
                        image: image.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }
        if rendered > 0 {
            self.emit(PlaybackEvent::Applied {
                image: image.clone(),
                origin,
            });
        }
    }
}

/// One periodic rotation. A stopped scheduler is never restarted; starting
/// again means building a new one.
pub struct PlaybackScheduler {
    ctx: PlaybackContext,
    generator: OrderGenerator,
    state: watch::Sender<SchedulerState>,
    cancel: CancellationToken,
}

impl PlaybackScheduler {
    pub fn new(ctx: PlaybackContext, generator: OrderGenerator, cancel: CancellationToken) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            ctx,
            generator,
            state,
            cancel,
        }
    }

    pub fn state(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    /// Drives the rotation until cancelled or until `max-duration` has elapsed.
    ///
    /// Cancellation is observed before every apply and during every wait. An
    /// apply already in flight completes and its write stands.
    #[instrument(skip_all, name = "scheduler")]
    pub async fn run(mut self) -> StopReason {
        let started = Instant::now();
        let mut playlist: Option<PlaylistState> = None;
        let mut tick: u64 = 0;
        info!("playback loop started");

        let reason = loop {
            if self.cancel.is_cancelled() {
                break StopReason::Stopped;
            }

            let (config, view) = self.ctx.snapshot();
            let refreshed = self.generator.refresh(&view, config.order, playlist.take());
            playlist = match refreshed {
                Refresh::Kept(state) => Some(state),
                Refresh::Regenerated(state) => {
                    info!(
                        order = ?config.order,
                        images = state.len(),
                        per_item = %humantime::format_duration(config.per_item),
                        "playback order regenerated"
                    );
                    self.ctx.emit(PlaybackEvent::Regenerated {
                        order: config.order,
                        len: state.len(),
                    });
                    Some(state)
                }
                Refresh::Empty(previous) => {
                    // cursor survives the gap; an unchanged selection resumes where it was
                    playlist = previous;
                    self.set_state(SchedulerState::Waiting);
                    if self.cancelled_during(EMPTY_SELECTION_BACKOFF).await {
                        break StopReason::Stopped;
                    }
                    continue;
                }
            };
            self.set_state(SchedulerState::Running);

            let Some(image) = playlist.as_ref().and_then(PlaylistState::current).cloned() else {
                continue;
            };
            if self.cancel.is_cancelled() {
                break StopReason::Stopped;
            }
            let elapsed = started.elapsed();
            debug!(tick, image = %image, elapsed = ?elapsed, "applying");
            self.ctx
                .apply(
                    &image,
                    &config,
                    ApplyOrigin::Scheduled { tick, elapsed },
                    Some(&self.cancel),
                )
                .await;
            tick += 1;

            if let Some(max) = config.max_duration {
                let elapsed = started.elapsed();
                if elapsed >= max {
                    info!(
                        elapsed = %humantime::format_duration(elapsed),
                        max = %humantime::format_duration(max),
                        "max duration reached"
                    );
                    break StopReason::MaxDuration;
                }
            }

            if self.cancelled_during(config.per_item).await {
                break StopReason::Stopped;
            }
            if let Some(state) = playlist.as_mut() {
                state.advance();
            }
        };

        self.set_state(SchedulerState::Stopped);
        self.ctx.emit(PlaybackEvent::Finished(reason));
        info!(?reason, ticks = tick, "playback loop finished");
        reason
    }

    /// Sleeps for `wait`; `true` when the token fired first.
    async fn cancelled_during(&self, wait: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => true,
            _ = sleep(wait) => false,
        }
    }

    fn set_state(&self, next: SchedulerState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            debug!(state = ?next, "scheduler state");
            self.ctx.emit(PlaybackEvent::StateChanged(next));
        }
    }
}
