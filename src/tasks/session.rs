use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::{ApplyOrigin, PlaybackCommand, StepDirection, StopReason};
use crate::playlist::OrderGenerator;
use crate::tasks::scheduler::{PlaybackContext, PlaybackScheduler};

const COMMAND_CAPACITY: usize = 16;

/// Host-visible summary of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStatus {
    /// A playback loop is active.
    pub running: bool,
    /// Loops started over the session's lifetime.
    pub runs_started: u64,
    pub last_stop: Option<StopReason>,
}

/// Cloneable entry point for the five playback commands.
///
/// Commands are delivered asynchronously and are not ordered against the
/// loop's own ticks.
#[derive(Debug, Clone)]
pub struct CommandChannel {
    tx: mpsc::Sender<PlaybackCommand>,
}

impl CommandChannel {
    pub async fn send(&self, command: PlaybackCommand) -> Result<()> {
        self.tx
            .send(command)
            .await
            .with_context(|| format!("playback session is gone; dropped {command}"))
    }

    /// Non-blocking variant for synchronous callers such as signal handlers.
    pub fn try_send(&self, command: PlaybackCommand) -> Result<()> {
        self.tx
            .try_send(command)
            .with_context(|| format!("could not queue {command}"))
    }

    pub async fn start(&self) -> Result<()> {
        self.send(PlaybackCommand::Start).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.send(PlaybackCommand::Stop).await
    }

    pub async fn next(&self) -> Result<()> {
        self.send(PlaybackCommand::Next).await
    }

    pub async fn prev(&self) -> Result<()> {
        self.send(PlaybackCommand::Prev).await
    }

    pub async fn toggle(&self) -> Result<()> {
        self.send(PlaybackCommand::Toggle).await
    }
}

struct ActiveLoop {
    cancel: CancellationToken,
    handle: JoinHandle<StopReason>,
}

impl ActiveLoop {
    fn is_alive(&self) -> bool {
        !self.cancel.is_cancelled() && !self.handle.is_finished()
    }
}

enum Wake {
    Shutdown,
    Command(Option<PlaybackCommand>),
    LoopFinished(Result<StopReason, JoinError>),
    StepFinished,
}

/// Owns at most one active playback loop and runs manual steps beside it.
pub struct Session {
    ctx: PlaybackContext,
    commands: mpsc::Receiver<PlaybackCommand>,
    status: watch::Sender<SessionStatus>,
    active: Option<ActiveLoop>,
    steps: JoinSet<()>,
    manual_orders: OrderGenerator,
}

pub fn channel(ctx: PlaybackContext) -> (CommandChannel, Session) {
    let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
    let (status, _) = watch::channel(SessionStatus::default());
    let session = Session {
        ctx,
        commands: rx,
        status,
        active: None,
        steps: JoinSet::new(),
        manual_orders: OrderGenerator::from_clock(),
    };
    (CommandChannel { tx }, session)
}

impl Session {
    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    pub fn context(&self) -> &PlaybackContext {
        &self.ctx
    }

    /// Processes commands until cancelled or until every [`CommandChannel`] is dropped.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        loop {
            let wake = tokio::select! {
                _ = cancel.cancelled() => Wake::Shutdown,
                command = self.commands.recv() => Wake::Command(command),
                finished = wait_for(&mut self.active) => Wake::LoopFinished(finished),
                Some(_) = self.steps.join_next(), if !self.steps.is_empty() => Wake::StepFinished,
            };

            match wake {
                Wake::Shutdown | Wake::Command(None) => break,
                Wake::Command(Some(command)) => self.handle(command),
                Wake::LoopFinished(finished) => {
                    self.active = None;
                    let reason = match finished {
                        Ok(reason) => reason,
                        Err(err) => {
                            warn!(error = %err, "playback loop aborted");
                            StopReason::Stopped
                        }
                    };
                    info!(?reason, "playback stopped");
                    self.status.send_modify(|status| {
                        status.running = false;
                        status.last_stop = Some(reason);
                    });
                }
                Wake::StepFinished => {}
            }
        }

        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            let _ = active.handle.await;
        }
        while self.steps.join_next().await.is_some() {}
        self.status.send_modify(|status| status.running = false);
        info!("playback session closed");
        Ok(())
    }

    fn handle(&mut self, command: PlaybackCommand) {
        debug!(%command, "playback command");
        match command {
            PlaybackCommand::Start => self.start(),
            PlaybackCommand::Stop => self.stop(),
            PlaybackCommand::Toggle => {
                if self.is_running() {
                    self.stop();
                } else {
                    self.start();
                }
            }
            PlaybackCommand::Next => self.step(StepDirection::Next),
            PlaybackCommand::Prev => self.step(StepDirection::Prev),
        }
    }

    fn is_running(&self) -> bool {
        self.active.as_ref().is_some_and(ActiveLoop::is_alive)
    }

    fn start(&mut self) {
        if self.is_running() {
            debug!("start ignored; playback already running");
            return;
        }
        let cancel = CancellationToken::new();
        let scheduler = PlaybackScheduler::new(
            self.ctx.clone(),
            OrderGenerator::from_clock(),
            cancel.clone(),
        );
        let handle = tokio::spawn(scheduler.run());
        // a finished loop that was not reaped yet is simply replaced
        self.active = Some(ActiveLoop { cancel, handle });
        self.status.send_modify(|status| {
            status.running = true;
            status.runs_started += 1;
        });
        info!("playback started");
    }

    // Always accepted. The loop is detached so a start right after a stop is
    // never mistaken for a duplicate; an apply it already began still lands.
    fn stop(&mut self) {
        let Some(active) = self.active.take() else {
            debug!("stop with no active playback");
            self.status.send_modify(|status| status.running = false);
            return;
        };
        active.cancel.cancel();
        self.steps.spawn(async move {
            match active.handle.await {
                Ok(reason) => debug!(?reason, "stopped loop exited"),
                Err(err) => warn!(error = %err, "stopped loop aborted"),
            }
        });
        self.status.send_modify(|status| {
            status.running = false;
            status.last_stop = Some(StopReason::Stopped);
        });
        info!("playback stopped");
    }

    // Independent one-shot apply. It builds a fresh order (a new shuffle in
    // random mode), never touches the loop's cursor or timer, and races the
    // loop for the visible frame: whichever write finishes last wins.
    fn step(&mut self, direction: StepDirection) {
        let (config, view) = self.ctx.snapshot();
        let Some(order) = self.manual_orders.fresh(&view, config.order) else {
            info!(?direction, "nothing selected; step ignored");
            return;
        };
        let offset = match direction {
            StepDirection::Next => 1,
            StepDirection::Prev => -1,
        };
        let Some(image) = order.at_offset(offset).cloned() else {
            return;
        };
        info!(?direction, image = %image, "manual step");
        let ctx = self.ctx.clone();
        self.steps.spawn(async move {
            ctx.apply(&image, &config, ApplyOrigin::Manual(direction), None)
                .await;
        });
    }
}

async fn wait_for(active: &mut Option<ActiveLoop>) -> Result<StopReason, JoinError> {
    match active {
        Some(active) => (&mut active.handle).await,
        None => std::future::pending().await,
    }
}
