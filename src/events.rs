use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::config::OrderMode;
use crate::model::ImageRef;
use crate::render::SinkKind;

/// The five actions a host can trigger (notification buttons, socket, signals).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlaybackCommand {
    Start,
    Stop,
    Next,
    Prev,
    Toggle,
}

impl PlaybackCommand {
    pub const NAMES: &'static [&'static str] = &["start", "stop", "next", "prev", "toggle"];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Next => "next",
            Self::Prev => "prev",
            Self::Toggle => "toggle",
        }
    }
}

impl fmt::Display for PlaybackCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlaybackCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim().to_ascii_lowercase();
        match raw.as_str() {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "next" => Ok(Self::Next),
            "prev" | "previous" => Ok(Self::Prev),
            "toggle" => Ok(Self::Toggle),
            _ => Err(format!(
                "unknown command {raw:?}; expected one of {}",
                Self::NAMES.join(", ")
            )),
        }
    }
}

/// Lifecycle of one scheduler instance. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    /// Selection is empty; retrying after a short backoff.
    Waiting,
    Stopped,
}

impl SchedulerState {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Waiting)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Explicit stop (command or shutdown).
    Stopped,
    /// `max-duration` elapsed; a normal end of the rotation.
    MaxDuration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDirection {
    Next,
    Prev,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOrigin {
    /// Tick `tick` of the periodic loop, `elapsed` after the loop started.
    Scheduled { tick: u64, elapsed: Duration },
    Manual(StepDirection),
}

/// Host-facing notifications. Nothing in the core depends on them being read.
#[derive(Debug, Clone)]
pub enum PlaybackEvent {
    StateChanged(SchedulerState),
    Regenerated {
        order: OrderMode,
        len: usize,
    },
    Applied {
        image: ImageRef,
        origin: ApplyOrigin,
    },
    /// A sink reported a write failure; playback continues.
    SinkFailed {
        sink: SinkKind,
        image: ImageRef,
        error: String,
    },
    Finished(StopReason),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_command_names() {
        for name in PlaybackCommand::NAMES {
            let cmd: PlaybackCommand = name.parse().unwrap();
            assert_eq!(cmd.as_str(), *name);
        }
        assert_eq!(" Previous ".parse::<PlaybackCommand>(), Ok(PlaybackCommand::Prev));
        assert!("pause".parse::<PlaybackCommand>().is_err());
    }

    #[test]
    fn deserializes_kebab_case() {
        let cmd: PlaybackCommand = serde_json::from_str(r#""toggle""#).unwrap();
        assert_eq!(cmd, PlaybackCommand::Toggle);
    }
}
