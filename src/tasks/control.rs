use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::events::PlaybackCommand;
use crate::tasks::session::CommandChannel;

/// One request line: `{"command":"next"}`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControlRequest {
    pub command: PlaybackCommand,
}

pub fn parse_request(line: &str) -> Result<PlaybackCommand> {
    let request: ControlRequest =
        serde_json::from_str(line.trim()).context("invalid control request")?;
    Ok(request.command)
}

/// Accepts newline-delimited JSON commands on a Unix socket and answers each
/// line with `ok` or `error: <reason>`.
#[instrument(skip(commands, cancel), fields(socket = %socket_path.display()))]
pub async fn run(
    socket_path: PathBuf,
    commands: CommandChannel,
    cancel: CancellationToken,
) -> Result<()> {
    if let Some(parent) = socket_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    match tokio::fs::remove_file(&socket_path).await {
        Ok(()) => debug!("removed stale control socket"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err).with_context(|| {
                format!("failed to remove stale socket {}", socket_path.display())
            });
        }
    }

    let listener = UnixListener::bind(&socket_path)
        .with_context(|| format!("failed to bind control socket {}", socket_path.display()))?;
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(err) =
            std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o600))
        {
            warn!(error = %err, "could not restrict control socket to its owner");
        }
    }
    info!("control socket listening");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let commands = commands.clone();
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        if let Err(err) = serve_client(stream, commands, cancel).await {
                            warn!(error = %format!("{err:#}"), "control client failed");
                        }
                    });
                }
                Err(err) => warn!(error = %err, "control socket accept failed"),
            }
        }
    }

    let _ = std::fs::remove_file(&socket_path);
    info!("control socket closed");
    Ok(())
}

async fn serve_client(
    stream: UnixStream,
    commands: CommandChannel,
    cancel: CancellationToken,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line.context("failed to read control request")?,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let reply = match parse_request(&line) {
            Ok(command) => match commands.send(command).await {
                Ok(()) => {
                    info!(%command, "control command accepted");
                    "ok".to_string()
                }
                Err(err) => format!("error: {err:#}"),
            },
            Err(err) => {
                debug!(line = %line, "rejected control request");
                format!("error: {err:#}")
            }
        };
        writer.write_all(reply.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(())
}

/// Client side used by `--send`: sends one command and waits for the reply.
pub async fn send_command(socket_path: &Path, command: PlaybackCommand) -> Result<()> {
    let stream = UnixStream::connect(socket_path).await.with_context(|| {
        format!(
            "failed to connect to control socket at {}",
            socket_path.display()
        )
    })?;
    let (reader, mut writer) = stream.into_split();
    let request = serde_json::json!({ "command": command.as_str() });
    writer
        .write_all(format!("{request}\n").as_bytes())
        .await
        .with_context(|| format!("failed to send {command} command"))?;
    writer.flush().await?;

    let mut reply = String::new();
    BufReader::new(reader)
        .read_line(&mut reply)
        .await
        .context("failed to read control reply")?;
    match reply.trim() {
        "ok" => Ok(()),
        "" => bail!("control socket closed without a reply"),
        other => bail!("{}", other.strip_prefix("error: ").unwrap_or(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_command_lines() {
        assert_eq!(
            parse_request(r#"{"command":"prev"}"#).unwrap(),
            PlaybackCommand::Prev
        );
        assert_eq!(
            parse_request(" {\"command\": \"start\"}\n").unwrap(),
            PlaybackCommand::Start
        );
        assert!(parse_request(r#"{"command":"toggle-state"}"#).is_err());
        assert!(parse_request(r#"{"command":"stop","extra":1}"#).is_err());
        assert!(parse_request("stop").is_err());
    }
}
