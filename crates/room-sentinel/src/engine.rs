//! Call-engine adapter process bridge.
//!
//! The media engine itself lives outside this process. [`EngineTransport`]
//! spawns the engine adapter as a child process and bridges it to the
//! [`CallTransport`] seam over newline-delimited JSON:
//!
//! ```text
//! ┌──────────────────┐  stdin: {"cmd":"join",...}  ┌────────────────┐
//! │  stdin writer    │────────────────────────────▶│ engine adapter │
//! │  (background)    │                             │   (process)    │
//! └──────────────────┘                             └───────┬────────┘
//!                                                          │ stdout
//! ┌──────────────────┐        ┌──────────────┐             ▼
//! │ SessionController│◀───────│ event channel│◀──── stdout reader
//! └──────────────────┘        └──────────────┘      (background)
//! ```
//!
//! Commands are `{"cmd": "join", "room_url": ..., "meeting_token": ...}` and
//! `{"cmd": "leave"}`. Events are `{"event": "joined", "error": null}`,
//! `{"event": "left", "error": null}`,
//! `{"event": "participant-left", "participant": ..., "reason": ...}` and
//! `{"event": "counts", "present": N}`. Count updates are folded into a
//! shared atomic read by `participant_counts`; lifecycle events are forwarded
//! to the controller's channel. Malformed lines are logged and skipped.
//!
//! The child is spawned with `kill_on_drop`, so dropping the transport tears
//! the engine down on every exit path. Stdout EOF closes the event stream,
//! which the controller treats as fatal.

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::errors::SentinelError;
use crate::transport::{CallTransport, ParticipantCounts, TransportEvent};

/// Buffer size for the transport event channel.
const EVENT_CHANNEL_BUFFER: usize = 64;

/// Commands written to the adapter's stdin, one JSON object per line.
#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "kebab-case")]
enum EngineCommand {
    Join {
        room_url: String,
        meeting_token: String,
    },
    Leave,
}

/// Events read from the adapter's stdout, one JSON object per line.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
enum EngineEvent {
    Joined {
        #[serde(default)]
        error: Option<String>,
    },
    Left {
        #[serde(default)]
        error: Option<String>,
    },
    ParticipantLeft {
        participant: String,
        #[serde(default)]
        reason: String,
    },
    Counts {
        present: u64,
    },
}

/// [`CallTransport`] implementation backed by an engine adapter process.
pub struct EngineTransport {
    commands: mpsc::UnboundedSender<EngineCommand>,
    present: Arc<AtomicU64>,
    /// Held so the adapter process is killed whenever the transport drops.
    _child: Child,
}

impl EngineTransport {
    /// Launch the engine adapter and return the transport plus its event
    /// stream.
    ///
    /// # Errors
    ///
    /// `SentinelError::Transport` if the adapter cannot be spawned or its
    /// stdio pipes cannot be captured.
    pub fn spawn(
        command: &str,
        args: &[String],
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>), SentinelError> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SentinelError::Transport(format!(
                    "failed to launch engine adapter {command:?}: {e}"
                ))
            })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            SentinelError::Transport("engine adapter stdin was not captured".into())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            SentinelError::Transport("engine adapter stdout was not captured".into())
        })?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_BUFFER);
        let present = Arc::new(AtomicU64::new(0));

        tokio::spawn(write_commands(stdin, command_rx));
        tokio::spawn(read_events(stdout, event_tx, Arc::clone(&present)));

        debug!(command, "engine adapter launched");
        Ok((
            Self {
                commands: command_tx,
                present,
                _child: child,
            },
            event_rx,
        ))
    }

    fn send(&self, command: EngineCommand) -> Result<(), SentinelError> {
        self.commands
            .send(command)
            .map_err(|_| SentinelError::Transport("engine command channel closed".into()))
    }
}

impl CallTransport for EngineTransport {
    fn join(
        &mut self,
        room_url: &str,
        meeting_token: &SecretString,
    ) -> Result<(), SentinelError> {
        self.send(EngineCommand::Join {
            room_url: room_url.to_string(),
            meeting_token: meeting_token.expose_secret().to_string(),
        })
    }

    fn leave(&mut self) -> Result<(), SentinelError> {
        self.send(EngineCommand::Leave)
    }

    fn participant_counts(&self) -> ParticipantCounts {
        ParticipantCounts {
            present: self.present.load(Ordering::SeqCst),
        }
    }
}

/// Stdin writer task: encodes commands as JSON lines.
///
/// Command lines carry the meeting token, so they are never logged.
async fn write_commands(
    mut stdin: ChildStdin,
    mut commands: mpsc::UnboundedReceiver<EngineCommand>,
) {
    while let Some(command) = commands.recv().await {
        let mut line = match serde_json::to_string(&command) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to encode engine command, skipping");
                continue;
            }
        };
        line.push('\n');

        if let Err(e) = stdin.write_all(line.as_bytes()).await {
            warn!(error = %e, "engine adapter stdin closed, stopping writer");
            break;
        }
        if let Err(e) = stdin.flush().await {
            warn!(error = %e, "engine adapter stdin flush failed, stopping writer");
            break;
        }
    }
}

/// Stdout reader task: parses event lines, folds count updates into the
/// shared atomic and forwards lifecycle events to the controller.
///
/// Dropping `events` on exit closes the stream; the controller treats a
/// closed stream before `Done` as fatal.
async fn read_events(
    stdout: ChildStdout,
    events: mpsc::Sender<TransportEvent>,
    present: Arc<AtomicU64>,
) {
    let mut lines = BufReader::new(stdout).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let forwarded = match serde_json::from_str::<EngineEvent>(line) {
                    Ok(EngineEvent::Counts { present: count }) => {
                        present.store(count, Ordering::SeqCst);
                        continue;
                    }
                    Ok(EngineEvent::Joined { error }) => TransportEvent::JoinCompleted { error },
                    Ok(EngineEvent::Left { error }) => TransportEvent::LeaveCompleted { error },
                    Ok(EngineEvent::ParticipantLeft {
                        participant,
                        reason,
                    }) => TransportEvent::ParticipantLeft {
                        participant,
                        reason,
                    },
                    Err(e) => {
                        warn!(error = %e, "discarding malformed engine event line");
                        continue;
                    }
                };

                if events.send(forwarded).await.is_err() {
                    debug!("controller dropped its event stream, stopping reader");
                    break;
                }
            }
            Ok(None) => {
                debug!("engine adapter stdout reached EOF");
                break;
            }
            Err(e) => {
                warn!(error = %e, "error reading engine adapter stdout");
                break;
            }
        }
    }
}
