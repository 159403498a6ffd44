//! Log replication between nodes.
//!
//! A replication connection carries transactions in one direction only:
//!
//! - the **writer** side streams its whole transaction log, from index 0,
//!   then every new entry as it is appended ([`stream_log`]);
//! - the **reader** side decodes each frame and submits it to its own
//!   sequencer, waiting for the outcome before reading the next
//!   ([`apply_frames`]).
//!
//! A [`Dialer`] owns one outbound connection to a peer and plays one of the
//! two roles. On `/ws` the dialer pulls (accepting side writes); on
//! `/ws/push` the dialer pushes (accepting side reads). Each fresh
//! connection replays the full log; the receiving sequencer's watermark
//! check makes the re-delivery a cheap no-op.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::error::LinkError;
use crate::frames::{self, FrameSink, FrameStream};
use crate::log::TransactionLog;
use crate::sequencer::{Outcome, SequencerHandle};
use crate::shutdown::Shutdown;
use crate::transaction::Transaction;

pub const PULL_PATH: &str = "/ws";
pub const PUSH_PATH: &str = "/ws/push";

/// What the dialing side does once connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Read the remote log.
    Pull,
    /// Write the local log to the remote.
    Push,
}

impl Role {
    /// Endpoint the dialer connects to for this role.
    pub fn path(self) -> &'static str {
        match self {
            Role::Pull => PULL_PATH,
            Role::Push => PUSH_PATH,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Pull => "pull",
            Role::Push => "push",
        })
    }
}

/// Counters for one connection's lifetime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinkStats {
    pub sent: u64,
    pub applied: u64,
    pub duplicates: u64,
    pub rejected: u64,
}

/// Streams `log` to `sink` until the connection or the process ends.
///
/// The cursor lives only as long as this call. There is no acknowledgement
/// or flow control beyond the transport's own backpressure. `incoming` is
/// only watched so that a remote close ends the writer without waiting for
/// the next append.
pub async fn stream_log(
    log: Arc<TransactionLog>,
    mut sink: FrameSink,
    mut incoming: FrameStream,
    mut shutdown: Shutdown,
) -> Result<LinkStats, LinkError> {
    let mut stats = LinkStats::default();
    let mut cursor = 0;
    let mut appended = log.subscribe();

    loop {
        appended.borrow_and_update();

        let pending = log.read_from(cursor);
        if !pending.is_empty() {
            for transaction in pending {
                sink.feed(transaction.to_frame()?).await?;
                cursor += 1;
                stats.sent += 1;
            }
            sink.flush().await?;
        }

        tokio::select! {
            _ = shutdown.wait() => break,
            changed = appended.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            frame = incoming.next() => match frame {
                None | Some(Err(LinkError::Closed)) => return Ok(stats),
                Some(Err(err)) => return Err(err),
                Some(Ok(_)) => debug!("ignoring frame sent to a log writer"),
            },
        }
    }

    let _ = sink.close().await;
    Ok(stats)
}

/// Submits every incoming transaction to the local sequencer, one at a time.
///
/// Rejections are counted and logged here only; the remote is never told.
/// Returns when the remote closes the connection. A malformed frame or a
/// transport failure ends the link with an error.
pub async fn apply_frames(
    sequencer: &SequencerHandle,
    mut frames: FrameStream,
    mut shutdown: Shutdown,
) -> Result<LinkStats, LinkError> {
    let mut stats = LinkStats::default();

    loop {
        let frame = tokio::select! {
            _ = shutdown.wait() => return Ok(stats),
            frame = frames.next() => frame,
        };

        let frame = match frame {
            None | Some(Err(LinkError::Closed)) => return Ok(stats),
            Some(Err(err)) => return Err(err),
            Some(Ok(frame)) => frame,
        };

        let transaction = Transaction::from_frame(&frame)?;
        match sequencer.submit(transaction).await? {
            Outcome::Applied => stats.applied += 1,
            Outcome::Duplicate => stats.duplicates += 1,
            Outcome::Rejected(_) => stats.rejected += 1,
        }
    }
}

/// Keeps one replication connection to a peer alive.
pub struct Dialer {
    target: String,
    role: Role,
    sequencer: SequencerHandle,
    reconnect_delay: Duration,
}

impl Dialer {
    pub fn new(
        target: impl Into<String>,
        role: Role,
        sequencer: SequencerHandle,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            target: target.into(),
            role,
            sequencer,
            reconnect_delay,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}{}", self.target, self.role.path())
    }

    /// Connect, replicate until the link drops, wait the fixed delay, repeat.
    /// Only shutdown ends the loop.
    pub async fn run(self, mut shutdown: Shutdown) {
        loop {
            let link_shutdown = shutdown.clone();
            tokio::select! {
                _ = shutdown.wait() => return,
                result = self.connect_once(link_shutdown) => match result {
                    Ok(stats) => info!(
                        peer = %self.target,
                        role = %self.role,
                        sent = stats.sent,
                        applied = stats.applied,
                        duplicates = stats.duplicates,
                        rejected = stats.rejected,
                        "replication link closed"
                    ),
                    Err(err) => warn!(
                        peer = %self.target,
                        role = %self.role,
                        error = %err,
                        "replication link failed"
                    ),
                },
            }

            tokio::select! {
                _ = shutdown.wait() => return,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }
    }

    async fn connect_once(&self, shutdown: Shutdown) -> Result<LinkStats, LinkError> {
        let url = self.url();
        let (socket, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|err| LinkError::Connect {
                target: url.clone(),
                message: err.to_string(),
            })?;
        info!(peer = %self.target, role = %self.role, "replication link established");

        let (sink, stream) = frames::split_dialed(socket);
        match self.role {
            Role::Pull => apply_frames(&self.sequencer, stream, shutdown).await,
            Role::Push => {
                stream_log(Arc::clone(self.sequencer.log()), sink, stream, shutdown).await
            }
        }
    }
}
