//! Per-connection state machine.
//!
//! ```text
//! Idle ──begin_read──▶ ReadPending ──complete_read(ok)──▶ Idle
//!   │                       │
//!   │                       └──complete_read(err)──▶ Closing
//!   └──────request_close────────────────────────────▶ Closing ──close──▶ Closed
//! ```
//!
//! Read activity (`read_in_flight`) and pending writes (the outbound queue) are
//! tracked alongside the state. Only the coordinator mutates a session.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use switchboard_core::{
    Connection, ConnectionId, Inbound, MessageReader, MessageRouter, MessageWriter,
    TransportError,
};
use tokio::task::AbortHandle;
use tokio::time::{timeout, Instant};
use tracing::debug;

use crate::outbound::{OutboundError, OutboundQueue};

/// Upper bound on how long closing the underlying connection may take.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    ReadPending,
    Closing,
    Closed,
}

/// Why a session left service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    PeerClosed,
    ReadFailed,
    Stalled,
    WriteFailed,
    OutboundOverflow,
    Administrative,
    Shutdown,
}

impl CloseReason {
    pub fn from_read_error(err: &TransportError) -> Self {
        match err {
            TransportError::Closed { .. } => Self::PeerClosed,
            TransportError::Stalled(_) => Self::Stalled,
            _ => Self::ReadFailed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PeerClosed => "peer_closed",
            Self::ReadFailed => "read_failed",
            Self::Stalled => "stalled",
            Self::WriteFailed => "write_failed",
            Self::OutboundOverflow => "outbound_overflow",
            Self::Administrative => "administrative",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of applying a completed read to a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Recognized command; the reply is queued for the next flush.
    Replied { message: String, reply: String },
    /// Message with no route. Not an error.
    Unrecognized { message: String },
    /// Recognized command whose reply did not fit the outbound queue.
    Overflow { message: String },
    Heartbeat,
    Unsupported { kind: &'static str },
    Failed(TransportError),
    /// The session was already closing; the item was dropped.
    Discarded,
}

/// Messages written by one flush, plus the error that stopped it, if any.
#[derive(Debug, Default)]
pub struct Flush {
    pub written: Vec<String>,
    pub error: Option<TransportError>,
}

pub struct Session {
    id: ConnectionId,
    remote_addr: String,
    state: SessionState,
    reader: Option<Box<dyn MessageReader>>,
    writer: Box<dyn MessageWriter>,
    outbound: OutboundQueue,
    read_in_flight: bool,
    close_reason: Option<CloseReason>,
    read_task: Option<AbortHandle>,
    admitted_at: Instant,
    last_activity: Instant,
    last_ping: Instant,
}

impl Session {
    pub fn new(conn: Connection, outbound_capacity: usize) -> Self {
        let (id, remote_addr, reader, writer) = conn.into_parts();
        let now = Instant::now();
        Self {
            id,
            remote_addr,
            state: SessionState::Idle,
            reader: Some(reader),
            writer,
            outbound: OutboundQueue::new(outbound_capacity),
            read_in_flight: false,
            close_reason: None,
            read_task: None,
            admitted_at: now,
            last_activity: now,
            last_ping: now,
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_read_in_flight(&self) -> bool {
        self.read_in_flight
    }

    pub fn is_close_requested(&self) -> bool {
        self.close_reason.is_some()
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason
    }

    /// Number of queued, unsent messages.
    pub fn pending_outbound(&self) -> usize {
        self.outbound.len()
    }

    pub fn age(&self) -> Duration {
        self.admitted_at.elapsed()
    }

    /// Time since the last inbound message or heartbeat.
    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Take the reader for one asynchronous read.
    ///
    /// Returns `None` while a read is already outstanding or once the session
    /// is closing, so a second concurrent read can never be issued.
    pub fn begin_read(&mut self) -> Option<Box<dyn MessageReader>> {
        if self.read_in_flight || self.close_reason.is_some() || self.state == SessionState::Closed
        {
            return None;
        }
        let reader = self.reader.take()?;
        self.read_in_flight = true;
        self.state = SessionState::ReadPending;
        Some(reader)
    }

    /// Remember the task running the outstanding read so `close` can abort it.
    pub fn attach_read_task(&mut self, task: AbortHandle) {
        self.read_task = Some(task);
    }

    /// Apply a finished read: hand the reader back, route the message, queue
    /// any reply.
    pub fn complete_read(
        &mut self,
        reader: Box<dyn MessageReader>,
        result: Result<Inbound, TransportError>,
        router: &MessageRouter,
    ) -> ReadOutcome {
        self.read_in_flight = false;
        self.read_task = None;
        if self.state == SessionState::Closed {
            return ReadOutcome::Discarded;
        }
        self.reader = Some(reader);
        if self.close_reason.is_some() {
            return ReadOutcome::Discarded;
        }
        self.state = SessionState::Idle;

        match result {
            Ok(Inbound::Text(message)) => {
                self.last_activity = Instant::now();
                let Some(reply) = router.route(&message) else {
                    return ReadOutcome::Unrecognized { message };
                };
                let reply = reply.encode();
                match self.outbound.push(reply.clone()) {
                    Ok(()) => ReadOutcome::Replied { message, reply },
                    Err(OutboundError::Full { .. }) => {
                        let _ = self.request_close(CloseReason::OutboundOverflow);
                        ReadOutcome::Overflow { message }
                    }
                }
            }
            Ok(Inbound::Heartbeat) => {
                self.last_activity = Instant::now();
                ReadOutcome::Heartbeat
            }
            Ok(Inbound::Unsupported { kind }) => ReadOutcome::Unsupported { kind },
            Err(err) => {
                let _ = self.request_close(CloseReason::from_read_error(&err));
                ReadOutcome::Failed(err)
            }
        }
    }

    /// Queue an application-originated message.
    pub fn queue(&mut self, message: String) -> Result<(), OutboundError> {
        if self.close_reason.is_some() {
            return Ok(());
        }
        self.outbound.push(message).inspect_err(|_| {
            let _ = self.request_close(CloseReason::OutboundOverflow);
        })
    }

    /// Mark the session for closing. The first reason wins.
    ///
    /// Returns `false` if the session was already closing or closed.
    pub fn request_close(&mut self, reason: CloseReason) -> bool {
        if self.state == SessionState::Closed || self.close_reason.is_some() {
            return false;
        }
        self.close_reason = Some(reason);
        self.state = SessionState::Closing;
        true
    }

    /// Write every queued message in order, each bounded by `write_timeout`.
    ///
    /// The first failure stops the flush and marks the session for closing;
    /// unsent messages stay queued until the session is reaped.
    pub async fn flush(&mut self, write_timeout: Duration) -> Flush {
        let mut flush = Flush::default();
        if self.state == SessionState::Closed {
            return flush;
        }
        while let Some(message) = self.outbound.front() {
            let result = match timeout(write_timeout, self.writer.write(message)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::WriteTimeout(write_timeout)),
            };
            match result {
                Ok(()) => {
                    if let Some(sent) = self.outbound.pop_front() {
                        flush.written.push(sent);
                    }
                }
                Err(err) => {
                    let _ = self.request_close(CloseReason::WriteFailed);
                    flush.error = Some(err);
                    break;
                }
            }
        }
        flush
    }

    /// Send a liveness probe if `interval` has passed since the last one.
    ///
    /// Returns whether a probe was sent. A failed probe counts as a write
    /// failure.
    pub async fn heartbeat_if_due(
        &mut self,
        interval: Duration,
        write_timeout: Duration,
    ) -> Result<bool, TransportError> {
        if self.close_reason.is_some() || self.last_ping.elapsed() < interval {
            return Ok(false);
        }
        let result = match timeout(write_timeout, self.writer.ping()).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::WriteTimeout(write_timeout)),
        };
        match result {
            Ok(()) => {
                self.last_ping = Instant::now();
                Ok(true)
            }
            Err(err) => {
                let _ = self.request_close(CloseReason::WriteFailed);
                Err(err)
            }
        }
    }

    /// Close the underlying connection and enter the terminal state.
    ///
    /// Idempotent: returns `false` without touching the connection if the
    /// session is already closed.
    pub async fn close(&mut self) -> bool {
        if self.state == SessionState::Closed {
            return false;
        }
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
        self.reader = None;
        self.read_in_flight = false;
        self.outbound.clear();
        if self.close_reason.is_none() {
            self.close_reason = Some(CloseReason::Administrative);
        }
        match timeout(CLOSE_TIMEOUT, self.writer.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                debug!(conn_id = %self.id, error = %err, "error while closing connection");
            }
            Err(_) => {
                debug!(conn_id = %self.id, "timed out closing connection");
            }
        }
        self.state = SessionState::Closed;
        true
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("state", &self.state)
            .field("read_in_flight", &self.read_in_flight)
            .field("close_reason", &self.close_reason)
            .field("pending_outbound", &self.outbound.len())
            .finish_non_exhaustive()
    }
}
