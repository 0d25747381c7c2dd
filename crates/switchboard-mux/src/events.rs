//! Session lifecycle notifications.

use serde::Serialize;
use switchboard_core::ConnectionId;

use crate::registry::SlotId;
use crate::session::CloseReason;

/// A state transition observed by the coordinator.
///
/// Published on a broadcast channel; slow subscribers lose the oldest events
/// rather than slowing the coordinator down.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Admitted {
        slot: SlotId,
        conn_id: ConnectionId,
        remote_addr: String,
    },
    MessageReceived {
        conn_id: ConnectionId,
        message: String,
    },
    Unrecognized {
        conn_id: ConnectionId,
        message: String,
    },
    ReplyQueued {
        conn_id: ConnectionId,
        reply: String,
    },
    ReplyWritten {
        conn_id: ConnectionId,
        reply: String,
    },
    ReadFailed {
        conn_id: ConnectionId,
        error_kind: &'static str,
        error: String,
    },
    WriteFailed {
        conn_id: ConnectionId,
        error_kind: &'static str,
        error: String,
    },
    Closed {
        slot: SlotId,
        conn_id: ConnectionId,
        reason: CloseReason,
    },
}

impl SessionEvent {
    pub fn conn_id(&self) -> &ConnectionId {
        match self {
            Self::Admitted { conn_id, .. }
            | Self::MessageReceived { conn_id, .. }
            | Self::Unrecognized { conn_id, .. }
            | Self::ReplyQueued { conn_id, .. }
            | Self::ReplyWritten { conn_id, .. }
            | Self::ReadFailed { conn_id, .. }
            | Self::WriteFailed { conn_id, .. }
            | Self::Closed { conn_id, .. } => conn_id,
        }
    }

    /// Snake-case event name, as used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Admitted { .. } => "admitted",
            Self::MessageReceived { .. } => "message_received",
            Self::Unrecognized { .. } => "unrecognized",
            Self::ReplyQueued { .. } => "reply_queued",
            Self::ReplyWritten { .. } => "reply_written",
            Self::ReadFailed { .. } => "read_failed",
            Self::WriteFailed { .. } => "write_failed",
            Self::Closed { .. } => "closed",
        }
    }
}
