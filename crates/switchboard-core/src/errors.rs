use std::time::Duration;

/// Failures on the duplex transport boundary.
///
/// Every variant is local to the session it happened on. The coordinator
/// downgrades the session to closing and never propagates the error further.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Peer closed the connection (close frame or end of stream).
    #[error("connection closed by peer{}", format_close(*code, reason))]
    Closed { code: Option<u16>, reason: String },
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("i/o error: {0}")]
    Io(String),
    /// No message arrived before the read deadline.
    #[error("read stalled for {0:?}")]
    Stalled(Duration),
    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),
}

fn format_close(code: Option<u16>, reason: &str) -> String {
    match (code, reason.is_empty()) {
        (Some(code), false) => format!(" ({code}: {reason})"),
        (Some(code), true) => format!(" ({code})"),
        (None, false) => format!(" ({reason})"),
        (None, true) => String::new(),
    }
}

impl TransportError {
    /// Clean close with no code or reason.
    pub fn closed() -> Self {
        Self::Closed {
            code: None,
            reason: String::new(),
        }
    }

    pub fn is_clean_close(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }

    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Closed { .. } => "closed",
            Self::Protocol(_) => "protocol",
            Self::Io(_) => "io",
            Self::Stalled(_) => "stalled",
            Self::WriteTimeout(_) => "write_timeout",
        }
    }
}
