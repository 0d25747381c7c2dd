//! Abstract duplex connection consumed by the multiplexer.
//!
//! A concrete transport (websocket, raw socket, test double) implements
//! [`MessageReader`] and [`MessageWriter`] and hands both halves over in a
//! [`Connection`]. Reads yield whole discrete messages; framing is the
//! transport's job.

use async_trait::async_trait;

use crate::errors::TransportError;
use crate::ids::ConnectionId;

/// One item produced by a completed read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    /// A complete UTF-8 text message.
    Text(String),
    /// Liveness traffic (ping/pong) with no payload for the router.
    Heartbeat,
    /// A frame the multiplexer does not handle, e.g. non-UTF-8 binary.
    Unsupported { kind: &'static str },
}

/// Read half of a duplex connection.
///
/// The multiplexer moves the reader into a spawned task for the duration of a
/// single read, so at most one `read` is ever outstanding per connection.
#[async_trait]
pub trait MessageReader: Send + 'static {
    /// Wait for the next inbound item.
    async fn read(&mut self) -> Result<Inbound, TransportError>;
}

/// Write half of a duplex connection.
#[async_trait]
pub trait MessageWriter: Send + 'static {
    /// Send one text message.
    async fn write(&mut self, text: &str) -> Result<(), TransportError>;

    /// Send a liveness probe. Transports without one keep the default.
    async fn ping(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Close the underlying connection. Must tolerate repeated calls.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// A newly accepted duplex connection waiting for admission.
pub struct Connection {
    id: ConnectionId,
    remote_addr: String,
    reader: Box<dyn MessageReader>,
    writer: Box<dyn MessageWriter>,
}

impl Connection {
    pub fn new(
        remote_addr: impl Into<String>,
        reader: impl MessageReader,
        writer: impl MessageWriter,
    ) -> Self {
        Self {
            id: ConnectionId::new(),
            remote_addr: remote_addr.into(),
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Peer address, diagnostic only.
    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    pub fn into_parts(
        self,
    ) -> (
        ConnectionId,
        String,
        Box<dyn MessageReader>,
        Box<dyn MessageWriter>,
    ) {
        (self.id, self.remote_addr, self.reader, self.writer)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct ScriptedReader(VecDeque<Result<Inbound, TransportError>>);

    #[async_trait]
    impl MessageReader for ScriptedReader {
        async fn read(&mut self) -> Result<Inbound, TransportError> {
            self.0.pop_front().unwrap_or_else(|| Err(TransportError::closed()))
        }
    }

    #[derive(Default)]
    struct NullWriter {
        closes: usize,
    }

    #[async_trait]
    impl MessageWriter for NullWriter {
        async fn write(&mut self, _text: &str) -> Result<(), TransportError> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            self.closes += 1;
            Ok(())
        }
    }

    #[test]
    fn connection_gets_fresh_id() {
        let a = Connection::new("1.2.3.4:5", ScriptedReader(VecDeque::new()), NullWriter::default());
        let b = Connection::new("1.2.3.4:6", ScriptedReader(VecDeque::new()), NullWriter::default());
        assert_ne!(a.id(), b.id());
        assert_eq!(a.remote_addr(), "1.2.3.4:5");
    }

    #[tokio::test]
    async fn parts_keep_reader_and_writer() {
        let script = VecDeque::from([Ok(Inbound::Text("PING".into()))]);
        let conn = Connection::new("peer", ScriptedReader(script), NullWriter::default());
        let (id, remote, mut reader, mut writer) = conn.into_parts();
        assert!(id.as_str().starts_with("conn_"));
        assert_eq!(remote, "peer");
        assert_eq!(reader.read().await, Ok(Inbound::Text("PING".into())));
        assert!(reader.read().await.unwrap_err().is_clean_close());
        assert!(writer.ping().await.is_ok());
        assert!(writer.close().await.is_ok());
    }

    #[test]
    fn debug_omits_halves() {
        let conn = Connection::new("peer", ScriptedReader(VecDeque::new()), NullWriter::default());
        let debug = format!("{conn:?}");
        assert!(debug.contains("peer"));
        assert!(debug.contains(".."));
    }
}
