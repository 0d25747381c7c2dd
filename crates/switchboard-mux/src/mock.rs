//! In-memory transport for driving sessions and the coordinator without sockets.
//!
//! [`mock_connection`] returns a [`Connection`] to hand to the multiplexer and
//! a [`MockPeer`] that plays the remote side: it feeds inbound items and
//! records everything the multiplexer writes.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use switchboard_core::{Connection, Inbound, MessageReader, MessageWriter, TransportError};
use tokio::sync::mpsc;

type InboundItem = Result<Inbound, TransportError>;

#[derive(Debug, Default)]
struct Wire {
    written: Vec<String>,
    pings: usize,
    closes: usize,
    fail_writes: bool,
    fail_pings: bool,
}

/// Remote end of a mock connection.
#[derive(Clone)]
pub struct MockPeer {
    inbound: mpsc::UnboundedSender<InboundItem>,
    wire: Arc<Mutex<Wire>>,
}

impl MockPeer {
    /// Deliver a text message to the multiplexer.
    pub fn send_text(&self, text: &str) {
        self.send(Ok(Inbound::Text(text.to_owned())));
    }

    /// Deliver a ping/pong frame.
    pub fn heartbeat(&self) {
        self.send(Ok(Inbound::Heartbeat));
    }

    /// Close cleanly from the peer side.
    pub fn close(&self) {
        self.send(Err(TransportError::closed()));
    }

    /// Make the next read fail with `err`.
    pub fn fail(&self, err: TransportError) {
        self.send(Err(err));
    }

    pub fn send(&self, item: InboundItem) {
        let _ = self.inbound.send(item);
    }

    /// Messages written by the multiplexer, in order.
    pub fn written(&self) -> Vec<String> {
        self.wire.lock().written.clone()
    }

    pub fn pings(&self) -> usize {
        self.wire.lock().pings
    }

    /// How many times the multiplexer closed this connection.
    pub fn closes(&self) -> usize {
        self.wire.lock().closes
    }

    pub fn is_closed(&self) -> bool {
        self.closes() > 0
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.wire.lock().fail_writes = fail;
    }

    pub fn set_fail_pings(&self, fail: bool) {
        self.wire.lock().fail_pings = fail;
    }
}

struct MockReader {
    inbound: mpsc::UnboundedReceiver<InboundItem>,
}

#[async_trait]
impl MessageReader for MockReader {
    async fn read(&mut self) -> Result<Inbound, TransportError> {
        match self.inbound.recv().await {
            Some(item) => item,
            None => Err(TransportError::Closed {
                code: None,
                reason: "peer dropped".into(),
            }),
        }
    }
}

struct MockWriter {
    wire: Arc<Mutex<Wire>>,
}

#[async_trait]
impl MessageWriter for MockWriter {
    async fn write(&mut self, text: &str) -> Result<(), TransportError> {
        let mut wire = self.wire.lock();
        if wire.fail_writes {
            return Err(TransportError::Io("mock write failure".into()));
        }
        wire.written.push(text.to_owned());
        Ok(())
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        let mut wire = self.wire.lock();
        if wire.fail_pings {
            return Err(TransportError::Io("mock ping failure".into()));
        }
        wire.pings += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.wire.lock().closes += 1;
        Ok(())
    }
}

/// Create a connected mock pair.
pub fn mock_connection(remote_addr: &str) -> (Connection, MockPeer) {
    let (tx, rx) = mpsc::unbounded_channel();
    let wire = Arc::new(Mutex::new(Wire::default()));
    let conn = Connection::new(
        remote_addr,
        MockReader { inbound: rx },
        MockWriter {
            wire: Arc::clone(&wire),
        },
    );
    (conn, MockPeer { inbound: tx, wire })
}
