//! Websocket transport for the multiplexer.
//!
//! An upgraded [`WebSocket`] is split into a [`WsReader`] and [`WsWriter`] and
//! handed to the coordinator as a [`Connection`].

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use switchboard_core::{Connection, Inbound, MessageReader, MessageWriter, TransportError};

/// Wrap an upgraded socket as a multiplexer connection.
pub fn into_connection(socket: WebSocket, remote_addr: impl Into<String>) -> Connection {
    let (sink, stream) = socket.split();
    Connection::new(
        remote_addr,
        WsReader { stream },
        WsWriter {
            sink,
            closed: false,
        },
    )
}

/// Translate one item from the websocket stream.
///
/// Only text frames carry messages. Binary frames are reported as
/// unsupported and never routed.
pub fn map_frame(frame: Option<Result<Message, axum::Error>>) -> Result<Inbound, TransportError> {
    match frame {
        None => Err(TransportError::Closed {
            code: None,
            reason: "stream ended".into(),
        }),
        Some(Err(err)) => Err(TransportError::Io(err.to_string())),
        Some(Ok(Message::Text(text))) => Ok(Inbound::Text(text.as_str().to_owned())),
        Some(Ok(Message::Binary(_))) => Ok(Inbound::Unsupported { kind: "binary" }),
        Some(Ok(Message::Ping(_) | Message::Pong(_))) => Ok(Inbound::Heartbeat),
        Some(Ok(Message::Close(frame))) => Err(match frame {
            Some(frame) => TransportError::Closed {
                code: Some(frame.code),
                reason: frame.reason.as_str().to_owned(),
            },
            None => TransportError::closed(),
        }),
    }
}

pub struct WsReader {
    stream: SplitStream<WebSocket>,
}

#[async_trait]
impl MessageReader for WsReader {
    async fn read(&mut self) -> Result<Inbound, TransportError> {
        map_frame(self.stream.next().await)
    }
}

pub struct WsWriter {
    sink: SplitSink<WebSocket, Message>,
    closed: bool,
}

impl WsWriter {
    async fn send(&mut self, message: Message) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::closed());
        }
        self.sink
            .send(message)
            .await
            .map_err(|err| TransportError::Io(err.to_string()))
    }
}

#[async_trait]
impl MessageWriter for WsWriter {
    async fn write(&mut self, text: &str) -> Result<(), TransportError> {
        self.send(Message::Text(text.to_owned().into())).await
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        self.send(Message::Ping(Bytes::new())).await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        let frame = CloseFrame {
            code: close_code::NORMAL,
            reason: "".into(),
        };
        let result = self.send(Message::Close(Some(frame))).await;
        self.closed = true;
        let _ = self.sink.close().await;
        result
    }
}
