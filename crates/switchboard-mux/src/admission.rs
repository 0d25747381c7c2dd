//! Bounded hand-off from acceptors to the coordinator.
//!
//! Any number of acceptor tasks may hold an [`AdmissionSender`]; the single
//! [`AdmissionReceiver`] belongs to the coordinator. When the queue is full,
//! [`AdmissionSender::admit`] waits, which pushes back on whoever is
//! accepting connections.

use std::fmt;

use switchboard_core::Connection;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

/// Admission failed; the connection is handed back to the caller.
#[derive(thiserror::Error)]
pub enum AdmissionError {
    #[error("admission queue is full")]
    QueueFull(Connection),
    #[error("multiplexer is no longer accepting connections")]
    Closed(Connection),
}

impl AdmissionError {
    pub fn into_connection(self) -> Connection {
        match self {
            Self::QueueFull(conn) | Self::Closed(conn) => conn,
        }
    }
}

impl fmt::Debug for AdmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull(conn) => f.debug_tuple("QueueFull").field(conn.id()).finish(),
            Self::Closed(conn) => f.debug_tuple("Closed").field(conn.id()).finish(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AdmissionSender {
    tx: mpsc::Sender<Connection>,
}

impl AdmissionSender {
    /// Queue a connection, waiting while the queue is full.
    pub async fn admit(&self, conn: Connection) -> Result<(), AdmissionError> {
        self.tx
            .send(conn)
            .await
            .map_err(|err| AdmissionError::Closed(err.0))
    }

    /// Queue a connection without waiting.
    pub fn try_admit(&self, conn: Connection) -> Result<(), AdmissionError> {
        self.tx.try_send(conn).map_err(|err| match err {
            TrySendError::Full(conn) => AdmissionError::QueueFull(conn),
            TrySendError::Closed(conn) => AdmissionError::Closed(conn),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[derive(Debug)]
pub struct AdmissionReceiver {
    rx: mpsc::Receiver<Connection>,
    capacity: usize,
}

impl AdmissionReceiver {
    /// Wait for the next connection. `None` once every sender is gone and the
    /// queue is empty.
    pub async fn recv(&mut self) -> Option<Connection> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Connection> {
        match self.rx.try_recv() {
            Ok(conn) => Some(conn),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Take up to `limit` queued connections without waiting.
    pub fn drain(&mut self, limit: usize) -> Vec<Connection> {
        let mut batch = Vec::new();
        while batch.len() < limit {
            match self.try_recv() {
                Some(conn) => batch.push(conn),
                None => break,
            }
        }
        batch
    }

    /// Stop accepting new connections. Already-queued ones stay receivable.
    pub fn close(&mut self) {
        self.rx.close();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Create an admission queue holding at most `capacity` connections.
pub fn admission_channel(capacity: usize) -> (AdmissionSender, AdmissionReceiver) {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    (AdmissionSender { tx }, AdmissionReceiver { rx, capacity })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::mock_connection;
    use assert_matches::assert_matches;
    use std::time::Duration;

    fn conn(addr: &str) -> Connection {
        mock_connection(addr).0
    }

    #[tokio::test]
    async fn connections_arrive_in_order() {
        let (tx, mut rx) = admission_channel(4);
        tx.admit(conn("a")).await.unwrap();
        tx.admit(conn("b")).await.unwrap();
        assert_eq!(rx.len(), 2);
        assert_eq!(rx.recv().await.unwrap().remote_addr(), "a");
        assert_eq!(rx.recv().await.unwrap().remote_addr(), "b");
        assert!(rx.is_empty());
    }

    #[tokio::test]
    async fn try_admit_reports_full_and_returns_connection() {
        let (tx, _rx) = admission_channel(1);
        tx.try_admit(conn("first")).unwrap();
        let err = tx.try_admit(conn("second")).unwrap_err();
        assert_matches!(err, AdmissionError::QueueFull(_));
        assert_eq!(err.into_connection().remote_addr(), "second");
    }

    #[tokio::test]
    async fn admit_waits_for_room() {
        let (tx, mut rx) = admission_channel(1);
        tx.admit(conn("first")).await.unwrap();

        let pending = tokio::spawn({
            let tx = tx.clone();
            async move { tx.admit(conn("second")).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pending.is_finished());

        assert_eq!(rx.recv().await.unwrap().remote_addr(), "first");
        pending.await.unwrap().unwrap();
        assert_eq!(rx.recv().await.unwrap().remote_addr(), "second");
    }

    #[tokio::test]
    async fn admit_after_receiver_dropped_is_closed() {
        let (tx, rx) = admission_channel(2);
        drop(rx);
        assert!(tx.is_closed());
        assert_matches!(tx.admit(conn("late")).await, Err(AdmissionError::Closed(_)));
        assert_matches!(tx.try_admit(conn("late")), Err(AdmissionError::Closed(_)));
    }

    #[tokio::test]
    async fn drain_respects_limit() {
        let (tx, mut rx) = admission_channel(8);
        for i in 0..5 {
            tx.try_admit(conn(&format!("c{i}"))).unwrap();
        }
        let first = rx.drain(3);
        assert_eq!(first.len(), 3);
        assert_eq!(first[0].remote_addr(), "c0");
        assert_eq!(rx.drain(10).len(), 2);
        assert!(rx.drain(10).is_empty());
    }

    #[tokio::test]
    async fn close_rejects_new_but_keeps_queued() {
        let (tx, mut rx) = admission_channel(4);
        tx.try_admit(conn("queued")).unwrap();
        rx.close();
        assert_matches!(tx.try_admit(conn("new")), Err(AdmissionError::Closed(_)));
        assert_eq!(rx.recv().await.unwrap().remote_addr(), "queued");
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let (_tx, rx) = admission_channel(0);
        assert_eq!(rx.capacity(), 1);
    }
}
