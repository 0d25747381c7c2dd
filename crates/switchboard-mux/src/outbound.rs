//! Bounded per-session reply FIFO.

use std::collections::VecDeque;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum OutboundError {
    /// The queue already holds `capacity` unsent messages.
    #[error("outbound queue full (capacity {capacity})")]
    Full { capacity: usize },
}

/// Replies waiting to be flushed by the coordinator, oldest first.
///
/// A push never overwrites an unsent message; when the queue is full the new
/// message is rejected and the caller decides what to do with the session.
#[derive(Debug)]
pub struct OutboundQueue {
    items: VecDeque<String>,
    capacity: usize,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity.min(16)),
            capacity,
        }
    }

    pub fn push(&mut self, message: String) -> Result<(), OutboundError> {
        if self.items.len() >= self.capacity {
            return Err(OutboundError::Full {
                capacity: self.capacity,
            });
        }
        self.items.push_back(message);
        Ok(())
    }

    pub fn front(&self) -> Option<&str> {
        self.items.front().map(String::as_str)
    }

    pub fn pop_front(&mut self) -> Option<String> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let mut queue = OutboundQueue::new(4);
        queue.push("a".into()).unwrap();
        queue.push("b".into()).unwrap();
        assert_eq!(queue.front(), Some("a"));
        assert_eq!(queue.pop_front().as_deref(), Some("a"));
        assert_eq!(queue.pop_front().as_deref(), Some("b"));
        assert!(queue.pop_front().is_none());
    }

    #[test]
    fn rejects_when_full_without_losing_queued() {
        let mut queue = OutboundQueue::new(2);
        queue.push("first".into()).unwrap();
        queue.push("second".into()).unwrap();
        let err = queue.push("third".into()).unwrap_err();
        assert_eq!(err, OutboundError::Full { capacity: 2 });
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.front(), Some("first"));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut queue = OutboundQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        assert!(queue.push("only".into()).is_ok());
        assert!(queue.push("more".into()).is_err());
    }

    #[test]
    fn clear_empties() {
        let mut queue = OutboundQueue::new(3);
        queue.push("x".into()).unwrap();
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn error_display() {
        let err = OutboundError::Full { capacity: 64 };
        assert_eq!(err.to_string(), "outbound queue full (capacity 64)");
    }
}
