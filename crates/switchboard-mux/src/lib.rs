//! # switchboard-mux
//!
//! Multiplexes many duplex text connections from one coordinating task.
//!
//! - [`admission`]: bounded FIFO handing accepted connections to the coordinator
//! - [`registry::SessionRegistry`]: slot-indexed sessions with free-list reuse
//! - [`session::Session`]: per-connection read/write state machine
//! - [`outbound::OutboundQueue`]: bounded per-session reply FIFO
//! - [`coordinator::Coordinator`]: the control loop (admit, read, flush, reap)
//! - [`events::SessionEvent`]: lifecycle notifications on a broadcast channel

#![deny(unsafe_code)]

pub mod admission;
pub mod coordinator;
pub mod events;
pub mod metrics;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod outbound;
pub mod registry;
pub mod session;

pub use admission::{admission_channel, AdmissionError, AdmissionReceiver, AdmissionSender};
pub use coordinator::{Coordinator, MuxConfig, MuxHandle, MuxStats, TickReport};
pub use events::SessionEvent;
pub use outbound::{OutboundError, OutboundQueue};
pub use registry::{SessionRegistry, SlotId, Visit};
pub use session::{CloseReason, ReadOutcome, Session, SessionState};
