//! # switchboard-core
//!
//! Shared building blocks for the session multiplexer:
//!
//! - [`ids::ConnectionId`]: prefixed identifier attached to every accepted connection
//! - [`errors::TransportError`]: failure taxonomy for reads and writes
//! - [`transport`]: the abstract duplex connection the multiplexer drives
//! - [`router::MessageRouter`]: inbound text message to optional reply

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod router;
pub mod transport;

pub use errors::TransportError;
pub use ids::ConnectionId;
pub use router::{Greeting, MessageRouter, Reply};
pub use transport::{Connection, Inbound, MessageReader, MessageWriter};
