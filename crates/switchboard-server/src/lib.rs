//! # switchboard-server
//!
//! Axum front end for the session multiplexer.
//!
//! - `GET /`: websocket upgrade into the admission queue, or the static client page
//! - `GET /client.js`: the static client script
//! - `GET /health`, `GET /metrics`: liveness and Prometheus text
//! - Graceful shutdown via [`ShutdownCoordinator`]

#![deny(unsafe_code)]

pub mod assets;
pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use error::ServerError;
pub use server::{AppState, RunningServer, SwitchboardServer};
pub use shutdown::ShutdownCoordinator;
