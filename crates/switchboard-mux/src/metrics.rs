//! Metric names recorded by the coordinator.
//!
//! Recording goes through the `metrics` facade; the binary decides which
//! recorder (if any) is installed.

/// Sessions admitted into the registry (counter).
pub const SESSIONS_ADMITTED_TOTAL: &str = "mux_sessions_admitted_total";
/// Sessions closed and reaped (counter, labels: reason).
pub const SESSIONS_CLOSED_TOTAL: &str = "mux_sessions_closed_total";
/// Inbound text messages received (counter, labels: recognized).
pub const MESSAGES_RECEIVED_TOTAL: &str = "mux_messages_received_total";
/// Outbound messages written (counter).
pub const REPLIES_WRITTEN_TOTAL: &str = "mux_replies_written_total";
/// Failed reads, clean closes included (counter, labels: error_kind).
pub const READ_FAILURES_TOTAL: &str = "mux_read_failures_total";
/// Failed writes and pings (counter, labels: error_kind).
pub const WRITE_FAILURES_TOTAL: &str = "mux_write_failures_total";
/// Live sessions (gauge).
pub const SESSIONS_LIVE: &str = "mux_sessions_live";
/// Session lifetime from admission to close (histogram).
pub const SESSION_DURATION_SECONDS: &str = "mux_session_duration_seconds";
