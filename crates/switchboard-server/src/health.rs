//! `/health` endpoint.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;
use switchboard_mux::MuxStats;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Wall-clock start time.
    pub started_at: DateTime<Utc>,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Live websocket sessions.
    pub connections: usize,
    /// Sessions admitted since startup.
    pub sessions_admitted: u64,
    /// Sessions closed since startup.
    pub sessions_closed: u64,
}

/// Build a health response from the multiplexer counters.
pub fn health_check(start_time: Instant, started_at: DateTime<Utc>, stats: &MuxStats) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        started_at,
        uptime_secs: start_time.elapsed().as_secs(),
        connections: stats.live(),
        sessions_admitted: stats.admitted(),
        sessions_closed: stats.closed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_ok_with_zero_counters() {
        let resp = health_check(Instant::now(), Utc::now(), &MuxStats::default());
        assert_eq!(resp.status, "ok");
        assert!(resp.uptime_secs < 2);
        assert_eq!(resp.connections, 0);
        assert_eq!(resp.sessions_admitted, 0);
    }

    #[test]
    fn uptime_increases() {
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        let resp = health_check(start, Utc::now(), &MuxStats::default());
        assert!(resp.uptime_secs >= 59);
    }

    #[test]
    fn serialization() {
        let resp = health_check(Instant::now(), Utc::now(), &MuxStats::default());
        let parsed = serde_json::to_value(&resp).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 0);
        assert_eq!(parsed["sessions_closed"], 0);
        assert!(parsed["uptime_secs"].is_number());
        let started = parsed["started_at"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(started).is_ok());
    }
}
