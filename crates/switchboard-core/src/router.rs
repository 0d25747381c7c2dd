//! Inbound message routing.
//!
//! [`MessageRouter`] maps one complete inbound text message to zero or one
//! reply. It is a lookup table keyed by the exact, case-sensitive message
//! text, so new commands are added by registering a handler rather than by
//! touching the session or coordinator code.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reply produced for a recognized command.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    /// Sent verbatim.
    Text(String),
    /// Sent as compact JSON.
    Json(Value),
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Wire form of the reply.
    pub fn encode(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Json(value) => value.to_string(),
        }
    }
}

/// Structured reply to the `Hello?` greeting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Greeting {
    pub message: String,
}

impl Greeting {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<Greeting> for Reply {
    fn from(greeting: Greeting) -> Self {
        Self::Json(serde_json::json!({ "message": greeting.message }))
    }
}

/// Handler invoked with the full inbound message.
pub type Handler = Arc<dyn Fn(&str) -> Reply + Send + Sync>;

/// Command table mapping exact message text to a reply handler.
///
/// Handlers must be pure: the router is shared by every session and called
/// without locking.
#[derive(Clone)]
pub struct MessageRouter {
    routes: HashMap<String, Handler>,
}

impl MessageRouter {
    /// Router with no commands; every message routes to `None`.
    pub fn empty() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with_route<F>(mut self, command: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&str) -> Reply + Send + Sync + 'static,
    {
        let _ = self.register(command, handler);
        self
    }

    /// Register a handler, returning the one it replaced.
    pub fn register<F>(&mut self, command: impl Into<String>, handler: F) -> Option<Handler>
    where
        F: Fn(&str) -> Reply + Send + Sync + 'static,
    {
        self.routes.insert(command.into(), Arc::new(handler))
    }

    /// Map an inbound message to its reply, if the message is a known command.
    pub fn route(&self, message: &str) -> Option<Reply> {
        self.routes.get(message).map(|handler| handler(message))
    }

    pub fn is_recognized(&self, message: &str) -> bool {
        self.routes.contains_key(message)
    }

    /// Registered commands, sorted.
    pub fn commands(&self) -> Vec<&str> {
        let mut commands: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        commands.sort_unstable();
        commands
    }
}

impl Default for MessageRouter {
    /// The built-in command set: `PING` and `Hello?`.
    fn default() -> Self {
        Self::empty()
            .with_route("PING", |_| Reply::text("PONG"))
            .with_route("Hello?", |_| Greeting::new("Hi!").into())
    }
}

impl fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageRouter")
            .field("commands", &self.commands())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    #[test]
    fn ping_routes_to_pong() {
        let router = MessageRouter::default();
        assert_eq!(router.route("PING"), Some(Reply::text("PONG")));
        assert_eq!(router.route("PING").unwrap().encode(), "PONG");
    }

    #[test]
    fn hello_routes_to_greeting_json() {
        let router = MessageRouter::default();
        let reply = router.route("Hello?").unwrap();
        assert_matches!(reply, Reply::Json(_));
        let wire = reply.encode();
        assert_eq!(wire, r#"{"message":"Hi!"}"#);
        let decoded: Greeting = serde_json::from_str(&wire).unwrap();
        assert_eq!(decoded, Greeting::new("Hi!"));
    }

    #[test]
    fn unknown_message_has_no_reply() {
        let router = MessageRouter::default();
        assert_eq!(router.route("xyz123"), None);
        assert_eq!(router.route(""), None);
    }

    #[test]
    fn matching_is_case_sensitive_and_exact() {
        let router = MessageRouter::default();
        assert_eq!(router.route("ping"), None);
        assert_eq!(router.route("PING "), None);
        assert_eq!(router.route("hello?"), None);
        assert_eq!(router.route("Hello"), None);
    }

    #[test]
    fn empty_router_recognizes_nothing() {
        let router = MessageRouter::empty();
        assert!(router.commands().is_empty());
        assert_eq!(router.route("PING"), None);
    }

    #[test]
    fn new_commands_extend_the_table() {
        let router = MessageRouter::default().with_route("TIME?", |_| Reply::text("now"));
        assert_eq!(router.commands(), vec!["Hello?", "PING", "TIME?"]);
        assert_eq!(router.route("TIME?"), Some(Reply::text("now")));
        assert!(router.is_recognized("PING"));
    }

    #[test]
    fn register_returns_replaced_handler() {
        let mut router = MessageRouter::default();
        let previous = router.register("PING", |_| Reply::text("PONG!"));
        assert!(previous.is_some());
        assert_eq!(router.route("PING"), Some(Reply::text("PONG!")));
        assert!(router.register("NEW", |m| Reply::text(m)).is_none());
    }

    #[test]
    fn handler_sees_the_message() {
        let router = MessageRouter::empty().with_route("echo", |m| Reply::text(m.to_uppercase()));
        assert_eq!(router.route("echo"), Some(Reply::text("ECHO")));
    }

    #[test]
    fn debug_lists_commands() {
        let debug = format!("{:?}", MessageRouter::default());
        assert!(debug.contains("PING"));
        assert!(debug.contains("Hello?"));
    }

    #[test]
    fn router_is_shareable_across_threads() {
        let router = Arc::new(MessageRouter::default());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let router = Arc::clone(&router);
                std::thread::spawn(move || router.route("PING"))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), Some(Reply::text("PONG")));
        }
    }

    proptest! {
        #[test]
        fn route_is_deterministic(message in ".{0,32}") {
            let router = MessageRouter::default();
            prop_assert_eq!(router.route(&message), router.route(&message));
        }

        #[test]
        fn only_known_commands_reply(message in ".{0,32}") {
            let router = MessageRouter::default();
            let known = message == "PING" || message == "Hello?";
            prop_assert_eq!(router.route(&message).is_some(), known);
        }
    }
}
