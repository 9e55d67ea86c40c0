//! Session event delivery.
//!
//! Client libraries report session changes in different ways: some emit typed
//! events, others push status strings to a subscriber. [`EventFeed`] wraps
//! each mechanism in one variant so consumers read a single stream of
//! [`ConnectionEvent`]s regardless of the connector.

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

/// Capacity of the broadcast channel behind an [`EventEmitter`].
const EMITTER_CAPACITY: usize = 32;

/// A change in the state of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected,
    Error(String),
}

/// Parse a status string (`"connected"`, `"disconnected"`, `"error: ..."`).
pub fn parse_status(status: &str) -> Option<ConnectionEvent> {
    let status = status.trim();
    if status.eq_ignore_ascii_case("connected") {
        return Some(ConnectionEvent::Connected);
    }
    if status.eq_ignore_ascii_case("disconnected") {
        return Some(ConnectionEvent::Disconnected);
    }
    status
        .strip_prefix("error:")
        .map(|msg| ConnectionEvent::Error(msg.trim().to_string()))
}

/// Event stream of one session, one variant per delivery mechanism.
pub enum EventFeed {
    /// Typed events fanned out to every subscriber.
    Emitter(broadcast::Receiver<ConnectionEvent>),
    /// Status strings pushed to a single subscriber.
    StatusStream(mpsc::UnboundedReceiver<String>),
    /// The connector reports nothing.
    Silent,
}

impl EventFeed {
    /// Wait for the next event. `None` once the source is gone.
    pub async fn next(&mut self) -> Option<ConnectionEvent> {
        match self {
            EventFeed::Emitter(rx) => loop {
                match rx.recv().await {
                    Ok(event) => return Some(event),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Dropped {} session events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            },
            EventFeed::StatusStream(rx) => loop {
                let status = rx.recv().await?;
                match parse_status(&status) {
                    Some(event) => return Some(event),
                    None => debug!("Ignoring status update {:?}", status),
                }
            },
            EventFeed::Silent => None,
        }
    }

    /// Name of the delivery mechanism, for logs.
    pub fn mechanism(&self) -> &'static str {
        match self {
            EventFeed::Emitter(_) => "emitter",
            EventFeed::StatusStream(_) => "status-stream",
            EventFeed::Silent => "silent",
        }
    }
}

/// Sending half for connectors that emit typed events.
#[derive(Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<ConnectionEvent>,
}

impl EventEmitter {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EMITTER_CAPACITY);
        Self { tx }
    }

    /// Emit an event; dropped silently when nobody listens.
    pub fn emit(&self, event: ConnectionEvent) {
        debug!("Session event {:?}", event);
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> EventFeed {
        EventFeed::Emitter(self.tx.subscribe())
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status("connected"), Some(ConnectionEvent::Connected));
        assert_eq!(parse_status(" Disconnected "), Some(ConnectionEvent::Disconnected));
        assert_eq!(
            parse_status("error: stream not found"),
            Some(ConnectionEvent::Error("stream not found".to_string()))
        );
        assert_eq!(parse_status("connecting"), None);
    }

    #[tokio::test]
    async fn test_emitter_feed() {
        let emitter = EventEmitter::new();
        let mut feed = emitter.subscribe();
        assert_eq!(feed.mechanism(), "emitter");

        emitter.emit(ConnectionEvent::Connected);
        emitter.emit(ConnectionEvent::Disconnected);
        assert_eq!(feed.next().await, Some(ConnectionEvent::Connected));
        assert_eq!(feed.next().await, Some(ConnectionEvent::Disconnected));

        drop(emitter);
        assert_eq!(feed.next().await, None);
    }

    #[tokio::test]
    async fn test_status_stream_skips_unknown_statuses() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut feed = EventFeed::StatusStream(rx);

        tx.send("pairing".to_string()).unwrap();
        tx.send("connected".to_string()).unwrap();
        drop(tx);

        assert_eq!(feed.next().await, Some(ConnectionEvent::Connected));
        assert_eq!(feed.next().await, None);
    }
}
