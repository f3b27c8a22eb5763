use std::sync::Arc;

use tokio::sync::mpsc;

use super::port::Connection;

/// Connection lifecycle event, decoupled from the transport library's native shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connecting,
    Open,
    Closed {
        reason: String,
        /// Logged out / authentication invalidated: never reconnect.
        terminal: bool,
    },
    /// New credential material must be flushed before the next event is handled.
    CredentialsUpdated,
}

impl ConnectionEvent {
    pub fn closed(reason: impl Into<String>, terminal: bool) -> Self {
        ConnectionEvent::Closed {
            reason: reason.into(),
            terminal,
        }
    }
}

/// A freshly opened transport session: the connection handle plus its event stream.
pub struct OpenedSession {
    pub connection: Arc<dyn Connection>,
    pub events: mpsc::Receiver<ConnectionEvent>,
}
