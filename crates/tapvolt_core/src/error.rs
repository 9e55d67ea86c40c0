//! Error types and user-facing error messages.

use lnc_adapter::NodeError;
use session_store::SessionStoreError;
use tap_schema::SchemaError;
use thiserror::Error;

/// Input rejected before any request reaches the node.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Pairing phrase is required")]
    MissingPairingPhrase,
    #[error("Password is required")]
    MissingPassword,
    #[error("Asset name is required")]
    MissingName,
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{0} must be a positive integer")]
    NotPositiveInteger(&'static str),
    #[error("{0} must be hex")]
    InvalidHex(&'static str),
    #[error("Peer address must look like pubkey@host:port")]
    InvalidPeerAddress,
}

impl From<SchemaError> for ValidationError {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::Empty(field) => ValidationError::Missing(field),
            SchemaError::InvalidHex { field, .. } => ValidationError::InvalidHex(field),
            SchemaError::InvalidPeerAddress(_) => ValidationError::InvalidPeerAddress,
            SchemaError::InvalidBase64(_) => ValidationError::InvalidHex("value"),
        }
    }
}

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("not connected to a node")]
    NotConnected,
    #[error("a connection attempt is already in progress")]
    Busy,
    #[error("connection attempt was cancelled by a logout")]
    Superseded,
    #[error("no stored session to log in to")]
    NoStoredSession,
    #[error("Invalid password")]
    InvalidPassword,
    /// Connection failure, already translated for display.
    #[error("{0}")]
    Connection(String),
    #[error("node error: {0}")]
    Node(#[from] NodeError),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("session store error: {0}")]
    Store(#[from] SessionStoreError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Translate a node failure into a message for the person at the keyboard.
pub fn friendly_message(message: &str) -> String {
    let lower = message.to_ascii_lowercase();
    if lower.contains("wallet locked") {
        "Wallet is locked - unlock it first".to_string()
    } else if lower.contains("expected 1 macaroon") {
        "Invalid password".to_string()
    } else if lower.contains("stream not found") {
        "Invalid or expired pairing phrase".to_string()
    } else {
        format!("Unable to reach node: {}", message)
    }
}

/// Friendly message for a failed connect or probe.
pub(crate) fn connection_failure(err: &DashboardError) -> String {
    match err {
        DashboardError::Node(node) => friendly_message(&node.message()),
        DashboardError::Connection(message) => message.clone(),
        other => friendly_message(&other.to_string()),
    }
}
