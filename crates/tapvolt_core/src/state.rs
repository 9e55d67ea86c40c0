//! Observable dashboard state.

use serde::Serialize;
use tap_schema::{Asset, AssetType, Channel, NodeInfo, Peer};

/// Where the controller is in the session lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Uninitialized,
    Initializing,
    AwaitingCredentials,
    Connecting,
    Connected,
    Disconnected,
    Error,
}

impl ConnectionState {
    /// States from which new credentials may be submitted.
    pub fn accepts_credentials(self) -> bool {
        matches!(
            self,
            ConnectionState::Uninitialized
                | ConnectionState::AwaitingCredentials
                | ConnectionState::Connected
                | ConnectionState::Disconnected
                | ConnectionState::Error
        )
    }
}

/// What is known about the current session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Session {
    pub pairing_phrase_provided: bool,
    pub is_paired: bool,
    pub is_connected: bool,
    pub last_error: Option<String>,
}

/// One asset of a batch that has not been broadcast yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DraftAsset {
    /// Hex batch key.
    pub batch_key: String,
    pub name: String,
    pub amount: u64,
    pub asset_type: AssetType,
    pub decoded_meta: Option<String>,
}

/// Metadata attached to a mint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MintMetadata {
    #[default]
    None,
    Text(String),
    File { file_name: String, bytes: Vec<u8> },
}

/// Mint form as typed by the user. Numbers stay text until validated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MintForm {
    pub name: String,
    pub amount: String,
    pub asset_type: AssetType,
    pub metadata: MintMetadata,
}

/// Asset channel funding form. Identifiers are hex.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FundChannelForm {
    pub asset_id: String,
    pub amount: String,
    pub fee_rate: String,
    pub peer_pubkey: String,
}

/// Outcome shown next to a form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum Feedback {
    #[default]
    None,
    Success(String),
    Error(String),
}

/// Which form a feedback message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FeedbackSlot {
    Mint,
    Batch,
    Fund,
    Peer,
}

/// Everything the dashboard presents.
#[derive(Debug, Clone, Default)]
pub struct DashboardState {
    pub connection: ConnectionState,
    /// Bumped whenever `connection` enters or leaves `Connected`.
    pub generation: u64,
    /// Identifies the current connection attempt; bumped when one starts and on logout.
    pub attempt: u64,
    pub session: Option<Session>,

    pub node_info: Option<NodeInfo>,
    pub channels: Vec<Channel>,
    pub assets: Vec<Asset>,
    pub pending_batch: Vec<DraftAsset>,
    pub peers: Vec<Peer>,

    pub mint_form: MintForm,
    pub mint_feedback: Feedback,
    pub batch_feedback: Feedback,
    pub fund_form: FundChannelForm,
    pub fund_feedback: Feedback,
    pub peer_address: String,
    pub peer_feedback: Feedback,
}

impl DashboardState {
    /// Move to `next`, keeping the generation and derived data consistent.
    pub(crate) fn transition(&mut self, next: ConnectionState) {
        let was_connected = self.connection == ConnectionState::Connected;
        let now_connected = next == ConnectionState::Connected;
        if was_connected != now_connected {
            self.generation += 1;
        }
        if was_connected && !now_connected {
            self.clear_data();
        }
        if let Some(session) = self.session.as_mut() {
            session.is_connected = now_connected;
        }
        self.connection = next;
    }

    /// Drop everything fetched from the node.
    pub(crate) fn clear_data(&mut self) {
        self.node_info = None;
        self.channels.clear();
        self.assets.clear();
        self.pending_batch.clear();
        self.peers.clear();
    }

    pub(crate) fn feedback_mut(&mut self, slot: FeedbackSlot) -> &mut Feedback {
        match slot {
            FeedbackSlot::Mint => &mut self.mint_feedback,
            FeedbackSlot::Batch => &mut self.batch_feedback,
            FeedbackSlot::Fund => &mut self.fund_feedback,
            FeedbackSlot::Peer => &mut self.peer_feedback,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Connected
    }

    /// Start a new connection attempt, superseding any attempt in flight.
    pub(crate) fn next_attempt(&mut self) -> u64 {
        self.attempt += 1;
        self.attempt
    }

    /// Whether `attempt` is still the one in progress.
    pub(crate) fn is_current_attempt(&self, attempt: u64) -> bool {
        self.attempt == attempt
            && matches!(
                self.connection,
                ConnectionState::Connecting | ConnectionState::Initializing
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_bumps_generation_on_connected_edges() {
        let mut state = DashboardState::default();
        state.transition(ConnectionState::Connecting);
        assert_eq!(state.generation, 0);
        state.transition(ConnectionState::Connected);
        assert_eq!(state.generation, 1);
        state.transition(ConnectionState::Disconnected);
        assert_eq!(state.generation, 2);
    }

    #[test]
    fn test_leaving_connected_clears_data() {
        let mut state = DashboardState {
            session: Some(Session::default()),
            ..DashboardState::default()
        };
        state.transition(ConnectionState::Connected);
        state.node_info = Some(NodeInfo::default());
        state.channels.push(Channel::default());
        state.peers.push(Peer::default());
        assert!(state.session.as_ref().unwrap().is_connected);

        state.transition(ConnectionState::Disconnected);
        assert!(state.node_info.is_none());
        assert!(state.channels.is_empty());
        assert!(state.peers.is_empty());
        assert!(!state.session.as_ref().unwrap().is_connected);
    }

    #[test]
    fn test_feedback_serializes_tagged() {
        let json = serde_json::to_value(Feedback::Error("nope".to_string())).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "error", "message": "nope"}));
    }
}
