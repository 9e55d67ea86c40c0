//! Connector boundary for a remote Lightning / Taproot Assets node.
//!
//! The node is reached through a client library that owns the transport and
//! session cryptography. This crate expresses what the rest of the workspace
//! needs from such a library as traits:
//! - [`NodeConnector`]: session lifecycle (connect, readiness probes, disconnect)
//!   and the event-delivery mechanism of the session
//! - one trait per remote subsystem ([`Lightning`], [`TaprootAssets`], [`Mint`],
//!   [`TapChannels`]), each a set of async request/response calls
//!
//! Two implementations are provided: [`rest::RestConnector`] talks to a node's
//! REST gateway, [`memory::MemoryNode`] is an in-memory node for tests and demos.

use async_trait::async_trait;
use std::fmt;
use tap_schema::{
    AssetMeta, CancelBatchRequest, CancelBatchResponse, ConnectPeerRequest, ConnectPeerResponse,
    FetchAssetMetaRequest, FinalizeBatchRequest, FinalizeBatchResponse, FundChannelRequest,
    FundChannelResponse, ListAssetsRequest, ListAssetsResponse, ListBatchesRequest,
    ListBatchesResponse, ListChannelsResponse, ListPeersResponse, MintAssetRequest,
    MintAssetResponse, NodeInfo,
};
use thiserror::Error;

pub mod events;
pub mod memory;
pub mod rest;

pub use events::{ConnectionEvent, EventEmitter, EventFeed};
pub use memory::MemoryNode;
pub use rest::{RestConfig, RestConnector};

/// Errors that can occur when talking to the node.
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("RPC error: code={code}, message={message}")]
    Rpc { code: i64, message: String },
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("connection rejected: {0}")]
    Rejected(String),
    #[error("not connected")]
    NotConnected,
}

impl NodeError {
    /// Message reported by the node, without transport decoration.
    pub fn message(&self) -> String {
        match self {
            NodeError::Rpc { message, .. } => message.clone(),
            NodeError::Rejected(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Secrets used to establish a session.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub pairing_phrase: String,
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(pairing_phrase: impl Into<String>) -> Self {
        Self {
            pairing_phrase: pairing_phrase.into(),
            password: None,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("pairing_phrase", &"<redacted>")
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Node info, channel and peer calls.
#[async_trait]
pub trait Lightning: Send + Sync {
    async fn get_info(&self) -> Result<NodeInfo, NodeError>;
    async fn list_channels(&self) -> Result<ListChannelsResponse, NodeError>;
    async fn list_peers(&self) -> Result<ListPeersResponse, NodeError>;
    async fn connect_peer(
        &self,
        request: &ConnectPeerRequest,
    ) -> Result<ConnectPeerResponse, NodeError>;
}

/// Owned asset listing and metadata calls.
#[async_trait]
pub trait TaprootAssets: Send + Sync {
    async fn list_assets(&self, request: &ListAssetsRequest)
        -> Result<ListAssetsResponse, NodeError>;
    async fn fetch_asset_meta(&self, request: &FetchAssetMetaRequest)
        -> Result<AssetMeta, NodeError>;
}

/// Minting batch calls.
#[async_trait]
pub trait Mint: Send + Sync {
    async fn mint_asset(&self, request: &MintAssetRequest) -> Result<MintAssetResponse, NodeError>;
    async fn finalize_batch(
        &self,
        request: &FinalizeBatchRequest,
    ) -> Result<FinalizeBatchResponse, NodeError>;
    async fn cancel_batch(
        &self,
        request: &CancelBatchRequest,
    ) -> Result<CancelBatchResponse, NodeError>;
    async fn list_batches(
        &self,
        request: &ListBatchesRequest,
    ) -> Result<ListBatchesResponse, NodeError>;
}

/// Asset channel calls.
#[async_trait]
pub trait TapChannels: Send + Sync {
    async fn fund_channel(
        &self,
        request: &FundChannelRequest,
    ) -> Result<FundChannelResponse, NodeError>;
}

/// A session with a remote node.
#[async_trait]
pub trait NodeConnector: Send + Sync {
    /// Establish a session with the given credentials.
    async fn connect(&self, credentials: &Credentials) -> Result<(), NodeError>;

    /// Session established and usable for calls.
    fn is_ready(&self) -> bool;

    /// Pairing material is present.
    fn is_paired(&self) -> bool;

    /// Transport currently connected.
    fn is_connected(&self) -> bool;

    /// Terminate the session and forget its pairing material.
    fn disconnect(&self);

    /// Subscribe to session events, in whichever way this connector delivers them.
    fn events(&self) -> EventFeed;

    fn lightning(&self) -> &dyn Lightning;
    fn taproot_assets(&self) -> &dyn TaprootAssets;
    fn mint(&self) -> &dyn Mint;
    fn tap_channels(&self) -> &dyn TapChannels;
}
