//! Wire schema for Lightning and Taproot Assets node calls.
//!
//! This crate defines the request and response shapes exchanged with a node's
//! `lightning`, `taprootassets`, `mint` and `tapchannels` subsystems. Field
//! names, string-encoded 64-bit integers, base64 byte fields and enums that
//! arrive either as numbers or as names all follow the node's JSON mapping,
//! so requests built here are accepted unchanged.

use thiserror::Error;

pub mod assets;
pub mod channels;
pub mod encoding;
pub mod lightning;
pub mod mint;

pub use assets::{
    Asset, AssetMeta, AssetType, AssetVersion, FetchAssetMetaRequest, GenesisInfo,
    ListAssetsRequest, ListAssetsResponse, MetaType,
};
pub use channels::{FundChannelRequest, FundChannelResponse};
pub use lightning::{
    Chain, Channel, ConnectPeerRequest, ConnectPeerResponse, LightningAddress,
    ListChannelsResponse, ListPeersResponse, NodeInfo, Peer,
};
pub use mint::{
    BatchState, CancelBatchRequest, CancelBatchResponse, FinalizeBatchRequest,
    FinalizeBatchResponse, ListBatchesRequest, ListBatchesResponse, MintAsset,
    MintAssetRequest, MintAssetResponse, MintingBatch, PendingAsset, VerboseBatch,
};

/// Errors that can occur while building or decoding wire values.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("invalid hex in {field}: {source}")]
    InvalidHex {
        field: &'static str,
        #[source]
        source: hex::FromHexError,
    },
    #[error("invalid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("invalid peer address {0:?}: expected pubkey@host:port")]
    InvalidPeerAddress(String),
}
