//! Shapes for the `lightning` subsystem (node info, channels, peers).

use crate::encoding::int_string;
use crate::SchemaError;
use serde::{Deserialize, Serialize};

/// A chain/network pair the node is running on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    #[serde(default)]
    pub chain: String,
    #[serde(default)]
    pub network: String,
}

/// Snapshot returned by `GetInfo`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub identity_pubkey: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub block_height: u32,
    #[serde(default)]
    pub synced_to_chain: bool,
    #[serde(default)]
    pub synced_to_graph: bool,
    #[serde(default)]
    pub num_active_channels: u32,
    #[serde(default)]
    pub num_peers: u32,
    #[serde(default)]
    pub chains: Vec<Chain>,
}

impl NodeInfo {
    /// Network of the first reported chain (e.g. "mainnet", "regtest").
    pub fn network(&self) -> Option<&str> {
        self.chains
            .first()
            .map(|c| c.network.as_str())
            .filter(|n| !n.is_empty())
    }
}

/// A channel as reported by `ListChannels`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub remote_pubkey: String,
    #[serde(default)]
    pub channel_point: String,
    #[serde(default, with = "int_string")]
    pub chan_id: u64,
    #[serde(default, with = "int_string")]
    pub capacity: i64,
    #[serde(default, with = "int_string")]
    pub local_balance: i64,
    #[serde(default, with = "int_string")]
    pub remote_balance: i64,
    #[serde(default)]
    pub private: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListChannelsResponse {
    #[serde(default)]
    pub channels: Vec<Channel>,
}

/// A connected peer as reported by `ListPeers`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    #[serde(default)]
    pub pub_key: String,
    #[serde(default)]
    pub address: String,
    #[serde(default, with = "int_string")]
    pub bytes_sent: u64,
    #[serde(default, with = "int_string")]
    pub bytes_recv: u64,
    #[serde(default)]
    pub inbound: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListPeersResponse {
    #[serde(default)]
    pub peers: Vec<Peer>,
}

/// `pubkey@host:port` split into its parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightningAddress {
    pub pubkey: String,
    pub host: String,
}

impl LightningAddress {
    /// Parse a `pubkey@host:port` string.
    pub fn parse(address: &str) -> Result<Self, SchemaError> {
        let trimmed = address.trim();
        match trimmed.split_once('@') {
            Some((pubkey, host))
                if !pubkey.is_empty() && !host.is_empty() && !host.contains('@') =>
            {
                Ok(Self {
                    pubkey: pubkey.to_string(),
                    host: host.to_string(),
                })
            }
            _ => Err(SchemaError::InvalidPeerAddress(trimmed.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectPeerRequest {
    pub addr: LightningAddress,
    pub perm: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectPeerResponse {}
