//! Shapes for the `tapchannels` subsystem.

use crate::encoding::{self, int_string};
use crate::SchemaError;
use serde::{Deserialize, Serialize};

/// `FundChannel` request. Byte fields carry URL-safe base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundChannelRequest {
    #[serde(with = "int_string")]
    pub asset_amount: u64,
    pub asset_id: String,
    pub peer_pubkey: String,
    pub fee_rate_sat_per_vbyte: u32,
}

impl FundChannelRequest {
    /// Build a request from hex identifiers as typed by a user.
    pub fn from_hex(
        asset_id_hex: &str,
        peer_pubkey_hex: &str,
        asset_amount: u64,
        fee_rate_sat_per_vbyte: u32,
    ) -> Result<Self, SchemaError> {
        Ok(Self {
            asset_amount,
            asset_id: encoding::hex_to_base64_url("asset_id", asset_id_hex)?,
            peer_pubkey: encoding::hex_to_base64_url("peer_pubkey", peer_pubkey_hex)?,
            fee_rate_sat_per_vbyte,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FundChannelResponse {
    #[serde(default)]
    pub txid: String,
    #[serde(default)]
    pub output_index: i32,
}
