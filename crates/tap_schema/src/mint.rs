//! Shapes for the `mint` subsystem (minting batches).

use crate::assets::{AssetMeta, AssetType};
use crate::encoding::{self, int_string, EnumRepr};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Lifecycle state of a minting batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BatchState {
    #[default]
    Unknown,
    Pending,
    Frozen,
    Committed,
    Broadcast,
    Confirmed,
    Finalized,
    SeedlingCancelled,
    SproutCancelled,
}

impl BatchState {
    const ALL: [BatchState; 9] = [
        BatchState::Unknown,
        BatchState::Pending,
        BatchState::Frozen,
        BatchState::Committed,
        BatchState::Broadcast,
        BatchState::Confirmed,
        BatchState::Finalized,
        BatchState::SeedlingCancelled,
        BatchState::SproutCancelled,
    ];

    pub fn code(self) -> i32 {
        match self {
            BatchState::Unknown => 0,
            BatchState::Pending => 1,
            BatchState::Frozen => 2,
            BatchState::Committed => 3,
            BatchState::Broadcast => 4,
            BatchState::Confirmed => 5,
            BatchState::Finalized => 6,
            BatchState::SeedlingCancelled => 7,
            BatchState::SproutCancelled => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BatchState::Unknown => "BATCH_STATE_UNKNOWN",
            BatchState::Pending => "BATCH_STATE_PENDING",
            BatchState::Frozen => "BATCH_STATE_FROZEN",
            BatchState::Committed => "BATCH_STATE_COMMITTED",
            BatchState::Broadcast => "BATCH_STATE_BROADCAST",
            BatchState::Confirmed => "BATCH_STATE_CONFIRMED",
            BatchState::Finalized => "BATCH_STATE_FINALIZED",
            BatchState::SeedlingCancelled => "BATCH_STATE_SEEDLING_CANCELLED",
            BatchState::SproutCancelled => "BATCH_STATE_SPROUT_CANCELLED",
        }
    }

    /// Not yet broadcast and not cancelled.
    pub fn is_pending(self) -> bool {
        matches!(
            self,
            BatchState::Pending | BatchState::Frozen | BatchState::Committed
        )
    }
}

impl Serialize for BatchState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.code())
    }
}

impl<'de> Deserialize<'de> for BatchState {
    /// States introduced by newer nodes map to `Unknown` rather than failing the listing.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let state = match EnumRepr::deserialize(deserializer)? {
            EnumRepr::Code(code) => Self::ALL.into_iter().find(|s| s.code() as i64 == code),
            EnumRepr::Name(name) => Self::ALL.into_iter().find(|s| s.name() == name),
        };
        Ok(state.unwrap_or_default())
    }
}

/// Asset description submitted by `MintAsset`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintAsset {
    pub asset_version: i32,
    pub asset_type: AssetType,
    pub name: String,
    #[serde(with = "int_string")]
    pub amount: u64,
    pub asset_meta: AssetMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintAssetRequest {
    pub asset: MintAsset,
    pub short_response: bool,
}

/// A draft asset inside a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAsset {
    #[serde(default)]
    pub asset_type: AssetType,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub asset_meta: Option<AssetMeta>,
    #[serde(default, with = "int_string")]
    pub amount: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintingBatch {
    #[serde(default)]
    pub batch_key: String,
    #[serde(default)]
    pub batch_txid: String,
    #[serde(default)]
    pub state: BatchState,
    #[serde(default)]
    pub assets: Vec<PendingAsset>,
}

impl MintingBatch {
    /// Batch key as hex, if present and well-formed.
    pub fn batch_key_hex(&self) -> Option<String> {
        if self.batch_key.is_empty() {
            return None;
        }
        encoding::base64_to_hex(&self.batch_key).ok()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MintAssetResponse {
    #[serde(default)]
    pub pending_batch: Option<MintingBatch>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListBatchesRequest {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub batch_key_str: String,
}

/// One entry of `ListBatches`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerboseBatch {
    #[serde(default)]
    pub batch: Option<MintingBatch>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListBatchesResponse {
    #[serde(default)]
    pub batches: Vec<VerboseBatch>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeBatchRequest {
    pub short_response: bool,
    pub fee_rate: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinalizeBatchResponse {
    #[serde(default)]
    pub batch: Option<MintingBatch>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelBatchRequest {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelBatchResponse {
    #[serde(default)]
    pub batch_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mint_request_shape() {
        let request = MintAssetRequest {
            asset: MintAsset {
                asset_version: 0,
                asset_type: AssetType::Normal,
                name: "MyToken".to_string(),
                amount: 100,
                asset_meta: AssetMeta::opaque_text("desc"),
            },
            short_response: false,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "asset": {
                    "asset_version": 0,
                    "asset_type": 0,
                    "name": "MyToken",
                    "amount": "100",
                    "asset_meta": {"data": "ZGVzYw==", "type": 0}
                },
                "short_response": false
            })
        );
    }

    #[test]
    fn test_batch_state_by_name_and_code() {
        let a: BatchState = serde_json::from_str("\"BATCH_STATE_FROZEN\"").unwrap();
        let b: BatchState = serde_json::from_str("3").unwrap();
        let c: BatchState = serde_json::from_str("\"BATCH_STATE_FROM_THE_FUTURE\"").unwrap();
        assert_eq!(a, BatchState::Frozen);
        assert_eq!(b, BatchState::Committed);
        assert_eq!(c, BatchState::Unknown);
        assert!(a.is_pending() && b.is_pending());
        assert!(!BatchState::Broadcast.is_pending());
        assert!(!BatchState::SeedlingCancelled.is_pending());
    }

    #[test]
    fn test_list_batches_from_gateway_json() {
        let json = r#"{"batches":[{"batch":{
            "batch_key":"yv66vg==",
            "state":"BATCH_STATE_PENDING",
            "assets":[{"asset_type":"NORMAL","name":"a","amount":"5",
                       "asset_meta":{"data":"aGk=","type":"META_TYPE_OPAQUE"}}]
        },"unsealed_assets":[]}]}"#;
        let resp: ListBatchesResponse = serde_json::from_str(json).unwrap();
        let batch = resp.batches[0].batch.as_ref().unwrap();
        assert_eq!(batch.state, BatchState::Pending);
        assert_eq!(batch.batch_key_hex().as_deref(), Some("cafebabe"));
        assert_eq!(batch.assets[0].amount, 5);
    }
}
