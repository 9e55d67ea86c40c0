//! Shapes for the `taprootassets` subsystem (owned assets and metadata).

use crate::encoding::{self, int_string, EnumRepr};
use crate::SchemaError;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Asset type. Sent as its numeric code, accepted as code or name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AssetType {
    #[default]
    Normal,
    Collectible,
}

impl AssetType {
    pub fn code(self) -> i32 {
        match self {
            AssetType::Normal => 0,
            AssetType::Collectible => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AssetType::Normal => "NORMAL",
            AssetType::Collectible => "COLLECTIBLE",
        }
    }

    /// Parse a user-facing or wire name, case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "NORMAL" | "ASSET_TYPE_NORMAL" => Some(AssetType::Normal),
            "COLLECTIBLE" | "ASSET_TYPE_COLLECTIBLE" => Some(AssetType::Collectible),
            _ => None,
        }
    }

    fn from_repr(repr: &EnumRepr) -> Option<Self> {
        match repr {
            EnumRepr::Code(0) => Some(AssetType::Normal),
            EnumRepr::Code(1) => Some(AssetType::Collectible),
            EnumRepr::Code(_) => None,
            EnumRepr::Name(name) => Self::from_name(name),
        }
    }
}

impl Serialize for AssetType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.code())
    }
}

impl<'de> Deserialize<'de> for AssetType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = EnumRepr::deserialize(deserializer)?;
        Self::from_repr(&repr)
            .ok_or_else(|| de::Error::custom(format!("unknown asset type {}", repr)))
    }
}

/// Metadata encoding. Only opaque blobs are produced here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum MetaType {
    #[default]
    Opaque,
    Json,
}

impl MetaType {
    pub fn code(self) -> i32 {
        match self {
            MetaType::Opaque => 0,
            MetaType::Json => 1,
        }
    }
}

impl Serialize for MetaType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.code())
    }
}

impl<'de> Deserialize<'de> for MetaType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match EnumRepr::deserialize(deserializer)? {
            EnumRepr::Code(0) => Ok(MetaType::Opaque),
            EnumRepr::Code(1) => Ok(MetaType::Json),
            EnumRepr::Name(name) if name == "META_TYPE_OPAQUE" => Ok(MetaType::Opaque),
            EnumRepr::Name(name) if name == "META_TYPE_JSON" => Ok(MetaType::Json),
            other => Err(de::Error::custom(format!("unknown meta type {}", other))),
        }
    }
}

/// Metadata blob attached to an asset. `data` is base64.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetMeta {
    #[serde(default)]
    pub data: String,
    #[serde(rename = "type", default)]
    pub meta_type: MetaType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub meta_hash: String,
}

impl AssetMeta {
    /// An opaque blob carrying `text`; an empty text yields empty data.
    pub fn opaque_text(text: &str) -> Self {
        Self {
            data: encoding::encode_text(text),
            meta_type: MetaType::Opaque,
            meta_hash: String::new(),
        }
    }

    /// Decode the blob into text; `None` when it is empty.
    pub fn decode_text(&self) -> Result<Option<String>, SchemaError> {
        encoding::decode_text(&self.data)
    }
}

/// Asset encoding version. Sent as its numeric code, accepted as code or name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AssetVersion {
    #[default]
    V0,
    V1,
}

impl AssetVersion {
    pub fn code(self) -> i32 {
        match self {
            AssetVersion::V0 => 0,
            AssetVersion::V1 => 1,
        }
    }
}

impl Serialize for AssetVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.code())
    }
}

impl<'de> Deserialize<'de> for AssetVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match EnumRepr::deserialize(deserializer)? {
            EnumRepr::Code(0) => Ok(AssetVersion::V0),
            EnumRepr::Code(1) => Ok(AssetVersion::V1),
            EnumRepr::Name(name) if name == "ASSET_VERSION_V0" => Ok(AssetVersion::V0),
            EnumRepr::Name(name) if name == "ASSET_VERSION_V1" => Ok(AssetVersion::V1),
            other => Err(de::Error::custom(format!("unknown asset version {}", other))),
        }
    }
}

/// Genesis identity of an asset. Byte fields are base64.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisInfo {
    #[serde(default)]
    pub genesis_point: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub meta_hash: String,
    #[serde(default)]
    pub asset_id: String,
    /// Hex form of `asset_id`, reported by newer nodes.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub asset_id_str: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_type: Option<AssetType>,
    #[serde(default)]
    pub output_index: u32,
}

impl GenesisInfo {
    /// Asset id as hex, as used in path parameters. Prefers the node's own
    /// hex form over converting `asset_id`.
    pub fn asset_id_hex(&self) -> Option<String> {
        let reported = self.asset_id_str.trim();
        if !reported.is_empty() {
            return Some(reported.to_ascii_lowercase());
        }
        if self.asset_id.is_empty() {
            return None;
        }
        encoding::base64_to_hex(&self.asset_id).ok()
    }
}

/// An owned asset as reported by `ListAssets`, plus decoded metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    #[serde(default)]
    pub version: AssetVersion,
    #[serde(default)]
    pub asset_genesis: GenesisInfo,
    #[serde(default)]
    pub asset_type: AssetType,
    #[serde(default, with = "int_string")]
    pub amount: u64,
    #[serde(default)]
    pub is_spent: bool,
    /// Filled in after a metadata fetch; never sent by the node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decoded_meta: Option<String>,
}

impl Asset {
    /// Effective type: newer nodes report it inside the genesis.
    pub fn kind(&self) -> AssetType {
        self.asset_genesis.asset_type.unwrap_or(self.asset_type)
    }

    pub fn name(&self) -> &str {
        &self.asset_genesis.name
    }
}

/// Query for `ListAssets`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListAssetsRequest {
    pub with_witness: bool,
    pub include_spent: bool,
    pub include_leased: bool,
    pub include_unconfirmed_mints: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListAssetsResponse {
    #[serde(default)]
    pub assets: Vec<Asset>,
}

/// `FetchAssetMeta` keyed by hex asset id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchAssetMetaRequest {
    pub asset_id_str: String,
}
