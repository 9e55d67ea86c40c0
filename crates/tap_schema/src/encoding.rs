//! Byte and integer encodings used on the wire.

use crate::SchemaError;
use base64::{
    engine::general_purpose::{STANDARD as BASE64, URL_SAFE as BASE64_URL},
    Engine,
};
use serde::Deserialize;
use std::fmt;

/// Serde adapter for 64-bit integers that the node encodes as decimal strings.
///
/// Serializes as a string; deserializes from either a string or a number.
pub mod int_string {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::fmt::Display;
    use std::str::FromStr;

    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Display,
        S: Serializer,
    {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: FromStr + Deserialize<'de>,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw<T> {
            Text(String),
            Number(T),
        }

        match Raw::<T>::deserialize(deserializer)? {
            Raw::Text(text) if text.is_empty() => "0".parse().map_err(de::Error::custom),
            Raw::Text(text) => text.parse().map_err(de::Error::custom),
            Raw::Number(n) => Ok(n),
        }
    }
}

/// Raw enum value: protobuf JSON allows either the numeric code or the name.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum EnumRepr {
    Code(i64),
    Name(String),
}

impl fmt::Display for EnumRepr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnumRepr::Code(code) => write!(f, "{}", code),
            EnumRepr::Name(name) => write!(f, "{:?}", name),
        }
    }
}

/// Base64-encode UTF-8 text for an opaque metadata blob (empty stays empty).
pub fn encode_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    BASE64.encode(text.as_bytes())
}

/// Decode a base64 byte field, accepting both the standard and URL-safe alphabets.
pub fn decode_bytes(data: &str) -> Result<Vec<u8>, SchemaError> {
    match BASE64.decode(data) {
        Ok(bytes) => Ok(bytes),
        Err(_) => Ok(BASE64_URL.decode(data)?),
    }
}

/// Decode a base64 metadata blob into text.
///
/// Returns `None` for an empty blob. Invalid UTF-8 is replaced lossily since
/// the blob is opaque to the node.
pub fn decode_text(data: &str) -> Result<Option<String>, SchemaError> {
    if data.is_empty() {
        return Ok(None);
    }
    let bytes = decode_bytes(data)?;
    Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
}

/// Convert a hex identifier into the URL-safe base64 the transport expects.
pub fn hex_to_base64_url(field: &'static str, hex_str: &str) -> Result<String, SchemaError> {
    let trimmed = hex_str.trim();
    if trimmed.is_empty() {
        return Err(SchemaError::Empty(field));
    }
    let bytes = hex::decode(trimmed).map_err(|source| SchemaError::InvalidHex { field, source })?;
    Ok(BASE64_URL.encode(bytes))
}

/// Convert a base64 byte field into lowercase hex (for display and path params).
pub fn base64_to_hex(data: &str) -> Result<String, SchemaError> {
    Ok(hex::encode(decode_bytes(data)?))
}

/// Build a `data:` URI for a binary file so it can travel as metadata text.
pub fn data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, BASE64.encode(bytes))
}

/// Guess a MIME type from a file name's extension.
pub fn mime_for_file_name(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "json" => "application/json",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_to_base64_url() {
        assert_eq!(hex_to_base64_url("asset_id", "deadbeef").unwrap(), "3q2-7w==");
        assert_eq!(hex_to_base64_url("peer_pubkey", " cafebabe ").unwrap(), "yv66vg==");
    }

    #[test]
    fn test_hex_to_base64_url_rejects_bad_input() {
        assert!(matches!(
            hex_to_base64_url("asset_id", "   "),
            Err(SchemaError::Empty("asset_id"))
        ));
        assert!(matches!(
            hex_to_base64_url("asset_id", "xyz"),
            Err(SchemaError::InvalidHex { field: "asset_id", .. })
        ));
    }

    #[test]
    fn test_decode_text_accepts_both_alphabets() {
        assert_eq!(decode_text("ZGVzYw==").unwrap().as_deref(), Some("desc"));
        assert_eq!(decode_text("").unwrap(), None);
        // 0xfb 0xff encodes to "-_8=" in the URL-safe alphabet.
        assert_eq!(decode_bytes("-_8=").unwrap(), vec![0xfb, 0xff]);
    }

    #[test]
    fn test_data_uri() {
        let uri = data_uri(mime_for_file_name("Cat.PNG"), b"abc");
        assert_eq!(uri, "data:image/png;base64,YWJj");
        assert_eq!(mime_for_file_name("blob"), "application/octet-stream");
    }

    #[test]
    fn test_int_string_accepts_string_and_number() {
        #[derive(serde::Deserialize, serde::Serialize)]
        struct Amount {
            #[serde(with = "int_string")]
            amount: u64,
        }

        let a: Amount = serde_json::from_str(r#"{"amount":"42"}"#).unwrap();
        let b: Amount = serde_json::from_str(r#"{"amount":42}"#).unwrap();
        assert_eq!(a.amount, 42);
        assert_eq!(b.amount, 42);
        assert_eq!(serde_json::to_string(&a).unwrap(), r#"{"amount":"42"}"#);
    }
}
