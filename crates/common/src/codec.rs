//! Record codec: the one place assets are turned into stored bytes and back.
//!
//! Records are JSON objects with a fixed field order, so re-encoding a decoded
//! record reproduces the same bytes.

use crate::types::Asset;

/// Errors from encoding or decoding an asset record.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode asset {id}: {source}")]
    Encode {
        id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("asset {id} has a non-finite location ({location})")]
    NonFiniteLocation { id: String, location: f64 },
    #[error("malformed asset record at key {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("record at key {key} carries ID {found}")]
    KeyMismatch { key: String, found: String },
}

/// Serialize an asset into its stored form.
///
/// JSON has no encoding for NaN or infinity, so those locations are refused
/// here rather than silently written as `null`.
pub fn encode_asset(asset: &Asset) -> Result<Vec<u8>, CodecError> {
    if !asset.location.is_finite() {
        return Err(CodecError::NonFiniteLocation {
            id: asset.id.clone(),
            location: asset.location,
        });
    }
    serde_json::to_vec(asset).map_err(|source| CodecError::Encode {
        id: asset.id.clone(),
        source,
    })
}

/// Deserialize the value stored under `key`.
///
/// The decoded `ID` must match the key it was stored under.
pub fn decode_asset(key: &str, bytes: &[u8]) -> Result<Asset, CodecError> {
    let asset: Asset = serde_json::from_slice(bytes).map_err(|source| CodecError::Decode {
        key: key.to_string(),
        source,
    })?;
    if asset.id != key {
        return Err(CodecError::KeyMismatch {
            key: key.to_string(),
            found: asset.id,
        });
    }
    Ok(asset)
}
