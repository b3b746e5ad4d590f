//! Shared types for the shiptrack registry: the asset record, its sensor
//! fields, transaction ids, and the record codec.

pub mod codec;
pub mod types;

pub use codec::{CodecError, decode_asset, encode_asset};
pub use types::{Asset, AssetFields, TxId};
