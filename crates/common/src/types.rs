use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of the transaction an operation runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxId(pub Uuid);

impl TxId {
    /// A fresh random transaction id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TxId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Sensor readings carried by a shipment record.
///
/// This is the replaceable part of an [`Asset`]: create and update both take
/// a full set of fields.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AssetFields {
    pub temperature: i64,
    pub humidity: i64,
    pub vibration: i64,
    pub shock: bool,
    pub location: f64,
}

/// A single registry record, keyed in the world state by its `id`.
///
/// Field names on the wire are PascalCase (`ID`, `Temperature`, ...). `Owner`
/// is always present in the stored form and is `null` until the first
/// transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Asset {
    #[serde(rename = "ID")]
    pub id: String,
    pub temperature: i64,
    pub humidity: i64,
    pub vibration: i64,
    pub shock: bool,
    pub location: f64,
    #[serde(default)]
    pub owner: Option<String>,
}

impl Asset {
    /// Build an unowned record from an id and its sensor fields.
    pub fn new(id: impl Into<String>, fields: AssetFields) -> Self {
        Self {
            id: id.into(),
            temperature: fields.temperature,
            humidity: fields.humidity,
            vibration: fields.vibration,
            shock: fields.shock,
            location: fields.location,
            owner: None,
        }
    }

    /// The sensor fields of this record.
    pub fn fields(&self) -> AssetFields {
        AssetFields {
            temperature: self.temperature,
            humidity: self.humidity,
            vibration: self.vibration,
            shock: self.shock,
            location: self.location,
        }
    }

    /// Replace every sensor field, leaving `id` and `owner` untouched.
    pub fn set_fields(&mut self, fields: AssetFields) {
        self.temperature = fields.temperature;
        self.humidity = fields.humidity;
        self.vibration = fields.vibration;
        self.shock = fields.shock;
        self.location = fields.location;
    }
}
