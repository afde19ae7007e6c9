//! Stored document model and wire format
//!
//! ```text
//! { "v": <document version>,
//!   "d": { "<slice>": { "t": <timestamp ms>, "v": <slice version>, "d": "<payload>" } } }
//! ```

use crate::error::{PersistError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Stored unit for one slice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceRecord {
    /// Write time in milliseconds since the Unix epoch
    #[serde(rename = "t")]
    pub timestamp: u64,
    /// Slice schema version the payload was written with
    #[serde(rename = "v")]
    pub version: u32,
    /// Encoded slice state
    #[serde(rename = "d")]
    pub payload: String,
}

impl SliceRecord {
    pub fn new(timestamp: u64, version: u32, payload: impl Into<String>) -> Self {
        Self {
            timestamp,
            version,
            payload: payload.into(),
        }
    }

    /// Age relative to `now`; records from the future count as fresh
    pub fn age_millis(&self, now: u64) -> u64 {
        now.saturating_sub(self.timestamp)
    }
}

/// Stored unit for one storage key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistDocument {
    #[serde(rename = "v")]
    pub version: u32,
    #[serde(rename = "d")]
    pub slices: BTreeMap<String, SliceRecord>,
}

impl PersistDocument {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            slices: BTreeMap::new(),
        }
    }

    /// Parse the wire format
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| PersistError::Parse(e.to_string()))
    }

    /// Serialize to the wire format
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| PersistError::Serialize(e.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&SliceRecord> {
        self.slices.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, record: SliceRecord) {
        self.slices.insert(name.into(), record);
    }
}

/// Document as read back from storage
///
/// Only the envelope is checked up front. Records are parsed one at a time,
/// so a malformed record under one name leaves its siblings readable.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StoredDocument {
    #[serde(rename = "v")]
    pub version: u32,
    #[serde(rename = "d")]
    pub slices: BTreeMap<String, Value>,
}

impl StoredDocument {
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| PersistError::Parse(e.to_string()))
    }

    /// Record stored under `name`; `Decode` error when its shape is wrong
    pub fn record(&self, name: &str) -> Option<Result<SliceRecord>> {
        let raw = self.slices.get(name)?;
        Some(
            SliceRecord::deserialize(raw).map_err(|e| PersistError::Decode {
                slice: name.to_string(),
                reason: format!("malformed record: {}", e),
            }),
        )
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slices.keys().map(String::as_str)
    }
}
