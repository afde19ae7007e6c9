//! Registered slice descriptors

use crate::codec::{CodecError, JsonCodec, SliceCodec, SliceDecoder};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Describes one slice tracked by a [`PersistItem`](crate::PersistItem)
#[derive(Clone)]
pub struct SliceDescriptor {
    pub(crate) name: String,
    pub(crate) version: u32,
    pub(crate) codec: Arc<dyn SliceCodec>,
    pub(crate) decoder: Option<Arc<dyn SliceDecoder>>,
    pub(crate) max_age: Option<Duration>,
}

impl SliceDescriptor {
    /// Slice with version 0, the JSON codec and no expiry override
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: 0,
            codec: Arc::new(JsonCodec),
            decoder: None,
            max_age: None,
        }
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn codec(mut self, codec: impl SliceCodec + 'static) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    /// Transform applied to the parsed state before hydration
    pub fn decoder(mut self, decoder: impl SliceDecoder + 'static) -> Self {
        self.decoder = Some(Arc::new(decoder));
        self
    }

    /// Overrides the item-wide default expiry
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expected_version(&self) -> u32 {
        self.version
    }

    pub fn max_age_override(&self) -> Option<Duration> {
        self.max_age
    }

    pub(crate) fn encode(&self, value: &Value) -> Result<String, CodecError> {
        self.codec.encode(value)
    }

    /// Codec parse followed by the optional decoder
    pub(crate) fn decode(&self, payload: &str) -> Result<Value, CodecError> {
        let state = self.codec.decode(payload)?;
        match &self.decoder {
            Some(decoder) => decoder.decode(state),
            None => Ok(state),
        }
    }
}

impl fmt::Debug for SliceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SliceDescriptor")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("has_decoder", &self.decoder.is_some())
            .field("max_age", &self.max_age)
            .finish()
    }
}
