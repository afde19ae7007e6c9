//! Slice codecs
//!
//! A codec turns one slice state into the transport string stored in a
//! [`SliceRecord`](crate::SliceRecord) payload and back. Decoders run after
//! the codec on load and may reshape the parsed state.

use serde_json::Value;

/// Boxed error returned by codecs and decoders
pub type CodecError = Box<dyn std::error::Error + Send + Sync>;

/// Encodes and decodes a single slice payload
pub trait SliceCodec: Send + Sync {
    fn encode(&self, value: &Value) -> Result<String, CodecError>;

    fn decode(&self, payload: &str) -> Result<Value, CodecError>;
}

/// Default codec: compact JSON text
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl SliceCodec for JsonCodec {
    fn encode(&self, value: &Value) -> Result<String, CodecError> {
        Ok(serde_json::to_string(value)?)
    }

    fn decode(&self, payload: &str) -> Result<Value, CodecError> {
        Ok(serde_json::from_str(payload)?)
    }
}

/// Post-parse transform applied to a restored slice
///
/// Any `Fn(Value) -> Result<Value, CodecError>` closure is a decoder.
pub trait SliceDecoder: Send + Sync {
    fn decode(&self, state: Value) -> Result<Value, CodecError>;
}

impl<F> SliceDecoder for F
where
    F: Fn(Value) -> Result<Value, CodecError> + Send + Sync,
{
    fn decode(&self, state: Value) -> Result<Value, CodecError> {
        self(state)
    }
}
