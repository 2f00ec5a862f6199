//! Conversion between typed payloads and message body strings.
//!
//! A [`Codec`] is pure and stateless per call. Decode failures are reported as
//! [`CodecError::Decode`] and drive the receiver's retry path; they are never
//! swallowed.

use crate::error::CodecError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;

/// Bidirectional conversion between a payload type and its wire string
pub trait Codec<F>: Send + Sync {
    /// Parse a message body into a payload
    fn decode(&self, raw: &str) -> Result<F, CodecError>;

    /// Render a payload as a message body
    fn encode(&self, value: &F) -> Result<String, CodecError>;
}

/// JSON codec backed by serde
pub struct JsonCodec<F> {
    _payload: PhantomData<fn() -> F>,
}

impl<F> JsonCodec<F> {
    pub fn new() -> Self {
        Self {
            _payload: PhantomData,
        }
    }
}

impl<F> Default for JsonCodec<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F> Clone for JsonCodec<F> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<F> fmt::Debug for JsonCodec<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonCodec").finish()
    }
}

impl<F> Codec<F> for JsonCodec<F>
where
    F: Serialize + DeserializeOwned,
{
    fn decode(&self, raw: &str) -> Result<F, CodecError> {
        serde_json::from_str(raw).map_err(|e| CodecError::Decode {
            message: e.to_string(),
        })
    }

    fn encode(&self, value: &F) -> Result<String, CodecError> {
        serde_json::to_string(value).map_err(|e| CodecError::Encode {
            message: e.to_string(),
        })
    }
}

/// Identity codec for plain string payloads
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

impl Codec<String> for TextCodec {
    fn decode(&self, raw: &str) -> Result<String, CodecError> {
        Ok(raw.to_string())
    }

    fn encode(&self, value: &String) -> Result<String, CodecError> {
        Ok(value.clone())
    }
}

impl<F, C> Codec<F> for std::sync::Arc<C>
where
    C: Codec<F> + ?Sized,
{
    fn decode(&self, raw: &str) -> Result<F, CodecError> {
        (**self).decode(raw)
    }

    fn encode(&self, value: &F) -> Result<String, CodecError> {
        (**self).encode(value)
    }
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
