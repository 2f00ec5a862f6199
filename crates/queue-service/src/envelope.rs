//! Typed message envelopes and the factory that builds them.

use crate::codec::Codec;
use crate::error::CodecError;
use crate::message::{MessageGroupId, MessageId, QueueKind, RawMessage, ReceiptHandle, SendRequest};
use std::marker::PhantomData;

/// A message paired with its decoded payload
///
/// `plain_content` is the canonical wire form; `content` is always the codec's
/// reading of it. Message ID and receipt handle are only present on envelopes
/// built from a received message.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEnvelope<F> {
    pub content: F,
    pub plain_content: String,
    pub message_id: Option<MessageId>,
    pub receipt_handle: Option<ReceiptHandle>,
    pub message_group_id: Option<MessageGroupId>,
    pub delay_seconds: Option<u32>,
}

impl<F> MessageEnvelope<F> {
    /// Set the FIFO ordering key
    pub fn with_message_group_id(mut self, group_id: MessageGroupId) -> Self {
        self.message_group_id = Some(group_id);
        self
    }

    /// Set the publish delay
    pub fn with_delay_seconds(mut self, delay_seconds: u32) -> Self {
        self.delay_seconds = Some(delay_seconds);
        self
    }

    /// Build the outbound request for a destination of the given kind
    ///
    /// The group key is only carried to FIFO destinations.
    pub fn to_send_request(&self, kind: QueueKind) -> SendRequest {
        let mut request = SendRequest::new(self.plain_content.clone());

        if kind.is_fifo() {
            if let Some(group_id) = &self.message_group_id {
                request = request.with_message_group_id(group_id.clone());
            }
        }

        if let Some(delay) = self.delay_seconds {
            request = request.with_delay_seconds(delay);
        }

        request
    }
}

/// Builds envelopes from received messages or from outbound payloads
pub struct EnvelopeFactory<F, C> {
    codec: C,
    _payload: PhantomData<fn() -> F>,
}

impl<F, C> EnvelopeFactory<F, C>
where
    C: Codec<F>,
{
    pub fn new(codec: C) -> Self {
        Self {
            codec,
            _payload: PhantomData,
        }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Decode path: build an envelope from a message delivered by a transport
    ///
    /// `plain_content` is the raw body unchanged.
    pub fn from_transport_message(
        &self,
        message: &RawMessage,
    ) -> Result<MessageEnvelope<F>, CodecError> {
        let content = self.codec.decode(&message.body)?;

        Ok(MessageEnvelope {
            content,
            plain_content: message.body.clone(),
            message_id: Some(message.message_id.clone()),
            receipt_handle: Some(message.receipt_handle.clone()),
            message_group_id: message.message_group_id(),
            delay_seconds: None,
        })
    }

    /// Encode path: build an envelope for a payload about to be published
    pub fn from_payload(
        &self,
        payload: F,
        message_group_id: Option<MessageGroupId>,
    ) -> Result<MessageEnvelope<F>, CodecError> {
        let plain_content = self.codec.encode(&payload)?;

        Ok(MessageEnvelope {
            content: payload,
            plain_content,
            message_id: None,
            receipt_handle: None,
            message_group_id,
            delay_seconds: None,
        })
    }
}

impl<F, C: Clone> Clone for EnvelopeFactory<F, C> {
    fn clone(&self) -> Self {
        Self {
            codec: self.codec.clone(),
            _payload: PhantomData,
        }
    }
}

impl<F, C: std::fmt::Debug> std::fmt::Debug for EnvelopeFactory<F, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeFactory")
            .field("codec", &self.codec)
            .finish()
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
