//! # Queue Service
//!
//! Typed message distribution and redelivery engine for SQS queues and SNS
//! topics.
//!
//! This library provides:
//! - Pluggable codecs turning typed payloads into message bodies and back
//! - Envelopes that carry a decoded payload with its delivery metadata
//! - A distributor that publishes one payload to one queue or topic, adding
//!   the message group only where the destination is FIFO
//! - A receiver that decodes and handles each received message, deletes it
//!   on success and schedules redelivery through the visibility timeout on
//!   failure
//! - Unwrapping of topic notifications delivered to subscribed queues
//!
//! ## Module Organization
//!
//! - [`codec`] - Payload codecs
//! - [`envelope`] - Message envelope and factory
//! - [`distributor`] - Publishing side
//! - [`receiver`] - Consuming side and message handlers
//! - [`notification`] - Topic notification envelope and unwrapping
//! - [`retry`] - Redelivery delay policy
//! - [`signature`] - SNS notification signature verification
//! - [`transport`] - Transport, publisher and preprocessor traits
//! - [`providers`] - SQS, SNS and in-memory transports
//! - [`config`] - Queue and topic connection settings
//! - [`message`] - Identifiers and raw transport messages
//! - [`error`] - Error types for all operations

pub mod codec;
pub mod config;
pub mod distributor;
pub mod envelope;
pub mod error;
pub mod message;
pub mod notification;
pub mod providers;
pub mod receiver;
pub mod retry;
pub mod signature;
pub mod transport;

// Re-export commonly used types at crate root for convenience
pub use codec::{Codec, JsonCodec, TextCodec};
pub use config::{AwsCredentials, QueueConfiguration, TopicConfiguration};
pub use distributor::Distributor;
pub use envelope::{EnvelopeFactory, MessageEnvelope};
pub use error::{
    CodecError, ConfigurationError, DistributeError, HandlerError, PreprocessError,
    ProcessingError, TransportError, ValidationError,
};
pub use message::{
    MessageGroupId, MessageId, QueueKind, QueueName, QueueRef, RawMessage, ReceiptHandle,
    SendRequest,
};
pub use notification::{Notification, NotificationUnwrapper};
pub use providers::{InMemoryQueue, InMemoryTopic, SnsPublisher, SqsTransport};
pub use receiver::{
    BatchOutcome, MessageDisposition, MessageHandler, MessageOutcome, MessageReceiver,
    ReceiverConfig,
};
pub use retry::RetryPolicy;
pub use signature::{CertificateFetcher, HttpCertificateFetcher, SignatureVerifier};
pub use transport::{MessagePreprocessor, MessagePublisher, QueueTransport};
