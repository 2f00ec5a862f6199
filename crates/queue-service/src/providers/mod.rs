//! Transport implementations.
//!
//! This module contains concrete implementations of the `QueueTransport` and
//! `MessagePublisher` traits: SQS queues and SNS topics over the AWS query
//! API, and an in-memory queue and topic for tests and local development.

pub mod aws;
pub mod memory;
pub mod sns;

mod signing;

pub use aws::{AwsError, SqsTransport, MAX_MESSAGE_SIZE};
pub use memory::{InMemoryQueue, InMemoryTopic};
pub use sns::SnsPublisher;
