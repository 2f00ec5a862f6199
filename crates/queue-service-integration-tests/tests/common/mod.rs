//! Common test utilities for queue-service integration tests
//!
//! This module provides:
//! - An order payload used as the typed message content
//! - A recording handler that can be told to fail a number of times
//! - Helpers for building queues and receivers

use async_trait::async_trait;
use queue_service::{
    HandlerError, InMemoryQueue, JsonCodec, MessageEnvelope, MessageHandler, MessageReceiver,
    QueueRef, ReceiverConfig,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

// ============================================================================
// Test Payload
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: u32,
    pub customer: String,
}

#[allow(dead_code)]
pub fn order(id: u32, customer: &str) -> Order {
    Order {
        id,
        customer: customer.to_string(),
    }
}

// ============================================================================
// Recording Handler
// ============================================================================

/// Handler that records every envelope and fails the first `failures` calls
pub struct RecordingHandler<F> {
    received: Arc<Mutex<Vec<MessageEnvelope<F>>>>,
    failures_remaining: Arc<Mutex<usize>>,
}

impl<F> Clone for RecordingHandler<F> {
    fn clone(&self) -> Self {
        Self {
            received: Arc::clone(&self.received),
            failures_remaining: Arc::clone(&self.failures_remaining),
        }
    }
}

#[allow(dead_code)]
impl<F: Clone> RecordingHandler<F> {
    pub fn new() -> Self {
        Self::failing(0)
    }

    pub fn failing(failures: usize) -> Self {
        Self {
            received: Arc::new(Mutex::new(Vec::new())),
            failures_remaining: Arc::new(Mutex::new(failures)),
        }
    }

    pub fn received(&self) -> Vec<MessageEnvelope<F>> {
        self.received.lock().unwrap().clone()
    }

    pub fn contents(&self) -> Vec<F> {
        self.received().into_iter().map(|e| e.content).collect()
    }
}

#[async_trait]
impl<F> MessageHandler<F> for RecordingHandler<F>
where
    F: Clone + Send + Sync,
{
    async fn on_message(
        &self,
        _queue: &QueueRef,
        envelope: &MessageEnvelope<F>,
    ) -> Result<(), HandlerError> {
        self.received.lock().unwrap().push(envelope.clone());

        let mut remaining = self.failures_remaining.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(HandlerError::rejected("simulated failure"));
        }
        Ok(())
    }
}

// ============================================================================
// Builders
// ============================================================================

/// Queue returning up to ten messages per receive
#[allow(dead_code)]
pub fn batch_queue(name: &str) -> InMemoryQueue {
    InMemoryQueue::named(name)
        .unwrap()
        .with_max_number_of_messages(10)
}

/// JSON order receiver with a recording handler
#[allow(dead_code)]
pub fn order_receiver(
    handler: RecordingHandler<Order>,
    config: ReceiverConfig,
) -> MessageReceiver<Order, JsonCodec<Order>, RecordingHandler<Order>> {
    MessageReceiver::new(JsonCodec::new(), handler).with_config(config)
}
