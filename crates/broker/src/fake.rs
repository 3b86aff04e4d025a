// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory broker for tests.
//!
//! Records every declaration, binding, publication, and acknowledgement,
//! and lets tests inject deliveries into the consumer channel. Clones
//! share state, so a test can keep a handle while the engine owns another.

use crate::adapter::{queue_name, BrokerAdapter, BrokerError, Delivery, DeliveryAck, LISTENER_QUEUE};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

/// One message recorded by [`FakeBroker::publish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub exchange: String,
    pub routing_key: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeBinding {
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
}

#[derive(Default)]
struct FakeState {
    connected: bool,
    closed: bool,
    exchanges: Vec<String>,
    queues: Vec<String>,
    bindings: Vec<FakeBinding>,
    published: Vec<PublishedMessage>,
    acked: usize,
    fail_publish: bool,
    delivery_tx: Option<mpsc::Sender<Delivery>>,
}

#[derive(Clone, Default)]
pub struct FakeBroker {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject a delivery into the consumer channel. Returns false when no
    /// consumer is attached or the stream was torn down.
    pub async fn deliver(&self, body: impl Into<Vec<u8>>) -> bool {
        let tx = self.state.lock().delivery_tx.clone();
        let Some(tx) = tx else { return false };
        let delivery = Delivery::new(body.into(), Box::new(FakeAck { state: self.state.clone() }));
        tx.send(delivery).await.is_ok()
    }

    /// Drop the consumer channel, simulating a lost broker connection.
    pub fn drop_consumer(&self) {
        self.state.lock().delivery_tx = None;
    }

    /// Make subsequent publishes fail.
    pub fn fail_publishes(&self, fail: bool) {
        self.state.lock().fail_publish = fail;
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state.lock().published.clone()
    }

    pub fn acked(&self) -> usize {
        self.state.lock().acked
    }

    pub fn declared_exchanges(&self) -> Vec<String> {
        self.state.lock().exchanges.clone()
    }

    pub fn declared_queues(&self) -> Vec<String> {
        self.state.lock().queues.clone()
    }

    pub fn bindings(&self) -> Vec<FakeBinding> {
        self.state.lock().bindings.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn has_consumer(&self) -> bool {
        self.state.lock().delivery_tx.is_some()
    }
}

struct FakeAck {
    state: Arc<Mutex<FakeState>>,
}

#[async_trait]
impl DeliveryAck for FakeAck {
    async fn ack(self: Box<Self>) -> Result<(), BrokerError> {
        self.state.lock().acked += 1;
        Ok(())
    }
}

#[async_trait]
impl BrokerAdapter for FakeBroker {
    async fn connect(&self) -> Result<(), BrokerError> {
        self.state.lock().connected = true;
        Ok(())
    }

    async fn declare_exchange(&self, exchange: &str) -> Result<(), BrokerError> {
        let mut state = self.state.lock();
        if !state.exchanges.iter().any(|e| e == exchange) {
            state.exchanges.push(exchange.to_string());
        }
        Ok(())
    }

    async fn bind_listener(&self, exchange: &str) -> Result<String, BrokerError> {
        self.declare_exchange(exchange).await?;
        let queue = queue_name(exchange, LISTENER_QUEUE);
        let mut state = self.state.lock();
        if !state.queues.iter().any(|q| q == &queue) {
            state.queues.push(queue.clone());
        }
        state.bindings.push(FakeBinding {
            exchange: exchange.to_string(),
            queue: queue.clone(),
            routing_key: crate::adapter::LISTENER_MSG_KEY.to_string(),
        });
        Ok(queue)
    }

    async fn consume(&self, _queue: &str) -> Result<mpsc::Receiver<Delivery>, BrokerError> {
        let (tx, rx) = mpsc::channel(64);
        self.state.lock().delivery_tx = Some(tx);
        Ok(rx)
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: String,
    ) -> Result<(), BrokerError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(BrokerError::Closed);
        }
        if state.fail_publish {
            return Err(BrokerError::Unroutable {
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
            });
        }
        state.published.push(PublishedMessage {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            body,
        });
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        let mut state = self.state.lock();
        state.closed = true;
        state.delivery_tx = None;
        Ok(())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
