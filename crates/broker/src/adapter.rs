// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The broker seam the engine is generic over.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Logical name of the input queue; canonicalized per stage as
/// `"<exchange>.listener"`.
pub const LISTENER_QUEUE: &str = "listener";

/// Routing key every stage publishes and consumes listener messages on.
pub const LISTENER_MSG_KEY: &str = "listener_msg";

/// Canonical queue name for a logical queue on a given exchange.
///
/// Example: `wx.listener`. Prefixing with the exchange prevents collisions
/// between stages sharing a broker.
pub fn queue_name(exchange: &str, name: &str) -> String {
    format!("{exchange}.{name}")
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("connection to message broker failed: {0}")]
    Connect(#[source] lapin::Error),

    #[error("broker channel unavailable")]
    Unavailable,

    #[error(transparent)]
    Amqp(#[from] lapin::Error),

    #[error("message unroutable on exchange {exchange} with key {routing_key}")]
    Unroutable { exchange: String, routing_key: String },

    #[error("broker did not confirm publication on exchange {exchange}")]
    Unconfirmed { exchange: String },

    #[error("broker connection is closed")]
    Closed,
}

/// Acknowledgement half of a delivery.
#[async_trait]
pub trait DeliveryAck: Send {
    async fn ack(self: Box<Self>) -> Result<(), BrokerError>;
}

/// One message taken from the listener queue.
///
/// Handlers read the raw body and call [`ack`](Delivery::ack) exactly once
/// after handling completes; dropping a delivery without acking leaves the
/// message owned by the broker for redelivery.
pub struct Delivery {
    body: Vec<u8>,
    acker: Box<dyn DeliveryAck>,
}

impl Delivery {
    pub fn new(body: Vec<u8>, acker: Box<dyn DeliveryAck>) -> Self {
        Self { body, acker }
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub async fn ack(self) -> Result<(), BrokerError> {
        self.acker.ack().await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery").field("body_len", &self.body.len()).finish()
    }
}

/// Broker operations the engine depends on.
///
/// All exchanges are direct and durable, all queues durable, and all
/// publications persistent with the mandatory flag set, so messages survive
/// a broker restart and unroutable publications surface as errors.
#[async_trait]
pub trait BrokerAdapter: Send + Sync + 'static {
    /// Establish the connection. Failure here is fatal during startup.
    async fn connect(&self) -> Result<(), BrokerError>;

    /// Declare a direct, durable exchange.
    async fn declare_exchange(&self, exchange: &str) -> Result<(), BrokerError>;

    /// Declare the durable listener queue for the given upstream exchange,
    /// bind it with the listener routing key, and return the queue name.
    async fn bind_listener(&self, exchange: &str) -> Result<String, BrokerError>;

    /// Begin consuming the queue; deliveries arrive on the returned
    /// channel. The channel closing before [`close`](BrokerAdapter::close)
    /// means the broker connection was lost.
    async fn consume(&self, queue: &str) -> Result<mpsc::Receiver<Delivery>, BrokerError>;

    /// Publish a persistent `application/json` message.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: String,
    ) -> Result<(), BrokerError>;

    /// Stop consuming and close channel and connection. Safe to call more
    /// than once.
    async fn close(&self) -> Result<(), BrokerError>;
}

#[cfg(test)]
#[path = "adapter_tests.rs"]
mod tests;
