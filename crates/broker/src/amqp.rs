// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! AMQP 0-9-1 client for the pipeline wire protocol.
//!
//! Connection and channel are opened lazily and re-established whenever a
//! publish or consume finds them closed. The channel runs in
//! publisher-confirm mode so a publish only succeeds once the broker has
//! taken responsibility for the message.

use crate::adapter::{
    queue_name, BrokerAdapter, BrokerError, Delivery, DeliveryAck, LISTENER_MSG_KEY, LISTENER_QUEUE,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::options::{
    BasicCancelOptions, BasicConsumeOptions, BasicPublishOptions, ConfirmSelectOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::publisher_confirm::Confirmation;
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use mqsf_core::Config;
use tokio::sync::mpsc;
use tracing::warn;

const CLOSE_REPLY_CODE: u16 = 200;

#[derive(Default)]
struct ConnState {
    connection: Option<Connection>,
    channel: Option<Channel>,
    consumer_tags: Vec<String>,
}

/// Lazily connected AMQP client for one stage.
pub struct AmqpBroker {
    uri: String,
    state: tokio::sync::Mutex<ConnState>,
}

impl AmqpBroker {
    pub fn from_config(config: &Config) -> Self {
        Self { uri: amqp_uri(config), state: tokio::sync::Mutex::new(ConnState::default()) }
    }

    /// Open connection and channel now. Failure is fatal during startup.
    pub async fn connect(&self) -> Result<(), BrokerError> {
        self.ensure_channel().await.map(drop)
    }

    async fn ensure_channel(&self) -> Result<Channel, BrokerError> {
        let mut state = self.state.lock().await;
        let connected = state.connection.as_ref().is_some_and(|c| c.status().connected());
        if !connected {
            let connection = Connection::connect(&self.uri, ConnectionProperties::default())
                .await
                .map_err(BrokerError::Connect)?;
            state.connection = Some(connection);
            state.channel = None;
            state.consumer_tags.clear();
        }
        let channel_open = state.channel.as_ref().is_some_and(|c| c.status().connected());
        if !channel_open {
            let connection = state.connection.as_ref().ok_or(BrokerError::Unavailable)?;
            let channel = connection.create_channel().await?;
            channel.confirm_select(ConfirmSelectOptions::default()).await?;
            state.channel = Some(channel);
        }
        state.channel.clone().ok_or(BrokerError::Unavailable)
    }

    /// Declare a direct, durable exchange.
    pub async fn declare_exchange(&self, exchange: &str) -> Result<(), BrokerError> {
        let channel = self.ensure_channel().await?;
        channel
            .exchange_declare(
                exchange,
                ExchangeKind::Direct,
                ExchangeDeclareOptions { durable: true, ..Default::default() },
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    /// Declare a durable queue.
    pub async fn declare_queue(&self, queue: &str) -> Result<(), BrokerError> {
        let channel = self.ensure_channel().await?;
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions { durable: true, ..Default::default() },
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    /// Bind a queue on an exchange with the given routing key.
    pub async fn bind(
        &self,
        exchange: &str,
        queue: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError> {
        let channel = self.ensure_channel().await?;
        channel
            .queue_bind(queue, exchange, routing_key, QueueBindOptions::default(), FieldTable::default())
            .await?;
        Ok(())
    }

    /// Declare the upstream exchange and its listener queue, bind them,
    /// and return the queue name.
    pub async fn bind_listener(&self, exchange: &str) -> Result<String, BrokerError> {
        self.declare_exchange(exchange).await?;
        let queue = queue_name(exchange, LISTENER_QUEUE);
        self.declare_queue(&queue).await?;
        self.bind(exchange, &queue, LISTENER_MSG_KEY).await?;
        Ok(queue)
    }

    /// Consume a queue, forwarding deliveries onto a channel.
    pub async fn consume(&self, queue: &str) -> Result<mpsc::Receiver<Delivery>, BrokerError> {
        let channel = self.ensure_channel().await?;
        let consumer = channel
            .basic_consume(queue, "", BasicConsumeOptions::default(), FieldTable::default())
            .await?;
        self.state.lock().await.consumer_tags.push(consumer.tag().to_string());

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            let mut consumer = consumer;
            while let Some(delivery) = consumer.next().await {
                match delivery {
                    Ok(delivery) => {
                        let lapin::message::Delivery { data, acker, .. } = delivery;
                        let message = Delivery::new(data, Box::new(AmqpAck { acker }));
                        if tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        warn!("listener consumer stream error: {error}");
                        break;
                    }
                }
            }
        });
        Ok(rx)
    }

    /// Publish a persistent JSON message with the mandatory flag and wait
    /// for the publisher confirm.
    pub async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: String,
    ) -> Result<(), BrokerError> {
        let channel = self.ensure_channel().await?;
        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(2);
        let confirm = channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions { mandatory: true, ..Default::default() },
                body.as_bytes(),
                properties,
            )
            .await?;
        match confirm.await? {
            Confirmation::Ack(None) | Confirmation::NotRequested => Ok(()),
            Confirmation::Ack(Some(_)) | Confirmation::Nack(Some(_)) => Err(BrokerError::Unroutable {
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
            }),
            Confirmation::Nack(None) => {
                Err(BrokerError::Unconfirmed { exchange: exchange.to_string() })
            }
        }
    }

    /// Cancel all active consumers.
    pub async fn stop_consuming(&self) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        let Some(channel) = state.channel.clone() else {
            state.consumer_tags.clear();
            return Ok(());
        };
        if !channel.status().connected() {
            state.consumer_tags.clear();
            return Ok(());
        }
        for tag in state.consumer_tags.drain(..) {
            channel.basic_cancel(&tag, BasicCancelOptions::default()).await?;
        }
        Ok(())
    }

    /// Stop consuming and close channel and connection. Idempotent.
    pub async fn close(&self) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        if let Some(channel) = state.channel.take() {
            if channel.status().connected() {
                for tag in state.consumer_tags.drain(..) {
                    if let Err(error) =
                        channel.basic_cancel(&tag, BasicCancelOptions::default()).await
                    {
                        warn!("failed cancelling consumer {tag}: {error}");
                    }
                }
                channel.close(CLOSE_REPLY_CODE, "shutting down").await?;
            }
        }
        state.consumer_tags.clear();
        if let Some(connection) = state.connection.take() {
            if connection.status().connected() {
                connection.close(CLOSE_REPLY_CODE, "shutting down").await?;
            }
        }
        Ok(())
    }
}

struct AmqpAck {
    acker: lapin::acker::Acker,
}

#[async_trait]
impl DeliveryAck for AmqpAck {
    async fn ack(self: Box<Self>) -> Result<(), BrokerError> {
        self.acker.ack(lapin::options::BasicAckOptions::default()).await?;
        Ok(())
    }
}

#[async_trait]
impl BrokerAdapter for AmqpBroker {
    async fn connect(&self) -> Result<(), BrokerError> {
        AmqpBroker::connect(self).await
    }

    async fn declare_exchange(&self, exchange: &str) -> Result<(), BrokerError> {
        AmqpBroker::declare_exchange(self, exchange).await
    }

    async fn bind_listener(&self, exchange: &str) -> Result<String, BrokerError> {
        AmqpBroker::bind_listener(self, exchange).await
    }

    async fn consume(&self, queue: &str) -> Result<mpsc::Receiver<Delivery>, BrokerError> {
        AmqpBroker::consume(self, queue).await
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: String,
    ) -> Result<(), BrokerError> {
        AmqpBroker::publish(self, exchange, routing_key, body).await
    }

    async fn close(&self) -> Result<(), BrokerError> {
        AmqpBroker::close(self).await
    }
}

fn amqp_uri(config: &Config) -> String {
    // The default vhost is "/", which must be percent-encoded in the URI.
    let vhost = if config.mq_vhost == "/" { "%2f".to_string() } else { config.mq_vhost.clone() };
    format!(
        "amqp://{user}:{pass}@{host}:{port}/{vhost}?heartbeat={heartbeat}",
        user = config.mq_user,
        pass = config.mq_pass,
        host = config.mq_host,
        port = config.mq_port,
        heartbeat = config.mq_heartbeat,
    )
}

#[cfg(test)]
#[path = "amqp_tests.rs"]
mod tests;
