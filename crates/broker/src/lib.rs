// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! mqsf-broker: the message-broker seam.
//!
//! The engine consumes the [`BrokerAdapter`] trait; [`AmqpBroker`] is the
//! production implementation and [`fake::FakeBroker`] backs the test
//! suites.

pub mod adapter;
pub mod amqp;
#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use adapter::{
    queue_name, BrokerAdapter, BrokerError, Delivery, DeliveryAck, LISTENER_MSG_KEY, LISTENER_QUEUE,
};
pub use amqp::AmqpBroker;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeBroker, PublishedMessage};
