// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Broker Transport Seam
//!
//! The bus talks to the broker only through the traits in this module. The production
//! implementation lives in [`channel`](crate::channel) and is backed by lapin; tests
//! plug in an in-memory broker.
//!
//! Connection and channel handles are owned by the bus session and replaced on every
//! reconnect or reinit, never reused after they report closure.

use crate::{
    errors::AmqpError, exchange::ExchangeDefinition, publisher::OutboundMessage,
    queue::{QueueBinding, QueueDefinition},
};
use async_trait::async_trait;
use futures_util::{future::BoxFuture, stream::BoxStream};
use lapin::types::FieldTable;
use std::{fmt, sync::Arc};

/// Resolves once the broker answers a publish: `true` for ack, `false` for nack.
///
/// Each pending confirm is tied to the delivery tag of the publish that produced it.
pub type PendingConfirm = BoxFuture<'static, Result<bool, AmqpError>>;

/// Stream of inbound deliveries for one consumed queue.
pub type DeliveryStream = BoxStream<'static, Result<InboundDelivery, AmqpError>>;

/// Dials broker connections.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn dial(&self, url: &str) -> Result<Arc<dyn BusConnection>, AmqpError>;
}

/// A live broker connection.
#[async_trait]
pub trait BusConnection: Send + Sync {
    async fn open_channel(&self) -> Result<Arc<dyn BusChannel>, AmqpError>;

    /// Resolves when the connection is closed by the broker or the network.
    fn closed(&self) -> BoxFuture<'static, ()>;

    async fn close(&self) -> Result<(), AmqpError>;
}

/// An operational channel on a [`BusConnection`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BusChannel: Send + Sync {
    /// Switches the channel to publisher-confirm mode.
    async fn confirm_select(&self) -> Result<(), AmqpError>;

    async fn qos(&self, prefetch: u16) -> Result<(), AmqpError>;

    async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), AmqpError>;

    async fn declare_queue(&self, def: &QueueDefinition) -> Result<(), AmqpError>;

    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), AmqpError>;

    /// Writes a message and returns the pending broker confirmation for it.
    async fn publish(&self, msg: &OutboundMessage) -> Result<PendingConfirm, AmqpError>;

    async fn consume(&self, queue: &str, consumer_tag: &str)
        -> Result<DeliveryStream, AmqpError>;

    /// Resolves when the channel is closed by the broker.
    fn closed(&self) -> BoxFuture<'static, ()>;

    async fn close(&self) -> Result<(), AmqpError>;
}

/// Acknowledges one delivery.
#[async_trait]
pub trait DeliveryAcker: Send + Sync {
    async fn ack(&self) -> Result<(), AmqpError>;
}

/// A single message handed to a consumer.
///
/// Built by the transport; the dispatcher acknowledges it before processing.
pub struct InboundDelivery {
    pub(crate) routing_key: String,
    pub(crate) headers: Option<FieldTable>,
    pub(crate) content_type: Option<String>,
    pub(crate) content_encoding: Option<String>,
    pub(crate) message_id: Option<String>,
    pub(crate) data: Vec<u8>,
    pub(crate) acker: Arc<dyn DeliveryAcker>,
}

impl InboundDelivery {
    /// Creates a delivery without headers or content properties.
    ///
    /// # Parameters
    /// * `routing_key` - Routing key the message was published with
    /// * `data` - Message body
    /// * `acker` - Handle acknowledging this delivery on its channel
    pub fn new(routing_key: &str, data: Vec<u8>, acker: Arc<dyn DeliveryAcker>) -> Self {
        InboundDelivery {
            routing_key: routing_key.to_owned(),
            headers: None,
            content_type: None,
            content_encoding: None,
            message_id: None,
            data,
            acker,
        }
    }

    /// Sets the AMQP headers; `None` marks a legacy, header-less message.
    pub fn with_headers(mut self, headers: Option<FieldTable>) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the content type property.
    pub fn with_content_type(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self
    }

    /// Sets the content encoding property.
    pub fn with_content_encoding(mut self, content_encoding: Option<String>) -> Self {
        self.content_encoding = content_encoding;
        self
    }

    /// Sets the message id property.
    pub fn with_message_id(mut self, message_id: Option<String>) -> Self {
        self.message_id = message_id;
        self
    }

    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    pub fn headers(&self) -> Option<&FieldTable> {
        self.headers.as_ref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn content_encoding(&self) -> Option<&str> {
        self.content_encoding.as_deref()
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    /// Raw message body.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for InboundDelivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundDelivery")
            .field("routing_key", &self.routing_key)
            .field("content_type", &self.content_type)
            .field("content_encoding", &self.content_encoding)
            .field("message_id", &self.message_id)
            .field("len", &self.data.len())
            .finish()
    }
}
