// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Connection and Channel Management
//!
//! lapin-backed implementation of the [`transport`](crate::transport) traits. Broker-side
//! closures are observed through lapin's `on_error` callbacks, which cancel a token the
//! supervisor waits on.

use crate::{
    errors::AmqpError,
    exchange::ExchangeDefinition,
    publisher::OutboundMessage,
    queue::{QueueBinding, QueueDefinition},
    transport::{
        BusChannel, BusConnection, DeliveryAcker, DeliveryStream, InboundDelivery,
        PendingConfirm, Transport,
    },
};
use async_trait::async_trait;
use futures_util::{future::BoxFuture, FutureExt, StreamExt};
use lapin::{
    acker::Acker,
    message::Delivery,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
        ConfirmSelectOptions, QueueBindOptions,
    },
    types::{FieldTable, LongString, ShortString},
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

const REPLY_SUCCESS: u16 = 200;
const PERSISTENT_DELIVERY_MODE: u8 = 2;

/// Dials RabbitMQ with lapin.
pub struct LapinTransport {
    connection_name: String,
}

impl LapinTransport {
    /// Creates a transport whose connections carry the given client-provided name.
    pub fn new(connection_name: &str) -> Self {
        LapinTransport {
            connection_name: connection_name.to_owned(),
        }
    }
}

#[async_trait]
impl Transport for LapinTransport {
    async fn dial(&self, url: &str) -> Result<Arc<dyn BusConnection>, AmqpError> {
        debug!("creating amqp connection...");
        let options = ConnectionProperties::default()
            .with_connection_name(LongString::from(self.connection_name.clone()));

        let conn = match Connection::connect(url, options).await {
            Ok(c) => Ok(c),
            Err(err) => {
                error!(error = err.to_string(), "failure to connect");
                Err(AmqpError::ConnectionError(err.to_string()))
            }
        }?;
        debug!("amqp connected");

        let closed = CancellationToken::new();
        let signal = closed.clone();
        conn.on_error(move |err| {
            warn!(error = err.to_string(), "amqp connection closed");
            signal.cancel();
        });

        Ok(Arc::new(LapinConnection { conn, closed }))
    }
}

pub struct LapinConnection {
    conn: Connection,
    closed: CancellationToken,
}

#[async_trait]
impl BusConnection for LapinConnection {
    async fn open_channel(&self) -> Result<Arc<dyn BusChannel>, AmqpError> {
        debug!("creating amqp channel...");
        let channel = match self.conn.create_channel().await {
            Ok(c) => Ok(c),
            Err(err) => {
                error!(error = err.to_string(), "error to create the channel");
                Err(AmqpError::ChannelError(err.to_string()))
            }
        }?;
        debug!("channel created");

        let closed = CancellationToken::new();
        let signal = closed.clone();
        channel.on_error(move |err| {
            warn!(error = err.to_string(), "amqp channel closed");
            signal.cancel();
        });

        Ok(Arc::new(LapinChannel { channel, closed }))
    }

    fn closed(&self) -> BoxFuture<'static, ()> {
        self.closed.clone().cancelled_owned().boxed()
    }

    async fn close(&self) -> Result<(), AmqpError> {
        self.conn
            .close(REPLY_SUCCESS, "closing")
            .await
            .map_err(|err| AmqpError::CloseError(err.to_string()))
    }
}

pub struct LapinChannel {
    channel: Channel,
    closed: CancellationToken,
}

#[async_trait]
impl BusChannel for LapinChannel {
    async fn confirm_select(&self) -> Result<(), AmqpError> {
        self.channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|err| AmqpError::ConfirmSelectError(err.to_string()))
    }

    async fn qos(&self, prefetch: u16) -> Result<(), AmqpError> {
        self.channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await
            .map_err(|err| AmqpError::QoSDeclarationError(err.to_string()))
    }

    async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), AmqpError> {
        self.channel
            .exchange_declare(
                &def.name,
                def.kind(),
                def.options(),
                FieldTable::default(),
            )
            .await
            .map_err(|_| AmqpError::DeclareExchangeError(def.name.clone()))
    }

    async fn declare_queue(&self, def: &QueueDefinition) -> Result<(), AmqpError> {
        self.channel
            .queue_declare(&def.name, def.options(), FieldTable::default())
            .await
            .map(|_| ())
            .map_err(|_| AmqpError::DeclareQueueError(def.name.clone()))
    }

    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), AmqpError> {
        self.channel
            .queue_bind(
                &binding.queue_name,
                &binding.exchange_name,
                &binding.routing_key,
                QueueBindOptions { nowait: false },
                FieldTable::default(),
            )
            .await
            .map_err(|_| {
                AmqpError::BindingExchangeToQueueError(
                    binding.exchange_name.clone(),
                    binding.queue_name.clone(),
                )
            })
    }

    async fn publish(&self, msg: &OutboundMessage) -> Result<PendingConfirm, AmqpError> {
        let confirm = match self
            .channel
            .basic_publish(
                &msg.exchange,
                &msg.routing_key,
                BasicPublishOptions {
                    immediate: false,
                    mandatory: false,
                },
                &msg.payload,
                BasicProperties::default()
                    .with_content_type(ShortString::from(msg.content_type.clone()))
                    .with_content_encoding(ShortString::from(msg.content_encoding.clone()))
                    .with_message_id(ShortString::from(msg.message_id.clone()))
                    .with_delivery_mode(PERSISTENT_DELIVERY_MODE)
                    .with_headers(FieldTable::from(msg.headers.clone())),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error publishing message");
                Err(AmqpError::PublishingError(err.to_string()))
            }
            Ok(confirm) => Ok(confirm),
        }?;

        Ok(async move {
            confirm
                .await
                .map(|confirmation| confirmation.is_ack())
                .map_err(|err| AmqpError::ConfirmationError(err.to_string()))
        }
        .boxed())
    }

    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
    ) -> Result<DeliveryStream, AmqpError> {
        let consumer = match self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions {
                    no_local: false,
                    no_ack: false,
                    exclusive: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "failure to create the consumer");
                Err(AmqpError::ConsumerDeclarationError(queue.to_owned()))
            }
            Ok(c) => Ok(c),
        }?;

        Ok(consumer
            .map(|result| {
                result
                    .map(InboundDelivery::from)
                    .map_err(|err| AmqpError::ConsumerError(err.to_string()))
            })
            .boxed())
    }

    fn closed(&self) -> BoxFuture<'static, ()> {
        self.closed.clone().cancelled_owned().boxed()
    }

    async fn close(&self) -> Result<(), AmqpError> {
        self.channel
            .close(REPLY_SUCCESS, "closing")
            .await
            .map_err(|err| AmqpError::CloseError(err.to_string()))
    }
}

struct LapinAcker(Acker);

#[async_trait]
impl DeliveryAcker for LapinAcker {
    async fn ack(&self) -> Result<(), AmqpError> {
        self.0
            .ack(BasicAckOptions { multiple: false })
            .await
            .map_err(|err| AmqpError::AckMessageError(err.to_string()))
    }
}

impl From<Delivery> for InboundDelivery {
    fn from(delivery: Delivery) -> Self {
        let props = &delivery.properties;
        let headers = props.headers().clone();
        let content_type = props.content_type().as_ref().map(|v| v.to_string());
        let content_encoding = props.content_encoding().as_ref().map(|v| v.to_string());
        let message_id = props.message_id().as_ref().map(|v| v.to_string());

        InboundDelivery::new(
            delivery.routing_key.as_str(),
            delivery.data,
            Arc::new(LapinAcker(delivery.acker)),
        )
        .with_headers(headers)
        .with_content_type(content_type)
        .with_content_encoding(content_encoding)
        .with_message_id(message_id)
    }
}
