// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Publisher
//!
//! Best-effort and reliable publishing on the current session's channel.
//!
//! `unsafe_push` performs a single write and returns as soon as the transport accepts it.
//! `push` waits for a positive broker confirmation and retries the whole attempt on
//! transport errors, negative confirmations or confirmation timeouts, up to the
//! configured number of attempts. OpenTelemetry context is propagated in the message
//! headers on both paths.

use crate::{client::BusInner, errors::AmqpError, otel, transport::PendingConfirm};
use lapin::types::{AMQPValue, LongString, ShortString};
use opentelemetry::Context;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Default content type for JSON messages
pub const JSON_CONTENT_TYPE: &str = "application/json";
/// Default content encoding
pub const UTF8_CONTENT_ENCODING: &str = "utf-8";

/// A message to publish. Created per publish call.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub(crate) exchange: String,
    pub(crate) routing_key: String,
    pub(crate) payload: Vec<u8>,
    pub(crate) content_type: String,
    pub(crate) content_encoding: String,
    pub(crate) message_id: String,
    pub(crate) headers: BTreeMap<ShortString, AMQPValue>,
}

impl OutboundMessage {
    /// Creates a JSON, UTF-8 message with a fresh message id.
    ///
    /// # Parameters
    /// * `exchange` - Target exchange
    /// * `routing_key` - Routing key used by the exchange to select queues
    /// * `payload` - Message body
    pub fn new(exchange: &str, routing_key: &str, payload: impl Into<Vec<u8>>) -> Self {
        OutboundMessage {
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
            payload: payload.into(),
            content_type: JSON_CONTENT_TYPE.to_owned(),
            content_encoding: UTF8_CONTENT_ENCODING.to_owned(),
            message_id: Uuid::new_v4().to_string(),
            headers: BTreeMap::default(),
        }
    }

    /// Creates a task message whose body is the `[args, kwargs]` envelope consumers expect.
    ///
    /// # Returns
    /// The message or `AmqpError::ParsePayloadError` when the arguments cannot be serialized
    pub fn task<A, K>(exchange: &str, routing_key: &str, args: &A, kwargs: &K) -> Result<Self, AmqpError>
    where
        A: Serialize + ?Sized,
        K: Serialize + ?Sized,
    {
        let body = serde_json::to_vec(&(args, kwargs))
            .map_err(|err| AmqpError::ParsePayloadError(err.to_string()))?;

        Ok(Self::new(exchange, routing_key, body))
    }

    pub fn content_type(mut self, content_type: &str) -> Self {
        self.content_type = content_type.to_owned();
        self
    }

    pub fn content_encoding(mut self, content_encoding: &str) -> Self {
        self.content_encoding = content_encoding.to_owned();
        self
    }

    pub fn message_id(mut self, message_id: &str) -> Self {
        self.message_id = message_id.to_owned();
        self
    }

    pub fn header(mut self, key: &str, value: AMQPValue) -> Self {
        self.headers.insert(ShortString::from(key), value);
        self
    }

    pub fn header_str(self, key: &str, value: &str) -> Self {
        self.header(key, AMQPValue::LongString(LongString::from(value)))
    }

    pub fn exchange_name(&self) -> &str {
        &self.exchange
    }

    pub fn key(&self) -> &str {
        &self.routing_key
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn get_content_type(&self) -> &str {
        &self.content_type
    }

    pub fn get_content_encoding(&self) -> &str {
        &self.content_encoding
    }

    pub fn get_message_id(&self) -> &str {
        &self.message_id
    }

    pub fn headers(&self) -> &BTreeMap<ShortString, AMQPValue> {
        &self.headers
    }
}

impl BusInner {
    /// Single publish attempt on the current channel.
    ///
    /// # Returns
    /// The pending confirmation for the written message, or `AmqpError::NotReady`
    /// when there is no live session
    pub(crate) async fn publish_once(
        &self,
        msg: &OutboundMessage,
    ) -> Result<PendingConfirm, AmqpError> {
        let Some(session) = self.session.current() else {
            return Err(AmqpError::NotReady);
        };

        let mut outbound = msg.clone();
        otel::inject(&Context::current(), &mut outbound.headers);

        session.channel.publish(&outbound).await
    }

    pub(crate) async fn unsafe_push(&self, msg: &OutboundMessage) -> Result<(), AmqpError> {
        self.publish_once(msg).await.map(|_| ())
    }

    pub(crate) async fn push(&self, msg: &OutboundMessage) -> Result<(), AmqpError> {
        debug!(
            exchange = %msg.exchange,
            routing_key = %msg.routing_key,
            message_id = %msg.message_id,
            "trying to publish"
        );

        if !self.session.is_ready() {
            error!(exchange = %msg.exchange, "cannot publish, bus is not ready");
            return Err(AmqpError::NotReady);
        }

        let attempts = self.config.publish_retry;
        let resend_delay = self.config.resend_delay_duration();

        for attempt in 1..=attempts {
            let pending = match self.publish_once(msg).await {
                Ok(pending) => pending,
                Err(err) => {
                    warn!(error = err.to_string(), attempt, "publish attempt failed");
                    tokio::select! {
                        _ = self.shutdown.cancelled() => {
                            warn!("bus closed during publishing message");
                            return Err(AmqpError::ShuttingDown);
                        }
                        _ = tokio::time::sleep(resend_delay) => {}
                    }
                    continue;
                }
            };

            match tokio::time::timeout(resend_delay, pending).await {
                Ok(Ok(true)) => {
                    debug!(message_id = %msg.message_id, "publish confirmed");
                    return Ok(());
                }
                Ok(Ok(false)) => {
                    warn!(attempt, "publish negatively confirmed, retrying");
                }
                Ok(Err(err)) => {
                    warn!(error = err.to_string(), attempt, "publish confirmation lost, retrying");
                }
                Err(_) => {
                    warn!(
                        attempt,
                        delay_ms = self.config.resend_delay_ms,
                        "publish not confirmed in time, retrying"
                    );
                }
            }
        }

        error!(
            exchange = %msg.exchange,
            routing_key = %msg.routing_key,
            attempts,
            "publishing message failed"
        );
        Err(AmqpError::PublishFailed(attempts))
    }
}
