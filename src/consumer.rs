// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Delivery Processing
//!
//! Handles one inbound delivery end to end:
//! 1. Acknowledges it (at-least-once: a crash after this point relies on upstream retry)
//! 2. Validates the envelope: headers present, JSON content type, UTF-8 encoding
//! 3. Finds the handler registered for the routing key
//! 4. Decodes the `[args, kwargs]` body and hands it to the handler
//!
//! Every failure is terminal for the delivery only; nothing here is retried.

use crate::{
    errors::AmqpError,
    handler::{HandlerRegistry, TaskContext},
    otel,
    publisher::{JSON_CONTENT_TYPE, UTF8_CONTENT_ENCODING},
    transport::InboundDelivery,
};
use opentelemetry::{
    global::BoxedTracer,
    trace::{Span, Status},
};
use futures_util::FutureExt;
use serde_json::Value;
use std::{any::Any, borrow::Cow, panic::AssertUnwindSafe};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Number of local attempts made to acknowledge a delivery
pub const ACK_ATTEMPTS: usize = 3;

/// Acknowledges a delivery, retrying locally.
///
/// # Returns
/// Whether the acknowledgement eventually succeeded. Failures are logged, never raised.
pub(crate) async fn ack_delivery(delivery: &InboundDelivery) -> bool {
    let mut last_err = None;

    for _ in 0..ACK_ATTEMPTS {
        match delivery.acker.ack().await {
            Ok(()) => return true,
            Err(err) => last_err = Some(err),
        }
    }

    if let Some(err) = last_err {
        error!(
            error = err.to_string(),
            message_id = delivery.message_id.as_deref().unwrap_or_default(),
            "failed to ack delivery"
        );
    }

    false
}

/// Checks the envelope conventions of a delivery.
///
/// Deliveries without headers come from the legacy protocol, which is not supported.
pub(crate) fn validate_envelope(delivery: &InboundDelivery) -> Result<(), AmqpError> {
    if delivery.headers.is_none() {
        return Err(AmqpError::UnsupportedEnvelope(
            "missing headers, legacy protocol is not supported".to_owned(),
        ));
    }

    if delivery.content_type.as_deref() != Some(JSON_CONTENT_TYPE) {
        return Err(AmqpError::UnsupportedEnvelope(format!(
            "content type {:?}, only {} is allowed",
            delivery.content_type, JSON_CONTENT_TYPE
        )));
    }

    if delivery.content_encoding.as_deref() != Some(UTF8_CONTENT_ENCODING) {
        return Err(AmqpError::UnsupportedEnvelope(format!(
            "content encoding {:?}, only {} is allowed",
            delivery.content_encoding, UTF8_CONTENT_ENCODING
        )));
    }

    Ok(())
}

/// Decodes the two-element `[args, kwargs]` body.
pub(crate) fn decode_payload(data: &[u8]) -> Result<(Value, Value), AmqpError> {
    serde_json::from_slice::<(Value, Value)>(data)
        .map_err(|err| AmqpError::ParsePayloadError(err.to_string()))
}

/// Consumes and processes a delivery received on `queue`.
///
/// # Parameters
/// * `tracer` - OpenTelemetry tracer for creating spans
/// * `delivery` - The delivery to process
/// * `queue` - Name of the queue the delivery came from
/// * `handlers` - Handlers keyed by routing key
/// * `cancellation` - Token handed to the handler through its context
///
/// # Returns
/// Ok(()) when the handler ran successfully, otherwise the reason the delivery was dropped
pub(crate) async fn consume(
    tracer: &BoxedTracer,
    delivery: InboundDelivery,
    queue: &str,
    handlers: &HandlerRegistry,
    cancellation: &CancellationToken,
) -> Result<(), AmqpError> {
    ack_delivery(&delivery).await;

    debug!(
        queue,
        routing_key = %delivery.routing_key,
        "received delivery"
    );

    validate_envelope(&delivery)?;

    let (ctx, mut span) = otel::new_span(delivery.headers.as_ref(), tracer, &delivery.routing_key);

    let result = dispatch(&delivery, queue, handlers, cancellation, &ctx).await;
    match &result {
        Ok(()) => {
            debug!("message successfully processed");
            span.set_status(Status::Ok);
        }
        Err(err) => {
            span.record_error(err);
            span.set_status(Status::Error {
                description: Cow::from(err.to_string()),
            });
        }
    }

    result
}

async fn dispatch(
    delivery: &InboundDelivery,
    queue: &str,
    handlers: &HandlerRegistry,
    cancellation: &CancellationToken,
    ctx: &opentelemetry::Context,
) -> Result<(), AmqpError> {
    let Some(handler) = handlers.get(&delivery.routing_key) else {
        return Err(AmqpError::UnregisteredRoute(delivery.routing_key.clone()));
    };

    let (args, kwargs) = decode_payload(&delivery.data)?;

    let task_ctx = TaskContext {
        queue: queue.to_owned(),
        routing_key: delivery.routing_key.clone(),
        message_id: delivery.message_id.clone(),
        otel: ctx.clone(),
        cancellation: cancellation.clone(),
    };

    match AssertUnwindSafe(handler.handle(&task_ctx, args, kwargs))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(panic) => Err(AmqpError::HandlerFailed(format!(
            "handler panicked: {}",
            panic_message(panic.as_ref())
        ))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}
