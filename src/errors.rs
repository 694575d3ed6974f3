// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the Message Bus
//!
//! This module provides the error taxonomy shared by every component of the bus:
//! connection supervision, channel initialization, topology declaration, publishing
//! and delivery dispatch. Transient broker errors are retried internally by the
//! supervisor loops; the remaining variants are surfaced to callers or logged per message.

use thiserror::Error;

/// Represents errors that can occur during AMQP/RabbitMQ bus operations.
///
/// Variants carrying a `String` hold the text of the underlying transport error,
/// so the enum stays comparable in tests.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmqpError {
    /// Internal errors that don't fit into other categories
    #[error("internal error")]
    InternalError,

    /// Invalid or incomplete configuration, fatal at startup
    #[error("invalid configuration: {0}")]
    ConfigError(String),

    /// Error dialing the broker
    #[error("failure to connect: {0}")]
    ConnectionError(String),

    /// Error creating a channel from an established connection
    #[error("failure to create a channel: {0}")]
    ChannelError(String),

    /// Error switching a channel to publisher-confirm mode
    #[error("failure to enable publisher confirms: {0}")]
    ConfirmSelectError(String),

    /// Error configuring Quality of Service parameters
    #[error("failure to configure qos `{0}`")]
    QoSDeclarationError(String),

    /// Error declaring an exchange with the given name
    #[error("failure to declare an exchange `{0}`")]
    DeclareExchangeError(String),

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    /// Error binding a queue to an exchange
    #[error("failure to bind exchange `{0}` to queue `{1}`")]
    BindingExchangeToQueueError(String, String),

    /// Error declaring a consumer on a queue
    #[error("failure to declare consumer `{0}`")]
    ConsumerDeclarationError(String),

    /// Operation attempted while the bus has no live session
    #[error("bus is not ready")]
    NotReady,

    /// `close` called while the bus was not ready
    #[error("already closed: not connected to the server")]
    AlreadyClosed,

    /// `init` called more than once
    #[error("bus already initialized")]
    AlreadyInitialized,

    /// The bus did not become ready within the configured init timeout
    #[error("bus did not become ready in time")]
    InitTimeout,

    /// Operation abandoned because shutdown was signaled
    #[error("bus is shutting down")]
    ShuttingDown,

    /// Handler registration attempted after consumption started
    #[error("handlers cannot be registered while consuming")]
    ConsumerActive,

    /// `consume` called without any registered handler
    #[error("no handler registered")]
    NoHandlers,

    /// Error writing a message to the channel
    #[error("failure to publish: {0}")]
    PublishingError(String),

    /// Error waiting for a publisher confirmation
    #[error("failure to receive publish confirmation: {0}")]
    ConfirmationError(String),

    /// Reliable publish gave up after the given number of attempts
    #[error("publishing message failed after {0} attempts")]
    PublishFailed(u32),

    /// Delivery does not follow the expected envelope conventions
    #[error("unsupported envelope: {0}")]
    UnsupportedEnvelope(String),

    /// No handler is registered for the routing key
    #[error("unregistered routing key `{0}`")]
    UnregisteredRoute(String),

    /// Error parsing a message payload
    #[error("failure to parse payload: {0}")]
    ParsePayloadError(String),

    /// The handler ran and reported a failure
    #[error("handler failed: {0}")]
    HandlerFailed(String),

    /// Error acknowledging a message
    #[error("failure to ack message: {0}")]
    AckMessageError(String),

    /// Error reading from a delivery stream
    #[error("failure to consume message `{0}`")]
    ConsumerError(String),

    /// Error closing a channel or connection
    #[error("failure to close: {0}")]
    CloseError(String),
}
