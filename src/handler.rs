// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Task Handlers
//!
//! A handler is registered per routing key. Deliveries routed to it carry a
//! `[args, kwargs]` JSON envelope: the handler first parses both parts into its own
//! typed task, then runs the task to completion.
//!
//! # Example
//! ```
//! use async_trait::async_trait;
//! use rabbitmq_bus::handler::{HandlerError, TaskContext, TaskHandler};
//! use serde_json::Value;
//!
//! struct Add;
//!
//! #[async_trait]
//! impl TaskHandler for Add {
//!     type Task = Vec<i64>;
//!
//!     fn parse(&self, args: Value, _kwargs: Value) -> Result<Vec<i64>, HandlerError> {
//!         Ok(serde_json::from_value(args)?)
//!     }
//!
//!     async fn run(&self, _ctx: &TaskContext, task: Vec<i64>) -> Result<(), HandlerError> {
//!         println!("sum = {}", task.iter().sum::<i64>());
//!         Ok(())
//!     }
//! }
//! ```

use crate::errors::AmqpError;
use async_trait::async_trait;
use opentelemetry::Context;
use serde_json::Value;
use std::{collections::HashMap, sync::Arc};
use tokio_util::sync::CancellationToken;

/// Error type returned by handler code.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Per-delivery information handed to [`TaskHandler::run`].
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub queue: String,
    pub routing_key: String,
    pub message_id: Option<String>,
    /// Trace context extracted from the delivery headers
    pub otel: Context,
    /// Cancelled when the bus shuts down or the session that received the delivery ends
    pub cancellation: CancellationToken,
}

/// Business logic bound to one routing key.
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    type Task: Send + 'static;

    /// Builds the typed task from the positional and keyword parts of the envelope.
    fn parse(&self, args: Value, kwargs: Value) -> Result<Self::Task, HandlerError>;

    async fn run(&self, ctx: &TaskContext, task: Self::Task) -> Result<(), HandlerError>;
}

/// Object-safe view of a [`TaskHandler`], used by the dispatcher.
#[async_trait]
pub(crate) trait ErasedHandler: Send + Sync {
    async fn handle(&self, ctx: &TaskContext, args: Value, kwargs: Value)
        -> Result<(), AmqpError>;
}

#[async_trait]
impl<H> ErasedHandler for H
where
    H: TaskHandler,
{
    async fn handle(
        &self,
        ctx: &TaskContext,
        args: Value,
        kwargs: Value,
    ) -> Result<(), AmqpError> {
        let task = self
            .parse(args, kwargs)
            .map_err(|err| AmqpError::ParsePayloadError(err.to_string()))?;

        self.run(ctx, task)
            .await
            .map_err(|err| AmqpError::HandlerFailed(err.to_string()))
    }
}

/// Handlers keyed by routing key.
pub(crate) type HandlerRegistry = HashMap<String, Arc<dyn ErasedHandler>>;
