// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Resilient RabbitMQ bus: connection supervision, idempotent topology declaration,
//! confirmed publishing and concurrent consumption with per-routing-key handlers.

mod consumer;
mod dispatcher;
mod otel;
mod session;
mod supervisor;

pub mod channel;
pub mod client;
pub mod configs;
pub mod errors;
pub mod exchange;
pub mod handler;
pub mod publisher;
pub mod queue;
pub mod topology;
pub mod transport;

pub use client::{BusClient, BusStats};
pub use configs::{BindingConfig, BusConfig};
pub use errors::AmqpError;
pub use handler::{HandlerError, TaskContext, TaskHandler};
pub use publisher::OutboundMessage;
