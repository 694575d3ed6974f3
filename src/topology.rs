// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Topology Management
//!
//! The topology is the set of exchanges, queues and bindings the bus relies on. It is
//! installed on every freshly opened channel, so after any reconnect or reinit the
//! broker state matches the configuration before publishing or consuming resumes.
//! Declarations are idempotent on the broker side.

use crate::{
    configs::BusConfig,
    errors::AmqpError,
    exchange::ExchangeDefinition,
    queue::{QueueBinding, QueueDefinition},
    transport::BusChannel,
};
use tracing::{debug, error};

/// Ordered collection of exchanges, queues and queue bindings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AmqpTopology {
    pub(crate) exchanges: Vec<ExchangeDefinition>,
    pub(crate) queues: Vec<QueueDefinition>,
    pub(crate) queues_binding: Vec<QueueBinding>,
}

impl AmqpTopology {
    pub fn new() -> AmqpTopology {
        AmqpTopology::default()
    }

    /// Builds the topology described by the configuration.
    ///
    /// Exchanges are durable topic exchanges; queues are durable, non-exclusive and
    /// never auto-deleted.
    pub fn from_config(cfg: &BusConfig) -> AmqpTopology {
        let mut topology = AmqpTopology::new();

        for name in &cfg.exchanges {
            topology = topology.exchange(ExchangeDefinition::new(name));
        }

        for name in &cfg.queues {
            topology = topology.queue(QueueDefinition::new(name));
        }

        for binding in &cfg.bindings {
            topology = topology.queue_binding(
                QueueBinding::new(&binding.queue)
                    .exchange(&binding.exchange)
                    .routing_key(&binding.binding_key),
            );
        }

        topology
    }

    /// Adds an exchange definition to the topology.
    pub fn exchange(mut self, def: ExchangeDefinition) -> Self {
        self.exchanges.push(def);
        self
    }

    /// Adds a queue definition to the topology.
    pub fn queue(mut self, def: QueueDefinition) -> Self {
        self.queues.push(def);
        self
    }

    /// Adds a queue-to-exchange binding to the topology.
    pub fn queue_binding(mut self, binding: QueueBinding) -> Self {
        self.queues_binding.push(binding);
        self
    }

    pub fn exchanges(&self) -> &[ExchangeDefinition] {
        &self.exchanges
    }

    pub fn queues(&self) -> &[QueueDefinition] {
        &self.queues
    }

    pub fn bindings(&self) -> &[QueueBinding] {
        &self.queues_binding
    }

    /// Installs the topology on the given channel.
    ///
    /// This method performs the following operations in order, stopping at the
    /// first failure:
    /// 1. Declares all exchanges
    /// 2. Declares all queues
    /// 3. Binds queues to exchanges
    ///
    /// # Returns
    /// Ok(()) on success or AmqpError on failure
    pub async fn install(&self, channel: &dyn BusChannel) -> Result<(), AmqpError> {
        self.install_exchange(channel).await?;
        self.install_queue(channel).await?;
        self.binding_queues(channel).await
    }

    async fn install_exchange(&self, channel: &dyn BusChannel) -> Result<(), AmqpError> {
        for exch in &self.exchanges {
            debug!("creating exchange: {}", exch.name);

            if let Err(err) = channel.declare_exchange(exch).await {
                error!(
                    error = err.to_string(),
                    name = %exch.name,
                    "error to declare the exchange"
                );
                return Err(err);
            }

            debug!("exchange: {} was created", exch.name);
        }

        Ok(())
    }

    async fn install_queue(&self, channel: &dyn BusChannel) -> Result<(), AmqpError> {
        for queue in &self.queues {
            debug!("creating queue: {}", queue.name);

            if let Err(err) = channel.declare_queue(queue).await {
                error!(
                    error = err.to_string(),
                    name = %queue.name,
                    "error to declare the queue"
                );
                return Err(err);
            }

            debug!("queue: {} was created", queue.name);
        }

        Ok(())
    }

    async fn binding_queues(&self, channel: &dyn BusChannel) -> Result<(), AmqpError> {
        for binding in &self.queues_binding {
            debug!(
                "binding queue: {} to the exchange: {} with the key: {}",
                binding.queue_name, binding.exchange_name, binding.routing_key
            );

            if let Err(err) = channel.bind_queue(binding).await {
                error!(error = err.to_string(), "error to bind queue to exchange");
                return Err(err);
            }
        }

        debug!("queues were bound");

        Ok(())
    }
}
