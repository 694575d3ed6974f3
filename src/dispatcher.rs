// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Consumer Dispatcher
//!
//! Starts one delivery loop per configured queue on a session's channel. Loops run on
//! the bus task tracker, so `consume` and `close` can wait for all of them to finish.
//! A loop stops when its session is torn down or the bus shuts down. A stream ended by
//! the broker while the session is still live marks the session as faulted, which makes
//! the initializer replace the channel.

use crate::{
    client::BusInner, consumer::consume, errors::AmqpError, handler::HandlerRegistry,
    session::Session, transport::DeliveryStream,
};
use futures_util::StreamExt;
use opentelemetry::global;
use std::sync::{atomic::Ordering, Arc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Delivery loop for a single queue.
pub(crate) struct QueueWorker {
    queue: String,
    stream: DeliveryStream,
    handlers: Arc<HandlerRegistry>,
    cancel: CancellationToken,
    fault: CancellationToken,
}

impl QueueWorker {
    pub(crate) fn new(
        queue: &str,
        stream: DeliveryStream,
        handlers: Arc<HandlerRegistry>,
        cancel: CancellationToken,
        fault: CancellationToken,
    ) -> Self {
        QueueWorker {
            queue: queue.to_owned(),
            stream,
            handlers,
            cancel,
            fault,
        }
    }

    pub(crate) async fn run(mut self) {
        let tracer = global::tracer("amqp consumer");
        debug!(queue = %self.queue, "delivery loop started");

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(queue = %self.queue, "delivery loop cancelled");
                    break;
                }
                next = self.stream.next() => match next {
                    None => {
                        if !self.cancel.is_cancelled() {
                            error!(queue = %self.queue, "delivery stream ended by the broker, reinitializing");
                            self.fault.cancel();
                        }
                        break;
                    }
                    Some(Err(err)) => {
                        error!(error = err.to_string(), queue = %self.queue, "errors consume msg");
                    }
                    Some(Ok(delivery)) => {
                        if let Err(err) = consume(
                            &tracer,
                            delivery,
                            &self.queue,
                            &self.handlers,
                            &self.cancel,
                        )
                        .await
                        {
                            error!(error = err.to_string(), queue = %self.queue, "error consume msg");
                        }
                    }
                }
            }
        }
    }
}

impl BusInner {
    /// Starts the delivery loops of `session`, once per session.
    ///
    /// Applies the configured prefetch, then declares one consumer per configured queue.
    ///
    /// # Returns
    /// Ok(()) when every consumer was declared or dispatch was already running
    pub(crate) async fn start_dispatch(&self, session: &Arc<Session>) -> Result<(), AmqpError> {
        if !session.claim_dispatch() {
            return Ok(());
        }

        let handlers = {
            let registry = self
                .handlers
                .write()
                .map_err(|_| AmqpError::InternalError)?;
            self.consuming.store(true, Ordering::SeqCst);
            Arc::clone(&registry)
        };

        if let Err(err) = session.channel.qos(self.config.prefetch).await {
            warn!(error = err.to_string(), "set qos failed");
        }

        for queue in &self.config.queues {
            let consumer_tag = format!("{}-{}", self.config.consumer_tag_prefix, Uuid::new_v4());
            let stream = session.channel.consume(queue, &consumer_tag).await?;

            let worker = QueueWorker::new(
                queue,
                stream,
                handlers.clone(),
                session.cancel.clone(),
                session.fault.clone(),
            );
            self.tracker.spawn(worker.run());
            info!(queue = %queue, consumer_tag = %consumer_tag, "consuming");
        }

        Ok(())
    }
}
