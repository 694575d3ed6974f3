// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Connection Supervisor and Channel Initializer
//!
//! The supervisor owns the outer loop: dial the broker with a fixed delay between
//! failed attempts, then hand the connection to the initializer. The initializer opens
//! a channel, enables publisher confirms, declares the topology and publishes the new
//! session. It then waits for one of:
//! - shutdown, which ends both loops
//! - connection closure, which sends control back to the supervisor to redial
//! - channel closure, which reruns initialization on the same connection
//! - a session fault raised by a delivery loop, which closes the channel and reruns
//!   initialization on the same connection
//!
//! Readiness is cleared at the top of every iteration of both loops.

use crate::{
    client::BusInner,
    errors::AmqpError,
    session::Session,
    transport::{BusChannel, BusConnection},
};
use std::sync::{atomic::Ordering, Arc};
use tracing::{debug, error, info, warn};

/// Why the initializer gave control back to the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionEnd {
    Shutdown,
    ConnectionLost,
}

impl BusInner {
    /// Runs until shutdown.
    pub(crate) async fn supervise(self: Arc<Self>) {
        let broker = self.config.redacted_broker_url();
        let reconnect_delay = self.config.reconnect_delay_duration();

        loop {
            self.session.take();
            if self.shutdown.is_cancelled() {
                break;
            }

            info!(broker = %broker, "attempting to connect");

            let dialed = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                dialed = self.transport.dial(&self.config.broker_url) => dialed,
            };

            let connection = match dialed {
                Ok(connection) => connection,
                Err(err) => {
                    warn!(error = err.to_string(), broker = %broker, "failed to connect, retrying");
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(reconnect_delay) => {}
                    }
                    continue;
                }
            };

            self.counters.connections.fetch_add(1, Ordering::SeqCst);
            info!(broker = %broker, "connected");

            match self.reinit(connection).await {
                SessionEnd::Shutdown => break,
                SessionEnd::ConnectionLost => info!("connection closed, reconnecting..."),
            }
        }

        // A session installed while shutdown was already under way has no other owner.
        if let Some(session) = self.session.take() {
            let _ = release(session.channel.as_ref(), session.connection.as_ref()).await;
        }

        debug!("supervisor stopped");
    }

    /// (Re)initializes sessions on `connection` until it is lost or shutdown is signaled.
    pub(crate) async fn reinit(self: &Arc<Self>, connection: Arc<dyn BusConnection>) -> SessionEnd {
        let reinit_delay = self.config.reinit_delay_duration();

        loop {
            self.session.take();

            let opened = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    close_connection(connection.as_ref()).await;
                    return SessionEnd::Shutdown;
                }
                opened = self.open_session(connection.as_ref()) => opened,
            };

            let channel = match opened {
                Ok(channel) => channel,
                Err(err) => {
                    warn!(error = err.to_string(), "failed to initialize channel, retrying");
                    tokio::select! {
                        _ = self.shutdown.cancelled() => {
                            close_connection(connection.as_ref()).await;
                            return SessionEnd::Shutdown;
                        }
                        _ = connection.closed() => return SessionEnd::ConnectionLost,
                        _ = tokio::time::sleep(reinit_delay) => {}
                    }
                    continue;
                }
            };

            let session = Arc::new(Session::new(
                connection.clone(),
                channel.clone(),
                self.shutdown.child_token(),
            ));
            let fault = session.fault.clone();
            self.session.install(session.clone());
            self.counters.sessions.fetch_add(1, Ordering::SeqCst);

            if self.has_handlers() {
                let inner = self.clone();
                self.tracker.spawn(async move {
                    if let Err(err) = inner.start_dispatch(&session).await {
                        error!(error = err.to_string(), "errors occur when consume");
                    }
                });
            }

            info!("init finished");

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return SessionEnd::Shutdown,
                _ = connection.closed() => return SessionEnd::ConnectionLost,
                _ = channel.closed() => info!("channel closed, rerunning init..."),
                _ = fault.cancelled() => {
                    warn!("consumer lost on a live channel, rerunning init...");
                    self.session.take();
                    if let Err(err) = channel.close().await {
                        debug!(error = err.to_string(), "discarding faulted channel");
                    }
                }
            }
        }
    }

    /// Opens a channel in confirm mode with the topology declared on it.
    async fn open_session(
        &self,
        connection: &dyn BusConnection,
    ) -> Result<Arc<dyn BusChannel>, AmqpError> {
        let channel = connection.open_channel().await?;

        if let Err(err) = self.prepare_channel(channel.as_ref()).await {
            if let Err(close_err) = channel.close().await {
                debug!(error = close_err.to_string(), "discarding failed channel");
            }
            return Err(err);
        }

        Ok(channel)
    }

    async fn prepare_channel(&self, channel: &dyn BusChannel) -> Result<(), AmqpError> {
        channel.confirm_select().await?;
        self.topology.install(channel).await
    }
}

/// Closes a channel then its connection.
///
/// # Returns
/// The first failure, after attempting both
pub(crate) async fn release(
    channel: &dyn BusChannel,
    connection: &dyn BusConnection,
) -> Result<(), AmqpError> {
    let closed_channel = channel.close().await;
    if let Err(err) = &closed_channel {
        warn!(error = err.to_string(), "close channel failed");
    }

    let closed_connection = connection.close().await;
    if let Err(err) = &closed_connection {
        warn!(error = err.to_string(), "close connection failed");
    }

    closed_channel.and(closed_connection)
}

async fn close_connection(connection: &dyn BusConnection) {
    if let Err(err) = connection.close().await {
        warn!(error = err.to_string(), "close connection failed");
    }
}
