// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Current session state.
//!
//! The connection, the channel and readiness are published together as one
//! `Option<Arc<Session>>`: `Some` means the topology has been declared on a live
//! channel since the last failure. Readers always get a consistent snapshot.

use crate::transport::{BusChannel, BusConnection};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

pub(crate) struct Session {
    pub(crate) connection: Arc<dyn BusConnection>,
    pub(crate) channel: Arc<dyn BusChannel>,
    /// Child of the bus shutdown token, cancelled when this session is torn down.
    pub(crate) cancel: CancellationToken,
    /// Cancelled by a delivery loop whose stream ended while the session was live.
    pub(crate) fault: CancellationToken,
    dispatching: AtomicBool,
}

impl Session {
    pub(crate) fn new(
        connection: Arc<dyn BusConnection>,
        channel: Arc<dyn BusChannel>,
        cancel: CancellationToken,
    ) -> Self {
        Session {
            connection,
            channel,
            cancel,
            fault: CancellationToken::new(),
            dispatching: AtomicBool::new(false),
        }
    }

    /// Returns true only for the first caller; consumers start once per session.
    pub(crate) fn claim_dispatch(&self) -> bool {
        !self.dispatching.swap(true, Ordering::SeqCst)
    }
}

pub(crate) struct SessionState {
    tx: watch::Sender<Option<Arc<Session>>>,
}

impl SessionState {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(None);
        SessionState { tx }
    }

    pub(crate) fn current(&self) -> Option<Arc<Session>> {
        self.tx.borrow().clone()
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub(crate) fn install(&self, session: Arc<Session>) {
        if let Some(old) = self.tx.send_replace(Some(session)) {
            old.cancel.cancel();
        }
    }

    /// Clears readiness and tears down the session that was current, if any.
    pub(crate) fn take(&self) -> Option<Arc<Session>> {
        let old = self.tx.send_replace(None);
        if let Some(session) = &old {
            session.cancel.cancel();
        }
        old
    }

    /// Waits until a session is installed.
    pub(crate) async fn wait_ready(&self) -> Option<Arc<Session>> {
        let mut rx = self.tx.subscribe();
        let ready = rx.wait_for(Option::is_some).await.ok()?;
        (*ready).clone()
    }
}
