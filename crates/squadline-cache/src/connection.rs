//! Connection lifecycle for the backing store.
//!
//! ## State Machine
//!
//! ```text
//! Disconnected ──connect()──▶ Connecting ──probe ok──▶ Ready
//!       ▲                         │                      │
//!       └──────probe failed───────┘                      │
//!       └──────────connection error / close()────────────┘
//! ```
//!
//! Every other component asks [`ConnectionManager::is_ready`] before issuing a
//! command and treats "not ready" as a soft condition. Connection-class
//! failures observed on live traffic flip the state to `Disconnected` and start
//! a background re-probe with exponential backoff; new connections themselves
//! are created by the pool on demand.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::error::{StoreError, StoreResult};
use crate::metrics;
use crate::store::KeyValueStore;

/// Readiness of the link to the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            2 => ConnectionState::Ready,
            1 => ConnectionState::Connecting,
            _ => ConnectionState::Disconnected,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Ready => 2,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Ready => write!(f, "ready"),
        }
    }
}

/// Owns the store handle and mirrors its connect/error/close events.
pub struct ConnectionManager {
    store: Arc<dyn KeyValueStore>,
    state: AtomicU8,
    closed: AtomicBool,
    reconnect_initial: Duration,
    reconnect_max: Duration,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Create a manager in the `Disconnected` state with default backoff (1s..60s).
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_backoff(store, Duration::from_secs(1), Duration::from_secs(60))
    }

    pub fn with_backoff(store: Arc<dyn KeyValueStore>, initial: Duration, max: Duration) -> Self {
        Self {
            store,
            state: AtomicU8::new(ConnectionState::Disconnected.as_u8()),
            closed: AtomicBool::new(false),
            reconnect_initial: initial,
            reconnect_max: max.max(initial),
            monitor: Mutex::new(None),
        }
    }

    /// The store commands are issued against.
    pub fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// True only after a successful connect with no later error/close, and
    /// while the client itself reports the link usable.
    pub fn is_ready(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
            && self.state() == ConnectionState::Ready
            && self.store.client_ready()
    }

    fn transition(&self, next: ConnectionState) -> ConnectionState {
        let prev = ConnectionState::from_u8(self.state.swap(next.as_u8(), Ordering::SeqCst));
        if prev != next {
            tracing::debug!(from = %prev, to = %next, backend = self.backend_name(), "connection state changed");
            metrics::set_connection_ready(next == ConnectionState::Ready);
        }
        prev
    }

    async fn probe(&self) -> StoreResult<()> {
        self.transition(ConnectionState::Connecting);
        match self.store.ping().await {
            Ok(()) => {
                self.transition(ConnectionState::Ready);
                Ok(())
            }
            Err(e) => {
                self.transition(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Establish the link. On failure the manager stays `Disconnected` and
    /// keeps re-probing in the background; callers see soft failures meanwhile.
    pub async fn connect(self: &Arc<Self>) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            tracing::warn!("connect called on a closed cache connection");
            return false;
        }
        match self.probe().await {
            Ok(()) => {
                tracing::info!(backend = self.backend_name(), "Cache store connected");
                true
            }
            Err(e) => {
                tracing::error!(backend = self.backend_name(), error = %e, "Cache store connection failed");
                self.spawn_reconnect();
                false
            }
        }
    }

    /// Feed a failed command back into the state machine. Connection-class
    /// errors mark the link down and start re-probing; command errors don't.
    pub fn observe_error(self: &Arc<Self>, err: &StoreError) {
        if !err.is_connection() || self.closed.load(Ordering::SeqCst) {
            return;
        }
        if self.transition(ConnectionState::Disconnected) == ConnectionState::Ready {
            tracing::warn!(backend = self.backend_name(), error = %err, "Cache store connection lost");
        }
        self.spawn_reconnect();
    }

    fn spawn_reconnect(self: &Arc<Self>) {
        let mut guard = self.monitor.lock();
        if guard.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let weak: Weak<Self> = Arc::downgrade(self);
        let initial = self.reconnect_initial;
        let max = self.reconnect_max;

        *guard = Some(tokio::spawn(async move {
            let mut backoff = initial;
            loop {
                tokio::time::sleep(backoff).await;
                let Some(manager) = weak.upgrade() else {
                    return;
                };
                if manager.closed.load(Ordering::SeqCst) {
                    return;
                }
                match manager.probe().await {
                    Ok(()) => {
                        tracing::info!(backend = manager.backend_name(), "Cache store reconnected");
                        return;
                    }
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            backoff_secs = backoff.as_secs(),
                            "Cache store still unreachable, retrying"
                        );
                        backoff = (backoff * 2).min(max);
                    }
                }
            }
        }));
    }

    /// Stop re-probing and release the store. The manager cannot be reused.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.monitor.lock().take() {
            handle.abort();
        }
        self.store.close().await;
        self.transition(ConnectionState::Disconnected);
        tracing::info!(backend = self.backend_name(), "Cache store connection closed");
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(handle) = self.monitor.get_mut().take() {
            handle.abort();
        }
    }
}
