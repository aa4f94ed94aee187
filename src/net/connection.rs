//! Tunnel lifecycle tracking.
//!
//! # Responsibilities
//! - Count upgraded connections (WebSocket tunnels) that outlive their request
//! - Generate unique tunnel IDs for tracing
//! - Let shutdown wait until every tunnel has closed

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

use crate::observability::metrics;

/// Using relaxed ordering is sufficient since we only need uniqueness.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tunnel-{}", self.0)
    }
}

/// Tracks open tunnels for graceful shutdown.
///
/// The count lives in a watch channel so drain waits are woken on change
/// rather than polled.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    active: watch::Sender<u64>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        let (active, _) = watch::channel(0);
        Self { active }
    }

    /// Record a new tunnel. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        self.active.send_modify(|n| *n += 1);
        metrics::tunnel_opened();
        ConnectionGuard {
            active: self.active.clone(),
            id: ConnectionId::new(),
        }
    }

    pub fn active_count(&self) -> u64 {
        *self.active.borrow()
    }

    /// Wait until every tracked tunnel has closed.
    pub async fn wait_for_drain(&self) {
        let mut rx = self.active.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that tracks a tunnel's lifetime.
#[derive(Debug)]
pub struct ConnectionGuard {
    active: watch::Sender<u64>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active.send_modify(|n| *n = n.saturating_sub(1));
        metrics::tunnel_closed();
        tracing::trace!(connection_id = %self.id, "Tunnel closed");
    }
}
