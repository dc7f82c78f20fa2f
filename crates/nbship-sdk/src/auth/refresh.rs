//! Single-flight coordination of access-token refresh
//!
//! Any number of requests can hit a 401 while the same stale access token is
//! in circulation. Exactly one of them drives the refresh call; the rest
//! queue up and are woken, in arrival order, once that refresh settles. The
//! runtime invariant: at most one refresh network call is outstanding at any
//! time.

use std::sync::Mutex;

use tokio::sync::{broadcast, oneshot};
use tracing::{debug, warn};

use super::types::TokenSet;

/// Outcome delivered to every request that waited on an in-flight refresh.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    /// The refresh succeeded; the store now holds this credential.
    Refreshed(TokenSet),
    /// The refresh failed; the whole queued batch fails with this reason.
    Failed(String),
}

/// Event broadcast once per fatal session expiry.
///
/// The hosting application subscribes to this to redirect the user to its
/// login surface. Ordinary per-request errors never produce this event.
#[derive(Debug, Clone)]
pub struct SessionExpired {
    pub reason: String,
}

/// The caller's role in an authorization-failure recovery.
pub(crate) enum RefreshRole<'a> {
    /// First 401 in: this caller performs the refresh call.
    Leader(RefreshLease<'a>),
    /// A refresh is already in flight: wait for its outcome.
    Follower(oneshot::Receiver<RefreshOutcome>),
}

/// Leadership over the single in-flight refresh.
///
/// Settling consumes the lease. If the leader's future is dropped before
/// settling (a caller timeout, a `select!` branch losing, UI teardown),
/// `Drop` releases the flag and the queued waiters, so an abandoned refresh
/// can never wedge the coordinator.
pub(crate) struct RefreshLease<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl RefreshLease<'_> {
    /// Settle the refresh and wake every queued waiter in FIFO enqueue order.
    pub(crate) fn settle(mut self, outcome: RefreshOutcome) {
        self.settled = true;
        self.coordinator.settle(outcome);
    }
}

impl Drop for RefreshLease<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        // Dropping the senders wakes every waiter with a receive error,
        // which callers surface as an abandoned refresh.
        let waiters = self.coordinator.drain();
        if !waiters.is_empty() {
            warn!(
                "Refresh abandoned before settling, releasing {} waiter(s)",
                waiters.len()
            );
        }
    }
}

#[derive(Default)]
struct RefreshState {
    in_flight: bool,
    /// Waiters in enqueue order; drained as a whole when the refresh settles.
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
}

/// Serializes token refresh across concurrent requests.
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
    expiry_tx: broadcast::Sender<SessionExpired>,
}

impl Default for RefreshCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        let (expiry_tx, _) = broadcast::channel(8);
        Self {
            state: Mutex::new(RefreshState::default()),
            expiry_tx,
        }
    }

    /// Decide whether the caller drives the refresh or waits on the one
    /// already in flight.
    ///
    /// The check-and-set happens under the lock, with no await point, so two
    /// 401 handlers can never both become leader.
    pub(crate) fn acquire(&self) -> RefreshRole<'_> {
        let mut state = self.lock();
        if state.in_flight {
            let (tx, rx) = oneshot::channel();
            state.waiters.push(tx);
            RefreshRole::Follower(rx)
        } else {
            state.in_flight = true;
            RefreshRole::Leader(RefreshLease {
                coordinator: self,
                settled: false,
            })
        }
    }

    fn settle(&self, outcome: RefreshOutcome) {
        let waiters = self.drain();
        debug!("Refresh settled, waking {} queued request(s)", waiters.len());
        for waiter in waiters {
            // A closed receiver means that caller went away; nothing to do.
            let _ = waiter.send(outcome.clone());
        }
    }

    /// Clear the in-flight flag and hand back the queued waiters.
    fn drain(&self) -> Vec<oneshot::Sender<RefreshOutcome>> {
        let mut state = self.lock();
        state.in_flight = false;
        std::mem::take(&mut state.waiters)
    }

    /// Broadcast session expiry to subscribers. One event per fatal expiry.
    pub(crate) fn notify_session_expired(&self, reason: &str) {
        warn!("Session expired: {}", reason);
        let _ = self.expiry_tx.send(SessionExpired {
            reason: reason.to_string(),
        });
    }

    /// Subscribe to fatal session-expiry events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionExpired> {
        self.expiry_tx.subscribe()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
