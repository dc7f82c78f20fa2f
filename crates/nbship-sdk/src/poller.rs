//! Polling for long-running backend operations
//!
//! Builds and deploy pipelines run for minutes on the backend; the console
//! tracks them by fetching their status on a fixed cadence. Each tracked
//! operation id owns at most one polling session: a spawned task holding a
//! timer, a cancellation token, and a watch channel carrying the last
//! observed state for the UI to render.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::NbshipClient;
use crate::error::Result;
use crate::types::{Build, Pipeline, PolledOperation};

/// Fetches the current state of one operation by id.
#[async_trait]
pub trait OperationFetch: Send + Sync + 'static {
    type Operation: PolledOperation;

    async fn fetch(&self, id: &str) -> Result<Self::Operation>;
}

/// Fetches build status through the Nbship API
pub struct BuildFetcher {
    client: Arc<NbshipClient>,
}

impl BuildFetcher {
    pub fn new(client: Arc<NbshipClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OperationFetch for BuildFetcher {
    type Operation = Build;

    async fn fetch(&self, id: &str) -> Result<Build> {
        self.client.get_build(id).await
    }
}

/// Fetches pipeline status through the Nbship API
pub struct PipelineFetcher {
    client: Arc<NbshipClient>,
}

impl PipelineFetcher {
    pub fn new(client: Arc<NbshipClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OperationFetch for PipelineFetcher {
    type Operation = Pipeline;

    async fn fetch(&self, id: &str) -> Result<Pipeline> {
        self.client.get_pipeline(id).await
    }
}

/// One active polling session for one operation id
struct PollSession<Op> {
    generation: u64,
    task: JoinHandle<()>,
    cancel: CancellationToken,
    updates: watch::Receiver<Option<Op>>,
}

/// Drives periodic status fetches for long-running operations.
///
/// At most one session exists per operation id; starting an id that is
/// already polling is a no-op that returns the existing update channel.
pub struct OperationPoller<F: OperationFetch> {
    fetcher: Arc<F>,
    sessions: Arc<RwLock<HashMap<String, PollSession<F::Operation>>>>,
    next_generation: AtomicU64,
}

impl<F: OperationFetch> OperationPoller<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Start polling an operation at the given interval.
    ///
    /// The first fetch happens immediately, then once per interval. The
    /// session ends when the operation reaches a terminal status (within the
    /// tick that observed it), or when [`stop_polling`](Self::stop_polling)
    /// cancels it. A failed fetch is logged and skipped; the loop carries on
    /// with the last known state intact.
    ///
    /// Returns a watch channel with the most recently observed state.
    pub async fn start_polling(
        &self,
        id: &str,
        poll_interval: Duration,
    ) -> watch::Receiver<Option<F::Operation>> {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get(id) {
            if !session.task.is_finished() {
                debug!("Already polling operation {}", id);
                return session.updates.clone();
            }
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(None);
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let fetcher = Arc::clone(&self.fetcher);
        let sessions_ref = Arc::clone(&self.sessions);
        let op_id = id.to_string();

        let task = tokio::spawn(async move {
            let mut ticks = interval(poll_interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => {
                        debug!("Polling for operation {} cancelled", op_id);
                        break;
                    }
                    _ = ticks.tick() => {
                        match fetcher.fetch(&op_id).await {
                            Ok(operation) => {
                                let terminal = operation.is_terminal();
                                // All receivers may be gone; keep polling anyway.
                                let _ = tx.send(Some(operation));
                                if terminal {
                                    info!(
                                        "Operation {} reached a terminal status, stopping poll",
                                        op_id
                                    );
                                    break;
                                }
                            }
                            Err(e) => {
                                // A single failed tick is a blip, not a stop
                                // condition; the last known state stands.
                                warn!("Status fetch for operation {} failed: {}", op_id, e);
                            }
                        }
                    }
                }
            }

            // Natural termination releases the session, unless a newer
            // session already took over this id.
            let mut sessions = sessions_ref.write().await;
            if sessions.get(&op_id).map(|s| s.generation) == Some(generation) {
                sessions.remove(&op_id);
            }
        });

        sessions.insert(
            id.to_string(),
            PollSession {
                generation,
                task,
                cancel,
                updates: rx.clone(),
            },
        );
        info!("Started polling operation {}", id);
        rx
    }

    /// Stop polling an operation.
    ///
    /// Idempotent; calling it for an unknown id or after the session already
    /// terminated naturally is a no-op.
    pub async fn stop_polling(&self, id: &str) {
        let session = self.sessions.write().await.remove(id);
        if let Some(session) = session {
            session.cancel.cancel();
            debug!("Stopped polling operation {}", id);
        }
    }

    /// Whether a live polling session exists for this id.
    pub async fn is_polling(&self, id: &str) -> bool {
        self.sessions
            .read()
            .await
            .get(id)
            .map(|session| !session.task.is_finished())
            .unwrap_or(false)
    }

    /// The last observed state of an operation with a live session.
    pub async fn status(&self, id: &str) -> Option<F::Operation> {
        self.sessions
            .read()
            .await
            .get(id)
            .and_then(|session| session.updates.borrow().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::types::BuildStatus;
    use chrono::Utc;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    fn build(status: BuildStatus) -> Build {
        Build {
            id: "b1".into(),
            status,
            model_id: "m1".into(),
            created_at: Utc::now(),
        }
    }

    /// Replays a fixed status sequence, one entry per fetch.
    struct ScriptedFetcher {
        script: Mutex<VecDeque<Result<Build>>>,
        calls: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn new(script: Vec<Result<Build>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OperationFetch for Arc<ScriptedFetcher> {
        type Operation = Build;

        async fn fetch(&self, _id: &str) -> Result<Build> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Err(ApiError::Internal {
                        message: "status script exhausted".into(),
                    })
                })
        }
    }

    const TICK: Duration = Duration::from_secs(1);

    async fn wait_until_stopped(poller: &OperationPoller<Arc<ScriptedFetcher>>, id: &str) {
        while poller.is_polling(id).await {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_status_stops_within_its_own_tick() {
        // P6: queued, building, building, success takes exactly 4 ticks.
        let fetcher = Arc::new(ScriptedFetcher::new(vec![
            Ok(build(BuildStatus::Queued)),
            Ok(build(BuildStatus::Building)),
            Ok(build(BuildStatus::Building)),
            Ok(build(BuildStatus::Success)),
        ]));
        let poller = OperationPoller::new(Arc::clone(&fetcher));

        let rx = poller.start_polling("b1", TICK).await;
        wait_until_stopped(&poller, "b1").await;

        assert_eq!(fetcher.calls(), 4);
        assert_eq!(
            rx.borrow().as_ref().map(|op| op.status),
            Some(BuildStatus::Success)
        );

        // No fifth tick ever fires.
        tokio::time::sleep(TICK * 3).await;
        assert_eq!(fetcher.calls(), 4);
        assert!(!poller.is_polling("b1").await);
    }

    #[tokio::test(start_paused = true)]
    async fn double_start_runs_one_timer() {
        // P5: a second start for the same id is a no-op.
        let fetcher = Arc::new(ScriptedFetcher::new(vec![
            Ok(build(BuildStatus::Queued)),
            Ok(build(BuildStatus::Building)),
            Ok(build(BuildStatus::Success)),
        ]));
        let poller = OperationPoller::new(Arc::clone(&fetcher));

        poller.start_polling("b1", TICK).await;
        poller.start_polling("b1", TICK).await;
        assert!(poller.is_polling("b1").await);

        wait_until_stopped(&poller, "b1").await;
        // Two concurrent loops would have burned through the script twice.
        assert_eq!(fetcher.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_tick_neither_stops_nor_clobbers_state() {
        // P7: a blip between two good ticks is invisible in the state.
        let fetcher = Arc::new(ScriptedFetcher::new(vec![
            Ok(build(BuildStatus::Queued)),
            Err(ApiError::Internal {
                message: "transient".into(),
            }),
            Ok(build(BuildStatus::Success)),
        ]));
        let poller = OperationPoller::new(Arc::clone(&fetcher));

        let rx = poller.start_polling("b1", TICK).await;

        // Past the failed second tick: still polling, last state untouched.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(fetcher.calls(), 2);
        assert!(poller.is_polling("b1").await);
        assert_eq!(
            rx.borrow().as_ref().map(|op| op.status),
            Some(BuildStatus::Queued)
        );

        wait_until_stopped(&poller, "b1").await;
        assert_eq!(fetcher.calls(), 3);
        assert_eq!(
            rx.borrow().as_ref().map(|op| op.status),
            Some(BuildStatus::Success)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_safe_after_natural_end() {
        // P8
        let fetcher = Arc::new(ScriptedFetcher::new(vec![Ok(build(BuildStatus::Failed))]));
        let poller = OperationPoller::new(Arc::clone(&fetcher));

        poller.start_polling("b1", TICK).await;
        wait_until_stopped(&poller, "b1").await;

        poller.stop_polling("b1").await;
        poller.stop_polling("b1").await;
        poller.stop_polling("never-started").await;
        assert!(!poller.is_polling("b1").await);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_releases_the_timer() {
        let script = std::iter::repeat_with(|| Ok(build(BuildStatus::Building)))
            .take(20)
            .collect();
        let fetcher = Arc::new(ScriptedFetcher::new(script));
        let poller = OperationPoller::new(Arc::clone(&fetcher));

        poller.start_polling("b1", TICK).await;
        tokio::time::sleep(Duration::from_millis(2500)).await;
        poller.stop_polling("b1").await;
        let calls_at_stop = fetcher.calls();
        assert_eq!(calls_at_stop, 3);

        tokio::time::sleep(TICK * 5).await;
        assert_eq!(fetcher.calls(), calls_at_stop);
        assert!(!poller.is_polling("b1").await);
    }

    #[tokio::test(start_paused = true)]
    async fn build_ends_failed_after_third_tick() {
        // Scenario C: queued -> building -> failed.
        let fetcher = Arc::new(ScriptedFetcher::new(vec![
            Ok(build(BuildStatus::Queued)),
            Ok(build(BuildStatus::Building)),
            Ok(build(BuildStatus::Failed)),
        ]));
        let poller = OperationPoller::new(Arc::clone(&fetcher));

        let rx = poller.start_polling("b1", TICK).await;
        wait_until_stopped(&poller, "b1").await;

        assert_eq!(fetcher.calls(), 3);
        assert_eq!(
            rx.borrow().as_ref().map(|op| op.status),
            Some(BuildStatus::Failed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn restart_after_termination_is_a_fresh_session() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![
            Ok(build(BuildStatus::Success)),
            Ok(build(BuildStatus::Success)),
        ]));
        let poller = OperationPoller::new(Arc::clone(&fetcher));

        poller.start_polling("b1", TICK).await;
        wait_until_stopped(&poller, "b1").await;
        assert_eq!(fetcher.calls(), 1);

        poller.start_polling("b1", TICK).await;
        wait_until_stopped(&poller, "b1").await;
        assert_eq!(fetcher.calls(), 2);
    }
}
