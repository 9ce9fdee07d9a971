use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use serde_json::Value;

use super::{PushScheduler, RemoteStore};
use crate::store::DatasetStore;

/// What a finished remote task did to local state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// `applied` is false when the remote was empty or had an invalid shape.
    Pulled { applied: bool },
    Pushed,
    PullFailed(String),
    PushFailed(String),
}

enum Completion {
    Pulled(Result<Option<Value>>),
    Pushed(Result<()>),
}

/// Runs remote pulls and pushes on worker threads and applies their results
/// back on the owning thread during [`tick`](Self::tick).
///
/// Pushes are debounced through a [`PushScheduler`] and never cancelled once
/// started. A pull that completes after local edits overwrites them.
pub struct SyncController {
    remote: Arc<dyn RemoteStore>,
    scheduler: PushScheduler,
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
    in_flight: usize,
}

impl SyncController {
    pub fn new(remote: Arc<dyn RemoteStore>, debounce: Duration) -> Self {
        let (tx, rx) = unbounded();
        Self {
            remote,
            scheduler: PushScheduler::new(debounce),
            tx,
            rx,
            in_flight: 0,
        }
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    pub fn has_pending_push(&self) -> bool {
        self.scheduler.is_pending()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Restarts the push debounce window.
    pub fn note_mutation(&mut self, now: Instant) {
        self.scheduler.schedule(now);
    }

    /// Starts a background pull; its result is applied by a later `tick`.
    pub fn request_pull(&mut self) {
        let remote = Arc::clone(&self.remote);
        self.spawn("annals-pull", move || Completion::Pulled(remote.pull()));
    }

    /// Fires a due push and applies every completion that has arrived.
    pub fn tick(&mut self, store: &mut DatasetStore, now: Instant) -> Vec<SyncOutcome> {
        if self.scheduler.take_due(now) {
            self.start_push(store);
        }
        let mut outcomes = Vec::new();
        while let Ok(completion) = self.rx.try_recv() {
            outcomes.push(self.apply(store, completion));
        }
        outcomes
    }

    /// Blocks until every started task has reported back or `timeout`
    /// elapses.
    pub fn wait_idle(&mut self, store: &mut DatasetStore, timeout: Duration) -> Vec<SyncOutcome> {
        let deadline = Instant::now() + timeout;
        let mut outcomes = Vec::new();
        while self.in_flight > 0 {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(left) {
                Ok(completion) => outcomes.push(self.apply(store, completion)),
                Err(RecvTimeoutError::Timeout) => {
                    tracing::warn!(in_flight = self.in_flight, "remote tasks still running");
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        outcomes
    }

    /// Synchronous pull for command-line use.
    pub fn pull_now(&mut self, store: &mut DatasetStore) -> SyncOutcome {
        let result = self.remote.pull();
        self.apply_pull(store, result)
    }

    /// Pushes immediately if a push is pending (or `force` is set), on the
    /// calling thread. Failures are logged and reported, never raised.
    pub fn flush(&mut self, store: &DatasetStore, force: bool) -> Option<SyncOutcome> {
        let pending = self.scheduler.cancel();
        if !pending && !force {
            return None;
        }
        let outcome = match snapshot(store) {
            Ok(value) => self.remote.push(&value),
            Err(err) => Err(err),
        };
        Some(push_outcome(outcome))
    }

    fn start_push(&mut self, store: &DatasetStore) {
        let value = match snapshot(store) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(?err, "could not snapshot dataset for push");
                return;
            }
        };
        let remote = Arc::clone(&self.remote);
        self.spawn("annals-push", move || Completion::Pushed(remote.push(&value)));
    }

    fn spawn<F>(&mut self, name: &str, task: F)
    where
        F: FnOnce() -> Completion + Send + 'static,
    {
        let tx = self.tx.clone();
        let spawned = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _ = tx.send(task());
            });
        match spawned {
            Ok(_) => self.in_flight += 1,
            Err(err) => tracing::warn!(?err, task = name, "failed to start remote task"),
        }
    }

    fn apply(&mut self, store: &mut DatasetStore, completion: Completion) -> SyncOutcome {
        self.in_flight = self.in_flight.saturating_sub(1);
        match completion {
            Completion::Pulled(result) => self.apply_pull(store, result),
            Completion::Pushed(result) => push_outcome(result),
        }
    }

    fn apply_pull(&self, store: &mut DatasetStore, result: Result<Option<Value>>) -> SyncOutcome {
        match result {
            Ok(Some(value)) => match store.replace_from_remote(value) {
                Ok(applied) => {
                    if applied {
                        tracing::info!(remote = %self.remote.describe(), "remote snapshot applied");
                    }
                    SyncOutcome::Pulled { applied }
                }
                Err(err) => {
                    tracing::warn!(?err, "failed to apply remote snapshot");
                    SyncOutcome::PullFailed(format!("{err:#}"))
                }
            },
            Ok(None) => {
                tracing::info!(remote = %self.remote.describe(), "remote document is empty");
                SyncOutcome::Pulled { applied: false }
            }
            Err(err) => {
                tracing::warn!(?err, "remote pull failed");
                SyncOutcome::PullFailed(format!("{err:#}"))
            }
        }
    }
}

fn snapshot(store: &DatasetStore) -> Result<Value> {
    serde_json::to_value(store.dataset()).context("serialising dataset for push")
}

fn push_outcome(result: Result<()>) -> SyncOutcome {
    match result {
        Ok(()) => {
            tracing::debug!("remote push complete");
            SyncOutcome::Pushed
        }
        Err(err) => {
            tracing::warn!(?err, "remote push failed");
            SyncOutcome::PushFailed(format!("{err:#}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Event;
    use crate::storage::tests::init_storage;
    use crate::sync::MemoryRemote;
    use assert_matches::assert_matches;
    use serde_json::json;

    const DEBOUNCE: Duration = Duration::from_millis(1200);
    const WAIT: Duration = Duration::from_secs(5);

    fn setup() -> anyhow::Result<(tempfile::TempDir, DatasetStore, Arc<MemoryRemote>, SyncController)>
    {
        let (temp, storage) = init_storage()?;
        let store = DatasetStore::load(storage)?;
        let remote = Arc::new(MemoryRemote::new());
        let controller = SyncController::new(remote.clone(), DEBOUNCE);
        Ok((temp, store, remote, controller))
    }

    #[test]
    fn burst_of_edits_collapses_into_one_push_of_latest_state() -> anyhow::Result<()> {
        let (_temp, mut store, remote, mut sync) = setup()?;
        let start = Instant::now();
        for (step, id) in ["a", "b", "c"].into_iter().enumerate() {
            store.dataset_mut().events.push(Event::new(id, id, Some(5)));
            store.commit()?;
            sync.note_mutation(start + Duration::from_millis(step as u64 * 500));
        }

        assert!(sync.tick(&mut store, start + DEBOUNCE).is_empty());
        assert_eq!(sync.in_flight(), 0);

        let mut outcomes = sync.tick(&mut store, start + Duration::from_millis(2200));
        outcomes.extend(sync.wait_idle(&mut store, WAIT));
        assert_eq!(outcomes, vec![SyncOutcome::Pushed]);
        assert_eq!(remote.push_count(), 1);

        let pushed = remote.document().unwrap_or_default();
        assert_eq!(pushed["events"].as_array().map(Vec::len), Some(5));
        Ok(())
    }

    #[test]
    fn pull_overwrites_local_edits() -> anyhow::Result<()> {
        let (_temp, mut store, remote, mut sync) = setup()?;
        remote.set_document(json!({
            "events": [{"id": "remote", "title": "بعيد", "year": 4}],
            "biographies": {},
            "places": {}
        }));
        let changes = store.subscribe();
        sync.request_pull();
        store.dataset_mut().events.push(Event::new("local", "محلي", Some(4)));
        store.commit()?;

        let outcomes = sync.wait_idle(&mut store, WAIT);
        assert_eq!(outcomes, vec![SyncOutcome::Pulled { applied: true }]);
        let ids: Vec<_> = store.dataset().events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["remote"]);
        let signals: Vec<_> = changes.try_iter().collect();
        assert_eq!(
            signals,
            vec![crate::store::StoreEvent::Mutated, crate::store::StoreEvent::Replaced]
        );
        Ok(())
    }

    #[test]
    fn failures_are_swallowed_and_state_kept() -> anyhow::Result<()> {
        let (_temp, mut store, remote, mut sync) = setup()?;
        remote.set_failing(true);
        let before = store.dataset().clone();

        assert_matches!(sync.pull_now(&mut store), SyncOutcome::PullFailed(_));
        assert_eq!(store.dataset(), &before);

        sync.note_mutation(Instant::now());
        assert_matches!(sync.flush(&store, false), Some(SyncOutcome::PushFailed(_)));
        assert!(!sync.has_pending_push());
        Ok(())
    }

    #[test]
    fn empty_or_invalid_remote_leaves_local_data() -> anyhow::Result<()> {
        let (_temp, mut store, remote, mut sync) = setup()?;
        assert_eq!(sync.pull_now(&mut store), SyncOutcome::Pulled { applied: false });

        remote.set_document(json!({"events": "nope"}));
        assert_eq!(sync.pull_now(&mut store), SyncOutcome::Pulled { applied: false });
        assert!(store.dataset().contains_event("badr"));
        Ok(())
    }

    #[test]
    fn flush_without_pending_push_is_a_no_op_unless_forced() -> anyhow::Result<()> {
        let (_temp, store, remote, mut sync) = setup()?;
        assert_eq!(sync.flush(&store, false), None);
        assert_eq!(sync.flush(&store, true), Some(SyncOutcome::Pushed));
        assert_eq!(remote.push_count(), 1);
        Ok(())
    }
}
