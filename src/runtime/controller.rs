use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::adapter::CrudAdapter;
use super::backoff::Backoff;
use super::binding::ResourceBinding;
use super::engine::{Action, Reconciler};
use super::error::ReconcileError;
use super::queue::WorkQueue;
use super::store::{ObjectKey, ObjectStore, WatchEvent};
use crate::config::ReconcilerConfig;

type CancelMap = DashMap<ObjectKey, CancellationToken>;

/// Drives a [`Reconciler`] for every object of one kind.
///
/// Objects are reconciled independently by a pool of tokio workers fed from
/// a [`WorkQueue`], so at most one pass per object is ever in flight. A watch
/// event for an object cancels its in-flight pass: the pass stops at its
/// next point without an outstanding provider mutation (see
/// [`Reconciler::reconcile_until`]) and the queue then runs a fresh pass
/// against the current state. Each object has at most one scheduled
/// requeue, whether a drift check or a retry.
pub struct Controller {
    reconciler: Arc<Reconciler>,
    store: Arc<dyn ObjectStore>,
    workers: usize,
    backoff: Backoff,
}

impl Controller {
    /// Wire a binding to a store and an adapter
    pub fn new(
        binding: ResourceBinding,
        store: Arc<dyn ObjectStore>,
        adapter: Arc<dyn CrudAdapter>,
        config: ReconcilerConfig,
    ) -> Self {
        let reconciler = Reconciler::new(
            Arc::new(binding),
            Arc::clone(&store),
            adapter,
            &config,
        );
        Self {
            reconciler: Arc::new(reconciler),
            store,
            workers: config.workers.max(1),
            backoff: config.backoff(),
        }
    }

    /// The reconciler the workers run
    pub fn reconciler(&self) -> Arc<Reconciler> {
        Arc::clone(&self.reconciler)
    }

    /// Reconcile until `shutdown` becomes `true` (or its sender is dropped).
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), ReconcileError> {
        let kind = self.reconciler.binding().kind.clone();
        let queue = Arc::new(WorkQueue::new());
        let in_flight: Arc<CancelMap> = Arc::new(DashMap::new());
        let failures: Arc<DashMap<ObjectKey, u32>> = Arc::new(DashMap::new());

        // Subscribe before listing so nothing slips between the two.
        let mut events = self.store.watch();
        for obj in self.store.list(&kind).await? {
            queue.add(obj.key);
        }

        info!(kind = %kind, workers = self.workers, "Controller started");
        let handles: Vec<JoinHandle<()>> = (0..self.workers)
            .map(|worker_id| {
                tokio::spawn(worker(
                    worker_id,
                    Arc::clone(&self.reconciler),
                    Arc::clone(&queue),
                    Arc::clone(&in_flight),
                    Arc::clone(&failures),
                    self.backoff.clone(),
                ))
            })
            .collect();

        let mut result = Ok(());
        if !*shutdown.borrow() {
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    event = events.recv() => match event {
                        Ok(WatchEvent::Applied(key)) if key.kind == kind => {
                            cancel(&in_flight, &key);
                            queue.add(key);
                        }
                        Ok(WatchEvent::Deleted(key)) if key.kind == kind => {
                            cancel(&in_flight, &key);
                            failures.remove(&key);
                            queue.forget(&key);
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(kind = %kind, missed = missed, "Watch lagged, relisting");
                            match self.store.list(&kind).await {
                                Ok(objects) => objects.into_iter().for_each(|o| queue.add(o.key)),
                                Err(err) => {
                                    result = Err(err.into());
                                    break;
                                }
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            warn!(kind = %kind, "Watch stream closed, stopping controller");
                            break;
                        }
                    }
                }
            }
        }

        queue.shutdown();
        for entry in in_flight.iter() {
            entry.value().cancel();
        }
        for handle in handles {
            handle
                .await
                .map_err(|e| ReconcileError::Task(e.to_string()))?;
        }
        info!(kind = %kind, "Controller stopped");
        result
    }
}

fn cancel(in_flight: &CancelMap, key: &ObjectKey) {
    if let Some(token) = in_flight.get(key) {
        debug!(key = %key, "Cancelling in-flight pass");
        token.cancel();
    }
}

async fn worker(
    worker_id: usize,
    reconciler: Arc<Reconciler>,
    queue: Arc<WorkQueue>,
    in_flight: Arc<CancelMap>,
    failures: Arc<DashMap<ObjectKey, u32>>,
    backoff: Backoff,
) {
    while let Some(key) = queue.next().await {
        let token = CancellationToken::new();
        in_flight.insert(key.clone(), token.clone());
        let outcome = reconciler.reconcile_until(&key, &token).await;
        in_flight.remove(&key);

        match outcome {
            Err(ReconcileError::Cancelled) => {
                debug!(worker = worker_id, key = %key, "Pass abandoned, object changed mid-flight");
            }
            Ok(Action::Requeue(delay)) => {
                failures.remove(&key);
                queue.add_after(key.clone(), delay);
            }
            Ok(Action::AwaitChange) => {
                failures.remove(&key);
            }
            Err(err) => {
                let attempt = {
                    let mut count = failures.entry(key.clone()).or_insert(0);
                    *count += 1;
                    *count
                };
                let delay = if err.is_conflict() {
                    backoff.initial_delay
                } else {
                    backoff.delay(attempt)
                };
                warn!(
                    worker = worker_id,
                    key = %key,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Reconciliation pass failed"
                );
                queue.add_after(key.clone(), delay);
            }
        }
        queue.done(&key);
    }
    debug!(worker = worker_id, "Worker stopped");
}
