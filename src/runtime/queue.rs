use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::AbortHandle;
use tracing::debug;

use super::store::ObjectKey;

#[derive(Default)]
struct QueueState {
    queue: VecDeque<ObjectKey>,
    queued: HashSet<ObjectKey>,
    in_flight: HashSet<ObjectKey>,
    dirty: HashSet<ObjectKey>,
    // at most one pending delayed add per key, tagged with its sequence number
    timers: HashMap<ObjectKey, (u64, AbortHandle)>,
    next_timer: u64,
    shutdown: bool,
}

/// Deduplicating work queue of object keys.
///
/// A key is queued at most once, and handed to at most one worker at a
/// time. Adding a key that is being processed marks it dirty; it is queued
/// again when the worker calls [`WorkQueue::done`], so a change that lands
/// mid-pass is never lost and never processed concurrently.
///
/// Delayed adds replace each other: a key has at most one pending timer, so
/// rescheduling a key never multiplies its future passes.
#[derive(Default)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl WorkQueue {
    /// Empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `key` unless it is already queued
    pub fn add(&self, key: ObjectKey) {
        let mut state = self.state.lock();
        if state.shutdown {
            return;
        }
        if state.in_flight.contains(&key) {
            state.dirty.insert(key);
            return;
        }
        if state.queued.insert(key.clone()) {
            state.queue.push_back(key);
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Queue `key` after `delay`, replacing any delayed add still pending
    /// for it
    pub fn add_after(self: &Arc<Self>, key: ObjectKey, delay: Duration) {
        if delay.is_zero() {
            self.cancel_timer(&key);
            self.add(key);
            return;
        }
        let mut state = self.state.lock();
        if state.shutdown {
            return;
        }
        state.next_timer += 1;
        let seq = state.next_timer;
        let queue = Arc::clone(self);
        let timer_key = key.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.fire(timer_key, seq);
        });
        if let Some((_, previous)) = state.timers.insert(key, (seq, task.abort_handle())) {
            previous.abort();
        }
    }

    fn fire(&self, key: ObjectKey, seq: u64) {
        {
            let mut state = self.state.lock();
            let current = state.timers.get(&key).map(|(current, _)| *current);
            // replaced after this timer elapsed
            if current != Some(seq) {
                return;
            }
            state.timers.remove(&key);
        }
        self.add(key);
    }

    fn cancel_timer(&self, key: &ObjectKey) {
        if let Some((_, timer)) = self.state.lock().timers.remove(key) {
            timer.abort();
        }
    }

    /// Number of keys with a delayed add pending
    pub fn scheduled(&self) -> usize {
        self.state.lock().timers.len()
    }

    /// Wait for the next key; `None` once the queue is shut down.
    ///
    /// The returned key is in flight until [`WorkQueue::done`] is called.
    pub async fn next(&self) -> Option<ObjectKey> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock();
                if state.shutdown {
                    return None;
                }
                if let Some(key) = state.queue.pop_front() {
                    state.queued.remove(&key);
                    state.in_flight.insert(key.clone());
                    return Some(key);
                }
            }
            notified.await;
        }
    }

    /// Finish processing `key`, requeueing it if it changed meanwhile
    pub fn done(&self, key: &ObjectKey) {
        let mut state = self.state.lock();
        state.in_flight.remove(key);
        if state.dirty.remove(key) && !state.shutdown && state.queued.insert(key.clone()) {
            debug!(key = %key, "Requeueing key that changed while in flight");
            state.queue.push_back(key.clone());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Drop every pending occurrence of `key`, delayed adds included
    pub fn forget(&self, key: &ObjectKey) {
        let mut state = self.state.lock();
        state.dirty.remove(key);
        if let Some((_, timer)) = state.timers.remove(key) {
            timer.abort();
        }
        if state.queued.remove(key) {
            state.queue.retain(|k| k != key);
        }
    }

    /// Stop handing out keys and wake every waiting worker
    pub fn shutdown(&self) {
        {
            let mut state = self.state.lock();
            state.shutdown = true;
            state.queue.clear();
            state.queued.clear();
            state.dirty.clear();
            for (_, (_, timer)) in state.timers.drain() {
                timer.abort();
            }
        }
        self.notify.notify_waiters();
    }

    /// Number of queued keys
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Whether no key is queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` is currently handed out to a worker
    pub fn is_in_flight(&self, key: &ObjectKey) -> bool {
        self.state.lock().in_flight.contains(key)
    }
}
