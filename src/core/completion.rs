use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::debug;

#[derive(Debug)]
struct Entry<V> {
    value: V,
    stored_at: Instant,
}

/// Keyed store of finished values with per-key wakeups and time-based retention.
///
/// Waiters register a [`Notify`] for the key they care about; inserting a value
/// wakes exactly those waiters, so readers never poll on a fixed interval.
#[derive(Debug)]
pub struct CompletionMap<V> {
    entries: DashMap<String, Entry<V>>,
    waiters: DashMap<String, Arc<Notify>>,
}

impl<V: Clone> CompletionMap<V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            waiters: DashMap::new(),
        }
    }

    /// Store a value, replacing any earlier one, and wake its waiters
    pub fn insert(&self, key: &str, value: V) {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                stored_at: Instant::now(),
            },
        );
        if let Some((_, notify)) = self.waiters.remove(key) {
            notify.notify_waiters();
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.entries.remove(key).map(|(_, entry)| entry.value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Wait until a value for `key` exists. Returns `None` if `deadline` passes first.
    pub async fn wait(&self, key: &str, deadline: Option<Instant>) -> Option<V> {
        loop {
            let notify = self
                .waiters
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Notify::new()))
                .value()
                .clone();
            let notified = notify.notified();
            tokio::pin!(notified);
            // Register before checking so an insert between the check and the await is seen
            notified.as_mut().enable();

            if let Some(value) = self.get(key) {
                return Some(value);
            }

            match deadline {
                Some(deadline) => {
                    let deadline = tokio::time::Instant::from_std(deadline);
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        self.release_waiter(key, &notify);
                        return self.get(key);
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Forget the wakeup handle for `key` unless another waiter still holds it
    fn release_waiter(&self, key: &str, notify: &Arc<Notify>) {
        // One reference in the map plus the caller's
        self.waiters.remove_if(key, |_, current| {
            Arc::ptr_eq(current, notify) && Arc::strong_count(current) <= 2
        });
    }

    /// Drop entries stored longer than `retention` ago; returns how many were removed
    pub fn purge_older_than(&self, retention: Duration) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.stored_at.elapsed() <= retention);
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            debug!(purged, "Purged expired completion entries");
        }
        purged
    }
}

impl<V: Clone> Default for CompletionMap<V> {
    fn default() -> Self {
        Self::new()
    }
}
