//! Keyed scheduler for delayed and periodic engine tasks

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

struct Task {
    id: u64,
    handle: JoinHandle<()>,
}

/// Registry of cancellable tasks keyed by a logical id.
///
/// Scheduling under a key that already has a task aborts the old task, so
/// re-arming a delay never stacks two timers. One-shot tasks remove
/// themselves from the registry right before running their action.
pub struct Scheduler {
    /// Active task handles (keyed by logical id)
    tasks: Arc<DashMap<String, Task>>,
    next_id: AtomicU64,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Create a new scheduler
    #[must_use]
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Run `action` once after `delay`, replacing any task under `key`
    pub fn schedule<F>(&self, key: &str, delay: Duration, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.insert(key, false, |id, tasks| one_shot(key, id, tasks, delay, action));
    }

    /// Like [`Scheduler::schedule`], but keeps a still-pending task under `key`.
    ///
    /// Returns whether a new task was scheduled.
    pub fn schedule_if_idle<F>(&self, key: &str, delay: Duration, action: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.insert(key, true, |id, tasks| one_shot(key, id, tasks, delay, action))
    }

    /// Run `action` every `period` until cancelled, replacing any task under `key`.
    ///
    /// The first run happens one period after scheduling.
    pub fn schedule_interval<F>(&self, key: &str, period: Duration, action: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let key_log = key.to_string();
        self.insert(key, false, move |_, _| async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Skip the first immediate tick
            interval.tick().await;

            loop {
                interval.tick().await;
                tracing::trace!("Interval task {} fired", key_log);
                action();
            }
        });
        tracing::debug!("Scheduled interval task {} every {:?}", key, period);
    }

    fn insert<Fut>(
        &self,
        key: &str,
        keep_pending: bool,
        make: impl FnOnce(u64, Arc<DashMap<String, Task>>) -> Fut,
    ) -> bool
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        // Hold the entry while spawning so the task cannot observe the map
        // before its own handle is registered.
        match self.tasks.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if keep_pending && !entry.get().handle.is_finished() {
                    tracing::trace!("Task {} already pending, keeping it", key);
                    return false;
                }
                let handle = tokio::spawn(make(id, Arc::clone(&self.tasks)));
                let old = entry.insert(Task { id, handle });
                old.handle.abort();
                tracing::debug!("Replaced task {}", key);
            }
            Entry::Vacant(entry) => {
                let handle = tokio::spawn(make(id, Arc::clone(&self.tasks)));
                entry.insert(Task { id, handle });
            }
        }
        true
    }

    /// Cancel the task under `key`
    pub fn cancel(&self, key: &str) -> bool {
        if let Some((_, task)) = self.tasks.remove(key) {
            task.handle.abort();
            tracing::debug!("Cancelled task {}", key);
            true
        } else {
            false
        }
    }

    /// Cancel every task whose key starts with `prefix`
    pub fn cancel_prefix(&self, prefix: &str) -> usize {
        let keys: Vec<String> = self
            .tasks
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.iter().filter(|key| self.cancel(key)).count()
    }

    /// Get the number of registered tasks
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.tasks.len()
    }

    /// Abort every task
    pub fn cancel_all(&self) {
        let count = self.tasks.len();
        self.tasks.retain(|_, task| {
            task.handle.abort();
            false
        });
        tracing::debug!("Cancelled {} scheduled tasks", count);
    }
}

fn one_shot<F>(
    key: &str,
    id: u64,
    tasks: Arc<DashMap<String, Task>>,
    delay: Duration,
    action: F,
) -> impl Future<Output = ()> + Send + 'static
where
    F: FnOnce() + Send + 'static,
{
    let key = key.to_string();
    async move {
        tokio::time::sleep(delay).await;
        // Only unregister ourselves, never a replacement
        tasks.remove_if(&key, |_, task| task.id == id);
        tracing::debug!("Delayed task {} fired", key);
        action();
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // Abort all timer tasks
        for entry in self.tasks.iter() {
            entry.value().handle.abort();
        }
    }
}
