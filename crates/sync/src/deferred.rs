//! Cancelable deferred tasks keyed by logical identity
//!
//! Every timer in the engine (debounce delays, settle windows, lock
//! expiries) is one of these. Scheduling under a key that already has a
//! pending task aborts the old one, so tasks never stack. A task that fires
//! removes its own entry before running its action, and only if the entry
//! still carries its generation; a superseded task that woke up late does
//! nothing.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::trace;

struct DeferredTask {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Map of pending timers, at most one per key
pub(crate) struct DeferredTasks<K> {
    tasks: Arc<DashMap<K, DeferredTask>>,
    next_generation: Arc<AtomicU64>,
}

impl<K> Clone for DeferredTasks<K> {
    fn clone(&self) -> Self {
        Self {
            tasks: Arc::clone(&self.tasks),
            next_generation: Arc::clone(&self.next_generation),
        }
    }
}

impl<K> Default for DeferredTasks<K>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            tasks: Arc::new(DashMap::new()),
            next_generation: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<K> DeferredTasks<K>
where
    K: Eq + Hash + Clone + Send + Sync + std::fmt::Debug + 'static,
{
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Run `action` after `delay`, replacing any task pending under `key`
    ///
    /// Outside a tokio runtime this is a no-op.
    pub(crate) fn schedule<F, Fut>(&self, key: K, delay: Duration, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let Ok(runtime) = Handle::try_current() else {
            trace!("No runtime, dropping deferred task for {:?}", key);
            return;
        };

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let tasks = Arc::downgrade(&self.tasks);
        let task_key = key.clone();

        // Holding the entry while spawning keeps a zero-delay task from
        // looking for its entry before it exists.
        let entry = self.tasks.entry(key);
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;

            let Some(tasks) = tasks.upgrade() else {
                return;
            };
            if tasks
                .remove_if(&task_key, |_, task| task.generation == generation)
                .is_none()
            {
                return;
            }
            drop(tasks);

            action().await;
        });

        let replaced = match entry {
            Entry::Occupied(mut occupied) => {
                Some(occupied.insert(DeferredTask { generation, handle }))
            }
            Entry::Vacant(vacant) => {
                vacant.insert(DeferredTask { generation, handle });
                None
            }
        };

        if let Some(old) = replaced {
            old.handle.abort();
        }
    }

    /// Abort the task pending under `key`, if any
    pub(crate) fn cancel(&self, key: &K) -> bool {
        match self.tasks.remove(key) {
            Some((_, task)) => {
                task.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Abort every pending task
    pub(crate) fn cancel_all(&self) {
        self.tasks.retain(|_, task| {
            task.handle.abort();
            false
        });
    }

    pub(crate) fn contains(&self, key: &K) -> bool {
        self.tasks.contains_key(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }
}
