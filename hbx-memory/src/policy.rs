use hbx_core::{
    models::CacheConfig,
    ports::{CachePolicy, PolicyListener, PolicySubscription},
};
use rustc_hash::FxHashMap;
use std::{
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, RwLock,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

/// The reference [`CachePolicy`]: an explicit, shared configuration value
/// with an observer list.
///
/// Clones share the same underlying state, so one handle can live with the
/// configuration surface while another is given to the engine. Listeners are
/// notified after every floor change; each subscription is removed when its
/// guard drops, so a disposed subscriber leaks nothing.
#[derive(Clone, Default)]
pub struct SharedCachePolicy {
    inner: Arc<PolicyInner>,
}

#[derive(Default)]
struct PolicyInner {
    floor: RwLock<Option<Duration>>,
    listeners: Mutex<FxHashMap<u64, Arc<dyn Fn() + Send + Sync>>>,
    next_key: AtomicU64,
}

impl SharedCachePolicy {
    /// A policy seeded from configuration.
    pub fn new(config: &CacheConfig) -> Self {
        let policy = Self::default();
        *lock_write(&policy.inner.floor) = config.min_bid_cache_ttl;
        policy
    }

    /// Replace the retention floor and notify every subscriber.
    pub fn set_min_bid_cache_ttl(&self, floor: Option<Duration>) {
        *lock_write(&self.inner.floor) = floor;

        // snapshot so a listener may (un)subscribe without deadlocking
        let listeners: Vec<_> = lock(&self.inner.listeners).values().cloned().collect();
        for listener in listeners {
            listener();
        }
    }
}

impl CachePolicy for SharedCachePolicy {
    fn min_bid_cache_ttl(&self) -> Option<Duration> {
        *lock_read(&self.inner.floor)
    }

    fn subscribe(&self, listener: PolicyListener) -> PolicySubscription {
        let key = self.inner.next_key.fetch_add(1, Ordering::Relaxed);
        lock(&self.inner.listeners).insert(key, Arc::from(listener));

        let inner = Arc::downgrade(&self.inner);
        PolicySubscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                lock(&inner.listeners).remove(&key);
            }
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn lock_read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn lock_write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
