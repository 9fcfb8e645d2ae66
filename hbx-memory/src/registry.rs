use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use std::{
    future::Future,
    pin::Pin,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use time::OffsetDateTime;
use tokio::{sync::watch, task::AbortHandle, time::Instant};

/// A boxed future, the stored form of the registry's async callbacks.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

type StartFn<T> = Box<dyn Fn(&T) -> BoxFuture<OffsetDateTime> + Send + Sync>;
type TtlFn<T> = Box<dyn Fn(&T) -> BoxFuture<anyhow::Result<Option<Duration>>> + Send + Sync>;
type ExpiryFn<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A collection whose entries expire on their own clock.
///
/// Each entry is associated with a *start time* that is determined
/// asynchronously (the `start` callback; here, resolution of an auction's
/// completion signal) and a *time-to-live* that may itself depend on
/// asynchronous state and on mutable policy (the `ttl` callback). An entry is
/// visible to every read from the moment it is added until the moment its
/// retention elapses:
///
/// - a `ttl` of `Ok(None)` retains the entry until [`clear`](Self::clear);
/// - a start signal that never resolves retains the entry indefinitely;
/// - a `ttl` evaluation error retains the entry and is reported, never
///   evicting incorrectly.
///
/// [`refresh`](Self::refresh) re-evaluates every entry against the latest
/// policy; entries whose recomputed expiry has already passed are evicted.
/// Reads are snapshots: an entry is either fully present or fully absent.
///
/// The registry is a cheap handle; clones share the same underlying
/// collection. One background task per entry performs the bookkeeping, so
/// entries must be added from within a Tokio runtime.
pub struct TtlRegistry<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for TtlRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Entry<T> {
    item: T,
    abort: AbortHandle,
}

struct Inner<T> {
    entries: Mutex<IndexMap<u64, Entry<T>, FxBuildHasher>>,
    expiry: Mutex<Vec<ExpiryFn<T>>>,
    start_fn: StartFn<T>,
    ttl_fn: TtlFn<T>,
    // bumping the generation wakes every entry's bookkeeping task
    refresh: watch::Sender<u64>,
    next_key: AtomicU64,
    version: AtomicU64,
}

impl<T> TtlRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a registry from its two async callbacks.
    ///
    /// `start` yields the instant an entry's retention clock begins; `ttl`
    /// yields the retention to apply from that instant, re-evaluated on every
    /// [`refresh`](Self::refresh).
    pub fn new<S, SF, L, LF>(start: S, ttl: L) -> Self
    where
        S: Fn(&T) -> SF + Send + Sync + 'static,
        SF: Future<Output = OffsetDateTime> + Send + 'static,
        L: Fn(&T) -> LF + Send + Sync + 'static,
        LF: Future<Output = anyhow::Result<Option<Duration>>> + Send + 'static,
    {
        let (refresh, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::default(),
                expiry: Mutex::default(),
                start_fn: Box::new(move |item| -> BoxFuture<OffsetDateTime> {
                    Box::pin(start(item))
                }),
                ttl_fn: Box::new(move |item| -> BoxFuture<anyhow::Result<Option<Duration>>> {
                    Box::pin(ttl(item))
                }),
                refresh,
                next_key: AtomicU64::new(0),
                version: AtomicU64::new(0),
            }),
        }
    }

    /// Insert an item and start tracking its expiry.
    pub fn add(&self, item: T) {
        let key = self.inner.next_key.fetch_add(1, Ordering::Relaxed);
        {
            // The task evicts through the entries lock, so it cannot observe
            // the map before the entry is in place.
            let mut entries = lock(&self.inner.entries);
            let task = tokio::spawn(track(Arc::downgrade(&self.inner), key, item.clone()));
            entries.insert(
                key,
                Entry {
                    item,
                    abort: task.abort_handle(),
                },
            );
        }
        self.inner.version.fetch_add(1, Ordering::Relaxed);
    }

    /// The current non-evicted items, in insertion order.
    pub fn to_vec(&self) -> Vec<T> {
        lock(&self.inner.entries)
            .values()
            .map(|entry| entry.item.clone())
            .collect()
    }

    /// The number of currently-retained items.
    pub fn len(&self) -> usize {
        lock(&self.inner.entries).len()
    }

    /// Whether the registry currently retains nothing.
    pub fn is_empty(&self) -> bool {
        lock(&self.inner.entries).is_empty()
    }

    /// A counter bumped on every membership change (add, evict, clear).
    ///
    /// Lets read-through views memoize against the live set.
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Relaxed)
    }

    /// Re-evaluate every entry's retention against the latest policy.
    ///
    /// Entries whose recomputed expiry has already passed are evicted; the
    /// new policy never un-evicts an already-purged entry.
    pub fn refresh(&self) {
        self.inner.refresh.send_modify(|generation| {
            *generation = generation.wrapping_add(1);
        });
    }

    /// Evict everything unconditionally.
    pub fn clear(&self) {
        let drained: Vec<Entry<T>> = {
            let mut entries = lock(&self.inner.entries);
            entries.drain(..).map(|(_, entry)| entry).collect()
        };
        if drained.is_empty() {
            return;
        }
        self.inner.version.fetch_add(1, Ordering::Relaxed);
        for entry in drained {
            entry.abort.abort();
            self.inner.notify_expiry(&entry.item);
        }
    }

    /// Register a callback invoked with each item at the moment it is
    /// evicted, whether by TTL elapse or by [`clear`](Self::clear).
    pub fn on_expiry(&self, callback: impl Fn(&T) + Send + Sync + 'static) {
        lock(&self.inner.expiry).push(Arc::new(callback));
    }
}

impl<T> Inner<T> {
    fn evict(&self, key: u64) {
        let removed = lock(&self.entries).shift_remove(&key);
        if let Some(entry) = removed {
            self.version.fetch_add(1, Ordering::Relaxed);
            self.notify_expiry(&entry.item);
        }
    }

    fn notify_expiry(&self, item: &T) {
        // snapshot so a callback may touch the registry without deadlocking
        let callbacks: Vec<ExpiryFn<T>> = lock(&self.expiry).iter().cloned().collect();
        for callback in callbacks {
            callback(item);
        }
    }
}

/// Per-entry bookkeeping: wait for the start signal, then (re)compute the
/// retention window until it elapses or the registry goes away.
async fn track<T>(inner: Weak<Inner<T>>, key: u64, item: T)
where
    T: Clone + Send + Sync + 'static,
{
    let (start, mut refresh) = {
        let Some(inner) = inner.upgrade() else { return };
        ((inner.start_fn)(&item), inner.refresh.subscribe())
    };

    let started = start.await;
    let resolved_at = Instant::now();
    // the start time may be stamped slightly before the signal resolves
    let lag: Duration = (OffsetDateTime::now_utc() - started)
        .try_into()
        .unwrap_or_default();
    let clock_start = resolved_at.checked_sub(lag).unwrap_or(resolved_at);

    loop {
        refresh.borrow_and_update();
        let ttl = {
            let Some(inner) = inner.upgrade() else { return };
            (inner.ttl_fn)(&item)
        };
        match ttl.await {
            Err(error) => {
                tracing::warn!(%error, "ttl evaluation failed, retaining entry until refresh or clear");
                if refresh.changed().await.is_err() {
                    return;
                }
            }
            Ok(None) => {
                if refresh.changed().await.is_err() {
                    return;
                }
            }
            Ok(Some(ttl)) => {
                tokio::select! {
                    _ = tokio::time::sleep_until(clock_start + ttl) => {
                        if let Some(inner) = inner.upgrade() {
                            inner.evict(key);
                        }
                        return;
                    }
                    changed = refresh.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
