use std::time::Duration;

/// A change listener registered with a [`CachePolicy`].
pub type PolicyListener = Box<dyn Fn() + Send + Sync>;

/// The configuration collaborator governing retention of completed auctions.
///
/// Implementations expose the current process-wide retention floor and a way
/// to observe changes to it. The engine subscribes once at construction and
/// re-evaluates every retained auction's expiry when notified; the returned
/// [`PolicySubscription`] unsubscribes on drop so a disposed engine does not
/// leak its listener.
pub trait CachePolicy: Send + Sync {
    /// The current retention floor, or `None` when no floor is configured.
    fn min_bid_cache_ttl(&self) -> Option<Duration>;

    /// Register a listener invoked after every change to the floor.
    fn subscribe(&self, listener: PolicyListener) -> PolicySubscription;
}

/// A subscription guard for a [`CachePolicy`] listener.
///
/// Dropping the guard removes the listener. Call [`detach`](Self::detach) to
/// keep the listener registered for the life of the policy instead.
pub struct PolicySubscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl PolicySubscription {
    /// Wrap the policy-specific unsubscribe action.
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription that has nothing to tear down.
    pub fn detached() -> Self {
        Self { cancel: None }
    }

    /// Consume the guard without unsubscribing.
    pub fn detach(mut self) {
        self.cancel = None;
    }
}

impl Drop for PolicySubscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for PolicySubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicySubscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
