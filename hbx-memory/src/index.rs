use crate::Auction;
use hbx_core::models::{AdUnitCode, AuctionId, BidId};
use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Memoized lookups across the currently-retained auctions.
///
/// The index owns nothing: it is a read-through view over an accessor that
/// yields the live snapshot (the registry's current contents) plus a version
/// counter that changes on every membership change. Groupings are rebuilt
/// lazily on the first read after the version moves, so an evicted auction is
/// never served from a stale memo.
///
/// Only membership-stable keys are memoized (auction ids and the placement
/// codes fixed at creation). Bid ownership is resolved by scanning the live
/// snapshot, since responses keep arriving without a membership change.
pub struct AuctionIndex {
    source: Box<dyn Fn() -> Vec<Arc<Auction>> + Send + Sync>,
    version: Box<dyn Fn() -> u64 + Send + Sync>,
    memo: Mutex<Option<Memo>>,
}

struct Memo {
    version: u64,
    by_id: FxHashMap<AuctionId, Arc<Auction>>,
    by_ad_unit: FxHashMap<AdUnitCode, Vec<Arc<Auction>>>,
}

impl AuctionIndex {
    /// Build an index over the given live-snapshot accessor and its version
    /// counter.
    pub fn new(
        source: impl Fn() -> Vec<Arc<Auction>> + Send + Sync + 'static,
        version: impl Fn() -> u64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            source: Box::new(source),
            version: Box::new(version),
            memo: Mutex::new(None),
        }
    }

    /// The retained auction with the given id, if any.
    pub fn auction(&self, auction_id: AuctionId) -> Option<Arc<Auction>> {
        self.with_memo(|memo| memo.by_id.get(&auction_id).cloned())
    }

    /// All retained auctions that solicited the given placement, in creation
    /// order.
    pub fn auctions_for_ad_unit(&self, code: &AdUnitCode) -> Vec<Arc<Auction>> {
        self.with_memo(|memo| memo.by_ad_unit.get(code).cloned().unwrap_or_default())
    }

    /// The retained auction whose received set contains the given response.
    pub fn owner_of_bid(&self, bid_id: BidId) -> Option<Arc<Auction>> {
        (self.source)()
            .into_iter()
            .find(|auction| auction.owns_bid(bid_id))
    }

    fn with_memo<R>(&self, read: impl FnOnce(&Memo) -> R) -> R {
        let mut slot = lock(&self.memo);
        let version = (self.version)();
        let memo = slot.get_or_insert_with(|| self.rebuild(version));
        if memo.version != version {
            *memo = self.rebuild(version);
        }
        read(memo)
    }

    fn rebuild(&self, version: u64) -> Memo {
        let live = (self.source)();
        let mut by_id = FxHashMap::default();
        let mut by_ad_unit: FxHashMap<AdUnitCode, Vec<Arc<Auction>>> = FxHashMap::default();

        for auction in live {
            for code in auction.ad_unit_codes() {
                by_ad_unit.entry(code).or_default().push(Arc::clone(&auction));
            }
            by_id.insert(auction.id(), auction);
        }

        Memo {
            version,
            by_id,
            by_ad_unit,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
