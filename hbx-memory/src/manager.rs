use crate::{Auction, AuctionIndex, TtlRegistry};
use hbx_core::{
    models::{
        AdUnit, AdUnitCode, AuctionEvent, AuctionId, AuctionRequest, AuctionStatus, Bid, BidId,
        BidRequest, BidStatus,
    },
    ports::{CachePolicy, PolicySubscription},
};
use indexmap::IndexSet;
use rustc_hash::FxBuildHasher;
use std::{sync::Arc, time::Duration};
use time::OffsetDateTime;
use tokio::sync::broadcast;

// sized for a burst of concurrent rounds; slow analytics subscribers lag
// rather than block the engine
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// The gateway for creating auctions and querying consolidated results.
///
/// The manager owns the expiring registry of live auctions, the cross-entity
/// index over it, the lifecycle event stream, and the subscription to the
/// retention-policy collaborator. Completed auctions stay queryable until
/// the registry evicts them: with no configured floor they are retained
/// until [`clear_all`](Self::clear_all); with a floor `F`, retention from
/// completion is `max(F, longest received bid ttl)`, re-evaluated whenever
/// the policy changes.
///
/// All aggregate getters enumerate auctions oldest-created first and, within
/// an auction, responses in arrival order. Lookups that miss (unknown
/// auction, unknown bid) warn and return nothing; they never fail the
/// caller.
pub struct AuctionManager {
    auctions: TtlRegistry<Arc<Auction>>,
    index: AuctionIndex,
    events: broadcast::Sender<AuctionEvent>,
    // dropped with the manager, tearing the policy listener down
    _policy_changes: PolicySubscription,
}

impl AuctionManager {
    /// Build a manager wired to the given retention policy.
    ///
    /// Must be called from within a Tokio runtime: the registry and every
    /// auction spawn background tasks.
    pub fn new(policy: Arc<dyn CachePolicy>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let auctions = TtlRegistry::new(
            |auction: &Arc<Auction>| {
                let auction = Arc::clone(auction);
                async move {
                    auction.completed().await;
                    auction.end_time().unwrap_or_else(OffsetDateTime::now_utc)
                }
            },
            {
                let policy = Arc::clone(&policy);
                move |auction: &Arc<Auction>| {
                    let policy = Arc::clone(&policy);
                    let auction = Arc::clone(auction);
                    async move {
                        // no floor: retain until cleared, don't wait for
                        // completion to say so
                        let Some(floor) = policy.min_bid_cache_ttl() else {
                            return Ok(None);
                        };
                        auction.completed().await;
                        let longest_bid = auction
                            .bids_received()
                            .iter()
                            .map(|bid| bid.ttl)
                            .max()
                            .unwrap_or(Duration::ZERO);
                        Ok(Some(floor.max(longest_bid)))
                    }
                }
            },
        );

        let index = AuctionIndex::new(
            {
                let auctions = auctions.clone();
                move || auctions.to_vec()
            },
            {
                let auctions = auctions.clone();
                move || auctions.version()
            },
        );

        let policy_changes = policy.subscribe(Box::new({
            let auctions = auctions.clone();
            move || auctions.refresh()
        }));

        Self {
            auctions,
            index,
            events,
            _policy_changes: policy_changes,
        }
    }

    /// Start a new auction round and retain it for querying.
    pub fn create_auction(&self, request: AuctionRequest) -> Arc<Auction> {
        let auction = Auction::begin(request, self.events.clone());
        self.auctions.add(Arc::clone(&auction));
        auction
    }

    /// Fold a participant's response into its running auction.
    pub fn record_bid(&self, auction_id: AuctionId, bid: Bid) {
        match self.index.auction(auction_id) {
            Some(auction) => auction.add_bid_received(bid),
            None => {
                tracing::warn!(%auction_id, bid_id = %bid.bid_id, "auction not found when recording bid");
            }
        }
    }

    /// Finish the given auction now (the fan-out driver decided the round is
    /// done before its deadline).
    pub fn finish_auction(&self, auction_id: AuctionId) {
        match self.index.auction(auction_id) {
            Some(auction) => auction.finish(),
            None => tracing::warn!(%auction_id, "auction not found when finishing"),
        }
    }

    /// Record the globally-winning response for its auction and placement.
    ///
    /// If the owning auction was already evicted (or never existed) the call
    /// warns and is dropped.
    pub fn add_winning_bid(&self, bid: Bid) {
        match self.index.auction(bid.auction_id) {
            Some(auction) => auction.add_winning_bid(bid),
            None => tracing::warn!(
                auction_id = %bid.auction_id,
                bid_id = %bid.bid_id,
                "auction not found when adding winning bid",
            ),
        }
    }

    /// Update the status of the response with the given id, wherever it
    /// lives. A `targetingSet` status additionally runs the owning
    /// auction's targeting bookkeeping.
    pub fn set_status_for_bids(&self, bid_id: BidId, status: BidStatus) {
        let Some(auction) = self.index.owner_of_bid(bid_id) else {
            tracing::warn!(%bid_id, "bid not found when setting status");
            return;
        };
        if status == BidStatus::TargetingSet {
            auction.set_bid_targeting(bid_id);
        } else {
            auction.set_bid_status(bid_id, status);
        }
    }

    /// Consolidated responses across all *completed* retained auctions.
    ///
    /// Running auctions contribute nothing: partial data is never served.
    pub fn bids_received(&self) -> Vec<Bid> {
        self.auctions
            .to_vec()
            .iter()
            .filter(|auction| auction.status() == AuctionStatus::Completed)
            .flat_map(|auction| auction.bids_received())
            .collect()
    }

    /// Consolidated solicitations across all retained auctions.
    pub fn bid_requests(&self) -> Vec<BidRequest> {
        self.auctions
            .to_vec()
            .iter()
            .flat_map(|auction| auction.bid_requests())
            .collect()
    }

    /// Consolidated no-response records across all retained auctions.
    pub fn no_bids(&self) -> Vec<BidRequest> {
        self.auctions
            .to_vec()
            .iter()
            .flat_map(|auction| auction.no_bids())
            .collect()
    }

    /// Every designated winner across all retained auctions.
    pub fn all_winning_bids(&self) -> Vec<Bid> {
        self.auctions
            .to_vec()
            .iter()
            .flat_map(|auction| auction.winning_bids())
            .collect()
    }

    /// Consolidated placements across all retained auctions.
    pub fn ad_units(&self) -> Vec<AdUnit> {
        self.auctions
            .to_vec()
            .iter()
            .flat_map(|auction| auction.ad_units())
            .collect()
    }

    /// Placement codes across all retained auctions, de-duplicated,
    /// first-seen order.
    pub fn ad_unit_codes(&self) -> Vec<AdUnitCode> {
        let mut codes: IndexSet<AdUnitCode, FxBuildHasher> = IndexSet::default();
        for auction in self.auctions.to_vec() {
            codes.extend(auction.ad_unit_codes());
        }
        codes.into_iter().collect()
    }

    /// Every response for the given placement, across all retained auctions
    /// in creation order.
    pub fn bids_for_ad_unit_code(&self, code: &AdUnitCode) -> Vec<Bid> {
        self.all_bids()
            .into_iter()
            .filter(|bid| &bid.ad_unit_code == code)
            .collect()
    }

    /// The response with the given id, if any retained auction received it.
    ///
    /// This is how the rendering layer resolves which response it is about
    /// to display.
    pub fn find_bid_by_ad_id(&self, bid_id: BidId) -> Option<Bid> {
        self.all_bids().into_iter().find(|bid| bid.bid_id == bid_id)
    }

    /// The id of the most recently created auction still retained.
    pub fn last_auction_id(&self) -> Option<AuctionId> {
        self.auctions.to_vec().last().map(|auction| auction.id())
    }

    /// Evict every retained auction (full state reset).
    pub fn clear_all(&self) {
        self.auctions.clear();
    }

    /// Register a callback invoked with each auction at the moment the
    /// registry evicts it.
    pub fn on_expiry(&self, callback: impl Fn(&Arc<Auction>) + Send + Sync + 'static) {
        self.auctions.on_expiry(callback);
    }

    /// Subscribe to the lifecycle event stream.
    pub fn subscribe_events(&self) -> broadcast::Receiver<AuctionEvent> {
        self.events.subscribe()
    }

    /// Cross-entity lookups over the currently-retained auctions.
    pub fn index(&self) -> &AuctionIndex {
        &self.index
    }

    // unlike the public getter, lookups see running auctions' responses too
    fn all_bids(&self) -> Vec<Bid> {
        self.auctions
            .to_vec()
            .iter()
            .flat_map(|auction| auction.bids_received())
            .collect()
    }
}
