use hbx_core::models::{
    AdUnit, AdUnitCode, AuctionEvent, AuctionId, AuctionRequest, AuctionStatus, Bid, BidId,
    BidRequest, BidStatus,
};
use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};
use time::OffsetDateTime;
use tokio::{sync::{broadcast, watch}, task::AbortHandle};

/// One fan-out/fan-in auction round.
///
/// Created `Running` with a solicitation per (ad unit, bidder) pair and a
/// deadline task; responses are folded in as they arrive, and the round
/// transitions to `Completed` exactly once, either through
/// [`finish`](Self::finish) (the fan-out driver decided the round is done)
/// or through the deadline firing. Completion computes the no-bid set,
/// stamps the end time and resolves the completion signal; after that every
/// aggregate is stable and mutations are warned no-ops.
///
/// All mutation is funneled through `&self` methods guarded by one internal
/// lock, so interleaved response arrival, deadline firing and queries never
/// observe a torn round.
pub struct Auction {
    id: AuctionId,
    timeout: Duration,
    started_at: Instant,
    start: OffsetDateTime,
    ad_units: Vec<AdUnit>,
    state: Mutex<State>,
    status: watch::Sender<AuctionStatus>,
    deadline: Mutex<Option<AbortHandle>>,
    events: broadcast::Sender<AuctionEvent>,
}

struct State {
    requests: Vec<BidRequest>,
    received: Vec<Bid>,
    no_bids: Vec<BidRequest>,
    winners: IndexMap<AdUnitCode, Bid, FxBuildHasher>,
    end: Option<OffsetDateTime>,
}

impl Auction {
    /// Start a new round: allocate an id, build one solicitation per
    /// (ad unit, bidder) pair, arm the deadline, emit the init event.
    ///
    /// The deadline task holds only a weak reference, so an auction dropped
    /// by every owner does not linger until its timeout.
    pub fn begin(request: AuctionRequest, events: broadcast::Sender<AuctionEvent>) -> Arc<Self> {
        let id = AuctionId::random();
        let requests = request
            .ad_units
            .iter()
            .flat_map(|unit| {
                unit.bidders
                    .iter()
                    .map(|bidder| BidRequest::new(id, bidder.clone(), unit.code.clone()))
            })
            .collect();

        let auction = Arc::new(Self {
            id,
            timeout: request.timeout,
            started_at: Instant::now(),
            start: OffsetDateTime::now_utc(),
            ad_units: request.ad_units,
            state: Mutex::new(State {
                requests,
                received: Vec::new(),
                no_bids: Vec::new(),
                winners: IndexMap::default(),
                end: None,
            }),
            status: watch::Sender::new(AuctionStatus::Running),
            deadline: Mutex::new(None),
            events,
        });

        auction.emit(AuctionEvent::Init {
            auction_id: id,
            timeout: auction.timeout,
        });

        let timeout = auction.timeout;
        let deadline = tokio::spawn({
            let auction = Arc::downgrade(&auction);
            async move {
                tokio::time::sleep(timeout).await;
                if let Some(auction) = auction.upgrade() {
                    auction.finish_by_deadline();
                }
            }
        });
        *lock(&auction.deadline) = Some(deadline.abort_handle());

        auction
    }

    /// The immutable auction identifier.
    pub fn id(&self) -> AuctionId {
        self.id
    }

    /// The current lifecycle status.
    pub fn status(&self) -> AuctionStatus {
        *self.status.borrow()
    }

    /// The round's response deadline budget.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// When the round was created.
    pub fn start_time(&self) -> OffsetDateTime {
        self.start
    }

    /// When the round completed, or `None` while it is still running.
    pub fn end_time(&self) -> Option<OffsetDateTime> {
        lock(&self.state).end
    }

    /// Resolves once the round has completed.
    ///
    /// Safe to await from any number of subscribers, before or after the
    /// transition; all aggregate reads are stable afterwards.
    pub async fn completed(&self) {
        let mut status = self.status.subscribe();
        // the sender lives as long as `self`, so this cannot fail
        let _ = status
            .wait_for(|status| *status == AuctionStatus::Completed)
            .await;
    }

    /// Fold a participant's response into a running round.
    ///
    /// Stamps arrival metadata on the bid. On a completed round the response
    /// is rejected with a warning and the aggregates stay untouched.
    pub fn add_bid_received(&self, mut bid: Bid) {
        if bid.auction_id != self.id {
            tracing::warn!(
                auction_id = %self.id,
                bid_auction_id = %bid.auction_id,
                bid_id = %bid.bid_id,
                "bid belongs to a different auction, dropping",
            );
            return;
        }

        {
            let mut state = lock(&self.state);
            if self.status() == AuctionStatus::Completed {
                tracing::warn!(
                    auction_id = %self.id,
                    bid_id = %bid.bid_id,
                    "response arrived after completion, dropping",
                );
                return;
            }
            bid.received_at = Some(OffsetDateTime::now_utc());
            bid.time_to_respond = Some(self.started_at.elapsed());
            state.received.push(bid.clone());
        }

        self.emit(AuctionEvent::BidResponse { bid });
    }

    /// Finish the round now, regardless of how many participants answered.
    ///
    /// Idempotent: the first call transitions `Running → Completed`, computes
    /// the no-bid set as (requested − responded), stamps the end time and
    /// resolves the completion signal; later calls warn and do nothing.
    pub fn finish(&self) {
        if let Some(end) = self.complete() {
            self.emit(AuctionEvent::AuctionEnd {
                auction_id: self.id,
                end,
            });
        }
    }

    fn finish_by_deadline(&self) {
        let Some(end) = self.complete() else { return };
        let unanswered = self.no_bids();
        if !unanswered.is_empty() {
            self.emit(AuctionEvent::BidTimeout {
                requests: unanswered,
            });
        }
        self.emit(AuctionEvent::AuctionEnd {
            auction_id: self.id,
            end,
        });
    }

    // The single transition point. Returns the end timestamp on the first
    // call, None on every later one.
    fn complete(&self) -> Option<OffsetDateTime> {
        let end = {
            let mut state = lock(&self.state);
            if self.status() == AuctionStatus::Completed {
                tracing::warn!(auction_id = %self.id, "auction already completed");
                return None;
            }

            let end = OffsetDateTime::now_utc();
            state.no_bids = state
                .requests
                .iter()
                .filter(|request| {
                    !state.received.iter().any(|bid| {
                        bid.bidder == request.bidder && bid.ad_unit_code == request.ad_unit_code
                    })
                })
                .cloned()
                .collect();
            state.end = Some(end);

            // resolve the completion signal while still holding the lock, so
            // no mutation can slip in between the check and the transition
            self.status.send_replace(AuctionStatus::Completed);
            end
        };

        if let Some(deadline) = lock(&self.deadline).take() {
            deadline.abort();
        }

        tracing::debug!(auction_id = %self.id, "auction completed");
        Some(end)
    }

    /// Designate `bid` the winner for its placement.
    ///
    /// Idempotent per placement: recording a new winner for the same ad unit
    /// code replaces the previous one, it does not append.
    pub fn add_winning_bid(&self, bid: Bid) {
        {
            let mut state = lock(&self.state);
            state.winners.insert(bid.ad_unit_code.clone(), bid.clone());
        }
        self.emit(AuctionEvent::BidWon { bid });
    }

    /// Mark the given response `targetingSet`.
    ///
    /// Valid only once the round has completed; on a running round this
    /// warns and leaves the response untouched.
    pub fn set_bid_targeting(&self, bid_id: BidId) {
        if self.status() != AuctionStatus::Completed {
            tracing::warn!(
                auction_id = %self.id,
                %bid_id,
                "targeting can only be set on a completed auction",
            );
            return;
        }
        self.set_bid_status(bid_id, BidStatus::TargetingSet);
    }

    /// Update the status of a received response, enforcing the monotonic
    /// status order. Unknown ids and regressions warn and change nothing.
    pub fn set_bid_status(&self, bid_id: BidId, status: BidStatus) {
        let mut state = lock(&self.state);
        let Some(bid) = state.received.iter_mut().find(|bid| bid.bid_id == bid_id) else {
            tracing::warn!(auction_id = %self.id, %bid_id, "no such bid in this auction");
            return;
        };
        if !bid.status.may_become(status) {
            tracing::warn!(
                auction_id = %self.id,
                %bid_id,
                from = ?bid.status,
                to = ?status,
                "bid status may not regress",
            );
            return;
        }
        bid.status = status;
    }

    /// Whether this auction's received set contains the given response.
    pub fn owns_bid(&self, bid_id: BidId) -> bool {
        lock(&self.state)
            .received
            .iter()
            .any(|bid| bid.bid_id == bid_id)
    }

    /// The placements this round was created with.
    pub fn ad_units(&self) -> Vec<AdUnit> {
        self.ad_units.clone()
    }

    /// The placement codes of this round, in creation order.
    pub fn ad_unit_codes(&self) -> Vec<AdUnitCode> {
        self.ad_units.iter().map(|unit| unit.code.clone()).collect()
    }

    /// The solicitations issued for this round, in solicitation order.
    pub fn bid_requests(&self) -> Vec<BidRequest> {
        lock(&self.state).requests.clone()
    }

    /// The responses received so far, in arrival order.
    ///
    /// Only stable once the round has completed; callers that need
    /// completed-only data gate on [`status`](Self::status).
    pub fn bids_received(&self) -> Vec<Bid> {
        lock(&self.state).received.clone()
    }

    /// The solicitations that never produced a response.
    ///
    /// Computed at completion; empty while the round is running.
    pub fn no_bids(&self) -> Vec<BidRequest> {
        lock(&self.state).no_bids.clone()
    }

    /// The currently-designated winners, one per placement, in
    /// first-designation order.
    pub fn winning_bids(&self) -> Vec<Bid> {
        lock(&self.state).winners.values().cloned().collect()
    }

    fn emit(&self, event: AuctionEvent) {
        // an event stream nobody subscribes to is fine
        let _ = self.events.send(event);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
