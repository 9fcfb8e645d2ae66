use hbx_core::models::{AdUnit, AuctionId, AuctionRequest, Bid, CacheConfig};
use hbx_memory::{AuctionManager, SharedCachePolicy};
use std::{sync::Arc, time::Duration};

fn floor(seconds: u64) -> SharedCachePolicy {
    SharedCachePolicy::new(&CacheConfig {
        min_bid_cache_ttl: Some(Duration::from_secs(seconds)),
    })
}

fn request() -> AuctionRequest {
    AuctionRequest {
        ad_units: vec![AdUnit::new("div-1", ["alpha"])],
        timeout: Duration::from_millis(1000),
    }
}

fn bid(auction_id: AuctionId, ttl_secs: u64) -> Bid {
    Bid::new(
        auction_id,
        "alpha",
        "div-1",
        2.5,
        "USD",
        Duration::from_secs(ttl_secs),
    )
    .unwrap()
}

async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

#[test_log::test(tokio::test(start_paused = true))]
async fn no_floor_retains_until_cleared() {
    let manager = AuctionManager::new(Arc::new(SharedCachePolicy::default()));
    let auction = manager.create_auction(request());

    // completed immediately, with zero responses
    manager.finish_auction(auction.id());
    settle().await;

    tokio::time::advance(Duration::from_secs(30 * 24 * 3600)).await;
    assert_eq!(manager.last_auction_id(), Some(auction.id()));

    manager.clear_all();
    assert_eq!(manager.last_auction_id(), None);
    assert!(manager.index().auction(auction.id()).is_none());
}

#[test_log::test(tokio::test(start_paused = true))]
async fn running_auctions_are_never_evicted() {
    let manager = AuctionManager::new(Arc::new(floor(1)));
    let auction = manager.create_auction(AuctionRequest {
        ad_units: vec![AdUnit::new("div-1", ["alpha"])],
        // effectively no deadline for this test
        timeout: Duration::from_secs(1_000_000),
    });
    settle().await;

    // far beyond the floor, but the retention clock has not started
    tokio::time::advance(Duration::from_secs(3600)).await;
    assert_eq!(manager.last_auction_id(), Some(auction.id()));
}

#[test_log::test(tokio::test(start_paused = true))]
async fn retention_is_the_longest_of_floor_and_bid_ttls() {
    // floor 1s, bid ttl 3s: the bid ttl wins
    let manager = AuctionManager::new(Arc::new(floor(1)));
    let auction = manager.create_auction(request());
    manager.record_bid(auction.id(), bid(auction.id(), 3));
    manager.finish_auction(auction.id());
    settle().await;

    tokio::time::advance(Duration::from_millis(2900)).await;
    assert_eq!(manager.last_auction_id(), Some(auction.id()));

    tokio::time::advance(Duration::from_millis(200)).await;
    settle().await;
    assert_eq!(manager.last_auction_id(), None);

    // floor 10s, bid ttl 3s: the floor wins
    let manager = AuctionManager::new(Arc::new(floor(10)));
    let auction = manager.create_auction(request());
    manager.record_bid(auction.id(), bid(auction.id(), 3));
    manager.finish_auction(auction.id());
    settle().await;

    tokio::time::advance(Duration::from_millis(9900)).await;
    assert_eq!(manager.last_auction_id(), Some(auction.id()));

    tokio::time::advance(Duration::from_millis(200)).await;
    settle().await;
    assert_eq!(manager.last_auction_id(), None);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn raising_the_floor_extends_retention() {
    let policy = Arc::new(floor(2));
    let manager = AuctionManager::new(policy.clone());
    let auction = manager.create_auction(request());
    manager.finish_auction(auction.id());
    settle().await;

    tokio::time::advance(Duration::from_secs(1)).await;
    policy.set_min_bid_cache_ttl(Some(Duration::from_secs(60)));
    settle().await;

    // without the raise this would have been evicted at the 2s mark
    tokio::time::advance(Duration::from_secs(5)).await;
    assert_eq!(manager.last_auction_id(), Some(auction.id()));

    tokio::time::advance(Duration::from_secs(55)).await;
    settle().await;
    assert_eq!(manager.last_auction_id(), None);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn lowering_the_floor_respects_unelapsed_windows() {
    let policy = Arc::new(floor(10));
    let manager = AuctionManager::new(policy.clone());
    let auction = manager.create_auction(request());
    manager.finish_auction(auction.id());
    settle().await;

    tokio::time::advance(Duration::from_secs(1)).await;
    policy.set_min_bid_cache_ttl(Some(Duration::from_secs(5)));
    settle().await;

    // 1s into a recomputed 5s window: still retained
    assert_eq!(manager.last_auction_id(), Some(auction.id()));

    tokio::time::advance(Duration::from_millis(3900)).await;
    assert_eq!(manager.last_auction_id(), Some(auction.id()));

    tokio::time::advance(Duration::from_millis(200)).await;
    settle().await;
    assert_eq!(manager.last_auction_id(), None);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn configuring_a_floor_after_the_fact_starts_eviction() {
    let policy = Arc::new(SharedCachePolicy::default());
    let manager = AuctionManager::new(policy.clone());
    let auction = manager.create_auction(request());
    manager.finish_auction(auction.id());
    settle().await;

    // unbounded while no floor is configured
    tokio::time::advance(Duration::from_secs(3600)).await;
    assert_eq!(manager.last_auction_id(), Some(auction.id()));

    // the window is measured from completion, so it is already elapsed
    policy.set_min_bid_cache_ttl(Some(Duration::from_secs(5)));
    settle().await;
    tokio::time::advance(Duration::from_millis(1)).await;
    settle().await;
    assert_eq!(manager.last_auction_id(), None);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn expiry_callbacks_see_evicted_auctions() {
    let manager = AuctionManager::new(Arc::new(floor(1)));
    let evicted: Arc<std::sync::Mutex<Vec<AuctionId>>> = Arc::default();
    manager.on_expiry({
        let evicted = Arc::clone(&evicted);
        move |auction| evicted.lock().unwrap().push(auction.id())
    });

    let auction = manager.create_auction(request());
    manager.finish_auction(auction.id());
    settle().await;

    tokio::time::advance(Duration::from_millis(1100)).await;
    settle().await;
    assert_eq!(*evicted.lock().unwrap(), vec![auction.id()]);
}
