use hbx_core::models::{AdUnit, AdUnitCode, AuctionId, AuctionRequest, Bid};
use hbx_memory::{AuctionManager, SharedCachePolicy};
use rstest::*;
use std::{sync::Arc, time::Duration};

#[fixture]
fn manager() -> AuctionManager {
    AuctionManager::new(Arc::new(SharedCachePolicy::default()))
}

#[fixture]
fn shared_placement() -> AuctionRequest {
    AuctionRequest {
        ad_units: vec![
            AdUnit::new("div-1", ["alpha", "beta"]),
            AdUnit::new("div-2", ["alpha"]),
        ],
        timeout: Duration::from_millis(1000),
    }
}

fn bid(auction_id: AuctionId, bidder: &str, code: &str, cpm: f64) -> Bid {
    Bid::new(
        auction_id,
        bidder,
        code,
        cpm,
        "USD",
        Duration::from_secs(300),
    )
    .unwrap()
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn bids_for_a_placement_span_auctions_in_creation_order(
    manager: AuctionManager,
    shared_placement: AuctionRequest,
) {
    let first = manager.create_auction(shared_placement.clone());
    let second = manager.create_auction(shared_placement);

    manager.record_bid(first.id(), bid(first.id(), "alpha", "div-1", 1.0));
    manager.record_bid(first.id(), bid(first.id(), "alpha", "div-2", 4.0));
    manager.record_bid(second.id(), bid(second.id(), "beta", "div-1", 2.0));
    manager.finish_auction(first.id());
    manager.finish_auction(second.id());

    let matching = manager.bids_for_ad_unit_code(&AdUnitCode::from("div-1"));
    assert_eq!(matching.len(), 2);
    assert_eq!(matching[0].auction_id, first.id());
    assert_eq!(matching[0].cpm, 1.0);
    assert_eq!(matching[1].auction_id, second.id());
    assert_eq!(matching[1].cpm, 2.0);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn ad_unit_codes_deduplicate_preserving_first_seen_order(
    manager: AuctionManager,
    shared_placement: AuctionRequest,
) {
    manager.create_auction(shared_placement.clone());
    manager.create_auction(AuctionRequest {
        ad_units: vec![
            AdUnit::new("div-3", ["alpha"]),
            AdUnit::new("div-1", ["beta"]),
        ],
        timeout: Duration::from_millis(1000),
    });

    let codes: Vec<_> = manager
        .ad_unit_codes()
        .iter()
        .map(|code| code.to_string())
        .collect();
    assert_eq!(codes, vec!["div-1", "div-2", "div-3"]);

    // four ad units across both auctions, duplicates included
    assert_eq!(manager.ad_units().len(), 4);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn recording_a_winner_twice_keeps_only_the_latest(
    manager: AuctionManager,
    shared_placement: AuctionRequest,
) {
    let auction = manager.create_auction(shared_placement);
    let first = bid(auction.id(), "alpha", "div-1", 1.0);
    let second = bid(auction.id(), "beta", "div-1", 2.0);

    manager.add_winning_bid(first);
    manager.add_winning_bid(second.clone());

    let winners = manager.all_winning_bids();
    assert_eq!(winners.len(), 1);
    assert_eq!(winners[0].bid_id, second.bid_id);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn aggregates_enumerate_oldest_auction_first(
    manager: AuctionManager,
    shared_placement: AuctionRequest,
) {
    let first = manager.create_auction(shared_placement.clone());
    let second = manager.create_auction(shared_placement.clone());
    let third = manager.create_auction(shared_placement);

    for auction in [&first, &second, &third] {
        manager.record_bid(auction.id(), bid(auction.id(), "alpha", "div-1", 1.0));
        manager.finish_auction(auction.id());
    }

    let order: Vec<_> = manager
        .bids_received()
        .iter()
        .map(|bid| bid.auction_id)
        .collect();
    assert_eq!(order, vec![first.id(), second.id(), third.id()]);

    // requests and no-bids follow the same enumeration order
    assert_eq!(manager.bid_requests().len(), 9);
    assert_eq!(manager.bid_requests()[0].auction_id, first.id());
    assert_eq!(manager.no_bids().len(), 6);

    assert_eq!(manager.last_auction_id(), Some(third.id()));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn index_resolves_ids_placements_and_bid_owners(
    manager: AuctionManager,
    shared_placement: AuctionRequest,
) {
    let first = manager.create_auction(shared_placement.clone());
    let second = manager.create_auction(AuctionRequest {
        ad_units: vec![AdUnit::new("div-9", ["alpha"])],
        timeout: Duration::from_millis(1000),
    });

    let placed = bid(first.id(), "alpha", "div-1", 1.0);
    manager.record_bid(first.id(), placed.clone());

    assert_eq!(
        manager.index().auction(first.id()).map(|a| a.id()),
        Some(first.id())
    );
    assert_eq!(
        manager
            .index()
            .owner_of_bid(placed.bid_id)
            .map(|a| a.id()),
        Some(first.id())
    );

    let div1: Vec<_> = manager
        .index()
        .auctions_for_ad_unit(&AdUnitCode::from("div-1"))
        .iter()
        .map(|a| a.id())
        .collect();
    assert_eq!(div1, vec![first.id()]);

    let div9: Vec<_> = manager
        .index()
        .auctions_for_ad_unit(&AdUnitCode::from("div-9"))
        .iter()
        .map(|a| a.id())
        .collect();
    assert_eq!(div9, vec![second.id()]);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn index_reflects_eviction_immediately(
    manager: AuctionManager,
    shared_placement: AuctionRequest,
) {
    let auction = manager.create_auction(shared_placement);
    assert!(manager.index().auction(auction.id()).is_some());

    manager.clear_all();
    assert!(manager.index().auction(auction.id()).is_none());
    assert!(
        manager
            .index()
            .auctions_for_ad_unit(&AdUnitCode::from("div-1"))
            .is_empty()
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn find_bid_by_ad_id_sees_running_auctions(
    manager: AuctionManager,
    shared_placement: AuctionRequest,
) {
    let auction = manager.create_auction(shared_placement);
    let placed = bid(auction.id(), "alpha", "div-1", 1.0);
    manager.record_bid(auction.id(), placed.clone());

    // the rendering layer can resolve a response before the round completes
    let found = manager.find_bid_by_ad_id(placed.bid_id).unwrap();
    assert_eq!(found.bid_id, placed.bid_id);
    assert!(manager.find_bid_by_ad_id(Bid::new(
        auction.id(),
        "alpha",
        "div-1",
        1.0,
        "USD",
        Duration::from_secs(300),
    )
    .unwrap()
    .bid_id)
    .is_none());
}
