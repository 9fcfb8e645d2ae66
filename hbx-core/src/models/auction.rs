use super::AdUnit;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The lifecycle status of an auction.
///
/// An auction is created `Running` and transitions to `Completed` exactly
/// once, either because the fan-out driver finished it early or because its
/// deadline fired. There is no reverse transition: a completed auction is
/// retained read-only until it is evicted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuctionStatus {
    /// Responses are still being collected
    Running,
    /// The round is finished and all aggregates are stable
    Completed,
}

/// The request to run one auction round.
///
/// Each ad unit names the participants to solicit for it; the timeout is the
/// response deadline for the whole round.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuctionRequest {
    /// The placements up for auction, in the order they should be reported
    pub ad_units: Vec<AdUnit>,

    /// The response deadline for the round
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}
