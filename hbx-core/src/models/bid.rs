use super::{AdUnitCode, AuctionId, BidId, BidderCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;

/// The post-selection status of a bid.
///
/// Statuses are monotonic: `available → targetingSet → rendered | expired`,
/// and never regress. `rendered` and `expired` are both terminal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BidStatus {
    /// The bid has been received and may still be selected
    #[default]
    Available,
    /// Ad-server targeting has been finalized for this bid
    TargetingSet,
    /// The bid's creative has been rendered
    Rendered,
    /// The bid's usable window elapsed before it was rendered
    Expired,
}

impl BidStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Available => 0,
            Self::TargetingSet => 1,
            Self::Rendered => 2,
            Self::Expired => 2,
        }
    }

    /// Whether a transition from `self` to `next` respects the monotonic
    /// status order. Re-asserting the current status is allowed.
    pub fn may_become(self, next: Self) -> bool {
        self == next || next.rank() > self.rank()
    }
}

/// A participant's response within an auction.
///
/// Carries the monetary value of the response, the placement it is eligible
/// to fill, and a time-to-live governing how long the response remains usable
/// after being chosen as a winner. Construction is validated; deserialization
/// goes through [`RawBid`] so invalid values are rejected at the boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBid", into = "RawBid")]
pub struct Bid {
    /// The auction this response belongs to
    pub auction_id: AuctionId,

    /// A unique id for this response
    pub bid_id: BidId,

    /// The responding participant
    pub bidder: BidderCode,

    /// The placement this response is eligible to fill
    pub ad_unit_code: AdUnitCode,

    /// The monetary value of the response (non-negative, finite)
    pub cpm: f64,

    /// ISO currency code of `cpm`
    pub currency: String,

    /// How long this response remains usable after being chosen as a winner
    pub ttl: Duration,

    /// The current post-selection status
    pub status: BidStatus,

    /// Latency between the auction start and this response's arrival,
    /// stamped by the engine when the response is folded in
    pub time_to_respond: Option<Duration>,

    /// Arrival timestamp, stamped by the engine when the response is folded in
    pub received_at: Option<OffsetDateTime>,
}

impl Bid {
    /// Construct a validated bid with a fresh id and `available` status.
    pub fn new(
        auction_id: AuctionId,
        bidder: impl Into<BidderCode>,
        ad_unit_code: impl Into<AdUnitCode>,
        cpm: f64,
        currency: impl Into<String>,
        ttl: Duration,
    ) -> Result<Self, ValidationError> {
        if !cpm.is_finite() {
            return Err(ValidationError::NonFiniteCpm);
        }
        if cpm < 0.0 {
            return Err(ValidationError::NegativeCpm);
        }

        Ok(Self {
            auction_id,
            bid_id: BidId::random(),
            bidder: bidder.into(),
            ad_unit_code: ad_unit_code.into(),
            cpm,
            currency: currency.into(),
            ttl,
            status: BidStatus::Available,
            time_to_respond: None,
            received_at: None,
        })
    }
}

/// An enumeration of the ways bid data may be invalid
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The cpm was NaN or infinite
    #[error("cpm must be a finite number")]
    NonFiniteCpm,
    /// The cpm was below zero
    #[error("cpm must be non-negative")]
    NegativeCpm,
}

// To seamlessly (de)serialize with validation, we create a "raw" version of
// the struct that contains only primitive values. Serde uses the raw version
// for (de)serialization and then converts. Note that the ttl is carried as
// whole seconds, matching what participants actually send on the wire.

/// The "DTO" type for [`Bid`]. Omitted fields take their defaults
/// (`currency: "USD"`, `status: available`).
#[derive(Serialize, Deserialize)]
pub struct RawBid {
    pub auction_id: AuctionId,
    pub bid_id: BidId,
    pub bidder: BidderCode,
    pub ad_unit_code: AdUnitCode,
    pub cpm: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub ttl: u32,
    #[serde(default)]
    pub status: BidStatus,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "humantime_serde")]
    pub time_to_respond: Option<Duration>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub received_at: Option<OffsetDateTime>,
}

fn default_currency() -> String {
    "USD".to_owned()
}

impl TryFrom<RawBid> for Bid {
    type Error = ValidationError;

    fn try_from(value: RawBid) -> Result<Self, Self::Error> {
        let mut bid = Bid::new(
            value.auction_id,
            value.bidder,
            value.ad_unit_code,
            value.cpm,
            value.currency,
            Duration::from_secs(value.ttl as u64),
        )?;
        bid.bid_id = value.bid_id;
        bid.status = value.status;
        bid.time_to_respond = value.time_to_respond;
        bid.received_at = value.received_at;
        Ok(bid)
    }
}

impl From<Bid> for RawBid {
    fn from(value: Bid) -> Self {
        Self {
            auction_id: value.auction_id,
            bid_id: value.bid_id,
            bidder: value.bidder,
            ad_unit_code: value.ad_unit_code,
            cpm: value.cpm,
            currency: value.currency,
            ttl: value.ttl.as_secs() as u32,
            status: value.status,
            time_to_respond: value.time_to_respond,
            received_at: value.received_at,
        }
    }
}
