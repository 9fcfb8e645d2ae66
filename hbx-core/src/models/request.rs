use super::{AdUnitCode, AuctionId, BidderCode, RequestId};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A single solicitation of one participant for one placement.
///
/// Requests double as the no-response record: a request that never produced a
/// bid before the auction completed is reported through the no-bid queries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BidRequest {
    /// The auction this request belongs to
    pub auction_id: AuctionId,

    /// A unique id for the request
    pub request_id: RequestId,

    /// The participant solicited
    pub bidder: BidderCode,

    /// The placement the participant was asked to fill
    pub ad_unit_code: AdUnitCode,

    /// When the solicitation was issued
    #[serde(with = "time::serde::rfc3339")]
    pub requested_at: OffsetDateTime,
}

impl BidRequest {
    /// Construct a request with a fresh id, stamped now.
    pub fn new(
        auction_id: AuctionId,
        bidder: BidderCode,
        ad_unit_code: AdUnitCode,
    ) -> Self {
        Self {
            auction_id,
            request_id: RequestId::random(),
            bidder,
            ad_unit_code,
            requested_at: OffsetDateTime::now_utc(),
        }
    }
}
