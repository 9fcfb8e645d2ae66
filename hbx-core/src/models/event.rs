use super::{AuctionId, Bid, BidRequest};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::OffsetDateTime;

/// A lifecycle event emitted by the auction engine.
///
/// Events are the interface boundary toward analytics collaborators: sinks
/// subscribe to the engine's event stream and forward whatever subset they
/// care about. For a given auction, events arrive in lifecycle order:
/// `Init`, any number of `BidResponse`, an optional `BidTimeout`,
/// `AuctionEnd`, then any number of `BidWon`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum AuctionEvent {
    /// A new auction round started
    Init {
        /// The new auction's id
        auction_id: AuctionId,
        /// The round's response deadline
        #[serde(with = "humantime_serde")]
        timeout: Duration,
    },

    /// A participant's response was folded into a running auction
    BidResponse {
        /// The response as recorded
        bid: Bid,
    },

    /// The deadline fired with solicitations still unanswered
    BidTimeout {
        /// The requests that never produced a response
        requests: Vec<BidRequest>,
    },

    /// An auction completed; its aggregates are now stable
    AuctionEnd {
        /// The completed auction's id
        auction_id: AuctionId,
        /// The completion timestamp
        #[serde(with = "time::serde::rfc3339")]
        end: OffsetDateTime,
    },

    /// A response was designated the winner for its placement
    BidWon {
        /// The winning response
        bid: Bid,
    },
}
