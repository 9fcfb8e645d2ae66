use super::{AdUnitCode, BidderCode};
use serde::{Deserialize, Serialize};

/// A placement up for auction, together with the participants solicited for it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdUnit {
    /// The logical slot a winning response will eventually fill
    pub code: AdUnitCode,

    /// The participants to request a response from, in solicitation order
    pub bidders: Vec<BidderCode>,
}

impl AdUnit {
    /// Convenience constructor from plain strings.
    pub fn new(code: impl Into<AdUnitCode>, bidders: impl IntoIterator<Item = impl Into<BidderCode>>) -> Self {
        Self {
            code: code.into(),
            bidders: bidders.into_iter().map(Into::into).collect(),
        }
    }
}
