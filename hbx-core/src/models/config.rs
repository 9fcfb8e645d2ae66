use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retention configuration for completed auctions.
///
/// The floor is the process-wide minimum time a completed auction stays
/// queryable. The effective retention of an auction is the longest of the
/// floor and the TTLs of its received bids, so that no constituent response
/// is purged early. With no floor configured, completed auctions are retained
/// until explicitly cleared.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Minimum retention for completed auctions; absent means "no floor"
    #[serde(default, skip_serializing_if = "Option::is_none", with = "humantime_serde")]
    pub min_bid_cache_ttl: Option<Duration>,
}
