//! Trade Match - Trade partner matching for a card collector community
//!
//! Users keep a "have" list of cards they will trade away and a "want" list of
//! cards they are looking for. The matching engine intersects those lists with
//! every other user's and sorts the results into one-directional and
//! reciprocal matches, with reciprocal matches grouped by card rarity.

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use core::{LookupError, MatchOrdering, Matcher};
pub use models::{MatchResult, Rarity, TradeMatches, TradeMatchesResponse, UserCollections};
pub use services::{CollectionStore, MemoryStore, StoreBackend, StoreError};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let matcher = Matcher::with_default_ordering();
        assert_eq!(matcher.ordering(), MatchOrdering::Retrieval);
        assert_eq!(Rarity::from_label(Some("  ")), Rarity::Unrated);
    }
}
