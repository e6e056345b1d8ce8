// Core algorithm exports
pub mod matcher;
pub mod overlap;
pub mod rarity;

pub use matcher::{LookupError, MatchOrdering, Matcher};
pub use overlap::{classify, matched_card_ids, matching_entries, Overlap};
pub use rarity::{group_by_rarity, matched_card, same_rarity_groups};
