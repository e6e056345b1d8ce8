use serde::{Deserialize, Serialize};
use crate::models::domain::{
    ListEntry, ListKind, ListedCard, MatchResult, MatchedCard, RarityGroup, TradeMatches, TraderProfile,
};

/// Why a match response has no entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyState {
    /// The user has not listed any card yet
    NoLists,
    /// The user has lists but nobody complements them
    NoOverlap,
}

/// One counterpart as rendered to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchView {
    pub trader: TraderProfile,
    #[serde(rename = "theyHave")]
    pub they_have: Vec<MatchedCard>,
    #[serde(rename = "theyWant")]
    pub they_want: Vec<MatchedCard>,
    #[serde(rename = "rarityGroups")]
    pub rarity_groups: Vec<RarityGroup>,
    #[serde(rename = "isPerfect")]
    pub is_perfect: bool,
    /// Matched cards they have outside every shared rarity tier
    #[serde(rename = "unpairedHave")]
    pub unpaired_have: Vec<MatchedCard>,
    #[serde(rename = "unpairedWant")]
    pub unpaired_want: Vec<MatchedCard>,
}

impl From<MatchResult> for MatchView {
    fn from(result: MatchResult) -> Self {
        let is_perfect = result.is_perfect();
        let unpaired_have = result.unpaired_have().into_iter().cloned().collect();
        let unpaired_want = result.unpaired_want().into_iter().cloned().collect();

        Self {
            trader: result.trader,
            they_have: result.they_have,
            they_want: result.they_want,
            rarity_groups: result.rarity_groups,
            is_perfect,
            unpaired_have,
            unpaired_want,
        }
    }
}

/// Response for the trade matches endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeMatchesResponse {
    #[serde(rename = "perfectMatches")]
    pub perfect_matches: Vec<MatchView>,
    #[serde(rename = "haveWhatIWant")]
    pub have_what_i_want: Vec<MatchView>,
    #[serde(rename = "wantWhatIHave")]
    pub want_what_i_have: Vec<MatchView>,
    #[serde(rename = "reciprocalMatches")]
    pub reciprocal_matches: Vec<MatchView>,
    #[serde(rename = "emptyState")]
    pub empty_state: Option<EmptyState>,
    #[serde(rename = "totalCandidates")]
    pub total_candidates: usize,
}

impl From<TradeMatches> for TradeMatchesResponse {
    fn from(matches: TradeMatches) -> Self {
        let empty_state = if !matches.lists_configured {
            Some(EmptyState::NoLists)
        } else if matches.is_empty() {
            Some(EmptyState::NoOverlap)
        } else {
            None
        };

        let views = |list: Vec<MatchResult>| -> Vec<MatchView> {
            list.into_iter().map(MatchView::from).collect()
        };

        Self {
            perfect_matches: views(matches.perfect_matches),
            have_what_i_want: views(matches.have_what_i_want),
            want_what_i_have: views(matches.want_what_i_have),
            reciprocal_matches: views(matches.reciprocal_matches),
            empty_state,
            total_candidates: matches.total_candidates,
        }
    }
}

/// A user's have or want list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionResponse {
    pub kind: ListKind,
    pub entries: Vec<ListedCard>,
    pub total: usize,
}

/// Result of adding a card to a list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddCardResponse {
    pub success: bool,
    pub entry: ListEntry,
}

/// Result of removing a card from a list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveCardResponse {
    pub removed: bool,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub store: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_state_without_lists() {
        let response = TradeMatchesResponse::from(TradeMatches::default());
        assert_eq!(response.empty_state, Some(EmptyState::NoLists));
    }

    #[test]
    fn test_empty_state_without_overlap() {
        let matches = TradeMatches {
            lists_configured: true,
            total_candidates: 3,
            ..TradeMatches::default()
        };
        let response = TradeMatchesResponse::from(matches);
        assert_eq!(response.empty_state, Some(EmptyState::NoOverlap));
        assert_eq!(response.total_candidates, 3);
    }

    #[test]
    fn test_empty_state_serialization() {
        let json = serde_json::to_string(&EmptyState::NoOverlap).unwrap();
        assert_eq!(json, "\"no_overlap\"");
    }
}
