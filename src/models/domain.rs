use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

pub type CardId = String;
pub type UserId = String;

/// Catalog card record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub name: String,
    #[serde(rename = "setName", alias = "set_name")]
    pub set_name: String,
    #[serde(default)]
    pub pack: String,
    #[serde(default)]
    pub rarity: Option<String>,
    #[serde(rename = "cardNumber", alias = "card_number", default)]
    pub card_number: String,
    #[serde(rename = "imageUrl", alias = "image_url", default)]
    pub image_url: String,
}

/// Card attributes needed to group and display matched cards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardSummary {
    pub id: CardId,
    pub name: String,
    #[serde(rename = "setName", alias = "set_name")]
    pub set_name: String,
    #[serde(default)]
    pub rarity: Option<String>,
}

impl From<&Card> for CardSummary {
    fn from(card: &Card) -> Self {
        Self {
            id: card.id.clone(),
            name: card.name.clone(),
            set_name: card.set_name.clone(),
            rarity: card.rarity.clone(),
        }
    }
}

/// Which of a user's two lists an entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    /// Cards the user owns and will trade away
    Have,
    /// Cards the user is looking for
    Want,
}

impl ListKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListKind::Have => "have",
            ListKind::Want => "want",
        }
    }
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single have or want entry owned by a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListEntry {
    pub id: i64,
    #[serde(rename = "userId", alias = "user_id")]
    pub user_id: UserId,
    #[serde(rename = "cardId", alias = "card_id")]
    pub card_id: CardId,
    #[serde(rename = "createdAt", alias = "created_at", default)]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// A list entry joined with its catalog card, if the card still exists
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListedCard {
    #[serde(rename = "entryId")]
    pub entry_id: i64,
    pub card: Option<Card>,
}

/// Public display data of a trading partner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraderProfile {
    #[serde(rename = "userId", alias = "user_id")]
    pub user_id: UserId,
    #[serde(rename = "inGameName", alias = "in_game_name", default)]
    pub in_game_name: Option<String>,
    #[serde(rename = "inGameId", alias = "in_game_id", default)]
    pub in_game_id: Option<String>,
}

impl TraderProfile {
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            in_game_name: None,
            in_game_id: None,
        }
    }
}

/// Entry of a candidate's have or want list as returned by the bulk fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionEntry {
    #[serde(rename = "entryId", alias = "id")]
    pub entry_id: i64,
    #[serde(rename = "cardId", alias = "card_id")]
    pub card_id: CardId,
}

/// The requesting user's own lists, reduced to card ids
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserCollections {
    pub have_card_ids: HashSet<CardId>,
    pub want_card_ids: HashSet<CardId>,
}

impl UserCollections {
    /// True when the user has configured neither list
    pub fn is_empty(&self) -> bool {
        self.have_card_ids.is_empty() && self.want_card_ids.is_empty()
    }
}

/// Another user's lists, as candidate input to the matcher
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateCollections {
    pub trader: TraderProfile,
    pub have_entries: Vec<CollectionEntry>,
    pub want_entries: Vec<CollectionEntry>,
}

/// Rarity tier of a card
///
/// `Unrated` is its own category and never equals a `Tier`, whatever the
/// tier's label is. It serializes as JSON `null`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Rarity {
    Tier(String),
    Unrated,
}

impl Rarity {
    /// Build a rarity from an optional catalog label; blank labels are unrated
    pub fn from_label(label: Option<&str>) -> Self {
        match label.map(str::trim) {
            Some(label) if !label.is_empty() => Rarity::Tier(label.to_string()),
            _ => Rarity::Unrated,
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            Rarity::Tier(label) => Some(label),
            Rarity::Unrated => None,
        }
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rarity::Tier(label) => f.write_str(label),
            Rarity::Unrated => f.write_str("unrated"),
        }
    }
}

/// A candidate's entry that matched one of the requester's lists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedCard {
    #[serde(rename = "entryId")]
    pub entry_id: i64,
    #[serde(rename = "cardId")]
    pub card_id: CardId,
    pub name: Option<String>,
    #[serde(rename = "setName")]
    pub set_name: Option<String>,
    pub rarity: Rarity,
}

/// Cards on both sides of a trade that share one rarity tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RarityGroup {
    pub rarity: Rarity,
    #[serde(rename = "theyHave")]
    pub they_have: Vec<MatchedCard>,
    #[serde(rename = "theyWant")]
    pub they_want: Vec<MatchedCard>,
}

/// Overlap between the requester and one counterpart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub trader: TraderProfile,
    /// Cards the counterpart has that the requester wants
    #[serde(rename = "theyHave")]
    pub they_have: Vec<MatchedCard>,
    /// Cards the counterpart wants that the requester has
    #[serde(rename = "theyWant")]
    pub they_want: Vec<MatchedCard>,
    #[serde(rename = "rarityGroups")]
    pub rarity_groups: Vec<RarityGroup>,
}

impl MatchResult {
    /// At least one rarity tier has cards in both directions
    pub fn is_perfect(&self) -> bool {
        !self.rarity_groups.is_empty()
    }

    pub fn overlap_size(&self) -> usize {
        self.they_have.len() + self.they_want.len()
    }

    /// Cards they have that fall in no shared rarity tier
    pub fn unpaired_have(&self) -> Vec<&MatchedCard> {
        self.they_have
            .iter()
            .filter(|card| {
                !self
                    .rarity_groups
                    .iter()
                    .any(|group| group.they_have.iter().any(|c| c.entry_id == card.entry_id))
            })
            .collect()
    }

    /// Cards they want that fall in no shared rarity tier
    pub fn unpaired_want(&self) -> Vec<&MatchedCard> {
        self.they_want
            .iter()
            .filter(|card| {
                !self
                    .rarity_groups
                    .iter()
                    .any(|group| group.they_want.iter().any(|c| c.entry_id == card.entry_id))
            })
            .collect()
    }
}

/// All matches for a requesting user, partitioned by classification
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeMatches {
    pub perfect_matches: Vec<MatchResult>,
    pub have_what_i_want: Vec<MatchResult>,
    pub want_what_i_have: Vec<MatchResult>,
    /// Reciprocal overlap without any shared rarity tier
    pub reciprocal_matches: Vec<MatchResult>,
    /// Whether the requester had any have or want entries at all
    pub lists_configured: bool,
    pub total_candidates: usize,
}

impl TradeMatches {
    pub fn is_empty(&self) -> bool {
        self.perfect_matches.is_empty()
            && self.have_what_i_want.is_empty()
            && self.want_what_i_have.is_empty()
            && self.reciprocal_matches.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rarity_from_label() {
        assert_eq!(Rarity::from_label(Some("Rare")), Rarity::Tier("Rare".to_string()));
        assert_eq!(Rarity::from_label(Some("  Rare ")), Rarity::Tier("Rare".to_string()));
        assert_eq!(Rarity::from_label(Some("")), Rarity::Unrated);
        assert_eq!(Rarity::from_label(None), Rarity::Unrated);
    }

    #[test]
    fn test_unrated_distinct_from_literal_labels() {
        assert_ne!(Rarity::from_label(Some("Unknown")), Rarity::Unrated);
        assert_ne!(Rarity::from_label(Some("Unrated")), Rarity::Unrated);
    }

    #[test]
    fn test_rarity_serializes_unrated_as_null() {
        let json = serde_json::to_value(Rarity::Unrated).unwrap();
        assert!(json.is_null());

        let json = serde_json::to_value(Rarity::Tier("Rare".to_string())).unwrap();
        assert_eq!(json, serde_json::json!("Rare"));

        let parsed: Rarity = serde_json::from_value(serde_json::Value::Null).unwrap();
        assert_eq!(parsed, Rarity::Unrated);
    }

    #[test]
    fn test_unrated_sorts_after_tiers() {
        assert!(Rarity::Tier("Common".to_string()) < Rarity::Unrated);
    }

    #[test]
    fn test_list_entry_accepts_snake_case() {
        let entry: ListEntry = serde_json::from_value(serde_json::json!({
            "id": 7,
            "user_id": "u1",
            "card_id": "c1",
            "created_at": null
        }))
        .unwrap();

        assert_eq!(entry.card_id, "c1");
        assert_eq!(entry.created_at, None);
    }
}
