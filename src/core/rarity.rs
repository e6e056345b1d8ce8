use std::collections::{BTreeMap, HashMap};
use crate::models::{CardId, CardSummary, CollectionEntry, MatchedCard, Rarity, RarityGroup};

/// Enrich a matched entry with catalog data
///
/// A card missing from the catalog keeps its entry and is graded `Unrated`.
pub fn matched_card(entry: &CollectionEntry, catalog: &HashMap<CardId, CardSummary>) -> MatchedCard {
    match catalog.get(&entry.card_id) {
        Some(card) => MatchedCard {
            entry_id: entry.entry_id,
            card_id: entry.card_id.clone(),
            name: Some(card.name.clone()),
            set_name: Some(card.set_name.clone()),
            rarity: Rarity::from_label(card.rarity.as_deref()),
        },
        None => MatchedCard {
            entry_id: entry.entry_id,
            card_id: entry.card_id.clone(),
            name: None,
            set_name: None,
            rarity: Rarity::Unrated,
        },
    }
}

/// Group cards by rarity, preserving their relative order within a tier
pub fn group_by_rarity(cards: &[MatchedCard]) -> BTreeMap<Rarity, Vec<MatchedCard>> {
    let mut groups: BTreeMap<Rarity, Vec<MatchedCard>> = BTreeMap::new();
    for card in cards {
        groups.entry(card.rarity.clone()).or_default().push(card.clone());
    }
    groups
}

/// Rarity tiers present on both sides of a trade
///
/// Each returned group holds only the cards of that tier. Groups are ordered
/// by tier label with `Unrated` last.
pub fn same_rarity_groups(they_have: &[MatchedCard], they_want: &[MatchedCard]) -> Vec<RarityGroup> {
    let mut want_by_rarity = group_by_rarity(they_want);

    group_by_rarity(they_have)
        .into_iter()
        .filter_map(|(rarity, have)| {
            want_by_rarity.remove(&rarity).map(|want| RarityGroup {
                rarity,
                they_have: have,
                they_want: want,
            })
        })
        .collect()
}
