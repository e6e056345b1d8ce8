use std::collections::{BTreeSet, HashSet};
use crate::models::{CandidateCollections, CardId, CollectionEntry, UserCollections};

/// How a candidate's lists relate to the requester's
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlap {
    /// They have cards the requester wants, but want nothing the requester has
    TheyHave,
    /// They want cards the requester has, but have nothing the requester wants
    TheyWant,
    /// Overlap in both directions
    Reciprocal,
}

/// Entries whose card id is contained in `card_ids`, in list order
#[inline]
pub fn matching_entries<'a>(
    entries: &'a [CollectionEntry],
    card_ids: &HashSet<CardId>,
) -> Vec<&'a CollectionEntry> {
    if card_ids.is_empty() {
        return Vec::new();
    }

    entries
        .iter()
        .filter(|entry| card_ids.contains(&entry.card_id))
        .collect()
}

/// Classify a candidate from the sizes of both matched subsets
///
/// Returns `None` when there is no overlap at all.
#[inline]
pub fn classify(they_have: usize, they_want: usize) -> Option<Overlap> {
    match (they_have > 0, they_want > 0) {
        (false, false) => None,
        (true, false) => Some(Overlap::TheyHave),
        (false, true) => Some(Overlap::TheyWant),
        (true, true) => Some(Overlap::Reciprocal),
    }
}

/// Every card id that any candidate would contribute to a match
///
/// Used to fetch all catalog data in a single batch. Sorted for stable
/// request construction.
pub fn matched_card_ids(
    own: &UserCollections,
    candidates: &[CandidateCollections],
) -> Vec<CardId> {
    let mut ids = BTreeSet::new();

    for candidate in candidates {
        for entry in matching_entries(&candidate.have_entries, &own.want_card_ids) {
            ids.insert(entry.card_id.clone());
        }
        for entry in matching_entries(&candidate.want_entries, &own.have_card_ids) {
            ids.insert(entry.card_id.clone());
        }
    }

    ids.into_iter().collect()
}
