use std::collections::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use crate::core::{
    overlap::{classify, matched_card_ids, matching_entries, Overlap},
    rarity::{matched_card, same_rarity_groups},
};
use crate::models::{
    CandidateCollections, CardId, CardSummary, MatchResult, TradeMatches, UserCollections, UserId,
};
use crate::services::store::{CollectionStore, StoreError};

/// Failure to load the data a match computation depends on
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("Failed to load lists of user {user_id}: {source}")]
    Requester {
        user_id: UserId,
        #[source]
        source: StoreError,
    },

    #[error("Failed to load candidate lists for user {user_id}: {source}")]
    Candidates {
        user_id: UserId,
        #[source]
        source: StoreError,
    },
}

impl LookupError {
    /// The requester is not a known user
    pub fn is_unknown_user(&self) -> bool {
        matches!(
            self,
            LookupError::Requester {
                source: StoreError::UnknownUser(_),
                ..
            }
        )
    }
}

/// Order of candidates within each output list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchOrdering {
    /// Order in which the store returned the candidates
    #[default]
    Retrieval,
    /// Largest overlap first, ties kept in retrieval order
    Overlap,
}

/// Trade matching engine
///
/// # Pipeline
/// 1. Load the requester's have and want sets (short-circuit when both are empty)
/// 2. Bulk-load every other user's lists
/// 3. Intersect each candidate's lists with the requester's
/// 4. Load catalog data for all matched cards in one batch
/// 5. Classify candidates and group reciprocal ones by rarity
#[derive(Debug, Clone, Default)]
pub struct Matcher {
    ordering: MatchOrdering,
}

impl Matcher {
    pub fn new(ordering: MatchOrdering) -> Self {
        Self { ordering }
    }

    pub fn with_default_ordering() -> Self {
        Self::default()
    }

    pub fn ordering(&self) -> MatchOrdering {
        self.ordering
    }

    /// Load everything needed from the store and compute matches for a user
    ///
    /// Performs at most three store round trips. Catalog failures degrade the
    /// affected cards to `Unrated` instead of failing the call.
    pub async fn compute_matches<S>(
        &self,
        store: &S,
        user_id: &str,
    ) -> Result<TradeMatches, LookupError>
    where
        S: CollectionStore + ?Sized,
    {
        let own = store
            .get_user_collections(user_id)
            .await
            .map_err(|source| LookupError::Requester {
                user_id: user_id.to_string(),
                source,
            })?;

        if own.is_empty() {
            tracing::debug!("User {} has no lists, skipping candidate scan", user_id);
            return Ok(TradeMatches::default());
        }

        let candidates = store
            .get_all_other_users_collections(user_id)
            .await
            .map_err(|source| LookupError::Candidates {
                user_id: user_id.to_string(),
                source,
            })?;

        let card_ids = matched_card_ids(&own, &candidates);
        let catalog = if card_ids.is_empty() {
            HashMap::new()
        } else {
            match store.get_cards_by_ids(&card_ids).await {
                Ok(catalog) => catalog,
                Err(e) => {
                    tracing::warn!(
                        "Catalog lookup for {} cards failed, grading them unrated: {}",
                        card_ids.len(),
                        e
                    );
                    HashMap::new()
                }
            }
        };

        Ok(self.find_matches(user_id, &own, candidates, &catalog))
    }

    /// Compute matches over an already fetched snapshot
    ///
    /// # Arguments
    /// * `user_id` - The requesting user, never matched against itself
    /// * `own` - The requester's have and want card ids
    /// * `candidates` - Every other user's lists, in retrieval order
    /// * `catalog` - Card data for grouping; missing cards are unrated
    pub fn find_matches(
        &self,
        user_id: &str,
        own: &UserCollections,
        candidates: Vec<CandidateCollections>,
        catalog: &HashMap<CardId, CardSummary>,
    ) -> TradeMatches {
        if own.is_empty() {
            return TradeMatches::default();
        }

        let mut result = TradeMatches {
            lists_configured: true,
            ..TradeMatches::default()
        };
        let mut seen: HashSet<UserId> = HashSet::with_capacity(candidates.len());

        for candidate in candidates {
            if candidate.trader.user_id == user_id || !seen.insert(candidate.trader.user_id.clone()) {
                continue;
            }
            result.total_candidates += 1;

            let they_have: Vec<_> = matching_entries(&candidate.have_entries, &own.want_card_ids)
                .into_iter()
                .map(|entry| matched_card(entry, catalog))
                .collect();
            let they_want: Vec<_> = matching_entries(&candidate.want_entries, &own.have_card_ids)
                .into_iter()
                .map(|entry| matched_card(entry, catalog))
                .collect();

            let Some(overlap) = classify(they_have.len(), they_want.len()) else {
                continue;
            };

            let rarity_groups = match overlap {
                Overlap::Reciprocal => same_rarity_groups(&they_have, &they_want),
                _ => Vec::new(),
            };

            let matched = MatchResult {
                trader: candidate.trader,
                they_have,
                they_want,
                rarity_groups,
            };

            match overlap {
                Overlap::TheyHave => result.have_what_i_want.push(matched),
                Overlap::TheyWant => result.want_what_i_have.push(matched),
                Overlap::Reciprocal if matched.is_perfect() => result.perfect_matches.push(matched),
                Overlap::Reciprocal => result.reciprocal_matches.push(matched),
            }
        }

        if self.ordering == MatchOrdering::Overlap {
            for list in [
                &mut result.perfect_matches,
                &mut result.have_what_i_want,
                &mut result.want_what_i_have,
                &mut result.reciprocal_matches,
            ] {
                list.sort_by(|a, b| b.overlap_size().cmp(&a.overlap_size()));
            }
        }

        tracing::debug!(
            "Matched user {}: {} perfect, {} have, {} want, {} reciprocal of {} candidates",
            user_id,
            result.perfect_matches.len(),
            result.have_what_i_want.len(),
            result.want_what_i_have.len(),
            result.reciprocal_matches.len(),
            result.total_candidates
        );

        result
    }
}
