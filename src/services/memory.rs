//! In-process collection store.
//!
//! Backs tests and local demos. Can be seeded from a JSON file holding users,
//! cards and list entries.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use parking_lot::RwLock;
use serde::Deserialize;
use crate::models::{
    CandidateCollections, Card, CardId, CardSummary, CollectionEntry, ListEntry, ListKind, ListedCard,
    TraderProfile, UserCollections,
};
use crate::services::store::{CollectionStore, StoreError};

/// Seed file layout
#[derive(Debug, Default, Deserialize)]
pub struct MemorySeed {
    #[serde(default)]
    pub users: Vec<TraderProfile>,
    #[serde(default)]
    pub cards: Vec<Card>,
    #[serde(default)]
    pub have: Vec<SeedEntry>,
    #[serde(default)]
    pub want: Vec<SeedEntry>,
}

#[derive(Debug, Deserialize)]
pub struct SeedEntry {
    #[serde(alias = "userId")]
    pub user_id: String,
    #[serde(alias = "cardId")]
    pub card_id: String,
}

#[derive(Debug, Default)]
struct MemoryState {
    users: Vec<TraderProfile>,
    cards: HashMap<CardId, Card>,
    have: Vec<ListEntry>,
    want: Vec<ListEntry>,
    next_entry_id: i64,
}

impl MemoryState {
    fn has_user(&self, user_id: &str) -> bool {
        self.users.iter().any(|u| u.user_id == user_id)
    }

    fn list(&self, kind: ListKind) -> &Vec<ListEntry> {
        match kind {
            ListKind::Have => &self.have,
            ListKind::Want => &self.want,
        }
    }

    fn list_mut(&mut self, kind: ListKind) -> &mut Vec<ListEntry> {
        match kind {
            ListKind::Have => &mut self.have,
            ListKind::Want => &mut self.want,
        }
    }

    fn entries_of(&self, user_id: &str, kind: ListKind) -> Vec<CollectionEntry> {
        self.list(kind)
            .iter()
            .filter(|e| e.user_id == user_id)
            .map(|e| CollectionEntry {
                entry_id: e.id,
                card_id: e.card_id.clone(),
            })
            .collect()
    }
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from seed data, rejecting entries that reference unknown users or cards.
    pub fn from_seed(seed: MemorySeed) -> Result<Self, StoreError> {
        let store = Self::new();
        for user in seed.users {
            store.state.write().users.push(user);
        }
        for card in seed.cards {
            store.insert_card(card);
        }
        for entry in seed.have {
            store.insert_entry(&entry.user_id, ListKind::Have, &entry.card_id)?;
        }
        for entry in seed.want {
            store.insert_entry(&entry.user_id, ListKind::Want, &entry.card_id)?;
        }
        Ok(store)
    }

    /// Load a JSON seed file.
    pub fn load_seed_file<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| StoreError::InvalidSeed(format!("{}: {}", path.display(), e)))?;
        let seed: MemorySeed = serde_json::from_str(&raw)
            .map_err(|e| StoreError::InvalidSeed(format!("{}: {}", path.display(), e)))?;
        Self::from_seed(seed)
    }

    /// Register a user. Re-registering an existing id updates its display name.
    pub fn insert_user(&self, user_id: &str, in_game_name: Option<&str>) {
        let mut state = self.state.write();
        match state.users.iter_mut().find(|u| u.user_id == user_id) {
            Some(user) => user.in_game_name = in_game_name.map(str::to_string),
            None => state.users.push(TraderProfile {
                user_id: user_id.to_string(),
                in_game_name: in_game_name.map(str::to_string),
                in_game_id: None,
            }),
        }
    }

    pub fn insert_card(&self, card: Card) {
        self.state.write().cards.insert(card.id.clone(), card);
    }

    /// Remove a card from the catalog, leaving list entries that reference it in place.
    pub fn remove_card(&self, card_id: &str) -> bool {
        self.state.write().cards.remove(card_id).is_some()
    }

    /// Add an entry without a catalog check on the card.
    ///
    /// Returns the existing entry when the card is already listed.
    pub fn insert_entry(&self, user_id: &str, kind: ListKind, card_id: &str) -> Result<ListEntry, StoreError> {
        let mut state = self.state.write();
        if !state.has_user(user_id) {
            return Err(StoreError::UnknownUser(user_id.to_string()));
        }

        if let Some(existing) = state
            .list(kind)
            .iter()
            .find(|e| e.user_id == user_id && e.card_id == card_id)
        {
            return Ok(existing.clone());
        }

        state.next_entry_id += 1;
        let entry = ListEntry {
            id: state.next_entry_id,
            user_id: user_id.to_string(),
            card_id: card_id.to_string(),
            created_at: Some(chrono::Utc::now()),
        };
        state.list_mut(kind).push(entry.clone());
        Ok(entry)
    }
}

impl CollectionStore for MemoryStore {
    async fn get_user_collections(&self, user_id: &str) -> Result<UserCollections, StoreError> {
        let state = self.state.read();
        if !state.has_user(user_id) {
            return Err(StoreError::UnknownUser(user_id.to_string()));
        }

        let card_ids = |kind: ListKind| -> HashSet<CardId> {
            state
                .list(kind)
                .iter()
                .filter(|e| e.user_id == user_id)
                .map(|e| e.card_id.clone())
                .collect()
        };

        Ok(UserCollections {
            have_card_ids: card_ids(ListKind::Have),
            want_card_ids: card_ids(ListKind::Want),
        })
    }

    async fn get_all_other_users_collections(
        &self,
        excluding_user_id: &str,
    ) -> Result<Vec<CandidateCollections>, StoreError> {
        let state = self.state.read();
        Ok(state
            .users
            .iter()
            .filter(|u| u.user_id != excluding_user_id)
            .map(|u| CandidateCollections {
                trader: u.clone(),
                have_entries: state.entries_of(&u.user_id, ListKind::Have),
                want_entries: state.entries_of(&u.user_id, ListKind::Want),
            })
            .collect())
    }

    async fn get_cards_by_ids(
        &self,
        card_ids: &[CardId],
    ) -> Result<HashMap<CardId, CardSummary>, StoreError> {
        let state = self.state.read();
        Ok(card_ids
            .iter()
            .filter_map(|id| state.cards.get(id))
            .map(|card| (card.id.clone(), CardSummary::from(card)))
            .collect())
    }

    async fn list_entries(&self, user_id: &str, kind: ListKind) -> Result<Vec<ListedCard>, StoreError> {
        let state = self.state.read();
        Ok(state
            .list(kind)
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .map(|e| ListedCard {
                entry_id: e.id,
                card: state.cards.get(&e.card_id).cloned(),
            })
            .collect())
    }

    async fn add_entry(&self, user_id: &str, kind: ListKind, card_id: &str) -> Result<ListEntry, StoreError> {
        if !self.state.read().cards.contains_key(card_id) {
            return Err(StoreError::UnknownCard(card_id.to_string()));
        }
        self.insert_entry(user_id, kind, card_id)
    }

    async fn remove_entry(&self, user_id: &str, kind: ListKind, card_id: &str) -> Result<bool, StoreError> {
        let mut state = self.state.write();
        let list = state.list_mut(kind);
        let before = list.len();
        list.retain(|e| !(e.user_id == user_id && e.card_id == card_id));
        Ok(list.len() < before)
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        Ok(true)
    }
}
