use std::collections::HashMap;
use std::future::Future;
use thiserror::Error;
use crate::config::{BackendKind, Settings};
use crate::models::{CandidateCollections, CardId, CardSummary, ListEntry, ListKind, ListedCard, UserCollections};
use crate::services::{MemoryStore, PostgresClient, PostgresError, SupabaseClient, SupabaseError};

/// Errors surfaced by any collection store backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Supabase(#[from] SupabaseError),

    #[error(transparent)]
    Postgres(#[from] PostgresError),

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("Unknown card: {0}")]
    UnknownCard(String),

    #[error("Invalid seed data: {0}")]
    InvalidSeed(String),

    #[error("Store misconfigured: {0}")]
    Config(String),
}

/// Read and write access to users' have and want lists and the card catalog
///
/// # Implementation Notes
///
/// - `get_all_other_users_collections` is a single bulk fetch, never one
///   request per candidate
/// - Candidates whose lists cannot be read are returned with empty lists
/// - `add_entry` is idempotent and returns the existing entry for a card
///   that is already listed
pub trait CollectionStore: Send + Sync {
    /// Card ids of a user's have and want lists.
    ///
    /// Fails with `StoreError::UnknownUser` when the user does not exist.
    fn get_user_collections(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<UserCollections, StoreError>> + Send;

    /// Lists of every user except `excluding_user_id`, in store order.
    fn get_all_other_users_collections(
        &self,
        excluding_user_id: &str,
    ) -> impl Future<Output = Result<Vec<CandidateCollections>, StoreError>> + Send;

    /// Catalog data for the given ids. Unknown ids are absent from the map.
    fn get_cards_by_ids(
        &self,
        card_ids: &[CardId],
    ) -> impl Future<Output = Result<HashMap<CardId, CardSummary>, StoreError>> + Send;

    /// A user's list joined with card data, newest first.
    fn list_entries(
        &self,
        user_id: &str,
        kind: ListKind,
    ) -> impl Future<Output = Result<Vec<ListedCard>, StoreError>> + Send;

    /// Add a card to a user's list.
    fn add_entry(
        &self,
        user_id: &str,
        kind: ListKind,
        card_id: &str,
    ) -> impl Future<Output = Result<ListEntry, StoreError>> + Send;

    /// Remove a card from a user's list. Returns true if it was listed.
    fn remove_entry(
        &self,
        user_id: &str,
        kind: ListKind,
        card_id: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Whether the backend is reachable.
    fn health_check(&self) -> impl Future<Output = Result<bool, StoreError>> + Send;
}

/// The configured store backend
pub enum StoreBackend {
    Supabase(SupabaseClient),
    Postgres(PostgresClient),
    Memory(MemoryStore),
}

impl StoreBackend {
    /// Build the backend selected in `[store]`
    pub async fn from_settings(settings: &Settings) -> Result<Self, StoreError> {
        match settings.store.backend {
            BackendKind::Supabase => {
                let supabase = settings
                    .supabase
                    .as_ref()
                    .ok_or_else(|| StoreError::Config("missing [supabase] section".into()))?;
                tracing::info!("Using Supabase store at {}", supabase.url);

                let client = SupabaseClient::new(
                    supabase.url.clone(),
                    supabase.api_key.clone(),
                    (&supabase.tables).into(),
                    supabase.timeout(),
                )?;
                Ok(StoreBackend::Supabase(client))
            }
            BackendKind::Postgres => {
                let database = settings
                    .database
                    .as_ref()
                    .ok_or_else(|| StoreError::Config("missing [database] section".into()))?;

                let client = PostgresClient::new(&database.url, database.pool_options()).await?;
                Ok(StoreBackend::Postgres(client))
            }
            BackendKind::Memory => {
                let store = match &settings.store.seed_file {
                    Some(path) => {
                        tracing::info!("Seeding memory store from {}", path);
                        MemoryStore::load_seed_file(path)?
                    }
                    None => MemoryStore::new(),
                };
                Ok(StoreBackend::Memory(store))
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StoreBackend::Supabase(_) => "supabase",
            StoreBackend::Postgres(_) => "postgres",
            StoreBackend::Memory(_) => "memory",
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $store:ident => $call:expr) => {
        match $self {
            StoreBackend::Supabase($store) => $call,
            StoreBackend::Postgres($store) => $call,
            StoreBackend::Memory($store) => $call,
        }
    };
}

impl CollectionStore for StoreBackend {
    async fn get_user_collections(&self, user_id: &str) -> Result<UserCollections, StoreError> {
        dispatch!(self, store => store.get_user_collections(user_id).await)
    }

    async fn get_all_other_users_collections(
        &self,
        excluding_user_id: &str,
    ) -> Result<Vec<CandidateCollections>, StoreError> {
        dispatch!(self, store => store.get_all_other_users_collections(excluding_user_id).await)
    }

    async fn get_cards_by_ids(
        &self,
        card_ids: &[CardId],
    ) -> Result<HashMap<CardId, CardSummary>, StoreError> {
        dispatch!(self, store => store.get_cards_by_ids(card_ids).await)
    }

    async fn list_entries(&self, user_id: &str, kind: ListKind) -> Result<Vec<ListedCard>, StoreError> {
        dispatch!(self, store => store.list_entries(user_id, kind).await)
    }

    async fn add_entry(&self, user_id: &str, kind: ListKind, card_id: &str) -> Result<ListEntry, StoreError> {
        dispatch!(self, store => store.add_entry(user_id, kind, card_id).await)
    }

    async fn remove_entry(&self, user_id: &str, kind: ListKind, card_id: &str) -> Result<bool, StoreError> {
        dispatch!(self, store => store.remove_entry(user_id, kind, card_id).await)
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        dispatch!(self, store => store.health_check().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_name() {
        let backend = StoreBackend::Memory(MemoryStore::new());
        assert_eq!(backend.name(), "memory");
    }

    #[tokio::test]
    async fn test_backend_dispatches_to_memory() {
        let store = MemoryStore::new();
        store.insert_user("u1", Some("Ash"));
        let backend = StoreBackend::Memory(store);

        let collections = backend.get_user_collections("u1").await.unwrap();
        assert!(collections.is_empty());
        assert!(backend.health_check().await.unwrap());
    }
}
