use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use redis::aio::ConnectionManager;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use crate::models::{CandidateCollections, CardId, CardSummary, ListEntry, ListKind, ListedCard, UserCollections};
use crate::services::store::{CollectionStore, StoreError};

/// Errors that can occur with cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Cache miss: {0}")]
    CacheMiss(String),
}

/// Multi-tier cache manager
///
/// L1 is an in-process `moka` cache. L2 is Redis, shared across instances,
/// and optional: without it the manager works from L1 alone.
pub struct CacheManager {
    redis: Option<Arc<tokio::sync::Mutex<ConnectionManager>>>,
    l1_cache: moka::future::Cache<String, Vec<u8>>,
    ttl_secs: u64,
}

impl CacheManager {
    /// Create a cache manager backed by Redis
    pub async fn new(redis_url: &str, l1_size: u64, ttl_secs: u64) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url)?;
        let redis = ConnectionManager::new(client).await?;

        Ok(Self {
            redis: Some(Arc::new(tokio::sync::Mutex::new(redis))),
            ..Self::in_memory(l1_size, ttl_secs)
        })
    }

    /// Create an L1-only cache manager
    pub fn in_memory(l1_size: u64, ttl_secs: u64) -> Self {
        let l1_cache = moka::future::CacheBuilder::new(l1_size)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self {
            redis: None,
            l1_cache,
            ttl_secs,
        }
    }

    /// Connect to Redis when a URL is configured, falling back to L1 only
    /// when it is absent or unreachable.
    pub async fn connect(redis_url: Option<&str>, l1_size: u64, ttl_secs: u64) -> Self {
        let Some(url) = redis_url else {
            tracing::info!("No Redis URL configured, using in-process cache only");
            return Self::in_memory(l1_size, ttl_secs);
        };

        match Self::new(url, l1_size, ttl_secs).await {
            Ok(cache) => {
                tracing::info!("Connected to Redis cache");
                cache
            }
            Err(e) => {
                tracing::warn!("Redis unavailable ({}), using in-process cache only", e);
                Self::in_memory(l1_size, ttl_secs)
            }
        }
    }

    pub fn has_redis(&self) -> bool {
        self.redis.is_some()
    }

    /// Get a value from cache (L1 first, then L2)
    pub async fn get<T>(&self, key: &str) -> Result<T, CacheError>
    where
        T: DeserializeOwned,
    {
        if let Some(bytes) = self.l1_cache.get(key).await {
            tracing::trace!("L1 cache hit: {}", key);
            return Ok(serde_json::from_slice(&bytes)?);
        }

        if let Some(redis) = &self.redis {
            let mut conn = redis.lock().await;
            let value: Option<String> = redis::cmd("GET")
                .arg(key)
                .query_async(&mut *conn)
                .await?;
            drop(conn);

            if let Some(json) = value {
                tracing::trace!("L2 cache hit: {}", key);

                // Populate L1 cache
                self.l1_cache
                    .insert(key.to_string(), json.as_bytes().to_vec())
                    .await;

                return Ok(serde_json::from_str(&json)?);
            }
        }

        tracing::trace!("Cache miss: {}", key);
        Err(CacheError::CacheMiss(key.to_string()))
    }

    /// Set a value in cache (both tiers)
    pub async fn set<T>(&self, key: &str, value: &T) -> Result<(), CacheError>
    where
        T: Serialize,
    {
        let json = serde_json::to_string(value)?;

        self.l1_cache
            .insert(key.to_string(), json.as_bytes().to_vec())
            .await;

        if let Some(redis) = &self.redis {
            let mut conn = redis.lock().await;
            redis::cmd("SETEX")
                .arg(key)
                .arg(self.ttl_secs)
                .arg(json)
                .query_async::<()>(&mut *conn)
                .await?;
        }

        tracing::trace!("Cache set: {}", key);
        Ok(())
    }

    /// Delete a value from both cache tiers
    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.l1_cache.invalidate(key).await;

        if let Some(redis) = &self.redis {
            let mut conn = redis.lock().await;
            redis::cmd("DEL")
                .arg(key)
                .query_async::<()>(&mut *conn)
                .await?;
        }
        Ok(())
    }
}

/// Cache key builder
pub struct CacheKey;

impl CacheKey {
    /// Build a cache key for a catalog card summary
    pub fn card(card_id: &str) -> String {
        format!("card:{}", card_id)
    }
}

/// Collection store wrapper that serves catalog lookups from the cache
///
/// List reads and writes always go to the inner store. Only card summaries
/// are cached, and only for ids the catalog actually knows.
pub struct CachedStore<S> {
    inner: S,
    cache: CacheManager,
}

impl<S: CollectionStore> CachedStore<S> {
    pub fn new(inner: S, cache: CacheManager) -> Self {
        Self { inner, cache }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }
}

impl<S: CollectionStore> CollectionStore for CachedStore<S> {
    async fn get_user_collections(&self, user_id: &str) -> Result<UserCollections, StoreError> {
        self.inner.get_user_collections(user_id).await
    }

    async fn get_all_other_users_collections(
        &self,
        excluding_user_id: &str,
    ) -> Result<Vec<CandidateCollections>, StoreError> {
        self.inner.get_all_other_users_collections(excluding_user_id).await
    }

    async fn get_cards_by_ids(
        &self,
        card_ids: &[CardId],
    ) -> Result<HashMap<CardId, CardSummary>, StoreError> {
        let mut cards = HashMap::with_capacity(card_ids.len());
        let mut missing = Vec::new();

        for id in card_ids {
            match self.cache.get::<CardSummary>(&CacheKey::card(id)).await {
                Ok(card) => {
                    cards.insert(id.clone(), card);
                }
                Err(CacheError::CacheMiss(_)) => missing.push(id.clone()),
                Err(e) => {
                    tracing::warn!("Card cache read failed for {}: {}", id, e);
                    missing.push(id.clone());
                }
            }
        }

        if missing.is_empty() {
            return Ok(cards);
        }

        tracing::debug!(
            "Card cache: {} hits, {} misses",
            cards.len(),
            missing.len()
        );

        let fetched = self.inner.get_cards_by_ids(&missing).await?;
        for (id, card) in fetched {
            if let Err(e) = self.cache.set(&CacheKey::card(&id), &card).await {
                tracing::warn!("Card cache write failed for {}: {}", id, e);
            }
            cards.insert(id, card);
        }

        Ok(cards)
    }

    async fn list_entries(&self, user_id: &str, kind: ListKind) -> Result<Vec<ListedCard>, StoreError> {
        self.inner.list_entries(user_id, kind).await
    }

    async fn add_entry(&self, user_id: &str, kind: ListKind, card_id: &str) -> Result<ListEntry, StoreError> {
        self.inner.add_entry(user_id, kind, card_id).await
    }

    async fn remove_entry(&self, user_id: &str, kind: ListKind, card_id: &str) -> Result<bool, StoreError> {
        self.inner.remove_entry(user_id, kind, card_id).await
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        self.inner.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Card;
    use crate::services::MemoryStore;

    fn card(id: &str, rarity: &str) -> Card {
        Card {
            id: id.to_string(),
            name: format!("Card {}", id),
            set_name: "Genetic Apex".to_string(),
            pack: String::new(),
            rarity: Some(rarity.to_string()),
            card_number: String::new(),
            image_url: String::new(),
        }
    }

    #[tokio::test]
    #[ignore = "Requires Redis"]
    async fn test_cache_set_get() {
        let cache = CacheManager::new("redis://127.0.0.1:6379", 1000, 60)
            .await
            .expect("Failed to create cache");

        let key = "test_key";
        let value = "test_value";

        cache.set(key, &value).await.unwrap();
        let result: String = cache.get(key).await.unwrap();
        assert_eq!(result, value);

        cache.delete(key).await.unwrap();
        assert!(cache.get::<String>(key).await.is_err());
    }

    #[tokio::test]
    async fn test_in_memory_cache_set_get() {
        let cache = CacheManager::in_memory(100, 60);
        assert!(!cache.has_redis());

        cache.set("k", &42u32).await.unwrap();
        assert_eq!(cache.get::<u32>("k").await.unwrap(), 42);

        cache.delete("k").await.unwrap();
        assert!(matches!(cache.get::<u32>("k").await, Err(CacheError::CacheMiss(_))));
    }

    #[tokio::test]
    async fn test_connect_without_url_falls_back() {
        let cache = CacheManager::connect(None, 10, 60).await;
        assert!(!cache.has_redis());
    }

    #[test]
    fn test_cache_key_builder() {
        assert_eq!(CacheKey::card("A1-001"), "card:A1-001");
    }

    #[tokio::test]
    async fn test_cached_store_serves_repeat_lookups_from_cache() {
        let memory = MemoryStore::new();
        memory.insert_card(card("c1", "Rare"));
        let store = CachedStore::new(memory, CacheManager::in_memory(100, 60));

        let ids = vec!["c1".to_string(), "c2".to_string()];
        let first = store.get_cards_by_ids(&ids).await.unwrap();
        assert_eq!(first.len(), 1);

        // The inner catalog no longer has the card, the cache still does
        store.inner().remove_card("c1");
        let second = store.get_cards_by_ids(&ids).await.unwrap();
        assert_eq!(second.get("c1").and_then(|c| c.rarity.as_deref()), Some("Rare"));
        assert!(!second.contains_key("c2"));
    }
}
