// Service exports
pub mod auth;
pub mod cache;
pub mod memory;
pub mod postgres;
pub mod store;
pub mod supabase;

pub use auth::{AuthError, SessionClaims, SessionVerifier};
pub use cache::{CacheError, CacheKey, CacheManager, CachedStore};
pub use memory::{MemorySeed, MemoryStore, SeedEntry};
pub use postgres::{PoolOptions, PostgresClient, PostgresError};
pub use store::{CollectionStore, StoreBackend, StoreError};
pub use supabase::{SupabaseClient, SupabaseError, SupabaseTables};
