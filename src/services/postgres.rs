use std::collections::HashMap;
use std::time::Duration;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Row};
use thiserror::Error;
use crate::models::{
    CandidateCollections, Card, CardId, CardSummary, CollectionEntry, ListEntry, ListKind, ListedCard,
    TraderProfile, UserCollections,
};
use crate::services::store::{CollectionStore, StoreError};

/// Errors that can occur when interacting with PostgreSQL
#[derive(Debug, Error)]
pub enum PostgresError {
    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),
}

/// Pool tuning read from the `[database]` settings section
#[derive(Debug, Clone, Copy)]
pub struct PoolOptions {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

/// PostgreSQL collection store
///
/// Self-hosted alternative to the Supabase backend, using the same table
/// layout (see `migrations/`).
pub struct PostgresClient {
    pool: PgPool,
}

fn list_table(kind: ListKind) -> &'static str {
    match kind {
        ListKind::Have => "trade_listings",
        ListKind::Want => "wishlists",
    }
}

fn list_entry(row: &PgRow) -> ListEntry {
    ListEntry {
        id: row.get("id"),
        user_id: row.get("user_id"),
        card_id: row.get("card_id"),
        created_at: row.get::<Option<DateTime<Utc>>, _>("created_at"),
    }
}

/// Group `(owner, entry)` pairs by owner, keeping their order within each owner
fn group_entries<I>(entries: I) -> HashMap<String, Vec<CollectionEntry>>
where
    I: IntoIterator<Item = (String, CollectionEntry)>,
{
    let mut grouped: HashMap<String, Vec<CollectionEntry>> = HashMap::new();
    for (user_id, entry) in entries {
        grouped.entry(user_id).or_default().push(entry);
    }
    grouped
}

/// Attach grouped entries to each trader, in trader order
fn assemble_candidates(
    traders: Vec<TraderProfile>,
    mut have: HashMap<String, Vec<CollectionEntry>>,
    mut want: HashMap<String, Vec<CollectionEntry>>,
) -> Vec<CandidateCollections> {
    traders
        .into_iter()
        .map(|trader| CandidateCollections {
            have_entries: have.remove(&trader.user_id).unwrap_or_default(),
            want_entries: want.remove(&trader.user_id).unwrap_or_default(),
            trader,
        })
        .collect()
}

/// Map a foreign key violation on insert to the missing side
fn insert_error(err: sqlx::Error, user_id: &str, card_id: &str) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_foreign_key_violation() {
            return match db.constraint() {
                Some(name) if name.ends_with("_card_fk") => StoreError::UnknownCard(card_id.to_string()),
                _ => StoreError::UnknownUser(user_id.to_string()),
            };
        }
    }
    PostgresError::from(err).into()
}

impl PostgresClient {
    /// Create a new PostgreSQL client from a connection string
    pub async fn new(database_url: &str, options: PoolOptions) -> Result<Self, PostgresError> {
        tracing::info!(
            "Connecting to PostgreSQL (max {} connections)",
            options.max_connections
        );

        let pool = PgPoolOptions::new()
            .max_connections(options.max_connections)
            .min_connections(options.min_connections)
            .acquire_timeout(options.acquire_timeout)
            .idle_timeout(options.idle_timeout)
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        // Run migrations on startup
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    async fn user_exists(&self, user_id: &str) -> Result<bool, PostgresError> {
        let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1) AS present")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("present"))
    }

    async fn card_ids_of(&self, user_id: &str, kind: ListKind) -> Result<Vec<String>, PostgresError> {
        let query = format!("SELECT card_id FROM {} WHERE user_id = $1", list_table(kind));
        let rows = sqlx::query(&query).bind(user_id).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(|row| row.get("card_id")).collect())
    }

    /// Every entry of one list kind not owned by `excluding_user_id`, grouped by owner
    async fn entries_by_user(
        conn: &mut PgConnection,
        excluding_user_id: &str,
        kind: ListKind,
    ) -> Result<HashMap<String, Vec<CollectionEntry>>, PostgresError> {
        let query = format!(
            "SELECT id, user_id, card_id FROM {} WHERE user_id <> $1 ORDER BY id",
            list_table(kind)
        );
        let rows = sqlx::query(&query)
            .bind(excluding_user_id)
            .fetch_all(conn)
            .await?;

        Ok(group_entries(rows.iter().map(|row| {
            let user_id: String = row.get("user_id");
            let entry = CollectionEntry {
                entry_id: row.get("id"),
                card_id: row.get("card_id"),
            };
            (user_id, entry)
        })))
    }

    /// Traders and both list kinds read from one snapshot
    async fn candidate_snapshot(&self, excluding_user_id: &str) -> Result<Vec<CandidateCollections>, PostgresError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let traders: Vec<TraderProfile> = sqlx::query(
            "SELECT id, in_game_name, in_game_id FROM users WHERE id <> $1 ORDER BY created_at, id",
        )
        .bind(excluding_user_id)
        .fetch_all(&mut *tx)
        .await?
        .iter()
        .map(|row| TraderProfile {
            user_id: row.get("id"),
            in_game_name: row.get("in_game_name"),
            in_game_id: row.get("in_game_id"),
        })
        .collect();

        let have = Self::entries_by_user(&mut *tx, excluding_user_id, ListKind::Have).await?;
        let want = Self::entries_by_user(&mut *tx, excluding_user_id, ListKind::Want).await?;
        tx.commit().await?;

        Ok(assemble_candidates(traders, have, want))
    }

    async fn find_entry(
        &self,
        user_id: &str,
        kind: ListKind,
        card_id: &str,
    ) -> Result<Option<ListEntry>, PostgresError> {
        let query = format!(
            "SELECT id, user_id, card_id, created_at FROM {} WHERE user_id = $1 AND card_id = $2",
            list_table(kind)
        );
        let row = sqlx::query(&query)
            .bind(user_id)
            .bind(card_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(list_entry))
    }
}

impl CollectionStore for PostgresClient {
    async fn get_user_collections(&self, user_id: &str) -> Result<UserCollections, StoreError> {
        let (exists, have, want) = tokio::try_join!(
            self.user_exists(user_id),
            self.card_ids_of(user_id, ListKind::Have),
            self.card_ids_of(user_id, ListKind::Want),
        )?;

        if !exists {
            return Err(StoreError::UnknownUser(user_id.to_string()));
        }

        Ok(UserCollections {
            have_card_ids: have.into_iter().collect(),
            want_card_ids: want.into_iter().collect(),
        })
    }

    async fn get_all_other_users_collections(
        &self,
        excluding_user_id: &str,
    ) -> Result<Vec<CandidateCollections>, StoreError> {
        let candidates = self.candidate_snapshot(excluding_user_id).await?;

        tracing::debug!("Loaded {} candidates from PostgreSQL", candidates.len());

        Ok(candidates)
    }

    async fn get_cards_by_ids(
        &self,
        card_ids: &[CardId],
    ) -> Result<HashMap<CardId, CardSummary>, StoreError> {
        if card_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query("SELECT id, name, set_name, rarity FROM cards WHERE id = ANY($1)")
            .bind(card_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(PostgresError::from)?;

        Ok(rows
            .iter()
            .map(|row| {
                let card = CardSummary {
                    id: row.get("id"),
                    name: row.get("name"),
                    set_name: row.get("set_name"),
                    rarity: row.get("rarity"),
                };
                (card.id.clone(), card)
            })
            .collect())
    }

    async fn list_entries(&self, user_id: &str, kind: ListKind) -> Result<Vec<ListedCard>, StoreError> {
        let query = format!(
            r#"
            SELECT l.id AS entry_id, c.id, c.name, c.set_name, c.pack, c.rarity, c.card_number, c.image_url
            FROM {} l
            LEFT JOIN cards c ON c.id = l.card_id
            WHERE l.user_id = $1
            ORDER BY l.created_at DESC, l.id DESC
            "#,
            list_table(kind)
        );

        let rows = sqlx::query(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(PostgresError::from)?;

        Ok(rows
            .iter()
            .map(|row| {
                let card = row.get::<Option<String>, _>("id").map(|id| Card {
                    id,
                    name: row.get("name"),
                    set_name: row.get("set_name"),
                    pack: row.get("pack"),
                    rarity: row.get("rarity"),
                    card_number: row.get("card_number"),
                    image_url: row.get("image_url"),
                });
                ListedCard {
                    entry_id: row.get("entry_id"),
                    card,
                }
            })
            .collect())
    }

    /// Uses INSERT ... ON CONFLICT DO NOTHING so concurrent adds of the same
    /// card resolve to a single row.
    async fn add_entry(&self, user_id: &str, kind: ListKind, card_id: &str) -> Result<ListEntry, StoreError> {
        let query = format!(
            r#"
            INSERT INTO {} (user_id, card_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id, card_id) DO NOTHING
            RETURNING id, user_id, card_id, created_at
            "#,
            list_table(kind)
        );

        let inserted = sqlx::query(&query)
            .bind(user_id)
            .bind(card_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| insert_error(e, user_id, card_id))?;

        match inserted {
            Some(row) => {
                tracing::debug!("Added {} to {} list of {}", card_id, kind, user_id);
                Ok(list_entry(&row))
            }
            None => self
                .find_entry(user_id, kind, card_id)
                .await?
                .ok_or_else(|| PostgresError::from(sqlx::Error::RowNotFound).into()),
        }
    }

    async fn remove_entry(&self, user_id: &str, kind: ListKind, card_id: &str) -> Result<bool, StoreError> {
        let query = format!(
            "DELETE FROM {} WHERE user_id = $1 AND card_id = $2",
            list_table(kind)
        );

        let result = sqlx::query(&query)
            .bind(user_id)
            .bind(card_id)
            .execute(&self.pool)
            .await
            .map_err(PostgresError::from)?;

        Ok(result.rows_affected() > 0)
    }

    /// Health check for the database connection
    async fn health_check(&self) -> Result<bool, StoreError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(|e| PostgresError::from(e).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_tables() {
        assert_eq!(list_table(ListKind::Have), "trade_listings");
        assert_eq!(list_table(ListKind::Want), "wishlists");
    }

    #[test]
    fn test_default_pool_options() {
        let options = PoolOptions::default();
        assert_eq!(options.max_connections, 10);
        assert_eq!(options.acquire_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_non_database_insert_error_passes_through() {
        let err = insert_error(sqlx::Error::RowNotFound, "u1", "c1");
        assert!(matches!(err, StoreError::Postgres(PostgresError::SqlxError(_))));
    }

    fn entry(entry_id: i64, card_id: &str) -> CollectionEntry {
        CollectionEntry {
            entry_id,
            card_id: card_id.to_string(),
        }
    }

    #[test]
    fn test_group_entries_keeps_row_order() {
        let grouped = group_entries(vec![
            ("v".to_string(), entry(1, "c1")),
            ("w".to_string(), entry(2, "c2")),
            ("v".to_string(), entry(3, "c3")),
        ]);

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["v"], vec![entry(1, "c1"), entry(3, "c3")]);
        assert_eq!(grouped["w"], vec![entry(2, "c2")]);
    }

    #[test]
    fn test_assemble_candidates_follows_trader_order() {
        let have = group_entries(vec![("w".to_string(), entry(1, "c1"))]);
        let want = group_entries(vec![
            ("v".to_string(), entry(2, "c3")),
            ("ghost".to_string(), entry(3, "c4")),
        ]);

        let candidates = assemble_candidates(
            vec![TraderProfile::new("v"), TraderProfile::new("w"), TraderProfile::new("x")],
            have,
            want,
        );

        let ids: Vec<_> = candidates.iter().map(|c| c.trader.user_id.as_str()).collect();
        assert_eq!(ids, vec!["v", "w", "x"]);
        assert!(candidates[0].have_entries.is_empty());
        assert_eq!(candidates[0].want_entries, vec![entry(2, "c3")]);
        assert_eq!(candidates[1].have_entries, vec![entry(1, "c1")]);
        assert!(candidates[2].have_entries.is_empty() && candidates[2].want_entries.is_empty());
    }

    #[tokio::test]
    #[ignore = "Requires PostgreSQL"]
    async fn test_add_entry_is_idempotent() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let client = PostgresClient::new(&url, PoolOptions::default()).await.unwrap();

        sqlx::query("INSERT INTO users (id) VALUES ('pg-u1') ON CONFLICT DO NOTHING")
            .execute(&client.pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO cards (id, name, set_name) VALUES ('pg-c1', 'Pikachu', 'A1') ON CONFLICT DO NOTHING")
            .execute(&client.pool)
            .await
            .unwrap();

        let first = client.add_entry("pg-u1", ListKind::Have, "pg-c1").await.unwrap();
        let second = client.add_entry("pg-u1", ListKind::Have, "pg-c1").await.unwrap();
        assert_eq!(first.id, second.id);

        let err = client.add_entry("pg-u1", ListKind::Have, "pg-missing").await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownCard(_)));

        assert!(client.remove_entry("pg-u1", ListKind::Have, "pg-c1").await.unwrap());
    }
}
