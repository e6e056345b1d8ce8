use std::collections::{HashMap, HashSet};
use std::time::Duration;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use crate::models::{
    CandidateCollections, Card, CardId, CardSummary, CollectionEntry, ListEntry, ListKind, ListedCard,
    TraderProfile, UserCollections,
};
use crate::services::store::{CollectionStore, StoreError};

/// Maximum number of ids sent in one `in.(...)` filter
const CARD_BATCH_SIZE: usize = 100;

/// Rows requested per page when reading a whole table
const PAGE_SIZE: usize = 1000;

/// Errors that can occur when interacting with Supabase
#[derive(Debug, Error)]
pub enum SupabaseError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API returned error: {0}")]
    ApiError(String),

    #[error("Unauthorized: invalid API key")]
    Unauthorized,

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

/// Table names in the hosted database
#[derive(Debug, Clone)]
pub struct SupabaseTables {
    pub users: String,
    pub cards: String,
    pub trade_listings: String,
    pub wishlists: String,
}

impl Default for SupabaseTables {
    fn default() -> Self {
        Self {
            users: "users".to_string(),
            cards: "cards".to_string(),
            trade_listings: "trade_listings".to_string(),
            wishlists: "wishlists".to_string(),
        }
    }
}

/// Supabase REST (PostgREST) client
///
/// Handles all communication with the hosted database including:
/// - Reading a user's have and want lists
/// - Bulk-loading every other user's lists with embedded entries
/// - Batched catalog lookups
/// - Adding and removing list entries
pub struct SupabaseClient {
    base_url: String,
    api_key: String,
    client: Client,
    tables: SupabaseTables,
    page_size: usize,
}

#[derive(Debug, Deserialize)]
struct IdRow {
    #[allow(dead_code)]
    id: String,
}

#[derive(Debug, Deserialize)]
struct CardIdRow {
    card_id: String,
}

#[derive(Debug, Deserialize)]
struct CandidateRow {
    id: String,
    #[serde(default)]
    in_game_name: Option<String>,
    #[serde(default)]
    in_game_id: Option<String>,
    #[serde(default)]
    trade_listings: Option<Vec<CollectionEntry>>,
    #[serde(default)]
    wishlists: Option<Vec<CollectionEntry>>,
}

#[derive(Debug, Deserialize)]
struct ListedCardRow {
    id: i64,
    #[serde(default)]
    card: Option<Card>,
}

impl SupabaseClient {
    /// Create a new Supabase client
    pub fn new(
        base_url: String,
        api_key: String,
        tables: SupabaseTables,
        timeout: Duration,
    ) -> Result<Self, SupabaseError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url,
            api_key,
            client,
            tables,
            page_size: PAGE_SIZE,
        })
    }

    /// Override the number of rows requested per page
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn table_url(&self, table: &str, params: &[(&str, String)]) -> String {
        let query = params
            .iter()
            .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");

        format!(
            "{}/rest/v1/{}?{}",
            self.base_url.trim_end_matches('/'),
            table,
            query
        )
    }

    fn list_table(&self, kind: ListKind) -> &str {
        match kind {
            ListKind::Have => &self.tables.trade_listings,
            ListKind::Want => &self.tables.wishlists,
        }
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn read_body(response: reqwest::Response, context: &str) -> Result<String, SupabaseError> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SupabaseError::Unauthorized);
        }

        let body = response.text().await?;
        if !status.is_success() {
            tracing::error!("Supabase {} failed: {} - {}", context, status, body);
            return Err(SupabaseError::ApiError(format!("{}: {} - {}", context, status, body)));
        }

        Ok(body)
    }

    fn parse<T: DeserializeOwned>(body: &str, context: &str) -> Result<T, SupabaseError> {
        serde_json::from_str(body)
            .map_err(|e| SupabaseError::InvalidResponse(format!("Failed to parse {}: {}", context, e)))
    }

    /// GET rows from a table
    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<T>, SupabaseError> {
        let url = self.table_url(table, params);
        tracing::debug!("Selecting from {}: {}", table, url);

        let response = self.authorized(self.client.get(&url)).send().await?;
        let body = Self::read_body(response, table).await?;
        Self::parse(&body, table)
    }

    /// GET every row matching `params`, one page at a time
    ///
    /// PostgREST caps responses at its `max-rows` setting, which can be lower
    /// than the requested limit. Paging continues until the `Content-Range`
    /// total is reached or, when the server sends no total, a short page.
    async fn select_all<T: DeserializeOwned>(
        &self,
        table: &str,
        params: &[(&str, String)],
        order: &str,
    ) -> Result<Vec<T>, SupabaseError> {
        let mut rows: Vec<T> = Vec::new();

        loop {
            let mut page_params = params.to_vec();
            page_params.push(("order", order.to_string()));
            page_params.push(("limit", self.page_size.to_string()));
            page_params.push(("offset", rows.len().to_string()));

            let url = self.table_url(table, &page_params);
            tracing::debug!("Selecting page from {}: {}", table, url);

            let response = self
                .authorized(self.client.get(&url))
                .header("Prefer", "count=exact")
                .send()
                .await?;
            let total = response
                .headers()
                .get("content-range")
                .and_then(|value| value.to_str().ok())
                .and_then(content_range_total);

            let body = Self::read_body(response, table).await?;
            let page: Vec<T> = Self::parse(&body, table)?;
            let fetched = page.len();
            rows.extend(page);

            let more = match total {
                Some(total) => rows.len() < total,
                None => fetched >= self.page_size,
            };
            if fetched == 0 || !more {
                break;
            }
        }

        Ok(rows)
    }

    async fn user_exists(&self, user_id: &str) -> Result<bool, SupabaseError> {
        let rows: Vec<IdRow> = self
            .select(
                &self.tables.users,
                &[("select", "id".to_string()), ("id", format!("eq.{}", user_id))],
            )
            .await?;
        Ok(!rows.is_empty())
    }

    async fn listed_card_ids(&self, user_id: &str, kind: ListKind) -> Result<HashSet<CardId>, SupabaseError> {
        let rows: Vec<CardIdRow> = self
            .select_all(
                self.list_table(kind),
                &[
                    ("select", "card_id".to_string()),
                    ("user_id", format!("eq.{}", user_id)),
                ],
                "id.asc",
            )
            .await?;
        Ok(rows.into_iter().map(|row| row.card_id).collect())
    }

    async fn find_entry(
        &self,
        user_id: &str,
        kind: ListKind,
        card_id: &str,
    ) -> Result<Option<ListEntry>, SupabaseError> {
        let rows: Vec<ListEntry> = self
            .select(
                self.list_table(kind),
                &[
                    ("select", "*".to_string()),
                    ("user_id", format!("eq.{}", user_id)),
                    ("card_id", format!("eq.{}", card_id)),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_entry(
        &self,
        user_id: &str,
        kind: ListKind,
        card_id: &str,
    ) -> Result<Option<ListEntry>, SupabaseError> {
        let url = self.table_url(self.list_table(kind), &[]);
        let payload = serde_json::json!({ "user_id": user_id, "card_id": card_id });

        let response = self
            .authorized(self.client.post(&url))
            .header("Prefer", "return=representation")
            .json(&payload)
            .send()
            .await?;

        // Lost a race against a concurrent insert of the same card
        if response.status() == StatusCode::CONFLICT {
            return Ok(None);
        }

        let body = Self::read_body(response, "insert entry").await?;
        let rows: Vec<ListEntry> = Self::parse(&body, "inserted entry")?;
        rows.into_iter()
            .next()
            .map(Some)
            .ok_or_else(|| SupabaseError::InvalidResponse("Insert returned no rows".into()))
    }

    /// Whether a failed insert was rejected by a foreign key (Postgres code 23503)
    fn is_foreign_key_violation(err: &SupabaseError) -> bool {
        matches!(err, SupabaseError::ApiError(message) if message.contains("23503"))
    }
}

/// Total row count from a `Content-Range` header such as `0-999/2500`
fn content_range_total(value: &str) -> Option<usize> {
    value.rsplit_once('/')?.1.parse().ok()
}

impl CollectionStore for SupabaseClient {
    async fn get_user_collections(&self, user_id: &str) -> Result<UserCollections, StoreError> {
        let (exists, have_card_ids, want_card_ids) = tokio::try_join!(
            self.user_exists(user_id),
            self.listed_card_ids(user_id, ListKind::Have),
            self.listed_card_ids(user_id, ListKind::Want),
        )?;

        if !exists {
            return Err(StoreError::UnknownUser(user_id.to_string()));
        }

        Ok(UserCollections {
            have_card_ids,
            want_card_ids,
        })
    }

    async fn get_all_other_users_collections(
        &self,
        excluding_user_id: &str,
    ) -> Result<Vec<CandidateCollections>, StoreError> {
        let select = format!(
            "id,in_game_name,in_game_id,{}(id,card_id),{}(id,card_id)",
            self.tables.trade_listings, self.tables.wishlists
        );
        let rows: Vec<Value> = self
            .select_all(
                &self.tables.users,
                &[("select", select), ("id", format!("neq.{}", excluding_user_id))],
                "created_at.asc,id.asc",
            )
            .await?;

        let total = rows.len();
        let candidates: Vec<CandidateCollections> = rows
            .into_iter()
            .filter_map(|row| match serde_json::from_value::<CandidateRow>(row) {
                Ok(row) => Some(row),
                Err(e) => {
                    tracing::warn!("Skipping unreadable candidate row: {}", e);
                    None
                }
            })
            .map(|row| CandidateCollections {
                trader: TraderProfile {
                    user_id: row.id,
                    in_game_name: row.in_game_name,
                    in_game_id: row.in_game_id,
                },
                have_entries: row.trade_listings.unwrap_or_default(),
                want_entries: row.wishlists.unwrap_or_default(),
            })
            .collect();

        tracing::debug!("Loaded {} candidates ({} rows)", candidates.len(), total);

        Ok(candidates)
    }

    async fn get_cards_by_ids(
        &self,
        card_ids: &[CardId],
    ) -> Result<HashMap<CardId, CardSummary>, StoreError> {
        let mut cards = HashMap::with_capacity(card_ids.len());

        for chunk in card_ids.chunks(CARD_BATCH_SIZE) {
            let filter = chunk
                .iter()
                .map(|id| format!("\"{}\"", id.replace('"', "\\\"")))
                .collect::<Vec<_>>()
                .join(",");

            let rows: Vec<CardSummary> = self
                .select(
                    &self.tables.cards,
                    &[
                        ("select", "id,name,set_name,rarity".to_string()),
                        ("id", format!("in.({})", filter)),
                    ],
                )
                .await?;

            cards.extend(rows.into_iter().map(|card| (card.id.clone(), card)));
        }

        Ok(cards)
    }

    async fn list_entries(&self, user_id: &str, kind: ListKind) -> Result<Vec<ListedCard>, StoreError> {
        let rows: Vec<ListedCardRow> = self
            .select(
                self.list_table(kind),
                &[
                    ("select", format!("id,card:{}(*)", self.tables.cards)),
                    ("user_id", format!("eq.{}", user_id)),
                    ("order", "created_at.desc".to_string()),
                ],
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| ListedCard {
                entry_id: row.id,
                card: row.card,
            })
            .collect())
    }

    async fn add_entry(&self, user_id: &str, kind: ListKind, card_id: &str) -> Result<ListEntry, StoreError> {
        if let Some(existing) = self.find_entry(user_id, kind, card_id).await? {
            return Ok(existing);
        }

        match self.insert_entry(user_id, kind, card_id).await {
            Ok(Some(entry)) => {
                tracing::debug!("Added {} to {} list of {}", card_id, kind, user_id);
                Ok(entry)
            }
            Ok(None) => self
                .find_entry(user_id, kind, card_id)
                .await?
                .ok_or_else(|| SupabaseError::InvalidResponse("Conflicting entry vanished".into()).into()),
            Err(e) if Self::is_foreign_key_violation(&e) => Err(StoreError::UnknownCard(card_id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_entry(&self, user_id: &str, kind: ListKind, card_id: &str) -> Result<bool, StoreError> {
        let url = self.table_url(
            self.list_table(kind),
            &[
                ("user_id", format!("eq.{}", user_id)),
                ("card_id", format!("eq.{}", card_id)),
            ],
        );

        let response = self
            .authorized(self.client.delete(&url))
            .header("Prefer", "return=representation")
            .send()
            .await
            .map_err(SupabaseError::from)?;

        let body = Self::read_body(response, "delete entry").await?;
        let rows: Vec<Value> = Self::parse(&body, "deleted entries")?;
        Ok(!rows.is_empty())
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        let _: Vec<Value> = self
            .select(
                &self.tables.cards,
                &[("select", "id".to_string()), ("limit", "1".to_string())],
            )
            .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client(base_url: &str) -> SupabaseClient {
        SupabaseClient::new(
            base_url.to_string(),
            "test_key".to_string(),
            SupabaseTables::default(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_supabase_client_creation() {
        let client = client("https://project.supabase.test");

        assert_eq!(client.base_url, "https://project.supabase.test");
        assert_eq!(client.api_key, "test_key");
    }

    #[test]
    fn test_table_url_encodes_filters() {
        let client = client("https://project.supabase.test/");
        let url = client.table_url("cards", &[("id", "in.(\"a b\")".to_string())]);

        assert_eq!(
            url,
            "https://project.supabase.test/rest/v1/cards?id=in.%28%22a%20b%22%29"
        );
    }

    #[test]
    fn test_content_range_total() {
        assert_eq!(content_range_total("0-999/2500"), Some(2500));
        assert_eq!(content_range_total("*/0"), Some(0));
        assert_eq!(content_range_total("0-9/*"), None);
        assert_eq!(content_range_total("garbage"), None);
    }

    #[test]
    fn test_list_table() {
        let client = client("https://project.supabase.test");
        assert_eq!(client.list_table(ListKind::Have), "trade_listings");
        assert_eq!(client.list_table(ListKind::Want), "wishlists");
    }

    #[tokio::test]
    async fn test_get_user_collections() {
        let mut server = mockito::Server::new_async().await;
        let users = server
            .mock("GET", "/rest/v1/users")
            .match_header("apikey", "test_key")
            .match_query(Matcher::UrlEncoded("id".into(), "eq.u1".into()))
            .with_body(r#"[{"id":"u1"}]"#)
            .create_async()
            .await;
        server
            .mock("GET", "/rest/v1/trade_listings")
            .match_query(Matcher::UrlEncoded("user_id".into(), "eq.u1".into()))
            .with_body(r#"[{"card_id":"c3"}]"#)
            .create_async()
            .await;
        server
            .mock("GET", "/rest/v1/wishlists")
            .match_query(Matcher::UrlEncoded("user_id".into(), "eq.u1".into()))
            .with_body(r#"[{"card_id":"c1"},{"card_id":"c2"}]"#)
            .create_async()
            .await;

        let collections = client(&server.url()).get_user_collections("u1").await.unwrap();

        users.assert_async().await;
        assert!(collections.have_card_ids.contains("c3"));
        assert_eq!(collections.want_card_ids.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/users")
            .match_query(Matcher::Any)
            .with_body("[]")
            .create_async()
            .await;
        server
            .mock("GET", Matcher::Regex("^/rest/v1/(trade_listings|wishlists)$".into()))
            .match_query(Matcher::Any)
            .with_body("[]")
            .create_async()
            .await;

        let err = client(&server.url()).get_user_collections("ghost").await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownUser(_)));
    }

    #[tokio::test]
    async fn test_candidates_tolerate_null_and_bad_rows() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/users")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("id".into(), "neq.u1".into()),
                Matcher::UrlEncoded("order".into(), "created_at.asc,id.asc".into()),
            ]))
            .with_body(
                r#"[
                    {"id":"v","in_game_name":"Misty","trade_listings":[{"id":7,"card_id":"c1"}],"wishlists":null},
                    {"in_game_name":"no id"},
                    {"id":"w","trade_listings":[],"wishlists":[{"id":9,"card_id":"c3"}]}
                ]"#,
            )
            .create_async()
            .await;

        let candidates = client(&server.url())
            .get_all_other_users_collections("u1")
            .await
            .unwrap();

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].trader.in_game_name.as_deref(), Some("Misty"));
        assert_eq!(candidates[0].have_entries[0].entry_id, 7);
        assert!(candidates[0].want_entries.is_empty());
        assert_eq!(candidates[1].want_entries[0].card_id, "c3");
    }

    #[tokio::test]
    async fn test_candidates_follow_content_range_past_row_cap() {
        let mut server = mockito::Server::new_async().await;
        // Server-side max-rows of 1 truncates each page below the requested limit
        let first = server
            .mock("GET", "/rest/v1/users")
            .match_query(Matcher::UrlEncoded("offset".into(), "0".into()))
            .match_header("Prefer", "count=exact")
            .with_header("content-range", "0-0/2")
            .with_body(r#"[{"id":"v","trade_listings":[{"id":1,"card_id":"c1"}],"wishlists":[]}]"#)
            .expect(1)
            .create_async()
            .await;
        let second = server
            .mock("GET", "/rest/v1/users")
            .match_query(Matcher::UrlEncoded("offset".into(), "1".into()))
            .with_header("content-range", "1-1/2")
            .with_body(r#"[{"id":"w","trade_listings":[],"wishlists":[{"id":2,"card_id":"c3"}]}]"#)
            .expect(1)
            .create_async()
            .await;

        let candidates = client(&server.url())
            .get_all_other_users_collections("u1")
            .await
            .unwrap();

        first.assert_async().await;
        second.assert_async().await;
        let ids: Vec<_> = candidates.iter().map(|c| c.trader.user_id.as_str()).collect();
        assert_eq!(ids, vec!["v", "w"]);
    }

    #[tokio::test]
    async fn test_listed_card_ids_pages_until_short_page() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/trade_listings")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("limit".into(), "2".into()),
                Matcher::UrlEncoded("offset".into(), "0".into()),
            ]))
            .with_body(r#"[{"card_id":"c1"},{"card_id":"c2"}]"#)
            .create_async()
            .await;
        server
            .mock("GET", "/rest/v1/trade_listings")
            .match_query(Matcher::UrlEncoded("offset".into(), "2".into()))
            .with_body(r#"[{"card_id":"c3"}]"#)
            .create_async()
            .await;
        let past_end = server
            .mock("GET", "/rest/v1/trade_listings")
            .match_query(Matcher::UrlEncoded("offset".into(), "3".into()))
            .expect(0)
            .create_async()
            .await;

        let card_ids = client(&server.url())
            .with_page_size(2)
            .listed_card_ids("u1", ListKind::Have)
            .await
            .unwrap();

        past_end.assert_async().await;
        assert_eq!(card_ids.len(), 3);
        assert!(card_ids.contains("c3"));
    }

    #[tokio::test]
    async fn test_get_cards_by_ids() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/cards")
            .match_query(Matcher::UrlEncoded("id".into(), r#"in.("c1","c2")"#.into()))
            .with_body(r#"[{"id":"c1","name":"Pikachu","set_name":"Genetic Apex","rarity":null}]"#)
            .create_async()
            .await;

        let cards = client(&server.url())
            .get_cards_by_ids(&["c1".to_string(), "c2".to_string()])
            .await
            .unwrap();

        assert_eq!(cards.len(), 1);
        assert!(cards["c1"].rarity.is_none());
    }

    #[tokio::test]
    async fn test_add_entry_returns_existing() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/trade_listings")
            .match_query(Matcher::Any)
            .with_body(r#"[{"id":3,"user_id":"u1","card_id":"c1","created_at":"2024-06-01T10:00:00+00:00"}]"#)
            .create_async()
            .await;
        let insert = server
            .mock("POST", "/rest/v1/trade_listings")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let entry = client(&server.url())
            .add_entry("u1", ListKind::Have, "c1")
            .await
            .unwrap();

        insert.assert_async().await;
        assert_eq!(entry.id, 3);
    }

    #[tokio::test]
    async fn test_add_entry_unknown_card() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/wishlists")
            .match_query(Matcher::Any)
            .with_body("[]")
            .create_async()
            .await;
        server
            .mock("POST", "/rest/v1/wishlists")
            .match_query(Matcher::Any)
            .match_header("Prefer", "return=representation")
            .with_status(400)
            .with_body(r#"{"code":"23503","message":"violates foreign key constraint"}"#)
            .create_async()
            .await;

        let err = client(&server.url())
            .add_entry("u1", ListKind::Want, "missing")
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::UnknownCard(_)));
    }

    #[tokio::test]
    async fn test_remove_entry_counts_rows() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/rest/v1/wishlists")
            .match_query(Matcher::Any)
            .with_body(r#"[{"id":4}]"#)
            .create_async()
            .await;

        let removed = client(&server.url())
            .remove_entry("u1", ListKind::Want, "c1")
            .await
            .unwrap();

        assert!(removed);
    }

    #[tokio::test]
    async fn test_unauthorized() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/cards")
            .match_query(Matcher::Any)
            .with_status(401)
            .create_async()
            .await;

        let err = client(&server.url()).health_check().await.unwrap_err();
        assert!(matches!(err, StoreError::Supabase(SupabaseError::Unauthorized)));
    }
}
