use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use crate::core::MatchOrdering;
use crate::services::{PoolOptions, SupabaseTables};

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    #[serde(default)]
    pub store: StoreSettings,
    pub supabase: Option<SupabaseSettings>,
    pub database: Option<DatabaseSettings>,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub matching: MatchingSettings,
    pub auth: AuthSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

/// Which collection store backs the service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Supabase,
    Postgres,
    #[default]
    Memory,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreSettings {
    #[serde(default)]
    pub backend: BackendKind,
    /// JSON seed for the memory backend
    pub seed_file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupabaseSettings {
    pub url: String,
    pub api_key: String,
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub tables: TableSettings,
}

impl SupabaseSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(10))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableSettings {
    #[serde(default = "default_users_table")]
    pub users: String,
    #[serde(default = "default_cards_table")]
    pub cards: String,
    #[serde(default = "default_trade_listings_table")]
    pub trade_listings: String,
    #[serde(default = "default_wishlists_table")]
    pub wishlists: String,
}

impl Default for TableSettings {
    fn default() -> Self {
        Self {
            users: default_users_table(),
            cards: default_cards_table(),
            trade_listings: default_trade_listings_table(),
            wishlists: default_wishlists_table(),
        }
    }
}

impl From<&TableSettings> for SupabaseTables {
    fn from(tables: &TableSettings) -> Self {
        Self {
            users: tables.users.clone(),
            cards: tables.cards.clone(),
            trade_listings: tables.trade_listings.clone(),
            wishlists: tables.wishlists.clone(),
        }
    }
}

fn default_users_table() -> String { "users".to_string() }
fn default_cards_table() -> String { "cards".to_string() }
fn default_trade_listings_table() -> String { "trade_listings".to_string() }
fn default_wishlists_table() -> String { "wishlists".to_string() }

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub acquire_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
}

impl DatabaseSettings {
    pub fn pool_options(&self) -> PoolOptions {
        let defaults = PoolOptions::default();
        PoolOptions {
            max_connections: self.max_connections.unwrap_or(defaults.max_connections),
            min_connections: self.min_connections.unwrap_or(defaults.min_connections),
            acquire_timeout: self
                .acquire_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.acquire_timeout),
            idle_timeout: self
                .idle_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.idle_timeout),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheSettings {
    /// L2 cache; the service runs with L1 only when unset
    pub redis_url: Option<String>,
    pub ttl_secs: Option<u64>,
    pub l1_cache_size: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MatchingSettings {
    #[serde(default)]
    pub ordering: MatchOrdering,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    pub jwt_secret: String,
    #[serde(default = "default_audience")]
    pub audience: Option<String>,
}

fn default_audience() -> Option<String> { Some("authenticated".to_string()) }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "compact".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Configuration file (config/default.toml)
    /// 2. Local overrides (config/local.toml)
    /// 3. Environment variables (prefixed with TRADE__)
    /// 4. DATABASE_URL, SUPABASE_URL, SUPABASE_SERVICE_KEY, SUPABASE_JWT_SECRET
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., TRADE__SERVER__PORT -> server.port
            .add_source(
                Environment::with_prefix("TRADE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        apply_env_overrides(settings)?.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("TRADE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        apply_env_overrides(settings)?.try_deserialize()
    }
}

/// Well-known variables set by the hosting platform
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("DATABASE_URL", "database.url"),
    ("SUPABASE_URL", "supabase.url"),
    ("SUPABASE_SERVICE_KEY", "supabase.api_key"),
    ("SUPABASE_JWT_SECRET", "auth.jwt_secret"),
];

/// Override config values from well-known environment variables that are set
fn apply_env_overrides(settings: Config) -> Result<Config, ConfigError> {
    let mut builder = Config::builder().add_source(settings);

    for (var, key) in ENV_OVERRIDES {
        if let Ok(value) = std::env::var(var) {
            builder = builder.set_override(*key, value)?;
        }
    }

    builder.build()
}
