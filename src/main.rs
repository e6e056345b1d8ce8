use std::sync::Arc;
use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use trade_match::config::{LoggingSettings, Settings};
use trade_match::core::Matcher;
use trade_match::routes::{self, handle_json_payload_error, handle_query_payload_error, AppState};
use trade_match::services::{CacheManager, CachedStore, SessionVerifier, StoreBackend};

/// Initialize tracing; LOG_LEVEL and LOG_FORMAT take precedence over the config file
fn init_tracing(logging: &LoggingSettings) {
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| logging.level.clone());
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| logging.format.clone());

    let filter = EnvFilter::try_new(&log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    match log_format.as_str() {
        "pretty" => subscriber.pretty().init(),
        "json" => subscriber.json().init(),
        _ => subscriber.compact().init(),
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = Settings::load()
        .map_err(|e| std::io::Error::other(format!("Configuration error: {}", e)))?;

    init_tracing(&settings.logging);

    info!("Starting trade match service...");

    let backend = StoreBackend::from_settings(&settings).await.map_err(|e| {
        error!("Failed to initialize {:?} store: {}", settings.store.backend, e);
        std::io::Error::other(e.to_string())
    })?;

    info!("{} store initialized", backend.name());

    // Catalog cache; Redis is optional
    let cache_ttl = settings.cache.ttl_secs.unwrap_or(3600);
    let l1_cache_size = settings.cache.l1_cache_size.unwrap_or(10_000);
    let cache = CacheManager::connect(settings.cache.redis_url.as_deref(), l1_cache_size, cache_ttl).await;

    info!(
        "Card cache initialized (L1: {} entries, TTL: {}s, Redis: {})",
        l1_cache_size,
        cache_ttl,
        cache.has_redis()
    );

    let audience = settings.auth.audience.as_deref().filter(|aud| !aud.is_empty());
    let sessions = Arc::new(SessionVerifier::new(&settings.auth.jwt_secret, audience));

    let matcher = Matcher::new(settings.matching.ordering);

    info!("Matcher initialized with {:?} ordering", matcher.ordering());

    let app_state = AppState {
        store: Arc::new(CachedStore::new(backend, cache)),
        matcher,
        sessions,
    };

    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(handle_json_payload_error))
            .app_data(web::QueryConfig::default().error_handler(handle_query_payload_error))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
