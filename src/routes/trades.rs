use actix_web::{web, HttpResponse, Responder};
use tracing::Instrument;
use uuid::Uuid;
use crate::models::{HealthResponse, TradeMatchesResponse};
use crate::routes::{lookup_error_response, AppState, CurrentUser};
use crate::services::CollectionStore;

/// Configure health and trade matching routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/trades/matches", web::get().to(find_matches));
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let healthy = match state.store.health_check().await {
        Ok(healthy) => healthy,
        Err(e) => {
            tracing::warn!("Store health check failed: {}", e);
            false
        }
    };

    let status = if healthy { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: state.store.inner().name().to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// Find trade partners for the signed-in user
///
/// GET /api/v1/trades/matches
///
/// Results are computed fresh on every call.
async fn find_matches(state: web::Data<AppState>, user: CurrentUser) -> impl Responder {
    let CurrentUser(user_id) = user;

    let request_id = Uuid::new_v4();
    tracing::info!("Finding trade matches for user: {} (request {})", user_id, request_id);

    let span = tracing::info_span!("compute_matches", %request_id);
    let matches = match state
        .matcher
        .compute_matches(state.store.as_ref(), &user_id)
        .instrument(span)
        .await
    {
        Ok(matches) => matches,
        Err(e) => return lookup_error_response(&e),
    };

    let response = TradeMatchesResponse::from(matches);

    tracing::info!(
        "Returning {} perfect, {} have, {} want, {} reciprocal matches for user {} (from {} candidates)",
        response.perfect_matches.len(),
        response.have_what_i_want.len(),
        response.want_what_i_have.len(),
        response.reciprocal_matches.len(),
        user_id,
        response.total_candidates
    );

    HttpResponse::Ok().json(response)
}
