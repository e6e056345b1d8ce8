// Route exports
pub mod collections;
pub mod trades;

use std::future::{ready, Ready};
use std::sync::Arc;
use actix_web::dev::Payload;
use actix_web::http::{header, StatusCode};
use actix_web::{error, web, FromRequest, HttpRequest, HttpResponse};
use crate::core::{LookupError, Matcher};
use crate::models::{ErrorResponse, UserId};
use crate::services::{CachedStore, SessionVerifier, StoreBackend, StoreError};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<CachedStore<StoreBackend>>,
    pub matcher: Matcher,
    pub sessions: Arc<SessionVerifier>,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .configure(trades::configure)
            .configure(collections::configure),
    );
}

/// Rejected request, rendered as an `ErrorResponse` body
#[derive(Debug)]
pub struct JsonError(pub ErrorResponse);

impl JsonError {
    fn new(status: StatusCode, error: &str, message: impl Into<String>) -> Self {
        Self(ErrorResponse {
            error: error.to_string(),
            message: message.into(),
            status_code: status.as_u16(),
        })
    }
}

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.0.error, self.0.message)
    }
}

impl std::error::Error for JsonError {}

impl error::ResponseError for JsonError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.0.status_code).unwrap_or(StatusCode::BAD_REQUEST)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(error::ResponseError::status_code(self)).json(&self.0)
    }
}

/// Handle JSON payload errors
pub fn handle_json_payload_error(err: error::JsonPayloadError, req: &HttpRequest) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    JsonError::new(StatusCode::BAD_REQUEST, "invalid_json", format!("Invalid JSON: {}", err)).into()
}

/// Handle query payload errors
pub fn handle_query_payload_error(err: error::QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    JsonError::new(StatusCode::BAD_REQUEST, "invalid_query", format!("Invalid query: {}", err)).into()
}

/// The signed-in user, taken from the request's bearer token
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserId);

impl FromRequest for CurrentUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let Some(state) = req.app_data::<web::Data<AppState>>() else {
            tracing::error!("Application state missing for {}", req.path());
            return ready(Err(JsonError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Application state not configured",
            )
            .into()));
        };

        let header = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        let result: Result<Self, Self::Error> = state
            .sessions
            .verify_header(header)
            .map(CurrentUser)
            .map_err(|e| {
                tracing::debug!("Rejected session on {}: {}", req.path(), e);
                JsonError::new(StatusCode::UNAUTHORIZED, "unauthorized", e.to_string()).into()
            });

        ready(result)
    }
}

fn error_response(status: StatusCode, error: &str, message: String) -> HttpResponse {
    error::ResponseError::error_response(&JsonError::new(status, error, message))
}

/// Map a store failure to an HTTP response
pub(crate) fn store_error_response(err: &StoreError) -> HttpResponse {
    match err {
        StoreError::UnknownUser(_) => error_response(StatusCode::NOT_FOUND, "user_not_found", err.to_string()),
        StoreError::UnknownCard(_) => error_response(StatusCode::NOT_FOUND, "card_not_found", err.to_string()),
        _ => {
            tracing::error!("Store error: {}", err);
            error_response(StatusCode::BAD_GATEWAY, "store_unavailable", err.to_string())
        }
    }
}

/// Map a failed match lookup to an HTTP response
pub(crate) fn lookup_error_response(err: &LookupError) -> HttpResponse {
    if err.is_unknown_user() {
        return error_response(StatusCode::NOT_FOUND, "user_not_found", err.to_string());
    }
    tracing::error!("Match lookup failed: {}", err);
    error_response(StatusCode::BAD_GATEWAY, "lookup_failed", err.to_string())
}

pub(crate) fn validation_error_response(errors: validator::ValidationErrors) -> HttpResponse {
    error_response(StatusCode::BAD_REQUEST, "Validation failed", errors.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_status_codes() {
        let not_found = store_error_response(&StoreError::UnknownCard("x".into()));
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let misconfigured = store_error_response(&StoreError::Config("x".into()));
        assert_eq!(misconfigured.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_lookup_error_status_codes() {
        let unknown = LookupError::Requester {
            user_id: "ghost".into(),
            source: StoreError::UnknownUser("ghost".into()),
        };
        assert_eq!(lookup_error_response(&unknown).status(), StatusCode::NOT_FOUND);

        let failed = LookupError::Candidates {
            user_id: "u1".into(),
            source: StoreError::Config("down".into()),
        };
        assert_eq!(lookup_error_response(&failed).status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_json_error_status() {
        use actix_web::ResponseError;

        let err = JsonError::new(StatusCode::UNAUTHORIZED, "unauthorized", "nope");
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.error_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_rejections_and_failures_share_error_body() {
        use actix_web::ResponseError;

        let rejected = JsonError::new(StatusCode::UNAUTHORIZED, "unauthorized", "nope").error_response();
        let failed = store_error_response(&StoreError::UnknownCard("c9".into()));

        for (response, status, error) in [
            (rejected, StatusCode::UNAUTHORIZED, "unauthorized"),
            (failed, StatusCode::NOT_FOUND, "card_not_found"),
        ] {
            assert_eq!(response.status(), status);
            let bytes = actix_web::body::to_bytes(response.into_body()).await.unwrap();
            let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(body.error, error);
            assert_eq!(body.status_code, status.as_u16());
        }
    }
}
