use actix_web::{web, HttpResponse, Responder};
use validator::Validate;
use crate::models::{AddCardRequest, AddCardResponse, CollectionResponse, ListKind, RemoveCardResponse};
use crate::routes::{store_error_response, validation_error_response, AppState, CurrentUser};
use crate::services::CollectionStore;

/// Configure have/want list routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/collections/{kind}", web::get().to(list_cards))
        .route("/collections/{kind}", web::post().to(add_card))
        .route("/collections/{kind}/{card_id}", web::delete().to(remove_card));
}

/// List the signed-in user's cards
///
/// GET /api/v1/collections/{have|want}
async fn list_cards(
    state: web::Data<AppState>,
    user: CurrentUser,
    kind: web::Path<ListKind>,
) -> impl Responder {
    let kind = kind.into_inner();

    match state.store.list_entries(&user.0, kind).await {
        Ok(entries) => HttpResponse::Ok().json(CollectionResponse {
            kind,
            total: entries.len(),
            entries,
        }),
        Err(e) => store_error_response(&e),
    }
}

/// Add a card to the signed-in user's list
///
/// POST /api/v1/collections/{have|want}
///
/// Request body:
/// ```json
/// { "cardId": "string" }
/// ```
///
/// Adding a card that is already listed returns the existing entry.
async fn add_card(
    state: web::Data<AppState>,
    user: CurrentUser,
    kind: web::Path<ListKind>,
    req: web::Json<AddCardRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        tracing::info!("Validation failed for add_card request: {:?}", errors);
        return validation_error_response(errors);
    }

    let kind = kind.into_inner();

    match state.store.add_entry(&user.0, kind, &req.card_id).await {
        Ok(entry) => {
            tracing::info!("User {} listed {} in {}", user.0, req.card_id, kind);
            HttpResponse::Ok().json(AddCardResponse { success: true, entry })
        }
        Err(e) => store_error_response(&e),
    }
}

/// Remove a card from the signed-in user's list
///
/// DELETE /api/v1/collections/{have|want}/{card_id}
async fn remove_card(
    state: web::Data<AppState>,
    user: CurrentUser,
    path: web::Path<(ListKind, String)>,
) -> impl Responder {
    let (kind, card_id) = path.into_inner();

    match state.store.remove_entry(&user.0, kind, &card_id).await {
        Ok(removed) => {
            tracing::info!("User {} removed {} from {}: {}", user.0, card_id, kind, removed);
            HttpResponse::Ok().json(RemoveCardResponse { removed })
        }
        Err(e) => store_error_response(&e),
    }
}
