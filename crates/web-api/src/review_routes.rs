use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use domain::{ListingId, Review, ReviewId};

use crate::{auth::AuthUser, error::ApiError, state::AppState, validation::ValidatedJson};

pub fn review_routes() -> Router<AppState> {
    Router::new()
        .route("/listing/{listing_id}", get(list_for_listing))
        .route("/", post(create_review))
        .route("/{review_id}", put(update_review).delete(delete_review))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct CreateReviewPayload {
    listing_id: String,
    #[validate(range(min = 1, max = 5))]
    rating: u8,
    #[validate(length(max = 1000))]
    comment: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
struct UpdateReviewPayload {
    #[validate(range(min = 1, max = 5))]
    rating: Option<u8>,
    #[validate(length(max = 1000))]
    comment: Option<String>,
}

async fn list_for_listing(
    State(state): State<AppState>,
    Path(listing_id): Path<String>,
) -> Result<Json<Vec<Review>>, ApiError> {
    let listing_id = ListingId::parse(&listing_id)?;
    Ok(Json(
        state.review_service.list_for_listing(listing_id).await?,
    ))
}

async fn create_review(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(payload): ValidatedJson<CreateReviewPayload>,
) -> Result<(StatusCode, Json<Review>), ApiError> {
    let listing_id = ListingId::parse(&payload.listing_id)?;
    let review = state
        .review_service
        .create(&auth.actor, listing_id, payload.rating, payload.comment)
        .await?;
    Ok((StatusCode::CREATED, Json(review)))
}

async fn update_review(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(review_id): Path<String>,
    ValidatedJson(payload): ValidatedJson<UpdateReviewPayload>,
) -> Result<Json<Review>, ApiError> {
    let review_id = ReviewId::parse(&review_id)?;
    let review = state
        .review_service
        .update(&auth.actor, review_id, payload.rating, payload.comment)
        .await?;
    Ok(Json(review))
}

async fn delete_review(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(review_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let review_id = ReviewId::parse(&review_id)?;
    state.review_service.delete(&auth.actor, review_id).await?;
    Ok(Json(json!({ "message": "review deleted" })))
}
