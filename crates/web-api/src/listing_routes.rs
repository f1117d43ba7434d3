use axum::{
    extract::{Path, State},
    http::{StatusCode, Uri},
    routing::{get, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use domain::{
    CategoryId, Listing, ListingCondition, ListingDraft, ListingId, ListingPatch,
    ListingSearchParams, ListingSortField, ListingStatus, ListingWithSeller, Page, PageRequest,
    SortOrder, UserId,
};

use crate::{
    auth::{AuthUser, OptionalAuthUser},
    error::ApiError,
    state::AppState,
    validation::{query_values, ValidatedJson, ValidatedQuery},
};

pub fn listing_routes() -> Router<AppState> {
    Router::new()
        .route("/all", get(list_published))
        .route("/search", get(search))
        .route("/me", get(list_mine))
        .route("/", get(search).post(create_listing))
        .route(
            "/{id}",
            get(get_details).put(update_listing).delete(delete_listing),
        )
        .route("/{id}/status", put(moderate_listing))
}

#[derive(Debug, Default, Deserialize, Validate)]
pub(crate) struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageQuery {
    pub(crate) fn request(&self) -> PageRequest {
        PageRequest::new(self.page, self.limit)
    }
}

/// 查询串参数；`status` 可重复或逗号分隔，由 `query_values` 单独收集。
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct SearchQuery {
    search: Option<String>,
    category_id: Option<String>,
    seller_id: Option<String>,
    min_price: Option<f64>,
    max_price: Option<f64>,
    location: Option<String>,
    sort_by: Option<String>,
    sort_order: Option<String>,
    page: Option<u32>,
    limit: Option<u32>,
}

impl SearchQuery {
    fn into_params(self, statuses: &[String]) -> Result<ListingSearchParams, ApiError> {
        let statuses = statuses
            .iter()
            .map(|raw| raw.parse::<ListingStatus>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ListingSearchParams {
            search: self.search,
            category_id: self.category_id.as_deref().map(CategoryId::parse).transpose()?,
            seller_id: self.seller_id.as_deref().map(UserId::parse).transpose()?,
            statuses,
            min_price: self.min_price,
            max_price: self.max_price,
            location: self.location,
            sort_by: self
                .sort_by
                .as_deref()
                .map(str::parse::<ListingSortField>)
                .transpose()?,
            sort_order: self
                .sort_order
                .as_deref()
                .map(str::parse::<SortOrder>)
                .transpose()?,
            page: self.page,
            limit: self.limit,
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct CreateListingPayload {
    #[validate(length(min = 5, max = 100))]
    title: String,
    #[validate(length(min = 10, max = 5000))]
    description: String,
    #[validate(range(min = 0.0))]
    price: f64,
    category_id: String,
    condition: ListingCondition,
    #[serde(default)]
    images: Vec<String>,
    location: Option<String>,
    status: Option<ListingStatus>,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct UpdateListingPayload {
    #[validate(length(min = 5, max = 100))]
    title: Option<String>,
    #[validate(length(min = 10, max = 5000))]
    description: Option<String>,
    #[validate(range(min = 0.0))]
    price: Option<f64>,
    category_id: Option<String>,
    condition: Option<ListingCondition>,
    images: Option<Vec<String>>,
    location: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
struct ModeratePayload {
    status: ListingStatus,
    #[validate(length(max = 500))]
    reason: Option<String>,
}

async fn list_published(
    State(state): State<AppState>,
    ValidatedQuery(query): ValidatedQuery<PageQuery>,
) -> Result<Json<Page<ListingWithSeller>>, ApiError> {
    Ok(Json(
        state.listing_service.list_published(query.request()).await?,
    ))
}

async fn search(
    State(state): State<AppState>,
    OptionalAuthUser(auth): OptionalAuthUser,
    uri: Uri,
    ValidatedQuery(query): ValidatedQuery<SearchQuery>,
) -> Result<Json<Page<ListingWithSeller>>, ApiError> {
    let viewer = auth.map(|a| a.actor);
    let statuses = query_values(&uri, "status")?;
    let page = state
        .listing_service
        .search(viewer.as_ref(), query.into_params(&statuses)?)
        .await?;
    Ok(Json(page))
}

async fn list_mine(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedQuery(query): ValidatedQuery<PageQuery>,
) -> Result<Json<Page<ListingWithSeller>>, ApiError> {
    Ok(Json(
        state
            .listing_service
            .list_mine(&auth.actor, query.request())
            .await?,
    ))
}

async fn get_details(
    State(state): State<AppState>,
    OptionalAuthUser(auth): OptionalAuthUser,
    Path(id): Path<String>,
) -> Result<Json<ListingWithSeller>, ApiError> {
    let id = ListingId::parse(&id)?;
    let listing = state
        .listing_service
        .get_details(id, auth.map(|a| a.user_id()))
        .await?;
    Ok(Json(listing))
}

async fn create_listing(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(payload): ValidatedJson<CreateListingPayload>,
) -> Result<(StatusCode, Json<Listing>), ApiError> {
    let draft = ListingDraft {
        title: payload.title,
        description: payload.description,
        price: payload.price,
        category_id: CategoryId::parse(&payload.category_id)?,
        condition: payload.condition,
        images: payload.images,
        location: payload.location,
        status: payload.status,
        expires_at: payload.expires_at,
    };
    let listing = state.listing_service.create(&auth.actor, draft).await?;
    Ok((StatusCode::CREATED, Json(listing)))
}

async fn update_listing(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    ValidatedJson(payload): ValidatedJson<UpdateListingPayload>,
) -> Result<Json<Listing>, ApiError> {
    let id = ListingId::parse(&id)?;
    let patch = ListingPatch {
        title: payload.title,
        description: payload.description,
        price: payload.price,
        category_id: payload
            .category_id
            .as_deref()
            .map(CategoryId::parse)
            .transpose()?,
        condition: payload.condition,
        images: payload.images,
        location: payload.location,
    };
    Ok(Json(
        state.listing_service.update(&auth.actor, id, patch).await?,
    ))
}

async fn moderate_listing(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    ValidatedJson(payload): ValidatedJson<ModeratePayload>,
) -> Result<Json<Listing>, ApiError> {
    let id = ListingId::parse(&id)?;
    let listing = state
        .listing_service
        .moderate(&auth.actor, id, payload.status, payload.reason)
        .await?;
    Ok(Json(listing))
}

async fn delete_listing(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = ListingId::parse(&id)?;
    state.listing_service.delete(&auth.actor, id).await?;
    Ok(Json(json!({ "message": "listing deleted" })))
}
