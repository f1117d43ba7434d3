use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use domain::{Category, CategoryDraft, CategoryId, CategoryPatch, CategoryQuery, Page, PageRequest};

use crate::{
    auth::AuthUser,
    error::ApiError,
    state::AppState,
    validation::{ValidatedJson, ValidatedQuery},
};

pub fn category_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_categories).post(create_category))
        .route(
            "/{id}",
            get(get_category)
                .put(update_category)
                .delete(delete_category),
        )
}

#[derive(Debug, Default, Deserialize, Validate)]
struct CategoryListQuery {
    search: Option<String>,
    page: Option<u32>,
    limit: Option<u32>,
}

/// 字段规则由领域层 `Category::create` 校验。
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct CreateCategoryPayload {
    name: String,
    code: Option<String>,
    parent_id: Option<String>,
    image_url: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct UpdateCategoryPayload {
    name: Option<String>,
    code: Option<String>,
    parent_id: Option<String>,
    image_url: Option<String>,
}

fn parse_parent(raw: Option<&str>) -> Result<Option<CategoryId>, ApiError> {
    Ok(raw.map(CategoryId::parse).transpose()?)
}

async fn list_categories(
    State(state): State<AppState>,
    ValidatedQuery(query): ValidatedQuery<CategoryListQuery>,
) -> Result<Json<Page<Category>>, ApiError> {
    let query = CategoryQuery::new(query.search, PageRequest::new(query.page, query.limit));
    Ok(Json(state.category_service.list(query).await?))
}

async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Category>, ApiError> {
    let id = CategoryId::parse(&id)?;
    Ok(Json(state.category_service.get(id).await?))
}

async fn create_category(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(payload): ValidatedJson<CreateCategoryPayload>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let draft = CategoryDraft {
        name: payload.name,
        code: payload.code,
        parent_id: parse_parent(payload.parent_id.as_deref())?,
        image_url: payload.image_url,
    };
    let category = state.category_service.create(&auth.actor, draft).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

async fn update_category(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    ValidatedJson(payload): ValidatedJson<UpdateCategoryPayload>,
) -> Result<Json<Category>, ApiError> {
    let id = CategoryId::parse(&id)?;
    let patch = CategoryPatch {
        name: payload.name,
        code: payload.code,
        parent_id: parse_parent(payload.parent_id.as_deref())?,
        image_url: payload.image_url,
    };
    Ok(Json(
        state.category_service.update(&auth.actor, id, patch).await?,
    ))
}

async fn delete_category(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = CategoryId::parse(&id)?;
    state.category_service.delete(&auth.actor, id).await?;
    Ok(Json(json!({ "message": "category deleted" })))
}
