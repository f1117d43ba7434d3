//! 管理端路由：用户管理与仪表盘统计，均要求特权角色。

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use application::{AdminCreateUserRequest, DashboardStats};
use domain::{
    AdminUserPatch, Page, PageRequest, SortOrder, User, UserEmail, UserId, UserQuery, UserRole,
    UserSortField,
};

use crate::{
    auth::AuthUser, error::ApiError, state::AppState, user_routes::ProfilePayload,
    validation::{ValidatedJson, ValidatedQuery},
};

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/{id}",
            get(get_user).put(update_user).delete(delete_user),
        )
}

pub fn dashboard_routes() -> Router<AppState> {
    Router::new().route("/stats", get(dashboard_stats))
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct UserListQuery {
    search: Option<String>,
    sort_by: Option<String>,
    sort_order: Option<String>,
    page: Option<u32>,
    limit: Option<u32>,
}

impl UserListQuery {
    fn into_query(self) -> Result<UserQuery, ApiError> {
        let sort = self
            .sort_by
            .as_deref()
            .map(str::parse::<UserSortField>)
            .transpose()?;
        let order = self
            .sort_order
            .as_deref()
            .map(str::parse::<SortOrder>)
            .transpose()?;
        Ok(UserQuery::new(
            self.search,
            sort,
            order,
            PageRequest::new(self.page, self.limit),
        ))
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct AdminCreateUserPayload {
    #[validate(length(min = 1, max = 50))]
    username: String,
    #[validate(email)]
    email: String,
    #[validate(length(min = 8, max = 256))]
    password: String,
    #[serde(default)]
    role: Option<UserRole>,
    #[validate(length(min = 1, max = 100))]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct AdminUpdateUserPayload {
    #[serde(flatten)]
    #[validate(nested)]
    profile: ProfilePayload,
    #[validate(email)]
    email: Option<String>,
    role: Option<UserRole>,
    is_active: Option<bool>,
}

async fn list_users(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedQuery(query): ValidatedQuery<UserListQuery>,
) -> Result<Json<Page<User>>, ApiError> {
    let users = state
        .user_service
        .list_users(&auth.actor, query.into_query()?)
        .await?;
    Ok(Json(users))
}

async fn get_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<User>, ApiError> {
    let id = UserId::parse(&id)?;
    Ok(Json(state.user_service.get_user(&auth.actor, id).await?))
}

async fn create_user(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(payload): ValidatedJson<AdminCreateUserPayload>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let user = state
        .user_service
        .create_user_as_admin(
            &auth.actor,
            AdminCreateUserRequest {
                username: payload.username,
                email: payload.email,
                password: payload.password,
                role: payload.role.unwrap_or_default(),
                display_name: payload.display_name,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn update_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    ValidatedJson(payload): ValidatedJson<AdminUpdateUserPayload>,
) -> Result<Json<User>, ApiError> {
    let id = UserId::parse(&id)?;
    let patch = AdminUserPatch {
        profile: payload.profile.into_patch()?,
        email: payload.email.map(UserEmail::parse).transpose()?,
        role: payload.role,
        is_active: payload.is_active,
    };
    Ok(Json(
        state.user_service.update_user(&auth.actor, id, patch).await?,
    ))
}

async fn delete_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = UserId::parse(&id)?;
    state.user_service.delete_user(&auth.actor, id).await?;
    Ok(Json(json!({ "message": "user deleted" })))
}

async fn dashboard_stats(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<DashboardStats>, ApiError> {
    Ok(Json(state.dashboard_service.stats(&auth.actor).await?))
}
