use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{AppendHeaders, IntoResponse},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::Validate;

use application::{AuthenticateUserRequest, RegisterUserRequest};
use domain::{Listing, ListingId, ProfilePatch, User, Username};

use crate::{
    auth::{
        cookie_value, expired_cookie, session_cookie, AuthUser, OptionalAuthUser, ACCESS_COOKIE,
        REFRESH_COOKIE,
    },
    error::ApiError,
    state::AppState,
    validation::ValidatedJson,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/verify", put(verify_account))
        .route("/login", post(login))
        .route("/logout", delete(logout))
        .route("/refresh_token", get(refresh_token))
        .route("/me", get(me))
        .route("/update", put(update_profile))
        .route("/favorites", get(list_favorites).post(add_favorite))
        .route("/favorites/{listing_id}", delete(remove_favorite))
}

#[derive(Debug, Deserialize, Validate)]
struct RegisterPayload {
    #[validate(length(min = 1, max = 50))]
    username: String,
    #[validate(email)]
    email: String,
    #[validate(length(min = 8, max = 256))]
    password: String,
}

#[derive(Debug, Deserialize, Validate)]
struct VerifyPayload {
    #[validate(email)]
    email: String,
    #[validate(length(min = 1))]
    token: String,
}

#[derive(Debug, Deserialize, Validate)]
struct LoginPayload {
    #[validate(email)]
    email: String,
    #[validate(length(min = 1))]
    password: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProfilePayload {
    #[validate(length(min = 1, max = 100))]
    pub display_name: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub username: Option<String>,
    #[validate(url)]
    pub avatar: Option<String>,
    #[validate(length(max = 20))]
    pub phone_number: Option<String>,
    #[validate(length(max = 255))]
    pub address: Option<String>,
}

impl ProfilePayload {
    pub(crate) fn into_patch(self) -> Result<ProfilePatch, ApiError> {
        Ok(ProfilePatch {
            display_name: self.display_name,
            username: self.username.map(Username::parse).transpose()?,
            avatar: self.avatar,
            phone_number: self.phone_number,
            address: self.address,
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct FavoritePayload {
    #[validate(length(equal = 24))]
    listing_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
}

async fn register(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<RegisterPayload>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let user = state
        .user_service
        .register(RegisterUserRequest {
            username: payload.username,
            email: payload.email,
            password: payload.password,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn verify_account(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<VerifyPayload>,
) -> Result<Json<User>, ApiError> {
    let user = state
        .user_service
        .verify_account(&payload.email, &payload.token)
        .await?;
    Ok(Json(user))
}

async fn login(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<LoginPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .user_service
        .authenticate(AuthenticateUserRequest {
            email: payload.email,
            password: payload.password,
        })
        .await?;

    let access_token = state.jwt_service.issue_access_token(&user)?;
    let refresh_token = state.jwt_service.issue_refresh_token(&user)?;
    state
        .user_service
        .store_refresh_token(user.id, Some(refresh_token.clone()))
        .await?;
    tracing::info!(user_id = %user.id, "用户登录");

    let cookies = AppendHeaders([
        (
            header::SET_COOKIE,
            session_cookie(ACCESS_COOKIE, &access_token, state.cookie_secure),
        ),
        (
            header::SET_COOKIE,
            session_cookie(REFRESH_COOKIE, &refresh_token, state.cookie_secure),
        ),
    ]);
    Ok((
        cookies,
        Json(LoginResponse {
            user,
            access_token,
            refresh_token,
        }),
    ))
}

/// 清除保存的刷新令牌与两个 cookie；未登录时同样返回成功。
async fn logout(
    State(state): State<AppState>,
    OptionalAuthUser(auth): OptionalAuthUser,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = match auth {
        Some(auth) => Some(auth.user_id()),
        None => cookie_value(&headers, REFRESH_COOKIE)
            .and_then(|token| state.jwt_service.verify_refresh_token(&token).ok())
            .and_then(|claims| claims.actor().ok())
            .map(|actor| actor.user_id),
    };
    if let Some(user_id) = user_id {
        state.user_service.store_refresh_token(user_id, None).await?;
    }

    let cookies = AppendHeaders([
        (
            header::SET_COOKIE,
            expired_cookie(ACCESS_COOKIE, state.cookie_secure),
        ),
        (
            header::SET_COOKIE,
            expired_cookie(REFRESH_COOKIE, state.cookie_secure),
        ),
    ]);
    Ok((cookies, Json(json!({ "message": "logged out" }))))
}

async fn refresh_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = cookie_value(&headers, REFRESH_COOKIE)
        .ok_or_else(|| ApiError::unauthorized("missing refresh token"))?;
    let claims = state.jwt_service.verify_refresh_token(&token)?;
    let user = state
        .user_service
        .check_refresh_token(claims.actor()?.user_id, &token)
        .await?;
    let access_token = state.jwt_service.issue_access_token(&user)?;

    Ok((
        AppendHeaders([(
            header::SET_COOKIE,
            session_cookie(ACCESS_COOKIE, &access_token, state.cookie_secure),
        )]),
        Json(json!({ "accessToken": access_token })),
    ))
}

async fn me(State(state): State<AppState>, auth: AuthUser) -> Result<Json<User>, ApiError> {
    Ok(Json(state.user_service.me(auth.user_id()).await?))
}

async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(payload): ValidatedJson<ProfilePayload>,
) -> Result<Json<User>, ApiError> {
    let user = state
        .user_service
        .update_profile(auth.user_id(), payload.into_patch()?)
        .await?;
    Ok(Json(user))
}

async fn list_favorites(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<Listing>>, ApiError> {
    Ok(Json(state.user_service.list_favorites(auth.user_id()).await?))
}

async fn add_favorite(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(payload): ValidatedJson<FavoritePayload>,
) -> Result<Json<Value>, ApiError> {
    let listing_id = ListingId::parse(&payload.listing_id)?;
    let user = state
        .user_service
        .add_favorite(auth.user_id(), listing_id)
        .await?;
    Ok(Json(json!({ "favorites": user.favorites })))
}

async fn remove_favorite(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(listing_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let listing_id = ListingId::parse(&listing_id)?;
    let user = state
        .user_service
        .remove_favorite(auth.user_id(), listing_id)
        .await?;
    Ok(Json(json!({ "favorites": user.favorites })))
}
