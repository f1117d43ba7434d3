use axum::{
    extract::{State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use validator::Validate;

use crate::{
    admin_routes::{admin_routes, dashboard_routes},
    auth::access_token_from_headers,
    category_routes::category_routes,
    error::ApiError,
    listing_routes::listing_routes,
    message_routes::message_routes,
    review_routes::review_routes,
    state::AppState,
    user_routes::user_routes,
    validation::ValidatedQuery,
    ws_connection::WebSocketConnection,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(status))
        .route("/ws", get(websocket_upgrade))
        .nest("/users", user_routes())
        .nest("/admin", admin_routes())
        .nest("/listings", listing_routes())
        .nest("/categories", category_routes())
        .nest("/reviews", review_routes())
        .nest("/messages", message_routes())
        .nest("/dashboard", dashboard_routes())
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn status() -> Json<Value> {
    Json(json!({ "status": "ok", "message": "remarket api is running" }))
}

#[derive(Debug, Deserialize, Validate)]
struct WsQuery {
    token: Option<String>,
}

/// 握手阶段完成认证：查询参数 `token` 优先，其次请求头与 cookie。
async fn websocket_upgrade(
    State(state): State<AppState>,
    ValidatedQuery(query): ValidatedQuery<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let token = query
        .token
        .filter(|token| !token.is_empty())
        .or_else(|| access_token_from_headers(&headers))
        .ok_or_else(|| ApiError::unauthorized("missing access token"))?;
    let user_id = state
        .jwt_service
        .verify_access_token(&token)?
        .actor()?
        .user_id;

    Ok(ws.on_upgrade(move |socket| async move {
        WebSocketConnection::open(socket, state, user_id)
            .await
            .run()
            .await;
    }))
}
