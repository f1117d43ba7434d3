use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use application::SendMessageRequest;
use domain::{Conversation, ConversationId, ConversationSummary, GeoPoint, Message, UserId};

use crate::{auth::AuthUser, error::ApiError, state::AppState, validation::ValidatedJson};

pub fn message_routes() -> Router<AppState> {
    Router::new()
        .route("/conversations", get(list_conversations))
        .route("/conversations/{conversation_id}", delete(delete_conversation))
        .route("/find-or-create", post(find_or_create))
        .route("/", post(send_message))
        .route("/{other_user_id}", get(get_messages))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct ReceiverPayload {
    receiver_id: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct SendMessagePayload {
    receiver_id: String,
    #[validate(length(max = 2000))]
    message: Option<String>,
    image_url: Option<String>,
    location: Option<GeoPoint>,
}

async fn list_conversations(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    Ok(Json(
        state
            .messaging_service
            .list_conversations(auth.user_id())
            .await?,
    ))
}

async fn find_or_create(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(payload): ValidatedJson<ReceiverPayload>,
) -> Result<Json<Conversation>, ApiError> {
    let receiver_id = UserId::parse(&payload.receiver_id)?;
    let conversation = state
        .messaging_service
        .find_or_create_conversation(auth.user_id(), receiver_id)
        .await?;
    Ok(Json(conversation))
}

async fn get_messages(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(other_user_id): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let other_id = UserId::parse(&other_user_id)?;
    Ok(Json(
        state
            .messaging_service
            .get_messages(auth.user_id(), other_id)
            .await?,
    ))
}

async fn send_message(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(payload): ValidatedJson<SendMessagePayload>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let request = SendMessageRequest {
        receiver_id: UserId::parse(&payload.receiver_id)?,
        message: payload.message,
        image_url: payload.image_url,
        location: payload.location,
    };
    let message = state
        .messaging_service
        .send_message(auth.user_id(), request)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn delete_conversation(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(conversation_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let conversation_id = ConversationId::parse(&conversation_id)?;
    state
        .messaging_service
        .delete_conversation(auth.user_id(), conversation_id)
        .await?;
    Ok(Json(json!({ "message": "conversation deleted" })))
}
