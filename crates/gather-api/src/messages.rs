use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::error;
use uuid::Uuid;

use gather_db::models::{MessageRow, parse_timestamp};
use gather_gateway::fanout;
use gather_types::api::{MessageResponse, SendMessageRequest};

use crate::auth::AppState;
use crate::middleware::CurrentUser;
use crate::users::parse_id;

#[derive(Debug, Deserialize)]
pub struct ConversationQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    pub before: Option<String>,
}

fn default_limit() -> u32 {
    50
}

pub async fn get_conversation(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<ConversationQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    // Run blocking DB queries off the async runtime
    let db = state.db.clone();
    let me = current.id.to_string();
    let other = user_id.to_string();
    let limit = query.limit.min(200);
    let before = query.before;

    let rows = tokio::task::spawn_blocking(move || {
        db.get_conversation(&me, &other, limit, before.as_deref())
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let messages: Vec<MessageResponse> = rows.into_iter().map(message_response).collect();
    Ok(Json(messages))
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let content = req.content.trim();
    if content.is_empty()
        || content.chars().count() > fanout::MAX_MESSAGE_LEN
        || user_id == current.id
    {
        return Err(StatusCode::BAD_REQUEST);
    }

    // The receiver must exist before anything is persisted
    state
        .db
        .get_user_by_id(&user_id.to_string())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    let row = fanout::persist_and_forward(
        &state.dispatcher,
        &state.db,
        current.id,
        &current.username,
        user_id,
        content.to_string(),
    )
    .await
    .map_err(|e| {
        error!("Message delivery failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok((StatusCode::CREATED, Json(message_response(row))))
}

fn message_response(row: MessageRow) -> MessageResponse {
    MessageResponse {
        id: parse_id(&row.id),
        sender_id: parse_id(&row.sender_id),
        sender_username: row.sender_username,
        receiver_id: parse_id(&row.receiver_id),
        content: row.content,
        created_at: parse_timestamp(&row.created_at),
    }
}
