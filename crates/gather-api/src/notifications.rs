use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::error;
use uuid::Uuid;

use gather_db::models::{NotificationRow, parse_timestamp};
use gather_types::api::NotificationResponse;

use crate::auth::AppState;
use crate::middleware::CurrentUser;
use crate::users::parse_id;

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread: bool,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<NotificationQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let rows = state
        .db
        .list_notifications(&current.id.to_string(), query.unread, query.limit.min(200))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let notifications: Vec<NotificationResponse> =
        rows.into_iter().map(notification_response).collect();
    Ok(Json(notifications))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(notification_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let changed = state
        .db
        .mark_notification_read(&notification_id.to_string(), &current.id.to_string())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    if !changed {
        return Err(StatusCode::NOT_FOUND);
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<impl IntoResponse, StatusCode> {
    state
        .db
        .mark_all_notifications_read(&current.id.to_string())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(StatusCode::NO_CONTENT)
}

fn notification_response(row: NotificationRow) -> NotificationResponse {
    let payload = serde_json::from_str(&row.payload).unwrap_or_else(|e| {
        error!("Corrupt notification payload '{}': {}", row.id, e);
        serde_json::Value::Null
    });

    NotificationResponse {
        id: parse_id(&row.id),
        kind: row.kind,
        payload,
        read: row.read,
        created_at: parse_timestamp(&row.created_at),
    }
}
