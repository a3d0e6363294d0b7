use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::warn;

use gather_db::models::{UserRow, parse_timestamp};
use gather_types::api::{ProfileResponse, UpdateProfileRequest, UserResponse};

use crate::auth::AppState;
use crate::middleware::CurrentUser;

const MAX_BIO_LEN: usize = 500;
const MAX_AVATAR_LEN: usize = 2048;

pub async fn me(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<impl IntoResponse, StatusCode> {
    let user = state
        .db
        .get_user_by_id(&current.id.to_string())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    Ok(Json(user_response(user)))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.bio.as_ref().is_some_and(|b| b.chars().count() > MAX_BIO_LEN) {
        return Err(StatusCode::BAD_REQUEST);
    }
    if req.avatar.as_ref().is_some_and(|a| a.len() > MAX_AVATAR_LEN) {
        return Err(StatusCode::BAD_REQUEST);
    }

    let user = state
        .db
        .update_profile(
            &current.id.to_string(),
            req.bio.as_deref(),
            req.avatar.as_deref(),
        )
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    Ok(Json(user_response(user)))
}

pub async fn get_profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let user = state
        .db
        .get_user_by_username(&username)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(profile_response(user)))
}

pub(crate) fn user_response(row: UserRow) -> UserResponse {
    UserResponse {
        id: parse_id(&row.id),
        username: row.username,
        email: row.email,
        verified: row.verified,
        bio: row.bio,
        avatar: row.avatar,
        created_at: parse_timestamp(&row.created_at),
    }
}

pub(crate) fn profile_response(row: UserRow) -> ProfileResponse {
    ProfileResponse {
        id: parse_id(&row.id),
        username: row.username,
        bio: row.bio,
        avatar: row.avatar,
        created_at: parse_timestamp(&row.created_at),
    }
}

pub(crate) fn parse_id(raw: &str) -> uuid::Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt id '{}': {}", raw, e);
        uuid::Uuid::default()
    })
}
