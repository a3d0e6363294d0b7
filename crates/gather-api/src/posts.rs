use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::error;
use uuid::Uuid;

use gather_db::models::{PostRow, parse_timestamp};
use gather_types::api::{CreatePostRequest, PostResponse};

use crate::auth::AppState;
use crate::middleware::CurrentUser;
use crate::users::parse_id;

const MAX_POST_LEN: usize = 4000;

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor-based pagination — pass the `created_at` timestamp of the
    /// oldest post from the previous page to fetch older posts.
    pub before: Option<String>,
}

fn default_limit() -> u32 {
    50
}

pub async fn create_post(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let content = req.content.trim();
    if content.is_empty() || content.chars().count() > MAX_POST_LEN {
        return Err(StatusCode::BAD_REQUEST);
    }

    let post_id = Uuid::new_v4();
    let row = state
        .db
        .create_post(
            &post_id.to_string(),
            &current.id.to_string(),
            &current.username,
            content,
            req.image.as_deref(),
        )
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok((StatusCode::CREATED, Json(post_response(row))))
}

pub async fn get_feed(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    // Run blocking DB queries off the async runtime
    let db = state.db.clone();
    let limit = query.limit.min(200);
    let before = query.before;

    let rows = tokio::task::spawn_blocking(move || db.list_posts(limit, before.as_deref()))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let posts: Vec<PostResponse> = rows.into_iter().map(post_response).collect();
    Ok(Json(posts))
}

pub async fn archive_post(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(post_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let post = state
        .db
        .get_post(&post_id.to_string())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    // Only the author can archive their post
    if post.author_id != current.id.to_string() {
        return Err(StatusCode::FORBIDDEN);
    }

    state
        .db
        .archive_post(&post_id.to_string())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(StatusCode::NO_CONTENT)
}

pub(crate) fn post_response(row: PostRow) -> PostResponse {
    PostResponse {
        id: parse_id(&row.id),
        author_id: parse_id(&row.author_id),
        author_username: row.author_username,
        content: row.content,
        image: row.image,
        created_at: parse_timestamp(&row.created_at),
    }
}
