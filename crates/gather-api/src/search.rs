use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::error;

use gather_types::api::SearchResponse;

use crate::auth::AppState;
use crate::posts::post_response;
use crate::users::profile_response;

const RESULT_LIMIT: u32 = 20;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

/// Substring search over usernames and non-archived post content.
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let term = query.q.trim().to_string();
    if term.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    // Run blocking DB queries off the async runtime
    let db = state.db.clone();
    let (users, posts) = tokio::task::spawn_blocking(move || {
        let users = db.search_users(&term, RESULT_LIMIT)?;
        let posts = db.search_posts(&term, RESULT_LIMIT)?;
        Ok::<_, anyhow::Error>((users, posts))
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(SearchResponse {
        users: users.into_iter().map(profile_response).collect(),
        posts: posts.into_iter().map(post_response).collect(),
    }))
}
