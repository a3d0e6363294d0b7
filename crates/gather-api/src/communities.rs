use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use gather_db::models::{CommunityRow, parse_timestamp};
use gather_types::api::{CommunityResponse, CreateCommunityRequest};

use crate::auth::AppState;
use crate::middleware::CurrentUser;
use crate::users::parse_id;

const MAX_DESCRIPTION_LEN: usize = 500;

pub async fn create_community(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<CreateCommunityRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let name = req.name.trim();
    if name.len() < 3 || name.len() > 64 {
        return Err(StatusCode::BAD_REQUEST);
    }
    if req.description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(StatusCode::BAD_REQUEST);
    }

    // Check if the name is taken
    if state
        .db
        .get_community_by_name(name)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .is_some()
    {
        return Err(StatusCode::CONFLICT);
    }

    let community_id = Uuid::new_v4();
    let row = state
        .db
        .create_community(
            &community_id.to_string(),
            name,
            &req.description,
            &current.id.to_string(),
            &current.username,
        )
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok((StatusCode::CREATED, Json(community_response(row))))
}

pub async fn list_communities(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, StatusCode> {
    let rows = state
        .db
        .list_communities()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let communities: Vec<CommunityResponse> = rows.into_iter().map(community_response).collect();
    Ok(Json(communities))
}

pub async fn get_community(
    State(state): State<AppState>,
    Path(community_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let row = state
        .db
        .get_community(&community_id.to_string())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(community_response(row)))
}

fn community_response(row: CommunityRow) -> CommunityResponse {
    CommunityResponse {
        id: parse_id(&row.id),
        name: row.name,
        description: row.description,
        creator_id: parse_id(&row.creator_id),
        creator_username: row.creator_username,
        created_at: parse_timestamp(&row.created_at),
    }
}
