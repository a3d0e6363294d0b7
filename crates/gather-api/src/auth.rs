use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use rand::RngCore;
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use gather_db::Database;
use gather_types::api::{
    ForgotPasswordRequest, LoginRequest, RegisterRequest, ResetPasswordRequest,
};

use crate::mailer::Mailer;
use crate::middleware::{SESSION_COOKIE, extract_cookie};
use crate::users::user_response;
use gather_gateway::dispatcher::Dispatcher;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub mailer: Mailer,
    pub cookie_secure: bool,
}

const SESSION_TTL_DAYS: i64 = 30;

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    // Validate input
    if req.username.len() < 3 || req.username.len() > 32 {
        return Err(StatusCode::BAD_REQUEST);
    }
    if !req.email.contains('@') || req.email.len() > 254 {
        return Err(StatusCode::BAD_REQUEST);
    }
    if req.password.len() < 8 {
        return Err(StatusCode::BAD_REQUEST);
    }

    // Check if username or email is taken
    if state
        .db
        .get_user_by_username(&req.username)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .is_some()
    {
        return Err(StatusCode::CONFLICT);
    }
    if state
        .db
        .get_user_by_email(&req.email)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .is_some()
    {
        return Err(StatusCode::CONFLICT);
    }

    let password_hash = hash_password(&req.password)?;
    let user_id = Uuid::new_v4();
    let verify_token = new_token();

    let user = state
        .db
        .create_user(
            &user_id.to_string(),
            &req.username,
            &req.email,
            &password_hash,
            &verify_token,
        )
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    // Delivery problems must not lose the account — the token stays valid
    // and the email can be re-triggered through the reset flow later.
    if let Err(e) = state
        .mailer
        .send_verification(&req.email, &req.username, &verify_token)
        .await
    {
        warn!("Verification email to {} failed: {}", req.email, e);
    }

    Ok((StatusCode::CREATED, Json(user_response(user))))
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub token: String,
}

pub async fn verify(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let user = state
        .db
        .get_user_by_verify_token(&query.token)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    state
        .db
        .mark_verified(&user.id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let user = state
        .db
        .get_user_by_username(&req.username)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // Argon2 compares digests in constant time
    let parsed_hash =
        PasswordHash::new(&user.password).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let token = new_token();
    let expires_at = (chrono::Utc::now() + chrono::Duration::days(SESSION_TTL_DAYS))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string();

    state
        .db
        .create_session(&token, &user.id, &expires_at)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok((
        [(
            header::SET_COOKIE,
            session_cookie(&token, state.cookie_secure),
        )],
        Json(user_response(user)),
    ))
}

pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, StatusCode> {
    if let Some(token) = extract_cookie(&headers, SESSION_COOKIE) {
        state
            .db
            .delete_session(&token)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    }

    Ok((
        [(header::SET_COOKIE, clear_session_cookie())],
        StatusCode::NO_CONTENT,
    ))
}

pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    // Always 204 — the response must not reveal whether the email exists
    let user = state
        .db
        .get_user_by_email(&req.email)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    if let Some(user) = user {
        let token = new_token();
        state
            .db
            .set_reset_token(&user.id, &token)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        if let Err(e) = state
            .mailer
            .send_password_reset(&user.email, &user.username, &token)
            .await
        {
            warn!("Password reset email to {} failed: {}", user.email, e);
        }
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.password.len() < 8 {
        return Err(StatusCode::BAD_REQUEST);
    }

    let user = state
        .db
        .get_user_by_reset_token(&req.token)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    let password_hash = hash_password(&req.password)?;

    state
        .db
        .update_password(&user.id, &password_hash)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    // Old sessions die with the old password
    state
        .db
        .delete_sessions_for_user(&user.id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(StatusCode::NO_CONTENT)
}

fn hash_password(password: &str) -> Result<String, StatusCode> {
    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// 256-bit random token, hex encoded. Used for sessions, verification and
/// password reset.
pub fn new_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn session_cookie(token: &str, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE,
        token,
        SESSION_TTL_DAYS * 24 * 60 * 60
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn clear_session_cookie() -> String {
    format!("{}=; HttpOnly; Path=/; Max-Age=0", SESSION_COOKIE)
}
