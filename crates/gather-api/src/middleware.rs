use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::auth::AppState;

pub const SESSION_COOKIE: &str = "gather_session";

/// The authenticated user, inserted into request extensions by `require_auth`.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub username: String,
}

/// Validate the session cookie against the sessions table and load the user.
/// Missing, unknown or expired sessions are 401.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = extract_cookie(req.headers(), SESSION_COOKIE).ok_or(StatusCode::UNAUTHORIZED)?;

    let session = state
        .db
        .get_session(&token)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let user = state
        .db
        .get_user_by_id(&session.user_id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let current = CurrentUser {
        id: user.id.parse().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?,
        username: user.username,
    };

    req.extensions_mut().insert(current);
    Ok(next.run(req).await)
}

/// Extract a cookie value from the Cookie header.
pub fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(header::COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .find_map(|cookie| {
            let (key, value) = cookie.trim().split_once('=')?;

            if key == name {
                Some(value.to_string())
            } else {
                None
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn extracts_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("foo=bar; gather_session=abc123; other=xyz"),
        );

        assert_eq!(
            extract_cookie(&headers, SESSION_COOKIE),
            Some("abc123".to_string())
        );
        assert_eq!(extract_cookie(&headers, "foo"), Some("bar".to_string()));
        assert_eq!(extract_cookie(&headers, "missing"), None);
    }

    #[test]
    fn no_cookie_header_is_none() {
        let headers = HeaderMap::new();
        assert_eq!(extract_cookie(&headers, SESSION_COOKIE), None);
    }
}
