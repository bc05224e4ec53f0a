//! Dashboard login, logout and the session guard for protected routes.

use crate::AppState;
use crate::directory::Identity;
use crate::error::AppError;
use crate::helpers::now;
use crate::session::SessionToken;

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_macros::debug_handler;
use headers::{Authorization, Cookie, HeaderMapExt, authorization::Bearer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "gamelog_session";

/// Identity of the caller, resolved by [`require_session`].
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub identity: Identity,
    pub token: SessionToken,
}

#[derive(Deserialize)]
pub(crate) struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
pub(crate) struct LoginResponse {
    token: String,
    username: String,
    display_name: String,
    expires_at: i64,
}

/// Bearer token first, then the session cookie.
fn session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth) = headers.typed_get::<Authorization<Bearer>>() {
        return Some(auth.token().to_string());
    }
    headers
        .typed_get::<Cookie>()
        .and_then(|cookie| cookie.get(SESSION_COOKIE).map(str::to_string))
}

fn session_cookie(token: &str, max_age: i64) -> String {
    format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}")
}

/// Reject requests without a live session whose account is still active.
pub(crate) async fn require_session(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = session_token(request.headers()).ok_or(AppError::Unauthorized)?;
    let session = state
        .sessions
        .get(&token, now())
        .await
        .ok_or(AppError::Unauthorized)?;

    // Deactivated after the session was issued
    let Some(identity) = state.users.get(&session.username) else {
        debug!(username = %session.username, "session for inactive account");
        return Err(AppError::Unauthorized);
    };

    request.extensions_mut().insert(CurrentUser {
        identity,
        token: session.token,
    });
    Ok(next.run(request).await)
}

#[debug_handler]
pub(crate) async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let now = now();
    let Some(identity) = state
        .users
        .validate(&payload.username, &payload.password, now)
    else {
        warn!(username = %payload.username, "rejected login");
        return Err(AppError::Unauthorized);
    };

    let session = state.sessions.create(&identity.username, now).await;
    let cookie = session_cookie(&session.token, session.expires_at - now);

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(LoginResponse {
            token: session.token.to_string(),
            username: identity.username,
            display_name: identity.display_name,
            expires_at: session.expires_at,
        }),
    ))
}

/// Always succeeds; an unknown or missing token is ignored.
pub(crate) async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if let Some(token) = session_token(&headers) {
        state.sessions.delete(&token).await;
    }

    (
        StatusCode::OK,
        [(header::SET_COOKIE, session_cookie("", 0))],
        Json(serde_json::json!({ "message": "logged out" })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_session_token_prefers_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("gamelog_session=fromcookie"));
        assert_eq!(session_token(&headers).as_deref(), Some("fromcookie"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer frombearer"));
        assert_eq!(session_token(&headers).as_deref(), Some("frombearer"));
    }

    #[test]
    fn test_session_token_ignores_other_cookies() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_token(&headers), None);

        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; other=1"));
        assert_eq!(session_token(&headers), None);
    }
}
