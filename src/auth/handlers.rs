use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, Method};
use axum::response::{AppendHeaders, IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::auth::gate::{self, AuthStatus};
use crate::config::AuthConfig;
use crate::error::{AppError, AppResult};
use crate::extractors::cookie_value;
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize, Default)]
pub struct AuthQuery {
    pub action: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

// -- Cookie helpers --

fn session_cookie(auth: &AuthConfig, token: &str) -> String {
    let max_age_secs = auth.session_hours * 3600;
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        auth.cookie_name, token, max_age_secs
    );
    if auth.secure_cookie {
        cookie.push_str("; Secure");
    }
    cookie
}

fn clear_session_cookie(auth: &AuthConfig) -> String {
    format!(
        "{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0",
        auth.cookie_name
    )
}

// -- Handlers --

/// /auth?action=login|logout|verify
pub async fn dispatch(
    State(state): State<AppState>,
    method: Method,
    Query(query): Query<AuthQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    match query.action.as_deref().unwrap_or("") {
        "login" => {
            if method != Method::POST {
                return Err(AppError::MethodNotAllowed);
            }
            login(&state, &body)
        }
        "logout" => logout(&state, &headers),
        "verify" => Ok(verify(&state, &headers)),
        _ => Err(AppError::Validation("Invalid action".into())),
    }
}

/// POST /auth?action=login: check credentials and open a session
fn login(state: &AppState, body: &[u8]) -> AppResult<Response> {
    let req: LoginRequest = if body.is_empty() {
        LoginRequest::default()
    } else {
        serde_json::from_slice(body)
            .map_err(|e| AppError::Validation(format!("Invalid JSON: {e}")))?
    };

    let (admin, token) = gate::login(&state.db, &state.sessions, &req.username, &req.password)?;

    let body = serde_json::json!({ "success": true, "user": admin });
    Ok((
        AppendHeaders([(header::SET_COOKIE, session_cookie(&state.config.auth, &token))]),
        Json(body),
    )
        .into_response())
}

/// /auth?action=logout: destroy the session, whatever state it is in
fn logout(state: &AppState, headers: &HeaderMap) -> AppResult<Response> {
    let token = cookie_value(headers, &state.config.auth.cookie_name);
    gate::logout(&state.sessions, token)?;

    Ok((
        AppendHeaders([(header::SET_COOKIE, clear_session_cookie(&state.config.auth))]),
        Json(serde_json::json!({ "success": true })),
    )
        .into_response())
}

/// /auth?action=verify: read-only, never an error
fn verify(state: &AppState, headers: &HeaderMap) -> Response {
    let token = cookie_value(headers, &state.config.auth.cookie_name);
    let body = match state.sessions.status(token) {
        AuthStatus::Authenticated(admin) => {
            serde_json::json!({ "authenticated": true, "user": admin })
        }
        AuthStatus::Anonymous => serde_json::json!({ "authenticated": false }),
    };
    Json(body).into_response()
}
