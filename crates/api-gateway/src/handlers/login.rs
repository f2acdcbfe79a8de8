//! `POST /auth/login`: exchange a username/password for a bearer token.

use super::AppState;
use crate::domain::error::ErrorTrail;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    /// RFC 3339, UTC
    pub expires_at: String,
    pub user_id: String,
    pub username: String,
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

pub async fn login(State(state): State<AppState>, body: Bytes) -> Response {
    let request: LoginRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(_) => return error(StatusCode::BAD_REQUEST, "Invalid request body"),
    };
    if request.username.is_empty() || request.password.is_empty() {
        return error(StatusCode::BAD_REQUEST, "Username and password are required");
    }

    let Some(subject) = state
        .credentials
        .verify(&request.username, &request.password)
    else {
        warn!(username = %request.username, "Login failed");
        return error(StatusCode::UNAUTHORIZED, "Invalid username or password");
    };

    let issued = match state
        .codec
        .issue(&subject.user_id, &subject.username, state.token_ttl)
    {
        Ok(issued) => issued,
        Err(e) => {
            let mut response = error(StatusCode::INTERNAL_SERVER_ERROR, "Could not issue token");
            ErrorTrail::attach(&mut response, vec![e.to_string()]);
            return response;
        }
    };

    info!(user_id = %subject.user_id, "Issued token");
    Json(LoginResponse {
        token: issued.token,
        expires_at: issued
            .expires_at
            .to_rfc3339_opts(SecondsFormat::Secs, true),
        user_id: subject.user_id,
        username: subject.username,
    })
    .into_response()
}
