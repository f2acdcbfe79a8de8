//! Bearer token gate for protected routes.

use super::token::{Claims, TokenCodec, TokenError};
use crate::domain::error::{codes, ApiError};
use axum::http::{header, HeaderMap};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Why a request was refused by the gate
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("authorization header is missing")]
    MissingHeader,
    #[error("authorization header must be 'Bearer <token>'")]
    MalformedHeader,
    #[error(transparent)]
    Token(#[from] TokenError),
}

impl AuthError {
    /// Stable error code for the 401 body
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingHeader => codes::MISSING_AUTH_HEADER,
            AuthError::MalformedHeader => codes::MALFORMED_AUTH_HEADER,
            AuthError::Token(TokenError::InvalidSignature) => codes::INVALID_SIGNATURE,
            AuthError::Token(TokenError::Malformed) => codes::MALFORMED_TOKEN,
            AuthError::Token(TokenError::Expired) => codes::TOKEN_EXPIRED,
            AuthError::Token(TokenError::NotYetValid) => codes::TOKEN_NOT_YET_VALID,
            AuthError::Token(TokenError::Signing(_)) => codes::INTERNAL_ERROR,
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let message = match &err {
            AuthError::MissingHeader => "Authorization header is required.",
            AuthError::MalformedHeader => "Authorization header must be 'Bearer <token>'.",
            AuthError::Token(TokenError::InvalidSignature) => "Token signature is invalid.",
            AuthError::Token(TokenError::Malformed) => "Token is malformed.",
            AuthError::Token(TokenError::Expired) => "Token has expired.",
            AuthError::Token(TokenError::NotYetValid) => "Token is not valid yet.",
            AuthError::Token(TokenError::Signing(_)) => return ApiError::internal(),
        };
        ApiError::unauthorized(err.code(), message)
    }
}

/// Validates `Authorization: Bearer <token>` headers
#[derive(Debug, Clone)]
pub struct AuthGate {
    codec: Arc<TokenCodec>,
}

impl AuthGate {
    pub fn new(codec: Arc<TokenCodec>) -> Self {
        Self { codec }
    }

    /// Check the request headers against the current time
    pub fn check(&self, headers: &HeaderMap) -> Result<Claims, AuthError> {
        self.check_at(headers, Utc::now())
    }

    pub fn check_at(&self, headers: &HeaderMap, now: DateTime<Utc>) -> Result<Claims, AuthError> {
        let value = headers
            .get(header::AUTHORIZATION)
            .ok_or(AuthError::MissingHeader)?;
        let value = value.to_str().map_err(|_| AuthError::MalformedHeader)?;
        let token = bearer_token(value).ok_or(AuthError::MalformedHeader)?;
        Ok(self.codec.verify_at(token, now)?)
    }
}

/// Exactly two space-separated parts, case-sensitive `Bearer`, non-empty token
fn bearer_token(value: &str) -> Option<&str> {
    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Some(token),
        _ => None,
    }
}
