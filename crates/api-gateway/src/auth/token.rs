//! HS256 token issuing and verification.
//!
//! Only HS256 is ever accepted. The declared algorithm is inspected before the
//! signature so a token advertising `none` or an asymmetric algorithm is
//! rejected without being handed to a verifier for that algorithm.
//!
//! Temporal checks (`exp`, `nbf`) are done here against an explicit clock
//! reading with zero leeway, so they are testable without sleeping.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{
    decode, decode_header, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey,
    Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identity claims carried by a gateway token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject identifier (e.g. `USR_001`)
    pub user_id: String,
    /// Display name
    pub username: String,
    /// Registered subject, same value as `user_id`
    pub sub: String,
    /// Issuer
    pub iss: String,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Not before (unix seconds)
    pub nbf: i64,
    /// Expiry (unix seconds)
    pub exp: i64,
}

/// A freshly signed token
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
    pub expires_at: DateTime<Utc>,
}

/// Token verification and signing failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// Wrong secret, foreign issuer, or a non-HS256 algorithm
    #[error("token signature is invalid")]
    InvalidSignature,
    /// Not a structurally valid token
    #[error("token is malformed")]
    Malformed,
    /// `now > exp`
    #[error("token has expired")]
    Expired,
    /// `now < nbf`
    #[error("token is not valid yet")]
    NotYetValid,
    /// Signing failed
    #[error("token signing failed: {0}")]
    Signing(String),
}

/// Issues and verifies HS256 tokens with a shared secret.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: String,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material
        f.debug_struct("TokenCodec")
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(secret: &[u8], issuer: impl Into<String>) -> Self {
        let issuer = issuer.into();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "sub"]);
        validation.set_issuer(&[issuer.as_str()]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            issuer,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Sign a token for `subject` valid from now for `ttl`
    pub fn issue(
        &self,
        subject: &str,
        display_name: &str,
        ttl: Duration,
    ) -> Result<IssuedToken, TokenError> {
        self.issue_at(subject, display_name, ttl, Utc::now())
    }

    /// Sign a token with `iat = nbf = now` and `exp = now + ttl`
    pub fn issue_at(
        &self,
        subject: &str,
        display_name: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let ttl = chrono::Duration::from_std(ttl).map_err(|e| TokenError::Signing(e.to_string()))?;
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| TokenError::Signing("expiry overflows".to_string()))?;

        let claims = Claims {
            user_id: subject.to_string(),
            username: display_name.to_string(),
            sub: subject.to_string(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        // Report the second-truncated expiry actually written to the token
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .unwrap_or(expires_at);

        Ok(IssuedToken {
            token,
            claims,
            expires_at,
        })
    }

    /// Verify a token against the current time
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, Utc::now())
    }

    /// Verify algorithm, signature, required claims, issuer, then `nbf`/`exp` at `now`
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        check_declared_algorithm(token)?;

        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature
                | ErrorKind::InvalidAlgorithm
                | ErrorKind::InvalidAlgorithmName
                | ErrorKind::InvalidIssuer => TokenError::InvalidSignature,
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::ImmatureSignature => TokenError::NotYetValid,
                _ => TokenError::Malformed,
            }
        })?;

        let claims = data.claims;
        let now = now.timestamp();
        if now < claims.nbf {
            return Err(TokenError::NotYetValid);
        }
        if now > claims.exp {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }
}

#[derive(Deserialize)]
struct DeclaredHeader {
    alg: Option<String>,
}

/// Reject anything that does not declare exactly HS256.
///
/// `decode_header` fails on algorithm names it does not know (such as
/// `none`), which would otherwise surface as `Malformed`; peeking at the raw
/// header keeps every foreign algorithm an `InvalidSignature`.
fn check_declared_algorithm(token: &str) -> Result<(), TokenError> {
    if let Ok(header) = decode_header(token) {
        return match header.alg {
            Algorithm::HS256 => Ok(()),
            _ => Err(TokenError::InvalidSignature),
        };
    }

    let segment = token.split('.').next().ok_or(TokenError::Malformed)?;
    let raw = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| TokenError::Malformed)?;
    let declared: DeclaredHeader =
        serde_json::from_slice(&raw).map_err(|_| TokenError::Malformed)?;

    match declared.alg {
        Some(alg) if alg != "HS256" => Err(TokenError::InvalidSignature),
        _ => Err(TokenError::Malformed),
    }
}
