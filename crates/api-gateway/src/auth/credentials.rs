//! Username/password verification for the login endpoint.

use std::collections::HashMap;

/// Authenticated principal returned by a [`CredentialVerifier`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    /// Stable identifier written to `user_id`/`sub`
    pub user_id: String,
    /// Display name written to `username`
    pub username: String,
}

/// Checks a username/password pair.
///
/// Implementations must be cheap to share across request tasks.
pub trait CredentialVerifier: Send + Sync {
    /// `Some(subject)` when the credentials are valid
    fn verify(&self, username: &str, password: &str) -> Option<Subject>;
}

struct Account {
    password: String,
    user_id: String,
}

/// Fixed in-memory account table
#[derive(Default)]
pub struct StaticCredentials {
    accounts: HashMap<String, Account>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// The two demonstration accounts shipped with the gateway
    pub fn demo() -> Self {
        Self::new()
            .with_account("user123", "password123", "USR_001")
            .with_account("admin", "adminpass", "ADM_001")
    }

    pub fn with_account(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        self.accounts.insert(
            username.into(),
            Account {
                password: password.into(),
                user_id: user_id.into(),
            },
        );
        self
    }
}

impl CredentialVerifier for StaticCredentials {
    fn verify(&self, username: &str, password: &str) -> Option<Subject> {
        let account = self.accounts.get(username)?;
        if !constant_time_compare(password, &account.password) {
            return None;
        }
        Some(Subject {
            user_id: account.user_id.clone(),
            username: username.to_string(),
        })
    }
}

/// Constant-time string comparison to prevent timing attacks
///
/// Takes the same time regardless of how many bytes match. Length
/// differences are folded into the same constant-time result.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    use subtle::ConstantTimeEq;

    let max_len = std::cmp::max(a.len(), b.len());

    // Different pad bytes guarantee a mismatch when lengths differ
    let mut a_padded = vec![0u8; max_len];
    let mut b_padded = vec![0xFFu8; max_len];

    a_padded[..a.len()].copy_from_slice(a.as_bytes());
    b_padded[..b.len()].copy_from_slice(b.as_bytes());

    let lengths_equal = a.len().ct_eq(&b.len());
    let contents_equal = a_padded.ct_eq(&b_padded);

    (lengths_equal & contents_equal).into()
}
