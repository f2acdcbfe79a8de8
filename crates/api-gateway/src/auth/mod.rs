//! Token issuing, credential checks, and the bearer gate.

pub mod credentials;
pub mod gate;
pub mod token;

pub use credentials::{constant_time_compare, CredentialVerifier, StaticCredentials, Subject};
pub use gate::{AuthError, AuthGate};
pub use token::{Claims, IssuedToken, TokenCodec, TokenError};
