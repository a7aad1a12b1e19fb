use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One issued access/refresh pair. Never mutated; refresh supersedes it with a new pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_id: Uuid,
    pub refresh_id: Uuid,
    /// Absolute expiry, seconds since the Unix epoch.
    pub access_expires: i64,
    pub refresh_expires: i64,
}

/// Wire shape returned by `/login` and `/refresh`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
}

impl From<&CredentialPair> for TokenResponse {
    fn from(p: &CredentialPair) -> Self {
        Self { access_token: p.access_token.clone(), refresh_token: p.refresh_token.clone() }
    }
}
