//! HS256 credential signing and verification.
//!
//! Access and refresh tokens are sealed under separate secrets and additionally carry a
//! `purpose` claim, so a token minted for one purpose is rejected by the other even when
//! both secrets are configured to the same value. Claims are decoded once into
//! [`TokenClaims`]; a missing or mistyped field fails the same way as a bad signature.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::directory::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    Access,
    Refresh,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::Access => "access",
            TokenPurpose::Refresh => "refresh",
        }
    }
}

/// Claims carried by every issued token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub user_id: UserId,
    /// Registry key paired with this token (access or refresh identifier).
    pub jti: Uuid,
    pub purpose: TokenPurpose,
    /// Absolute expiry, seconds since the Unix epoch.
    pub exp: i64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignerError {
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("signing key for {0} tokens is not configured")]
    KeyUnavailable(&'static str),
    #[error("token signing failed: {0}")]
    Signing(String),
}

struct PurposeKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl PurposeKeys {
    fn from_secret(purpose: TokenPurpose, secret: &[u8]) -> Result<Self, SignerError> {
        if secret.is_empty() {
            return Err(SignerError::KeyUnavailable(purpose.as_str()));
        }
        Ok(Self { encoding: EncodingKey::from_secret(secret), decoding: DecodingKey::from_secret(secret) })
    }
}

pub struct CredentialSigner {
    access: PurposeKeys,
    refresh: PurposeKeys,
    validation: Validation,
}

impl CredentialSigner {
    pub fn new(access_secret: &[u8], refresh_secret: &[u8]) -> Result<Self, SignerError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        Ok(Self {
            access: PurposeKeys::from_secret(TokenPurpose::Access, access_secret)?,
            refresh: PurposeKeys::from_secret(TokenPurpose::Refresh, refresh_secret)?,
            validation,
        })
    }

    fn keys(&self, purpose: TokenPurpose) -> &PurposeKeys {
        match purpose {
            TokenPurpose::Access => &self.access,
            TokenPurpose::Refresh => &self.refresh,
        }
    }

    /// Sign a token for `user_id` paired with registry key `id`, expiring at `expires_at`.
    pub fn mint(&self, user_id: UserId, id: Uuid, purpose: TokenPurpose, expires_at: i64) -> Result<String, SignerError> {
        let claims = TokenClaims { user_id, jti: id, purpose, exp: expires_at };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.keys(purpose).encoding)
            .map_err(|e| SignerError::Signing(e.to_string()))
    }

    /// Check signature, expiry and purpose; return the typed claims.
    pub fn verify(&self, token: &str, purpose: TokenPurpose) -> Result<TokenClaims, SignerError> {
        if token.is_empty() {
            return Err(SignerError::InvalidSignature);
        }
        let data = jsonwebtoken::decode::<TokenClaims>(token, &self.keys(purpose).decoding, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => SignerError::Expired,
                _ => SignerError::InvalidSignature,
            })?;
        if data.claims.purpose != purpose {
            return Err(SignerError::InvalidSignature);
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> i64 { chrono::Utc::now().timestamp() }

    #[test]
    fn mint_then_verify() {
        let s = CredentialSigner::new(b"access", b"refresh").unwrap();
        let id = Uuid::new_v4();
        let exp = now() + 60;
        let t = s.mint(7, id, TokenPurpose::Access, exp).unwrap();
        let c = s.verify(&t, TokenPurpose::Access).unwrap();
        assert_eq!(c, TokenClaims { user_id: 7, jti: id, purpose: TokenPurpose::Access, exp });
    }

    #[test]
    fn purposes_never_cross_validate_even_with_shared_secret() {
        for (a, r) in [(&b"shared"[..], &b"shared"[..]), (&b"access"[..], &b"refresh"[..])] {
            let s = CredentialSigner::new(a, r).unwrap();
            let access = s.mint(1, Uuid::new_v4(), TokenPurpose::Access, now() + 60).unwrap();
            let refresh = s.mint(1, Uuid::new_v4(), TokenPurpose::Refresh, now() + 60).unwrap();
            assert_eq!(s.verify(&access, TokenPurpose::Refresh).unwrap_err(), SignerError::InvalidSignature);
            assert_eq!(s.verify(&refresh, TokenPurpose::Access).unwrap_err(), SignerError::InvalidSignature);
            assert!(s.verify(&refresh, TokenPurpose::Refresh).is_ok());
        }
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let s = CredentialSigner::new(b"access", b"refresh").unwrap();
        let t = s.mint(1, Uuid::new_v4(), TokenPurpose::Access, now() - 30).unwrap();
        assert_eq!(s.verify(&t, TokenPurpose::Access).unwrap_err(), SignerError::Expired);
    }

    #[test]
    fn foreign_signature_and_garbage_rejected() {
        let ours = CredentialSigner::new(b"access", b"refresh").unwrap();
        let theirs = CredentialSigner::new(b"other", b"other-refresh").unwrap();
        let t = theirs.mint(1, Uuid::new_v4(), TokenPurpose::Access, now() + 60).unwrap();
        assert_eq!(ours.verify(&t, TokenPurpose::Access).unwrap_err(), SignerError::InvalidSignature);
        assert_eq!(ours.verify("", TokenPurpose::Access).unwrap_err(), SignerError::InvalidSignature);
        assert_eq!(ours.verify("a.b.c", TokenPurpose::Access).unwrap_err(), SignerError::InvalidSignature);

        let mut tampered = ours.mint(1, Uuid::new_v4(), TokenPurpose::Access, now() + 60).unwrap();
        tampered.push('x');
        assert_eq!(ours.verify(&tampered, TokenPurpose::Access).unwrap_err(), SignerError::InvalidSignature);
    }

    #[test]
    fn untyped_claims_are_rejected() {
        #[derive(Serialize)]
        struct Loose { user_id: &'static str, exp: i64 }
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &Loose { user_id: "seven", exp: now() + 60 },
            &EncodingKey::from_secret(b"access"),
        ).unwrap();
        let s = CredentialSigner::new(b"access", b"refresh").unwrap();
        assert_eq!(s.verify(&token, TokenPurpose::Access).unwrap_err(), SignerError::InvalidSignature);
    }

    #[test]
    fn empty_secret_is_unavailable() {
        assert_eq!(CredentialSigner::new(b"", b"r").err(), Some(SignerError::KeyUnavailable("access")));
        assert_eq!(CredentialSigner::new(b"a", b"").err(), Some(SignerError::KeyUnavailable("refresh")));
    }
}
