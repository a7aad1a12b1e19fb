//! Token lifecycle manager.
//!
//! A credential pair moves `Issued -> Active -> {Refreshed | Revoked | PassivelyExpired}`.
//! Refresh always mints brand-new identifiers and deletes the old ones, so a refresh token
//! can be used at most once. Passive expiry is left entirely to the registry's TTLs.
//!
//! Every directory/registry call is bounded by `TokenPolicy::store_timeout`; dropping the
//! returned future (request cancelled) drops the in-flight store call with it. A pair is only
//! handed back after both of its registry entries were written.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{Instrument, Span};
use uuid::Uuid;

use super::credentials::CredentialPair;
use super::registry::{RegistryError, SessionRegistry};
use super::signer::{CredentialSigner, TokenPurpose};
use crate::config::Config;
use crate::directory::{DirectoryError, User, UserDirectory, UserId};
use crate::error::{AppError, AppResult, NOT_AUTHENTICATED, REFRESH_EXPIRED};

const TARGET: &str = "sessiongate::auth";

#[derive(Debug, Clone)]
pub struct TokenPolicy {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub store_timeout: Duration,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            access_ttl: Duration::from_secs(15 * 60),
            refresh_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            store_timeout: Duration::from_secs(2),
        }
    }
}

impl TokenPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self { access_ttl: config.jwt.access_ttl, refresh_ttl: config.jwt.refresh_ttl, store_timeout: config.store_timeout }
    }
}

async fn bounded<T, E>(limit: Duration, on_timeout: E, fut: impl Future<Output = Result<T, E>>) -> Result<T, E> {
    tokio::time::timeout(limit, fut).await.unwrap_or(Err(on_timeout))
}

fn denied(code: &'static str, cause: impl Display) -> AppError {
    tracing::debug!(target: TARGET, code, cause = %cause, "authentication denied");
    AppError::not_authenticated(code, NOT_AUTHENTICATED)
}

fn now_secs() -> i64 { chrono::Utc::now().timestamp() }

/// Absolute expiry `ttl` after `now`; a lifetime that does not fit an `i64` timestamp is refused.
fn expiry_after(now: i64, ttl: Duration) -> AppResult<i64> {
    i64::try_from(ttl.as_secs())
        .ok()
        .and_then(|secs| now.checked_add(secs))
        .ok_or_else(|| AppError::unprocessable("token_lifetime", format!("token lifetime of {}s is out of range", ttl.as_secs())))
}

pub struct TokenManager {
    users: Arc<dyn UserDirectory>,
    sessions: Arc<dyn SessionRegistry>,
    signer: CredentialSigner,
    policy: TokenPolicy,
    span: Span,
}

impl TokenManager {
    /// `span` is the observability handle every operation is instrumented with.
    pub fn new(
        users: Arc<dyn UserDirectory>,
        sessions: Arc<dyn SessionRegistry>,
        signer: CredentialSigner,
        policy: TokenPolicy,
        span: Span,
    ) -> Self {
        Self { users, sessions, signer, policy, span }
    }

    pub fn policy(&self) -> &TokenPolicy { &self.policy }
    pub fn signer(&self) -> &CredentialSigner { &self.signer }

    /// Check e-mail and password, then issue and register a fresh pair.
    pub async fn login(&self, email: &str, password: &str) -> AppResult<CredentialPair> {
        async {
            let user = match bounded(self.policy.store_timeout, DirectoryError::Timeout, self.users.find_by_email(email)).await {
                Ok(u) => u,
                Err(e) => {
                    tracing::info!(target: TARGET, cause = %e, "login rejected");
                    return Err(AppError::incorrect_credentials("user_lookup_failed"));
                }
            };
            // Argon2 verification is CPU-bound; keep it off the async workers.
            let matches = {
                let (user, password) = (user.clone(), password.to_string());
                tokio::task::spawn_blocking(move || user.compare_password(&password))
                    .await
                    .map_err(|e| AppError::internal("password_check", e.to_string()))?
            };
            if !matches {
                tracing::info!(target: TARGET, user_id = user.id, "login rejected: password mismatch");
                return Err(AppError::incorrect_credentials("password_mismatch"));
            }
            let pair = self.issue(user.id).await?;
            tracing::info!(target: TARGET, user_id = user.id, access_id = %pair.access_id, "login succeeded");
            Ok(pair)
        }
        .instrument(self.span.clone())
        .await
    }

    /// Resolve the user behind an access token that is signed, unexpired and still registered.
    pub async fn authenticate(&self, access_token: &str) -> AppResult<User> {
        async {
            let claims = self.signer.verify(access_token, TokenPurpose::Access).map_err(|e| denied("access_token_invalid", e))?;
            let stored = bounded(self.policy.store_timeout, RegistryError::Timeout, self.sessions.get(&claims.jti.to_string()))
                .await
                .map_err(|e| denied("access_session_lookup", e))?;
            if stored != claims.user_id {
                return Err(denied("session_identity_mismatch", format!("registry={stored} token={}", claims.user_id)));
            }
            let user = bounded(self.policy.store_timeout, DirectoryError::Timeout, self.users.find_by_id(claims.user_id))
                .await
                .map_err(|e| denied("user_lookup", e))?;
            tracing::debug!(target: TARGET, user_id = user.id, "authenticated");
            Ok(user)
        }
        .instrument(self.span.clone())
        .await
    }

    /// Rotate: the caller must present a live access token and an unused refresh token for the
    /// same user. Both old sessions are deleted before the new pair is issued.
    pub async fn refresh(&self, access_token: &str, refresh_token: &str) -> AppResult<CredentialPair> {
        async {
            let refresh = self.signer.verify(refresh_token, TokenPurpose::Refresh).map_err(|e| {
                tracing::debug!(target: TARGET, cause = %e, "refresh token rejected");
                AppError::not_authenticated("refresh_token_invalid", REFRESH_EXPIRED)
            })?;
            let access = self.signer.verify(access_token, TokenPurpose::Access).map_err(|e| denied("access_token_invalid", e))?;
            if access.user_id != refresh.user_id {
                return Err(denied("session_identity_mismatch", format!("access={} refresh={}", access.user_id, refresh.user_id)));
            }

            // A replayed refresh token fails here, before any session is touched.
            let refresh_key = refresh.jti.to_string();
            let holder = bounded(self.policy.store_timeout, RegistryError::Timeout, self.sessions.get(&refresh_key))
                .await
                .map_err(|e| denied("refresh_session_lookup", e))?;
            if holder != refresh.user_id {
                return Err(denied("session_identity_mismatch", format!("registry={holder} token={}", refresh.user_id)));
            }

            let removed = bounded(self.policy.store_timeout, RegistryError::Timeout, self.sessions.delete(&access.jti.to_string()))
                .await
                .map_err(|e| denied("access_session_delete", e))?;
            if removed == 0 {
                return Err(denied("access_session_not_found", access.jti));
            }
            // Concurrent refreshes with the same token race here; only one delete reports 1.
            let removed = bounded(self.policy.store_timeout, RegistryError::Timeout, self.sessions.delete(&refresh_key))
                .await
                .map_err(|e| denied("refresh_session_delete", e))?;
            if removed == 0 {
                return Err(denied("refresh_session_not_found", refresh.jti));
            }

            let pair = self.issue(refresh.user_id).await?;
            tracing::info!(target: TARGET, user_id = refresh.user_id, old_access_id = %access.jti, access_id = %pair.access_id, "credentials rotated");
            Ok(pair)
        }
        .instrument(self.span.clone())
        .await
    }

    /// Revoke the access session behind `access_token`.
    pub async fn logout(&self, access_token: &str) -> AppResult<()> {
        async {
            let claims = self.signer.verify(access_token, TokenPurpose::Access).map_err(|e| denied("access_token_invalid", e))?;
            let removed = bounded(self.policy.store_timeout, RegistryError::Timeout, self.sessions.delete(&claims.jti.to_string()))
                .await
                .map_err(|e| denied("access_session_delete", e))?;
            if removed == 0 {
                return Err(denied("access_session_not_found", claims.jti));
            }
            tracing::info!(target: TARGET, user_id = claims.user_id, access_id = %claims.jti, "logged out");
            Ok(())
        }
        .instrument(self.span.clone())
        .await
    }

    async fn issue(&self, user_id: UserId) -> AppResult<CredentialPair> {
        let now = now_secs();
        let access_id = Uuid::new_v4();
        let refresh_id = Uuid::new_v4();
        let access_expires = expiry_after(now, self.policy.access_ttl)?;
        let refresh_expires = expiry_after(now, self.policy.refresh_ttl)?;

        let signing_failed = |e: super::signer::SignerError| {
            tracing::error!(target: TARGET, cause = %e, "token signing failed");
            AppError::unprocessable("token_signing", e.to_string())
        };
        let access_token = self.signer.mint(user_id, access_id, TokenPurpose::Access, access_expires).map_err(signing_failed)?;
        let refresh_token = self.signer.mint(user_id, refresh_id, TokenPurpose::Refresh, refresh_expires).map_err(signing_failed)?;

        self.register(access_id, user_id, access_expires).await?;
        self.register(refresh_id, user_id, refresh_expires).await?;

        Ok(CredentialPair { access_token, refresh_token, access_id, refresh_id, access_expires, refresh_expires })
    }

    /// Record `id` until `expires_at`. The TTL is computed now so the entry never outlives the token.
    async fn register(&self, id: Uuid, user_id: UserId, expires_at: i64) -> AppResult<()> {
        let remaining = expires_at - now_secs();
        if remaining <= 0 {
            return Err(AppError::unprocessable("session_ttl", RegistryError::InvalidTtl.to_string()));
        }
        bounded(
            self.policy.store_timeout,
            RegistryError::Timeout,
            self.sessions.put(&id.to_string(), user_id, Duration::from_secs(remaining as u64)),
        )
        .await
        .map_err(|e| {
            tracing::warn!(target: TARGET, user_id, session_id = %id, cause = %e, "session registration failed");
            AppError::unprocessable("registry_write", e.to_string())
        })
    }
}
