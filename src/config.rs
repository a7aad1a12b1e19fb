//! Process configuration read from environment variables with defaults.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

const DEFAULT_SECRET: &str = "secret;)";
/// Upper bound for either token lifetime (ten years).
pub const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub port: u16,
    pub log_level: String,
    pub jwt: JwtConfig,
    pub store_timeout: Duration,
    /// Postgres connection string; `None` selects the in-memory user directory.
    pub database_url: Option<String>,
    pub sessions: SessionStoreConfig,
    pub seed_user: Option<SeedUser>,
}

#[derive(Clone)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

// Secrets stay out of logs.
impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("access_secret", &"<redacted>")
            .field("refresh_secret", &"<redacted>")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SessionStoreConfig {
    pub snapshot_path: Option<PathBuf>,
    pub snapshot_interval: Duration,
    pub sweep_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct SeedUser {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from an arbitrary key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());
        let num = |k: &str, default: u64| -> Result<u64> {
            match get(k) {
                Some(v) => v.trim().parse::<u64>().with_context(|| format!("{k} must be an unsigned integer, got '{v}'")),
                None => Ok(default),
            }
        };

        let port = match get("PORT") {
            Some(v) => v.trim().parse::<u16>().with_context(|| format!("PORT must be a port number, got '{v}'"))?,
            None => 8080,
        };
        let jwt = JwtConfig {
            access_secret: lookup("JWT_ACCESS_SECRET").unwrap_or_else(|| DEFAULT_SECRET.to_string()),
            refresh_secret: lookup("JWT_REFRESH_SECRET").unwrap_or_else(|| DEFAULT_SECRET.to_string()),
            access_ttl: Duration::from_secs(num("ACCESS_TTL_SECS", 15 * 60)?),
            refresh_ttl: Duration::from_secs(num("REFRESH_TTL_SECS", 7 * 24 * 60 * 60)?),
        };
        if jwt.access_secret.is_empty() { bail!("JWT_ACCESS_SECRET must not be empty"); }
        if jwt.refresh_secret.is_empty() { bail!("JWT_REFRESH_SECRET must not be empty"); }
        if jwt.access_ttl.is_zero() { bail!("ACCESS_TTL_SECS must be greater than zero"); }
        if jwt.refresh_ttl.as_secs() > MAX_TTL_SECS {
            bail!("REFRESH_TTL_SECS ({}) must not exceed {MAX_TTL_SECS}", jwt.refresh_ttl.as_secs());
        }
        if jwt.access_ttl >= jwt.refresh_ttl {
            bail!("ACCESS_TTL_SECS ({}) must be shorter than REFRESH_TTL_SECS ({})", jwt.access_ttl.as_secs(), jwt.refresh_ttl.as_secs());
        }

        let seed_user = match (get("SEED_USER_EMAIL"), get("SEED_USER_PASSWORD")) {
            (Some(email), Some(password)) => Some(SeedUser {
                name: get("SEED_USER_NAME").unwrap_or_else(|| "user".to_string()),
                email,
                password,
            }),
            _ => None,
        };

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "debug".to_string()),
            jwt,
            store_timeout: Duration::from_millis(num("STORE_TIMEOUT_MS", 2_000)?),
            database_url: get("DATABASE_URL"),
            sessions: SessionStoreConfig {
                snapshot_path: get("SESSION_SNAPSHOT_PATH").map(PathBuf::from),
                snapshot_interval: Duration::from_millis(num("SESSION_SNAPSHOT_INTERVAL_MS", 5_000)?),
                sweep_interval: Duration::from_secs(5),
            },
            seed_user,
        })
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_addr, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.bind_addr, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_preserve_ttl_asymmetry() {
        let c = from_pairs(&[]).unwrap();
        assert_eq!(c.port, 8080);
        assert_eq!(c.log_level, "debug");
        assert_eq!(c.jwt.access_ttl, Duration::from_secs(900));
        assert_eq!(c.jwt.refresh_ttl, Duration::from_secs(604_800));
        assert_eq!(c.store_timeout, Duration::from_millis(2_000));
        assert!(c.database_url.is_none());
        assert!(c.seed_user.is_none());
        assert_eq!(c.socket_addr().unwrap().port(), 8080);
    }

    #[test]
    fn overrides_are_applied() {
        let c = from_pairs(&[
            ("PORT", "9090"),
            ("JWT_ACCESS_SECRET", "a"),
            ("JWT_REFRESH_SECRET", "r"),
            ("ACCESS_TTL_SECS", "60"),
            ("REFRESH_TTL_SECS", "3600"),
            ("DATABASE_URL", "postgres://localhost/users"),
            ("SEED_USER_EMAIL", "user@example.org"),
            ("SEED_USER_PASSWORD", "password"),
        ]).unwrap();
        assert_eq!(c.port, 9090);
        assert_eq!(c.jwt.access_secret, "a");
        assert_eq!(c.jwt.access_ttl, Duration::from_secs(60));
        assert_eq!(c.database_url.as_deref(), Some("postgres://localhost/users"));
        let seed = c.seed_user.unwrap();
        assert_eq!(seed.email, "user@example.org");
        assert_eq!(seed.name, "user");
    }

    #[test]
    fn rejects_inverted_ttls() {
        let err = from_pairs(&[("ACCESS_TTL_SECS", "7200"), ("REFRESH_TTL_SECS", "3600")]).unwrap_err();
        assert!(err.to_string().contains("must be shorter"));
    }

    #[test]
    fn rejects_empty_secret_and_bad_numbers() {
        assert!(from_pairs(&[("JWT_ACCESS_SECRET", "")]).is_err());
        assert!(from_pairs(&[("PORT", "eighty")]).is_err());
        assert!(from_pairs(&[("STORE_TIMEOUT_MS", "-1")]).is_err());
    }

    #[test]
    fn rejects_ttls_beyond_upper_bound() {
        let err = from_pairs(&[("REFRESH_TTL_SECS", "9223372036854775807")]).unwrap_err();
        assert!(err.to_string().contains("must not exceed"));
        assert!(from_pairs(&[("REFRESH_TTL_SECS", "18446744073709551615")]).is_err());
        let at_bound = MAX_TTL_SECS.to_string();
        assert_eq!(from_pairs(&[("REFRESH_TTL_SECS", at_bound.as_str())]).unwrap().jwt.refresh_ttl.as_secs(), MAX_TTL_SECS);
    }

    #[test]
    fn debug_redacts_secrets() {
        let c = from_pairs(&[("JWT_ACCESS_SECRET", "topsecret")]).unwrap();
        assert!(!format!("{:?}", c).contains("topsecret"));
    }
}
