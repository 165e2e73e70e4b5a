//! Application configuration management

use std::env;

use anyhow::{Context, Result};

use crate::error::AuthError;
use crate::services::fanout::DEFAULT_SUBSCRIBER_BUFFER;

/// Default bcrypt work factor for stored passwords
pub const DEFAULT_BCRYPT_COST: u32 = 14;

/// Default access token lifetime
pub const DEFAULT_TOKEN_LIFETIME_HOURS: i64 = 24;

/// Longest accepted token lifetime (one year)
pub const MAX_TOKEN_LIFETIME_HOURS: i64 = 24 * 365;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,

    /// SQLite connection URL
    pub database_url: String,

    /// Maximum connections in the database pool
    pub database_max_connections: u32,

    /// HMAC secret used to sign and verify access tokens
    pub jwt_secret: String,

    /// Lifetime of issued tokens, in hours
    pub token_lifetime_hours: i64,

    /// Bcrypt cost factor for password hashing
    pub bcrypt_cost: u32,

    /// Origins allowed by the CORS layer
    pub allowed_origins: Vec<String>,

    /// Per-subscriber delivery buffer; events beyond it are dropped
    pub subscriber_buffer: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// `JWT_SECRET` is mandatory: the server refuses to start without a signing key.
    pub fn from_env() -> Result<Self> {
        let jwt_secret = env::var("JWT_SECRET")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AuthError::Configuration("JWT_SECRET is not set".to_string()))?;

        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid PORT")?,

            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:courtside.db?mode=rwc".to_string()),

            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),

            jwt_secret,

            token_lifetime_hours: match env::var("TOKEN_LIFETIME_HOURS") {
                Ok(raw) => parse_token_lifetime(&raw)?,
                Err(_) => DEFAULT_TOKEN_LIFETIME_HOURS,
            },

            bcrypt_cost: env::var("BCRYPT_COST")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_BCRYPT_COST),

            allowed_origins: parse_origins(
                &env::var("ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            ),

            subscriber_buffer: env::var("SUBSCRIBER_BUFFER")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_SUBSCRIBER_BUFFER),
        })
    }
}

fn parse_token_lifetime(raw: &str) -> Result<i64> {
    let hours: i64 = raw
        .trim()
        .parse()
        .with_context(|| format!("Invalid TOKEN_LIFETIME_HOURS '{}'", raw))?;
    if !(1..=MAX_TOKEN_LIFETIME_HOURS).contains(&hours) {
        anyhow::bail!(
            "TOKEN_LIFETIME_HOURS must be between 1 and {}, got {}",
            MAX_TOKEN_LIFETIME_HOURS,
            hours
        );
    }
    Ok(hours)
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_origins() {
        assert_eq!(
            parse_origins("http://a.test, http://b.test,,"),
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
        assert!(parse_origins("").is_empty());
    }

    #[test]
    fn test_parse_token_lifetime_bounds() {
        assert_eq!(parse_token_lifetime("24").unwrap(), 24);
        assert_eq!(parse_token_lifetime(" 1 ").unwrap(), 1);
        assert_eq!(
            parse_token_lifetime(&MAX_TOKEN_LIFETIME_HOURS.to_string()).unwrap(),
            MAX_TOKEN_LIFETIME_HOURS
        );

        for bad in ["0", "-5", "2500000000", "9223372036854775807", "soon", ""] {
            assert!(parse_token_lifetime(bad).is_err(), "accepted {bad:?}");
        }
    }
}
