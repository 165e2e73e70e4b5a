//! Credential service: password hashing and JWT issuance/validation
//!
//! Provides:
//! - Password hashing with bcrypt
//! - HS256 token generation and validation (24h lifetime by default)
//! - Login, registration and token refresh on top of the users repository
//!
//! Tokens are never revoked server side; expiry is the only invalidation.

use std::sync::Arc;

use bcrypt::{hash, verify};
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::config::{Config, DEFAULT_BCRYPT_COST, DEFAULT_TOKEN_LIFETIME_HOURS};
use crate::db::{AlreadyExists, Database};
use crate::error::AuthError;

// ============================================================================
// JWT Claims
// ============================================================================

/// Claims carried by an access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Identity the token asserts
    pub username: String,
    /// Expiration timestamp
    pub exp: i64,
    /// Issued at timestamp
    pub iat: i64,
}

/// A freshly signed token
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub username: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

// ============================================================================
// Configuration
// ============================================================================

/// Credential service configuration, built once at startup
#[derive(Clone)]
pub struct AuthConfig {
    /// HMAC signing secret
    pub jwt_secret: String,
    /// Token lifetime
    pub token_lifetime: Duration,
    /// Bcrypt cost factor
    pub bcrypt_cost: u32,
}

impl AuthConfig {
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            token_lifetime: Duration::hours(DEFAULT_TOKEN_LIFETIME_HOURS),
            bcrypt_cost: DEFAULT_BCRYPT_COST,
        }
    }

    /// Build from loaded configuration. A lifetime that is not a positive,
    /// representable number of hours falls back to the default.
    pub fn from_config(config: &Config) -> Self {
        let token_lifetime = Duration::try_hours(config.token_lifetime_hours)
            .filter(|lifetime| *lifetime > Duration::zero())
            .unwrap_or_else(|| {
                tracing::warn!(
                    hours = config.token_lifetime_hours,
                    "Token lifetime out of range; using the default"
                );
                Duration::hours(DEFAULT_TOKEN_LIFETIME_HOURS)
            });

        Self {
            jwt_secret: config.jwt_secret.clone(),
            token_lifetime,
            bcrypt_cost: config.bcrypt_cost,
        }
    }

    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("token_lifetime", &self.token_lifetime)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .finish()
    }
}

// ============================================================================
// Auth Service
// ============================================================================

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    db: Database,
    config: Arc<AuthConfig>,
}

impl AuthService {
    pub fn new(db: Database, config: AuthConfig) -> Self {
        Self {
            db,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    // ========================================================================
    // Tokens
    // ========================================================================

    /// Sign a token for `username`, valid for the configured lifetime
    pub fn issue_token(&self, username: &str) -> Result<IssuedToken, AuthError> {
        self.issue_token_at(username, Utc::now())
    }

    /// Sign a token as if the current time were `now`
    pub fn issue_token_at(
        &self,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, AuthError> {
        let expires_at = now
            .checked_add_signed(self.config.token_lifetime)
            .ok_or_else(|| AuthError::Signing("token expiry out of range".to_string()))?;
        let claims = TokenClaims {
            username: username.to_string(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::Signing(e.to_string()))?;

        Ok(IssuedToken {
            token,
            username: claims.username,
            issued_at: now,
            expires_at,
        })
    }

    /// Verify signature and expiry, returning the identity the token asserts
    pub fn validate_token(&self, token: &str) -> Result<String, AuthError> {
        self.validate_token_at(token, Utc::now())
    }

    /// Validate against an explicit clock. Expired means `exp <= now`.
    pub fn validate_token_at(&self, token: &str, now: DateTime<Utc>) -> Result<String, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp"]);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;

        let data = decode::<TokenClaims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| {
            tracing::debug!(error = %e, "Token verification failed");
            AuthError::InvalidToken
        })?;

        if data.claims.exp <= now.timestamp() {
            tracing::debug!(
                username = %data.claims.username,
                expired_at = ?Utc.timestamp_opt(data.claims.exp, 0).single(),
                "Token expired"
            );
            return Err(AuthError::InvalidToken);
        }

        Ok(data.claims.username)
    }

    // ========================================================================
    // Secrets
    // ========================================================================

    /// One-way adaptive hash of a plaintext secret
    pub fn hash_secret(&self, plaintext: &str) -> Result<String, AuthError> {
        hash(plaintext, self.config.bcrypt_cost).map_err(|e| AuthError::Hashing(e.to_string()))
    }

    /// Compare a plaintext against a stored hash. A malformed hash never matches.
    pub fn verify_secret(&self, plaintext: &str, hash: &str) -> bool {
        verify(plaintext, hash).unwrap_or(false)
    }

    async fn hash_blocking(&self, plaintext: &str) -> Result<String, AuthError> {
        let this = self.clone();
        let plaintext = plaintext.to_string();
        tokio::task::spawn_blocking(move || this.hash_secret(&plaintext))
            .await
            .map_err(|e| AuthError::Hashing(e.to_string()))?
    }

    async fn verify_blocking(&self, plaintext: &str, hash: String) -> bool {
        let this = self.clone();
        let plaintext = plaintext.to_string();
        tokio::task::spawn_blocking(move || this.verify_secret(&plaintext, &hash))
            .await
            .unwrap_or(false)
    }

    // ========================================================================
    // Accounts
    // ========================================================================

    /// Check a username/password pair and issue a token.
    ///
    /// Unknown users and wrong passwords are indistinguishable to the caller.
    pub async fn login(&self, username: &str, password: &str) -> Result<IssuedToken, AuthError> {
        let stored = self
            .db
            .users()
            .get_password_hash(username)
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let Some(stored) = stored else {
            return Err(AuthError::InvalidCredentials);
        };

        if !self.verify_blocking(password, stored).await {
            return Err(AuthError::InvalidCredentials);
        }

        self.issue_token(username)
    }

    /// Create an account and issue its first token
    pub async fn register(&self, username: &str, password: &str) -> Result<IssuedToken, AuthError> {
        let users = self.db.users();

        let exists = users
            .get_id_by_username(username)
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?
            .is_some();
        if exists {
            return Err(AuthError::UsernameTaken(username.to_string()));
        }

        let password_hash = self.hash_blocking(password).await?;
        // The lookup above is only a fast path; a concurrent registration can still win
        let user = users.create(username, &password_hash).await.map_err(|e| {
            if e.is::<AlreadyExists>() {
                AuthError::UsernameTaken(username.to_string())
            } else {
                AuthError::Transport(e.to_string())
            }
        })?;

        tracing::info!(user_id = %user.id, username = %user.username, "User registered");
        self.issue_token(&user.username)
    }

    /// Exchange a still-valid token for a new one with a fresh expiry
    pub async fn refresh(&self, token: &str) -> Result<IssuedToken, AuthError> {
        let username = self.validate_token(token)?;
        self.issue_token(&username)
    }

    /// Hash and store a new password for the user `id`
    pub async fn set_password(&self, id: &str, password: &str) -> Result<bool, AuthError> {
        let password_hash = self.hash_blocking(password).await?;
        let changed = self
            .db
            .users()
            .update_password(id, &password_hash)
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;
        Ok(changed > 0)
    }
}
