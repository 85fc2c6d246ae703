use crate::domain_model::PrincipalId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("principal not found")]
    PrincipalNotFound,
    #[error("wrong credentials")]
    WrongCredentials,
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("refresh session already exists")]
    SessionAlreadyExists,
    #[error("token invalid")]
    TokenInvalid,
    #[error("token expired")]
    TokenExpired,
    #[error("store error: {0}")]
    Store(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct AccessToken(pub String);

/// Transport form of a refresh token: base64 of the raw secret.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct RefreshToken(pub String);

#[derive(Debug, Clone, Serialize)]
pub struct AuthTokens {
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
}

/// Freshly minted pair. `refresh_token_raw` is the secret itself and must
/// never be persisted or logged.
#[derive(Debug, Clone)]
pub struct IssuedPair {
    pub access_token: AccessToken,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token_raw: String,
    pub refresh_expires_at: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait TokenCodec: Send + Sync {
    async fn issue_pair(
        &self,
        principal: &PrincipalId,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Result<IssuedPair, AuthError>;

    /// Recover the principal a raw refresh token was issued to. Authenticity
    /// is checked, lifetime is not: the session store decides expiry.
    async fn parse_principal(&self, raw_refresh_token: &str) -> Result<PrincipalId, AuthError>;

    async fn verify_access_token(&self, token: &AccessToken) -> Result<PrincipalId, AuthError>;
}

#[async_trait::async_trait]
pub trait CredentialHasher: Send + Sync {
    async fn hash_secret(&self, secret: &str) -> Result<String, AuthError>;
    /// Constant-time comparison of `secret` against a stored hash.
    async fn verify_secret(&self, secret: &str, secret_hash: &str) -> Result<bool, AuthError>;
}

#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    async fn sign_in(&self, principal_id: &str) -> Result<AuthTokens, AuthError>;
    async fn refresh(&self, encoded_refresh_token: &str) -> Result<AuthTokens, AuthError>;
    async fn verify_token(&self, access_token: &str) -> Result<PrincipalId, AuthError>;
}
