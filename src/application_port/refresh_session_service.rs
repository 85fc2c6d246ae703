use crate::application_port::AuthError;
use crate::domain_model::{PrincipalId, RefreshSession};
use chrono::{DateTime, Utc};
use std::time::Duration;

#[async_trait::async_trait]
pub trait RefreshSessionService: Send + Sync {
    /// Hash and persist `raw_token` for `principal_id`, evicting the
    /// earliest-expiring session first when the principal is at capacity.
    /// Returns the expiry written to the store.
    async fn create(
        &self,
        principal_id: &PrincipalId,
        raw_token: &str,
        ttl: Duration,
    ) -> Result<DateTime<Utc>, AuthError>;

    /// Find the live session matching `raw_token` and delete it. Succeeds at
    /// most once per session; every miss is `AuthError::WrongCredentials`.
    async fn validate_and_consume(
        &self,
        principal_id: &PrincipalId,
        raw_token: &str,
    ) -> Result<RefreshSession, AuthError>;
}
