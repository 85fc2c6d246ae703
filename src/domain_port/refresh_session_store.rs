use crate::application_port::AuthError;
use crate::domain_model::*;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("duplicate key")]
    DuplicateKey,
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Attach the failing operation's name on the way up.
    pub fn into_auth(self, op: &str) -> AuthError {
        match self {
            StoreError::DuplicateKey => AuthError::SessionAlreadyExists,
            StoreError::Backend(e) => AuthError::Store(format!("{op}: {e}")),
        }
    }
}

#[async_trait::async_trait]
pub trait RefreshSessionStore: Send + Sync {
    /// Persist a session. A record with the same `token_hash` is a `DuplicateKey`.
    async fn insert(&self, session: NewRefreshSession) -> Result<SessionId, StoreError>;

    /// Delete the record holding `token_hash`. Returns the number of records
    /// removed; 0 means another caller got there first or it never existed.
    /// Must be atomic: two concurrent calls for one hash never both return 1.
    async fn delete_by_hash(&self, token_hash: &str) -> Result<u64, StoreError>;

    /// All physically present sessions of a principal, in no particular order.
    async fn list_by_principal(
        &self,
        principal_id: &PrincipalId,
    ) -> Result<Vec<RefreshSession>, StoreError>;
}
