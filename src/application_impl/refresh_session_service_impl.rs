use crate::application_port::{AuthError, CredentialHasher, RefreshSessionService};
use crate::domain_model::{NewRefreshSession, PrincipalId, RefreshSession};
use crate::domain_port::{Clock, RefreshSessionStore};
use chrono::{DateTime, SubsecRound, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Owns the refresh-session invariants: at most `max_sessions` per principal
/// after each create, single-use consumption, lazy expiry.
///
/// The capacity check in `create` is list-then-evict-then-insert without a
/// lock. Concurrent creates for one principal can each see room and push the
/// count past `max_sessions` by at most the number of concurrent creators;
/// the next create evicts back down. Single-use does not depend on this: it
/// rests entirely on the store's conditional `delete_by_hash`.
pub struct RealRefreshSessionService {
    store: Arc<dyn RefreshSessionStore>,
    hasher: Arc<dyn CredentialHasher>,
    clock: Arc<dyn Clock>,
    max_sessions: usize,
}

impl RealRefreshSessionService {
    pub fn new(
        store: Arc<dyn RefreshSessionStore>,
        hasher: Arc<dyn CredentialHasher>,
        clock: Arc<dyn Clock>,
        max_sessions: usize,
    ) -> Self {
        Self {
            store,
            hasher,
            clock,
            max_sessions: max_sessions.max(1),
        }
    }

    /// Earliest `expires_at` wins; equal expiries fall back to insertion order.
    fn eviction_victim(sessions: &[RefreshSession]) -> Option<&RefreshSession> {
        sessions
            .iter()
            .min_by(|a, b| a.expires_at.cmp(&b.expires_at).then(a.id.cmp(&b.id)))
    }

    async fn evict_if_full(&self, principal_id: &PrincipalId) -> Result<(), AuthError> {
        let sessions = self
            .store
            .list_by_principal(principal_id)
            .await
            .map_err(|e| e.into_auth("list_by_principal"))?;

        if sessions.len() < self.max_sessions {
            return Ok(());
        }

        if let Some(victim) = Self::eviction_victim(&sessions) {
            let deleted = self
                .store
                .delete_by_hash(&victim.token_hash)
                .await
                .map_err(|e| e.into_auth("evict"))?;
            debug!(
                principal = %principal_id,
                session = %victim.id,
                deleted,
                live = sessions.len(),
                "evicted refresh session"
            );
        }

        Ok(())
    }

    async fn find_match(
        &self,
        sessions: Vec<RefreshSession>,
        raw_token: &str,
    ) -> Result<Option<RefreshSession>, AuthError> {
        for session in sessions {
            if self
                .hasher
                .verify_secret(raw_token, &session.token_hash)
                .await?
            {
                return Ok(Some(session));
            }
        }
        Ok(None)
    }
}

#[async_trait::async_trait]
impl RefreshSessionService for RealRefreshSessionService {
    async fn create(
        &self,
        principal_id: &PrincipalId,
        raw_token: &str,
        ttl: Duration,
    ) -> Result<DateTime<Utc>, AuthError> {
        let token_hash = self.hasher.hash_secret(raw_token).await?;

        let collided = self
            .store
            .delete_by_hash(&token_hash)
            .await
            .map_err(|e| e.into_auth("delete_by_hash"))?;
        if collided > 0 {
            warn!(principal = %principal_id, "dropped session with colliding token hash");
        }

        self.evict_if_full(principal_id).await?;

        // millisecond precision is all every backend keeps
        let expires_at = (self.clock.now() + ttl).trunc_subsecs(3);
        let id = self
            .store
            .insert(NewRefreshSession {
                principal_id: principal_id.clone(),
                token_hash,
                expires_at,
            })
            .await
            .map_err(|e| e.into_auth("insert"))?;
        debug!(principal = %principal_id, session = %id, %expires_at, "created refresh session");

        Ok(expires_at)
    }

    async fn validate_and_consume(
        &self,
        principal_id: &PrincipalId,
        raw_token: &str,
    ) -> Result<RefreshSession, AuthError> {
        let sessions = self
            .store
            .list_by_principal(principal_id)
            .await
            .map_err(|e| e.into_auth("list_by_principal"))?;
        if sessions.is_empty() {
            debug!(principal = %principal_id, "no refresh sessions");
            return Err(AuthError::WrongCredentials);
        }

        let Some(session) = self.find_match(sessions, raw_token).await? else {
            debug!(principal = %principal_id, "no session matches presented token");
            return Err(AuthError::WrongCredentials);
        };

        if session.is_expired_at(self.clock.now()) {
            self.store
                .delete_by_hash(&session.token_hash)
                .await
                .map_err(|e| e.into_auth("delete_expired"))?;
            debug!(principal = %principal_id, session = %session.id, "rejected expired session");
            return Err(AuthError::WrongCredentials);
        }

        let deleted = self
            .store
            .delete_by_hash(&session.token_hash)
            .await
            .map_err(|e| e.into_auth("consume"))?;
        if deleted == 0 {
            debug!(principal = %principal_id, session = %session.id, "session consumed concurrently");
            return Err(AuthError::WrongCredentials);
        }

        Ok(session)
    }
}
