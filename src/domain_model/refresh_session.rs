use super::PrincipalId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-assigned, monotonically increasing; ordering follows insertion.
#[derive(Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server-side record of a live refresh token. Only the salted hash of the
/// secret is kept; `expires_at` is fixed at creation.
#[derive(Debug, Clone)]
pub struct RefreshSession {
    pub id: SessionId,
    pub principal_id: PrincipalId,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

impl RefreshSession {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone)]
pub struct NewRefreshSession {
    pub principal_id: PrincipalId,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

impl NewRefreshSession {
    pub fn into_session(self, id: SessionId) -> RefreshSession {
        RefreshSession {
            id,
            principal_id: self.principal_id,
            token_hash: self.token_hash,
            expires_at: self.expires_at,
        }
    }
}
