use super::util::is_dup_key;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};

/// Sessions in `refresh_session`; `token_hash` carries a UNIQUE index so the
/// conditional delete is a single `DELETE ... WHERE token_hash = ?`.
pub struct MySqlRefreshSessionStore {
    pool: MySqlPool,
}

impl MySqlRefreshSessionStore {
    pub fn new(pool: MySqlPool) -> Self {
        MySqlRefreshSessionStore { pool }
    }

    fn row_to_session(row: MySqlRow) -> Result<RefreshSession, StoreError> {
        let id: u64 = row
            .try_get("id")
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let principal_id: String = row
            .try_get("principal_id")
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let token_hash: String = row
            .try_get("token_hash")
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let expires_at: DateTime<Utc> = row
            .try_get("expires_at")
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(RefreshSession {
            id: SessionId(id),
            principal_id: PrincipalId(principal_id),
            token_hash,
            expires_at,
        })
    }
}

#[async_trait::async_trait]
impl RefreshSessionStore for MySqlRefreshSessionStore {
    async fn insert(&self, session: NewRefreshSession) -> Result<SessionId, StoreError> {
        let result = sqlx::query(
            r#"
INSERT INTO refresh_session (principal_id, token_hash, expires_at)
VALUES (?, ?, ?)
"#,
        )
        .bind(session.principal_id.as_str())
        .bind(&session.token_hash)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_dup_key(&e) {
                StoreError::DuplicateKey
            } else {
                StoreError::Backend(e.to_string())
            }
        })?;

        Ok(SessionId(result.last_insert_id()))
    }

    async fn delete_by_hash(&self, token_hash: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_session WHERE token_hash = ?")
            .bind(token_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn list_by_principal(
        &self,
        principal_id: &PrincipalId,
    ) -> Result<Vec<RefreshSession>, StoreError> {
        let rows: Vec<MySqlRow> = sqlx::query(
            r#"
SELECT id, principal_id, token_hash, expires_at
FROM refresh_session
WHERE principal_id = ?
"#,
        )
        .bind(principal_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(format!("query sessions: {e}")))?;

        rows.into_iter().map(Self::row_to_session).collect()
    }
}
