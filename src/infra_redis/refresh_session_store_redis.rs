use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{
    AsyncCommands, FromRedisValue, RedisError, RedisResult, RedisWrite, Script, ToRedisArgs, Value,
};
use std::collections::HashMap;
const SESSION_INSERT: &str = include_str!("session_insert.lua");
const SESSION_DELETE: &str = include_str!("session_delete.lua");

/// Layout under `prefix`:
/// - `session:{id}` hash with `principal_id`, `token_hash`, `expires_at_ms`
/// - `hash:{token_hash}` → id, for the conditional delete
/// - `principal:{principal_id}` set of ids
///
/// Session and hash keys carry `PEXPIREAT` so Redis reclaims them on its own;
/// principal sets are pruned on read. Scripts build keys at run time, which
/// limits this store to a single Redis node.
pub struct RedisRefreshSessionStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisRefreshSessionStore {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        RedisRefreshSessionStore {
            conn,
            prefix: prefix.into(),
        }
    }

    fn principal_key(&self, principal_id: &PrincipalId) -> String {
        format!("{}:principal:{}", self.prefix, principal_id)
    }

    fn session_key(&self, id: SessionId) -> String {
        format!("{}:session:{}", self.prefix, id)
    }

    fn fields_to_session(
        id: SessionId,
        mut fields: HashMap<String, String>,
    ) -> Result<RefreshSession, StoreError> {
        let mut take = |name: &str| {
            fields
                .remove(name)
                .ok_or_else(|| StoreError::Backend(format!("session {id} lacks {name}")))
        };
        let principal_id = take("principal_id")?;
        let token_hash = take("token_hash")?;
        let expires_at_ms: i64 = take("expires_at_ms")?
            .parse()
            .map_err(|e| StoreError::Backend(format!("session {id} expires_at_ms: {e}")))?;
        let expires_at = DateTime::<Utc>::from_timestamp_millis(expires_at_ms)
            .ok_or_else(|| StoreError::Backend(format!("session {id} expires_at out of range")))?;

        Ok(RefreshSession {
            id,
            principal_id: PrincipalId(principal_id),
            token_hash,
            expires_at,
        })
    }
}

impl ToRedisArgs for PrincipalId {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        out.write_arg(self.0.as_bytes())
    }
}

impl FromRedisValue for SessionId {
    fn from_redis_value(v: &Value) -> RedisResult<Self> {
        let id: i64 = redis::from_redis_value(v)?;
        let id = u64::try_from(id).map_err(|e| {
            RedisError::from((
                redis::ErrorKind::TypeError,
                "invalid SessionId",
                e.to_string(),
            ))
        })?;
        Ok(SessionId(id))
    }
}

#[async_trait::async_trait]
impl RefreshSessionStore for RedisRefreshSessionStore {
    async fn insert(&self, session: NewRefreshSession) -> Result<SessionId, StoreError> {
        let mut conn = self.conn.clone();
        let script = Script::new(SESSION_INSERT);
        let id: i64 = script
            .arg(&self.prefix)
            .arg(&session.principal_id)
            .arg(&session.token_hash)
            .arg(session.expires_at.timestamp_millis())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        match id {
            -1 => Err(StoreError::DuplicateKey),
            id => Ok(SessionId(id as u64)),
        }
    }

    async fn delete_by_hash(&self, token_hash: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let script = Script::new(SESSION_DELETE);
        let removed: u64 = script
            .arg(&self.prefix)
            .arg(token_hash)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(removed)
    }

    async fn list_by_principal(
        &self,
        principal_id: &PrincipalId,
    ) -> Result<Vec<RefreshSession>, StoreError> {
        let principal_key = self.principal_key(principal_id);
        let mut conn = self.conn.clone();

        let ids: Vec<SessionId> = conn
            .smembers(&principal_key)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for id in &ids {
            pipe.hgetall(self.session_key(*id));
        }
        let records: Vec<HashMap<String, String>> = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let mut sessions = Vec::with_capacity(ids.len());
        let mut gone = Vec::new();
        for (id, fields) in ids.into_iter().zip(records) {
            if fields.is_empty() {
                gone.push(id.0);
                continue;
            }
            sessions.push(Self::fields_to_session(id, fields)?);
        }

        if !gone.is_empty() {
            let _: () = conn
                .srem(&principal_key, gone)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        }

        Ok(sessions)
    }
}
