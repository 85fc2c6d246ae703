use crate::domain_model::*;
use crate::domain_port::*;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-local session store keyed by token hash. `DashMap::remove` gives
/// the conditional delete its atomicity.
#[derive(Debug, Default)]
pub struct MemoryRefreshSessionStore {
    by_hash: DashMap<String, RefreshSession>,
    next_id: AtomicU64,
}

impl MemoryRefreshSessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }

    #[cfg(test)]
    pub fn contains_hash(&self, token_hash: &str) -> bool {
        self.by_hash.contains_key(token_hash)
    }
}

#[async_trait::async_trait]
impl RefreshSessionStore for MemoryRefreshSessionStore {
    async fn insert(&self, session: NewRefreshSession) -> Result<SessionId, StoreError> {
        match self.by_hash.entry(session.token_hash.clone()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateKey),
            Entry::Vacant(slot) => {
                let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
                slot.insert(session.into_session(id));
                Ok(id)
            }
        }
    }

    async fn delete_by_hash(&self, token_hash: &str) -> Result<u64, StoreError> {
        Ok(self.by_hash.remove(token_hash).map_or(0, |_| 1))
    }

    async fn list_by_principal(
        &self,
        principal_id: &PrincipalId,
    ) -> Result<Vec<RefreshSession>, StoreError> {
        Ok(self
            .by_hash
            .iter()
            .filter(|entry| entry.value().principal_id == *principal_id)
            .map(|entry| entry.value().clone())
            .collect())
    }
}
