use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use dashmap::DashMap;

/// Principals keyed case-insensitively; lookups return the spelling the
/// principal was registered with.
#[derive(Debug, Default)]
pub struct MemoryPrincipalRepo {
    principals: DashMap<String, Principal>,
}

impl MemoryPrincipalRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_principals<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let repo = Self::new();
        for id in ids {
            repo.register(id.as_ref());
        }
        repo
    }

    pub fn register(&self, id: &str) {
        self.principals.insert(
            id.to_lowercase(),
            Principal {
                id: PrincipalId::from(id),
            },
        );
    }
}

#[async_trait::async_trait]
impl PrincipalRepo for MemoryPrincipalRepo {
    async fn find_by_id(&self, id: &str) -> Result<Option<Principal>, AuthError> {
        Ok(self
            .principals
            .get(&id.to_lowercase())
            .map(|entry| entry.value().clone()))
    }
}
