use crate::application_port::*;
use crate::domain_model::*;

#[async_trait::async_trait]
pub trait PrincipalRepo: Send + Sync {
    /// Look up a principal by identifier. The returned `Principal::id` is the
    /// canonical spelling, which may differ from `id` in case.
    async fn find_by_id(&self, id: &str) -> Result<Option<Principal>, AuthError>;
}
