use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use sqlx::{MySqlPool, Row};

pub struct MySqlPrincipalRepo {
    pool: MySqlPool,
}

impl MySqlPrincipalRepo {
    pub fn new(pool: MySqlPool) -> Self {
        MySqlPrincipalRepo { pool }
    }
}

#[async_trait::async_trait]
impl PrincipalRepo for MySqlPrincipalRepo {
    async fn find_by_id(&self, id: &str) -> Result<Option<Principal>, AuthError> {
        // the column collation is case-insensitive; the stored spelling wins
        let row = sqlx::query("SELECT id FROM principal WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AuthError::Store(format!("query principal: {e}")))?;

        row.map(|row| {
            let id: String = row
                .try_get("id")
                .map_err(|e| AuthError::Store(e.to_string()))?;
            Ok(Principal {
                id: PrincipalId(id),
            })
        })
        .transpose()
    }
}
