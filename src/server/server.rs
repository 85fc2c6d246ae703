use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_port::*;
use crate::infra_memory::*;
use crate::infra_mysql::*;
use crate::infra_redis::*;
use crate::logger::*;
use crate::settings::Settings;
use anyhow::{Context, anyhow};
use sqlx::{MySql, Pool};
use std::sync::Arc;
use std::time::Duration;

/// Options the HTTP layer needs besides the services themselves.
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub request_timeout: Duration,
    pub secure_cookies: bool,
}

pub struct Server {
    pub auth_service: Arc<dyn AuthService>,
    pub http: HttpOptions,
    pool: Option<Pool<MySql>>,
}

impl Server {
    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        let needs_mysql =
            settings.store.backend == "mysql" || settings.principal.backend == "mysql";
        let pool = if needs_mysql {
            let dsn = settings
                .store
                .mysql_dsn
                .as_deref()
                .ok_or_else(|| anyhow!("store.mysql_dsn is required for the mysql backend"))?;
            Some(
                Pool::<MySql>::connect(dsn)
                    .await
                    .context("connecting to mysql")?,
            )
        } else {
            None
        };
        let mysql_pool = || {
            pool.clone()
                .ok_or_else(|| anyhow!("mysql pool was not initialised"))
        };

        let session_store: Arc<dyn RefreshSessionStore> = match settings.store.backend.as_str() {
            "memory" => Arc::new(MemoryRefreshSessionStore::new()),
            "mysql" => Arc::new(MySqlRefreshSessionStore::new(mysql_pool()?)),
            "redis" => {
                let dsn = settings
                    .store
                    .redis_dsn
                    .as_deref()
                    .ok_or_else(|| anyhow!("store.redis_dsn is required for the redis backend"))?;
                let redis_client = redis::Client::open(dsn)?;
                let redis_manager = redis_client
                    .get_connection_manager()
                    .await
                    .context("connecting to redis")?;
                Arc::new(RedisRefreshSessionStore::new(
                    redis_manager,
                    settings.store.redis_prefix.clone(),
                ))
            }
            other => return Err(anyhow!("Unknown store backend: {}", other)),
        };

        let principal_repo: Arc<dyn PrincipalRepo> = match settings.principal.backend.as_str() {
            "memory" => Arc::new(MemoryPrincipalRepo::with_principals(&settings.principal.seed)),
            "mysql" => Arc::new(MySqlPrincipalRepo::new(mysql_pool()?)),
            other => return Err(anyhow!("Unknown principal backend: {}", other)),
        };

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let credential_hasher: Arc<dyn CredentialHasher> = Arc::new(Argon2SecretHasher::new());
        let token_codec: Arc<dyn TokenCodec> = Arc::new(JwtHs256Codec::new(JwtConfig {
            issuer: settings.auth.issuer.clone(),
            audience: settings.auth.audience.clone(),
            signing_key: settings.auth.signing_key()?,
        }));

        let session_service: Arc<dyn RefreshSessionService> =
            Arc::new(RealRefreshSessionService::new(
                session_store,
                credential_hasher,
                clock,
                settings.auth.max_sessions,
            ));

        let auth_service: Arc<dyn AuthService> = Arc::new(RealAuthService::new(
            principal_repo,
            session_service,
            token_codec,
            TokenTtls {
                access_ttl: settings.auth.access_ttl(),
                refresh_ttl: settings.auth.refresh_ttl(),
            },
        ));

        info!(
            store = %settings.store.backend,
            principal = %settings.principal.backend,
            max_sessions = settings.auth.max_sessions,
            "server started"
        );

        Ok(Self {
            auth_service,
            http: HttpOptions {
                request_timeout: settings.http.request_timeout(),
                secure_cookies: settings.http.tls().is_some(),
            },
            pool,
        })
    }

    pub fn from_parts(auth_service: Arc<dyn AuthService>, http: HttpOptions) -> Self {
        Self {
            auth_service,
            http,
            pool: None,
        }
    }

    pub async fn shutdown(&self) {
        info!("server shutting down...");

        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}
