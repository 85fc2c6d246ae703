use crate::application_port::*;
use crate::domain_model::PrincipalId;
use crate::domain_port::PrincipalRepo;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct TokenTtls {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

pub struct RealAuthService {
    principal_repo: Arc<dyn PrincipalRepo>,
    session_service: Arc<dyn RefreshSessionService>,
    token_codec: Arc<dyn TokenCodec>,
    ttls: TokenTtls,
}

impl RealAuthService {
    pub fn new(
        principal_repo: Arc<dyn PrincipalRepo>,
        session_service: Arc<dyn RefreshSessionService>,
        token_codec: Arc<dyn TokenCodec>,
        ttls: TokenTtls,
    ) -> Self {
        Self {
            principal_repo,
            session_service,
            token_codec,
            ttls,
        }
    }

    fn decode_refresh_token(encoded: &str) -> Result<String, AuthError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| AuthError::MalformedInput(format!("refresh token encoding: {e}")))?;
        String::from_utf8(bytes)
            .map_err(|_| AuthError::MalformedInput("refresh token is not utf-8".to_string()))
    }

    /// Shared tail of sign-in and refresh: mint a pair and persist a session
    /// for its refresh half. Only the encoded secret leaves this function.
    async fn issue_tokens(&self, principal_id: &PrincipalId) -> Result<AuthTokens, AuthError> {
        let pair = self
            .token_codec
            .issue_pair(principal_id, self.ttls.access_ttl, self.ttls.refresh_ttl)
            .await?;

        let refresh_expires_at = self
            .session_service
            .create(principal_id, &pair.refresh_token_raw, self.ttls.refresh_ttl)
            .await?;

        Ok(AuthTokens {
            access_token: pair.access_token,
            refresh_token: RefreshToken(STANDARD.encode(pair.refresh_token_raw.as_bytes())),
            access_token_expires_at: pair.access_expires_at,
            refresh_token_expires_at: refresh_expires_at,
        })
    }
}

#[async_trait::async_trait]
impl AuthService for RealAuthService {
    async fn sign_in(&self, principal_id: &str) -> Result<AuthTokens, AuthError> {
        if principal_id.trim().is_empty() {
            return Err(AuthError::MalformedInput("principal id is empty".to_string()));
        }

        let principal = self
            .principal_repo
            .find_by_id(principal_id)
            .await?
            .ok_or(AuthError::PrincipalNotFound)?;

        let tokens = self.issue_tokens(&principal.id).await?;
        debug!(principal = %principal.id, "signed in");
        Ok(tokens)
    }

    async fn refresh(&self, encoded_refresh_token: &str) -> Result<AuthTokens, AuthError> {
        if encoded_refresh_token.trim().is_empty() {
            return Err(AuthError::MalformedInput("refresh token is empty".to_string()));
        }
        let raw = Self::decode_refresh_token(encoded_refresh_token)?;

        let principal_id = self
            .token_codec
            .parse_principal(&raw)
            .await
            .map_err(|e| match e {
                AuthError::TokenInvalid | AuthError::TokenExpired => AuthError::WrongCredentials,
                other => other,
            })?;

        self.session_service
            .validate_and_consume(&principal_id, &raw)
            .await?;

        let tokens = self.issue_tokens(&principal_id).await?;
        debug!(principal = %principal_id, "rotated refresh token");
        Ok(tokens)
    }

    async fn verify_token(&self, access_token: &str) -> Result<PrincipalId, AuthError> {
        self.token_codec
            .verify_access_token(&AccessToken(access_token.to_string()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application_impl::RealRefreshSessionService;
    use crate::application_impl::credential_hasher_argon2::cheap_hasher;
    use crate::application_impl::token_codec_jwt::test_codec;
    use crate::domain_port::{ManualClock, RefreshSessionStore};
    use crate::infra_memory::{MemoryPrincipalRepo, MemoryRefreshSessionStore};
    use chrono::Utc;

    struct Fixture {
        store: Arc<MemoryRefreshSessionStore>,
        clock: Arc<ManualClock>,
        service: RealAuthService,
    }

    fn fixture(max_sessions: usize) -> Fixture {
        let store = Arc::new(MemoryRefreshSessionStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let sessions = Arc::new(RealRefreshSessionService::new(
            store.clone(),
            Arc::new(cheap_hasher()),
            clock.clone(),
            max_sessions,
        ));
        let service = RealAuthService::new(
            Arc::new(MemoryPrincipalRepo::with_principals(["Alice-GUID", "bob"])),
            sessions,
            Arc::new(test_codec()),
            TokenTtls {
                access_ttl: Duration::from_secs(15 * 60),
                refresh_ttl: Duration::from_secs(24 * 60 * 60),
            },
        );
        Fixture {
            store,
            clock,
            service,
        }
    }

    #[tokio::test]
    async fn sign_in_then_refresh_rotates_once() {
        let f = fixture(5);
        let first = f.service.sign_in("Alice-GUID").await.unwrap();

        let second = f.service.refresh(&first.refresh_token.0).await.unwrap();
        assert_ne!(second.refresh_token.0, first.refresh_token.0);
        assert_ne!(second.access_token.0, first.access_token.0);

        let err = f.service.refresh(&first.refresh_token.0).await.unwrap_err();
        assert!(matches!(err, AuthError::WrongCredentials));

        f.service.refresh(&second.refresh_token.0).await.unwrap();
        assert_eq!(f.store.len(), 1);
    }

    #[tokio::test]
    async fn unknown_principal_creates_nothing() {
        let f = fixture(5);
        let err = f.service.sign_in("nope").await.unwrap_err();
        assert!(matches!(err, AuthError::PrincipalNotFound));
        assert!(f.store.is_empty());

        let err = f.service.sign_in("  ").await.unwrap_err();
        assert!(matches!(err, AuthError::MalformedInput(_)));
    }

    #[tokio::test]
    async fn session_is_bound_to_canonical_id() {
        let f = fixture(5);
        let tokens = f.service.sign_in("alice-guid").await.unwrap();

        let sessions = f
            .store
            .list_by_principal(&PrincipalId::from("Alice-GUID"))
            .await
            .unwrap();
        assert_eq!(sessions.len(), 1);

        let principal = f.service.verify_token(&tokens.access_token.0).await.unwrap();
        assert_eq!(principal, PrincipalId::from("Alice-GUID"));
    }

    #[tokio::test]
    async fn refresh_secret_is_transported_as_base64() {
        let f = fixture(5);
        let tokens = f.service.sign_in("bob").await.unwrap();

        let raw = RealAuthService::decode_refresh_token(&tokens.refresh_token.0).unwrap();
        assert_eq!(raw.split('.').count(), 3);
        let stored = &f.store.list_by_principal(&PrincipalId::from("bob")).await.unwrap()[0];
        assert_ne!(stored.token_hash, raw);
        assert_ne!(stored.token_hash, tokens.refresh_token.0);
        assert_eq!(stored.expires_at, tokens.refresh_token_expires_at);
    }

    #[tokio::test]
    async fn malformed_encoding_is_not_wrong_credentials() {
        let f = fixture(5);
        let err = f.service.refresh("not-valid-base64!!").await.unwrap_err();
        assert!(matches!(err, AuthError::MalformedInput(_)));

        let err = f.service.refresh("").await.unwrap_err();
        assert!(matches!(err, AuthError::MalformedInput(_)));

        let not_utf8 = STANDARD.encode([0xff, 0xfe, 0xfd]);
        let err = f.service.refresh(&not_utf8).await.unwrap_err();
        assert!(matches!(err, AuthError::MalformedInput(_)));
    }

    #[tokio::test]
    async fn well_encoded_garbage_is_wrong_credentials() {
        let f = fixture(5);
        // substring-sliced ids are not accepted
        let legacy = STANDARD.encode("bob-0a1b2c3d4e5f60");
        let err = f.service.refresh(&legacy).await.unwrap_err();
        assert!(matches!(err, AuthError::WrongCredentials));
    }

    #[tokio::test]
    async fn expired_refresh_token_is_wrong_credentials() {
        let f = fixture(5);
        let tokens = f.service.sign_in("bob").await.unwrap();

        f.clock.advance(Duration::from_secs(24 * 60 * 60));
        let err = f.service.refresh(&tokens.refresh_token.0).await.unwrap_err();
        assert!(matches!(err, AuthError::WrongCredentials));
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn sign_ins_beyond_capacity_evict_the_oldest() {
        let f = fixture(2);
        let oldest = f.service.sign_in("bob").await.unwrap();
        f.clock.advance(Duration::from_secs(1));
        let middle = f.service.sign_in("bob").await.unwrap();
        f.clock.advance(Duration::from_secs(1));
        let newest = f.service.sign_in("bob").await.unwrap();

        assert_eq!(f.store.len(), 2);
        let err = f.service.refresh(&oldest.refresh_token.0).await.unwrap_err();
        assert!(matches!(err, AuthError::WrongCredentials));
        f.service.refresh(&middle.refresh_token.0).await.unwrap();
        f.service.refresh(&newest.refresh_token.0).await.unwrap();
    }

    #[tokio::test]
    async fn principals_do_not_share_sessions() {
        let f = fixture(5);
        let alice = f.service.sign_in("Alice-GUID").await.unwrap();
        f.service.sign_in("bob").await.unwrap();

        f.service.refresh(&alice.refresh_token.0).await.unwrap();
        let bob_sessions = f
            .store
            .list_by_principal(&PrincipalId::from("bob"))
            .await
            .unwrap();
        assert_eq!(bob_sessions.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_refreshes_have_one_winner() {
        let f = fixture(5);
        let tokens = f.service.sign_in("bob").await.unwrap();
        let service = Arc::new(f.service);

        let a = {
            let service = service.clone();
            let token = tokens.refresh_token.0.clone();
            tokio::spawn(async move { service.refresh(&token).await })
        };
        let b = {
            let service = service.clone();
            let token = tokens.refresh_token.0.clone();
            tokio::spawn(async move { service.refresh(&token).await })
        };
        let (a, b) = (a.await.unwrap(), b.await.unwrap());

        assert!(a.is_ok() ^ b.is_ok());
        let loser = if a.is_ok() { b } else { a };
        assert!(matches!(loser, Err(AuthError::WrongCredentials)));
    }
}
