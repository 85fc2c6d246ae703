use crate::application_port::{AuthError, CredentialHasher};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};

/// Argon2id over refresh secrets. Hashing runs on the blocking pool since a
/// single call costs tens of milliseconds with the default parameters.
#[derive(Clone)]
pub struct Argon2SecretHasher {
    argon2: Argon2<'static>,
}

impl Argon2SecretHasher {
    pub fn new() -> Self {
        Argon2SecretHasher {
            argon2: Argon2::default(),
        }
    }

    pub fn with_params(params: Params) -> Self {
        Argon2SecretHasher {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }
}

impl Default for Argon2SecretHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CredentialHasher for Argon2SecretHasher {
    async fn hash_secret(&self, secret: &str) -> Result<String, AuthError> {
        let argon2 = self.argon2.clone();
        let secret = secret.to_owned();
        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            argon2
                .hash_password(secret.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| AuthError::InternalError(format!("hash error: {e}")))
        })
        .await
        .map_err(|e| AuthError::InternalError(format!("hash task: {e}")))?
    }

    async fn verify_secret(&self, secret: &str, secret_hash: &str) -> Result<bool, AuthError> {
        let argon2 = self.argon2.clone();
        let secret = secret.to_owned();
        let secret_hash = secret_hash.to_owned();
        tokio::task::spawn_blocking(move || {
            let parsed = PasswordHash::new(&secret_hash)
                .map_err(|e| AuthError::InternalError(format!("invalid PHC hash: {e}")))?;

            match argon2.verify_password(secret.as_bytes(), &parsed) {
                Ok(_) => Ok(true),
                Err(argon2::password_hash::Error::Password) => Ok(false),
                Err(e) => Err(AuthError::InternalError(format!("verify error: {e}"))),
            }
        })
        .await
        .map_err(|e| AuthError::InternalError(format!("verify task: {e}")))?
    }
}

#[cfg(test)]
pub(crate) fn cheap_hasher() -> Argon2SecretHasher {
    let params = Params::new(8, 1, 1, None).expect("valid argon2 params");
    Argon2SecretHasher::with_params(params)
}
