use crate::application_port::{AccessToken, AuthError, IssuedPair, TokenCodec};
use crate::domain_model::PrincipalId;
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const TYP_ACCESS: &str = "access";
const TYP_REFRESH: &str = "refresh";

#[derive(Clone)]
pub struct JwtConfig {
    pub issuer: String,
    pub audience: String,
    pub signing_key: Vec<u8>,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("signing_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String, // principal id
    exp: i64,
    iat: i64,
    iss: String,
    aud: String,
    jti: String, // makes every refresh secret unique
    typ: String,
}

fn encode_claims(
    principal: &PrincipalId,
    typ: &str,
    ttl: Duration,
    cfg: &JwtConfig,
) -> Result<(String, DateTime<Utc>), AuthError> {
    let iat_dt = Utc::now();
    let exp_dt = iat_dt + ttl;
    let claims = Claims {
        sub: principal.0.clone(),
        exp: exp_dt.timestamp(),
        iat: iat_dt.timestamp(),
        iss: cfg.issuer.clone(),
        aud: cfg.audience.clone(),
        jti: uuid::Uuid::new_v4().to_string(),
        typ: typ.to_string(),
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(&cfg.signing_key),
    )
    .map_err(|e| AuthError::InternalError(e.to_string()))?;
    Ok((token, exp_dt))
}

fn decode_claims(token: &str, validate_exp: bool, cfg: &JwtConfig) -> Result<Claims, AuthError> {
    let mut v = Validation::new(Algorithm::HS256);
    v.validate_exp = validate_exp;
    v.set_audience(&[cfg.audience.clone()]);
    v.set_issuer(&[cfg.issuer.clone()]);
    let data = decode::<Claims>(token, &DecodingKey::from_secret(&cfg.signing_key), &v)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::TokenInvalid,
        })?;
    Ok(data.claims)
}

fn principal_of(claims: Claims, typ: &str) -> Result<PrincipalId, AuthError> {
    if claims.typ != typ || claims.sub.is_empty() {
        return Err(AuthError::TokenInvalid);
    }
    Ok(PrincipalId(claims.sub))
}

/// HS256 JWTs for both halves of the pair. The refresh token carries the
/// principal as a signed `sub` claim so it can be recovered without a lookup.
pub struct JwtHs256Codec {
    cfg: JwtConfig,
}

impl JwtHs256Codec {
    pub fn new(cfg: JwtConfig) -> Self {
        JwtHs256Codec { cfg }
    }
}

#[async_trait::async_trait]
impl TokenCodec for JwtHs256Codec {
    async fn issue_pair(
        &self,
        principal: &PrincipalId,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Result<IssuedPair, AuthError> {
        let (access_token, access_expires_at) =
            encode_claims(principal, TYP_ACCESS, access_ttl, &self.cfg)?;
        let (refresh_token_raw, refresh_expires_at) =
            encode_claims(principal, TYP_REFRESH, refresh_ttl, &self.cfg)?;

        Ok(IssuedPair {
            access_token: AccessToken(access_token),
            access_expires_at,
            refresh_token_raw,
            refresh_expires_at,
        })
    }

    async fn parse_principal(&self, raw_refresh_token: &str) -> Result<PrincipalId, AuthError> {
        let claims = decode_claims(raw_refresh_token, false, &self.cfg)?;
        principal_of(claims, TYP_REFRESH)
    }

    async fn verify_access_token(&self, token: &AccessToken) -> Result<PrincipalId, AuthError> {
        let claims = decode_claims(&token.0, true, &self.cfg)?;
        principal_of(claims, TYP_ACCESS)
    }
}

#[cfg(test)]
pub(crate) fn test_codec() -> JwtHs256Codec {
    JwtHs256Codec::new(JwtConfig {
        issuer: "rotor.test".to_string(),
        audience: "rotor-client".to_string(),
        signing_key: b"test-signing-key".to_vec(),
    })
}
