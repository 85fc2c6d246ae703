use super::error::*;
use crate::application_port::{AuthError, AuthService, AuthTokens};
use crate::domain_model::PrincipalId;
use crate::logger::*;
use crate::server::HttpOptions;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use warp::hyper::body::Bytes;
use warp::{self, reject};

pub const REFRESH_COOKIE_NAME: &str = "refreshToken";
pub const REFRESH_COOKIE_PATH: &str = "/api/v1/auth";

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(code: ApiErrorCode, message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(ApiError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Runs a service call under the per-request deadline.
async fn within<T>(
    options: &HttpOptions,
    call: impl Future<Output = Result<T, AuthError>>,
) -> Result<T, warp::Rejection> {
    tokio::time::timeout(options.request_timeout, call)
        .await
        .map_err(|_| reject::custom(ApiErrorCode::Timeout))?
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)
}

fn refresh_cookie(tokens: &AuthTokens, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path={}; Expires={}; HttpOnly; SameSite=Strict",
        REFRESH_COOKIE_NAME,
        tokens.refresh_token.0,
        REFRESH_COOKIE_PATH,
        tokens
            .refresh_token_expires_at
            .format("%a, %d %b %Y %H:%M:%S GMT"),
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn tokens_reply(tokens: AuthTokens, secure_cookies: bool) -> impl warp::Reply {
    let cookie = refresh_cookie(&tokens, secure_cookies);
    warp::reply::with_header(
        warp::reply::json(&ApiResponse::ok(tokens)),
        warp::http::header::SET_COOKIE,
        cookie,
    )
}

#[derive(Debug, Deserialize)]
pub struct SignInQuery {
    pub guid: Option<String>,
}

pub async fn sign_in(
    query: SignInQuery,
    auth_service: Arc<dyn AuthService>,
    options: HttpOptions,
) -> Result<impl warp::Reply, warp::Rejection> {
    let guid = query
        .guid
        .filter(|guid| !guid.trim().is_empty())
        .ok_or_else(|| reject::custom(ApiErrorCode::MissingParameter))?;

    let tokens = within(&options, auth_service.sign_in(&guid)).await?;
    info!("successfully signed in");

    Ok(tokens_reply(tokens, options.secure_cookies))
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// The cookie wins; the JSON body is only consulted without one.
fn presented_refresh_token(cookie: Option<String>, body: &Bytes) -> Option<String> {
    cookie.filter(|c| !c.is_empty()).or_else(|| {
        serde_json::from_slice::<RefreshRequest>(body)
            .ok()
            .and_then(|req| req.refresh_token)
            .filter(|t| !t.is_empty())
    })
}

pub async fn refresh(
    cookie: Option<String>,
    body: Bytes,
    auth_service: Arc<dyn AuthService>,
    options: HttpOptions,
) -> Result<impl warp::Reply, warp::Rejection> {
    let token = presented_refresh_token(cookie, &body)
        .ok_or_else(|| reject::custom(ApiErrorCode::MissingParameter))?;

    let tokens = within(&options, auth_service.refresh(&token)).await?;
    info!("refresh token rotated");

    Ok(tokens_reply(tokens, options.secure_cookies))
}

#[derive(Debug, Serialize)]
pub struct WhoAmIResponse {
    pub principal_id: PrincipalId,
}

pub async fn whoami(principal_id: PrincipalId) -> Result<impl warp::Reply, warp::Rejection> {
    Ok(warp::reply::json(&ApiResponse::ok(WhoAmIResponse {
        principal_id,
    })))
}
