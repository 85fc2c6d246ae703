use super::error::*;
use super::handler::{self, REFRESH_COOKIE_NAME, SignInQuery};
use crate::application_port::AuthService;
use crate::domain_model::PrincipalId;
use crate::server::*;
use futures_util::{Stream, TryStreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use warp::hyper::body::{Buf, Bytes};
use warp::{Filter, http, reject};

const MAX_BODY_BYTES: u64 = 16 * 1024;

pub fn routes(
    server: Arc<Server>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    // path before method, so an unknown path is a 404 rather than a 405
    let sign_in = warp::path("auth")
        .and(warp::path("signIn"))
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<SignInQuery>())
        .and(with(server.auth_service.clone()))
        .and(with_options(server.http.clone()))
        .and_then(handler::sign_in);

    let refresh = warp::path("auth")
        .and(warp::path("refresh"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::cookie::optional::<String>(REFRESH_COOKIE_NAME))
        .and(bounded_body())
        .and(with(server.auth_service.clone()))
        .and(with_options(server.http.clone()))
        .and_then(handler::refresh);

    let whoami = warp::path("auth")
        .and(warp::path("whoami"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_verification(server.auth_service.clone()))
        .and_then(handler::whoami);

    sign_in.or(refresh).or(whoami)
}

fn with<ServiceType>(
    service: Arc<ServiceType>,
) -> impl Filter<Extract = (Arc<ServiceType>,), Error = Infallible> + Clone
where
    ServiceType: Send + Sync + ?Sized,
{
    warp::any().map(move || service.clone())
}

/// The request body, capped at `MAX_BODY_BYTES`. A declared `content-length`
/// over the cap is refused up front; otherwise the stream is read until it
/// ends or crosses the cap, so chunked uploads are bounded too. A bodyless
/// POST carrying only the cookie yields empty bytes.
fn bounded_body() -> impl Filter<Extract = (Bytes,), Error = warp::Rejection> + Clone {
    warp::header::optional::<u64>("content-length")
        .and(warp::body::stream())
        .and_then(read_bounded)
}

async fn read_bounded<S, B>(length: Option<u64>, body: S) -> Result<Bytes, warp::Rejection>
where
    S: Stream<Item = Result<B, warp::Error>>,
    B: Buf,
{
    if length.is_some_and(|length| length > MAX_BODY_BYTES) {
        return Err(reject::custom(ApiErrorCode::PayloadTooLarge));
    }

    let mut body = std::pin::pin!(body);
    let mut collected = Vec::new();
    while let Some(mut chunk) = body
        .try_next()
        .await
        .map_err(|_| reject::custom(ApiErrorCode::MalformedInput))?
    {
        if (collected.len() + chunk.remaining()) as u64 > MAX_BODY_BYTES {
            return Err(reject::custom(ApiErrorCode::PayloadTooLarge));
        }
        while chunk.has_remaining() {
            let part = chunk.chunk();
            let n = part.len();
            collected.extend_from_slice(part);
            chunk.advance(n);
        }
    }

    Ok(Bytes::from(collected))
}

fn with_options(
    options: HttpOptions,
) -> impl Filter<Extract = (HttpOptions,), Error = Infallible> + Clone {
    warp::any().map(move || options.clone())
}

fn with_verification(
    auth_service: Arc<dyn AuthService>,
) -> impl Filter<Extract = (PrincipalId,), Error = warp::Rejection> + Clone {
    warp::header::<String>(http::header::AUTHORIZATION.as_ref()).and_then(move |token: String| {
        let auth_service = auth_service.clone();
        async move {
            if let Some(token) = token.strip_prefix("Bearer ") {
                let principal_id = auth_service
                    .verify_token(token)
                    .await
                    .map_err(ApiErrorCode::from)
                    .map_err(reject::custom)?;
                Ok(principal_id)
            } else {
                Err(reject::custom(ApiErrorCode::InvalidToken))
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::{ApiErrorCode, Bytes, read_bounded};
    use crate::api;
    use crate::application_impl::*;
    use crate::application_port::AuthService;
    use crate::domain_port::SystemClock;
    use crate::infra_memory::{MemoryPrincipalRepo, MemoryRefreshSessionStore};
    use crate::server::{HttpOptions, Server};
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;
    use warp::http::StatusCode;
    use warp::http::header::SET_COOKIE;

    const GUID: &str = "a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11";

    fn server() -> Arc<Server> {
        let sessions = Arc::new(RealRefreshSessionService::new(
            Arc::new(MemoryRefreshSessionStore::new()),
            Arc::new(cheap_hasher()),
            Arc::new(SystemClock),
            3,
        ));
        let auth_service: Arc<dyn AuthService> = Arc::new(RealAuthService::new(
            Arc::new(MemoryPrincipalRepo::with_principals([GUID])),
            sessions,
            Arc::new(test_codec()),
            TokenTtls {
                access_ttl: Duration::from_secs(60),
                refresh_ttl: Duration::from_secs(3600),
            },
        ));
        Arc::new(Server::from_parts(
            auth_service,
            HttpOptions {
                request_timeout: Duration::from_secs(5),
                secure_cookies: false,
            },
        ))
    }

    fn json(body: &[u8]) -> Value {
        serde_json::from_slice(body).unwrap()
    }

    fn refresh_token_of(body: &[u8]) -> String {
        json(body)["data"]["refresh_token"]
            .as_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn sign_in_returns_tokens_and_cookie() {
        let api = api::routes(server());
        let res = warp::test::request()
            .method("GET")
            .path(&format!("/api/v1/auth/signIn?guid={GUID}"))
            .reply(&api)
            .await;

        assert_eq!(res.status(), StatusCode::OK);
        let body = json(res.body());
        assert_eq!(body["success"], true);
        assert!(body["data"]["access_token"].is_string());

        let cookie = res.headers()[SET_COOKIE].to_str().unwrap();
        let token = refresh_token_of(res.body());
        assert!(cookie.starts_with(&format!("refreshToken={token};")));
        assert!(cookie.contains("HttpOnly"));
        assert!(!cookie.contains("Secure"));
    }

    #[tokio::test]
    async fn sign_in_rejects_missing_and_unknown_guid() {
        let api = api::routes(server());

        let res = warp::test::request()
            .method("GET")
            .path("/api/v1/auth/signIn")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(res.body())["error"]["code"], "MissingParameter");

        let res = warp::test::request()
            .method("GET")
            .path("/api/v1/auth/signIn?guid=nope")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json(res.body())["error"]["code"], "WrongCredentials");
    }

    #[tokio::test]
    async fn refresh_by_cookie_then_replay_fails() {
        let api = api::routes(server());
        let res = warp::test::request()
            .method("GET")
            .path(&format!("/api/v1/auth/signIn?guid={GUID}"))
            .reply(&api)
            .await;
        let token = refresh_token_of(res.body());

        let res = warp::test::request()
            .method("POST")
            .path("/api/v1/auth/refresh")
            .header("cookie", format!("refreshToken={token}"))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_ne!(refresh_token_of(res.body()), token);

        let res = warp::test::request()
            .method("POST")
            .path("/api/v1/auth/refresh")
            .header("cookie", format!("refreshToken={token}"))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn refresh_by_json_body() {
        let api = api::routes(server());
        let res = warp::test::request()
            .method("GET")
            .path(&format!("/api/v1/auth/signIn?guid={GUID}"))
            .reply(&api)
            .await;
        let token = refresh_token_of(res.body());

        let res = warp::test::request()
            .method("POST")
            .path("/api/v1/auth/refresh")
            .json(&serde_json::json!({ "refresh_token": token }))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().contains_key(SET_COOKIE));
    }

    #[tokio::test]
    async fn refresh_input_problems_are_bad_requests() {
        let api = api::routes(server());

        let res = warp::test::request()
            .method("POST")
            .path("/api/v1/auth/refresh")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(res.body())["error"]["code"], "MissingParameter");

        let res = warp::test::request()
            .method("POST")
            .path("/api/v1/auth/refresh")
            .json(&serde_json::json!({ "refresh_token": "not-valid-base64!!" }))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(res.body())["error"]["code"], "MalformedInput");
    }

    #[tokio::test]
    async fn whoami_needs_a_valid_access_token() {
        let api = api::routes(server());
        let res = warp::test::request()
            .method("GET")
            .path(&format!("/api/v1/auth/signIn?guid={GUID}"))
            .reply(&api)
            .await;
        let access = json(res.body())["data"]["access_token"]
            .as_str()
            .unwrap()
            .to_string();

        let res = warp::test::request()
            .method("GET")
            .path("/api/v1/auth/whoami")
            .header("authorization", format!("Bearer {access}"))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(json(res.body())["data"]["principal_id"], GUID);

        let res = warp::test::request()
            .method("GET")
            .path("/api/v1/auth/whoami")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = warp::test::request()
            .method("GET")
            .path("/api/v1/auth/whoami")
            .header("authorization", "Bearer garbage")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn oversized_body_is_refused() {
        let api = api::routes(server());
        let res = warp::test::request()
            .method("POST")
            .path("/api/v1/auth/refresh")
            .body(vec![b'x'; 32 * 1024])
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn unsized_body_over_the_limit_is_refused() {
        // chunked transfer: no content-length, only the stream
        let chunks = (0..4).map(|_| Ok::<_, warp::Error>(Bytes::from(vec![b'x'; 8 * 1024])));
        let err = read_bounded(None, futures_util::stream::iter(chunks))
            .await
            .unwrap_err();
        assert_eq!(
            err.find::<ApiErrorCode>(),
            Some(&ApiErrorCode::PayloadTooLarge)
        );

        let chunks = (0..2).map(|_| Ok::<_, warp::Error>(Bytes::from(vec![b'x'; 4 * 1024])));
        let body = read_bounded(None, futures_util::stream::iter(chunks))
            .await
            .unwrap();
        assert_eq!(body.len(), 8 * 1024);

        let empty = futures_util::stream::iter(Vec::<Result<Bytes, warp::Error>>::new());
        assert!(read_bounded(None, empty).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let api = api::routes(server());
        let res = warp::test::request()
            .method("GET")
            .path("/api/v1/nothing-here")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
