//! Request authentication for both surfaces.
//!
//! The JSON API authenticates every call with `Authorization: <scheme> <token>`.
//! Pages authenticate with a signed session cookie that points into the
//! in-memory [`SessionStore`](super::state::SessionStore).

use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, Uri};
use axum_extra::extract::cookie::{Cookie, SameSite, SignedCookieJar};
use tracing::{debug, warn};

use crate::db::UserRepository;
use crate::user::User;

use super::error::{ApiError, PageError};
use super::state::AppState;

pub const SESSION_COOKIE: &str = "cafe_atlas_session";

const TOKEN_MISSING: &str = "Token is missing!";
const TOKEN_MALFORMED: &str = "Token format is invalid!";

/// Second whitespace-separated part of the `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let Some(raw) = headers.get(AUTHORIZATION) else {
        return Err(ApiError::Unauthorized(TOKEN_MISSING));
    };
    let raw = raw
        .to_str()
        .map_err(|_| ApiError::BadRequest(TOKEN_MALFORMED))?;
    let token = raw
        .split(' ')
        .nth(1)
        .ok_or(ApiError::BadRequest(TOKEN_MALFORMED))?;
    if token.is_empty() {
        return Err(ApiError::Unauthorized(TOKEN_MISSING));
    }
    Ok(token)
}

/// Resolve the API caller from its bearer token.
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<User, ApiError> {
    let token = bearer_token(headers)?;
    let claims = state.tokens.verify(token).map_err(|err| {
        debug!(error = %err, "token rejected");
        ApiError::from(err)
    })?;

    let user = UserRepository::new(&state.pool)
        .get(claims.user_id)
        .await?
        .ok_or(ApiError::Unauthorized("User not found!"))?;
    debug!(user_id = user.id, "authorized request using token");
    Ok(user)
}

pub fn ensure_admin(user: &User) -> Result<(), ApiError> {
    if user.is_admin {
        return Ok(());
    }
    warn!(user_id = user.id, "admin route refused");
    Err(ApiError::Forbidden(
        "Access forbidden: Admin privileges required!",
    ))
}

/// The user behind the session cookie, if the session is still live.
pub async fn session_user(
    state: &AppState,
    jar: &SignedCookieJar,
) -> Result<Option<User>, ApiError> {
    let Some(user_id) = jar
        .get(SESSION_COOKIE)
        .and_then(|cookie| state.sessions.get(cookie.value()))
    else {
        return Ok(None);
    };
    Ok(UserRepository::new(&state.pool).get(user_id).await?)
}

/// Like [`session_user`], but anonymous visitors are sent to the login page.
pub async fn require_login(
    state: &AppState,
    jar: &SignedCookieJar,
    uri: &Uri,
) -> Result<User, PageError> {
    session_user(state, jar).await?.ok_or_else(|| {
        let next = uri
            .path_and_query()
            .map_or_else(|| uri.path().to_string(), |pq| pq.as_str().to_string());
        PageError::LoginRequired { next }
    })
}

pub fn ensure_page_admin(user: &User) -> Result<(), PageError> {
    if user.is_admin {
        return Ok(());
    }
    warn!(user_id = user.id, "admin page refused");
    Err(ApiError::Forbidden("Access denied! Admin privileges required.").into())
}

/// Open a session for `user_id` and attach its cookie. Remembered sessions get a
/// persistent cookie; others end with the browser session.
pub fn start_session(
    state: &AppState,
    jar: SignedCookieJar,
    user_id: i64,
    remember: bool,
) -> SignedCookieJar {
    let token = state.sessions.create(user_id, remember);
    let mut cookie = Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.secure_cookies)
        .build();
    if remember {
        let seconds = i64::try_from(state.sessions.ttl(true).as_secs()).unwrap_or(i64::MAX);
        cookie.set_max_age(cookie::time::Duration::seconds(seconds));
    }
    jar.add(cookie)
}

pub fn end_session(state: &AppState, jar: SignedCookieJar) -> SignedCookieJar {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.remove(cookie.value());
    }
    jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
}

/// Accept only same-site relative paths as post-login redirect targets.
pub fn local_redirect(target: Option<&str>) -> Option<&str> {
    target
        .map(str::trim)
        .filter(|t| t.starts_with('/') && !t.starts_with("//") && !t.contains('\\'))
}
