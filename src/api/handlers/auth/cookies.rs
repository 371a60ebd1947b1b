//! Cookie transport for session tokens and remember-me series.
//!
//! Cookies never carry a seed. The session cookie holds an opaque token mapped
//! server side to a credential; the remember-me cookie holds
//! `<series_id>.<token_secret>`.

use axum::http::{
    HeaderMap, HeaderValue,
    header::{AUTHORIZATION, COOKIE, InvalidHeaderValue, SET_COOKIE},
};
use secrecy::SecretString;
use tracing::error;

use super::state::AuthConfig;
use crate::seed::RememberMeToken;

pub const SESSION_COOKIE_NAME: &str = "seedgate_session";
pub const REMEMBER_COOKIE_NAME: &str = "seedgate_remember";

fn build(
    config: &AuthConfig,
    name: &str,
    value: &str,
    max_age: i64,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie =
        format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(super) fn session_cookie(
    config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    build(config, SESSION_COOKIE_NAME, token, config.session_ttl_seconds())
}

pub(super) fn remember_cookie(
    config: &AuthConfig,
    token: &RememberMeToken,
    ttl_seconds: i64,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let value = format!("{}.{}", token.series_id(), token.token_secret());
    build(config, REMEMBER_COOKIE_NAME, &value, ttl_seconds)
}

pub(super) fn clear_cookie(
    config: &AuthConfig,
    name: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    build(config, name, "", 0)
}

/// Append a `Set-Cookie` header, logging instead of failing the response.
pub(super) fn append(headers: &mut HeaderMap, cookie: Result<HeaderValue, InvalidHeaderValue>) {
    match cookie {
        Ok(value) => {
            headers.append(SET_COOKIE, value);
        }
        Err(err) => error!("Failed to build cookie: {err}"),
    }
}

/// Clear both cookies.
pub(super) fn clear_all(headers: &mut HeaderMap, config: &AuthConfig) {
    append(headers, clear_cookie(config, SESSION_COOKIE_NAME));
    append(headers, clear_cookie(config, REMEMBER_COOKIE_NAME));
}

/// Session token from `Authorization: Bearer` or the session cookie.
pub(super) fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    extract_bearer_token(headers).or_else(|| read_cookie(headers, SESSION_COOKIE_NAME))
}

/// Remember-me cookie split into series id and token secret.
pub(super) fn extract_remember_token(headers: &HeaderMap) -> Option<(String, SecretString)> {
    let value = read_cookie(headers, REMEMBER_COOKIE_NAME)?;
    let (series_id, secret) = value.split_once('.')?;
    if series_id.is_empty() || secret.is_empty() {
        return None;
    }
    Some((series_id.to_string(), SecretString::from(secret.to_string())))
}

fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
