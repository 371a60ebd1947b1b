//! Session check with remember-me auto-login.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::{
    cookies::{self, REMEMBER_COOKIE_NAME},
    state::AuthState,
    types::SessionResponse,
};
use crate::seed::{Credential, RedeemOutcome, Validation};

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Session is active (possibly restored from remember-me)", body = SessionResponse),
        (status = 204, description = "No credential presented"),
        (status = 401, description = "Credential rejected; cookies cleared")
    ),
    tag = "auth"
)]
pub async fn session(headers: HeaderMap, auth_state: Extension<Arc<AuthState>>) -> Response {
    if let Some(token) = cookies::extract_session_token(&headers) {
        if let Some(credential) = auth_state.sessions().resolve(&token) {
            return match auth_state.gate().validate_credential(&credential).await {
                Ok(Validation::Accepted(principal)) => (
                    StatusCode::OK,
                    Json(SessionResponse {
                        principal_id: principal.to_string(),
                    }),
                )
                    .into_response(),
                Ok(Validation::Rejected(rejection)) => {
                    debug!(reason = rejection.as_str(), "Session rejected");
                    auth_state.sessions().close(&token);
                    unauthorized(&auth_state)
                }
                Err(err) => {
                    error!("Failed to validate session: {err}");
                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                }
            };
        }
        // Unknown or expired session token: fall back to remember-me.
    }

    match cookies::extract_remember_token(&headers) {
        Some((series_id, secret)) => restore(&auth_state, &series_id, secret).await,
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

/// Redeem a remember-me cookie into a fresh session.
async fn restore(auth_state: &AuthState, series_id: &str, secret: SecretString) -> Response {
    let gate = auth_state.gate();
    let credential = match gate.resolve_remember_me(series_id, secret).await {
        Ok(Some(credential)) => credential,
        Ok(None) => {
            debug!("Remember-me cookie names an unknown series");
            return clear_remember(auth_state);
        }
        Err(err) => {
            error!("Failed to look up remember-me series: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let redemption = match gate.redeem_remember_me(&credential).await {
        Ok(RedeemOutcome::Redeemed(redemption)) => redemption,
        Ok(RedeemOutcome::Rejected(rejection)) => {
            debug!(reason = rejection.as_str(), "Remember-me rejected");
            return clear_remember(auth_state);
        }
        Err(err) => {
            error!("Failed to redeem remember-me token: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let principal_id = redemption.session.principal_id().to_string();
    let token = match auth_state.sessions().open(redemption.session) {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to open session: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut response_headers = HeaderMap::new();
    let config = auth_state.config();
    cookies::append(&mut response_headers, cookies::session_cookie(config, &token));
    if let Some(renewed) = redemption.remember_me.remember_me_token() {
        cookies::append(
            &mut response_headers,
            cookies::remember_cookie(config, renewed, gate.remember_me_ttl_seconds()),
        );
    }
    info!(principal = %principal_id, "Restored session from remember-me");

    (
        StatusCode::OK,
        response_headers,
        Json(SessionResponse { principal_id }),
    )
        .into_response()
}

fn unauthorized(auth_state: &AuthState) -> Response {
    let mut response_headers = HeaderMap::new();
    cookies::clear_all(&mut response_headers, auth_state.config());
    (StatusCode::UNAUTHORIZED, response_headers).into_response()
}

fn clear_remember(auth_state: &AuthState) -> Response {
    let mut response_headers = HeaderMap::new();
    cookies::append(
        &mut response_headers,
        cookies::clear_cookie(auth_state.config(), REMEMBER_COOKIE_NAME),
    );
    (StatusCode::UNAUTHORIZED, response_headers).into_response()
}

/// Resolve and validate the caller's session.
///
/// `Ok(None)` when no session is presented or it no longer validates; a
/// rejected session is closed.
pub(super) async fn authenticate_session(
    headers: &HeaderMap,
    auth_state: &AuthState,
) -> Result<Option<(String, Credential)>, StatusCode> {
    let Some(token) = cookies::extract_session_token(headers) else {
        return Ok(None);
    };
    let Some(credential) = auth_state.sessions().resolve(&token) else {
        return Ok(None);
    };
    match auth_state.gate().validate_credential(&credential).await {
        Ok(Validation::Accepted(_)) => Ok(Some((token, credential))),
        Ok(Validation::Rejected(rejection)) => {
            debug!(reason = rejection.as_str(), "Session rejected");
            auth_state.sessions().close(&token);
            Ok(None)
        }
        Err(err) => {
            error!("Failed to validate session: {err}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
