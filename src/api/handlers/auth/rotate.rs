use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::error;

use super::{
    cookies::{self, REMEMBER_COOKIE_NAME, SESSION_COOKIE_NAME},
    session::authenticate_session,
    state::AuthState,
    types::RotateResponse,
};

/// Log out every other device by rotating the caller's seed.
#[utoipa::path(
    post,
    path = "/v1/auth/seed/rotate",
    responses(
        (status = 200, description = "Seed rotated; earlier credentials are dead", body = RotateResponse),
        (status = 401, description = "No valid session")
    ),
    tag = "auth"
)]
pub async fn rotate_seed(headers: HeaderMap, auth_state: Extension<Arc<AuthState>>) -> Response {
    let (token, credential) = match authenticate_session(&headers, &auth_state).await {
        Ok(Some(session)) => session,
        Ok(None) => return StatusCode::UNAUTHORIZED.into_response(),
        Err(status) => return status.into_response(),
    };

    let principal = credential.principal_id().clone();
    let rotation = match auth_state
        .gate()
        .rotate_seed_for(&principal, &credential)
        .await
    {
        Ok(rotation) => rotation,
        Err(err) => {
            error!("Failed to rotate seed: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let config = auth_state.config();
    let mut response_headers = HeaderMap::new();
    // Every remember-me series of the principal was purged.
    cookies::append(
        &mut response_headers,
        cookies::clear_cookie(config, REMEMBER_COOKIE_NAME),
    );

    let session_kept = match rotation.reminted {
        Some(reminted) => auth_state.sessions().replace(&token, reminted),
        None => false,
    };
    if !session_kept {
        auth_state.sessions().close(&token);
        cookies::append(
            &mut response_headers,
            cookies::clear_cookie(config, SESSION_COOKIE_NAME),
        );
    }

    (
        StatusCode::OK,
        response_headers,
        Json(RotateResponse {
            principal_id: principal.to_string(),
            rotated_at: rotation.record.last_rotated_at_unix,
            remint_policy: auth_state.gate().remint_policy(),
            session_kept,
        }),
    )
        .into_response()
}
