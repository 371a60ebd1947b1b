use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, error, info};

use super::{
    cookies,
    state::AuthState,
    types::{LoginRequest, LoginResponse},
};
use crate::seed::{CredentialKind, PrincipalId};

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in; session (and remember-me) cookies set", body = LoginResponse),
        (status = 401, description = "Unknown principal or wrong password")
    ),
    tag = "auth"
)]
pub async fn login(
    auth_state: Extension<Arc<AuthState>>,
    Json(request): Json<LoginRequest>,
) -> Response {
    let principal = PrincipalId::new(request.username.trim());
    let gate = auth_state.gate();

    match gate.authenticate(&principal, &request.password).await {
        Ok(true) => {}
        Ok(false) => {
            debug!(principal = %principal, "Login rejected");
            return StatusCode::UNAUTHORIZED.into_response();
        }
        Err(err) => {
            error!("Failed to authenticate principal: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    let session = match gate.mint_credential(&principal, CredentialKind::Session).await {
        Ok(credential) => credential,
        Err(err) => {
            error!("Failed to mint session credential: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let token = match auth_state.sessions().open(session) {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to open session: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let config = auth_state.config();
    let mut response_headers = HeaderMap::new();
    cookies::append(&mut response_headers, cookies::session_cookie(config, &token));

    if request.remember_me {
        match gate
            .mint_credential(&principal, CredentialKind::RememberMe)
            .await
        {
            Ok(credential) => {
                if let Some(remember) = credential.remember_me_token() {
                    cookies::append(
                        &mut response_headers,
                        cookies::remember_cookie(config, remember, gate.remember_me_ttl_seconds()),
                    );
                }
            }
            Err(err) => {
                error!("Failed to mint remember-me credential: {err}");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        }
    }

    info!(principal = %principal, remember_me = request.remember_me, "Signed in");

    (
        StatusCode::OK,
        response_headers,
        Json(LoginResponse {
            principal_id: principal.to_string(),
            remember_me: request.remember_me,
        }),
    )
        .into_response()
}
