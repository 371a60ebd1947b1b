use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::error;

use super::{cookies, state::AuthState};

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session and remember-me token cleared")
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    if let Some(token) = cookies::extract_session_token(&headers) {
        auth_state.sessions().close(&token);
    }

    if let Some((series_id, secret)) = cookies::extract_remember_token(&headers) {
        if let Err(err) = auth_state
            .gate()
            .revoke_remember_me(&series_id, &secret)
            .await
        {
            error!("Failed to revoke remember-me series: {err}");
        }
    }

    // Always clear the cookies, even if nothing was found server side.
    let mut response_headers = HeaderMap::new();
    cookies::clear_all(&mut response_headers, auth_state.config());
    (StatusCode::NO_CONTENT, response_headers)
}
