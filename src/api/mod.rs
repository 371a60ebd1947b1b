use crate::api::handlers::{
    auth::{AuthState, spawn_sweeper},
    health,
};
use anyhow::Result;
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    routing::options,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;
use utoipa_axum::router::OpenApiRouter;
use utoipa_swagger_ui::SwaggerUi;

pub mod handlers;
mod openapi;

pub use openapi::openapi;

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

const REQUEST_ID: &str = "x-request-id";

const SWAGGER_PATH: &str = "/swagger-ui";
const OPENAPI_JSON_PATH: &str = "/api-docs/openapi.json";

fn new_request_id(_request: &Request<Body>) -> Option<HeaderValue> {
    HeaderValue::from_str(&Ulid::new().to_string()).ok()
}

/// Documented routes plus `OPTIONS /health` and Swagger UI, with request ids,
/// tracing and the shared [`AuthState`] layered on.
pub fn app(auth_state: Arc<AuthState>) -> Router {
    let (documented, openapi) = router().split_for_parts();

    let layers = ServiceBuilder::new()
        .layer(SetRequestHeaderLayer::if_not_present(
            HeaderName::from_static(REQUEST_ID),
            new_request_id,
        ))
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
            REQUEST_ID,
        )))
        .layer(TraceLayer::new_for_http().make_span_with(make_span))
        .layer(Extension(auth_state));

    documented
        .route("/health", options(health::health))
        .merge(SwaggerUi::new(SWAGGER_PATH).url(OPENAPI_JSON_PATH, openapi))
        .layer(layers)
}

/// Serve [`app`] on `[::]:port` until ctrl-c, purging expired sessions and
/// remember-me series in the background.
///
/// # Errors
/// Binding the port or serving fails.
pub async fn new(port: u16, auth_state: Arc<AuthState>) -> Result<()> {
    let listener = TcpListener::bind(format!("::0:{port}")).await?;
    info!(port, swagger = SWAGGER_PATH, "seedgate listening");

    let sweeper = spawn_sweeper(auth_state.clone());
    let served = axum::serve(listener, app(auth_state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await;
    sweeper.abort();
    served?;

    info!("seedgate stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown requested, draining connections");
    }
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
