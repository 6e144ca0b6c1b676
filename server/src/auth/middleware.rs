use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::state::AppState;

/// Message returned when a request arrives from an origin that is not allowed.
pub const CORS_REJECTED_MESSAGE: &str = "CORS policy violation";

/// Cross-origin allow-list shared by the HTTP and WebSocket surfaces.
#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    allowed: Vec<String>,
}

impl OriginPolicy {
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: origins
                .into_iter()
                .map(Into::into)
                .map(|o: String| o.trim_end_matches('/').to_string())
                .filter(|o| !o.is_empty())
                .collect(),
        }
    }

    /// Requests without an Origin header (server-to-server) are allowed.
    pub fn is_allowed(&self, origin: Option<&str>) -> bool {
        match origin {
            None => true,
            Some(origin) => self.allowed.iter().any(|allowed| allowed == origin),
        }
    }

    pub fn origins(&self) -> &[String] {
        &self.allowed
    }

    /// CORS response headers for the allowed origins.
    pub fn cors_layer(&self) -> CorsLayer {
        let origins: Vec<HeaderValue> = self
            .allowed
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %o, "Skipping unparseable allowed origin");
                    None
                }
            })
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE])
            .allow_credentials(true)
    }
}

/// Reject requests whose Origin header is not on the allow-list, before they
/// reach any route. For `/ws` this fails the handshake.
pub async fn enforce_origin(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .map(|v| v.to_str().unwrap_or_default().to_string());

    if state.origins.is_allowed(origin.as_deref()) {
        return next.run(req).await;
    }

    tracing::warn!(
        origin = origin.as_deref().unwrap_or_default(),
        path = %req.uri().path(),
        "Rejected request from disallowed origin"
    );
    (
        StatusCode::FORBIDDEN,
        Json(serde_json::json!({ "message": CORS_REJECTED_MESSAGE })),
    )
        .into_response()
}
