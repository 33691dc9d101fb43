use axum::{
    body::Body,
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

/// Header carrying the chat platform's update id
pub const UPDATE_ID_HEADER: &str = "x-update-id";

/// Correlation id for one inbound update, stored in request extensions
///
/// Gateways usually forward their own update id; anything else gets a fresh
/// UUID v4.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateId(pub String);

impl UpdateId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UpdateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn from_headers(request: &Request) -> Option<UpdateId> {
    request
        .headers()
        .get(UPDATE_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty() && s.len() <= 128)
        .map(|s| UpdateId(s.to_string()))
}

/// Extracts or generates the update id, exposes it to handlers and echoes it
/// back in the response headers
pub async fn update_id_middleware(mut request: Request, next: Next) -> Response {
    let update_id = from_headers(&request).unwrap_or_else(UpdateId::generate);

    request.extensions_mut().insert(update_id.clone());

    let mut response = next.run(request).await;

    if let Ok(header_value) = HeaderValue::from_str(update_id.as_str()) {
        response.headers_mut().insert(UPDATE_ID_HEADER, header_value);
    }

    response
}

/// Span for `TraceLayer`, tagged with the update id
pub fn make_span_with_update_id(request: &Request<Body>) -> tracing::Span {
    let update_id = request
        .extensions()
        .get::<UpdateId>()
        .map(|id| id.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    tracing::info_span!(
        "chat_update",
        method = %request.method(),
        uri = %request.uri(),
        update_id = %update_id,
    )
}
