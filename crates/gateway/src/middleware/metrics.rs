//! Request metrics middleware

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use navalqa_common::metrics::RequestMetrics;

/// Label for requests that hit no route
pub const UNMATCHED_ENDPOINT: &str = "unmatched";

/// Count and time every request by method, route template and status
pub async fn track_metrics(request: Request, next: Next) -> Response {
    let endpoint = endpoint_label(&request);
    let tracker = RequestMetrics::start(request.method().as_str(), &endpoint);
    let response = next.run(request).await;
    tracker.finish(response.status().as_u16());
    response
}

/// Route template the request matched, so label cardinality stays bounded
fn endpoint_label(request: &Request) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ENDPOINT.to_string())
}
