//! HTTP middleware stack for the `tracelink` server.
//!
//! Middleware ordering follows the outer-to-inner convention: the first
//! layer listed is the outermost (processes the request first on the way
//! in, and the response last on the way out).

use axum::http::{Method, StatusCode};
use tower::layer::util::{Identity, Stack};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;

use super::config::NetworkConfig;
use super::correlation::CorrelationLayer;

/// The composed Tower layer type produced by [`build_http_layers`].
type HttpLayers = Stack<TimeoutLayer, Stack<CorsLayer, Stack<CorrelationLayer, Identity>>>;

/// Builds the HTTP-level Tower middleware stack.
///
/// **Middleware ordering (outermost to innermost):**
/// 1. `Correlation` -- binds request/server ids, mirrors them, writes the access log
/// 2. `CORS` -- Cross-Origin Resource Sharing based on configured origins
/// 3. `Timeout` -- enforces a maximum request processing duration
///
/// Correlation sits outermost so CORS preflight answers and timeouts are
/// logged and carry the ids like any other response.
#[must_use]
pub fn build_http_layers(config: &NetworkConfig, correlation: CorrelationLayer) -> HttpLayers {
    ServiceBuilder::new()
        .layer(correlation)
        .layer(build_cors_layer(config))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ))
        .into_inner()
}

/// Builds the CORS layer from the configured list of allowed origins.
///
/// A wildcard `"*"` in the origins list allows any origin. Otherwise,
/// each origin string is parsed and added to an explicit allowlist.
/// Correlation headers are exposed so browser clients can read them.
fn build_cors_layer(config: &NetworkConfig) -> CorsLayer {
    let allow_origin = if config.allows_any_origin() {
        AllowOrigin::any()
    } else {
        let parsed: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers(Any)
        .expose_headers(Any)
}
