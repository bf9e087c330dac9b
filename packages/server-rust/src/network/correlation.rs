//! Inbound HTTP correlation middleware.
//!
//! For every request the middleware:
//! 1. resolves the request id and server id from the configured headers,
//!    generating or falling back to the instance id as configured,
//! 2. binds both into a fresh task-local [`IdentifierContext`],
//! 3. drains the body so it can be logged, and replays it downstream,
//! 4. mirrors the resolved ids onto the response headers,
//! 5. emits exactly one access-log event under target `http.request`.
//!
//! The access log is emitted by a guard living inside the context scope, so
//! it fires once whether the inner service returns, fails, or is dropped
//! mid-flight. Errors from the inner service pass through untouched.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use bytes::Bytes;
use http::header::HOST;
use http::request::Parts;
use http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use serde_json::{Map, Value};
use tower::{Layer, Service};
use tracelink_core::{ContextStore, CorrelationId, IdentifierContext};
use tracing::Level;

use super::body::{describe_body, drain};
use crate::config::{ConfigError, CorrelationConfig, CorrelationHeaders};

/// Target of the per-request access-log event.
pub const ACCESS_LOG_TARGET: &str = "http.request";

// ---------------------------------------------------------------------------
// CorrelationLayer
// ---------------------------------------------------------------------------

/// Tower layer installing [`CorrelationService`].
///
/// The instance server id is computed once here and shared read-only by every
/// request handled through this layer.
#[derive(Debug, Clone)]
pub struct CorrelationLayer {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    config: CorrelationConfig,
    headers: CorrelationHeaders,
    instance_server_id: Option<CorrelationId>,
}

impl CorrelationLayer {
    /// Validates `config` and fixes the instance server id.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidHeaderName`] if a configured header name
    /// is not a valid HTTP header name.
    pub fn new(config: CorrelationConfig) -> Result<Self, ConfigError> {
        let headers = config.header_names()?;
        let instance_server_id = instance_server_id(&config);
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                headers,
                instance_server_id,
            }),
        })
    }

    /// Server id used when a request carries none.
    #[must_use]
    pub fn instance_server_id(&self) -> Option<&CorrelationId> {
        self.shared.instance_server_id.as_ref()
    }

    /// Validated header names, shared with outbound injection.
    #[must_use]
    pub fn headers(&self) -> &CorrelationHeaders {
        &self.shared.headers
    }
}

fn instance_server_id(config: &CorrelationConfig) -> Option<CorrelationId> {
    if !config.enable_server_id {
        return None;
    }
    // A configured static id wins even when invalid; generation only covers
    // the unset case.
    if let Some(raw) = config.static_server_id.as_deref() {
        let id = CorrelationId::parse(Some(raw));
        if id.is_none() {
            tracing::warn!(static_server_id = raw, "invalid static server id, no instance id is used");
        }
        return id;
    }
    config
        .auto_generate_server_id
        .then(CorrelationId::generate)
}

impl<S> Layer<S> for CorrelationLayer {
    type Service = CorrelationService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CorrelationService {
            inner,
            shared: Arc::clone(&self.shared),
        }
    }
}

// ---------------------------------------------------------------------------
// CorrelationService
// ---------------------------------------------------------------------------

/// Service wrapper binding correlation ids around each request.
#[derive(Debug, Clone)]
pub struct CorrelationService<S> {
    inner: S,
    shared: Arc<Shared>,
}

impl<S, ResBody> Service<Request<Body>> for CorrelationService<S>
where
    S: Service<Request<Body>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        // Keep the instance that was driven to readiness.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let shared = Arc::clone(&self.shared);

        let (parts, body) = request.into_parts();
        let request_id = shared.resolve_request_id(&parts.headers);
        let server_id = shared.resolve_server_id(&parts.headers);
        let context = IdentifierContext::for_request(request_id.clone(), server_id.clone());
        let mut access_log = AccessLog::new(Arc::clone(&shared), &parts);

        Box::pin(ContextStore::scope(context, async move {
            let drained = drain(body).await;
            if drained.disconnected {
                tracing::debug!(
                    received_bytes = drained.bytes.len(),
                    "client disconnected while sending the body"
                );
            }
            if shared.config.log_request_body {
                access_log.body = Some(drained.bytes);
            }

            let request = Request::from_parts(parts, Body::new(drained.replay));
            let mut response = inner.call(request).await?;

            access_log.status = Some(response.status());
            shared.mirror(
                response.headers_mut(),
                request_id.as_ref(),
                server_id.as_ref(),
            );
            Ok(response)
        }))
    }
}

impl Shared {
    fn resolve_request_id(&self, headers: &HeaderMap) -> Option<CorrelationId> {
        if !self.config.enable_request_id {
            return None;
        }
        Some(
            CorrelationId::parse(header_str(headers, &self.headers.request_id))
                .unwrap_or_else(CorrelationId::generate),
        )
    }

    fn resolve_server_id(&self, headers: &HeaderMap) -> Option<CorrelationId> {
        if !self.config.enable_server_id {
            return None;
        }
        CorrelationId::parse(header_str(headers, &self.headers.server_id))
            .or_else(|| self.instance_server_id.clone())
    }

    fn mirror(
        &self,
        headers: &mut HeaderMap,
        request_id: Option<&CorrelationId>,
        server_id: Option<&CorrelationId>,
    ) {
        for (name, id) in [
            (&self.headers.request_id, request_id),
            (&self.headers.server_id, server_id),
        ] {
            if let Some(value) = id.and_then(|id| HeaderValue::from_str(id.as_str()).ok()) {
                headers.insert(name.clone(), value);
            }
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &http::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

// ---------------------------------------------------------------------------
// Access log
// ---------------------------------------------------------------------------

/// Emits the access-log event when dropped.
struct AccessLog {
    shared: Arc<Shared>,
    method: Method,
    url: String,
    body: Option<Bytes>,
    status: Option<StatusCode>,
}

impl AccessLog {
    fn new(shared: Arc<Shared>, parts: &Parts) -> Self {
        Self {
            shared,
            method: parts.method.clone(),
            url: full_url(parts),
            body: None,
            status: None,
        }
    }

    fn payload(&self) -> Value {
        let mut payload = Map::new();
        payload.insert("url".into(), self.url.clone().into());
        if self.shared.config.log_request_body {
            let body = self.body.as_deref().and_then(|bytes| {
                describe_body(bytes, self.shared.config.log_request_body_max_bytes)
            });
            payload.insert("body".into(), body.map_or(Value::Null, Value::String));
        }
        Value::Object(payload)
    }
}

impl Drop for AccessLog {
    fn drop(&mut self) {
        let payload = self.payload();
        let method = self.method.as_str();
        let service_name = self.shared.config.service_name.as_str();
        let status = self.status.map(|status| status.as_u16());

        match level_for_status(self.status) {
            Level::ERROR => tracing::error!(
                target: ACCESS_LOG_TARGET,
                request_method = method,
                service_name,
                status_code = status,
                payload = %payload,
                ""
            ),
            Level::WARN => tracing::warn!(
                target: ACCESS_LOG_TARGET,
                request_method = method,
                service_name,
                status_code = status,
                payload = %payload,
                ""
            ),
            _ => tracing::info!(
                target: ACCESS_LOG_TARGET,
                request_method = method,
                service_name,
                status_code = status,
                payload = %payload,
                ""
            ),
        }
    }
}

/// Access-log severity for a response status.
#[must_use]
pub fn level_for_status(status: Option<StatusCode>) -> Level {
    match status {
        Some(status) if status.is_server_error() => Level::ERROR,
        Some(status) if status.is_client_error() => Level::WARN,
        _ => Level::INFO,
    }
}

/// The request URI if absolute, else rebuilt from the `Host` header.
fn full_url(parts: &Parts) -> String {
    if parts.uri.scheme().is_some() {
        return parts.uri.to_string();
    }
    let path = parts
        .uri
        .path_and_query()
        .map_or("/", http::uri::PathAndQuery::as_str);
    match parts.headers.get(HOST).and_then(|host| host.to_str().ok()) {
        Some(host) => format!("http://{host}{path}"),
        None => path.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::extract::State;
    use axum::routing::{get, post};
    use axum::Router;
    use http_body_util::BodyExt;
    use serde_json::json;
    use tokio::sync::Barrier;
    use tower::ServiceExt;
    use tracelink_core::testing::LogCapture;
    use tracelink_core::LogFormat;

    use super::*;

    fn capture() -> (LogCapture, tracing::subscriber::DefaultGuard) {
        let capture = LogCapture::new();
        let guard = tracing::subscriber::set_default(capture.subscriber(LogFormat::Request, None));
        (capture, guard)
    }

    fn access_lines(capture: &LogCapture) -> Vec<Value> {
        capture
            .lines()
            .into_iter()
            .filter(|line| line.get("request_method").is_some())
            .collect()
    }

    async fn echo(body: Bytes) -> Bytes {
        tracing::info!("handling request");
        body
    }

    fn app(config: CorrelationConfig) -> Router {
        Router::new()
            .route("/echo", post(echo))
            .route("/ping", get(|| async { "pong" }))
            .route("/missing", get(|| async { StatusCode::NOT_FOUND }))
            .route("/broken", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .layer(CorrelationLayer::new(config).unwrap())
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(HOST, "testserver")
            .body(Body::empty())
            .unwrap()
    }

    fn header(response: &Response<Body>, name: &str) -> Option<String> {
        response
            .headers()
            .get(name)
            .map(|value| value.to_str().unwrap().to_owned())
    }

    #[tokio::test]
    async fn generates_ids_and_logs_them() {
        let (capture, _guard) = capture();

        let response = app(CorrelationConfig::default())
            .oneshot(get_request("/ping?x=1"))
            .await
            .unwrap();

        let request_id = header(&response, "x-request-uuid").unwrap();
        let server_id = header(&response, "x-server-uuid").unwrap();
        assert_ne!(request_id, server_id);
        assert_eq!(CorrelationId::parse(Some(&request_id)).unwrap().as_str(), request_id);
        assert_eq!(CorrelationId::parse(Some(&server_id)).unwrap().as_str(), server_id);

        let lines = access_lines(&capture);
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert_eq!(line["uuid"], request_id.as_str());
        assert_eq!(line["uuid_server"], server_id.as_str());
        assert_eq!(line["request_method"], "GET");
        assert_eq!(line["service_name"], "WEB");
        assert_eq!(line["level"], "INFO");
        assert_eq!(line["status_code"], 200);
        assert_eq!(line["payload"], json!({"url": "http://testserver/ping?x=1", "body": null}));
        assert!(line.get("message").is_none());
    }

    #[tokio::test]
    async fn echoes_incoming_request_id() {
        let (capture, _guard) = capture();
        let incoming = CorrelationId::generate();

        let request = Request::builder()
            .uri("/ping")
            .header("X-Request-UUID", incoming.as_str())
            .body(Body::empty())
            .unwrap();
        let response = app(CorrelationConfig::default()).oneshot(request).await.unwrap();

        assert_eq!(header(&response, "x-request-uuid").as_deref(), Some(incoming.as_str()));
        assert_eq!(access_lines(&capture)[0]["uuid"], incoming.as_str());
    }

    #[tokio::test]
    async fn invalid_incoming_id_is_replaced() {
        let (capture, _guard) = capture();
        let request = Request::builder()
            .uri("/ping")
            .header("X-Request-UUID", "not-a-uuid")
            .body(Body::empty())
            .unwrap();

        let response = app(CorrelationConfig::default()).oneshot(request).await.unwrap();

        let request_id = header(&response, "x-request-uuid").unwrap();
        assert_ne!(request_id, "not-a-uuid");
        assert!(CorrelationId::parse(Some(&request_id)).is_some());
        assert_eq!(access_lines(&capture)[0]["uuid"], request_id.as_str());
    }

    #[tokio::test]
    async fn disabled_server_id_is_neither_mirrored_nor_logged() {
        let (capture, _guard) = capture();
        let config = CorrelationConfig {
            enable_server_id: false,
            ..CorrelationConfig::default()
        };

        let response = app(config).oneshot(get_request("/ping")).await.unwrap();

        assert!(header(&response, "x-server-uuid").is_none());
        assert!(header(&response, "x-request-uuid").is_some());
        assert!(access_lines(&capture)[0].get("uuid_server").is_none());
    }

    #[tokio::test]
    async fn disabled_request_id_is_neither_mirrored_nor_logged() {
        let (capture, _guard) = capture();
        let config = CorrelationConfig {
            enable_request_id: false,
            ..CorrelationConfig::default()
        };

        let response = app(config).oneshot(get_request("/ping")).await.unwrap();

        assert!(header(&response, "x-request-uuid").is_none());
        assert!(access_lines(&capture)[0].get("uuid").is_none());
    }

    #[tokio::test]
    async fn instance_server_id_is_stable_across_requests() {
        let _capture = capture();
        let layer = CorrelationLayer::new(CorrelationConfig::default()).unwrap();
        let expected = layer.instance_server_id().unwrap().to_string();
        let router = Router::new().route("/ping", get(|| async { "pong" })).layer(layer);

        for _ in 0..2 {
            let response = router.clone().oneshot(get_request("/ping")).await.unwrap();
            assert_eq!(header(&response, "x-server-uuid").as_deref(), Some(expected.as_str()));
        }
    }

    #[tokio::test]
    async fn incoming_server_id_overrides_instance_id() {
        let _capture = capture();
        let incoming = CorrelationId::generate();
        let request = Request::builder()
            .uri("/ping")
            .header("X-Server-UUID", incoming.as_str().to_uppercase())
            .body(Body::empty())
            .unwrap();

        let response = app(CorrelationConfig::default()).oneshot(request).await.unwrap();

        assert_eq!(header(&response, "x-server-uuid").as_deref(), Some(incoming.as_str()));
    }

    #[test]
    fn static_server_id_is_preferred_and_validated() {
        let fixed = CorrelationId::generate();
        let layer = CorrelationLayer::new(CorrelationConfig {
            static_server_id: Some(fixed.to_string()),
            ..CorrelationConfig::default()
        })
        .unwrap();
        assert_eq!(layer.instance_server_id(), Some(&fixed));

        let layer = CorrelationLayer::new(CorrelationConfig {
            static_server_id: Some("bogus".into()),
            ..CorrelationConfig::default()
        })
        .unwrap();
        assert!(layer.instance_server_id().is_none());
    }

    #[tokio::test]
    async fn invalid_static_server_id_leaves_responses_without_server_id() {
        let (capture, _guard) = capture();
        let config = CorrelationConfig {
            static_server_id: Some("not-a-uuid".into()),
            ..CorrelationConfig::default()
        };

        let response = app(config.clone()).oneshot(get_request("/ping")).await.unwrap();
        assert!(header(&response, "x-server-uuid").is_none());
        assert!(header(&response, "x-request-uuid").is_some());
        assert!(access_lines(&capture)[0].get("uuid_server").is_none());

        let incoming = CorrelationId::generate();
        let request = Request::builder()
            .uri("/ping")
            .header("X-Server-UUID", incoming.as_str())
            .body(Body::empty())
            .unwrap();
        let response = app(config).oneshot(request).await.unwrap();
        assert_eq!(header(&response, "x-server-uuid").as_deref(), Some(incoming.as_str()));
    }

    #[test]
    fn invalid_header_name_is_rejected() {
        let result = CorrelationLayer::new(CorrelationConfig {
            server_id_header: "bad header".into(),
            ..CorrelationConfig::default()
        });
        assert!(matches!(result, Err(ConfigError::InvalidHeaderName { .. })));
    }

    #[tokio::test]
    async fn custom_header_names_are_used_both_ways() {
        let _capture = capture();
        let incoming = CorrelationId::generate();
        let config = CorrelationConfig {
            request_id_header: "X-Trace".into(),
            ..CorrelationConfig::default()
        };
        let request = Request::builder()
            .uri("/ping")
            .header("x-trace", incoming.as_str())
            .body(Body::empty())
            .unwrap();

        let response = app(config).oneshot(request).await.unwrap();

        assert_eq!(header(&response, "x-trace").as_deref(), Some(incoming.as_str()));
        assert!(header(&response, "x-request-uuid").is_none());
    }

    #[tokio::test]
    async fn long_body_is_truncated_in_log_but_not_downstream() {
        let (capture, _guard) = capture();
        let config = CorrelationConfig {
            log_request_body_max_bytes: 8,
            ..CorrelationConfig::default()
        };
        let body = "0123456789abcdefghij";
        let request = Request::builder()
            .method(Method::POST)
            .uri("/echo")
            .body(Body::from(body))
            .unwrap();

        let response = app(config).oneshot(request).await.unwrap();
        let echoed = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&echoed[..], body.as_bytes());

        let line = &access_lines(&capture)[0];
        assert_eq!(line["payload"]["body"], "01234567<truncated length=20 bytes>");
    }

    #[tokio::test]
    async fn body_is_omitted_when_logging_disabled() {
        let (capture, _guard) = capture();
        let config = CorrelationConfig {
            log_request_body: false,
            ..CorrelationConfig::default()
        };
        let request = Request::builder()
            .method(Method::POST)
            .uri("/echo")
            .body(Body::from("secret"))
            .unwrap();

        let response = app(config).oneshot(request).await.unwrap();
        let echoed = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&echoed[..], b"secret");

        let payload = &access_lines(&capture)[0]["payload"];
        assert!(payload.get("body").is_none());
        assert_eq!(payload["url"], "/echo");
    }

    #[tokio::test]
    async fn handler_logs_carry_the_request_ids() {
        let (capture, _guard) = capture();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/echo")
            .body(Body::from("{}"))
            .unwrap();

        let response = app(CorrelationConfig::default()).oneshot(request).await.unwrap();
        let request_id = header(&response, "x-request-uuid").unwrap();

        let inside = capture.lines_where("message", "handling request");
        assert_eq!(inside.len(), 1);
        assert_eq!(inside[0]["uuid"], request_id.as_str());
        assert!(ContextStore::request_id().is_none());
    }

    #[tokio::test]
    async fn severity_follows_status() {
        let (capture, _guard) = capture();
        let router = app(CorrelationConfig::default());

        router.clone().oneshot(get_request("/missing")).await.unwrap();
        router.oneshot(get_request("/broken")).await.unwrap();

        let lines = access_lines(&capture);
        assert_eq!(lines[0]["level"], "WARNING");
        assert_eq!(lines[0]["status_code"], 404);
        assert_eq!(lines[1]["level"], "ERROR");
    }

    #[test]
    fn level_for_status_boundaries() {
        assert_eq!(level_for_status(None), Level::INFO);
        assert_eq!(level_for_status(Some(StatusCode::FOUND)), Level::INFO);
        assert_eq!(level_for_status(Some(StatusCode::BAD_REQUEST)), Level::WARN);
        assert_eq!(level_for_status(Some(StatusCode::INTERNAL_SERVER_ERROR)), Level::ERROR);
    }

    #[tokio::test]
    async fn inner_errors_pass_through_and_are_still_logged() {
        let (capture, _guard) = capture();
        let failing = tower::service_fn(|_request: Request<Body>| async {
            Err::<Response<Body>, _>(io::Error::other("handler exploded"))
        });
        let service = CorrelationLayer::new(CorrelationConfig::default())
            .unwrap()
            .layer(failing);

        let error = service.oneshot(get_request("/ping")).await.unwrap_err();
        assert_eq!(error.to_string(), "handler exploded");

        let lines = access_lines(&capture);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["level"], "INFO");
        assert!(lines[0].get("status_code").is_none());
        assert!(lines[0]["uuid"].is_string());
        assert!(ContextStore::request_id().is_none());
    }

    #[tokio::test]
    async fn cancelled_request_is_logged_once_inside_its_scope() {
        let (capture, _guard) = capture();
        let stuck = tower::service_fn(|_request: Request<Body>| async {
            std::future::pending::<Result<Response<Body>, io::Error>>().await
        });
        let service = CorrelationLayer::new(CorrelationConfig::default())
            .unwrap()
            .layer(stuck);
        let incoming = CorrelationId::generate();
        let request = Request::builder()
            .uri("/ping")
            .header("X-Request-UUID", incoming.as_str())
            .body(Body::empty())
            .unwrap();

        let outcome = tokio::time::timeout(Duration::from_millis(20), service.oneshot(request)).await;
        assert!(outcome.is_err());

        let lines = access_lines(&capture);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["uuid"], incoming.as_str());
        assert!(lines[0].get("status_code").is_none());
    }

    #[tokio::test]
    async fn interleaved_requests_do_not_share_ids() {
        let (capture, _guard) = capture();
        let barrier = Arc::new(Barrier::new(2));
        let router = Router::new()
            .route(
                "/wait",
                post(|State(barrier): State<Arc<Barrier>>, body: Bytes| async move {
                    tracing::info!(phase = "before", "waiting");
                    barrier.wait().await;
                    tokio::task::yield_now().await;
                    tracing::info!(phase = "after", "resumed");
                    body
                }),
            )
            .with_state(barrier)
            .layer(CorrelationLayer::new(CorrelationConfig::default()).unwrap());

        let first = CorrelationId::generate();
        let second = CorrelationId::generate();
        let call = |id: &CorrelationId| {
            router.clone().oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/wait")
                    .header("X-Request-UUID", id.as_str())
                    .body(Body::from(id.to_string()))
                    .unwrap(),
            )
        };

        let (a, b) = tokio::join!(call(&first), call(&second));
        a.unwrap();
        b.unwrap();

        for line in capture.lines() {
            let uuid = line["uuid"].as_str().unwrap();
            assert!(uuid == first.as_str() || uuid == second.as_str());
            if let Some(body) = line["payload"]["body"].as_str() {
                assert_eq!(body, uuid);
            }
        }
        assert_eq!(capture.lines_where("uuid", first.as_str()).len(), 3);
        assert_eq!(capture.lines_where("uuid", second.as_str()).len(), 3);
    }

    /// Body that yields the first half of `id`, waits on `gate`, then yields
    /// the rest, so two such bodies can only finish draining together.
    fn gated_body(id: &CorrelationId, gate: Arc<Barrier>) -> Body {
        use http_body::Frame;
        use http_body_util::StreamBody;

        let text = id.to_string();
        let (head, tail) = text.split_at(text.len() / 2);
        let halves = vec![head.to_owned(), tail.to_owned()];
        let chunks = futures_util::stream::unfold((0, halves, gate), |(step, halves, gate)| async move {
            if step == halves.len() {
                return None;
            }
            if step > 0 {
                gate.wait().await;
            }
            let frame = Frame::data(Bytes::from(halves[step].clone()));
            Some((Ok::<_, io::Error>(frame), (step + 1, halves, gate)))
        });
        Body::new(StreamBody::new(chunks))
    }

    #[tokio::test]
    async fn interleaved_body_draining_keeps_ids_apart() {
        let (capture, _guard) = capture();
        let gate = Arc::new(Barrier::new(2));
        let router = app(CorrelationConfig::default());

        let first = CorrelationId::generate();
        let second = CorrelationId::generate();
        let call = |id: &CorrelationId| {
            router.clone().oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/echo")
                    .header("X-Request-UUID", id.as_str())
                    .body(gated_body(id, Arc::clone(&gate)))
                    .unwrap(),
            )
        };

        let (a, b) = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(call(&first), call(&second))
        })
        .await
        .expect("both bodies drain concurrently");

        for (response, id) in [(a.unwrap(), &first), (b.unwrap(), &second)] {
            assert_eq!(header(&response, "x-request-uuid").as_deref(), Some(id.as_str()));
            let echoed = response.into_body().collect().await.unwrap().to_bytes();
            assert_eq!(echoed, id.as_str().as_bytes());
        }

        let access = access_lines(&capture);
        assert_eq!(access.len(), 2);
        for line in &access {
            assert_eq!(line["payload"]["body"], line["uuid"]);
        }
        for id in [&first, &second] {
            let lines = capture.lines_where("uuid", id.as_str());
            assert_eq!(lines.len(), 2);
            assert!(lines.iter().any(|line| line["message"] == "handling request"));
        }
    }

    #[test]
    fn full_url_prefers_absolute_uri() {
        let (parts, ()) = Request::builder()
            .uri("https://api.test/v1/items?page=2")
            .header(HOST, "ignored")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(full_url(&parts), "https://api.test/v1/items?page=2");

        let (parts, ()) = Request::builder()
            .uri("/v1/items")
            .header(HOST, "svc:8080")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(full_url(&parts), "http://svc:8080/v1/items");
    }
}
