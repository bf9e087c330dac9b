//! Outbound HTTP correlation.
//!
//! Calls this service makes to other services carry the active request id
//! (or, inside a job, the job id) and the server id. Injection never replaces
//! a header the caller already set, and it composes with other request hooks:
//! [`TracedClientBuilder::build`] appends the correlation hook after every
//! user hook, so explicit values always win.

use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use http::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{IntoUrl, Method, RequestBuilder, Response};
use serde::Serialize;
use tower::{Layer, Service};
use tracelink_core::IdentifierContext;

use crate::config::CorrelationHeaders;

/// Sets correlation headers from `context` on `headers`, leaving any header
/// that is already present untouched.
pub fn apply_correlation_headers(
    headers: &mut HeaderMap,
    names: &CorrelationHeaders,
    context: &IdentifierContext,
) {
    for (name, id) in [
        (&names.request_id, context.outbound_request_id()),
        (&names.server_id, context.server_id.as_ref()),
    ] {
        let Some(id) = id else { continue };
        if headers.contains_key(name) {
            continue;
        }
        match HeaderValue::from_str(id.as_str()) {
            Ok(value) => {
                headers.insert(name.clone(), value);
            }
            Err(_) => tracing::debug!(header = %name, "correlation id is not a valid header value"),
        }
    }
}

/// Correlation headers for the active context, for clients that assemble
/// header maps by hand.
#[must_use]
pub fn trace_headers(names: &CorrelationHeaders) -> HeaderMap {
    let mut headers = HeaderMap::new();
    apply_correlation_headers(&mut headers, names, &IdentifierContext::current());
    headers
}

// ---------------------------------------------------------------------------
// Request hooks
// ---------------------------------------------------------------------------

/// Pre-send hook applied to every request of a [`TracedClient`].
pub trait RequestHook: Send + Sync {
    /// Adjusts `request` before it is sent.
    fn on_request(&self, request: &mut reqwest::Request);
}

impl<F> RequestHook for F
where
    F: Fn(&mut reqwest::Request) + Send + Sync,
{
    fn on_request(&self, request: &mut reqwest::Request) {
        self(request);
    }
}

/// Injects correlation headers read from the caller's context.
#[derive(Debug, Clone, Default)]
pub struct CorrelationHook {
    headers: CorrelationHeaders,
}

impl CorrelationHook {
    #[must_use]
    pub fn new(headers: CorrelationHeaders) -> Self {
        Self { headers }
    }
}

impl RequestHook for CorrelationHook {
    fn on_request(&self, request: &mut reqwest::Request) {
        apply_correlation_headers(
            request.headers_mut(),
            &self.headers,
            &IdentifierContext::current(),
        );
    }
}

// ---------------------------------------------------------------------------
// TracedClient
// ---------------------------------------------------------------------------

/// `reqwest` client running a hook chain before each request.
///
/// Requests started from the client return a [`TracedRequestBuilder`], whose
/// `send` goes through the hooks like [`TracedClient::execute`] does.
///
/// ```no_run
/// # async fn demo() -> reqwest::Result<()> {
/// use tracelink_server::config::CorrelationHeaders;
/// use tracelink_server::outbound::TracedClient;
///
/// let client = TracedClient::new(CorrelationHeaders::default());
/// let response = client.get("http://billing.internal/invoices").send().await?;
/// # let _ = response;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TracedClient {
    client: reqwest::Client,
    hooks: Arc<[Arc<dyn RequestHook>]>,
}

impl fmt::Debug for TracedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracedClient")
            .field("hooks", &self.hooks.len())
            .finish_non_exhaustive()
    }
}

impl TracedClient {
    /// Client with only the correlation hook.
    #[must_use]
    pub fn new(headers: CorrelationHeaders) -> Self {
        Self::builder().headers(headers).build()
    }

    #[must_use]
    pub fn builder() -> TracedClientBuilder {
        TracedClientBuilder::default()
    }

    pub fn request(&self, method: Method, url: impl IntoUrl) -> TracedRequestBuilder {
        TracedRequestBuilder {
            client: self.clone(),
            inner: self.client.request(method, url),
        }
    }

    pub fn get(&self, url: impl IntoUrl) -> TracedRequestBuilder {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: impl IntoUrl) -> TracedRequestBuilder {
        self.request(Method::POST, url)
    }

    pub fn put(&self, url: impl IntoUrl) -> TracedRequestBuilder {
        self.request(Method::PUT, url)
    }

    pub fn delete(&self, url: impl IntoUrl) -> TracedRequestBuilder {
        self.request(Method::DELETE, url)
    }

    /// Runs the hook chain on `request` and sends it.
    ///
    /// # Errors
    ///
    /// Returns the `reqwest` error if the request fails.
    pub async fn execute(&self, mut request: reqwest::Request) -> reqwest::Result<Response> {
        for hook in self.hooks.iter() {
            hook.on_request(&mut request);
        }
        self.client.execute(request).await
    }
}

/// Request builder bound to a [`TracedClient`].
#[derive(Debug)]
pub struct TracedRequestBuilder {
    client: TracedClient,
    inner: RequestBuilder,
}

impl TracedRequestBuilder {
    #[must_use]
    pub fn header<K, V>(self, key: K, value: V) -> Self
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        self.map(|inner| inner.header(key, value))
    }

    #[must_use]
    pub fn headers(self, headers: HeaderMap) -> Self {
        self.map(|inner| inner.headers(headers))
    }

    #[must_use]
    pub fn query<T: Serialize + ?Sized>(self, query: &T) -> Self {
        self.map(|inner| inner.query(query))
    }

    #[must_use]
    pub fn json<T: Serialize + ?Sized>(self, json: &T) -> Self {
        self.map(|inner| inner.json(json))
    }

    #[must_use]
    pub fn body(self, body: impl Into<reqwest::Body>) -> Self {
        self.map(|inner| inner.body(body))
    }

    #[must_use]
    pub fn bearer_auth(self, token: impl fmt::Display) -> Self {
        self.map(|inner| inner.bearer_auth(token))
    }

    #[must_use]
    pub fn timeout(self, timeout: Duration) -> Self {
        self.map(|inner| inner.timeout(timeout))
    }

    /// Builds the request without running the hooks. Pass it to
    /// [`TracedClient::execute`] to send it.
    ///
    /// # Errors
    ///
    /// Returns the `reqwest` error if the request is invalid.
    pub fn build(self) -> reqwest::Result<reqwest::Request> {
        self.inner.build()
    }

    /// Runs the hook chain and sends the request.
    ///
    /// # Errors
    ///
    /// Returns the `reqwest` error if the request cannot be built or sent.
    pub async fn send(self) -> reqwest::Result<Response> {
        let request = self.inner.build()?;
        self.client.execute(request).await
    }

    fn map(self, f: impl FnOnce(RequestBuilder) -> RequestBuilder) -> Self {
        Self {
            client: self.client,
            inner: f(self.inner),
        }
    }
}

/// Builder for [`TracedClient`].
#[derive(Default)]
pub struct TracedClientBuilder {
    client: Option<reqwest::Client>,
    hooks: Vec<Arc<dyn RequestHook>>,
    headers: CorrelationHeaders,
}

impl TracedClientBuilder {
    /// Uses a preconfigured `reqwest` client (timeouts, TLS, pool).
    #[must_use]
    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Appends a hook. Hooks run in insertion order.
    #[must_use]
    pub fn hook(mut self, hook: impl RequestHook + 'static) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    /// Header names used by the correlation hook.
    #[must_use]
    pub fn headers(mut self, headers: CorrelationHeaders) -> Self {
        self.headers = headers;
        self
    }

    /// Finishes the client; the correlation hook runs after every added hook.
    #[must_use]
    pub fn build(mut self) -> TracedClient {
        self.hooks.push(Arc::new(CorrelationHook::new(self.headers)));
        TracedClient {
            client: self.client.unwrap_or_default(),
            hooks: self.hooks.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// OutboundCorrelationLayer
// ---------------------------------------------------------------------------

/// Tower layer injecting correlation headers into outgoing `http::Request`s,
/// for clients built as tower stacks.
#[derive(Debug, Clone, Default)]
pub struct OutboundCorrelationLayer {
    headers: Arc<CorrelationHeaders>,
}

impl OutboundCorrelationLayer {
    #[must_use]
    pub fn new(headers: CorrelationHeaders) -> Self {
        Self {
            headers: Arc::new(headers),
        }
    }
}

impl<S> Layer<S> for OutboundCorrelationLayer {
    type Service = OutboundCorrelationService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        OutboundCorrelationService {
            inner,
            headers: Arc::clone(&self.headers),
        }
    }
}

/// Service wrapper produced by [`OutboundCorrelationLayer`].
#[derive(Debug, Clone)]
pub struct OutboundCorrelationService<S> {
    inner: S,
    headers: Arc<CorrelationHeaders>,
}

impl<S, B> Service<http::Request<B>> for OutboundCorrelationService<S>
where
    S: Service<http::Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: http::Request<B>) -> Self::Future {
        apply_correlation_headers(
            request.headers_mut(),
            &self.headers,
            &IdentifierContext::current(),
        );
        self.inner.call(request)
    }
}
