//! Network module with deferred startup lifecycle.
//!
//! Implements the deferred startup pattern: `new()` assembles configuration,
//! `start()` binds the TCP listener, and `serve()` starts accepting
//! connections. This separation lets callers learn the bound port (useful
//! with port 0) before traffic flows.

use std::future::Future;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use super::config::NetworkConfig;
use super::correlation::CorrelationLayer;
use super::handlers::healthcheck_handler;
use super::middleware::build_http_layers;

/// Manages the HTTP server lifecycle.
///
/// 1. `new()` -- takes the listener settings and the correlation layer
/// 2. `start()` -- binds TCP listener to the configured address
/// 3. `serve()` -- accepts connections until shutdown is signalled
pub struct NetworkModule {
    config: NetworkConfig,
    correlation: CorrelationLayer,
    routes: Router,
    listener: Option<TcpListener>,
}

impl NetworkModule {
    /// Creates a new network module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, correlation: CorrelationLayer) -> Self {
        Self {
            config,
            correlation,
            routes: Router::new(),
            listener: None,
        }
    }

    /// Adds application routes. They run behind the same middleware stack
    /// as the built-in endpoints.
    #[must_use]
    pub fn merge(mut self, routes: Router) -> Self {
        self.routes = self.routes.merge(routes);
        self
    }

    /// Assembles the axum router with all routes and middleware.
    ///
    /// Routes:
    /// - `GET /healthcheck` -- `{"status": "ok"}`
    /// - everything added through [`NetworkModule::merge`]
    pub fn build_router(&self) -> Router {
        Router::new()
            .route("/healthcheck", get(healthcheck_handler))
            .merge(self.routes.clone())
            .layer(build_http_layers(&self.config, self.correlation.clone()))
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which may differ from the configured
    /// port when port 0 is used (OS-assigned ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = self.config.bind_address();
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!("TCP listener bound to {}:{}", self.config.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves connections until the `shutdown` future resolves, then waits
    /// for in-flight requests to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first or if the server
    /// encounters a fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let router = self.build_router();
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow::anyhow!("start() must be called before serve()"))?;

        info!("Serving HTTP connections");
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;
        info!("HTTP server stopped");
        Ok(())
    }
}
