//! Listener settings for the HTTP server.

use std::time::Duration;

/// Where the server listens and how the transport layers in front of the
/// correlation middleware behave.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub host: String,
    /// 0 asks the OS for a free port; [`super::NetworkModule::start`]
    /// returns the one it got.
    pub port: u16,
    /// Browser origins allowed by CORS. A `*` entry allows any origin.
    pub cors_origins: Vec<String>,
    /// Requests running longer get a 408, still carrying the correlation
    /// headers.
    pub request_timeout: Duration,
}

impl NetworkConfig {
    /// `host:port` as handed to the listener.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    #[must_use]
    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.iter().any(|origin| origin == "*")
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            cors_origins: vec!["*".to_string()],
            request_timeout: Duration::from_secs(30),
        }
    }
}
