//! HTTP surface: configuration, body replay, correlation middleware, and the
//! server lifecycle.

pub mod body;
pub mod config;
pub mod correlation;
pub mod handlers;
pub mod middleware;
pub mod module;

pub use config::NetworkConfig;
pub use correlation::{CorrelationLayer, CorrelationService, ACCESS_LOG_TARGET};
pub use module::NetworkModule;
