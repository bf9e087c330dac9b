//! HTTP handler definitions for the tracelink server.

pub mod health;

pub use health::healthcheck_handler;
