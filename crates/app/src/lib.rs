//! Cabinet server: configuration, HTTP surface, and process bootstrap.

#![forbid(unsafe_code)]

pub mod config;
pub mod http;
pub mod telemetry;

pub use config::{Cli, Commands, Output};
pub use http::{router, serve, shutdown_signal};
