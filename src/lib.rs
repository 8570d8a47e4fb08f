//! A tiny HTTP service telling callers the current UTC time and their IP
//!
//! Routes:
//!
//! - `/health` answers `{"status":"healthy"}`
//! - anything else answers `{"timestamp":"<RFC 3339, nanoseconds, UTC>","ip":"<client IP>"}`
//!
//! The client IP is taken from `X-Forwarded-For` (leftmost entry), then
//! `X-Real-Ip`, then the connection peer address, see [`client_ip`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use simple_time_service::{Config, Server, handlers::router, shutdown_signal};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), simple_time_service::Error> {
//!     let server = Server::bind(Config::from_env()?).await?;
//!     // Stops accepting on SIGINT / SIGTERM and waits for in-flight requests
//!     server.serve(router(), shutdown_signal()).await?;
//!     Ok(())
//! }
//! ```

pub mod client_ip;
mod config;
mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod server;
#[cfg(test)]
mod test_log;

pub use client_ip::{ClientIp, MissingConnectInfo};
pub use config::{Config, DEFAULT_PORT};
pub use error::Error;
pub use server::{Outcome, Phase, Server, Signal, shutdown_signal};
