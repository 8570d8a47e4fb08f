//! `SimpleTimeService` binary
//!
//! Listens on `PORT` (8080 by default), logs to stdout filtered by `RUST_LOG`.

use std::process::ExitCode;

use simple_time_service::{Config, Error, Outcome, Server, handlers::router, shutdown_signal};
use tracing::{error, level_filters::LevelFilter};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

async fn run() -> Result<Outcome, Error> {
    let config = Config::from_env()?;
    let server = Server::bind(config).await?;
    server.serve(router(), shutdown_signal()).await
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with(fmt::layer())
        .init();

    match run().await {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "SimpleTimeService failed");
            ExitCode::FAILURE
        }
    }
}
