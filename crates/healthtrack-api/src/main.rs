//! Health tracker API server entry point.

use healthtrack_api::config::AppConfig;
use healthtrack_api::error::AppError;
use healthtrack_api::{server, telemetry};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = AppConfig::from_env()?;
    let telemetry = telemetry::init(config.otlp_endpoint.as_deref())?;

    tracing::info!("Starting health tracker API server");

    let result = server::run(config, server::shutdown_signal()).await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "server exited with an error");
    }
    drop(telemetry);
    result
}
