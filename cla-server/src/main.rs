use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn, Level};

use cla_core::{Engine, RecordingLogger};
use cla_server::config::Config;
use cla_server::{app, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Starting contributor agreement webhook {}", cla_server::service_version());

    let config =
        Config::from_env().expect("Failed to load configuration from environment variables");

    let recording_logger = if config.recording_enabled {
        match RecordingLogger::new(PathBuf::from(&config.recording_log_path)) {
            Ok(logger) => {
                info!(
                    "Recording enabled, logging to: {}",
                    config.recording_log_path
                );
                Some(logger)
            }
            Err(e) => {
                error!("Failed to initialize recording logger: {}", e);
                None
            }
        }
    } else {
        None
    };

    if config.webhook_secret.is_none() {
        warn!("GITHUB_WEBHOOK_SECRET is not set; webhook signatures will not be checked");
    }

    info!(
        "Covering organizations {:?}, agreements in {}",
        config.organizations, config.agreement_repo
    );

    let engine = Engine::new(config.engine_config(recording_logger.clone()))
        .expect("Failed to initialize the verification engine");

    let app_state = Arc::new(AppState {
        engine,
        webhook_secret: config.webhook_secret.clone(),
        recording_logger,
    });

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Server listening on port {}", config.port);

    axum::serve(listener, app(app_state)).await?;

    Ok(())
}
