mod context;
mod error;
mod routes;

use std::path::PathBuf;
use std::sync::Arc;

use camera_panel_common::config::Config;
use camera_panel_common::settings::PersistedSettings;
use camera_panel_producer::CameraSession;
use tracing::{error, info, warn};

use crate::context::AppContext;

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let mut config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    match PersistedSettings::load(&config.settings.state_path) {
        Ok(Some(saved)) => {
            saved.apply_to(&mut config);
            info!(path = %config.settings.state_path.display(), "restored saved settings");
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, "ignoring unreadable saved settings"),
    }

    info!(
        backend = config.camera.backend,
        bind = config.server.bind,
        port = config.server.port,
        "starting camera panel"
    );

    let startup = config.clone();
    let ctx = match tokio::task::spawn_blocking(move || AppContext::from_config(&startup)).await {
        Ok(Ok(ctx)) => ctx,
        Ok(Err(e)) => {
            error!(error = %e, "failed to start camera");
            std::process::exit(1);
        }
        Err(e) => {
            error!(error = %e, "startup task panicked");
            std::process::exit(1);
        }
    };
    let ctx = Arc::new(ctx);

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(addr, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };
    info!(addr, "listening");

    let camera = Arc::clone(&ctx.camera);
    let app = routes::router(ctx);
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown(camera))
        .await
    {
        error!(error = %e, "server error");
    }
    info!("camera panel stopped");
}

/// Resolve on Ctrl-C after stopping the camera, so open preview streams end
/// and the server can drain.
async fn shutdown(camera: Arc<CameraSession>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    info!("shutdown requested");

    match tokio::task::spawn_blocking(move || camera.stop_streaming()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "failed to stop camera"),
        Err(e) => warn!(error = %e, "stop task panicked"),
    }
}
