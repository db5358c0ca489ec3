use anyhow::Result;
use std::sync::Arc;

mod classifier;
mod config;
mod coordinator;
mod dialer;
mod error;
mod fingerprint;
mod model_lister;
mod parser;
mod payload;
mod ratelimit;
mod result;
mod routes;

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::load()?;
    config.validate()?;

    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("claude-origin-fingerprint starting...");
    tracing::info!("server configured: {}:{}", config.server_host, config.server_port);
    tracing::info!("default public base_url: {}", config.default_base_url);
    if config.admin_key.is_none() {
        tracing::warn!("ADMIN_KEY not set, no caller can bypass the SSRF filter or base_url override");
    }

    let app_state = routes::AppState {
        config: Arc::new(config.clone()),
    };

    let app = routes::build_app(app_state);

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("received terminate signal, initiating graceful shutdown...");
        },
    }
}
