//! clp-server - Course Learning Plan workflow service
//!
//! Teachers draft plans (upload, text or AI generation) and submit them to a
//! Dean for review; admins manage users, departments, the Word template and
//! the generation prompts.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use clp_common::config::{load_settings, BackendSettings};
use clp_server::ai::GeminiClient;
use clp_server::{backend, build_router, middleware, AppState};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for clp-server
#[derive(Parser, Debug)]
#[command(name = "clp-server")]
#[command(about = "Course Learning Plan workflow service")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "CLP_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = load_settings(args.config.as_deref()).context("Invalid configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| settings.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting CLP server (clp-server) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let backends = backend::connect(&settings.backend)
        .await
        .context("Failed to initialize backends")?;
    if let BackendSettings::Supabase(supabase) = &settings.backend {
        info!("✓ Supabase project: {}", supabase.url);
    }

    let generator = GeminiClient::new(settings.gemini_api_key.clone(), &settings.gemini)
        .context("Failed to initialize Gemini client")?;
    info!("✓ Gemini model: {}", settings.gemini.model);
    info!(
        "Document server: {} (callbacks via {})",
        settings.editor.document_server_url, settings.editor.public_base_url
    );

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let state = AppState::new(settings, backends, Arc::new(generator))
        .context("Failed to build HTTP client")?;
    middleware::spawn_pruning(state.limiter.clone());
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("clp-server listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
