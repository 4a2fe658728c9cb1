//! coach-server - REST API server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use coach_core::Orchestrator;
use coach_server::{create_engine, create_server, load_config, AppState};
use tokio::signal;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::from_default_env()
        .add_directive(Level::INFO.into())
        .add_directive("coach_server=debug".parse()?);

    // COACH_LOG_FORMAT=json switches to one JSON object per line.
    let json = std::env::var("COACH_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing()?;

    let host = std::env::var("COACH_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("COACH_PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    let config = load_config()?;
    let schedule = config.schedule.clone();
    let engine = Arc::new(create_engine(config)?);
    let seeded = engine.seed_default_templates()?;
    if seeded > 0 {
        info!(count = seeded, "Installed default message templates");
    }

    // Start background tasks
    let mut orchestrator = Orchestrator::new(engine.clone(), schedule).await?;
    orchestrator.start().await?;
    info!("Orchestrator started");

    let app = create_server(AppState::new(engine));

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Starting coach-server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            info!("Shutdown signal received, stopping orchestrator...");
        })
        .await?;

    orchestrator.shutdown().await?;

    info!("Server stopped cleanly");
    Ok(())
}
