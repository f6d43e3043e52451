//! Poll Controller
//!
//! Coordinator for live moderated question/answer sessions.
//!
//! # Servers
//!
//! One HTTP server carries everything observable:
//! - Health probes (`/health`, `/ready`)
//! - Prometheus metrics (`/metrics`)
//! - Read-only inspection API (`/sessions/...`, `/stats`)
//!
//! The transport that carries moderator/participant events is a separate
//! collaborator wired against the registry handle; this binary hosts the
//! core and its observable surfaces.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize Prometheus metrics recorder
//! 3. Initialize actor system (`SessionRegistryActorHandle`)
//! 4. Start the HTTP server (health, metrics, inspection)
//! 5. Wait for shutdown signal, then drain the registry

#![warn(clippy::pedantic)]

use std::sync::Arc;

use anyhow::Context;
use axum::routing::get;
use axum::Router;
use poll_controller::actors::{ActorMetrics, SessionRegistryActorHandle};
use poll_controller::config::Config;
use poll_controller::http::api_router;
use poll_controller::observability::metrics::init_metrics_recorder;
use poll_controller::observability::{health_router, HealthState};
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "poll_controller=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Poll Controller");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        instance_id = %config.instance_id,
        http_bind_address = %config.http_bind_address,
        max_participants = config.max_participants,
        max_options = config.max_options,
        min_deadline_seconds = config.min_deadline_seconds,
        max_deadline_seconds = config.max_deadline_seconds,
        "Configuration loaded successfully"
    );

    // Initialize Prometheus metrics recorder before any metrics are recorded
    info!("Initializing Prometheus metrics recorder...");
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        anyhow::anyhow!(e)
    })?;
    info!("Prometheus metrics recorder initialized");

    // Initialize health state
    let health_state = Arc::new(HealthState::new());

    // Initialize actor system
    info!("Initializing actor system...");
    let actor_metrics = ActorMetrics::new();
    let registry = SessionRegistryActorHandle::new(
        config.instance_id.clone(),
        config.limits(),
        Arc::clone(&actor_metrics),
    );
    info!("Actor system initialized");

    // Build the HTTP surface: probes, metrics, inspection API
    let metrics_handle = prometheus_handle.clone();
    let app = Router::new()
        .merge(health_router(Arc::clone(&health_state)))
        .merge(api_router(registry.clone()))
        .route(
            "/metrics",
            get(move || {
                let handle = metrics_handle.clone();
                async move { handle.render() }
            }),
        )
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.http_bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.http_bind_address))?;
    info!(address = %config.http_bind_address, "HTTP server listening");

    health_state.set_ready();

    let shutdown_registry = registry.clone();
    let shutdown_health = Arc::clone(&health_state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("Shutdown signal received");

            // Flip readiness first so load balancers stop routing,
            // then drain the registry (cancels sessions and timers)
            shutdown_health.set_not_ready();
            if let Err(e) = shutdown_registry.shutdown().await {
                error!(error = %e, "Registry shutdown failed");
            }
        })
        .await?;

    info!("Poll Controller stopped");
    Ok(())
}

/// Wait for ctrl-c or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
