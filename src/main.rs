//! Ticketing Backend Service
//!
//! Main entry point for the ticketing backend.
//! This service provides:
//! - gRPC API for carts, checkout, settlement and booking history
//! - Background sweeper that expires stale pending bookings

use std::net::SocketAddr;
use std::sync::Arc;
use ticketing_backend::database::{create_pool, run_migrations};
use ticketing_backend::grpc_service::{proto, TicketingGrpcService};
use ticketing_backend::services::{
    AuditTrailService, CardPaymentOracle, HttpCardOracle, SimulatedCardOracle,
};
use ticketing_backend::{AppConfig, AppError, AppResult, AppState};
use tonic::transport::Server;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> AppResult<()> {
    // Load environment variables first
    dotenv::dotenv().ok();

    // Load configuration
    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        AppError::Config(e)
    })?;

    // Initialize tracing/logging with config
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("ticketing_backend={},sqlx=warn,tonic=info", config.log_level).into()
    });
    if config.json_logs() {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║         Ticketing Backend Service Starting               ║");
    info!("╚══════════════════════════════════════════════════════════╝");
    info!("Environment: {}", config.environment);
    info!("Log level: {}", config.log_level);
    info!("gRPC port: {}", config.grpc_port);
    info!(
        "Cart hold: {} min, Money Market window: {} h, settlement attempts: {}",
        config.booking.cart_hold_minutes,
        config.booking.money_market_window_hours,
        config.booking.settlement_max_attempts
    );

    // =========================================================================
    // DATABASE SETUP
    // =========================================================================
    info!("Connecting to database...");

    let pool = create_pool(&config.database).await.map_err(|e| {
        error!("Failed to create database pool: {}", e);
        AppError::Database(e)
    })?;

    info!("Database connection pool created successfully");
    info!("Max connections: {}", config.database.max_connections);

    // Run migrations
    info!("Running database migrations...");
    run_migrations(&pool, None).await.map_err(|e| {
        error!("Database migration failed: {}", e);
        AppError::Database(e)
    })?;

    info!("Database migrations completed successfully");

    // =========================================================================
    // CORE SERVICES INITIALIZATION
    // =========================================================================
    info!("Initializing core services...");

    let oracle: Arc<dyn CardPaymentOracle> = match &config.booking.card_gateway_url {
        Some(url) => {
            info!("✓ Card gateway: {}", url);
            Arc::new(HttpCardOracle::new(url.clone()))
        }
        None => {
            warn!("CARD_GATEWAY_URL not configured - using simulated card gateway");
            Arc::new(SimulatedCardOracle)
        }
    };

    let audit_trail = match AuditTrailService::new(config.booking.audit_log_dir.clone()) {
        Ok(audit) => {
            info!("✓ Audit trail service initialized");
            Some(Arc::new(audit))
        }
        Err(e) => {
            warn!("Audit trail disabled: {}", e);
            None
        }
    };

    let app_state = Arc::new(AppState::new(
        pool.clone(),
        &config.booking,
        oracle,
        audit_trail,
    ));
    info!("✓ Application state initialized with repositories and services");

    app_state.database.ping().await.map_err(AppError::Database)?;

    let grpc_service = TicketingGrpcService::new(app_state.clone());
    info!("✓ gRPC service initialized");

    // =========================================================================
    // BACKGROUND TASKS
    // =========================================================================
    let sweeper_handle = match app_state.expiry_sweeper(&config.booking) {
        Some(sweeper) => {
            let handle = tokio::spawn(async move {
                sweeper.start().await;
            });
            info!(
                "✓ Expiry sweeper background task started ({}s interval)",
                config.booking.expiry_sweep_interval_secs
            );
            Some(handle)
        }
        None => {
            warn!("EXPIRY_SWEEP_INTERVAL_SECS is 0 - expiry sweeper not started");
            None
        }
    };

    // =========================================================================
    // START SERVER
    // =========================================================================
    let grpc_addr: SocketAddr = format!("0.0.0.0:{}", config.grpc_port)
        .parse()
        .map_err(|e| AppError::Config(format!("Invalid gRPC address: {}", e)))?;

    let reflection = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(proto::FILE_DESCRIPTOR_SET)
        .build()
        .map_err(|e| AppError::Message(format!("Failed to build reflection service: {}", e)))?;

    info!("Starting gRPC server on {}...", grpc_addr);

    let grpc_server = Server::builder()
        .add_service(reflection)
        .add_service(grpc_service.into_server())
        .serve(grpc_addr);

    let grpc_handle = tokio::spawn(async move {
        if let Err(e) = grpc_server.await {
            error!("gRPC server error: {}", e);
        }
    });

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║         Ticketing Backend Service Ready!                 ║");
    info!("╠══════════════════════════════════════════════════════════╣");
    info!("║  gRPC API:     0.0.0.0:{}                             ║", config.grpc_port);
    info!("║  Environment:  {}                                 ║", config.environment);
    info!("╚══════════════════════════════════════════════════════════╝");
    info!("Press Ctrl+C to shutdown gracefully");

    // =========================================================================
    // SHUTDOWN HANDLING
    // =========================================================================
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, shutting down gracefully...");
        }
        _ = grpc_handle => {
            error!("gRPC server exited unexpectedly");
        }
        _ = async {
            if let Some(handle) = sweeper_handle {
                handle.await.ok();
            } else {
                futures::future::pending::<()>().await;
            }
        } => {
            error!("Expiry sweeper exited unexpectedly");
        }
    }

    pool.close().await;
    info!("Ticketing backend service shutdown complete");
    Ok(())
}
