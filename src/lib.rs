//! Ticketing Backend Library
//!
//! Booking-to-payment consistency engine: soft-hold carts, checkout, and
//! serializable settlement against the per-ticket-type inventory ledger.
//! This module exposes the backend components for use by tests and the binary.

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod grpc_service;
pub mod models;
pub mod repositories;
pub mod services;

// Re-export commonly used types
pub use config::{AppConfig, BookingConfig};
pub use error::{AppError, AppResult};

use database::Database;
use repositories::*;
use services::{
    AuditTrailService, BookingService, CardPaymentOracle, CartService, CheckoutService,
    ExpirySweeper, PaymentSettlementService,
};
use std::sync::Arc;

/// Application state containing all repositories and services
pub struct AppState {
    pub database: Database,
    pub user_repo: Arc<UserRepository>,
    pub event_repo: Arc<EventRepository>,
    pub inventory_repo: Arc<InventoryRepository>,
    pub booking_repo: Arc<BookingRepository>,
    pub payment_repo: Arc<PaymentRepository>,
    pub cart_service: Arc<CartService>,
    pub checkout_service: Arc<CheckoutService>,
    pub settlement_service: Arc<PaymentSettlementService>,
    pub booking_service: Arc<BookingService>,
    pub audit: Option<Arc<AuditTrailService>>,
}

impl AppState {
    /// Create a new AppState with initialized repositories and services
    pub fn new(
        pool: sqlx::PgPool,
        booking: &BookingConfig,
        oracle: Arc<dyn CardPaymentOracle>,
        audit: Option<Arc<AuditTrailService>>,
    ) -> Self {
        let database = Database::new(pool.clone());

        let user_repo = Arc::new(UserRepository::new(pool.clone()));
        let event_repo = Arc::new(EventRepository::new(pool.clone()));
        let inventory_repo = Arc::new(InventoryRepository::new(pool.clone()));
        let booking_repo = Arc::new(BookingRepository::new(pool.clone()));
        let payment_repo = Arc::new(PaymentRepository::new(pool.clone()));

        let cart_service = Arc::new(CartService::new(
            pool.clone(),
            event_repo.clone(),
            booking_repo.clone(),
            booking.cart_hold(),
        ));

        let checkout_service = Arc::new(CheckoutService::new(
            pool.clone(),
            booking_repo.clone(),
            payment_repo.clone(),
            booking.money_market_window(),
        ));

        let mut settlement_service = PaymentSettlementService::new(
            pool.clone(),
            booking_repo.clone(),
            inventory_repo.clone(),
            payment_repo.clone(),
            oracle,
        )
        .with_max_attempts(booking.settlement_max_attempts);

        let mut booking_service = BookingService::new(
            pool,
            booking_repo.clone(),
            payment_repo.clone(),
            user_repo.clone(),
        )
        .with_max_attempts(booking.settlement_max_attempts);

        if let Some(audit) = &audit {
            settlement_service = settlement_service.with_audit(audit.clone());
            booking_service = booking_service.with_audit(audit.clone());
        }

        Self {
            database,
            user_repo,
            event_repo,
            inventory_repo,
            booking_repo,
            payment_repo,
            cart_service,
            checkout_service,
            settlement_service: Arc::new(settlement_service),
            booking_service: Arc::new(booking_service),
            audit,
        }
    }

    /// Build the background expiry sweeper, or `None` when disabled
    pub fn expiry_sweeper(&self, booking: &BookingConfig) -> Option<ExpirySweeper> {
        let interval = booking.expiry_sweep_interval()?;
        let sweeper = ExpirySweeper::new(self.booking_repo.clone()).with_interval(interval);

        Some(match &self.audit {
            Some(audit) => sweeper.with_audit(audit.clone()),
            None => sweeper,
        })
    }
}
