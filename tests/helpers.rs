#![allow(dead_code)]

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::sync::Arc;
use ticketing_backend::config::BookingConfig;
use ticketing_backend::models::*;
use ticketing_backend::repositories::*;
use ticketing_backend::services::{CardPaymentOracle, SimulatedCardOracle};
use ticketing_backend::AppState;
use uuid::Uuid;

/// Test database wrapping a `#[sqlx::test]` pool and a fully wired AppState
pub struct TestDatabase {
    pub pool: PgPool,
    pub app: Arc<AppState>,
}

impl TestDatabase {
    /// Create TestDatabase from an existing pool (useful with sqlx::test)
    pub async fn from_pool(pool: PgPool) -> Self {
        Self::with_config(pool, BookingConfig::default(), Arc::new(SimulatedCardOracle)).await
    }

    /// Same as `from_pool` with a custom booking policy and card oracle
    pub async fn with_config(
        pool: PgPool,
        booking: BookingConfig,
        oracle: Arc<dyn CardPaymentOracle>,
    ) -> Self {
        let app = Arc::new(AppState::new(pool.clone(), &booking, oracle, None));
        Self { pool, app }
    }

    pub fn users(&self) -> &UserRepository {
        &self.app.user_repo
    }

    pub fn events(&self) -> &EventRepository {
        &self.app.event_repo
    }

    /// Current ledger row for a ticket type
    pub async fn ticket_type(&self, id: Uuid) -> TicketType {
        self.app
            .event_repo
            .find_ticket_type(id)
            .await
            .expect("Failed to load ticket type")
            .expect("Ticket type missing")
    }

    pub async fn booking(&self, id: Uuid) -> Booking {
        self.app
            .booking_repo
            .find_by_id(id)
            .await
            .expect("Failed to load booking")
            .expect("Booking missing")
    }

    pub async fn payment(&self, id: Uuid) -> Payment {
        self.app
            .payment_repo
            .find_by_id(id)
            .await
            .expect("Failed to load payment")
            .expect("Payment missing")
    }

    /// Push a booking's deadline into the past
    pub async fn backdate_booking(&self, booking_id: Uuid) {
        sqlx::query("UPDATE bookings SET expires_at = $2 WHERE id = $1")
            .bind(booking_id)
            .bind(Utc::now() - Duration::minutes(5))
            .execute(&self.pool)
            .await
            .expect("Failed to backdate booking");
    }
}

/// Test data fixtures
pub struct TestFixtures {
    pub alice: User,
    pub bob: User,
    pub admin: User,
    pub event: Event,
    /// 25.00, 10 seats
    pub general: TicketType,
    /// 100.00, 2 seats
    pub vip: TicketType,
}

impl TestFixtures {
    /// Create test fixtures with sample data
    pub async fn create(db: &TestDatabase) -> Self {
        let alice = create_test_user(db, "alice@example.com").await;
        let bob = create_test_user(db, "bob@example.com").await;
        let admin = db
            .users()
            .create("admin@example.com", UserRole::Admin)
            .await
            .expect("Failed to create admin");

        let event = create_test_event(db, "Harbour Lights Festival").await;
        let general = create_test_ticket_type(db, event.id, "General", Decimal::new(2500, 2), 10).await;
        let vip = create_test_ticket_type(db, event.id, "VIP", Decimal::new(10000, 2), 2).await;

        Self {
            alice,
            bob,
            admin,
            event,
            general,
            vip,
        }
    }
}

/// Helper function to create a test user
pub async fn create_test_user(db: &TestDatabase, email: &str) -> User {
    db.users()
        .create(email, UserRole::User)
        .await
        .expect("Failed to create test user")
}

/// Helper function to create a test event a month out
pub async fn create_test_event(db: &TestDatabase, title: &str) -> Event {
    let start = Utc::now() + Duration::days(30);
    db.events()
        .create_event(&NewEvent {
            title: title.to_string(),
            description: "Open-air concert".to_string(),
            category: "Music".to_string(),
            location_city: "Kingston".to_string(),
            venue: "Waterfront Park".to_string(),
            start_date_time: start,
            end_date_time: start + Duration::hours(4),
            capacity: 500,
        })
        .await
        .expect("Failed to create test event")
}

/// Helper function to create a ticket type
pub async fn create_test_ticket_type(
    db: &TestDatabase,
    event_id: Uuid,
    name: &str,
    price: Decimal,
    quantity_available: i32,
) -> TicketType {
    db.events()
        .add_ticket_type(&NewTicketType {
            event_id,
            name: name.to_string(),
            price,
            quantity_available,
        })
        .await
        .expect("Failed to create ticket type")
}

/// A complete card that the simulated gateway approves
pub fn valid_card() -> CardDetails {
    CardDetails {
        cardholder_name: "Alice Example".to_string(),
        card_number: "4111 1111 1111 1111".to_string(),
        expiry_date: "12/30".to_string(),
        cvv: "123".to_string(),
    }
}
