use crate::database::begin_serializable;
use crate::error::{AppError, AppResult};
use crate::models::{Booking, BookingItemDetail, BookingStatus, Payment};
use crate::repositories::{
    BookingRepository, InventoryRepository, PaymentRepository, UserRepository,
};
use crate::services::audit::AuditTrailService;
use crate::services::retry::retry_transient;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// A booking with its lines and payment, for history views
#[derive(Debug, Clone)]
pub struct BookingSummary {
    pub booking: Booking,
    pub items: Vec<BookingItemDetail>,
    pub payment: Option<Payment>,
}

/// Booking history and cancellation
pub struct BookingService {
    pool: PgPool,
    booking_repo: Arc<BookingRepository>,
    payment_repo: Arc<PaymentRepository>,
    user_repo: Arc<UserRepository>,
    audit: Option<Arc<AuditTrailService>>,
    max_attempts: u32,
}

impl BookingService {
    pub fn new(
        pool: PgPool,
        booking_repo: Arc<BookingRepository>,
        payment_repo: Arc<PaymentRepository>,
        user_repo: Arc<UserRepository>,
    ) -> Self {
        Self {
            pool,
            booking_repo,
            payment_repo,
            user_repo,
            audit: None,
            max_attempts: 3,
        }
    }

    pub fn with_audit(mut self, audit: Arc<AuditTrailService>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// All of the user's bookings, newest first
    pub async fn list_user_bookings(&self, user_id: Uuid) -> AppResult<Vec<BookingSummary>> {
        let bookings = self.booking_repo.list_for_user(user_id).await?;
        if bookings.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = bookings.iter().map(|b| b.id).collect();

        let mut items_by_booking: HashMap<Uuid, Vec<BookingItemDetail>> = HashMap::new();
        for item in self.booking_repo.item_details(&ids).await? {
            items_by_booking.entry(item.booking_id).or_default().push(item);
        }

        let mut payments: HashMap<Uuid, Payment> = self
            .payment_repo
            .find_by_bookings(&ids)
            .await?
            .into_iter()
            .map(|p| (p.booking_id, p))
            .collect();

        Ok(bookings
            .into_iter()
            .map(|booking| BookingSummary {
                items: items_by_booking.remove(&booking.id).unwrap_or_default(),
                payment: payments.remove(&booking.id),
                booking,
            })
            .collect())
    }

    /// Cancel a booking as its owner or as an admin.
    ///
    /// A confirmed booking hands its tickets back to the ledger; its completed
    /// payment is left as is. A pending booking's pending payment is failed.
    pub async fn cancel_booking(&self, actor_id: Uuid, booking_id: Uuid) -> AppResult<Booking> {
        let not_found = || AppError::NotFound(format!("Booking {} not found", booking_id));

        let booking = self
            .booking_repo
            .find_by_id(booking_id)
            .await?
            .ok_or_else(not_found)?;

        if booking.user_id != actor_id && !self.user_repo.is_admin(actor_id).await? {
            return Err(not_found());
        }

        if !booking.status.can_transition_to(BookingStatus::Cancelled) {
            return Err(AppError::InvalidState(format!(
                "Booking {} is {} and cannot be cancelled",
                booking_id,
                booking.status.label()
            )));
        }

        let (cancelled, released) = retry_transient("cancel_booking", self.max_attempts, move || {
            self.cancel_once(booking_id)
        })
        .await?;

        info!(
            booking_id = %booking_id,
            actor_id = %actor_id,
            previous_status = booking.status.label(),
            tickets_released = released,
            "Booking cancelled"
        );

        if let Some(audit) = &self.audit {
            if let Err(e) = audit.log_booking_cancelled(&booking, actor_id, released).await {
                error!("Failed to write audit entry: {}", e);
            }
        }

        Ok(cancelled)
    }

    async fn cancel_once(&self, booking_id: Uuid) -> AppResult<(Booking, i64)> {
        let mut tx = begin_serializable(&self.pool).await?;

        let booking = BookingRepository::lock_by_id(&mut tx, booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Booking {} not found", booking_id)))?;

        let mut released: i64 = 0;
        match booking.status {
            BookingStatus::Confirmed => {
                let items = BookingRepository::items_in(&mut tx, booking_id).await?;
                let ids: Vec<Uuid> = items.iter().map(|i| i.ticket_type_id).collect();
                InventoryRepository::lock_for_update(&mut tx, &ids).await?;

                for item in &items {
                    InventoryRepository::release(&mut tx, item.ticket_type_id, item.quantity).await?;
                    released += i64::from(item.quantity);
                }
            }
            BookingStatus::Pending => {
                PaymentRepository::fail_pending_for_booking(&mut tx, booking_id).await?;
            }
            other => {
                return Err(AppError::InvalidState(format!(
                    "Booking {} is {} and cannot be cancelled",
                    booking_id,
                    other.label()
                )));
            }
        }

        BookingRepository::transition(&mut tx, booking_id, booking.status, BookingStatus::Cancelled)
            .await?;
        tx.commit().await?;

        Ok((
            Booking {
                status: BookingStatus::Cancelled,
                ..booking
            },
            released,
        ))
    }
}
