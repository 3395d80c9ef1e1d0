//! Cart / reservation manager.
//!
//! A cart is the user's pending booking for one event. Holds are soft: adding
//! to the cart checks remaining stock but never touches `quantity_sold`, so
//! the totals shown here are advisory until settlement re-checks the ledger.

use crate::error::{AppError, AppResult};
use crate::models::{Booking, BookingItemDetail, PaymentStatus};
use crate::repositories::{BookingRepository, EventRepository, PaymentRepository};
use chrono::{Duration, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// A pending booking with its lines
#[derive(Debug, Clone)]
pub struct CartView {
    pub booking: Booking,
    pub items: Vec<BookingItemDetail>,
}

pub struct CartService {
    pool: PgPool,
    event_repo: Arc<EventRepository>,
    booking_repo: Arc<BookingRepository>,
    hold: Duration,
}

impl CartService {
    pub fn new(
        pool: PgPool,
        event_repo: Arc<EventRepository>,
        booking_repo: Arc<BookingRepository>,
        hold: Duration,
    ) -> Self {
        Self {
            pool,
            event_repo,
            booking_repo,
            hold,
        }
    }

    /// Add tickets to the user's pending booking for the ticket type's event.
    ///
    /// Merges into an existing line for the same ticket type, recomputes the
    /// total and slides the deadline to now + hold.
    pub async fn add_to_cart(
        &self,
        user_id: Uuid,
        ticket_type_id: Uuid,
        quantity: i32,
    ) -> AppResult<CartView> {
        if quantity <= 0 {
            return Err(AppError::Validation(
                "Quantity must be greater than zero".to_string(),
            ));
        }

        let ticket_type = self
            .event_repo
            .find_ticket_type(ticket_type_id)
            .await?
            .filter(|tt| tt.is_active)
            .ok_or_else(|| {
                AppError::NotFound(format!("Ticket type {} not found or inactive", ticket_type_id))
            })?;

        // Soft check against committed stock only; other carts are invisible here.
        if !ticket_type.can_fulfil(quantity) {
            return Err(AppError::InsufficientInventory {
                ticket_type_id,
                ticket_type_name: ticket_type.name.clone(),
                requested: quantity,
                available: ticket_type.available_count(),
            });
        }

        let expires_at = Utc::now() + self.hold;
        let mut tx = self.pool.begin().await?;

        let booking = BookingRepository::lock_or_create_pending(
            &mut tx,
            user_id,
            ticket_type.event_id,
            expires_at,
        )
        .await?;

        if let Some(payment) = PaymentRepository::find_current(&mut tx, booking.id).await? {
            if payment.status == PaymentStatus::Pending {
                return Err(AppError::InvalidState(format!(
                    "Checkout already started for booking {}; remove it to change the cart",
                    booking.id
                )));
            }
        }

        let item = BookingRepository::upsert_item(
            &mut tx,
            booking.id,
            ticket_type_id,
            quantity,
            ticket_type.price,
        )
        .await?;

        let booking = BookingRepository::refresh_total(&mut tx, booking.id, expires_at).await?;
        tx.commit().await?;

        info!(
            booking_id = %booking.id,
            user_id = %user_id,
            ticket_type = %ticket_type.name,
            line_quantity = item.quantity,
            total = %booking.total_amount,
            "Cart updated"
        );

        self.view(booking).await
    }

    /// The user's pending booking, if any
    pub async fn get_cart(&self, user_id: Uuid) -> AppResult<Option<CartView>> {
        match self.booking_repo.find_pending_for_user(user_id).await? {
            Some(booking) => Ok(Some(self.view(booking).await?)),
            None => Ok(None),
        }
    }

    /// Delete a pending booking. No inventory effect.
    pub async fn remove_from_cart(&self, user_id: Uuid, booking_id: Uuid) -> AppResult<()> {
        if self.booking_repo.delete_pending(user_id, booking_id).await? {
            debug!(booking_id = %booking_id, "Pending booking removed");
            return Ok(());
        }

        match self.booking_repo.find_by_id(booking_id).await? {
            Some(booking) if booking.user_id == user_id => Err(AppError::InvalidState(format!(
                "Booking {} is {} and can no longer be removed",
                booking_id,
                booking.status.label()
            ))),
            _ => Err(AppError::NotFound(format!("Booking {} not found", booking_id))),
        }
    }

    async fn view(&self, booking: Booking) -> AppResult<CartView> {
        let items = self.booking_repo.item_details(&[booking.id]).await?;
        Ok(CartView { booking, items })
    }
}
