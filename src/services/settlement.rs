//! Payment settlement.
//!
//! Both entry points run the same serializable transaction: lock the
//! booking, then its payment, then the ledger rows; enforce the deadline;
//! re-check every line against the live ledger; then commit stock, payment
//! and booking together. Nothing loaded before the transaction is trusted
//! inside it.

use crate::database::begin_serializable;
use crate::error::{AppError, AppResult};
use crate::models::{
    Booking, BookingStatus, CardDetails, Payment, PaymentMethod, PaymentStatus, TicketType,
};
use crate::repositories::{BookingRepository, InventoryRepository, PaymentRepository};
use crate::services::audit::AuditTrailService;
use crate::services::payment_oracle::CardPaymentOracle;
use crate::services::retry::retry_transient_while_progressing;
use chrono::Utc;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Result of a committed settlement
#[derive(Debug, Clone)]
pub struct SettledPayment {
    pub payment: Payment,
    pub booking: Booking,
}

pub struct PaymentSettlementService {
    pool: PgPool,
    booking_repo: Arc<BookingRepository>,
    inventory_repo: Arc<InventoryRepository>,
    payment_repo: Arc<PaymentRepository>,
    oracle: Arc<dyn CardPaymentOracle>,
    audit: Option<Arc<AuditTrailService>>,
    max_attempts: u32,
}

impl PaymentSettlementService {
    pub fn new(
        pool: PgPool,
        booking_repo: Arc<BookingRepository>,
        inventory_repo: Arc<InventoryRepository>,
        payment_repo: Arc<PaymentRepository>,
        oracle: Arc<dyn CardPaymentOracle>,
    ) -> Self {
        Self {
            pool,
            booking_repo,
            inventory_repo,
            payment_repo,
            oracle,
            audit: None,
            max_attempts: 3,
        }
    }

    /// Set audit trail
    pub fn with_audit(mut self, audit: Arc<AuditTrailService>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Set how many conflicts without ledger progress are retried before surfacing
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Authorize the card with the gateway, then settle the payment
    pub async fn confirm_by_card_details(
        &self,
        user_id: Uuid,
        payment_id: Uuid,
        card: &CardDetails,
    ) -> AppResult<SettledPayment> {
        let (payment, booking) = self.owned_payment(user_id, payment_id).await?;

        if payment.status != PaymentStatus::Pending {
            return Err(AppError::InvalidState(format!(
                "Payment {} is already {}",
                payment_id,
                payment.status.label()
            )));
        }
        if payment.payment_method != PaymentMethod::Card {
            return Err(AppError::InvalidState(format!(
                "Payment {} must be confirmed with its reference code",
                payment_id
            )));
        }

        // A lapsed booking settles to Expired without charging the card.
        if !booking.is_expired_at(Utc::now()) {
            self.payment_repo
                .attach_card(payment_id, &card.fingerprint(), card.last_four().as_deref())
                .await?;

            if !self.oracle.authorize(&payment, card).await? {
                return Err(self.decline(&payment).await?);
            }
        }

        self.settle("settle_card_payment", payment_id, booking.id).await
    }

    /// Settle a Money Market payment presented at an outlet.
    ///
    /// Looked up by code alone; the outlet acts on the payer's behalf.
    pub async fn confirm_by_reference_code(&self, reference_code: &str) -> AppResult<SettledPayment> {
        let reference_code = reference_code.trim();
        if reference_code.is_empty() {
            return Err(AppError::Validation("Reference code is required".to_string()));
        }

        let payment = self
            .payment_repo
            .find_by_reference_code(reference_code)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("No payment with reference code {}", reference_code))
            })?;

        self.settle("settle_reference_payment", payment.id, payment.booking_id)
            .await
    }

    /// Current snapshot of one of the caller's payments
    pub async fn payment_status(&self, user_id: Uuid, payment_id: Uuid) -> AppResult<Payment> {
        let (payment, _) = self.owned_payment(user_id, payment_id).await?;
        Ok(payment)
    }

    async fn owned_payment(&self, user_id: Uuid, payment_id: Uuid) -> AppResult<(Payment, Booking)> {
        let not_found = || AppError::NotFound(format!("Payment {} not found", payment_id));

        let payment = self
            .payment_repo
            .find_by_id(payment_id)
            .await?
            .ok_or_else(not_found)?;
        let booking = self
            .booking_repo
            .find_by_id(payment.booking_id)
            .await?
            .filter(|b| b.user_id == user_id)
            .ok_or_else(not_found)?;

        Ok((payment, booking))
    }

    /// Mark a declined card payment failed. Inventory is not touched.
    async fn decline(&self, payment: &Payment) -> AppResult<AppError> {
        let mut tx = self.pool.begin().await?;
        let moved = PaymentRepository::transition(
            &mut tx,
            payment.id,
            PaymentStatus::Pending,
            PaymentStatus::Failed,
            None,
        )
        .await?;
        tx.commit().await?;

        if !moved {
            return Ok(AppError::InvalidState(format!(
                "Payment {} changed while the card was being authorized",
                payment.id
            )));
        }

        warn!(payment_id = %payment.id, booking_id = %payment.booking_id, "Card declined");
        self.audit_failure(payment.id, payment.booking_id, "card_declined").await;

        Ok(AppError::PaymentDeclined {
            payment_id: payment.id,
        })
    }

    async fn settle(
        &self,
        operation: &str,
        payment_id: Uuid,
        booking_id: Uuid,
    ) -> AppResult<SettledPayment> {
        let result = retry_transient_while_progressing(
            operation,
            self.max_attempts,
            move || self.settle_once(payment_id, booking_id),
            move || async move {
                self.inventory_repo
                    .lines_for_booking(booking_id)
                    .await
                    .map_err(AppError::from)
            },
        )
        .await;

        match result {
            Err(AppError::TransientConflict(reason)) => {
                Err(self.conflicts_exhausted(payment_id, booking_id, reason).await?)
            }
            other => other,
        }
    }

    /// Report a short line when the ledger explains the lost races
    async fn conflicts_exhausted(
        &self,
        payment_id: Uuid,
        booking_id: Uuid,
        reason: String,
    ) -> AppResult<AppError> {
        let lines = self.inventory_repo.lines_for_booking(booking_id).await?;

        match lines.into_iter().find(|line| line.is_short()) {
            Some(line) => {
                info!(
                    payment_id = %payment_id,
                    ticket_type = %line.ticket_type_name,
                    requested = line.requested,
                    available = line.remaining(),
                    "Settlement gave up, inventory sold out under contention"
                );
                let available = line.remaining();
                Ok(AppError::InsufficientInventory {
                    ticket_type_id: line.ticket_type_id,
                    ticket_type_name: line.ticket_type_name,
                    requested: line.requested,
                    available,
                })
            }
            None => {
                warn!(payment_id = %payment_id, %reason, "Settlement gave up after repeated conflicts");
                Ok(AppError::TransientConflict(reason))
            }
        }
    }

    async fn settle_once(&self, payment_id: Uuid, booking_id: Uuid) -> AppResult<SettledPayment> {
        let now = Utc::now();
        let mut tx = begin_serializable(&self.pool).await?;

        // Booking, then payment, then ledger rows; cancel and expiry lock in the same order.
        let booking = BookingRepository::lock_by_id(&mut tx, booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Booking {} not found", booking_id)))?;

        let payment = PaymentRepository::lock_by_id(&mut tx, payment_id)
            .await?
            .filter(|p| p.booking_id == booking.id)
            .ok_or_else(|| AppError::NotFound(format!("Payment {} not found", payment_id)))?;

        if payment.status != PaymentStatus::Pending {
            return Err(AppError::InvalidState(format!(
                "Payment {} is already {}",
                payment.id,
                payment.status.label()
            )));
        }

        if booking.status != BookingStatus::Pending {
            return Err(AppError::InvalidState(format!(
                "Booking {} is {}",
                booking.id,
                booking.status.label()
            )));
        }

        // Deadline wins over stock: an expired booking never reaches the ledger.
        if booking.is_expired_at(now) {
            PaymentRepository::transition(
                &mut tx,
                payment.id,
                PaymentStatus::Pending,
                PaymentStatus::Failed,
                None,
            )
            .await?;
            BookingRepository::transition(
                &mut tx,
                booking.id,
                BookingStatus::Pending,
                BookingStatus::Expired,
            )
            .await?;
            tx.commit().await?;

            info!(payment_id = %payment.id, booking_id = %booking.id, "Settlement rejected, booking expired");
            self.audit_failure(payment.id, booking.id, "booking_expired").await;

            return Err(AppError::Expired {
                booking_id: booking.id,
                expires_at: booking.expires_at,
            });
        }

        if payment.amount != booking.total_amount {
            return Err(AppError::InvalidState(format!(
                "Payment {} is for {} but booking {} now totals {}",
                payment.id, payment.amount, booking.id, booking.total_amount
            )));
        }

        let items = BookingRepository::items_in(&mut tx, booking.id).await?;
        if items.is_empty() {
            return Err(AppError::InvalidState(format!(
                "Booking {} has no items",
                booking.id
            )));
        }

        let ticket_type_ids: Vec<Uuid> = items.iter().map(|i| i.ticket_type_id).collect();
        let ledger: HashMap<Uuid, TicketType> =
            InventoryRepository::lock_for_update(&mut tx, &ticket_type_ids)
                .await?
                .into_iter()
                .map(|tt| (tt.id, tt))
                .collect();

        // Every line must pass before any line is committed; returning here drops
        // the transaction and rolls it back.
        for item in &items {
            let ticket_type = ledger.get(&item.ticket_type_id).ok_or_else(|| {
                AppError::NotFound(format!("Ticket type {} not found", item.ticket_type_id))
            })?;

            if !ticket_type.can_fulfil(item.quantity) {
                info!(
                    payment_id = %payment.id,
                    ticket_type = %ticket_type.name,
                    requested = item.quantity,
                    available = ticket_type.available_count(),
                    "Settlement rejected, insufficient inventory"
                );
                return Err(AppError::InsufficientInventory {
                    ticket_type_id: ticket_type.id,
                    ticket_type_name: ticket_type.name.clone(),
                    requested: item.quantity,
                    available: ticket_type.available_count(),
                });
            }
        }

        for item in &items {
            InventoryRepository::commit(&mut tx, item.ticket_type_id, item.quantity).await?;
        }

        let payment_moved = PaymentRepository::transition(
            &mut tx,
            payment.id,
            PaymentStatus::Pending,
            PaymentStatus::Completed,
            Some(now),
        )
        .await?;
        let booking_moved = BookingRepository::transition(
            &mut tx,
            booking.id,
            BookingStatus::Pending,
            BookingStatus::Confirmed,
        )
        .await?;

        if !(payment_moved && booking_moved) {
            return Err(AppError::TransientConflict(format!(
                "Payment {} changed during settlement",
                payment.id
            )));
        }

        tx.commit().await?;

        let settled = SettledPayment {
            payment: Payment {
                status: PaymentStatus::Completed,
                paid_at: Some(now),
                ..payment
            },
            booking: Booking {
                status: BookingStatus::Confirmed,
                ..booking
            },
        };

        info!(
            payment_id = %settled.payment.id,
            booking_id = %settled.booking.id,
            amount = %settled.payment.amount,
            lines = items.len(),
            "Payment settled"
        );

        if let Some(audit) = &self.audit {
            if let Err(e) = audit
                .log_payment_completed(&settled.payment, &settled.booking)
                .await
            {
                error!("Failed to write audit entry: {}", e);
            }
        }

        Ok(settled)
    }

    async fn audit_failure(&self, payment_id: Uuid, booking_id: Uuid, reason: &str) {
        if let Some(audit) = &self.audit {
            if let Err(e) = audit.log_payment_failed(payment_id, booking_id, reason).await {
                error!("Failed to write audit entry: {}", e);
            }
        }
    }
}
