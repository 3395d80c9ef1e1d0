//! Checkout: turns a pending booking into a pending payment.

use crate::error::{AppError, AppResult};
use crate::models::{Booking, BookingStatus, Payment, PaymentMethod, PaymentStatus};
use crate::repositories::{BookingRepository, PaymentRepository};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const REFERENCE_PREFIX: &str = "MMH";
const MAX_REFERENCE_ATTEMPTS: usize = 5;

pub const MONEY_MARKET_INSTRUCTIONS: &str = "Take this reference code to any participating \
Money Market outlet to complete your payment. You have 24 hours to pay.";

/// Everything a payer needs to settle at a Money Market outlet
#[derive(Debug, Clone)]
pub struct MoneyMarketDetails {
    pub payment_id: Uuid,
    pub reference_code: String,
    pub amount: Decimal,
    pub qr_code_data: String,
    pub expires_at: DateTime<Utc>,
    pub instructions: String,
}

/// `MMH` + `yyyyMMdd` + four random digits
pub fn generate_reference_code(now: DateTime<Utc>) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(1000..9999);
    format!("{}{}{}", REFERENCE_PREFIX, now.format("%Y%m%d"), suffix)
}

/// Payload encoded into the outlet QR code
pub fn qr_payload(reference_code: &str, amount: Decimal, at: DateTime<Utc>) -> String {
    format!(
        "{}|{}|{:.2}|{}",
        REFERENCE_PREFIX,
        reference_code,
        amount,
        at.format("%Y%m%d%H%M%S")
    )
}

pub struct CheckoutService {
    pool: PgPool,
    booking_repo: Arc<BookingRepository>,
    payment_repo: Arc<PaymentRepository>,
    payment_window: Duration,
}

impl CheckoutService {
    pub fn new(
        pool: PgPool,
        booking_repo: Arc<BookingRepository>,
        payment_repo: Arc<PaymentRepository>,
        payment_window: Duration,
    ) -> Self {
        Self {
            pool,
            booking_repo,
            payment_repo,
            payment_window,
        }
    }

    /// Create the pending payment for a booking.
    ///
    /// Runs in one transaction holding the booking row lock, so the amount
    /// charged is the total of the cart as it stands at checkout. Repeating
    /// the call with the same method returns the existing pending payment. A
    /// failed payment on a still-pending booking is superseded, not deleted.
    pub async fn initiate_checkout(
        &self,
        user_id: Uuid,
        booking_id: Uuid,
        method: PaymentMethod,
    ) -> AppResult<Payment> {
        let mut tx = self.pool.begin().await?;

        let booking = BookingRepository::lock_by_id(&mut tx, booking_id)
            .await?
            .filter(|b| b.user_id == user_id)
            .ok_or_else(|| AppError::NotFound(format!("Booking {} not found", booking_id)))?;

        if booking.status != BookingStatus::Pending {
            return Err(AppError::InvalidState(format!(
                "Booking {} is {}, only pending bookings can be checked out",
                booking_id,
                booking.status.label()
            )));
        }

        let now = Utc::now();
        if booking.is_expired_at(now) {
            BookingRepository::transition(
                &mut tx,
                booking_id,
                BookingStatus::Pending,
                BookingStatus::Expired,
            )
            .await?;
            PaymentRepository::fail_pending_for_booking(&mut tx, booking_id).await?;
            tx.commit().await?;

            info!(booking_id = %booking_id, "Booking expired at checkout");
            return Err(AppError::Expired {
                booking_id,
                expires_at: booking.expires_at,
            });
        }

        if booking.total_amount <= Decimal::ZERO {
            return Err(AppError::InvalidState(format!(
                "Booking {} has nothing to pay for",
                booking_id
            )));
        }

        if let Some(existing) = PaymentRepository::find_current(&mut tx, booking_id).await? {
            match existing.status {
                PaymentStatus::Pending if existing.payment_method == method => {
                    return Ok(existing);
                }
                PaymentStatus::Pending => {
                    return Err(AppError::InvalidState(format!(
                        "Booking already has a pending {} payment",
                        existing.payment_method.label()
                    )));
                }
                PaymentStatus::Completed => {
                    return Err(AppError::InvalidState(format!(
                        "Payment {} is already completed",
                        existing.id
                    )));
                }
                PaymentStatus::Failed => {
                    PaymentRepository::supersede_failed(&mut tx, existing.id).await?;
                    debug!(payment_id = %existing.id, "Failed payment superseded");
                }
            }
        }

        let expires_at = match method {
            PaymentMethod::MoneyMarket => Some(now + self.payment_window),
            PaymentMethod::Card => None,
        };

        for attempt in 1..=MAX_REFERENCE_ATTEMPTS {
            let reference_code = match method {
                PaymentMethod::MoneyMarket => Some(generate_reference_code(now)),
                PaymentMethod::Card => None,
            };

            let inserted = PaymentRepository::insert_pending(
                &mut tx,
                booking_id,
                method,
                booking.total_amount,
                reference_code.as_deref(),
                expires_at,
            )
            .await?;

            match inserted {
                Some(payment) => {
                    tx.commit().await?;
                    info!(
                        payment_id = %payment.id,
                        booking_id = %booking_id,
                        method = method.label(),
                        amount = %payment.amount,
                        "Checkout initiated"
                    );
                    return Ok(payment);
                }
                // The booking row is locked, so only the reference code can clash.
                None if method == PaymentMethod::MoneyMarket => {
                    warn!(attempt, "Reference code collision, regenerating");
                }
                None => break,
            }
        }

        Err(AppError::TransientConflict(format!(
            "Could not create a payment for booking {}",
            booking_id
        )))
    }

    /// Outlet details for the caller's pending Money Market payment
    pub async fn money_market_details(
        &self,
        user_id: Uuid,
        payment_id: Uuid,
    ) -> AppResult<MoneyMarketDetails> {
        let payment = self
            .payment_repo
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Payment {} not found", payment_id)))?;
        self.owned_booking(user_id, payment.booking_id)
            .await
            .map_err(|_| AppError::NotFound(format!("Payment {} not found", payment_id)))?;

        if payment.payment_method != PaymentMethod::MoneyMarket {
            return Err(AppError::InvalidState(format!(
                "Payment {} is not a Money Market payment",
                payment_id
            )));
        }
        if payment.status != PaymentStatus::Pending {
            return Err(AppError::InvalidState(format!(
                "Payment {} is already {}",
                payment_id,
                payment.status.label()
            )));
        }

        let reference_code = payment.reference_code.clone().ok_or_else(|| {
            AppError::Message(format!("Payment {} has no reference code", payment_id))
        })?;
        let expires_at = payment
            .expires_at
            .unwrap_or(payment.created_at + self.payment_window);

        Ok(MoneyMarketDetails {
            payment_id,
            qr_code_data: qr_payload(&reference_code, payment.amount, Utc::now()),
            reference_code,
            amount: payment.amount,
            expires_at,
            instructions: MONEY_MARKET_INSTRUCTIONS.to_string(),
        })
    }

    async fn owned_booking(&self, user_id: Uuid, booking_id: Uuid) -> AppResult<Booking> {
        self.booking_repo
            .find_by_id(booking_id)
            .await?
            .filter(|b| b.user_id == user_id)
            .ok_or_else(|| AppError::NotFound(format!("Booking {} not found", booking_id)))
    }
}
