use crate::error::RepositoryError;
use crate::models::{Payment, PaymentMethod, PaymentStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// Repository for payments.
///
/// A booking has at most one live payment. Failed attempts replaced by a
/// later checkout are kept with `superseded_at` set.
#[derive(Clone)]
pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    /// Create a new PaymentRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a payment by UUID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>, RepositoryError> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, booking_id, payment_method, amount, status, reference_code,
                   card_fingerprint, card_last_four, expires_at, paid_at, superseded_at, created_at
            FROM payments
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    /// Find a payment by its Money Market reference code
    pub async fn find_by_reference_code(
        &self,
        reference_code: &str,
    ) -> Result<Option<Payment>, RepositoryError> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, booking_id, payment_method, amount, status, reference_code,
                   card_fingerprint, card_last_four, expires_at, paid_at, superseded_at, created_at
            FROM payments
            WHERE reference_code = $1
            "#,
        )
        .bind(reference_code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    /// Find the live payment attached to a booking
    pub async fn find_by_booking(&self, booking_id: Uuid) -> Result<Option<Payment>, RepositoryError> {
        Self::find_current(&mut *self.pool.acquire().await?, booking_id).await
    }

    /// Live payments attached to any of the given bookings
    pub async fn find_by_bookings(&self, booking_ids: &[Uuid]) -> Result<Vec<Payment>, RepositoryError> {
        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, booking_id, payment_method, amount, status, reference_code,
                   card_fingerprint, card_last_four, expires_at, paid_at, superseded_at, created_at
            FROM payments
            WHERE booking_id = ANY($1) AND superseded_at IS NULL
            "#,
        )
        .bind(booking_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    /// Every payment attempt for a booking, oldest first
    pub async fn attempts_for_booking(&self, booking_id: Uuid) -> Result<Vec<Payment>, RepositoryError> {
        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, booking_id, payment_method, amount, status, reference_code,
                   card_fingerprint, card_last_four, expires_at, paid_at, superseded_at, created_at
            FROM payments
            WHERE booking_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    /// Record the card used, without the card number itself
    pub async fn attach_card(
        &self,
        id: Uuid,
        fingerprint: &str,
        last_four: Option<&str>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET card_fingerprint = $2, card_last_four = $3
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(fingerprint)
        .bind(last_four)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    // =========================================================================
    // Transaction-scoped
    // =========================================================================

    /// The booking's live payment, read on the caller's connection
    pub async fn find_current(
        conn: &mut PgConnection,
        booking_id: Uuid,
    ) -> Result<Option<Payment>, RepositoryError> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, booking_id, payment_method, amount, status, reference_code,
                   card_fingerprint, card_last_four, expires_at, paid_at, superseded_at, created_at
            FROM payments
            WHERE booking_id = $1 AND superseded_at IS NULL
            "#,
        )
        .bind(booking_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(payment)
    }

    /// Insert a pending payment for a booking.
    ///
    /// Returns `None` when the insert hits a unique index: the booking already
    /// has a live payment, or `reference_code` is taken.
    pub async fn insert_pending(
        conn: &mut PgConnection,
        booking_id: Uuid,
        method: PaymentMethod,
        amount: Decimal,
        reference_code: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Payment>, RepositoryError> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (booking_id, payment_method, amount, status, reference_code, expires_at)
            VALUES ($1, $2, $3, 'pending', $4, $5)
            ON CONFLICT DO NOTHING
            RETURNING id, booking_id, payment_method, amount, status, reference_code,
                      card_fingerprint, card_last_four, expires_at, paid_at, superseded_at, created_at
            "#,
        )
        .bind(booking_id)
        .bind(method.as_str())
        .bind(amount)
        .bind(reference_code)
        .bind(expires_at)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(payment)
    }

    /// Retire a failed payment so the booking can be checked out again
    pub async fn supersede_failed(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET superseded_at = NOW()
            WHERE id = $1 AND status = 'failed' AND superseded_at IS NULL
            "#,
        )
        .bind(id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Lock a payment by id
    pub async fn lock_by_id(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<Option<Payment>, RepositoryError> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, booking_id, payment_method, amount, status, reference_code,
                   card_fingerprint, card_last_four, expires_at, paid_at, superseded_at, created_at
            FROM payments
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(payment)
    }

    /// Compare-and-set the status, stamping `paid_at` on completion.
    /// Returns false when the row was not in `from`.
    pub async fn transition(
        conn: &mut PgConnection,
        id: Uuid,
        from: PaymentStatus,
        to: PaymentStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<bool, RepositoryError> {
        if !from.can_transition_to(to) {
            return Err(RepositoryError::ConstraintViolation(format!(
                "Payment cannot move from {} to {}",
                from.label(),
                to.label()
            )));
        }

        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $3, paid_at = COALESCE($4, paid_at)
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(paid_at)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Fail the booking's payment if it is still pending
    pub async fn fail_pending_for_booking(
        conn: &mut PgConnection,
        booking_id: Uuid,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'failed'
            WHERE booking_id = $1 AND status = 'pending'
            "#,
        )
        .bind(booking_id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
