use crate::error::RepositoryError;
use crate::models::{Booking, BookingItem, BookingItemDetail, BookingStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// Counts from one expiry sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpiredCounts {
    pub bookings: u64,
    pub payments: u64,
}

/// Repository for bookings and their line items
#[derive(Clone)]
pub struct BookingRepository {
    pool: PgPool,
}

impl BookingRepository {
    /// Create a new BookingRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Find a booking by UUID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Booking>, RepositoryError> {
        let booking = sqlx::query_as::<_, Booking>(
            r#"
            SELECT id, user_id, event_id, total_amount, status, booked_at, expires_at, updated_at
            FROM bookings
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(booking)
    }

    /// The user's most recently touched pending booking
    pub async fn find_pending_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<Booking>, RepositoryError> {
        let booking = sqlx::query_as::<_, Booking>(
            r#"
            SELECT id, user_id, event_id, total_amount, status, booked_at, expires_at, updated_at
            FROM bookings
            WHERE user_id = $1 AND status = 'pending'
            ORDER BY updated_at DESC, id
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(booking)
    }

    /// All bookings of a user, newest first
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Booking>, RepositoryError> {
        let bookings = sqlx::query_as::<_, Booking>(
            r#"
            SELECT id, user_id, event_id, total_amount, status, booked_at, expires_at, updated_at
            FROM bookings
            WHERE user_id = $1
            ORDER BY booked_at DESC, id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(bookings)
    }

    /// Line items of a booking
    pub async fn items(&self, booking_id: Uuid) -> Result<Vec<BookingItem>, RepositoryError> {
        Self::items_in(&mut *self.pool.acquire().await?, booking_id).await
    }

    /// Line items read inside an open transaction
    pub async fn items_in(
        conn: &mut PgConnection,
        booking_id: Uuid,
    ) -> Result<Vec<BookingItem>, RepositoryError> {
        let items = sqlx::query_as::<_, BookingItem>(
            r#"
            SELECT id, booking_id, ticket_type_id, quantity, unit_price
            FROM booking_items
            WHERE booking_id = $1
            ORDER BY ticket_type_id
            "#,
        )
        .bind(booking_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(items)
    }

    /// Line items of several bookings joined with ticket type and event names
    pub async fn item_details(
        &self,
        booking_ids: &[Uuid],
    ) -> Result<Vec<BookingItemDetail>, RepositoryError> {
        let items = sqlx::query_as::<_, BookingItemDetail>(
            r#"
            SELECT bi.id, bi.booking_id, bi.ticket_type_id,
                   tt.name AS ticket_type_name,
                   e.title AS event_title,
                   e.start_date_time AS event_start,
                   bi.quantity, bi.unit_price
            FROM booking_items bi
            JOIN ticket_types tt ON tt.id = bi.ticket_type_id
            JOIN events e ON e.id = tt.event_id
            WHERE bi.booking_id = ANY($1)
            ORDER BY bi.booking_id, tt.name
            "#,
        )
        .bind(booking_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    // =========================================================================
    // Transaction-scoped writes
    // =========================================================================

    /// Lock a booking row for the rest of the transaction
    pub async fn lock_by_id(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<Option<Booking>, RepositoryError> {
        let booking = sqlx::query_as::<_, Booking>(
            r#"
            SELECT id, user_id, event_id, total_amount, status, booked_at, expires_at, updated_at
            FROM bookings
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(booking)
    }

    /// Get the user's pending booking for an event, creating it if absent, and lock it.
    ///
    /// The partial unique index on (user_id, event_id) WHERE status = 'pending'
    /// makes concurrent callers converge on the same row.
    pub async fn lock_or_create_pending(
        conn: &mut PgConnection,
        user_id: Uuid,
        event_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<Booking, RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO bookings (user_id, event_id, total_amount, status, expires_at)
            VALUES ($1, $2, 0, 'pending', $3)
            ON CONFLICT (user_id, event_id) WHERE status = 'pending' DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(event_id)
        .bind(expires_at)
        .execute(&mut *conn)
        .await?;

        sqlx::query_as::<_, Booking>(
            r#"
            SELECT id, user_id, event_id, total_amount, status, booked_at, expires_at, updated_at
            FROM bookings
            WHERE user_id = $1 AND event_id = $2 AND status = 'pending'
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .bind(event_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| {
            RepositoryError::SerializationFailure(
                "Pending booking disappeared while adding to cart".to_string(),
            )
        })
    }

    /// Add `quantity` to the booking's line for a ticket type, creating the line if needed.
    ///
    /// An existing line keeps its original price snapshot.
    pub async fn upsert_item(
        conn: &mut PgConnection,
        booking_id: Uuid,
        ticket_type_id: Uuid,
        quantity: i32,
        unit_price: Decimal,
    ) -> Result<BookingItem, RepositoryError> {
        let item = sqlx::query_as::<_, BookingItem>(
            r#"
            INSERT INTO booking_items (booking_id, ticket_type_id, quantity, unit_price)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (booking_id, ticket_type_id)
            DO UPDATE SET quantity = booking_items.quantity + EXCLUDED.quantity
            RETURNING id, booking_id, ticket_type_id, quantity, unit_price
            "#,
        )
        .bind(booking_id)
        .bind(ticket_type_id)
        .bind(quantity)
        .bind(unit_price)
        .fetch_one(&mut *conn)
        .await?;

        Ok(item)
    }

    /// Recompute `total_amount` from the lines and slide the deadline
    pub async fn refresh_total(
        conn: &mut PgConnection,
        booking_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<Booking, RepositoryError> {
        let booking = sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings
            SET total_amount = COALESCE(
                    (SELECT SUM(quantity * unit_price) FROM booking_items WHERE booking_id = $1),
                    0),
                expires_at = $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, user_id, event_id, total_amount, status, booked_at, expires_at, updated_at
            "#,
        )
        .bind(booking_id)
        .bind(expires_at)
        .fetch_one(&mut *conn)
        .await?;

        Ok(booking)
    }

    /// Compare-and-set the status. Returns false when the row was not in `from`.
    pub async fn transition(
        conn: &mut PgConnection,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
    ) -> Result<bool, RepositoryError> {
        if !from.can_transition_to(to) {
            return Err(RepositoryError::ConstraintViolation(format!(
                "Booking cannot move from {} to {}",
                from.label(),
                to.label()
            )));
        }

        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Delete a pending booking owned by the user; items and payment cascade
    pub async fn delete_pending(
        &self,
        user_id: Uuid,
        booking_id: Uuid,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            DELETE FROM bookings
            WHERE id = $1 AND user_id = $2 AND status = 'pending'
            "#,
        )
        .bind(booking_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Expire every pending booking past its deadline and fail its pending payment
    pub async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<ExpiredCounts, RepositoryError> {
        let (bookings, payments): (i64, i64) = sqlx::query_as(
            r#"
            WITH expired AS (
                UPDATE bookings
                SET status = 'expired', updated_at = NOW()
                WHERE status = 'pending' AND expires_at < $1
                RETURNING id
            ),
            failed AS (
                UPDATE payments
                SET status = 'failed'
                WHERE status = 'pending' AND booking_id IN (SELECT id FROM expired)
                RETURNING id
            )
            SELECT (SELECT COUNT(*) FROM expired), (SELECT COUNT(*) FROM failed)
            "#,
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(ExpiredCounts {
            bookings: bookings as u64,
            payments: payments as u64,
        })
    }
}
