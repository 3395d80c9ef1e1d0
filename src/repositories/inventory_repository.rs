//! Inventory ledger: the `quantity_available` / `quantity_sold` pair per ticket type.
//!
//! Reads through the pool are advisory. Every mutation takes the open
//! transaction and locks the row before its check-then-write.

use crate::error::RepositoryError;
use crate::models::TicketType;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

/// One booking line next to the committed ledger of its ticket type
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct LedgerLine {
    pub ticket_type_id: Uuid,
    pub ticket_type_name: String,
    pub requested: i32,
    pub quantity_available: i32,
    pub quantity_sold: i32,
}

impl LedgerLine {
    pub fn remaining(&self) -> i32 {
        self.quantity_available - self.quantity_sold
    }

    pub fn is_short(&self) -> bool {
        self.requested > self.remaining()
    }
}

#[derive(Clone)]
pub struct InventoryRepository {
    pool: PgPool,
}

impl InventoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// `quantity_available - quantity_sold` as currently committed
    pub async fn available_count(&self, ticket_type_id: Uuid) -> Result<i32, RepositoryError> {
        let available: Option<i32> = sqlx::query_scalar(
            r#"
            SELECT quantity_available - quantity_sold
            FROM ticket_types
            WHERE id = $1
            "#,
        )
        .bind(ticket_type_id)
        .fetch_optional(&self.pool)
        .await?;

        available.ok_or_else(|| {
            RepositoryError::NotFound(format!("Ticket type {} not found", ticket_type_id))
        })
    }

    /// Committed ledger state for every line of a booking, ordered by ticket type
    pub async fn lines_for_booking(&self, booking_id: Uuid) -> Result<Vec<LedgerLine>, RepositoryError> {
        let lines = sqlx::query_as::<_, LedgerLine>(
            r#"
            SELECT tt.id AS ticket_type_id, tt.name AS ticket_type_name, bi.quantity AS requested,
                   tt.quantity_available, tt.quantity_sold
            FROM booking_items bi
            JOIN ticket_types tt ON tt.id = bi.ticket_type_id
            WHERE bi.booking_id = $1
            ORDER BY tt.id
            "#,
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    /// Lock the given ticket types for the rest of the transaction.
    ///
    /// Rows are locked in ascending id order so two settlements touching
    /// overlapping ticket types always acquire locks in the same order.
    pub async fn lock_for_update(
        conn: &mut PgConnection,
        ticket_type_ids: &[Uuid],
    ) -> Result<Vec<TicketType>, RepositoryError> {
        let mut ids = ticket_type_ids.to_vec();
        ids.sort();
        ids.dedup();

        let rows = sqlx::query_as::<_, TicketType>(
            r#"
            SELECT id, event_id, name, price, quantity_available, quantity_sold, is_active
            FROM ticket_types
            WHERE id = ANY($1)
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(&ids)
        .fetch_all(&mut *conn)
        .await?;

        if rows.len() != ids.len() {
            return Err(RepositoryError::NotFound(
                "One or more ticket types no longer exist".to_string(),
            ));
        }

        Ok(rows)
    }

    async fn lock_one(
        conn: &mut PgConnection,
        ticket_type_id: Uuid,
    ) -> Result<TicketType, RepositoryError> {
        sqlx::query_as::<_, TicketType>(
            r#"
            SELECT id, event_id, name, price, quantity_available, quantity_sold, is_active
            FROM ticket_types
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(ticket_type_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("Ticket type {} not found", ticket_type_id)))
    }

    /// Move `quantity` from available to sold.
    ///
    /// Fails with `InsufficientStock` when fewer than `quantity` remain.
    pub async fn commit(
        conn: &mut PgConnection,
        ticket_type_id: Uuid,
        quantity: i32,
    ) -> Result<TicketType, RepositoryError> {
        if quantity <= 0 {
            return Err(RepositoryError::InvalidInput(
                "Quantity must be greater than zero".to_string(),
            ));
        }

        let current = Self::lock_one(conn, ticket_type_id).await?;
        if !current.can_fulfil(quantity) {
            let available = current.available_count();
            return Err(RepositoryError::InsufficientStock {
                ticket_type_id,
                ticket_type_name: current.name,
                requested: quantity,
                available,
            });
        }

        let updated = sqlx::query_as::<_, TicketType>(
            r#"
            UPDATE ticket_types
            SET quantity_sold = quantity_sold + $2
            WHERE id = $1
            RETURNING id, event_id, name, price, quantity_available, quantity_sold, is_active
            "#,
        )
        .bind(ticket_type_id)
        .bind(quantity)
        .fetch_one(&mut *conn)
        .await?;

        Ok(updated)
    }

    /// Return `quantity` sold tickets to the available pool
    pub async fn release(
        conn: &mut PgConnection,
        ticket_type_id: Uuid,
        quantity: i32,
    ) -> Result<TicketType, RepositoryError> {
        if quantity <= 0 {
            return Err(RepositoryError::InvalidInput(
                "Quantity must be greater than zero".to_string(),
            ));
        }

        let current = Self::lock_one(conn, ticket_type_id).await?;
        if quantity > current.quantity_sold {
            return Err(RepositoryError::ConstraintViolation(format!(
                "Cannot release {} tickets of '{}': only {} sold",
                quantity, current.name, current.quantity_sold
            )));
        }

        let updated = sqlx::query_as::<_, TicketType>(
            r#"
            UPDATE ticket_types
            SET quantity_sold = quantity_sold - $2
            WHERE id = $1
            RETURNING id, event_id, name, price, quantity_available, quantity_sold, is_active
            "#,
        )
        .bind(ticket_type_id)
        .bind(quantity)
        .fetch_one(&mut *conn)
        .await?;

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(requested: i32, available: i32, sold: i32) -> LedgerLine {
        LedgerLine {
            ticket_type_id: Uuid::new_v4(),
            ticket_type_name: "General".to_string(),
            requested,
            quantity_available: available,
            quantity_sold: sold,
        }
    }

    #[test]
    fn test_ledger_line_short() {
        assert!(!line(2, 10, 8).is_short());
        assert!(line(3, 10, 8).is_short());
        assert_eq!(line(1, 5, 5).remaining(), 0);
    }
}
