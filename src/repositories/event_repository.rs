use crate::error::RepositoryError;
use crate::models::{Event, NewEvent, NewTicketType, TicketType};
use sqlx::PgPool;
use uuid::Uuid;

/// Repository for the event catalog and its ticket types
#[derive(Clone)]
pub struct EventRepository {
    pool: PgPool,
}

impl EventRepository {
    /// Create a new EventRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new event
    pub async fn create_event(&self, input: &NewEvent) -> Result<Event, RepositoryError> {
        input.validate().map_err(RepositoryError::InvalidInput)?;

        let event = sqlx::query_as::<_, Event>(
            r#"
            INSERT INTO events
                (title, description, category, location_city, venue,
                 start_date_time, end_date_time, capacity)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, title, description, category, location_city, venue,
                      start_date_time, end_date_time, capacity, created_at
            "#,
        )
        .bind(&input.title)
        .bind(&input.description)
        .bind(&input.category)
        .bind(&input.location_city)
        .bind(&input.venue)
        .bind(input.start_date_time)
        .bind(input.end_date_time)
        .bind(input.capacity)
        .fetch_one(&self.pool)
        .await?;

        Ok(event)
    }

    /// Find an event by UUID
    pub async fn find_event(&self, id: Uuid) -> Result<Option<Event>, RepositoryError> {
        let event = sqlx::query_as::<_, Event>(
            r#"
            SELECT id, title, description, category, location_city, venue,
                   start_date_time, end_date_time, capacity, created_at
            FROM events
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(event)
    }

    /// Delete an event; its ticket types go with it unless a booking line still references one
    pub async fn delete_event(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Add a ticket type to an event
    pub async fn add_ticket_type(
        &self,
        input: &NewTicketType,
    ) -> Result<TicketType, RepositoryError> {
        input.validate().map_err(RepositoryError::InvalidInput)?;

        let ticket_type = sqlx::query_as::<_, TicketType>(
            r#"
            INSERT INTO ticket_types (event_id, name, price, quantity_available)
            VALUES ($1, $2, $3, $4)
            RETURNING id, event_id, name, price, quantity_available, quantity_sold, is_active
            "#,
        )
        .bind(input.event_id)
        .bind(&input.name)
        .bind(input.price)
        .bind(input.quantity_available)
        .fetch_one(&self.pool)
        .await?;

        Ok(ticket_type)
    }

    /// Find a ticket type by UUID
    pub async fn find_ticket_type(&self, id: Uuid) -> Result<Option<TicketType>, RepositoryError> {
        let ticket_type = sqlx::query_as::<_, TicketType>(
            r#"
            SELECT id, event_id, name, price, quantity_available, quantity_sold, is_active
            FROM ticket_types
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(ticket_type)
    }

    /// List ticket types of an event
    pub async fn list_ticket_types(
        &self,
        event_id: Uuid,
    ) -> Result<Vec<TicketType>, RepositoryError> {
        let ticket_types = sqlx::query_as::<_, TicketType>(
            r#"
            SELECT id, event_id, name, price, quantity_available, quantity_sold, is_active
            FROM ticket_types
            WHERE event_id = $1
            ORDER BY price, name
            "#,
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ticket_types)
    }

    /// Activate or deactivate a ticket type
    pub async fn set_ticket_type_active(
        &self,
        id: Uuid,
        is_active: bool,
    ) -> Result<TicketType, RepositoryError> {
        sqlx::query_as::<_, TicketType>(
            r#"
            UPDATE ticket_types
            SET is_active = $2
            WHERE id = $1
            RETURNING id, event_id, name, price, quantity_available, quantity_sold, is_active
            "#,
        )
        .bind(id)
        .bind(is_active)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("Ticket type {} not found", id)))
    }

    /// Delete a ticket type.
    ///
    /// Fails with `ConstraintViolation` while any booking line references it.
    pub async fn delete_ticket_type(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM ticket_types WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
