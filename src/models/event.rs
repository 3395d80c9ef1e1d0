use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Event that tickets are sold for
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    pub location_city: String,
    pub venue: String,
    pub start_date_time: DateTime<Utc>,
    pub end_date_time: DateTime<Utc>,
    pub capacity: i32,
    pub created_at: DateTime<Utc>,
}

/// Input for creating an event
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub title: String,
    pub description: String,
    pub category: String,
    pub location_city: String,
    pub venue: String,
    pub start_date_time: DateTime<Utc>,
    pub end_date_time: DateTime<Utc>,
    pub capacity: i32,
}

impl NewEvent {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Event title cannot be empty".to_string());
        }
        if self.end_date_time < self.start_date_time {
            return Err("Event cannot end before it starts".to_string());
        }
        if self.capacity < 0 {
            return Err("Capacity cannot be negative".to_string());
        }
        Ok(())
    }
}

/// A priced category of seat with its own allotment.
///
/// `quantity_sold` is the ledger counter: it only moves inside a settlement
/// or cancellation transaction and always stays within `0..=quantity_available`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketType {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub quantity_available: i32,
    pub quantity_sold: i32,
    pub is_active: bool,
}

impl TicketType {
    /// Remaining sellable stock
    pub fn available_count(&self) -> i32 {
        self.quantity_available - self.quantity_sold
    }

    pub fn can_fulfil(&self, quantity: i32) -> bool {
        quantity <= self.available_count()
    }
}

/// Input for creating a ticket type
#[derive(Debug, Clone)]
pub struct NewTicketType {
    pub event_id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub quantity_available: i32,
}

impl NewTicketType {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Ticket type name cannot be empty".to_string());
        }
        if self.price < Decimal::ZERO {
            return Err("Price cannot be negative".to_string());
        }
        if self.quantity_available < 0 {
            return Err("Allotment cannot be negative".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket_type(available: i32, sold: i32) -> TicketType {
        TicketType {
            id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            name: "General".to_string(),
            price: Decimal::new(5000, 2),
            quantity_available: available,
            quantity_sold: sold,
            is_active: true,
        }
    }

    #[test]
    fn test_available_count() {
        let tt = ticket_type(10, 4);
        assert_eq!(tt.available_count(), 6);
        assert!(tt.can_fulfil(6));
        assert!(!tt.can_fulfil(7));
    }

    #[test]
    fn test_sold_out() {
        let tt = ticket_type(5, 5);
        assert_eq!(tt.available_count(), 0);
        assert!(!tt.can_fulfil(1));
    }

    #[test]
    fn test_new_ticket_type_validation() {
        let mut input = NewTicketType {
            event_id: Uuid::new_v4(),
            name: "VIP".to_string(),
            price: Decimal::new(15000, 2),
            quantity_available: 20,
        };
        assert!(input.validate().is_ok());

        input.price = Decimal::new(-1, 0);
        assert!(input.validate().is_err());
    }
}
