use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::ParseStatusError;

/// Booking lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Expired,
    Cancelled,
}

impl BookingStatus {
    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Expired => "expired",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// Display label used on the wire
    pub fn label(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "Pending",
            BookingStatus::Confirmed => "Confirmed",
            BookingStatus::Expired => "Expired",
            BookingStatus::Cancelled => "Cancelled",
        }
    }

    /// Statuses reachable from `self`
    pub fn allowed_transitions(&self) -> &'static [BookingStatus] {
        match self {
            BookingStatus::Pending => &[
                BookingStatus::Confirmed,
                BookingStatus::Expired,
                BookingStatus::Cancelled,
            ],
            BookingStatus::Confirmed => &[BookingStatus::Cancelled],
            BookingStatus::Expired | BookingStatus::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }
}

impl TryFrom<String> for BookingStatus {
    type Error = ParseStatusError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl std::str::FromStr for BookingStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "expired" => Ok(BookingStatus::Expired),
            "cancelled" => Ok(BookingStatus::Cancelled),
            _ => Err(ParseStatusError::new("booking status", s)),
        }
    }
}

/// One reservation attempt by a user for a single event
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub total_amount: Decimal,
    #[sqlx(try_from = "String")]
    pub status: BookingStatus,
    pub booked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn is_pending(&self) -> bool {
        self.status == BookingStatus::Pending
    }

    /// Deadline check used at every point of use
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// Line item with its price snapshot
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BookingItem {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub ticket_type_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl BookingItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Line item joined with its ticket type and event, for display
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BookingItemDetail {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub ticket_type_id: Uuid,
    pub ticket_type_name: String,
    pub event_title: String,
    pub event_start: DateTime<Utc>,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl BookingItemDetail {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Sum of line totals
pub fn total_of(items: &[BookingItem]) -> Decimal {
    items.iter().map(BookingItem::line_total).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booking_transitions() {
        assert!(BookingStatus::Pending.can_transition_to(BookingStatus::Confirmed));
        assert!(BookingStatus::Pending.can_transition_to(BookingStatus::Expired));
        assert!(BookingStatus::Pending.can_transition_to(BookingStatus::Cancelled));
        assert!(BookingStatus::Confirmed.can_transition_to(BookingStatus::Cancelled));

        assert!(!BookingStatus::Confirmed.can_transition_to(BookingStatus::Pending));
        assert!(!BookingStatus::Expired.can_transition_to(BookingStatus::Confirmed));
        assert!(BookingStatus::Expired.is_terminal());
        assert!(BookingStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_booking_status_round_trips_through_db_string() {
        for status in [
            BookingStatus::Pending,
            BookingStatus::Confirmed,
            BookingStatus::Expired,
            BookingStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<BookingStatus>().unwrap(), status);
        }
        assert!("Pending".parse::<BookingStatus>().is_ok());
        assert!("refunded".parse::<BookingStatus>().is_err());
    }

    #[test]
    fn test_total_of_line_items() {
        let booking_id = Uuid::new_v4();
        let items = vec![
            BookingItem {
                id: Uuid::new_v4(),
                booking_id,
                ticket_type_id: Uuid::new_v4(),
                quantity: 2,
                unit_price: Decimal::new(2550, 2),
            },
            BookingItem {
                id: Uuid::new_v4(),
                booking_id,
                ticket_type_id: Uuid::new_v4(),
                quantity: 3,
                unit_price: Decimal::new(1000, 2),
            },
        ];

        assert_eq!(total_of(&items), Decimal::new(8100, 2));
    }
}
