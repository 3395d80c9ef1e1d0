//! Domain models for the ticketing backend.
//!
//! Status columns are stored as TEXT and decoded into closed enums on read,
//! so an unknown value surfaces as a decode error instead of a silent default.

pub mod booking;
pub mod event;
pub mod payment;
pub mod user;

pub use booking::{Booking, BookingItem, BookingItemDetail, BookingStatus};
pub use event::{Event, NewEvent, NewTicketType, TicketType};
pub use payment::{CardDetails, Payment, PaymentMethod, PaymentStatus};
pub use user::{User, UserRole};

/// A TEXT column held a value outside its enum
#[derive(Debug, thiserror::Error)]
#[error("Invalid {kind}: {value}")]
pub struct ParseStatusError {
    kind: &'static str,
    value: String,
}

impl ParseStatusError {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
