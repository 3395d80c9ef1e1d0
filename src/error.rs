use crate::database::DatabaseError;
use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::Error as SqlxError;
use thiserror::Error;
use uuid::Uuid;

/// Application-level error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database errors
    #[error("SQL error: {0}")]
    Sqlx(SqlxError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing entity, or one the caller does not own
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// No authenticated user on the request
    #[error("Authentication required: {0}")]
    AuthenticationRequired(String),

    /// Operation not valid for the entity's current status
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Requested quantity exceeds remaining stock
    #[error(
        "Insufficient inventory for ticket type '{ticket_type_name}' ({ticket_type_id}): requested {requested}, available {available}"
    )]
    InsufficientInventory {
        ticket_type_id: Uuid,
        ticket_type_name: String,
        requested: i32,
        available: i32,
    },

    /// Booking deadline passed
    #[error("Booking {booking_id} expired at {expires_at}")]
    Expired {
        booking_id: Uuid,
        expires_at: DateTime<Utc>,
    },

    /// Card gateway rejected the charge
    #[error("Payment {payment_id} was declined")]
    PaymentDeclined { payment_id: Uuid },

    /// Serialization failure; the whole attempt can be retried
    #[error("Transient conflict: {0}")]
    TransientConflict(String),

    /// External service errors
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// UUID parsing errors
    #[error("Invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    /// Generic error with message
    #[error("{0}")]
    Message(String),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Check if error is a database connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            AppError::Database(DatabaseError::PoolCreation(_))
                | AppError::Database(DatabaseError::ConnectionTimeout)
        )
    }

    /// Check if error is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }

    /// Whether the caller may safely retry the whole operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::TransientConflict(_)) || self.is_connection_error()
    }

    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::AuthenticationRequired(_) => "authentication_required",
            AppError::Validation(_) => "validation",
            AppError::InvalidState(_) => "invalid_state",
            AppError::InsufficientInventory { .. } => "insufficient_inventory",
            AppError::Expired { .. } => "expired",
            AppError::PaymentDeclined { .. } => "payment_declined",
            AppError::TransientConflict(_) => "transient_conflict",
            AppError::ExternalService(_) => "external_service",
            _ => "internal",
        }
    }

    /// Structured detail naming the resource and quantities involved
    pub fn detail(&self) -> serde_json::Value {
        match self {
            AppError::InsufficientInventory {
                ticket_type_id,
                ticket_type_name,
                requested,
                available,
            } => json!({
                "code": self.code(),
                "ticket_type_id": ticket_type_id,
                "ticket_type_name": ticket_type_name,
                "requested": requested,
                "available": available,
            }),
            AppError::Expired {
                booking_id,
                expires_at,
            } => json!({
                "code": self.code(),
                "booking_id": booking_id,
                "expires_at": expires_at.timestamp(),
            }),
            AppError::PaymentDeclined { payment_id } => json!({
                "code": self.code(),
                "payment_id": payment_id,
            }),
            _ => json!({
                "code": self.code(),
                "message": self.to_string(),
                "retryable": self.is_retryable(),
            }),
        }
    }
}

/// Repository-specific error types
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Database query error
    #[error("Query error: {0}")]
    Query(SqlxError),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Duplicate record
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// Constraint violation
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Serializable transaction lost a conflict (SQLSTATE 40001 / 40P01)
    #[error("Serialization failure: {0}")]
    SerializationFailure(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Ledger refused to commit more than the remaining stock
    #[error("Insufficient stock for '{ticket_type_name}': requested {requested}, available {available}")]
    InsufficientStock {
        ticket_type_id: Uuid,
        ticket_type_name: String,
        requested: i32,
        available: i32,
    },
}

impl RepositoryError {
    /// Check if error is a unique violation
    pub fn is_duplicate(&self) -> bool {
        matches!(self, RepositoryError::Duplicate(_))
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(msg) => AppError::NotFound(msg),
            RepositoryError::Query(e) => AppError::Sqlx(e),
            RepositoryError::Duplicate(msg) => AppError::InvalidState(format!("Duplicate: {}", msg)),
            RepositoryError::ConstraintViolation(msg) => AppError::InvalidState(msg),
            RepositoryError::SerializationFailure(msg) => AppError::TransientConflict(msg),
            RepositoryError::InvalidInput(msg) => AppError::Validation(msg),
            RepositoryError::InsufficientStock {
                ticket_type_id,
                ticket_type_name,
                requested,
                available,
            } => AppError::InsufficientInventory {
                ticket_type_id,
                ticket_type_name,
                requested,
                available,
            },
        }
    }
}

impl From<SqlxError> for RepositoryError {
    fn from(err: SqlxError) -> Self {
        match &err {
            SqlxError::RowNotFound => RepositoryError::NotFound("Record not found".to_string()),
            SqlxError::Database(db_err) => {
                // Check for common PostgreSQL error codes
                let code = db_err.code().map(|c| c.to_string());
                match code.as_deref() {
                    // Unique violation
                    Some("23505") => RepositoryError::Duplicate(db_err.message().to_string()),
                    // Foreign key / check constraint violation
                    Some("23503") | Some("23514") => {
                        RepositoryError::ConstraintViolation(db_err.message().to_string())
                    }
                    // Serialization failure / deadlock detected
                    Some("40001") | Some("40P01") => {
                        RepositoryError::SerializationFailure(db_err.message().to_string())
                    }
                    _ => RepositoryError::Query(err),
                }
            }
            _ => RepositoryError::Query(err),
        }
    }
}

impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::from(RepositoryError::from(err))
    }
}

/// Convenience function to convert Option<T> to Result<T, AppError>
pub fn option_to_result<T>(opt: Option<T>, error_msg: &str) -> AppResult<T> {
    opt.ok_or_else(|| AppError::NotFound(error_msg.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_failure_maps_to_transient_conflict() {
        let err = AppError::from(RepositoryError::SerializationFailure(
            "could not serialize access".to_string(),
        ));
        assert!(matches!(err, AppError::TransientConflict(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_insufficient_inventory_detail_names_ticket_type() {
        let id = Uuid::new_v4();
        let err = AppError::InsufficientInventory {
            ticket_type_id: id,
            ticket_type_name: "VIP".to_string(),
            requested: 3,
            available: 1,
        };

        let detail = err.detail();
        assert_eq!(detail["code"], "insufficient_inventory");
        assert_eq!(detail["ticket_type_name"], "VIP");
        assert_eq!(detail["requested"], 3);
        assert_eq!(detail["available"], 1);
        assert!(err.to_string().contains("VIP"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err = AppError::from(SqlxError::RowNotFound);
        assert!(err.is_not_found());
    }
}
