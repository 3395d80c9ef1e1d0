use crate::error::{AppError, AppResult};
use crate::models::{Booking, Payment};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// Audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub timestamp: i64,
    pub event_type: String, // "payment_completed", "booking_cancelled", ...
    pub booking_id: Option<Uuid>,
    pub actor_id: Option<Uuid>,
    pub details: serde_json::Value,
}

/// Append-only JSON-lines trail of payment and booking state changes
pub struct AuditTrailService {
    log_file: PathBuf,
    file_handle: Arc<Mutex<std::fs::File>>,
}

impl AuditTrailService {
    /// Create a new audit trail service
    pub fn new(log_directory: PathBuf) -> AppResult<Self> {
        std::fs::create_dir_all(&log_directory)
            .map_err(|e| AppError::Message(format!("Failed to create log directory: {}", e)))?;

        let date = chrono::Utc::now().format("%Y-%m-%d");
        let log_file = log_directory.join(format!("audit_{}.log", date));

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .map_err(|e| AppError::Message(format!("Failed to open audit log file: {}", e)))?;

        info!("Audit trail initialized: {:?}", log_file);

        Ok(Self {
            log_file,
            file_handle: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.log_file
    }

    /// Log an audit entry
    pub async fn log(&self, entry: AuditLogEntry) -> AppResult<()> {
        let json = serde_json::to_string(&entry)?;

        let mut file = self.file_handle.lock().await;
        writeln!(file, "{}", json)
            .map_err(|e| AppError::Message(format!("Failed to write audit log: {}", e)))?;

        file.flush()
            .map_err(|e| AppError::Message(format!("Failed to flush audit log: {}", e)))?;

        Ok(())
    }

    /// Log a settled payment
    pub async fn log_payment_completed(&self, payment: &Payment, booking: &Booking) -> AppResult<()> {
        self.log(AuditLogEntry {
            timestamp: chrono::Utc::now().timestamp(),
            event_type: "payment_completed".to_string(),
            booking_id: Some(booking.id),
            actor_id: Some(booking.user_id),
            details: serde_json::json!({
                "payment_id": payment.id.to_string(),
                "method": payment.payment_method.label(),
                "amount": payment.amount.to_string(),
                "reference_code": payment.reference_code,
            }),
        })
        .await
    }

    /// Log a failed payment with the reason
    pub async fn log_payment_failed(
        &self,
        payment_id: Uuid,
        booking_id: Uuid,
        reason: &str,
    ) -> AppResult<()> {
        self.log(AuditLogEntry {
            timestamp: chrono::Utc::now().timestamp(),
            event_type: "payment_failed".to_string(),
            booking_id: Some(booking_id),
            actor_id: None,
            details: serde_json::json!({
                "payment_id": payment_id.to_string(),
                "reason": reason,
            }),
        })
        .await
    }

    /// Log a booking cancellation and how many tickets went back to stock
    pub async fn log_booking_cancelled(
        &self,
        booking: &Booking,
        actor_id: Uuid,
        released: i64,
    ) -> AppResult<()> {
        self.log(AuditLogEntry {
            timestamp: chrono::Utc::now().timestamp(),
            event_type: "booking_cancelled".to_string(),
            booking_id: Some(booking.id),
            actor_id: Some(actor_id),
            details: serde_json::json!({
                "previous_status": booking.status.label(),
                "tickets_released": released,
            }),
        })
        .await
    }

    /// Log a sweep that expired at least one booking
    pub async fn log_expiry_sweep(&self, bookings: u64, payments: u64) -> AppResult<()> {
        self.log(AuditLogEntry {
            timestamp: chrono::Utc::now().timestamp(),
            event_type: "bookings_expired".to_string(),
            booking_id: None,
            actor_id: None,
            details: serde_json::json!({
                "bookings": bookings,
                "payments_failed": payments,
            }),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_entries_are_appended_as_json_lines() {
        let dir = std::env::temp_dir().join(format!("audit-test-{}", Uuid::new_v4()));
        let audit = AuditTrailService::new(dir.clone()).unwrap();

        audit.log_expiry_sweep(2, 1).await.unwrap();
        audit
            .log_payment_failed(Uuid::new_v4(), Uuid::new_v4(), "declined")
            .await
            .unwrap();

        let contents = std::fs::read_to_string(audit.path()).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event_type"], "bookings_expired");
        assert_eq!(lines[0]["details"]["bookings"], 2);
        assert_eq!(lines[1]["details"]["reason"], "declined");

        std::fs::remove_dir_all(dir).ok();
    }
}
