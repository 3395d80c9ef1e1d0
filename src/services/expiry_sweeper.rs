use crate::repositories::{BookingRepository, ExpiredCounts};
use crate::services::audit::AuditTrailService;
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{error, info};

/// Periodically expires pending bookings past their deadline.
///
/// Housekeeping only: checkout and settlement check the deadline themselves.
pub struct ExpirySweeper {
    booking_repo: Arc<BookingRepository>,
    audit: Option<Arc<AuditTrailService>>,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(booking_repo: Arc<BookingRepository>) -> Self {
        Self {
            booking_repo,
            audit: None,
            interval: Duration::from_secs(60),
        }
    }

    /// Set sweep interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_audit(mut self, audit: Arc<AuditTrailService>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Run forever
    pub async fn start(self) {
        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        info!("Expiry sweeper started, sweeping every {:?}", self.interval);

        loop {
            interval.tick().await;

            if let Err(e) = self.sweep_once().await {
                error!("Error in expiry sweeper: {:#}", e);
            }
        }
    }

    /// Expire overdue pending bookings and fail their pending payments
    pub async fn sweep_once(&self) -> anyhow::Result<ExpiredCounts> {
        let counts = self
            .booking_repo
            .expire_overdue(Utc::now())
            .await
            .context("expiring overdue bookings")?;

        if counts.bookings > 0 {
            info!(
                bookings = counts.bookings,
                payments = counts.payments,
                "Expired overdue bookings"
            );

            if let Some(audit) = &self.audit {
                audit
                    .log_expiry_sweep(counts.bookings, counts.payments)
                    .await
                    .context("writing sweep audit entry")?;
            }
        }

        Ok(counts)
    }
}
