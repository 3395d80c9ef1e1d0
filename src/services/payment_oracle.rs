//! Card authorization oracle.
//!
//! Settlement treats the gateway as a yes/no answer for a charge attempt.
//! Card data passes through here and is never persisted.

use crate::error::{AppError, AppResult};
use crate::models::{CardDetails, Payment};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Black-box authorization of a card charge
#[async_trait]
pub trait CardPaymentOracle: Send + Sync {
    /// `Ok(true)` approves, `Ok(false)` declines; `Err` means the gateway could not answer
    async fn authorize(&self, payment: &Payment, card: &CardDetails) -> AppResult<bool>;
}

/// Built-in gateway: approves any card with all four fields filled in
#[derive(Debug, Clone, Default)]
pub struct SimulatedCardOracle;

#[async_trait]
impl CardPaymentOracle for SimulatedCardOracle {
    async fn authorize(&self, payment: &Payment, card: &CardDetails) -> AppResult<bool> {
        let approved = [
            &card.cardholder_name,
            &card.card_number,
            &card.expiry_date,
            &card.cvv,
        ]
        .iter()
        .all(|field| !field.trim().is_empty());

        debug!(payment_id = %payment.id, approved, "Simulated card authorization");
        Ok(approved)
    }
}

#[derive(Debug, Deserialize)]
struct GatewayDecision {
    approved: bool,
}

/// Gateway reached over HTTP
pub struct HttpCardOracle {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpCardOracle {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl CardPaymentOracle for HttpCardOracle {
    async fn authorize(&self, payment: &Payment, card: &CardDetails) -> AppResult<bool> {
        let body = serde_json::json!({
            "payment_id": payment.id,
            "amount": payment.amount.to_string(),
            "cardholder_name": card.cardholder_name,
            "card_number": card.card_number,
            "expiry_date": card.expiry_date,
            "cvv": card.cvv,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Card gateway unreachable: {}", e)))?;

        if !response.status().is_success() {
            warn!(
                payment_id = %payment.id,
                status = %response.status(),
                "Card gateway returned an error status"
            );
            return Err(AppError::ExternalService(format!(
                "Card gateway responded with {}",
                response.status()
            )));
        }

        let decision = response
            .json::<GatewayDecision>()
            .await
            .map_err(|e| AppError::ExternalService(format!("Malformed gateway response: {}", e)))?;

        Ok(decision.approved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PaymentMethod, PaymentStatus};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn pending_card_payment() -> Payment {
        Payment {
            id: Uuid::new_v4(),
            booking_id: Uuid::new_v4(),
            payment_method: PaymentMethod::Card,
            amount: Decimal::new(4000, 2),
            status: PaymentStatus::Pending,
            reference_code: None,
            card_fingerprint: None,
            card_last_four: None,
            expires_at: None,
            paid_at: None,
            superseded_at: None,
            created_at: chrono::Utc::now(),
        }
    }

    fn card() -> CardDetails {
        CardDetails {
            cardholder_name: "Grace Hopper".to_string(),
            card_number: "5555 4444 3333 1111".to_string(),
            expiry_date: "01/29".to_string(),
            cvv: "321".to_string(),
        }
    }

    #[test]
    fn test_simulated_oracle_approves_complete_card() {
        let approved =
            tokio_test::block_on(SimulatedCardOracle.authorize(&pending_card_payment(), &card()))
                .unwrap();
        assert!(approved);
    }

    #[test]
    fn test_simulated_oracle_declines_missing_cvv() {
        let card = CardDetails {
            cvv: "  ".to_string(),
            ..card()
        };
        let approved =
            tokio_test::block_on(SimulatedCardOracle.authorize(&pending_card_payment(), &card))
                .unwrap();
        assert!(!approved);
    }

    #[tokio::test]
    async fn test_http_oracle_reports_unreachable_gateway() {
        let oracle = HttpCardOracle::new("http://127.0.0.1:9/authorize")
            .with_timeout(Duration::from_millis(200));

        let result = oracle.authorize(&pending_card_payment(), &card()).await;
        assert!(matches!(result, Err(AppError::ExternalService(_))));
    }
}
