use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::ParseStatusError;

/// Payment lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Completed => "Completed",
            PaymentStatus::Failed => "Failed",
        }
    }

    /// Completed and Failed are terminal
    pub fn allowed_transitions(&self) -> &'static [PaymentStatus] {
        match self {
            PaymentStatus::Pending => &[PaymentStatus::Completed, PaymentStatus::Failed],
            PaymentStatus::Completed | PaymentStatus::Failed => &[],
        }
    }

    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }
}

impl TryFrom<String> for PaymentStatus {
    type Error = ParseStatusError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            _ => Err(ParseStatusError::new("payment status", s)),
        }
    }
}

/// How the payer settles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    Card,
    MoneyMarket,
}

impl PaymentMethod {
    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::MoneyMarket => "money_market",
        }
    }

    /// Name used on the wire ("Card" / "MoneyMarket")
    pub fn label(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "Card",
            PaymentMethod::MoneyMarket => "MoneyMarket",
        }
    }
}

impl TryFrom<String> for PaymentMethod {
    type Error = ParseStatusError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "card" => Ok(PaymentMethod::Card),
            "moneymarket" | "money_market" => Ok(PaymentMethod::MoneyMarket),
            _ => Err(ParseStatusError::new("payment method", s)),
        }
    }
}

/// Payment attached 1:1 to a booking
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub booking_id: Uuid,
    #[sqlx(try_from = "String")]
    pub payment_method: PaymentMethod,
    pub amount: Decimal,
    #[sqlx(try_from = "String")]
    pub status: PaymentStatus,
    pub reference_code: Option<String>,
    pub card_fingerprint: Option<String>,
    pub card_last_four: Option<String>,
    /// Payer-facing deadline for the reference-code flow
    pub expires_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    /// Set once a failed attempt has been replaced by a new checkout
    pub superseded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn is_pending(&self) -> bool {
        self.status == PaymentStatus::Pending
    }

    pub fn is_superseded(&self) -> bool {
        self.superseded_at.is_some()
    }
}

/// Card data as supplied by the payer. Never persisted.
#[derive(Clone, Default, Deserialize)]
pub struct CardDetails {
    pub cardholder_name: String,
    pub card_number: String,
    pub expiry_date: String,
    pub cvv: String,
}

impl CardDetails {
    fn digits(&self) -> String {
        self.card_number.chars().filter(char::is_ascii_digit).collect()
    }

    pub fn last_four(&self) -> Option<String> {
        let digits = self.digits();
        (digits.len() >= 4).then(|| digits[digits.len() - 4..].to_string())
    }

    /// SHA-256 of the card number digits, hex encoded
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(self.digits().as_bytes());
        hex::encode(hasher.finalize())
    }
}

// Keep card numbers out of logs.
impl std::fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardDetails")
            .field("cardholder_name", &self.cardholder_name)
            .field("last_four", &self.last_four())
            .finish_non_exhaustive()
    }
}
