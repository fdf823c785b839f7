use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

pub const ANONYMOUS_DONOR: &str = "Anonymous";

/// Upper bound for a single pledge or campaign target. Keeps region and
/// campaign totals well inside `i64`.
pub const MAX_AMOUNT: i64 = 1_000_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn from_db(value: i16) -> Option<Self> {
        match value {
            0 => Some(Self::Pending),
            1 => Some(Self::Success),
            2 => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_db(self) -> i16 {
        match self {
            Self::Pending => 0,
            Self::Success => 1,
            Self::Failed => 2,
        }
    }
}

impl From<PaymentStatus> for i16 {
    fn from(status: PaymentStatus) -> Self {
        status.as_db()
    }
}

impl TryFrom<i16> for PaymentStatus {
    type Error = String;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        Self::from_db(value).ok_or_else(|| format!("unknown payment status: {}", value))
    }
}

/// Final state reported by the payment gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Success,
    Failed,
}

impl PaymentOutcome {
    pub fn status(self) -> PaymentStatus {
        match self {
            Self::Success => PaymentStatus::Success,
            Self::Failed => PaymentStatus::Failed,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "success" | "1" => Some(Self::Success),
            "failed" | "2" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Donation {
    pub id: i64,
    pub donor_name: String,
    pub amount: i64,
    pub message: Option<String>,
    pub region_id: i64,
    pub campaign_id: Option<i64>,
    pub payment_status: PaymentStatus,
    pub payment_reference: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub finalized_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone)]
pub struct DonationDraft {
    pub donor_name: String,
    pub amount: i64,
    pub message: Option<String>,
    pub region_id: i64,
    pub campaign_id: Option<i64>,
    pub payment_reference: Uuid,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Default)]
pub struct DonationPledge {
    pub donor_name: Option<String>,
    pub amount: Option<i64>,
    pub message: Option<String>,
    pub region_id: Option<i64>,
    pub campaign_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DonationFilter {
    pub region_id: Option<i64>,
    pub payment_status: Option<PaymentStatus>,
    pub campaign_id: Option<i64>,
}

/// Result of applying a gateway outcome to a donation.
#[derive(Debug, Clone)]
pub enum Settlement {
    /// The donation moved out of Pending in this call.
    Applied(Donation),
    /// The donation was already final; nothing changed.
    AlreadyFinal(Donation),
}
