//! Payment domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{MerchantId, PaymentId};
use super::money::Money;
use super::refund::Refund;
use crate::error::DomainError;

/// Lifecycle status of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Submitted, not yet authorized by the acquiring bank
    Pending,
    /// Authorized; refunds may be raised against it
    Completed,
    /// Terminal failure
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
        }
    }

    /// Status only ever moves forward out of Pending. Staying put is allowed.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        *self == next
            || matches!(
                (self, next),
                (PaymentStatus::Pending, PaymentStatus::Completed)
                    | (PaymentStatus::Pending, PaymentStatus::Failed)
            )
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PaymentStatus::Pending),
            "COMPLETED" => Ok(PaymentStatus::Completed),
            "FAILED" => Ok(PaymentStatus::Failed),
            other => Err(DomainError::ValidationError(format!(
                "unknown payment status: {other}"
            ))),
        }
    }
}

/// A merchant's money-collection record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub merchant_id: MerchantId,
    /// Remaining amount; only decreases, and only through completed refunds
    pub amount: Money,
    pub status: PaymentStatus,
    pub payment_method: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Creates a new pending payment.
    pub fn new(
        merchant_id: MerchantId,
        amount: Money,
        payment_method: String,
        description: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: PaymentId::new(),
            merchant_id,
            amount,
            status: PaymentStatus::Pending,
            payment_method,
            description,
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves the payment to `next`, refreshing `updated_at`.
    pub fn transition(&mut self, next: PaymentStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Returns this payment with `refund` deducted from its amount.
    ///
    /// The payment itself is not modified; the caller persists the result
    /// together with the refund's completion.
    pub fn debited_by(&self, refund: &Refund) -> Result<Payment, DomainError> {
        let mut debited = self.clone();
        debited.amount = self.amount.checked_sub(refund.amount)?;
        debited.updated_at = Utc::now();
        Ok(debited)
    }
}
