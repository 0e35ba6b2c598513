//! Refund domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{PaymentId, RefundId};
use super::money::Money;
use crate::error::DomainError;

/// Lifecycle status of a refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundStatus {
    Pending,
    /// The owning payment's amount has been debited
    Completed,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::Pending => "PENDING",
            RefundStatus::Completed => "COMPLETED",
        }
    }
}

impl std::fmt::Display for RefundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RefundStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(RefundStatus::Pending),
            "COMPLETED" => Ok(RefundStatus::Completed),
            other => Err(DomainError::ValidationError(format!(
                "unknown refund status: {other}"
            ))),
        }
    }
}

/// A partial or full reversal against a completed payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refund {
    pub id: RefundId,
    pub payment_id: PaymentId,
    pub amount: Money,
    pub reason: String,
    pub status: RefundStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Refund {
    /// Creates a new pending refund.
    pub fn new(payment_id: PaymentId, amount: Money, reason: String) -> Self {
        let now = Utc::now();
        Self {
            id: RefundId::new(),
            payment_id,
            amount,
            reason,
            status: RefundStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Marks the refund completed. Only a pending refund can complete.
    pub fn complete(&mut self) -> Result<(), DomainError> {
        if self.status != RefundStatus::Pending {
            return Err(DomainError::InvalidTransition {
                from: self.status.to_string(),
                to: RefundStatus::Completed.to_string(),
            });
        }
        self.status = RefundStatus::Completed;
        self.updated_at = Utc::now();
        Ok(())
    }
}
