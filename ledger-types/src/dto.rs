//! Request types accepted by the payment and refund managers.

use serde::{Deserialize, Serialize};

use crate::domain::{Currency, MerchantId, PaymentId};

// ─────────────────────────────────────────────────────────────────────────────
// Payment DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to submit a new payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePaymentRequest {
    pub merchant_id: MerchantId,
    /// Amount in smallest currency unit
    pub amount: i64,
    #[serde(default = "default_currency")]
    pub currency: Currency,
    #[serde(default)]
    pub payment_method: String,
    #[serde(default)]
    pub description: String,
}

fn default_currency() -> Currency {
    Currency::USD
}

// ─────────────────────────────────────────────────────────────────────────────
// Refund DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to raise a refund against a completed payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRefundRequest {
    pub payment_id: PaymentId,
    /// Amount in smallest currency unit
    pub amount: i64,
    pub currency: Currency,
    #[serde(default)]
    pub reason: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Paging
// ─────────────────────────────────────────────────────────────────────────────

/// Limit/offset paging for list operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListParams {
    pub limit: i64,
    pub offset: i64,
}

impl ListParams {
    pub const DEFAULT_LIMIT: i64 = 20;
    pub const MAX_LIMIT: i64 = 100;

    /// Clamps `limit` into `1..=MAX_LIMIT` and `offset` to be non-negative.
    pub fn new(limit: i64, offset: i64) -> Self {
        Self {
            limit: limit.clamp(1, Self::MAX_LIMIT),
            offset: offset.max(0),
        }
    }
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            limit: Self::DEFAULT_LIMIT,
            offset: 0,
        }
    }
}
