//! Ledger store ports.
//!
//! This is the primary port in our hexagonal architecture.
//! Adapters (Postgres, SQLite, in-memory test doubles) implement these traits.

use crate::domain::{MerchantId, Payment, PaymentId, Refund, RefundId};
use crate::dto::ListParams;
use crate::error::StoreError;

/// Persistence for payments.
#[async_trait::async_trait]
pub trait PaymentStore: Send + Sync + 'static {
    /// Inserts a new payment.
    async fn create_payment(&self, payment: &Payment) -> Result<(), StoreError>;

    /// Gets a payment by ID.
    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>, StoreError>;

    /// Writes status, payment method, description and `updated_at`.
    ///
    /// `amount` is never written here. The status is only written when the
    /// stored status is Pending or already equal to the new one, otherwise
    /// `StoreError::Conflict`. A missing row is `StoreError::NotFound`.
    async fn update_payment(&self, payment: &Payment) -> Result<(), StoreError>;

    /// Lists a merchant's payments, newest first.
    async fn list_payments(
        &self,
        merchant_id: MerchantId,
        params: ListParams,
    ) -> Result<Vec<Payment>, StoreError>;
}

/// Persistence for refunds.
#[async_trait::async_trait]
pub trait RefundStore: Send + Sync + 'static {
    /// Inserts a new refund.
    async fn create_refund(&self, refund: &Refund) -> Result<(), StoreError>;

    /// Gets a refund by ID.
    async fn get_refund(&self, id: RefundId) -> Result<Option<Refund>, StoreError>;

    /// Writes reason, status and `updated_at` of a refund that is still Pending.
    async fn update_refund(&self, refund: &Refund) -> Result<(), StoreError>;

    /// Lists the refunds raised against a payment, newest first.
    async fn list_refunds(
        &self,
        payment_id: PaymentId,
        params: ListParams,
    ) -> Result<Vec<Refund>, StoreError>;
}

/// The full ledger: both record types plus the atomic dual write.
#[async_trait::async_trait]
pub trait LedgerStore: PaymentStore + RefundStore {
    /// Completes `refund` and writes `payment.amount` in one transaction.
    ///
    /// All-or-nothing. Implementations MUST, inside the transaction:
    /// - lock the payment row,
    /// - verify the stored refund is still Pending (`Conflict` otherwise),
    /// - verify `stored payment amount - refund amount == payment.amount`
    ///   (`Conflict` otherwise, the caller read a stale payment),
    /// - write both rows, then commit.
    ///
    /// Any failure rolls the transaction back before returning.
    async fn update_refund_and_payment(
        &self,
        refund: &Refund,
        payment: &Payment,
    ) -> Result<(), StoreError>;
}
