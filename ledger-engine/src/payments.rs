//! Payment lifecycle manager.
//!
//! Owns every Payment status transition. Create/read/update/list talk only
//! to the store; `process` also authorizes with the acquiring bank.

use std::sync::Arc;

use chrono::Utc;

use ledger_types::{
    AcquiringBank, CreatePaymentRequest, EngineError, ListParams, MerchantId, Money, Payment,
    PaymentId, PaymentStatus, PaymentStore, RequestContext,
};

use crate::locks::KeyedLocks;

/// Application service for payment operations.
///
/// Generic over the store and the bank so both can be swapped at compile time.
pub struct PaymentManager<S: PaymentStore, G: AcquiringBank> {
    store: Arc<S>,
    gateway: Arc<G>,
    locks: KeyedLocks<PaymentId>,
}

impl<S: PaymentStore, G: AcquiringBank> PaymentManager<S, G> {
    pub fn new(store: Arc<S>, gateway: Arc<G>) -> Self {
        Self {
            store,
            gateway,
            locks: KeyedLocks::new(),
        }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns a reference to the acquiring bank.
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    // ─────────────────────────────────────────────────────────────────────────
    // CRUD
    // ─────────────────────────────────────────────────────────────────────────

    /// Records a new Pending payment.
    pub async fn create(
        &self,
        ctx: &RequestContext,
        req: Option<CreatePaymentRequest>,
    ) -> Result<Payment, EngineError> {
        let Some(req) = req else {
            tracing::warn!("Rejected payment: payment cannot be nil");
            return Err(EngineError::Validation("payment cannot be nil".into()));
        };
        let merchant_id = req.merchant_id;

        let result = async move {
            let amount = Money::new(req.amount, req.currency)?;
            let payment = Payment::new(merchant_id, amount, req.payment_method, req.description);

            ctx.check()?;
            self.store.create_payment(&payment).await?;
            Ok::<_, EngineError>(payment)
        }
        .await;

        match &result {
            Ok(payment) => tracing::info!(
                payment_id = %payment.id,
                merchant_id = %merchant_id,
                amount = payment.amount.amount(),
                currency = %payment.amount.currency(),
                "Payment created"
            ),
            Err(e) => report("create", &merchant_id, e),
        }
        result
    }

    /// Gets a payment by ID.
    pub async fn get(&self, ctx: &RequestContext, id: PaymentId) -> Result<Payment, EngineError> {
        self.load(ctx, id).await.inspect_err(|e| report("get", &id, e))
    }

    /// Updates method, description and status (Pending to Failed only).
    ///
    /// `created_at` is preserved and `updated_at` refreshed. The amount,
    /// currency and merchant are fixed at creation; Completed is only
    /// written by [`process`](Self::process).
    pub async fn update(
        &self,
        ctx: &RequestContext,
        payment: Option<Payment>,
    ) -> Result<Payment, EngineError> {
        let Some(changes) = payment else {
            tracing::warn!("Rejected payment update: payment cannot be nil");
            return Err(EngineError::Validation("payment cannot be nil".into()));
        };
        let id = changes.id;

        let result = async move {
            let _guard = ctx.run(self.locks.lock(id)).await?;
            let current = self.load(ctx, id).await?;

            check_fixed_fields(&changes, &current)?;

            let mut updated = current;
            if changes.status != updated.status {
                if changes.status == PaymentStatus::Completed {
                    return Err(EngineError::PreconditionFailed(
                        "payment can only be completed by processing".into(),
                    ));
                }
                updated.transition(changes.status)?;
            }
            updated.payment_method = changes.payment_method;
            updated.description = changes.description;
            updated.updated_at = Utc::now();

            ctx.check()?;
            self.store.update_payment(&updated).await?;
            Ok::<_, EngineError>(updated)
        }
        .await;

        match &result {
            Ok(_) => tracing::debug!(payment_id = %id, "Payment updated"),
            Err(e) => report("update", &id, e),
        }
        result
    }

    /// Lists a merchant's payments, newest first.
    pub async fn list(
        &self,
        ctx: &RequestContext,
        merchant_id: MerchantId,
        params: ListParams,
    ) -> Result<Vec<Payment>, EngineError> {
        let result = match ctx.run(self.store.list_payments(merchant_id, params)).await {
            Ok(listed) => listed.map_err(EngineError::from),
            Err(interrupted) => Err(interrupted.into()),
        };

        result.inspect_err(|e| report("list", &merchant_id, e))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Processing
    // ─────────────────────────────────────────────────────────────────────────

    /// Authorizes a Pending payment with the bank and marks it Completed.
    ///
    /// A decline or an interrupted context leaves the payment Pending, so the
    /// call can simply be repeated.
    pub async fn process(&self, ctx: &RequestContext, id: PaymentId) -> Result<Payment, EngineError> {
        let result = async move {
            let _guard = ctx.run(self.locks.lock(id)).await?;
            let mut payment = self.load(ctx, id).await?;

            if payment.status != PaymentStatus::Pending {
                return Err(EngineError::PreconditionFailed(
                    "payment is not in pending status".into(),
                ));
            }

            self.gateway.authorize(ctx, &payment).await?;

            payment.transition(PaymentStatus::Completed)?;
            ctx.check()?;
            self.store.update_payment(&payment).await?;
            Ok::<_, EngineError>(payment)
        }
        .await;

        match &result {
            Ok(_) => tracing::info!(payment_id = %id, "Payment completed"),
            Err(e) => report("process", &id, e),
        }
        result
    }

    async fn load(&self, ctx: &RequestContext, id: PaymentId) -> Result<Payment, EngineError> {
        ctx.run(self.store.get_payment(id))
            .await??
            .ok_or_else(|| EngineError::NotFound(format!("payment with id {id} not found")))
    }
}

/// Rejects edits to the fields fixed at creation.
///
/// The stored amount only ever shrinks, through completed refunds. A larger
/// amount in the same currency is a snapshot taken before a refund landed.
fn check_fixed_fields(changes: &Payment, current: &Payment) -> Result<(), EngineError> {
    if changes.merchant_id != current.merchant_id {
        return Err(EngineError::Validation(
            "payment merchant cannot be changed".into(),
        ));
    }
    let (wanted, stored) = (changes.amount, current.amount);
    if wanted.currency() != stored.currency() || wanted.amount() < stored.amount() {
        return Err(EngineError::Validation(
            "payment amount and currency cannot be changed".into(),
        ));
    }
    if wanted.amount() > stored.amount() {
        return Err(EngineError::PreconditionFailed(
            "payment amount changed since it was read".into(),
        ));
    }
    Ok(())
}

/// Emits the single diagnostic for a failed payment operation.
fn report(op: &'static str, key: &dyn std::fmt::Display, err: &EngineError) {
    match err {
        EngineError::Store(_) => tracing::error!(
            op,
            id = %key,
            kind = err.kind(),
            error = %err,
            "Payment operation failed"
        ),
        _ => tracing::warn!(
            op,
            id = %key,
            kind = err.kind(),
            retryable = err.is_retryable(),
            error = %err,
            "Payment operation failed"
        ),
    }
}
