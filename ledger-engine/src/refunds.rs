//! Refund lifecycle manager.
//!
//! The only writer of Refund status, and the only code besides payment
//! creation that changes a payment's amount. That change is always made in
//! the same store transaction that completes the refund.

use std::sync::Arc;

use chrono::Utc;

use ledger_types::{
    CreateRefundRequest, EngineError, LedgerStore, ListParams, Money, Payment, PaymentId,
    PaymentStatus, Refund, RefundId, RefundStatus, RequestContext,
};

use crate::locks::KeyedLocks;

/// Application service for refund operations.
pub struct RefundManager<S: LedgerStore> {
    store: Arc<S>,
    /// Keyed by the owning payment, so refunds against one payment serialize.
    locks: KeyedLocks<PaymentId>,
}

impl<S: LedgerStore> RefundManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
        }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    // ─────────────────────────────────────────────────────────────────────────
    // CRUD
    // ─────────────────────────────────────────────────────────────────────────

    /// Raises a Pending refund against a Completed payment.
    pub async fn create(
        &self,
        ctx: &RequestContext,
        req: Option<CreateRefundRequest>,
    ) -> Result<Refund, EngineError> {
        let Some(req) = req else {
            tracing::warn!("Rejected refund: refund cannot be nil");
            return Err(EngineError::Validation("refund cannot be nil".into()));
        };
        let payment_id = req.payment_id;

        let result = async move {
            let amount = Money::new(req.amount, req.currency)?;
            if amount.is_zero() {
                return Err(EngineError::Validation(
                    "refund amount must be positive".into(),
                ));
            }

            let _guard = ctx.run(self.locks.lock(payment_id)).await?;
            let payment = self.load_payment(ctx, payment_id).await?;

            if payment.status != PaymentStatus::Completed {
                return Err(EngineError::PreconditionFailed(
                    "can only refund completed payments".into(),
                ));
            }
            if amount.currency() != payment.amount.currency() {
                return Err(EngineError::Validation(format!(
                    "refund currency {} does not match payment currency {}",
                    amount.currency(),
                    payment.amount.currency()
                )));
            }
            if !payment.amount.covers(&amount) {
                return Err(EngineError::Validation(
                    "refund amount exceeds payment amount".into(),
                ));
            }

            let refund = Refund::new(payment_id, amount, req.reason);
            ctx.check()?;
            self.store.create_refund(&refund).await?;
            Ok::<_, EngineError>(refund)
        }
        .await;

        match &result {
            Ok(refund) => tracing::info!(
                refund_id = %refund.id,
                payment_id = %payment_id,
                amount = refund.amount.amount(),
                "Refund created"
            ),
            Err(e) => report("create", &payment_id, e),
        }
        result
    }

    /// Gets a refund by ID.
    pub async fn get(&self, ctx: &RequestContext, id: RefundId) -> Result<Refund, EngineError> {
        self.load(ctx, id).await.inspect_err(|e| report("get", &id, e))
    }

    /// Updates the reason of a Pending refund.
    ///
    /// Amount, owning payment and status are not editable here; completion
    /// only happens through [`RefundManager::process`].
    pub async fn update(
        &self,
        ctx: &RequestContext,
        refund: Option<Refund>,
    ) -> Result<Refund, EngineError> {
        let Some(changes) = refund else {
            tracing::warn!("Rejected refund update: refund cannot be nil");
            return Err(EngineError::Validation("refund cannot be nil".into()));
        };
        let id = changes.id;

        let result = async move {
            let payment_id = self.load(ctx, id).await?.payment_id;
            let _guard = ctx.run(self.locks.lock(payment_id)).await?;
            let current = self.load(ctx, id).await?;

            if changes.payment_id != current.payment_id {
                return Err(EngineError::Validation(
                    "refund payment cannot be changed".into(),
                ));
            }
            if changes.amount != current.amount {
                return Err(EngineError::Validation(
                    "refund amount cannot be changed".into(),
                ));
            }
            if current.status != RefundStatus::Pending || changes.status != RefundStatus::Pending {
                return Err(EngineError::PreconditionFailed(
                    "refund is not in pending status".into(),
                ));
            }

            let mut updated = current;
            updated.reason = changes.reason;
            updated.updated_at = Utc::now();

            ctx.check()?;
            self.store.update_refund(&updated).await?;
            Ok::<_, EngineError>(updated)
        }
        .await;

        match &result {
            Ok(_) => tracing::debug!(refund_id = %id, "Refund updated"),
            Err(e) => report("update", &id, e),
        }
        result
    }

    /// Lists the refunds raised against a payment, newest first.
    pub async fn list(
        &self,
        ctx: &RequestContext,
        payment_id: PaymentId,
        params: ListParams,
    ) -> Result<Vec<Refund>, EngineError> {
        let result = async move {
            // Verify payment exists first
            self.load_payment(ctx, payment_id).await?;

            let refunds = ctx
                .run(self.store.list_refunds(payment_id, params))
                .await??;
            Ok::<_, EngineError>(refunds)
        }
        .await;

        result.inspect_err(|e| report("list", &payment_id, e))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Processing
    // ─────────────────────────────────────────────────────────────────────────

    /// Completes a Pending refund and debits its payment atomically.
    ///
    /// On any failure neither record changes: the refund stays Pending and
    /// the payment keeps its amount.
    pub async fn process(&self, ctx: &RequestContext, id: RefundId) -> Result<Refund, EngineError> {
        let result = async move {
            let refund = self.load(ctx, id).await?;
            ensure_pending(&refund)?;

            let _guard = ctx.run(self.locks.lock(refund.payment_id)).await?;
            // Another call may have completed it while we waited.
            let mut refund = self.load(ctx, id).await?;
            ensure_pending(&refund)?;

            let payment = self.load_payment(ctx, refund.payment_id).await?;
            let debited = payment.debited_by(&refund).map_err(|_| {
                EngineError::PreconditionFailed("refund amount exceeds payment amount".into())
            })?;
            refund.complete()?;

            ctx.check()?;
            self.store.update_refund_and_payment(&refund, &debited).await?;
            Ok::<_, EngineError>((refund, debited))
        }
        .await;

        match result {
            Ok((refund, debited)) => {
                tracing::info!(
                    refund_id = %id,
                    payment_id = %debited.id,
                    remaining = debited.amount.amount(),
                    "Refund completed"
                );
                Ok(refund)
            }
            Err(e) => {
                report("process", &id, &e);
                Err(e)
            }
        }
    }

    async fn load(&self, ctx: &RequestContext, id: RefundId) -> Result<Refund, EngineError> {
        ctx.run(self.store.get_refund(id))
            .await??
            .ok_or_else(|| EngineError::NotFound(format!("refund with id {id} not found")))
    }

    async fn load_payment(
        &self,
        ctx: &RequestContext,
        id: PaymentId,
    ) -> Result<Payment, EngineError> {
        ctx.run(self.store.get_payment(id))
            .await??
            .ok_or_else(|| EngineError::NotFound(format!("payment with id {id} not found")))
    }
}

fn ensure_pending(refund: &Refund) -> Result<(), EngineError> {
    if refund.status != RefundStatus::Pending {
        return Err(EngineError::PreconditionFailed(
            "refund is not in pending status".into(),
        ));
    }
    Ok(())
}

/// Emits the single diagnostic for a failed refund operation.
fn report(op: &'static str, key: &dyn std::fmt::Display, err: &EngineError) {
    match err {
        EngineError::Store(_) => tracing::error!(
            op,
            id = %key,
            kind = err.kind(),
            error = %err,
            "Refund operation failed"
        ),
        _ => tracing::warn!(
            op,
            id = %key,
            kind = err.kind(),
            retryable = err.is_retryable(),
            error = %err,
            "Refund operation failed"
        ),
    }
}
