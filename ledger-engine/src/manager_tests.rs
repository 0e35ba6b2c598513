//! PaymentManager / RefundManager unit tests.

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use acquiring_bank::AcquiringBankSimulator;
    use async_trait::async_trait;

    use ledger_types::{
        AcquiringBank, CreatePaymentRequest, CreateRefundRequest, Currency, EngineError,
        GatewayConfig, Interrupted, LedgerStore, ListParams, MerchantId, Payment, PaymentId,
        PaymentStatus, PaymentStore, Refund, RefundId, RefundStatus, RefundStore, RequestContext,
        StoreError,
    };

    use crate::{PaymentManager, RefundManager};

    /// In-memory ledger with the same write guards as the SQL adapters.
    pub struct MockStore {
        payments: Mutex<HashMap<PaymentId, Payment>>,
        refunds: Mutex<HashMap<RefundId, Refund>>,
        writes: AtomicUsize,
        fail_payment_half: AtomicBool,
    }

    impl MockStore {
        pub fn new() -> Self {
            Self {
                payments: Mutex::new(HashMap::new()),
                refunds: Mutex::new(HashMap::new()),
                writes: AtomicUsize::new(0),
                fail_payment_half: AtomicBool::new(false),
            }
        }

        /// Store writes attempted so far.
        pub fn writes(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }

        /// Makes the payment half of the dual write fail after the refund half.
        pub fn fail_payment_half(&self, fail: bool) {
            self.fail_payment_half.store(fail, Ordering::SeqCst);
        }
    }

    type SortKey = (chrono::DateTime<chrono::Utc>, String);

    /// Newest first, ties broken by id, then limit/offset.
    fn page<T>(mut rows: Vec<T>, key: impl Fn(&T) -> SortKey, params: ListParams) -> Vec<T> {
        rows.sort_by_key(|r| std::cmp::Reverse(key(r)));
        rows.into_iter()
            .skip(params.offset as usize)
            .take(params.limit as usize)
            .collect()
    }

    #[async_trait]
    impl PaymentStore for MockStore {
        async fn create_payment(&self, payment: &Payment) -> Result<(), StoreError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            let mut payments = self.payments.lock().unwrap();
            if payments.contains_key(&payment.id) {
                return Err(StoreError::Conflict("duplicate payment".into()));
            }
            payments.insert(payment.id, payment.clone());
            Ok(())
        }

        async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>, StoreError> {
            Ok(self.payments.lock().unwrap().get(&id).cloned())
        }

        async fn update_payment(&self, payment: &Payment) -> Result<(), StoreError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            let mut payments = self.payments.lock().unwrap();
            let stored = payments.get_mut(&payment.id).ok_or(StoreError::NotFound)?;
            if stored.status != PaymentStatus::Pending && stored.status != payment.status {
                return Err(StoreError::Conflict("payment status is final".into()));
            }
            stored.status = payment.status;
            stored.payment_method = payment.payment_method.clone();
            stored.description = payment.description.clone();
            stored.updated_at = payment.updated_at;
            Ok(())
        }

        async fn list_payments(
            &self,
            merchant_id: MerchantId,
            params: ListParams,
        ) -> Result<Vec<Payment>, StoreError> {
            let rows: Vec<Payment> = self
                .payments
                .lock()
                .unwrap()
                .values()
                .filter(|p| p.merchant_id == merchant_id)
                .cloned()
                .collect();
            Ok(page(rows, |p| (p.created_at, p.id.to_string()), params))
        }
    }

    #[async_trait]
    impl RefundStore for MockStore {
        async fn create_refund(&self, refund: &Refund) -> Result<(), StoreError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if !self.payments.lock().unwrap().contains_key(&refund.payment_id) {
                return Err(StoreError::Conflict("unknown payment".into()));
            }
            self.refunds
                .lock()
                .unwrap()
                .insert(refund.id, refund.clone());
            Ok(())
        }

        async fn get_refund(&self, id: RefundId) -> Result<Option<Refund>, StoreError> {
            Ok(self.refunds.lock().unwrap().get(&id).cloned())
        }

        async fn update_refund(&self, refund: &Refund) -> Result<(), StoreError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            let mut refunds = self.refunds.lock().unwrap();
            let stored = refunds.get_mut(&refund.id).ok_or(StoreError::NotFound)?;
            if stored.status != RefundStatus::Pending {
                return Err(StoreError::Conflict("refund is not in pending status".into()));
            }
            stored.reason = refund.reason.clone();
            stored.status = refund.status;
            stored.updated_at = refund.updated_at;
            Ok(())
        }

        async fn list_refunds(
            &self,
            payment_id: PaymentId,
            params: ListParams,
        ) -> Result<Vec<Refund>, StoreError> {
            let rows: Vec<Refund> = self
                .refunds
                .lock()
                .unwrap()
                .values()
                .filter(|r| r.payment_id == payment_id)
                .cloned()
                .collect();
            Ok(page(rows, |r| (r.created_at, r.id.to_string()), params))
        }
    }

    #[async_trait]
    impl LedgerStore for MockStore {
        async fn update_refund_and_payment(
            &self,
            refund: &Refund,
            payment: &Payment,
        ) -> Result<(), StoreError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            // Same lock order as the SQL adapters: refund row, then payment row.
            let mut refunds = self.refunds.lock().unwrap();
            let mut payments = self.payments.lock().unwrap();

            let before = refunds.get(&refund.id).cloned().ok_or(StoreError::NotFound)?;
            if before.status != RefundStatus::Pending {
                return Err(StoreError::Conflict("refund is not in pending status".into()));
            }
            refunds.insert(refund.id, refund.clone());

            let payment_half = match payments.get_mut(&payment.id) {
                _ if self.fail_payment_half.load(Ordering::SeqCst) => {
                    Err(StoreError::Database("injected payment write failure".into()))
                }
                None => Err(StoreError::NotFound),
                Some(stored)
                    if stored.amount.amount()
                        != payment.amount.amount() + refund.amount.amount() =>
                {
                    Err(StoreError::Conflict("payment amount changed".into()))
                }
                Some(stored) => {
                    stored.amount = payment.amount;
                    stored.updated_at = payment.updated_at;
                    Ok(())
                }
            };

            if payment_half.is_err() {
                // Roll back the refund half.
                refunds.insert(before.id, before);
            }
            payment_half
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Fixtures
    // ─────────────────────────────────────────────────────────────────────────

    type Payments = PaymentManager<MockStore, AcquiringBankSimulator>;
    type Refunds = RefundManager<MockStore>;

    fn setup(delay_ms: u64, failure_rate: f64) -> (Arc<MockStore>, Payments, Refunds) {
        let store = Arc::new(MockStore::new());
        let bank = Arc::new(AcquiringBankSimulator::with_seed(
            GatewayConfig {
                processing_delay: Duration::from_millis(delay_ms),
                failure_rate,
            },
            42,
        ));
        let payments = PaymentManager::new(store.clone(), bank);
        let refunds = RefundManager::new(store.clone());
        (store, payments, refunds)
    }

    fn payment_request(amount: i64) -> Option<CreatePaymentRequest> {
        Some(CreatePaymentRequest {
            merchant_id: MerchantId::new(),
            amount,
            currency: Currency::USD,
            payment_method: "card".to_string(),
            description: "order".to_string(),
        })
    }

    fn refund_request(payment_id: PaymentId, amount: i64) -> Option<CreateRefundRequest> {
        Some(CreateRefundRequest {
            payment_id,
            amount,
            currency: Currency::USD,
            reason: "customer request".to_string(),
        })
    }

    async fn completed_payment(payments: &Payments, amount: i64) -> Payment {
        let ctx = RequestContext::background();
        let payment = payments.create(&ctx, payment_request(amount)).await.unwrap();
        payments.process(&ctx, payment.id).await.unwrap()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Payment lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_create_then_process_completes_payment() {
        let (_, payments, _) = setup(0, 0.0);
        let ctx = RequestContext::background();

        let created = payments.create(&ctx, payment_request(100)).await.unwrap();
        assert_eq!(created.status, PaymentStatus::Pending);
        assert_eq!(created.amount.amount(), 100);
        assert_eq!(created.amount.currency(), Currency::USD);

        let processed = payments.process(&ctx, created.id).await.unwrap();
        assert_eq!(processed.status, PaymentStatus::Completed);

        let reloaded = payments.get(&ctx, created.id).await.unwrap();
        assert_eq!(reloaded.status, PaymentStatus::Completed);
        assert_eq!(reloaded.created_at, created.created_at);
    }

    #[tokio::test]
    async fn test_create_nil_payment_rejected() {
        let (store, payments, _) = setup(0, 0.0);

        let err = payments
            .create(&RequestContext::background(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Validation(msg) if msg == "payment cannot be nil"));
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_create_negative_amount_rejected() {
        let (_, payments, _) = setup(0, 0.0);

        let err = payments
            .create(&RequestContext::background(), payment_request(-5))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "validation");
    }

    #[tokio::test]
    async fn test_get_unknown_payment_not_found() {
        let (_, payments, _) = setup(0, 0.0);
        let id = PaymentId::new();

        let err = payments
            .get(&RequestContext::background(), id)
            .await
            .unwrap_err();

        assert!(matches!(&err, EngineError::NotFound(msg) if *msg == format!("payment with id {id} not found")));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_process_completed_payment_precondition_failed() {
        let (store, payments, _) = setup(0, 0.0);
        let payment = completed_payment(&payments, 100).await;
        let writes = store.writes();

        let err = payments
            .process(&RequestContext::background(), payment.id)
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::PreconditionFailed(msg) if msg == "payment is not in pending status"));
        assert_eq!(store.writes(), writes);
        let reloaded = payments
            .get(&RequestContext::background(), payment.id)
            .await
            .unwrap();
        assert_eq!(reloaded.status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn test_declined_payment_stays_pending_and_can_be_retried() {
        let (_, payments, _) = setup(0, 1.0);
        let ctx = RequestContext::background();
        let payment = payments.create(&ctx, payment_request(100)).await.unwrap();

        let err = payments.process(&ctx, payment.id).await.unwrap_err();
        assert!(matches!(&err, EngineError::ExternalProcessing(msg) if msg == "payment processing failed"));
        assert!(err.is_retryable());
        assert_eq!(
            payments.get(&ctx, payment.id).await.unwrap().status,
            PaymentStatus::Pending
        );

        payments.gateway().set_failure_rate(0.0);
        let processed = payments.process(&ctx, payment.id).await.unwrap();
        assert_eq!(processed.status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn test_deadline_during_authorization_leaves_payment_pending() {
        let (store, payments, _) = setup(500, 0.0);
        let payment = payments
            .create(&RequestContext::background(), payment_request(100))
            .await
            .unwrap();
        let writes = store.writes();

        let ctx = RequestContext::with_timeout(Duration::from_millis(50));
        let err = payments.process(&ctx, payment.id).await.unwrap_err();

        assert!(matches!(err, EngineError::Cancelled(Interrupted::DeadlineExceeded)));
        assert!(err.is_retryable());
        assert_eq!(store.writes(), writes);
        let reloaded = payments
            .get(&RequestContext::background(), payment.id)
            .await
            .unwrap();
        assert_eq!(reloaded.status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn test_cancel_during_authorization_leaves_payment_pending() {
        let (_, payments, _) = setup(1_000, 0.0);
        let payments = Arc::new(payments);
        let payment = payments
            .create(&RequestContext::background(), payment_request(100))
            .await
            .unwrap();

        let (ctx, handle) = RequestContext::background().cancellable();
        let task = {
            let payments = payments.clone();
            tokio::spawn(async move { payments.process(&ctx, payment.id).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, EngineError::Cancelled(Interrupted::Cancelled)));
        let reloaded = payments
            .get(&RequestContext::background(), payment.id)
            .await
            .unwrap();
        assert_eq!(reloaded.status, PaymentStatus::Pending);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_process_completes_once() {
        let (store, payments, _) = setup(100, 0.0);
        let payments = Arc::new(payments);
        let payment = payments
            .create(&RequestContext::background(), payment_request(100))
            .await
            .unwrap();
        let writes = store.writes();

        let mut handles = Vec::new();
        for _ in 0..2 {
            let payments = payments.clone();
            handles.push(tokio::spawn(async move {
                payments
                    .process(&RequestContext::background(), payment.id)
                    .await
            }));
        }

        let mut completed = 0;
        let mut rejected = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(p) => {
                    assert_eq!(p.status, PaymentStatus::Completed);
                    completed += 1;
                }
                Err(EngineError::PreconditionFailed(_)) => rejected += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!((completed, rejected), (1, 1));
        assert_eq!(payments.gateway().calls(), 1);
        assert_eq!(store.writes(), writes + 1);
    }

    #[tokio::test]
    async fn test_update_preserves_created_at_and_refreshes_updated_at() {
        let (_, payments, _) = setup(0, 0.0);
        let ctx = RequestContext::background();
        let created = payments.create(&ctx, payment_request(100)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let mut changes = created.clone();
        changes.description = "gift wrap".to_string();
        changes.created_at = chrono::Utc::now();
        let updated = payments.update(&ctx, Some(changes)).await.unwrap();

        assert_eq!(updated.description, "gift wrap");
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at > created.updated_at);
        let reloaded = payments.get(&ctx, created.id).await.unwrap();
        assert_eq!(reloaded.description, "gift wrap");
    }

    #[tokio::test]
    async fn test_update_rejects_amount_change() {
        let (_, payments, _) = setup(0, 0.0);
        let ctx = RequestContext::background();
        let created = payments.create(&ctx, payment_request(100)).await.unwrap();

        let mut changes = created.clone();
        changes.amount = ledger_types::Money::new(1, Currency::USD).unwrap();
        let err = payments.update(&ctx, Some(changes)).await.unwrap_err();

        assert_eq!(err.kind(), "validation");
        assert_eq!(payments.get(&ctx, created.id).await.unwrap().amount.amount(), 100);
    }

    #[tokio::test]
    async fn test_update_cannot_move_completed_payment_backward() {
        let (_, payments, _) = setup(0, 0.0);
        let ctx = RequestContext::background();
        let completed = completed_payment(&payments, 100).await;

        for status in [PaymentStatus::Pending, PaymentStatus::Failed] {
            let mut changes = completed.clone();
            changes.status = status;
            let err = payments.update(&ctx, Some(changes)).await.unwrap_err();
            assert_eq!(err.kind(), "precondition_failed");
        }
        assert_eq!(
            payments.get(&ctx, completed.id).await.unwrap().status,
            PaymentStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_update_cannot_complete_payment() {
        let (store, payments, _) = setup(0, 0.0);
        let ctx = RequestContext::background();
        let created = payments.create(&ctx, payment_request(100)).await.unwrap();
        let writes = store.writes();

        let mut changes = created.clone();
        changes.status = PaymentStatus::Completed;
        let err = payments.update(&ctx, Some(changes)).await.unwrap_err();

        assert!(matches!(err, EngineError::PreconditionFailed(msg) if msg == "payment can only be completed by processing"));
        assert_eq!(store.writes(), writes);
        assert_eq!(payments.get(&ctx, created.id).await.unwrap().status, PaymentStatus::Pending);
        assert_eq!(payments.gateway().calls(), 0);
    }

    #[tokio::test]
    async fn test_update_can_fail_pending_payment() {
        let (_, payments, _) = setup(0, 0.0);
        let ctx = RequestContext::background();
        let created = payments.create(&ctx, payment_request(100)).await.unwrap();

        let mut changes = created.clone();
        changes.status = PaymentStatus::Failed;
        let updated = payments.update(&ctx, Some(changes)).await.unwrap();

        assert_eq!(updated.status, PaymentStatus::Failed);
        let err = payments.process(&ctx, created.id).await.unwrap_err();
        assert_eq!(err.kind(), "precondition_failed");
    }

    #[tokio::test]
    async fn test_update_from_snapshot_taken_before_refund() {
        let (_, payments, refunds) = setup(0, 0.0);
        let ctx = RequestContext::background();
        let payment = completed_payment(&payments, 100).await;
        let snapshot = payment.clone();

        let refund = refunds.create(&ctx, refund_request(payment.id, 30)).await.unwrap();
        refunds.process(&ctx, refund.id).await.unwrap();

        let mut stale = snapshot;
        stale.description = "late edit".to_string();
        let err = payments.update(&ctx, Some(stale)).await.unwrap_err();
        assert!(matches!(err, EngineError::PreconditionFailed(ref msg) if msg == "payment amount changed since it was read"));

        // A fresh read goes through and keeps the debited amount.
        let mut fresh = payments.get(&ctx, payment.id).await.unwrap();
        fresh.description = "late edit".to_string();
        let updated = payments.update(&ctx, Some(fresh)).await.unwrap();
        assert_eq!(updated.amount.amount(), 70);
        assert_eq!(updated.description, "late edit");
    }

    #[tokio::test]
    async fn test_update_unknown_payment_not_found() {
        let (_, payments, _) = setup(0, 0.0);
        let ctx = RequestContext::background();
        let created = payments.create(&ctx, payment_request(100)).await.unwrap();

        let mut ghost = created.clone();
        ghost.id = PaymentId::new();
        let err = payments.update(&ctx, Some(ghost)).await.unwrap_err();

        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn test_list_pages_newest_first() {
        let (_, payments, _) = setup(0, 0.0);
        let ctx = RequestContext::background();
        let merchant_id = MerchantId::new();
        let mut ids = Vec::new();
        for amount in [10, 20, 30] {
            let mut req = payment_request(amount).unwrap();
            req.merchant_id = merchant_id;
            ids.push(payments.create(&ctx, Some(req)).await.unwrap().id);
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let first = payments
            .list(&ctx, merchant_id, ListParams::new(2, 0))
            .await
            .unwrap();
        let second = payments
            .list(&ctx, merchant_id, ListParams::new(2, 2))
            .await
            .unwrap();

        assert_eq!(first.iter().map(|p| p.id).collect::<Vec<_>>(), vec![ids[2], ids[1]]);
        assert_eq!(second.iter().map(|p| p.id).collect::<Vec<_>>(), vec![ids[0]]);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Refund lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_refund_exceeding_payment_rejected() {
        let (_, payments, refunds) = setup(0, 0.0);
        let ctx = RequestContext::background();
        let payment = completed_payment(&payments, 100).await;

        let err = refunds
            .create(&ctx, refund_request(payment.id, 150))
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Validation(msg) if msg == "refund amount exceeds payment amount"));
        let listed = refunds
            .list(&ctx, payment.id, ListParams::default())
            .await
            .unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn test_refund_of_pending_payment_rejected() {
        let (_, payments, refunds) = setup(0, 0.0);
        let ctx = RequestContext::background();
        let payment = payments.create(&ctx, payment_request(100)).await.unwrap();

        let err = refunds
            .create(&ctx, refund_request(payment.id, 10))
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::PreconditionFailed(msg) if msg == "can only refund completed payments"));
    }

    #[tokio::test]
    async fn test_refund_validation() {
        let (_, payments, refunds) = setup(0, 0.0);
        let ctx = RequestContext::background();
        let payment = completed_payment(&payments, 100).await;

        let nil = refunds.create(&ctx, None).await.unwrap_err();
        assert!(matches!(nil, EngineError::Validation(msg) if msg == "refund cannot be nil"));

        let zero = refunds
            .create(&ctx, refund_request(payment.id, 0))
            .await
            .unwrap_err();
        assert_eq!(zero.kind(), "validation");

        let mut euro = refund_request(payment.id, 10).unwrap();
        euro.currency = Currency::EUR;
        let mismatch = refunds.create(&ctx, Some(euro)).await.unwrap_err();
        assert_eq!(mismatch.kind(), "validation");

        let missing = refunds
            .create(&ctx, refund_request(PaymentId::new(), 10))
            .await
            .unwrap_err();
        assert_eq!(missing.kind(), "not_found");
    }

    #[tokio::test]
    async fn test_process_refund_debits_payment() {
        let (_, payments, refunds) = setup(0, 0.0);
        let ctx = RequestContext::background();
        let payment = completed_payment(&payments, 100).await;

        let refund = refunds
            .create(&ctx, refund_request(payment.id, 40))
            .await
            .unwrap();
        assert_eq!(refund.status, RefundStatus::Pending);

        let processed = refunds.process(&ctx, refund.id).await.unwrap();
        assert_eq!(processed.status, RefundStatus::Completed);
        assert_eq!(
            refunds.get(&ctx, refund.id).await.unwrap().status,
            RefundStatus::Completed
        );
        let reloaded = payments.get(&ctx, payment.id).await.unwrap();
        assert_eq!(reloaded.amount.amount(), 60);
        assert_eq!(reloaded.status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn test_process_completed_refund_writes_nothing() {
        let (store, payments, refunds) = setup(0, 0.0);
        let ctx = RequestContext::background();
        let payment = completed_payment(&payments, 100).await;
        let refund = refunds
            .create(&ctx, refund_request(payment.id, 40))
            .await
            .unwrap();
        refunds.process(&ctx, refund.id).await.unwrap();
        let writes = store.writes();

        let err = refunds.process(&ctx, refund.id).await.unwrap_err();

        assert!(matches!(err, EngineError::PreconditionFailed(msg) if msg == "refund is not in pending status"));
        assert_eq!(store.writes(), writes);
        assert_eq!(payments.get(&ctx, payment.id).await.unwrap().amount.amount(), 60);
    }

    #[tokio::test]
    async fn test_failed_payment_half_leaves_both_records_unchanged() {
        let (store, payments, refunds) = setup(0, 0.0);
        let ctx = RequestContext::background();
        let payment = completed_payment(&payments, 100).await;
        let refund = refunds
            .create(&ctx, refund_request(payment.id, 40))
            .await
            .unwrap();

        store.fail_payment_half(true);
        let err = refunds.process(&ctx, refund.id).await.unwrap_err();

        assert_eq!(err.kind(), "store");
        assert_eq!(
            refunds.get(&ctx, refund.id).await.unwrap().status,
            RefundStatus::Pending
        );
        assert_eq!(payments.get(&ctx, payment.id).await.unwrap().amount.amount(), 100);

        store.fail_payment_half(false);
        refunds.process(&ctx, refund.id).await.unwrap();
        assert_eq!(payments.get(&ctx, payment.id).await.unwrap().amount.amount(), 60);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refunds_never_overdraw() {
        let (_, payments, refunds) = setup(0, 0.0);
        let refunds = Arc::new(refunds);
        let ctx = RequestContext::background();
        let payment = completed_payment(&payments, 100).await;

        let mut ids = Vec::new();
        for _ in 0..5 {
            let refund = refunds
                .create(&ctx, refund_request(payment.id, 30))
                .await
                .unwrap();
            ids.push(refund.id);
        }

        let mut handles = Vec::new();
        for id in ids {
            let refunds = refunds.clone();
            handles.push(tokio::spawn(async move {
                refunds.process(&RequestContext::background(), id).await
            }));
        }

        let mut completed = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => completed += 1,
                Err(e) => assert_eq!(e.kind(), "precondition_failed"),
            }
        }

        assert_eq!(completed, 3);
        assert_eq!(payments.get(&ctx, payment.id).await.unwrap().amount.amount(), 10);
    }

    #[tokio::test]
    async fn test_refund_update_only_changes_reason() {
        let (_, payments, refunds) = setup(0, 0.0);
        let ctx = RequestContext::background();
        let payment = completed_payment(&payments, 100).await;
        let refund = refunds
            .create(&ctx, refund_request(payment.id, 40))
            .await
            .unwrap();

        let mut changes = refund.clone();
        changes.reason = "damaged in transit".to_string();
        let updated = refunds.update(&ctx, Some(changes)).await.unwrap();
        assert_eq!(updated.reason, "damaged in transit");
        assert_eq!(updated.created_at, refund.created_at);

        let mut completing = updated.clone();
        completing.status = RefundStatus::Completed;
        let err = refunds.update(&ctx, Some(completing)).await.unwrap_err();
        assert_eq!(err.kind(), "precondition_failed");

        let mut resized = updated.clone();
        resized.amount = ledger_types::Money::new(10, Currency::USD).unwrap();
        let err = refunds.update(&ctx, Some(resized)).await.unwrap_err();
        assert_eq!(err.kind(), "validation");

        let stored = refunds.get(&ctx, refund.id).await.unwrap();
        assert_eq!(stored.status, RefundStatus::Pending);
        assert_eq!(stored.amount.amount(), 40);
    }

    #[tokio::test]
    async fn test_list_refunds_for_unknown_payment_not_found() {
        let (_, _, refunds) = setup(0, 0.0);

        let err = refunds
            .list(&RequestContext::background(), PaymentId::new(), ListParams::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "not_found");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Amount invariant
    // ─────────────────────────────────────────────────────────────────────────

    mod amount_invariant {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(48))]

            #[test]
            fn amount_equals_initial_minus_completed_refunds(
                initial in 0i64..10_000,
                requested in proptest::collection::vec(1i64..4_000, 0..8),
            ) {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .unwrap();

                let (remaining, completed_total) = rt.block_on(async {
                    let (_, payments, refunds) = setup(0, 0.0);
                    let ctx = RequestContext::background();
                    let payment = completed_payment(&payments, initial).await;

                    for amount in requested {
                        if let Ok(refund) = refunds.create(&ctx, refund_request(payment.id, amount)).await {
                            let _ = refunds.process(&ctx, refund.id).await;
                        }
                    }

                    let remaining = payments.get(&ctx, payment.id).await.unwrap().amount.amount();
                    let completed_total: i64 = refunds
                        .list(&ctx, payment.id, ListParams::new(ListParams::MAX_LIMIT, 0))
                        .await
                        .unwrap()
                        .iter()
                        .filter(|r| r.status == RefundStatus::Completed)
                        .map(|r| r.amount.amount())
                        .sum();
                    (remaining, completed_total)
                });

                prop_assert!(remaining >= 0);
                prop_assert_eq!(remaining, initial - completed_total);
            }
        }
    }
}
