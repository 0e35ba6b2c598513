//! Simulated acquiring bank.
//!
//! Stands in for the external authorization processor: every call waits for
//! the configured processing delay, then is declined with probability
//! `failure_rate`. The random source is injectable so tests can seed it.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use acquiring_bank::AcquiringBankSimulator;
//! use ledger_types::{AcquiringBank, GatewayConfig};
//!
//! let bank = AcquiringBankSimulator::with_seed(GatewayConfig::default(), 42);
//! bank.set_failure_rate(0.0);
//! bank.set_processing_delay(Duration::from_millis(10));
//! assert_eq!(bank.config().failure_rate, 0.0);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

use ledger_types::{AcquiringBank, GatewayConfig, GatewayError, Payment, Refund, RequestContext};

// ─────────────────────────────────────────────────────────────────────────────
// Simulator
// ─────────────────────────────────────────────────────────────────────────────

/// Acquiring bank simulator with live, lock-free configuration.
///
/// Delay and failure rate live in atomics, so `set_*` may be called while
/// authorizations are in flight. Each call works from one snapshot taken
/// when it starts.
pub struct AcquiringBankSimulator {
    delay_micros: AtomicU64,
    failure_rate_bits: AtomicU64,
    rng: Mutex<Box<dyn RngCore + Send>>,
    calls: AtomicU64,
}

impl AcquiringBankSimulator {
    /// Creates a simulator seeded from the operating system.
    pub fn new(config: GatewayConfig) -> Self {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// Creates a simulator whose decline sequence is fully determined by `seed`.
    pub fn with_seed(config: GatewayConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    /// Creates a simulator drawing from the given random source.
    pub fn with_rng(config: GatewayConfig, rng: impl RngCore + Send + 'static) -> Self {
        let sim = Self {
            delay_micros: AtomicU64::new(0),
            failure_rate_bits: AtomicU64::new(0f64.to_bits()),
            rng: Mutex::new(Box::new(rng)),
            calls: AtomicU64::new(0),
        };
        sim.set_processing_delay(config.processing_delay);
        sim.set_failure_rate(config.failure_rate);
        sim
    }

    /// Number of authorization attempts received, including interrupted ones.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn roll(&self) -> f64 {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.random::<f64>()
    }

    async fn simulate(&self, ctx: &RequestContext, kind: &'static str) -> Result<(), GatewayError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let config = self.config();

        ctx.run(tokio::time::sleep(config.processing_delay))
            .await
            .map_err(GatewayError::Interrupted)?;

        if self.roll() < config.failure_rate {
            return Err(GatewayError::Declined(format!("{kind} processing failed")));
        }
        Ok(())
    }
}

impl Default for AcquiringBankSimulator {
    fn default() -> Self {
        Self::new(GatewayConfig::default())
    }
}

#[async_trait]
impl AcquiringBank for AcquiringBankSimulator {
    async fn authorize(&self, ctx: &RequestContext, payment: &Payment) -> Result<(), GatewayError> {
        tracing::info!(
            payment_id = %payment.id,
            amount = payment.amount.amount(),
            currency = %payment.amount.currency(),
            "Processing payment"
        );

        match self.simulate(ctx, "payment").await {
            Ok(()) => {
                tracing::info!(payment_id = %payment.id, "Payment processed successfully");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(payment_id = %payment.id, error = %e, "Payment processing failed");
                Err(e)
            }
        }
    }

    async fn authorize_refund(
        &self,
        ctx: &RequestContext,
        refund: &Refund,
    ) -> Result<(), GatewayError> {
        tracing::info!(
            refund_id = %refund.id,
            payment_id = %refund.payment_id,
            amount = refund.amount.amount(),
            "Processing refund"
        );

        match self.simulate(ctx, "refund").await {
            Ok(()) => {
                tracing::info!(refund_id = %refund.id, "Refund processed successfully");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(refund_id = %refund.id, error = %e, "Refund processing failed");
                Err(e)
            }
        }
    }

    fn set_processing_delay(&self, delay: Duration) {
        let micros = u64::try_from(delay.as_micros()).unwrap_or(u64::MAX);
        self.delay_micros.store(micros, Ordering::Relaxed);
    }

    fn set_failure_rate(&self, rate: f64) {
        let rate = if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) };
        self.failure_rate_bits
            .store(rate.to_bits(), Ordering::Relaxed);
    }

    fn config(&self) -> GatewayConfig {
        GatewayConfig {
            processing_delay: Duration::from_micros(self.delay_micros.load(Ordering::Relaxed)),
            failure_rate: f64::from_bits(self.failure_rate_bits.load(Ordering::Relaxed)),
        }
    }
}
