//! Acquiring bank port.
//!
//! This trait defines the interface for the external authorization processor.
//! Implementations can be a real processor client, the simulator, etc.

use std::time::Duration;

use crate::context::RequestContext;
use crate::domain::{Payment, Refund};
use crate::error::GatewayError;

/// Gateway behaviour as an immutable value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GatewayConfig {
    /// Simulated network/processing latency per call
    pub processing_delay: Duration,
    /// Probability in `[0.0, 1.0]` that a call is declined
    pub failure_rate: f64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            processing_delay: Duration::from_millis(200),
            failure_rate: 0.05,
        }
    }
}

/// Port trait for the acquiring bank.
///
/// Shared across concurrent calls, so the setters take `&self` and must be
/// safe to call while authorizations are in flight.
#[async_trait::async_trait]
pub trait AcquiringBank: Send + Sync + 'static {
    /// Authorizes a payment. Returns early with `GatewayError::Interrupted`
    /// if the context finishes first.
    async fn authorize(&self, ctx: &RequestContext, payment: &Payment) -> Result<(), GatewayError>;

    /// Authorizes a refund, same contract as `authorize`.
    async fn authorize_refund(
        &self,
        ctx: &RequestContext,
        refund: &Refund,
    ) -> Result<(), GatewayError>;

    fn set_processing_delay(&self, delay: Duration);

    fn set_failure_rate(&self, rate: f64);

    /// Snapshot of the current configuration.
    fn config(&self) -> GatewayConfig;
}
