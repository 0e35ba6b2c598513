//! Port traits (interfaces for adapters).
//!
//! These are the contracts that adapters must implement.
//! The managers depend on these traits, not concrete implementations.

mod acquiring_bank;
mod store;

pub use acquiring_bank::{AcquiringBank, GatewayConfig};
pub use store::{LedgerStore, PaymentStore, RefundStore};
