//! # Ledger Engine
//!
//! Payment and refund lifecycle managers.
//!
//! ## Architecture
//!
//! - `payments` - Payment manager (store + acquiring bank)
//! - `refunds` - Refund manager (store only, atomic dual write)
//! - `locks` - Per-entity lock table shared by both managers' write paths
//!
//! Managers are generic over the `ledger_types` ports, so any store or bank
//! adapter can be injected.

pub mod locks;
pub mod payments;
pub mod refunds;

#[cfg(test)]
mod manager_tests;

pub use payments::PaymentManager;
pub use refunds::RefundManager;
