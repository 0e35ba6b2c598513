//! # Ledger Types
//!
//! Domain types and port traits for the payment/refund transaction engine.
//! This crate has no IO of its own - only data structures, business rules,
//! the request context and trait definitions.
//!
//! ## Architecture
//!
//! This crate represents the **innermost core** of the hexagonal architecture:
//! - `domain/` - Pure domain types (Money, Payment, Refund)
//! - `ports/` - Trait definitions that adapters must implement (store, acquiring bank)
//! - `context` - Cancellation and deadline carried by every manager call
//! - `dto/` - Request types for the manager boundary
//! - `error/` - Domain, store, gateway and engine error types

pub mod context;
pub mod domain;
pub mod dto;
pub mod error;
pub mod ports;

// Re-export commonly used types
pub use context::{CancelHandle, Interrupted, RequestContext};
pub use domain::{
    Currency, MerchantId, Money, Payment, PaymentId, PaymentStatus, Refund, RefundId, RefundStatus,
};
pub use dto::*;
pub use error::{DomainError, EngineError, GatewayError, StoreError};
pub use ports::{AcquiringBank, GatewayConfig, LedgerStore, PaymentStore, RefundStore};
