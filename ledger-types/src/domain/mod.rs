//! Domain models for the ledger engine.

pub mod id;
pub mod money;
pub mod payment;
pub mod refund;

pub use id::{MerchantId, PaymentId, RefundId};
pub use money::{Currency, Money};
pub use payment::{Payment, PaymentStatus};
pub use refund::{Refund, RefundStatus};
