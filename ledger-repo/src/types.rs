//! Database row types and conversions for the SQLite and PostgreSQL adapters.

use sqlx::FromRow;

use ledger_types::{Currency, PaymentStatus, RefundStatus, StoreError};

// ─────────────────────────────────────────────────────────────────────────────
// Database row structs (derive FromRow for automatic mapping)
//
// One set per backend: SQLite stores ids and timestamps as TEXT, PostgreSQL
// as UUID and TIMESTAMPTZ.
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(feature = "sqlite")]
pub mod sqlite_rows {
    use sqlx::FromRow;

    use ledger_types::{MerchantId, Money, Payment, PaymentId, Refund, RefundId, StoreError};

    use super::{parse_currency, parse_payment_status, parse_refund_status, parse_timestamp, parse_uuid};

    /// Payment row as stored in SQLite.
    #[derive(FromRow)]
    pub struct DbPayment {
        pub id: String,
        pub merchant_id: String,
        pub amount: i64,
        pub currency: String,
        pub status: String,
        pub payment_method: String,
        pub description: String,
        pub created_at: String,
        pub updated_at: String,
    }

    /// Refund row as stored in SQLite.
    #[derive(FromRow)]
    pub struct DbRefund {
        pub id: String,
        pub payment_id: String,
        pub amount: i64,
        pub currency: String,
        pub reason: String,
        pub status: String,
        pub created_at: String,
        pub updated_at: String,
    }

    impl DbPayment {
        /// Convert database row to domain Payment.
        pub fn into_domain(self) -> Result<Payment, StoreError> {
            let currency = parse_currency(&self.currency)?;
            Ok(Payment {
                id: PaymentId::from_uuid(parse_uuid(&self.id)?),
                merchant_id: MerchantId::from_uuid(parse_uuid(&self.merchant_id)?),
                amount: Money::new(self.amount, currency).map_err(StoreError::Domain)?,
                status: parse_payment_status(&self.status)?,
                payment_method: self.payment_method,
                description: self.description,
                created_at: parse_timestamp(&self.created_at)?,
                updated_at: parse_timestamp(&self.updated_at)?,
            })
        }
    }

    impl DbRefund {
        /// Convert database row to domain Refund.
        pub fn into_domain(self) -> Result<Refund, StoreError> {
            let currency = parse_currency(&self.currency)?;
            Ok(Refund {
                id: RefundId::from_uuid(parse_uuid(&self.id)?),
                payment_id: PaymentId::from_uuid(parse_uuid(&self.payment_id)?),
                amount: Money::new(self.amount, currency).map_err(StoreError::Domain)?,
                reason: self.reason,
                status: parse_refund_status(&self.status)?,
                created_at: parse_timestamp(&self.created_at)?,
                updated_at: parse_timestamp(&self.updated_at)?,
            })
        }
    }
}

#[cfg(feature = "postgres")]
pub mod pg_rows {
    use chrono::{DateTime, Utc};
    use sqlx::FromRow;
    use uuid::Uuid;

    use ledger_types::{MerchantId, Money, Payment, PaymentId, Refund, RefundId, StoreError};

    use super::{parse_currency, parse_payment_status, parse_refund_status};

    /// Payment row as stored in PostgreSQL.
    #[derive(FromRow)]
    pub struct DbPayment {
        pub id: Uuid,
        pub merchant_id: Uuid,
        pub amount: i64,
        pub currency: String,
        pub status: String,
        pub payment_method: String,
        pub description: String,
        pub created_at: DateTime<Utc>,
        pub updated_at: DateTime<Utc>,
    }

    /// Refund row as stored in PostgreSQL.
    #[derive(FromRow)]
    pub struct DbRefund {
        pub id: Uuid,
        pub payment_id: Uuid,
        pub amount: i64,
        pub currency: String,
        pub reason: String,
        pub status: String,
        pub created_at: DateTime<Utc>,
        pub updated_at: DateTime<Utc>,
    }

    impl DbPayment {
        /// Convert database row to domain Payment.
        pub fn into_domain(self) -> Result<Payment, StoreError> {
            let currency = parse_currency(&self.currency)?;
            Ok(Payment {
                id: PaymentId::from_uuid(self.id),
                merchant_id: MerchantId::from_uuid(self.merchant_id),
                amount: Money::new(self.amount, currency).map_err(StoreError::Domain)?,
                status: parse_payment_status(&self.status)?,
                payment_method: self.payment_method,
                description: self.description,
                created_at: self.created_at,
                updated_at: self.updated_at,
            })
        }
    }

    impl DbRefund {
        /// Convert database row to domain Refund.
        pub fn into_domain(self) -> Result<Refund, StoreError> {
            let currency = parse_currency(&self.currency)?;
            Ok(Refund {
                id: RefundId::from_uuid(self.id),
                payment_id: PaymentId::from_uuid(self.payment_id),
                amount: Money::new(self.amount, currency).map_err(StoreError::Domain)?,
                reason: self.reason,
                status: parse_refund_status(&self.status)?,
                created_at: self.created_at,
                updated_at: self.updated_at,
            })
        }
    }

}

/// Amount-only row, read under lock during the dual write.
#[derive(FromRow)]
pub struct DbAmount {
    pub amount: i64,
}

/// Status-only row.
#[derive(FromRow)]
pub struct DbStatus {
    pub status: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Parsing helpers
// ─────────────────────────────────────────────────────────────────────────────

pub fn parse_currency(s: &str) -> Result<Currency, StoreError> {
    s.parse()
        .map_err(|_| StoreError::Database(format!("Unknown currency: {}", s)))
}

pub fn parse_payment_status(s: &str) -> Result<PaymentStatus, StoreError> {
    s.parse()
        .map_err(|_| StoreError::Database(format!("Unknown payment status: {}", s)))
}

pub fn parse_refund_status(s: &str) -> Result<RefundStatus, StoreError> {
    s.parse()
        .map_err(|_| StoreError::Database(format!("Unknown refund status: {}", s)))
}

#[cfg(feature = "sqlite")]
pub fn parse_uuid(s: &str) -> Result<uuid::Uuid, StoreError> {
    uuid::Uuid::parse_str(s).map_err(|e| StoreError::Database(e.to_string()))
}

#[cfg(feature = "sqlite")]
pub fn parse_timestamp(s: &str) -> Result<chrono::DateTime<chrono::Utc>, StoreError> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| StoreError::Database(e.to_string()))
}

/// Fixed-width RFC 3339 so TEXT columns sort chronologically.
#[cfg(feature = "sqlite")]
pub fn format_timestamp(dt: &chrono::DateTime<chrono::Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)
}

// ─────────────────────────────────────────────────────────────────────────────
// Error mapping
// ─────────────────────────────────────────────────────────────────────────────

/// Constraint violations are conflicts with stored state; everything else is a database error.
pub fn db_err(e: sqlx::Error) -> StoreError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() || db.is_foreign_key_violation() => {
            StoreError::Conflict(db.message().to_string())
        }
        _ => StoreError::Database(e.to_string()),
    }
}
