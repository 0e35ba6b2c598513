//! SQLite ledger store adapter.
#![allow(clippy::collapsible_if)]

use async_trait::async_trait;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{SqliteConnection, SqlitePool};
use std::str::FromStr;

use ledger_types::{
    LedgerStore, ListParams, MerchantId, Payment, PaymentId, PaymentStore, Refund, RefundId,
    RefundStore, StoreError,
};

use crate::types::sqlite_rows::{DbPayment, DbRefund};
use crate::types::{DbAmount, DbStatus, db_err, format_timestamp};

const PAYMENT_COLUMNS: &str =
    "id, merchant_id, amount, currency, status, payment_method, description, created_at, updated_at";
const REFUND_COLUMNS: &str =
    "id, payment_id, amount, currency, reason, status, created_at, updated_at";

// ─────────────────────────────────────────────────────────────────────────────
// SQLite Store
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite ledger store.
///
/// SQLite has a single writer per database, so every write transaction is
/// serialized by the engine itself; the dual write additionally guards both
/// rows with compare-and-set predicates.
pub struct SqliteRepo {
    pool: SqlitePool,
}

impl SqliteRepo {
    /// Creates a new SQLite store with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Ensure on-disk SQLite target directory exists (no-op for in-memory).
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            let path = path.split('?').next().unwrap_or(path);
            if path != ":memory:" {
                let p = std::path::Path::new(path);
                if let Some(parent) = p.parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePool::connect_with(options).await?;

        let repo = Self { pool };
        repo.create_schema().await?;
        Ok(repo)
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creates the database schema (for testing with existing pool).
    pub async fn create_schema(&self) -> Result<(), StoreError> {
        let ddl = include_str!("../migrations/0001_create_ledger.sql");
        sqlx::query(ddl)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    /// Runs both halves of the dual write on an open transaction.
    async fn complete_refund_in_tx(
        conn: &mut SqliteConnection,
        refund: &Refund,
        payment: &Payment,
    ) -> Result<(), StoreError> {
        // Writing first takes the database write lock for the rest of the transaction.
        let refund_update = sqlx::query(
            r#"UPDATE refunds SET status = ?, updated_at = ? WHERE id = ? AND status = 'PENDING'"#,
        )
        .bind(refund.status.as_str())
        .bind(format_timestamp(&refund.updated_at))
        .bind(refund.id.to_string())
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;

        if refund_update.rows_affected() == 0 {
            let row: Option<DbStatus> = sqlx::query_as(r#"SELECT status FROM refunds WHERE id = ?"#)
                .bind(refund.id.to_string())
                .fetch_optional(&mut *conn)
                .await
                .map_err(db_err)?;
            return Err(match row {
                None => StoreError::NotFound,
                Some(_) => StoreError::Conflict("refund is not in pending status".into()),
            });
        }

        let expected_before = payment.amount.amount() + refund.amount.amount();
        let payment_update = sqlx::query(
            r#"UPDATE payments SET amount = ?, updated_at = ? WHERE id = ? AND amount = ?"#,
        )
        .bind(payment.amount.amount())
        .bind(format_timestamp(&payment.updated_at))
        .bind(payment.id.to_string())
        .bind(expected_before)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;

        if payment_update.rows_affected() == 0 {
            let row: Option<DbAmount> = sqlx::query_as(r#"SELECT amount FROM payments WHERE id = ?"#)
                .bind(payment.id.to_string())
                .fetch_optional(&mut *conn)
                .await
                .map_err(db_err)?;
            return Err(match row {
                None => StoreError::NotFound,
                Some(current) => StoreError::Conflict(format!(
                    "payment amount changed: expected {}, found {}",
                    expected_before, current.amount
                )),
            });
        }

        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Payment store
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl PaymentStore for SqliteRepo {
    async fn create_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO payments (id, merchant_id, amount, currency, status, payment_method, description, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(payment.id.to_string())
        .bind(payment.merchant_id.to_string())
        .bind(payment.amount.amount())
        .bind(payment.amount.currency().code())
        .bind(payment.status.as_str())
        .bind(&payment.payment_method)
        .bind(&payment.description)
        .bind(format_timestamp(&payment.created_at))
        .bind(format_timestamp(&payment.updated_at))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>, StoreError> {
        let row: Option<DbPayment> = sqlx::query_as(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(DbPayment::into_domain).transpose()
    }

    async fn update_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"UPDATE payments
               SET status = ?, payment_method = ?, description = ?, updated_at = ?
               WHERE id = ? AND (status = 'PENDING' OR status = ?)"#,
        )
        .bind(payment.status.as_str())
        .bind(&payment.payment_method)
        .bind(&payment.description)
        .bind(format_timestamp(&payment.updated_at))
        .bind(payment.id.to_string())
        .bind(payment.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            let row: Option<DbStatus> = sqlx::query_as(r#"SELECT status FROM payments WHERE id = ?"#)
                .bind(payment.id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
            return Err(match row {
                None => StoreError::NotFound,
                Some(current) => StoreError::Conflict(format!(
                    "payment is {}, cannot move to {}",
                    current.status, payment.status
                )),
            });
        }

        Ok(())
    }

    async fn list_payments(
        &self,
        merchant_id: MerchantId,
        params: ListParams,
    ) -> Result<Vec<Payment>, StoreError> {
        let rows: Vec<DbPayment> = sqlx::query_as(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE merchant_id = ?
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
        ))
        .bind(merchant_id.to_string())
        .bind(params.limit)
        .bind(params.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(DbPayment::into_domain).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Refund store
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl RefundStore for SqliteRepo {
    async fn create_refund(&self, refund: &Refund) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO refunds (id, payment_id, amount, currency, reason, status, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(refund.id.to_string())
        .bind(refund.payment_id.to_string())
        .bind(refund.amount.amount())
        .bind(refund.amount.currency().code())
        .bind(&refund.reason)
        .bind(refund.status.as_str())
        .bind(format_timestamp(&refund.created_at))
        .bind(format_timestamp(&refund.updated_at))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn get_refund(&self, id: RefundId) -> Result<Option<Refund>, StoreError> {
        let row: Option<DbRefund> = sqlx::query_as(&format!(
            "SELECT {REFUND_COLUMNS} FROM refunds WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(DbRefund::into_domain).transpose()
    }

    async fn update_refund(&self, refund: &Refund) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"UPDATE refunds SET reason = ?, status = ?, updated_at = ?
               WHERE id = ? AND status = 'PENDING'"#,
        )
        .bind(&refund.reason)
        .bind(refund.status.as_str())
        .bind(format_timestamp(&refund.updated_at))
        .bind(refund.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            let exists: Option<DbStatus> = sqlx::query_as(r#"SELECT status FROM refunds WHERE id = ?"#)
                .bind(refund.id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
            return Err(match exists {
                None => StoreError::NotFound,
                Some(_) => StoreError::Conflict("refund is not in pending status".into()),
            });
        }

        Ok(())
    }

    async fn list_refunds(
        &self,
        payment_id: PaymentId,
        params: ListParams,
    ) -> Result<Vec<Refund>, StoreError> {
        let rows: Vec<DbRefund> = sqlx::query_as(&format!(
            "SELECT {REFUND_COLUMNS} FROM refunds WHERE payment_id = ?
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
        ))
        .bind(payment_id.to_string())
        .bind(params.limit)
        .bind(params.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(DbRefund::into_domain).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Atomic dual write
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl LedgerStore for SqliteRepo {
    async fn update_refund_and_payment(
        &self,
        refund: &Refund,
        payment: &Payment,
    ) -> Result<(), StoreError> {
        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Transaction(e.to_string()))?;

        match Self::complete_refund_in_tx(&mut db_tx, refund, payment).await {
            Ok(()) => db_tx
                .commit()
                .await
                .map_err(|e| StoreError::Transaction(e.to_string())),
            Err(e) => {
                if let Err(rollback_err) = db_tx.rollback().await {
                    tracing::error!(
                        refund_id = %refund.id,
                        error = %rollback_err,
                        "Rollback of refund completion failed"
                    );
                }
                Err(e)
            }
        }
    }
}
