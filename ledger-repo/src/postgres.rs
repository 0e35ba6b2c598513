//! PostgreSQL ledger store adapter.

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};

use ledger_types::{
    LedgerStore, ListParams, MerchantId, Payment, PaymentId, PaymentStore, Refund, RefundId,
    RefundStore, StoreError,
};

use crate::types::pg_rows::{DbPayment, DbRefund};
use crate::types::{DbAmount, DbStatus, db_err};

const PAYMENT_COLUMNS: &str =
    "id, merchant_id, amount, currency, status, payment_method, description, created_at, updated_at";
const REFUND_COLUMNS: &str =
    "id, payment_id, amount, currency, reason, status, created_at, updated_at";

// ─────────────────────────────────────────────────────────────────────────────
// PostgreSQL Store
// ─────────────────────────────────────────────────────────────────────────────

/// PostgreSQL ledger store with row-level locking.
pub struct PostgresRepo {
    pool: PgPool,
}

/// Executes SQL statements from a migration file, splitting by semicolons.
async fn execute_migration(pool: &PgPool, sql: &str, name: &str) -> Result<(), anyhow::Error> {
    for statement in sql.split(';') {
        let stmt = statement.trim();
        if !stmt.is_empty() {
            sqlx::query(stmt)
                .execute(pool)
                .await
                .map_err(|e| anyhow::anyhow!("Migration {} failed: {}", name, e))?;
        }
    }
    Ok(())
}

async fn run_migrations(pool: &PgPool) -> Result<(), anyhow::Error> {
    execute_migration(
        pool,
        include_str!("../migrations/0001_create_ledger_pg.sql"),
        "0001",
    )
    .await
}

impl PostgresRepo {
    /// Creates a new PostgreSQL store with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the database schema (for testing with existing pool).
    pub async fn create_schema(&self) -> Result<(), StoreError> {
        run_migrations(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    async fn complete_refund_in_tx(
        conn: &mut PgConnection,
        refund: &Refund,
        payment: &Payment,
    ) -> Result<(), StoreError> {
        // Lock refund then payment; every dual write takes them in this order.
        let locked_refund: Option<DbStatus> =
            sqlx::query_as(r#"SELECT status FROM refunds WHERE id = $1 FOR UPDATE"#)
                .bind(refund.id.into_uuid())
                .fetch_optional(&mut *conn)
                .await
                .map_err(db_err)?;

        match locked_refund {
            None => return Err(StoreError::NotFound),
            Some(row) if row.status != "PENDING" => {
                return Err(StoreError::Conflict("refund is not in pending status".into()));
            }
            Some(_) => {}
        }

        let locked_payment: Option<DbAmount> =
            sqlx::query_as(r#"SELECT amount FROM payments WHERE id = $1 FOR UPDATE"#)
                .bind(payment.id.into_uuid())
                .fetch_optional(&mut *conn)
                .await
                .map_err(db_err)?;

        let Some(current) = locked_payment else {
            return Err(StoreError::NotFound);
        };

        let expected_before = payment.amount.amount() + refund.amount.amount();
        if current.amount != expected_before {
            return Err(StoreError::Conflict(format!(
                "payment amount changed: expected {}, found {}",
                expected_before, current.amount
            )));
        }

        sqlx::query(r#"UPDATE refunds SET status = $1, updated_at = $2 WHERE id = $3"#)
            .bind(refund.status.as_str())
            .bind(refund.updated_at)
            .bind(refund.id.into_uuid())
            .execute(&mut *conn)
            .await
            .map_err(db_err)?;

        sqlx::query(r#"UPDATE payments SET amount = $1, updated_at = $2 WHERE id = $3"#)
            .bind(payment.amount.amount())
            .bind(payment.updated_at)
            .bind(payment.id.into_uuid())
            .execute(&mut *conn)
            .await
            .map_err(db_err)?;

        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Payment store
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl PaymentStore for PostgresRepo {
    async fn create_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO payments (id, merchant_id, amount, currency, status, payment_method, description, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
        )
        .bind(payment.id.into_uuid())
        .bind(payment.merchant_id.into_uuid())
        .bind(payment.amount.amount())
        .bind(payment.amount.currency().code())
        .bind(payment.status.as_str())
        .bind(&payment.payment_method)
        .bind(&payment.description)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>, StoreError> {
        let row: Option<DbPayment> = sqlx::query_as(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"
        ))
        .bind(id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(DbPayment::into_domain).transpose()
    }

    async fn update_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"UPDATE payments
               SET status = $1, payment_method = $2, description = $3, updated_at = $4
               WHERE id = $5 AND (status = 'PENDING' OR status = $1)"#,
        )
        .bind(payment.status.as_str())
        .bind(&payment.payment_method)
        .bind(&payment.description)
        .bind(payment.updated_at)
        .bind(payment.id.into_uuid())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            let row: Option<DbStatus> = sqlx::query_as(r#"SELECT status FROM payments WHERE id = $1"#)
                .bind(payment.id.into_uuid())
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
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE merchant_id = $1
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(merchant_id.into_uuid())
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
impl RefundStore for PostgresRepo {
    async fn create_refund(&self, refund: &Refund) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO refunds (id, payment_id, amount, currency, reason, status, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
        )
        .bind(refund.id.into_uuid())
        .bind(refund.payment_id.into_uuid())
        .bind(refund.amount.amount())
        .bind(refund.amount.currency().code())
        .bind(&refund.reason)
        .bind(refund.status.as_str())
        .bind(refund.created_at)
        .bind(refund.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn get_refund(&self, id: RefundId) -> Result<Option<Refund>, StoreError> {
        let row: Option<DbRefund> = sqlx::query_as(&format!(
            "SELECT {REFUND_COLUMNS} FROM refunds WHERE id = $1"
        ))
        .bind(id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(DbRefund::into_domain).transpose()
    }

    async fn update_refund(&self, refund: &Refund) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"UPDATE refunds SET reason = $1, status = $2, updated_at = $3
               WHERE id = $4 AND status = 'PENDING'"#,
        )
        .bind(&refund.reason)
        .bind(refund.status.as_str())
        .bind(refund.updated_at)
        .bind(refund.id.into_uuid())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            let exists: Option<DbStatus> = sqlx::query_as(r#"SELECT status FROM refunds WHERE id = $1"#)
                .bind(refund.id.into_uuid())
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
            "SELECT {REFUND_COLUMNS} FROM refunds WHERE payment_id = $1
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(payment_id.into_uuid())
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
impl LedgerStore for PostgresRepo {
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
