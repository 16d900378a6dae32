//! PostgreSQL ledger store
//!
//! Lock acquisition and status resolution are compare-and-set updates checked
//! via `rows_affected`; a reconciliation's {status, balance, unlock} triplet
//! runs inside one database transaction so a concurrent duplicate delivery
//! can never observe a half-applied state.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Row, postgres::PgRow};

use super::error::LedgerError;
use super::store::{LedgerStore, Resolution};
use super::types::{
    BalanceUpdate, NewTransaction, Transaction, TransactionId, TransactionStatus, Wallet, WalletId,
};

const WALLET_COLUMNS: &str = "id, user_id, balance, currency, is_locked, is_active";
const TX_COLUMNS: &str =
    "id, user_id, wallet_id, amount, currency, kind, status, reference, created_at";

/// PostgreSQL-backed [`LedgerStore`].
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the ledger tables if they do not exist.
    pub async fn ensure_schema(&self) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS wallets_tb (
                id UUID PRIMARY KEY,
                user_id BIGINT NOT NULL UNIQUE,
                balance NUMERIC(20, 4) NOT NULL DEFAULT 0,
                currency TEXT NOT NULL,
                is_locked BOOLEAN NOT NULL DEFAULT FALSE,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transactions_tb (
                id UUID PRIMARY KEY,
                user_id BIGINT NOT NULL,
                wallet_id UUID NOT NULL REFERENCES wallets_tb(id),
                amount NUMERIC(20, 4) NOT NULL,
                currency TEXT NOT NULL,
                kind TEXT NOT NULL,
                status TEXT NOT NULL,
                reference TEXT NOT NULL UNIQUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_wallet(row: &PgRow) -> Result<Wallet, LedgerError> {
        Ok(Wallet {
            id: WalletId::from(row.get::<uuid::Uuid, _>("id")),
            user_id: row.get("user_id"),
            balance: row.get("balance"),
            currency: row.get("currency"),
            is_locked: row.get("is_locked"),
            is_active: row.get("is_active"),
        })
    }

    fn row_to_transaction(row: &PgRow) -> Result<Transaction, LedgerError> {
        let kind: String = row.get("kind");
        let kind = kind
            .parse()
            .map_err(|_| LedgerError::Database(format!("Invalid transaction kind: {}", kind)))?;
        let status: String = row.get("status");
        let status = status
            .parse()
            .map_err(|_| LedgerError::Database(format!("Invalid transaction status: {}", status)))?;

        Ok(Transaction {
            id: TransactionId::from(row.get::<uuid::Uuid, _>("id")),
            user_id: row.get("user_id"),
            wallet_id: WalletId::from(row.get::<uuid::Uuid, _>("wallet_id")),
            amount: row.get("amount"),
            currency: row.get("currency"),
            kind,
            status,
            reference: row.get("reference"),
            created_at: row.get("created_at"),
        })
    }

    /// Guarded balance mutation against an arbitrary executor, shared by the
    /// standalone path and the resolve transaction.
    async fn apply_balance<'e, E>(
        executor: E,
        wallet_id: WalletId,
        amount: Decimal,
        mode: BalanceUpdate,
    ) -> Result<Option<Wallet>, LedgerError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let sql = match mode {
            BalanceUpdate::Add => format!(
                "UPDATE wallets_tb SET balance = balance + $2, updated_at = NOW() \
                 WHERE id = $1 RETURNING {WALLET_COLUMNS}"
            ),
            // The balance guard lives in the WHERE clause: an underflow is a
            // zero-row update, never a clamped write.
            BalanceUpdate::Subtract => format!(
                "UPDATE wallets_tb SET balance = balance - $2, updated_at = NOW() \
                 WHERE id = $1 AND balance >= $2 RETURNING {WALLET_COLUMNS}"
            ),
        };

        let row = sqlx::query(&sql)
            .bind(wallet_id.inner())
            .bind(amount)
            .fetch_optional(executor)
            .await?;

        row.map(|r| Self::row_to_wallet(&r)).transpose()
    }
}

#[async_trait]
impl LedgerStore for PgLedger {
    async fn create_wallet(&self, user_id: i64, currency: &str) -> Result<Wallet, LedgerError> {
        let wallet = Wallet::new(user_id, currency);
        let result = sqlx::query(
            r#"
            INSERT INTO wallets_tb (id, user_id, balance, currency, is_locked, is_active)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(wallet.id.inner())
        .bind(wallet.user_id)
        .bind(wallet.balance)
        .bind(&wallet.currency)
        .bind(wallet.is_locked)
        .bind(wallet.is_active)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(wallet),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(LedgerError::WalletExists(user_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_wallet(&self, wallet_id: WalletId) -> Result<Option<Wallet>, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets_tb WHERE id = $1"
        ))
        .bind(wallet_id.inner())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| Self::row_to_wallet(&r)).transpose()
    }

    async fn get_wallet_by_user(&self, user_id: i64) -> Result<Option<Wallet>, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets_tb WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| Self::row_to_wallet(&r)).transpose()
    }

    async fn acquire_lock(&self, wallet_id: WalletId) -> Result<Wallet, LedgerError> {
        // Single conditional update: two racing acquires cannot both match
        // `is_locked = FALSE`.
        let row = sqlx::query(&format!(
            "UPDATE wallets_tb SET is_locked = TRUE, updated_at = NOW() \
             WHERE id = $1 AND is_locked = FALSE RETURNING {WALLET_COLUMNS}"
        ))
        .bind(wallet_id.inner())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_wallet(&row),
            None => match self.get_wallet(wallet_id).await? {
                Some(_) => Err(LedgerError::LockConflict),
                None => Err(LedgerError::WalletNotFound),
            },
        }
    }

    async fn release_lock(&self, wallet_id: WalletId) -> Result<Wallet, LedgerError> {
        let row = sqlx::query(&format!(
            "UPDATE wallets_tb SET is_locked = FALSE, updated_at = NOW() \
             WHERE id = $1 RETURNING {WALLET_COLUMNS}"
        ))
        .bind(wallet_id.inner())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_wallet(&row),
            None => Err(LedgerError::WalletNotFound),
        }
    }

    async fn set_wallet_active(
        &self,
        wallet_id: WalletId,
        active: bool,
    ) -> Result<Wallet, LedgerError> {
        let row = sqlx::query(&format!(
            "UPDATE wallets_tb SET is_active = $2, updated_at = NOW() \
             WHERE id = $1 RETURNING {WALLET_COLUMNS}"
        ))
        .bind(wallet_id.inner())
        .bind(active)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_wallet(&row),
            None => Err(LedgerError::WalletNotFound),
        }
    }

    async fn update_balance(
        &self,
        wallet_id: WalletId,
        amount: Decimal,
        mode: BalanceUpdate,
    ) -> Result<Wallet, LedgerError> {
        match Self::apply_balance(&self.pool, wallet_id, amount, mode).await? {
            Some(wallet) => Ok(wallet),
            None => match self.get_wallet(wallet_id).await? {
                Some(_) => Err(LedgerError::InsufficientFunds),
                None => Err(LedgerError::WalletNotFound),
            },
        }
    }

    async fn create_transaction(&self, new: NewTransaction) -> Result<Transaction, LedgerError> {
        let id = TransactionId::new();
        let row = sqlx::query(&format!(
            "INSERT INTO transactions_tb \
                 (id, user_id, wallet_id, amount, currency, kind, status, reference) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {TX_COLUMNS}"
        ))
        .bind(id.inner())
        .bind(new.user_id)
        .bind(new.wallet_id.inner())
        .bind(new.amount)
        .bind(&new.currency)
        .bind(new.kind.as_str())
        .bind(new.status.as_str())
        .bind(&new.reference)
        .fetch_one(&self.pool)
        .await;

        match row {
            Ok(row) => Self::row_to_transaction(&row),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(LedgerError::DuplicateReference(new.reference))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_transaction_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Transaction>, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {TX_COLUMNS} FROM transactions_tb WHERE reference = $1"
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| Self::row_to_transaction(&r)).transpose()
    }

    async fn resolve_success(
        &self,
        reference: &str,
        verified_amount: Decimal,
        mode: BalanceUpdate,
    ) -> Result<Resolution, LedgerError> {
        let mut db_tx = self.pool.begin().await?;

        // Status CAS: only a pending row transitions. Zero rows means either
        // terminal (idempotent skip) or unknown reference.
        let row = sqlx::query(&format!(
            "UPDATE transactions_tb SET status = $2 \
             WHERE reference = $1 AND status = $3 RETURNING {TX_COLUMNS}"
        ))
        .bind(reference)
        .bind(TransactionStatus::Success.as_str())
        .bind(TransactionStatus::Pending.as_str())
        .fetch_optional(&mut *db_tx)
        .await?;

        let Some(row) = row else {
            db_tx.rollback().await?;
            return match self.get_transaction_by_reference(reference).await? {
                Some(tx) => Ok(Resolution::AlreadyTerminal(tx)),
                None => Err(LedgerError::TransactionNotFound(reference.to_string())),
            };
        };
        let tx = Self::row_to_transaction(&row)?;

        let applied =
            Self::apply_balance(&mut *db_tx, tx.wallet_id, verified_amount, mode).await?;
        if applied.is_none() {
            // Guard rejected the mutation; abort the whole unit so the
            // transaction stays pending and the lock stays held.
            db_tx.rollback().await?;
            return Err(LedgerError::InsufficientFunds);
        }

        sqlx::query("UPDATE wallets_tb SET is_locked = FALSE, updated_at = NOW() WHERE id = $1")
            .bind(tx.wallet_id.inner())
            .execute(&mut *db_tx)
            .await?;

        db_tx.commit().await?;
        Ok(Resolution::Applied(tx))
    }

    async fn resolve_failure(&self, reference: &str) -> Result<Resolution, LedgerError> {
        let mut db_tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "UPDATE transactions_tb SET status = $2 \
             WHERE reference = $1 AND status = $3 RETURNING {TX_COLUMNS}"
        ))
        .bind(reference)
        .bind(TransactionStatus::Failed.as_str())
        .bind(TransactionStatus::Pending.as_str())
        .fetch_optional(&mut *db_tx)
        .await?;

        let Some(row) = row else {
            db_tx.rollback().await?;
            return match self.get_transaction_by_reference(reference).await? {
                Some(tx) => Ok(Resolution::AlreadyTerminal(tx)),
                None => Err(LedgerError::TransactionNotFound(reference.to_string())),
            };
        };
        let tx = Self::row_to_transaction(&row)?;

        sqlx::query("UPDATE wallets_tb SET is_locked = FALSE, updated_at = NOW() WHERE id = $1")
            .bind(tx.wallet_id.inner())
            .execute(&mut *db_tx)
            .await?;

        db_tx.commit().await?;
        Ok(Resolution::Applied(tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::types::TransactionKind;
    use rust_decimal_macros::dec;
    use sqlx::postgres::PgPoolOptions;

    async fn create_test_pool() -> Option<PgPool> {
        let database_url = std::env::var("DATABASE_URL").ok()?;
        PgPoolOptions::new()
            .max_connections(2)
            .connect(&database_url)
            .await
            .ok()
    }

    #[tokio::test]
    async fn test_pg_lock_and_resolution() {
        let Some(pool) = create_test_pool().await else {
            eprintln!("Skipping test - database not available");
            return;
        };

        let ledger = PgLedger::new(pool);
        ledger.ensure_schema().await.unwrap();

        // Unique user per run to keep the test re-entrant.
        let user_id = chrono::Utc::now().timestamp_micros();
        let wallet = ledger.create_wallet(user_id, "NGN").await.unwrap();

        let locked = ledger.acquire_lock(wallet.id).await.unwrap();
        assert!(locked.is_locked);
        assert!(matches!(
            ledger.acquire_lock(wallet.id).await,
            Err(LedgerError::LockConflict)
        ));

        let reference = format!("tx_ref-{}-{}", user_id, ulid::Ulid::new());
        ledger
            .create_transaction(NewTransaction::pending(
                user_id,
                wallet.id,
                dec!(1000),
                "NGN",
                TransactionKind::Fund,
                &reference,
            ))
            .await
            .unwrap();

        let first = ledger
            .resolve_success(&reference, dec!(1000), BalanceUpdate::Add)
            .await
            .unwrap();
        assert!(first.is_applied());

        let second = ledger
            .resolve_success(&reference, dec!(1000), BalanceUpdate::Add)
            .await
            .unwrap();
        assert!(!second.is_applied());

        let wallet = ledger.get_wallet(wallet.id).await.unwrap().unwrap();
        assert_eq!(wallet.balance, dec!(1000));
        assert!(!wallet.is_locked);
    }
}
