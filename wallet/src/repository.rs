//! Tenant-scoped wallet persistence.
//!
//! Every method takes the operation context and filters on its tenant. Each
//! mutation runs in its own transaction; [`WalletRepository::modify`] locks
//! the row for the duration of the read-modify-write.
//!
//! [`WalletRepository::modify_once`] also stores the id of the command it
//! applied next to the balances, so a redelivered command finds its own id
//! and leaves the balances alone.

use crate::error::WalletError;
use crate::model::Wallet;
use atlas_core::context::OperationContext;
use atlas_postgres::Database;
use sqlx::Row;
use sqlx::postgres::PgRow;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

/// Boxed future returned by [`WalletRepository`] methods.
pub type RepositoryFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, WalletError>> + Send + 'a>>;

/// Transformation applied to a locked wallet.
pub type Mutation = Box<dyn FnOnce(Wallet) -> Result<Wallet, WalletError> + Send>;

/// Outcome of [`WalletRepository::modify_once`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The mutation ran and its result was stored
    Changed(Wallet),
    /// The transaction was already the last one applied; stored wallet returned as is
    Replayed(Wallet),
}

impl Applied {
    /// The stored wallet.
    #[must_use]
    pub const fn wallet(&self) -> Wallet {
        match self {
            Self::Changed(wallet) | Self::Replayed(wallet) => *wallet,
        }
    }
}

/// Wallet storage.
pub trait WalletRepository: Send + Sync {
    /// Wallet for `account_id`, if any.
    fn find<'a>(&'a self, ctx: &'a OperationContext, account_id: u32) -> RepositoryFuture<'a, Option<Wallet>>;

    /// Store a new wallet.
    ///
    /// # Errors
    ///
    /// [`WalletError::AlreadyExists`] if the account already has one.
    fn insert<'a>(&'a self, ctx: &'a OperationContext, wallet: Wallet) -> RepositoryFuture<'a, Wallet>;

    /// Apply `mutation` to the stored wallet atomically and store the result.
    ///
    /// # Errors
    ///
    /// [`WalletError::NotFound`] if there is no wallet, or the mutation's
    /// error (nothing is stored).
    fn modify<'a>(
        &'a self,
        ctx: &'a OperationContext,
        account_id: u32,
        mutation: Mutation,
    ) -> RepositoryFuture<'a, Wallet>;

    /// [`modify`](Self::modify) keyed by a command's transaction id.
    ///
    /// When `transaction_id` is the last id recorded on the wallet the
    /// mutation is skipped and [`Applied::Replayed`] is returned. Otherwise
    /// the mutation's result is stored together with `transaction_id`.
    ///
    /// # Errors
    ///
    /// As [`modify`](Self::modify).
    fn modify_once<'a>(
        &'a self,
        ctx: &'a OperationContext,
        account_id: u32,
        transaction_id: Uuid,
        mutation: Mutation,
    ) -> RepositoryFuture<'a, Applied>;

    /// Remove the wallet; returns whether one existed.
    fn delete<'a>(&'a self, ctx: &'a OperationContext, account_id: u32) -> RepositoryFuture<'a, bool>;
}

#[derive(Debug, Clone, Copy)]
struct StoredWallet {
    wallet: Wallet,
    last_transaction: Option<Uuid>,
}

/// In-memory repository keyed by `(tenant, account)`.
#[derive(Debug, Default)]
pub struct InMemoryWalletRepository {
    wallets: Mutex<HashMap<(Uuid, u32), StoredWallet>>,
}

impl InMemoryWalletRepository {
    /// Empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored wallets across all tenants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.wallets.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl WalletRepository for InMemoryWalletRepository {
    fn find<'a>(&'a self, ctx: &'a OperationContext, account_id: u32) -> RepositoryFuture<'a, Option<Wallet>> {
        Box::pin(async move {
            let key = (ctx.tenant()?.id(), account_id);
            Ok(self
                .wallets
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&key)
                .map(|stored| stored.wallet))
        })
    }

    fn insert<'a>(&'a self, ctx: &'a OperationContext, wallet: Wallet) -> RepositoryFuture<'a, Wallet> {
        Box::pin(async move {
            let key = (ctx.tenant()?.id(), wallet.account_id);
            let mut wallets = self.wallets.lock().unwrap_or_else(PoisonError::into_inner);
            if wallets.contains_key(&key) {
                return Err(WalletError::AlreadyExists(wallet.account_id));
            }
            wallets.insert(
                key,
                StoredWallet {
                    wallet,
                    last_transaction: None,
                },
            );
            Ok(wallet)
        })
    }

    fn modify<'a>(
        &'a self,
        ctx: &'a OperationContext,
        account_id: u32,
        mutation: Mutation,
    ) -> RepositoryFuture<'a, Wallet> {
        Box::pin(async move {
            let key = (ctx.tenant()?.id(), account_id);
            let mut wallets = self.wallets.lock().unwrap_or_else(PoisonError::into_inner);
            let stored = wallets.get_mut(&key).ok_or(WalletError::NotFound(account_id))?;
            stored.wallet = mutation(stored.wallet)?;
            Ok(stored.wallet)
        })
    }

    fn modify_once<'a>(
        &'a self,
        ctx: &'a OperationContext,
        account_id: u32,
        transaction_id: Uuid,
        mutation: Mutation,
    ) -> RepositoryFuture<'a, Applied> {
        Box::pin(async move {
            let key = (ctx.tenant()?.id(), account_id);
            let mut wallets = self.wallets.lock().unwrap_or_else(PoisonError::into_inner);
            let stored = wallets.get_mut(&key).ok_or(WalletError::NotFound(account_id))?;
            if stored.last_transaction == Some(transaction_id) {
                return Ok(Applied::Replayed(stored.wallet));
            }
            stored.wallet = mutation(stored.wallet)?;
            stored.last_transaction = Some(transaction_id);
            Ok(Applied::Changed(stored.wallet))
        })
    }

    fn delete<'a>(&'a self, ctx: &'a OperationContext, account_id: u32) -> RepositoryFuture<'a, bool> {
        Box::pin(async move {
            let key = (ctx.tenant()?.id(), account_id);
            Ok(self
                .wallets
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&key)
                .is_some())
        })
    }
}

/// Repository over the `wallets` table.
#[derive(Debug, Clone)]
pub struct PostgresWalletRepository {
    db: Database,
}

impl PostgresWalletRepository {
    /// Schema for the `wallets` table.
    pub const SCHEMA: &'static str = include_str!("../migrations/0001_create_wallets.sql");

    /// Repository over `db`.
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create the `wallets` table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns the database error if the statement fails.
    pub async fn bootstrap(&self) -> Result<(), WalletError> {
        sqlx::raw_sql(Self::SCHEMA).execute(self.db.pool()).await?;
        Ok(())
    }
}

fn balance(row: &PgRow, column: &str) -> Result<u32, WalletError> {
    let value: i64 = row.try_get(column)?;
    u32::try_from(value).map_err(|_| WalletError::InvalidRow(format!("{column} out of range: {value}")))
}

fn wallet_from_row(row: &PgRow) -> Result<Wallet, WalletError> {
    Ok(Wallet {
        account_id: balance(row, "account_id")?,
        credit: balance(row, "credit")?,
        points: balance(row, "points")?,
        prepaid: balance(row, "prepaid")?,
    })
}

impl WalletRepository for PostgresWalletRepository {
    fn find<'a>(&'a self, ctx: &'a OperationContext, account_id: u32) -> RepositoryFuture<'a, Option<Wallet>> {
        Box::pin(async move {
            let scope = self.db.scoped(ctx)?;
            sqlx::query(
                "SELECT account_id, credit, points, prepaid FROM wallets WHERE tenant_id = $1 AND account_id = $2",
            )
            .bind(scope.tenant_id())
            .bind(i64::from(account_id))
            .fetch_optional(scope.pool())
            .await?
            .as_ref()
            .map(wallet_from_row)
            .transpose()
        })
    }

    fn insert<'a>(&'a self, ctx: &'a OperationContext, wallet: Wallet) -> RepositoryFuture<'a, Wallet> {
        Box::pin(async move {
            let scope = self.db.scoped(ctx)?;
            let mut tx = scope.begin().await?;
            let result = sqlx::query(
                r"
                INSERT INTO wallets (tenant_id, account_id, credit, points, prepaid)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (tenant_id, account_id) DO NOTHING
                ",
            )
            .bind(scope.tenant_id())
            .bind(i64::from(wallet.account_id))
            .bind(i64::from(wallet.credit))
            .bind(i64::from(wallet.points))
            .bind(i64::from(wallet.prepaid))
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(WalletError::AlreadyExists(wallet.account_id));
            }
            tx.commit().await?;
            Ok(wallet)
        })
    }

    fn modify<'a>(
        &'a self,
        ctx: &'a OperationContext,
        account_id: u32,
        mutation: Mutation,
    ) -> RepositoryFuture<'a, Wallet> {
        Box::pin(async move {
            let scope = self.db.scoped(ctx)?;
            let mut tx = scope.begin().await?;
            let row = sqlx::query(
                r"
                SELECT account_id, credit, points, prepaid FROM wallets
                WHERE tenant_id = $1 AND account_id = $2
                FOR UPDATE
                ",
            )
            .bind(scope.tenant_id())
            .bind(i64::from(account_id))
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(WalletError::NotFound(account_id))?;

            let next = mutation(wallet_from_row(&row)?)?;
            sqlx::query(
                "UPDATE wallets SET credit = $3, points = $4, prepaid = $5 WHERE tenant_id = $1 AND account_id = $2",
            )
            .bind(scope.tenant_id())
            .bind(i64::from(account_id))
            .bind(i64::from(next.credit))
            .bind(i64::from(next.points))
            .bind(i64::from(next.prepaid))
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(next)
        })
    }

    fn modify_once<'a>(
        &'a self,
        ctx: &'a OperationContext,
        account_id: u32,
        transaction_id: Uuid,
        mutation: Mutation,
    ) -> RepositoryFuture<'a, Applied> {
        Box::pin(async move {
            let scope = self.db.scoped(ctx)?;
            let mut tx = scope.begin().await?;
            let row = sqlx::query(
                r"
                SELECT account_id, credit, points, prepaid, last_transaction_id FROM wallets
                WHERE tenant_id = $1 AND account_id = $2
                FOR UPDATE
                ",
            )
            .bind(scope.tenant_id())
            .bind(i64::from(account_id))
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(WalletError::NotFound(account_id))?;

            let current = wallet_from_row(&row)?;
            let last: Option<Uuid> = row.try_get("last_transaction_id")?;
            if last == Some(transaction_id) {
                return Ok(Applied::Replayed(current));
            }

            let next = mutation(current)?;
            sqlx::query(
                r"
                UPDATE wallets SET credit = $3, points = $4, prepaid = $5, last_transaction_id = $6
                WHERE tenant_id = $1 AND account_id = $2
                ",
            )
            .bind(scope.tenant_id())
            .bind(i64::from(account_id))
            .bind(i64::from(next.credit))
            .bind(i64::from(next.points))
            .bind(i64::from(next.prepaid))
            .bind(transaction_id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(Applied::Changed(next))
        })
    }

    fn delete<'a>(&'a self, ctx: &'a OperationContext, account_id: u32) -> RepositoryFuture<'a, bool> {
        Box::pin(async move {
            let scope = self.db.scoped(ctx)?;
            let mut tx = scope.begin().await?;
            let result = sqlx::query("DELETE FROM wallets WHERE tenant_id = $1 AND account_id = $2")
                .bind(scope.tenant_id())
                .bind(i64::from(account_id))
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(result.rows_affected() > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Currency;
    use atlas_core::tenant::Tenant;
    use atlas_testing::tenant_context;

    #[tokio::test]
    async fn test_wallets_are_isolated_per_tenant() {
        let repo = InMemoryWalletRepository::new();
        let ours = tenant_context();
        let theirs = OperationContext::new().with_tenant(Tenant::new(Uuid::new_v4(), "GMS", 83, 1).unwrap());

        repo.insert(&ours, Wallet::new(1, 10, 0, 0)).await.unwrap();

        assert_eq!(repo.find(&ours, 1).await.unwrap(), Some(Wallet::new(1, 10, 0, 0)));
        assert_eq!(repo.find(&theirs, 1).await.unwrap(), None);
        assert!(!repo.delete(&theirs, 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_rejected() {
        let repo = InMemoryWalletRepository::new();
        let ctx = tenant_context();
        repo.insert(&ctx, Wallet::empty(1)).await.unwrap();

        let err = repo.insert(&ctx, Wallet::new(1, 5, 5, 5)).await.unwrap_err();
        assert!(matches!(err, WalletError::AlreadyExists(1)));
        assert_eq!(repo.find(&ctx, 1).await.unwrap(), Some(Wallet::empty(1)));
    }

    #[tokio::test]
    async fn test_failed_mutation_stores_nothing() {
        let repo = InMemoryWalletRepository::new();
        let ctx = tenant_context();
        repo.insert(&ctx, Wallet::new(1, 10, 0, 0)).await.unwrap();

        let result = repo
            .modify(&ctx, 1, Box::new(|w: Wallet| w.adjusted(Currency::Credit, -11)))
            .await;

        assert!(matches!(result, Err(WalletError::InsufficientBalance(_))));
        assert_eq!(repo.find(&ctx, 1).await.unwrap().unwrap().credit, 10);
    }

    #[tokio::test]
    async fn test_modify_once_skips_repeated_transaction() {
        let repo = InMemoryWalletRepository::new();
        let ctx = tenant_context();
        repo.insert(&ctx, Wallet::new(1, 100, 0, 0)).await.unwrap();
        let transaction = Uuid::new_v4();
        let deduct = || -> Mutation { Box::new(|w: Wallet| w.adjusted(Currency::Credit, -30)) };

        let first = repo.modify_once(&ctx, 1, transaction, deduct()).await.unwrap();
        let again = repo.modify_once(&ctx, 1, transaction, deduct()).await.unwrap();

        assert_eq!(first, Applied::Changed(Wallet::new(1, 70, 0, 0)));
        assert_eq!(again, Applied::Replayed(Wallet::new(1, 70, 0, 0)));

        let next = repo.modify_once(&ctx, 1, Uuid::new_v4(), deduct()).await.unwrap();
        assert_eq!(next.wallet().credit, 40);
    }

    #[tokio::test]
    async fn test_rejected_modify_once_does_not_record_transaction() {
        let repo = InMemoryWalletRepository::new();
        let ctx = tenant_context();
        repo.insert(&ctx, Wallet::new(1, 10, 0, 0)).await.unwrap();
        let transaction = Uuid::new_v4();

        let rejected = repo
            .modify_once(&ctx, 1, transaction, Box::new(|w: Wallet| w.adjusted(Currency::Credit, -11)))
            .await;
        assert!(matches!(rejected, Err(WalletError::InsufficientBalance(Currency::Credit))));

        let retried = repo
            .modify_once(&ctx, 1, transaction, Box::new(|w: Wallet| w.adjusted(Currency::Credit, 5)))
            .await
            .unwrap();
        assert_eq!(retried, Applied::Changed(Wallet::new(1, 15, 0, 0)));
    }

    #[tokio::test]
    async fn test_missing_tenant_is_an_error() {
        let repo = InMemoryWalletRepository::new();
        let result = repo.find(&OperationContext::new(), 1).await;
        assert!(matches!(result, Err(WalletError::Context(_))));
    }
}
