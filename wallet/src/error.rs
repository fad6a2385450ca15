//! Wallet service errors.

use crate::model::Currency;
use atlas_core::context::ContextError;
use atlas_core::emit::EmitError;
use atlas_core::message::MessageError;
use atlas_postgres::DatabaseError;
use thiserror::Error;

/// Errors raised by wallet operations.
#[derive(Error, Debug)]
pub enum WalletError {
    /// No wallet for the account
    #[error("wallet not found for account {0}")]
    NotFound(u32),

    /// Account already has a wallet
    #[error("wallet already exists for account {0}")]
    AlreadyExists(u32),

    /// Deduction larger than the balance
    #[error("insufficient {0} balance")]
    InsufficientBalance(Currency),

    /// Credit would exceed the balance range
    #[error("{0} balance overflow")]
    BalanceOverflow(Currency),

    /// Currency code outside 1..=3
    #[error("invalid currency type: {0}")]
    InvalidCurrency(u32),

    /// Operation context carried no tenant
    #[error(transparent)]
    Context(#[from] ContextError),

    /// Stored row could not be mapped to a wallet
    #[error("invalid wallet row: {0}")]
    InvalidRow(String),

    /// Persistence failed
    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// Event could not be built
    #[error(transparent)]
    Message(#[from] MessageError),

    /// Events could not be published after the mutation committed
    #[error(transparent)]
    Emit(#[from] EmitError),
}

impl WalletError {
    /// Whether retrying the same request could succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Emit(_))
    }
}

impl From<sqlx::Error> for WalletError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(DatabaseError::Query(err))
    }
}
