//! Cash-shop wallet service.
//!
//! Keeps one wallet (credit, points, prepaid) per account and tenant. Wallets
//! are created and removed by account status events and adjusted by wallet
//! commands; every change is published as a wallet status event.
//!
//! Each mutation follows the same shape: open a transaction, mutate, stage
//! the event in a buffer, commit, then flush the buffer.

pub mod consumers;
pub mod error;
pub mod events;
pub mod model;
pub mod processor;
pub mod repository;

pub use consumers::WalletService;
pub use error::WalletError;
pub use model::{Currency, Wallet};
pub use processor::WalletProcessor;
pub use repository::{InMemoryWalletRepository, PostgresWalletRepository, WalletRepository};
