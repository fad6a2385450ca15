//! Wallet operations.
//!
//! Every mutation comes in two shapes. The plain form (`create`, `update`,
//! `delete`) takes a [`Buffer`] so a caller can stage this wallet's events
//! alongside others inside a larger operation. The `*_and_emit` form opens
//! its own buffer and publishes it once the mutation has committed.

use crate::error::WalletError;
use crate::events::{EVENT_TOPIC_WALLET_STATUS, created_status_event, deleted_status_event, updated_status_event};
use crate::model::{Currency, Wallet};
use crate::repository::{Applied, Mutation, WalletRepository};
use atlas_core::buffer::Buffer;
use atlas_core::context::OperationContext;
use atlas_core::emit::{emit, emit_with_result};
use atlas_core::producer::ProducerProvider;
use std::sync::Arc;
use uuid::Uuid;

/// Wallet operations bound to one operation context.
#[derive(Clone)]
pub struct WalletProcessor {
    repository: Arc<dyn WalletRepository>,
    producer: ProducerProvider,
}

impl WalletProcessor {
    /// Processor over `repository`, publishing through `producer`.
    ///
    /// The producer's context is the operation context for every call.
    #[must_use]
    pub fn new(repository: Arc<dyn WalletRepository>, producer: ProducerProvider) -> Self {
        Self { repository, producer }
    }

    fn ctx(&self) -> &OperationContext {
        self.producer.context()
    }

    /// Wallet for `account_id`.
    ///
    /// # Errors
    ///
    /// [`WalletError::NotFound`] if the account has none.
    pub async fn get_by_account_id(&self, account_id: u32) -> Result<Wallet, WalletError> {
        self.repository
            .find(self.ctx(), account_id)
            .await?
            .ok_or(WalletError::NotFound(account_id))
    }

    /// Create a wallet and stage its `CREATED` event.
    ///
    /// # Errors
    ///
    /// [`WalletError::AlreadyExists`] or a persistence error; nothing is staged.
    pub async fn create(
        &self,
        buffer: &mut Buffer,
        account_id: u32,
        credit: u32,
        points: u32,
        prepaid: u32,
    ) -> Result<Wallet, WalletError> {
        tracing::debug!(account_id, credit, points, prepaid, "Initializing wallet");
        let wallet = self
            .repository
            .insert(self.ctx(), Wallet::new(account_id, credit, points, prepaid))
            .await
            .inspect_err(|e| tracing::error!(account_id, error = %e, "Could not create wallet"))?;

        buffer.put(EVENT_TOPIC_WALLET_STATUS, || created_status_event(&wallet))?;
        Ok(wallet)
    }

    /// [`create`](Self::create) and publish.
    ///
    /// # Errors
    ///
    /// See [`create`](Self::create); also [`WalletError::Emit`].
    pub async fn create_and_emit(
        &self,
        account_id: u32,
        credit: u32,
        points: u32,
        prepaid: u32,
    ) -> Result<Wallet, WalletError> {
        let this = self.clone();
        emit_with_result(&self.producer, move |buf| {
            Box::pin(async move { this.create(buf, account_id, credit, points, prepaid).await })
        })
        .await
    }

    /// Overwrite a wallet's balances and stage its `UPDATED` event.
    ///
    /// # Errors
    ///
    /// [`WalletError::NotFound`] or a persistence error; nothing is staged.
    pub async fn update(
        &self,
        buffer: &mut Buffer,
        account_id: u32,
        credit: u32,
        points: u32,
        prepaid: u32,
    ) -> Result<Wallet, WalletError> {
        tracing::debug!(account_id, credit, points, prepaid, "Updating wallet");
        let wallet = self
            .repository
            .modify(
                self.ctx(),
                account_id,
                Box::new(move |_: Wallet| Ok(Wallet::new(account_id, credit, points, prepaid))),
            )
            .await
            .inspect_err(|e| tracing::error!(account_id, error = %e, "Could not update wallet"))?;

        buffer.put(EVENT_TOPIC_WALLET_STATUS, || updated_status_event(&wallet))?;
        Ok(wallet)
    }

    /// [`update`](Self::update) and publish.
    ///
    /// # Errors
    ///
    /// See [`update`](Self::update); also [`WalletError::Emit`].
    pub async fn update_and_emit(
        &self,
        account_id: u32,
        credit: u32,
        points: u32,
        prepaid: u32,
    ) -> Result<Wallet, WalletError> {
        let this = self.clone();
        emit_with_result(&self.producer, move |buf| {
            Box::pin(async move { this.update(buf, account_id, credit, points, prepaid).await })
        })
        .await
    }

    /// Add `amount` (negative to deduct) to one balance and publish the
    /// resulting `UPDATED` event.
    ///
    /// `currency_type` is 1 for credit, 2 for points, 3 for prepaid. The
    /// balance check and the write happen under one row lock.
    ///
    /// With a `transaction_id`, a command whose id is already recorded on the
    /// wallet is not applied again; the current balances are re-published so
    /// an event lost to a failed publish still goes out.
    ///
    /// # Errors
    ///
    /// [`WalletError::InvalidCurrency`], [`WalletError::InsufficientBalance`],
    /// [`WalletError::NotFound`], or a persistence or publish error.
    pub async fn adjust_currency(
        &self,
        account_id: u32,
        currency_type: u32,
        amount: i32,
        transaction_id: Option<Uuid>,
    ) -> Result<Wallet, WalletError> {
        let currency = Currency::try_from(currency_type)
            .inspect_err(|_| tracing::error!(account_id, currency_type, "Invalid currency type"))?;

        let this = self.clone();
        emit_with_result(&self.producer, move |buf| {
            Box::pin(async move {
                let mutation: Mutation = Box::new(move |wallet: Wallet| wallet.adjusted(currency, amount));
                let applied = match transaction_id {
                    Some(id) => this.repository.modify_once(this.ctx(), account_id, id, mutation).await,
                    None => this.repository.modify(this.ctx(), account_id, mutation).await.map(Applied::Changed),
                }
                .inspect_err(|e| {
                    tracing::error!(account_id, currency = %currency, amount, error = %e, "Could not adjust currency");
                })?;

                let wallet = match applied {
                    Applied::Changed(wallet) => {
                        tracing::debug!(
                            account_id,
                            currency = %currency,
                            amount,
                            credit = wallet.credit,
                            points = wallet.points,
                            prepaid = wallet.prepaid,
                            "Adjusted currency"
                        );
                        wallet
                    }
                    Applied::Replayed(wallet) => {
                        tracing::info!(
                            account_id,
                            transaction_id = ?transaction_id,
                            "Adjustment already applied, republishing balances"
                        );
                        wallet
                    }
                };
                buf.put(EVENT_TOPIC_WALLET_STATUS, || updated_status_event(&wallet))?;
                Ok(wallet)
            })
        })
        .await
    }

    /// Delete a wallet and stage its `DELETED` event.
    ///
    /// # Errors
    ///
    /// [`WalletError::NotFound`] if there was nothing to delete (nothing is
    /// staged), or a persistence error.
    pub async fn delete(&self, buffer: &mut Buffer, account_id: u32) -> Result<(), WalletError> {
        tracing::debug!(account_id, "Account deleted, cleaning up wallet");
        if !self.repository.delete(self.ctx(), account_id).await? {
            return Err(WalletError::NotFound(account_id));
        }
        buffer.put(EVENT_TOPIC_WALLET_STATUS, || deleted_status_event(account_id))?;
        Ok(())
    }

    /// [`delete`](Self::delete) and publish.
    ///
    /// # Errors
    ///
    /// See [`delete`](Self::delete); also [`WalletError::Emit`].
    pub async fn delete_and_emit(&self, account_id: u32) -> Result<(), WalletError> {
        let this = self.clone();
        emit(&self.producer, move |buf| {
            Box::pin(async move { this.delete(buf, account_id).await })
        })
        .await
    }
}
