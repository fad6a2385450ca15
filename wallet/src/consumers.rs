//! Inbound topics: account status events and wallet commands.
//!
//! Business rejections (unknown account, overdraw, bad currency) are logged
//! and the record is committed; redelivery would be rejected the same way.
//! Persistence and publish failures are reported to the runtime so the
//! offset is withheld. A redelivered `ADJUST_CURRENCY` is recognised by its
//! `transactionId` and only re-publishes the balances.

use crate::error::WalletError;
use crate::events::EVENT_TOPIC_WALLET_STATUS;
use crate::processor::WalletProcessor;
use crate::repository::WalletRepository;
use atlas_core::adapter::{HandlerConfig, adapt};
use atlas_core::context::OperationContext;
use atlas_core::envelope::{Command, StatusEvent};
use atlas_core::handler::{Handler, HandlerError};
use atlas_core::producer::{Producer, ProducerProvider};
use atlas_core::propagation::default_parsers;
use atlas_core::topic::{TopicError, TopicResolver};
use atlas_runtime::{ConfigError, ConsumerConfig, ConsumerManager, ConsumerOption, ManagerError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Logical topic for account status events.
pub const EVENT_TOPIC_ACCOUNT_STATUS: &str = "EVENT_TOPIC_ACCOUNT_STATUS";
/// Account created.
pub const ACCOUNT_STATUS_CREATED: &str = "CREATED";
/// Account deleted.
pub const ACCOUNT_STATUS_DELETED: &str = "DELETED";

/// Logical topic for wallet commands.
pub const COMMAND_TOPIC_WALLET: &str = "COMMAND_TOPIC_WALLET";
/// Adjust one balance by a signed amount.
pub const COMMAND_ADJUST_CURRENCY: &str = "ADJUST_CURRENCY";

/// Consumer group shared by every wallet service instance.
pub const CONSUMER_GROUP: &str = "Wallet Service";

/// Body of account status events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountStatusBody {
    /// Account name
    #[serde(default)]
    pub name: String,
}

/// Body of `ADJUST_CURRENCY` commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustCurrencyBody {
    /// 1 credit, 2 points, 3 prepaid
    pub currency_type: u32,
    /// Signed change
    pub amount: i32,
}

/// Errors raised while wiring consumers.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// Topic or broker variable missing
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Consumer could not be added
    #[error(transparent)]
    Manager(#[from] ManagerError),
}

/// Logical topics the wallet service publishes to.
pub const EMITTED_TOPICS: &[&str] = &[EVENT_TOPIC_WALLET_STATUS];

/// Shared dependencies for wallet handlers.
#[derive(Clone)]
pub struct WalletService {
    repository: Arc<dyn WalletRepository>,
    producer: Arc<dyn Producer>,
    topics: TopicResolver,
}

impl WalletService {
    /// Service over `repository`, publishing through `producer`.
    ///
    /// # Errors
    ///
    /// [`TopicError`] if any of [`EMITTED_TOPICS`] does not resolve.
    pub fn new(
        repository: Arc<dyn WalletRepository>,
        producer: Arc<dyn Producer>,
        topics: TopicResolver,
    ) -> Result<Self, TopicError> {
        for key in EMITTED_TOPICS {
            topics.resolve(key)?;
        }
        Ok(Self {
            repository,
            producer,
            topics,
        })
    }

    /// Processor for one operation.
    #[must_use]
    pub fn processor(&self, ctx: OperationContext) -> WalletProcessor {
        let provider = ProducerProvider::new(Arc::clone(&self.producer), self.topics.clone(), ctx);
        WalletProcessor::new(Arc::clone(&self.repository), provider)
    }
}

fn outcome<T>(result: Result<T, WalletError>, account_id: u32, action: &'static str) -> Result<(), HandlerError> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if e.is_transient() => Err(HandlerError::failed(e)),
        Err(e) => {
            tracing::warn!(account_id, action, error = %e, "Wallet request rejected");
            Ok(())
        }
    }
}

fn routed_account(account_id: Option<u32>, kind: &str) -> Option<u32> {
    if account_id.is_none() {
        tracing::warn!(kind, "Record has no accountId, skipping");
    }
    account_id
}

/// Creates an empty wallet when an account is created.
#[must_use]
pub fn account_created_handler(service: Arc<WalletService>) -> Arc<dyn Handler> {
    adapt(HandlerConfig::persistent(
        ACCOUNT_STATUS_CREATED,
        move |ctx: OperationContext, event: StatusEvent<AccountStatusBody>| {
            let service = Arc::clone(&service);
            async move {
                let Some(account_id) = routed_account(event.routing.account_id, &event.kind) else {
                    return Ok(());
                };
                let result = service.processor(ctx).create_and_emit(account_id, 0, 0, 0).await;
                outcome(result, account_id, "create")
            }
        },
    ))
}

/// Deletes the wallet when an account is deleted.
#[must_use]
pub fn account_deleted_handler(service: Arc<WalletService>) -> Arc<dyn Handler> {
    adapt(HandlerConfig::persistent(
        ACCOUNT_STATUS_DELETED,
        move |ctx: OperationContext, event: StatusEvent<AccountStatusBody>| {
            let service = Arc::clone(&service);
            async move {
                let Some(account_id) = routed_account(event.routing.account_id, &event.kind) else {
                    return Ok(());
                };
                let result = service.processor(ctx).delete_and_emit(account_id).await;
                outcome(result, account_id, "delete")
            }
        },
    ))
}

/// Applies `ADJUST_CURRENCY` commands.
#[must_use]
pub fn adjust_currency_handler(service: Arc<WalletService>) -> Arc<dyn Handler> {
    adapt(HandlerConfig::persistent(
        COMMAND_ADJUST_CURRENCY,
        move |ctx: OperationContext, command: Command<AdjustCurrencyBody>| {
            let service = Arc::clone(&service);
            async move {
                let Some(account_id) = routed_account(command.routing.account_id, &command.kind) else {
                    return Ok(());
                };
                let result = service
                    .processor(ctx)
                    .adjust_currency(
                        account_id,
                        command.body.currency_type,
                        command.body.amount,
                        command.transaction_id,
                    )
                    .await;
                outcome(result, account_id, "adjust_currency")
            }
        },
    ))
}

/// Consumer for account status events.
///
/// # Errors
///
/// [`ConfigError`] if the topic or broker variable is missing.
pub fn account_status_consumer(resolver: &TopicResolver) -> Result<ConsumerConfig, ConfigError> {
    Ok(
        ConsumerConfig::from_env(resolver, "account_status_event", EVENT_TOPIC_ACCOUNT_STATUS, CONSUMER_GROUP)?
            .with_option(ConsumerOption::HeaderParsers(default_parsers())),
    )
}

/// Consumer for wallet commands.
///
/// # Errors
///
/// [`ConfigError`] if the topic or broker variable is missing.
pub fn wallet_command_consumer(resolver: &TopicResolver) -> Result<ConsumerConfig, ConfigError> {
    Ok(
        ConsumerConfig::from_env(resolver, "wallet_command", COMMAND_TOPIC_WALLET, CONSUMER_GROUP)?
            .with_option(ConsumerOption::HeaderParsers(default_parsers())),
    )
}

/// Add both consumers to `manager` and register the wallet handlers.
///
/// # Errors
///
/// [`RegistrationError`] if a topic is unresolved or a consumer cannot start.
pub fn register(
    manager: &ConsumerManager,
    resolver: &TopicResolver,
    service: &Arc<WalletService>,
) -> Result<(), RegistrationError> {
    let account = account_status_consumer(resolver)?;
    let account_topic = account.topic.clone();
    manager.add_consumer(account)?;
    manager.register_handler(&account_topic, account_created_handler(Arc::clone(service)))?;
    manager.register_handler(&account_topic, account_deleted_handler(Arc::clone(service)))?;

    let command = wallet_command_consumer(resolver)?;
    manager.add_consumer_and_register(command, adjust_currency_handler(Arc::clone(service)))?;

    tracing::info!(topics = ?manager.topics(), "Wallet consumers registered");
    Ok(())
}
