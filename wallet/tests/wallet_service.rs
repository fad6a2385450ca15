//! Wallet service scenarios: records in through in-memory readers, events out
//! through a recording producer.
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]

use atlas_core::producer::Producer;
use atlas_core::propagation::TENANT_ID_HEADER;
use atlas_core::topic::{TopicError, TopicResolver};
use atlas_runtime::ConsumerManager;
use atlas_runtime::config::BOOTSTRAP_SERVERS;
use atlas_testing::{
    ChannelReaderHandle, FailingProducer, RecordingProducer, StaticReaderFactory, TEST_TENANT_ID, record, tenant_context,
    test_tenant,
};
use atlas_wallet::consumers::{self, COMMAND_TOPIC_WALLET, EVENT_TOPIC_ACCOUNT_STATUS};
use atlas_wallet::events::EVENT_TOPIC_WALLET_STATUS;
use atlas_wallet::{InMemoryWalletRepository, Wallet, WalletRepository, WalletService};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use uuid::Uuid;

const ACCOUNT_TOPIC: &str = "atlas.account.status";
const COMMAND_TOPIC: &str = "atlas.wallet.commands";
const STATUS_TOPIC: &str = "atlas.wallet.status";

fn resolver() -> TopicResolver {
    TopicResolver::from_pairs([
        (EVENT_TOPIC_ACCOUNT_STATUS, ACCOUNT_TOPIC),
        (COMMAND_TOPIC_WALLET, COMMAND_TOPIC),
        (EVENT_TOPIC_WALLET_STATUS, STATUS_TOPIC),
        (BOOTSTRAP_SERVERS, "localhost:9092"),
    ])
}

struct Harness {
    manager: ConsumerManager,
    accounts: ChannelReaderHandle,
    commands: ChannelReaderHandle,
    repository: Arc<InMemoryWalletRepository>,
}

fn start(producer: Arc<dyn Producer>) -> Harness {
    let factory = Arc::new(StaticReaderFactory::new());
    let accounts = factory.channel(ACCOUNT_TOPIC);
    let commands = factory.channel(COMMAND_TOPIC);
    let manager = ConsumerManager::new(factory);

    let repository = Arc::new(InMemoryWalletRepository::new());
    let service = Arc::new(WalletService::new(repository.clone(), producer, resolver()).unwrap());
    consumers::register(&manager, &resolver(), &service).unwrap();

    Harness {
        manager,
        accounts,
        commands,
        repository,
    }
}

async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(5)).await;
    }
    condition()
}

fn send(feed: &ChannelReaderHandle, topic: &str, offset: i64, value: &Value) {
    feed.send(record(topic).offset(offset).tenant(&test_tenant()).json(value).build());
}

fn account_event(kind: &str, account_id: u32) -> Value {
    json!({ "accountId": account_id, "type": kind, "body": { "name": "maple" } })
}

fn adjust_command(account_id: u32, currency_type: u32, amount: i32) -> Value {
    json!({
        "transactionId": Uuid::new_v4(),
        "accountId": account_id,
        "type": "ADJUST_CURRENCY",
        "body": { "currencyType": currency_type, "amount": amount }
    })
}

async fn stored(repository: &InMemoryWalletRepository, account_id: u32) -> Option<Wallet> {
    repository.find(&tenant_context(), account_id).await.unwrap()
}

#[tokio::test]
async fn test_account_created_creates_empty_wallet_and_publishes() {
    let producer = Arc::new(RecordingProducer::new());
    let h = start(producer.clone());

    send(&h.accounts, ACCOUNT_TOPIC, 0, &account_event("CREATED", 1000));

    assert!(eventually(Duration::from_secs(2), || h.accounts.committed_values().len() == 1).await);
    assert_eq!(stored(&h.repository, 1000).await, Some(Wallet::empty(1000)));

    let events = producer.sent_to(STATUS_TOPIC);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].key, b"1000".to_vec());
    assert_eq!(
        events[0].headers.get_str(TENANT_ID_HEADER),
        Some(TEST_TENANT_ID.hyphenated().to_string().as_str())
    );
    let body: Value = serde_json::from_slice(&events[0].value).unwrap();
    assert_eq!(body["type"], "CREATED");

    h.manager.shutdown().await;
}

#[tokio::test]
async fn test_adjust_currency_command_updates_wallet() {
    let producer = Arc::new(RecordingProducer::new());
    let h = start(producer.clone());
    h.repository
        .insert(&tenant_context(), Wallet::new(7, 100, 0, 0))
        .await
        .unwrap();

    send(&h.commands, COMMAND_TOPIC, 0, &adjust_command(7, 1, -30));
    send(&h.commands, COMMAND_TOPIC, 1, &adjust_command(7, 3, 15));

    assert!(eventually(Duration::from_secs(2), || h.commands.committed_values().len() == 2).await);
    assert_eq!(stored(&h.repository, 7).await, Some(Wallet::new(7, 70, 0, 15)));

    let types: Vec<Value> = producer.json_sent_to(STATUS_TOPIC).into_iter().map(|e| e["type"].clone()).collect();
    assert_eq!(types, vec![json!("UPDATED"), json!("UPDATED")]);

    h.manager.shutdown().await;
}

#[tokio::test]
async fn test_rejected_adjustment_is_committed_without_event() {
    let producer = Arc::new(RecordingProducer::new());
    let h = start(producer.clone());
    h.repository
        .insert(&tenant_context(), Wallet::new(7, 10, 0, 0))
        .await
        .unwrap();

    send(&h.commands, COMMAND_TOPIC, 0, &adjust_command(7, 1, -11));
    send(&h.commands, COMMAND_TOPIC, 1, &adjust_command(7, 4, 1));

    assert!(eventually(Duration::from_secs(2), || h.commands.committed_values().len() == 2).await);
    assert_eq!(stored(&h.repository, 7).await, Some(Wallet::new(7, 10, 0, 0)));
    assert!(producer.is_empty());

    h.manager.shutdown().await;
}

#[tokio::test]
async fn test_account_deleted_removes_wallet() {
    let producer = Arc::new(RecordingProducer::new());
    let h = start(producer.clone());

    send(&h.accounts, ACCOUNT_TOPIC, 0, &account_event("CREATED", 3));
    send(&h.accounts, ACCOUNT_TOPIC, 1, &account_event("DELETED", 3));

    assert!(eventually(Duration::from_secs(2), || h.accounts.committed_values().len() == 2).await);
    assert_eq!(stored(&h.repository, 3).await, None);

    let types: Vec<Value> = producer.json_sent_to(STATUS_TOPIC).into_iter().map(|e| e["type"].clone()).collect();
    assert_eq!(types, vec![json!("CREATED"), json!("DELETED")]);

    h.manager.shutdown().await;
}

#[tokio::test]
async fn test_publish_failure_withholds_offset() {
    let producer = Arc::new(FailingProducer::always());
    let h = start(producer.clone());

    send(&h.accounts, ACCOUNT_TOPIC, 0, &account_event("CREATED", 1));

    assert!(
        eventually(Duration::from_secs(2), || {
            producer.attempts() == 1 && h.manager.in_flight(ACCOUNT_TOPIC) == Some(0)
        })
        .await
    );
    sleep(Duration::from_millis(50)).await;

    assert!(h.accounts.committed_values().is_empty());
    assert_eq!(stored(&h.repository, 1).await, Some(Wallet::empty(1)));

    h.manager.shutdown().await;
}

#[tokio::test]
async fn test_redelivered_adjustment_is_applied_once() {
    let producer = Arc::new(FailingProducer::times(1));
    let h = start(producer.clone());
    h.repository
        .insert(&tenant_context(), Wallet::new(7, 100, 0, 0))
        .await
        .unwrap();
    let command = adjust_command(7, 1, -30);

    send(&h.commands, COMMAND_TOPIC, 0, &command);
    assert!(
        eventually(Duration::from_secs(2), || {
            producer.attempts() == 1 && h.manager.in_flight(COMMAND_TOPIC) == Some(0)
        })
        .await
    );
    assert!(h.commands.committed_values().is_empty());
    assert_eq!(stored(&h.repository, 7).await, Some(Wallet::new(7, 70, 0, 0)));

    send(&h.commands, COMMAND_TOPIC, 0, &command);
    assert!(eventually(Duration::from_secs(2), || h.commands.committed_values().len() == 1).await);

    assert_eq!(stored(&h.repository, 7).await, Some(Wallet::new(7, 70, 0, 0)));
    let events = producer.delivered().json_sent_to(STATUS_TOPIC);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["body"]["credit"], 70);

    h.manager.shutdown().await;
}

#[tokio::test]
async fn test_record_without_tenant_is_skipped() {
    let producer = Arc::new(RecordingProducer::new());
    let h = start(producer.clone());

    h.accounts
        .send(record(ACCOUNT_TOPIC).offset(0).json(&account_event("CREATED", 9)).build());

    assert!(eventually(Duration::from_secs(2), || h.accounts.committed_values().len() == 1).await);
    assert!(h.repository.is_empty());
    assert!(producer.is_empty());

    h.manager.shutdown().await;
}

#[test]
fn test_service_requires_status_topic() {
    let without_status = TopicResolver::from_pairs([
        (EVENT_TOPIC_ACCOUNT_STATUS, ACCOUNT_TOPIC),
        (COMMAND_TOPIC_WALLET, COMMAND_TOPIC),
        (BOOTSTRAP_SERVERS, "localhost:9092"),
    ]);

    let result = WalletService::new(
        Arc::new(InMemoryWalletRepository::new()),
        Arc::new(RecordingProducer::new()),
        without_status,
    );

    assert!(matches!(result, Err(TopicError::Unset(key)) if key == EVENT_TOPIC_WALLET_STATUS));
}
