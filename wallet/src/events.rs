//! Wallet status events and the message providers that stage them.

use crate::model::Wallet;
use atlas_core::envelope::{Routing, StatusEvent};
use atlas_core::message::{Message, MessageError, create_key, single_message};
use serde::{Deserialize, Serialize};

/// Logical topic for wallet status events.
pub const EVENT_TOPIC_WALLET_STATUS: &str = "EVENT_TOPIC_WALLET_STATUS";

/// Wallet created.
pub const STATUS_EVENT_TYPE_CREATED: &str = "CREATED";
/// Balances changed.
pub const STATUS_EVENT_TYPE_UPDATED: &str = "UPDATED";
/// Wallet removed.
pub const STATUS_EVENT_TYPE_DELETED: &str = "DELETED";

/// Body of `CREATED` and `UPDATED` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalancesBody {
    /// NX credit balance
    pub credit: u32,
    /// Maple points balance
    pub points: u32,
    /// NX prepaid balance
    pub prepaid: u32,
}

impl From<&Wallet> for BalancesBody {
    fn from(wallet: &Wallet) -> Self {
        Self {
            credit: wallet.credit,
            points: wallet.points,
            prepaid: wallet.prepaid,
        }
    }
}

/// Body of `DELETED` events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedBody {}

fn status_event<B: Serialize>(account_id: u32, kind: &str, body: B) -> Result<Vec<Message>, MessageError> {
    let event = StatusEvent::new(kind, body).with_routing(Routing {
        account_id: Some(account_id),
        ..Routing::default()
    });
    single_message(create_key(i64::from(account_id)), &event)
}

/// `CREATED` event for `wallet`, keyed by account id.
///
/// # Errors
///
/// [`MessageError::Serialization`] if encoding fails.
pub fn created_status_event(wallet: &Wallet) -> Result<Vec<Message>, MessageError> {
    status_event(wallet.account_id, STATUS_EVENT_TYPE_CREATED, BalancesBody::from(wallet))
}

/// `UPDATED` event for `wallet`, keyed by account id.
///
/// # Errors
///
/// [`MessageError::Serialization`] if encoding fails.
pub fn updated_status_event(wallet: &Wallet) -> Result<Vec<Message>, MessageError> {
    status_event(wallet.account_id, STATUS_EVENT_TYPE_UPDATED, BalancesBody::from(wallet))
}

/// `DELETED` event for `account_id`.
///
/// # Errors
///
/// [`MessageError::Serialization`] if encoding fails.
pub fn deleted_status_event(account_id: u32) -> Result<Vec<Message>, MessageError> {
    status_event(account_id, STATUS_EVENT_TYPE_DELETED, DeletedBody {})
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_created_event_wire_shape() {
        let messages = created_status_event(&Wallet::new(1000, 5, 6, 7)).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].key, b"1000".to_vec());

        let value: serde_json::Value = serde_json::from_slice(&messages[0].value).unwrap();
        assert_eq!(
            value,
            json!({
                "accountId": 1000,
                "type": "CREATED",
                "body": { "credit": 5, "points": 6, "prepaid": 7 }
            })
        );
    }

    #[test]
    fn test_deleted_event_has_empty_body() {
        let messages = deleted_status_event(9).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&messages[0].value).unwrap();
        assert_eq!(value["type"], "DELETED");
        assert_eq!(value["body"], json!({}));
    }
}
