//! Wire envelopes for Atlas topics.
//!
//! Record values are UTF-8 JSON. Commands and status events share one layout:
//!
//! ```json
//! {
//!   "transactionId": "5b0c...",
//!   "worldId": 0,
//!   "accountId": 1000042,
//!   "type": "ADJUST_CURRENCY",
//!   "body": { "currencyType": 1, "amount": 500 }
//! }
//! ```
//!
//! Routing fields are promoted to the top level and omitted when unset.
//! Many handlers share one topic, each accepting only its own `type`; see
//! [`EnvelopeHead`] for the first decoding stage used to route by `type`
//! without committing to a body schema.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Routing fields promoted to the envelope top level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Routing {
    /// World the entity lives in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world_id: Option<u8>,
    /// Channel within the world
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<u8>,
    /// Map within the channel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_id: Option<u32>,
    /// Character the record concerns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_id: Option<u32>,
    /// Account the record concerns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<u32>,
    /// Guild the record concerns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<u32>,
}

impl Routing {
    /// Routing by world only.
    #[must_use]
    pub const fn world(world_id: u8) -> Self {
        Self {
            world_id: Some(world_id),
            channel_id: None,
            map_id: None,
            character_id: None,
            account_id: None,
            guild_id: None,
        }
    }

    /// Add an account id.
    #[must_use]
    pub const fn with_account(mut self, account_id: u32) -> Self {
        self.account_id = Some(account_id);
        self
    }

    /// Add a character id.
    #[must_use]
    pub const fn with_character(mut self, character_id: u32) -> Self {
        self.character_id = Some(character_id);
        self
    }

    /// Add a guild id.
    #[must_use]
    pub const fn with_guild(mut self, guild_id: u32) -> Self {
        self.guild_id = Some(guild_id);
        self
    }

    /// Add channel and map.
    #[must_use]
    pub const fn with_field(mut self, channel_id: u8, map_id: u32) -> Self {
        self.channel_id = Some(channel_id);
        self.map_id = Some(map_id);
        self
    }
}

/// First decoding stage: just the discriminator.
///
/// Decoding into this type never fails on an unfamiliar body, so a handler
/// can check `type` before attempting its own body schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EnvelopeHead {
    /// Discriminator, if the payload has one
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// Implemented by envelopes that carry a `type` discriminator.
pub trait Discriminated {
    /// The `type` field.
    fn kind(&self) -> &str;
}

macro_rules! envelope {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub struct $name<B> {
            /// Saga or business-operation correlator
            #[serde(default, skip_serializing_if = "Option::is_none")]
            pub transaction_id: Option<Uuid>,
            /// Partitioning fields
            #[serde(flatten)]
            pub routing: Routing,
            /// Discriminator selecting the body schema
            #[serde(rename = "type")]
            pub kind: String,
            /// Type-specific payload
            pub body: B,
        }

        impl<B> $name<B> {
            /// Envelope with empty routing and no transaction.
            pub fn new(kind: impl Into<String>, body: B) -> Self {
                Self {
                    transaction_id: None,
                    routing: Routing::default(),
                    kind: kind.into(),
                    body,
                }
            }

            /// Attach a transaction id.
            #[must_use]
            pub fn with_transaction(mut self, transaction_id: Uuid) -> Self {
                self.transaction_id = Some(transaction_id);
                self
            }

            /// Replace routing.
            #[must_use]
            pub fn with_routing(mut self, routing: Routing) -> Self {
                self.routing = routing;
                self
            }
        }

        impl<B> Discriminated for $name<B> {
            fn kind(&self) -> &str {
                &self.kind
            }
        }
    };
}

envelope! {
    /// A request for a service to do something.
    Command
}

envelope! {
    /// A fact a service announces about an entity it owns.
    StatusEvent
}

/// Single-type movement topic payload.
///
/// Movement topics carry nothing but movement, so there is no `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementCommand {
    /// World
    pub world_id: u8,
    /// Channel
    pub channel_id: u8,
    /// Map
    pub map_id: u32,
    /// Object being moved (character, monster, pet)
    pub object_id: u64,
    /// Character observing the movement
    pub observer_id: u32,
    /// Destination x
    pub x: i16,
    /// Destination y
    pub y: i16,
    /// Stance after the move
    pub stance: u8,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Adjust {
        currency_type: u8,
        amount: i32,
    }

    #[test]
    fn test_command_wire_layout() {
        let id = Uuid::nil();
        let cmd = Command::new("ADJUST_CURRENCY", Adjust { currency_type: 1, amount: 500 })
            .with_transaction(id)
            .with_routing(Routing::world(0).with_account(1_000_042));

        let value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(
            value,
            json!({
                "transactionId": "00000000-0000-0000-0000-000000000000",
                "worldId": 0,
                "accountId": 1_000_042,
                "type": "ADJUST_CURRENCY",
                "body": { "currencyType": 1, "amount": 500 }
            })
        );
    }

    #[test]
    fn test_status_event_decodes_without_optional_fields() {
        let event: StatusEvent<serde_json::Value> =
            serde_json::from_value(json!({"type": "DELETED", "body": {}})).unwrap();
        assert_eq!(event.kind(), "DELETED");
        assert!(event.transaction_id.is_none());
        assert_eq!(event.routing, Routing::default());
    }

    #[test]
    fn test_head_ignores_body() {
        let head: EnvelopeHead =
            serde_json::from_slice(br#"{"type":"CREATED","body":{"anything":[1,2,3]}}"#).unwrap();
        assert_eq!(head.kind.as_deref(), Some("CREATED"));

        let head: EnvelopeHead = serde_json::from_slice(br#"{"x":1}"#).unwrap();
        assert!(head.kind.is_none());
    }

    #[test]
    fn test_movement_command_has_no_type() {
        let movement = MovementCommand {
            world_id: 0,
            channel_id: 1,
            map_id: 100_000_000,
            object_id: 42,
            observer_id: 7,
            x: -10,
            y: 20,
            stance: 5,
        };
        let value = serde_json::to_value(movement).unwrap();
        assert!(value.get("type").is_none());
        assert_eq!(value["objectId"], 42);
    }
}
