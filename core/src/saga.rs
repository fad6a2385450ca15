//! Saga model shared by the orchestrator and the services it drives.
//!
//! A saga is an ordered list of steps correlated by a transaction id. The
//! same id travels in the `transactionId` field of every command and status
//! event a step produces, which is how downstream consumers join related
//! messages without knowing about each other.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Well-known saga types.
pub mod saga_type {
    /// Inventory add/remove/move bundle
    pub const INVENTORY_TRANSACTION: &str = "inventory_transaction";
    /// Rewards on quest completion
    pub const QUEST_REWARD: &str = "quest_reward";
    /// Player-to-player trade
    pub const TRADE_TRANSACTION: &str = "trade_transaction";
    /// New character bootstrap
    pub const CHARACTER_CREATION: &str = "character_creation";
    /// Storage deposit/withdrawal
    pub const STORAGE_OPERATION: &str = "storage_operation";
    /// Cash-shop purchase or transfer
    pub const CASH_SHOP_OPERATION: &str = "cash_shop_operation";
    /// Gachapon draw
    pub const GACHAPON_TRANSACTION: &str = "gachapon_transaction";
}

/// Well-known step actions.
pub mod action {
    /// Grant an item
    pub const AWARD_ASSET: &str = "award_asset";
    /// Grant experience
    pub const AWARD_EXPERIENCE: &str = "award_experience";
    /// Grant mesos
    pub const AWARD_MESOS: &str = "award_mesos";
    /// Grant cash-shop currency
    pub const AWARD_CURRENCY: &str = "award_currency";
    /// Remove an item
    pub const DESTROY_ASSET: &str = "destroy_asset";
    /// Move an asset into the cash shop
    pub const TRANSFER_TO_CASH_SHOP: &str = "transfer_to_cash_shop";
    /// Move an asset out of the cash shop
    pub const WITHDRAW_FROM_CASH_SHOP: &str = "withdraw_from_cash_shop";
    /// Deposit into storage
    pub const DEPOSIT_TO_STORAGE: &str = "deposit_to_storage";
    /// Withdraw from storage
    pub const WITHDRAW_FROM_STORAGE: &str = "withdraw_from_storage";
    /// Create a character
    pub const CREATE_CHARACTER: &str = "create_character";
    /// Wait for character creation to be confirmed
    pub const AWAIT_CHARACTER_CREATED: &str = "await_character_created";
    /// Pick a gachapon reward
    pub const SELECT_GACHAPON_REWARD: &str = "select_gachapon_reward";
    /// Start a quest
    pub const START_QUEST: &str = "start_quest";
    /// Complete a quest
    pub const COMPLETE_QUEST: &str = "complete_quest";
}

/// Lifecycle of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Not yet attempted or awaiting confirmation
    Pending,
    /// Confirmed
    Completed,
    /// Attempted and failed; triggers compensation
    Failed,
}

/// One step of a saga.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Step identifier, unique within the saga
    pub step_id: String,
    /// Current status
    pub status: StepStatus,
    /// Action the step performs
    pub action: String,
    /// Action-specific data
    pub payload: serde_json::Value,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

impl Step {
    /// Pending step created at `now`.
    pub fn pending(
        step_id: impl Into<String>,
        action: impl Into<String>,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Pending,
            action: action.into(),
            payload,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A saga transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Saga {
    /// Correlator carried by every message the saga produces
    pub transaction_id: Uuid,
    /// See [`saga_type`]
    pub saga_type: String,
    /// Who started it (NPC id, account, service)
    pub initiated_by: String,
    /// Ordered steps
    pub steps: Vec<Step>,
}

impl Saga {
    /// Whether any step has failed.
    #[must_use]
    pub fn failing(&self) -> bool {
        self.steps.iter().any(|s| s.status == StepStatus::Failed)
    }

    /// First pending step.
    #[must_use]
    pub fn current_step(&self) -> Option<&Step> {
        self.steps.iter().find(|s| s.status == StepStatus::Pending)
    }

    /// Index of the last completed step.
    #[must_use]
    pub fn furthest_completed_step_index(&self) -> Option<usize> {
        self.steps.iter().rposition(|s| s.status == StepStatus::Completed)
    }

    /// Index of the first pending step.
    #[must_use]
    pub fn earliest_pending_step_index(&self) -> Option<usize> {
        self.steps.iter().position(|s| s.status == StepStatus::Pending)
    }

    /// Index of the first failed step.
    #[must_use]
    pub fn failed_step_index(&self) -> Option<usize> {
        self.steps.iter().position(|s| s.status == StepStatus::Failed)
    }

    /// Set the status of step `index`; out-of-range indices are ignored.
    pub fn set_step_status(&mut self, index: usize, status: StepStatus, now: DateTime<Utc>) {
        if let Some(step) = self.steps.get_mut(index) {
            step.status = status;
            step.updated_at = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn saga(statuses: &[StepStatus]) -> Saga {
        let now = Utc::now();
        Saga {
            transaction_id: Uuid::new_v4(),
            saga_type: saga_type::CASH_SHOP_OPERATION.to_string(),
            initiated_by: "9000000".to_string(),
            steps: statuses
                .iter()
                .enumerate()
                .map(|(i, status)| Step {
                    status: *status,
                    ..Step::pending(format!("step-{i}"), action::AWARD_CURRENCY, json!({}), now)
                })
                .collect(),
        }
    }

    #[test]
    fn test_step_queries() {
        use StepStatus::{Completed, Failed, Pending};
        let s = saga(&[Completed, Completed, Failed, Pending, Pending]);

        assert!(s.failing());
        assert_eq!(s.furthest_completed_step_index(), Some(1));
        assert_eq!(s.earliest_pending_step_index(), Some(3));
        assert_eq!(s.failed_step_index(), Some(2));
        assert_eq!(s.current_step().map(|st| st.step_id.as_str()), Some("step-3"));
    }

    #[test]
    fn test_queries_on_empty_saga() {
        let s = saga(&[]);
        assert!(!s.failing());
        assert!(s.current_step().is_none());
        assert_eq!(s.furthest_completed_step_index(), None);
        assert_eq!(s.earliest_pending_step_index(), None);
        assert_eq!(s.failed_step_index(), None);
    }

    #[test]
    fn test_set_step_status_ignores_out_of_range() {
        let mut s = saga(&[StepStatus::Pending]);
        let before = s.clone();
        s.set_step_status(3, StepStatus::Completed, Utc::now());
        assert_eq!(s, before);

        s.set_step_status(0, StepStatus::Completed, Utc::now());
        assert_eq!(s.steps[0].status, StepStatus::Completed);
        assert!(s.current_step().is_none());
    }

    #[test]
    fn test_wire_format() {
        let s = saga(&[StepStatus::Pending]);
        let value = serde_json::to_value(&s).unwrap();
        assert_eq!(value["sagaType"], "cash_shop_operation");
        assert_eq!(value["steps"][0]["status"], "pending");
        assert_eq!(value["steps"][0]["action"], "award_currency");
        assert!(value["steps"][0].get("createdAt").is_some());
    }
}
