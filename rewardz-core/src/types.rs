//! Core type definitions shared across the engine.
//!
//! Everything here is serializable so results can be handed to a publisher
//! and events can be decoded straight off a transport.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Stable identity of a player.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    /// Wrap a raw player identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for PlayerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identifier of an element (item) declared in the rule set.
pub type ItemId = String;

/// Identifier of a reward declared in the rule set.
pub type RewardId = String;

/// Identifier of a quest declared in the rule set.
pub type QuestId = String;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// One player action delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEvent {
    /// Player that performed the action.
    pub player_id: PlayerId,
    /// Action name from the game's vocabulary.
    pub action: String,
    /// Producer-assigned idempotency key. Events without one are never
    /// deduplicated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

impl ActionEvent {
    /// Create an event without an idempotency key.
    #[must_use]
    pub fn new(player_id: impl Into<PlayerId>, action: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            action: action.into(),
            event_id: None,
        }
    }

    /// Attach an explicit idempotency key.
    #[must_use]
    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    /// Attach a freshly generated idempotency key (for producers that do
    /// not have one of their own).
    #[must_use]
    pub fn with_generated_id(self) -> Self {
        self.with_event_id(Uuid::new_v4().to_string())
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What kind of reward a player received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// An item was added to the inventory.
    ItemReceived,
    /// A title was granted for the first time.
    TitleEarned,
    /// Currency was credited.
    CurrencyReceived,
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ItemReceived => write!(f, "item_received"),
            Self::TitleEarned => write!(f, "title_earned"),
            Self::CurrencyReceived => write!(f, "currency_received"),
        }
    }
}

/// Payload of an outcome: an item id / title, or a currency amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutcomeValue {
    /// Item id or title text.
    Text(String),
    /// Currency amount.
    Amount(u64),
}

impl fmt::Display for OutcomeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Amount(n) => write!(f, "{n}"),
        }
    }
}

/// One reward earned while processing an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardOutcome {
    /// Outcome category.
    pub kind: OutcomeKind,
    /// Item id, title or amount.
    pub value: OutcomeValue,
    /// Optional player-facing message from the reward definition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RewardOutcome {
    /// An `item_received` outcome.
    #[must_use]
    pub fn item(item_id: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::ItemReceived,
            value: OutcomeValue::Text(item_id.into()),
            message: None,
        }
    }

    /// A `title_earned` outcome.
    #[must_use]
    pub fn title(title: impl Into<String>, message: Option<String>) -> Self {
        Self {
            kind: OutcomeKind::TitleEarned,
            value: OutcomeValue::Text(title.into()),
            message,
        }
    }

    /// A `currency_received` outcome.
    #[must_use]
    pub fn currency(amount: u64, message: Option<String>) -> Self {
        Self {
            kind: OutcomeKind::CurrencyReceived,
            value: OutcomeValue::Amount(amount),
            message,
        }
    }
}

/// Result of processing one action, ready for publication keyed by player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    /// Player the rewards belong to.
    pub player_id: PlayerId,
    /// Rewards in the order they were earned.
    pub rewards: Vec<RewardOutcome>,
    /// The event id had already been applied; nothing was changed.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub duplicate: bool,
}

impl ActionResult {
    /// Whether the action produced no rewards.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }
}
