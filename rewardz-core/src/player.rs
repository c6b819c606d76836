//! Persisted per-player state.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::types::{ItemId, PlayerId, QuestId};

/// Everything the engine remembers about one player.
///
/// Created lazily with empty defaults the first time a player acts, read
/// and written back once per processed action, never deleted by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    /// Stable identity.
    pub id: PlayerId,
    /// Item counts.
    #[serde(default)]
    pub inventory: BTreeMap<ItemId, u64>,
    /// Held titles, in the order earned. No duplicates.
    #[serde(default)]
    pub titles: Vec<String>,
    /// Completed non-repeatable quests. Only grows; no duplicates.
    #[serde(default)]
    pub completed_quests: Vec<QuestId>,
    /// Currency balance. Only ever increased by currency rewards.
    #[serde(default)]
    pub currency: u64,
    /// Idempotency keys of recently applied events, oldest first.
    #[serde(default)]
    pub processed_events: VecDeque<String>,
    /// Optimistic-concurrency token: the number of successful saves.
    #[serde(default)]
    pub version: u64,
}

impl PlayerState {
    /// A fresh player with empty inventory, no titles and zero currency.
    #[must_use]
    pub fn new(id: PlayerId) -> Self {
        Self {
            id,
            inventory: BTreeMap::new(),
            titles: Vec::new(),
            completed_quests: Vec::new(),
            currency: 0,
            processed_events: VecDeque::new(),
            version: 0,
        }
    }

    /// Add one unit of `item`; returns the new count.
    pub fn add_item(&mut self, item: &str) -> u64 {
        let count = self.inventory.entry(item.to_string()).or_default();
        *count = count.saturating_add(1);
        *count
    }

    /// Count of `item` held.
    #[must_use]
    pub fn item_count(&self, item: &str) -> u64 {
        self.inventory.get(item).copied().unwrap_or(0)
    }

    /// Whether the player holds `title`.
    #[must_use]
    pub fn has_title(&self, title: &str) -> bool {
        self.titles.iter().any(|t| t == title)
    }

    /// Grant `title`. Returns `false` (and changes nothing) if already held.
    pub fn grant_title(&mut self, title: &str) -> bool {
        if self.has_title(title) {
            return false;
        }
        self.titles.push(title.to_string());
        true
    }

    /// Credit `amount` currency. Saturates rather than wrapping.
    pub fn credit(&mut self, amount: u64) {
        self.currency = self.currency.saturating_add(amount);
    }

    /// Whether `quest` is recorded as completed.
    #[must_use]
    pub fn has_completed(&self, quest: &str) -> bool {
        self.completed_quests.iter().any(|q| q == quest)
    }

    /// Record `quest` as completed. Returns `false` if it already was.
    pub fn complete_quest(&mut self, quest: &str) -> bool {
        if self.has_completed(quest) {
            return false;
        }
        self.completed_quests.push(quest.to_string());
        true
    }

    /// Whether the event with this idempotency key was already applied.
    #[must_use]
    pub fn has_processed(&self, event_id: &str) -> bool {
        self.processed_events.iter().any(|e| e == event_id)
    }

    /// Remember an applied event, keeping at most `capacity` keys.
    pub fn record_event(&mut self, event_id: &str, capacity: usize) {
        if capacity == 0 || self.has_processed(event_id) {
            return;
        }
        while self.processed_events.len() >= capacity {
            self.processed_events.pop_front();
        }
        self.processed_events.push_back(event_id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_empty() {
        let p = PlayerState::new(PlayerId::from("user_1"));
        assert!(p.inventory.is_empty());
        assert!(p.titles.is_empty());
        assert!(p.completed_quests.is_empty());
        assert_eq!(p.currency, 0);
        assert_eq!(p.version, 0);
    }

    #[test]
    fn titles_and_quests_never_duplicate() {
        let mut p = PlayerState::new(PlayerId::from("user_1"));
        assert!(p.grant_title("Explorer"));
        assert!(!p.grant_title("Explorer"));
        assert_eq!(p.titles, vec!["Explorer".to_string()]);

        assert!(p.complete_quest("q1"));
        assert!(!p.complete_quest("q1"));
        assert_eq!(p.completed_quests.len(), 1);
    }

    #[test]
    fn inventory_counts_up() {
        let mut p = PlayerState::new(PlayerId::from("user_1"));
        assert_eq!(p.add_item("a"), 1);
        assert_eq!(p.add_item("a"), 2);
        assert_eq!(p.item_count("a"), 2);
        assert_eq!(p.item_count("b"), 0);
    }

    #[test]
    fn event_log_is_bounded_fifo() {
        let mut p = PlayerState::new(PlayerId::from("user_1"));
        for id in ["e1", "e2", "e3"] {
            p.record_event(id, 2);
        }
        assert!(!p.has_processed("e1"));
        assert!(p.has_processed("e2"));
        assert!(p.has_processed("e3"));
        assert_eq!(p.processed_events.len(), 2);
    }

    #[test]
    fn legacy_documents_decode_with_defaults() {
        // Documents written before the idempotency log and version existed.
        let p: PlayerState = serde_json::from_str(
            r#"{"id":"user_9","inventory":{"a":2},"titles":[],"completed_quests":[],"currency":5}"#,
        )
        .expect("decode");
        assert_eq!(p.item_count("a"), 2);
        assert!(p.processed_events.is_empty());
        assert_eq!(p.version, 0);
    }
}
