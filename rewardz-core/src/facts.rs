//! Fact builder: projects a [`PlayerState`] into the values quest rules
//! and helpers can see.
//!
//! | Name | Shape |
//! |---|---|
//! | `inventory` | item id → count |
//! | `titles` | list of titles |
//! | `rarity_counts` | rarity → summed inventory count |
//! | `currency` | number |

use std::collections::{BTreeMap, HashMap};

use crate::expr::Value;
use crate::player::PlayerState;
use crate::rules::RuleSet;
use crate::types::ItemId;

/// Facts derived from one player's state. Rebuilt for every action.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Facts {
    /// Item counts.
    pub inventory: BTreeMap<ItemId, u64>,
    /// Held titles.
    pub titles: Vec<String>,
    /// Summed inventory counts per declared rarity.
    pub rarity_counts: BTreeMap<String, u64>,
    /// Currency balance.
    pub currency: u64,
}

impl Facts {
    /// Convert into named expression values.
    #[must_use]
    pub fn to_values(&self) -> HashMap<String, Value> {
        let mut values = HashMap::with_capacity(4);
        values.insert("inventory".to_string(), Value::from(self.inventory.clone()));
        values.insert("titles".to_string(), Value::from(self.titles.clone()));
        values.insert(
            "rarity_counts".to_string(),
            Value::from(self.rarity_counts.clone()),
        );
        values.insert("currency".to_string(), Value::from(self.currency));
        values
    }
}

/// Build the facts for `player`.
///
/// Items without a declared rarity (or unknown to the rule set) still count
/// towards `inventory` but are left out of `rarity_counts`.
#[must_use]
pub fn build_facts(player: &PlayerState, rules: &RuleSet) -> Facts {
    let mut rarity_counts: BTreeMap<String, u64> = BTreeMap::new();
    for (item_id, &count) in &player.inventory {
        if let Some(rarity) = rules.rarity_of(item_id) {
            let slot = rarity_counts.entry(rarity.to_string()).or_default();
            *slot = slot.saturating_add(count);
        }
    }

    Facts {
        inventory: player.inventory.clone(),
        titles: player.titles.clone(),
        rarity_counts,
        currency: player.currency,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PlayerId;

    fn rules() -> RuleSet {
        RuleSet::from_json_str(
            r#"{
                "elements": [
                    {"id": "sword", "rarity": "common"},
                    {"id": "shield", "rarity": "common"},
                    {"id": "crown", "rarity": "legendary"},
                    {"id": "pebble"}
                ]
            }"#,
        )
        .expect("rules")
    }

    #[test]
    fn rarity_counts_sum_inventory_by_rarity() {
        let mut player = PlayerState::new(PlayerId::from("p1"));
        player.inventory.insert("sword".into(), 2);
        player.inventory.insert("shield".into(), 3);
        player.inventory.insert("crown".into(), 1);
        player.inventory.insert("pebble".into(), 7);
        player.inventory.insert("mystery".into(), 4);

        let facts = build_facts(&player, &rules());
        assert_eq!(facts.rarity_counts.get("common"), Some(&5));
        assert_eq!(facts.rarity_counts.get("legendary"), Some(&1));
        assert_eq!(facts.rarity_counts.len(), 2);
        assert_eq!(facts.inventory.len(), 5);
    }

    #[test]
    fn empty_player_has_empty_facts() {
        let player = PlayerState::new(PlayerId::from("p1"));
        let facts = build_facts(&player, &rules());
        assert_eq!(facts, Facts::default());

        let values = facts.to_values();
        assert_eq!(values.get("currency"), Some(&Value::Number(0.0)));
        assert_eq!(values.get("titles"), Some(&Value::List(vec![])));
    }
}
