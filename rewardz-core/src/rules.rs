//! The rule set: elements, rewards, quests, helpers, the action → item
//! mapping and the rarity weight table.
//!
//! Loaded once at startup and shared read-only (`Arc<RuleSet>`) by every
//! action. The document shape (TOML shown, JSON and YAML are equivalent):
//!
//! ```toml
//! [[elements]]
//! id = "ancient_scroll"
//! rarity = "rare"
//!
//! [[rewards]]
//! id = "title_archivist"
//! type = "title"
//! value = "Archivist"
//! message = "You are now an Archivist!"
//!
//! [[quests]]
//! id = "collect_scrolls"
//! rule = "inventory['ancient_scroll'] >= 2"
//! reward = "title_archivist"
//! repeatable = false
//!
//! [actions_to_items_mapping]
//! access_archive = ["ancient_scroll", "dusty_tome"]
//! read_sign = "map_fragment"
//!
//! [rarity_probabilities]
//! common = 0.7
//! rare = 0.25
//! legendary = 0.05
//! ```
//!
//! Structural problems (duplicate ids, bad weights, mistyped reward values)
//! fail the load. Dangling references only produce warnings: the engine
//! treats them as no-ops at run time.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, RewardzError};
use crate::expr::{Expression, ExpressionError};
use crate::helpers::{HelperDef, HelperSet};
use crate::types::{ItemId, QuestId, RewardId};

// ---------------------------------------------------------------------------
// Document (as written)
// ---------------------------------------------------------------------------

/// The raw rule document, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleDocument {
    /// Item catalogue.
    #[serde(default)]
    pub elements: Vec<ElementDef>,
    /// Reward catalogue.
    #[serde(default)]
    pub rewards: Vec<RewardDef>,
    /// Quests, evaluated in this order.
    #[serde(default)]
    pub quests: Vec<QuestDef>,
    /// Helper expressions.
    #[serde(default)]
    pub helpers: Vec<HelperDef>,
    /// Action → item or weighted item pool.
    #[serde(default, alias = "action_to_item")]
    pub actions_to_items_mapping: BTreeMap<String, ItemGrant>,
    /// Rarity → selection weight.
    #[serde(default)]
    pub rarity_probabilities: BTreeMap<String, f64>,
}

/// An item declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementDef {
    /// Item id.
    pub id: ItemId,
    /// Rarity tier used for weighted selection and `rarity_counts`.
    #[serde(default)]
    pub rarity: Option<String>,
    /// Any other descriptive attributes (name, description, ...).
    #[serde(flatten)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

/// A reward declaration as written: `type` is free text so that unknown
/// types survive loading and are skipped at award time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardDef {
    /// Reward id.
    pub id: RewardId,
    /// `title`, `currency`, or something this engine does not know.
    #[serde(rename = "type")]
    pub kind: String,
    /// Title text or currency amount.
    #[serde(default)]
    pub value: serde_json::Value,
    /// Player-facing message.
    #[serde(default)]
    pub message: Option<String>,
}

/// A quest declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestDef {
    /// Quest id.
    pub id: QuestId,
    /// Boolean rule expression over the facts.
    pub rule: String,
    /// Reward granted when the rule holds.
    pub reward: RewardId,
    /// Whether the quest can be completed more than once.
    #[serde(default)]
    pub repeatable: bool,
}

/// What an action grants: one item, or one draw from a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemGrant {
    /// Always this item.
    Single(ItemId),
    /// One item drawn by rarity weight.
    Pool(Vec<ItemId>),
}

// ---------------------------------------------------------------------------
// Validated model
// ---------------------------------------------------------------------------

/// A reward's effect on player state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewardEffect {
    /// Grant a title, once.
    Title(String),
    /// Credit currency, every time.
    Currency(u64),
    /// A reward type this engine does not apply.
    Unsupported(String),
}

/// A validated reward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reward {
    /// Reward id.
    pub id: RewardId,
    /// Effect when awarded.
    pub effect: RewardEffect,
    /// Player-facing message.
    pub message: Option<String>,
}

/// A quest with its rule parsed.
#[derive(Debug, Clone)]
pub struct Quest {
    /// Quest id.
    pub id: QuestId,
    /// Reward granted when the rule holds.
    pub reward: RewardId,
    /// Whether the quest can be completed more than once.
    pub repeatable: bool,
    rule: String,
    condition: std::result::Result<Expression, ExpressionError>,
}

impl Quest {
    fn compile(def: QuestDef) -> Self {
        let condition = Expression::parse(&def.rule);
        Self {
            id: def.id,
            reward: def.reward,
            repeatable: def.repeatable,
            rule: def.rule,
            condition,
        }
    }

    /// The rule as written.
    #[must_use]
    pub fn rule(&self) -> &str {
        &self.rule
    }

    /// The parsed rule, or the error that prevented parsing it.
    ///
    /// # Errors
    /// Returns the [`ExpressionError`] recorded at load time.
    pub fn condition(&self) -> std::result::Result<&Expression, ExpressionError> {
        self.condition.as_ref().map_err(Clone::clone)
    }
}

/// The loaded, immutable rule set.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    elements: HashMap<ItemId, ElementDef>,
    rewards: HashMap<RewardId, Reward>,
    quests: Vec<Quest>,
    helpers: HelperSet,
    action_to_item: HashMap<String, ItemGrant>,
    rarity_probabilities: HashMap<String, f64>,
    warnings: Vec<String>,
}

impl RuleSet {
    /// Parse and validate a TOML rule document.
    ///
    /// # Errors
    /// Returns [`RewardzError::Configuration`] if the document is malformed
    /// or fails validation.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let doc: RuleDocument =
            toml::from_str(source).map_err(|e| RewardzError::Configuration(e.to_string()))?;
        Self::from_document(doc)
    }

    /// Parse and validate a JSON rule document.
    ///
    /// # Errors
    /// Returns [`RewardzError::Configuration`] if the document is malformed
    /// or fails validation.
    pub fn from_json_str(source: &str) -> Result<Self> {
        let doc: RuleDocument = serde_json::from_str(source)
            .map_err(|e| RewardzError::Configuration(e.to_string()))?;
        Self::from_document(doc)
    }

    /// Parse and validate a YAML rule document.
    ///
    /// # Errors
    /// Returns [`RewardzError::Configuration`] if the document is malformed
    /// or fails validation.
    pub fn from_yaml_str(source: &str) -> Result<Self> {
        let doc: RuleDocument = serde_yaml::from_str(source)
            .map_err(|e| RewardzError::Configuration(e.to_string()))?;
        Self::from_document(doc)
    }

    /// Load a rule file, choosing the format by extension (`.toml`,
    /// `.json`, `.yml`/`.yaml`).
    ///
    /// # Errors
    /// Returns [`RewardzError::Configuration`] if the file cannot be read,
    /// has an unknown extension, or fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            RewardzError::Configuration(format!("cannot read rule file {}: {e}", path.display()))
        })?;
        let rules = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&source)?,
            Some("json") => Self::from_json_str(&source)?,
            Some("yml" | "yaml") => Self::from_yaml_str(&source)?,
            other => {
                return Err(RewardzError::Configuration(format!(
                    "unsupported rule file extension {other:?} for {}",
                    path.display()
                )));
            }
        };
        info!(
            path = %path.display(),
            elements = rules.elements.len(),
            rewards = rules.rewards.len(),
            quests = rules.quests.len(),
            helpers = rules.helpers.len(),
            "Rule set loaded"
        );
        Ok(rules)
    }

    /// Validate a parsed document.
    ///
    /// # Errors
    /// Returns [`RewardzError::Configuration`] on duplicate ids, negative or
    /// non-finite rarity weights, or reward values of the wrong type.
    pub fn from_document(doc: RuleDocument) -> Result<Self> {
        let mut elements = HashMap::with_capacity(doc.elements.len());
        for element in doc.elements {
            if elements.contains_key(&element.id) {
                return Err(duplicate("element", &element.id));
            }
            elements.insert(element.id.clone(), element);
        }

        let mut rewards = HashMap::with_capacity(doc.rewards.len());
        for def in doc.rewards {
            if rewards.contains_key(&def.id) {
                return Err(duplicate("reward", &def.id));
            }
            let reward = validate_reward(def)?;
            rewards.insert(reward.id.clone(), reward);
        }

        ensure_unique("quest", doc.quests.iter().map(|q| q.id.as_str()))?;
        let quests: Vec<Quest> = doc.quests.into_iter().map(Quest::compile).collect();

        ensure_unique("helper", doc.helpers.iter().map(|h| h.id.as_str()))?;
        let helpers = HelperSet::compile(&doc.helpers);

        for (rarity, &weight) in &doc.rarity_probabilities {
            if !weight.is_finite() || weight < 0.0 {
                return Err(RewardzError::Configuration(format!(
                    "rarity weight for {rarity:?} must be a finite, non-negative number (got {weight})"
                )));
            }
        }

        let mut rules = Self {
            elements,
            rewards,
            quests,
            helpers,
            action_to_item: doc.actions_to_items_mapping.into_iter().collect(),
            rarity_probabilities: doc.rarity_probabilities.into_iter().collect(),
            warnings: Vec::new(),
        };
        rules.warnings = rules.collect_warnings();
        for warning in &rules.warnings {
            warn!("{warning}");
        }
        Ok(rules)
    }

    /// Dangling references and unparsable expressions found at load time.
    fn collect_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for quest in &self.quests {
            if !self.rewards.contains_key(&quest.reward) {
                warnings.push(format!(
                    "quest {:?} references unknown reward {:?}",
                    quest.id, quest.reward
                ));
            }
            if let Err(e) = &quest.condition {
                warnings.push(format!("quest {:?} has an invalid rule: {e}", quest.id));
            }
        }
        for helper in self.helpers.iter() {
            if let Some(e) = helper.parse_error() {
                warnings.push(format!(
                    "helper {:?} has an invalid expression: {e}",
                    helper.id()
                ));
            }
        }
        let mut actions: Vec<_> = self.action_to_item.iter().collect();
        actions.sort_by_key(|(action, _)| action.as_str());
        for (action, grant) in actions {
            let items: &[ItemId] = match grant {
                ItemGrant::Single(item) => std::slice::from_ref(item),
                ItemGrant::Pool(items) => items,
            };
            for item in items {
                match self.elements.get(item) {
                    None => warnings.push(format!(
                        "action {action:?} references unknown item {item:?}"
                    )),
                    Some(e) if e.rarity.is_none() && matches!(grant, ItemGrant::Pool(_)) => {
                        warnings.push(format!(
                            "item {item:?} in the pool for action {action:?} has no rarity and can never be drawn"
                        ));
                    }
                    Some(_) => {}
                }
            }
        }
        let mut rewards: Vec<_> = self.rewards.iter().collect();
        rewards.sort_by_key(|(id, _)| id.as_str());
        for (id, reward) in rewards {
            if let RewardEffect::Unsupported(kind) = &reward.effect {
                warnings.push(format!("reward {id:?} has unsupported type {kind:?}"));
            }
        }
        warnings
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    /// Look an element up.
    #[must_use]
    pub fn element(&self, id: &str) -> Option<&ElementDef> {
        self.elements.get(id)
    }

    /// Declared rarity of an item, if the item is known and has one.
    #[must_use]
    pub fn rarity_of(&self, item: &str) -> Option<&str> {
        self.elements.get(item)?.rarity.as_deref()
    }

    /// Look a reward up.
    #[must_use]
    pub fn reward(&self, id: &str) -> Option<&Reward> {
        self.rewards.get(id)
    }

    /// Quests in definition order.
    #[must_use]
    pub fn quests(&self) -> &[Quest] {
        &self.quests
    }

    /// Compiled helpers.
    #[must_use]
    pub fn helpers(&self) -> &HelperSet {
        &self.helpers
    }

    /// What `action` grants, if anything.
    #[must_use]
    pub fn item_grant(&self, action: &str) -> Option<&ItemGrant> {
        self.action_to_item.get(action)
    }

    /// Selection weight of `rarity` (0 when absent).
    #[must_use]
    pub fn rarity_weight(&self, rarity: &str) -> f64 {
        self.rarity_probabilities.get(rarity).copied().unwrap_or(0.0)
    }

    /// The full rarity weight table.
    #[must_use]
    pub fn rarity_probabilities(&self) -> &HashMap<String, f64> {
        &self.rarity_probabilities
    }

    /// Problems that did not fail the load.
    #[must_use]
    pub fn reference_warnings(&self) -> &[String] {
        &self.warnings
    }
}

fn duplicate(what: &str, id: &str) -> RewardzError {
    RewardzError::Configuration(format!("duplicate {what} id {id:?}"))
}

fn ensure_unique<'a>(what: &str, ids: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(duplicate(what, id));
        }
    }
    Ok(())
}

fn validate_reward(def: RewardDef) -> Result<Reward> {
    let effect = match def.kind.as_str() {
        "title" => match def.value {
            serde_json::Value::String(title) => RewardEffect::Title(title),
            other => {
                return Err(RewardzError::Configuration(format!(
                    "title reward {:?} needs a string value, got {other}",
                    def.id
                )));
            }
        },
        "currency" => match def.value.as_u64() {
            Some(amount) => RewardEffect::Currency(amount),
            None => {
                return Err(RewardzError::Configuration(format!(
                    "currency reward {:?} needs a non-negative integer value, got {}",
                    def.id, def.value
                )));
            }
        },
        other => RewardEffect::Unsupported(other.to_string()),
    };
    Ok(Reward {
        id: def.id,
        effect,
        message: def.message,
    })
}
