//! Action processor: the per-event pipeline.
//!
//! ```text
//! load ─► dedupe ─► item grant ─► facts ─► quests ─► rewards ─► save
//! ```
//!
//! Everything between load and save works on one in-memory copy of the
//! player. The save is a compare-and-swap on [`PlayerState::version`]; a
//! [`RepositoryError::Conflict`] re-runs the whole cycle against fresh
//! state, so a concurrent writer's changes are never overwritten.

use std::sync::Arc;
use std::time::Instant;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::config::RewardzConfig;
use crate::error::Result;
use crate::facts::build_facts;
use crate::player::PlayerState;
use crate::repository::{PlayerRepository, RepositoryError};
use crate::reward::apply_reward;
use crate::rules::{ItemGrant, RuleSet};
use crate::selector::select_by_rarity;
use crate::types::{ActionEvent, ActionResult, PlayerId, RewardOutcome};

/// Tunables for [`ActionProcessor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorConfig {
    /// Extra load→apply→save cycles after a version conflict.
    pub conflict_retries: u32,
    /// Short-circuit events whose id was already applied.
    pub idempotency_enabled: bool,
    /// Event ids remembered per player.
    pub max_tracked_events: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self::from(&RewardzConfig::default())
    }
}

impl From<&RewardzConfig> for ProcessorConfig {
    fn from(config: &RewardzConfig) -> Self {
        Self {
            conflict_retries: config.retry.conflict_retries,
            idempotency_enabled: config.idempotency.enabled,
            max_tracked_events: config.idempotency.max_tracked_events,
        }
    }
}

/// Turns player actions into rewards.
///
/// ```
/// # use std::sync::Arc;
/// # use rewardz_core::{ActionProcessor, InMemoryRepository, RuleSet};
/// let rules = RuleSet::from_toml_str(r#"
///     [[elements]]
///     id = "scroll_x"
///     rarity = "common"
///
///     [actions_to_items_mapping]
///     read = "scroll_x"
/// "#)?;
/// let processor = ActionProcessor::new(Arc::new(rules), InMemoryRepository::new());
/// let result = processor.process("user_1", "read")?;
/// assert_eq!(result.rewards.len(), 1);
/// # Ok::<(), rewardz_core::RewardzError>(())
/// ```
#[derive(Debug)]
pub struct ActionProcessor<R> {
    rules: Arc<RuleSet>,
    repository: R,
    config: ProcessorConfig,
}

impl<R: PlayerRepository> ActionProcessor<R> {
    /// Create a processor with default tunables.
    #[must_use]
    pub fn new(rules: Arc<RuleSet>, repository: R) -> Self {
        Self::with_config(rules, repository, ProcessorConfig::default())
    }

    /// Create a processor with explicit tunables.
    #[must_use]
    pub fn with_config(rules: Arc<RuleSet>, repository: R, config: ProcessorConfig) -> Self {
        Self {
            rules,
            repository,
            config,
        }
    }

    /// The rule set in use.
    #[must_use]
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// The backing repository.
    #[must_use]
    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Process one action without an idempotency key.
    ///
    /// # Errors
    /// Returns [`crate::RewardzError::Repository`] if the player cannot be
    /// loaded or saved.
    pub fn process(&self, player_id: impl Into<PlayerId>, action: &str) -> Result<ActionResult> {
        self.handle(&ActionEvent::new(player_id, action))
    }

    /// Process one delivered event.
    ///
    /// # Errors
    /// Returns [`crate::RewardzError::Repository`] if the player cannot be
    /// loaded or saved. Nothing is persisted in that case.
    pub fn handle(&self, event: &ActionEvent) -> Result<ActionResult> {
        self.handle_with_rng(event, &mut rand::thread_rng())
    }

    /// [`handle`](Self::handle) with an explicit random source for pool
    /// draws.
    ///
    /// # Errors
    /// Returns [`crate::RewardzError::Repository`] if the player cannot be
    /// loaded or saved, including when version conflicts persist past
    /// `conflict_retries`.
    pub fn handle_with_rng<G: Rng + ?Sized>(
        &self,
        event: &ActionEvent,
        rng: &mut G,
    ) -> Result<ActionResult> {
        let start = Instant::now();
        let event_id = event
            .event_id
            .as_deref()
            .filter(|_| self.config.idempotency_enabled);
        let mut attempt = 0;

        loop {
            let mut player = self.repository.get(&event.player_id)?;

            if let Some(id) = event_id {
                if player.has_processed(id) {
                    info!(player = %event.player_id, event_id = %id, "Duplicate event skipped");
                    return Ok(ActionResult {
                        player_id: event.player_id.clone(),
                        rewards: Vec::new(),
                        duplicate: true,
                    });
                }
            }

            let rewards = self.apply_action(&mut player, &event.action, rng);
            if let Some(id) = event_id {
                player.record_event(id, self.config.max_tracked_events);
            }

            match self.repository.save(&player) {
                Ok(()) => {
                    debug!(
                        player = %event.player_id,
                        action = %event.action,
                        rewards = rewards.len(),
                        attempts = attempt + 1,
                        elapsed_us = start.elapsed().as_micros(),
                        "Action processed"
                    );
                    return Ok(ActionResult {
                        player_id: event.player_id.clone(),
                        rewards,
                        duplicate: false,
                    });
                }
                Err(e @ RepositoryError::Conflict { .. })
                    if attempt < self.config.conflict_retries =>
                {
                    attempt += 1;
                    warn!(
                        player = %event.player_id,
                        attempt,
                        error = %e,
                        "Write conflict, reprocessing"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Apply `action` to an in-memory player: item grant, facts, quests and
    /// rewards. Does not touch the repository.
    pub fn apply_action<G: Rng + ?Sized>(
        &self,
        player: &mut PlayerState,
        action: &str,
        rng: &mut G,
    ) -> Vec<RewardOutcome> {
        let mut outcomes = Vec::new();

        if let Some(item) = self.resolve_item(player, action, rng) {
            let count = player.add_item(&item);
            info!(player = %player.id, action, item = %item, count, "Item received");
            outcomes.push(RewardOutcome::item(item));
        }

        // The item grant above is visible to every quest below. Rewards
        // granted by a quest are not; facts are taken once per action.
        let facts = build_facts(player, &self.rules).to_values();
        let ctx = self.rules.helpers().context(facts);

        for quest in self.rules.quests() {
            if !quest.repeatable && player.has_completed(&quest.id) {
                continue;
            }

            let satisfied = quest
                .condition()
                .and_then(|condition| condition.evaluate(&ctx))
                .map(|value| value.is_truthy());
            let satisfied = match satisfied {
                Ok(satisfied) => satisfied,
                Err(e) => {
                    warn!(
                        player = %player.id,
                        quest = %quest.id,
                        rule = quest.rule(),
                        error = %e,
                        "Quest rule failed, treating as not satisfied"
                    );
                    continue;
                }
            };
            debug!(player = %player.id, quest = %quest.id, satisfied, "Quest evaluated");
            if !satisfied {
                continue;
            }

            if let Some(outcome) = apply_reward(player, &self.rules, &quest.reward) {
                outcomes.push(outcome);
            }
            if !quest.repeatable {
                player.complete_quest(&quest.id);
            }
        }

        outcomes
    }

    fn resolve_item<G: Rng + ?Sized>(
        &self,
        player: &PlayerState,
        action: &str,
        rng: &mut G,
    ) -> Option<String> {
        match self.rules.item_grant(action)? {
            ItemGrant::Single(item) => {
                if self.rules.element(item).is_none() {
                    warn!(player = %player.id, action, item = %item, "Action maps to unknown item");
                    return None;
                }
                Some(item.clone())
            }
            ItemGrant::Pool(candidates) => {
                let item = select_by_rarity(candidates, &self.rules, rng);
                if item.is_none() {
                    debug!(player = %player.id, action, "Pool draw yielded no item");
                }
                item
            }
        }
    }
}
