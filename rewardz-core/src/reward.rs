//! Reward engine: applies a reward definition to a player.
//!
//! Titles are first-time-only: a title the player already holds changes
//! nothing and emits nothing. Currency is additive and emits an outcome on
//! every award.

use tracing::{error, info, warn};

use crate::player::PlayerState;
use crate::rules::{RewardEffect, RuleSet};
use crate::types::RewardOutcome;

/// Apply reward `reward_id` to `player`.
///
/// Returns `None` when the reward is unknown, of an unsupported type, or a
/// title the player already holds. None of these fail the caller.
pub fn apply_reward(
    player: &mut PlayerState,
    rules: &RuleSet,
    reward_id: &str,
) -> Option<RewardOutcome> {
    let Some(reward) = rules.reward(reward_id) else {
        error!(player = %player.id, reward = %reward_id, "Unknown reward id");
        return None;
    };

    match &reward.effect {
        RewardEffect::Title(title) => {
            if !player.grant_title(title) {
                return None;
            }
            info!(player = %player.id, reward = %reward.id, title = %title, "Title earned");
            Some(RewardOutcome::title(title.clone(), reward.message.clone()))
        }
        RewardEffect::Currency(amount) => {
            player.credit(*amount);
            info!(
                player = %player.id,
                reward = %reward.id,
                amount,
                balance = player.currency,
                "Currency received"
            );
            Some(RewardOutcome::currency(*amount, reward.message.clone()))
        }
        RewardEffect::Unsupported(kind) => {
            warn!(player = %player.id, reward = %reward.id, kind = %kind, "Unsupported reward type");
            None
        }
    }
}
