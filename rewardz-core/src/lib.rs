//! # rewardz Core Library
//!
//! Game-agnostic action processing engine. One `(player_id, action)` event
//! plus the player's persisted state goes in; a deterministic, ordered list
//! of reward outcomes comes out.
//!
//! The pipeline per event:
//!
//! - **Item grant**: `actions_to_items_mapping` resolves the action to a
//!   single item or a rarity-weighted pool ([`selector`]).
//! - **Facts**: the player's state is projected into an evaluation context
//!   ([`facts`]).
//! - **Quests**: every quest rule is evaluated by the embedded expression
//!   language ([`expr`]) with declarative helpers bound ([`helpers`]).
//! - **Rewards**: satisfied quests award titles (idempotent) or currency
//!   (additive) ([`reward`]).
//! - **Write-back**: the mutated [`PlayerState`] is saved exactly once
//!   through a [`PlayerRepository`].
//!
//! The [`ActionProcessor`] orchestrates all of the above.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod expr;
pub mod facts;
pub mod helpers;
pub mod persistence;
pub mod player;
pub mod processor;
pub mod repository;
pub mod reward;
pub mod rules;
pub mod selector;
pub mod types;

pub use config::RewardzConfig;
pub use error::RewardzError;
pub use player::PlayerState;
pub use processor::ActionProcessor;
pub use repository::{InMemoryRepository, PlayerRepository, RepositoryError, RetryingRepository};
pub use rules::RuleSet;
pub use types::*;
