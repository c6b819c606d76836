//! Property-Based Tests for the Action Processing Engine
//!
//! Uses `proptest` to check engine invariants over random action
//! sequences, random seeds and random expression inputs.

use std::sync::Arc;

use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;

use rewardz_core::expr::{Context, Value, evaluate};
use rewardz_core::reward::apply_reward;
use rewardz_core::selector::select_by_rarity;
use rewardz_core::types::{OutcomeKind, PlayerId};
use rewardz_core::{ActionEvent, ActionProcessor, InMemoryRepository, PlayerState, RuleSet};

const RULES: &str = r#"
[[elements]]
id = "herb"
rarity = "common"

[[elements]]
id = "ore"
rarity = "rare"

[[elements]]
id = "star"
rarity = "legendary"

[[rewards]]
id = "title_gatherer"
type = "title"
value = "Gatherer"

[[rewards]]
id = "title_miner"
type = "title"
value = "Miner"

[[rewards]]
id = "coins_small"
type = "currency"
value = 3

[[rewards]]
id = "coins_big"
type = "currency"
value = 40

[[helpers]]
id = "at_least"
expression = "get(inventory, item, 0) >= n"
args = ["item", "n"]

[[quests]]
id = "gather"
rule = "at_least('herb', 3)"
reward = "title_gatherer"

[[quests]]
id = "mine"
rule = "at_least('ore', 2) and currency >= 6"
reward = "title_miner"

[[quests]]
id = "herb_bounty"
rule = "inventory['herb'] % 2 == 0"
reward = "coins_small"
repeatable = true

[[quests]]
id = "star_once"
rule = "rarity_counts['legendary'] >= 1"
reward = "coins_big"

[actions_to_items_mapping]
forage = "herb"
mine = "ore"
wander = ["herb", "ore", "star"]
idle = ["herb"]

[rarity_probabilities]
common = 5.0
rare = 2.0
legendary = 0.5
"#;

const ACTIONS: &[&str] = &["forage", "mine", "wander", "idle", "unknown"];

fn rules() -> Arc<RuleSet> {
    Arc::new(RuleSet::from_toml_str(RULES).expect("rules"))
}

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

fn arb_actions() -> impl Strategy<Value = Vec<&'static str>> {
    prop::collection::vec(prop::sample::select(ACTIONS), 1..40)
}

fn run(actions: &[&str], seed: u64) -> (PlayerState, Vec<Vec<OutcomeKind>>) {
    let processor = ActionProcessor::new(rules(), InMemoryRepository::new());
    let mut rng = StdRng::seed_from_u64(seed);
    let mut kinds = Vec::new();
    for action in actions {
        let result = processor
            .handle_with_rng(&ActionEvent::new("p", *action), &mut rng)
            .expect("process");
        kinds.push(result.rewards.iter().map(|r| r.kind).collect());
    }
    let player = processor
        .repository()
        .snapshot(&PlayerId::from("p"))
        .expect("saved");
    (player, kinds)
}

// ---------------------------------------------------------------------------
// Property: currency only grows, and only through currency outcomes
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn currency_is_monotone(actions in arb_actions(), seed in any::<u64>()) {
        let processor = ActionProcessor::new(rules(), InMemoryRepository::new());
        let mut rng = StdRng::seed_from_u64(seed);
        let mut balance = 0u64;
        for action in &actions {
            let result = processor
                .handle_with_rng(&ActionEvent::new("p", *action), &mut rng)
                .expect("process");
            let paid: u64 = result
                .rewards
                .iter()
                .filter(|r| r.kind == OutcomeKind::CurrencyReceived)
                .map(|r| r.value.to_string().parse::<u64>().expect("amount"))
                .sum();
            let player = processor.repository().snapshot(&PlayerId::from("p")).expect("saved");
            prop_assert_eq!(player.currency, balance + paid);
            balance = player.currency;
        }
    }
}

// ---------------------------------------------------------------------------
// Property: non-repeatable quests complete at most once
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn completed_quests_are_unique(actions in arb_actions(), seed in any::<u64>()) {
        let (player, kinds) = run(&actions, seed);

        let mut seen = player.completed_quests.clone();
        seen.sort();
        seen.dedup();
        prop_assert_eq!(seen.len(), player.completed_quests.len());
        prop_assert!(!player.has_completed("herb_bounty"));

        let titles = kinds
            .iter()
            .flatten()
            .filter(|k| **k == OutcomeKind::TitleEarned)
            .count();
        prop_assert_eq!(titles, player.titles.len());
    }
}

// ---------------------------------------------------------------------------
// Property: same seed, same actions, same state
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn processing_is_deterministic_under_a_seed(actions in arb_actions(), seed in any::<u64>()) {
        let (a, kinds_a) = run(&actions, seed);
        let (b, kinds_b) = run(&actions, seed);
        prop_assert_eq!(a, b);
        prop_assert_eq!(kinds_a, kinds_b);
    }
}

// ---------------------------------------------------------------------------
// Property: titles are idempotent
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn title_rewards_are_idempotent(repeats in 2usize..10) {
        let rules = rules();
        let mut player = PlayerState::new(PlayerId::from("p"));
        prop_assert!(apply_reward(&mut player, &rules, "title_miner").is_some());
        let after_first = player.clone();
        for _ in 1..repeats {
            prop_assert!(apply_reward(&mut player, &rules, "title_miner").is_none());
            prop_assert_eq!(&player, &after_first);
        }
    }

    #[test]
    fn currency_rewards_are_never_idempotent(repeats in 1u64..20) {
        let rules = rules();
        let mut player = PlayerState::new(PlayerId::from("p"));
        for _ in 0..repeats {
            prop_assert!(apply_reward(&mut player, &rules, "coins_big").is_some());
        }
        prop_assert_eq!(player.currency, repeats * 40);
    }
}

// ---------------------------------------------------------------------------
// Property: zero and single-rarity weights
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn zero_weight_pool_never_yields(seed in any::<u64>()) {
        let rules = RuleSet::from_toml_str(
            "[[elements]]\nid = \"a\"\nrarity = \"common\"\n\n\
             [[elements]]\nid = \"b\"\nrarity = \"common\"\n\n\
             [rarity_probabilities]\ncommon = 0.0\n",
        )
        .expect("rules");
        let mut rng = StdRng::seed_from_u64(seed);
        let pool = vec!["a".to_string(), "b".to_string()];
        prop_assert_eq!(select_by_rarity(&pool, &rules, &mut rng), None);
    }

    #[test]
    fn single_rarity_pool_always_yields_it(seed in any::<u64>()) {
        let rules = RuleSet::from_toml_str(
            "[[elements]]\nid = \"x\"\nrarity = \"legendary\"\n\n\
             [[elements]]\nid = \"y\"\nrarity = \"legendary\"\n\n\
             [rarity_probabilities]\nlegendary = 1.0\n",
        )
        .expect("rules");
        let mut rng = StdRng::seed_from_u64(seed);
        let pool = vec!["x".to_string(), "y".to_string()];
        let item = select_by_rarity(&pool, &rules, &mut rng).expect("item");
        prop_assert_eq!(rules.rarity_of(&item), Some("legendary"));
    }
}

// ---------------------------------------------------------------------------
// Property: the expression language is total
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn arbitrary_source_never_panics(source in "\\PC{0,64}") {
        let ctx = Context::new();
        let _ = evaluate(&source, &ctx);
    }

    #[test]
    fn integer_arithmetic_matches(a in -1_000i32..1_000, b in 1i32..1_000) {
        let mut ctx = Context::new();
        ctx.insert("a", Value::Number(f64::from(a)));
        ctx.insert("b", Value::Number(f64::from(b)));

        prop_assert_eq!(evaluate("a + b", &ctx), Ok(Value::Number(f64::from(a + b))));
        prop_assert_eq!(evaluate("a * b - b", &ctx), Ok(Value::Number(f64::from(a * b - b))));
        prop_assert_eq!(
            evaluate("a % b", &ctx),
            Ok(Value::Number(f64::from(a.rem_euclid(b))))
        );
        prop_assert_eq!(evaluate("a < b and b > a", &ctx), Ok(Value::Bool(a < b)));
    }
}
