//! Weighted selector: draws one item from a pool using rarity weights.
//!
//! Each candidate's weight is the weight of its declared rarity (missing
//! rarity or weight counts as 0). A pool whose weights sum to 0 yields no
//! item; that is a valid, silent outcome.
//!
//! The random source is injected so tests can seed it; production callers
//! pass `rand::thread_rng()`.

use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};

use crate::rules::RuleSet;
use crate::types::ItemId;

/// Pick an index with probability proportional to `weights[i]`.
///
/// Negative and non-finite weights count as 0. Returns `None` when no
/// weight is positive.
pub fn weighted_choice<G: Rng + ?Sized>(weights: &[f64], rng: &mut G) -> Option<usize> {
    let sanitized: Vec<f64> = weights
        .iter()
        .map(|&w| if w.is_finite() && w > 0.0 { w } else { 0.0 })
        .collect();
    if sanitized.iter().sum::<f64>() <= 0.0 {
        return None;
    }
    let dist = WeightedIndex::new(&sanitized).ok()?;
    Some(dist.sample(rng))
}

/// Draw one of `candidates` by the rarity weights in `rules`.
pub fn select_by_rarity<G: Rng + ?Sized>(
    candidates: &[ItemId],
    rules: &RuleSet,
    rng: &mut G,
) -> Option<ItemId> {
    let weights: Vec<f64> = candidates
        .iter()
        .map(|item| rules.rarity_of(item).map_or(0.0, |r| rules.rarity_weight(r)))
        .collect();
    weighted_choice(&weights, rng).map(|i| candidates[i].clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rules(weights: &str) -> RuleSet {
        RuleSet::from_toml_str(&format!(
            r#"
            [[elements]]
            id = "pebble"
            rarity = "common"

            [[elements]]
            id = "stick"
            rarity = "common"

            [[elements]]
            id = "crown"
            rarity = "legendary"

            [[elements]]
            id = "orb"
            rarity = "legendary"

            [[elements]]
            id = "mystery"

            [rarity_probabilities]
            {weights}
            "#
        ))
        .expect("rules")
    }

    fn ids(items: &[&str]) -> Vec<ItemId> {
        items.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn zero_weight_always_yields_none() {
        let rules = rules("common = 0.0");
        let mut rng = StdRng::seed_from_u64(7);
        let pool = ids(&["pebble", "stick"]);
        for _ in 0..200 {
            assert_eq!(select_by_rarity(&pool, &rules, &mut rng), None);
        }
    }

    #[test]
    fn only_positive_rarity_is_drawn() {
        let rules = rules("legendary = 1.0");
        let mut rng = StdRng::seed_from_u64(42);
        let pool = ids(&["crown", "orb"]);
        for _ in 0..200 {
            let item = select_by_rarity(&pool, &rules, &mut rng).expect("item");
            assert_eq!(rules.rarity_of(&item), Some("legendary"));
        }

        let mixed = ids(&["pebble", "crown", "mystery"]);
        for _ in 0..200 {
            assert_eq!(select_by_rarity(&mixed, &rules, &mut rng).as_deref(), Some("crown"));
        }
    }

    #[test]
    fn seeded_draws_are_reproducible() {
        let rules = rules("common = 3.0\nlegendary = 1.0");
        let pool = ids(&["pebble", "stick", "crown", "orb"]);
        let draw = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..50)
                .map(|_| select_by_rarity(&pool, &rules, &mut rng))
                .collect::<Vec<_>>()
        };
        assert_eq!(draw(99), draw(99));
    }

    #[test]
    fn weights_shape_the_distribution() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut hits = [0u32; 2];
        for _ in 0..10_000 {
            hits[weighted_choice(&[9.0, 1.0], &mut rng).expect("index")] += 1;
        }
        assert!(hits[0] > 8_500 && hits[0] < 9_500, "hits = {hits:?}");
    }

    #[test]
    fn bad_weights_are_ignored() {
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(weighted_choice(&[], &mut rng), None);
        assert_eq!(weighted_choice(&[-1.0, f64::NAN], &mut rng), None);
        assert_eq!(weighted_choice(&[f64::INFINITY, 2.0], &mut rng), Some(1));
    }
}
