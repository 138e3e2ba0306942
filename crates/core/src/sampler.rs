use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::attendee::AttendeeSlots;

/// Weights for the "house" IDs that are drawn as the primary attendee.
///
/// Entries keep their configured order; only IDs present in the sampling
/// pool with a positive, finite weight take part in the draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryWeights(Vec<(String, f64)>);

impl Default for PrimaryWeights {
    fn default() -> Self {
        PrimaryWeights(vec![("2".to_string(), 0.9), ("1".to_string(), 0.1)])
    }
}

impl PrimaryWeights {
    pub fn new(entries: Vec<(String, f64)>) -> Self {
        PrimaryWeights(entries)
    }

    pub fn entries(&self) -> &[(String, f64)] {
        &self.0
    }

    /// Candidates present in `available`, with weights normalized to sum to 1.
    fn candidates<'a>(&'a self, available: &HashSet<&str>) -> Vec<(&'a str, f64)> {
        let present: Vec<(&str, f64)> = self
            .0
            .iter()
            .filter(|(id, w)| w.is_finite() && *w > 0.0 && available.contains(id.as_str()))
            .map(|(id, w)| (id.as_str(), *w))
            .collect();
        let total: f64 = present.iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            return Vec::new();
        }
        present.into_iter().map(|(id, w)| (id, w / total)).collect()
    }
}

/// Weighted choice over normalized candidates. `candidates` must be non-empty.
fn weighted_choice<'a, R: Rng + ?Sized>(candidates: &[(&'a str, f64)], rng: &mut R) -> &'a str {
    let mut r: f64 = rng.random::<f64>();
    for (id, w) in candidates {
        if r < *w {
            return *id;
        }
        r -= w;
    }
    // Rounding can leave a sliver past the last cumulative weight.
    candidates[candidates.len() - 1].0
}

/// Picks `count` attendee IDs from `available` and lays them out in the
/// eight output slots.
///
/// One primary ID is drawn from the house IDs by weight; the rest are drawn
/// uniformly without replacement from the remaining pool. When no house ID
/// is in the pool, all `count` IDs are drawn uniformly.
pub fn sample_ids<R: Rng + ?Sized>(
    count: u32,
    available: &[String],
    weights: &PrimaryWeights,
    rng: &mut R,
) -> AttendeeSlots {
    if count == 0 || available.is_empty() {
        return AttendeeSlots::empty();
    }

    let mut seen = HashSet::new();
    let pool: Vec<&str> = available
        .iter()
        .map(String::as_str)
        .filter(|id| !id.is_empty() && seen.insert(*id))
        .collect();
    let wanted = count as usize;

    let candidates = weights.candidates(&seen);
    let selected: Vec<&str> = if candidates.is_empty() {
        pool.choose_multiple(rng, wanted.min(pool.len()))
            .copied()
            .collect()
    } else {
        let primary = weighted_choice(&candidates, rng);
        let rest: Vec<&str> = pool.iter().copied().filter(|id| *id != primary).collect();
        let extra = (wanted - 1).min(rest.len());
        std::iter::once(primary)
            .chain(rest.choose_multiple(rng, extra).copied())
            .collect()
    };

    AttendeeSlots::from_ids(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn pool(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn assert_slot_invariants(slots: &AttendeeSlots, expected_filled: usize) {
        let cells = slots.as_slice();
        assert_eq!(cells.len(), 8);
        let filled: Vec<&str> = slots.filled().collect();
        assert_eq!(filled.len(), expected_filled, "{cells:?}");
        // filled cells come first
        assert!(cells[..expected_filled].iter().all(|c| !c.is_empty()));
        assert!(cells[expected_filled..].iter().all(String::is_empty));
        let unique: HashSet<&str> = filled.iter().copied().collect();
        assert_eq!(unique.len(), filled.len());
        let nums: Vec<u64> = filled.iter().map(|s| s.parse().unwrap()).collect();
        assert!(nums.windows(2).all(|w| w[0] < w[1]), "{nums:?}");
    }

    #[test]
    fn zero_count_gives_empty_slots() {
        let mut rng = StdRng::seed_from_u64(1);
        let slots = sample_ids(0, &pool(&["1", "2", "3"]), &PrimaryWeights::default(), &mut rng);
        assert_eq!(slots, AttendeeSlots::empty());
    }

    #[test]
    fn slot_invariants_hold_for_every_count() {
        let ids: Vec<String> = (1..=20).map(|i| i.to_string()).collect();
        let weights = PrimaryWeights::default();
        for seed in 0..25 {
            let mut rng = StdRng::seed_from_u64(seed);
            for k in 0..=8u32 {
                let slots = sample_ids(k, &ids, &weights, &mut rng);
                assert_slot_invariants(&slots, k as usize);
            }
        }
    }

    #[test]
    fn primary_is_always_a_house_id_when_present() {
        let ids = pool(&["1", "2", "30", "40", "50"]);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let slots = sample_ids(1, &ids, &PrimaryWeights::default(), &mut rng);
            let only: Vec<&str> = slots.filled().collect();
            assert!(only == ["1"] || only == ["2"], "{only:?}");
        }
    }

    #[test]
    fn primary_follows_weights() {
        let ids = pool(&["1", "2", "3"]);
        let weights = PrimaryWeights::new(vec![("2".into(), 0.9), ("1".into(), 0.1)]);
        let mut rng = StdRng::seed_from_u64(2025);
        let mut twos = 0;
        for _ in 0..100 {
            // count=1 isolates the primary draw
            let slots = sample_ids(1, &ids, &weights, &mut rng);
            if slots.filled().next() == Some("2") {
                twos += 1;
            }
        }
        assert!((75..=100).contains(&twos), "ID 2 drawn {twos} times");
    }

    #[test]
    fn count_three_from_three_takes_everyone() {
        let ids = pool(&["1", "2", "3"]);
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..20 {
            let slots = sample_ids(3, &ids, &PrimaryWeights::default(), &mut rng);
            assert_eq!(slots.filled().collect::<Vec<_>>(), vec!["1", "2", "3"]);
        }
    }

    #[test]
    fn only_one_house_id_present_is_always_primary() {
        let ids = pool(&["1", "7", "8"]);
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..50 {
            let slots = sample_ids(1, &ids, &PrimaryWeights::default(), &mut rng);
            assert_eq!(slots.filled().collect::<Vec<_>>(), vec!["1"]);
        }
    }

    #[test]
    fn no_house_ids_samples_uniformly_from_pool() {
        let ids = pool(&["10", "11", "12", "13"]);
        let mut rng = StdRng::seed_from_u64(11);
        let slots = sample_ids(3, &ids, &PrimaryWeights::default(), &mut rng);
        assert_slot_invariants(&slots, 3);
        assert!(slots.filled().all(|id| ids.iter().any(|p| p == id)));
    }

    #[test]
    fn count_is_capped_by_pool_size() {
        let ids = pool(&["1", "2", "3"]);
        let mut rng = StdRng::seed_from_u64(4);
        let slots = sample_ids(6, &ids, &PrimaryWeights::default(), &mut rng);
        assert_slot_invariants(&slots, 3);
    }

    #[test]
    fn duplicate_pool_entries_never_duplicate_slots() {
        let ids = pool(&["2", "2", "5", "5", "9"]);
        let mut rng = StdRng::seed_from_u64(8);
        let slots = sample_ids(5, &ids, &PrimaryWeights::default(), &mut rng);
        assert_slot_invariants(&slots, 3);
    }

    #[test]
    fn zero_weights_fall_back_to_uniform() {
        let ids = pool(&["1", "2", "3", "4"]);
        let weights = PrimaryWeights::new(vec![("2".into(), 0.0), ("1".into(), 0.0)]);
        let mut rng = StdRng::seed_from_u64(6);
        let slots = sample_ids(2, &ids, &weights, &mut rng);
        assert_slot_invariants(&slots, 2);
    }
}
