//! Device identity allocation for one generation batch.

use otsim_common::Archetype;
use rand::Rng;

/// Smallest number of simulated devices in a batch.
pub const MIN_BATCH: usize = 1;
/// Largest number of simulated devices in a batch.
pub const MAX_BATCH: usize = 10;

/// Archetype draws for the devices of one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    archetypes: Vec<Archetype>,
}

impl BatchPlan {
    /// Number of devices in the batch.
    pub fn count(&self) -> usize {
        self.archetypes.len()
    }

    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    /// `(device_id, archetype)` for each slot, with 1-based ordinals.
    pub fn devices(&self) -> impl Iterator<Item = (String, Archetype)> + '_ {
        self.archetypes
            .iter()
            .enumerate()
            .map(|(i, &archetype)| (format_id(archetype, i + 1), archetype))
    }
}

/// Draw a batch size in `[1, 10]` and an independent archetype for each slot.
pub fn allocate_batch_plan<R: Rng>(rng: &mut R) -> BatchPlan {
    let count = rng.random_range(MIN_BATCH..=MAX_BATCH);
    let archetypes = (0..count)
        .map(|_| Archetype::ALL[rng.random_range(0..Archetype::ALL.len())])
        .collect();

    BatchPlan { archetypes }
}

/// Format a device id such as `Flow-03`.
///
/// Ordinals are zero-padded to two digits and widen past 99.
pub fn format_id(archetype: Archetype, ordinal: usize) -> String {
    format!("{}-{:02}", archetype.as_str(), ordinal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use std::collections::HashMap;

    #[test]
    fn test_format_id() {
        assert_eq!(format_id(Archetype::Flow, 3), "Flow-03");
        assert_eq!(format_id(Archetype::Power, 12), "Power-12");
        assert_eq!(format_id(Archetype::TempHumidity, 1), "TempHumidity-01");
        assert_eq!(format_id(Archetype::Vibration, 100), "Vibration-100");
        assert_eq!(format_id(Archetype::Flow, 3), format_id(Archetype::Flow, 3));
    }

    #[test]
    fn test_devices_use_one_based_ordinals() {
        let plan = BatchPlan {
            archetypes: vec![Archetype::Power, Archetype::Power, Archetype::Flow],
        };

        let ids: Vec<String> = plan.devices().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["Power-01", "Power-02", "Flow-03"]);
    }

    #[test]
    fn test_batch_size_always_in_range() {
        let mut rng = SmallRng::seed_from_u64(7);
        let mut seen = [false; MAX_BATCH + 1];

        for _ in 0..5_000 {
            let plan = allocate_batch_plan(&mut rng);
            assert!((MIN_BATCH..=MAX_BATCH).contains(&plan.count()));
            seen[plan.count()] = true;
        }

        // Every size in the range shows up over many draws
        assert!(seen[MIN_BATCH..].iter().all(|&s| s));
    }

    #[test]
    fn test_archetype_draws_are_uniform_and_independent() {
        let mut rng = SmallRng::seed_from_u64(42);
        let mut counts: HashMap<Archetype, usize> = HashMap::new();
        let mut pairs = 0usize;
        let mut equal_neighbours = 0usize;

        for _ in 0..10_000 {
            let plan = allocate_batch_plan(&mut rng);
            for archetype in plan.archetypes() {
                *counts.entry(*archetype).or_default() += 1;
            }
            for window in plan.archetypes().windows(2) {
                pairs += 1;
                if window[0] == window[1] {
                    equal_neighbours += 1;
                }
            }
        }

        let total: usize = counts.values().sum();
        for archetype in Archetype::ALL {
            let share = counts[&archetype] as f64 / total as f64;
            assert!((share - 0.25).abs() < 0.02, "{archetype}: {share}");
        }

        // Independent draws repeat the previous archetype about a quarter of the time
        let repeat = equal_neighbours as f64 / pairs as f64;
        assert!((repeat - 0.25).abs() < 0.02, "repeat rate {repeat}");
    }

    #[test]
    fn test_plan_is_deterministic_for_seed() {
        let a = allocate_batch_plan(&mut SmallRng::seed_from_u64(99));
        let b = allocate_batch_plan(&mut SmallRng::seed_from_u64(99));
        assert_eq!(a, b);
    }
}
