//! Measurement synthesis.

use chrono::{DateTime, Utc};
use otsim_common::{Archetype, Measurement};
use rand::Rng;

/// Synthesize one reading for `device_id`.
///
/// Each field of the archetype is drawn uniformly from its range and rounded
/// to the field precision. The result depends only on `rng` and the arguments.
pub fn synthesize<R: Rng>(
    rng: &mut R,
    device_id: impl Into<String>,
    archetype: Archetype,
    timestamp: DateTime<Utc>,
) -> Measurement {
    Measurement::from_draws(timestamp, device_id, archetype, |spec| {
        spec.min + rng.random::<f64>() * (spec.max - spec.min)
    })
}
