use serde::{Deserialize, Serialize};

use crate::domain::{ValidationOutcome, ValidationState};

const LENGTH_CLUSTER: &str = "lenc";
const LENGTH_RANK: &str = "lenr";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub successes: f64,
    pub fails: f64,
    /// `0..=100`.
    pub value: u32,
}

/// The two length checks count as one when both are present; a split
/// removes half a success and half a failure.
pub fn score(outcomes: &[ValidationOutcome]) -> Score {
    let mut successes = outcomes.iter().filter(|o| o.is_success()).count() as f64;
    let mut fails = outcomes
        .iter()
        .filter(|o| {
            !matches!(o.state, ValidationState::Unapplicable | ValidationState::Error)
                && !o.is_success()
        })
        .count() as f64;

    let cluster = single(outcomes, LENGTH_CLUSTER);
    let rank = single(outcomes, LENGTH_RANK);
    if let (Some(cluster), Some(rank)) = (cluster, rank) {
        match (cluster.is_success(), rank.is_success()) {
            (true, true) => successes -= 1.0,
            (false, false) => fails -= 1.0,
            _ => {
                successes -= 0.5;
                fails -= 0.5;
            }
        }
    }

    let total = successes + fails;
    let value = if total <= 0.0 {
        0
    } else {
        (100.0 * successes / total).round().clamp(0.0, 100.0) as u32
    };
    Score {
        successes,
        fails,
        value,
    }
}

fn single<'a>(outcomes: &'a [ValidationOutcome], alias: &str) -> Option<&'a ValidationOutcome> {
    let mut matching = outcomes.iter().filter(|o| o.alias == alias);
    let first = matching.next()?;
    match matching.next() {
        Some(_) => None,
        None => Some(first),
    }
}
