use crate::checks::{CheckInput, ValidationCheck, median};
use crate::domain::{Answer, ValidationOutcome};

const ALIAS: &str = "lenc";
const HEADER: &str = "Length Cluster";
const MIN_HITS: usize = 5;

/// Does the prediction length fall in the dominant cluster of hit lengths?
pub struct LengthCluster;

/// Largest group of sorted lengths, split wherever two neighbours are further
/// apart than `max(2 * median gap, 10% of the median length)`.
pub fn dominant_cluster(lengths: &[u64]) -> Option<(u64, u64)> {
    let mut sorted = lengths.to_vec();
    sorted.sort_unstable();
    let first = *sorted.first()?;

    let gaps = sorted
        .windows(2)
        .map(|pair| (pair[1] - pair[0]) as f64)
        .collect::<Vec<_>>();
    let as_f64 = sorted.iter().map(|len| *len as f64).collect::<Vec<_>>();
    let threshold = f64::max(
        2.0 * median(&gaps).unwrap_or(0.0),
        0.1 * median(&as_f64).unwrap_or(0.0),
    );

    let mut best = (first, first, 1usize);
    let mut current = (first, first, 1usize);
    for pair in sorted.windows(2) {
        if (pair[1] - pair[0]) as f64 > threshold {
            current = (pair[1], pair[1], 1);
        } else {
            current.1 = pair[1];
            current.2 += 1;
        }
        if current.2 > best.2 {
            best = current;
        }
    }
    Some((best.0, best.1))
}

impl ValidationCheck for LengthCluster {
    fn alias(&self) -> &str {
        ALIAS
    }

    fn header(&self) -> &str {
        HEADER
    }

    fn expected(&self) -> Answer {
        Answer::Yes
    }

    fn run(&self, input: &CheckInput<'_>) -> ValidationOutcome {
        let lengths = input
            .hits
            .iter()
            .map(|hit| hit.length)
            .filter(|len| *len > 0)
            .collect::<Vec<_>>();
        if lengths.len() < MIN_HITS {
            return ValidationOutcome::unapplicable(
                ALIAS,
                HEADER,
                Answer::Yes,
                format!("needs at least {MIN_HITS} hits with a known length"),
            );
        }

        let Some((low, high)) = dominant_cluster(&lengths) else {
            return ValidationOutcome::unapplicable(ALIAS, HEADER, Answer::Yes, "no hit lengths");
        };
        let length = input.prediction.length;
        let inside = (low..=high).contains(&length);
        let message = format!(
            "{length} is {} the most dense cluster [{low}..{high}]",
            if inside { "inside" } else { "outside" }
        );
        let result = if inside { Answer::Yes } else { Answer::No };
        ValidationOutcome::verdict(ALIAS, HEADER, result, Answer::Yes, message)
    }
}
