use std::collections::HashMap;

use crate::checks::{CheckInput, ValidationCheck};
use crate::domain::{Answer, SequenceRecord, ValidationOutcome};

const ALIAS: &str = "dup";
const HEADER: &str = "Duplication";
const TOP_HITS: usize = 10;
const SIGNIFICANCE: f64 = 0.05;

/// A duplicated region in the prediction makes several HSPs of one hit land
/// on the same hit residues.
pub struct Duplication;

/// Mean number of HSPs covering each covered residue of `hit`.
pub fn mean_coverage(hit: &SequenceRecord) -> Option<f64> {
    let mut depth: HashMap<u64, u32> = HashMap::new();
    for hsp in &hit.hsps {
        let (from, to) = if hsp.hit_from <= hsp.hit_to {
            (hsp.hit_from, hsp.hit_to)
        } else {
            (hsp.hit_to, hsp.hit_from)
        };
        for pos in from..=to {
            *depth.entry(pos).or_default() += 1;
        }
    }
    if depth.is_empty() {
        return None;
    }
    let total = depth.values().map(|count| *count as f64).sum::<f64>();
    Some(total / depth.len() as f64)
}

/// One-sided sign test: probability of at least `above` successes out of
/// `trials` fair coin flips.
pub fn sign_test_p_value(above: usize, trials: usize) -> f64 {
    if trials == 0 {
        return 1.0;
    }
    let mut coefficient = 1.0f64;
    let mut tail = 0.0f64;
    for k in 0..=trials {
        if k > 0 {
            coefficient = coefficient * (trials - k + 1) as f64 / k as f64;
        }
        if k >= above {
            tail += coefficient;
        }
    }
    tail / 2f64.powi(trials as i32)
}

impl ValidationCheck for Duplication {
    fn alias(&self) -> &str {
        ALIAS
    }

    fn header(&self) -> &str {
        HEADER
    }

    fn expected(&self) -> Answer {
        Answer::No
    }

    fn run(&self, input: &CheckInput<'_>) -> ValidationOutcome {
        let averages = input
            .hits
            .iter()
            .filter(|hit| !hit.hsps.is_empty())
            .take(TOP_HITS)
            .filter_map(mean_coverage)
            .collect::<Vec<_>>();
        if averages.is_empty() {
            return ValidationOutcome::unapplicable(ALIAS, HEADER, Answer::No, "no hits with HSPs");
        }

        // Hits with exactly single coverage are ties and drop out of the test.
        let above = averages.iter().filter(|avg| **avg > 1.0).count();
        let trials = averages.iter().filter(|avg| **avg != 1.0).count();
        let p_value = sign_test_p_value(above, trials);

        let message = format!("p-value {p_value:.3}");
        let result = if p_value < SIGNIFICANCE {
            Answer::Yes
        } else {
            Answer::No
        };
        ValidationOutcome::verdict(ALIAS, HEADER, result, Answer::No, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{HspRecord, SequenceKind, ValidationState};

    fn hit(spans: &[(u64, u64)]) -> SequenceRecord {
        let mut hit = SequenceRecord::new("h", SequenceKind::Protein, 200);
        hit.hsps = spans
            .iter()
            .map(|(from, to)| HspRecord {
                evalue: 0.0,
                hit_from: *from,
                hit_to: *to,
                query_from: 1,
                query_to: 10,
                query_frame: 0,
                hit_alignment: String::new(),
                query_alignment: String::new(),
                align_len: 10,
                identity: 10,
                pidentity: Some(100.0),
            })
            .collect();
        hit
    }

    fn run(hits: &[SequenceRecord]) -> ValidationOutcome {
        let prediction = SequenceRecord::new("q", SequenceKind::Protein, 200);
        Duplication.run(&CheckInput {
            kind: SequenceKind::Protein,
            prediction: &prediction,
            hits,
        })
    }

    #[test]
    fn coverage_counts_overlapping_hsps() {
        assert_eq!(mean_coverage(&hit(&[(1, 10), (1, 10)])), Some(2.0));
        assert_eq!(mean_coverage(&hit(&[(1, 10), (20, 11)])), Some(1.0));
        assert_eq!(mean_coverage(&hit(&[])), None);
    }

    #[test]
    fn sign_test_tail() {
        assert_eq!(sign_test_p_value(5, 5), 1.0 / 32.0);
        assert_eq!(sign_test_p_value(0, 4), 1.0);
        assert_eq!(sign_test_p_value(0, 0), 1.0);
    }

    #[test]
    fn consistent_overlaps_indicate_duplication() {
        let hits = vec![hit(&[(1, 50), (1, 50)]); 5];
        assert_eq!(run(&hits).result, Some(Answer::Yes));

        let hits = vec![hit(&[(1, 50), (1, 50)]); 4];
        assert_eq!(run(&hits).state, ValidationState::Success);

        let hits = vec![hit(&[(1, 50)]); 8];
        assert_eq!(run(&hits).state, ValidationState::Success);
    }
}
