use crate::checks::{CheckInput, ValidationCheck};
use crate::domain::{Answer, ValidationOutcome};

const ALIAS: &str = "merge";
const HEADER: &str = "Gene Merge";
const MIN_HITS: usize = 5;
const MERGED_SLOPE: (f64, f64) = (0.4, 1.2);

/// Detects predictions that fuse two neighbouring genes: hits then align to
/// one part of the query or the other, so their query start and end move
/// together.
pub struct GeneMerge;

/// Least-squares slope of `y` on `x`; `None` when every `x` is equal.
pub fn regression_slope(points: &[(f64, f64)]) -> Option<f64> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;
    let sxx = points.iter().map(|(x, _)| (x - mean_x).powi(2)).sum::<f64>();
    if sxx == 0.0 {
        return None;
    }
    let sxy = points
        .iter()
        .map(|(x, y)| (x - mean_x) * (y - mean_y))
        .sum::<f64>();
    Some(sxy / sxx)
}

impl ValidationCheck for GeneMerge {
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
        let points = input
            .hits
            .iter()
            .filter_map(|hit| {
                let start = hit.hsps.iter().map(|hsp| hsp.query_from).min()?;
                let end = hit.hsps.iter().map(|hsp| hsp.query_to).max()?;
                Some((start as f64, end as f64))
            })
            .collect::<Vec<_>>();
        if points.len() < MIN_HITS {
            return ValidationOutcome::unapplicable(
                ALIAS,
                HEADER,
                Answer::No,
                format!("needs at least {MIN_HITS} hits with HSPs"),
            );
        }

        let (result, message) = match regression_slope(&points) {
            Some(slope) if slope > MERGED_SLOPE.0 && slope < MERGED_SLOPE.1 => {
                (Answer::Yes, format!("slope {slope:.2}"))
            }
            Some(slope) => (Answer::No, format!("slope {slope:.2}")),
            None => (Answer::No, "all hits start at the same position".to_string()),
        };
        ValidationOutcome::verdict(ALIAS, HEADER, result, Answer::No, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{HspRecord, SequenceKind, SequenceRecord, ValidationState};

    fn hit(query_from: u64, query_to: u64) -> SequenceRecord {
        let mut hit = SequenceRecord::new("h", SequenceKind::Protein, 300);
        hit.hsps.push(HspRecord {
            evalue: 0.0,
            hit_from: 1,
            hit_to: query_to - query_from + 1,
            query_from,
            query_to,
            query_frame: 0,
            hit_alignment: String::new(),
            query_alignment: String::new(),
            align_len: query_to - query_from + 1,
            identity: 0,
            pidentity: Some(0.0),
        });
        hit
    }

    fn run(hits: &[SequenceRecord]) -> ValidationOutcome {
        let prediction = SequenceRecord::new("q", SequenceKind::Protein, 400);
        GeneMerge.run(&CheckInput {
            kind: SequenceKind::Protein,
            prediction: &prediction,
            hits,
        })
    }

    #[test]
    fn hits_on_two_halves_indicate_a_merge() {
        let hits = vec![
            hit(1, 190),
            hit(5, 200),
            hit(3, 195),
            hit(210, 400),
            hit(205, 395),
            hit(200, 398),
        ];
        let outcome = run(&hits);
        assert_eq!(outcome.result, Some(Answer::Yes));
        assert_eq!(outcome.state, ValidationState::Warning);
    }

    #[test]
    fn full_length_hits_are_not_a_merge() {
        let hits = vec![
            hit(1, 400),
            hit(2, 398),
            hit(3, 400),
            hit(4, 399),
            hit(5, 400),
        ];
        assert_eq!(run(&hits).state, ValidationState::Success);
    }

    #[test]
    fn slope_of_a_line() {
        let slope = regression_slope(&[(0.0, 1.0), (1.0, 3.0), (2.0, 5.0)]).unwrap();
        assert!((slope - 2.0).abs() < 1e-9);
        assert_eq!(regression_slope(&[(1.0, 1.0), (1.0, 5.0)]), None);
    }
}
