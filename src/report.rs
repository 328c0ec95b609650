use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::RunAggregate;
use crate::domain::{SequenceRecord, ValidationOutcome};
use crate::scoring::Score;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryReport {
    /// One-based position of the query in the input file.
    pub index: usize,
    pub identifier: String,
    pub definition: String,
    pub length: u64,
    pub hit_count: usize,
    pub score: u32,
    pub successes: f64,
    pub fails: f64,
    pub outcomes: Vec<ValidationOutcome>,
}

impl QueryReport {
    pub fn new(
        index: usize,
        prediction: &SequenceRecord,
        hit_count: usize,
        score: Score,
        outcomes: Vec<ValidationOutcome>,
    ) -> Self {
        Self {
            index,
            identifier: prediction.identifier.clone(),
            definition: prediction.definition.clone(),
            length: prediction.length,
            hit_count,
            score: score.value,
            successes: score.successes,
            fails: score.fails,
            outcomes,
        }
    }
}

/// Number of queries per 10-point score bin; 100 falls in the last bin.
pub fn score_histogram(scores: &[u32]) -> [usize; 10] {
    let mut bins = [0usize; 10];
    for score in scores {
        let bin = (*score as usize / 10).min(9);
        bins[bin] += 1;
    }
    bins
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub input: String,
    pub started_at: String,
    pub finished_at: String,
    pub query_count: usize,
    pub good_predictions: usize,
    pub bad_predictions: usize,
    pub no_evidence: usize,
    pub aligner_missing: usize,
    pub no_internet: usize,
    pub errors: BTreeMap<String, usize>,
    pub score_histogram: [usize; 10],
    /// Mean running time per check, in seconds.
    pub mean_running_times: BTreeMap<String, f64>,
}

impl RunSummary {
    pub fn new(
        input: &str,
        aggregate: &RunAggregate,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        Self {
            input: input.to_string(),
            started_at: started_at.to_rfc3339(),
            finished_at: finished_at.to_rfc3339(),
            query_count: aggregate.query_count(),
            good_predictions: aggregate.good_predictions(),
            bad_predictions: aggregate.bad_predictions(),
            no_evidence: aggregate.no_evidence(),
            aligner_missing: aggregate.aligner_missing(),
            no_internet: aggregate.no_internet(),
            errors: aggregate.errors().clone(),
            score_histogram: score_histogram(aggregate.scores()),
            mean_running_times: aggregate
                .running_times()
                .iter()
                .map(|(alias, time)| (alias.clone(), time.mean().as_secs_f64()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histogram_bins_by_tens() {
        let bins = score_histogram(&[0, 9, 10, 75, 99, 100]);
        assert_eq!(bins, [2, 1, 0, 0, 0, 0, 0, 1, 0, 2]);
    }
}
