use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

use crate::domain::{FailureCause, ValidationOutcome, ValidationState};

/// Score from which a prediction counts as good.
pub const GOOD_SCORE: u32 = 75;

#[derive(Debug, Clone, PartialEq)]
pub struct QueryStats {
    pub score: u32,
    pub no_evidence: bool,
    pub aligner_missing: usize,
    pub no_internet: usize,
    /// Aliases of checks that ended in `Error`.
    pub errors: Vec<String>,
    /// `(alias, running time)` of checks that produced a verdict.
    pub running_times: Vec<(String, Duration)>,
}

impl QueryStats {
    pub fn from_outcomes(score: u32, outcomes: &[ValidationOutcome]) -> Self {
        let count_cause = |wanted: &FailureCause| {
            outcomes
                .iter()
                .flat_map(|o| &o.causes)
                .filter(|cause| *cause == wanted)
                .count()
        };
        Self {
            score,
            no_evidence: outcomes.iter().all(|o| o.result.is_none()),
            aligner_missing: count_cause(&FailureCause::AlignerMissing),
            no_internet: count_cause(&FailureCause::NoInternet),
            errors: outcomes
                .iter()
                .filter(|o| o.state == ValidationState::Error)
                .map(|o| o.alias.clone())
                .collect(),
            running_times: outcomes
                .iter()
                .filter(|o| {
                    !o.running_time.is_zero()
                        && !matches!(
                            o.state,
                            ValidationState::Unapplicable | ValidationState::Error
                        )
                })
                .map(|o| (o.alias.clone(), o.running_time))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunningTime {
    #[serde(with = "crate::domain::duration_secs")]
    pub total: Duration,
    pub samples: u32,
}

impl RunningTime {
    pub fn mean(&self) -> Duration {
        if self.samples == 0 {
            Duration::ZERO
        } else {
            self.total / self.samples
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunAggregate {
    query_count: usize,
    scores: Vec<u32>,
    good_predictions: usize,
    bad_predictions: usize,
    no_evidence: usize,
    aligner_missing: usize,
    no_internet: usize,
    errors: BTreeMap<String, usize>,
    running_times: BTreeMap<String, RunningTime>,
}

impl RunAggregate {
    pub fn merge(&mut self, stats: QueryStats) {
        self.query_count += 1;
        self.scores.push(stats.score);
        if stats.score >= GOOD_SCORE {
            self.good_predictions += 1;
        } else {
            self.bad_predictions += 1;
        }
        if stats.no_evidence {
            self.no_evidence += 1;
        }
        self.aligner_missing += stats.aligner_missing;
        self.no_internet += stats.no_internet;
        for alias in stats.errors {
            *self.errors.entry(alias).or_default() += 1;
        }
        for (alias, time) in stats.running_times {
            let entry = self.running_times.entry(alias).or_default();
            entry.total += time;
            entry.samples += 1;
        }
    }

    pub fn query_count(&self) -> usize {
        self.query_count
    }

    pub fn scores(&self) -> &[u32] {
        &self.scores
    }

    pub fn good_predictions(&self) -> usize {
        self.good_predictions
    }

    pub fn bad_predictions(&self) -> usize {
        self.bad_predictions
    }

    pub fn no_evidence(&self) -> usize {
        self.no_evidence
    }

    pub fn aligner_missing(&self) -> usize {
        self.aligner_missing
    }

    pub fn no_internet(&self) -> usize {
        self.no_internet
    }

    pub fn errors(&self) -> &BTreeMap<String, usize> {
        &self.errors
    }

    pub fn running_times(&self) -> &BTreeMap<String, RunningTime> {
        &self.running_times
    }
}

#[derive(Debug, Default)]
pub struct SharedAggregate {
    inner: Mutex<RunAggregate>,
}

impl SharedAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&self, stats: QueryStats) {
        // poisoning leaves plain counters intact
        let mut guard = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.merge(stats);
    }

    pub fn into_inner(self) -> RunAggregate {
        self.inner
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
