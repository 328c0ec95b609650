pub mod alignment;
pub mod duplication;
pub mod external;
pub mod gene_merge;
pub mod length_cluster;
pub mod length_rank;
pub mod orf;
pub mod reading_frame;

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::domain::{Answer, FailureCause, SequenceKind, SequenceRecord, ValidationOutcome};
use crate::error::GvError;
use crate::fasta::RawSequenceIndex;

pub use external::{Aligner, FastaEntry, MafftAligner, NcbiHttpClient, SequenceFetcher};

#[derive(Debug, Clone, Copy)]
pub struct CheckInput<'a> {
    pub kind: SequenceKind,
    pub prediction: &'a SequenceRecord,
    /// Hits after identical-hit filtering, in result order.
    pub hits: &'a [SequenceRecord],
}

pub trait ValidationCheck: Send + Sync {
    fn alias(&self) -> &str;
    fn header(&self) -> &str;
    /// Answer a well-supported prediction is expected to give.
    fn expected(&self) -> Answer;
    fn run(&self, input: &CheckInput<'_>) -> ValidationOutcome;
}

#[derive(Clone)]
pub struct CheckContext {
    pub raw_sequences: Option<Arc<RawSequenceIndex>>,
    pub aligner: Arc<dyn Aligner>,
    pub fetcher: Option<Arc<dyn SequenceFetcher>>,
}

impl CheckContext {
    pub fn new(aligner: Arc<dyn Aligner>) -> Self {
        Self {
            raw_sequences: None,
            aligner,
            fetcher: None,
        }
    }

    pub fn with_raw_sequences(mut self, index: Arc<RawSequenceIndex>) -> Self {
        self.raw_sequences = Some(index);
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn SequenceFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }
}

#[derive(Clone)]
pub struct CheckRegistry {
    checks: Vec<Arc<dyn ValidationCheck>>,
}

impl CheckRegistry {
    pub fn new(checks: Vec<Arc<dyn ValidationCheck>>) -> Result<Self, GvError> {
        let mut seen = HashSet::new();
        for check in &checks {
            if !seen.insert(check.alias().to_lowercase()) {
                return Err(GvError::AliasDuplication(check.alias().to_string()));
            }
        }
        Ok(Self { checks })
    }

    pub fn builtin(context: &CheckContext) -> Result<Self, GvError> {
        Self::new(vec![
            Arc::new(length_cluster::LengthCluster),
            Arc::new(length_rank::LengthRank),
            Arc::new(reading_frame::ReadingFrame),
            Arc::new(gene_merge::GeneMerge),
            Arc::new(duplication::Duplication),
            Arc::new(orf::OpenReadingFrame),
            Arc::new(alignment::MultipleAlignment::new(context.clone())),
        ])
    }

    pub fn aliases(&self) -> Vec<&str> {
        self.checks.iter().map(|check| check.alias()).collect()
    }

    /// Resolves a user selection: entries are split on whitespace, matched
    /// case-insensitively, and `all` selects everything. Unknown aliases are
    /// logged and dropped.
    pub fn select<S: AsRef<str>>(&self, requested: &[S]) -> Result<SelectedChecks, GvError> {
        let wanted = requested
            .iter()
            .flat_map(|entry| entry.as_ref().split_whitespace())
            .map(|alias| alias.trim().to_lowercase())
            .filter(|alias| !alias.is_empty())
            .collect::<Vec<_>>();

        let everything = wanted.iter().any(|alias| alias == "all");
        let known = self
            .checks
            .iter()
            .map(|check| check.alias().to_lowercase())
            .collect::<HashSet<_>>();
        for alias in &wanted {
            if alias != "all" && !known.contains(alias) {
                warn!(alias = %alias, "unknown validation alias ignored");
            }
        }

        let checks = self
            .checks
            .iter()
            .filter(|check| everything || wanted.contains(&check.alias().to_lowercase()))
            .cloned()
            .collect::<Vec<_>>();
        if checks.is_empty() {
            return Err(GvError::NoValidation(if wanted.is_empty() {
                "<none>".to_string()
            } else {
                wanted.join(" ")
            }));
        }

        debug!(
            selected = ?checks.iter().map(|check| check.alias()).collect::<Vec<_>>(),
            "validations selected"
        );
        Ok(SelectedChecks { checks })
    }
}

#[derive(Clone)]
pub struct SelectedChecks {
    checks: Vec<Arc<dyn ValidationCheck>>,
}

impl SelectedChecks {
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn aliases(&self) -> Vec<&str> {
        self.checks.iter().map(|check| check.alias()).collect()
    }

    pub fn run_all(&self, input: &CheckInput<'_>) -> Vec<ValidationOutcome> {
        self.checks
            .iter()
            .map(|check| run_guarded(check.as_ref(), input))
            .collect()
    }
}

fn run_guarded(check: &dyn ValidationCheck, input: &CheckInput<'_>) -> ValidationOutcome {
    let start = Instant::now();
    let result = panic::catch_unwind(AssertUnwindSafe(|| check.run(input)));
    let elapsed = start.elapsed();

    match result {
        Ok(outcome) => outcome.with_running_time(elapsed),
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|msg| msg.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            warn!(
                check = check.alias(),
                query = %input.prediction.identifier,
                %reason,
                "validation panicked"
            );
            ValidationOutcome::error(
                check.alias(),
                check.header(),
                check.expected(),
                FailureCause::Internal(format!("check panicked: {reason}")),
            )
            .with_running_time(elapsed)
        }
    }
}

/// Median of a non-empty, unsorted sample.
pub(crate) fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_of_even_and_odd_samples() {
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
    }
}
