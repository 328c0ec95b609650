use tracing::debug;

use crate::checks::external::FastaEntry;
use crate::checks::{CheckContext, CheckInput, ValidationCheck};
use crate::domain::{Answer, FailureCause, SequenceKind, SequenceRecord, ValidationOutcome};
use crate::error::GvError;

const ALIAS: &str = "align";
const HEADER: &str = "Missing/Extra Sequences";
const TOP_HITS: usize = 10;
const MAX_MISSING: f64 = 0.2;
const MAX_EXTRA: f64 = 0.2;

/// Aligns the prediction with its best hits and looks for consensus regions
/// the prediction lacks and prediction regions no hit shares.
pub struct MultipleAlignment {
    context: CheckContext,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignmentFractions {
    /// Consensus columns with a gap in the prediction.
    pub missing: f64,
    /// Prediction residues in columns that are not consensus.
    pub extra: f64,
}

/// A column is consensus when more than half of the hit rows carry a residue.
pub fn alignment_fractions(rows: &[FastaEntry]) -> Option<AlignmentFractions> {
    let (prediction, hits) = rows.split_first()?;
    if hits.is_empty() {
        return None;
    }
    let prediction = prediction.residues.as_bytes();
    let hits = hits
        .iter()
        .map(|row| row.residues.as_bytes())
        .collect::<Vec<_>>();

    let mut consensus = 0usize;
    let mut missing = 0usize;
    let mut residues = 0usize;
    let mut extra = 0usize;
    for (column, cell) in prediction.iter().enumerate() {
        let covered = hits
            .iter()
            .filter(|row| row.get(column).is_some_and(|c| *c != b'-'))
            .count();
        let is_consensus = covered * 2 > hits.len();
        let has_residue = *cell != b'-';
        if is_consensus {
            consensus += 1;
            if !has_residue {
                missing += 1;
            }
        }
        if has_residue {
            residues += 1;
            if !is_consensus {
                extra += 1;
            }
        }
    }

    let ratio = |part: usize, whole: usize| {
        if whole == 0 {
            0.0
        } else {
            part as f64 / whole as f64
        }
    };
    Some(AlignmentFractions {
        missing: ratio(missing, consensus),
        extra: ratio(extra, residues),
    })
}

impl MultipleAlignment {
    pub fn new(context: CheckContext) -> Self {
        Self { context }
    }

    /// Residues of `hit`, from the raw-sequence index when it knows the hit,
    /// from the remote fetcher otherwise. `Ok(None)` when neither source is
    /// configured for it.
    fn hit_sequence(&self, hit: &SequenceRecord) -> Result<Option<String>, GvError> {
        if let Some(index) = &self.context.raw_sequences {
            for key in [&hit.identifier, &hit.accession] {
                if let Some(residues) = index.sequence(key)? {
                    return Ok(Some(residues));
                }
            }
        }
        match &self.context.fetcher {
            Some(fetcher) => fetcher.fetch(&hit.accession).map(Some),
            None => Ok(None),
        }
    }
}

impl ValidationCheck for MultipleAlignment {
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
        if input.kind != SequenceKind::Protein {
            return ValidationOutcome::unapplicable(
                ALIAS,
                HEADER,
                Answer::Yes,
                "only applies to protein predictions",
            );
        }
        let prediction = input.prediction.raw_sequence.as_deref().unwrap_or_default();
        if prediction.is_empty() || input.hits.is_empty() {
            return ValidationOutcome::unapplicable(
                ALIAS,
                HEADER,
                Answer::Yes,
                "needs the prediction sequence and at least one hit",
            );
        }

        let mut entries = vec![FastaEntry::new(&input.prediction.identifier, prediction)];
        for hit in input.hits.iter().take(TOP_HITS) {
            match self.hit_sequence(hit) {
                Ok(Some(residues)) if !residues.is_empty() => {
                    entries.push(FastaEntry::new(&hit.identifier, residues));
                }
                Ok(_) => debug!(hit = %hit.identifier, "no sequence available for hit"),
                Err(GvError::NcbiHttp(_) | GvError::NcbiStatus { .. }) => {
                    return ValidationOutcome::error(
                        ALIAS,
                        HEADER,
                        Answer::Yes,
                        FailureCause::NoInternet,
                    );
                }
                Err(err) => {
                    return ValidationOutcome::error(
                        ALIAS,
                        HEADER,
                        Answer::Yes,
                        FailureCause::Internal(err.to_string()),
                    );
                }
            }
        }
        if entries.len() < 2 {
            return ValidationOutcome::unapplicable(
                ALIAS,
                HEADER,
                Answer::Yes,
                "no hit sequences available",
            );
        }

        let aligned = match self.context.aligner.align(&entries) {
            Ok(aligned) => aligned,
            Err(GvError::MissingTool(_)) => {
                return ValidationOutcome::error(
                    ALIAS,
                    HEADER,
                    Answer::Yes,
                    FailureCause::AlignerMissing,
                );
            }
            Err(err) => {
                return ValidationOutcome::error(
                    ALIAS,
                    HEADER,
                    Answer::Yes,
                    FailureCause::Internal(err.to_string()),
                );
            }
        };

        let Some(fractions) = alignment_fractions(&aligned) else {
            return ValidationOutcome::unapplicable(ALIAS, HEADER, Answer::Yes, "empty alignment");
        };
        let message = format!(
            "{:.0}% missing, {:.0}% extra",
            fractions.missing * 100.0,
            fractions.extra * 100.0
        );
        let result = if fractions.missing <= MAX_MISSING && fractions.extra <= MAX_EXTRA {
            Answer::Yes
        } else {
            Answer::No
        };
        ValidationOutcome::verdict(ALIAS, HEADER, result, Answer::Yes, message)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use super::*;
    use crate::checks::{Aligner, MafftAligner, SequenceFetcher};
    use crate::domain::ValidationState;

    struct Identity;

    impl Aligner for Identity {
        fn align(&self, entries: &[FastaEntry]) -> Result<Vec<FastaEntry>, GvError> {
            Ok(entries.to_vec())
        }
    }

    struct Fixed(HashMap<String, String>);

    impl SequenceFetcher for Fixed {
        fn fetch(&self, accession: &str) -> Result<String, GvError> {
            self.0
                .get(accession)
                .cloned()
                .ok_or_else(|| GvError::NcbiHttp("offline".to_string()))
        }
    }

    fn input_for<'a>(prediction: &'a SequenceRecord, hits: &'a [SequenceRecord]) -> CheckInput<'a> {
        CheckInput {
            kind: SequenceKind::Protein,
            prediction,
            hits,
        }
    }

    fn prediction(residues: &str) -> SequenceRecord {
        let mut record = SequenceRecord::new("q", SequenceKind::Protein, residues.len() as u64);
        record.raw_sequence = Some(residues.to_string());
        record
    }

    fn fetcher(entries: &[(&str, &str)]) -> Arc<dyn SequenceFetcher> {
        Arc::new(Fixed(
            entries
                .iter()
                .map(|(id, seq)| (id.to_string(), seq.to_string()))
                .collect(),
        ))
    }

    #[test]
    fn fractions_from_a_gapped_alignment() {
        let rows = vec![
            FastaEntry::new("q", "MKV--LLAGH"),
            FastaEntry::new("a", "MKVPPLLA--"),
            FastaEntry::new("b", "MKVPPLLA--"),
        ];
        let fractions = alignment_fractions(&rows).unwrap();
        assert_eq!(fractions.missing, 2.0 / 8.0);
        assert_eq!(fractions.extra, 2.0 / 8.0);
    }

    #[test]
    fn matching_hits_pass() {
        let context = CheckContext::new(Arc::new(Identity))
            .with_fetcher(fetcher(&[("a", "MKVLLAGHWP"), ("b", "MKVLLAGHWP")]));
        let check = MultipleAlignment::new(context);
        let prediction = prediction("MKVLLAGHWP");
        let hits = vec![
            SequenceRecord::new("a", SequenceKind::Protein, 10),
            SequenceRecord::new("b", SequenceKind::Protein, 10),
        ];
        let outcome = check.run(&input_for(&prediction, &hits));
        assert_eq!(outcome.state, ValidationState::Success);
        assert_eq!(outcome.message, "0% missing, 0% extra");
    }

    #[test]
    fn unreachable_lookup_is_no_internet() {
        let context = CheckContext::new(Arc::new(Identity)).with_fetcher(fetcher(&[]));
        let check = MultipleAlignment::new(context);
        let prediction = prediction("MKVLLAGHWP");
        let hits = vec![SequenceRecord::new("a", SequenceKind::Protein, 10)];
        let outcome = check.run(&input_for(&prediction, &hits));
        assert_eq!(outcome.state, ValidationState::Error);
        assert_eq!(outcome.causes, vec![FailureCause::NoInternet]);
    }

    #[test]
    fn missing_aligner_is_reported() {
        let context = CheckContext::new(Arc::new(MafftAligner::with_program(None)))
            .with_fetcher(fetcher(&[("a", "MKVLLAGHWP")]));
        let check = MultipleAlignment::new(context);
        let prediction = prediction("MKVLLAGHWP");
        let hits = vec![SequenceRecord::new("a", SequenceKind::Protein, 10)];
        let outcome = check.run(&input_for(&prediction, &hits));
        assert_eq!(outcome.causes, vec![FailureCause::AlignerMissing]);
    }
}
