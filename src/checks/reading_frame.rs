use std::collections::BTreeMap;

use crate::checks::{CheckInput, ValidationCheck};
use crate::domain::{Answer, SequenceKind, ValidationOutcome};

const ALIAS: &str = "frame";
const HEADER: &str = "Reading Frame";

/// HSPs of a nucleotide prediction should all lie on one strand.
pub struct ReadingFrame;

impl ValidationCheck for ReadingFrame {
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
        if input.kind != SequenceKind::Nucleotide {
            return ValidationOutcome::unapplicable(
                ALIAS,
                HEADER,
                Answer::Yes,
                "only applies to nucleotide predictions",
            );
        }

        let mut frames: BTreeMap<i32, usize> = BTreeMap::new();
        for hsp in input.hits.iter().flat_map(|hit| &hit.hsps) {
            if hsp.query_frame != 0 {
                *frames.entry(hsp.query_frame).or_default() += 1;
            }
        }
        if frames.is_empty() {
            return ValidationOutcome::unapplicable(
                ALIAS,
                HEADER,
                Answer::Yes,
                "no HSP reports a reading frame",
            );
        }

        let forward = frames.keys().any(|frame| *frame > 0);
        let reverse = frames.keys().any(|frame| *frame < 0);
        let summary = frames
            .iter()
            .map(|(frame, count)| format!("{frame}: {count}"))
            .collect::<Vec<_>>()
            .join(", ");
        let result = if forward && reverse { Answer::No } else { Answer::Yes };
        ValidationOutcome::verdict(ALIAS, HEADER, result, Answer::Yes, summary)
    }
}
