use crate::checks::{CheckInput, ValidationCheck};
use crate::domain::{Answer, SequenceKind, ValidationOutcome};

const ALIAS: &str = "orf";
const HEADER: &str = "Main ORF";
const MIN_COVERAGE: f64 = 0.8;

/// A nucleotide prediction should be dominated by a single open reading frame.
pub struct OpenReadingFrame;

/// Longest ORF found on one strand frame, in nucleotides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LongestOrf {
    /// `1..=3` forward, `-1..=-3` reverse.
    pub frame: i8,
    pub length: usize,
}

fn is_stop(codon: &[u8]) -> bool {
    matches!(codon, b"TAA" | b"TAG" | b"TGA")
}

fn reverse_complement(sequence: &[u8]) -> Vec<u8> {
    sequence
        .iter()
        .rev()
        .map(|base| match base {
            b'A' => b'T',
            b'T' => b'A',
            b'C' => b'G',
            b'G' => b'C',
            other => *other,
        })
        .collect()
}

/// Longest ATG-initiated stretch in one frame. An ORF that runs off the end
/// of the sequence counts up to the last complete codon.
fn longest_in_frame(sequence: &[u8], offset: usize) -> usize {
    let mut longest = 0;
    let mut start: Option<usize> = None;
    let mut pos = offset;
    while pos + 3 <= sequence.len() {
        let codon = &sequence[pos..pos + 3];
        match start {
            None if codon == b"ATG" => start = Some(pos),
            Some(from) if is_stop(codon) => {
                longest = longest.max(pos + 3 - from);
                start = None;
            }
            _ => {}
        }
        pos += 3;
    }
    if let Some(from) = start {
        longest = longest.max(pos - from);
    }
    longest
}

/// Longest ORF over all six frames; `U` is read as `T`.
pub fn longest_orf(residues: &str) -> Option<LongestOrf> {
    let forward = residues
        .bytes()
        .filter(|b| b.is_ascii_alphabetic())
        .map(|b| match b.to_ascii_uppercase() {
            b'U' => b'T',
            other => other,
        })
        .collect::<Vec<_>>();
    let reverse = reverse_complement(&forward);

    let mut best: Option<LongestOrf> = None;
    for (strand, sequence) in [(1i8, &forward), (-1i8, &reverse)] {
        for offset in 0..3 {
            let length = longest_in_frame(sequence, offset);
            if length > 0 && best.is_none_or(|current| length > current.length) {
                best = Some(LongestOrf {
                    frame: strand * (offset as i8 + 1),
                    length,
                });
            }
        }
    }
    best
}

impl ValidationCheck for OpenReadingFrame {
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
        let residues = input.prediction.raw_sequence.as_deref().unwrap_or_default();
        let total = residues.bytes().filter(|b| b.is_ascii_alphabetic()).count();
        if total == 0 {
            return ValidationOutcome::unapplicable(
                ALIAS,
                HEADER,
                Answer::Yes,
                "prediction has no residues",
            );
        }

        let Some(orf) = longest_orf(residues) else {
            return ValidationOutcome::verdict(
                ALIAS,
                HEADER,
                Answer::No,
                Answer::Yes,
                "no open reading frame found",
            );
        };
        let coverage = orf.length as f64 / total as f64;
        let message = format!(
            "longest ORF in frame {} covers {:.0}%",
            orf.frame,
            coverage * 100.0
        );
        let result = if coverage >= MIN_COVERAGE {
            Answer::Yes
        } else {
            Answer::No
        };
        ValidationOutcome::verdict(ALIAS, HEADER, result, Answer::Yes, message)
    }
}
