use crate::domain::SequenceKind;
use crate::error::GvError;

/// Fewer usable residues than this leaves the kind undetermined.
pub const MIN_RESIDUES: usize = 10;
pub const NUCLEOTIDE_THRESHOLD: f64 = 0.9;
pub const GUESS_WINDOW: usize = 10_000;

/// Guess whether `residues` is nucleotide or protein.
///
/// Non-letters and the ambiguity codes `N`/`X` are ignored. Returns `None`
/// when fewer than [`MIN_RESIDUES`] residues remain.
pub fn guess_kind(residues: &str) -> Option<SequenceKind> {
    let cleaned = residues
        .bytes()
        .filter(|b| b.is_ascii_alphabetic())
        .map(|b| b.to_ascii_uppercase())
        .filter(|b| *b != b'N' && *b != b'X');

    let mut total = 0usize;
    let mut bases = 0usize;
    for residue in cleaned {
        if total < GUESS_WINDOW && matches!(residue, b'A' | b'C' | b'G' | b'T' | b'U') {
            bases += 1;
        }
        total += 1;
    }

    if total < MIN_RESIDUES {
        return None;
    }
    let window = total.min(GUESS_WINDOW);
    if bases as f64 / window as f64 >= NUCLEOTIDE_THRESHOLD {
        Some(SequenceKind::Nucleotide)
    } else {
        Some(SequenceKind::Protein)
    }
}

pub fn kind_of_records(fasta: &str) -> Result<Option<SequenceKind>, GvError> {
    let mut found: Option<SequenceKind> = None;
    let mut body = String::new();

    let check = |body: &str, found: &mut Option<SequenceKind>| -> Result<(), GvError> {
        if body.is_empty() {
            return Ok(());
        }
        match (guess_kind(body), *found) {
            (Some(kind), None) => *found = Some(kind),
            (Some(kind), Some(seen)) if kind != seen => {
                return Err(GvError::SequenceType(
                    "input file contains mixed sequence types".to_string(),
                ));
            }
            _ => {}
        }
        Ok(())
    };

    for line in fasta.lines() {
        if line.starts_with('>') {
            check(&body, &mut found)?;
            body.clear();
        } else {
            body.push_str(line.trim_end());
        }
    }
    check(&body, &mut found)?;

    Ok(found)
}
