pub mod tabular;
pub mod xml;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use tracing::{debug, warn};

use crate::domain::{HspRecord, SequenceKind, SequenceRecord, nucleotide_to_protein};
use crate::error::GvError;
use crate::seqtype::guess_kind;

pub use tabular::{ColumnLayout, ColumnarReader};
pub use xml::StructuredReader;

pub type ResultSource = Box<dyn BufRead + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultFormat {
    Structured,
    Columnar,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NextHits {
    Hits(Vec<SequenceRecord>),
    /// The result stream has no further queries.
    Exhausted,
}

pub enum Probe {
    Structured(StructuredReader),
    Columnar(ColumnarReader),
    Unrecognized(String),
}

impl std::fmt::Debug for Probe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Probe::Structured(_) => write!(f, "Probe::Structured"),
            Probe::Columnar(_) => write!(f, "Probe::Columnar"),
            Probe::Unrecognized(reason) => write!(f, "Probe::Unrecognized({reason:?})"),
        }
    }
}

pub enum HomologyReader {
    Structured(StructuredReader),
    Columnar(ColumnarReader),
}

impl HomologyReader {
    pub fn format(&self) -> ResultFormat {
        match self {
            HomologyReader::Structured(_) => ResultFormat::Structured,
            HomologyReader::Columnar(_) => ResultFormat::Columnar,
        }
    }

    /// Hits of the next query. The structured reader is positional and ignores
    /// `identifier`; the columnar reader looks the identifier up.
    pub fn next_hits(&mut self, identifier: &str) -> Result<NextHits, GvError> {
        match self {
            HomologyReader::Structured(reader) => Ok(match reader.next_query()? {
                Some(hits) => NextHits::Hits(hits),
                None => NextHits::Exhausted,
            }),
            HomologyReader::Columnar(reader) => Ok(NextHits::Hits(reader.hits_for(identifier))),
        }
    }

    pub fn skip(&mut self) -> Result<bool, GvError> {
        match self {
            HomologyReader::Structured(reader) => reader.skip_query(),
            HomologyReader::Columnar(_) => Ok(true),
        }
    }
}

pub fn open_results(path: &Path) -> Result<ResultSource, GvError> {
    if !path.is_file() {
        return Err(GvError::FileNotFound(path.to_path_buf()));
    }
    let file = File::open(path)
        .map_err(|err| GvError::Filesystem(format!("{}: {err}", path.display())))?;
    let mut reader = BufReader::new(file);
    let is_gzip = reader
        .fill_buf()
        .map(|head| head.starts_with(&[0x1f, 0x8b]))
        .map_err(|err| GvError::Filesystem(err.to_string()))?;
    if is_gzip {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(reader))))
    } else {
        Ok(Box::new(reader))
    }
}

fn looks_like_xml(path: &Path) -> Result<bool, GvError> {
    let mut source = open_results(path)?;
    let head = source
        .fill_buf()
        .map_err(|err| GvError::Format(format!("{}: {err}", path.display())))?;
    let text = String::from_utf8_lossy(head);
    let text = text.trim_start_matches('\u{feff}').trim_start();
    Ok(text.starts_with("<?xml") || text.starts_with("<BlastOutput") || text.starts_with("<!DOCTYPE"))
}

/// Two-stage format detection.
///
/// Stage one parses the first query as XML when the file looks like XML;
/// stage two builds the tabular reader and resolves `first_identifier`.
/// A sequence type error from either stage is returned as an error, every
/// other structural failure ends up in [Probe::Unrecognized].
pub fn probe(
    path: &Path,
    layout: Option<&str>,
    kind: SequenceKind,
    first_identifier: &str,
) -> Result<Probe, GvError> {
    let mut reasons = Vec::new();

    if looks_like_xml(path)? {
        let mut reader = StructuredReader::open(path, kind)?;
        match reader.next_query() {
            Ok(Some(_)) => {
                debug!(path = %path.display(), "result file recognized as BLAST XML");
                return Ok(Probe::Structured(StructuredReader::open(path, kind)?));
            }
            Ok(None) => reasons.push("XML without any <Iteration> record".to_string()),
            Err(GvError::Format(reason)) => reasons.push(reason),
            Err(err) => return Err(err),
        }
    }

    let columns = match layout {
        Some(columns) => columns.parse::<ColumnLayout>()?,
        None => ColumnLayout::default(),
    };
    match ColumnarReader::open(path, columns, kind) {
        Ok(reader) => {
            let first = reader.peek_count(first_identifier);
            debug!(
                path = %path.display(),
                first_query_hits = first,
                "result file recognized as BLAST tabular"
            );
            Ok(Probe::Columnar(reader))
        }
        Err(GvError::Format(reason)) => {
            reasons.push(reason);
            Ok(Probe::Unrecognized(reasons.join("; ")))
        }
        Err(err) => Err(err),
    }
}

pub fn open(
    path: &Path,
    layout: Option<&str>,
    kind: SequenceKind,
    first_identifier: &str,
) -> Result<HomologyReader, GvError> {
    match probe(path, layout, kind, first_identifier)? {
        Probe::Structured(reader) => Ok(HomologyReader::Structured(reader)),
        Probe::Columnar(reader) => {
            if layout.is_none() {
                warn!(
                    "tabular results read with the default column layout; pass --columns if the \
                     search used nonstandard columns"
                );
            }
            Ok(HomologyReader::Columnar(reader))
        }
        Probe::Unrecognized(reason) => {
            let hint = if layout.is_none() {
                " (for tabular input with nonstandard columns pass --columns)"
            } else {
                ""
            };
            Err(GvError::Format(format!(
                "{} is neither BLAST XML nor BLAST tabular: {reason}{hint}",
                path.display()
            )))
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct RawHsp {
    pub evalue: f64,
    pub hit_from: u64,
    pub hit_to: u64,
    pub query_from: u64,
    pub query_to: u64,
    pub query_frame: i32,
    pub hit_alignment: String,
    pub query_alignment: String,
    pub align_len: u64,
    pub identity: u64,
    pub pidentity: Option<f64>,
}

// Layouts without alignment columns leave the text empty; there is nothing to classify then.
pub(crate) fn finish_hsp(raw: RawHsp, query_kind: SequenceKind) -> Result<HspRecord, GvError> {
    for (side, aligned) in [("hit", &raw.hit_alignment), ("query", &raw.query_alignment)] {
        if !aligned.is_empty() && guess_kind(aligned) != Some(SequenceKind::Protein) {
            return Err(GvError::SequenceType(format!(
                "{side} alignment is not protein; results must come from a protein database"
            )));
        }
    }

    let (query_from, query_to) = match query_kind {
        SequenceKind::Nucleotide => (
            nucleotide_to_protein(raw.query_from),
            nucleotide_to_protein(raw.query_to),
        ),
        SequenceKind::Protein => (raw.query_from, raw.query_to),
    };

    let pidentity = raw
        .pidentity
        .or_else(|| HspRecord::percent_identity(raw.identity, raw.align_len));

    Ok(HspRecord {
        evalue: raw.evalue,
        hit_from: raw.hit_from,
        hit_to: raw.hit_to,
        query_from,
        query_to,
        query_frame: raw.query_frame,
        hit_alignment: raw.hit_alignment,
        query_alignment: raw.query_alignment,
        align_len: raw.align_len,
        identity: raw.identity,
        pidentity,
    })
}

pub(crate) fn parse_field<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, GvError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| GvError::Format(format!("invalid value for {name}: '{value}'")))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn raw(query_from: u64, query_to: u64) -> RawHsp {
        RawHsp {
            query_from,
            query_to,
            hit_alignment: "MKVLLAGHWPQRST".to_string(),
            query_alignment: "MKVLLAGHWPQRST".to_string(),
            align_len: 14,
            identity: 7,
            ..RawHsp::default()
        }
    }

    #[test]
    fn nucleotide_query_coordinates_are_converted() {
        let hsp = finish_hsp(raw(4, 42), SequenceKind::Nucleotide).unwrap();
        assert_eq!((hsp.query_from, hsp.query_to), (2, 15));
        assert_eq!(hsp.pidentity, Some(50.0));

        let hsp = finish_hsp(raw(4, 42), SequenceKind::Protein).unwrap();
        assert_eq!((hsp.query_from, hsp.query_to), (4, 42));
    }

    #[test]
    fn nucleotide_alignment_is_rejected() {
        let mut hsp = raw(1, 10);
        hsp.hit_alignment = "ACGTACGTACGTACGT".to_string();
        let err = finish_hsp(hsp, SequenceKind::Protein).unwrap_err();
        assert_matches!(err, GvError::SequenceType(_));
    }

    #[test]
    fn short_alignment_is_not_taken_for_protein() {
        let mut hsp = raw(1, 2);
        hsp.query_alignment = "MK".to_string();
        let err = finish_hsp(hsp, SequenceKind::Protein).unwrap_err();
        assert_matches!(err, GvError::SequenceType(message) if message.starts_with("query"));
    }

    #[test]
    fn missing_alignment_text_is_accepted() {
        let mut hsp = raw(1, 10);
        hsp.hit_alignment.clear();
        hsp.query_alignment.clear();
        assert!(finish_hsp(hsp, SequenceKind::Protein).is_ok());
    }

    #[test]
    fn reported_identity_survives_a_missing_alignment_length() {
        let mut hsp = raw(1, 10);
        hsp.align_len = 0;
        hsp.pidentity = Some(100.0);
        let hsp = finish_hsp(hsp, SequenceKind::Protein).unwrap();
        assert_eq!(hsp.pidentity, Some(100.0));
    }
}
