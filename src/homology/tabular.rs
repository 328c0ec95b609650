use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use csv::{ReaderBuilder, StringRecord};

use crate::domain::{SequenceKind, SequenceRecord};
use crate::error::GvError;
use crate::homology::{RawHsp, finish_hsp, open_results, parse_field};

pub const DEFAULT_COLUMNS: &str =
    "qseqid sseqid sacc slen qstart qend sstart send length qframe pident nident evalue qseq sseq";

const REQUIRED_COLUMNS: [&str; 7] = ["qseqid", "sseqid", "qstart", "qend", "sstart", "send", "evalue"];

/// Columns BLAST emits for the `std` keyword.
const STD_COLUMNS: [&str; 12] = [
    "qseqid", "sseqid", "pident", "length", "mismatch", "gapopen", "qstart", "qend", "sstart",
    "send", "evalue", "bitscore",
];

/// Column names in file order. Unknown names are kept so positions line up,
/// their values are simply ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    columns: Vec<String>,
}

impl ColumnLayout {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }
}

impl Default for ColumnLayout {
    fn default() -> Self {
        Self {
            columns: DEFAULT_COLUMNS.split_whitespace().map(str::to_string).collect(),
        }
    }
}

impl FromStr for ColumnLayout {
    type Err = GvError;

    /// Accepts the string given to BLAST's `-outfmt`, with or without the
    /// leading format number, e.g. `"6 std qlen"` or `"qseqid sseqid ..."`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut tokens = value.split_whitespace().peekable();
        if tokens
            .peek()
            .is_some_and(|token| token.chars().all(|ch| ch.is_ascii_digit()))
        {
            tokens.next();
        }

        let mut columns = Vec::new();
        for token in tokens {
            if token == "std" {
                columns.extend(STD_COLUMNS.iter().map(|column| column.to_string()));
            } else {
                columns.push(token.to_string());
            }
        }

        let missing = REQUIRED_COLUMNS
            .iter()
            .filter(|required| !columns.iter().any(|column| column == *required))
            .copied()
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(GvError::InvalidColumnLayout(format!(
                "'{value}' lacks required column(s): {}",
                missing.join(" ")
            )));
        }
        Ok(Self { columns })
    }
}

/// Resolved column positions, looked up once per file.
struct Positions {
    width: usize,
    qseqid: usize,
    sseqid: usize,
    qstart: usize,
    qend: usize,
    sstart: usize,
    send: usize,
    evalue: usize,
    sacc: Option<usize>,
    slen: Option<usize>,
    length: Option<usize>,
    qframe: Option<usize>,
    pident: Option<usize>,
    nident: Option<usize>,
    qseq: Option<usize>,
    sseq: Option<usize>,
}

impl Positions {
    fn resolve(layout: &ColumnLayout) -> Result<Self, GvError> {
        let required = |name: &str| {
            layout.position(name).ok_or_else(|| {
                GvError::InvalidColumnLayout(format!("missing required column '{name}'"))
            })
        };
        Ok(Self {
            width: layout.columns.len(),
            qseqid: required("qseqid")?,
            sseqid: required("sseqid")?,
            qstart: required("qstart")?,
            qend: required("qend")?,
            sstart: required("sstart")?,
            send: required("send")?,
            evalue: required("evalue")?,
            sacc: layout.position("sacc"),
            slen: layout.position("slen"),
            length: layout.position("length"),
            qframe: layout.position("qframe"),
            pident: layout.position("pident"),
            nident: layout.position("nident"),
            qseq: layout.position("qseq"),
            sseq: layout.position("sseq"),
        })
    }
}

/// All rows of a tabular result file, grouped by query and then by hit.
#[derive(Debug)]
pub struct ColumnarReader {
    queries: HashMap<String, Vec<SequenceRecord>>,
}

impl ColumnarReader {
    pub fn open(path: &Path, layout: ColumnLayout, kind: SequenceKind) -> Result<Self, GvError> {
        let positions = Positions::resolve(&layout)?;
        let source = open_results(path)?;
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .comment(Some(b'#'))
            .quoting(false)
            .flexible(true)
            .from_reader(source);

        let mut queries: HashMap<String, Vec<SequenceRecord>> = HashMap::new();
        let mut rows = 0usize;
        let mut record = StringRecord::new();
        loop {
            let more = reader
                .read_record(&mut record)
                .map_err(|err| GvError::Format(format!("tabular results: {err}")))?;
            if !more {
                break;
            }
            if record.iter().all(|field| field.trim().is_empty()) {
                continue;
            }
            rows += 1;
            if record.len() < positions.width {
                return Err(GvError::Format(format!(
                    "tabular row {rows} has {} field(s), the column layout expects {}",
                    record.len(),
                    positions.width
                )));
            }

            let (query, hit_id, hit) = read_row(&record, &positions, kind)?;
            let hits = queries.entry(query).or_default();
            match hits.iter_mut().find(|existing| existing.identifier == hit_id) {
                Some(existing) => existing.hsps.extend(hit.hsps),
                None => hits.push(hit),
            }
        }

        if rows == 0 {
            return Err(GvError::Format(
                "no tabular result rows found".to_string(),
            ));
        }
        Ok(Self { queries })
    }

    /// Number of hits recorded for `identifier`, without consuming them.
    pub fn peek_count(&self, identifier: &str) -> usize {
        self.queries.get(identifier).map_or(0, Vec::len)
    }

    /// Takes the hits of `identifier`; empty when the query had no rows.
    pub fn hits_for(&mut self, identifier: &str) -> Vec<SequenceRecord> {
        self.queries.remove(identifier).unwrap_or_default()
    }
}

fn read_row(
    record: &StringRecord,
    at: &Positions,
    kind: SequenceKind,
) -> Result<(String, String, SequenceRecord), GvError> {
    let field = |index: usize| record.get(index).unwrap_or_default().trim();
    let optional = |index: Option<usize>| index.map(field).filter(|value| !value.is_empty());

    let query = field(at.qseqid).to_string();
    let hit_id = field(at.sseqid).to_string();

    let mut raw = RawHsp {
        evalue: parse_field("evalue", field(at.evalue))?,
        query_from: parse_field("qstart", field(at.qstart))?,
        query_to: parse_field("qend", field(at.qend))?,
        hit_from: parse_field("sstart", field(at.sstart))?,
        hit_to: parse_field("send", field(at.send))?,
        ..RawHsp::default()
    };
    if let Some(value) = optional(at.length) {
        raw.align_len = parse_field("length", value)?;
    }
    if let Some(value) = optional(at.qframe) {
        raw.query_frame = parse_field("qframe", value)?;
    }
    if let Some(value) = optional(at.pident) {
        raw.pidentity = Some(parse_field("pident", value)?);
    }
    match optional(at.nident) {
        Some(value) => raw.identity = parse_field("nident", value)?,
        None => {
            if let Some(pident) = raw.pidentity {
                raw.identity = (pident * raw.align_len as f64 / 100.0).round() as u64;
            }
        }
    }
    if let Some(value) = optional(at.qseq) {
        raw.query_alignment = value.to_string();
    }
    if let Some(value) = optional(at.sseq) {
        raw.hit_alignment = value.to_string();
    }

    let length = match optional(at.slen) {
        Some(value) => parse_field("slen", value)?,
        None => 0,
    };
    let accession = optional(at.sacc).unwrap_or(hit_id.as_str()).to_string();

    let hit = SequenceRecord {
        identifier: hit_id.clone(),
        accession,
        definition: hit_id.clone(),
        kind: SequenceKind::Protein,
        length,
        raw_sequence: None,
        hsps: vec![finish_hsp(raw, kind)?],
    };
    Ok((query, hit_id, hit))
}
