use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::domain::{SequenceKind, SequenceRecord};
use crate::error::GvError;
use crate::fs_util;

static HEADER_DESCRIPTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(>\S*)[^\n]*").expect("valid header regex"));

/// Byte offsets of every record start plus a trailing sentinel equal to the
/// file length, so `offsets[i + 1] - offsets[i]` is the span of record `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaIndex {
    offsets: Vec<u64>,
}

impl FastaIndex {
    pub fn build(content: &[u8]) -> Result<Self, GvError> {
        let mut offsets = content
            .iter()
            .enumerate()
            .filter(|(i, byte)| **byte == b'>' && (*i == 0 || content[*i - 1] == b'\n'))
            .map(|(i, _)| i as u64)
            .collect::<Vec<_>>();
        if offsets.is_empty() {
            return Err(GvError::Format(
                "no FASTA record markers ('>') found".to_string(),
            ));
        }
        offsets.push(content.len() as u64);
        Ok(Self { offsets })
    }

    pub fn from_path(path: &Path) -> Result<Self, GvError> {
        if !path.is_file() {
            return Err(GvError::FileNotFound(path.to_path_buf()));
        }
        let content =
            fs::read(path).map_err(|err| GvError::Filesystem(format!("{}: {err}", path.display())))?;
        Self::build(&content)
    }

    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    /// `[start, end)` byte span of record `i` (zero-based).
    pub fn span(&self, i: usize) -> Option<(u64, u64)> {
        if i >= self.len() {
            return None;
        }
        Some((self.offsets[i], self.offsets[i + 1]))
    }

    pub fn read_record(&self, path: &Path, i: usize) -> Result<String, GvError> {
        let (start, end) = self
            .span(i)
            .ok_or_else(|| GvError::Format(format!("record {i} is outside the index")))?;
        read_span(path, start, end)
    }
}

fn read_span(path: &Path, start: u64, end: u64) -> Result<String, GvError> {
    let mut file =
        File::open(path).map_err(|err| GvError::Filesystem(format!("{}: {err}", path.display())))?;
    file.seek(SeekFrom::Start(start))
        .map_err(|err| GvError::Filesystem(err.to_string()))?;
    let mut buf = vec![0u8; (end - start) as usize];
    file.read_exact(&mut buf)
        .map_err(|err| GvError::Filesystem(format!("{}: {err}", path.display())))?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

pub fn parse_prediction(record: &str, kind: SequenceKind) -> Result<SequenceRecord, GvError> {
    let mut lines = record.lines();
    let header = lines
        .next()
        .and_then(|line| line.strip_prefix('>'))
        .ok_or_else(|| GvError::Format("FASTA record without a '>' header line".to_string()))?;
    let definition = header.trim_end_matches('\r').to_string();
    let identifier = definition
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string();

    let raw_sequence = lines
        .flat_map(|line| line.chars())
        .filter(|ch| ch.is_ascii_alphabetic())
        .collect::<String>();

    let mut length = raw_sequence.len() as u64;
    if kind == SequenceKind::Nucleotide {
        length /= 3;
    }

    Ok(SequenceRecord {
        accession: identifier.clone(),
        identifier,
        definition,
        kind,
        length,
        raw_sequence: Some(raw_sequence),
        hsps: Vec::new(),
    })
}

/// Identifier → byte span lookup over the companion raw-sequence file.
#[derive(Debug, Clone)]
pub struct RawSequenceIndex {
    path: PathBuf,
    spans: BTreeMap<String, [u64; 2]>,
}

impl RawSequenceIndex {
    pub fn index_path(path: &Path) -> PathBuf {
        let mut name: OsString = path.as_os_str().to_owned();
        name.push(".idx");
        PathBuf::from(name)
    }

    /// Truncates header lines to bare identifiers (rewriting the file), indexes
    /// the records and persists the mapping next to the file.
    pub fn build(path: &Path) -> Result<Self, GvError> {
        if !path.is_file() {
            return Err(GvError::FileNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)
            .map_err(|err| GvError::Filesystem(format!("{}: {err}", path.display())))?;
        let content = HEADER_DESCRIPTION.replace_all(&content, "$1").into_owned();
        fs_util::write_bytes_atomic(path, content.as_bytes())?;

        let index = FastaIndex::build(content.as_bytes()).map_err(|_| {
            GvError::Format(format!(
                "raw sequence file {} is not FASTA",
                path.display()
            ))
        })?;

        let mut spans = BTreeMap::new();
        for i in 0..index.len() {
            let (start, end) = index.span(i).unwrap_or_default();
            let header = content[start as usize..end as usize]
                .lines()
                .next()
                .unwrap_or_default();
            let identifier = header.trim_start_matches('>').trim().to_string();
            spans.insert(identifier, [start, end]);
        }

        let index_path = Self::index_path(path);
        fs_util::write_json_atomic(&index_path, &spans)?;
        debug!(records = spans.len(), index = %index_path.display(), "indexed raw sequences");

        Ok(Self {
            path: path.to_path_buf(),
            spans,
        })
    }

    pub fn load(path: &Path) -> Result<Self, GvError> {
        let index_path = Self::index_path(path);
        let content = fs::read_to_string(&index_path)
            .map_err(|_| GvError::FileNotFound(index_path.clone()))?;
        let spans: BTreeMap<String, [u64; 2]> = serde_json::from_str(&content)
            .map_err(|err| GvError::Format(format!("{}: {err}", index_path.display())))?;
        Ok(Self {
            path: path.to_path_buf(),
            spans,
        })
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn span(&self, identifier: &str) -> Option<(u64, u64)> {
        self.spans.get(identifier).map(|[start, end]| (*start, *end))
    }

    pub fn sequence(&self, identifier: &str) -> Result<Option<String>, GvError> {
        let Some((start, end)) = self.span(identifier) else {
            return Ok(None);
        };
        let record = read_span(&self.path, start, end)?;
        let residues = record
            .lines()
            .skip(1)
            .flat_map(|line| line.chars())
            .filter(|ch| ch.is_ascii_alphabetic() || *ch == '*')
            .collect::<String>();
        Ok(Some(residues))
    }
}
