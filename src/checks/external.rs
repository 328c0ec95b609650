use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::GvError;
use crate::fs_util::find_in_path;

/// One FASTA entry: identifier and residues (with `-` gaps once aligned).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaEntry {
    pub identifier: String,
    pub residues: String,
}

impl FastaEntry {
    pub fn new(identifier: impl Into<String>, residues: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            residues: residues.into(),
        }
    }
}

pub trait Aligner: Send + Sync {
    /// Multiple alignment of `entries`, returned in input order.
    fn align(&self, entries: &[FastaEntry]) -> Result<Vec<FastaEntry>, GvError>;
}

pub trait SequenceFetcher: Send + Sync {
    /// Protein residues of the database entry `accession`.
    fn fetch(&self, accession: &str) -> Result<String, GvError>;
}

#[derive(Debug, Clone)]
pub struct MafftAligner {
    mafft: Option<PathBuf>,
}

impl MafftAligner {
    pub fn new() -> Self {
        Self {
            mafft: find_in_path("mafft"),
        }
    }

    pub fn with_program(program: Option<PathBuf>) -> Self {
        Self { mafft: program }
    }

    pub fn is_available(&self) -> bool {
        self.mafft.is_some()
    }

    fn run(&self, program: &Path, input: &Path) -> Result<String, GvError> {
        let output = Command::new(program)
            .args(["--quiet", "--thread", "1"])
            .arg(input)
            .output()
            .map_err(|err| GvError::AlignmentFailed(err.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("command failed: {}", program.display())
            } else {
                stderr
            };
            return Err(GvError::AlignmentFailed(message));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for MafftAligner {
    fn default() -> Self {
        Self::new()
    }
}

impl Aligner for MafftAligner {
    fn align(&self, entries: &[FastaEntry]) -> Result<Vec<FastaEntry>, GvError> {
        let program = self
            .mafft
            .as_ref()
            .ok_or_else(|| GvError::MissingTool("mafft".to_string()))?;

        let mut input = NamedTempFile::new().map_err(|err| GvError::Filesystem(err.to_string()))?;
        // mafft keeps only the first header token, so entries are renamed by position.
        for (i, entry) in entries.iter().enumerate() {
            writeln!(input, ">{i}\n{}", entry.residues)
                .map_err(|err| GvError::Filesystem(err.to_string()))?;
        }
        input
            .flush()
            .map_err(|err| GvError::Filesystem(err.to_string()))?;

        let aligned = parse_fasta(&self.run(program, input.path())?);
        if aligned.len() != entries.len() {
            return Err(GvError::AlignmentFailed(format!(
                "expected {} aligned sequences, got {}",
                entries.len(),
                aligned.len()
            )));
        }
        Ok(aligned
            .into_iter()
            .zip(entries)
            .map(|(aligned, entry)| FastaEntry::new(entry.identifier.clone(), aligned.residues))
            .collect())
    }
}

pub fn parse_fasta(text: &str) -> Vec<FastaEntry> {
    let mut entries: Vec<FastaEntry> = Vec::new();
    for line in text.lines() {
        let line = line.trim_end();
        if let Some(header) = line.strip_prefix('>') {
            let identifier = header.split_whitespace().next().unwrap_or_default();
            entries.push(FastaEntry::new(identifier, String::new()));
        } else if let Some(current) = entries.last_mut() {
            current.residues.push_str(line.trim());
        }
    }
    entries
}

#[derive(Clone)]
pub struct NcbiHttpClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl NcbiHttpClient {
    pub fn new() -> Result<Self, GvError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("genevalidator/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| GvError::NcbiHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| GvError::NcbiHttp(err.to_string()))?;

        let api_key = std::env::var("NCBI_API_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        Ok(Self {
            client,
            base_url: "https://eutils.ncbi.nlm.nih.gov/entrez/eutils".to_string(),
            api_key,
        })
    }

    fn efetch_url(&self) -> String {
        format!("{}/efetch.fcgi", self.base_url)
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, GvError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "NCBI request failed".to_string());
        Err(GvError::NcbiStatus { status, message })
    }
}

impl SequenceFetcher for NcbiHttpClient {
    fn fetch(&self, accession: &str) -> Result<String, GvError> {
        let url = self.efetch_url();
        let mut query = vec![
            ("db", "protein"),
            ("id", accession),
            ("rettype", "fasta"),
            ("retmode", "text"),
        ];
        if let Some(key) = self.api_key.as_deref() {
            query.push(("api_key", key));
        }

        let response = with_backoff(&RETRY_DELAYS, || {
            match self.client.get(&url).query(&query).send() {
                Ok(resp) if is_retryable_status(resp.status().as_u16()) => Attempt::Retry(Ok(resp)),
                Err(err) if is_retryable_error(&err) => Attempt::Retry(Err(err)),
                other => Attempt::Done(other),
            }
        })
        .map_err(|err| GvError::NcbiHttp(err.to_string()))?;
        let response = Self::handle_status(response)?;
        let text = response
            .text()
            .map_err(|err| GvError::NcbiHttp(err.to_string()))?;

        parse_fasta(&text)
            .into_iter()
            .next()
            .map(|entry| entry.residues)
            .filter(|residues| !residues.is_empty())
            .ok_or_else(|| GvError::NcbiHttp(format!("no sequence returned for {accession}")))
    }
}

const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_millis(350),
    Duration::from_millis(700),
    Duration::from_millis(1050),
];

enum Attempt<T> {
    Done(T),
    Retry(T),
}

/// Calls `attempt` until it is done, sleeping through `delays` in turn.
/// Once the delays run out the last result is returned as is.
fn with_backoff<T>(delays: &[Duration], mut attempt: impl FnMut() -> Attempt<T>) -> T {
    for (round, delay) in delays.iter().enumerate() {
        match attempt() {
            Attempt::Done(value) => return value,
            Attempt::Retry(_) => {
                debug!(round, "retrying after {delay:?}");
                thread::sleep(*delay);
            }
        }
    }
    match attempt() {
        Attempt::Done(value) | Attempt::Retry(value) => value,
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
