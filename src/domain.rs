use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SequenceKind {
    Nucleotide,
    Protein,
}

impl fmt::Display for SequenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequenceKind::Nucleotide => write!(f, "nucleotide"),
            SequenceKind::Protein => write!(f, "protein"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceRecord {
    pub identifier: String,
    pub accession: String,
    pub definition: String,
    pub kind: SequenceKind,
    /// Length in protein residues; nucleotide lengths are divided by 3.
    pub length: u64,
    pub raw_sequence: Option<String>,
    pub hsps: Vec<HspRecord>,
}

impl SequenceRecord {
    pub fn new(identifier: impl Into<String>, kind: SequenceKind, length: u64) -> Self {
        let identifier = identifier.into();
        Self {
            accession: identifier.clone(),
            definition: identifier.clone(),
            identifier,
            kind,
            length,
            raw_sequence: None,
            hsps: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HspRecord {
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
    /// `None` when `align_len` is zero; consumers must read it as low identity.
    pub pidentity: Option<f64>,
}

impl HspRecord {
    pub fn percent_identity(identity: u64, align_len: u64) -> Option<f64> {
        if align_len == 0 {
            return None;
        }
        Some(100.0 * identity as f64 / align_len as f64)
    }
}

/// Maps a nucleotide query coordinate into protein space.
pub fn nucleotide_to_protein(pos: u64) -> u64 {
    pos / 3 + 1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationState {
    Success,
    Warning,
    Error,
    Unapplicable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Answer {
    Yes,
    No,
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Answer::Yes => write!(f, "yes"),
            Answer::No => write!(f, "no"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    AlignerMissing,
    NoInternet,
    NotEnoughEvidence,
    Internal(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub alias: String,
    pub header: String,
    pub state: ValidationState,
    pub result: Option<Answer>,
    pub expected: Answer,
    pub message: String,
    #[serde(default)]
    pub causes: Vec<FailureCause>,
    #[serde(with = "duration_secs")]
    pub running_time: Duration,
}

impl ValidationOutcome {
    /// A computed verdict: `Success` when it matches the expectation, `Warning` otherwise.
    pub fn verdict(
        alias: &str,
        header: &str,
        result: Answer,
        expected: Answer,
        message: impl Into<String>,
    ) -> Self {
        let state = if result == expected {
            ValidationState::Success
        } else {
            ValidationState::Warning
        };
        Self {
            alias: alias.to_string(),
            header: header.to_string(),
            state,
            result: Some(result),
            expected,
            message: message.into(),
            causes: Vec::new(),
            running_time: Duration::ZERO,
        }
    }

    pub fn unapplicable(
        alias: &str,
        header: &str,
        expected: Answer,
        message: impl Into<String>,
    ) -> Self {
        Self {
            alias: alias.to_string(),
            header: header.to_string(),
            state: ValidationState::Unapplicable,
            result: None,
            expected,
            message: message.into(),
            causes: vec![FailureCause::NotEnoughEvidence],
            running_time: Duration::ZERO,
        }
    }

    pub fn error(alias: &str, header: &str, expected: Answer, cause: FailureCause) -> Self {
        let message = match &cause {
            FailureCause::AlignerMissing => "multiple alignment tool not available".to_string(),
            FailureCause::NoInternet => "sequence lookup service unreachable".to_string(),
            FailureCause::NotEnoughEvidence => "not enough evidence".to_string(),
            FailureCause::Internal(msg) => msg.clone(),
        };
        Self {
            alias: alias.to_string(),
            header: header.to_string(),
            state: ValidationState::Error,
            result: None,
            expected,
            message,
            causes: vec![cause],
            running_time: Duration::ZERO,
        }
    }

    pub fn with_running_time(mut self, running_time: Duration) -> Self {
        self.running_time = running_time;
        self
    }

    pub fn is_success(&self) -> bool {
        self.result == Some(self.expected)
    }
}

pub(crate) mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO))
    }
}
