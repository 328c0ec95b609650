use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

use crate::domain::{SequenceKind, SequenceRecord};
use crate::error::GvError;
use crate::fs_util::find_in_path;
use crate::homology::StructuredReader;

pub const EVALUE: &str = "1e-5";
pub const MAX_TARGET_SEQS: u32 = 200;
pub const GAP_OPEN: u32 = 11;
pub const GAP_EXTEND: u32 = 1;

pub trait SearchRunner: Send + Sync {
    /// Hits of `query_fasta`, a single FASTA record of kind `kind`.
    fn search(&self, query_fasta: &str, kind: SequenceKind) -> Result<Vec<SequenceRecord>, GvError>;
}

/// Runs `blastp` (protein queries) or `blastx` (nucleotide queries) from `PATH`.
#[derive(Debug, Clone)]
pub struct BlastCli {
    blastp: Option<PathBuf>,
    blastx: Option<PathBuf>,
    db: String,
    threads: usize,
}

impl BlastCli {
    /// `db` is the database name optionally followed by extra BLAST flags,
    /// e.g. `"swissprot -remote"`.
    pub fn new(db: impl Into<String>, threads: usize) -> Self {
        Self {
            blastp: find_in_path("blastp"),
            blastx: find_in_path("blastx"),
            db: db.into(),
            threads,
        }
    }

    pub fn is_remote(&self) -> bool {
        self.db.contains("remote")
    }

    fn program(&self, kind: SequenceKind) -> Result<&Path, GvError> {
        let (program, name) = match kind {
            SequenceKind::Protein => (&self.blastp, "blastp"),
            SequenceKind::Nucleotide => (&self.blastx, "blastx"),
        };
        program
            .as_deref()
            .ok_or_else(|| GvError::MissingTool(name.to_string()))
    }

    pub fn args(&self) -> Vec<String> {
        let mut db_tokens = self.db.split_whitespace();
        let mut args = vec![
            "-db".to_string(),
            db_tokens.next().unwrap_or_default().to_string(),
        ];
        args.extend(db_tokens.map(str::to_string));
        args.extend([
            "-evalue".to_string(),
            EVALUE.to_string(),
            "-outfmt".to_string(),
            "5".to_string(),
            "-max_target_seqs".to_string(),
            MAX_TARGET_SEQS.to_string(),
            "-gapopen".to_string(),
            GAP_OPEN.to_string(),
            "-gapextend".to_string(),
            GAP_EXTEND.to_string(),
        ]);
        // remote databases reject -num_threads
        if !self.is_remote() {
            args.push("-num_threads".to_string());
            args.push(self.threads.to_string());
        }
        args
    }

    fn run_cmd(&self, program: &Path, stdin: &str) -> Result<String, GvError> {
        let mut child = Command::new(program)
            .args(self.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| GvError::SearchFailed(format!("{}: {err}", program.display())))?;
        if let Some(mut input) = child.stdin.take() {
            input
                .write_all(stdin.as_bytes())
                .map_err(|err| GvError::SearchFailed(err.to_string()))?;
        }
        let output = child
            .wait_with_output()
            .map_err(|err| GvError::SearchFailed(err.to_string()))?;
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("command failed: {}", program.display())
        } else {
            stderr
        };
        Err(GvError::SearchFailed(message))
    }
}

impl SearchRunner for BlastCli {
    fn search(&self, query_fasta: &str, kind: SequenceKind) -> Result<Vec<SequenceRecord>, GvError> {
        let program = self.program(kind)?;
        debug!(program = %program.display(), db = %self.db, "running homology search");
        let xml = self.run_cmd(program, query_fasta)?;
        if xml.trim().is_empty() {
            return Err(GvError::SearchFailed(
                "BLAST produced no output; check that the database exists".to_string(),
            ));
        }
        let mut reader = StructuredReader::from_xml(xml, kind);
        Ok(reader.next_query()?.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn local_database_gets_thread_count() {
        let blast = BlastCli::new("/db/nr", 4);
        let args = blast.args();
        assert_eq!(&args[..2], &["-db".to_string(), "/db/nr".to_string()]);
        assert!(args.ends_with(&["-num_threads".to_string(), "4".to_string()]));
    }

    #[test]
    fn remote_database_flags_are_passed_through() {
        let blast = BlastCli::new("swissprot -remote", 4);
        let args = blast.args();
        assert_eq!(&args[..3], &["-db", "swissprot", "-remote"].map(str::to_string));
        assert!(!args.contains(&"-num_threads".to_string()));
    }

    #[test]
    fn missing_program_is_reported() {
        let blast = BlastCli {
            blastp: None,
            blastx: None,
            db: "nr".to_string(),
            threads: 1,
        };
        let err = blast.search(">q\nMKV\n", SequenceKind::Nucleotide).unwrap_err();
        assert_matches!(err, GvError::MissingTool(tool) if tool == "blastx");
    }
}
