use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::error::GvError;
use crate::fs_util;
use crate::report::{QueryReport, RunSummary};

#[derive(Debug, Clone)]
pub struct OutputStore {
    root: Utf8PathBuf,
    document_name: String,
}

impl OutputStore {
    /// `output_dir` defaults to `<input>.gv` next to the input.
    pub fn new(input: &Path, output_dir: Option<&Path>) -> Result<Self, GvError> {
        let input = Utf8PathBuf::from_path_buf(input.to_path_buf())
            .map_err(|path| GvError::Filesystem(format!("non UTF-8 path: {}", path.display())))?;
        let file_name = input
            .file_name()
            .ok_or_else(|| GvError::Filesystem(format!("input path has no file name: {input}")))?;

        let root = match output_dir {
            Some(dir) => Utf8PathBuf::from_path_buf(dir.to_path_buf()).map_err(|path| {
                GvError::Filesystem(format!("non UTF-8 path: {}", path.display()))
            })?,
            None => Utf8PathBuf::from(format!("{input}.gv")),
        };
        Ok(Self {
            document_name: format!("{file_name}.json"),
            root,
        })
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn fragments_dir(&self) -> Utf8PathBuf {
        self.root.join("fragments")
    }

    pub fn fragment_path(&self, index: usize) -> Utf8PathBuf {
        self.fragments_dir().join(format!("{index}.json"))
    }

    pub fn document_path(&self) -> Utf8PathBuf {
        self.root.join(&self.document_name)
    }

    pub fn summary_path(&self) -> Utf8PathBuf {
        self.root.join("summary.json")
    }

    pub fn prepare(&self, start_index: usize) -> Result<(), GvError> {
        if self.root.as_std_path().exists() && start_index <= 1 {
            return Err(GvError::OutputExists(self.root.clone().into_std_path_buf()));
        }
        fs::create_dir_all(self.fragments_dir().as_std_path())
            .map_err(|err| GvError::Filesystem(format!("{}: {err}", self.root)))
    }

    pub fn write_fragment(&self, report: &QueryReport) -> Result<(), GvError> {
        fs_util::write_json_atomic(self.fragment_path(report.index).as_std_path(), report)
    }

    pub fn load_fragments(&self) -> Result<Vec<QueryReport>, GvError> {
        let dir = self.fragments_dir();
        let entries = match fs::read_dir(dir.as_std_path()) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(GvError::Filesystem(format!("{dir}: {err}"))),
        };

        let mut reports = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| GvError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let content = fs::read_to_string(&path)
                .map_err(|err| GvError::Filesystem(format!("{}: {err}", path.display())))?;
            let report: QueryReport = serde_json::from_str(&content)
                .map_err(|err| GvError::Format(format!("{}: {err}", path.display())))?;
            reports.push(report);
        }
        reports.sort_by_key(|report| report.index);
        Ok(reports)
    }

    /// Merges all fragments into the identifier-keyed document. Later queries
    /// win when two share an identifier.
    pub fn write_document(&self) -> Result<BTreeMap<String, QueryReport>, GvError> {
        let document = self
            .load_fragments()?
            .into_iter()
            .map(|report| (report.identifier.clone(), report))
            .collect::<BTreeMap<_, _>>();
        fs_util::write_json_atomic(self.document_path().as_std_path(), &document)?;
        debug!(queries = document.len(), path = %self.document_path(), "report document written");
        Ok(document)
    }

    pub fn write_summary(&self, summary: &RunSummary) -> Result<(), GvError> {
        fs_util::write_json_atomic(self.summary_path().as_std_path(), summary)
    }
}
