use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::GvError;

pub const DEFAULT_CONFIG_FILE: &str = "genevalidator.json";
pub const DEFAULT_DATABASE: &str = "swissprot -remote";

/// Contents of `genevalidator.json`. Every field is optional; command-line
/// flags take precedence.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub validations: Option<ValidationsEntry>,
    #[serde(default)]
    pub results: Option<PathBuf>,
    #[serde(default)]
    pub columns: Option<String>,
    #[serde(default)]
    pub db: Option<String>,
    #[serde(default)]
    pub threads: Option<usize>,
    #[serde(default)]
    pub parallel: Option<bool>,
    #[serde(default)]
    pub start_index: Option<usize>,
    #[serde(default)]
    pub raw_sequences: Option<PathBuf>,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ValidationsEntry {
    Shorthand(String),
    List(Vec<String>),
}

impl ValidationsEntry {
    fn into_list(self) -> Vec<String> {
        match self {
            ValidationsEntry::Shorthand(value) => vec![value],
            ValidationsEntry::List(values) => values,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub validations: Vec<String>,
    pub results: Option<PathBuf>,
    pub columns: Option<String>,
    pub db: Option<String>,
    pub threads: Option<usize>,
    pub parallel: Option<bool>,
    pub start_index: Option<usize>,
    pub raw_sequences: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultSourceConfig {
    /// Precomputed BLAST output, XML or tabular.
    File {
        path: PathBuf,
        columns: Option<String>,
    },
    /// Run BLAST per query against `db`.
    LiveSearch { db: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub input: PathBuf,
    pub validations: Vec<String>,
    pub source: ResultSourceConfig,
    pub threads: usize,
    pub parallel: bool,
    /// One-based index of the first query to validate.
    pub start_index: usize,
    pub raw_sequences: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
}

impl RunConfig {
    pub fn new(input: impl Into<PathBuf>, source: ResultSourceConfig) -> Self {
        Self {
            input: input.into(),
            validations: vec!["all".to_string()],
            source,
            threads: default_threads(),
            parallel: false,
            start_index: 1,
            raw_sequences: None,
            output_dir: None,
        }
    }
}

pub fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads the config file. Without an explicit path a missing
    /// `genevalidator.json` just means defaults.
    pub fn resolve(path: Option<&Path>) -> Result<Config, GvError> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| GvError::ConfigRead(config_path.clone()))?;
        serde_json::from_str(&content).map_err(|err| GvError::ConfigParse(err.to_string()))
    }

    pub fn resolve_config(
        input: PathBuf,
        config: Config,
        overrides: ConfigOverrides,
    ) -> Result<RunConfig, GvError> {
        let validations = if overrides.validations.is_empty() {
            config
                .validations
                .map(ValidationsEntry::into_list)
                .unwrap_or_else(|| vec!["all".to_string()])
        } else {
            overrides.validations
        };

        let source = match overrides.results.or(config.results) {
            Some(path) => ResultSourceConfig::File {
                path,
                columns: overrides.columns.or(config.columns),
            },
            None => ResultSourceConfig::LiveSearch {
                db: overrides
                    .db
                    .or(config.db)
                    .unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            },
        };

        let threads = overrides
            .threads
            .or(config.threads)
            .unwrap_or_else(default_threads);
        if threads == 0 {
            return Err(GvError::ConfigParse(
                "threads must be at least 1".to_string(),
            ));
        }

        let start_index = overrides.start_index.or(config.start_index).unwrap_or(1);
        if start_index == 0 {
            return Err(GvError::ConfigParse(
                "start index counts from 1".to_string(),
            ));
        }

        Ok(RunConfig {
            input,
            validations,
            source,
            threads,
            parallel: overrides.parallel.or(config.parallel).unwrap_or(threads > 1),
            start_index,
            raw_sequences: overrides.raw_sequences.or(config.raw_sequences),
            output_dir: overrides.output_dir.or(config.output_dir),
        })
    }
}
