use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use gene_validator::checks::{MafftAligner, NcbiHttpClient, SequenceFetcher};
use gene_validator::config::{ConfigLoader, ConfigOverrides};
use gene_validator::error::GvError;
use gene_validator::validation::{Collaborators, RunReport, Validator};

#[derive(Parser)]
#[command(name = "genevalidator")]
#[command(about = "Identify problems with predicted genes using similar database sequences")]
#[command(version, author)]
struct Cli {
    /// FASTA file of predicted genes or proteins
    input: PathBuf,

    /// Validation aliases to run, e.g. "lenc lenr" (default: all)
    #[arg(short = 'x', long = "validations", num_args = 1..)]
    validations: Vec<String>,

    /// Precomputed BLAST results (XML or tabular, optionally gzipped)
    #[arg(short, long)]
    results: Option<PathBuf>,

    /// Column layout of tabular results, e.g. "qseqid sseqid ... evalue"
    #[arg(long)]
    columns: Option<String>,

    /// Database for live searches, optionally followed by BLAST flags
    #[arg(short, long)]
    db: Option<String>,

    #[arg(short = 'n', long)]
    threads: Option<usize>,

    #[arg(long, overrides_with = "no_parallel")]
    parallel: bool,

    #[arg(long)]
    no_parallel: bool,

    /// One-based index of the first query to validate
    #[arg(short, long = "start")]
    start: Option<usize>,

    /// FASTA file with the raw hit sequences
    #[arg(long)]
    raw_sequences: Option<PathBuf>,

    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        let parallel = match (self.parallel, self.no_parallel) {
            (true, _) => Some(true),
            (false, true) => Some(false),
            (false, false) => None,
        };
        ConfigOverrides {
            validations: self.validations.clone(),
            results: self.results.clone(),
            columns: self.columns.clone(),
            db: self.db.clone(),
            threads: self.threads,
            parallel,
            start_index: self.start,
            raw_sequences: self.raw_sequences.clone(),
            output_dir: self.output_dir.clone(),
        }
    }
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<GvError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &GvError) -> u8 {
    match error {
        GvError::Format(_)
        | GvError::SequenceType(_)
        | GvError::FileNotFound(_)
        | GvError::OutputExists(_)
        | GvError::ConfigRead(_)
        | GvError::ConfigParse(_)
        | GvError::InvalidColumnLayout(_)
        | GvError::AliasDuplication(_)
        | GvError::NoValidation(_) => 2,
        GvError::MissingTool(_)
        | GvError::SearchFailed(_)
        | GvError::AlignmentFailed(_)
        | GvError::NcbiHttp(_)
        | GvError::NcbiStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let file_config = ConfigLoader::resolve(cli.config.as_deref())?;
    let overrides = cli.overrides();
    let config = ConfigLoader::resolve_config(cli.input, file_config, overrides)?;

    let aligner = MafftAligner::new();
    if !aligner.is_available() {
        warn!("mafft not found on PATH, the alignment check will end in errors");
    }
    let mut collaborators = Collaborators::new(Arc::new(aligner));
    match NcbiHttpClient::new() {
        Ok(client) => {
            collaborators.fetcher = Some(Arc::new(client) as Arc<dyn SequenceFetcher>);
        }
        Err(err) => warn!("hit sequences cannot be fetched from NCBI: {err}"),
    }

    let report = Validator::new(config, collaborators).run()?;
    print_summary(&report);
    Ok(())
}

fn print_summary(report: &RunReport) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let red = "\x1b[31m";
    let reset = "\x1b[0m";

    let summary = &report.summary;
    println!("{cyan}GeneValidator summary for {}{reset}", summary.input);
    println!("{cyan}Validated queries: {}{reset}", summary.query_count);
    println!(
        "{green}Good predictions (score >= 75): {}{reset}",
        summary.good_predictions
    );
    println!("{red}Possible weak predictions: {}{reset}", summary.bad_predictions);
    if summary.no_evidence > 0 {
        println!(
            "{yellow}Queries without enough evidence: {}{reset}",
            summary.no_evidence
        );
    }
    if summary.aligner_missing > 0 {
        println!(
            "{yellow}Checks skipped for a missing aligner: {}{reset}",
            summary.aligner_missing
        );
    }
    if summary.no_internet > 0 {
        println!(
            "{yellow}Checks skipped for unreachable NCBI: {}{reset}",
            summary.no_internet
        );
    }
    for (alias, count) in &summary.errors {
        println!("{red}  {alias}: {count} errors{reset}");
    }

    println!("{cyan}Score distribution:{reset}");
    for (bin, count) in summary.score_histogram.iter().enumerate() {
        let upper = if bin == 9 { 100 } else { bin * 10 + 9 };
        println!("  {:>3}-{:<3} {}", bin * 10, upper, "#".repeat(*count));
    }

    for (alias, seconds) in &summary.mean_running_times {
        println!("  {alias}: {seconds:.3}s per query");
    }
    println!("{green}Results written to {}{reset}", report.output_dir.display());
}
