use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use assert_matches::assert_matches;

use gene_validator::checks::{CheckInput, MafftAligner, ValidationCheck};
use gene_validator::config::{ResultSourceConfig, RunConfig};
use gene_validator::domain::{
    Answer, HspRecord, SequenceKind, SequenceRecord, ValidationOutcome, ValidationState,
};
use gene_validator::error::GvError;
use gene_validator::search::SearchRunner;
use gene_validator::validation::{Collaborators, RunReport, Validator};

const RESIDUES: &str = "MKVLLAGHWPQRSTEDCFIYMKVLLAGHWPQRSTEDCFIY";
const LAYOUT: &str = "qseqid sseqid slen qstart qend sstart send length pident evalue";

/// `Yes` when the query has at least two hits.
struct HitCount;

impl ValidationCheck for HitCount {
    fn alias(&self) -> &str {
        "hitc"
    }

    fn header(&self) -> &str {
        "Hit Count"
    }

    fn expected(&self) -> Answer {
        Answer::Yes
    }

    fn run(&self, input: &CheckInput<'_>) -> ValidationOutcome {
        let answer = if input.hits.len() >= 2 {
            Answer::Yes
        } else {
            Answer::No
        };
        ValidationOutcome::verdict("hitc", "Hit Count", answer, Answer::Yes, "")
    }
}

/// `Yes` when some hit is at least as long as the query.
struct LongHit;

impl ValidationCheck for LongHit {
    fn alias(&self) -> &str {
        "longhit"
    }

    fn header(&self) -> &str {
        "Long Hit"
    }

    fn expected(&self) -> Answer {
        Answer::Yes
    }

    fn run(&self, input: &CheckInput<'_>) -> ValidationOutcome {
        let answer = if input
            .hits
            .iter()
            .any(|hit| hit.length >= input.prediction.length)
        {
            Answer::Yes
        } else {
            Answer::No
        };
        ValidationOutcome::verdict("longhit", "Long Hit", answer, Answer::Yes, "")
    }
}

struct Panics;

impl ValidationCheck for Panics {
    fn alias(&self) -> &str {
        "boom"
    }

    fn header(&self) -> &str {
        "Boom"
    }

    fn expected(&self) -> Answer {
        Answer::Yes
    }

    fn run(&self, _input: &CheckInput<'_>) -> ValidationOutcome {
        panic!("deliberate failure")
    }
}

struct FixedSearch {
    calls: AtomicUsize,
}

impl SearchRunner for FixedSearch {
    fn search(&self, query_fasta: &str, _kind: SequenceKind) -> Result<Vec<SequenceRecord>, GvError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(query_fasta.starts_with('>'));
        let mut hits = Vec::new();
        for id in ["live1", "live2"] {
            let mut hit = SequenceRecord::new(id, SequenceKind::Protein, 50);
            hit.hsps.push(HspRecord {
                evalue: 1e-20,
                hit_from: 1,
                hit_to: 30,
                query_from: 1,
                query_to: 30,
                query_frame: 0,
                hit_alignment: String::new(),
                query_alignment: String::new(),
                align_len: 30,
                identity: 20,
                pidentity: Some(66.7),
            });
            hits.push(hit);
        }
        Ok(hits)
    }
}

fn checks() -> Vec<Arc<dyn ValidationCheck>> {
    vec![Arc::new(HitCount), Arc::new(LongHit)]
}

fn collaborators() -> Collaborators {
    Collaborators::new(Arc::new(MafftAligner::with_program(None)))
}

fn write_input(dir: &Path, queries: usize) -> PathBuf {
    let path = dir.join("genes.fa");
    let content = (1..=queries)
        .map(|i| format!(">q{i} predicted protein {i}\n{RESIDUES}\n"))
        .collect::<String>();
    fs::write(&path, content).unwrap();
    path
}

/// Query `i` gets `i % 3` hits; queries with two hits get one longer than the query.
fn write_tabular(dir: &Path, queries: usize) -> PathBuf {
    let path = dir.join("hits.tsv");
    let mut rows = String::new();
    for i in 1..=queries {
        for h in 0..(i % 3) {
            let slen = if i % 3 == 2 && h == 1 { 45 } else { 35 };
            rows.push_str(&format!(
                "q{i}\tsp|H{i}_{h}|\t{slen}\t1\t30\t1\t30\t30\t70.0\t1e-15\n"
            ));
        }
    }
    fs::write(&path, rows).unwrap();
    path
}

fn config(input: &Path, results: &Path, output: &Path) -> RunConfig {
    let mut config = RunConfig::new(
        input,
        ResultSourceConfig::File {
            path: results.to_path_buf(),
            columns: Some(LAYOUT.to_string()),
        },
    );
    config.output_dir = Some(output.to_path_buf());
    config.threads = 1;
    config
}

fn run(config: RunConfig) -> RunReport {
    Validator::new(config, collaborators())
        .with_checks(checks())
        .run()
        .unwrap()
}

fn sorted_scores(report: &RunReport) -> Vec<u32> {
    let mut scores = report.aggregate.scores().to_vec();
    scores.sort_unstable();
    scores
}

#[test]
fn parallel_run_matches_sequential_run() {
    let temp = tempfile::tempdir().unwrap();
    let input = write_input(temp.path(), 12);
    let results = write_tabular(temp.path(), 12);

    let sequential = run(config(&input, &results, &temp.path().join("seq")));

    let mut parallel_config = config(&input, &results, &temp.path().join("par"));
    parallel_config.threads = 4;
    parallel_config.parallel = true;
    let parallel = run(parallel_config);

    assert_eq!(sequential.aggregate.query_count(), 12);
    assert_eq!(parallel.aggregate.query_count(), 12);
    assert_eq!(sorted_scores(&sequential), sorted_scores(&parallel));
    assert_eq!(
        sequential.aggregate.good_predictions(),
        parallel.aggregate.good_predictions()
    );
    assert_eq!(sequential.document.len(), 12);
    assert_eq!(
        sequential.document.keys().collect::<Vec<_>>(),
        parallel.document.keys().collect::<Vec<_>>()
    );
    for (identifier, report) in &sequential.document {
        assert_eq!(report.score, parallel.document[identifier].score);
    }
}

#[test]
fn scores_follow_the_checks() {
    let temp = tempfile::tempdir().unwrap();
    let input = write_input(temp.path(), 3);
    let results = write_tabular(temp.path(), 3);
    let report = run(config(&input, &results, &temp.path().join("out")));

    // q1: one short hit; q2: two hits, one longer than the query; q3: none
    assert_eq!(report.document["q1"].score, 0);
    assert_eq!(report.document["q2"].score, 100);
    assert_eq!(report.document["q3"].score, 0);
    assert_eq!(report.document["q2"].hit_count, 2);
    assert_eq!(report.summary.good_predictions, 1);
    assert_eq!(report.summary.bad_predictions, 2);

    let output = temp.path().join("out");
    assert!(output.join("genes.fa.json").is_file());
    assert!(output.join("summary.json").is_file());
    assert!(output.join("fragments").join("2.json").is_file());
}

#[test]
fn start_index_skips_queries_without_desynchronizing_xml() {
    let temp = tempfile::tempdir().unwrap();
    let input = write_input(temp.path(), 3);
    let xml = (1..=3)
        .map(|i| {
            let hits = (0..i)
                .map(|h| {
                    format!(
                        "<Hit><Hit_id>h{i}_{h}</Hit_id><Hit_len>40</Hit_len><Hit_hsps><Hsp>\
                         <Hsp_evalue>1e-9</Hsp_evalue><Hsp_query-from>1</Hsp_query-from>\
                         <Hsp_query-to>20</Hsp_query-to><Hsp_hit-from>1</Hsp_hit-from>\
                         <Hsp_hit-to>20</Hsp_hit-to><Hsp_identity>12</Hsp_identity>\
                         <Hsp_align-len>20</Hsp_align-len></Hsp></Hit_hsps></Hit>"
                    )
                })
                .collect::<String>();
            format!("<Iteration><Iteration_hits>{hits}</Iteration_hits></Iteration>")
        })
        .collect::<String>();
    let results = temp.path().join("hits.xml");
    fs::write(
        &results,
        format!("<?xml version=\"1.0\"?>\n<BlastOutput><BlastOutput_iterations>{xml}</BlastOutput_iterations></BlastOutput>\n"),
    )
    .unwrap();

    let mut config = RunConfig::new(
        &input,
        ResultSourceConfig::File {
            path: results,
            columns: None,
        },
    );
    config.output_dir = Some(temp.path().join("out"));
    config.threads = 1;
    config.start_index = 2;
    let report = run(config);

    assert_eq!(report.aggregate.query_count(), 2);
    assert!(!report.document.contains_key("q1"));
    assert_eq!(report.document["q2"].hit_count, 2);
    assert_eq!(report.document["q3"].hit_count, 3);
}

#[test]
fn exhausted_results_end_the_run() {
    let temp = tempfile::tempdir().unwrap();
    let input = write_input(temp.path(), 4);
    let results = temp.path().join("hits.xml");
    fs::write(
        &results,
        "<?xml version=\"1.0\"?>\n<BlastOutput><BlastOutput_iterations>\
         <Iteration><Iteration_hits></Iteration_hits></Iteration>\
         <Iteration><Iteration_hits></Iteration_hits></Iteration>\
         </BlastOutput_iterations></BlastOutput>\n",
    )
    .unwrap();

    let mut config = RunConfig::new(
        &input,
        ResultSourceConfig::File {
            path: results,
            columns: None,
        },
    );
    config.output_dir = Some(temp.path().join("out"));
    config.threads = 2;
    config.parallel = true;
    let report = run(config);

    assert_eq!(report.aggregate.query_count(), 2);
    assert_eq!(report.summary.no_evidence, 0);
    assert_eq!(report.summary.bad_predictions, 2);
}

#[test]
fn identical_hits_are_left_out() {
    let temp = tempfile::tempdir().unwrap();
    let input = write_input(temp.path(), 1);
    let results = temp.path().join("hits.tsv");
    fs::write(
        &results,
        "q1\tself\t40\t1\t40\t1\t40\t40\t100.0\t0.0\n\
         q1\tother\t38\t1\t36\t1\t36\t36\t72.5\t1e-12\n",
    )
    .unwrap();

    let report = run(config(&input, &results, &temp.path().join("out")));
    assert_eq!(report.document["q1"].hit_count, 1);
}

#[test]
fn panicking_check_is_reported_as_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let input = write_input(temp.path(), 3);
    let results = write_tabular(temp.path(), 3);
    let mut config = config(&input, &results, &temp.path().join("out"));
    config.threads = 2;
    config.parallel = true;

    let report = Validator::new(config, collaborators())
        .with_checks(vec![Arc::new(HitCount), Arc::new(Panics)])
        .run()
        .unwrap();

    assert_eq!(report.aggregate.query_count(), 3);
    assert_eq!(report.summary.errors.get("boom"), Some(&3));
    let outcome = &report.document["q2"].outcomes[1];
    assert_eq!(outcome.state, ValidationState::Error);
    assert!(outcome.message.contains("deliberate failure"));
    assert_eq!(report.document["q2"].score, 100);
}

#[test]
fn live_search_runs_once_per_query() {
    let temp = tempfile::tempdir().unwrap();
    let input = write_input(temp.path(), 3);
    let search = Arc::new(FixedSearch {
        calls: AtomicUsize::new(0),
    });

    let mut config = RunConfig::new(
        &input,
        ResultSourceConfig::LiveSearch {
            db: "swissprot -remote".to_string(),
        },
    );
    config.output_dir = Some(temp.path().join("out"));
    config.threads = 2;
    config.parallel = true;
    let mut collaborators = collaborators();
    collaborators.search = Some(search.clone() as Arc<dyn SearchRunner>);

    let report = Validator::new(config, collaborators)
        .with_checks(checks())
        .run()
        .unwrap();
    assert_eq!(search.calls.load(Ordering::SeqCst), 3);
    assert_eq!(report.aggregate.query_count(), 3);
    assert!(report.document.values().all(|query| query.score == 100));
}

#[test]
fn existing_output_directory_is_refused() {
    let temp = tempfile::tempdir().unwrap();
    let input = write_input(temp.path(), 2);
    let results = write_tabular(temp.path(), 2);
    let output = temp.path().join("out");
    run(config(&input, &results, &output));

    let err = Validator::new(config(&input, &results, &output), collaborators())
        .with_checks(checks())
        .run()
        .unwrap_err();
    assert_matches!(err, GvError::OutputExists(_));
}

#[test]
fn unknown_validations_fail_before_any_output() {
    let temp = tempfile::tempdir().unwrap();
    let input = write_input(temp.path(), 2);
    let results = write_tabular(temp.path(), 2);
    let output = temp.path().join("out");
    let mut config = config(&input, &results, &output);
    config.validations = vec!["nothing here".to_string()];

    let err = Validator::new(config, collaborators())
        .with_checks(checks())
        .run()
        .unwrap_err();
    assert_matches!(err, GvError::NoValidation(_));
    assert!(!output.exists());
}

#[test]
fn missing_input_is_reported() {
    let temp = tempfile::tempdir().unwrap();
    let input = temp.path().join("absent.fa");
    let results = write_tabular(temp.path(), 1);
    let err = Validator::new(config(&input, &results, &temp.path().join("out")), collaborators())
        .run()
        .unwrap_err();
    assert_matches!(err, GvError::FileNotFound(path) if path == input);
}
