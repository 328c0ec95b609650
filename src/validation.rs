use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rayon::ThreadPoolBuilder;
use tracing::{debug, error, info, warn};

use crate::aggregate::{QueryStats, RunAggregate, SharedAggregate};
use crate::checks::{
    Aligner, CheckContext, CheckInput, CheckRegistry, SelectedChecks, SequenceFetcher,
    ValidationCheck,
};
use crate::config::{ResultSourceConfig, RunConfig};
use crate::domain::{SequenceKind, SequenceRecord};
use crate::error::GvError;
use crate::fasta::{FastaIndex, RawSequenceIndex, parse_prediction};
use crate::homology::{self, HomologyReader, NextHits};
use crate::report::{QueryReport, RunSummary};
use crate::scoring;
use crate::search::{BlastCli, SearchRunner};
use crate::seqtype::kind_of_records;
use crate::store::OutputStore;

/// Minimum percent identity of every HSP for a hit to count as identical.
pub const IDENTICAL_PIDENTITY: f64 = 99.0;

#[derive(Clone)]
pub struct Collaborators {
    pub aligner: Arc<dyn Aligner>,
    pub fetcher: Option<Arc<dyn SequenceFetcher>>,
    /// Used when the run has no result file; defaults to [BlastCli].
    pub search: Option<Arc<dyn SearchRunner>>,
}

impl Collaborators {
    pub fn new(aligner: Arc<dyn Aligner>) -> Self {
        Self {
            aligner,
            fetcher: None,
            search: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub summary: RunSummary,
    pub aggregate: RunAggregate,
    pub document: BTreeMap<String, QueryReport>,
    pub output_dir: PathBuf,
}

pub struct Validator {
    config: RunConfig,
    collaborators: Collaborators,
    checks: Option<Vec<Arc<dyn ValidationCheck>>>,
}

enum HitSource {
    Results(HomologyReader),
    Live,
}

enum PendingHits {
    Ready(Vec<SequenceRecord>),
    /// Raw FASTA record still to be searched.
    Search(String),
}

struct QueryJob {
    index: usize,
    prediction: SequenceRecord,
    hits: PendingHits,
}

struct QueryRunner {
    kind: SequenceKind,
    checks: SelectedChecks,
    store: OutputStore,
    aggregate: SharedAggregate,
    search: Option<Arc<dyn SearchRunner>>,
    failure: Mutex<Option<GvError>>,
}

impl Validator {
    pub fn new(config: RunConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
            checks: None,
        }
    }

    pub fn with_checks(mut self, checks: Vec<Arc<dyn ValidationCheck>>) -> Self {
        self.checks = Some(checks);
        self
    }

    pub fn run(&self) -> Result<RunReport, GvError> {
        let started_at = Utc::now();
        let input = self.config.input.as_path();

        // INIT
        if !input.is_file() {
            return Err(GvError::FileNotFound(input.to_path_buf()));
        }
        let content = fs::read(input)
            .map_err(|err| GvError::Filesystem(format!("{}: {err}", input.display())))?;
        let index = FastaIndex::build(&content)?;
        let kind = match kind_of_records(&String::from_utf8_lossy(&content))? {
            Some(kind) => kind,
            None => {
                warn!("could not determine the input sequence type, assuming protein");
                SequenceKind::Protein
            }
        };
        drop(content);
        info!(
            input = %input.display(),
            queries = index.len(),
            %kind,
            "input indexed"
        );

        let mut context = CheckContext::new(Arc::clone(&self.collaborators.aligner));
        if let Some(path) = &self.config.raw_sequences {
            context = context.with_raw_sequences(Arc::new(open_raw_sequences(path)?));
        }
        if let Some(fetcher) = &self.collaborators.fetcher {
            context = context.with_fetcher(Arc::clone(fetcher));
        }
        let registry = match &self.checks {
            Some(checks) => CheckRegistry::new(checks.clone())?,
            None => CheckRegistry::builtin(&context)?,
        };
        let checks = registry.select(&self.config.validations)?;

        let store = OutputStore::new(input, self.config.output_dir.as_deref())?;
        store.prepare(self.config.start_index)?;

        let mut source = match &self.config.source {
            ResultSourceConfig::File { path, columns } => {
                let first = parse_prediction(&index.read_record(input, 0)?, kind)?;
                HitSource::Results(homology::open(
                    path,
                    columns.as_deref(),
                    kind,
                    &first.identifier,
                )?)
            }
            ResultSourceConfig::LiveSearch { .. } => HitSource::Live,
        };
        let search: Option<Arc<dyn SearchRunner>> = match (&self.config.source, &self.collaborators.search) {
            (ResultSourceConfig::File { .. }, _) => None,
            (ResultSourceConfig::LiveSearch { .. }, Some(search)) => Some(Arc::clone(search)),
            (ResultSourceConfig::LiveSearch { db }, None) => {
                Some(Arc::new(BlastCli::new(db.as_str(), self.config.threads)))
            }
        };

        let runner = QueryRunner {
            kind,
            checks,
            store,
            aggregate: SharedAggregate::new(),
            search,
            failure: Mutex::new(None),
        };

        // per query
        let scanned = if self.config.parallel {
            let pool = ThreadPoolBuilder::new()
                .num_threads(self.config.threads)
                .thread_name(|i| format!("gv-worker-{i}"))
                .build()
                .map_err(|err| GvError::WorkerPool(err.to_string()))?;
            pool.in_place_scope(|scope| self.scan(&runner, &mut source, &index, Some(scope)))
        } else {
            self.scan(&runner, &mut source, &index, None)
        };
        scanned?;
        let QueryRunner {
            store,
            aggregate,
            failure,
            ..
        } = runner;
        if let Some(err) = failure
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
        {
            return Err(err);
        }

        // FINALIZE
        let aggregate = aggregate.into_inner();
        let document = store.write_document()?;
        let summary = RunSummary::new(
            &input.display().to_string(),
            &aggregate,
            started_at,
            Utc::now(),
        );
        store.write_summary(&summary)?;
        info!(
            queries = aggregate.query_count(),
            good = aggregate.good_predictions(),
            bad = aggregate.bad_predictions(),
            output = %store.root(),
            "validation finished"
        );

        Ok(RunReport {
            summary,
            aggregate,
            document,
            output_dir: store.root().as_std_path().to_path_buf(),
        })
    }

    fn scan<'s>(
        &self,
        runner: &'s QueryRunner,
        source: &mut HitSource,
        index: &FastaIndex,
        scope: Option<&rayon::Scope<'s>>,
    ) -> Result<(), GvError> {
        let input = self.config.input.as_path();
        let start = self.config.start_index;

        for i in 1..=index.len() {
            if runner.has_failed() {
                break;
            }
            if i < start {
                if let HitSource::Results(reader) = source {
                    if !reader.skip()? {
                        debug!(index = i, "result stream ended while skipping");
                        break;
                    }
                }
                continue;
            }

            let record = index.read_record(input, i - 1)?;
            let prediction = parse_prediction(&record, runner.kind)?;
            let hits = match source {
                HitSource::Results(reader) => match reader.next_hits(&prediction.identifier)? {
                    NextHits::Hits(hits) => PendingHits::Ready(hits),
                    NextHits::Exhausted => {
                        info!(index = i, "no more queries in the result stream");
                        break;
                    }
                },
                HitSource::Live => PendingHits::Search(record),
            };

            let job = QueryJob {
                index: i,
                prediction,
                hits,
            };
            match scope {
                Some(scope) if i != start => scope.spawn(move |_| runner.run_detached(job)),
                _ => runner.run(job)?,
            }
        }
        Ok(())
    }
}

impl QueryRunner {
    fn has_failed(&self) -> bool {
        self.failure
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(true)
    }

    fn run_detached(&self, job: QueryJob) {
        let index = job.index;
        if let Err(err) = self.run(job) {
            error!(index, kind = err.kind(), "query failed: {err}");
            let mut slot = self
                .failure
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if slot.is_none() {
                *slot = Some(err);
            }
        }
    }

    fn run(&self, job: QueryJob) -> Result<(), GvError> {
        let QueryJob {
            index,
            prediction,
            hits,
        } = job;
        let hits = match hits {
            PendingHits::Ready(hits) => hits,
            PendingHits::Search(record) => match &self.search {
                Some(search) => search.search(&record, self.kind)?,
                None => Vec::new(),
            },
        };
        let hits = remove_identical_hits(&prediction, hits);

        let input = CheckInput {
            kind: self.kind,
            prediction: &prediction,
            hits: &hits,
        };
        let outcomes = self.checks.run_all(&input);
        let score = scoring::score(&outcomes);
        let report = QueryReport::new(index, &prediction, hits.len(), score, outcomes);
        self.store.write_fragment(&report)?;
        self.aggregate
            .merge(QueryStats::from_outcomes(score.value, &report.outcomes));

        info!(
            index,
            query = %prediction.identifier,
            hits = hits.len(),
            score = score.value,
            "query validated"
        );
        Ok(())
    }
}

fn open_raw_sequences(path: &Path) -> Result<RawSequenceIndex, GvError> {
    if RawSequenceIndex::index_path(path).is_file() {
        RawSequenceIndex::load(path)
    } else {
        RawSequenceIndex::build(path)
    }
}

/// Positions of hits that are the prediction itself: every HSP at least
/// [IDENTICAL_PIDENTITY] identical and the HSP query spans together covering
/// `[1, prediction.length]` without gaps.
pub fn find_identical_hits(
    prediction: &SequenceRecord,
    hits: &[SequenceRecord],
) -> Result<Vec<usize>, GvError> {
    let mut identical = Vec::new();
    if prediction.length == 0 {
        return Ok(identical);
    }
    for (position, hit) in hits.iter().enumerate() {
        if hit.hsps.is_empty() {
            continue;
        }
        let mut spans = Vec::with_capacity(hit.hsps.len());
        for hsp in &hit.hsps {
            if hsp.query_from == 0 || hsp.query_to == 0 {
                return Err(GvError::InvalidHsp(format!(
                    "hit {} has an HSP with a zero query coordinate",
                    hit.identifier
                )));
            }
            spans.push((
                hsp.query_from.min(hsp.query_to),
                hsp.query_from.max(hsp.query_to),
            ));
        }
        let similar = hit
            .hsps
            .iter()
            .all(|hsp| hsp.pidentity.is_some_and(|p| p >= IDENTICAL_PIDENTITY));
        if similar && covers(&mut spans, prediction.length) {
            identical.push(position);
        }
    }
    Ok(identical)
}

fn covers(spans: &mut [(u64, u64)], length: u64) -> bool {
    spans.sort_unstable();
    let mut next = 1u64;
    for (from, to) in spans.iter() {
        if *from > next {
            return false;
        }
        next = next.max(to + 1);
    }
    next > length
}

pub fn remove_identical_hits(
    prediction: &SequenceRecord,
    mut hits: Vec<SequenceRecord>,
) -> Vec<SequenceRecord> {
    match find_identical_hits(prediction, &hits) {
        Ok(identical) => {
            if !identical.is_empty() {
                debug!(
                    query = %prediction.identifier,
                    removed = identical.len(),
                    "identical hits removed"
                );
            }
            let mut position = 0;
            hits.retain(|_| {
                let keep = !identical.contains(&position);
                position += 1;
                keep
            });
            hits
        }
        Err(err) => {
            warn!(
                query = %prediction.identifier,
                "identical hit filtering failed, keeping all hits: {err}"
            );
            hits
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::HspRecord;

    fn hsp(query_from: u64, query_to: u64, pidentity: Option<f64>) -> HspRecord {
        HspRecord {
            evalue: 0.0,
            hit_from: query_from,
            hit_to: query_to,
            query_from,
            query_to,
            query_frame: 0,
            hit_alignment: String::new(),
            query_alignment: String::new(),
            align_len: query_to.abs_diff(query_from) + 1,
            identity: 0,
            pidentity,
        }
    }

    fn hit(id: &str, hsps: Vec<HspRecord>) -> SequenceRecord {
        let mut hit = SequenceRecord::new(id, SequenceKind::Protein, 100);
        hit.hsps = hsps;
        hit
    }

    #[test]
    fn spans_must_cover_without_gaps() {
        assert!(covers(&mut [(51, 100), (1, 50)], 100));
        assert!(covers(&mut [(1, 80), (40, 100)], 100));
        assert!(!covers(&mut [(1, 49), (51, 100)], 100));
        assert!(!covers(&mut [(1, 99)], 100));
    }

    #[test]
    fn only_full_length_near_identical_hits_are_removed() {
        let prediction = SequenceRecord::new("q", SequenceKind::Protein, 100);
        let hits = vec![
            hit("same", vec![hsp(1, 60, Some(100.0)), hsp(55, 100, Some(99.0))]),
            hit("partial", vec![hsp(1, 90, Some(100.0))]),
            hit("distant", vec![hsp(1, 100, Some(80.0))]),
            hit("unknown", vec![hsp(1, 100, None)]),
            hit("reverse", vec![hsp(100, 1, Some(100.0))]),
            hit("empty", Vec::new()),
        ];
        let kept = remove_identical_hits(&prediction, hits)
            .into_iter()
            .map(|hit| hit.identifier)
            .collect::<Vec<_>>();
        assert_eq!(kept, vec!["partial", "distant", "unknown", "empty"]);
    }

    #[test]
    fn filtering_error_keeps_every_hit() {
        let prediction = SequenceRecord::new("q", SequenceKind::Protein, 100);
        let hits = vec![
            hit("same", vec![hsp(1, 100, Some(100.0))]),
            hit("broken", vec![hsp(0, 100, Some(100.0))]),
        ];
        assert!(find_identical_hits(&prediction, &hits).is_err());
        assert_eq!(remove_identical_hits(&prediction, hits).len(), 2);
    }
}
