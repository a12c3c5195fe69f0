//! Tuning engine: grid-search orchestration
//!
//! A `TuningSession` owns everything one search needs: the parser adapter,
//! the preprocessed dataset, the evaluator, and the parameter grid. Running
//! the session feeds grid points through a bounded channel to a worker
//! pool; every point is parsed and scored independently and appended to the
//! result collection by a single aggregator, so each assignment yields
//! exactly one recorded result. A session is consumed by `run` - a fresh
//! search needs a fresh session.

use crate::config::TuneConfig;
use crate::dataset::{Dataset, LogRecord};
use crate::error::{Result, TuneError};
use crate::evaluate::{Evaluator, ScoreBreakdown};
use crate::grid::{ParameterAssignment, ParameterGrid};
use crate::parsers::{Method, ParserAdapter};
use crate::preprocess::Preprocessor;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Mutex};
use uuid::Uuid;

/// What happened at one grid point
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PointOutcome {
    /// Parsed and scored
    Scored {
        score: f64,
        breakdown: ScoreBreakdown,
        /// Distinct templates extracted; the secondary ranking key
        templates: usize,
    },
    /// Algorithm failure or timeout; a non-scoring leaderboard entry
    Failed { reason: String },
}

impl PointOutcome {
    pub fn score(&self) -> Option<f64> {
        match self {
            PointOutcome::Scored { score, .. } => Some(*score),
            PointOutcome::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, PointOutcome::Failed { .. })
    }
}

/// One recorded grid point
#[derive(Debug, Clone, Serialize)]
pub struct ScoredResult {
    /// Grid enumeration index of this assignment
    pub run: usize,
    pub assignment: ParameterAssignment,
    #[serde(flatten)]
    pub outcome: PointOutcome,
    pub elapsed_ms: u64,
}

/// Session-level counters reported with the leaderboard
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub grid_points: usize,
    pub scored: usize,
    pub failed: usize,
    /// Input lines that did not match the log format
    pub skipped_lines: usize,
    pub elapsed_ms: u64,
    pub cancelled: bool,
}

/// Final output of a session: the ranked leaderboard and the selected best
#[derive(Debug, Clone, Serialize)]
pub struct TuningReport {
    pub session_id: Uuid,
    pub session_name: String,
    pub method: String,
    pub objective: String,
    pub started_at: DateTime<Utc>,
    /// All evaluated points, ranked: score descending, ties broken by
    /// fewer templates then lower run index; failed points last
    pub leaderboard: Vec<ScoredResult>,
    pub stats: SessionStats,
}

impl TuningReport {
    /// The best-scoring point, if any point scored at all
    pub fn best(&self) -> Option<&ScoredResult> {
        self.leaderboard.first().filter(|r| !r.outcome.is_failed())
    }

    /// True when every evaluated point failed: the `NoValidConfiguration`
    /// terminal outcome, distinct from a normal best-result report
    pub fn no_valid_configuration(&self) -> bool {
        self.best().is_none() && !self.leaderboard.is_empty()
    }
}

/// One grid search over one dataset. Created in `Idle`, runs through
/// `Generating` and `Evaluating`, ends `Ranked`/`Done` inside `run`.
#[derive(Debug)]
pub struct TuningSession {
    id: Uuid,
    name: String,
    started_at: DateTime<Utc>,
    method: Method,
    adapter: Arc<ParserAdapter>,
    evaluator: Arc<Evaluator>,
    records: Arc<Vec<LogRecord>>,
    ground_truth: Option<Arc<Vec<String>>>,
    grid: ParameterGrid,
    workers: usize,
    point_timeout: Duration,
    skipped_lines: usize,
}

impl TuningSession {
    /// Validate the whole submission and prepare the session.
    ///
    /// Everything detectable before running the grid fails here: malformed
    /// parameter specs, preprocess rules, method/parameter mismatches, a
    /// supervised objective without ground truth, label misalignment.
    pub fn new(
        config: &TuneConfig,
        mut dataset: Dataset,
        ground_truth: Option<Vec<String>>,
    ) -> Result<Self> {
        config.parser.validate_parameters()?;
        let grid = ParameterGrid::new(&config.parser.parameters)?;
        let preprocessor = Preprocessor::compile(&config.tuning.preprocess)?;
        let adapter = ParserAdapter::from_config(&config.parser)?;

        if dataset.is_empty() {
            return Err(TuneError::Config(
                "dataset contains no records matching the log format".to_string(),
            ));
        }

        let objective = config.evaluation.objective;
        if objective.requires_ground_truth() && ground_truth.is_none() {
            return Err(TuneError::Config(format!(
                "objective '{}' requires a ground truth file",
                objective
            )));
        }
        if let Some(labels) = &ground_truth {
            if labels.len() != dataset.len() {
                return Err(TuneError::Config(format!(
                    "ground truth has {} labels for {} parsed records",
                    labels.len(),
                    dataset.len()
                )));
            }
        }

        // Preprocess once; records are read-only for the whole search
        dataset.apply_masks(&preprocessor);

        let workers = if config.search.workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            config.search.workers
        };

        let started_at = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            name: format!("tune_{}", started_at.format("%Y%m%d_%H%M%S")),
            started_at,
            method: config.parser.method,
            adapter: Arc::new(adapter),
            evaluator: Arc::new(Evaluator::new(objective)),
            records: Arc::new(dataset.records),
            ground_truth: ground_truth.map(Arc::new),
            grid,
            workers,
            point_timeout: Duration::from_secs(config.search.point_timeout_secs),
            skipped_lines: dataset.skipped,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total number of grid points this session will evaluate
    pub fn grid_len(&self) -> usize {
        self.grid.len()
    }

    /// Run the search to completion (or cancellation) and rank the results.
    ///
    /// The cancel channel aborts at grid-point granularity: in-flight
    /// points finish or are abandoned, recorded results remain valid and
    /// are reported as a partial leaderboard.
    pub async fn run(self, cancel: watch::Receiver<bool>) -> Result<TuningReport> {
        let start = Instant::now();
        let total = self.grid.len();

        tracing::info!(
            session = %self.id,
            method = %self.method,
            grid_points = total,
            workers = self.workers,
            "starting grid search"
        );

        let buffer = self.workers.max(1) * 2;
        let (point_tx, point_rx) = mpsc::channel::<(usize, ParameterAssignment)>(buffer);
        let (result_tx, mut result_rx) = mpsc::channel::<ScoredResult>(buffer);
        let point_rx = Arc::new(Mutex::new(point_rx));

        // Producer: lazily enumerates the grid into the bounded channel
        let producer_cancel = cancel.clone();
        let grid = self.grid.clone();
        let producer = tokio::spawn(async move {
            for (run, assignment) in grid.iter().enumerate() {
                if *producer_cancel.borrow() {
                    tracing::warn!("cancellation requested, stopping grid enumeration");
                    break;
                }
                if point_tx.send((run, assignment)).await.is_err() {
                    break;
                }
            }
        });

        // Worker pool: each worker takes one point at a time to completion
        let mut workers = Vec::with_capacity(self.workers);
        for _ in 0..self.workers.max(1) {
            let point_rx = point_rx.clone();
            let result_tx = result_tx.clone();
            let worker_cancel = cancel.clone();
            let adapter = self.adapter.clone();
            let records = self.records.clone();
            let evaluator = self.evaluator.clone();
            let ground_truth = self.ground_truth.clone();
            let timeout = self.point_timeout;

            workers.push(tokio::spawn(async move {
                loop {
                    if *worker_cancel.borrow() {
                        break;
                    }
                    let point = { point_rx.lock().await.recv().await };
                    let Some((run, assignment)) = point else { break };

                    let result = evaluate_point(
                        run,
                        assignment,
                        adapter.clone(),
                        records.clone(),
                        evaluator.clone(),
                        ground_truth.clone(),
                        timeout,
                    )
                    .await;

                    if result_tx.send(result).await.is_err() {
                        break;
                    }
                }
            }));
        }
        // Workers hold the only live clones; once they exit, the point
        // channel closes and a blocked producer unblocks
        drop(point_rx);
        drop(result_tx);

        // Single aggregator: append-only, one result per assignment
        let mut results: Vec<ScoredResult> = Vec::new();
        while let Some(result) = result_rx.recv().await {
            match &result.outcome {
                PointOutcome::Scored { score, .. } => {
                    tracing::debug!(
                        run = result.run,
                        score,
                        params = %result.assignment,
                        "grid point scored"
                    );
                }
                PointOutcome::Failed { reason } => {
                    tracing::debug!(
                        run = result.run,
                        reason,
                        params = %result.assignment,
                        "grid point failed"
                    );
                }
            }
            results.push(result);
        }

        let _ = producer.await;
        for worker in workers {
            let _ = worker.await;
        }

        let cancelled = *cancel.borrow();
        rank(&mut results);

        let scored = results.iter().filter(|r| !r.outcome.is_failed()).count();
        let failed = results.len() - scored;
        let stats = SessionStats {
            grid_points: total,
            scored,
            failed,
            skipped_lines: self.skipped_lines,
            elapsed_ms: start.elapsed().as_millis() as u64,
            cancelled,
        };

        tracing::info!(
            session = %self.id,
            scored,
            failed,
            elapsed_ms = stats.elapsed_ms,
            cancelled,
            "grid search finished"
        );

        Ok(TuningReport {
            session_id: self.id,
            session_name: self.name,
            method: self.method.to_string(),
            objective: self.evaluator.objective().to_string(),
            started_at: self.started_at,
            leaderboard: results,
            stats,
        })
    }
}

/// Parse and score one grid point on a blocking thread, bounded by the
/// per-point timeout. Pathological parameter combinations degenerate into
/// long parses; a timeout is a `ParseFailure`, never a silent drop.
async fn evaluate_point(
    run: usize,
    assignment: ParameterAssignment,
    adapter: Arc<ParserAdapter>,
    records: Arc<Vec<LogRecord>>,
    evaluator: Arc<Evaluator>,
    ground_truth: Option<Arc<Vec<String>>>,
    limit: Duration,
) -> ScoredResult {
    let started = Instant::now();

    let task_assignment = assignment.clone();
    let task = tokio::task::spawn_blocking(move || {
        adapter.parse(&records, &task_assignment).map(|parsed| {
            let labels = ground_truth.as_deref().map(Vec::as_slice);
            let templates = parsed.templates.len();
            (evaluator.evaluate(&parsed, labels), templates)
        })
    });

    let outcome = match tokio::time::timeout(limit, task).await {
        Ok(Ok(Ok((evaluation, templates)))) => PointOutcome::Scored {
            score: evaluation.score,
            breakdown: evaluation.breakdown,
            templates,
        },
        Ok(Ok(Err(failure))) => PointOutcome::Failed {
            reason: failure.reason,
        },
        Ok(Err(join_error)) => PointOutcome::Failed {
            reason: format!("parser task aborted: {}", join_error),
        },
        Err(_) => PointOutcome::Failed {
            reason: format!("timed out after {}s", limit.as_secs()),
        },
    };

    ScoredResult {
        run,
        assignment,
        outcome,
        elapsed_ms: started.elapsed().as_millis() as u64,
    }
}

/// Rank: score descending, ties by fewer templates then lower run index;
/// failed points sink to the bottom in run order
fn rank(results: &mut [ScoredResult]) {
    results.sort_by(|a, b| match (&a.outcome, &b.outcome) {
        (
            PointOutcome::Scored {
                score: sa,
                templates: ta,
                ..
            },
            PointOutcome::Scored {
                score: sb,
                templates: tb,
                ..
            },
        ) => sb
            .partial_cmp(sa)
            .unwrap_or(Ordering::Equal)
            .then_with(|| ta.cmp(tb))
            .then_with(|| a.run.cmp(&b.run)),
        (PointOutcome::Scored { .. }, PointOutcome::Failed { .. }) => Ordering::Less,
        (PointOutcome::Failed { .. }, PointOutcome::Scored { .. }) => Ordering::Greater,
        (PointOutcome::Failed { .. }, PointOutcome::Failed { .. }) => a.run.cmp(&b.run),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EvaluationConfig, ParserConfig, SearchConfig, TuningConfig};
    use crate::evaluate::Objective;
    use crate::grid::ParameterSpec;
    use ahash::AHashMap;

    fn dataset_from(contents: &[&str]) -> Dataset {
        let records = contents
            .iter()
            .enumerate()
            .map(|(i, c)| LogRecord {
                line_id: i + 1,
                raw: c.to_string(),
                fields: AHashMap::new(),
                content: c.to_string(),
            })
            .collect();
        Dataset {
            records,
            skipped: 0,
        }
    }

    fn logmine_config(specs: Vec<ParameterSpec>) -> TuneConfig {
        TuneConfig {
            meta: Default::default(),
            tuning: TuningConfig {
                log_format: "<Content>".to_string(),
                preprocess: vec![],
            },
            parser: ParserConfig {
                method: Method::Logmine,
                templates_file: None,
                parameters: specs,
            },
            evaluation: EvaluationConfig {
                objective: Objective::Goodness,
            },
            search: SearchConfig {
                workers: 2,
                point_timeout_secs: 30,
            },
        }
    }

    fn no_cancel() -> watch::Receiver<bool> {
        // borrow() keeps returning the last value after the sender drops
        let (_tx, rx) = watch::channel(false);
        rx
    }

    #[tokio::test]
    async fn test_one_result_per_grid_point() {
        let config = logmine_config(vec![
            ParameterSpec::new("max_dist", 0.0, 0.4, 0.2), // 3 values
            ParameterSpec::fixed("k", 1.0),
            ParameterSpec::new("levels", 1.0, 2.0, 1.0), // 2 values
        ]);
        let dataset = dataset_from(&[
            "Served block <*> to <*>",
            "Served block <*> to <*>",
            "Starting thread pool",
        ]);

        let session = TuningSession::new(&config, dataset, None).unwrap();
        assert_eq!(session.grid_len(), 6);

        let report = session.run(no_cancel()).await.unwrap();
        assert_eq!(report.leaderboard.len(), 6);
        assert_eq!(report.stats.scored, 6);
        assert_eq!(report.stats.failed, 0);

        // Every run index present exactly once
        let mut runs: Vec<usize> = report.leaderboard.iter().map(|r| r.run).collect();
        runs.sort_unstable();
        assert_eq!(runs, (0..6).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_best_dominates_leaderboard() {
        let config = logmine_config(vec![
            ParameterSpec::new("max_dist", 0.0, 0.8, 0.2),
            ParameterSpec::fixed("k", 1.0),
            ParameterSpec::fixed("levels", 1.0),
        ]);
        let dataset = dataset_from(&[
            "open session <*>",
            "open session <*>",
            "close session <*>",
            "close session <*>",
        ]);

        let session = TuningSession::new(&config, dataset, None).unwrap();
        let report = session.run(no_cancel()).await.unwrap();

        let best_score = report.best().unwrap().outcome.score().unwrap();
        for entry in &report.leaderboard {
            if let Some(score) = entry.outcome.score() {
                assert!(best_score >= score);
            }
        }
    }

    #[tokio::test]
    async fn test_supervised_objective_requires_ground_truth() {
        let mut config = logmine_config(vec![
            ParameterSpec::fixed("max_dist", 0.2),
            ParameterSpec::fixed("k", 1.0),
            ParameterSpec::fixed("levels", 1.0),
        ]);
        config.evaluation.objective = Objective::Accuracy;

        let err = TuningSession::new(&config, dataset_from(&["a b"]), None).unwrap_err();
        assert!(matches!(err, TuneError::Config(_)));
    }

    #[tokio::test]
    async fn test_ground_truth_alignment_checked() {
        let mut config = logmine_config(vec![
            ParameterSpec::fixed("max_dist", 0.2),
            ParameterSpec::fixed("k", 1.0),
            ParameterSpec::fixed("levels", 1.0),
        ]);
        config.evaluation.objective = Objective::Accuracy;

        let labels = vec!["A".to_string()];
        let err =
            TuningSession::new(&config, dataset_from(&["a b", "c d"]), Some(labels)).unwrap_err();
        assert!(matches!(err, TuneError::Config(_)));
    }

    #[tokio::test]
    async fn test_cancelled_session_reports_partial_leaderboard() {
        let config = logmine_config(vec![
            ParameterSpec::new("max_dist", 0.0, 1.0, 0.01), // 101 values
            ParameterSpec::fixed("k", 1.0),
            ParameterSpec::fixed("levels", 1.0),
        ]);
        let dataset = dataset_from(&["x y z", "x y w"]);

        let session = TuningSession::new(&config, dataset, None).unwrap();
        let (cancel_tx, cancel_rx) = watch::channel(true); // cancelled up front

        let report = session.run(cancel_rx).await.unwrap();
        drop(cancel_tx);

        assert!(report.stats.cancelled);
        assert!(report.leaderboard.len() < 101);
    }

    #[test]
    fn test_rank_orders_and_breaks_ties() {
        let scored = |run: usize, score: f64, templates: usize| ScoredResult {
            run,
            assignment: ParameterAssignment::default(),
            outcome: PointOutcome::Scored {
                score,
                breakdown: ScoreBreakdown::Unsupervised {
                    coverage: 1.0,
                    specificity: 1.0,
                    parsimony: 1.0,
                },
                templates,
            },
            elapsed_ms: 0,
        };
        let failed = |run: usize| ScoredResult {
            run,
            assignment: ParameterAssignment::default(),
            outcome: PointOutcome::Failed {
                reason: "boom".to_string(),
            },
            elapsed_ms: 0,
        };

        let mut results = vec![
            failed(0),
            scored(1, 0.5, 4),
            scored(2, 0.9, 7),
            scored(3, 0.9, 3),
            scored(4, 0.9, 3),
        ];
        rank(&mut results);

        // 0.9 with fewer templates wins; equal (score, templates) falls
        // back to run order; failures last
        let order: Vec<usize> = results.iter().map(|r| r.run).collect();
        assert_eq!(order, vec![3, 4, 2, 1, 0]);
        assert!(results.last().unwrap().outcome.is_failed());
    }
}
