//! Report artifacts for a finished tuning session
//!
//! Produces the machine-readable tuning record (JSON leaderboard), a
//! human-readable tuning log, the console leaderboard table, and optionally
//! a fresh tuning configuration with the optimal parameters pinned as
//! degenerate ranges so the `parse` command can consume it directly.

use crate::config::TuneConfig;
use crate::error::{Result, TuneError};
use crate::grid::ParameterSpec;
use crate::tuner::{PointOutcome, TuningReport};
use std::path::{Path, PathBuf};

/// Where the session artifacts were written
pub struct ReportPaths {
    pub record: PathBuf,
    pub log: PathBuf,
}

/// Write the tuning record (JSON) and tuning log (text) into `out_dir`
pub fn write_reports(report: &TuningReport, out_dir: &Path) -> Result<ReportPaths> {
    std::fs::create_dir_all(out_dir).map_err(|e| TuneError::Io {
        source: e,
        context: format!("Failed to create output directory: {}", out_dir.display()),
    })?;

    let stamp = report.started_at.format("%m-%d-%Y_%Hh%Mm%Ss");

    let record = out_dir.join(format!("tuning_record_{}.json", stamp));
    let json = serde_json::to_string_pretty(report).map_err(|e| TuneError::Json {
        source: e,
        context: "Failed to serialize tuning record".to_string(),
    })?;
    std::fs::write(&record, json).map_err(|e| TuneError::Io {
        source: e,
        context: format!("Failed to write tuning record: {}", record.display()),
    })?;

    let log = out_dir.join(format!("tuning_log_{}.txt", stamp));
    std::fs::write(&log, render_log(report)).map_err(|e| TuneError::Io {
        source: e,
        context: format!("Failed to write tuning log: {}", log.display()),
    })?;

    Ok(ReportPaths { record, log })
}

fn render_log(report: &TuningReport) -> String {
    let mut lines = Vec::new();
    lines.push("==========================".to_string());
    lines.push(format!(
        "Log Parser Tuning - {}",
        report.started_at.format("%d %b %Y , %H:%M:%S")
    ));
    lines.push(format!("Log Parsing Algorithm: {}", report.method));
    lines.push(format!("Objective: {}", report.objective));
    lines.push("==========================".to_string());

    match report.best() {
        Some(best) => {
            lines.push(format!(
                "Optimal combination of parameters for {}: {}",
                report.method, best.assignment
            ));
            if let Some(score) = best.outcome.score() {
                lines.push(format!("Best score: {:.6}", score));
            }
        }
        None => lines.push(format!(
            "No valid configuration found: all {} grid points failed",
            report.stats.grid_points
        )),
    }

    lines.push(format!(
        "Number of combinations for tunable parameters: {}",
        report.stats.grid_points
    ));
    lines.push(format!(
        "Time taken to search entire parameter space: {:.3} seconds",
        report.stats.elapsed_ms as f64 / 1000.0
    ));
    if report.stats.cancelled {
        lines.push("Search was cancelled; leaderboard is partial".to_string());
    }
    if report.stats.skipped_lines > 0 {
        lines.push(format!(
            "Input lines skipped (log format mismatch): {}",
            report.stats.skipped_lines
        ));
    }
    lines.push("==========================".to_string());
    lines.join("\n") + "\n"
}

/// Print the ranked leaderboard to stdout, truncated to `top` entries
pub fn print_leaderboard(report: &TuningReport, top: usize) {
    println!();
    println!(
        "{:<6} {:<10} {:<10} {:<10} Parameters",
        "Rank", "Score", "Templates", "Time(ms)"
    );
    for (rank, entry) in report.leaderboard.iter().take(top).enumerate() {
        match &entry.outcome {
            PointOutcome::Scored {
                score, templates, ..
            } => {
                println!(
                    "{:<6} {:<10.6} {:<10} {:<10} {}",
                    rank + 1,
                    score,
                    templates,
                    entry.elapsed_ms,
                    entry.assignment
                );
            }
            PointOutcome::Failed { reason } => {
                println!(
                    "{:<6} {:<10} {:<10} {:<10} {} [failed: {}]",
                    rank + 1,
                    "-",
                    "-",
                    entry.elapsed_ms,
                    entry.assignment,
                    reason
                );
            }
        }
    }
    if report.leaderboard.len() > top {
        println!("... {} more entries in the tuning record", report.leaderboard.len() - top);
    }
}

/// Write a new tuning configuration with the optimal parameters pinned as
/// degenerate ranges (min == max == best value), ready for `parse`.
///
/// The emitted document should still be inspected manually before use.
pub fn emit_optimal_config(
    config: &TuneConfig,
    report: &TuningReport,
    out_dir: &Path,
) -> Result<PathBuf> {
    let best = report.best().ok_or(TuneError::NoValidConfiguration {
        attempted: report.stats.grid_points,
    })?;

    let mut optimal = config.clone();
    optimal.meta.last_modified = chrono::Utc::now().to_rfc3339();
    optimal.parser.parameters = config
        .parser
        .parameters
        .iter()
        .map(|spec| {
            let value = best.assignment.get(&spec.name).unwrap_or(spec.min);
            ParameterSpec::new(spec.name.clone(), value, value, spec.step)
        })
        .collect();

    let stamp = report.started_at.format("%m-%d-%Y_%Hh%Mm%Ss");
    let path = out_dir.join(format!("tuned_config_{}_{}.toml", report.method, stamp));
    optimal.save(&path)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate::ScoreBreakdown;
    use crate::grid::ParameterAssignment;
    use crate::tuner::{ScoredResult, SessionStats};
    use chrono::Utc;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn sample_report(with_best: bool) -> TuningReport {
        let leaderboard = if with_best {
            vec![ScoredResult {
                run: 0,
                assignment: ParameterAssignment::new(vec![
                    ("CT".to_string(), 0.35),
                    ("PST".to_string(), 0.0),
                ]),
                outcome: PointOutcome::Scored {
                    score: 0.91,
                    breakdown: ScoreBreakdown::Unsupervised {
                        coverage: 1.0,
                        specificity: 0.8,
                        parsimony: 0.9,
                    },
                    templates: 12,
                },
                elapsed_ms: 4,
            }]
        } else {
            vec![ScoredResult {
                run: 0,
                assignment: ParameterAssignment::default(),
                outcome: PointOutcome::Failed {
                    reason: "partition support threshold 1 discarded every partition".to_string(),
                },
                elapsed_ms: 1,
            }]
        };

        TuningReport {
            session_id: Uuid::new_v4(),
            session_name: "tune_test".to_string(),
            method: "iplom".to_string(),
            objective: "goodness".to_string(),
            started_at: Utc::now(),
            leaderboard,
            stats: SessionStats {
                grid_points: 1,
                scored: usize::from(with_best),
                failed: usize::from(!with_best),
                skipped_lines: 0,
                elapsed_ms: 4,
                cancelled: false,
            },
        }
    }

    #[test]
    fn test_write_reports_creates_artifacts() {
        let dir = TempDir::new().unwrap();
        let report = sample_report(true);

        let paths = write_reports(&report, dir.path()).unwrap();
        assert!(paths.record.exists());
        assert!(paths.log.exists());

        // The record is valid JSON holding the full leaderboard
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&paths.record).unwrap()).unwrap();
        assert_eq!(json["leaderboard"].as_array().unwrap().len(), 1);
        assert_eq!(json["leaderboard"][0]["status"], "scored");

        let log = std::fs::read_to_string(&paths.log).unwrap();
        assert!(log.contains("Optimal combination of parameters"));
    }

    #[test]
    fn test_log_reports_no_valid_configuration() {
        let report = sample_report(false);
        let log = render_log(&report);
        assert!(log.contains("No valid configuration found"));
    }

    #[test]
    fn test_emit_optimal_config_pins_degenerate_ranges() {
        let dir = TempDir::new().unwrap();
        let mut config = TuneConfig::default();
        config.parser.method = crate::parsers::Method::Logmine;
        config.parser.parameters = vec![
            ParameterSpec::new("max_dist", 0.1, 0.5, 0.2),
            ParameterSpec::fixed("k", 1.0),
            ParameterSpec::new("levels", 2.0, 6.0, 2.0),
        ];

        let mut report = sample_report(true);
        report.leaderboard[0].assignment = ParameterAssignment::new(vec![
            ("max_dist".to_string(), 0.3),
            ("k".to_string(), 1.0),
            ("levels".to_string(), 4.0),
        ]);

        let path = emit_optimal_config(&config, &report, dir.path()).unwrap();
        let reloaded = TuneConfig::load(&path).unwrap();

        for spec in &reloaded.parser.parameters {
            assert!(spec.is_fixed(), "parameter {} should be pinned", spec.name);
        }
        assert_eq!(
            reloaded
                .parser
                .parameters
                .iter()
                .find(|p| p.name == "levels")
                .unwrap()
                .min,
            4.0
        );

        // The pinned grid has exactly one point
        let grid = crate::grid::ParameterGrid::new(&reloaded.parser.parameters).unwrap();
        assert_eq!(grid.len(), 1);
    }

    #[test]
    fn test_emit_optimal_config_requires_a_best() {
        let dir = TempDir::new().unwrap();
        let config = TuneConfig::default();
        let report = sample_report(false);

        let err = emit_optimal_config(&config, &report, dir.path()).unwrap_err();
        assert!(matches!(err, TuneError::NoValidConfiguration { .. }));
    }
}
