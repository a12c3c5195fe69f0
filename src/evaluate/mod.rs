//! Scoring of parse results against a quality measure
//!
//! With ground truth available the evaluator compares line-to-template
//! grouping against the known correct grouping (grouping accuracy or
//! pairwise F-measure, selected by the configured objective). Without
//! ground truth it falls back to an unsupervised goodness heuristic. Either
//! way the result is a single totally ordered score, higher is better.

use crate::parsers::{ParseResult, TEMPLATE_WILDCARD};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Quality measure the search optimizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    /// Grouping accuracy: a line counts as correct only when its predicted
    /// template groups exactly the same lines as its true template
    Accuracy,
    /// Pairwise clustering F-measure
    FMeasure,
    /// Unsupervised goodness; the only objective usable without ground
    /// truth
    Goodness,
}

impl Objective {
    pub fn requires_ground_truth(&self) -> bool {
        !matches!(self, Objective::Goodness)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Objective::Accuracy => "accuracy",
            Objective::FMeasure => "f_measure",
            Objective::Goodness => "goodness",
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-point metric detail recorded alongside the ranking score
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScoreBreakdown {
    Supervised {
        accuracy: f64,
        f_measure: f64,
        precision: f64,
        recall: f64,
    },
    Unsupervised {
        coverage: f64,
        specificity: f64,
        parsimony: f64,
    },
}

/// Outcome of scoring one parse result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    /// The value the search ranks by (higher is better)
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

/// Scores parse results under one fixed objective for a session's lifetime
#[derive(Debug)]
pub struct Evaluator {
    objective: Objective,
}

impl Evaluator {
    pub fn new(objective: Objective) -> Self {
        Self { objective }
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    /// Score a well-formed parse result. Total: never fails; a supervised
    /// objective without ground truth falls back to the unsupervised
    /// heuristic (the session rejects that pairing up front).
    pub fn evaluate(&self, result: &ParseResult, ground_truth: Option<&[String]>) -> Evaluation {
        match (self.objective, ground_truth) {
            (Objective::Goodness, _) | (_, None) => Self::unsupervised(result),
            (objective, Some(labels)) => Self::supervised(result, labels, objective),
        }
    }

    fn supervised(result: &ParseResult, labels: &[String], objective: Objective) -> Evaluation {
        let total = result.assignments.len();

        // Contingency counts over matched lines; ground-truth sizes over
        // all lines. Unmatched lines belong to no predicted template and
        // therefore can never be counted correct.
        let mut contingency: AHashMap<(usize, &str), usize> = AHashMap::new();
        let mut predicted_sizes: AHashMap<usize, usize> = AHashMap::new();
        let mut truth_sizes: AHashMap<&str, usize> = AHashMap::new();

        for (idx, assignment) in result.assignments.iter().enumerate() {
            let label = labels.get(idx).map(String::as_str).unwrap_or("");
            *truth_sizes.entry(label).or_insert(0) += 1;
            if let Some(template) = assignment {
                *contingency.entry((*template, label)).or_insert(0) += 1;
                *predicted_sizes.entry(*template).or_insert(0) += 1;
            }
        }

        let pairs = |n: usize| (n * n.saturating_sub(1) / 2) as f64;
        let true_pairs: f64 = contingency.values().map(|&n| pairs(n)).sum();
        let predicted_pairs: f64 = predicted_sizes.values().map(|&n| pairs(n)).sum();
        let real_pairs: f64 = truth_sizes.values().map(|&n| pairs(n)).sum();

        let precision = if predicted_pairs == 0.0 {
            if real_pairs == 0.0 {
                1.0
            } else {
                0.0
            }
        } else {
            true_pairs / predicted_pairs
        };
        let recall = if real_pairs == 0.0 {
            if predicted_pairs == 0.0 {
                1.0
            } else {
                0.0
            }
        } else {
            true_pairs / real_pairs
        };
        let f_measure = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };

        // Grouping accuracy: a predicted template is correct when it holds
        // exactly the lines of exactly one ground-truth template
        let mut correct_lines = 0usize;
        for (&template, &size) in &predicted_sizes {
            let exact = contingency.iter().any(|(&(t, label), &overlap)| {
                t == template && overlap == size && truth_sizes.get(label) == Some(&size)
            });
            if exact {
                correct_lines += size;
            }
        }
        let accuracy = if total == 0 {
            0.0
        } else {
            correct_lines as f64 / total as f64
        };

        let score = match objective {
            Objective::Accuracy => accuracy,
            _ => f_measure,
        };

        Evaluation {
            score,
            breakdown: ScoreBreakdown::Supervised {
                accuracy,
                f_measure,
                precision,
                recall,
            },
        }
    }

    /// Goodness without ground truth: coverage of the dataset, discounted
    /// by how specific the templates are (constant tokens vs wildcards) and
    /// how parsimonious the template set is relative to the line count.
    fn unsupervised(result: &ParseResult) -> Evaluation {
        let total = result.assignments.len();
        let coverage = if total == 0 {
            0.0
        } else {
            result.matched() as f64 / total as f64
        };

        let specificity = if result.templates.is_empty() {
            0.0
        } else {
            result
                .templates
                .iter()
                .map(|t| {
                    let tokens: Vec<&str> = t.pattern.split_whitespace().collect();
                    if tokens.is_empty() {
                        return 0.0;
                    }
                    let constant = tokens.iter().filter(|&&t| t != TEMPLATE_WILDCARD).count();
                    constant as f64 / tokens.len() as f64
                })
                .sum::<f64>()
                / result.templates.len() as f64
        };

        let parsimony = if total == 0 {
            0.0
        } else {
            (1.0 - result.templates.len() as f64 / total as f64).max(0.0)
        };

        Evaluation {
            score: coverage * (specificity + parsimony) / 2.0,
            breakdown: ScoreBreakdown::Unsupervised {
                coverage,
                specificity,
                parsimony,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::Template;

    fn result(patterns: &[&str], assignments: Vec<Option<usize>>) -> ParseResult {
        let templates = patterns
            .iter()
            .enumerate()
            .map(|(i, p)| Template {
                id: format!("E{}", i + 1),
                pattern: p.to_string(),
                count: assignments.iter().filter(|a| **a == Some(i)).count(),
            })
            .collect();
        ParseResult {
            templates,
            assignments,
        }
    }

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_perfect_grouping_scores_one() {
        let result = result(
            &["open <*>", "close <*>"],
            vec![Some(0), Some(0), Some(1), Some(1)],
        );
        let truth = labels(&["A", "A", "B", "B"]);

        let eval = Evaluator::new(Objective::Accuracy).evaluate(&result, Some(&truth));
        assert_eq!(eval.score, 1.0);
        match eval.breakdown {
            ScoreBreakdown::Supervised {
                accuracy,
                f_measure,
                precision,
                recall,
            } => {
                assert_eq!(accuracy, 1.0);
                assert_eq!(f_measure, 1.0);
                assert_eq!(precision, 1.0);
                assert_eq!(recall, 1.0);
            }
            _ => panic!("expected supervised breakdown"),
        }
    }

    #[test]
    fn test_merged_groups_lower_accuracy() {
        // Parser collapses both true templates into one
        let result = result(&["<*> <*>"], vec![Some(0), Some(0), Some(0), Some(0)]);
        let truth = labels(&["A", "A", "B", "B"]);

        let eval = Evaluator::new(Objective::Accuracy).evaluate(&result, Some(&truth));
        assert_eq!(eval.score, 0.0);

        match eval.breakdown {
            ScoreBreakdown::Supervised {
                precision, recall, ..
            } => {
                // 2 of 6 predicted pairs are real; both real pairs recovered
                assert!((precision - 2.0 / 6.0).abs() < 1e-12);
                assert_eq!(recall, 1.0);
            }
            _ => panic!("expected supervised breakdown"),
        }
    }

    #[test]
    fn test_partial_grouping_accuracy() {
        // First template exact, second splits a true group
        let result = result(
            &["a <*>", "b one", "b two"],
            vec![Some(0), Some(0), Some(1), Some(2)],
        );
        let truth = labels(&["A", "A", "B", "B"]);

        let eval = Evaluator::new(Objective::Accuracy).evaluate(&result, Some(&truth));
        assert_eq!(eval.score, 0.5);
    }

    #[test]
    fn test_unmatched_lines_never_correct() {
        let result = result(&["a <*>"], vec![Some(0), Some(0), None, None]);
        let truth = labels(&["A", "A", "B", "B"]);

        let eval = Evaluator::new(Objective::Accuracy).evaluate(&result, Some(&truth));
        assert_eq!(eval.score, 0.5);
    }

    #[test]
    fn test_f_measure_objective_ranks_by_f() {
        let result = result(&["<*> <*>"], vec![Some(0), Some(0), Some(0), Some(0)]);
        let truth = labels(&["A", "A", "B", "B"]);

        let eval = Evaluator::new(Objective::FMeasure).evaluate(&result, Some(&truth));
        let expected_f = 2.0 * (2.0 / 6.0) * 1.0 / (2.0 / 6.0 + 1.0);
        assert!((eval.score - expected_f).abs() < 1e-12);
    }

    #[test]
    fn test_goodness_prefers_specific_templates() {
        let vague = result(&["<*> <*> <*>"], vec![Some(0), Some(0), Some(0)]);
        let specific = result(&["read block <*>"], vec![Some(0), Some(0), Some(0)]);

        let evaluator = Evaluator::new(Objective::Goodness);
        let vague_eval = evaluator.evaluate(&vague, None);
        let specific_eval = evaluator.evaluate(&specific, None);
        assert!(specific_eval.score > vague_eval.score);
    }

    #[test]
    fn test_goodness_discounts_unmatched() {
        let full = result(&["x <*>"], vec![Some(0), Some(0)]);
        let partial = result(&["x <*>"], vec![Some(0), None]);

        let evaluator = Evaluator::new(Objective::Goodness);
        assert!(evaluator.evaluate(&full, None).score > evaluator.evaluate(&partial, None).score);
    }

    #[test]
    fn test_total_on_degenerate_results() {
        let empty = ParseResult {
            templates: vec![],
            assignments: vec![],
        };
        let evaluator = Evaluator::new(Objective::Goodness);
        assert_eq!(evaluator.evaluate(&empty, None).score, 0.0);

        let supervised = Evaluator::new(Objective::Accuracy);
        assert_eq!(supervised.evaluate(&empty, Some(&[])).score, 0.0);
    }

    #[test]
    fn test_supervised_falls_back_without_labels() {
        let result = result(&["x <*>"], vec![Some(0)]);
        let eval = Evaluator::new(Objective::Accuracy).evaluate(&result, None);
        assert!(matches!(
            eval.breakdown,
            ScoreBreakdown::Unsupervised { .. }
        ));
    }
}
