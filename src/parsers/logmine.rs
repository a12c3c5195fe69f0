//! LogMine-style hierarchical clustering
//!
//! One-pass leader clustering groups records whose token-position distance
//! to a cluster representative stays within `max_dist`; subsequent hierarchy
//! levels re-cluster the representatives with the threshold scaled by `k`
//! per level. Each final group becomes one event template.

use crate::dataset::LogRecord;
use crate::grid::ParameterAssignment;
use crate::parsers::{require, template_pattern, ParseFailure, ParseResult, Template};

#[derive(Debug)]
pub struct LogmineParser;

impl LogmineParser {
    pub fn parse(
        &self,
        records: &[LogRecord],
        params: &ParameterAssignment,
    ) -> Result<ParseResult, ParseFailure> {
        let max_dist = require(params, "max_dist")?;
        let k = require(params, "k")?;
        let levels = require(params, "levels")?.round() as i64;

        if records.is_empty() {
            return Err(ParseFailure::new("empty dataset: nothing to cluster"));
        }
        if levels < 1 {
            return Err(ParseFailure::new(format!(
                "levels must be at least 1, got {}",
                levels
            )));
        }

        // Tokenize once; clustering only compares token rows
        let tokens: Vec<Vec<&str>> = records.iter().map(|r| r.tokens()).collect();

        // Level 0: leader clustering over the records themselves.
        // Each group remembers its leader record as representative.
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for idx in 0..tokens.len() {
            let found = groups
                .iter_mut()
                .find(|members| distance(&tokens[idx], &tokens[members[0]]) <= max_dist);
            match found {
                Some(members) => members.push(idx),
                None => groups.push(vec![idx]),
            }
        }

        // Levels 1..n: merge groups whose leaders fall within the relaxed
        // threshold max_dist * k^level.
        for level in 1..levels {
            let threshold = max_dist * k.powi(level as i32);
            let mut merged: Vec<Vec<usize>> = Vec::new();
            for group in groups {
                let found = merged.iter_mut().find(|members| {
                    distance(&tokens[group[0]], &tokens[members[0]]) <= threshold
                });
                match found {
                    Some(members) => members.extend(group.iter().copied()),
                    None => merged.push(group),
                }
            }
            groups = merged;
        }

        // Stable template order by earliest member
        for group in &mut groups {
            group.sort_unstable();
        }
        groups.sort_by_key(|g| g[0]);

        let mut templates = Vec::with_capacity(groups.len());
        let mut assignments = vec![None; records.len()];
        for group in &groups {
            let rows: Vec<Vec<&str>> = group.iter().map(|&i| tokens[i].clone()).collect();
            let template_idx = templates.len();
            templates.push(Template {
                id: format!("E{}", template_idx + 1),
                pattern: template_pattern(&rows),
                count: group.len(),
            });
            for &i in group {
                assignments[i] = Some(template_idx);
            }
        }

        Ok(ParseResult {
            templates,
            assignments,
        })
    }
}

/// Token-position distance between two token sequences: fraction of
/// positions (over the longer sequence) that do not hold equal tokens.
/// 0.0 = identical, 1.0 = nothing in common.
fn distance(a: &[&str], b: &[&str]) -> f64 {
    let width = a.len().max(b.len());
    if width == 0 {
        return 0.0;
    }
    let matches = a.iter().zip(b.iter()).filter(|(x, y)| x == y).count();
    1.0 - (matches as f64 / width as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::test_support::records_from;

    fn params(max_dist: f64, k: f64, levels: f64) -> ParameterAssignment {
        ParameterAssignment::new(vec![
            ("max_dist".to_string(), max_dist),
            ("k".to_string(), k),
            ("levels".to_string(), levels),
        ])
    }

    #[test]
    fn test_groups_similar_lines() {
        let records = records_from(&[
            "Served block <*> to <*>",
            "Served block <*> to <*>",
            "Starting thread pool",
            "Served block <*> to <*>",
        ]);
        let result = LogmineParser.parse(&records, &params(0.3, 1.0, 1.0)).unwrap();

        assert_eq!(result.templates.len(), 2);
        assert_eq!(result.templates[0].pattern, "Served block <*> to <*>");
        assert_eq!(result.templates[0].count, 3);
        assert_eq!(result.assignments, vec![Some(0), Some(0), Some(1), Some(0)]);
    }

    #[test]
    fn test_zero_distance_groups_exact_lines_only() {
        let records = records_from(&[
            "write complete ok",
            "write complete ok",
            "write failed ok",
        ]);
        let result = LogmineParser.parse(&records, &params(0.0, 1.0, 1.0)).unwrap();
        assert_eq!(result.templates.len(), 2);
    }

    #[test]
    fn test_extra_levels_relax_threshold() {
        let records = records_from(&[
            "session opened for user root",
            "session opened for user guest",
            "session closed by user root",
        ]);

        // One level: the "closed by" line (distance 0.4 from leader) stays apart
        let one = LogmineParser.parse(&records, &params(0.25, 2.0, 1.0)).unwrap();
        assert_eq!(one.templates.len(), 2);

        // Second level doubles the threshold to 0.5 and merges it
        let two = LogmineParser.parse(&records, &params(0.25, 2.0, 2.0)).unwrap();
        assert_eq!(two.templates.len(), 1);
        assert_eq!(two.templates[0].pattern, "session <*> <*> user <*>");
    }

    #[test]
    fn test_deterministic_across_invocations() {
        let records = records_from(&[
            "alpha one",
            "alpha two",
            "beta three",
            "alpha one",
        ]);
        let p = params(0.5, 1.5, 3.0);
        let a = LogmineParser.parse(&records, &p).unwrap();
        let b = LogmineParser.parse(&records, &p).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_levels_is_parse_failure() {
        let records = records_from(&["a b c"]);
        let err = LogmineParser.parse(&records, &params(0.1, 1.0, 0.0)).unwrap_err();
        assert!(err.reason.contains("levels"));
    }

    #[test]
    fn test_all_records_assigned() {
        let records = records_from(&["x y", "p q", "r s t"]);
        let result = LogmineParser.parse(&records, &params(0.6, 1.0, 1.0)).unwrap();
        assert_eq!(result.matched(), records.len());
    }
}
