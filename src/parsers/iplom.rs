//! Iterative partitioning log mining (IPLoM)
//!
//! Partitions records by token count, prunes low-support partitions (PST),
//! then iteratively splits partitions on low-cardinality token positions
//! until each partition's cluster goodness clears the CT threshold. The
//! surviving partitions become event templates.

use crate::dataset::LogRecord;
use crate::grid::ParameterAssignment;
use crate::parsers::{require, template_pattern, ParseFailure, ParseResult, Template};
use std::collections::BTreeMap;

#[derive(Debug)]
pub struct IplomParser;

impl IplomParser {
    pub fn parse(
        &self,
        records: &[LogRecord],
        params: &ParameterAssignment,
    ) -> Result<ParseResult, ParseFailure> {
        let step2_support = require(params, "step2Support")?;
        let pst = require(params, "PST")?;
        let ct = require(params, "CT")?;
        let lower_bound = require(params, "lowerBound")?;
        let upper_bound = require(params, "upperBound")?;

        if records.is_empty() {
            return Err(ParseFailure::new("empty dataset: nothing to partition"));
        }

        // Tokenize once; every later pass works over this table
        let tokens: Vec<Vec<&str>> = records.iter().map(|r| r.tokens()).collect();

        // Step 1: partition by token count. BTreeMap keeps the pass
        // deterministic.
        let mut by_count: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (idx, row) in tokens.iter().enumerate() {
            by_count.entry(row.len()).or_default().push(idx);
        }

        // Partition support threshold: partitions whose share of the
        // dataset falls below PST are routed to the outlier set. The
        // algorithm cannot proceed once the threshold discards everything,
        // which is exactly what values near 1 do on mixed-length logs.
        let total = records.len() as f64;
        let mut worklist: Vec<Vec<usize>> = Vec::new();
        for members in by_count.into_values() {
            // Pruned records keep assignment None (outliers)
            if (members.len() as f64 / total) >= pst {
                worklist.push(members);
            }
        }
        if worklist.is_empty() {
            return Err(ParseFailure::new(format!(
                "partition support threshold {} discarded every partition",
                pst
            )));
        }

        // Step 2: iteratively split on token positions until goodness
        // clears CT. Children below step2Support stay together as a residue
        // partition instead of fragmenting further.
        let mut final_partitions: Vec<Vec<usize>> = Vec::new();
        while let Some(part) = worklist.pop() {
            let part_ratio = part.len() as f64 / total;
            let goodness = cluster_goodness(&tokens, &part);

            if goodness >= ct || part.len() < 2 || part_ratio < lower_bound {
                final_partitions.push(part);
                continue;
            }

            let Some(pos) = split_position(&tokens, &part, upper_bound) else {
                final_partitions.push(part);
                continue;
            };

            let mut children: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
            for &idx in &part {
                children.entry(tokens[idx][pos]).or_default().push(idx);
            }
            if children.len() <= 1 {
                final_partitions.push(part);
                continue;
            }

            let part_size = part.len() as f64;
            let mut residue: Vec<usize> = Vec::new();
            for child in children.into_values() {
                if (child.len() as f64 / part_size) < step2_support {
                    residue.extend(child);
                } else {
                    worklist.push(child);
                }
            }
            if !residue.is_empty() {
                residue.sort_unstable();
                final_partitions.push(residue);
            }
        }

        // Stable template order regardless of worklist processing order
        final_partitions.sort_by_key(|p| p.iter().copied().min().unwrap_or(usize::MAX));

        let mut templates = Vec::with_capacity(final_partitions.len());
        let mut assignments = vec![None; records.len()];
        for part in &final_partitions {
            let rows: Vec<Vec<&str>> = part.iter().map(|&i| tokens[i].clone()).collect();
            let template_idx = templates.len();
            templates.push(Template {
                id: format!("E{}", template_idx + 1),
                pattern: template_pattern(&rows),
                count: part.len(),
            });
            for &i in part {
                assignments[i] = Some(template_idx);
            }
        }

        Ok(ParseResult {
            templates,
            assignments,
        })
    }
}

/// Fraction of token positions holding a single distinct value across the
/// partition. 1.0 means the partition already reads as one template.
fn cluster_goodness(tokens: &[Vec<&str>], part: &[usize]) -> f64 {
    let width = tokens[part[0]].len();
    if width == 0 {
        return 1.0;
    }
    let constant_columns = (0..width)
        .filter(|&col| {
            let first = tokens[part[0]][col];
            part.iter().all(|&i| tokens[i][col] == first)
        })
        .count();
    constant_columns as f64 / width as f64
}

/// Choose the split position: the lowest-cardinality column with more than
/// one distinct token, skipping columns whose distinct ratio exceeds
/// `upper_bound` (those read as free-form variable positions, not
/// structure).
fn split_position(tokens: &[Vec<&str>], part: &[usize], upper_bound: f64) -> Option<usize> {
    let width = tokens[part[0]].len();
    let rows = part.len() as f64;

    let mut best: Option<(usize, usize)> = None; // (cardinality, column)
    for col in 0..width {
        let mut distinct: Vec<&str> = part.iter().map(|&i| tokens[i][col]).collect();
        distinct.sort_unstable();
        distinct.dedup();

        let cardinality = distinct.len();
        if cardinality <= 1 || (cardinality as f64 / rows) > upper_bound {
            continue;
        }
        if best.map_or(true, |(c, _)| cardinality < c) {
            best = Some((cardinality, col));
        }
    }
    best.map(|(_, col)| col)
}
