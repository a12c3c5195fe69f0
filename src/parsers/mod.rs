//! Parser adapters: a uniform invocation contract over the supported
//! log-parsing algorithms
//!
//! The supported methods form a closed set of variants behind one
//! `parse(records, params) -> ParseResult` contract. The search loop never
//! inspects a variant; adding a method means adding a variant and its
//! required-parameter list here.

mod iplom;
mod logmine;
mod regex;

pub use iplom::IplomParser;
pub use logmine::LogmineParser;
pub use regex::RegexParser;

use crate::config::ParserConfig;
use crate::dataset::LogRecord;
use crate::error::{Result, TuneError};
use crate::grid::ParameterAssignment;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Mask token marking a variable position in an extracted template
pub const TEMPLATE_WILDCARD: &str = "<*>";

/// Supported log parsing methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Iplom,
    Logmine,
    Regex,
}

impl Method {
    /// Parameters the method interprets; the configuration must declare
    /// exactly these (checked at load time, before any grid work)
    pub fn required_parameters(&self) -> &'static [&'static str] {
        match self {
            Method::Iplom => &["step2Support", "PST", "CT", "lowerBound", "upperBound"],
            Method::Logmine => &["max_dist", "k", "levels"],
            Method::Regex => &[],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Iplom => "iplom",
            Method::Logmine => "logmine",
            Method::Regex => "regex",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One extracted event template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    /// Stable identifier within one parse (E1..En, or T1..Tn for regex
    /// templates which carry file-order ids)
    pub id: String,
    /// Template pattern with variable positions masked
    pub pattern: String,
    /// Number of records assigned to this template
    pub count: usize,
}

/// Result of one parser invocation: the extracted templates and, per input
/// record, which template it was assigned to (`None` = unmatched).
/// Transient; held only long enough to be scored.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseResult {
    pub templates: Vec<Template>,
    pub assignments: Vec<Option<usize>>,
}

impl ParseResult {
    /// Number of records that received a template
    pub fn matched(&self) -> usize {
        self.assignments.iter().filter(|a| a.is_some()).count()
    }
}

/// Algorithm-internal failure for one specific parameter assignment.
///
/// Recovered locally by the tuning engine and recorded as a non-scoring
/// leaderboard entry; never aborts the search.
#[derive(Debug, Clone, Error)]
#[error("{reason}")]
pub struct ParseFailure {
    pub reason: String,
}

impl ParseFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Fetch a parameter the variant requires from the assignment
pub(crate) fn require(
    params: &ParameterAssignment,
    name: &str,
) -> std::result::Result<f64, ParseFailure> {
    params
        .get(name)
        .ok_or_else(|| ParseFailure::new(format!("parameter '{}' absent from assignment", name)))
}

/// Merge token rows into a template pattern: positions where every row
/// agrees keep their token, all others become the wildcard. Rows of unequal
/// length are padded with wildcards.
pub(crate) fn template_pattern(rows: &[Vec<&str>]) -> String {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut out: Vec<&str> = Vec::with_capacity(width);

    for col in 0..width {
        let mut first: Option<&str> = None;
        let mut constant = true;
        for row in rows {
            match (row.get(col), first) {
                (Some(&tok), None) => first = Some(tok),
                (Some(&tok), Some(seen)) if tok == seen => {}
                _ => {
                    constant = false;
                    break;
                }
            }
        }
        match (constant, first) {
            (true, Some(tok)) => out.push(tok),
            _ => out.push(TEMPLATE_WILDCARD),
        }
    }
    out.join(" ")
}

/// Uniform invocation wrapper over the parsing algorithms
#[derive(Debug)]
pub enum ParserAdapter {
    Iplom(IplomParser),
    Logmine(LogmineParser),
    Regex(RegexParser),
}

impl ParserAdapter {
    /// Construct the adapter selected by the configuration.
    ///
    /// The regex method loads and compiles its template file here, so a
    /// malformed template fails at load time.
    pub fn from_config(config: &ParserConfig) -> Result<Self> {
        match config.method {
            Method::Iplom => Ok(ParserAdapter::Iplom(IplomParser)),
            Method::Logmine => Ok(ParserAdapter::Logmine(LogmineParser)),
            Method::Regex => {
                let path = config.templates_file.as_ref().ok_or_else(|| {
                    TuneError::Config(
                        "method 'regex' requires parser.templates_file".to_string(),
                    )
                })?;
                Ok(ParserAdapter::Regex(RegexParser::from_file(path)?))
            }
        }
    }

    pub fn method(&self) -> Method {
        match self {
            ParserAdapter::Iplom(_) => Method::Iplom,
            ParserAdapter::Logmine(_) => Method::Logmine,
            ParserAdapter::Regex(_) => Method::Regex,
        }
    }

    /// Run the algorithm over the preprocessed records with one concrete
    /// parameter assignment. Deterministic for a given (records, params)
    /// pair.
    pub fn parse(
        &self,
        records: &[LogRecord],
        params: &ParameterAssignment,
    ) -> std::result::Result<ParseResult, ParseFailure> {
        match self {
            ParserAdapter::Iplom(p) => p.parse(records, params),
            ParserAdapter::Logmine(p) => p.parse(records, params),
            ParserAdapter::Regex(p) => p.parse(records, params),
        }
    }
}
