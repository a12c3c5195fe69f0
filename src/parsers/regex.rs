//! Regex-template log parser
//!
//! Parses against manually curated event templates: a newline-separated
//! file of regular expressions, one per template, assigned ids T1..Tn in
//! file order. A record belongs to the first template whose regex fully
//! matches its content; records matching nothing stay unmatched.

use crate::dataset::LogRecord;
use crate::error::{Result, TuneError};
use crate::grid::ParameterAssignment;
use crate::parsers::{ParseFailure, ParseResult, Template};
use ::regex::Regex;
use std::path::Path;

#[derive(Debug)]
pub struct RegexParser {
    templates: Vec<(String, String, Regex)>, // (id, source pattern, compiled)
}

impl RegexParser {
    /// Load and compile the template file.
    ///
    /// Every template is validated here, at load time; a malformed regex
    /// reports its line number. Blank lines are ignored.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| TuneError::Io {
            source: e,
            context: format!("Failed to read template file: {}", path.display()),
        })?;

        let mut templates = Vec::new();
        for (line_no, line) in text.lines().enumerate() {
            let pattern = line.trim();
            if pattern.is_empty() {
                continue;
            }
            // Anchor so a template must match the whole content
            let compiled =
                Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| TuneError::InvalidTemplate {
                    line: line_no + 1,
                    message: e.to_string(),
                })?;
            let id = format!("T{}", templates.len() + 1);
            templates.push((id, pattern.to_string(), compiled));
        }

        if templates.is_empty() {
            return Err(TuneError::Config(format!(
                "template file {} contains no templates",
                path.display()
            )));
        }

        Ok(Self { templates })
    }

    /// Match every record's content against the templates, first match
    /// wins. Takes no tunable parameters.
    pub fn parse(
        &self,
        records: &[LogRecord],
        _params: &ParameterAssignment,
    ) -> std::result::Result<ParseResult, ParseFailure> {
        if records.is_empty() {
            return Err(ParseFailure::new("empty dataset: nothing to match"));
        }

        let mut counts = vec![0usize; self.templates.len()];
        let mut matched_template = vec![None; records.len()];
        for (idx, record) in records.iter().enumerate() {
            let content = record.content.trim();
            if let Some(t) = self.templates.iter().position(|(_, _, re)| re.is_match(content)) {
                matched_template[idx] = Some(t);
                counts[t] += 1;
            }
        }

        // Report only the templates that occurred, remapping assignments
        let mut remap = vec![None; self.templates.len()];
        let mut templates = Vec::new();
        for (t, (id, pattern, _)) in self.templates.iter().enumerate() {
            if counts[t] > 0 {
                remap[t] = Some(templates.len());
                templates.push(Template {
                    id: id.clone(),
                    pattern: pattern.clone(),
                    count: counts[t],
                });
            }
        }
        let assignments = matched_template
            .into_iter()
            .map(|m| m.and_then(|t| remap[t]))
            .collect();

        Ok(ParseResult {
            templates,
            assignments,
        })
    }
}
