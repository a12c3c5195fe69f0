//! Dataset loading: log-format extraction and ground-truth labels
//!
//! A log format template such as
//! `<Date> <Time> <Pid> <Level> <Component>: <Content>` is compiled into an
//! anchored regex with one named capture group per `<Name>` placeholder.
//! Each input line is matched against it to produce a `LogRecord`; lines
//! that do not match are skipped and counted, never fatal.

use crate::error::{Result, TuneError};
use crate::preprocess::Preprocessor;
use ahash::AHashMap;
use regex::Regex;
use std::path::Path;

/// Field name that holds the free-text message body. Parsers tokenize this
/// field; everything else is header metadata.
pub const CONTENT_FIELD: &str = "Content";

/// Compiled log-format template
pub struct LogFormat {
    headers: Vec<String>,
    regex: Regex,
}

impl LogFormat {
    /// Build the extraction regex from a format template.
    ///
    /// `<Name>` placeholders become named capture groups matching as little
    /// as possible; whitespace runs between placeholders match any amount of
    /// whitespace; other literal text is matched verbatim.
    pub fn new(format: &str) -> Result<Self> {
        let mut headers = Vec::new();
        let mut pattern = String::from("^");

        let placeholder = Regex::new(r"<([^<>]+)>").map_err(|e| {
            TuneError::Config(format!("internal placeholder regex failed: {}", e))
        })?;

        let mut last_end = 0;
        for caps in placeholder.captures_iter(format) {
            let whole = caps.get(0).unwrap();
            let name = caps.get(1).unwrap().as_str();

            Self::push_literal(&mut pattern, &format[last_end..whole.start()]);
            pattern.push_str(&format!("(?P<{}>.*?)", name));
            headers.push(name.to_string());
            last_end = whole.end();
        }
        Self::push_literal(&mut pattern, &format[last_end..]);
        pattern.push('$');

        if headers.is_empty() {
            return Err(TuneError::Config(format!(
                "log_format '{}' declares no <Name> placeholders",
                format
            )));
        }

        let regex = Regex::new(&pattern).map_err(|e| {
            TuneError::Config(format!("log_format '{}' compiles to invalid regex: {}", format, e))
        })?;

        Ok(Self { headers, regex })
    }

    /// Escape literal text, collapsing whitespace runs to `\s+` so header
    /// alignment differences do not reject lines
    fn push_literal(pattern: &mut String, literal: &str) {
        let mut in_whitespace = false;
        for c in literal.chars() {
            if c.is_whitespace() {
                if !in_whitespace {
                    pattern.push_str(r"\s+");
                    in_whitespace = true;
                }
            } else {
                in_whitespace = false;
                pattern.push_str(&regex::escape(&c.to_string()));
            }
        }
    }

    /// Header names in template order
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Match one line, extracting all fields. Returns None when the line
    /// does not follow the format.
    pub fn extract(&self, line: &str) -> Option<AHashMap<String, String>> {
        let caps = self.regex.captures(line.trim())?;
        Some(
            self.headers
                .iter()
                .map(|h| (h.clone(), caps[h.as_str()].to_string()))
                .collect(),
        )
    }
}

/// One structured log message
#[derive(Debug, Clone)]
pub struct LogRecord {
    /// 1-based position among the successfully parsed lines
    pub line_id: usize,
    /// Original unmodified line
    pub raw: String,
    /// Fields extracted per the log format
    pub fields: AHashMap<String, String>,
    /// Message body after preprocessing; what the parsers tokenize
    pub content: String,
}

impl LogRecord {
    /// Whitespace-separated tokens of the (preprocessed) content
    pub fn tokens(&self) -> Vec<&str> {
        self.content.split_whitespace().collect()
    }
}

/// Loaded dataset plus load statistics
pub struct Dataset {
    pub records: Vec<LogRecord>,
    /// Lines that did not match the log format
    pub skipped: usize,
}

impl Dataset {
    /// Read a raw log file, one record per line.
    ///
    /// Malformed lines are a reportable non-fatal condition: they are
    /// skipped and counted.
    pub fn load(path: &Path, format: &LogFormat) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| TuneError::Io {
            source: e,
            context: format!("Failed to read log file: {}", path.display()),
        })?;
        Ok(Self::from_lines(text.lines(), format))
    }

    /// Parse already-split lines against the format
    pub fn from_lines<'a>(lines: impl Iterator<Item = &'a str>, format: &LogFormat) -> Self {
        let mut records = Vec::new();
        let mut skipped = 0;

        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            match format.extract(line) {
                Some(fields) => {
                    let content = fields
                        .get(CONTENT_FIELD)
                        .cloned()
                        .unwrap_or_else(|| line.trim().to_string());
                    records.push(LogRecord {
                        line_id: records.len() + 1,
                        raw: line.to_string(),
                        fields,
                        content,
                    });
                }
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            tracing::warn!(skipped, "lines did not match the log format and were skipped");
        }

        Self { records, skipped }
    }

    /// Rewrite every record's content through the preprocessor, once,
    /// before the search begins. Records are read-only afterwards.
    pub fn apply_masks(&mut self, preprocessor: &Preprocessor) {
        for record in &mut self.records {
            record.content = preprocessor.apply(&record.content);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Load per-record ground-truth template labels: one label per line, in the
/// same order as the parsed records. Blank lines are ignored.
pub fn load_ground_truth(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path).map_err(|e| TuneError::Io {
        source: e,
        context: format!("Failed to read ground truth file: {}", path.display()),
    })?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORMAT: &str = "<Date> <Time> <Pid> <Level> <Component>: <Content>";

    #[test]
    fn test_format_extracts_named_fields() {
        let format = LogFormat::new(FORMAT).unwrap();
        assert_eq!(format.headers(), ["Date", "Time", "Pid", "Level", "Component"]);

        let fields = format
            .extract("081109 203615 148 INFO dfs.DataNode: Receiving block blk_1 src: /10.0.0.1")
            .unwrap();
        assert_eq!(fields["Date"], "081109");
        assert_eq!(fields["Level"], "INFO");
        assert_eq!(fields["Component"], "dfs.DataNode");
        assert_eq!(fields["Content"], "Receiving block blk_1 src: /10.0.0.1");
    }

    #[test]
    fn test_format_requires_placeholders() {
        assert!(LogFormat::new("no placeholders here").is_err());
    }

    #[test]
    fn test_malformed_lines_skipped_and_counted() {
        let format = LogFormat::new(FORMAT).unwrap();
        let lines = [
            "081109 203615 148 INFO dfs.DataNode: block received",
            "this line does not follow the format",
            "081109 203807 222 INFO dfs.DataNode: block served",
            "",
        ];
        let dataset = Dataset::from_lines(lines.iter().copied(), &format);
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.skipped, 1);
        assert_eq!(dataset.records[0].line_id, 1);
        assert_eq!(dataset.records[1].line_id, 2);
    }

    #[test]
    fn test_flexible_whitespace_between_fields() {
        let format = LogFormat::new(FORMAT).unwrap();
        assert!(format
            .extract("081109  203615   148 INFO dfs.DataNode: padded columns")
            .is_some());
    }

    #[test]
    fn test_masks_rewrite_content_only_once_loaded() {
        let format = LogFormat::new(FORMAT).unwrap();
        let lines = ["081109 203615 148 INFO dfs.DataNode: Receiving block blk_99"];
        let mut dataset = Dataset::from_lines(lines.iter().copied(), &format);

        let pre = Preprocessor::compile(&[r"blk_-?\d+".to_string()]).unwrap();
        dataset.apply_masks(&pre);

        assert_eq!(dataset.records[0].content, "Receiving block <*>");
        // Raw line is untouched
        assert!(dataset.records[0].raw.contains("blk_99"));
    }

    #[test]
    fn test_tokens_split_on_whitespace() {
        let record = LogRecord {
            line_id: 1,
            raw: String::new(),
            fields: AHashMap::new(),
            content: "Receiving block <*> src".to_string(),
        };
        assert_eq!(record.tokens(), vec!["Receiving", "block", "<*>", "src"]);
    }
}
