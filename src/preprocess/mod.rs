//! Preprocessing of log content before parsing
//!
//! Masks variable tokens (block ids, IP addresses, paths) so the parsing
//! algorithms see stable structure instead of run-specific values. Rules are
//! ordered regex substitutions: earlier rules may create text matched by
//! later rules, so application order is part of the contract.

use crate::error::{Result, TuneError};
use regex::Regex;

/// Mask token substituted for every rule match, following the template
/// convention of treating `<*>` as a variable position.
pub const MASK_TOKEN: &str = "<*>";

/// Compiled preprocessing rules, applied in declaration order.
#[derive(Debug)]
pub struct Preprocessor {
    rules: Vec<Regex>,
}

impl Preprocessor {
    /// Compile the configured patterns.
    ///
    /// A malformed pattern fails here, at configuration-load time, never at
    /// per-line apply time.
    pub fn compile(patterns: &[String]) -> Result<Self> {
        let rules = patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| TuneError::InvalidPreprocessRule {
                    pattern: p.clone(),
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Apply each substitution in order, replacing every match of rule *i*
    /// with the mask token before rule *i+1* runs. Pure function of
    /// (line, rules).
    pub fn apply(&self, line: &str) -> String {
        let mut result = line.to_string();
        for rule in &self.rules {
            result = rule.replace_all(&result, MASK_TOKEN).to_string();
        }
        result
    }

    /// Number of compiled rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masks_every_match() {
        let pre = Preprocessor::compile(&[r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b".to_string()])
            .unwrap();
        let out = pre.apply("Connection from 10.0.0.1 to 10.0.0.2 closed");
        assert_eq!(out, "Connection from <*> to <*> closed");
    }

    #[test]
    fn test_rules_apply_in_order() {
        // First rule rewrites the block id, second only matches the mask it
        // left behind
        let pre = Preprocessor::compile(&[
            r"blk_-?\d+".to_string(),
            r"received <\*>".to_string(),
        ])
        .unwrap();
        let out = pre.apply("received blk_-123456");
        assert_eq!(out, "<*>");
    }

    #[test]
    fn test_apply_is_idempotent_per_input() {
        let pre = Preprocessor::compile(&[r"\d+".to_string()]).unwrap();
        let line = "task 42 finished in 17ms";
        assert_eq!(pre.apply(line), pre.apply(line));
    }

    #[test]
    fn test_invalid_rule_fails_at_compile_time() {
        let err = Preprocessor::compile(&[r"(unclosed".to_string()]).unwrap_err();
        assert!(matches!(err, TuneError::InvalidPreprocessRule { .. }));
    }

    #[test]
    fn test_no_rules_is_identity() {
        let pre = Preprocessor::compile(&[]).unwrap();
        assert!(pre.is_empty());
        assert_eq!(pre.apply("untouched line"), "untouched line");
    }
}
