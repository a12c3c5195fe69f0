use crate::config::TuneConfig;
use crate::error::{Result, TuneError, ValidationError};
use crate::parsers::Method;
use regex::Regex;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every problem with its
    /// configuration path before reporting
    pub fn validate(config: &TuneConfig) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_log_format(config, &mut errors);
        Self::validate_preprocess(config, &mut errors);
        Self::validate_parameters(config, &mut errors);
        Self::validate_templates_file(config, &mut errors);
        Self::validate_search(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(TuneError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &TuneConfig, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_log_format(config: &TuneConfig, errors: &mut Vec<ValidationError>) {
        let format = &config.tuning.log_format;
        if format.is_empty() {
            errors.push(ValidationError::new(
                "tuning.log_format",
                "Log format cannot be empty",
            ));
            return;
        }
        if !format.contains('<') || !format.contains('>') {
            errors.push(ValidationError::new(
                "tuning.log_format",
                "Log format must declare <Name> placeholders",
            ));
        }
        if !format.contains("<Content>") {
            errors.push(ValidationError::new(
                "tuning.log_format",
                "Log format must include the <Content> placeholder",
            ));
        }
    }

    fn validate_preprocess(config: &TuneConfig, errors: &mut Vec<ValidationError>) {
        for (idx, pattern) in config.tuning.preprocess.iter().enumerate() {
            if let Err(e) = Regex::new(pattern) {
                errors.push(ValidationError::new(
                    format!("tuning.preprocess[{}]", idx),
                    format!("Invalid regex '{}': {}", pattern, e),
                ));
            }
        }
    }

    fn validate_parameters(config: &TuneConfig, errors: &mut Vec<ValidationError>) {
        for spec in &config.parser.parameters {
            let path = format!("parser.parameters.{}", spec.name);

            if spec.name.is_empty() {
                errors.push(ValidationError::new(
                    "parser.parameters",
                    "Parameter name cannot be empty",
                ));
            }
            if let Err(e) = spec.validate() {
                errors.push(ValidationError::new(path.clone(), e.to_string()));
            }

            let duplicates = config
                .parser
                .parameters
                .iter()
                .filter(|p| p.name == spec.name)
                .count();
            if duplicates > 1 {
                errors.push(ValidationError::new(
                    path,
                    format!("Parameter '{}' declared more than once", spec.name),
                ));
            }
        }
    }

    fn validate_templates_file(config: &TuneConfig, errors: &mut Vec<ValidationError>) {
        if config.parser.method == Method::Regex {
            match &config.parser.templates_file {
                None => errors.push(ValidationError::new(
                    "parser.templates_file",
                    "Method 'regex' requires a template file",
                )),
                Some(path) if path.as_os_str().is_empty() => {
                    errors.push(ValidationError::new(
                        "parser.templates_file",
                        "Template file path cannot be empty",
                    ));
                }
                Some(_) => {}
            }
        }
    }

    fn validate_search(config: &TuneConfig, errors: &mut Vec<ValidationError>) {
        if config.search.point_timeout_secs == 0 {
            errors.push(ValidationError::new(
                "search.point_timeout_secs",
                "Per-point timeout must be greater than 0",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::ParameterSpec;

    #[test]
    fn test_valid_config() {
        let config = TuneConfig::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_invalid_preprocess_regex() {
        let mut config = TuneConfig::default();
        config.tuning.preprocess.push("(unclosed".to_string());
        let err = ConfigValidator::validate(&config).unwrap_err();
        match err {
            TuneError::ConfigValidation { errors } => {
                assert!(errors.iter().any(|e| e.path == "tuning.preprocess[2]"));
            }
            other => panic!("expected ConfigValidation, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_parameter_bounds_collected() {
        let mut config = TuneConfig::default();
        config.parser.parameters[0] = ParameterSpec::new("step2Support", 0.5, 0.1, 0.05);
        config.parser.parameters[2] = ParameterSpec::new("CT", 0.3, 0.5, 0.0);

        let err = ConfigValidator::validate(&config).unwrap_err();
        match err {
            TuneError::ConfigValidation { errors } => {
                // Both problems reported together
                assert_eq!(errors.len(), 2);
            }
            other => panic!("expected ConfigValidation, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_parameter_rejected() {
        let mut config = TuneConfig::default();
        config
            .parser
            .parameters
            .push(ParameterSpec::fixed("PST", 0.0));
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_log_format_must_carry_content() {
        let mut config = TuneConfig::default();
        config.tuning.log_format = "<Date> <Time>".to_string();
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_regex_method_needs_templates_file() {
        let mut config = TuneConfig::default();
        config.parser.method = Method::Regex;
        config.parser.parameters.clear();
        config.parser.templates_file = None;
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = TuneConfig::default();
        config.search.point_timeout_secs = 0;
        assert!(ConfigValidator::validate(&config).is_err());
    }
}
