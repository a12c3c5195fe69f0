use logtune::cli::{Cli, Commands, ConfigAction};
use logtune::config::TuneConfig;
use logtune::dataset::{load_ground_truth, Dataset, LogFormat};
use logtune::error::{Result, TuneError};
use logtune::evaluate::{Evaluator, ScoreBreakdown};
use logtune::grid::ParameterAssignment;
use logtune::parsers::ParserAdapter;
use logtune::preprocess::Preprocessor;
use logtune::report;
use logtune::tuner::TuningSession;
use std::path::PathBuf;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Handle commands
    match cli.command {
        Commands::Tune {
            config,
            log_file,
            ground_truth,
            output,
            workers,
            timeout,
            emit_config,
            top,
        } => {
            cmd_tune(
                config,
                log_file,
                ground_truth,
                output,
                workers,
                timeout,
                emit_config,
                top,
            )
            .await?;
        }
        Commands::Parse {
            config,
            log_file,
            output,
            ground_truth,
        } => {
            cmd_parse(config, log_file, output, ground_truth)?;
        }
        Commands::Config { action } => {
            cmd_config(action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_filter = if verbose {
        "logtune=debug"
    } else {
        "logtune=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt().with_env_filter(filter).with_target(false).init();
}

#[allow(clippy::too_many_arguments)]
async fn cmd_tune(
    config_path: PathBuf,
    log_file: PathBuf,
    ground_truth: Option<PathBuf>,
    output: PathBuf,
    workers: Option<usize>,
    timeout: Option<u64>,
    emit_config: bool,
    top: usize,
) -> Result<()> {
    let mut config = TuneConfig::load(&config_path)?;
    if let Some(workers) = workers {
        config.search.workers = workers;
    }
    if let Some(timeout) = timeout {
        config.search.point_timeout_secs = timeout;
    }

    let format = LogFormat::new(&config.tuning.log_format)?;
    let dataset = Dataset::load(&log_file, &format)?;
    let labels = ground_truth
        .as_deref()
        .map(load_ground_truth)
        .transpose()?;

    let session = TuningSession::new(&config, dataset, labels)?;

    println!("==========================");
    println!("Starting tuning of {} . . .", config.parser.method);
    println!("  Session: {} ({})", session.name(), session.id());
    println!("  Grid points: {}", session.grid_len());

    // Ctrl-C cancels at grid-point granularity; recorded results survive
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, finishing in-flight grid points");
            let _ = cancel_tx.send(true);
        }
    });

    let tuning_report = session.run(cancel_rx).await?;

    report::print_leaderboard(&tuning_report, top);
    let paths = report::write_reports(&tuning_report, &output)?;
    println!("Tuning record available at {}", paths.record.display());

    if emit_config && tuning_report.best().is_some() {
        let config_path = report::emit_optimal_config(&config, &tuning_report, &output)?;
        println!("New template config file created: {}", config_path.display());
        println!("  (inspect manually before using it with 'logtune parse')");
    }

    if tuning_report.no_valid_configuration() {
        return Err(TuneError::NoValidConfiguration {
            attempted: tuning_report.stats.grid_points,
        });
    }

    if let Some(best) = tuning_report.best() {
        println!(
            "✓ Optimal combination of parameters for {}: {}",
            tuning_report.method, best.assignment
        );
    }
    println!("Tuning complete!");

    Ok(())
}

fn cmd_parse(
    config_path: PathBuf,
    log_file: PathBuf,
    output: PathBuf,
    ground_truth: Option<PathBuf>,
) -> Result<()> {
    let config = TuneConfig::load(&config_path)?;

    // A single parse run needs every parameter pinned (min == max), the
    // same degenerate-range convention the tuner emits
    let unpinned: Vec<&str> = config
        .parser
        .parameters
        .iter()
        .filter(|p| !p.is_fixed())
        .map(|p| p.name.as_str())
        .collect();
    if !unpinned.is_empty() {
        return Err(TuneError::Config(format!(
            "parse requires fixed parameters (min == max); still ranged: {}",
            unpinned.join(", ")
        )));
    }
    let assignment = ParameterAssignment::new(
        config
            .parser
            .parameters
            .iter()
            .map(|p| (p.name.clone(), p.min))
            .collect(),
    );

    let format = LogFormat::new(&config.tuning.log_format)?;
    let mut dataset = Dataset::load(&log_file, &format)?;
    let preprocessor = Preprocessor::compile(&config.tuning.preprocess)?;
    dataset.apply_masks(&preprocessor);

    println!("Parsing file: {}", log_file.display());

    let adapter = ParserAdapter::from_config(&config.parser)?;
    let parsed = adapter
        .parse(&dataset.records, &assignment)
        .map_err(|failure| {
            TuneError::Other(anyhow::anyhow!(
                "parsing failed for the pinned parameters: {}",
                failure
            ))
        })?;

    std::fs::create_dir_all(&output).map_err(|e| TuneError::Io {
        source: e,
        context: format!("Failed to create output directory: {}", output.display()),
    })?;

    let stem = log_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "log".to_string());

    // Structured log: one entry per record with its template assignment
    let structured: Vec<serde_json::Value> = dataset
        .records
        .iter()
        .zip(&parsed.assignments)
        .map(|(record, assignment)| {
            let (event_id, template) = assignment
                .map(|t| {
                    (
                        serde_json::json!(parsed.templates[t].id),
                        serde_json::json!(parsed.templates[t].pattern),
                    )
                })
                .unwrap_or((serde_json::Value::Null, serde_json::Value::Null));
            serde_json::json!({
                "line_id": record.line_id,
                "content": record.content,
                "event_id": event_id,
                "template": template,
            })
        })
        .collect();

    let structured_path = output.join(format!("{}_structured.json", stem));
    write_json(&structured_path, &serde_json::Value::Array(structured))?;

    let templates_path = output.join(format!("{}_templates.json", stem));
    let templates = serde_json::to_value(&parsed.templates).map_err(|e| TuneError::Json {
        source: e,
        context: "Failed to serialize templates".to_string(),
    })?;
    write_json(&templates_path, &templates)?;

    let unmatched = dataset.len() - parsed.matched();
    println!(
        "✓ Parsed {} log messages into {} unique events ({} unmatched, {} lines skipped)",
        dataset.len(),
        parsed.templates.len(),
        unmatched,
        dataset.skipped
    );
    println!("  Structured log: {}", structured_path.display());
    println!("  Event templates: {}", templates_path.display());

    // Optional evaluation of the fixed configuration
    if let Some(truth_path) = ground_truth {
        let labels = load_ground_truth(&truth_path)?;
        if labels.len() != dataset.len() {
            return Err(TuneError::Config(format!(
                "ground truth has {} labels for {} parsed records",
                labels.len(),
                dataset.len()
            )));
        }
        let evaluation =
            Evaluator::new(config.evaluation.objective).evaluate(&parsed, Some(&labels));
        println!("  Score ({}): {:.6}", config.evaluation.objective, evaluation.score);
        if let ScoreBreakdown::Supervised {
            accuracy,
            f_measure,
            precision,
            recall,
        } = evaluation.breakdown
        {
            println!(
                "  accuracy={:.4} f_measure={:.4} precision={:.4} recall={:.4}",
                accuracy, f_measure, precision, recall
            );
        }
    }

    Ok(())
}

fn write_json(path: &std::path::Path, value: &serde_json::Value) -> Result<()> {
    let content = serde_json::to_string_pretty(value).map_err(|e| TuneError::Json {
        source: e,
        context: format!("Failed to serialize {}", path.display()),
    })?;
    std::fs::write(path, content).map_err(|e| TuneError::Io {
        source: e,
        context: format!("Failed to write {}", path.display()),
    })
}

fn cmd_config(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show { file } => {
            let path = resolve_config_path(file)?;
            let config = TuneConfig::load(&path)?;
            println!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Validate { file } => {
            let path = resolve_config_path(file)?;
            // Load performs full validation including the method cross-check
            let config = TuneConfig::load(&path)?;
            println!(
                "✓ Configuration valid: method '{}' with {} tunable parameters",
                config.parser.method,
                config.parser.parameters.len()
            );
        }
        ConfigAction::Init { path, force } => {
            let path = match path {
                Some(p) => p,
                None => TuneConfig::default_path()?,
            };
            if path.exists() && !force {
                return Err(TuneError::Config(format!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                )));
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| TuneError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {}", parent.display()),
                })?;
            }
            TuneConfig::default().save(&path)?;
            println!("✓ Configuration initialized at {}", path.display());
        }
    }
    Ok(())
}

fn resolve_config_path(file: Option<PathBuf>) -> Result<PathBuf> {
    match file {
        Some(path) => Ok(path),
        None => TuneConfig::default_path(),
    }
}
