//! AIGRADE - multi-pass consensus grading CLI
//!
//! ## Commands
//!
//! - `grade`: grade one submission through the full pipeline
//! - `batch`: grade every submission in a directory
//! - `check`: validate and score an existing raw grading result
//! - `report`: print a persisted result artifact

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{info, Level};

use aigrade_core::obs::GradingSpan;
use aigrade_core::reconcile::align_in_place;
use aigrade_core::reporting::write_result_json;
use aigrade_core::validator::{audit, ValidationIssues};
use aigrade_core::{
    grade_batch, read_result_artifact, render_result_md, validate_and_repair,
    write_result_artifact, AccuracyGate, AccuracyReport, BatchSummary, FinalResult,
    GradingConfig, GradingPipeline, GradingRequest, GradingStats, PassMode,
};
use grading_oracle::fakes::ScriptedOracle;
use grading_oracle::{
    parse_raw_result, FileMetadata, GradingOracle, HttpOracle, HttpOracleConfig,
    RawGradingResult, Rubric,
};

const DEFAULT_RESULTS_DIR: &str = ".aigrade/results";

#[derive(Parser)]
#[command(name = "aigrade")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Multi-pass consensus grading with accuracy gating", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Engine configuration (TOML)
    #[arg(long, global = true, env = "AIGRADE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Where grades come from.
#[derive(Args, Debug, Clone)]
struct OracleArgs {
    /// Replay file of canned oracle replies keyed by approach (takes precedence over --endpoint)
    #[arg(long)]
    replay: Option<PathBuf>,

    /// HTTP grading endpoint
    #[arg(long, env = "AIGRADE_ORACLE_URL")]
    endpoint: Option<String>,

    /// Bearer token for the grading endpoint
    #[arg(long, env = "AIGRADE_ORACLE_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

/// Grading inputs shared by `grade` and `batch`.
#[derive(Args, Debug, Clone)]
struct GradeArgs {
    /// Rubric file (JSON)
    #[arg(short, long)]
    rubric: Option<PathBuf>,

    /// Question or assignment prompt
    #[arg(short, long, default_value = "")]
    question: String,

    /// Answer key file
    #[arg(long)]
    answer_key: Option<PathBuf>,

    /// Base strictness in [0, 1]
    #[arg(short, long, default_value_t = 0.5)]
    strictness: f64,

    /// Grade with the five evaluator personas instead of the three approaches
    #[arg(long)]
    multi_agent: bool,

    /// Accept low-confidence results without the retry round
    #[arg(long)]
    no_high_accuracy: bool,

    /// Directory for result artifacts
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade a single submission
    Grade {
        /// Submission text file
        #[arg(long)]
        submission: PathBuf,

        #[command(flatten)]
        grade: GradeArgs,

        #[command(flatten)]
        oracle: OracleArgs,

        /// Print a markdown summary instead of JSON
        #[arg(long)]
        markdown: bool,

        /// Also write the result JSON to this file
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Grade every .txt/.md submission in a directory
    Batch {
        /// Directory of submissions
        #[arg(long)]
        dir: PathBuf,

        /// Submissions graded concurrently
        #[arg(long, default_value_t = 4)]
        concurrency: usize,

        #[command(flatten)]
        grade: GradeArgs,

        #[command(flatten)]
        oracle: OracleArgs,
    },

    /// Validate, align and score an existing raw grading result
    Check {
        /// Raw oracle reply (JSON, or text containing a JSON object)
        #[arg(long)]
        result: PathBuf,

        /// Rubric file (JSON)
        #[arg(short, long)]
        rubric: Option<PathBuf>,
    },

    /// Print a persisted result artifact after verifying its digest
    Report {
        /// Request id of the result
        #[arg(long)]
        run: String,

        /// Artifact directory
        #[arg(long, default_value = DEFAULT_RESULTS_DIR)]
        dir: PathBuf,

        /// Print a markdown summary instead of JSON
        #[arg(long)]
        markdown: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    aigrade_core::telemetry::init_tracing(cli.json, level);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Grade {
            submission,
            grade,
            oracle,
            markdown,
            save,
        } => cmd_grade(config, &submission, &grade, &oracle, markdown, save.as_deref()).await,
        Commands::Batch {
            dir,
            concurrency,
            grade,
            oracle,
        } => cmd_batch(config, &dir, concurrency, &grade, &oracle).await,
        Commands::Check { result, rubric } => cmd_check(config, &result, rubric.as_deref()),
        Commands::Report { run, dir, markdown } => cmd_report(&run, &dir, markdown),
    }
}

fn load_config(path: Option<&Path>) -> Result<GradingConfig> {
    let config = match path {
        Some(path) => GradingConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => GradingConfig::default(),
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn load_rubric(path: &Path) -> Result<Rubric> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read rubric {}", path.display()))?;
    let rubric: Rubric = serde_json::from_slice(&bytes)
        .with_context(|| format!("Rubric is not valid JSON: {}", path.display()))?;
    Ok(rubric)
}

fn read_text(path: &Path, what: &str) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {what} {}", path.display()))
}

fn build_oracle(args: &OracleArgs, timeout: Duration) -> Result<Arc<dyn GradingOracle>> {
    if let Some(replay) = &args.replay {
        let oracle = ScriptedOracle::from_json_file(replay)
            .with_context(|| format!("Failed to load replay {}", replay.display()))?;
        return Ok(Arc::new(oracle));
    }
    let Some(endpoint) = &args.endpoint else {
        anyhow::bail!("No oracle configured: pass --replay or --endpoint (or set AIGRADE_ORACLE_URL)");
    };
    let mut config = HttpOracleConfig::new(endpoint.clone());
    config.request_timeout = timeout;
    if let Some(token) = &args.token {
        config = config.with_token(token.clone());
    }
    let oracle = HttpOracle::new(config).context("Failed to build HTTP oracle")?;
    Ok(Arc::new(oracle))
}

/// Build a request for `submission_text` from the shared grading flags.
fn build_request(submission_text: String, args: &GradeArgs, rubric: Option<&Rubric>) -> Result<GradingRequest> {
    let mut request = GradingRequest::new(submission_text)
        .with_question(args.question.clone())
        .with_strictness(args.strictness)
        .require_high_accuracy(!args.no_high_accuracy);
    if args.multi_agent {
        request = request.with_mode(PassMode::MultiAgent);
    }
    if let Some(rubric) = rubric {
        request = request.with_rubric(rubric.clone());
    }
    if let Some(path) = &args.answer_key {
        request = request.with_answer_key(read_text(path, "answer key")?);
    }
    Ok(request)
}

fn build_pipeline(config: GradingConfig, oracle: &OracleArgs) -> Result<GradingPipeline> {
    let oracle = build_oracle(oracle, config.coordinator.oracle_timeout())?;
    Ok(GradingPipeline::new(oracle, config, Arc::new(GradingStats::new())))
}

/// Grade one submission
async fn cmd_grade(
    config: GradingConfig,
    submission: &Path,
    args: &GradeArgs,
    oracle: &OracleArgs,
    markdown: bool,
    save: Option<&Path>,
) -> Result<()> {
    let rubric = args.rubric.as_deref().map(load_rubric).transpose()?;
    let text = read_text(submission, "submission")?;
    let request = build_request(text, args, rubric.as_ref())?.with_file_metadata(file_metadata(submission));

    let pipeline = build_pipeline(config, oracle)?;
    let result = pipeline
        .grade_with_accuracy(request)
        .await
        .context("Grading failed")?;
    pipeline.stats().flush();

    if let Some(dir) = &args.out {
        let path = write_result_artifact(dir, &result)
            .with_context(|| format!("Failed to write result artifact under {}", dir.display()))?;
        info!(path = %path.display(), "result artifact written");
    }
    if let Some(path) = save {
        write_result_json(path, &result)?;
    }
    print_result(&result, markdown)
}

/// Grade a directory of submissions
async fn cmd_batch(
    config: GradingConfig,
    dir: &Path,
    concurrency: usize,
    args: &GradeArgs,
    oracle: &OracleArgs,
) -> Result<()> {
    let rubric = args.rubric.as_deref().map(load_rubric).transpose()?;
    let files = collect_submissions(dir)?;
    if files.is_empty() {
        anyhow::bail!("No .txt or .md submissions found in {}", dir.display());
    }

    let mut requests = Vec::with_capacity(files.len());
    for path in &files {
        let id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let text = read_text(path, "submission")?;
        let request = build_request(text, args, rubric.as_ref())?.with_file_metadata(file_metadata(path));
        requests.push((id, request));
    }

    let pipeline = build_pipeline(config, oracle)?;
    let outcomes = grade_batch(&pipeline, requests, concurrency).await;

    let mut rows = Vec::with_capacity(outcomes.len());
    for outcome in &outcomes {
        match &outcome.result {
            Ok(result) => {
                if let Some(out) = &args.out {
                    write_result_artifact(out, result)
                        .with_context(|| format!("Failed to write artifact for {}", outcome.id))?;
                }
                rows.push(BatchRow {
                    id: &outcome.id,
                    request_id: Some(result.request_id.to_string()),
                    score: Some(result.score),
                    total: Some(result.total),
                    accuracy_level: Some(result.accuracy_metrics.accuracy_level.to_string()),
                    error: None,
                });
            }
            Err(e) => rows.push(BatchRow {
                id: &outcome.id,
                request_id: None,
                score: None,
                total: None,
                accuracy_level: None,
                error: Some(e.to_string()),
            }),
        }
    }

    let report = BatchReport {
        summary: BatchSummary::from_outcomes(&outcomes),
        results: rows,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[derive(Serialize)]
struct BatchRow<'a> {
    id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    total: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    accuracy_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct BatchReport<'a> {
    summary: BatchSummary,
    results: Vec<BatchRow<'a>>,
}

#[derive(Serialize)]
struct CheckReport {
    issues: ValidationIssues,
    repaired: RawGradingResult,
    accuracy: AccuracyReport,
}

/// Validate and score a raw result offline
fn cmd_check(config: GradingConfig, result_path: &Path, rubric: Option<&Path>) -> Result<()> {
    let _span = GradingSpan::enter("check");
    let rubric = rubric.map(load_rubric).transpose()?;
    let text = read_text(result_path, "result")?;
    let raw = parse_raw_result(&text)
        .with_context(|| format!("Failed to parse {}", result_path.display()))?;

    let report = check_result(&config, raw, rubric.as_ref());
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn check_result(config: &GradingConfig, raw: RawGradingResult, rubric: Option<&Rubric>) -> CheckReport {
    let issues = audit(&raw);
    let mut repaired = validate_and_repair(raw, rubric);
    if let Some(rubric) = rubric {
        align_in_place(&mut repaired, rubric);
    }
    let gate = AccuracyGate::new(config.gate.clone(), config.quality.clone());
    let accuracy = gate.evaluate(&repaired, rubric);
    CheckReport {
        issues,
        repaired,
        accuracy,
    }
}

/// Print a persisted result
fn cmd_report(run: &str, dir: &Path, markdown: bool) -> Result<()> {
    let result = read_result_artifact(dir, run)
        .with_context(|| format!("Failed to read result {run} from {}", dir.display()))?;
    print_result(&result, markdown)
}

fn print_result(result: &FinalResult, markdown: bool) -> Result<()> {
    if markdown {
        print!("{}", render_result_md(result));
    } else {
        println!("{}", serde_json::to_string_pretty(result)?);
    }
    Ok(())
}

fn file_metadata(path: &Path) -> FileMetadata {
    let mut metadata = path
        .file_name()
        .map(|n| FileMetadata::named(n.to_string_lossy()))
        .unwrap_or_default();
    metadata.content_type = match path.extension().and_then(|e| e.to_str()) {
        Some("md") => Some("text/markdown".to_string()),
        Some("txt") => Some("text/plain".to_string()),
        _ => None,
    };
    metadata
}

/// Submission files in `dir`, sorted by name.
fn collect_submissions(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let path = entry?.path();
        let is_submission = path.is_file()
            && matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("txt") | Some("md")
            );
        if is_submission {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
