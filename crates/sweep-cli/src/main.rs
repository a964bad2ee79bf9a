use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use std::path::PathBuf;
use sweep_analysis::{RunsAnalysis, StrategyStatistics};
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "sweep",
    version = "0.1.0",
    about = "Sampling-strategy experiment analysis"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OperationArg {
    #[value(name = "sampling")]
    Sampling,
    #[value(name = "predicting")]
    Predicting,
    #[value(name = "predicting-svr")]
    PredictingSvr,
    #[value(name = "predicting-forest")]
    PredictingForest,
    #[value(name = "failure-rate")]
    FailureRate,
}

impl From<OperationArg> for sweep_dispatch::Operation {
    fn from(value: OperationArg) -> Self {
        match value {
            OperationArg::Sampling => sweep_dispatch::Operation::Sampling,
            OperationArg::Predicting => sweep_dispatch::Operation::Predicting,
            OperationArg::PredictingSvr => sweep_dispatch::Operation::PredictingSvr,
            OperationArg::PredictingForest => sweep_dispatch::Operation::PredictingForest,
            OperationArg::FailureRate => sweep_dispatch::Operation::FailureRate,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    AnalyzeRuns {
        #[arg(long, default_value = "sweep.yaml")]
        manifest: PathBuf,
        #[arg(long)]
        runs_dir: Option<PathBuf>,
        #[arg(long)]
        summary_dir: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    AnalyzeSampling {
        #[arg(long, default_value = "sweep.yaml")]
        manifest: PathBuf,
        #[arg(long)]
        summary_dir: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    SubmitJobs {
        cluster: String,
        strategy: String,
        #[arg(value_enum)]
        operation: OperationArg,
        #[arg(long, default_value = "sweep.yaml")]
        manifest: PathBuf,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let json_mode = command_json_mode(&cli.command);
    match run_command(cli.command) {
        Ok(Some(payload)) => {
            emit_json(&payload);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            if json_mode {
                emit_json(&json_error("command_failed", err.to_string(), json!({})));
                std::process::exit(1);
            }
            Err(err)
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run_command(command: Commands) -> Result<Option<Value>> {
    match command {
        Commands::AnalyzeRuns {
            manifest,
            runs_dir,
            summary_dir,
            json,
        } => {
            let manifest = sweep_core::load_manifest(&manifest)?;
            let runs_dir = runs_dir.unwrap_or_else(|| manifest.paths.runs.clone());
            let summary_dir = summary_dir.unwrap_or_else(|| manifest.paths.summary.clone());
            let mut analyses = Vec::new();
            let mut failed = Vec::new();
            for case_study in &manifest.case_studies {
                info!(case_study = %case_study.name, "analyzing runs");
                match sweep_analysis::analyze_case_study_runs(
                    &runs_dir,
                    &summary_dir,
                    &case_study.name,
                    &manifest.strategies,
                ) {
                    Ok(analysis) => analyses.push(analysis),
                    Err(err) => {
                        error!(case_study = %case_study.name, %err, "case study failed");
                        failed.push(case_study.name.clone());
                    }
                }
            }
            if !failed.is_empty() {
                return Err(anyhow!(
                    "{} of {} case studies failed: {}",
                    failed.len(),
                    manifest.case_studies.len(),
                    failed.join(", ")
                ));
            }
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "analyze-runs",
                    "summary_dir": summary_dir.display().to_string(),
                    "case_studies": analyses.iter().map(runs_analysis_to_json).collect::<Vec<_>>(),
                })));
            }
            for analysis in &analyses {
                print_runs_analysis(analysis);
            }
        }
        Commands::AnalyzeSampling {
            manifest,
            summary_dir,
            json,
        } => {
            let manifest = sweep_core::load_manifest(&manifest)?;
            let summary_dir = summary_dir.unwrap_or_else(|| manifest.paths.summary.clone());
            let mut tables = Vec::new();
            let mut failed = Vec::new();
            for case_study in &manifest.case_studies {
                info!(case_study = %case_study.name, "analyzing sampling");
                match sweep_analysis::analyze_case_study_sampling(
                    &manifest.paths.measurements,
                    &manifest.paths.results,
                    &summary_dir,
                    &case_study.name,
                    &manifest.strategies,
                    &manifest.strengths,
                    manifest.seeds,
                ) {
                    Ok(table) => tables.push(table),
                    Err(err) => {
                        error!(case_study = %case_study.name, %err, "case study failed");
                        failed.push(case_study.name.clone());
                    }
                }
            }
            if !failed.is_empty() {
                return Err(anyhow!(
                    "{} of {} case studies failed: {}",
                    failed.len(),
                    manifest.case_studies.len(),
                    failed.join(", ")
                ));
            }
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "analyze-sampling",
                    "summary_dir": summary_dir.display().to_string(),
                    "tables": tables
                        .iter()
                        .map(|table| table.display().to_string())
                        .collect::<Vec<_>>(),
                })));
            }
            for table in &tables {
                println!("table: {}", table.display());
            }
        }
        Commands::SubmitJobs {
            cluster,
            strategy,
            operation,
            manifest,
            dry_run,
            json,
        } => {
            let manifest_path = manifest;
            let manifest = sweep_core::load_manifest(&manifest_path)?;
            let profile = manifest.dispatch.as_ref().ok_or_else(|| {
                anyhow!("{} has no dispatch section", manifest_path.display())
            })?;
            if !manifest.strategies.contains(&strategy) {
                return Err(anyhow!(
                    "unknown strategy: {} (expected one of {})",
                    strategy,
                    manifest.strategies.join(", ")
                ));
            }
            let operation: sweep_dispatch::Operation = operation.into();
            let lines = sweep_dispatch::build_job_lines(
                profile,
                operation,
                &strategy,
                &manifest.case_studies,
                manifest.seeds,
            );
            let job_id = sweep_dispatch::job_id_now();
            let options =
                sweep_dispatch::sbatch_options(profile, &cluster, operation, &strategy, lines.len())?;
            let command = sweep_dispatch::submission_command(profile, options, job_id);
            if dry_run {
                if json {
                    return Ok(Some(json!({
                        "ok": true,
                        "command": "submit-jobs",
                        "operation": operation.as_str(),
                        "dry_run": true,
                        "jobs": lines.len(),
                        "submission": command.join(" "),
                    })));
                }
                println!("jobs: {}", lines.len());
                println!("submission: {}", command.join(" "));
                return Ok(None);
            }
            let job_file = sweep_dispatch::write_job_file(profile, job_id, &lines)?;
            let reply = sweep_dispatch::submit(&command)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "submit-jobs",
                    "operation": operation.as_str(),
                    "dry_run": false,
                    "jobs": lines.len(),
                    "job_file": job_file.display().to_string(),
                    "submission": command.join(" "),
                    "scheduler_reply": reply,
                })));
            }
            println!("jobs: {}", lines.len());
            println!("job_file: {}", job_file.display());
            println!("scheduler_reply: {}", reply);
        }
    }
    Ok(None)
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(payload) => println!("{}", payload),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\",\"details\":{{}}}}}}"
        ),
    }
}

fn json_error(code: &str, message: String, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::AnalyzeRuns { json, .. }
        | Commands::AnalyzeSampling { json, .. }
        | Commands::SubmitJobs { json, .. } => *json,
    }
}

fn runs_analysis_to_json(analysis: &RunsAnalysis) -> Value {
    json!({
        "case_study": analysis.case_study,
        "strategies": analysis
            .statistics
            .iter()
            .map(statistics_to_json)
            .collect::<Vec<_>>(),
        "skipped_strategies": analysis.skipped_strategies,
    })
}

fn statistics_to_json(statistics: &StrategyStatistics) -> Value {
    json!({
        "strategy": statistics.strategy,
        "mean_error": statistics.mean_error,
        "relative_standard_deviation": statistics.relative_standard_deviation,
        "best": { "seed": statistics.best_seed, "error": statistics.best_error },
        "worst": { "seed": statistics.worst_seed, "error": statistics.worst_error },
        "representative_seed": statistics.representative_seed,
        "valid_runs": statistics.valid_runs,
        "unbounded_runs": statistics.unbounded_runs,
    })
}

fn print_runs_analysis(analysis: &RunsAnalysis) {
    println!("case_study: {}", analysis.case_study);
    for statistics in &analysis.statistics {
        println!("strategy: {}", statistics.strategy);
        println!("  mean_error: {}", statistics.mean_error);
        println!(
            "  relative_standard_deviation: {}",
            statistics.relative_standard_deviation
        );
        println!(
            "  best: seed {} ({})",
            statistics.best_seed, statistics.best_error
        );
        println!(
            "  worst: seed {} ({})",
            statistics.worst_seed, statistics.worst_error
        );
        println!("  representative: seed {}", statistics.representative_seed);
        println!(
            "  runs: {} valid, {} unbounded",
            statistics.valid_runs, statistics.unbounded_runs
        );
    }
    for strategy in &analysis.skipped_strategies {
        println!("skipped: {}", strategy);
    }
}
