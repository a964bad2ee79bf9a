use chrono::Utc;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use sweep_core::{
    map_sampled_configurations, parse_learning_log, parse_sampling_log, AnalysisError, CaseStudy,
    ConfigurationUniverse, ErrorRate, Result, SampleSource, SeedRange,
};
use tracing::{error, info, warn};
use walkdir::WalkDir;

pub const LOG_PREFIX: &str = "out_";
pub const LOG_SUFFIX: &str = ".log";
pub const SAMPLE_FILE_PREFIX: &str = "sampledConfigurations_";
pub const ERROR_TABLE_HEADER: &str = "Run;Error";
pub const DURATION_TABLE_HEADER: &str = "Run;DurationMs";
pub const PARAMETER_TABLE_HEADER: &str = "Run;OptimalParameters";
pub const TRAJECTORY_TABLE_HEADER: &str = "x;y;z;strategy;t_factor";

#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub seed: u32,
    pub error: ErrorRate,
    pub optimal_parameters: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyStatistics {
    pub strategy: String,
    pub mean_error: f64,
    pub relative_standard_deviation: f64,
    pub best_seed: u32,
    pub best_error: f64,
    pub worst_seed: u32,
    pub worst_error: f64,
    pub representative_seed: u32,
    pub valid_runs: usize,
    pub unbounded_runs: usize,
}

pub fn aggregate_strategy(
    case_study: &str,
    strategy: &str,
    records: &BTreeMap<u32, RunRecord>,
) -> Result<StrategyStatistics> {
    let valid: Vec<(u32, f64)> = records
        .values()
        .filter_map(|record| record.error.measured().map(|error| (record.seed, error)))
        .collect();
    if valid.is_empty() {
        return Err(AnalysisError::InsufficientData {
            case_study: case_study.to_string(),
            strategy: strategy.to_string(),
        });
    }

    let count = valid.len() as f64;
    let mean = valid.iter().map(|(_, error)| error).sum::<f64>() / count;

    let (mut best_seed, mut best_error) = valid[0];
    let (mut worst_seed, mut worst_error) = valid[0];
    let mut representative_seed = valid[0].0;
    let mut min_deviation = f64::MAX;
    let mut squared_deviations = 0.0;
    for &(seed, error) in &valid {
        if error < best_error {
            best_error = error;
            best_seed = seed;
        }
        if error > worst_error {
            worst_error = error;
            worst_seed = seed;
        }
        let deviation = (mean - error).abs();
        if deviation < min_deviation {
            min_deviation = deviation;
            representative_seed = seed;
        }
        squared_deviations += (mean - error) * (mean - error);
    }

    let standard_deviation = (squared_deviations / count).sqrt();
    let relative_standard_deviation = if mean == 0.0 {
        0.0
    } else {
        standard_deviation / mean
    };

    Ok(StrategyStatistics {
        strategy: strategy.to_string(),
        mean_error: mean,
        relative_standard_deviation,
        best_seed,
        best_error,
        worst_seed,
        worst_error,
        representative_seed,
        valid_runs: valid.len(),
        unbounded_runs: records.len() - valid.len(),
    })
}

fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|source| AnalysisError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("artifact");
    let tmp = path.with_file_name(format!(
        ".{}.tmp.{}.{}",
        name,
        std::process::id(),
        Utc::now().timestamp_micros()
    ));
    fs::write(&tmp, bytes).map_err(|source| AnalysisError::Io {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| AnalysisError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn write_strategy_artifacts(
    summary_dir: &Path,
    case_study: &str,
    strategy: &str,
    records: &BTreeMap<u32, RunRecord>,
    statistics: &StrategyStatistics,
) -> Result<()> {
    let dir = summary_dir.join(case_study);

    let mut errors = format!("{}\n", ERROR_TABLE_HEADER);
    for record in records.values() {
        if let Some(error) = record.error.measured() {
            errors.push_str(&format!("{};{}\n", record.seed, error));
        }
    }
    atomic_write(&dir.join(format!("all_error_{}.txt", strategy)), errors.as_bytes())?;

    let deviation = format!("{}\n", statistics.relative_standard_deviation);
    atomic_write(&dir.join(format!("all_sd_{}.txt", strategy)), deviation.as_bytes())?;

    let mut parameters = format!("{}\n", PARAMETER_TABLE_HEADER);
    for record in records.values() {
        parameters.push_str(&format!("{};{}\n", record.seed, record.optimal_parameters));
    }
    atomic_write(
        &dir.join(format!("all_params_{}.txt", strategy)),
        parameters.as_bytes(),
    )
}

pub fn write_duration_artifact(
    summary_dir: &Path,
    case_study: &str,
    strategy: &str,
    durations: &BTreeMap<u32, u64>,
) -> Result<()> {
    let mut table = format!("{}\n", DURATION_TABLE_HEADER);
    for (seed, duration) in durations {
        table.push_str(&format!("{};{}\n", seed, duration));
    }
    atomic_write(
        &summary_dir
            .join(case_study)
            .join(format!("all_time_{}.txt", strategy)),
        table.as_bytes(),
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogName {
    pub strategy: String,
    pub base: String,
    pub learning: bool,
}

pub fn classify_log_name(file_name: &str) -> Option<LogName> {
    let stem = file_name.strip_suffix(LOG_SUFFIX)?;
    let stem = stem.strip_prefix(LOG_PREFIX)?;
    let (tag_start, tag_end) = strength_tag(stem)?;
    Some(LogName {
        strategy: stem[..tag_end].to_string(),
        base: stem[..tag_start].to_string(),
        learning: !stem[tag_end..].is_empty(),
    })
}

fn strength_tag(stem: &str) -> Option<(usize, usize)> {
    let mut from = 0;
    while let Some(offset) = stem[from..].find("_t") {
        let start = from + offset;
        let digits = stem[start + 2..]
            .bytes()
            .take_while(|byte| byte.is_ascii_digit())
            .count();
        if digits > 0 {
            return Some((start, start + 2 + digits));
        }
        from = start + 2;
    }
    None
}

pub fn seed_of_run_dir(name: &str) -> Option<u32> {
    name.rsplit_once('_')?.1.parse().ok()
}

#[derive(Debug)]
pub struct RunsAnalysis {
    pub case_study: String,
    pub statistics: Vec<StrategyStatistics>,
    pub skipped_strategies: Vec<String>,
}

pub fn analyze_case_study_runs(
    runs_dir: &Path,
    summary_dir: &Path,
    case_study: &str,
    strategies: &[String],
) -> Result<RunsAnalysis> {
    let case_dir = runs_dir.join(case_study);
    let mut run_dirs: Vec<(u32, PathBuf)> = Vec::new();
    let entries = fs::read_dir(&case_dir).map_err(|source| AnalysisError::Io {
        path: case_dir.clone(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| AnalysisError::Io {
            path: case_dir.clone(),
            source,
        })?;
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        match seed_of_run_dir(&name) {
            Some(seed) => run_dirs.push((seed, entry.path())),
            None => warn!(case_study, directory = %name, "run directory has no seed suffix"),
        }
    }
    // Numeric on seed, not directory-listing order.
    run_dirs.sort();

    let mut learning: BTreeMap<String, BTreeMap<u32, RunRecord>> = BTreeMap::new();
    let mut durations: BTreeMap<String, BTreeMap<u32, u64>> = BTreeMap::new();
    for (seed, dir) in &run_dirs {
        info!(case_study, seed, "scanning run directory");
        for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|err| AnalysisError::Io {
                path: dir.clone(),
                source: err.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().to_string();
            let log_name = match classify_log_name(&file_name) {
                Some(log_name) if strategies.contains(&log_name.base) => log_name,
                _ => continue,
            };
            if log_name.learning {
                match parse_learning_log(entry.path()) {
                    Ok(outcome) => {
                        learning.entry(log_name.strategy).or_default().insert(
                            *seed,
                            RunRecord {
                                seed: *seed,
                                error: outcome.error,
                                optimal_parameters: outcome.optimal_parameters,
                            },
                        );
                    }
                    // A failing seed loses its statistics entry; the rest of
                    // the case study still aggregates.
                    Err(err) => warn!(case_study, seed, %err, "skipping learning log"),
                }
            } else {
                match parse_sampling_log(entry.path()) {
                    Ok(duration) => {
                        durations
                            .entry(log_name.strategy)
                            .or_default()
                            .insert(*seed, duration);
                    }
                    Err(err) => warn!(case_study, seed, %err, "skipping sampling log"),
                }
            }
        }
    }

    let mut statistics = Vec::new();
    let mut skipped_strategies = Vec::new();
    for (strategy, records) in &learning {
        match aggregate_strategy(case_study, strategy, records) {
            Ok(stats) => {
                write_strategy_artifacts(summary_dir, case_study, strategy, records, &stats)?;
                statistics.push(stats);
            }
            Err(err @ AnalysisError::InsufficientData { .. }) => {
                error!(case_study, strategy, %err, "strategy skipped");
                skipped_strategies.push(strategy.clone());
            }
            Err(err) => return Err(err),
        }
    }
    for (strategy, by_seed) in &durations {
        write_duration_artifact(summary_dir, case_study, strategy, by_seed)?;
    }

    Ok(RunsAnalysis {
        case_study: case_study.to_string(),
        statistics,
        skipped_strategies,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryPoint {
    pub rank: usize,
    pub clamped: f64,
    pub raw: f64,
    pub strategy: String,
    pub strength: String,
}

pub fn median_trajectory(
    case_study: &str,
    strategy: &str,
    universe_size: usize,
    strengths: &[(String, Vec<Vec<usize>>)],
) -> Result<Vec<TrajectoryPoint>> {
    let counts: Vec<usize> = strengths.iter().map(|(_, sets)| sets.len()).collect();
    if counts.is_empty() || counts[0] == 0 || counts.iter().any(|&count| count != counts[0]) {
        return Err(AnalysisError::UnalignedSeeds {
            case_study: case_study.to_string(),
            strategy: strategy.to_string(),
            counts,
        });
    }

    let mut points = Vec::new();
    for (strength, sets) in strengths {
        let length = sets[0].len();
        for (seed_index, set) in sets.iter().enumerate() {
            if set.len() != length {
                return Err(AnalysisError::RankMismatch {
                    case_study: case_study.to_string(),
                    strategy: strategy.to_string(),
                    strength: strength.clone(),
                    seed_index,
                    expected: length,
                    found: set.len(),
                });
            }
        }
        if length == 0 {
            continue;
        }
        let steps = universe_size as f64 / length as f64;
        for rank in 0..length {
            let column: Vec<usize> = sets.iter().map(|set| set[rank]).collect();
            let raw = median(&column);
            // A uniform sampler's j-th pick lands in this bucket; medians of
            // skewed rankings can fall outside it.
            let lower = (rank as f64 * steps).floor();
            let upper = ((rank + 1) as f64 * steps).floor();
            let clamped = if raw < lower {
                lower
            } else if raw > upper {
                upper
            } else {
                raw
            };
            for _ in 0..sets.len() {
                points.push(TrajectoryPoint {
                    rank,
                    clamped,
                    raw,
                    strategy: strategy.to_string(),
                    strength: strength.clone(),
                });
            }
        }
    }
    Ok(points)
}

fn median(values: &[usize]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let middle = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[middle] as f64
    } else {
        (sorted[middle - 1] as f64 + sorted[middle] as f64) / 2.0
    }
}

pub fn sample_file_path(
    results_dir: &Path,
    case_study: &str,
    seed: u32,
    strategy: &str,
    strength: &str,
) -> PathBuf {
    results_dir
        .join(case_study)
        .join(format!("{}_{}", case_study, seed))
        .join(format!("{}{}_{}.csv", SAMPLE_FILE_PREFIX, strategy, strength))
}

pub fn measurement_file_path(measurements_dir: &Path, case_study: &str) -> Result<PathBuf> {
    let dir = measurements_dir.join(case_study);
    let markup = dir.join("measurements.xml");
    if markup.exists() {
        return Ok(markup);
    }
    let tabular = dir.join("measurements.csv");
    if tabular.exists() {
        return Ok(tabular);
    }
    Err(AnalysisError::Io {
        path: dir,
        source: std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no measurements.xml or measurements.csv",
        ),
    })
}

pub fn analyze_case_study_sampling(
    measurements_dir: &Path,
    results_dir: &Path,
    summary_dir: &Path,
    case_study: &str,
    strategies: &[String],
    strengths: &[String],
    seeds: SeedRange,
) -> Result<PathBuf> {
    let (first_strategy, first_strength) = match (strategies.first(), strengths.first()) {
        (Some(strategy), Some(strength)) => (strategy, strength),
        _ => {
            return Err(AnalysisError::Manifest {
                path: results_dir.join(case_study),
                detail: "no strategies or strength levels selected".to_string(),
            })
        }
    };
    let first_sample = sample_file_path(results_dir, case_study, seeds.from, first_strategy, first_strength);
    let study = CaseStudy::from_sample_header(case_study, &first_sample)?;
    let measurements = measurement_file_path(measurements_dir, case_study)?;
    let universe = ConfigurationUniverse::from_measurement_file(&study, &measurements)?;
    info!(
        case_study,
        configurations = universe.len(),
        features = study.features.len(),
        "universe built"
    );

    let mut rows = Vec::new();
    for strategy in strategies {
        let mut per_strength: Vec<(String, Vec<Vec<usize>>)> = Vec::new();
        for strength in strengths {
            let mut sets = Vec::new();
            for seed in seeds.iter() {
                let path = sample_file_path(results_dir, case_study, seed, strategy, strength);
                let source = SampleSource {
                    case_study,
                    strategy,
                    seed,
                };
                sets.push(map_sampled_configurations(&study, &universe, &path, source)?);
            }
            per_strength.push((strength.clone(), sets));
        }
        rows.extend(median_trajectory(
            case_study,
            strategy,
            universe.len(),
            &per_strength,
        )?);
    }
    write_trajectory_table(summary_dir, case_study, &rows)
}

pub fn write_trajectory_table(
    summary_dir: &Path,
    case_study: &str,
    rows: &[TrajectoryPoint],
) -> Result<PathBuf> {
    let mut table = format!("{}\n", TRAJECTORY_TABLE_HEADER);
    for row in rows {
        table.push_str(&format!(
            "{};{};{};{};{}\n",
            row.rank, row.raw, row.clamped, row.strategy, row.strength
        ));
    }
    let path = summary_dir.join(format!("dataframe_{}.csv", case_study));
    atomic_write(&path, table.as_bytes())?;
    Ok(path)
}
