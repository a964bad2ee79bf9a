use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CSV_SEPARATOR: char = ';';
pub const ROOT_FEATURE: &str = "root";
pub const CONFIGURATION_COLUMN: &str = "Configuration";

// The external learner prints its double.MaxValue when it never converged.
// Anything at or past this value is a failed run, not a measurement.
pub const UNBOUNDED_ERROR_THRESHOLD: f64 = 1.797_693_134_86e308;

const SAMPLING_DONE_MARKER: &str = "ConfigurationSampling done";
const OPTIMAL_ERROR_MARKER: &str = "Error of optimal parameters";
const OPTIMAL_PARAMETERS_MARKER: &str = "Optimal parameters ";
const PYTHON_LEARNER_MARKER: &str = "command: learn-python";
const PYTHON_ERROR_MARKER: &str = "Error rate";

pub type Result<T> = std::result::Result<T, AnalysisError>;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("reading {}: {}", path.display(), source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration {}: {}", path.display(), detail)]
    Manifest { path: PathBuf, detail: String },
    #[error("malformed log {}: {}", path.display(), detail)]
    MalformedLog { path: PathBuf, detail: String },
    #[error("{} does not match the declared feature list: {}", path.display(), detail)]
    SchemaMismatch { path: PathBuf, detail: String },
    #[error("duplicate configuration {} at entry {} of {}", encoding, row, path.display())]
    DuplicateConfiguration {
        path: PathBuf,
        row: usize,
        encoding: String,
    },
    #[error(
        "sampled configuration {encoding} is not in the measured universe \
         (case study {case_study}, strategy {strategy}, seed {seed})"
    )]
    UnmappableConfiguration {
        case_study: String,
        strategy: String,
        seed: u32,
        encoding: String,
    },
    #[error("no valid runs to aggregate for {strategy} in {case_study}")]
    InsufficientData { case_study: String, strategy: String },
    #[error("strength levels disagree on seed count for {strategy} in {case_study}: {counts:?}")]
    UnalignedSeeds {
        case_study: String,
        strategy: String,
        counts: Vec<usize>,
    },
    #[error(
        "sample set {seed_index} has {found} ranks, expected {expected} \
         (case study {case_study}, strategy {strategy}, strength {strength})"
    )]
    RankMismatch {
        case_study: String,
        strategy: String,
        strength: String,
        seed_index: usize,
        expected: usize,
        found: usize,
    },
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| AnalysisError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn split_row(line: &str) -> Vec<String> {
    line.split(CSV_SEPARATOR)
        .map(|cell| cell.trim().to_string())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ErrorRate {
    Measured(f64),
    Unbounded,
}

impl ErrorRate {
    pub fn classify(raw: f64) -> ErrorRate {
        if raw.is_finite() && raw < UNBOUNDED_ERROR_THRESHOLD {
            ErrorRate::Measured(raw)
        } else {
            ErrorRate::Unbounded
        }
    }

    pub fn measured(self) -> Option<f64> {
        match self {
            ErrorRate::Measured(value) => Some(value),
            ErrorRate::Unbounded => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LearningOutcome {
    pub optimal_parameters: String,
    pub error: ErrorRate,
}

pub fn parse_sampling_log(path: &Path) -> Result<u64> {
    let data = read_file(path)?;
    for line in data.lines() {
        if let Some((_, fields)) = line.split_once(SAMPLING_DONE_MARKER) {
            let field = fields.split_whitespace().nth(3).ok_or_else(|| {
                AnalysisError::MalformedLog {
                    path: path.to_path_buf(),
                    detail: "sampling completion line has no duration field".to_string(),
                }
            })?;
            return field
                .parse::<u64>()
                .map_err(|_| AnalysisError::MalformedLog {
                    path: path.to_path_buf(),
                    detail: format!("duration field is not an integer: {}", field),
                });
        }
    }
    Err(AnalysisError::MalformedLog {
        path: path.to_path_buf(),
        detail: "no sampling completion line".to_string(),
    })
}

pub fn parse_learning_log(path: &Path) -> Result<LearningOutcome> {
    let data = read_file(path)?;
    let mut best: Option<f64> = None;
    let mut optimal_parameters = String::new();
    let mut python_learner = false;

    for line in data.lines() {
        if line.contains(OPTIMAL_ERROR_MARKER) {
            let raw = line.trim().rsplit(':').next().unwrap_or("").trim();
            let value = parse_float(path, raw)?;
            if best.map_or(true, |current| value < current) {
                best = Some(value);
            }
        } else if line.contains(OPTIMAL_PARAMETERS_MARKER) {
            optimal_parameters = line
                .split_whitespace()
                .nth(2)
                .unwrap_or("")
                .to_string();
            // The parametric learner reports its optimum exactly once and the
            // scan ends there; the python learner keeps logging afterwards.
            if !python_learner {
                return Ok(LearningOutcome {
                    optimal_parameters,
                    error: finish_error(best),
                });
            }
        } else if line.contains(PYTHON_LEARNER_MARKER) {
            python_learner = true;
        } else if python_learner && line.contains(PYTHON_ERROR_MARKER) {
            let raw = line.split_whitespace().last().unwrap_or("");
            let value = parse_float(path, raw)? * 100.0;
            return Ok(LearningOutcome {
                optimal_parameters,
                error: ErrorRate::classify(value),
            });
        }
    }

    Ok(LearningOutcome {
        optimal_parameters,
        error: finish_error(best),
    })
}

fn finish_error(best: Option<f64>) -> ErrorRate {
    match best {
        Some(value) => ErrorRate::classify(value),
        None => ErrorRate::Unbounded,
    }
}

fn parse_float(path: &Path, raw: &str) -> Result<f64> {
    raw.parse::<f64>().map_err(|_| AnalysisError::MalformedLog {
        path: path.to_path_buf(),
        detail: format!("not a number: {}", raw),
    })
}

#[derive(Debug, Clone)]
pub struct CaseStudy {
    pub name: String,
    pub features: Vec<String>,
}

impl CaseStudy {
    pub fn new(name: impl Into<String>, features: Vec<String>) -> CaseStudy {
        CaseStudy {
            name: name.into(),
            features,
        }
    }

    pub fn from_sample_header(name: &str, path: &Path) -> Result<CaseStudy> {
        let data = read_file(path)?;
        let header = data.lines().next().ok_or_else(|| AnalysisError::SchemaMismatch {
            path: path.to_path_buf(),
            detail: "sample file is empty".to_string(),
        })?;
        let features = split_row(header);
        if features.iter().all(|f| f.is_empty()) {
            return Err(AnalysisError::SchemaMismatch {
                path: path.to_path_buf(),
                detail: "sample file header names no features".to_string(),
            });
        }
        Ok(CaseStudy::new(name, features))
    }
}

#[derive(Debug, Default)]
pub struct ConfigurationUniverse {
    indices: HashMap<String, usize>,
}

impl ConfigurationUniverse {
    pub fn from_measurement_file(study: &CaseStudy, path: &Path) -> Result<ConfigurationUniverse> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("xml") => Self::from_measurement_xml(study, path),
            _ => Self::from_measurement_csv(study, path),
        }
    }

    pub fn from_measurement_csv(study: &CaseStudy, path: &Path) -> Result<ConfigurationUniverse> {
        let data = read_file(path)?;
        let mut lines = data.lines();
        let header = lines.next().ok_or_else(|| AnalysisError::SchemaMismatch {
            path: path.to_path_buf(),
            detail: "measurement file is empty".to_string(),
        })?;
        let header = split_row(header);
        let columns = feature_columns(&header, &study.features, path)?;

        let mut universe = ConfigurationUniverse::default();
        for (offset, line) in lines.enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let row = offset + 2; // 1-based, after the header
            let cells = split_row(line);
            if cells.len() < study.features.len() {
                return Err(AnalysisError::SchemaMismatch {
                    path: path.to_path_buf(),
                    detail: format!(
                        "row {} has {} fields but {} features are declared",
                        row,
                        cells.len(),
                        study.features.len()
                    ),
                });
            }
            let mut encoding = String::new();
            for &column in &columns {
                let cell = cells.get(column).ok_or_else(|| AnalysisError::SchemaMismatch {
                    path: path.to_path_buf(),
                    detail: format!("row {} is missing column {}", row, column + 1),
                })?;
                encoding.push_str(cell);
            }
            universe.insert(path, row, encoding)?;
        }
        Ok(universe)
    }

    pub fn from_measurement_xml(study: &CaseStudy, path: &Path) -> Result<ConfigurationUniverse> {
        let data = read_file(path)?;
        let mut reader = Reader::from_str(&data);
        let mut universe = ConfigurationUniverse::default();
        let mut in_configuration = false;
        let mut payload = String::new();
        let mut entry = 0usize;
        loop {
            match reader.read_event() {
                Ok(Event::Start(ref element)) if element.local_name().as_ref() == b"data" => {
                    in_configuration = is_configuration_element(element, path)?;
                    payload.clear();
                }
                Ok(Event::Empty(ref element)) if element.local_name().as_ref() == b"data" => {
                    if is_configuration_element(element, path)? {
                        entry += 1;
                        universe.insert(path, entry, binary_encoding("", &study.features))?;
                    }
                }
                Ok(Event::Text(ref text)) if in_configuration => {
                    let unescaped = text.unescape().map_err(|err| markup_error(path, err))?;
                    payload.push_str(&unescaped);
                }
                Ok(Event::End(ref element))
                    if in_configuration && element.local_name().as_ref() == b"data" =>
                {
                    entry += 1;
                    universe.insert(path, entry, binary_encoding(&payload, &study.features))?;
                    in_configuration = false;
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(err) => return Err(markup_error(path, err)),
            }
        }
        Ok(universe)
    }

    fn insert(&mut self, path: &Path, row: usize, encoding: String) -> Result<()> {
        let index = self.indices.len();
        if self.indices.insert(encoding.clone(), index).is_some() {
            return Err(AnalysisError::DuplicateConfiguration {
                path: path.to_path_buf(),
                row,
                encoding,
            });
        }
        Ok(())
    }

    pub fn index_of(&self, encoding: &str) -> Option<usize> {
        self.indices.get(encoding).copied()
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

fn feature_columns(header: &[String], features: &[String], path: &Path) -> Result<Vec<usize>> {
    features
        .iter()
        .map(|feature| {
            header
                .iter()
                .position(|column| column == feature)
                .ok_or_else(|| AnalysisError::SchemaMismatch {
                    path: path.to_path_buf(),
                    detail: format!("feature {} is not a header column", feature),
                })
        })
        .collect()
}

fn is_configuration_element(element: &BytesStart<'_>, path: &Path) -> Result<bool> {
    for attribute in ["columname", "column"] {
        if let Some(attr) = element
            .try_get_attribute(attribute)
            .map_err(|err| markup_error(path, err))?
        {
            let value = attr
                .unescape_value()
                .map_err(|err| markup_error(path, err))?;
            if value.as_ref() == CONFIGURATION_COLUMN {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn markup_error(path: &Path, err: impl std::fmt::Display) -> AnalysisError {
    AnalysisError::SchemaMismatch {
        path: path.to_path_buf(),
        detail: format!("broken markup: {}", err),
    }
}

fn binary_encoding(payload: &str, features: &[String]) -> String {
    let active: HashSet<&str> = payload
        .split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .collect();
    features
        .iter()
        .map(|feature| {
            if feature == ROOT_FEATURE || active.contains(feature.as_str()) {
                '1'
            } else {
                '0'
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct SampleSource<'a> {
    pub case_study: &'a str,
    pub strategy: &'a str,
    pub seed: u32,
}

pub fn map_sampled_configurations(
    study: &CaseStudy,
    universe: &ConfigurationUniverse,
    path: &Path,
    source: SampleSource<'_>,
) -> Result<Vec<usize>> {
    let data = read_file(path)?;
    let mut lines = data.lines();
    let header = lines.next().ok_or_else(|| AnalysisError::SchemaMismatch {
        path: path.to_path_buf(),
        detail: "sample file is empty".to_string(),
    })?;
    let header = split_row(header);
    let columns = feature_columns(&header, &study.features, path)?;

    let mut indices = Vec::new();
    for (offset, line) in lines.enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let cells = split_row(line);
        let mut encoding = String::new();
        for &column in &columns {
            let cell = cells.get(column).ok_or_else(|| AnalysisError::SchemaMismatch {
                path: path.to_path_buf(),
                detail: format!("row {} is missing column {}", offset + 2, column + 1),
            })?;
            encoding.push_str(cell);
        }
        let index = universe.index_of(&encoding).ok_or_else(|| {
            AnalysisError::UnmappableConfiguration {
                case_study: source.case_study.to_string(),
                strategy: source.strategy.to_string(),
                seed: source.seed,
                encoding: encoding.clone(),
            }
        })?;
        indices.push(index);
    }
    // Raw sample order is strategy-dependent; rank aggregation needs the
    // ascending order.
    indices.sort_unstable();
    Ok(indices)
}

#[derive(Debug, Clone, Deserialize)]
pub struct StudyManifest {
    pub case_studies: Vec<CaseStudyEntry>,
    pub strategies: Vec<String>,
    #[serde(default = "default_strengths")]
    pub strengths: Vec<String>,
    pub seeds: SeedRange,
    pub paths: DataPaths,
    #[serde(default)]
    pub dispatch: Option<DispatchProfile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaseStudyEntry {
    pub name: String,
    #[serde(default = "default_job_arg")]
    pub job_arg: u64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SeedRange {
    pub from: u32,
    pub to: u32,
}

impl SeedRange {
    pub fn iter(&self) -> impl Iterator<Item = u32> {
        self.from..=self.to
    }

    pub fn len(&self) -> usize {
        if self.to < self.from {
            0
        } else {
            (self.to - self.from + 1) as usize
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataPaths {
    pub runs: PathBuf,
    pub results: PathBuf,
    pub measurements: PathBuf,
    pub summary: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchProfile {
    pub job_dir: PathBuf,
    pub library_dir: String,
    pub slurm_log: String,
    pub clusters: Vec<ClusterEntry>,
    pub scripts: DispatchScripts,
    #[serde(default)]
    pub account: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterEntry {
    pub name: String,
    #[serde(default)]
    pub feature: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchScripts {
    pub runner: String,
    pub sampling: String,
    pub predicting: String,
    pub predicting_svr: String,
    pub predicting_forest: String,
    pub failure_rate: String,
}

fn default_strengths() -> Vec<String> {
    vec!["t1".to_string(), "t2".to_string(), "t3".to_string()]
}

fn default_job_arg() -> u64 {
    1
}

pub fn load_manifest(path: &Path) -> Result<StudyManifest> {
    let data = read_file(path)?;
    let manifest: StudyManifest =
        serde_yaml::from_str(&data).map_err(|err| AnalysisError::Manifest {
            path: path.to_path_buf(),
            detail: err.to_string(),
        })?;
    let invalid = |detail: &str| AnalysisError::Manifest {
        path: path.to_path_buf(),
        detail: detail.to_string(),
    };
    if manifest.case_studies.is_empty() {
        return Err(invalid("no case studies"));
    }
    if manifest.strategies.is_empty() {
        return Err(invalid("no strategies"));
    }
    if manifest.strengths.is_empty() {
        return Err(invalid("no strength levels"));
    }
    if manifest.seeds.is_empty() {
        return Err(invalid("empty seed range"));
    }
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sweep_core_{}_{}", tag, std::process::id()));
        fs::create_dir_all(&dir).expect("scratch dir");
        dir
    }

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).expect("write test file");
        path
    }

    #[test]
    fn sampling_log_reports_fourth_field_after_marker() {
        let dir = scratch_dir("sampling_ok");
        let path = write_file(
            &dir,
            "out_rand_t1.log",
            "starting\nConfigurationSampling done x y z 4200 more\ntrailing\n",
        );
        assert_eq!(parse_sampling_log(&path).expect("duration"), 4200);
    }

    #[test]
    fn sampling_log_without_marker_is_malformed() {
        let dir = scratch_dir("sampling_missing");
        let path = write_file(&dir, "out_rand_t1.log", "nothing to see\n");
        let err = parse_sampling_log(&path).expect_err("must fail");
        assert!(matches!(err, AnalysisError::MalformedLog { .. }));
        assert!(err.to_string().contains("no sampling completion line"));
    }

    #[test]
    fn learning_log_keeps_minimum_error_and_stops_at_optimum() {
        let dir = scratch_dir("learning_min");
        let path = write_file(
            &dir,
            "out_rand_t1_learn.log",
            "Error of optimal parameters: 0.5\n\
             Error of optimal parameters: 0.2\n\
             Optimal parameters cfgA\n\
             Error of optimal parameters: 0.1\n",
        );
        let outcome = parse_learning_log(&path).expect("outcome");
        assert_eq!(outcome.optimal_parameters, "cfgA");
        assert_eq!(outcome.error, ErrorRate::Measured(0.2));
    }

    #[test]
    fn python_dialect_overrides_minimum_with_scaled_error_rate() {
        let dir = scratch_dir("learning_python");
        let path = write_file(
            &dir,
            "out_rand_t1_learn.log",
            "command: learn-python\n\
             Error of optimal parameters: 0.2\n\
             Optimal parameters cfgB\n\
             Error rate 0.05\n",
        );
        let outcome = parse_learning_log(&path).expect("outcome");
        assert_eq!(outcome.optimal_parameters, "cfgB");
        assert_eq!(outcome.error, ErrorRate::Measured(5.0));
    }

    #[test]
    fn learning_log_without_conclusive_error_is_unbounded() {
        let dir = scratch_dir("learning_unbounded");
        let path = write_file(&dir, "out_rand_t1_learn.log", "nothing conclusive\n");
        let outcome = parse_learning_log(&path).expect("outcome");
        assert_eq!(outcome.error, ErrorRate::Unbounded);
        assert!(outcome.optimal_parameters.is_empty());
    }

    #[test]
    fn learning_log_classifies_reported_infinity_as_unbounded() {
        let dir = scratch_dir("learning_inf");
        let path = write_file(
            &dir,
            "out_rand_t1_learn.log",
            "Error of optimal parameters: inf\nOptimal parameters cfgC\n",
        );
        let outcome = parse_learning_log(&path).expect("outcome");
        assert_eq!(outcome.optimal_parameters, "cfgC");
        assert_eq!(outcome.error, ErrorRate::Unbounded);
    }

    fn toy_study() -> CaseStudy {
        CaseStudy::new(
            "toy",
            vec!["root".to_string(), "a".to_string(), "b".to_string()],
        )
    }

    #[test]
    fn tabular_universe_assigns_dense_indices_in_file_order() {
        let dir = scratch_dir("universe_csv");
        let path = write_file(
            &dir,
            "measurements.csv",
            "root;a;b;Performance\n1;0;0;10\n1;0;1;20\n1;1;0;30\n1;1;1;40\n",
        );
        let universe =
            ConfigurationUniverse::from_measurement_csv(&toy_study(), &path).expect("universe");
        assert_eq!(universe.len(), 4);
        assert_eq!(universe.index_of("100"), Some(0));
        assert_eq!(universe.index_of("101"), Some(1));
        assert_eq!(universe.index_of("110"), Some(2));
        assert_eq!(universe.index_of("111"), Some(3));
    }

    #[test]
    fn tabular_universe_remaps_shuffled_header_columns() {
        let dir = scratch_dir("universe_remap");
        let path = write_file(
            &dir,
            "measurements.csv",
            "b;Performance;root;a\n1;10;1;0\n0;20;1;1\n",
        );
        let universe =
            ConfigurationUniverse::from_measurement_csv(&toy_study(), &path).expect("universe");
        // Rows are (b=1, root=1, a=0) and (b=0, root=1, a=1) in declaration
        // order root, a, b.
        assert_eq!(universe.index_of("101"), Some(0));
        assert_eq!(universe.index_of("110"), Some(1));
    }

    #[test]
    fn short_tabular_row_is_a_schema_mismatch() {
        let dir = scratch_dir("universe_short");
        let path = write_file(&dir, "measurements.csv", "root;a;b\n1;0;0\n1;1\n");
        let err = ConfigurationUniverse::from_measurement_csv(&toy_study(), &path)
            .expect_err("must fail");
        assert!(matches!(err, AnalysisError::SchemaMismatch { .. }));
        assert!(err.to_string().contains("row 3"));
    }

    #[test]
    fn missing_feature_column_is_a_schema_mismatch() {
        let dir = scratch_dir("universe_missing_col");
        let path = write_file(&dir, "measurements.csv", "root;a\n1;0\n");
        let err = ConfigurationUniverse::from_measurement_csv(&toy_study(), &path)
            .expect_err("must fail");
        assert!(err.to_string().contains("feature b"));
    }

    #[test]
    fn duplicate_ground_truth_row_is_rejected() {
        let dir = scratch_dir("universe_dup");
        let path = write_file(&dir, "measurements.csv", "root;a;b\n1;0;0\n1;0;0\n");
        let err = ConfigurationUniverse::from_measurement_csv(&toy_study(), &path)
            .expect_err("must fail");
        assert!(matches!(err, AnalysisError::DuplicateConfiguration { .. }));
    }

    #[test]
    fn markup_universe_encodes_active_features_in_declaration_order() {
        let dir = scratch_dir("universe_xml");
        let path = write_file(
            &dir,
            "measurements.xml",
            "<results>\n\
             <row><data columname=\"Configuration\">root, a</data>\
             <data columname=\"Performance\">10</data></row>\n\
             <row><data column=\"Configuration\">root, b,</data>\
             <data column=\"Performance\">20</data></row>\n\
             <row><data columname=\"Configuration\">root, a, b</data></row>\n\
             </results>\n",
        );
        let universe =
            ConfigurationUniverse::from_measurement_xml(&toy_study(), &path).expect("universe");
        assert_eq!(universe.len(), 3);
        assert_eq!(universe.index_of("110"), Some(0));
        assert_eq!(universe.index_of("101"), Some(1));
        assert_eq!(universe.index_of("111"), Some(2));
    }

    #[test]
    fn markup_universe_counts_root_as_always_active() {
        let dir = scratch_dir("universe_xml_root");
        let path = write_file(
            &dir,
            "measurements.xml",
            "<results><data columname=\"Configuration\">a</data></results>",
        );
        let universe =
            ConfigurationUniverse::from_measurement_xml(&toy_study(), &path).expect("universe");
        assert_eq!(universe.index_of("110"), Some(0));
    }

    #[test]
    fn measurement_format_is_chosen_by_extension() {
        let dir = scratch_dir("universe_pick");
        let csv = write_file(&dir, "measurements.csv", "root;a;b\n1;0;1\n");
        let xml = write_file(
            &dir,
            "measurements.xml",
            "<results><data columname=\"Configuration\">b</data></results>",
        );
        let study = toy_study();
        let from_csv =
            ConfigurationUniverse::from_measurement_file(&study, &csv).expect("csv universe");
        let from_xml =
            ConfigurationUniverse::from_measurement_file(&study, &xml).expect("xml universe");
        assert_eq!(from_csv.index_of("101"), Some(0));
        assert_eq!(from_xml.index_of("101"), Some(0));
    }

    #[test]
    fn mapper_round_trips_known_configurations_and_sorts() {
        let dir = scratch_dir("mapper_roundtrip");
        let measurements = write_file(
            &dir,
            "measurements.csv",
            "root;a;b\n1;0;0\n1;0;1\n1;1;0\n1;1;1\n",
        );
        let study = toy_study();
        let universe =
            ConfigurationUniverse::from_measurement_csv(&study, &measurements).expect("universe");
        // Sample header order differs from the declaration order.
        let samples = write_file(
            &dir,
            "sampledConfigurations_rand_t1.csv",
            "a;b;root\n1;1;1\n0;0;1\n",
        );
        let source = SampleSource {
            case_study: "toy",
            strategy: "rand",
            seed: 1,
        };
        let indices =
            map_sampled_configurations(&study, &universe, &samples, source).expect("indices");
        assert_eq!(indices, vec![0, 3]);
    }

    #[test]
    fn unmappable_sample_names_case_study_strategy_and_seed() {
        let dir = scratch_dir("mapper_miss");
        let measurements = write_file(&dir, "measurements.csv", "root;a;b\n1;0;0\n");
        let study = toy_study();
        let universe =
            ConfigurationUniverse::from_measurement_csv(&study, &measurements).expect("universe");
        let samples = write_file(
            &dir,
            "sampledConfigurations_henard_t2.csv",
            "root;a;b\n1;1;1\n",
        );
        let source = SampleSource {
            case_study: "toy",
            strategy: "henard",
            seed: 7,
        };
        let err = map_sampled_configurations(&study, &universe, &samples, source)
            .expect_err("must fail");
        match err {
            AnalysisError::UnmappableConfiguration {
                case_study,
                strategy,
                seed,
                encoding,
            } => {
                assert_eq!(case_study, "toy");
                assert_eq!(strategy, "henard");
                assert_eq!(seed, 7);
                assert_eq!(encoding, "111");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn case_study_features_come_from_the_sample_header() {
        let dir = scratch_dir("study_header");
        let path = write_file(
            &dir,
            "sampledConfigurations_rand_t1.csv",
            "root;compress;encrypt\n1;0;1\n",
        );
        let study = CaseStudy::from_sample_header("lrzip", &path).expect("study");
        assert_eq!(study.name, "lrzip");
        assert_eq!(study.features, vec!["root", "compress", "encrypt"]);
    }

    #[test]
    fn manifest_round_trips_from_yaml() {
        let dir = scratch_dir("manifest");
        let path = write_file(
            &dir,
            "sweep.yaml",
            "case_studies:\n\
             \x20 - name: BerkeleyDBC\n\
             \x20   job_arg: 1000\n\
             \x20 - name: lrzip\n\
             strategies: [rand, henard]\n\
             seeds: { from: 1, to: 100 }\n\
             paths:\n\
             \x20 runs: /data/runs\n\
             \x20 results: /data/results\n\
             \x20 measurements: /data/measurements\n\
             \x20 summary: /data/summary\n",
        );
        let manifest = load_manifest(&path).expect("manifest");
        assert_eq!(manifest.case_studies.len(), 2);
        assert_eq!(manifest.case_studies[0].job_arg, 1000);
        assert_eq!(manifest.case_studies[1].job_arg, 1);
        assert_eq!(manifest.strengths, vec!["t1", "t2", "t3"]);
        assert_eq!(manifest.seeds.len(), 100);
        assert!(manifest.dispatch.is_none());
    }
}
