use anyhow::{anyhow, Result};
use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use sweep_core::{CaseStudyEntry, DispatchProfile, SeedRange};
use tracing::info;

pub const ANYWHERE_CLUSTER: &str = "anywhere";
pub const SUBMIT_COMMAND: &str = "sbatch";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Sampling,
    Predicting,
    PredictingSvr,
    PredictingForest,
    FailureRate,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Sampling => "sampling",
            Operation::Predicting => "predicting",
            Operation::PredictingSvr => "predicting-svr",
            Operation::PredictingForest => "predicting-forest",
            Operation::FailureRate => "failure-rate",
        }
    }

    fn script<'a>(&self, profile: &'a DispatchProfile) -> &'a str {
        match self {
            Operation::Sampling => &profile.scripts.sampling,
            Operation::Predicting => &profile.scripts.predicting,
            Operation::PredictingSvr => &profile.scripts.predicting_svr,
            Operation::PredictingForest => &profile.scripts.predicting_forest,
            Operation::FailureRate => &profile.scripts.failure_rate,
        }
    }
}

pub fn job_id_now() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn build_job_lines(
    profile: &DispatchProfile,
    operation: Operation,
    strategy: &str,
    case_studies: &[CaseStudyEntry],
    seeds: SeedRange,
) -> Vec<String> {
    let script = operation.script(profile);
    let mut jobs = Vec::new();
    for case_study in case_studies {
        for seed in seeds.iter() {
            jobs.push(format!(
                "export LD_LIBRARY_PATH={}:$LD_LIBRARY_PATH && {} {} {} {} {} {}",
                profile.library_dir, script, case_study.name, case_study.job_arg, strategy, seed,
                seed
            ));
        }
    }
    jobs
}

pub fn write_job_file(profile: &DispatchProfile, job_id: i64, lines: &[String]) -> Result<PathBuf> {
    fs::create_dir_all(&profile.job_dir)?;
    let path = profile
        .job_dir
        .join(format!("{}_jobs_{}.txt", ANYWHERE_CLUSTER, job_id));
    let mut body = lines.join("\n");
    body.push('\n');
    fs::write(&path, body)?;
    Ok(path)
}

pub fn sbatch_options(
    profile: &DispatchProfile,
    cluster: &str,
    operation: Operation,
    strategy: &str,
    job_count: usize,
) -> Result<Vec<String>> {
    let mut options = Vec::new();
    if cluster != ANYWHERE_CLUSTER {
        let entry = profile
            .clusters
            .iter()
            .find(|entry| entry.name == cluster)
            .ok_or_else(|| anyhow!("unknown cluster: {}", cluster))?;
        if let Some(account) = &profile.account {
            options.push("-A".to_string());
            options.push(account.clone());
        }
        let constraint = match entry.feature.as_deref() {
            Some(feature) if !feature.is_empty() => format!("{}&{}", entry.name, feature),
            _ => entry.name.clone(),
        };
        options.push(format!("--constraint={}", constraint));
    }
    options.extend(
        ["-n", "1", "-c", "1", "--mem=20000M", "--time=24:00:00"]
            .iter()
            .map(|opt| opt.to_string()),
    );
    options.push(format!("--output={}", profile.slurm_log));
    options.push("-J".to_string());
    options.push(strategy.to_string());
    if operation == Operation::Sampling {
        options.push("--exclusive".to_string());
    }
    options.push(format!("--array=1-{}", job_count));
    Ok(options)
}

pub fn submission_command(profile: &DispatchProfile, options: Vec<String>, job_id: i64) -> Vec<String> {
    let mut command = vec![SUBMIT_COMMAND.to_string()];
    command.extend(options);
    command.push(profile.scripts.runner.clone());
    command.push(job_id.to_string());
    command
}

pub fn submit(command: &[String]) -> Result<String> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| anyhow!("empty submission command"))?;
    info!(command = %command.join(" "), "submitting array job");
    let output = Command::new(program).args(args).output()?;
    if !output.status.success() {
        return Err(anyhow!(
            "scheduler rejected the submission ({}): {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sweep_core::{ClusterEntry, DispatchScripts};

    fn profile() -> DispatchProfile {
        DispatchProfile {
            job_dir: std::env::temp_dir().join(format!("sweep_jobs_{}", std::process::id())),
            library_dir: "/scratch/lib".to_string(),
            slurm_log: "/scratch/results/slurm_out.log".to_string(),
            clusters: vec![
                ClusterEntry {
                    name: "eku".to_string(),
                    feature: Some("i5".to_string()),
                },
                ClusterEntry {
                    name: "zeus".to_string(),
                    feature: None,
                },
            ],
            scripts: DispatchScripts {
                runner: "/scratch/cluster/runArray.sh".to_string(),
                sampling: "/scratch/cluster/sample.sh".to_string(),
                predicting: "/scratch/cluster/predict.sh".to_string(),
                predicting_svr: "/scratch/cluster/predictSvr.sh".to_string(),
                predicting_forest: "/scratch/cluster/predictForest.sh".to_string(),
                failure_rate: "/scratch/cluster/failureRate.sh".to_string(),
            },
            account: Some("ls-apel".to_string()),
        }
    }

    fn case_studies() -> Vec<CaseStudyEntry> {
        vec![
            CaseStudyEntry {
                name: "BerkeleyDBC".to_string(),
                job_arg: 1000,
            },
            CaseStudyEntry {
                name: "lrzip".to_string(),
                job_arg: 1,
            },
        ]
    }

    #[test]
    fn one_job_line_per_case_study_and_seed() {
        let seeds = SeedRange { from: 1, to: 3 };
        let lines = build_job_lines(
            &profile(),
            Operation::Sampling,
            "henard",
            &case_studies(),
            seeds,
        );
        assert_eq!(lines.len(), 6);
        assert_eq!(
            lines[0],
            "export LD_LIBRARY_PATH=/scratch/lib:$LD_LIBRARY_PATH && \
             /scratch/cluster/sample.sh BerkeleyDBC 1000 henard 1 1"
        );
        assert_eq!(
            lines[5],
            "export LD_LIBRARY_PATH=/scratch/lib:$LD_LIBRARY_PATH && \
             /scratch/cluster/sample.sh lrzip 1 henard 3 3"
        );
    }

    #[test]
    fn operations_pick_their_script() {
        let seeds = SeedRange { from: 1, to: 1 };
        let lines = build_job_lines(
            &profile(),
            Operation::FailureRate,
            "rand",
            &case_studies(),
            seeds,
        );
        assert!(lines[0].contains("/scratch/cluster/failureRate.sh"));
    }

    #[test]
    fn constrained_cluster_adds_account_and_feature() {
        let options =
            sbatch_options(&profile(), "eku", Operation::Predicting, "rand", 10).expect("options");
        assert!(options.contains(&"-A".to_string()));
        assert!(options.contains(&"ls-apel".to_string()));
        assert!(options.contains(&"--constraint=eku&i5".to_string()));
        assert!(options.contains(&"--array=1-10".to_string()));
        assert!(!options.contains(&"--exclusive".to_string()));
    }

    #[test]
    fn sampling_runs_exclusive_and_anywhere_has_no_constraint() {
        let options =
            sbatch_options(&profile(), ANYWHERE_CLUSTER, Operation::Sampling, "henard", 4)
                .expect("options");
        assert!(options.contains(&"--exclusive".to_string()));
        assert!(!options.iter().any(|opt| opt.starts_with("--constraint=")));
        assert!(!options.contains(&"-A".to_string()));
    }

    #[test]
    fn unknown_cluster_is_rejected() {
        let err = sbatch_options(&profile(), "chimaira", Operation::Sampling, "rand", 1)
            .expect_err("must fail");
        assert!(err.to_string().contains("unknown cluster"));
    }

    #[test]
    fn submission_command_ends_with_runner_and_job_id() {
        let profile = profile();
        let options =
            sbatch_options(&profile, "zeus", Operation::Predicting, "rand", 2).expect("options");
        let command = submission_command(&profile, options, 1234);
        assert_eq!(command[0], SUBMIT_COMMAND);
        assert!(command.contains(&"--constraint=zeus".to_string()));
        assert_eq!(command[command.len() - 2], "/scratch/cluster/runArray.sh");
        assert_eq!(command[command.len() - 1], "1234");
    }

    #[test]
    fn job_file_holds_one_line_per_job() {
        let profile = profile();
        let lines = vec!["a".to_string(), "b".to_string()];
        let path = write_job_file(&profile, 77, &lines).expect("job file");
        assert!(path.ends_with("anywhere_jobs_77.txt"));
        let body = fs::read_to_string(&path).expect("job file content");
        assert_eq!(body, "a\nb\n");
        let _ = fs::remove_file(path);
    }
}
