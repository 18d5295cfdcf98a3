use crate::checks::{GateOutcome, Verdict};
use crate::host::IssueRef;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read input file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write report to stdout: {0}")]
    Stdout(#[from] std::io::Error),

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Input file naming the pull request to check, as written by an earlier
/// pipeline step.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckInput {
    pub pr_number: u64,
}

/// One line of `pr-range` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullSummary {
    pub number: u64,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl From<&IssueRef> for PullSummary {
    fn from(issue: &IssueRef) -> Self {
        Self {
            number: issue.number,
            title: issue.title.clone(),
            url: issue.html_url.clone(),
        }
    }
}

pub fn load_input(path: &Path) -> Result<CheckInput, ReportError> {
    let content = std::fs::read_to_string(path).map_err(|source| ReportError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_yaml::from_str(&content)?)
}

/// Serialize `value` as YAML to `out_file`, or to stdout when no file is given.
/// Missing parent directories are created.
#[instrument(skip(value))]
pub fn write_yaml<T: Serialize>(value: &T, out_file: Option<&Path>) -> Result<(), ReportError> {
    let yaml = serde_yaml::to_string(value)?;
    match out_file {
        None => {
            debug!("writing report to stdout");
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(yaml.as_bytes())?;
            stdout.flush()?;
            Ok(())
        }
        Some(path) => {
            debug!(path = %path.display(), "writing report to file");
            let to_err = |source| ReportError::FileWrite {
                path: path.to_path_buf(),
                source,
            };
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(to_err)?;
            }
            std::fs::write(path, yaml).map_err(to_err)
        }
    }
}

/// One-line colored verdict on stderr, so stdout stays machine readable.
pub fn print_verdict(verdict: &Verdict) {
    eprintln!("{} {}", colorize_outcome(&verdict.outcome), verdict.outcome);
}

fn colorize_outcome(outcome: &GateOutcome) -> colored::ColoredString {
    match outcome {
        GateOutcome::Passed => "PASS".green().bold(),
        GateOutcome::PassedWithPending { .. } => "PASS".yellow().bold(),
        GateOutcome::ChecksPending { .. } => "PENDING".yellow().bold(),
        GateOutcome::InsufficientChecks { .. } | GateOutcome::ChecksFailed { .. } => {
            "FAIL".red().bold()
        }
    }
}
