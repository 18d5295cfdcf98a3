use regex::Regex;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{error, info, warn};

use super::types::{CheckClass, CheckResults, GateOutcome, Verdict};
use crate::config::ChecksConfig;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid context pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Which results count toward the verdict and how they are judged.
#[derive(Debug, Clone)]
pub struct ContextPolicy {
    exclude: Option<Regex>,
    include: Option<Regex>,
    min_checks: usize,
    fail_on_pending: bool,
    /// Names whose failures are treated as success.
    ignore_list: Vec<String>,
}

impl ContextPolicy {
    pub fn from_config(config: &ChecksConfig) -> Result<Self, FilterError> {
        Ok(Self {
            exclude: compile(config.exclude_contexts.as_deref())?,
            include: compile(config.include_contexts.as_deref())?,
            min_checks: config.min_checks,
            fail_on_pending: config.fail_on_pending,
            ignore_list: config.ignore_list.clone(),
        })
    }

    /// Keep the results this policy reports on.
    ///
    /// With `required` set, only those names survive. Then an include pattern,
    /// when present, keeps only matching names and the exclude pattern is not
    /// consulted; otherwise names matching the exclude pattern are dropped.
    pub fn select(&self, results: CheckResults, required: Option<&BTreeSet<String>>) -> CheckResults {
        results
            .into_iter()
            .filter(|(name, _)| required.map_or(true, |names| names.contains(name)))
            .filter(|(name, _)| match (&self.include, &self.exclude) {
                (Some(include), _) => include.is_match(name),
                (None, Some(exclude)) => !exclude.is_match(name),
                (None, None) => true,
            })
            .collect()
    }

    /// Select the reported results and decide whether the gate passes.
    pub fn evaluate(&self, results: CheckResults, required: Option<&BTreeSet<String>>) -> Verdict {
        let selected = self.select(results, required);
        let reported = selected
            .iter()
            .map(|(name, result)| (name.clone(), result.details()))
            .collect();

        info!(checks = selected.len(), "evaluating checks");
        if selected.len() < self.min_checks {
            let outcome = GateOutcome::InsufficientChecks {
                found: selected.len(),
                required: self.min_checks,
            };
            error!(
                "DEPLOYMENT GATE FAILURE: {outcome}. Checks may not have started yet, or the context filters exclude them"
            );
            return Verdict {
                outcome,
                results: reported,
            };
        }

        let mut succeeded = Vec::new();
        let mut pending = Vec::new();
        let mut failed = Vec::new();
        for (name, result) in &selected {
            match result.state.class() {
                CheckClass::Success => {
                    info!(check = %name, state = %result.raw_state, "check passed");
                    succeeded.push(name.clone());
                }
                CheckClass::Pending => {
                    info!(check = %name, state = %result.raw_state, "check still running");
                    pending.push(name.clone());
                }
                CheckClass::Failure if self.ignore_list.contains(name) => {
                    info!(check = %name, "ignoring failure of check on the ignore list");
                    succeeded.push(name.clone());
                }
                CheckClass::Failure => {
                    error!(check = %name, details = %result.details(), "check FAILED");
                    failed.push(name.clone());
                }
            }
        }
        info!(
            succeeded = succeeded.len(),
            pending = pending.len(),
            failed = failed.len(),
            "check summary"
        );

        let outcome = if !failed.is_empty() {
            GateOutcome::ChecksFailed { failed }
        } else if !pending.is_empty() && self.fail_on_pending {
            GateOutcome::ChecksPending { pending }
        } else if !pending.is_empty() {
            GateOutcome::PassedWithPending { pending }
        } else {
            GateOutcome::Passed
        };

        match &outcome {
            GateOutcome::ChecksFailed { .. } | GateOutcome::ChecksPending { .. } => {
                error!("DEPLOYMENT GATE FAILURE: {outcome}")
            }
            GateOutcome::PassedWithPending { .. } => {
                warn!("{outcome}, but pending checks are not failing the gate")
            }
            _ => info!("{outcome}"),
        }

        Verdict {
            outcome,
            results: reported,
        }
    }
}

fn compile(pattern: Option<&str>) -> Result<Option<Regex>, FilterError> {
    pattern
        .filter(|p| !p.is_empty())
        .map(|p| {
            Regex::new(p).map_err(|source| FilterError::InvalidPattern {
                pattern: p.to_string(),
                source,
            })
        })
        .transpose()
}
