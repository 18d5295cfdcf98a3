use serde_json::Value;
use tracing::debug;

use super::types::{CheckResult, CheckResults};
use crate::host::CombinedStatus;

/// Token used when the host reports a null state. GitHub sends `null` for
/// statuses and runs that have not concluded; it is treated as pending.
const NULL_STATE: &str = "none";
const UNKNOWN: &str = "unknown";

/// Merge the combined status and the check suites/runs of one commit into
/// a single mapping keyed by name.
///
/// Statuses are inserted first, then check suites (named by their app),
/// then check runs. A later entry with an existing name overwrites it.
pub fn normalize(status: &CombinedStatus, checks: &Value) -> CheckResults {
    let mut results = CheckResults::new();

    for entry in &status.statuses {
        let name = entry.context.clone().unwrap_or_else(|| UNKNOWN.to_string());
        let state = entry.state.clone().unwrap_or_else(|| NULL_STATE.to_string());
        insert(&mut results, CheckResult::new(name, state, entry.target_url.clone()));
    }

    for suite in entries(checks, "check_suites") {
        let name = str_at(suite, &["app", "name"]).unwrap_or(UNKNOWN);
        insert(&mut results, from_check(name, suite));
    }

    for run in entries(checks, "check_runs") {
        let name = str_at(run, &["name"])
            .or_else(|| str_at(run, &["app", "name"]))
            .unwrap_or(UNKNOWN);
        insert(&mut results, from_check(name, run));
    }

    debug!(results = results.len(), "normalized statuses and checks");
    results
}

fn insert(results: &mut CheckResults, result: CheckResult) {
    if let Some(previous) = results.insert(result.name.clone(), result) {
        debug!(name = %previous.name, "check reported more than once, keeping the later entry");
    }
}

fn from_check(name: &str, check: &Value) -> CheckResult {
    let state = match check.get("conclusion") {
        None | Some(Value::Null) => NULL_STATE,
        Some(Value::String(conclusion)) => conclusion.as_str(),
        Some(_) => UNKNOWN,
    };
    let url = str_at(check, &["url"])
        .or_else(|| str_at(check, &["html_url"]))
        .map(str::to_string);
    CheckResult::new(name, state, url)
}

fn entries<'a>(checks: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    checks
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(value, |current, key| current.get(key))
        .and_then(Value::as_str)
}
