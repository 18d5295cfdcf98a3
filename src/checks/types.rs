use std::collections::BTreeMap;
use std::fmt;

/// State of a single named check, parsed case-insensitively from the host's
/// token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    Success,
    Failure,
    Pending,
    Skipped,
    Neutral,
    Unknown,
}

impl CheckState {
    pub fn parse(token: &str) -> Self {
        match token.to_ascii_lowercase().as_str() {
            "success" => CheckState::Success,
            "skipped" => CheckState::Skipped,
            "neutral" => CheckState::Neutral,
            "pending" | "in_progress" | "queued" | "waiting" | "requested" | "none" => {
                CheckState::Pending
            }
            "failure" | "error" | "cancelled" | "timed_out" | "action_required" | "stale"
            | "startup_failure" => CheckState::Failure,
            _ => CheckState::Unknown,
        }
    }

    /// Bucket used by the gate. Unknown states count as failures.
    pub fn class(self) -> CheckClass {
        match self {
            CheckState::Success | CheckState::Skipped | CheckState::Neutral => CheckClass::Success,
            CheckState::Pending => CheckClass::Pending,
            CheckState::Failure | CheckState::Unknown => CheckClass::Failure,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckClass {
    Success,
    Pending,
    Failure,
}

/// One named result, from either a status entry or a check suite/run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub state: CheckState,
    /// Token exactly as the host reported it, kept for reporting.
    pub raw_state: String,
    pub url: Option<String>,
}

impl CheckResult {
    pub fn new(name: impl Into<String>, raw_state: impl Into<String>, url: Option<String>) -> Self {
        let raw_state = raw_state.into();
        Self {
            name: name.into(),
            state: CheckState::parse(&raw_state),
            raw_state,
            url,
        }
    }

    /// `"<url> <state>"`, the form written to status reports. A missing URL
    /// is written as `None` so the first field is never empty.
    pub fn details(&self) -> String {
        format!("{} {}", self.url.as_deref().unwrap_or("None"), self.raw_state)
    }
}

/// Normalized results of one commit, keyed by context name.
pub type CheckResults = BTreeMap<String, CheckResult>;

/// Why the gate passed or failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    Passed,
    /// Pending checks were tolerated because `fail_on_pending` is off.
    PassedWithPending { pending: Vec<String> },
    /// Fewer results than `min_checks`. Usually checks have not started yet
    /// or the context filters are wrong.
    InsufficientChecks { found: usize, required: usize },
    ChecksFailed { failed: Vec<String> },
    ChecksPending { pending: Vec<String> },
}

impl GateOutcome {
    pub fn is_pass(&self) -> bool {
        matches!(
            self,
            GateOutcome::Passed | GateOutcome::PassedWithPending { .. }
        )
    }
}

impl fmt::Display for GateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateOutcome::Passed => write!(f, "all checks passed"),
            GateOutcome::PassedWithPending { pending } => {
                write!(f, "passed with {} pending check(s): {}", pending.len(), pending.join(", "))
            }
            GateOutcome::InsufficientChecks { found, required } => write!(
                f,
                "only {found} check(s) found, but a minimum of {required} is required"
            ),
            GateOutcome::ChecksFailed { failed } => {
                write!(f, "{} check(s) failed: {}", failed.len(), failed.join(", "))
            }
            GateOutcome::ChecksPending { pending } => write!(
                f,
                "{} check(s) still pending: {}",
                pending.len(),
                pending.join(", ")
            ),
        }
    }
}

/// Aggregate verdict for one commit. Whether it passed is derived from the
/// outcome, never stored separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub outcome: GateOutcome,
    /// Reported subset, `name -> "<url> <state>"`.
    pub results: BTreeMap<String, String>,
}

impl Verdict {
    pub fn passed(&self) -> bool {
        self.outcome.is_pass()
    }
}
