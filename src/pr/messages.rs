use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::fmt;
use std::str::FromStr;

pub const PR_PREFIX: &str = "**Release Notice**:";

/// Pipeline notices posted to the pull requests included in a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Stage,
    StageFailed,
    Prod,
    ProdFailed,
    ProdRollback,
    RollbackFailed,
    BrokeVagrant,
    E2eFailed,
}

impl MessageType {
    pub fn text(self) -> &'static str {
        match self {
            MessageType::Stage => "This PR has been deployed to the staging environment",
            MessageType::StageFailed => "This PR failed to deploy to the staging environment.",
            MessageType::Prod => "This PR has been deployed to the production environment.",
            MessageType::ProdFailed => "This PR failed to deploy to the production environment.",
            MessageType::ProdRollback => {
                "This PR has been rolled back from the production environment."
            }
            MessageType::RollbackFailed => {
                "This PR failed to roll back from the production environment."
            }
            MessageType::BrokeVagrant => "This PR may have broken the Vagrant devstack build.",
            MessageType::E2eFailed => {
                "This PR may have caused end-to-end tests to fail on the staging environment."
            }
        }
    }

    /// Render the full comment body. Stage notices announce the expected
    /// production release date, defaulting to the next business day after
    /// `today`.
    pub fn render(self, extra_text: &str, deploy_date: Option<NaiveDate>, today: NaiveDate) -> String {
        let extra = match self {
            MessageType::Stage => {
                let date = deploy_date.unwrap_or_else(|| next_business_day(today));
                format!(
                    "in preparation for a release to production on {}. {extra_text}",
                    date.format("%A, %B %d, %Y")
                )
            }
            _ => extra_text.to_string(),
        };
        format!("{PR_PREFIX} {} {extra}", self.text())
            .trim_end()
            .to_string()
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::Stage => "stage",
            MessageType::StageFailed => "stage_failed",
            MessageType::Prod => "prod",
            MessageType::ProdFailed => "prod_failed",
            MessageType::ProdRollback => "prod_rollback",
            MessageType::RollbackFailed => "rollback_failed",
            MessageType::BrokeVagrant => "broke_vagrant",
            MessageType::E2eFailed => "e2e_failed",
        };
        write!(f, "{name}")
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stage" => Ok(MessageType::Stage),
            "stage_failed" => Ok(MessageType::StageFailed),
            "prod" => Ok(MessageType::Prod),
            "prod_failed" => Ok(MessageType::ProdFailed),
            "prod_rollback" => Ok(MessageType::ProdRollback),
            "rollback_failed" => Ok(MessageType::RollbackFailed),
            "broke_vagrant" => Ok(MessageType::BrokeVagrant),
            "e2e_failed" => Ok(MessageType::E2eFailed),
            other => Err(format!("unknown message type: {other}")),
        }
    }
}

/// The next weekday after `day`.
pub fn next_business_day(day: NaiveDate) -> NaiveDate {
    let days = match day.weekday() {
        Weekday::Fri => 3,
        Weekday::Sat => 2,
        _ => 1,
    };
    day + Duration::days(days)
}
