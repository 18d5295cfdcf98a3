pub mod rest;
pub mod types;

#[cfg(test)]
pub mod fake;

pub use rest::RestHost;
pub use types::{
    AnnotatedTag, CombinedStatus, Comment, CommitHandle, CommitRef, GitRef, IssueRef,
    NewPullRequest, NewTag, PullRequest, RateLimit, Repository, StatusEntry, Tagger, User,
};

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// What kind of object a reference was expected to resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    PullRequest,
    Branch,
    Commit,
    GitRef,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceKind::PullRequest => write!(f, "pull request"),
            ReferenceKind::Branch => write!(f, "branch"),
            ReferenceKind::Commit => write!(f, "commit"),
            ReferenceKind::GitRef => write!(f, "git ref"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// Rate limiting, 5xx responses and connection failures. Safe to retry.
    #[error("transient GitHub failure (status {}): {message}", display_status(*status))]
    Transient {
        status: Option<u16>,
        message: String,
    },

    #[error("GitHub API request failed (status {}): {message}", display_status(*status))]
    Fatal {
        status: Option<u16>,
        message: String,
    },

    #[error("{kind} `{reference}` does not exist")]
    InvalidReference {
        kind: ReferenceKind,
        reference: String,
    },

    #[error("tag `{tag}` already exists and points at {actual}, not {expected}")]
    TagMismatch {
        tag: String,
        expected: String,
        actual: String,
    },

    #[error("cannot resolve a commit SHA from {0}")]
    UnresolvableObject(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("search query needs {len} characters but the host accepts at most {max}")]
    QueryTooLong { len: usize, max: usize },

    #[error("failed to decode GitHub response: {0}")]
    Decode(String),

    #[error("GitHub token not found in configuration or environment")]
    MissingToken,
}

fn display_status(status: Option<u16>) -> String {
    status.map_or_else(|| "none".to_string(), |s| s.to_string())
}

impl ApiError {
    /// Classify an unsuccessful HTTP response. 429, 5xx and 403 rate-limit
    /// responses are transient; every other status is fatal.
    pub fn from_status(status: u16, message: String) -> Self {
        let rate_limited =
            status == 403 && message.to_ascii_lowercase().contains("rate limit");
        if status == 429 || status >= 500 || rate_limited {
            ApiError::Transient {
                status: Some(status),
                message,
            }
        } else {
            ApiError::Fatal {
                status: Some(status),
                message,
            }
        }
    }

    /// Retry classifier shared by every host-facing call site.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Transient { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Transient { status, .. } | ApiError::Fatal { status, .. } => *status,
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Fatal { status: Some(404), .. })
    }

    /// GitHub answers 422 "Reference already exists" when a ref is created twice.
    pub fn is_already_exists(&self) -> bool {
        match self {
            ApiError::Fatal {
                status: Some(422),
                message,
            } => message.to_ascii_lowercase().contains("already exists"),
            _ => false,
        }
    }

    /// Turn a 404 into an [`ApiError::InvalidReference`]; anything else is
    /// returned unchanged.
    pub fn or_invalid_reference(self, kind: ReferenceKind, reference: impl Into<String>) -> Self {
        if self.is_not_found() {
            ApiError::InvalidReference {
                kind,
                reference: reference.into(),
            }
        } else {
            self
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            ApiError::Transient {
                status: None,
                message: err.to_string(),
            }
        } else if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            ApiError::from_status(status.as_u16(), err.to_string())
        } else {
            ApiError::Fatal {
                status: None,
                message: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}

/// The raw operations consumed from the source-control host, scoped to one
/// repository. Implementations perform exactly one logical request per call
/// and never retry; retrying is the caller's concern.
#[async_trait]
pub trait HostApi: Send + Sync {
    /// Repository every call is scoped to.
    fn repository(&self) -> &Repository;

    async fn combined_status(&self, sha: &str) -> Result<CombinedStatus, ApiError>;

    /// Check suites and check runs for a commit as untyped JSON:
    /// `{"check_suites": [...], "check_runs": [...]}`.
    async fn check_data(&self, sha: &str) -> Result<serde_json::Value, ApiError>;

    /// Ordered commits between two references, as computed by the host.
    async fn compare(&self, base: &str, head: &str) -> Result<Vec<CommitRef>, ApiError>;

    async fn search_issues(&self, query: &str) -> Result<Vec<IssueRef>, ApiError>;

    async fn branch_head(&self, branch: &str) -> Result<String, ApiError>;

    async fn list_commits(&self, sha: &str) -> Result<Vec<CommitRef>, ApiError>;

    /// Status contexts required by the protection rules of `branch`.
    async fn required_contexts(&self, branch: &str) -> Result<Vec<String>, ApiError>;

    async fn get_pull(&self, number: u64) -> Result<PullRequest, ApiError>;

    async fn create_pull(&self, pull: &NewPullRequest) -> Result<PullRequest, ApiError>;

    async fn issue_comments(&self, number: u64) -> Result<Vec<Comment>, ApiError>;

    async fn create_issue_comment(&self, number: u64, body: &str) -> Result<Comment, ApiError>;

    async fn create_git_tag(&self, tag: &NewTag) -> Result<AnnotatedTag, ApiError>;

    async fn get_git_tag(&self, sha: &str) -> Result<AnnotatedTag, ApiError>;

    /// `name` is fully qualified, e.g. `refs/tags/v1`.
    async fn create_git_ref(&self, name: &str, sha: &str) -> Result<GitRef, ApiError>;

    /// `name` omits the `refs/` prefix, e.g. `tags/v1` or `heads/main`.
    async fn get_git_ref(&self, name: &str) -> Result<GitRef, ApiError>;

    /// `name` omits the `refs/` prefix.
    async fn delete_git_ref(&self, name: &str) -> Result<(), ApiError>;

    async fn current_user(&self) -> Result<User, ApiError>;

    async fn rate_limit(&self) -> Result<RateLimit, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(ApiError::from_status(429, "slow down".into()).is_transient());
        assert!(ApiError::from_status(502, "bad gateway".into()).is_transient());
        assert!(ApiError::from_status(403, "API rate limit exceeded".into()).is_transient());
        assert!(!ApiError::from_status(403, "Resource not accessible".into()).is_transient());
        assert!(!ApiError::from_status(404, "Not Found".into()).is_transient());
        assert!(!ApiError::from_status(422, "Validation Failed".into()).is_transient());
    }

    #[test]
    fn test_already_exists_requires_422() {
        assert!(ApiError::from_status(422, "Reference already exists".into()).is_already_exists());
        assert!(!ApiError::from_status(421, "Reference already exists".into()).is_already_exists());
        assert!(!ApiError::from_status(422, "Validation Failed".into()).is_already_exists());
    }

    #[test]
    fn test_not_found_becomes_invalid_reference() {
        let err = ApiError::from_status(404, "Not Found".into())
            .or_invalid_reference(ReferenceKind::PullRequest, "7");
        assert!(matches!(
            err,
            ApiError::InvalidReference { kind: ReferenceKind::PullRequest, ref reference } if reference == "7"
        ));

        let untouched = ApiError::from_status(500, "boom".into())
            .or_invalid_reference(ReferenceKind::PullRequest, "7");
        assert!(untouched.is_transient());
    }
}
