use chrono::{Local, NaiveDate, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::checks::{self, CheckResults, ContextPolicy, FilterError, Verdict};
use crate::config::ChecksConfig;
use crate::host::{
    ApiError, CombinedStatus, CommitRef, HostApi, IssueRef, NewPullRequest, PullRequest,
    ReferenceKind, Repository, Tagger, User,
};
use crate::pr::{CommentOutcome, MessageType, PrCommenter};
use crate::retry::{with_retry, RetryConfig};
use crate::search::PrResolver;
use crate::tags::{TagOutcome, TagReconciler};

/// Pipeline-facing operations on one repository.
///
/// Wraps a [`HostApi`] with the retry policy and check policy chosen at
/// startup. One instance per pipeline step; it is not designed to be
/// shared across threads polling in parallel.
pub struct GitHubApi {
    host: Arc<dyn HostApi>,
    retry: RetryConfig,
    policy: ContextPolicy,
    all_checks: bool,
    protected_branch: String,
}

impl GitHubApi {
    pub fn new(
        host: Arc<dyn HostApi>,
        retry: RetryConfig,
        checks: &ChecksConfig,
    ) -> Result<Self, FilterError> {
        Ok(Self {
            host,
            retry,
            policy: ContextPolicy::from_config(checks)?,
            all_checks: checks.all_checks,
            protected_branch: checks.protected_branch.clone(),
        })
    }

    pub fn repository(&self) -> &Repository {
        self.host.repository()
    }

    /// The authenticated user.
    pub async fn user(&self) -> Result<User, ApiError> {
        let host = self.host.as_ref();
        with_retry(&self.retry, "current_user", ApiError::is_transient, move || {
            host.current_user()
        })
        .await
    }

    /// Log the current rate-limit window. Hosts without rate limiting
    /// answer with an error, which is logged and otherwise ignored.
    pub async fn log_rate_limit(&self) {
        let host = self.host.as_ref();
        let rate = with_retry(&self.retry, "rate_limit", ApiError::is_transient, move || {
            host.rate_limit()
        })
        .await;
        match rate {
            Ok(rate) => debug!(
                limit = rate.limit,
                remaining = rate.remaining,
                reset = rate.reset,
                "GitHub rate limit"
            ),
            Err(err) => warn!(error = %err, "could not read the rate limit"),
        }
    }

    #[instrument(skip(self))]
    pub async fn get_commit_combined_statuses(
        &self,
        commit: &CommitRef,
    ) -> Result<CombinedStatus, ApiError> {
        let host = self.host.as_ref();
        let sha = commit.sha()?;
        with_retry(&self.retry, "combined_status", ApiError::is_transient, move || {
            host.combined_status(sha)
        })
        .await
        .map_err(|err| err.or_invalid_reference(ReferenceKind::Commit, sha))
    }

    /// Statuses and check suites/runs of a commit, merged by name.
    #[instrument(skip(self))]
    pub async fn get_validation_results(&self, commit: &CommitRef) -> Result<CheckResults, ApiError> {
        let status = self.get_commit_combined_statuses(commit).await?;
        let host = self.host.as_ref();
        let sha = commit.sha()?;
        let check_data = with_retry(&self.retry, "check_data", ApiError::is_transient, move || {
            host.check_data(sha)
        })
        .await
        .map_err(|err| err.or_invalid_reference(ReferenceKind::Commit, sha))?;
        Ok(checks::normalize(&status, &check_data))
    }

    /// Apply the context policy. Without `all_checks`, only the contexts the
    /// protected branch requires are considered.
    pub async fn filter_validation_results(&self, results: CheckResults) -> Result<Verdict, ApiError> {
        let required = if self.all_checks {
            None
        } else {
            Some(self.required_contexts().await?)
        };
        Ok(self.policy.evaluate(results, required.as_ref()))
    }

    async fn required_contexts(&self) -> Result<BTreeSet<String>, ApiError> {
        let host = self.host.as_ref();
        let branch = self.protected_branch.as_str();
        let contexts = with_retry(&self.retry, "required_contexts", ApiError::is_transient, move || {
            host.required_contexts(branch)
        })
        .await;
        match contexts {
            Ok(contexts) => Ok(contexts.into_iter().collect()),
            Err(err) if err.is_not_found() => {
                warn!(branch, "branch has no protection rules, so no checks are required");
                Ok(BTreeSet::new())
            }
            Err(err) => Err(err),
        }
    }

    /// Poll a commit once and decide whether its checks let the pipeline
    /// proceed.
    #[instrument(skip(self))]
    pub async fn check_combined_status_commit(&self, commit: &CommitRef) -> Result<Verdict, ApiError> {
        self.log_rate_limit().await;
        let results = self.get_validation_results(commit).await?;
        let verdict = self.filter_validation_results(results).await?;
        info!(passed = verdict.passed(), outcome = %verdict.outcome, "combined status");
        Ok(verdict)
    }

    /// Same as [`Self::check_combined_status_commit`] for the PR's head commit.
    #[instrument(skip(self))]
    pub async fn check_combined_status_pull_request(&self, number: u64) -> Result<Verdict, ApiError> {
        let pull = self.get_pull_request(number).await?;
        debug!(head = %pull.head.sha, "resolved pull request head");
        self.check_combined_status_commit(&CommitRef::Raw(pull.head.sha))
            .await
    }

    pub async fn get_pull_request(&self, number: u64) -> Result<PullRequest, ApiError> {
        let host = self.host.as_ref();
        with_retry(&self.retry, "get_pull", ApiError::is_transient, move || {
            host.get_pull(number)
        })
        .await
        .map_err(|err| err.or_invalid_reference(ReferenceKind::PullRequest, number.to_string()))
    }

    /// Pull requests that introduced the commits between `base` and `head`.
    pub async fn get_pr_range(&self, base: &str, head: &str) -> Result<Vec<IssueRef>, ApiError> {
        PrResolver::new(self.host.as_ref(), &self.retry)
            .resolve(base, head)
            .await
    }

    pub async fn message_pull_request(
        &self,
        number: u64,
        body: &str,
        uniqueness_key: Option<&str>,
        force: bool,
    ) -> Result<CommentOutcome, ApiError> {
        PrCommenter::new(self.host.as_ref(), &self.retry)
            .message(number, body, uniqueness_key, force)
            .await
    }

    /// Post a typed pipeline notice, deduplicated on its rendered text.
    pub async fn message_pr_with_type(
        &self,
        number: u64,
        message_type: MessageType,
        extra_text: &str,
        force: bool,
        deploy_date: Option<NaiveDate>,
    ) -> Result<CommentOutcome, ApiError> {
        let body = message_type.render(extra_text, deploy_date, Local::now().date_naive());
        self.message_pull_request(number, &body, Some(&body), force)
            .await
    }

    /// Tag `sha` as `name`, tagged by the authenticated user.
    #[instrument(skip(self))]
    pub async fn create_tag(&self, sha: &str, name: &str) -> Result<TagOutcome, ApiError> {
        let user = self.user().await?;
        let email = user
            .email
            .clone()
            .unwrap_or_else(|| format!("{}@users.noreply.github.com", user.login));
        let tagger = Tagger {
            name: user.name.clone().unwrap_or_else(|| user.login.clone()),
            email,
            date: Utc::now().to_rfc3339(),
        };
        TagReconciler::new(self.host.as_ref(), &self.retry)
            .create(sha, name, Some(tagger))
            .await
    }

    #[instrument(skip(self))]
    pub async fn delete_branch(&self, branch: &str) -> Result<(), ApiError> {
        let host = self.host.as_ref();
        let ref_name = format!("heads/{branch}");
        let ref_name = ref_name.as_str();
        with_retry(&self.retry, "delete_git_ref", ApiError::is_transient, move || {
            host.delete_git_ref(ref_name)
        })
        .await?;
        info!(branch, "deleted branch");
        Ok(())
    }

    /// Commits reachable from the head of `branch`, newest first.
    #[instrument(skip(self))]
    pub async fn get_commits_by_branch(&self, branch: &str) -> Result<Vec<CommitRef>, ApiError> {
        let host = self.host.as_ref();
        let head = with_retry(&self.retry, "branch_head", ApiError::is_transient, move || {
            host.branch_head(branch)
        })
        .await
        .map_err(|err| err.or_invalid_reference(ReferenceKind::Branch, branch))?;
        let head = head.as_str();
        with_retry(&self.retry, "list_commits", ApiError::is_transient, move || {
            host.list_commits(head)
        })
        .await
    }

    #[instrument(skip(self, body))]
    pub async fn create_pull_request(
        &self,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> Result<PullRequest, ApiError> {
        let host = self.host.as_ref();
        let pull = NewPullRequest {
            head: head.to_string(),
            base: base.to_string(),
            title: title.to_string(),
            body: body.to_string(),
        };
        let pull = &pull;
        let created = with_retry(&self.retry, "create_pull", ApiError::is_transient, move || {
            host.create_pull(pull)
        })
        .await?;
        info!(number = created.number, "created pull request");
        Ok(created)
    }

    /// Web URL comparing `base...head`.
    pub fn get_diff_url(org: &str, repo: &str, base: &str, head: &str) -> Result<String, ApiError> {
        let url = format!("https://github.com/{org}/{repo}/compare/{base}...{head}");
        let parsed =
            reqwest::Url::parse(&url).map_err(|_| ApiError::InvalidUrl(url.clone()))?;

        // The parser percent-encodes what it cannot use verbatim; any change
        // means one of the parts was not URL-safe.
        if parsed.as_str() != url {
            return Err(ApiError::InvalidUrl(url));
        }
        Ok(url)
    }
}
