use std::collections::HashSet;
use tracing::{debug, info, instrument};

use super::batcher::{ShaBatcher, MAX_QUERY_LEN};
use crate::host::{ApiError, CommitRef, HostApi, IssueRef};
use crate::retry::{with_retry, RetryConfig};

/// Maps a commit range to the pull requests that introduced its commits.
pub struct PrResolver<'a> {
    host: &'a dyn HostApi,
    retry: &'a RetryConfig,
}

impl<'a> PrResolver<'a> {
    pub fn new(host: &'a dyn HostApi, retry: &'a RetryConfig) -> Self {
        Self { host, retry }
    }

    /// Pull requests for every commit between `base` and `head`, one search
    /// per batch, deduplicated by number in first-seen order.
    #[instrument(skip(self))]
    pub async fn resolve(&self, base: &str, head: &str) -> Result<Vec<IssueRef>, ApiError> {
        let host = self.host;
        let commits = with_retry(self.retry, "compare", ApiError::is_transient, move || {
            host.compare(base, head)
        })
        .await?;
        info!(commits = commits.len(), "resolved commit range");
        self.resolve_commits(&commits).await
    }

    pub async fn resolve_commits(&self, commits: &[CommitRef]) -> Result<Vec<IssueRef>, ApiError> {
        let qualifiers = format!("type:pr repo:{}", self.host.repository().slug());
        let batches = ShaBatcher::for_qualifiers(&qualifiers)?.batch(commits)?;

        let mut seen = HashSet::new();
        let mut pulls = Vec::new();
        for (index, batch) in batches.iter().enumerate() {
            let query = format!("{} {}", batch.join(" "), qualifiers);
            if query.len() > MAX_QUERY_LEN {
                return Err(ApiError::QueryTooLong {
                    len: query.len(),
                    max: MAX_QUERY_LEN,
                });
            }

            let host = self.host;
            let query_ref = query.as_str();
            let found = with_retry(self.retry, "search_issues", ApiError::is_transient, move || {
                host.search_issues(query_ref)
            })
            .await?;
            debug!(batch = index, shas = batch.len(), hits = found.len(), "searched batch");

            for pull in found {
                if seen.insert(pull.number) {
                    pulls.push(pull);
                }
            }
        }

        info!(searches = batches.len(), pulls = pulls.len(), "resolved pull requests");
        Ok(pulls)
    }
}
