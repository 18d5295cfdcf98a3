use tracing::{debug, info, instrument};

use crate::host::{ApiError, Comment, HostApi, ReferenceKind};
use crate::retry::{with_retry, RetryConfig};

/// Result of a comment request. `AlreadyPosted` means nothing was sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentOutcome {
    Posted(Comment),
    AlreadyPosted,
}

/// Posts PR comments at most once per distinct body unless forced.
pub struct PrCommenter<'a> {
    host: &'a dyn HostApi,
    retry: &'a RetryConfig,
}

impl<'a> PrCommenter<'a> {
    pub fn new(host: &'a dyn HostApi, retry: &'a RetryConfig) -> Self {
        Self { host, retry }
    }

    /// Comment `body` on PR `number`.
    ///
    /// Unless `force` is set, existing comments are scanned for one whose body
    /// equals `uniqueness_key` (or `body` when no key is given) and nothing is
    /// posted if one is found. Only exact matches are suppressed.
    #[instrument(skip(self, body, uniqueness_key))]
    pub async fn message(
        &self,
        number: u64,
        body: &str,
        uniqueness_key: Option<&str>,
        force: bool,
    ) -> Result<CommentOutcome, ApiError> {
        let host = self.host;
        with_retry(self.retry, "get_pull", ApiError::is_transient, move || {
            host.get_pull(number)
        })
        .await
        .map_err(|err| err.or_invalid_reference(ReferenceKind::PullRequest, number.to_string()))?;

        if !force {
            let key = uniqueness_key.unwrap_or(body);
            let comments = with_retry(self.retry, "issue_comments", ApiError::is_transient, move || {
                host.issue_comments(number)
            })
            .await?;
            debug!(existing = comments.len(), "scanned existing comments");
            if comments.iter().any(|comment| comment.body == key) {
                info!(pr = number, "identical comment already posted, skipping");
                return Ok(CommentOutcome::AlreadyPosted);
            }
        }

        let comment = with_retry(
            self.retry,
            "create_issue_comment",
            ApiError::is_transient,
            move || host.create_issue_comment(number, body),
        )
        .await?;
        info!(pr = number, comment = comment.id, "posted comment");
        Ok(CommentOutcome::Posted(comment))
    }
}
