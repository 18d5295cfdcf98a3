use tracing::{info, instrument, warn};

use crate::host::{ApiError, GitRef, HostApi, NewTag, ReferenceKind, Tagger};
use crate::retry::{with_retry, RetryConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagOutcome {
    Created(GitRef),
    /// The tag already pointed at the requested commit.
    AlreadyPresent,
}

/// Creates annotated tags so that re-running a pipeline step is safe.
pub struct TagReconciler<'a> {
    host: &'a dyn HostApi,
    retry: &'a RetryConfig,
}

impl<'a> TagReconciler<'a> {
    pub fn new(host: &'a dyn HostApi, retry: &'a RetryConfig) -> Self {
        Self { host, retry }
    }

    /// Create tag `name` on commit `sha`: an annotated tag object first, then
    /// `refs/tags/<name>` pointing at it.
    ///
    /// If the ref already exists and resolves to `sha`, this is a success.
    /// If it resolves elsewhere, [`ApiError::TagMismatch`] is returned. Any
    /// other failure is returned unchanged.
    #[instrument(skip(self, tagger))]
    pub async fn create(
        &self,
        sha: &str,
        name: &str,
        tagger: Option<Tagger>,
    ) -> Result<TagOutcome, ApiError> {
        let host = self.host;
        let new_tag = NewTag::for_commit(name, sha, tagger);
        let new_tag = &new_tag;
        let tag = with_retry(self.retry, "create_git_tag", ApiError::is_transient, move || {
            host.create_git_tag(new_tag)
        })
        .await?;

        let ref_name = format!("refs/tags/{name}");
        let ref_name = ref_name.as_str();
        let tag_sha = tag.sha.as_str();
        let created = with_retry(self.retry, "create_git_ref", ApiError::is_transient, move || {
            host.create_git_ref(ref_name, tag_sha)
        })
        .await;

        match created {
            Ok(git_ref) => {
                info!(tag = name, sha, "created tag");
                Ok(TagOutcome::Created(git_ref))
            }
            Err(err) if err.is_already_exists() => self.reconcile(sha, name).await,
            Err(err) => Err(err),
        }
    }

    async fn reconcile(&self, sha: &str, name: &str) -> Result<TagOutcome, ApiError> {
        let host = self.host;
        let short_ref = format!("tags/{name}");
        let short_ref = short_ref.as_str();
        let existing = with_retry(self.retry, "get_git_ref", ApiError::is_transient, move || {
            host.get_git_ref(short_ref)
        })
        .await
        .map_err(|err| err.or_invalid_reference(ReferenceKind::GitRef, short_ref))?;

        let actual = self.resolve_target(&existing).await?;
        if actual == sha {
            info!(tag = name, sha, "tag already exists at the requested commit");
            Ok(TagOutcome::AlreadyPresent)
        } else {
            warn!(tag = name, expected = sha, %actual, "tag already exists elsewhere");
            Err(ApiError::TagMismatch {
                tag: name.to_string(),
                expected: sha.to_string(),
                actual,
            })
        }
    }

    /// Commit a ref points at, peeling one level of annotated tag.
    async fn resolve_target(&self, git_ref: &GitRef) -> Result<String, ApiError> {
        if git_ref.object.kind != "tag" {
            return Ok(git_ref.object.sha.clone());
        }
        let host = self.host;
        let tag_sha = git_ref.object.sha.as_str();
        let tag = with_retry(self.retry, "get_git_tag", ApiError::is_transient, move || {
            host.get_git_tag(tag_sha)
        })
        .await?;
        Ok(tag.object.sha)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::fake::FakeHost;

    #[tokio::test]
    async fn test_create_tag_points_ref_at_tag_object() {
        let host = FakeHost::new();
        let retry = RetryConfig::immediate(1);

        let outcome = TagReconciler::new(&host, &retry)
            .create("abc", "test_tag", None)
            .await
            .unwrap();

        let created = host.created_tags();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].tag, "test_tag");
        assert_eq!(created[0].message, "");
        assert_eq!(created[0].kind, "commit");
        assert_eq!(created[0].object, "abc");

        let git_ref = host.git_ref("refs/tags/test_tag").unwrap();
        assert_eq!(git_ref.object.kind, "tag");
        assert_eq!(outcome, TagOutcome::Created(git_ref));
    }

    #[tokio::test]
    async fn test_create_tag_twice_is_idempotent() {
        let host = FakeHost::new();
        let retry = RetryConfig::immediate(1);
        let tags = TagReconciler::new(&host, &retry);

        assert!(matches!(
            tags.create("abc", "t", None).await.unwrap(),
            TagOutcome::Created(_)
        ));
        assert_eq!(tags.create("abc", "t", None).await.unwrap(), TagOutcome::AlreadyPresent);
    }

    #[tokio::test]
    async fn test_create_tag_with_different_sha_conflicts() {
        let host = FakeHost::new();
        let retry = RetryConfig::immediate(1);
        let tags = TagReconciler::new(&host, &retry);

        tags.create("abc", "t", None).await.unwrap();
        let err = tags.create("def", "t", None).await.unwrap_err();

        match err {
            ApiError::TagMismatch { tag, expected, actual } => {
                assert_eq!(tag, "t");
                assert_eq!(expected, "def");
                assert_eq!(actual, "abc");
            }
            other => panic!("expected TagMismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_lightweight_ref_matching_sha_is_accepted() {
        let host = FakeHost::new().with_ref("tags/t", "abc", "commit");
        let retry = RetryConfig::immediate(1);

        let outcome = TagReconciler::new(&host, &retry)
            .create("abc", "t", None)
            .await
            .unwrap();

        assert_eq!(outcome, TagOutcome::AlreadyPresent);
    }

    #[tokio::test]
    async fn test_other_ref_errors_are_returned_unchanged() {
        let host = FakeHost::new();
        host.fail_next(
            "create_git_ref",
            ApiError::from_status(421, "Not sure what this is!".to_string()),
        );
        let retry = RetryConfig::immediate(3);

        let err = TagReconciler::new(&host, &retry)
            .create("abc", "t", None)
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Fatal { status: Some(421), .. }));
    }

    #[tokio::test]
    async fn test_transient_ref_failure_is_retried() {
        let host = FakeHost::new();
        host.fail_next(
            "create_git_ref",
            ApiError::from_status(500, "oops".to_string()),
        );
        let retry = RetryConfig::immediate(3);

        let outcome = TagReconciler::new(&host, &retry)
            .create("abc", "t", None)
            .await
            .unwrap();

        assert!(matches!(outcome, TagOutcome::Created(_)));
    }
}
