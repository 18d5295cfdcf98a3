use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, instrument};

use super::types::{
    AnnotatedTag, CombinedStatus, Comment, CommitRef, GitRef, IssueRef, NewPullRequest, NewTag,
    PullRequest, RateLimit, Repository, StatusEntry, User,
};
use super::{ApiError, HostApi};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const USER_AGENT: &str = "shipgate";
const PAGE_SIZE: usize = 100;

/// [`HostApi`] over the GitHub REST API.
///
/// Holds one pooled reqwest client. Not meant to be shared between pipeline
/// steps running in parallel; build one per step instead.
pub struct RestHost {
    client: Client,
    base_url: String,
    token: String,
    repository: Repository,
}

impl RestHost {
    pub fn new(
        base_url: &str,
        token: String,
        repository: Repository,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        if token.trim().is_empty() {
            return Err(ApiError::MissingToken);
        }
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            repository,
        })
    }

    fn repo_path(&self, rest: &str) -> String {
        format!(
            "/repos/{}/{}{}",
            self.repository.owner, self.repository.name, rest
        )
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("Accept", "application/vnd.github+json")
            .bearer_auth(&self.token)
    }

    /// Send a request and turn non-2xx responses into classified errors,
    /// carrying the host's `message` field when present.
    async fn send(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        #[derive(Deserialize)]
        struct ErrorBody {
            message: String,
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.message)
            .unwrap_or(text);
        debug!(status = status.as_u16(), %message, "GitHub returned an error response");
        Err(ApiError::from_status(status.as_u16(), message))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.send(self.request(Method::GET, path)).await?;
        Ok(response.json::<T>().await?)
    }

    async fn send_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self.send(self.request(method, path).json(body)).await?;
        Ok(response.json::<T>().await?)
    }

    /// Collect the `field` array from every page of a list endpoint.
    ///
    /// Paging stops once `total_field` items have been read, or on a short
    /// page when the host reports no total. Also returns the first page with
    /// `field` removed, for the endpoint's other top-level fields.
    async fn get_all_pages(
        &self,
        path: &str,
        field: &str,
        total_field: &str,
    ) -> Result<(Vec<serde_json::Value>, serde_json::Value), ApiError> {
        let separator = if path.contains('?') { '&' } else { '?' };
        let mut items = Vec::new();
        let mut first = None;
        let mut page = 1;
        loop {
            let mut body: serde_json::Value = self
                .get_json(&format!("{path}{separator}per_page={PAGE_SIZE}&page={page}"))
                .await?;
            let batch = match take_field(&mut body, field) {
                serde_json::Value::Array(batch) => batch,
                _ => Vec::new(),
            };
            let total = body
                .get(total_field)
                .and_then(serde_json::Value::as_u64)
                .map(|total| total as usize);
            let received = batch.len();
            items.extend(batch);
            first.get_or_insert(body);

            let done = match total {
                Some(total) => items.len() >= total,
                None => received < PAGE_SIZE,
            };
            if received == 0 || done {
                break;
            }
            page += 1;
        }
        debug!(field, items = items.len(), pages = page, "read all pages");
        Ok((items, first.unwrap_or(serde_json::Value::Null)))
    }
}

fn take_field(value: &mut serde_json::Value, key: &str) -> serde_json::Value {
    value
        .get_mut(key)
        .map(serde_json::Value::take)
        .unwrap_or(serde_json::Value::Null)
}

#[async_trait]
impl HostApi for RestHost {
    fn repository(&self) -> &Repository {
        &self.repository
    }

    #[instrument(skip(self))]
    async fn combined_status(&self, sha: &str) -> Result<CombinedStatus, ApiError> {
        let (statuses, first) = self
            .get_all_pages(
                &self.repo_path(&format!("/commits/{sha}/status")),
                "statuses",
                "total_count",
            )
            .await?;
        Ok(CombinedStatus {
            state: first
                .get("state")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string),
            statuses: serde_json::from_value::<Vec<StatusEntry>>(serde_json::Value::Array(statuses))?,
        })
    }

    #[instrument(skip(self))]
    async fn check_data(&self, sha: &str) -> Result<serde_json::Value, ApiError> {
        let (suites, _) = self
            .get_all_pages(
                &self.repo_path(&format!("/commits/{sha}/check-suites")),
                "check_suites",
                "total_count",
            )
            .await?;
        let (runs, _) = self
            .get_all_pages(
                &self.repo_path(&format!("/commits/{sha}/check-runs")),
                "check_runs",
                "total_count",
            )
            .await?;
        Ok(json!({
            "check_suites": suites,
            "check_runs": runs,
        }))
    }

    #[instrument(skip(self))]
    async fn compare(&self, base: &str, head: &str) -> Result<Vec<CommitRef>, ApiError> {
        let (commits, _) = self
            .get_all_pages(
                &self.repo_path(&format!("/compare/{base}...{head}")),
                "commits",
                "total_commits",
            )
            .await?;
        debug!(commits = commits.len(), "received comparison");
        commits.iter().map(CommitRef::try_from).collect()
    }

    #[instrument(skip(self))]
    async fn search_issues(&self, query: &str) -> Result<Vec<IssueRef>, ApiError> {
        #[derive(Deserialize)]
        struct SearchResponse {
            #[serde(default)]
            items: Vec<IssueRef>,
        }

        let per_page = PAGE_SIZE.to_string();
        let response = self
            .send(
                self.request(Method::GET, "/search/issues")
                    .query(&[("q", query), ("per_page", per_page.as_str())]),
            )
            .await?;
        let results = response.json::<SearchResponse>().await?;
        Ok(results.items)
    }

    #[instrument(skip(self))]
    async fn branch_head(&self, branch: &str) -> Result<String, ApiError> {
        #[derive(Deserialize)]
        struct Branch {
            commit: super::types::CommitHandle,
        }

        let branch: Branch = self
            .get_json(&self.repo_path(&format!("/branches/{branch}")))
            .await?;
        Ok(branch.commit.sha)
    }

    #[instrument(skip(self))]
    async fn list_commits(&self, sha: &str) -> Result<Vec<CommitRef>, ApiError> {
        let commits: Vec<serde_json::Value> = self
            .get_json(&self.repo_path(&format!("/commits?sha={sha}&per_page={PAGE_SIZE}")))
            .await?;
        commits.iter().map(CommitRef::try_from).collect()
    }

    #[instrument(skip(self))]
    async fn required_contexts(&self, branch: &str) -> Result<Vec<String>, ApiError> {
        #[derive(Deserialize)]
        struct RequiredChecks {
            #[serde(default)]
            contexts: Vec<String>,
        }

        let checks: RequiredChecks = self
            .get_json(&self.repo_path(&format!(
                "/branches/{branch}/protection/required_status_checks"
            )))
            .await?;
        Ok(checks.contexts)
    }

    #[instrument(skip(self))]
    async fn get_pull(&self, number: u64) -> Result<PullRequest, ApiError> {
        self.get_json(&self.repo_path(&format!("/pulls/{number}")))
            .await
    }

    #[instrument(skip(self, pull), fields(head = %pull.head, base = %pull.base))]
    async fn create_pull(&self, pull: &NewPullRequest) -> Result<PullRequest, ApiError> {
        self.send_json(Method::POST, &self.repo_path("/pulls"), pull)
            .await
    }

    #[instrument(skip(self))]
    async fn issue_comments(&self, number: u64) -> Result<Vec<Comment>, ApiError> {
        let mut comments = Vec::new();
        let mut page = 1;
        loop {
            let batch: Vec<Comment> = self
                .get_json(&self.repo_path(&format!(
                    "/issues/{number}/comments?per_page={PAGE_SIZE}&page={page}"
                )))
                .await?;
            let done = batch.len() < PAGE_SIZE;
            comments.extend(batch);
            if done {
                break;
            }
            page += 1;
        }
        debug!(comments = comments.len(), "listed issue comments");
        Ok(comments)
    }

    #[instrument(skip(self, body))]
    async fn create_issue_comment(&self, number: u64, body: &str) -> Result<Comment, ApiError> {
        self.send_json(
            Method::POST,
            &self.repo_path(&format!("/issues/{number}/comments")),
            &json!({ "body": body }),
        )
        .await
    }

    #[instrument(skip(self, tag), fields(tag = %tag.tag, object = %tag.object))]
    async fn create_git_tag(&self, tag: &NewTag) -> Result<AnnotatedTag, ApiError> {
        self.send_json(Method::POST, &self.repo_path("/git/tags"), tag)
            .await
    }

    #[instrument(skip(self))]
    async fn get_git_tag(&self, sha: &str) -> Result<AnnotatedTag, ApiError> {
        self.get_json(&self.repo_path(&format!("/git/tags/{sha}")))
            .await
    }

    #[instrument(skip(self))]
    async fn create_git_ref(&self, name: &str, sha: &str) -> Result<GitRef, ApiError> {
        self.send_json(
            Method::POST,
            &self.repo_path("/git/refs"),
            &json!({ "ref": name, "sha": sha }),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn get_git_ref(&self, name: &str) -> Result<GitRef, ApiError> {
        self.get_json(&self.repo_path(&format!("/git/ref/{name}")))
            .await
    }

    #[instrument(skip(self))]
    async fn delete_git_ref(&self, name: &str) -> Result<(), ApiError> {
        self.send(self.request(Method::DELETE, &self.repo_path(&format!("/git/refs/{name}"))))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn current_user(&self) -> Result<User, ApiError> {
        self.get_json("/user").await
    }

    #[instrument(skip(self))]
    async fn rate_limit(&self) -> Result<RateLimit, ApiError> {
        #[derive(Deserialize)]
        struct RateLimitResponse {
            rate: RateLimit,
        }

        let response: RateLimitResponse = self.get_json("/rate_limit").await?;
        Ok(response.rate)
    }
}
