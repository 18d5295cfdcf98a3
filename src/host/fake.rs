//! In-memory [`HostApi`] for tests. Records every mutating call and every
//! search query, and can be told to fail the next call of an operation.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use super::types::{
    AnnotatedTag, CombinedStatus, Comment, CommitRef, GitObject, GitRef, IssueRef, NewPullRequest,
    NewTag, PullHead, PullRequest, RateLimit, Repository, User,
};
use super::{ApiError, HostApi};

type SearchFn = Box<dyn Fn(&str) -> Vec<IssueRef> + Send + Sync>;

#[derive(Default)]
struct State {
    statuses: HashMap<String, CombinedStatus>,
    checks: HashMap<String, serde_json::Value>,
    compare: Vec<CommitRef>,
    branches: HashMap<String, String>,
    commits: HashMap<String, Vec<CommitRef>>,
    required_contexts: Option<Vec<String>>,
    pulls: HashMap<u64, PullRequest>,
    comments: HashMap<u64, Vec<Comment>>,
    tags: HashMap<String, AnnotatedTag>,
    refs: HashMap<String, GitRef>,
    failures: HashMap<&'static str, VecDeque<ApiError>>,

    compared: Vec<(String, String)>,
    status_requests: Vec<String>,
    search_queries: Vec<String>,
    posted_comments: Vec<(u64, String)>,
    created_tags: Vec<NewTag>,
    deleted_refs: Vec<String>,
    created_pulls: Vec<NewPullRequest>,
    next_id: u64,
}

pub struct FakeHost {
    repository: Repository,
    search: Option<SearchFn>,
    state: Mutex<State>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            repository: Repository::new("test-org", "test-repo"),
            search: None,
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn with_status(self, sha: &str, status: CombinedStatus) -> Self {
        self.state().statuses.insert(sha.to_string(), status);
        self
    }

    pub fn with_checks(self, sha: &str, checks: serde_json::Value) -> Self {
        self.state().checks.insert(sha.to_string(), checks);
        self
    }

    pub fn with_compare(self, commits: Vec<CommitRef>) -> Self {
        self.state().compare = commits;
        self
    }

    pub fn with_search(mut self, search: impl Fn(&str) -> Vec<IssueRef> + Send + Sync + 'static) -> Self {
        self.search = Some(Box::new(search));
        self
    }

    pub fn with_branch(self, branch: &str, head: &str, commits: Vec<CommitRef>) -> Self {
        {
            let mut state = self.state();
            state.branches.insert(branch.to_string(), head.to_string());
            state.commits.insert(head.to_string(), commits);
        }
        self
    }

    pub fn with_required_contexts(self, contexts: &[&str]) -> Self {
        self.state().required_contexts = Some(contexts.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn with_pull(self, number: u64, head_sha: &str) -> Self {
        self.state().pulls.insert(number, pull(number, head_sha));
        self
    }

    pub fn with_comments(self, number: u64, bodies: &[&str]) -> Self {
        {
            let mut state = self.state();
            let mut comments = Vec::new();
            for body in bodies {
                state.next_id += 1;
                comments.push(Comment {
                    id: state.next_id,
                    body: body.to_string(),
                });
            }
            state.comments.insert(number, comments);
        }
        self
    }

    /// Existing ref `refs/<name>` pointing straight at `sha`.
    pub fn with_ref(self, name: &str, sha: &str, kind: &str) -> Self {
        let full = format!("refs/{name}");
        self.state().refs.insert(
            full.clone(),
            GitRef {
                name: full,
                object: GitObject {
                    sha: sha.to_string(),
                    kind: kind.to_string(),
                },
            },
        );
        self
    }

    /// Make the next call of `operation` fail with `err`. Queued failures
    /// are consumed in order.
    pub fn fail_next(&self, operation: &'static str, err: ApiError) {
        self.state().failures.entry(operation).or_default().push_back(err);
    }

    pub fn search_queries(&self) -> Vec<String> {
        self.state().search_queries.clone()
    }

    pub fn compared(&self) -> Vec<(String, String)> {
        self.state().compared.clone()
    }

    pub fn status_requests(&self) -> Vec<String> {
        self.state().status_requests.clone()
    }

    pub fn posted_comments(&self) -> Vec<(u64, String)> {
        self.state().posted_comments.clone()
    }

    pub fn created_tags(&self) -> Vec<NewTag> {
        self.state().created_tags.clone()
    }

    pub fn git_ref(&self, full_name: &str) -> Option<GitRef> {
        self.state().refs.get(full_name).cloned()
    }

    pub fn deleted_refs(&self) -> Vec<String> {
        self.state().deleted_refs.clone()
    }

    pub fn created_pulls(&self) -> Vec<NewPullRequest> {
        self.state().created_pulls.clone()
    }

    fn check(&self, operation: &'static str) -> Result<(), ApiError> {
        match self.state().failures.get_mut(operation).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn pull(number: u64, head_sha: &str) -> PullRequest {
    PullRequest {
        number,
        title: format!("PR {number}"),
        html_url: Some(format!("https://github.com/test-org/test-repo/pull/{number}")),
        head: PullHead {
            sha: head_sha.to_string(),
            branch: format!("feature-{number}"),
        },
    }
}

fn not_found() -> ApiError {
    ApiError::from_status(404, "Not Found".to_string())
}

#[async_trait]
impl HostApi for FakeHost {
    fn repository(&self) -> &Repository {
        &self.repository
    }

    async fn combined_status(&self, sha: &str) -> Result<CombinedStatus, ApiError> {
        self.state().status_requests.push(sha.to_string());
        self.check("combined_status")?;
        Ok(self.state().statuses.get(sha).cloned().unwrap_or_default())
    }

    async fn check_data(&self, sha: &str) -> Result<serde_json::Value, ApiError> {
        self.check("check_data")?;
        Ok(self
            .state()
            .checks
            .get(sha)
            .cloned()
            .unwrap_or_else(|| serde_json::json!({"check_suites": [], "check_runs": []})))
    }

    async fn compare(&self, base: &str, head: &str) -> Result<Vec<CommitRef>, ApiError> {
        self.state().compared.push((base.to_string(), head.to_string()));
        self.check("compare")?;
        Ok(self.state().compare.clone())
    }

    async fn search_issues(&self, query: &str) -> Result<Vec<IssueRef>, ApiError> {
        self.state().search_queries.push(query.to_string());
        self.check("search_issues")?;
        Ok(self.search.as_ref().map(|search| search(query)).unwrap_or_default())
    }

    async fn branch_head(&self, branch: &str) -> Result<String, ApiError> {
        self.check("branch_head")?;
        self.state().branches.get(branch).cloned().ok_or_else(not_found)
    }

    async fn list_commits(&self, sha: &str) -> Result<Vec<CommitRef>, ApiError> {
        self.check("list_commits")?;
        Ok(self.state().commits.get(sha).cloned().unwrap_or_default())
    }

    async fn required_contexts(&self, _branch: &str) -> Result<Vec<String>, ApiError> {
        self.check("required_contexts")?;
        self.state().required_contexts.clone().ok_or_else(not_found)
    }

    async fn get_pull(&self, number: u64) -> Result<PullRequest, ApiError> {
        self.check("get_pull")?;
        self.state().pulls.get(&number).cloned().ok_or_else(not_found)
    }

    async fn create_pull(&self, new: &NewPullRequest) -> Result<PullRequest, ApiError> {
        self.check("create_pull")?;
        let mut state = self.state();
        state.created_pulls.push(new.clone());
        state.next_id += 1;
        let created = pull(state.next_id, "");
        state.pulls.insert(created.number, created.clone());
        Ok(created)
    }

    async fn issue_comments(&self, number: u64) -> Result<Vec<Comment>, ApiError> {
        self.check("issue_comments")?;
        Ok(self.state().comments.get(&number).cloned().unwrap_or_default())
    }

    async fn create_issue_comment(&self, number: u64, body: &str) -> Result<Comment, ApiError> {
        self.check("create_issue_comment")?;
        let mut state = self.state();
        state.next_id += 1;
        let comment = Comment {
            id: state.next_id,
            body: body.to_string(),
        };
        state.posted_comments.push((number, body.to_string()));
        state.comments.entry(number).or_default().push(comment.clone());
        Ok(comment)
    }

    async fn create_git_tag(&self, tag: &NewTag) -> Result<AnnotatedTag, ApiError> {
        self.check("create_git_tag")?;
        let mut state = self.state();
        state.next_id += 1;
        let created = AnnotatedTag {
            sha: format!("tagobject{}", state.next_id),
            tag: tag.tag.clone(),
            object: GitObject {
                sha: tag.object.clone(),
                kind: tag.kind.clone(),
            },
        };
        state.created_tags.push(tag.clone());
        state.tags.insert(created.sha.clone(), created.clone());
        Ok(created)
    }

    async fn get_git_tag(&self, sha: &str) -> Result<AnnotatedTag, ApiError> {
        self.check("get_git_tag")?;
        self.state().tags.get(sha).cloned().ok_or_else(not_found)
    }

    async fn create_git_ref(&self, name: &str, sha: &str) -> Result<GitRef, ApiError> {
        self.check("create_git_ref")?;
        let mut state = self.state();
        if state.refs.contains_key(name) {
            return Err(ApiError::from_status(
                422,
                "Reference already exists".to_string(),
            ));
        }
        let kind = if state.tags.contains_key(sha) { "tag" } else { "commit" };
        let created = GitRef {
            name: name.to_string(),
            object: GitObject {
                sha: sha.to_string(),
                kind: kind.to_string(),
            },
        };
        state.refs.insert(name.to_string(), created.clone());
        Ok(created)
    }

    async fn get_git_ref(&self, name: &str) -> Result<GitRef, ApiError> {
        self.check("get_git_ref")?;
        self.state()
            .refs
            .get(&format!("refs/{name}"))
            .cloned()
            .ok_or_else(not_found)
    }

    async fn delete_git_ref(&self, name: &str) -> Result<(), ApiError> {
        self.check("delete_git_ref")?;
        let mut state = self.state();
        let full = format!("refs/{name}");
        if state.refs.remove(&full).is_none() {
            return Err(ApiError::from_status(422, "Reference does not exist".to_string()));
        }
        state.deleted_refs.push(name.to_string());
        Ok(())
    }

    async fn current_user(&self) -> Result<User, ApiError> {
        self.check("current_user")?;
        Ok(User {
            login: "release-bot".to_string(),
            name: Some("Release Bot".to_string()),
            email: None,
        })
    }

    async fn rate_limit(&self) -> Result<RateLimit, ApiError> {
        self.check("rate_limit")?;
        Ok(RateLimit {
            limit: 5000,
            remaining: 4321,
            reset: 1_700_000_000,
        })
    }
}
