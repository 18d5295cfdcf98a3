use serde::{Deserialize, Serialize};

use super::ApiError;

/// The repository a host client is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub owner: String,
    pub name: String,
}

impl Repository {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// `owner/name`, as used in search qualifiers and API paths.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// A commit handle as returned by the host (compare, commit listing).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommitHandle {
    pub sha: String,
}

/// Anything that identifies a commit: a bare hash string or a handle
/// carrying one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitRef {
    Raw(String),
    Handle(CommitHandle),
}

impl CommitRef {
    /// The hash this reference points at. Blank hashes cannot be resolved.
    pub fn sha(&self) -> Result<&str, ApiError> {
        let sha = match self {
            CommitRef::Raw(sha) => sha.as_str(),
            CommitRef::Handle(handle) => handle.sha.as_str(),
        };
        if sha.trim().is_empty() {
            return Err(ApiError::UnresolvableObject(format!("{self:?}")));
        }
        Ok(sha)
    }
}

impl From<&str> for CommitRef {
    fn from(sha: &str) -> Self {
        CommitRef::Raw(sha.to_string())
    }
}

impl From<String> for CommitRef {
    fn from(sha: String) -> Self {
        CommitRef::Raw(sha)
    }
}

impl From<CommitHandle> for CommitRef {
    fn from(handle: CommitHandle) -> Self {
        CommitRef::Handle(handle)
    }
}

impl TryFrom<&serde_json::Value> for CommitRef {
    type Error = ApiError;

    /// Accepts a JSON string or an object with a string `sha` field.
    fn try_from(value: &serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::String(sha) => Ok(CommitRef::Raw(sha.clone())),
            serde_json::Value::Object(map) => match map.get("sha") {
                Some(serde_json::Value::String(sha)) => Ok(CommitRef::Handle(CommitHandle {
                    sha: sha.clone(),
                })),
                _ => Err(ApiError::UnresolvableObject(value.to_string())),
            },
            other => Err(ApiError::UnresolvableObject(other.to_string())),
        }
    }
}

/// Combined status of a commit. Every field is optional so that partial
/// payloads still normalize.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CombinedStatus {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub statuses: Vec<StatusEntry>,
}

/// A single entry of the combined status.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusEntry {
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub target_url: Option<String>,
}

/// An issue search hit. Pull requests are issues on the host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IssueRef {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullHead {
    pub sha: String,
    #[serde(rename = "ref", default)]
    pub branch: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub html_url: Option<String>,
    pub head: PullHead,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewPullRequest {
    pub head: String,
    pub base: String,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Comment {
    pub id: u64,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tagger {
    pub name: String,
    pub email: String,
    /// ISO 8601 timestamp.
    pub date: String,
}

/// Payload for creating an annotated tag object.
#[derive(Debug, Clone, Serialize)]
pub struct NewTag {
    pub tag: String,
    pub message: String,
    pub object: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tagger: Option<Tagger>,
}

impl NewTag {
    /// An annotated tag on a commit with an empty message.
    pub fn for_commit(name: &str, sha: &str, tagger: Option<Tagger>) -> Self {
        Self {
            tag: name.to_string(),
            message: String::new(),
            object: sha.to_string(),
            kind: "commit".to_string(),
            tagger,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GitObject {
    pub sha: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GitRef {
    #[serde(rename = "ref")]
    pub name: String,
    pub object: GitObject,
}

/// A tag object; `object` is what the tag points at.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AnnotatedTag {
    pub sha: String,
    #[serde(default)]
    pub tag: String,
    pub object: GitObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub login: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RateLimit {
    pub limit: u64,
    pub remaining: u64,
    /// Epoch second at which the window resets.
    pub reset: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_commit_ref_from_string_and_handle() {
        assert_eq!(CommitRef::from("abc").sha().unwrap(), "abc");
        let handle = CommitRef::from(CommitHandle { sha: "123".to_string() });
        assert_eq!(handle.sha().unwrap(), "123");
    }

    #[test]
    fn test_commit_ref_rejects_blank_sha() {
        let err = CommitRef::from("  ").sha().unwrap_err();
        assert!(matches!(err, ApiError::UnresolvableObject(_)));
    }

    #[test]
    fn test_commit_ref_from_json() {
        assert_eq!(
            CommitRef::try_from(&json!({"sha": "deadbeef", "commit": {}})).unwrap(),
            CommitRef::Handle(CommitHandle { sha: "deadbeef".to_string() })
        );
        assert_eq!(
            CommitRef::try_from(&json!("cafe")).unwrap(),
            CommitRef::Raw("cafe".to_string())
        );
        assert!(matches!(
            CommitRef::try_from(&json!({"id": 4})),
            Err(ApiError::UnresolvableObject(_))
        ));
        assert!(matches!(
            CommitRef::try_from(&json!(17)),
            Err(ApiError::UnresolvableObject(_))
        ));
    }

    #[test]
    fn test_new_tag_serializes_type_field() {
        let tag = NewTag::for_commit("v1", "abc", None);
        let value = serde_json::to_value(&tag).unwrap();
        assert_eq!(value["type"], "commit");
        assert_eq!(value["message"], "");
        assert_eq!(value["object"], "abc");
        assert!(value.get("tagger").is_none());
    }

    #[test]
    fn test_repository_slug() {
        assert_eq!(Repository::new("org", "repo").slug(), "org/repo");
    }
}
