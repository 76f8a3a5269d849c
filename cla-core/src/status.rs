//! Commit statuses and the identifiers they are written against.

use std::fmt;

use serde::{Deserialize, Serialize};

/// State of the agreement check on one commit.
///
/// `Pending` is written first; the other three are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitState {
    Pending,
    Success,
    Failure,
    Error,
}

impl CommitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitState::Pending => "pending",
            CommitState::Success => "success",
            CommitState::Failure => "failure",
            CommitState::Error => "error",
        }
    }

    /// Text shown to the contributor next to the status.
    pub fn description(&self) -> &'static str {
        match self {
            CommitState::Pending => "Checking for CLA signature.",
            CommitState::Success => "Thanks for signing the CLA!",
            CommitState::Error => {
                "An error occured while checking for CLA signature - we are looking into it."
            }
            CommitState::Failure => "Please sign the CLA to continue.",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, CommitState::Pending)
    }
}

impl fmt::Display for CommitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The commit a status is written to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatusTarget {
    pub owner: String,
    pub repo: String,
    pub sha: String,
}

impl fmt::Display for StatusTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.sha)
    }
}

/// Everything needed to evaluate one pull request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PullRequestRef {
    /// Owner of the base repository.
    pub owner: String,
    /// Name of the base repository.
    pub repo: String,
    /// Head commit.
    pub sha: String,
    /// Login of the pull request author.
    pub author: String,
}

impl PullRequestRef {
    pub fn target(&self) -> StatusTarget {
        StatusTarget {
            owner: self.owner.clone(),
            repo: self.repo.clone(),
            sha: self.sha.clone(),
        }
    }
}

/// Subset of GitHub's pull request object we read.
///
/// Appears both in `pull_request` webhook payloads and in
/// `GET /repos/{owner}/{repo}/pulls/{number}` responses.
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub user: Account,
    pub head: Head,
    pub base: Base,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Head {
    pub sha: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Base {
    pub repo: BaseRepository,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BaseRepository {
    pub name: String,
    pub owner: Account,
}

impl From<&PullRequest> for PullRequestRef {
    fn from(pr: &PullRequest) -> Self {
        PullRequestRef {
            owner: pr.base.repo.owner.login.clone(),
            repo: pr.base.repo.name.clone(),
            sha: pr.head.sha.clone(),
            author: pr.user.login.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_states_serialize_lowercase() {
        assert_eq!(
            serde_json::to_value(CommitState::Failure).unwrap(),
            json!("failure")
        );
        assert_eq!(CommitState::Pending.to_string(), "pending");
    }

    #[test]
    fn test_only_pending_is_not_terminal() {
        assert!(!CommitState::Pending.is_terminal());
        assert!(CommitState::Success.is_terminal());
        assert!(CommitState::Failure.is_terminal());
        assert!(CommitState::Error.is_terminal());
    }

    #[test]
    fn test_pull_request_ref_from_api_object() {
        let pr: PullRequest = serde_json::from_value(json!({
            "number": 7,
            "user": {"login": "bob", "id": 1},
            "head": {"sha": "abc", "ref": "feature"},
            "base": {"ref": "main", "repo": {"name": "x", "full_name": "acme/x", "owner": {"login": "acme"}}}
        }))
        .unwrap();

        let pr_ref = PullRequestRef::from(&pr);
        assert_eq!(
            pr_ref,
            PullRequestRef {
                owner: "acme".to_string(),
                repo: "x".to_string(),
                sha: "abc".to_string(),
                author: "bob".to_string(),
            }
        );
        assert_eq!(pr_ref.target().to_string(), "acme/x#abc");
    }
}
