//! Agreement check for a single pull request.
//!
//! Each review writes `pending` to the head commit, then decides:
//!
//! 1. collaborators on the base repository pass without further checks;
//! 2. anyone else passes only if they have an open issue in the agreement
//!    repository whose title starts with the configured prefix.
//!
//! Lookup failures never escape a review. They are mapped to an `error`
//! status by [`settle`], and a failed status write is logged and dropped.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::cache::{cache_key, CoalescingCache};
use crate::client::{ApiClient, ApiRequest};
use crate::error::{ApiError, ApiResult};
use crate::settings::Settings;
use crate::status::{CommitState, PullRequestRef, StatusTarget};

/// Why a pull request was allowed or refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Author collaborates on the base repository.
    Member,
    /// Author has an open agreement issue.
    AgreementAccepted,
    AgreementMissing,
}

/// The single place where an evaluation outcome becomes a status.
pub fn settle(outcome: &ApiResult<Verdict>) -> CommitState {
    match outcome {
        Ok(Verdict::Member) | Ok(Verdict::AgreementAccepted) => CommitState::Success,
        Ok(Verdict::AgreementMissing) => CommitState::Failure,
        Err(_) => CommitState::Error,
    }
}

#[derive(Debug, Deserialize)]
struct IssueSummary {
    title: String,
}

pub struct Verifier {
    api: ApiClient,
    settings: Arc<Settings>,
    memberships: CoalescingCache<bool>,
    agreements: CoalescingCache<bool>,
}

impl Verifier {
    pub fn new(
        api: ApiClient,
        settings: Arc<Settings>,
        memberships: CoalescingCache<bool>,
        agreements: CoalescingCache<bool>,
    ) -> Self {
        Self {
            api,
            settings,
            memberships,
            agreements,
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run the check for one pull request and return the terminal state
    /// that was written.
    pub async fn review(&self, pr: &PullRequestRef) -> CommitState {
        self.review_correlated(pr, None).await
    }

    /// [`review`](Self::review), tagging the API calls it makes with
    /// `correlation_id`. A lookup answered from the cache, or shared with a
    /// concurrent review, keeps the id of the call that filled it.
    pub async fn review_correlated(
        &self,
        pr: &PullRequestRef,
        correlation_id: Option<&str>,
    ) -> CommitState {
        let target = pr.target();
        info!("Reviewing {} authored by {}", target, pr.author);

        self.publish(&target, CommitState::Pending, correlation_id).await;

        let outcome = self.check(pr, correlation_id).await;
        if let Err(e) = &outcome {
            error!("Agreement check failed for {} ({}): {}", target, pr.author, e);
        }

        let state = settle(&outcome);
        self.publish(&target, state, correlation_id).await;

        info!("{} -> {} ({:?})", target, state, outcome.ok());
        state
    }

    pub async fn evaluate(&self, pr: &PullRequestRef) -> ApiResult<Verdict> {
        self.check(pr, None).await
    }

    async fn check(&self, pr: &PullRequestRef, cid: Option<&str>) -> ApiResult<Verdict> {
        if self.membership(&pr.owner, &pr.repo, &pr.author, cid).await? {
            return Ok(Verdict::Member);
        }

        if self.agreement(&pr.author, cid).await? {
            Ok(Verdict::AgreementAccepted)
        } else {
            Ok(Verdict::AgreementMissing)
        }
    }

    /// Whether `username` collaborates on `owner/repo`.
    ///
    /// Any 2xx answer means yes and any other status means no, except a
    /// quota refusal, which is an error rather than a "no".
    pub async fn is_collaborator(&self, owner: &str, repo: &str, username: &str) -> ApiResult<bool> {
        self.membership(owner, repo, username, None).await
    }

    async fn membership(
        &self,
        owner: &str,
        repo: &str,
        username: &str,
        cid: Option<&str>,
    ) -> ApiResult<bool> {
        let key = cache_key(&[owner, repo, username]);

        self.memberships
            .get_or_compute(key, async {
                let response = self
                    .api
                    .call(
                        ApiRequest::get("/repos/{owner}/{repo}/collaborators/{username}")
                            .param("owner", owner)
                            .param("repo", repo)
                            .param("username", username)
                            .correlation_id(cid),
                    )
                    .await?;

                if response.is_success() {
                    return Ok(true);
                }
                match response.error_for_status() {
                    Err(err @ ApiError::RateLimitExceeded { .. }) => Err(err),
                    _ => Ok(false),
                }
            })
            .await
    }

    /// Whether `username` has an open issue in the agreement repository
    /// whose title carries the acceptance prefix.
    pub async fn has_accepted_agreement(&self, username: &str) -> ApiResult<bool> {
        self.agreement(username, None).await
    }

    async fn agreement(&self, username: &str, cid: Option<&str>) -> ApiResult<bool> {
        let repo = &self.settings.agreement_repo;

        self.agreements
            .get_or_compute(username.to_string(), async {
                let issues: Vec<IssueSummary> = self
                    .api
                    .call(
                        ApiRequest::get("/repos/{owner}/{repo}/issues")
                            .param("owner", &repo.owner)
                            .param("repo", &repo.name)
                            .query("creator", username)
                            .query("state", "open")
                            .correlation_id(cid),
                    )
                    .await?
                    .error_for_status()?
                    .json()?;

                Ok(issues
                    .iter()
                    .any(|issue| self.settings.is_agreement_title(&issue.title)))
            })
            .await
    }

    /// Drop a cached agreement answer, e.g. once the user has just signed.
    pub async fn forget_agreement(&self, username: &str) {
        self.agreements.invalidate(username).await;
    }

    /// `POST /repos/{owner}/{repo}/statuses/{sha}`. Not cached, not retried.
    pub async fn write_status(&self, target: &StatusTarget, state: CommitState) -> ApiResult<()> {
        self.post_status(target, state, None).await
    }

    async fn post_status(
        &self,
        target: &StatusTarget,
        state: CommitState,
        cid: Option<&str>,
    ) -> ApiResult<()> {
        let body = serde_json::json!({
            "state": state,
            "target_url": self.settings.target_url,
            "description": state.description(),
            "context": self.settings.status_context,
        });

        self.api
            .call(
                ApiRequest::post("/repos/{owner}/{repo}/statuses/{sha}", body)
                    .param("owner", &target.owner)
                    .param("repo", &target.repo)
                    .param("sha", &target.sha)
                    .correlation_id(cid),
            )
            .await?
            .error_for_status()?;

        Ok(())
    }

    async fn publish(&self, target: &StatusTarget, state: CommitState, cid: Option<&str>) {
        info!("Setting status {} -> {}", target, state);
        if let Err(e) = self.post_status(target, state, cid).await {
            warn!("Failed to set status {} on {}: {}", state, target, e);
        }
    }
}
