//! Re-verification of every open pull request by one author.
//!
//! Used right after someone files an agreement: their pull requests across
//! the covered organizations are found through the issue search API and each
//! one is reviewed again. Pages are followed through the `Link: rel="next"`
//! header only. All pull requests on a page are reviewed concurrently, and
//! the next page is not requested until they have all finished.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::join_all;
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::client::{ApiClient, ApiRequest, ApiResponse};
use crate::error::{ApiError, ApiResult};
use crate::status::{CommitState, PullRequest, PullRequestRef};
use crate::verifier::Verifier;

#[derive(Debug, Deserialize)]
struct SearchResults {
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    pull_request: Option<PullRequestLinks>,
}

#[derive(Debug, Deserialize)]
struct PullRequestLinks {
    url: String,
}

/// What a bulk walk did.
#[derive(Debug, Default)]
pub struct BulkSummary {
    /// Search result pages fetched.
    pub pages: usize,
    /// Terminal state written for each pull request reviewed.
    pub outcomes: Vec<(PullRequestRef, CommitState)>,
    /// Pull requests whose details could not be fetched.
    pub failed: usize,
    /// Set when the walk itself stopped early.
    pub error: Option<ApiError>,
}

impl BulkSummary {
    pub fn reviewed(&self) -> usize {
        self.outcomes.len()
    }
}

#[derive(Clone)]
pub struct BulkReviewer {
    verifier: Arc<Verifier>,
}

impl BulkReviewer {
    pub fn new(verifier: Arc<Verifier>) -> Self {
        Self { verifier }
    }

    fn api(&self) -> &ApiClient {
        self.verifier.api()
    }

    /// `user:<org> ... type:pr author:<username> is:open`
    pub fn search_query(&self, username: &str) -> String {
        let mut terms: Vec<String> = self
            .verifier
            .settings()
            .organizations
            .iter()
            .map(|org| format!("user:{}", org))
            .collect();
        terms.push("type:pr".to_string());
        terms.push(format!("author:{}", username));
        terms.push("is:open".to_string());
        terms.join(" ")
    }

    /// Review every open pull request `username` authored in the covered
    /// organizations. Never fails; problems are logged and reported in the
    /// summary.
    pub async fn reverify_all(&self, username: &str) -> BulkSummary {
        self.reverify_all_correlated(username, None).await
    }

    /// [`reverify_all`](Self::reverify_all), tagging every API call with
    /// `correlation_id`.
    pub async fn reverify_all_correlated(
        &self,
        username: &str,
        correlation_id: Option<&str>,
    ) -> BulkSummary {
        info!("Re-verifying open pull requests by {}", username);

        let mut summary = BulkSummary::default();

        // Without a user: term the search would cover all of GitHub.
        if self.verifier.settings().organizations.is_empty() {
            error!(
                "Not re-verifying {}: no organizations are covered",
                username
            );
            summary.error = Some(ApiError::NoOrganizations);
            return summary;
        }

        // A cached "not signed" answer would otherwise outlive the signature.
        self.verifier.forget_agreement(username).await;

        if let Err(e) = self.walk(username, correlation_id, &mut summary).await {
            error!("Re-verification walk for {} stopped: {}", username, e);
            summary.error = Some(e);
        }

        info!(
            "Re-verification for {} done: {} pages, {} reviewed, {} failed",
            username,
            summary.pages,
            summary.reviewed(),
            summary.failed
        );
        summary
    }

    async fn walk(
        &self,
        username: &str,
        cid: Option<&str>,
        summary: &mut BulkSummary,
    ) -> ApiResult<()> {
        let query = self.search_query(username);
        let mut page = self
            .api()
            .call(
                ApiRequest::get("/search/issues")
                    .query("q", query)
                    .correlation_id(cid),
            )
            .await?
            .error_for_status()?;
        let mut visited = HashSet::new();

        loop {
            visited.insert(page.url().to_string());
            summary.pages += 1;
            self.review_page(&page, cid, summary).await?;

            let Some(next) = page.next_link() else {
                break;
            };
            if visited.contains(&next) {
                warn!("Search pagination points back to {}, stopping", next);
                break;
            }

            page = self
                .api()
                .call(ApiRequest::get(&next).correlation_id(cid))
                .await?
                .error_for_status()?;
        }

        Ok(())
    }

    async fn review_page(
        &self,
        page: &ApiResponse,
        cid: Option<&str>,
        summary: &mut BulkSummary,
    ) -> ApiResult<()> {
        let results: SearchResults = page.json()?;

        let reviews = results
            .items
            .iter()
            .filter_map(|item| item.pull_request.as_ref())
            .map(|links| self.review_linked(&links.url, cid));

        for outcome in join_all(reviews).await {
            match outcome {
                Ok(reviewed) => summary.outcomes.push(reviewed),
                Err(e) => {
                    warn!("Skipping pull request: {}", e);
                    summary.failed += 1;
                }
            }
        }

        Ok(())
    }

    /// Fetch the pull request behind a search hit and review it.
    async fn review_linked(
        &self,
        url: &str,
        cid: Option<&str>,
    ) -> ApiResult<(PullRequestRef, CommitState)> {
        let pr: PullRequest = self
            .api()
            .call(ApiRequest::get(url).correlation_id(cid))
            .await?
            .error_for_status()?
            .json()?;

        let pr_ref = PullRequestRef::from(&pr);
        let state = self.verifier.review_correlated(&pr_ref, cid).await;
        Ok((pr_ref, state))
    }
}
