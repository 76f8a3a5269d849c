pub mod bulk;
pub mod cache;
pub mod client;
pub mod error;
pub mod link;
pub mod rate_limit;
pub mod recording;
pub mod settings;
pub mod status;
pub mod verifier;

use std::sync::Arc;

pub use bulk::{BulkReviewer, BulkSummary};
pub use cache::{CachePolicy, CoalescingCache};
pub use client::{ApiClient, ApiRequest, ApiResponse, DEFAULT_API_URL};
pub use error::{ApiError, ApiResult};
pub use rate_limit::{RateLimiter, RateWindow};
pub use recording::{
    CorrelationId, Direction, EventType, RecordedEvent, RecordingLogger, Sanitizer,
    CORRELATION_ID_HEADER,
};
pub use settings::{RepoId, Settings};
pub use status::{CommitState, PullRequest, PullRequestRef, StatusTarget};
pub use verifier::{Verdict, Verifier};

/// Everything needed to build an [`Engine`].
pub struct EngineConfig {
    pub api_url: String,
    pub token: String,
    pub rate_window: RateWindow,
    pub settings: Settings,
    pub recording_logger: Option<RecordingLogger>,
}

/// The verification engine: one rate limiter, one API client, the two lookup
/// caches, and the reviewers built on them.
///
/// Built once at start-up and shared by reference.
#[derive(Clone)]
pub struct Engine {
    pub limiter: Arc<RateLimiter>,
    pub verifier: Arc<Verifier>,
    pub bulk: BulkReviewer,
}

impl Engine {
    pub fn new(config: EngineConfig) -> anyhow::Result<Self> {
        let limiter = Arc::new(RateLimiter::new(config.rate_window));
        let api = ApiClient::new(
            &config.api_url,
            config.token,
            limiter.clone(),
            config.recording_logger,
        )?;

        let verifier = Arc::new(Verifier::new(
            api,
            Arc::new(config.settings),
            CoalescingCache::new("membership", CachePolicy::MEMBERSHIP),
            CoalescingCache::new("agreement", CachePolicy::AGREEMENT),
        ));
        let bulk = BulkReviewer::new(verifier.clone());

        Ok(Self {
            limiter,
            verifier,
            bulk,
        })
    }

    pub fn settings(&self) -> &Settings {
        self.verifier.settings()
    }
}
