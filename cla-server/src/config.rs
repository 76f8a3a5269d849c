use anyhow::{bail, Context, Result};
use std::env;

use cla_core::settings::{
    parse_organizations, DEFAULT_AGREEMENT_REPOSITORY, DEFAULT_ORGANIZATIONS,
    DEFAULT_STATUS_CONTEXT, DEFAULT_TARGET_URL, DEFAULT_TITLE_PREFIX,
};
use cla_core::{EngineConfig, RateWindow, RecordingLogger, RepoId, Settings, DEFAULT_API_URL};

#[derive(Clone)]
pub struct Config {
    pub github_access_token: String,
    pub github_api_url: String,
    /// Outbound calls allowed per hour.
    pub github_rate_limit: usize,
    pub organizations: Vec<String>,
    pub agreement_repo: RepoId,
    pub target_url: String,
    pub title_prefix: String,
    pub status_context: String,
    /// When unset, webhook signatures are not checked.
    pub webhook_secret: Option<String>,
    pub port: u16,
    pub recording_enabled: bool,
    pub recording_log_path: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let github_access_token = lookup("GITHUB_ACCESS_TOKEN")
            .filter(|s| !s.trim().is_empty())
            .context("GITHUB_ACCESS_TOKEN environment variable is required")?;

        let github_api_url = var("GITHUB_API_URL", DEFAULT_API_URL);

        let github_rate_limit = var("GITHUB_RATE_LIMIT", "5000")
            .trim()
            .parse::<usize>()
            .context("GITHUB_RATE_LIMIT must be a valid number")?;

        let organizations = match lookup("CLA_USERS") {
            Some(raw) => parse_organizations(&raw),
            None => DEFAULT_ORGANIZATIONS.iter().map(|s| s.to_string()).collect(),
        };
        if organizations.is_empty() {
            bail!("CLA_USERS must name at least one organization");
        }

        let agreement_repo = var("CLA_REPOSITORY", DEFAULT_AGREEMENT_REPOSITORY)
            .parse::<RepoId>()
            .context("CLA_REPOSITORY must look like owner/name")?;

        let target_url = var("TARGET_URL", DEFAULT_TARGET_URL);
        let title_prefix = var("CLA_TITLE_PREFIX", DEFAULT_TITLE_PREFIX);
        let status_context = var("STATUS_CONTEXT", DEFAULT_STATUS_CONTEXT);

        let webhook_secret = parse_webhook_secret(lookup("GITHUB_WEBHOOK_SECRET"));

        let port = var("PORT", "3000")
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let recording_enabled = var("RECORDING_ENABLED", "false")
            .parse::<bool>()
            .unwrap_or(false);

        let recording_log_path = var("RECORDING_LOG_PATH", "recordings.jsonl");

        Ok(Config {
            github_access_token,
            github_api_url,
            github_rate_limit,
            organizations,
            agreement_repo,
            target_url,
            title_prefix,
            status_context,
            webhook_secret,
            port,
            recording_enabled,
            recording_log_path,
        })
    }

    pub fn settings(&self) -> Settings {
        Settings {
            agreement_repo: self.agreement_repo.clone(),
            organizations: self.organizations.clone(),
            title_prefix: self.title_prefix.clone(),
            target_url: self.target_url.clone(),
            status_context: self.status_context.clone(),
        }
    }

    pub fn engine_config(&self, recording_logger: Option<RecordingLogger>) -> EngineConfig {
        EngineConfig {
            api_url: self.github_api_url.clone(),
            token: self.github_access_token.clone(),
            rate_window: RateWindow::per_hour(self.github_rate_limit),
            settings: self.settings(),
            recording_logger,
        }
    }
}

/// Parse GITHUB_WEBHOOK_SECRET from an optional string value.
///
/// Returns None if the value is missing, empty, or contains only whitespace,
/// so an empty secret never counts as "signatures required".
pub fn parse_webhook_secret(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
