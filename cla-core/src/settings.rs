//! Constants the engine is configured with at start-up.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};

pub const DEFAULT_ORGANIZATIONS: &[&str] = &["mulesoft", "mulesoft-labs", "mulesoft-consulting"];
pub const DEFAULT_AGREEMENT_REPOSITORY: &str = "mulesoft/contributor-agreements";
pub const DEFAULT_TITLE_PREFIX: &str = "MuleSoft Contributor Agreement Acceptance";
pub const DEFAULT_TARGET_URL: &str =
    "https://api-notebook.anypoint.mulesoft.com/notebooks#bc1cf75a0284268407e4";
pub const DEFAULT_STATUS_CONTEXT: &str = "mulesoft/cla";

/// An `owner/name` repository identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl RepoId {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepoId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(RepoId {
                    owner: owner.to_string(),
                    name: name.to_string(),
                })
            }
            _ => Err(anyhow!("expected a repository as owner/name, got {:?}", s)),
        }
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// Repository whose open issues record agreement acceptances.
    pub agreement_repo: RepoId,
    /// Organizations whose pull requests require an agreement.
    pub organizations: Vec<String>,
    /// Issue titles starting with this (case-sensitive) mark an acceptance.
    pub title_prefix: String,
    /// Link attached to every status, pointing at the agreement form.
    pub target_url: String,
    /// Status context shown in the pull request checks list.
    pub status_context: String,
}

impl Settings {
    pub fn is_agreement_title(&self, title: &str) -> bool {
        title.starts_with(&self.title_prefix)
    }

    pub fn covers_owner(&self, owner: &str) -> bool {
        self.organizations.iter().any(|org| org == owner)
    }

    pub fn is_agreement_repo(&self, full_name: &str) -> bool {
        self.agreement_repo.full_name() == full_name
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            agreement_repo: RepoId {
                owner: "mulesoft".to_string(),
                name: "contributor-agreements".to_string(),
            },
            organizations: DEFAULT_ORGANIZATIONS.iter().map(|s| s.to_string()).collect(),
            title_prefix: DEFAULT_TITLE_PREFIX.to_string(),
            target_url: DEFAULT_TARGET_URL.to_string(),
            status_context: DEFAULT_STATUS_CONTEXT.to_string(),
        }
    }
}

/// Split a comma separated organization list, dropping blanks.
pub fn parse_organizations(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|org| !org.is_empty())
        .map(str::to_string)
        .collect()
}
