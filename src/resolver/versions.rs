//! Release listings for dynamic version choices.

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default GitHub API endpoint.
pub const GITHUB_API: &str = "https://api.github.com";

/// One published release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub draft: bool,
}

/// Lists releases of a repository, newest first.
pub trait ReleaseFeed: Send + Sync {
    fn releases(&self, repo: &str, limit: usize) -> Result<Vec<Release>>;
}

/// GitHub releases API client.
pub struct GithubReleases {
    client: Client,
    api_base: String,
}

impl GithubReleases {
    pub fn new() -> Self {
        Self::with_base(GITHUB_API)
    }

    /// Point at a different API host (GitHub Enterprise, tests).
    pub fn with_base(api_base: impl Into<String>) -> Self {
        let client = Client::builder()
            .user_agent(concat!("rigup/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }
}

impl Default for GithubReleases {
    fn default() -> Self {
        Self::new()
    }
}

impl ReleaseFeed for GithubReleases {
    fn releases(&self, repo: &str, limit: usize) -> Result<Vec<Release>> {
        let url = format!(
            "{}/repos/{}/releases?per_page={}",
            self.api_base,
            repo,
            limit.clamp(1, 100)
        );
        let mut request = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json");
        if let Ok(token) = std::env::var("GITHUB_TOKEN") {
            request = request.bearer_auth(token);
        }

        let response = request.send().with_context(|| format!("fetching {}", url))?;
        if !response.status().is_success() {
            bail!("HTTP {} fetching releases for {}", response.status(), repo);
        }
        let releases: Vec<Release> = response
            .json()
            .with_context(|| format!("parsing releases for {}", repo))?;
        Ok(releases.into_iter().filter(|r| !r.draft).take(limit).collect())
    }
}
