//! Download freshness stamps.
//!
//! A successful data-pack download records when it happened, keyed by its
//! `data_pack_id`, in a small JSON file. Staleness is judged against a TTL.

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Freshness verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    Fresh,
    Stale,
    NeverDownloaded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FreshnessReport {
    pub data_pack_id: String,
    pub status: Freshness,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloaded_at: Option<DateTime<Utc>>,
    /// Age of the stamp in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_seconds: Option<i64>,
}

/// Stamp file: `data_pack_id → RFC 3339 timestamp`.
#[derive(Debug, Clone)]
pub struct FreshnessStore {
    path: PathBuf,
}

impl FreshnessStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> BTreeMap<String, DateTime<Utc>> {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// When `id` was last downloaded.
    pub fn last(&self, id: &str) -> Option<DateTime<Utc>> {
        self.load().get(id).copied()
    }

    /// Record a download of `id` at `at`.
    pub fn record(&self, id: &str, at: DateTime<Utc>) -> anyhow::Result<()> {
        let mut stamps = self.load();
        stamps.insert(id.to_string(), at);
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&stamps)?;
        fs::write(&self.path, json).with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }
}

/// Judge `id` against `ttl` as of `now`.
pub fn check_freshness(
    store: &FreshnessStore,
    id: &str,
    ttl: Duration,
    now: DateTime<Utc>,
) -> FreshnessReport {
    let downloaded_at = store.last(id);
    let age = downloaded_at.map(|at| now - at);
    let status = match age {
        None => Freshness::NeverDownloaded,
        Some(age) if age <= ttl => Freshness::Fresh,
        Some(_) => Freshness::Stale,
    };
    FreshnessReport {
        data_pack_id: id.to_string(),
        status,
        downloaded_at,
        age_seconds: age.map(|a| a.num_seconds()),
    }
}
