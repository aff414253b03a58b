use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Per-site processing state shown to the UI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SiteStatus {
    #[default]
    Ready,
    UnderDev,
}

impl SiteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "READY",
            Self::UnderDev => "UNDER_DEV",
        }
    }
}

impl std::fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-memory status per site id. Not persisted; unknown ids read as READY.
///
/// This is signalling for the UI, not a lock: a second request for the same
/// site is never blocked by an UNDER_DEV entry.
#[derive(Debug, Clone, Default)]
pub struct SiteStatusStore {
    inner: Arc<DashMap<String, SiteStatus>>,
}

impl SiteStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, site_id: &str) -> SiteStatus {
        self.inner
            .get(site_id)
            .map(|s| *s.value())
            .unwrap_or_default()
    }

    pub fn set(&self, site_id: &str, status: SiteStatus) {
        match status {
            // READY is the implicit default, so the entry is simply dropped.
            SiteStatus::Ready => {
                self.inner.remove(site_id);
            }
            SiteStatus::UnderDev => {
                self.inner.insert(site_id.to_string(), status);
            }
        }
    }

    /// Mark the site UNDER_DEV until the returned guard is dropped.
    pub fn begin(&self, site_id: &str) -> StatusGuard {
        self.set(site_id, SiteStatus::UnderDev);
        StatusGuard {
            store: self.clone(),
            site_id: site_id.to_string(),
        }
    }
}

/// Resets the site to READY when dropped, on every exit path of a request.
#[must_use = "the site is reset to READY as soon as the guard is dropped"]
pub struct StatusGuard {
    store: SiteStatusStore,
    site_id: String,
}

impl Drop for StatusGuard {
    fn drop(&mut self) {
        self.store.set(&self.site_id, SiteStatus::Ready);
    }
}
