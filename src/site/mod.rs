//! Managed sites: id → working tree resolution, per-site status, and the
//! editable files inside a site.

pub mod files;
pub mod status;

pub use status::{SiteStatus, SiteStatusStore, StatusGuard};

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::errors::WorkflowError;

/// One managed website and the git working tree that backs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub id: String,
    pub working_dir: PathBuf,
}

impl Site {
    pub fn new(id: &str, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            id: id.to_string(),
            working_dir: working_dir.into(),
        }
    }

    /// Fail fast unless the working directory exists and contains `.git`.
    /// Performs no writes.
    pub fn ensure_repository(&self) -> Result<(), WorkflowError> {
        if !self.working_dir.is_dir() {
            return Err(WorkflowError::DirectoryMissing(self.working_dir.clone()));
        }
        if !self.working_dir.join(".git").exists() {
            return Err(WorkflowError::NotARepository(self.working_dir.clone()));
        }
        Ok(())
    }
}

/// Maps site ids onto working directories.
///
/// Normally `<root>/<site_id>`; an override entry points a specific id at a
/// different directory.
#[derive(Debug, Clone)]
pub struct SiteResolver {
    root: PathBuf,
    overrides: HashMap<String, PathBuf>,
}

impl SiteResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            overrides: HashMap::new(),
        }
    }

    pub fn with_overrides(mut self, overrides: HashMap<String, PathBuf>) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, site_id: &str) -> Result<Site, WorkflowError> {
        validate_site_id(site_id)?;
        let working_dir = match self.overrides.get(site_id) {
            Some(path) => path.clone(),
            None => self.root.join(site_id),
        };
        Ok(Site::new(site_id, working_dir))
    }
}

/// Site ids become path components, so only a conservative character set
/// is accepted.
pub fn validate_site_id(site_id: &str) -> Result<(), WorkflowError> {
    let valid = !site_id.is_empty()
        && site_id.len() <= 128
        && site_id != "."
        && site_id != ".."
        && !site_id.contains("..")
        && site_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(WorkflowError::InvalidSiteId(site_id.to_string()))
    }
}
