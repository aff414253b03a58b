//! Site Change Workflow Engine.
//!
//! ## Operations
//!
//! | Operation          | Module        | Git sequence                                        |
//! |--------------------|---------------|-----------------------------------------------------|
//! | `apply_and_commit` | `commit`      | `add .` → `commit -m` → delete marker               |
//! | `undo_last_commit` | `history`     | `rev-list --count` → write marker → `reset HEAD~1`  |
//! | `redo_last_commit` | `history`     | read marker → `reset <marker>` → delete marker      |
//! | `publish`          | `publish`     | `fetch` (tolerated) → `pull --rebase` (tolerated) → `push` |
//! | `start_over`       | `start_over`  | `fetch` → `reset origin/<branch>` → `rm .git` → `init` → single commit |
//!
//! Every operation is sequential and fail-fast. Internally each step returns
//! `Result<_, WorkflowError>`; the public operations convert that into an
//! [`OperationOutcome`] so nothing escapes the component boundary as an error.
//!
//! There is no per-site locking. Two concurrent operations on the same site
//! race at the git level (and on the undo marker, last writer wins).

mod commit;
mod history;
mod publish;
mod start_over;

pub use commit::CommitResult;
pub use history::{RedoResult, UndoResult};
pub use publish::PublishResult;
pub use start_over::StartOverResult;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::assistant::AssistantPool;
use crate::errors::WorkflowError;
use crate::git::GitRunner;
use crate::site::{Site, SiteResolver};

pub const DEFAULT_UNDO_MARKER: &str = ".undo-commit";

/// Repository conventions shared by all operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowSettings {
    /// Remote name to fetch from / push to.
    pub remote: String,
    /// The remote's primary branch.
    pub branch: String,
    /// File name (relative to the working tree) holding the redo target.
    pub undo_marker: String,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            remote: "origin".to_string(),
            branch: "main".to_string(),
            undo_marker: DEFAULT_UNDO_MARKER.to_string(),
        }
    }
}

impl WorkflowSettings {
    /// Pathspec that keeps the undo marker out of `git add`.
    pub(crate) fn marker_exclude(&self) -> String {
        format!(":(exclude){}", self.undo_marker)
    }
}

/// Structured result of a workflow operation, serialised as camelCase JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_message: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// `precondition`, a git error kind, `commit_hash_unparseable` or `io`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl OperationOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            commit_hash: None,
            commit_message: None,
            message: message.into(),
            error: None,
            error_kind: None,
        }
    }

    pub fn with_commit(mut self, hash: impl Into<String>) -> Self {
        self.commit_hash = Some(hash.into());
        self
    }

    pub fn with_commit_message(mut self, subject: impl Into<String>) -> Self {
        self.commit_message = Some(subject.into());
        self
    }

    /// Failure carrying both the user-facing `message` and the technical
    /// `error` string.
    pub fn failed(message: impl Into<String>, err: &WorkflowError) -> Self {
        Self {
            success: false,
            commit_hash: None,
            commit_message: None,
            message: message.into(),
            error: Some(err.to_string()),
            error_kind: Some(failure_kind(err).to_string()),
        }
    }

    pub fn is_precondition_failure(&self) -> bool {
        !self.success && self.error_kind.as_deref() == Some("precondition")
    }
}

fn failure_kind(err: &WorkflowError) -> &'static str {
    match err {
        e if e.is_precondition() => "precondition",
        WorkflowError::Git { kind, .. } => kind.as_str(),
        WorkflowError::CommitHashUnparseable(_) => "commit_hash_unparseable",
        _ => "io",
    }
}

/// The `fatal: ...` line of git stderr, without the prefix.
pub(crate) fn fatal_line(stderr: &str) -> Option<&str> {
    stderr
        .lines()
        .find_map(|l| l.trim().strip_prefix("fatal:"))
        .map(str::trim)
}

/// Runs the git-backed site operations.
pub struct SiteWorkflow {
    git: GitRunner,
    resolver: SiteResolver,
    settings: WorkflowSettings,
    pool: Option<Arc<AssistantPool>>,
}

impl SiteWorkflow {
    pub fn new(git: GitRunner, resolver: SiteResolver, settings: WorkflowSettings) -> Self {
        Self {
            git,
            resolver,
            settings,
            pool: None,
        }
    }

    /// Attach the assistant pool so history-rewriting operations can tear
    /// down the site's assistant session first.
    pub fn with_pool(mut self, pool: Arc<AssistantPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn git(&self) -> &GitRunner {
        &self.git
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    pub fn resolve(&self, site_id: &str) -> Result<Site, WorkflowError> {
        self.resolver.resolve(site_id)
    }

    fn teardown_session(&self, site_id: &str) {
        if let Some(pool) = &self.pool
            && pool.terminate(site_id)
        {
            tracing::info!(site_id, "assistant session torn down");
        }
    }

    /// Stage everything and commit. A clean tree is a successful no-op with
    /// an empty commit hash.
    pub async fn apply_and_commit(&self, site_id: &str, message: &str) -> OperationOutcome {
        let result = match self.resolve(site_id) {
            Ok(site) => self.commit_site(&site, message).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(commit) if commit.is_noop() => {
                OperationOutcome::ok("No changes to commit").with_commit("")
            }
            Ok(commit) => OperationOutcome::ok("Changes committed successfully")
                .with_commit(commit.commit_hash)
                .with_commit_message(message),
            Err(e) => {
                log_failure(site_id, "commit", &e);
                OperationOutcome::failed(commit::failure_message(&e), &e)
            }
        }
    }

    /// Reset to the parent commit, remembering the current HEAD for one
    /// level of redo.
    pub async fn undo_last_commit(&self, site_id: &str) -> OperationOutcome {
        self.teardown_session(site_id);
        let result = match self.resolve(site_id) {
            Ok(site) => self.undo_site(&site).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(undo) => OperationOutcome::ok("Changes undone successfully").with_commit(undo.head),
            Err(e) => {
                log_failure(site_id, "undo", &e);
                OperationOutcome::failed(history::undo_failure_message(&e), &e)
            }
        }
    }

    /// Reset back to the commit recorded by the last undo.
    pub async fn redo_last_commit(&self, site_id: &str) -> OperationOutcome {
        self.teardown_session(site_id);
        let result = match self.resolve(site_id) {
            Ok(site) => self.redo_site(&site).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(redo) => {
                OperationOutcome::ok("Changes restored successfully").with_commit(redo.restored)
            }
            Err(e) => {
                log_failure(site_id, "redo", &e);
                OperationOutcome::failed(history::redo_failure_message(&e), &e)
            }
        }
    }

    /// Push local commits to the remote's primary branch.
    pub async fn publish(&self, site_id: &str) -> OperationOutcome {
        let result = match self.resolve(site_id) {
            Ok(site) => self.publish_site(&site).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(published) => OperationOutcome::ok("Changes published successfully")
                .with_commit(published.commit_hash)
                .with_commit_message(published.commit_message),
            Err(e) => {
                log_failure(site_id, "publish", &e);
                OperationOutcome::failed(publish::failure_message(&e), &e)
            }
        }
    }

    /// Discard all local history and recreate a single-commit repository
    /// from the remote's latest state.
    pub async fn start_over(&self, site_id: &str) -> OperationOutcome {
        self.teardown_session(site_id);
        let result = match self.resolve(site_id) {
            Ok(site) => self.start_over_site(&site).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(fresh) => OperationOutcome::ok("Site reset to the latest published version")
                .with_commit(fresh.commit_hash),
            Err(e) => {
                log_failure(site_id, "start_over", &e);
                OperationOutcome::failed(start_over::failure_message(&e), &e)
            }
        }
    }
}

fn log_failure(site_id: &str, operation: &str, err: &WorkflowError) {
    if err.is_precondition() {
        tracing::info!(site_id, operation, reason = %err, "operation precondition not met");
    } else {
        tracing::error!(site_id, operation, error = %err, "operation failed");
    }
}
