use std::sync::LazyLock;

use regex::Regex;

use super::history::remove_marker;
use super::{SiteWorkflow, fatal_line};
use crate::errors::WorkflowError;
use crate::git::GitErrorKind;
use crate::site::Site;

/// `[main 1a2b3c4] message`, `[main (root-commit) 1a2b3c4] message`,
/// `[detached HEAD 1a2b3c4] message`.
static COMMIT_HASH_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\[[^\]]*? ([0-9a-f]{7,40})\]").unwrap());

/// A created commit, or a no-op when the tree was already clean.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResult {
    /// Abbreviated hash as printed by `git commit`; empty for a no-op.
    pub commit_hash: String,
}

impl CommitResult {
    pub fn is_noop(&self) -> bool {
        self.commit_hash.is_empty()
    }
}

pub(crate) fn parse_commit_hash(output: &str) -> Option<&str> {
    COMMIT_HASH_REGEX
        .captures(output)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

pub(super) fn failure_message(err: &WorkflowError) -> String {
    match err {
        e if e.is_precondition() => e.to_string(),
        WorkflowError::Git { stderr, .. } => match fatal_line(stderr) {
            Some(line) => format!("Git error: {}", line),
            None => "Unable to save changes".to_string(),
        },
        WorkflowError::CommitHashUnparseable(_) => {
            "Changes were saved but the commit could not be identified".to_string()
        }
        _ => "Unable to save changes".to_string(),
    }
}

impl SiteWorkflow {
    /// Stage everything except the undo marker and commit it.
    pub async fn commit_site(
        &self,
        site: &Site,
        message: &str,
    ) -> Result<CommitResult, WorkflowError> {
        site.ensure_repository()?;
        let cwd = site.working_dir.as_path();
        let exclude = self.settings.marker_exclude();

        let add = self.git.run(&["add", "--", ".", &exclude], cwd).await;
        if !add.success {
            return Err(WorkflowError::Git {
                step: "add",
                kind: add.kind(),
                stderr: add.combined(),
            });
        }

        let commit = self.git.run(&["commit", "-m", message], cwd).await;
        if !commit.success {
            let kind = commit.kind();
            if kind == GitErrorKind::NothingToCommit {
                tracing::info!(site_id = %site.id, "nothing to commit");
                return Ok(CommitResult {
                    commit_hash: String::new(),
                });
            }
            return Err(WorkflowError::Git {
                step: "commit",
                kind,
                stderr: commit.combined(),
            });
        }

        match parse_commit_hash(&commit.output) {
            Some(hash) => {
                tracing::info!(site_id = %site.id, commit = hash, "committed changes");
                // A new commit on top of an undo makes the redo target stale.
                let marker = cwd.join(&self.settings.undo_marker);
                if let Err(e) = remove_marker(&marker).await {
                    tracing::warn!(site_id = %site.id, error = %e, "failed to clear undo marker");
                }
                Ok(CommitResult {
                    commit_hash: hash.to_string(),
                })
            }
            None => Err(WorkflowError::CommitHashUnparseable(
                commit.first_line().to_string(),
            )),
        }
    }

    /// `git reset --hard HEAD`: drop tracked modifications left behind by a
    /// failed assistant run so they cannot leak into the next commit.
    pub async fn discard_uncommitted(&self, site: &Site) -> Result<(), WorkflowError> {
        site.ensure_repository()?;
        let reset = self
            .git
            .run(&["reset", "--hard", "HEAD"], &site.working_dir)
            .await;
        if !reset.success {
            return Err(WorkflowError::Git {
                step: "reset",
                kind: reset.kind(),
                stderr: reset.combined(),
            });
        }
        tracing::info!(site_id = %site.id, "discarded uncommitted changes");
        Ok(())
    }
}
