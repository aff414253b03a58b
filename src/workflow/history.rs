//! Single-level undo/redo.
//!
//! Undo writes the current HEAD hash into the marker file and resets to the
//! parent. Redo resets to the marker's hash and deletes the marker. A second
//! undo without a redo overwrites the marker, so only the most recent undo
//! can be restored.

use std::path::Path;

use super::{SiteWorkflow, fatal_line};
use crate::errors::WorkflowError;
use crate::git::GitErrorKind;
use crate::site::Site;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoResult {
    /// HEAD after the reset.
    pub head: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedoResult {
    pub restored: String,
}

pub(super) fn undo_failure_message(err: &WorkflowError) -> String {
    match err {
        e if e.is_precondition() => e.to_string(),
        WorkflowError::Git { stderr, .. } => match fatal_line(stderr) {
            Some(line) => format!("Git error: {}", line),
            None => "Unable to undo changes".to_string(),
        },
        _ => "Unable to undo changes".to_string(),
    }
}

pub(super) fn redo_failure_message(err: &WorkflowError) -> String {
    match err {
        e if e.is_precondition() => e.to_string(),
        WorkflowError::Git {
            kind: GitErrorKind::UnknownRevision,
            ..
        } => "The undone changes are no longer available".to_string(),
        WorkflowError::Git { stderr, .. } => match fatal_line(stderr) {
            Some(line) => format!("Git error: {}", line),
            None => "Unable to restore changes".to_string(),
        },
        _ => "Unable to restore changes".to_string(),
    }
}

/// Trimmed marker content, or `None` when the file is absent or blank.
pub(crate) async fn read_marker(path: &Path) -> Result<Option<String>, WorkflowError> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => {
            let hash = content.trim();
            Ok((!hash.is_empty()).then(|| hash.to_string()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(WorkflowError::io(
            format!("read {}", path.display()),
            e,
        )),
    }
}

/// Delete the marker; a missing file is fine.
pub(super) async fn remove_marker(path: &Path) -> Result<(), WorkflowError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(WorkflowError::io(format!("remove {}", path.display()), e)),
    }
}

impl SiteWorkflow {
    pub(super) async fn undo_site(&self, site: &Site) -> Result<UndoResult, WorkflowError> {
        site.ensure_repository()?;
        let cwd = site.working_dir.as_path();

        let count = self.git.commit_count(cwd).await.unwrap_or(0);
        if count <= 1 {
            return Err(WorkflowError::NothingToUndo);
        }

        let head = self.git.run(&["rev-parse", "HEAD"], cwd).await;
        if !head.success {
            return Err(WorkflowError::Git {
                step: "rev-parse",
                kind: head.kind(),
                stderr: head.combined(),
            });
        }
        let undone = head.first_line().to_string();

        let marker = cwd.join(&self.settings.undo_marker);
        tokio::fs::write(&marker, format!("{}\n", undone))
            .await
            .map_err(|e| WorkflowError::io(format!("write {}", marker.display()), e))?;

        let reset = self.git.run(&["reset", "--hard", "HEAD~1"], cwd).await;
        if !reset.success {
            // The marker stays so the undo can be retried.
            return Err(WorkflowError::Git {
                step: "reset",
                kind: reset.kind(),
                stderr: reset.combined(),
            });
        }

        let head = self.git.head_hash(cwd).await.unwrap_or_default();
        tracing::info!(site_id = %site.id, undone = %undone, head = %head, "undid last commit");
        Ok(UndoResult { head })
    }

    pub(super) async fn redo_site(&self, site: &Site) -> Result<RedoResult, WorkflowError> {
        site.ensure_repository()?;
        let cwd = site.working_dir.as_path();
        let marker = cwd.join(&self.settings.undo_marker);

        let Some(target) = read_marker(&marker).await? else {
            return Err(WorkflowError::NothingToRedo);
        };

        let reset = self.git.run(&["reset", "--hard", &target], cwd).await;
        if !reset.success {
            return Err(WorkflowError::Git {
                step: "reset",
                kind: reset.kind(),
                stderr: reset.combined(),
            });
        }

        remove_marker(&marker).await?;

        tracing::info!(site_id = %site.id, restored = %target, "restored undone commit");
        Ok(RedoResult { restored: target })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_read_marker_missing_and_blank() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".undo-commit");
        assert_eq!(read_marker(&path).await.unwrap(), None);
        std::fs::write(&path, "  \n").unwrap();
        assert_eq!(read_marker(&path).await.unwrap(), None);
        std::fs::write(&path, "abc123\n").unwrap();
        assert_eq!(read_marker(&path).await.unwrap().as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn test_remove_marker_tolerates_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".undo-commit");
        remove_marker(&path).await.unwrap();
        std::fs::write(&path, "abc123\n").unwrap();
        remove_marker(&path).await.unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_redo_failure_message_for_stale_target() {
        let err = WorkflowError::Git {
            step: "reset",
            kind: GitErrorKind::UnknownRevision,
            stderr: "fatal: ambiguous argument 'abc': unknown revision or path not in the working tree.".into(),
        };
        assert_eq!(
            redo_failure_message(&err),
            "The undone changes are no longer available"
        );
        assert_eq!(
            redo_failure_message(&WorkflowError::NothingToRedo),
            "No changes to restore"
        );
    }

    #[test]
    fn test_undo_failure_message() {
        assert_eq!(
            undo_failure_message(&WorkflowError::NothingToUndo),
            "No changes to undo"
        );
        let err = WorkflowError::Git {
            step: "reset",
            kind: GitErrorKind::Other,
            stderr: "error: cannot lock ref".into(),
        };
        assert_eq!(undo_failure_message(&err), "Unable to undo changes");
    }
}
