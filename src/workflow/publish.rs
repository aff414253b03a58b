use std::path::Path;

use super::{SiteWorkflow, fatal_line};
use crate::errors::WorkflowError;
use crate::git::{GitErrorKind, GitOutput};
use crate::site::Site;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishResult {
    pub commit_hash: String,
    pub commit_message: String,
}

pub(super) fn failure_message(err: &WorkflowError) -> String {
    match err {
        e if e.is_precondition() => e.to_string(),
        WorkflowError::Git {
            kind: GitErrorKind::RemoteNotFound,
            ..
        } => "The site's remote repository could not be found".to_string(),
        WorkflowError::Git { step: "log", .. } | WorkflowError::CommitHashUnparseable(_) => {
            "Changes were published but the latest commit could not be read".to_string()
        }
        WorkflowError::Git { stderr, .. } => match fatal_line(stderr) {
            Some(line) => format!("Git error: {}", line),
            None => "Unable to publish changes".to_string(),
        },
        _ => "Unable to publish changes".to_string(),
    }
}

/// Fetch and pull failures are tolerated unless the remote itself is gone.
fn tolerate(step: &'static str, out: GitOutput, site_id: &str) -> Result<(), WorkflowError> {
    if out.success {
        return Ok(());
    }
    let kind = out.kind();
    if kind == GitErrorKind::RemoteNotFound {
        return Err(WorkflowError::Git {
            step,
            kind,
            stderr: out.combined(),
        });
    }
    tracing::warn!(
        site_id,
        step,
        kind = %kind,
        stderr = %out.combined().trim(),
        "tolerating failed git step before push"
    );
    Ok(())
}

/// Hash and subject from `git log -1 --format=%H%n%s`.
fn last_commit(out: GitOutput) -> Result<(String, String), WorkflowError> {
    if !out.success {
        return Err(WorkflowError::Git {
            step: "log",
            kind: out.kind(),
            stderr: out.combined(),
        });
    }
    let mut lines = out.output.lines();
    let commit_hash = lines.next().unwrap_or_default().trim().to_string();
    if commit_hash.is_empty() {
        return Err(WorkflowError::CommitHashUnparseable(out.output.clone()));
    }
    let commit_message = lines.next().unwrap_or_default().trim().to_string();
    Ok((commit_hash, commit_message))
}

fn rebase_in_progress(cwd: &Path) -> bool {
    let git_dir = cwd.join(".git");
    git_dir.join("rebase-merge").exists() || git_dir.join("rebase-apply").exists()
}

impl SiteWorkflow {
    pub(super) async fn publish_site(&self, site: &Site) -> Result<PublishResult, WorkflowError> {
        site.ensure_repository()?;
        let cwd = site.working_dir.as_path();
        let remote = self.settings.remote.as_str();
        let branch = self.settings.branch.as_str();

        let fetch = self.git.run(&["fetch", remote], cwd).await;
        tolerate("fetch", fetch, &site.id)?;

        let pull = self
            .git
            .run(&["pull", "--rebase", remote, branch], cwd)
            .await;
        let pull_failed = !pull.success;
        tolerate("pull", pull, &site.id)?;
        if pull_failed && rebase_in_progress(cwd) {
            let abort = self.git.run(&["rebase", "--abort"], cwd).await;
            if !abort.success {
                tracing::warn!(site_id = %site.id, stderr = %abort.error.trim(), "rebase --abort failed");
            }
        }

        let refspec = format!("HEAD:{}", branch);
        let push = self.git.run(&["push", remote, &refspec], cwd).await;
        if !push.success {
            return Err(WorkflowError::Git {
                step: "push",
                kind: push.kind(),
                stderr: push.combined(),
            });
        }

        let log = self.git.run(&["log", "-1", "--format=%H%n%s"], cwd).await;
        let (commit_hash, commit_message) = last_commit(log)?;

        tracing::info!(site_id = %site.id, commit = %commit_hash, "published");
        Ok(PublishResult {
            commit_hash,
            commit_message,
        })
    }
}
