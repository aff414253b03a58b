//! Start over: throw away local history and rebuild the repository as a
//! single commit of the remote's latest tree.
//!
//! Every step is fail-fast with no repair. A failure after `.git` has been
//! removed leaves the directory without any repository metadata.

use std::path::Path;

use super::{SiteWorkflow, fatal_line};
use crate::errors::WorkflowError;
use crate::git::{GitErrorKind, GitOutput};
use crate::site::Site;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOverResult {
    pub commit_hash: String,
}

pub(super) fn failure_message(err: &WorkflowError) -> String {
    match err {
        e if e.is_precondition() => e.to_string(),
        WorkflowError::Git {
            kind: GitErrorKind::RemoteNotFound,
            ..
        } => "The site's remote repository could not be found".to_string(),
        WorkflowError::Git { stderr, .. } => match fatal_line(stderr) {
            Some(line) => format!("Git error: {}", line),
            None => "Unable to start over".to_string(),
        },
        _ => "Unable to start over".to_string(),
    }
}

fn check(step: &'static str, out: GitOutput) -> Result<GitOutput, WorkflowError> {
    if out.success {
        Ok(out)
    } else {
        Err(WorkflowError::Git {
            step,
            kind: out.kind(),
            stderr: out.combined(),
        })
    }
}

impl SiteWorkflow {
    pub(super) async fn start_over_site(
        &self,
        site: &Site,
    ) -> Result<StartOverResult, WorkflowError> {
        site.ensure_repository()?;
        let cwd = site.working_dir.as_path();
        let remote = self.settings.remote.as_str();
        let branch = self.settings.branch.as_str();
        let upstream = format!("{}/{}", remote, branch);

        let url = check(
            "remote get-url",
            self.git.run(&["remote", "get-url", remote], cwd).await,
        )?;
        let remote_url = url.first_line().to_string();

        check("fetch", self.git.run(&["fetch", remote], cwd).await)?;
        check(
            "reset",
            self.git.run(&["reset", "--hard", &upstream], cwd).await,
        )?;
        check(
            "clean",
            self.git
                .run(&["clean", "-fd", "-e", &self.settings.undo_marker], cwd)
                .await,
        )?;

        remove_git_dir(cwd).await?;
        tracing::warn!(site_id = %site.id, "local history removed, reinitialising repository");

        check("init", self.git.run(&["init", "--quiet"], cwd).await)?;
        let head_ref = format!("refs/heads/{}", branch);
        check(
            "symbolic-ref",
            self.git.run(&["symbolic-ref", "HEAD", &head_ref], cwd).await,
        )?;
        let exclude = self.settings.marker_exclude();
        check(
            "add",
            self.git.run(&["add", "--", ".", &exclude], cwd).await,
        )?;
        let message = format!("Start over from {}", upstream);
        check(
            "commit",
            self.git
                .run(&["commit", "--allow-empty", "-m", &message], cwd)
                .await,
        )?;
        check(
            "remote add",
            self.git.run(&["remote", "add", remote, &remote_url], cwd).await,
        )?;

        // Populates remote-tracking refs for the fresh repository; the commit
        // already exists, so a failure here is not fatal.
        let fetch = self.git.run(&["fetch", remote], cwd).await;
        if !fetch.success {
            tracing::warn!(site_id = %site.id, stderr = %fetch.error.trim(), "post-reinit fetch failed");
        }

        let commit_hash = self.git.head_hash(cwd).await.unwrap_or_default();
        tracing::info!(
            site_id = %site.id,
            commit = %commit_hash,
            remote = %remote_url,
            "started over from remote"
        );
        Ok(StartOverResult { commit_hash })
    }
}

async fn remove_git_dir(cwd: &Path) -> Result<(), WorkflowError> {
    let git_dir = cwd.join(".git");
    tokio::fs::remove_dir_all(&git_dir)
        .await
        .map_err(|e| WorkflowError::io(format!("remove {}", git_dir.display()), e))
}
