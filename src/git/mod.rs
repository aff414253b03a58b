//! Thin async wrapper around the `git` CLI.
//!
//! Every invocation resolves to a [`GitOutput`]; a nonzero exit or a spawn
//! failure is reported through the same shape rather than as an `Err`, so
//! callers decide what a failure means via [`classify_git_error`].

mod classify;

pub use classify::{GitErrorKind, classify_git_error};

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

/// Captured result of a single external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitOutput {
    /// `true` when the process exited with status 0.
    pub success: bool,
    /// Full stdout.
    pub output: String,
    /// Full stderr, or the spawn error message if the process never started.
    pub error: String,
}

impl GitOutput {
    /// stderr followed by stdout. Git writes some diagnostics (e.g.
    /// "nothing to commit") to stdout, so classification looks at both.
    pub fn combined(&self) -> String {
        match (self.error.trim().is_empty(), self.output.trim().is_empty()) {
            (true, _) => self.output.clone(),
            (false, true) => self.error.clone(),
            (false, false) => format!("{}\n{}", self.error, self.output),
        }
    }

    pub fn kind(&self) -> GitErrorKind {
        classify_git_error(&self.combined())
    }

    /// First non-empty line of stdout, trimmed.
    pub fn first_line(&self) -> &str {
        self.output
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("")
    }
}

/// Run `program args...` in `cwd`, capturing stdout and stderr in full.
///
/// Never returns an error: spawn failures surface as `success: false` with
/// `error` set to the spawn error message. No retries, no timeout.
pub async fn run_command(
    program: &str,
    args: &[&str],
    cwd: &Path,
    envs: &[(&str, &str)],
) -> GitOutput {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (key, value) in envs {
        cmd.env(key, value);
    }

    match cmd.output().await {
        Ok(out) => GitOutput {
            success: out.status.success(),
            output: String::from_utf8_lossy(&out.stdout).to_string(),
            error: String::from_utf8_lossy(&out.stderr).to_string(),
        },
        Err(e) => GitOutput {
            success: false,
            output: String::new(),
            error: format!("Failed to spawn {}: {}", program, e),
        },
    }
}

/// Author/committer identity injected into engine-created commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitIdentity {
    pub name: String,
    pub email: String,
}

/// Runs git commands for the workflow engine.
#[derive(Debug, Clone)]
pub struct GitRunner {
    binary: String,
    identity: Option<GitIdentity>,
}

impl Default for GitRunner {
    fn default() -> Self {
        Self::new("git")
    }
}

impl GitRunner {
    pub fn new(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
            identity: None,
        }
    }

    pub fn with_identity(mut self, identity: Option<GitIdentity>) -> Self {
        self.identity = identity;
        self
    }

    pub async fn run(&self, args: &[&str], cwd: &Path) -> GitOutput {
        tracing::debug!(cwd = %cwd.display(), args = ?args, "git");
        let result = match &self.identity {
            Some(id) => {
                let envs = [
                    ("GIT_AUTHOR_NAME", id.name.as_str()),
                    ("GIT_AUTHOR_EMAIL", id.email.as_str()),
                    ("GIT_COMMITTER_NAME", id.name.as_str()),
                    ("GIT_COMMITTER_EMAIL", id.email.as_str()),
                ];
                run_command(&self.binary, args, cwd, &envs).await
            }
            None => run_command(&self.binary, args, cwd, &[]).await,
        };
        if !result.success {
            tracing::debug!(
                cwd = %cwd.display(),
                args = ?args,
                stderr = %result.error.trim(),
                "git command failed"
            );
        }
        result
    }

    /// `git rev-list --count HEAD`, or `None` when it cannot be read
    /// (unborn branch, broken repository).
    pub async fn commit_count(&self, cwd: &Path) -> Option<u64> {
        let out = self.run(&["rev-list", "--count", "HEAD"], cwd).await;
        if !out.success {
            return None;
        }
        out.first_line().parse().ok()
    }

    pub async fn head_hash(&self, cwd: &Path) -> Option<String> {
        let out = self.run(&["rev-parse", "HEAD"], cwd).await;
        if out.success && !out.first_line().is_empty() {
            Some(out.first_line().to_string())
        } else {
            None
        }
    }

    /// Paths reported by `git status --porcelain`, ignoring `exclude`.
    pub async fn dirty_paths(&self, cwd: &Path, exclude: &str) -> Vec<String> {
        let out = self.run(&["status", "--porcelain"], cwd).await;
        if !out.success {
            return Vec::new();
        }
        parse_porcelain(&out.output)
            .into_iter()
            .filter(|p| p != exclude)
            .collect()
    }
}

/// Extract paths from `git status --porcelain` v1 output. Renames report the
/// destination path.
pub fn parse_porcelain(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|l| l.len() > 3)
        .map(|l| {
            let path = &l[3..];
            let path = match path.split_once(" -> ") {
                Some((_, to)) => to,
                None => path,
            };
            path.trim_matches('"').to_string()
        })
        .collect()
}
