//! External coding assistant invocation.
//!
//! The assistant edits files in a site's working tree and never commits; the
//! workflow engine commits afterwards, so one successful code-change request
//! is exactly one commit.

pub mod output;
pub mod pool;

pub use output::{ParsedOutput, parse_output};
pub use pool::{AssistantPool, SessionLease};

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::errors::AssistantError;
use crate::git::GitRunner;
use crate::site::files;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert web developer editing a small static \
landing page made of HTML, CSS and JavaScript files. Make the smallest change that fulfils the \
request, keep the existing structure and style, and do not add build tooling or frameworks. \
Finish with one or two plain sentences describing what you changed, written for a \
non-technical site owner.";

/// One code-change instruction for a site.
#[derive(Debug, Clone)]
pub struct AssistantRequest {
    pub site_id: String,
    pub working_dir: PathBuf,
    pub instruction: String,
    /// Editable files relative to the edit target. Discovered when empty.
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantResult {
    pub summary: String,
    /// Working-tree paths that became dirty during the run.
    pub changed_files: Vec<String>,
    pub raw_output: String,
}

#[async_trait]
pub trait CodingAssistant: Send + Sync {
    /// Run one instruction to completion, or until `cancel` fires.
    async fn run(
        &self,
        request: &AssistantRequest,
        cancel: CancellationToken,
    ) -> Result<AssistantResult, AssistantError>;
}

/// How to launch Aider.
#[derive(Debug, Clone)]
pub struct AiderSettings {
    pub command: String,
    pub model: String,
    pub timeout: Duration,
    pub extra_args: Vec<String>,
    pub system_prompt: String,
}

impl Default for AiderSettings {
    fn default() -> Self {
        Self {
            command: "aider".to_string(),
            model: "gpt-5".to_string(),
            timeout: Duration::from_secs(600),
            extra_args: Vec::new(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// Runs Aider as a one-shot subprocess per instruction.
pub struct AiderAssistant {
    settings: AiderSettings,
    git: GitRunner,
    undo_marker: String,
}

impl AiderAssistant {
    pub fn new(settings: AiderSettings, git: GitRunner, undo_marker: &str) -> Self {
        Self {
            settings,
            git,
            undo_marker: undo_marker.to_string(),
        }
    }

    pub fn settings(&self) -> &AiderSettings {
        &self.settings
    }

    /// Full argument vector for one run.
    pub fn build_args(&self, instruction: &str, files: &[PathBuf]) -> Vec<String> {
        let message = format!("System: {}\n\nUser: {}", self.settings.system_prompt, instruction);
        let mut args = vec![
            "--model".to_string(),
            self.settings.model.clone(),
            "--message".to_string(),
            message,
            "--yes".to_string(),
            "--no-pretty".to_string(),
            "--no-detect-urls".to_string(),
            "--no-git".to_string(),
        ];
        for file in files {
            args.push("--file".to_string());
            args.push(file.to_string_lossy().to_string());
        }
        args.extend(self.settings.extra_args.iter().cloned());
        args
    }

    fn timeout_minutes(&self) -> u64 {
        self.settings.timeout.as_secs().div_ceil(60).max(1)
    }

    async fn spawn_and_wait(
        &self,
        edit_dir: &Path,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<std::process::Output, AssistantError> {
        let child = Command::new(&self.settings.command)
            .args(args)
            .current_dir(edit_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| AssistantError::SpawnFailed {
                command: self.settings.command.clone(),
                source,
            })?;

        // Dropping the wait future drops the child, which kills it.
        tokio::select! {
            result = child.wait_with_output() => {
                result.map_err(|source| AssistantError::SpawnFailed {
                    command: self.settings.command.clone(),
                    source,
                })
            }
            _ = tokio::time::sleep(self.settings.timeout) => {
                Err(AssistantError::Timeout { minutes: self.timeout_minutes() })
            }
            _ = cancel.cancelled() => Err(AssistantError::Cancelled),
        }
    }
}

#[async_trait]
impl CodingAssistant for AiderAssistant {
    async fn run(
        &self,
        request: &AssistantRequest,
        cancel: CancellationToken,
    ) -> Result<AssistantResult, AssistantError> {
        let edit_dir = files::edit_target(&request.working_dir);
        let file_list = if request.files.is_empty() {
            files::find_web_files(&edit_dir)
        } else {
            request.files.clone()
        };
        if file_list.is_empty() {
            return Err(AssistantError::NoEditableFiles(edit_dir));
        }

        let before: HashSet<String> = self
            .git
            .dirty_paths(&request.working_dir, &self.undo_marker)
            .await
            .into_iter()
            .collect();

        let args = self.build_args(&request.instruction, &file_list);
        tracing::info!(
            site_id = %request.site_id,
            command = %self.settings.command,
            files = file_list.len(),
            "running coding assistant"
        );
        let started = std::time::Instant::now();
        let output = self.spawn_and_wait(&edit_dir, &args, &cancel).await?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(AssistantError::NonZeroExit {
                code: output.status.code(),
                stderr: if stderr.is_empty() { stdout.trim().to_string() } else { stderr },
            });
        }

        let parsed = parse_output(&stdout);
        if let Some(err) = parsed.reported_error {
            return Err(AssistantError::Reported(err));
        }

        let changed_files: Vec<String> = self
            .git
            .dirty_paths(&request.working_dir, &self.undo_marker)
            .await
            .into_iter()
            .filter(|p| !before.contains(p))
            .collect();

        tracing::info!(
            site_id = %request.site_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            changed = changed_files.len(),
            "coding assistant finished"
        );
        Ok(AssistantResult {
            summary: parsed.user_output,
            changed_files,
            raw_output: stdout,
        })
    }
}
