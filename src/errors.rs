//! Typed error hierarchy for sitesmith.
//!
//! - `WorkflowError`: git-backed site operations (commit, undo, redo,
//!   publish, start-over)
//! - `AssistantError`: external coding assistant invocation
//! - `ChatError`: chat request handling and history storage
//!
//! LLM client errors live next to the client in `llm::types::LlmError`.

use std::path::PathBuf;

use thiserror::Error;

use crate::git::GitErrorKind;

/// Errors from the site workflow engine.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Invalid site id '{0}'")]
    InvalidSiteId(String),

    #[error("Site directory {} does not exist", .0.display())]
    DirectoryMissing(PathBuf),

    #[error("Site directory {} is not a git repository", .0.display())]
    NotARepository(PathBuf),

    #[error("No changes to undo")]
    NothingToUndo,

    #[error("No changes to restore")]
    NothingToRedo,

    #[error("git {step} failed ({kind}): {stderr}")]
    Git {
        step: &'static str,
        kind: GitErrorKind,
        stderr: String,
    },

    #[error("Commit created but its hash could not be parsed from: {0}")]
    CommitHashUnparseable(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl WorkflowError {
    /// Domain-level errors that are returned immediately to the user and are
    /// not failures of the system.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::InvalidSiteId(_)
                | Self::DirectoryMissing(_)
                | Self::NotARepository(_)
                | Self::NothingToUndo
                | Self::NothingToRedo
        )
    }

    pub fn git_kind(&self) -> Option<GitErrorKind> {
        match self {
            Self::Git { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Errors from running the external coding assistant.
#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("Failed to spawn coding assistant '{command}': {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Coding assistant exited with code {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },

    #[error("process timed out after {minutes} minutes")]
    Timeout { minutes: u64 },

    #[error("Coding assistant run was cancelled")]
    Cancelled,

    #[error("No HTML, JS, or CSS files found in {}", .0.display())]
    NoEditableFiles(PathBuf),

    #[error("Coding assistant reported failure: {0}")]
    Reported(String),
}

impl AssistantError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Errors from the chat request handler.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Message must not be empty")]
    EmptyMessage,

    #[error(transparent)]
    Site(#[from] WorkflowError),

    #[error("Chat history store error: {0}")]
    Store(#[source] anyhow::Error),
}

impl ChatError {
    pub fn is_bad_request(&self) -> bool {
        match self {
            Self::EmptyMessage => true,
            Self::Site(e) => e.is_precondition(),
            Self::Store(_) => false,
        }
    }
}
