use serde::Serialize;

/// What a failed git command's output means to the workflow engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GitErrorKind {
    /// "nothing to commit": treated as a successful no-op by commit.
    NothingToCommit,
    /// The configured remote repository does not exist or is unreachable as a repo.
    RemoteNotFound,
    /// A revision (typically the redo target) no longer resolves.
    UnknownRevision,
    /// The local directory is not a git working tree.
    NotARepository,
    /// Any other `fatal:` failure.
    Fatal,
    /// Unrecognised failure output.
    Other,
}

/// Classify raw git output (stderr and/or stdout).
///
/// More specific patterns are checked before the generic `fatal:` prefix,
/// since most of them are themselves reported as `fatal: ...`.
pub fn classify_git_error(raw: &str) -> GitErrorKind {
    if raw.contains("nothing to commit") || raw.contains("nothing added to commit") {
        GitErrorKind::NothingToCommit
    } else if raw.contains("Repository not found")
        || raw.contains("does not appear to be a git repository")
    {
        GitErrorKind::RemoteNotFound
    } else if raw.contains("unknown revision or path not in the working tree")
        || raw.contains("Could not parse object")
        || raw.contains("as a valid revision")
    {
        GitErrorKind::UnknownRevision
    } else if raw.contains("not a git repository") {
        GitErrorKind::NotARepository
    } else if raw.contains("fatal:") {
        GitErrorKind::Fatal
    } else {
        GitErrorKind::Other
    }
}

impl GitErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NothingToCommit => "nothing_to_commit",
            Self::RemoteNotFound => "remote_not_found",
            Self::UnknownRevision => "unknown_revision",
            Self::NotARepository => "not_a_repository",
            Self::Fatal => "fatal",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for GitErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
