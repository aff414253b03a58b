//! Turning coding-assistant stdout into a user-facing summary.
//!
//! Two shapes are accepted:
//! 1. A JSON report (`{"userOutput": ..., "fileChanged": ...}`), as emitted by
//!    wrapper scripts around the assistant.
//! 2. A raw Aider transcript, from which the startup banner and the token
//!    accounting footer are stripped.

use serde::Deserialize;

use crate::util::extract_json_object;

pub const DEFAULT_REPLY: &str = "Hello! How can I help you with your landing page today?";

const BANNER_PREFIXES: &[&str] = &[
    "Aider v",
    "Main model:",
    "Weak model:",
    "Git repo:",
    "Repo-map:",
    "─",
];

/// What the assistant said it did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedOutput {
    pub user_output: String,
    /// Failure reported inside an otherwise successful (exit 0) run.
    pub reported_error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunnerReport {
    user_output: Option<String>,
    file_changed: Option<bool>,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    error: Option<String>,
}

pub fn parse_output(stdout: &str) -> ParsedOutput {
    if let Some(report) = parse_report(stdout) {
        let reported_error = match report.success {
            Some(false) => Some(
                report
                    .error
                    .unwrap_or_else(|| "assistant reported failure".to_string()),
            ),
            _ => None,
        };
        let user_output = report
            .user_output
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REPLY.to_string());
        return ParsedOutput {
            user_output,
            reported_error,
        };
    }

    ParsedOutput {
        user_output: clean_transcript(stdout),
        reported_error: None,
    }
}

fn parse_report(stdout: &str) -> Option<RunnerReport> {
    let json = extract_json_object(stdout)?;
    let report: RunnerReport = serde_json::from_str(json).ok()?;
    // Any JSON object that happens to appear in a transcript is not a report.
    if report.user_output.is_none() && report.file_changed.is_none() {
        return None;
    }
    Some(report)
}

/// Strip Aider's banner lines and everything from the `Tokens:` footer on.
pub fn clean_transcript(raw: &str) -> String {
    let mut kept = Vec::new();
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("Tokens:") {
            break;
        }
        if trimmed.is_empty()
            || (trimmed.starts_with("Added ") && trimmed.ends_with(" to the chat."))
            || BANNER_PREFIXES.iter().any(|p| line.starts_with(p))
        {
            continue;
        }
        kept.push(trimmed);
    }
    let text = kept.join("\n");
    if text.is_empty() {
        DEFAULT_REPLY.to_string()
    } else {
        text
    }
}
