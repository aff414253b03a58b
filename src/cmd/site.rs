//! One-shot workflow operations on a single site.

use anyhow::{Context, Result};
use sitesmith::config::Config;
use sitesmith::workflow::{OperationOutcome, SiteWorkflow};

pub enum SiteOp {
    Commit(String),
    Undo,
    Redo,
    Publish,
    StartOver,
}

/// Print the outcome as JSON on stdout. Returns whether it succeeded.
pub async fn cmd_site(config: &Config, op: SiteOp, site_id: &str) -> Result<bool> {
    let workflow = SiteWorkflow::new(
        config.git.runner(),
        config.site_resolver(),
        config.workflow_settings(),
    );

    let outcome: OperationOutcome = match op {
        SiteOp::Commit(message) => workflow.apply_and_commit(site_id, &message).await,
        SiteOp::Undo => workflow.undo_last_commit(site_id).await,
        SiteOp::Redo => workflow.redo_last_commit(site_id).await,
        SiteOp::Publish => workflow.publish(site_id).await,
        SiteOp::StartOver => workflow.start_over(site_id).await,
    };

    let json = serde_json::to_string_pretty(&outcome).context("Failed to serialize outcome")?;
    println!("{}", json);
    Ok(outcome.success)
}
