//! Configuration for sitesmith, read from `sitesmith.toml`.
//!
//! Layered: file → environment → CLI flags. A missing file means defaults.
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 3141
//! data_dir = ".sitesmith"
//!
//! [sites]
//! root = "sites"
//! remote = "origin"
//! branch = "main"
//!
//! [sites.overrides]
//! keaara = "/srv/keaara/site"
//!
//! [assistant]
//! command = "aider"
//! model = "gpt-5"
//! timeout_secs = 600
//!
//! [llm]
//! model = "gpt-4o"
//! api_key_env = "OPENAI_API_KEY"
//!
//! [git]
//! author_name = "Sitesmith"
//! author_email = "bot@example.com"
//!
//! [logging]
//! json = false
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::assistant::{AiderSettings, DEFAULT_SYSTEM_PROMPT};
use crate::git::{GitIdentity, GitRunner};
use crate::llm::openai::DEFAULT_OPENAI_BASE_URL;
use crate::site::SiteResolver;
use crate::workflow::{DEFAULT_UNDO_MARKER, WorkflowSettings};

pub const DEFAULT_CONFIG_FILE: &str = "sitesmith.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Chat history and other server-owned state.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub cors_permissive: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3141
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".sitesmith")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            cors_permissive: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SitesConfig {
    /// Directory containing one git working tree per site id.
    #[serde(default = "default_sites_root")]
    pub root: PathBuf,
    #[serde(default = "default_remote")]
    pub remote: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_undo_marker")]
    pub undo_marker: String,
    /// Site id → explicit working directory.
    #[serde(default)]
    pub overrides: HashMap<String, PathBuf>,
}

fn default_sites_root() -> PathBuf {
    PathBuf::from("sites")
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_undo_marker() -> String {
    DEFAULT_UNDO_MARKER.to_string()
}

impl Default for SitesConfig {
    fn default() -> Self {
        Self {
            root: default_sites_root(),
            remote: default_remote(),
            branch: default_branch(),
            undo_marker: default_undo_marker(),
            overrides: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    #[serde(default = "default_assistant_command")]
    pub command: String,
    #[serde(default = "default_assistant_model")]
    pub model: String,
    /// Hard wall-clock cap on one assistant run.
    #[serde(default = "default_assistant_timeout")]
    pub timeout_secs: u64,
    /// Sessions unused for this long are evicted.
    #[serde(default = "default_idle_secs")]
    pub idle_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

fn default_assistant_command() -> String {
    "aider".to_string()
}

fn default_assistant_model() -> String {
    "gpt-5".to_string()
}

fn default_assistant_timeout() -> u64 {
    600
}

fn default_idle_secs() -> u64 {
    1800
}

fn default_sweep_interval() -> u64 {
    300
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            command: default_assistant_command(),
            model: default_assistant_model(),
            timeout_secs: default_assistant_timeout(),
            idle_secs: default_idle_secs(),
            sweep_interval_secs: default_sweep_interval(),
            extra_args: Vec::new(),
            system_prompt: None,
        }
    }
}

impl AssistantConfig {
    pub fn aider_settings(&self) -> AiderSettings {
        AiderSettings {
            command: self.command.clone(),
            model: self.model.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            extra_args: self.extra_args.clone(),
            system_prompt: self
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Number of recent chat messages given to the router.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Cap on site file content included in the router prompt.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

fn default_llm_base_url() -> String {
    DEFAULT_OPENAI_BASE_URL.to_string()
}

fn default_llm_model() -> String {
    "gpt-4o".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_request_timeout() -> u64 {
    120
}

fn default_history_limit() -> usize {
    10
}

fn default_max_context_chars() -> usize {
    60_000
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            api_key_env: default_api_key_env(),
            request_timeout_secs: default_request_timeout(),
            history_limit: default_history_limit(),
            max_context_chars: default_max_context_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    #[serde(default = "default_git_binary")]
    pub binary: String,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub author_email: Option<String>,
}

fn default_git_binary() -> String {
    "git".to_string()
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            binary: default_git_binary(),
            author_name: None,
            author_email: None,
        }
    }
}

impl GitConfig {
    pub fn runner(&self) -> GitRunner {
        let identity = match (&self.author_name, &self.author_email) {
            (Some(name), Some(email)) => Some(GitIdentity {
                name: name.clone(),
                email: email.clone(),
            }),
            _ => None,
        };
        GitRunner::new(&self.binary).with_identity(identity)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub json: bool,
    /// Daily-rolling log files are written here when set.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// Root of `sitesmith.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sites: SitesConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub git: GitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse sitesmith.toml")
    }

    /// Defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.to_toml()?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize sitesmith.toml")
    }

    /// Apply `SITESMITH_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(root) = lookup("SITESMITH_SITES_ROOT") {
            self.sites.root = PathBuf::from(root);
        }
        if let Some(port) = lookup("SITESMITH_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid SITESMITH_PORT '{}'", port))?;
        }
        if let Some(cmd) = lookup("SITESMITH_ASSISTANT_CMD") {
            self.assistant.command = cmd;
        }
        if let Some(model) = lookup("SITESMITH_LLM_MODEL") {
            self.llm.model = model;
        }
        Ok(())
    }

    pub fn workflow_settings(&self) -> WorkflowSettings {
        WorkflowSettings {
            remote: self.sites.remote.clone(),
            branch: self.sites.branch.clone(),
            undo_marker: self.sites.undo_marker.clone(),
        }
    }

    pub fn site_resolver(&self) -> SiteResolver {
        SiteResolver::new(&self.sites.root).with_overrides(self.sites.overrides.clone())
    }

    /// Human-readable problems that do not prevent startup.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.assistant.timeout_secs == 0 {
            warnings.push("assistant.timeout_secs is 0: every assistant run will time out".to_string());
        }
        if self.assistant.sweep_interval_secs == 0 {
            warnings.push("assistant.sweep_interval_secs must be greater than 0".to_string());
        }
        if self.assistant.idle_secs < self.assistant.sweep_interval_secs {
            warnings.push(format!(
                "assistant.idle_secs ({}) is shorter than sweep_interval_secs ({})",
                self.assistant.idle_secs, self.assistant.sweep_interval_secs
            ));
        }
        if self.llm.request_timeout_secs == 0 {
            warnings.push("llm.request_timeout_secs is 0".to_string());
        }
        if self.git.author_name.is_some() != self.git.author_email.is_some() {
            warnings.push(
                "git.author_name and git.author_email must be set together; ignoring both"
                    .to_string(),
            );
        }
        if self.sites.undo_marker.contains('/') || self.sites.undo_marker.is_empty() {
            warnings.push(format!(
                "sites.undo_marker '{}' should be a plain file name",
                self.sites.undo_marker
            ));
        }
        let mut ids: Vec<&String> = self.sites.overrides.keys().collect();
        ids.sort();
        for id in ids {
            let path = &self.sites.overrides[id];
            if path.is_relative() {
                warnings.push(format!(
                    "Override for site '{}' uses a relative path: {}",
                    id,
                    path.display()
                ));
            }
            if crate::site::validate_site_id(id).is_err() {
                warnings.push(format!("Override key '{}' is not a valid site id", id));
            }
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.server.port, 3141);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.sites.remote, "origin");
        assert_eq!(config.sites.branch, "main");
        assert_eq!(config.sites.undo_marker, ".undo-commit");
        assert_eq!(config.assistant.command, "aider");
        assert_eq!(config.assistant.timeout_secs, 600);
        assert_eq!(config.llm.history_limit, 10);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::parse(
            r#"
[server]
port = 8080

[sites]
root = "/srv/sites"

[sites.overrides]
keaara = "/opt/keaara"

[assistant]
timeout_secs = 900
extra_args = ["--no-stream"]
"#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.sites.root, PathBuf::from("/srv/sites"));
        assert_eq!(
            config.site_resolver().resolve("keaara").unwrap().working_dir,
            PathBuf::from("/opt/keaara")
        );
        let aider = config.assistant.aider_settings();
        assert_eq!(aider.timeout, Duration::from_secs(900));
        assert_eq!(aider.extra_args, vec!["--no-stream"]);
        assert_eq!(aider.system_prompt, DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(Config::parse("[server\nport = ").is_err());
        assert!(Config::parse("[server]\nport = \"not a number\"").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(|key| match key {
                "SITESMITH_SITES_ROOT" => Some("/data/sites".to_string()),
                "SITESMITH_PORT" => Some("9000".to_string()),
                "SITESMITH_LLM_MODEL" => Some("gpt-4o-mini".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.sites.root, PathBuf::from("/data/sites"));
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.assistant.command, "aider");
    }

    #[test]
    fn test_env_override_bad_port() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(|key| (key == "SITESMITH_PORT").then(|| "abc".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("SITESMITH_PORT"));
    }

    #[test]
    fn test_validate_warnings() {
        let mut config = Config::default();
        config.assistant.idle_secs = 60;
        config.git.author_name = Some("Bot".into());
        config
            .sites
            .overrides
            .insert("rel".into(), PathBuf::from("relative/dir"));
        let warnings = config.validate();
        assert_eq!(warnings.len(), 3, "{warnings:?}");
        assert!(warnings.iter().any(|w| w.contains("idle_secs")));
        assert!(warnings.iter().any(|w| w.contains("author_email")));
        assert!(warnings.iter().any(|w| w.contains("relative path")));
    }

    #[test]
    fn test_git_identity_requires_both_fields() {
        let mut git = GitConfig::default();
        git.author_name = Some("Bot".into());
        assert_eq!(format!("{:?}", git.runner()), format!("{:?}", GitRunner::new("git")));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        let mut config = Config::default();
        config.server.port = 4000;
        config.save(&path).unwrap();
        let loaded = Config::load_or_default(&path).unwrap();
        assert_eq!(loaded.server.port, 4000);
        let missing = Config::load_or_default(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(missing.server.port, 3141);
    }
}
