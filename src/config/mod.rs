use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::matcher::SearchSpec;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// GitLab instance base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Group (or full group path) whose projects are scanned.
    #[serde(default)]
    pub group: Option<String>,

    /// Name of the environment variable holding the API token. The token
    /// itself never lives in the config file.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Git ref to scan instead of each project's default branch.
    #[serde(default)]
    pub scan_ref: Option<String>,

    /// Maximum number of projects scanned at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Append results to this file.
    #[serde(default)]
    pub log_file: Option<String>,

    /// "text" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Project paths (globs) excluded from every scan.
    #[serde(default)]
    pub exclude_projects: Vec<String>,
}

fn default_base_url() -> String {
    "https://gitlab.com".to_string()
}

fn default_token_env() -> String {
    "GITLAB_TOKEN".to_string()
}

fn default_concurrency() -> usize {
    8
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            group: None,
            token_env: default_token_env(),
            scan_ref: None,
            concurrency: default_concurrency(),
            log_file: None,
            log_format: default_log_format(),
            exclude_projects: Vec::new(),
        }
    }
}

impl Config {
    /// Load config from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read {}", path.as_ref().display()))?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load config from the default locations
    pub fn load_default() -> Result<Self> {
        if let Ok(config) = Self::load(".forgescan.toml") {
            return Ok(config);
        }
        if let Ok(config) = Self::load("forgescan.toml") {
            return Ok(config);
        }
        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("forgescan").join("config.toml");
            if let Ok(config) = Self::load(&config_path) {
                return Ok(config);
            }
        }
        Ok(Self::default())
    }

    /// Token read from the configured environment variable, if set.
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env).ok().filter(|t| !t.is_empty())
    }

    /// Check if a project path is excluded from scans
    pub fn is_excluded(&self, project_path: &str) -> bool {
        self.exclude_projects.iter().any(|pattern| {
            glob::Pattern::new(pattern)
                .map(|p| p.matches(project_path))
                .unwrap_or(false)
        })
    }
}

/// One named search in a batch file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NamedSearch {
    pub name: String,
    #[serde(flatten)]
    pub spec: SearchSpec,
}

/// A batch of searches loaded from a YAML or JSON file. Every spec is
/// compiled before any project is scanned, so a bad pattern anywhere in
/// the batch aborts the run up front.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchBatch {
    pub searches: Vec<NamedSearch>,
}

impl SearchBatch {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;

        let batch: SearchBatch = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)
                .with_context(|| format!("invalid JSON batch file {}", path.display()))?,
            _ => serde_yaml::from_str(&content)
                .with_context(|| format!("invalid YAML batch file {}", path.display()))?,
        };

        if batch.searches.is_empty() {
            anyhow::bail!("batch file {} defines no searches", path.display());
        }
        Ok(batch)
    }
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = r#"# forgescan configuration file

# GitLab instance to scan
base-url = "https://gitlab.com"

# Group whose projects are scanned (full path, e.g. "platform/backend")
# group = "platform"

# Environment variable holding the API token
token-env = "GITLAB_TOKEN"

# Scan this ref instead of each project's default branch
# scan-ref = "main"

# How many projects are scanned at once
concurrency = 8

# Append results to a log file ("text" or "json" format)
# log-file = "forgescan.log"
log-format = "text"

# Project paths to skip (globs)
# exclude-projects = ["platform/archived-*", "*/sandbox"]
"#;

/// Example batch search file content
pub const EXAMPLE_BATCH: &str = r#"# forgescan batch search file
searches:
  - name: hardcoded-passwords
    term: "password\\s*="
    is-regex: true
    case-sensitive: false
    file-patterns: ["*.py", "*.ini", "*.env"]
    context-lines: 2

  - name: internal-hostnames
    term: "corp.example.com"
    case-sensitive: false
"#;
