//! Engine configuration
//!
//! Read-only: settings come from defaults, an optional YAML/JSON file and
//! `CLICKFLOW_*` environment variables, in that order. Nothing is written
//! back.

use crate::error::{Error, Result};
use crate::matcher::DEFAULT_CONFIDENCE;
use crate::registry::default_priority;
use crate::templates::TemplateStore;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_BACKENDS: &str = "CLICKFLOW_BACKENDS";
pub const ENV_PROJECTS_DIR: &str = "CLICKFLOW_PROJECTS_DIR";
pub const ENV_TEMPLATES_DIR: &str = "CLICKFLOW_TEMPLATES_DIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Backend names, most preferred first.
    pub backend_priority: Vec<String>,
    /// Root holding `<project>/classes/<class>/` template directories.
    pub projects_dir: PathBuf,
    /// A single classes directory; takes precedence over `projects_dir`.
    pub templates_dir: Option<PathBuf>,
    /// Match threshold for FindAndClick, 0..1.
    pub confidence: f32,
    /// Pause between FindAndClick probes.
    pub retry_interval_ms: u64,
    /// Upper bound on any sleep during a dry run.
    pub dry_run_delay_cap_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend_priority: default_priority(),
            projects_dir: PathBuf::from("projects"),
            templates_dir: None,
            confidence: DEFAULT_CONFIDENCE,
            retry_interval_ms: 500,
            dry_run_delay_cap_ms: 100,
        }
    }
}

impl EngineConfig {
    /// Load from a `.yaml`/`.yml` or `.json` file. Missing keys keep their
    /// defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = match extension(path).as_deref() {
            Some("json") => serde_json::from_str(&text)?,
            _ if text.trim().is_empty() => Self::default(),
            _ => serde_yaml::from_str(&text)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Overlay `CLICKFLOW_*` environment variables.
    pub fn from_env(mut self) -> Self {
        self.apply_env(|key| std::env::var(key).ok());
        self
    }

    fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(list) = get(ENV_BACKENDS) {
            let names = parse_list(&list);
            if !names.is_empty() {
                self.backend_priority = names;
            }
        }
        if let Some(dir) = get(ENV_PROJECTS_DIR).filter(|d| !d.is_empty()) {
            self.projects_dir = expand_home(&dir);
        }
        if let Some(dir) = get(ENV_TEMPLATES_DIR).filter(|d| !d.is_empty()) {
            self.templates_dir = Some(expand_home(&dir));
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(Error::invalid_workflow(format!(
                "confidence must be within 0..1, got {}",
                self.confidence
            )));
        }
        Ok(())
    }

    pub fn template_store(&self) -> TemplateStore {
        match &self.templates_dir {
            Some(dir) => TemplateStore::new(dir),
            None => TemplateStore::from_projects(&self.projects_dir),
        }
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn dry_run_delay_cap(&self) -> Duration {
        Duration::from_millis(self.dry_run_delay_cap_ms)
    }
}

/// `"a, b,,c"` -> `["a", "b", "c"]`
pub fn parse_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}
