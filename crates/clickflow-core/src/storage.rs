//! Workflow storage - one YAML (or JSON) document per workflow

use crate::error::{Error, Result};
use crate::workflow::Workflow;
use std::fs;
use std::path::{Path, PathBuf};

pub struct WorkflowStorage {
    dir: PathBuf,
}

impl WorkflowStorage {
    /// Storage over `dir` without touching the filesystem. The directory is
    /// created on the first save.
    pub fn open(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn with_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Storage for a project directory: workflows live in `<project>/workflows`.
    pub fn for_project(project_dir: impl AsRef<Path>) -> Result<Self> {
        Self::with_dir(project_dir.as_ref().join("workflows"))
    }

    /// Save as `<name>.yaml`, overwriting any previous version.
    pub fn save(&self, workflow: &Workflow) -> Result<PathBuf> {
        workflow.validate()?;
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{}.yaml", sanitize(&workflow.name)));
        fs::write(&path, workflow.to_yaml()?)?;
        tracing::debug!(path = %path.display(), steps = workflow.len(), "saved workflow");
        Ok(path)
    }

    /// Load by file name (relative to the storage dir) or by path.
    pub fn load(&self, file: impl AsRef<Path>) -> Result<Workflow> {
        let path = self.resolve(file.as_ref());
        load_file(&path)
    }

    /// Every loadable workflow in the directory, sorted by path. Files that
    /// fail to parse are skipped; a missing directory lists nothing.
    pub fn list(&self) -> Result<Vec<(PathBuf, Workflow)>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_file() && is_workflow_file(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        Ok(paths
            .into_iter()
            .filter_map(|path| match load_file(&path) {
                Ok(wf) => Some((path, wf)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable workflow");
                    None
                }
            })
            .collect())
    }

    pub fn delete(&self, file: impl AsRef<Path>) -> Result<()> {
        fs::remove_file(self.resolve(file.as_ref()))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn resolve(&self, file: &Path) -> PathBuf {
        if file.is_absolute() || file.components().count() > 1 {
            file.to_path_buf()
        } else {
            self.dir.join(file)
        }
    }
}

/// Read a workflow document, choosing the format by extension.
pub fn load_file(path: impl AsRef<Path>) -> Result<Workflow> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .map_err(|e| Error::from(e).with_context(serde_json::json!({ "path": path.display().to_string() })))?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if is_json {
        Workflow::from_json(&text)
    } else {
        Workflow::from_yaml(&text)
    }
}

fn is_workflow_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(|e| e.to_lowercase()).as_deref(),
        Some("yaml" | "yml" | "json")
    )
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
