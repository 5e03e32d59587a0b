//! Template lookup by class name
//!
//! Templates live on disk as `<root>/<class>/<image>`. A store can search
//! several roots; the first root holding a directory for the class wins.
//! A projects root is listed again on every lookup, so projects added while
//! the engine is alive are picked up.

use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    projects: Option<PathBuf>,
    roots: Vec<PathBuf>,
}

impl TemplateStore {
    /// Store over a single classes directory.
    pub fn new(classes_dir: impl AsRef<Path>) -> Self {
        Self {
            projects: None,
            roots: vec![classes_dir.as_ref().to_path_buf()],
        }
    }

    /// Store over every `<projects>/<project>/classes` directory, in name
    /// order. A missing projects root contributes nothing.
    pub fn from_projects(projects_root: impl AsRef<Path>) -> Self {
        Self {
            projects: Some(projects_root.as_ref().to_path_buf()),
            roots: Vec::new(),
        }
    }

    /// Extra root searched after the projects.
    pub fn with_root(mut self, root: impl AsRef<Path>) -> Self {
        self.roots.push(root.as_ref().to_path_buf());
        self
    }

    /// Roots as of now: project class dirs first, then explicit roots.
    pub fn roots(&self) -> Vec<PathBuf> {
        let mut roots = match &self.projects {
            Some(projects) => project_class_dirs(projects),
            None => Vec::new(),
        };
        roots.extend(self.roots.iter().cloned());
        roots
    }

    /// First image for `class`, by file name.
    ///
    /// Fails with `TemplateNotFound`, distinguishing a class with no
    /// directory from a directory with no images.
    pub fn resolve(&self, class: &str) -> Result<PathBuf> {
        if class.is_empty() || class.contains(|c: char| c == '/' || c == '\\') || class == ".." {
            return Err(Error::template_dir_missing(class));
        }

        let roots = self.roots();
        let mut saw_dir = false;
        for root in &roots {
            let dir = root.join(class);
            if !dir.is_dir() {
                continue;
            }
            saw_dir = true;
            if let Some(image) = first_image(&dir)? {
                tracing::debug!(class, template = %image.display(), "resolved template");
                return Ok(image);
            }
        }

        if saw_dir {
            Err(Error::template_dir_empty(class))
        } else {
            Err(Error::template_dir_missing(class).with_context(serde_json::json!({
                "searched": roots.iter().map(|r| r.display().to_string()).collect::<Vec<_>>(),
            })))
        }
    }

    /// Class names present under any root, sorted and deduplicated.
    pub fn classes(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .roots()
            .iter()
            .filter_map(|root| fs::read_dir(root).ok())
            .flat_map(|entries| entries.filter_map(|e| e.ok()))
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

fn project_class_dirs(projects: &Path) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(projects)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .map(|p| p.join("classes"))
                .collect()
        })
        .unwrap_or_default();
    dirs.sort();
    dirs
}

fn is_image(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
            .unwrap_or(false)
}

fn first_image(dir: &Path) -> Result<Option<PathBuf>> {
    let mut images = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if is_image(&path) {
            images.push(path);
        }
    }
    images.sort();
    Ok(images.into_iter().next())
}
