//! Model cache directory layout and checkpoint accounting.

use std::{
    fs,
    path::{Component, Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use walkdir::WalkDir;

/// Suffix of files still being downloaded.
pub const PARTIAL_SUFFIX: &str = "part";

#[derive(Debug, Clone)]
pub struct ModelCache {
    root: PathBuf,
}

impl ModelCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[cfg(test)]
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("creating model cache: {}", self.root.display()))
    }

    /// `<root>/<owner>/<name>/<file>`; rejects anything that would escape the root.
    pub fn file_path(&self, repo: &str, file: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for part in [repo, file] {
            let rel = Path::new(part);
            let safe = rel.components().all(|c| matches!(c, Component::Normal(_)));
            if part.is_empty() || !safe {
                bail!("refusing unsafe cache path component: {part:?}");
            }
            path.push(rel);
        }
        Ok(path)
    }

    pub fn contains(&self, repo: &str, file: &str) -> bool {
        self.file_path(repo, file).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Files under the root (recursively) whose extension is one of `extensions`.
    pub fn checkpoint_count(&self, extensions: &[String]) -> usize {
        if !self.root.exists() {
            return 0;
        }
        WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.path()
                    .extension()
                    .and_then(|x| x.to_str())
                    .map(|x| extensions.iter().any(|want| want.eq_ignore_ascii_case(x)))
                    .unwrap_or(false)
            })
            .count()
    }
}
