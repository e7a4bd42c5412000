//! Package installation through `uv pip` and project dependency sync.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::{toolchain::Toolchain, venv::RuntimeEnv};
use crate::{
    manifest::PackageSpec,
    process::{CommandRunner, Invocation},
};

pub const PROJECT_MANIFEST: &str = "pyproject.toml";
pub const REQUIREMENTS_FILE: &str = "requirements.txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncSource {
    /// `pyproject.toml`: lock-aware `uv sync`.
    Project(PathBuf),
    /// `requirements.txt`: plain `uv pip install -r`.
    Requirements(PathBuf),
}

pub fn detect_sync_source(project_dir: &Path) -> Option<SyncSource> {
    let manifest = project_dir.join(PROJECT_MANIFEST);
    if manifest.is_file() {
        return Some(SyncSource::Project(manifest));
    }
    let requirements = project_dir.join(REQUIREMENTS_FILE);
    if requirements.is_file() {
        return Some(SyncSource::Requirements(requirements));
    }
    None
}

pub fn sync_invocation(
    source: &SyncSource,
    project_dir: &Path,
    toolchain: &Toolchain,
    env: &RuntimeEnv,
) -> Result<Invocation> {
    let inv = match source {
        SyncSource::Project(_) => {
            // uv resolves a relative project environment against the project root
            let venv = std::path::absolute(&env.root)
                .with_context(|| format!("resolving {}", env.root.display()))?;
            toolchain
                .uv()
                .arg("sync")
                .env("UV_PROJECT_ENVIRONMENT", venv)
                .current_dir(project_dir)
        }
        SyncSource::Requirements(path) => toolchain
            .uv()
            .args(["pip", "install", "--python"])
            .path_arg(&env.python)
            .arg("-r")
            .path_arg(path),
    };
    Ok(inv)
}

pub async fn sync_project(
    source: &SyncSource,
    project_dir: &Path,
    toolchain: &Toolchain,
    env: &RuntimeEnv,
    runner: &dyn CommandRunner,
) -> Result<()> {
    let inv = sync_invocation(source, project_dir, toolchain, env)?;
    runner.run(&inv).await.context("syncing project dependencies")
}

pub fn install_invocation(toolchain: &Toolchain, env: &RuntimeEnv, specs: &[PackageSpec]) -> Invocation {
    toolchain
        .uv()
        .args(["pip", "install", "--python"])
        .path_arg(&env.python)
        .args(specs.iter().map(PackageSpec::requirement))
}

pub async fn install(
    toolchain: &Toolchain,
    env: &RuntimeEnv,
    runner: &dyn CommandRunner,
    specs: &[PackageSpec],
) -> Result<()> {
    if specs.is_empty() {
        return Ok(());
    }
    let inv = install_invocation(toolchain, env, specs);
    runner.run(&inv).await
}
