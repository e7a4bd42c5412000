//! Declarative package and model tables.
//!
//! The default table is compiled in from `default.toml`; `MANIFEST_PATH` can
//! point at a replacement with the same layout.

use std::{
    fmt, fs,
    path::{Component, Path},
};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

const DEFAULT_MANIFEST: &str = include_str!("default.toml");

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    Exact(String),
    AtLeast(String),
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Exact(v) => write!(f, "=={v}"),
            Constraint::AtLeast(v) => write!(f, ">={v}"),
        }
    }
}

/// One entry of an install set. Renders as a requirement string, e.g.
/// `mlkit-extensions[all]==1.2.0`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawPackage")]
pub struct PackageSpec {
    pub name: String,
    pub extras: Vec<String>,
    pub constraint: Option<Constraint>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPackage {
    name: String,
    #[serde(default)]
    extras: Vec<String>,
    min_version: Option<String>,
    version: Option<String>,
}

impl TryFrom<RawPackage> for PackageSpec {
    type Error = String;

    fn try_from(raw: RawPackage) -> std::result::Result<Self, Self::Error> {
        if raw.name.trim().is_empty() {
            return Err("package name must not be empty".into());
        }
        let constraint = match (raw.version, raw.min_version) {
            (Some(_), Some(_)) => {
                return Err(format!(
                    "package {}: set either version or min_version, not both",
                    raw.name
                ))
            }
            (Some(v), None) => Some(Constraint::Exact(v)),
            (None, Some(v)) => Some(Constraint::AtLeast(v)),
            (None, None) => None,
        };
        Ok(Self { name: raw.name, extras: raw.extras, constraint })
    }
}

impl PackageSpec {
    /// Same package, pinned to `version` exactly when one is given.
    pub fn pinned(&self, version: Option<&str>) -> Self {
        let mut spec = self.clone();
        if let Some(v) = version {
            spec.constraint = Some(Constraint::Exact(v.to_string()));
        }
        spec
    }

    pub fn requirement(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.extras.is_empty() {
            write!(f, "[{}]", self.extras.join(","))?;
        }
        if let Some(c) = &self.constraint {
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

/// `owner/name`, both plain path segments.
fn is_repo_id(repo: &str) -> bool {
    let mut parts = repo.split('/');
    let (Some(owner), Some(name), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    [owner, name].iter().all(|seg| {
        let mut comps = Path::new(seg).components();
        matches!(comps.next(), Some(Component::Normal(_))) && comps.next().is_none()
    })
}

fn default_revision() -> String {
    "main".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelEntry {
    pub repo: String,
    #[serde(default = "default_revision")]
    pub revision: String,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub toolkit: String,
    pub checkpoint_extensions: Vec<String>,
    pub core: PackageSpec,
    pub auxiliary: PackageSpec,
    pub extensions: PackageSpec,
    #[serde(default)]
    pub dev: Vec<PackageSpec>,
    #[serde(default)]
    pub models: Vec<ModelEntry>,
}

impl Manifest {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => {
                let text = fs::read_to_string(p)
                    .with_context(|| format!("reading manifest: {}", p.display()))?;
                Self::parse(&text).with_context(|| format!("parsing manifest: {}", p.display()))
            }
            None => Self::embedded(),
        }
    }

    pub fn embedded() -> Result<Self> {
        Self::parse(DEFAULT_MANIFEST).context("parsing built-in manifest")
    }

    pub fn parse(text: &str) -> Result<Self> {
        let manifest: Manifest = toml::from_str(text)?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<()> {
        if self.checkpoint_extensions.is_empty() {
            bail!("checkpoint_extensions must list at least one extension");
        }
        for m in &self.models {
            if m.files.is_empty() {
                bail!("model {} lists no files", m.repo);
            }
            if !is_repo_id(&m.repo) {
                bail!("model repo must look like owner/name, got {:?}", m.repo);
            }
        }
        Ok(())
    }

    /// Core package (pinned when requested) followed by the auxiliary package.
    pub fn core_install_set(&self, pin: Option<&str>) -> Vec<PackageSpec> {
        vec![self.core.pinned(pin), self.auxiliary.clone()]
    }

    pub fn extensions_install_set(&self, pin: Option<&str>) -> Vec<PackageSpec> {
        vec![self.extensions.pinned(pin)]
    }

    pub fn dev_install_set(&self) -> Vec<PackageSpec> {
        self.dev.clone()
    }

    pub fn model_file_count(&self) -> usize {
        self.models.iter().map(|m| m.files.len()).sum()
    }
}
