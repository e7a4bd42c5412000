use std::{
    collections::HashMap,
    env,
    ffi::OsString,
    fs,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use directories::BaseDirs;

use crate::utils::{is_truthy, non_empty};

pub const DEFAULT_HUB_ENDPOINT: &str = "https://huggingface.co";

/// Raw layered configuration: built-in defaults, then the rc file, then the
/// process environment.
#[derive(Debug, Clone)]
pub struct Config {
    inner: HashMap<String, String>,
    pub config_path: PathBuf,
}

impl Config {
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut map = default_map();
        let explicit = config_path.is_some();
        let config_path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(default_config_path);

        if config_path.exists() {
            let file = fs::File::open(&config_path)
                .with_context(|| format!("reading config file: {}", config_path.display()))?;
            let reader = BufReader::new(file);
            for line in reader.lines() {
                let line = line?;
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((k, v)) = line.split_once('=') {
                    map.insert(k.trim().to_string(), unquote(v.trim()).to_string());
                }
            }
        } else if explicit {
            bail!("config file not found: {}", config_path.display());
        }

        // Environment takes precedence over the rc file
        for (k, v) in env::vars() {
            if is_config_key(&k) {
                map.insert(k, v);
            }
        }

        Ok(Self { inner: map, config_path })
    }

    /// Defaults overlaid with the given pairs; ignores the process environment.
    #[cfg(test)]
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        let mut map = default_map();
        for (k, v) in pairs {
            map.insert((*k).to_string(), (*v).to_string());
        }
        Self { inner: map, config_path: PathBuf::new() }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).cloned()
    }

    /// A blank value falls back to the built-in default for `key`.
    pub fn get_bool(&self, key: &str) -> bool {
        non_empty(self.get(key))
            .or_else(|| default_map().remove(key))
            .map(|v| is_truthy(&v))
            .unwrap_or(false)
    }

    pub fn get_path(&self, key: &str) -> Option<PathBuf> {
        non_empty(self.get(key)).map(PathBuf::from)
    }
}

fn unquote(v: &str) -> &str {
    for q in ['"', '\''] {
        if let Some(inner) = v.strip_prefix(q).and_then(|s| s.strip_suffix(q)) {
            return inner;
        }
    }
    v
}

fn is_config_key(k: &str) -> bool {
    const KEYS: &[&str] = &[
        "VENV_DIR",
        "PYTHON",
        "SYNC_PROJECT",
        "INSTALL_EXTENSIONS",
        "INSTALL_DEV",
        "DOWNLOAD_MODELS",
        "MLKIT_VERSION",
        "MLKIT_EXTENSIONS_VERSION",
        "MODEL_CACHE_DIR",
        "PROJECT_DIR",
        "MANIFEST_PATH",
        "REQUEST_TIMEOUT",
        "LOG_LEVEL",
        "HF_TOKEN",
        "HF_ENDPOINT",
        "HF_HOME",
        "HF_TOKEN_PATH",
        "UV_INSTALL_DIR",
        "XDG_BIN_HOME",
    ];

    KEYS.contains(&k) || k.starts_with("MLKIT_")
}

fn home_dir() -> Option<PathBuf> {
    BaseDirs::new().map(|b| b.home_dir().to_path_buf())
}

fn default_config_path() -> PathBuf {
    let base = BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config"));
    base.join("mlkit-bootstrap").join("bootstraprc")
}

fn default_map() -> HashMap<String, String> {
    let mut m = HashMap::new();
    let home = home_dir().unwrap_or_else(|| PathBuf::from("."));

    // Paths
    m.insert("VENV_DIR".into(), ".venv".into());
    m.insert("PROJECT_DIR".into(), ".".into());
    m.insert(
        "MODEL_CACHE_DIR".into(),
        home.join(".cache").join("mlkit").to_string_lossy().into_owned(),
    );
    m.insert(
        "HF_HOME".into(),
        home.join(".cache").join("huggingface").to_string_lossy().into_owned(),
    );

    // Strings
    m.insert("PYTHON".into(), "python3".into());
    m.insert("HF_ENDPOINT".into(), DEFAULT_HUB_ENDPOINT.into());

    // Flags
    m.insert("SYNC_PROJECT".into(), "0".into());
    m.insert("INSTALL_EXTENSIONS".into(), "1".into());
    m.insert("INSTALL_DEV".into(), "1".into());
    m.insert("DOWNLOAD_MODELS".into(), "1".into());

    m
}

/// Typed, immutable view of the configuration handed to every provisioning step.
#[derive(Debug, Clone)]
pub struct Settings {
    pub venv_dir: PathBuf,
    pub python: String,
    pub sync_project: bool,
    pub install_extensions: bool,
    pub install_dev: bool,
    pub download_models: bool,
    pub core_version: Option<String>,
    pub extensions_version: Option<String>,
    pub model_cache_dir: PathBuf,
    pub project_dir: PathBuf,
    pub manifest_path: Option<PathBuf>,
    pub hf_token: Option<String>,
    pub hf_endpoint: String,
    pub hf_token_path: PathBuf,
    pub request_timeout: Option<u64>,
    /// Directories the uv installer is known to place its binary in.
    pub extra_bin_dirs: Vec<PathBuf>,
    /// Executable search path captured at startup; only handed to children.
    pub search_path: OsString,
    pub dry_run: bool,
}

impl Settings {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::build(cfg, env::var_os("PATH").unwrap_or_default(), home_dir())
    }

    fn build(cfg: &Config, search_path: OsString, home: Option<PathBuf>) -> Result<Self> {
        let python = non_empty(cfg.get("PYTHON")).unwrap_or_else(|| "python3".to_string());
        let hf_endpoint = non_empty(cfg.get("HF_ENDPOINT"))
            .map(|e| e.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_HUB_ENDPOINT.to_string());

        let hf_token_path = match cfg.get_path("HF_TOKEN_PATH") {
            Some(p) => p,
            None => cfg
                .get_path("HF_HOME")
                .map(|h| h.join("token"))
                .context("HF_HOME is empty and HF_TOKEN_PATH is unset")?,
        };

        let request_timeout = match non_empty(cfg.get("REQUEST_TIMEOUT")) {
            Some(v) => Some(
                v.trim()
                    .parse::<u64>()
                    .with_context(|| format!("REQUEST_TIMEOUT must be a number of seconds, got {v:?}"))?,
            ),
            None => None,
        };

        let mut extra_bin_dirs = Vec::new();
        extra_bin_dirs.extend(cfg.get_path("UV_INSTALL_DIR"));
        extra_bin_dirs.extend(cfg.get_path("XDG_BIN_HOME"));
        if let Some(home) = &home {
            extra_bin_dirs.push(home.join(".local").join("bin"));
            extra_bin_dirs.push(home.join(".cargo").join("bin"));
        }

        Ok(Self {
            venv_dir: cfg.get_path("VENV_DIR").unwrap_or_else(|| PathBuf::from(".venv")),
            python,
            sync_project: cfg.get_bool("SYNC_PROJECT"),
            install_extensions: cfg.get_bool("INSTALL_EXTENSIONS"),
            install_dev: cfg.get_bool("INSTALL_DEV"),
            download_models: cfg.get_bool("DOWNLOAD_MODELS"),
            core_version: non_empty(cfg.get("MLKIT_VERSION")),
            extensions_version: non_empty(cfg.get("MLKIT_EXTENSIONS_VERSION")),
            model_cache_dir: cfg
                .get_path("MODEL_CACHE_DIR")
                .context("MODEL_CACHE_DIR must not be empty")?,
            project_dir: cfg.get_path("PROJECT_DIR").unwrap_or_else(|| PathBuf::from(".")),
            manifest_path: cfg.get_path("MANIFEST_PATH"),
            hf_token: non_empty(cfg.get("HF_TOKEN")),
            hf_endpoint,
            hf_token_path,
            request_timeout,
            extra_bin_dirs,
            search_path,
            dry_run: false,
        })
    }

    /// Settings rooted in a scratch directory, with nothing from the host.
    #[cfg(test)]
    pub fn for_tests(root: &Path, pairs: &[(&str, &str)]) -> Self {
        let venv = root.join("venv").to_string_lossy().into_owned();
        let cache = root.join("models").to_string_lossy().into_owned();
        let project = root.join("project").to_string_lossy().into_owned();
        let token = root.join("hf").join("token").to_string_lossy().into_owned();
        let mut all = vec![
            ("VENV_DIR", venv.as_str()),
            ("MODEL_CACHE_DIR", cache.as_str()),
            ("PROJECT_DIR", project.as_str()),
            ("HF_TOKEN_PATH", token.as_str()),
        ];
        all.extend_from_slice(pairs);
        let cfg = Config::from_pairs(&all);
        let search_path = root.join("bin").into_os_string();
        Self::build(&cfg, search_path, Some(root.join("home")))
            .expect("test settings should be valid")
    }
}
