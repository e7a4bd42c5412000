//! Locate the uv package manager, installing it when it is missing.

use std::{
    env,
    ffi::{OsStr, OsString},
    path::PathBuf,
};

use anyhow::{Context, Result};

use crate::{
    config::Settings,
    error::ProvisionError,
    printer::StatusPrinter,
    process::{CommandRunner, Invocation},
    utils::shell_quote,
};

pub const UV: &str = "uv";
pub const UV_INSTALL_SCRIPT: &str = "https://astral.sh/uv/install.sh";

/// Resolved package manager plus the search path children should run with.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub uv: PathBuf,
    pub search_path: OsString,
}

impl Toolchain {
    /// A `uv` invocation carrying the extended search path.
    pub fn uv(&self) -> Invocation {
        Invocation::new(&self.uv).env("PATH", self.search_path.clone())
    }
}

/// `base` followed by any of `extra` not already present. Empty entries are dropped.
pub fn extended_search_path(base: &OsStr, extra: &[PathBuf]) -> Result<OsString> {
    let mut dirs: Vec<PathBuf> = env::split_paths(base)
        .filter(|p| !p.as_os_str().is_empty())
        .collect();
    for d in extra {
        if !dirs.contains(d) {
            dirs.push(d.clone());
        }
    }
    env::join_paths(dirs).context("building executable search path")
}

pub fn locate(program: &str, search_path: &OsStr) -> Option<PathBuf> {
    let cwd = env::current_dir().ok()?;
    which::which_in(program, Some(search_path), cwd).ok()
}

fn install_script_invocation(search_path: &OsStr) -> Option<Invocation> {
    let fetch = if let Some(curl) = locate("curl", search_path) {
        format!("{} -LsSf {}", shell_quote(&curl.to_string_lossy()), UV_INSTALL_SCRIPT)
    } else if let Some(wget) = locate("wget", search_path) {
        format!("{} -qO- {}", shell_quote(&wget.to_string_lossy()), UV_INSTALL_SCRIPT)
    } else {
        return None;
    };
    Some(
        Invocation::new("sh")
            .arg("-c")
            .arg(format!("{fetch} | sh"))
            .env("PATH", search_path.to_os_string())
            .env("UV_NO_MODIFY_PATH", "1"),
    )
}

pub async fn ensure(
    settings: &Settings,
    runner: &dyn CommandRunner,
    printer: &StatusPrinter,
) -> Result<Toolchain> {
    let search_path = extended_search_path(&settings.search_path, &settings.extra_bin_dirs)?;
    let found = |search_path: &OsString| {
        locate(UV, search_path).map(|uv| Toolchain { uv, search_path: search_path.clone() })
    };

    if let Some(tc) = found(&search_path) {
        printer.ok(format!("uv found at {}", tc.uv.display()));
        return Ok(tc);
    }

    printer.info("uv not found, running the installer");
    match install_script_invocation(&search_path) {
        Some(inv) => {
            if let Err(e) = runner.run(&inv).await {
                printer.warn(format!("uv install script failed: {e:#}"));
            }
        }
        None => printer.warn("neither curl nor wget is available to fetch the uv installer"),
    }

    if runner.is_dry_run() {
        return Ok(Toolchain { uv: PathBuf::from(UV), search_path });
    }
    if let Some(tc) = found(&search_path) {
        printer.ok(format!("uv installed at {}", tc.uv.display()));
        return Ok(tc);
    }

    if let Some(python) = locate(&settings.python, &search_path) {
        printer.info(format!("falling back to `{} -m pip install --user uv`", settings.python));
        let inv = Invocation::new(python)
            .args(["-m", "pip", "install", "--user", UV])
            .env("PATH", search_path.clone());
        if let Err(e) = runner.run(&inv).await {
            printer.warn(format!("pip fallback failed: {e:#}"));
        }
        if let Some(tc) = found(&search_path) {
            printer.ok(format!("uv installed at {}", tc.uv.display()));
            return Ok(tc);
        }
    }

    Err(ProvisionError::ToolchainMissing { tool: UV.to_string() }.into())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::process::recording::RecordingRunner;
    use crate::provision::testing::fake_executable;

    #[test]
    fn test_extended_search_path_appends_missing_dirs() {
        let base = env::join_paths(["/usr/bin", "/bin"]).unwrap();
        let extra = vec![PathBuf::from("/bin"), PathBuf::from("/home/dev/.local/bin")];
        let joined = extended_search_path(&base, &extra).unwrap();
        let dirs: Vec<PathBuf> = env::split_paths(&joined).collect();
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("/usr/bin"),
                PathBuf::from("/bin"),
                PathBuf::from("/home/dev/.local/bin"),
            ]
        );
    }

    #[tokio::test]
    async fn test_present_uv_needs_no_install() {
        let dir = tempfile::tempdir().unwrap();
        let uv = fake_executable(&dir.path().join("bin"), "uv");
        let settings = Settings::for_tests(dir.path(), &[]);
        let runner = RecordingRunner::new();

        let tc = ensure(&settings, &runner, &StatusPrinter::plain()).await.unwrap();
        assert_eq!(tc.uv, uv);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_uv_in_known_location_is_found() {
        let dir = tempfile::tempdir().unwrap();
        let uv = fake_executable(&dir.path().join("home/.local/bin"), "uv");
        let settings = Settings::for_tests(dir.path(), &[]);
        let runner = RecordingRunner::new();

        let tc = ensure(&settings, &runner, &StatusPrinter::plain()).await.unwrap();
        assert_eq!(tc.uv, uv);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_installs_with_curl() {
        let dir = tempfile::tempdir().unwrap();
        fake_executable(&dir.path().join("bin"), "curl");
        let settings = Settings::for_tests(dir.path(), &[]);
        let target = dir.path().join("home/.local/bin");
        let runner = RecordingRunner::new().with_side_effect(move |inv| {
            if inv.args.iter().any(|a| a.contains("install.sh")) {
                fake_executable(&target, "uv");
            }
        });

        let tc = ensure(&settings, &runner, &StatusPrinter::plain()).await.unwrap();
        assert!(tc.uv.ends_with(".local/bin/uv"));
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, PathBuf::from("sh"));
        assert!(calls[0].args[1].contains("curl"));
        assert!(calls[0].args[1].ends_with("| sh"));
        assert_eq!(calls[0].env_value("UV_NO_MODIFY_PATH"), Some(&OsString::from("1")));
    }

    #[tokio::test]
    async fn test_wget_is_the_fallback_fetcher() {
        let dir = tempfile::tempdir().unwrap();
        fake_executable(&dir.path().join("bin"), "wget");
        let settings = Settings::for_tests(dir.path(), &[]);
        let target = dir.path().join("home/.cargo/bin");
        let runner = RecordingRunner::new().with_side_effect(move |_| {
            fake_executable(&target, "uv");
        });

        ensure(&settings, &runner, &StatusPrinter::plain()).await.unwrap();
        assert!(runner.rendered()[0].contains("wget"));
    }

    #[tokio::test]
    async fn test_pip_fallback_after_failed_script() {
        let dir = tempfile::tempdir().unwrap();
        fake_executable(&dir.path().join("bin"), "curl");
        fake_executable(&dir.path().join("bin"), "python3");
        let settings = Settings::for_tests(dir.path(), &[]);
        let target = dir.path().join("home/.local/bin");
        let runner = RecordingRunner::new()
            .failing_on("install.sh", 22)
            .with_side_effect(move |inv| {
                if inv.args.iter().any(|a| a == "pip") {
                    fake_executable(&target, "uv");
                }
            });

        let tc = ensure(&settings, &runner, &StatusPrinter::plain()).await.unwrap();
        assert!(tc.uv.ends_with("uv"));
        let rendered = runner.rendered();
        assert_eq!(rendered.len(), 2);
        assert!(rendered[1].ends_with("-m pip install --user uv"));
    }

    #[tokio::test]
    async fn test_missing_after_all_attempts_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fake_executable(&dir.path().join("bin"), "curl");
        let settings = Settings::for_tests(dir.path(), &[]);
        let runner = RecordingRunner::new();

        let err = ensure(&settings, &runner, &StatusPrinter::plain()).await.unwrap_err();
        assert!(matches!(
            crate::error::find_provision_error(&err),
            Some(ProvisionError::ToolchainMissing { .. })
        ));
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_reports_install_only() {
        let dir = tempfile::tempdir().unwrap();
        fake_executable(&dir.path().join("bin"), "curl");
        let settings = Settings::for_tests(dir.path(), &[]);
        let runner = crate::process::DryRunRunner::new(StatusPrinter::plain());

        let tc = ensure(&settings, &runner, &StatusPrinter::plain()).await.unwrap();
        assert_eq!(tc.uv, PathBuf::from(UV));
    }
}
