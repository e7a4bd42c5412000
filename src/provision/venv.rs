//! Runtime environment (virtualenv) creation and verification.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::toolchain::Toolchain;
use crate::{
    config::Settings,
    error::ProvisionError,
    printer::StatusPrinter,
    process::CommandRunner,
};

#[derive(Debug, Clone)]
pub struct RuntimeEnv {
    pub root: PathBuf,
    pub python: PathBuf,
}

pub fn interpreter_path(root: &Path) -> PathBuf {
    if cfg!(windows) {
        root.join("Scripts").join("python.exe")
    } else {
        root.join("bin").join("python")
    }
}

#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// `uv venv` is idempotent with `--allow-existing`: an existing environment is
/// updated in place.
pub async fn create(
    settings: &Settings,
    toolchain: &Toolchain,
    runner: &dyn CommandRunner,
    printer: &StatusPrinter,
) -> Result<RuntimeEnv> {
    let root = settings.venv_dir.clone();
    let python = interpreter_path(&root);
    let existed = python.exists();

    let inv = toolchain
        .uv()
        .arg("venv")
        .path_arg(&root)
        .args(["--python", settings.python.as_str(), "--allow-existing"]);
    runner
        .run(&inv)
        .await
        .with_context(|| format!("creating runtime environment at {}", root.display()))?;

    if !runner.is_dry_run() {
        if !is_executable(&python) {
            return Err(ProvisionError::InterpreterMissing { path: python }.into());
        }
        let verb = if existed { "updated" } else { "created" };
        printer.ok(format!("runtime environment {verb} at {}", root.display()));
    }
    Ok(RuntimeEnv { root, python })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::process::recording::RecordingRunner;
    use crate::provision::testing::{fake_executable, materialize_venv};

    fn toolchain(dir: &Path) -> Toolchain {
        Toolchain { uv: fake_executable(&dir.join("bin"), "uv"), search_path: dir.join("bin").into() }
    }

    #[tokio::test]
    async fn test_create_invokes_uv_venv() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::for_tests(dir.path(), &[("PYTHON", "python3.11")]);
        let runner = RecordingRunner::new().with_side_effect(materialize_venv);

        let env = create(&settings, &toolchain(dir.path()), &runner, &StatusPrinter::plain())
            .await
            .unwrap();
        assert_eq!(env.python, settings.venv_dir.join("bin/python"));
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].args,
            vec![
                "venv".to_string(),
                settings.venv_dir.to_string_lossy().into_owned(),
                "--python".into(),
                "python3.11".into(),
                "--allow-existing".into(),
            ]
        );
    }

    #[tokio::test]
    async fn test_rerun_against_existing_environment() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::for_tests(dir.path(), &[]);
        let runner = RecordingRunner::new().with_side_effect(materialize_venv);
        let tc = toolchain(dir.path());

        create(&settings, &tc, &runner, &StatusPrinter::plain()).await.unwrap();
        create(&settings, &tc, &runner, &StatusPrinter::plain()).await.unwrap();
        assert_eq!(runner.calls().len(), 2);
        let entries = std::fs::read_dir(&settings.venv_dir).unwrap().count();
        assert_eq!(entries, 1, "only bin/ should exist");
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::for_tests(dir.path(), &[]);
        let runner = RecordingRunner::new();

        let err = create(&settings, &toolchain(dir.path()), &runner, &StatusPrinter::plain())
            .await
            .unwrap_err();
        assert!(matches!(
            crate::error::find_provision_error(&err),
            Some(ProvisionError::InterpreterMissing { .. })
        ));
    }

    #[test]
    fn test_non_executable_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("python");
        std::fs::write(&p, b"").unwrap();
        assert!(!is_executable(&p));
        assert!(!is_executable(&dir.path().join("absent")));
    }
}
