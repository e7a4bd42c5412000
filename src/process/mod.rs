//! External command execution: invocation description and runners.

use std::{
    ffi::OsString,
    fmt,
    path::{Path, PathBuf},
    process::Stdio,
};

use anyhow::Result;
use async_trait::async_trait;
use tokio::process::Command;

use crate::{error::ProvisionError, printer::StatusPrinter, utils::shell_quote};

/// A single external command: program, arguments, extra environment and
/// optional working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub envs: Vec<(String, OsString)>,
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), args: Vec::new(), envs: Vec::new(), cwd: None }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    #[cfg(test)]
    pub fn env_value(&self, key: &str) -> Option<&OsString> {
        self.envs.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&shell_quote(&self.program.to_string_lossy()))?;
        for a in &self.args {
            write!(f, " {}", shell_quote(a))?;
        }
        Ok(())
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion. A non-zero exit is an error carrying the exit code.
    async fn run(&self, invocation: &Invocation) -> Result<()>;

    /// True when commands are only reported, never spawned.
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Spawns real processes with inherited stdio so tool diagnostics reach the
/// user unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, invocation: &Invocation) -> Result<()> {
        let rendered = invocation.to_string();
        tracing::debug!(command = %rendered, cwd = ?invocation.cwd, "spawning");

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        for (k, v) in &invocation.envs {
            cmd.env(k, v);
        }
        if let Some(dir) = &invocation.cwd {
            cmd.current_dir(dir);
        }

        let status = cmd
            .status()
            .await
            .map_err(|source| ProvisionError::Spawn { command: rendered.clone(), source })?;

        if !status.success() {
            tracing::debug!(command = %rendered, code = ?status.code(), "command failed");
            return Err(ProvisionError::CommandFailed { command: rendered, code: status.code() }.into());
        }
        Ok(())
    }
}

/// Reports each invocation instead of running it.
#[derive(Debug, Clone, Copy)]
pub struct DryRunRunner {
    printer: StatusPrinter,
}

impl DryRunRunner {
    pub fn new(printer: StatusPrinter) -> Self {
        Self { printer }
    }
}

#[async_trait]
impl CommandRunner for DryRunRunner {
    async fn run(&self, invocation: &Invocation) -> Result<()> {
        match &invocation.cwd {
            Some(dir) => self.printer.dry(format!("(in {}) {}", dir.display(), invocation)),
            None => self.printer.dry(invocation),
        }
        Ok(())
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}

#[cfg(test)]
pub(crate) mod recording {
    use std::sync::Mutex;

    use super::*;

    type SideEffect = Box<dyn Fn(&Invocation) + Send + Sync>;

    /// Records invocations; optionally fails the first one whose rendering
    /// contains a needle, and runs a side effect on every success.
    #[derive(Default)]
    pub struct RecordingRunner {
        calls: Mutex<Vec<Invocation>>,
        fail_on: Option<(String, i32)>,
        side_effect: Option<SideEffect>,
    }

    impl RecordingRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing_on(mut self, needle: &str, code: i32) -> Self {
            self.fail_on = Some((needle.to_string(), code));
            self
        }

        pub fn with_side_effect(mut self, f: impl Fn(&Invocation) + Send + Sync + 'static) -> Self {
            self.side_effect = Some(Box::new(f));
            self
        }

        pub fn calls(&self) -> Vec<Invocation> {
            self.calls.lock().unwrap().clone()
        }

        pub fn rendered(&self) -> Vec<String> {
            self.calls().iter().map(ToString::to_string).collect()
        }
    }

    #[async_trait]
    impl CommandRunner for RecordingRunner {
        async fn run(&self, invocation: &Invocation) -> Result<()> {
            self.calls.lock().unwrap().push(invocation.clone());
            let rendered = invocation.to_string();
            if let Some((needle, code)) = &self.fail_on {
                if rendered.contains(needle.as_str()) {
                    return Err(ProvisionError::CommandFailed { command: rendered, code: Some(*code) }.into());
                }
            }
            if let Some(f) = &self.side_effect {
                f(invocation);
            }
            Ok(())
        }
    }
}
