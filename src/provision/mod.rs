//! Environment provisioner: the ordered, fail-fast setup sequence.
//!
//! 1. ensure uv is available
//! 2. create or update the runtime environment
//! 3. sync project dependencies (`SYNC_PROJECT`)
//! 4. install the core packages
//! 5. install extensions (`INSTALL_EXTENSIONS`)
//! 6. install development tooling (`INSTALL_DEV`)
//! 7. log in to the hub and download model weights (`DOWNLOAD_MODELS`)
//! 8. report a summary
//!
//! Every failure is terminal except a missing project manifest in step 3,
//! which only warns.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::{
    config::Settings,
    external::hub::HubClient,
    manifest::{Manifest, PackageSpec},
    printer::StatusPrinter,
    process::CommandRunner,
};

pub mod models;
pub mod packages;
pub mod toolchain;
pub mod venv;

use toolchain::Toolchain;
use venv::RuntimeEnv;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Toolchain,
    Environment,
    ProjectSync,
    Core,
    Extensions,
    DevTools,
    Models,
}

impl Step {
    pub fn label(self) -> &'static str {
        match self {
            Step::Toolchain => "package manager",
            Step::Environment => "runtime environment",
            Step::ProjectSync => "project dependencies",
            Step::Core => "core packages",
            Step::Extensions => "extensions",
            Step::DevTools => "development tools",
            Step::Models => "model weights",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Summary {
    pub ran: Vec<Step>,
    pub skipped: Vec<Step>,
    pub packages_requested: usize,
    pub files_downloaded: usize,
    pub files_reused: usize,
    pub checkpoints: Option<usize>,
    pub warnings: usize,
    pub environment: Option<PathBuf>,
}

impl Summary {
    pub fn report(&self, printer: &StatusPrinter) {
        printer.info(format!(
            "steps run: {}, skipped: {}, warnings: {}",
            self.ran.len(),
            self.skipped.len(),
            self.warnings
        ));
        printer.info(format!("packages requested: {}", self.packages_requested));
        if let Some(n) = self.checkpoints {
            printer.info(format!(
                "model files: {} downloaded, {} already cached",
                self.files_downloaded, self.files_reused
            ));
            printer.ok(format!("checkpoint files in cache: {n}"));
        }
        if let Some(env) = &self.environment {
            let activate = if cfg!(windows) {
                env.join("Scripts").join("activate")
            } else {
                env.join("bin").join("activate")
            };
            printer.ok(format!("environment ready; activate with `source {}`", activate.display()));
        }
    }
}

pub struct Provisioner<'a> {
    settings: &'a Settings,
    manifest: &'a Manifest,
    runner: &'a dyn CommandRunner,
    printer: StatusPrinter,
}

impl<'a> Provisioner<'a> {
    pub fn new(
        settings: &'a Settings,
        manifest: &'a Manifest,
        runner: &'a dyn CommandRunner,
        printer: StatusPrinter,
    ) -> Self {
        Self { settings, manifest, runner, printer }
    }

    pub async fn run(&self) -> Result<Summary> {
        let mut summary = Summary::default();
        let s = self.settings;
        self.printer.info(format!("provisioning {} into {}", self.manifest.toolkit, s.venv_dir.display()));

        self.printer.info(format!("[1/7] {}", Step::Toolchain.label()));
        let toolchain = toolchain::ensure(s, self.runner, &self.printer).await?;
        summary.ran.push(Step::Toolchain);

        self.printer.info(format!("[2/7] {}", Step::Environment.label()));
        let env = venv::create(s, &toolchain, self.runner, &self.printer).await?;
        summary.ran.push(Step::Environment);
        summary.environment = Some(env.root.clone());

        if s.sync_project {
            self.printer.info(format!("[3/7] {}", Step::ProjectSync.label()));
            self.sync_project(&toolchain, &env, &mut summary).await?;
            summary.ran.push(Step::ProjectSync);
        } else {
            self.skip(Step::ProjectSync, "SYNC_PROJECT", &mut summary);
        }

        self.printer.info(format!("[4/7] {}", Step::Core.label()));
        let core = self.manifest.core_install_set(s.core_version.as_deref());
        self.install(Step::Core, &core, &toolchain, &env, &mut summary).await?;

        if s.install_extensions {
            self.printer.info(format!("[5/7] {}", Step::Extensions.label()));
            let ext = self.manifest.extensions_install_set(s.extensions_version.as_deref());
            self.install(Step::Extensions, &ext, &toolchain, &env, &mut summary).await?;
        } else {
            self.skip(Step::Extensions, "INSTALL_EXTENSIONS", &mut summary);
        }

        if s.install_dev {
            self.printer.info(format!("[6/7] {}", Step::DevTools.label()));
            let dev = self.manifest.dev_install_set();
            self.install(Step::DevTools, &dev, &toolchain, &env, &mut summary).await?;
        } else {
            self.skip(Step::DevTools, "INSTALL_DEV", &mut summary);
        }

        if s.download_models {
            self.printer.info(format!("[7/7] {}", Step::Models.label()));
            self.models(&mut summary).await?;
            summary.ran.push(Step::Models);
        } else {
            self.skip(Step::Models, "DOWNLOAD_MODELS", &mut summary);
        }

        Ok(summary)
    }

    fn skip(&self, step: Step, flag: &str, summary: &mut Summary) {
        self.printer.skip(format!("{} ({flag} is off)", step.label()));
        summary.skipped.push(step);
    }

    async fn sync_project(&self, toolchain: &Toolchain, env: &RuntimeEnv, summary: &mut Summary) -> Result<()> {
        let project_dir = &self.settings.project_dir;
        match packages::detect_sync_source(project_dir) {
            Some(source) => {
                packages::sync_project(&source, project_dir, toolchain, env, self.runner).await?;
                self.printer.ok("project dependencies synced");
            }
            None => {
                self.printer.warn(format!(
                    "no {} or {} in {}; nothing to sync",
                    packages::PROJECT_MANIFEST,
                    packages::REQUIREMENTS_FILE,
                    project_dir.display()
                ));
                summary.warnings += 1;
            }
        }
        Ok(())
    }

    async fn install(
        &self,
        step: Step,
        specs: &[PackageSpec],
        toolchain: &Toolchain,
        env: &RuntimeEnv,
        summary: &mut Summary,
    ) -> Result<()> {
        packages::install(toolchain, env, self.runner, specs)
            .await
            .with_context(|| format!("installing {}", step.label()))?;
        summary.packages_requested += specs.len();
        summary.ran.push(step);
        if !self.runner.is_dry_run() {
            self.printer.ok(format!("{} installed ({} packages)", step.label(), specs.len()));
        }
        Ok(())
    }

    async fn models(&self, summary: &mut Summary) -> Result<()> {
        let hub = HubClient::from_settings(self.settings)?;

        if self.runner.is_dry_run() {
            if self.settings.hf_token.is_some() {
                self.printer.dry(format!("log in to {}", self.settings.hf_endpoint));
            }
            models::plan_downloads(self.manifest, &hub, &self.printer);
            return Ok(());
        }

        if !models::authenticate(self.settings, &hub, &self.printer).await? {
            summary.warnings += 1;
        }
        let report = models::download_weights(self.settings, self.manifest, &hub, &self.printer).await?;
        if report.downloaded > 0 {
            self.printer.ok(format!("fetched {} files ({} bytes)", report.downloaded, report.bytes));
        }
        summary.files_downloaded = report.downloaded;
        summary.files_reused = report.reused;
        summary.checkpoints = Some(report.checkpoints);
        Ok(())
    }
}
