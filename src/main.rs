mod cache;
mod cli;
mod config;
mod error;
mod external;
mod logging;
mod manifest;
mod printer;
mod process;
mod provision;
mod utils;

use std::process::ExitCode;

use anyhow::Result;
use config::{Config, Settings};
use manifest::Manifest;
use printer::StatusPrinter;
use process::{CommandRunner, DryRunRunner, SystemRunner};
use provision::Provisioner;

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::Cli::parse();
    let printer = StatusPrinter::new(args.quiet);

    match run(args, printer).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            printer.error(format!("{err:#}"));
            let code = error::find_provision_error(&err)
                .map(|e| e.exit_code())
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

async fn run(args: cli::Cli, printer: StatusPrinter) -> Result<()> {
    let cfg = Config::load(args.config.as_deref())?;
    logging::init(&cfg, args.verbose, args.quiet);

    let mut settings = Settings::from_config(&cfg)?;
    settings.dry_run = args.dry_run;
    tracing::debug!(
        rc = %cfg.config_path.display(),
        venv = %settings.venv_dir.display(),
        cache = %settings.model_cache_dir.display(),
        dry_run = settings.dry_run,
        "settings loaded"
    );

    let manifest = Manifest::load(settings.manifest_path.as_deref())?;

    let dry = DryRunRunner::new(printer);
    let runner: &dyn CommandRunner = if settings.dry_run { &dry } else { &SystemRunner };

    let summary = Provisioner::new(&settings, &manifest, runner, printer).run().await?;
    summary.report(&printer);
    Ok(())
}
