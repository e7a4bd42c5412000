use std::path::PathBuf;

use clap::{ArgGroup, Parser};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "mlkit-bootstrap",
    about = "Bootstrap an mlkit development environment: uv, virtualenv, packages and model weights",
    version,
    after_help = "Environment: VENV_DIR, PYTHON, SYNC_PROJECT, INSTALL_EXTENSIONS, INSTALL_DEV, \
DOWNLOAD_MODELS, MLKIT_VERSION, MLKIT_EXTENSIONS_VERSION, MODEL_CACHE_DIR, HF_TOKEN, HF_ENDPOINT"
)]
#[command(group(ArgGroup::new("verbosity").args(["quiet", "verbose"]).multiple(false)))]
pub struct Cli {
    /// Print the commands and downloads that would run, without running them.
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Read settings from this file instead of ~/.config/mlkit-bootstrap/bootstraprc.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Only print warnings and errors.
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Emit debug logs for every command and download.
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_rejects_positional_arguments() {
        assert!(Cli::try_parse_from(["mlkit-bootstrap", "extra"]).is_err());
    }

    #[test]
    fn test_quiet_and_verbose_conflict() {
        assert!(Cli::try_parse_from(["mlkit-bootstrap", "-q", "-v"]).is_err());
        let cli = Cli::try_parse_from(["mlkit-bootstrap", "--dry-run", "--config", "rc"]).unwrap();
        assert!(cli.dry_run);
        assert_eq!(cli.config, Some(PathBuf::from("rc")));
    }
}
