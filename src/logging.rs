//! Tracing setup. `RUST_LOG` wins, then `-v`/`-q`, then `LOG_LEVEL`, then `warn`.

use tracing_subscriber::{prelude::*, EnvFilter};

use crate::config::Config;

pub fn filter_directive(cfg: &Config, verbose: bool, quiet: bool) -> String {
    if verbose {
        return "mlkit_bootstrap=debug".to_string();
    }
    if quiet {
        return "error".to_string();
    }
    cfg.get("LOG_LEVEL")
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| "warn".to_string())
}

pub fn init(cfg: &Config, verbose: bool, quiet: bool) {
    let level = filter_directive(cfg, verbose, quiet);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive_precedence() {
        let cfg = Config::from_pairs(&[("LOG_LEVEL", "info")]);
        assert_eq!(filter_directive(&cfg, true, false), "mlkit_bootstrap=debug");
        assert_eq!(filter_directive(&cfg, false, true), "error");
        assert_eq!(filter_directive(&cfg, false, false), "info");

        let cfg = Config::from_pairs(&[]);
        assert_eq!(filter_directive(&cfg, false, false), "warn");
    }
}
