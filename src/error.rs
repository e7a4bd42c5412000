//! Fatal error taxonomy for a provisioning run.

use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("`{tool}` could not be located or installed")]
    ToolchainMissing { tool: String },

    #[error("interpreter missing or not executable: {}", path.display())]
    InterpreterMissing { path: PathBuf },

    #[error("`{command}` {}", status_label(.code))]
    CommandFailed { command: String, code: Option<i32> },

    #[error("failed to start `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("hub authentication failed: {0}")]
    Auth(String),

    #[error("download failed for {url}: HTTP {status}")]
    Download { url: String, status: u16 },
}

fn status_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exited with status {c}"),
        None => "was terminated by a signal".to_string(),
    }
}

impl ProvisionError {
    /// Process exit code for this error: a failing command's own status when it
    /// fits in a byte, otherwise 1.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::CommandFailed { code: Some(c), .. } => u8::try_from(*c)
                .ok()
                .filter(|c| *c != 0)
                .unwrap_or(1),
            _ => 1,
        }
    }
}

/// Find the first `ProvisionError` in an error chain.
pub fn find_provision_error(err: &anyhow::Error) -> Option<&ProvisionError> {
    err.chain().find_map(|e| e.downcast_ref::<ProvisionError>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_exit_code_propagates_command_status() {
        let e = ProvisionError::CommandFailed { command: "uv pip install".into(), code: Some(2) };
        assert_eq!(e.exit_code(), 2);
        assert_eq!(e.to_string(), "`uv pip install` exited with status 2");

        let e = ProvisionError::CommandFailed { command: "uv".into(), code: None };
        assert_eq!(e.exit_code(), 1);
        assert_eq!(e.to_string(), "`uv` was terminated by a signal");

        let e = ProvisionError::CommandFailed { command: "uv".into(), code: Some(300) };
        assert_eq!(e.exit_code(), 1);
    }

    #[test]
    fn test_other_errors_exit_with_one() {
        let e = ProvisionError::ToolchainMissing { tool: "uv".into() };
        assert_eq!(e.exit_code(), 1);
        let e = ProvisionError::Download { url: "http://x".into(), status: 404 };
        assert_eq!(e.exit_code(), 1);
    }

    #[test]
    fn test_found_through_context() {
        let err: anyhow::Result<()> =
            Err(ProvisionError::CommandFailed { command: "uv".into(), code: Some(3) }.into());
        let err = err.context("installing core packages").unwrap_err();
        assert_eq!(find_provision_error(&err).map(|e| e.exit_code()), Some(3));
    }
}
