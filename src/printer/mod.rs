//! Status lines tagged by severity, colored when the terminal allows it.

use std::{fmt::Display, io};

use is_terminal::IsTerminal;
use owo_colors::OwoColorize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Ok,
    Skip,
    Dry,
    Warn,
    Error,
}

impl Severity {
    pub fn tag(self) -> &'static str {
        match self {
            Severity::Info => "[INFO]",
            Severity::Ok => "[OK]",
            Severity::Skip => "[SKIP]",
            Severity::Dry => "[DRY]",
            Severity::Warn => "[WARN]",
            Severity::Error => "[ERROR]",
        }
    }

    fn to_stderr(self) -> bool {
        matches!(self, Severity::Warn | Severity::Error)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StatusPrinter {
    color: bool,
    quiet: bool,
}

impl StatusPrinter {
    pub fn new(quiet: bool) -> Self {
        let color = io::stdout().is_terminal() && io::stderr().is_terminal();
        Self { color, quiet }
    }

    /// No colors, nothing suppressed.
    #[cfg(test)]
    pub fn plain() -> Self {
        Self { color: false, quiet: false }
    }

    pub fn format(&self, severity: Severity, msg: impl Display) -> String {
        let tag = severity.tag();
        if !self.color {
            return format!("{tag} {msg}");
        }
        let tag = match severity {
            Severity::Info => tag.cyan().to_string(),
            Severity::Ok => tag.green().to_string(),
            Severity::Skip => tag.dimmed().to_string(),
            Severity::Dry => tag.magenta().to_string(),
            Severity::Warn => tag.yellow().to_string(),
            Severity::Error => tag.red().bold().to_string(),
        };
        format!("{tag} {msg}")
    }

    pub fn line(&self, severity: Severity, msg: impl Display) {
        let quiet_hides = matches!(severity, Severity::Info | Severity::Ok | Severity::Skip);
        if self.quiet && quiet_hides {
            return;
        }
        let text = self.format(severity, msg);
        if severity.to_stderr() {
            eprintln!("{text}");
        } else {
            println!("{text}");
        }
    }

    pub fn info(&self, msg: impl Display) {
        self.line(Severity::Info, msg)
    }

    pub fn ok(&self, msg: impl Display) {
        self.line(Severity::Ok, msg)
    }

    pub fn skip(&self, msg: impl Display) {
        self.line(Severity::Skip, msg)
    }

    pub fn dry(&self, msg: impl Display) {
        self.line(Severity::Dry, msg)
    }

    pub fn warn(&self, msg: impl Display) {
        self.line(Severity::Warn, msg)
    }

    pub fn error(&self, msg: impl Display) {
        self.line(Severity::Error, msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_format_prefixes_tag() {
        let p = StatusPrinter::plain();
        assert_eq!(p.format(Severity::Warn, "no manifest"), "[WARN] no manifest");
        assert_eq!(p.format(Severity::Error, 3), "[ERROR] 3");
        assert_eq!(p.format(Severity::Skip, "dev tools"), "[SKIP] dev tools");
    }

    #[test]
    fn test_only_problems_go_to_stderr() {
        assert!(Severity::Warn.to_stderr());
        assert!(Severity::Error.to_stderr());
        assert!(!Severity::Info.to_stderr());
        assert!(!Severity::Dry.to_stderr());
    }
}
