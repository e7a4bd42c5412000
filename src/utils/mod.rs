//! Small helpers shared by config parsing and the provisioning steps.

/// Flag values accepted as "on". Everything else, including an empty string, is off.
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Collapse blank strings to `None`.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty()).map(|v| v.trim().to_string())
}

/// Quote an argument for display in a shell-like command line.
pub fn shell_quote(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }
    let plain = arg
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_truthy() {
        for v in ["1", "true", "TRUE", "yes", "on", " 1 "] {
            assert!(is_truthy(v), "{v:?} should be truthy");
        }
        for v in ["0", "false", "", "no", "off", "2", "enabled"] {
            assert!(!is_truthy(v), "{v:?} should be falsy");
        }
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(None), None);
        assert_eq!(non_empty(Some("   ".into())), None);
        assert_eq!(non_empty(Some(" 6.3.2 ".into())).as_deref(), Some("6.3.2"));
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("mlkit==6.3.2"), "mlkit==6.3.2");
        assert_eq!(shell_quote("mlkit-extensions[all]"), "'mlkit-extensions[all]'");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }
}
