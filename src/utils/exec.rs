//! External command execution utilities.
//!
//! Runs the configured bundler command with proper output handling and
//! error reporting. The failing tool's own diagnostics are passed through
//! untouched so the user sees them the way the tool formatted them.

use crate::log;
use anyhow::{Context, Result};
use regex::Regex;
use std::{
    path::Path,
    process::{Command, Output},
    sync::OnceLock,
};

// ============================================================================
// Command Execution
// ============================================================================

/// Execute a command (leading elements + arguments) and capture its output.
///
/// Empty arguments are filtered out, so conditional flags can be written as
/// `if cond { "--flag".into() } else { String::new() }`.
///
/// # Errors
/// Returns error if the command fails to execute or exits non-zero.
pub fn run(
    root: Option<&Path>,
    cmd: &[String],
    args: &[String],
    filter: &'static FilterRule,
) -> Result<Output> {
    let name = cmd.first().context("Empty command")?.clone();

    let mut command = Command::new(&cmd[0]);
    command.args(&cmd[1..]).args(args.iter().filter(|a| !a.is_empty()));

    if let Some(dir) = root {
        command.current_dir(dir);
    }

    let output = command
        .output()
        .with_context(|| format!("Failed to execute `{name}`"))?;

    log_output(&name, &output, filter)?;
    Ok(output)
}

// ============================================================================
// Output Filtering
// ============================================================================

fn strip_ansi(s: &str) -> std::borrow::Cow<'_, str> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*m").unwrap());
    re.replace_all(s, "")
}

/// Filter rule for skipping known-noise output lines.
pub struct FilterRule {
    /// Prefixes to match at the start of output lines.
    pub skip_prefixes: &'static [&'static str],
}

impl FilterRule {
    /// Create a new filter rule with the given prefixes.
    pub const fn new(skip_prefixes: &'static [&'static str]) -> Self {
        Self { skip_prefixes }
    }

    /// Check if a line should be skipped.
    fn should_skip(&self, output: &str) -> bool {
        output.is_empty() || self.skip_prefixes.iter().any(|p| output.starts_with(p))
    }

    /// Log output lines that survive the filter.
    fn log(&self, name: &str, output: &str) {
        let mut valid_lines = Vec::new();
        for line in output.lines() {
            let plain = strip_ansi(line);
            let trimmed = plain.trim();
            if !trimmed.is_empty() && !self.should_skip(trimmed) {
                valid_lines.push(line);
            }
        }

        if !valid_lines.is_empty() {
            let message = valid_lines.join("\n");
            log!(name; "{}", message);
        }
    }
}

/// Empty filter (no skipping).
pub const EMPTY_FILTER: FilterRule = FilterRule::new(&[]);

/// Log command output, filtering known noise.
fn log_output(name: &str, output: &Output, filter: &'static FilterRule) -> Result<()> {
    if !output.status.success() {
        anyhow::bail!(format_error(name, output, filter));
    }

    // On success, only log stderr (warnings) to reduce noise
    let stderr = String::from_utf8_lossy(&output.stderr);
    filter.log(name, stderr.trim());

    Ok(())
}

/// Format command error message with filtering.
fn format_error(name: &str, output: &Output, filter: &'static FilterRule) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);

    let error_msg = filter
        .skip_prefixes
        .iter()
        .fold(stderr.trim(), |s, p| s.trim_start_matches(p).trim_start());

    let mut msg = format!("Command `{name}` failed with {}\n", output.status);
    if !error_msg.is_empty() {
        msg.push_str(error_msg);
    }

    let stdout_trimmed = stdout.trim();
    if !stdout_trimmed.is_empty() {
        msg.push_str("\nStdout:\n");
        msg.push_str(stdout_trimmed);
    }
    msg
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn test_run_empty_command() {
        assert!(run(None, &[], &[], &EMPTY_FILTER).is_err());
    }

    #[test]
    fn test_run_success() {
        let cmd = vec!["echo".to_string()];
        let args = vec!["hello".to_string(), String::new()];
        let output = run(None, &cmd, &args, &EMPTY_FILTER).unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
    }

    #[test]
    fn test_run_failure_carries_stderr() {
        // `sh -c` gives us a portable-enough failing command with stderr
        let cmd = vec!["sh".to_string()];
        let args = vec!["-c".to_string(), "echo boom >&2; exit 3".to_string()];
        let err = run(None, &cmd, &args, &EMPTY_FILTER).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Command `sh` failed"));
        assert!(msg.contains("boom"));
    }

    #[test]
    fn test_filter_rule() {
        let filter = FilterRule::new(&["WARN:", "INFO:"]);

        assert!(filter.should_skip("WARN: something"));
        assert!(filter.should_skip("INFO: something"));
        assert!(!filter.should_skip("ERROR: something"));
        assert!(filter.should_skip("")); // Empty lines skipped
    }

    #[test]
    fn test_format_error() {
        // `false` returns exit code 1 on unix; windows fallback via cmd
        let status = Command::new("false")
            .status()
            .or_else(|_| Command::new("cmd").args(["/C", "exit 1"]).status())
            .unwrap();

        static TEST_FILTER: FilterRule = FilterRule::new(&["Ignored:"]);
        let output = Output {
            status,
            stdout: Vec::new(),
            stderr: b"Ignored: warning\nFatal error".to_vec(),
        };
        let msg = format_error("test", &output, &TEST_FILTER);

        assert!(msg.contains("Command `test` failed"));
        assert!(msg.contains("Fatal error"));
    }

    #[test]
    fn test_strip_ansi() {
        assert_eq!(strip_ansi("\x1b[31mRed\x1b[0m"), "Red");
        assert_eq!(strip_ansi("\x1b[1;32mGreen Bold\x1b[0m"), "Green Bold");
        assert_eq!(strip_ansi("Plain text"), "Plain text");
        assert_eq!(
            strip_ansi("Start \x1b[33mYellow\x1b[0m End"),
            "Start Yellow End"
        );
    }
}
