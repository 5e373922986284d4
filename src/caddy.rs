//! Caddy process integration: running the configured reload command and the
//! best-effort Caddyfile patch that switches the proxy to JSON access logs.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{anyhow, Result};
use regex::Regex;
use tokio::time::timeout;
use tracing::{info, warn};

const RELOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// How much captured command output an API error response will carry.
const DETAIL_LIMIT: usize = 500;

/// The global log block the panel injects: JSON to stdout, which is exactly
/// the shape the stats reader consumes.
const LOG_DIRECTIVE: &str = r#"log {
    output stdout
    format json {
        time_format rfc3339
    }
    level INFO
}"#;

/// Outcome of running the external reload command.
#[derive(Debug)]
pub enum ReloadOutcome {
    Success { stdout: String },
    Failed { code: Option<i32>, detail: String },
    CommandNotFound,
    TimedOut,
}

/// Run the operator-configured reload command with a 30 second timeout,
/// capturing output and exit status.
///
/// The command line is split on whitespace and executed directly; there is
/// no shell, so quoting and redirection are not interpreted.
pub async fn run_reload(command_line: &str) -> ReloadOutcome {
    run_reload_with_timeout(command_line, RELOAD_TIMEOUT).await
}

async fn run_reload_with_timeout(command_line: &str, limit: Duration) -> ReloadOutcome {
    let mut parts = command_line.split_whitespace();
    let program = match parts.next() {
        Some(program) => program,
        None => {
            return ReloadOutcome::Failed {
                code: None,
                detail: "Reload command is empty.".to_string(),
            }
        }
    };

    let mut command = tokio::process::Command::new(program);
    command
        .args(parts)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match timeout(limit, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(program, "reload command not found");
            return ReloadOutcome::CommandNotFound;
        }
        Ok(Err(e)) => {
            warn!(program, error = %e, "failed to run reload command");
            return ReloadOutcome::Failed {
                code: None,
                detail: truncate(&e.to_string()),
            };
        }
        Err(_) => {
            warn!(program, timeout_secs = limit.as_secs(), "reload command timed out");
            return ReloadOutcome::TimedOut;
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    if output.status.success() {
        info!(program, "reload command succeeded");
        ReloadOutcome::Success { stdout }
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let detail = if !stderr.is_empty() {
            stderr
        } else if !stdout.is_empty() {
            stdout
        } else {
            "Unknown error.".to_string()
        };
        warn!(program, code = ?output.status.code(), "reload command failed");
        ReloadOutcome::Failed {
            code: output.status.code(),
            detail: truncate(&detail),
        }
    }
}

fn truncate(detail: &str) -> String {
    detail.chars().take(DETAIL_LIMIT).collect()
}

/// Rewrite Caddyfile text so its global options block carries the panel's
/// JSON log directive, creating the global block when there is none and
/// replacing any existing `log { ... }` block.
///
/// This is a best-effort text patch, not a grammar-aware Caddyfile parser.
/// Block boundaries are found by brace counting, which ignores braces inside
/// quoted strings and comments; a Caddyfile relying on those will be patched
/// wrong, and the subsequent reload failure is surfaced to the operator.
pub fn inject_log_directive(content: &str) -> Result<String> {
    let start = content.len() - content.trim_start().len();
    if !content[start..].starts_with('{') {
        // No global options block; create one at the top of the file.
        return Ok(format!("{{\n{LOG_DIRECTIVE}\n}}\n\n{content}"));
    }

    let close = matching_brace(content, start)
        .ok_or_else(|| anyhow!("global options block has no matching closing brace"))?;
    let body = &content[start + 1..close];

    let without_logs = strip_log_blocks(body)?;
    let rest = without_logs.trim();
    let new_body = if rest.is_empty() {
        LOG_DIRECTIVE.to_string()
    } else {
        format!("{LOG_DIRECTIVE}\n\n{rest}")
    };

    Ok(format!(
        "{}{{\n{}\n}}{}",
        &content[..start],
        new_body,
        &content[close + 1..]
    ))
}

/// Index of the `}` matching the `{` at `open`.
fn matching_brace(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (i, ch) in text[open..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Remove every top-of-line `log { ... }` block from a global options body.
fn strip_log_blocks(body: &str) -> Result<String> {
    let log_open = Regex::new(r"(?m)^[ \t]*log\s*\{")?;
    let mut out = String::new();
    let mut rest = body;
    while let Some(m) = log_open.find(rest) {
        // The match ends on the opening brace.
        match matching_brace(rest, m.end() - 1) {
            Some(close) => {
                out.push_str(&rest[..m.start()]);
                rest = &rest[close + 1..];
            }
            None => return Err(anyhow!("log block has no matching closing brace")),
        }
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_global_block_when_missing() {
        let caddyfile = "example.com {\n    reverse_proxy :8080\n}\n";
        let patched = inject_log_directive(caddyfile).unwrap();
        assert!(patched.starts_with("{\nlog {"));
        assert!(patched.contains("output stdout"));
        assert!(patched.contains("format json"));
        assert!(patched.ends_with(caddyfile));
    }

    #[test]
    fn adds_log_block_to_existing_global_block() {
        let caddyfile = "{\n    email ops@example.com\n}\n\nexample.com {\n}\n";
        let patched = inject_log_directive(caddyfile).unwrap();
        assert!(patched.contains("output stdout"));
        assert!(patched.contains("email ops@example.com"));
        // Site block untouched, and only one log block injected.
        assert!(patched.contains("example.com {"));
        assert_eq!(patched.matches("output stdout").count(), 1);
    }

    #[test]
    fn replaces_existing_log_block() {
        let caddyfile = "{\n    log {\n        output file /var/log/caddy.log\n    }\n    email ops@example.com\n}\n";
        let patched = inject_log_directive(caddyfile).unwrap();
        assert!(patched.contains("output stdout"));
        assert!(!patched.contains("output file"));
        assert!(patched.contains("email ops@example.com"));
    }

    #[test]
    fn handles_nested_braces_in_existing_log_block() {
        let caddyfile = "{\n    log {\n        format json {\n            time_format unix\n        }\n    }\n}\nexample.com {\n}\n";
        let patched = inject_log_directive(caddyfile).unwrap();
        assert!(!patched.contains("unix"));
        assert!(patched.contains("time_format rfc3339"));
        assert!(patched.contains("example.com {"));
    }

    #[test]
    fn unbalanced_global_block_is_an_error() {
        assert!(inject_log_directive("{\n    email ops@example.com\n").is_err());
    }

    #[tokio::test]
    async fn reload_captures_stdout_on_success() {
        match run_reload("echo reload ok").await {
            ReloadOutcome::Success { stdout } => assert_eq!(stdout.trim(), "reload ok"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn reload_reports_exit_code_on_failure() {
        match run_reload("false").await {
            ReloadOutcome::Failed { code, .. } => assert_eq!(code, Some(1)),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn reload_reports_missing_command() {
        match run_reload("caddypanel-no-such-binary --flag").await {
            ReloadOutcome::CommandNotFound => {}
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn reload_times_out() {
        match run_reload_with_timeout("sleep 5", Duration::from_millis(50)).await {
            ReloadOutcome::TimedOut => {}
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn empty_command_fails_cleanly() {
        match run_reload("   ").await {
            ReloadOutcome::Failed { code: None, .. } => {}
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
