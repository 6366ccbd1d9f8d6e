// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Built-in `shell` tool, grounded on the teacher's `ShellTool`
//! (`crates/sven-tools/src/builtin/shell.rs`): TTY-isolated subprocess
//! execution with head/tail output truncation.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::error::ToolError;
use crate::tool::{OutputCategory, Tool};

/// Hard byte ceiling for combined stdout + stderr returned to the caller.
const OUTPUT_LIMIT_BYTES: usize = 20_000;
const HEAD_LINES: usize = 100;
const TAIL_LINES: usize = 100;

pub struct ShellTool {
    pub timeout_secs: u64,
}

impl Default for ShellTool {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return stdout + stderr.\n\
         'command' is required. Output is capped at ~20 KB; when larger, the\n\
         first 100 and last 100 lines are kept with an omission marker in the\n\
         middle. Prefer non-interactive commands."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The complete bash one-liner to execute."
                },
                "workdir": {
                    "type": "string",
                    "description": "Working directory (optional, defaults to cwd)"
                },
                "timeout_secs": {
                    "type": "integer",
                    "description": "Execution timeout in seconds (optional)"
                }
            },
            "required": ["command"],
            "additionalProperties": false
        })
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::HeadTail
    }

    async fn invoke(&self, input: &Value) -> Result<Value, ToolError> {
        let command = input
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidInput("missing required parameter 'command'".into()))?
            .to_string();
        let workdir = input.get("workdir").and_then(Value::as_str).map(str::to_string);
        let timeout = input
            .get("timeout_secs")
            .and_then(Value::as_u64)
            .unwrap_or(self.timeout_secs);

        debug!(cmd = %command, "executing shell tool");

        let mut cmd = Command::new("bash");
        cmd.arg("-c").arg(&command);
        // Detach from any controlling terminal so subprocesses cannot emit
        // terminal escape sequences back at the host process.
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);
        #[cfg(unix)]
        unsafe {
            use std::os::unix::process::CommandExt;
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }
        if let Some(wd) = &workdir {
            cmd.current_dir(wd);
        }

        let result = tokio::time::timeout(std::time::Duration::from_secs(timeout), cmd.output()).await;

        match result {
            Ok(Ok(output)) => {
                let mut content = String::new();
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);

                if !stdout.is_empty() {
                    content.push_str(&head_tail_truncate(&stdout));
                }
                if !stderr.is_empty() {
                    if !content.is_empty() {
                        content.push('\n');
                    }
                    content.push_str("[stderr]\n");
                    content.push_str(&head_tail_truncate(&stderr));
                }
                if content.is_empty() {
                    content = format!("[exit {}]", output.status.code().unwrap_or(-1));
                }

                let code = output.status.code().unwrap_or(-1);
                if code == 0 || code == 1 {
                    // Exit code 1 is the Unix convention for "no matches" /
                    // "condition false" — treat it as a successful result.
                    let out = if code == 1 && !content.starts_with("[exit 1]") {
                        format!("[exit 1]\n{content}")
                    } else {
                        content
                    };
                    Ok(json!({ "text": out }))
                } else {
                    Err(ToolError::InvokeFailed(anyhow::anyhow!("[exit {code}]\n{content}")))
                }
            }
            Ok(Err(e)) => Err(ToolError::RuntimeUnavailable(format!("spawn error: {e}"))),
            Err(_) => Err(ToolError::InvokeFailed(anyhow::anyhow!("timeout after {timeout}s"))),
        }
    }
}

/// Truncate `s` to fit within `OUTPUT_LIMIT_BYTES`, keeping head and tail
/// lines so both the command preamble and final result stay visible.
pub(crate) fn head_tail_truncate(s: &str) -> String {
    if s.len() <= OUTPUT_LIMIT_BYTES {
        return s.to_string();
    }

    let lines: Vec<&str> = s.lines().collect();
    let total = lines.len();

    if total <= HEAD_LINES + TAIL_LINES {
        let tail_start = s.len().saturating_sub(OUTPUT_LIMIT_BYTES / 2);
        let tail_str = &s[tail_start..];
        let head_end = (OUTPUT_LIMIT_BYTES / 2).min(s.len());
        let head_str = &s[..head_end];
        let omitted_bytes = s.len() - head_str.len() - tail_str.len();
        return format!("{head_str}\n...[{omitted_bytes} bytes omitted]...\n{tail_str}");
    }

    let head: Vec<&str> = lines[..HEAD_LINES].to_vec();
    let tail: Vec<&str> = lines[total - TAIL_LINES..].to_vec();
    let omitted_lines = total - HEAD_LINES - TAIL_LINES;
    let shown_bytes = head.join("\n").len() + tail.join("\n").len();
    let omitted_bytes = s.len().saturating_sub(shown_bytes);

    format!(
        "{}\n...[{omitted_lines} lines / ~{omitted_bytes} bytes omitted]...\n{}",
        head.join("\n"),
        tail.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn executes_echo_and_returns_stdout() {
        let t = ShellTool::default();
        let out = t.invoke(&json!({"command": "echo hello"})).await.unwrap();
        assert!(out["text"].as_str().unwrap().contains("hello"));
    }

    #[tokio::test]
    async fn missing_command_is_invalid_input() {
        let t = ShellTool::default();
        let err = t.invoke(&json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn nonzero_exit_other_than_one_is_invoke_failed() {
        let t = ShellTool::default();
        let err = t.invoke(&json!({"command": "exit 2"})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvokeFailed(_)));
    }

    #[tokio::test]
    async fn exit_code_one_is_not_an_error() {
        let t = ShellTool::default();
        let out = t.invoke(&json!({"command": "grep nomatch /dev/null"})).await.unwrap();
        assert!(out["text"].as_str().unwrap().contains("[exit 1]"));
    }

    #[test]
    fn head_tail_truncate_preserves_head_and_tail() {
        let lines: Vec<String> = (0..500).map(|i| format!("line-{i}")).collect();
        let text = lines.join("\n");
        let out = head_tail_truncate(&text);
        assert!(out.contains("line-0"));
        assert!(out.contains("line-499"));
        assert!(out.contains("omitted"));
    }
}
