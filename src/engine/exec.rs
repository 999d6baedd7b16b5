//! Host shell command execution.
//!
//! Grounded on `original_source/core/lib.go`'s command-running helpers and
//! on the process-spawning style used in `leynos-whitaker`'s toolchain
//! harness (`std::process::Command`, captured output, exit-code mapping).

use std::collections::HashMap;
use std::path::Path;
use std::process::Command;

use crate::error::{ArtError, Result};

/// Translate a command's exit status into an `ArtError`. Exit codes
/// `1, 2, 126, 127, 128, 130` carry a specific meaning (spec §4.4 step 7c);
/// any other non-zero code is reported generically.
fn translate_exit_code(code: i32, command: &str) -> ArtError {
    let detail = match code {
        1 => "general error",
        2 => "misuse of shell builtin",
        126 => "command invoked cannot execute",
        127 => "command not found",
        128 => "invalid argument to exit",
        130 => "terminated by Ctrl-C",
        _ => "non-zero exit",
    };
    ArtError::io(format!("command '{command}' failed ({detail}, exit code {code})"))
}

/// Run `command` in `workdir` with `env` merged over the inherited process
/// environment, returning captured stdout with a single trailing newline
/// stripped. Non-zero exit aborts with a translated error.
pub fn run(command: &str, workdir: &Path, env: &HashMap<String, String>) -> Result<String> {
    let mut cmd = build_command(command)?;
    cmd.current_dir(workdir);
    for (k, v) in env {
        cmd.env(k, v);
    }
    let output = cmd.output()?;
    if !output.status.success() {
        let code = output.status.code().unwrap_or(-1);
        return Err(translate_exit_code(code, command));
    }
    let mut stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if stdout.ends_with('\n') {
        stdout.pop();
    }
    Ok(stdout)
}

#[cfg(target_os = "windows")]
fn build_command(command: &str) -> Result<Command> {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    Ok(cmd)
}

#[cfg(not(target_os = "windows"))]
fn build_command(command: &str) -> Result<Command> {
    let tokens = shell_words::split(command)?;
    let (program, args) = tokens
        .split_first()
        .ok_or_else(|| ArtError::invalid_build_file("empty command"))?;
    let mut cmd = Command::new(program);
    cmd.args(args);
    Ok(cmd)
}
