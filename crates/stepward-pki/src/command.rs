//! Bounded execution of external tools.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::PkiError;

const REDACTED: &str = "[REDACTED]";

/// Captured result of a successful invocation.
#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Stdout followed by stderr, lossily decoded.
fn combine(stdout: &[u8], stderr: &[u8]) -> String {
    let mut text = String::from_utf8_lossy(stdout).into_owned();
    let err = String::from_utf8_lossy(stderr);
    if !text.is_empty() && !err.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    text.push_str(&err);
    text.trim().to_string()
}

/// Replace every occurrence of each non-empty secret with a marker.
pub fn redact(text: &str, secrets: &[&str]) -> String {
    secrets
        .iter()
        .filter(|secret| !secret.is_empty())
        .fold(text.to_string(), |acc, secret| acc.replace(secret, REDACTED))
}

/// Run `cmd` to completion, feeding it `stdin` if given, within `timeout`.
///
/// The child is killed if the deadline passes or if the returned future
/// is dropped. A non-zero exit becomes [`PkiError::CommandFailed`] with
/// the combined output, with `secrets` redacted.
pub async fn run_bounded(
    operation: &'static str,
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    secrets: &[&str],
) -> Result<CommandOutput, PkiError> {
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();

    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    debug!(operation, program = %program, "Running external command");

    let mut child = cmd.spawn().map_err(|source| PkiError::Spawn {
        operation,
        program: program.clone(),
        source,
    })?;

    let input = child.stdin.take();
    let feed = async move {
        if let (Some(mut pipe), Some(bytes)) = (input, stdin) {
            // A child that exits without reading stdin closes the pipe;
            // its exit status is what matters.
            let _ = pipe.write_all(bytes).await;
            let _ = pipe.shutdown().await;
        }
    };
    let run = async {
        let ((), output) = tokio::join!(feed, child.wait_with_output());
        output
    };

    let output = match tokio::time::timeout(timeout, run).await {
        Ok(result) => result.map_err(|source| PkiError::Spawn {
            operation,
            program: program.clone(),
            source,
        })?,
        Err(_) => {
            return Err(PkiError::CommandTimeout {
                operation,
                program,
                timeout_secs: timeout.as_secs(),
            });
        }
    };

    if !output.status.success() {
        return Err(PkiError::CommandFailed {
            operation,
            program,
            exit_code: output.status.code(),
            output: redact(&combine(&output.stdout, &output.stderr), secrets),
        });
    }

    Ok(CommandOutput {
        stdout: output.stdout,
        stderr: output.stderr,
    })
}
