//! Runner for a step's declared verification command.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use wait_timeout::ChildExt;

#[derive(Debug, Clone)]
pub struct VerifyRequest {
    pub workdir: PathBuf,
    /// Program plus arguments; must be non-empty.
    pub command: Vec<String>,
    pub log_path: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

/// Run the verification command and report whether it succeeded.
///
/// A timeout or non-zero exit is `false`, never an error: the result is
/// recorded as a flag and must not abort the pipeline.
pub fn run_verify(request: &VerifyRequest) -> Result<bool> {
    let program = request
        .command
        .first()
        .ok_or_else(|| anyhow!("verification command is empty"))?;

    let mut child = Command::new(program)
        .args(&request.command[1..])
        .current_dir(&request.workdir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("spawn verification command '{program}'"))?;

    let status = match child
        .wait_timeout(request.timeout)
        .context("wait for verification timeout")?
    {
        Some(status) => status,
        None => {
            child.kill().context("kill verification process")?;
            child.wait().context("wait verification process")?;
            write_verify_log(
                &request.log_path,
                b"",
                b"verification timed out",
                request.output_limit_bytes,
            )?;
            return Ok(false);
        }
    };

    let output = child
        .wait_with_output()
        .context("collect verification output")?;
    write_verify_log(
        &request.log_path,
        &output.stdout,
        &output.stderr,
        request.output_limit_bytes,
    )?;

    Ok(status.success())
}

fn write_verify_log(
    path: &Path,
    stdout: &[u8],
    stderr: &[u8],
    output_limit: usize,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create verify log dir {}", parent.display()))?;
    }
    let mut buf = String::new();
    buf.push_str("=== stdout ===\n");
    buf.push_str(&String::from_utf8_lossy(stdout));
    buf.push_str("\n=== stderr ===\n");
    buf.push_str(&String::from_utf8_lossy(stderr));

    if buf.len() > output_limit {
        let truncated = format!(
            "{}\n[truncated {} bytes]\n",
            &buf[..output_limit],
            buf.len() - output_limit
        );
        fs::write(path, truncated)
            .with_context(|| format!("write verify log {}", path.display()))?;
        return Ok(());
    }

    fs::write(path, buf).with_context(|| format!("write verify log {}", path.display()))?;
    Ok(())
}
