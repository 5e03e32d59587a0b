//! Shared plumbing for backends that drive an external tool

use super::InitError;
use crate::error::{Error, Result};
use image::RgbaImage;
use std::path::PathBuf;
use std::process::{Command, Output};

/// Run `program args...`, mapping spawn failures and non-zero exits to
/// `ActionFailed` with the tool's stderr.
pub(crate) fn run(action: &str, program: &str, args: &[&str]) -> Result<Output> {
    tracing::trace!(program, ?args, "exec");
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| Error::action_failed(action, format!("{}: {}", program, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let reason = match stderr.trim() {
            "" => format!("{} exited with {}", program, output.status),
            msg => format!("{}: {}", program, msg),
        };
        return Err(Error::action_failed(action, reason));
    }
    Ok(output)
}

/// Run a tool that writes an encoded image to stdout.
pub(crate) fn capture_stdout(program: &str, args: &[&str]) -> Result<RgbaImage> {
    let output = run("capture", program, args)?;
    image::load_from_memory(&output.stdout)
        .map(|img| img.to_rgba8())
        .map_err(|e| Error::action_failed("capture", format!("{}: {}", program, e)))
}

/// Locate `program` on `PATH`.
pub(crate) fn which(program: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

pub(crate) fn require(program: &str) -> std::result::Result<PathBuf, InitError> {
    which(program).ok_or_else(|| InitError::MissingTool(program.to_string()))
}
