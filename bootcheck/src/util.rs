//! Small helpers shared across backends.

use tokio::process::Command;

use crate::errors::{CheckError, CheckResult};

/// Generate a unique resource name with the given prefix.
///
/// Used for cloud images and instances, network namespaces and machine
/// names, so that concurrently running verification units can never
/// collide.
pub(crate) fn random_name(prefix: &str) -> String {
    format!("{prefix}{}", hex::encode(rand::random::<[u8; 8]>()))
}

/// Run a command to completion and capture its stdout.
///
/// A non-zero exit status becomes a `Setup` error carrying the trimmed
/// stderr, so provider CLI diagnostics end up in the check result.
pub(crate) async fn run_capture(cmd: &mut Command, what: &str) -> CheckResult<String> {
    let output = cmd
        .output()
        .await
        .map_err(|e| CheckError::Setup(format!("{what}: cannot execute: {e}")))?;

    if !output.status.success() {
        return Err(CheckError::Setup(format!(
            "{what}: {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// The architecture name used in test specifications ("x86_64", "aarch64").
pub(crate) fn current_arch() -> &'static str {
    std::env::consts::ARCH
}
