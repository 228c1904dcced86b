//! Single-shot boot readiness probe.
//!
//! One probe runs `systemctl --wait is-system-running` on the instance
//! over SSH, bounded by a fixed timeout, and classifies the result. No
//! retrying happens at this layer; that is the poller's job.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::netns::NetNs;

/// Upper bound for one probe attempt.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Exit status ssh uses when the connection could not be established.
/// While the guest is still bringing up sshd this is expected, so it
/// counts as "not ready yet" rather than a failure.
const SSH_CONNECT_FAILED: i32 = 255;

/// Classified result of one readiness probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The instance reported a healthy system state.
    Ready,
    /// The instance is not reachable yet or still starting; worth
    /// another attempt.
    TransientUnready,
    /// The instance is reachable but broken, or the probe itself could
    /// not run. Retrying cannot help.
    HardFailure(String),
}

/// The seam between the retry poller and the probe transport.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self) -> ProbeOutcome;
}

/// Probes an address over SSH, optionally from within a network
/// namespace.
pub struct SshProber<'a> {
    address: String,
    user: String,
    private_key: PathBuf,
    netns: Option<&'a NetNs>,
}

impl<'a> SshProber<'a> {
    pub fn new(address: &str, user: &str, private_key: &Path, netns: Option<&'a NetNs>) -> Self {
        Self {
            address: address.to_string(),
            user: user.to_string(),
            private_key: private_key.to_path_buf(),
            netns,
        }
    }

    fn command(&self) -> Command {
        let mut cmd = match self.netns {
            Some(ns) => ns.command("ssh"),
            None => Command::new("ssh"),
        };
        cmd.arg("-p")
            .arg("22")
            .arg("-i")
            .arg(&self.private_key)
            .arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg("-o")
            .arg("UserKnownHostsFile=/dev/null")
            .arg(format!("{}@{}", self.user, self.address))
            .arg("systemctl --wait is-system-running");
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Prober for SshProber<'_> {
    async fn probe(&self) -> ProbeOutcome {
        let mut cmd = self.command();

        match tokio::time::timeout(PROBE_TIMEOUT, cmd.output()).await {
            Err(_) => ProbeOutcome::TransientUnready,
            Ok(Err(e)) => ProbeOutcome::HardFailure(format!("ssh could not be executed: {e}")),
            Ok(Ok(output)) => classify_output(&output),
        }
    }
}

/// Classify a finished probe process.
///
/// `systemctl is-system-running` exits non-zero for anything but
/// "running", so a non-zero exit alone is not conclusive; only the
/// connection-failure status short-circuits, everything else is decided
/// by the reported state.
pub(crate) fn classify_output(output: &Output) -> ProbeOutcome {
    if output.status.code() == Some(SSH_CONNECT_FAILED) {
        return ProbeOutcome::TransientUnready;
    }

    classify_status(String::from_utf8_lossy(&output.stdout).trim())
}

/// Classify the system state string reported by the instance.
pub(crate) fn classify_status(status: &str) -> ProbeOutcome {
    match status {
        "running" => ProbeOutcome::Ready,
        "degraded" => {
            tracing::warn!("boot check passed, but the system is degraded");
            ProbeOutcome::Ready
        }
        "starting" => ProbeOutcome::TransientUnready,
        other => ProbeOutcome::HardFailure(format!("unexpected status: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::process::ExitStatus;

    fn output(code: i32, stdout: &str) -> Output {
        Output {
            status: ExitStatus::from_raw(code << 8),
            stdout: stdout.as_bytes().to_vec(),
            stderr: Vec::new(),
        }
    }

    #[test]
    fn status_classification() {
        assert_eq!(classify_status("running"), ProbeOutcome::Ready);
        assert_eq!(classify_status("degraded"), ProbeOutcome::Ready);
        assert_eq!(classify_status("starting"), ProbeOutcome::TransientUnready);
        assert_eq!(
            classify_status("bogus-state"),
            ProbeOutcome::HardFailure("unexpected status: bogus-state".to_string())
        );
    }

    #[test]
    fn connection_refused_is_transient() {
        assert_eq!(
            classify_output(&output(255, "")),
            ProbeOutcome::TransientUnready
        );
    }

    #[test]
    fn reported_state_wins_over_exit_status() {
        // is-system-running exits 1 for degraded, the state still counts
        assert_eq!(
            classify_output(&output(1, "degraded\n")),
            ProbeOutcome::Ready
        );
    }

    #[test]
    fn clean_running_is_ready() {
        assert_eq!(classify_output(&output(0, "running\n")), ProbeOutcome::Ready);
    }

    #[test]
    fn unexpected_state_is_hard_failure() {
        let outcome = classify_output(&output(1, "maintenance\n"));
        assert_eq!(
            outcome,
            ProbeOutcome::HardFailure("unexpected status: maintenance".to_string())
        );
    }
}
