//! Isolated network namespaces for local boots.
//!
//! Every locally booted instance gets its own named namespace so that
//! concurrently running verification units cannot interfere with each
//! other, and so the probe can reach the instance on loopback port 22
//! without touching the host's network.

use std::process::Stdio;

use tokio::process::Command;

use crate::errors::CheckResult;
use crate::util;

/// A named network namespace, deleted when dropped.
pub struct NetNs {
    name: String,
}

impl NetNs {
    /// Create a uniquely named namespace and bring its loopback up.
    pub async fn create() -> CheckResult<Self> {
        let name = util::random_name("bootcheck-ns-");

        util::run_capture(
            Command::new("ip").args(["netns", "add", name.as_str()]),
            "creating network namespace",
        )
        .await?;

        // From here on the namespace exists; Drop releases it even if
        // the loopback setup below fails.
        let ns = Self { name };

        util::run_capture(
            ns.command("ip").args(["link", "set", "lo", "up"]),
            "bringing up loopback in namespace",
        )
        .await?;

        tracing::debug!(ns = %ns.name, "created network namespace");
        Ok(ns)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// A command that runs inside this namespace.
    pub fn command(&self, program: &str) -> Command {
        let mut cmd = Command::new("ip");
        cmd.args(["netns", "exec", self.name.as_str(), program]);
        cmd
    }
}

impl Drop for NetNs {
    fn drop(&mut self) {
        let result = std::process::Command::new("ip")
            .args(["netns", "delete", self.name.as_str()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match result {
            Ok(status) if status.success() => {
                tracing::debug!(ns = %self.name, "deleted network namespace");
            }
            Ok(status) => {
                tracing::error!(ns = %self.name, %status, "cannot delete network namespace, it could have been leaked");
            }
            Err(e) => {
                tracing::error!(ns = %self.name, "cannot delete network namespace, it could have been leaked: {e}");
            }
        }
    }
}
