//! Local boot in qemu.
//!
//! The VM runs inside a private network namespace in snapshot mode, so
//! the image is never modified. User-mode networking forwards the
//! guest's port 22 to loopback inside the namespace, where the probe
//! connects to "localhost".

use std::path::Path;
use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::errors::{CheckError, CheckResult};
use crate::netns::NetNs;
use crate::options::CheckOptions;
use crate::poll;
use crate::probe::SshProber;

pub(super) async fn boot_and_probe(image: &Path, opts: &CheckOptions) -> CheckResult<()> {
    let ns = NetNs::create().await?;
    let mut vm = QemuVm::boot(image, &ns).await?;

    let prober = SshProber::new("localhost", &opts.ssh_user, &opts.private_key, Some(&ns));
    let result = poll::wait_for_ready(&prober).await;

    vm.teardown().await;
    result
}

/// A running qemu process. `kill_on_drop` backs up the explicit
/// teardown, so an abandoned handle cannot leak the process.
struct QemuVm {
    child: Child,
}

impl QemuVm {
    async fn boot(image: &Path, ns: &NetNs) -> CheckResult<Self> {
        let mut cmd = ns.command(&format!("qemu-system-{}", std::env::consts::ARCH));
        cmd.arg("-cpu")
            .arg("host")
            .arg("-accel")
            .arg("kvm")
            .arg("-m")
            .arg("2048")
            .arg("-snapshot")
            .arg("-net")
            .arg("nic,model=virtio")
            .arg("-net")
            .arg("user,hostfwd=tcp:127.0.0.1:22-:22")
            .arg("-nographic")
            .arg(image)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| CheckError::Setup(format!("cannot start qemu: {e}")))?;

        tracing::debug!(ns = ns.name(), image = %image.display(), "booted image in qemu");
        Ok(Self { child })
    }

    async fn teardown(&mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::error!("cannot stop qemu, the process could have been leaked: {e}");
        }
    }
}
