//! Local boot in a systemd-nspawn container.
//!
//! The container boots either straight from the image file or, for the
//! archive form, from a tar archive extracted into a temporary
//! directory. The directory is removed on teardown regardless of how
//! the inner check went.

use std::path::Path;
use std::process::Stdio;

use tempfile::TempDir;
use tokio::process::{Child, Command};

use crate::errors::{CheckError, CheckResult};
use crate::netns::NetNs;
use crate::options::CheckOptions;
use crate::poll;
use crate::probe::SshProber;
use crate::util;

/// Whether the artifact is a bootable image file or a tar archive of a
/// root filesystem.
pub(super) enum RootfsForm {
    Image,
    Archive,
}

pub(super) async fn boot_and_probe(
    artifact: &Path,
    opts: &CheckOptions,
    form: RootfsForm,
) -> CheckResult<()> {
    let ns = NetNs::create().await?;

    match form {
        RootfsForm::Image => {
            let mut container = NspawnContainer::boot(artifact, &ns, Source::Image).await?;
            let result = probe_localhost(&ns, opts).await;
            container.teardown().await;
            result
        }
        RootfsForm::Archive => {
            // extracted root is removed when `root` drops, on every path
            let root = extract_tar(artifact).await?;
            let mut container = NspawnContainer::boot(root.path(), &ns, Source::Directory).await?;
            let result = probe_localhost(&ns, opts).await;
            container.teardown().await;
            result
        }
    }
}

async fn probe_localhost(ns: &NetNs, opts: &CheckOptions) -> CheckResult<()> {
    let prober = SshProber::new("localhost", &opts.ssh_user, &opts.private_key, Some(ns));
    poll::wait_for_ready(&prober).await
}

enum Source {
    Image,
    Directory,
}

struct NspawnContainer {
    child: Child,
}

impl NspawnContainer {
    async fn boot(rootfs: &Path, ns: &NetNs, source: Source) -> CheckResult<Self> {
        let machine = util::random_name("bootcheck-");

        let mut cmd = ns.command("systemd-nspawn");
        cmd.arg("--boot").arg("--machine").arg(&machine);
        match source {
            Source::Image => cmd.arg("--image").arg(rootfs),
            Source::Directory => cmd.arg("--directory").arg(rootfs),
        };
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| CheckError::Setup(format!("cannot start systemd-nspawn: {e}")))?;

        tracing::debug!(ns = ns.name(), %machine, rootfs = %rootfs.display(), "booted image in nspawn");
        Ok(Self { child })
    }

    async fn teardown(&mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::error!("cannot stop nspawn container, the process could have been leaked: {e}");
        }
    }
}

/// Unpack a tar archive into a fresh temporary directory.
async fn extract_tar(archive: &Path) -> CheckResult<TempDir> {
    let dir = tempfile::Builder::new()
        .prefix("bootcheck-rootfs-")
        .tempdir()
        .map_err(|e| CheckError::Setup(format!("cannot create extraction directory: {e}")))?;

    let archive = archive.to_path_buf();
    let target = dir.path().to_path_buf();
    tokio::task::spawn_blocking(move || -> CheckResult<()> {
        let file = std::fs::File::open(&archive).map_err(|e| {
            CheckError::Setup(format!("cannot open archive {}: {e}", archive.display()))
        })?;
        tar::Archive::new(file).unpack(&target).map_err(|e| {
            CheckError::Setup(format!("cannot extract archive {}: {e}", archive.display()))
        })
    })
    .await
    .map_err(|e| CheckError::Internal(format!("extraction task panicked: {e}")))??;

    Ok(dir)
}
