//! Boot backends and dispatch.
//!
//! A backend owns acquiring a running, reachable instance of an image
//! and tearing down everything it allocated, no matter how the check
//! ends. The dispatcher maps the boot type of a test case to exactly one
//! backend; cloud backends without credentials fall back to qemu.

pub mod cloud;
mod nspawn;
mod qemu;

use std::path::Path;
use std::str::FromStr;

use crate::errors::{CheckError, CheckResult};
use crate::options::CheckOptions;
use crate::report::CheckOutcome;

use cloud::CloudProvider;

/// One boot execution environment family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootBackend {
    Qemu,
    Nspawn,
    NspawnExtract,
    Aws,
    Azure,
    OpenStack,
}

impl FromStr for BootBackend {
    type Err = CheckError;

    fn from_str(s: &str) -> CheckResult<Self> {
        match s {
            "qemu" => Ok(BootBackend::Qemu),
            "nspawn" => Ok(BootBackend::Nspawn),
            "nspawn-extract" => Ok(BootBackend::NspawnExtract),
            "aws" => Ok(BootBackend::Aws),
            "azure" => Ok(BootBackend::Azure),
            "openstack" => Ok(BootBackend::OpenStack),
            other => Err(CheckError::Config(format!("unknown boot type: {other}"))),
        }
    }
}

/// Boot `image` on the selected backend and wait for readiness.
pub async fn run_boot_check(
    backend: BootBackend,
    image: &Path,
    opts: &CheckOptions,
) -> CheckOutcome {
    match backend {
        BootBackend::Qemu => local_qemu_outcome(image, opts).await,
        BootBackend::Nspawn => {
            outcome(nspawn::boot_and_probe(image, opts, nspawn::RootfsForm::Image).await)
        }
        BootBackend::NspawnExtract => {
            outcome(nspawn::boot_and_probe(image, opts, nspawn::RootfsForm::Archive).await)
        }
        BootBackend::Aws => {
            cloud_outcome(cloud::aws::AwsProvider::from_env(), "AWS", image, opts).await
        }
        BootBackend::Azure => {
            cloud_outcome(cloud::azure::AzureProvider::from_env(), "Azure", image, opts).await
        }
        BootBackend::OpenStack => {
            cloud_outcome(
                cloud::openstack::OpenStackProvider::from_env(),
                "OpenStack",
                image,
                opts,
            )
            .await
        }
    }
}

async fn local_qemu_outcome(image: &Path, opts: &CheckOptions) -> CheckOutcome {
    if opts.disable_local_boot {
        return CheckOutcome::Skipped(
            "local booting was disabled by --disable-local-boot".to_string(),
        );
    }
    outcome(qemu::boot_and_probe(image, opts).await)
}

/// Route a cloud check through the provider, or through the local qemu
/// backend when no credentials are configured. Absent credentials are a
/// policy signal, not an error; the remote path is never entered.
async fn cloud_outcome<P: CloudProvider>(
    resolved: CheckResult<Option<P>>,
    label: &str,
    image: &Path,
    opts: &CheckOptions,
) -> CheckOutcome {
    match resolved {
        Err(e) => CheckOutcome::Failed(e.to_string()),
        Ok(None) => {
            tracing::info!("no {label} credentials given, falling back to booting using qemu");
            local_qemu_outcome(image, opts).await
        }
        Ok(Some(provider)) => outcome(cloud::run(&provider, image, opts).await),
    }
}

fn outcome(result: CheckResult<()>) -> CheckOutcome {
    match result {
        Ok(()) => CheckOutcome::Passed,
        Err(e) => CheckOutcome::Failed(e.to_string()),
    }
}

/// Whether hardware-accelerated virtualization is available.
///
/// On aarch64 qemu cannot boot the images without it, so the caller
/// skips the boot check entirely when this returns false there.
pub(crate) fn kvm_available() -> bool {
    match std::fs::metadata("/dev/kvm") {
        Ok(_) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            tracing::warn!("cannot stat /dev/kvm, assuming no KVM support: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cloud::{RemoteImage, RemoteInstance};

    #[test]
    fn selector_mapping() {
        assert_eq!("qemu".parse::<BootBackend>().unwrap(), BootBackend::Qemu);
        assert_eq!("nspawn".parse::<BootBackend>().unwrap(), BootBackend::Nspawn);
        assert_eq!(
            "nspawn-extract".parse::<BootBackend>().unwrap(),
            BootBackend::NspawnExtract
        );
        assert_eq!("aws".parse::<BootBackend>().unwrap(), BootBackend::Aws);
        assert_eq!("azure".parse::<BootBackend>().unwrap(), BootBackend::Azure);
        assert_eq!(
            "openstack".parse::<BootBackend>().unwrap(),
            BootBackend::OpenStack
        );
    }

    #[test]
    fn unknown_selector_is_a_configuration_error() {
        let err = "warp-drive".parse::<BootBackend>().unwrap_err();
        assert!(matches!(err, CheckError::Config(_)));
        assert!(err.to_string().contains("warp-drive"));
    }

    /// A provider that must never be called.
    struct UnreachableProvider;

    #[async_trait]
    impl CloudProvider for UnreachableProvider {
        fn from_env() -> CheckResult<Option<Self>> {
            Ok(None)
        }

        fn name(&self) -> &'static str {
            "unreachable"
        }

        async fn upload_image(&self, _image: &Path, _name: &str) -> CheckResult<RemoteImage> {
            unreachable!("remote path entered without credentials")
        }

        async fn boot_instance(
            &self,
            _image: &RemoteImage,
            _public_key: &str,
            _name: &str,
        ) -> CheckResult<RemoteInstance> {
            unreachable!("remote path entered without credentials")
        }

        async fn delete_instance(&self, _instance: &RemoteInstance) -> CheckResult<()> {
            unreachable!("remote path entered without credentials")
        }

        async fn delete_image(&self, _image: &RemoteImage) -> CheckResult<()> {
            unreachable!("remote path entered without credentials")
        }
    }

    #[tokio::test]
    async fn missing_credentials_fall_back_to_the_local_path() {
        // with local boot disabled the fallback is observable as a skip,
        // without any provider or qemu work happening
        let opts = CheckOptions {
            disable_local_boot: true,
            ..CheckOptions::default()
        };

        let outcome = cloud_outcome::<UnreachableProvider>(
            UnreachableProvider::from_env(),
            "AWS",
            Path::new("image.qcow2"),
            &opts,
        )
        .await;

        assert!(matches!(outcome, CheckOutcome::Skipped(_)));
    }

    #[tokio::test]
    async fn partial_credentials_fail_the_check() {
        let opts = CheckOptions::default();
        let outcome = cloud_outcome::<UnreachableProvider>(
            Err(CheckError::Setup("AWS_SECRET_ACCESS_KEY is missing".into())),
            "AWS",
            Path::new("image.qcow2"),
            &opts,
        )
        .await;

        assert!(matches!(outcome, CheckOutcome::Failed(_)));
    }
}
