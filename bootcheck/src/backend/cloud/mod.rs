//! Cloud boot backends.
//!
//! The provider-specific glue (credential resolution and the calls to
//! the provider tooling) sits behind [`CloudProvider`]; the lifecycle
//! above it is shared: upload the image under a unique name, boot an
//! instance with an ephemeral key injected via user-data, probe it, and
//! delete both the instance and the uploaded image on every exit path.
//! Leaked cloud resources cost money, so cleanup failures are reported
//! loudly, but they never replace the check result.

pub(crate) mod aws;
pub(crate) mod azure;
pub(crate) mod openstack;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::errors::CheckResult;
use crate::keys::KeyPair;
use crate::options::CheckOptions;
use crate::poll;
use crate::probe::{Prober, SshProber};
use crate::util;

/// An image uploaded to a provider.
///
/// Carries a teardown obligation: dropping the handle without the
/// lifecycle having attempted deletion raises an alarm, since nothing
/// else can release the resource anymore.
#[derive(Debug)]
pub struct RemoteImage {
    pub id: String,
    pub name: String,
    torn_down: AtomicBool,
}

impl RemoteImage {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            torn_down: AtomicBool::new(false),
        }
    }

    fn mark_torn_down(&self) {
        self.torn_down.store(true, Ordering::SeqCst);
    }
}

impl Drop for RemoteImage {
    fn drop(&mut self) {
        if !self.torn_down.load(Ordering::SeqCst) {
            tracing::error!(
                image = %self.id,
                "uploaded image dropped without teardown, the resource could have been leaked"
            );
        }
    }
}

/// A booted instance. Only ever constructed with a known, reachable
/// address; "booted but address unknown" is not an acquired instance.
#[derive(Debug)]
pub struct RemoteInstance {
    pub id: String,
    pub address: String,
    torn_down: AtomicBool,
}

impl RemoteInstance {
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            torn_down: AtomicBool::new(false),
        }
    }

    fn mark_torn_down(&self) {
        self.torn_down.store(true, Ordering::SeqCst);
    }
}

impl Drop for RemoteInstance {
    fn drop(&mut self) {
        if !self.torn_down.load(Ordering::SeqCst) {
            tracing::error!(
                instance = %self.id,
                "instance dropped without teardown, the resource could have been leaked"
            );
        }
    }
}

/// Contract between the shared lifecycle and one cloud provider.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Resolve credentials from the environment. `Ok(None)` means none
    /// are configured; the dispatcher then falls back to qemu instead
    /// of failing. Partially configured credentials are an error.
    fn from_env() -> CheckResult<Option<Self>>
    where
        Self: Sized;

    fn name(&self) -> &'static str;

    /// Upload `image` under `name`, returning a handle to the stored
    /// image.
    async fn upload_image(&self, image: &Path, name: &str) -> CheckResult<RemoteImage>;

    /// Boot an instance of the uploaded image with `public_key`
    /// authorized via the provider's user-data mechanism. Returns only
    /// once the instance has a reachable address.
    async fn boot_instance(
        &self,
        image: &RemoteImage,
        public_key: &str,
        name: &str,
    ) -> CheckResult<RemoteInstance>;

    async fn delete_instance(&self, instance: &RemoteInstance) -> CheckResult<()>;

    async fn delete_image(&self, image: &RemoteImage) -> CheckResult<()>;
}

/// cloud-init user-data authorizing `public_key` for the image's
/// default user.
pub(crate) fn cloud_init_user_data(public_key: &str) -> String {
    format!("#cloud-config\nssh_authorized_keys:\n  - {public_key}\n")
}

/// Look up a required string field in a provider response.
pub(crate) fn json_str(doc: &serde_json::Value, pointer: &str, what: &str) -> CheckResult<String> {
    doc.pointer(pointer)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            crate::errors::CheckError::Setup(format!("{what}: response has no {pointer} field"))
        })
}

/// Read a credential variable that must accompany the already-detected
/// primary one.
pub(crate) fn require_env(var: &str) -> CheckResult<String> {
    std::env::var(var).map_err(|_| {
        crate::errors::CheckError::Setup(format!("incomplete credentials: {var} is missing"))
    })
}

/// Run the full remote lifecycle for one image.
pub(crate) async fn run<P: CloudProvider>(
    provider: &P,
    image: &Path,
    opts: &CheckOptions,
) -> CheckResult<()> {
    let keys = KeyPair::generate().await?;
    let private_key = keys.private_key();
    let user = opts.ssh_user.clone();

    run_with(provider, image, keys.public_key(), |address| {
        Box::new(SshProber::new(address, &user, &private_key, None))
    })
    .await
}

/// Lifecycle with the probe transport injected, so provider behavior is
/// testable without SSH.
async fn run_with<P, F>(
    provider: &P,
    image: &Path,
    public_key: &str,
    make_prober: F,
) -> CheckResult<()>
where
    P: CloudProvider,
    F: Fn(&str) -> Box<dyn Prober>,
{
    let name = util::random_name("bootcheck-image-");

    let uploaded = provider.upload_image(image, &name).await?;
    tracing::info!(provider = provider.name(), image = %uploaded.id, "uploaded image");

    let result = boot_and_probe(provider, &uploaded, public_key, &name, &make_prober).await;

    // the uploaded image is deleted no matter how the boot went
    if let Err(e) = provider.delete_image(&uploaded).await {
        tracing::error!(
            provider = provider.name(),
            image = %uploaded.id,
            "cannot delete uploaded image, the resource could have been leaked: {e}"
        );
    }
    uploaded.mark_torn_down();

    result
}

async fn boot_and_probe<P, F>(
    provider: &P,
    uploaded: &RemoteImage,
    public_key: &str,
    name: &str,
    make_prober: &F,
) -> CheckResult<()>
where
    P: CloudProvider,
    F: Fn(&str) -> Box<dyn Prober>,
{
    let instance = provider.boot_instance(uploaded, public_key, name).await?;
    tracing::info!(
        provider = provider.name(),
        instance = %instance.id,
        address = %instance.address,
        "instance is up"
    );

    let prober = make_prober(&instance.address);
    let result = poll::wait_for_ready(prober.as_ref()).await;

    // attempted even when the probe failed; failure here is reported but
    // never overrides `result`
    if let Err(e) = provider.delete_instance(&instance).await {
        tracing::error!(
            provider = provider.name(),
            instance = %instance.id,
            "cannot delete instance, the resource could have been leaked: {e}"
        );
    }
    instance.mark_torn_down();

    result
}
