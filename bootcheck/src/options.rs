//! Run-level options.

use std::path::PathBuf;

/// Configuration for one verification run.
///
/// The defaults point at the locations used on the test hosts; every
/// field can be overridden from the CLI.
#[derive(Clone, Debug)]
pub struct CheckOptions {
    /// Image builder binary, fed the manifest on stdin.
    pub osbuild: PathBuf,

    /// Metadata inspection binary.
    pub image_info: PathBuf,

    /// Directory scanned for test cases when none are named explicitly.
    pub cases_dir: PathBuf,

    /// User the readiness probe logs in as.
    pub ssh_user: String,

    /// Private key matching the public key baked into locally booted
    /// images. Cloud boots generate an ephemeral pair instead.
    pub private_key: PathBuf,

    /// When set, images are not booted locally with qemu. Checks that
    /// would need it are skipped, including cloud checks falling back
    /// because of missing credentials.
    pub disable_local_boot: bool,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            osbuild: PathBuf::from("osbuild"),
            image_info: PathBuf::from("/usr/libexec/osbuild-composer-test/image-info"),
            cases_dir: PathBuf::from("/usr/share/tests/osbuild-composer/cases"),
            ssh_user: "redhat".to_string(),
            private_key: PathBuf::from("/usr/share/tests/osbuild-composer/keyring/id_rsa"),
            disable_local_boot: false,
        }
    }
}
