//! Ephemeral SSH key pairs for cloud boots.

use std::path::PathBuf;

use tempfile::TempDir;
use tokio::process::Command;

use crate::errors::{CheckError, CheckResult};
use crate::util;

/// A freshly generated ed25519 key pair in a private temporary
/// directory. The key material is removed when the pair is dropped.
pub struct KeyPair {
    dir: TempDir,
    public_key: String,
}

impl KeyPair {
    pub async fn generate() -> CheckResult<Self> {
        let dir = tempfile::Builder::new()
            .prefix("bootcheck-keys-")
            .tempdir()
            .map_err(|e| CheckError::Setup(format!("cannot create key directory: {e}")))?;

        let key_path = dir.path().join("id_ed25519");
        util::run_capture(
            Command::new("ssh-keygen")
                .arg("-t")
                .arg("ed25519")
                .arg("-N")
                .arg("")
                .arg("-q")
                .arg("-f")
                .arg(&key_path),
            "generating ssh key pair",
        )
        .await?;

        let public_key = tokio::fs::read_to_string(dir.path().join("id_ed25519.pub"))
            .await
            .map_err(|e| CheckError::Setup(format!("cannot read generated public key: {e}")))?
            .trim()
            .to_string();

        Ok(Self { dir, public_key })
    }

    pub fn private_key(&self) -> PathBuf {
        self.dir.path().join("id_ed25519")
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }
}
