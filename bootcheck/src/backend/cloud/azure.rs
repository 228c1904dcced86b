//! Azure glue over the `az` CLI.
//!
//! The VHD is uploaded as a page blob, turned into a managed image and
//! booted from there. `az vm create` blocks until the VM has a public
//! address, so no extra wait step is needed.

use std::io::Write;
use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use crate::errors::{CheckError, CheckResult};
use crate::util;

use super::{CloudProvider, RemoteImage, RemoteInstance, cloud_init_user_data, json_str, require_env};

const VM_SIZE: &str = "Standard_B2s";

pub struct AzureProvider {
    resource_group: String,
    storage_account: String,
    storage_key: String,
    container: String,
}

impl AzureProvider {
    async fn az_json(&self, args: &[&str], what: &str) -> CheckResult<serde_json::Value> {
        let out = util::run_capture(
            Command::new("az").args(args).args(["--output", "json"]),
            what,
        )
        .await?;
        serde_json::from_str(&out)
            .map_err(|e| CheckError::Setup(format!("{what}: cannot decode response: {e}")))
    }

    fn blob_url(&self, blob: &str) -> String {
        format!(
            "https://{}.blob.core.windows.net/{}/{}",
            self.storage_account, self.container, blob
        )
    }
}

#[async_trait]
impl CloudProvider for AzureProvider {
    fn from_env() -> CheckResult<Option<Self>> {
        if std::env::var_os("AZURE_STORAGE_ACCOUNT").is_none() {
            return Ok(None);
        }
        Ok(Some(Self {
            resource_group: require_env("AZURE_RESOURCE_GROUP")?,
            storage_account: require_env("AZURE_STORAGE_ACCOUNT")?,
            storage_key: require_env("AZURE_STORAGE_ACCESS_KEY")?,
            container: require_env("AZURE_CONTAINER_NAME")?,
        }))
    }

    fn name(&self) -> &'static str {
        "azure"
    }

    async fn upload_image(&self, image: &Path, name: &str) -> CheckResult<RemoteImage> {
        let blob = format!("{name}.vhd");
        util::run_capture(
            Command::new("az")
                .args([
                    "storage",
                    "blob",
                    "upload",
                    "--type",
                    "page",
                    "--account-name",
                    self.storage_account.as_str(),
                    "--account-key",
                    self.storage_key.as_str(),
                    "--container-name",
                    self.container.as_str(),
                    "--name",
                    blob.as_str(),
                    "--file",
                ])
                .arg(image),
            "uploading image blob",
        )
        .await?;

        let doc = self
            .az_json(
                &[
                    "image",
                    "create",
                    "--resource-group",
                    self.resource_group.as_str(),
                    "--name",
                    name,
                    "--os-type",
                    "Linux",
                    "--source",
                    &self.blob_url(&blob),
                ],
                "creating managed image",
            )
            .await?;
        let id = json_str(&doc, "/id", "creating managed image")?;

        Ok(RemoteImage::new(id, blob))
    }

    async fn boot_instance(
        &self,
        image: &RemoteImage,
        public_key: &str,
        name: &str,
    ) -> CheckResult<RemoteInstance> {
        // az only takes user-data from a file
        let mut user_data = tempfile::NamedTempFile::new()
            .map_err(|e| CheckError::Setup(format!("cannot create user-data file: {e}")))?;
        user_data
            .write_all(cloud_init_user_data(public_key).as_bytes())
            .map_err(|e| CheckError::Setup(format!("cannot write user-data file: {e}")))?;

        let doc = self
            .az_json(
                &[
                    "vm",
                    "create",
                    "--resource-group",
                    self.resource_group.as_str(),
                    "--name",
                    name,
                    "--image",
                    image.id.as_str(),
                    "--size",
                    VM_SIZE,
                    "--custom-data",
                    &user_data.path().display().to_string(),
                ],
                "booting virtual machine",
            )
            .await?;
        let address = json_str(&doc, "/publicIpAddress", "booting virtual machine")?;
        if address.is_empty() {
            return Err(CheckError::Setup(
                "booting virtual machine: no public address was assigned".to_string(),
            ));
        }

        Ok(RemoteInstance::new(name, address))
    }

    async fn delete_instance(&self, instance: &RemoteInstance) -> CheckResult<()> {
        util::run_capture(
            Command::new("az").args([
                "vm",
                "delete",
                "--yes",
                "--resource-group",
                self.resource_group.as_str(),
                "--name",
                instance.id.as_str(),
            ]),
            "deleting virtual machine",
        )
        .await?;
        Ok(())
    }

    async fn delete_image(&self, image: &RemoteImage) -> CheckResult<()> {
        // managed image and backing blob are independent, both are
        // always attempted
        let image_delete = util::run_capture(
            Command::new("az").args([
                "image",
                "delete",
                "--resource-group",
                self.resource_group.as_str(),
                "--ids",
                image.id.as_str(),
            ]),
            "deleting managed image",
        )
        .await;

        let blob_delete = util::run_capture(
            Command::new("az").args([
                "storage",
                "blob",
                "delete",
                "--account-name",
                self.storage_account.as_str(),
                "--account-key",
                self.storage_key.as_str(),
                "--container-name",
                self.container.as_str(),
                "--name",
                image.name.as_str(),
            ]),
            "deleting image blob",
        )
        .await;

        image_delete?;
        blob_delete?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // one test owns all AZURE_* variables; env mutation is process-global
    #[test]
    fn credential_resolution() {
        unsafe {
            std::env::remove_var("AZURE_STORAGE_ACCOUNT");
            std::env::remove_var("AZURE_RESOURCE_GROUP");
            std::env::remove_var("AZURE_STORAGE_ACCESS_KEY");
            std::env::remove_var("AZURE_CONTAINER_NAME");
        }
        assert!(AzureProvider::from_env().unwrap().is_none());

        unsafe {
            std::env::set_var("AZURE_STORAGE_ACCOUNT", "bootcheckstore");
        }
        assert!(AzureProvider::from_env().is_err());

        unsafe {
            std::env::set_var("AZURE_RESOURCE_GROUP", "bootcheck-rg");
            std::env::set_var("AZURE_STORAGE_ACCESS_KEY", "key");
            std::env::set_var("AZURE_CONTAINER_NAME", "images");
        }
        let provider = AzureProvider::from_env().unwrap().unwrap();
        assert_eq!(
            provider.blob_url("img.vhd"),
            "https://bootcheckstore.blob.core.windows.net/images/img.vhd"
        );

        unsafe {
            std::env::remove_var("AZURE_STORAGE_ACCOUNT");
            std::env::remove_var("AZURE_RESOURCE_GROUP");
            std::env::remove_var("AZURE_STORAGE_ACCESS_KEY");
            std::env::remove_var("AZURE_CONTAINER_NAME");
        }
    }
}
