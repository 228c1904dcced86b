//! OpenStack glue over the `openstack` CLI.
//!
//! The CLI reads the `OS_*` environment itself; this module only checks
//! that the environment is complete enough to try.

use std::io::Write;
use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use crate::errors::{CheckError, CheckResult};
use crate::util;

use super::{CloudProvider, RemoteImage, RemoteInstance, cloud_init_user_data, json_str, require_env};

const DEFAULT_FLAVOR: &str = "m1.small";

pub struct OpenStackProvider {
    flavor: String,
}

impl OpenStackProvider {
    async fn os_json(&self, args: &[&str], what: &str) -> CheckResult<serde_json::Value> {
        let out = util::run_capture(
            Command::new("openstack").args(args).args(["-f", "json"]),
            what,
        )
        .await?;
        serde_json::from_str(&out)
            .map_err(|e| CheckError::Setup(format!("{what}: cannot decode response: {e}")))
    }
}

#[async_trait]
impl CloudProvider for OpenStackProvider {
    fn from_env() -> CheckResult<Option<Self>> {
        if std::env::var_os("OS_AUTH_URL").is_none() {
            return Ok(None);
        }
        require_env("OS_USERNAME")?;
        require_env("OS_PASSWORD")?;
        require_env("OS_PROJECT_NAME")?;
        Ok(Some(Self {
            flavor: std::env::var("OS_FLAVOR").unwrap_or_else(|_| DEFAULT_FLAVOR.to_string()),
        }))
    }

    fn name(&self) -> &'static str {
        "openstack"
    }

    async fn upload_image(&self, image: &Path, name: &str) -> CheckResult<RemoteImage> {
        let doc = self
            .os_json(
                &[
                    "image",
                    "create",
                    "--disk-format",
                    "qcow2",
                    "--file",
                    &image.display().to_string(),
                    name,
                ],
                "uploading image",
            )
            .await?;
        let id = json_str(&doc, "/id", "uploading image")?;

        Ok(RemoteImage::new(id, name))
    }

    async fn boot_instance(
        &self,
        image: &RemoteImage,
        public_key: &str,
        name: &str,
    ) -> CheckResult<RemoteInstance> {
        let mut user_data = tempfile::NamedTempFile::new()
            .map_err(|e| CheckError::Setup(format!("cannot create user-data file: {e}")))?;
        user_data
            .write_all(cloud_init_user_data(public_key).as_bytes())
            .map_err(|e| CheckError::Setup(format!("cannot write user-data file: {e}")))?;

        // --wait blocks until the server is active
        let doc = self
            .os_json(
                &[
                    "server",
                    "create",
                    "--image",
                    &image.id,
                    "--flavor",
                    &self.flavor,
                    "--user-data",
                    &user_data.path().display().to_string(),
                    "--wait",
                    name,
                ],
                "booting server",
            )
            .await?;
        let id = json_str(&doc, "/id", "booting server")?;

        let address = server_address(&doc).ok_or_else(|| {
            CheckError::Setup("booting server: no address was assigned".to_string())
        })?;

        Ok(RemoteInstance::new(id, address))
    }

    async fn delete_instance(&self, instance: &RemoteInstance) -> CheckResult<()> {
        util::run_capture(
            Command::new("openstack").args(["server", "delete", "--wait", instance.id.as_str()]),
            "deleting server",
        )
        .await?;
        Ok(())
    }

    async fn delete_image(&self, image: &RemoteImage) -> CheckResult<()> {
        util::run_capture(
            Command::new("openstack").args(["image", "delete", image.id.as_str()]),
            "deleting image",
        )
        .await?;
        Ok(())
    }
}

/// Pull the first address out of a server document.
///
/// Depending on the CLI version, `addresses` is either a map of network
/// name to address list or a `"net=addr, addr"` string.
fn server_address(doc: &serde_json::Value) -> Option<String> {
    match doc.get("addresses")? {
        serde_json::Value::Object(networks) => networks
            .values()
            .filter_map(|v| v.as_array())
            .flatten()
            .find_map(|v| v.as_str())
            .map(str::to_string),
        serde_json::Value::String(s) => {
            let (_, addresses) = s.split_once('=')?;
            let first = addresses.split(',').next()?.trim();
            (!first.is_empty()).then(|| first.to_string())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn address_from_map_form() {
        let doc = json!({"addresses": {"private": ["10.0.0.4", "203.0.113.7"]}});
        assert_eq!(server_address(&doc).unwrap(), "10.0.0.4");
    }

    #[test]
    fn address_from_string_form() {
        let doc = json!({"addresses": "private=10.0.0.4, 203.0.113.7"});
        assert_eq!(server_address(&doc).unwrap(), "10.0.0.4");
    }

    #[test]
    fn missing_addresses_yield_none() {
        assert!(server_address(&json!({})).is_none());
        assert!(server_address(&json!({"addresses": {}})).is_none());
        assert!(server_address(&json!({"addresses": "private="})).is_none());
    }

    // one test owns all OS_* variables; env mutation is process-global
    #[test]
    fn credential_resolution() {
        unsafe {
            std::env::remove_var("OS_AUTH_URL");
            std::env::remove_var("OS_USERNAME");
            std::env::remove_var("OS_PASSWORD");
            std::env::remove_var("OS_PROJECT_NAME");
            std::env::remove_var("OS_FLAVOR");
        }
        assert!(OpenStackProvider::from_env().unwrap().is_none());

        unsafe {
            std::env::set_var("OS_AUTH_URL", "https://keystone.example/v3");
        }
        assert!(OpenStackProvider::from_env().is_err());

        unsafe {
            std::env::set_var("OS_USERNAME", "tester");
            std::env::set_var("OS_PASSWORD", "secret");
            std::env::set_var("OS_PROJECT_NAME", "bootcheck");
        }
        let provider = OpenStackProvider::from_env().unwrap().unwrap();
        assert_eq!(provider.flavor, DEFAULT_FLAVOR);

        unsafe {
            std::env::remove_var("OS_AUTH_URL");
            std::env::remove_var("OS_USERNAME");
            std::env::remove_var("OS_PASSWORD");
            std::env::remove_var("OS_PROJECT_NAME");
        }
    }
}
