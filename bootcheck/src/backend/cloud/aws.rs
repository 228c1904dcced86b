//! EC2 glue over the `aws` CLI.
//!
//! The image is staged in S3, imported as an AMI and booted from there.
//! The wire protocol lives entirely in the CLI; this module only owns
//! the sequencing and the JSON plumbing.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::errors::{CheckError, CheckResult};
use crate::util;

use super::{CloudProvider, RemoteImage, RemoteInstance, cloud_init_user_data, json_str, require_env};

const INSTANCE_TYPE: &str = "t3.small";

/// How long to wait for the snapshot import to finish.
const IMPORT_POLL_INTERVAL: Duration = Duration::from_secs(15);
const IMPORT_POLL_ATTEMPTS: u32 = 40;

pub struct AwsProvider {
    region: String,
    bucket: String,
}

impl AwsProvider {
    async fn ec2_json(&self, args: &[&str], what: &str) -> CheckResult<serde_json::Value> {
        let out = util::run_capture(
            Command::new("aws")
                .args(["--region", self.region.as_str(), "--output", "json"])
                .args(args),
            what,
        )
        .await?;
        serde_json::from_str(&out)
            .map_err(|e| CheckError::Setup(format!("{what}: cannot decode response: {e}")))
    }

    fn s3_url(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }

    /// Poll the import task until it produced an AMI.
    async fn wait_for_import(&self, task_id: &str) -> CheckResult<String> {
        for _ in 0..IMPORT_POLL_ATTEMPTS {
            let doc = self
                .ec2_json(
                    &["ec2", "describe-import-image-tasks", "--import-task-ids", task_id],
                    "describing image import",
                )
                .await?;
            let status = json_str(
                &doc,
                "/ImportImageTasks/0/Status",
                "describing image import",
            )?;

            match status.as_str() {
                "completed" => {
                    return json_str(
                        &doc,
                        "/ImportImageTasks/0/ImageId",
                        "describing image import",
                    );
                }
                "deleted" | "deleting" => {
                    return Err(CheckError::Setup(format!(
                        "image import {task_id} was cancelled by the provider"
                    )));
                }
                _ => tokio::time::sleep(IMPORT_POLL_INTERVAL).await,
            }
        }

        Err(CheckError::Setup(format!(
            "image import {task_id} did not finish in time"
        )))
    }
}

#[async_trait]
impl CloudProvider for AwsProvider {
    fn from_env() -> CheckResult<Option<Self>> {
        if std::env::var_os("AWS_ACCESS_KEY_ID").is_none() {
            return Ok(None);
        }
        require_env("AWS_SECRET_ACCESS_KEY")?;
        Ok(Some(Self {
            region: require_env("AWS_REGION")?,
            bucket: require_env("AWS_BUCKET")?,
        }))
    }

    fn name(&self) -> &'static str {
        "aws"
    }

    async fn upload_image(&self, image: &Path, name: &str) -> CheckResult<RemoteImage> {
        let key = format!("{name}.raw");
        util::run_capture(
            Command::new("aws")
                .args(["--region", self.region.as_str(), "s3", "cp", "--only-show-errors"])
                .arg(image)
                .arg(self.s3_url(&key)),
            "uploading image to S3",
        )
        .await?;

        let container = format!(
            r#"{{"Format":"raw","UserBucket":{{"S3Bucket":"{}","S3Key":"{}"}}}}"#,
            self.bucket, key
        );
        let task = self
            .ec2_json(
                &[
                    "ec2",
                    "import-image",
                    "--description",
                    name,
                    "--disk-containers",
                    &container,
                ],
                "importing image",
            )
            .await?;
        let task_id = json_str(&task, "/ImportTaskId", "importing image")?;

        let ami = self.wait_for_import(&task_id).await?;
        Ok(RemoteImage::new(ami, key))
    }

    async fn boot_instance(
        &self,
        image: &RemoteImage,
        public_key: &str,
        _name: &str,
    ) -> CheckResult<RemoteInstance> {
        let doc = self
            .ec2_json(
                &[
                    "ec2",
                    "run-instances",
                    "--image-id",
                    &image.id,
                    "--instance-type",
                    INSTANCE_TYPE,
                    "--user-data",
                    &cloud_init_user_data(public_key),
                ],
                "booting instance",
            )
            .await?;
        let instance_id = json_str(&doc, "/Instances/0/InstanceId", "booting instance")?;

        util::run_capture(
            Command::new("aws").args([
                "--region",
                self.region.as_str(),
                "ec2",
                "wait",
                "instance-running",
                "--instance-ids",
                instance_id.as_str(),
            ]),
            "waiting for instance",
        )
        .await?;

        let desc = self
            .ec2_json(
                &["ec2", "describe-instances", "--instance-ids", &instance_id],
                "describing instance",
            )
            .await?;
        let address = json_str(
            &desc,
            "/Reservations/0/Instances/0/PublicIpAddress",
            "describing instance",
        )?;

        Ok(RemoteInstance::new(instance_id, address))
    }

    async fn delete_instance(&self, instance: &RemoteInstance) -> CheckResult<()> {
        util::run_capture(
            Command::new("aws").args([
                "--region",
                self.region.as_str(),
                "ec2",
                "terminate-instances",
                "--instance-ids",
                instance.id.as_str(),
            ]),
            "terminating instance",
        )
        .await?;
        Ok(())
    }

    async fn delete_image(&self, image: &RemoteImage) -> CheckResult<()> {
        // AMI and staged S3 object are independent resources, both are
        // always attempted
        let deregister = util::run_capture(
            Command::new("aws").args([
                "--region",
                self.region.as_str(),
                "ec2",
                "deregister-image",
                "--image-id",
                image.id.as_str(),
            ]),
            "deregistering image",
        )
        .await;

        let remove = util::run_capture(
            Command::new("aws")
                .args(["--region", self.region.as_str(), "s3", "rm"])
                .arg(self.s3_url(&image.name)),
            "removing staged image from S3",
        )
        .await;

        deregister?;
        remove?;
        Ok(())
    }
}
