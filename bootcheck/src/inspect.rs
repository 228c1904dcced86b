//! Image metadata inspection.
//!
//! The external `image-info` tool emits a JSON description of an image;
//! the check compares it structurally (key order and formatting do not
//! matter) against the expected document from the test case.

use std::path::Path;
use std::process::Stdio;

use serde_json::Value;
use tokio::process::Command;

use crate::errors::{CheckError, CheckResult};

/// Run the inspection tool against `image` and parse its output.
pub async fn inspect_image(image_info: &Path, image: &Path) -> CheckResult<Value> {
    let output = Command::new(image_info)
        .arg(image)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| CheckError::ImageInfo(format!("cannot execute image-info: {e}")))?;

    if !output.status.success() {
        return Err(CheckError::ImageInfo(format!(
            "image-info exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    serde_json::from_slice(&output.stdout)
        .map_err(|e| CheckError::ImageInfo(format!("cannot decode image-info output: {e}")))
}

/// Compare collected metadata against the expected document.
pub fn compare_image_info(expected: &Value, actual: &Value) -> CheckResult<()> {
    if expected == actual {
        return Ok(());
    }

    Err(CheckError::ImageInfo(
        "image-info output does not match the expected document".to_string(),
    ))
}
