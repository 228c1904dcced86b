//! Per-case verification.
//!
//! One case builds its image into a private temporary directory, then
//! runs up to two independent sub-checks against the result: metadata
//! equality and a boot check. The sub-checks neither share state nor
//! gate each other; the directory (and with it the image) is removed
//! when the case finishes, whichever way it finishes.

use std::path::Path;

use crate::backend::{self, BootBackend};
use crate::errors::{CheckError, CheckResult};
use crate::inspect;
use crate::options::CheckOptions;
use crate::osbuild;
use crate::report::{CaseReport, CheckOutcome, SubCheck};
use crate::spec::TestCase;
use crate::util;

/// Build and verify one image.
///
/// Only a configuration error (an unknown boot type in the case) is
/// returned as `Err`; everything else ends up in the report.
pub async fn run_case(
    case: &TestCase,
    name: &str,
    store: &Path,
    opts: &CheckOptions,
) -> CheckResult<CaseReport> {
    let output_dir = tempfile::Builder::new()
        .prefix("bootcheck-output-")
        .tempdir()
        .map_err(|e| CheckError::Internal(format!("cannot create output directory: {e}")))?;

    if let Err(e) = osbuild::build_image(&opts.osbuild, &case.manifest, store, output_dir.path()).await
    {
        return Ok(CaseReport::single(
            name,
            "build",
            CheckOutcome::Failed(e.to_string()),
        ));
    }

    let image = output_dir.path().join(&case.compose_request.filename);
    let mut checks = Vec::new();

    if let Some(expected) = &case.image_info {
        checks.push(SubCheck {
            name: "image-info",
            outcome: image_info_outcome(expected, &image, opts).await,
        });
    }

    if let Some(boot) = &case.boot {
        checks.push(SubCheck {
            name: "boot",
            outcome: boot_outcome(&boot.kind, &image, opts).await?,
        });
    }

    Ok(CaseReport {
        name: name.to_string(),
        checks,
    })
}

async fn image_info_outcome(
    expected: &serde_json::Value,
    image: &Path,
    opts: &CheckOptions,
) -> CheckOutcome {
    let actual = match inspect::inspect_image(&opts.image_info, image).await {
        Ok(doc) => doc,
        Err(e) => return CheckOutcome::Failed(e.to_string()),
    };

    match inspect::compare_image_info(expected, &actual) {
        Ok(()) => CheckOutcome::Passed,
        Err(e) => CheckOutcome::Failed(e.to_string()),
    }
}

async fn boot_outcome(kind: &str, image: &Path, opts: &CheckOptions) -> CheckResult<CheckOutcome> {
    // qemu needs hardware acceleration on aarch64; without it, skip
    // rather than attempt and fail
    if util::current_arch() == "aarch64" && !backend::kvm_available() {
        return Ok(CheckOutcome::Skipped(
            "running on aarch64 without KVM support".to_string(),
        ));
    }

    let backend: BootBackend = kind.parse()?;
    Ok(backend::run_boot_check(backend, image, opts).await)
}
