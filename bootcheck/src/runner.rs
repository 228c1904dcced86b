//! Run-level orchestration.
//!
//! Discovers and decodes test cases and runs them one after the other.
//! Cases are independent units: each gets its own output directory and
//! backend resources; only the builder's store directory is shared, and
//! only read-only.

use std::path::{Path, PathBuf};

use crate::errors::{CheckError, CheckResult};
use crate::options::CheckOptions;
use crate::report::{CaseReport, CheckOutcome};
use crate::spec::TestCase;
use crate::util;
use crate::verify;

/// Run the given test cases, or every case in the configured directory
/// when none are named.
///
/// Only configuration errors surface as `Err` and abort the run; an
/// unreadable or non-matching case is reported as skipped.
pub async fn run(case_paths: Vec<PathBuf>, opts: &CheckOptions) -> CheckResult<Vec<CaseReport>> {
    let paths = if case_paths.is_empty() {
        discover_cases(&opts.cases_dir)?
    } else {
        case_paths
    };

    let store = tempfile::Builder::new()
        .prefix("bootcheck-store-")
        .tempdir()
        .map_err(|e| CheckError::Internal(format!("cannot create store directory: {e}")))?;

    let mut reports = Vec::with_capacity(paths.len());
    for path in paths {
        let report = run_one(&path, store.path(), opts).await?;
        reports.push(report);
    }

    Ok(reports)
}

async fn run_one(path: &Path, store: &Path, opts: &CheckOptions) -> CheckResult<CaseReport> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(case = %path.display(), "cannot open test case: {e}");
            return Ok(CaseReport::single(
                &name,
                "case",
                CheckOutcome::Skipped(format!("cannot open test case: {e}")),
            ));
        }
    };

    let case: TestCase = match serde_json::from_slice(&raw) {
        Ok(case) => case,
        Err(e) => {
            return Ok(CaseReport::single(
                &name,
                "case",
                CheckOutcome::Failed(format!("cannot decode test case: {e}")),
            ));
        }
    };

    // skipped before any build or boot work happens
    let current = util::current_arch();
    if case.compose_request.arch != current {
        return Ok(CaseReport::single(
            &name,
            "case",
            CheckOutcome::Skipped(format!(
                "the required arch is {}, the current arch is {current}",
                case.compose_request.arch
            )),
        ));
    }

    tracing::info!(case = %name, distro = %case.compose_request.distro, "running test case");
    verify::run_case(&case, &name, store, opts).await
}

/// All case files in the configured directory, in a stable order.
fn discover_cases(dir: &Path) -> CheckResult<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| CheckError::Setup(format!("cannot list test cases in {}: {e}", dir.display())))?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|e| CheckError::Setup(format!("cannot list test cases: {e}")))?;
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        paths.push(entry.path());
    }

    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn opts_with_cases(dir: &Path) -> CheckOptions {
        CheckOptions {
            cases_dir: dir.to_path_buf(),
            osbuild: PathBuf::from("true"),
            disable_local_boot: true,
            ..CheckOptions::default()
        }
    }

    #[tokio::test]
    async fn empty_case_directory_runs_nothing() {
        let dir = TempDir::new().unwrap();
        let reports = run(Vec::new(), &opts_with_cases(dir.path())).await.unwrap();
        assert!(reports.is_empty());
    }

    #[tokio::test]
    async fn missing_case_directory_is_a_setup_error() {
        let opts = opts_with_cases(Path::new("/nonexistent/cases"));
        let err = run(Vec::new(), &opts).await.unwrap_err();
        assert!(matches!(err, CheckError::Setup(_)));
    }

    #[tokio::test]
    async fn unreadable_case_is_skipped_not_fatal() {
        let dir = TempDir::new().unwrap();
        let reports = run(
            vec![dir.path().join("missing.json")],
            &opts_with_cases(dir.path()),
        )
        .await
        .unwrap();

        assert_eq!(reports.len(), 1);
        assert!(matches!(
            reports[0].checks[0].outcome,
            CheckOutcome::Skipped(_)
        ));
    }

    #[tokio::test]
    async fn undecodable_case_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        let reports = run(vec![path], &opts_with_cases(dir.path())).await.unwrap();
        assert!(reports[0].failed());
    }

    #[tokio::test]
    async fn arch_mismatch_skips_before_any_build() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("otherarch.json");
        fs::write(
            &path,
            r#"{
                "compose-request": {"Distro": "d", "Arch": "z80", "Filename": "disk.img"},
                "Manifest": {},
                "Boot": {"Type": "qemu"}
            }"#,
        )
        .unwrap();

        // a builder that would fail loudly if it were invoked
        let opts = CheckOptions {
            osbuild: PathBuf::from("/nonexistent/osbuild"),
            ..opts_with_cases(dir.path())
        };

        let reports = run(vec![path], &opts).await.unwrap();
        assert_eq!(reports.len(), 1);
        match &reports[0].checks[0].outcome {
            CheckOutcome::Skipped(reason) => {
                assert!(reason.contains("z80"));
            }
            other => panic!("expected a skip, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn discovery_ignores_directories_and_sorts() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("subdir")).unwrap();
        fs::write(dir.path().join("b.json"), "{}").unwrap();
        fs::write(dir.path().join("a.json"), "{}").unwrap();

        let paths = discover_cases(dir.path()).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("a.json"));
        assert!(paths[1].ends_with("b.json"));
    }
}
