//! External image build invocation.

use std::path::Path;
use std::process::Stdio;

use serde_json::value::RawValue;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::errors::{CheckError, CheckResult};

/// Build the image described by `manifest` into `output_dir`.
///
/// The builder reads the manifest from stdin and may share `store`
/// (read-only object cache) with concurrently running builds. On failure
/// its output, which is a JSON document, is logged pretty-printed for
/// diagnostics.
pub async fn build_image(
    osbuild: &Path,
    manifest: &RawValue,
    store: &Path,
    output_dir: &Path,
) -> CheckResult<()> {
    let mut cmd = Command::new(osbuild);
    cmd.arg("--store")
        .arg(store)
        .arg("--output-directory")
        .arg(output_dir)
        .arg("--json")
        .arg("-")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .map_err(|e| CheckError::Build(format!("cannot start image builder: {e}")))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| CheckError::Internal("builder stdin was not piped".to_string()))?;
    // The builder may exit before draining the manifest; its exit status
    // decides the result, not this write.
    let _ = stdin.write_all(manifest.get().as_bytes()).await;
    drop(stdin);

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| CheckError::Build(format!("cannot wait for image builder: {e}")))?;

    if !output.status.success() {
        tracing::error!("image builder output:\n{}", pretty_json(&output.stdout));
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            tracing::error!("image builder stderr:\n{}", stderr.trim());
        }
        return Err(CheckError::Build(format!(
            "builder exited with {}",
            output.status
        )));
    }

    Ok(())
}

/// Indent the builder's JSON output; fall back to the raw text when it
/// is not valid JSON (e.g. the builder crashed mid-write).
fn pretty_json(raw: &[u8]) -> String {
    match serde_json::from_slice::<serde_json::Value>(raw) {
        Ok(value) => serde_json::to_string_pretty(&value)
            .unwrap_or_else(|_| String::from_utf8_lossy(raw).into_owned()),
        Err(_) => String::from_utf8_lossy(raw).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manifest() -> Box<RawValue> {
        RawValue::from_string(r#"{"pipeline":{}}"#.to_string()).unwrap()
    }

    #[tokio::test]
    async fn successful_build() {
        let dir = TempDir::new().unwrap();
        // `true` ignores its arguments and the manifest on stdin
        build_image(Path::new("true"), &manifest(), dir.path(), dir.path())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn failed_build_reports_exit_status() {
        let dir = TempDir::new().unwrap();
        let err = build_image(Path::new("false"), &manifest(), dir.path(), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, CheckError::Build(_)));
    }

    #[tokio::test]
    async fn missing_builder_is_a_build_error() {
        let dir = TempDir::new().unwrap();
        let err = build_image(
            Path::new("/nonexistent/osbuild"),
            &manifest(),
            dir.path(),
            dir.path(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("cannot start image builder"));
    }

    #[test]
    fn pretty_json_indents_valid_documents() {
        let pretty = pretty_json(br#"{"error":{"stage":"org.osbuild.rpm"}}"#);
        assert!(pretty.contains("\n"));
        assert!(pretty.contains("org.osbuild.rpm"));
    }

    #[test]
    fn pretty_json_passes_invalid_output_through() {
        assert_eq!(pretty_json(b"not json"), "not json");
    }
}
