//! Test case representation.
//!
//! A test case is a persisted JSON document describing one verification
//! run: the compose request that produced the image, the opaque build
//! manifest, the expected `image-info` document and an optional boot
//! directive. It is parsed once and read-only afterwards.

use serde::Deserialize;
use serde_json::value::RawValue;

/// One image verification run, as loaded from a JSON test case file.
#[derive(Debug, Deserialize)]
pub struct TestCase {
    #[serde(rename = "compose-request")]
    pub compose_request: ComposeRequest,

    /// Opaque build manifest, passed verbatim to the image builder.
    #[serde(rename = "Manifest")]
    pub manifest: Box<RawValue>,

    /// Expected metadata document; when present, the metadata check runs.
    #[serde(rename = "image-info", default)]
    pub image_info: Option<serde_json::Value>,

    /// Boot directive; when present, the boot check runs.
    #[serde(rename = "Boot", default)]
    pub boot: Option<BootDirective>,
}

/// The compose request the image under test was built from.
#[derive(Debug, Deserialize)]
pub struct ComposeRequest {
    #[serde(rename = "Distro")]
    pub distro: String,
    #[serde(rename = "Arch")]
    pub arch: String,
    #[serde(rename = "Filename")]
    pub filename: String,
}

/// How the image should be booted.
///
/// The type is kept as a plain string here: an unknown selector is a
/// specification bug and is reported by the boot dispatcher, not by the
/// JSON decoder.
#[derive(Debug, Deserialize)]
pub struct BootDirective {
    #[serde(rename = "Type")]
    pub kind: String,
}
