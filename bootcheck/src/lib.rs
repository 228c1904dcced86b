//! bootcheck verifies that built disk images actually boot.
//!
//! Given JSON test cases describing a compose request, it builds each
//! image with the external builder, optionally compares the image's
//! metadata against an expected document, and optionally boots the
//! image on one of several backends (qemu, systemd-nspawn, AWS, Azure,
//! OpenStack), probing readiness over SSH until the instance reports a
//! healthy system state.
//!
//! Every backend guarantees teardown of the resources it allocated,
//! whichever way the check ends; cloud backends without configured
//! credentials fall back to booting locally with qemu.

pub mod backend;
pub mod errors;
pub mod inspect;
pub mod keys;
pub mod netns;
pub mod options;
pub mod osbuild;
pub mod poll;
pub mod probe;
pub mod report;
pub mod runner;
pub mod spec;
pub mod verify;

mod util;

pub use errors::{CheckError, CheckResult};
pub use options::CheckOptions;
pub use report::{CaseReport, CheckOutcome, SubCheck};
