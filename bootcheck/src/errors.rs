//! Error types shared across the verification pipeline.

use thiserror::Error;

/// Result type used throughout the crate.
pub type CheckResult<T> = Result<T, CheckError>;

/// Errors produced while verifying an image.
///
/// The variants mirror the failure taxonomy of the pipeline: a `Config`
/// error indicates a broken test specification and aborts the whole run,
/// everything else fails (at most) the check that produced it.
#[derive(Debug, Error)]
pub enum CheckError {
    /// The test specification itself is invalid (e.g. an unknown boot
    /// type). Not recoverable at runtime; the runner stops on it.
    #[error("configuration error: {0}")]
    Config(String),

    /// The external image build failed.
    #[error("image build failed: {0}")]
    Build(String),

    /// Acquiring a backend instance failed: namespace creation, process
    /// launch, key generation, upload or boot.
    #[error("backend setup failed: {0}")]
    Setup(String),

    /// The booted instance reported an unrecoverable state.
    #[error("boot check failed: {0}")]
    Boot(String),

    /// The instance never became ready within the retry budget.
    #[error("instance not ready, {attempts} attempts were made")]
    RetriesExhausted { attempts: u32 },

    /// Collecting or comparing image metadata failed.
    #[error("image info check failed: {0}")]
    ImageInfo(String),

    /// Bug or broken environment assumption.
    #[error("internal error: {0}")]
    Internal(String),
}
