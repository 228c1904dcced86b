//! Bounded readiness polling.
//!
//! The poller turns transient unreadiness into a bounded wait and
//! anything else into an immediate result. The budget is fixed for the
//! lifetime of one poll, so the worst case wait is `attempts * interval`
//! (about 200 seconds).

use std::time::Duration;

use crate::errors::{CheckError, CheckResult};
use crate::probe::{ProbeOutcome, Prober};

/// Probe attempts before giving up.
pub const POLL_ATTEMPTS: u32 = 20;

/// Fixed delay between attempts; not adaptive, no backoff.
pub const POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Wait until the instance behind `prober` reports readiness.
///
/// Returns on the first `Ready` outcome. A `HardFailure` is propagated
/// immediately without consuming further budget, so callers can tell a
/// fundamentally broken boot from a merely slow one; exhausting the
/// budget on transient outcomes yields [`CheckError::RetriesExhausted`].
pub async fn wait_for_ready(prober: &dyn Prober) -> CheckResult<()> {
    wait_with_budget(prober, POLL_ATTEMPTS, POLL_INTERVAL).await
}

pub(crate) async fn wait_with_budget(
    prober: &dyn Prober,
    attempts: u32,
    interval: Duration,
) -> CheckResult<()> {
    for attempt in 1..=attempts {
        match prober.probe().await {
            ProbeOutcome::Ready => {
                tracing::debug!(attempt, "instance is ready");
                return Ok(());
            }
            ProbeOutcome::HardFailure(reason) => {
                return Err(CheckError::Boot(reason));
            }
            ProbeOutcome::TransientUnready => {
                tracing::debug!(attempt, "instance not ready yet");
                if attempt < attempts {
                    tokio::time::sleep(interval).await;
                }
            }
        }
    }

    Err(CheckError::RetriesExhausted { attempts })
}
