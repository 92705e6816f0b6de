//! Response poller -- the primitive every console operation builds on.
//!
//! The console never frames its output, so "did the command work" is
//! always answered the same way: keep issuing bounded reads, append
//! whatever arrives to one accumulating buffer, and test an
//! exit-condition predicate against the *entire* buffer after every
//! read. [`poll`] does exactly that and nothing more -- retry policy
//! belongs to its callers.

use std::time::{Duration, Instant};

use damlib_core::error::{Error, Result};
use damlib_core::transport::Transport;
use tracing::trace;

use crate::protocol;

/// Interval of a single bounded read while polling.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Budget coefficient for the optimistic session-open poll.
pub const SESSION_OPEN_COEFF: f64 = 1.5;

/// Budget coefficient for the update confirmation and reset polls.
pub const UPDATE_CONFIRM_COEFF: f64 = 1.5;

/// Budget coefficient for the reprogram acknowledgement poll. The device
/// takes noticeably longer to burn an image than to echo a prompt.
pub const REPROGRAM_COEFF: f64 = 3.0;

/// Budget coefficient for filter listing output.
pub const LISTING_COEFF: f64 = 1.5;

/// A per-call poll budget: how long to keep polling in total, and how
/// long each individual read may block.
///
/// Budgets are derived from the connection's base timeout, optionally
/// scaled by one of the named coefficients above. They are immutable and
/// never shared between calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    /// Total polling time before [`poll`] gives up.
    pub timeout: Duration,
    /// Upper bound on a single transport read.
    pub interval: Duration,
}

impl PollBudget {
    /// A budget of exactly the base timeout.
    pub fn base(timeout: Duration) -> Self {
        Self::with_timeout(timeout)
    }

    /// A budget of the base timeout scaled by a named coefficient.
    pub fn scaled(timeout: Duration, coeff: f64) -> Self {
        Self::with_timeout(timeout.mul_f64(coeff))
    }

    fn with_timeout(timeout: Duration) -> Self {
        PollBudget {
            timeout,
            // Never let one read outlive the whole budget.
            interval: POLL_INTERVAL.min(timeout),
        }
    }
}

/// Completion observer: receives the final match flag and the full
/// accumulated buffer, exactly once per [`poll`] call.
pub type PollObserver<'a> = &'a mut dyn FnMut(bool, &[u8]);

/// Poll the transport until `exit` matches the accumulated buffer or the
/// budget expires.
///
/// Repeatedly issues reads bounded by `budget.interval`, appends any
/// bytes received to an accumulation buffer (never truncated, never
/// reset mid-call), and tests `exit` against the whole buffer after each
/// read. Returns `Ok(true)` the instant the predicate matches and
/// `Ok(false)` once elapsed polling time exceeds `budget.timeout`
/// without a match. Quiet reads (transport timeouts) just continue the
/// loop; any other transport failure propagates.
///
/// The optional `observer` fires exactly once per call with the final
/// `(matched, buffer)` pair, regardless of outcome. This is the only
/// place raw console output leaves the poller, for logging or for
/// downstream parsing.
pub async fn poll(
    transport: &mut dyn Transport,
    budget: &PollBudget,
    mut exit: impl FnMut(&[u8]) -> bool,
    mut observer: Option<PollObserver<'_>>,
) -> Result<bool> {
    let started = Instant::now();
    let mut accumulated: Vec<u8> = Vec::new();
    let mut matched = false;

    while started.elapsed() < budget.timeout {
        let mut chunk = [0u8; protocol::READ_CHUNK];
        match transport.receive(&mut chunk, budget.interval).await {
            Ok(n) => {
                accumulated.extend_from_slice(&chunk[..n]);
                if exit(&accumulated) {
                    matched = true;
                    break;
                }
            }
            Err(Error::Timeout) => {
                if exit(&accumulated) {
                    matched = true;
                    break;
                }
            }
            Err(e) => {
                trace!(buffer = %String::from_utf8_lossy(&accumulated), "poll aborted by transport error");
                if let Some(obs) = observer.as_mut() {
                    obs(false, &accumulated);
                }
                return Err(e);
            }
        }
    }

    trace!(
        matched,
        bytes = accumulated.len(),
        buffer = %String::from_utf8_lossy(&accumulated),
        "poll complete"
    );
    if let Some(obs) = observer.as_mut() {
        obs(matched, &accumulated);
    }
    Ok(matched)
}
