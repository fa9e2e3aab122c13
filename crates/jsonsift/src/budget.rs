//! Budget ceilings and cooperative cancellation.
//!
//! Budgets bound a single execution by match count, processed bytes and
//! wall-clock time. All three are checked strictly from above: the failure
//! fires only once the ceiling has been crossed. Checks happen on every
//! match, at every chunk boundary, and every [`POLL_INTERVAL`] bytes inside
//! the tokenizer; in between the engine runs uninterrupted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{ErrorKind, SiftError};

/// How many bytes the tokenizer processes between cancellation/budget
/// polls. A trade-off between cancellation latency and per-byte overhead;
/// must be a power of two.
pub const POLL_INTERVAL: u64 = 32 * 1024;

pub(crate) const POLL_MASK: u64 = POLL_INTERVAL - 1;

/// Ceilings for one execution. `None` disables the respective check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Budget {
    /// Maximum number of emitted matches.
    pub max_matches: Option<u64>,
    /// Maximum number of processed logical bytes.
    pub max_bytes: Option<u64>,
    /// Maximum wall-clock duration since engine construction.
    pub max_duration: Option<Duration>,
}

impl Budget {
    /// A budget with no ceilings.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::default()
    }
}

/// Shared cooperative cancellation flag.
///
/// Clones observe the same flag; setting it makes the tokenizer and engine
/// fail with [`ErrorKind::Abort`] at the next poll point. No byte currently
/// being processed is abandoned.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn check(&self, offset: u64) -> Result<(), SiftError> {
        if self.is_cancelled() {
            Err(SiftError::new(ErrorKind::Abort, "execution cancelled", offset))
        } else {
            Ok(())
        }
    }
}

/// Running budget state for one execution.
#[derive(Debug, Clone)]
pub(crate) struct BudgetClock {
    budget: Budget,
    started: Instant,
}

impl BudgetClock {
    pub fn new(budget: Budget) -> Self {
        Self {
            budget,
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Byte and duration ceilings; polled on chunk boundaries and inside
    /// the tokenizer.
    pub fn check_progress(&self, processed: u64) -> Result<(), SiftError> {
        if let Some(max) = self.budget.max_bytes {
            if processed > max {
                return Err(SiftError::new(
                    ErrorKind::ByteBudget,
                    format!("processed {processed} bytes, budget {max}"),
                    processed,
                ));
            }
        }
        if let Some(max) = self.budget.max_duration {
            let elapsed = self.started.elapsed();
            if elapsed > max {
                return Err(SiftError::new(
                    ErrorKind::DurationBudget,
                    format!("ran {}ms, budget {}ms", elapsed.as_millis(), max.as_millis()),
                    processed,
                ));
            }
        }
        Ok(())
    }

    /// Match ceiling; checked when a new match is about to be emitted with
    /// `matched` already counting it. The sink never observes a match past
    /// the ceiling.
    pub fn check_matches(&self, matched: u64, offset: u64) -> Result<(), SiftError> {
        if let Some(max) = self.budget.max_matches {
            if matched > max {
                return Err(SiftError::new(
                    ErrorKind::MatchBudget,
                    format!("matched {matched} values, budget {max}"),
                    offset,
                ));
            }
        }
        Ok(())
    }
}
