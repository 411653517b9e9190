//! Per-statement metadata and per-request lifetime control.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Statement tag surfaced on the store's query-stats view. Required for the
/// deployment's observability, optional for correctness: every store call
/// accepts `Option<&RequestTag>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTag {
    pub action: &'static str,
    pub operation: &'static str,
    pub target: &'static str,
}

impl RequestTag {
    pub const fn new(action: &'static str, operation: &'static str, target: &'static str) -> Self {
        Self {
            action,
            operation,
            target,
        }
    }
}

impl fmt::Display for RequestTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "action={},service={},target={}",
            self.action, self.operation, self.target
        )
    }
}

/// Request-scoped deadline with a cancellation flag. Store operations check
/// it before each statement and abort in-flight work instead of completing
/// and discarding results. Cheap to clone; clones share the flag.
#[derive(Debug, Clone)]
pub struct Deadline {
    expires_at: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self {
            expires_at: Some(Instant::now() + timeout),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// No time bound; still cancellable.
    pub fn unbounded() -> Self {
        Self {
            expires_at: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Cancellation wins over expiry so an explicit abort is reported as one.
    pub fn check(&self) -> Result<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(Error::Cancelled);
        }
        if let Some(at) = self.expires_at {
            if Instant::now() >= at {
                return Err(Error::DeadlineExceeded);
            }
        }
        Ok(())
    }

    /// Remaining budget, for handing to blocking waits. `None` = unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_renders_in_query_stats_format() {
        let tag = RequestTag::new("update&insert", "run_battle", "characters&battle_history");
        assert_eq!(
            tag.to_string(),
            "action=update&insert,service=run_battle,target=characters&battle_history"
        );
    }

    #[test]
    fn expired_deadline_fails_check() {
        let deadline = Deadline::after(Duration::ZERO);
        assert_eq!(deadline.check(), Err(Error::DeadlineExceeded));
    }

    #[test]
    fn cancellation_beats_expiry() {
        let deadline = Deadline::after(Duration::ZERO);
        deadline.cancel();
        assert_eq!(deadline.check(), Err(Error::Cancelled));
    }

    #[test]
    fn unbounded_deadline_passes_until_cancelled() {
        let deadline = Deadline::unbounded();
        assert_eq!(deadline.check(), Ok(()));
        deadline.cancel();
        assert_eq!(deadline.check(), Err(Error::Cancelled));
    }
}
