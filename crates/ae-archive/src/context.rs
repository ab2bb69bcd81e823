//! Per-call context handed to every archive capability method.
//!
//! The holder creates one [`CallContext`] per dispatched call. It carries the
//! dispatch time, an optional deadline derived from the holder's call budget
//! and a shared cancellation flag. Checking it is cooperative: an archive
//! calls [`CallContext::checkpoint`] between units of work.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::error::{ArchiveError, ArchiveResult};

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Context for a single archive call.
#[derive(Debug, Clone)]
pub struct CallContext {
    now: DateTime<Utc>,
    budget: Option<Duration>,
    deadline: Option<Instant>,
    cancel: CancelToken,
}

impl CallContext {
    /// Context without deadline or cancellation, stamped with the current time.
    pub fn unbounded() -> Self {
        CallContext {
            now: Utc::now(),
            budget: None,
            deadline: None,
            cancel: CancelToken::new(),
        }
    }

    /// Context whose deadline is `budget` from now.
    pub fn new(now: DateTime<Utc>, budget: Option<Duration>, cancel: CancelToken) -> Self {
        CallContext {
            now,
            budget,
            deadline: budget.map(|b| Instant::now() + b),
            cancel,
        }
    }

    /// Dispatch time. Retention cutoffs are computed from this instant.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn budget(&self) -> Option<Duration> {
        self.budget
    }

    /// Time left before the deadline, `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fail fast when the call was cancelled or ran past its deadline.
    pub fn checkpoint(&self) -> ArchiveResult<()> {
        if self.is_cancelled() {
            return Err(ArchiveError::Cancelled);
        }
        if self.is_expired() {
            return Err(ArchiveError::DeadlineExceeded {
                budget_ms: self.budget.map(|b| b.as_millis() as u64).unwrap_or(0),
            });
        }
        Ok(())
    }
}

impl Default for CallContext {
    fn default() -> Self {
        CallContext::unbounded()
    }
}
