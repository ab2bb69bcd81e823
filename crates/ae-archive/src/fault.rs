//! Fault reporting for contained archive failures.
//!
//! The holder never lets an archive failure escape. Every contained error,
//! panic or over-budget call becomes a [`FaultReport`] handed to the
//! injected [`FaultSink`].

use std::fmt;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How the archive call went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// The archive returned an error.
    Error,
    /// The archive panicked.
    Panic,
    /// The call completed but exceeded the call budget.
    SlowCall,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::Error => write!(f, "error"),
            FaultKind::Panic => write!(f, "panic"),
            FaultKind::SlowCall => write!(f, "slow_call"),
        }
    }
}

/// One contained archive failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultReport {
    /// Holder operation being dispatched, e.g. `get_trends`.
    pub operation: String,
    pub archive_code: String,
    /// Archive bit, when the archive is registered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_bit: Option<usize>,
    pub kind: FaultKind,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

impl FaultReport {
    pub fn new(
        operation: &str,
        archive_code: &str,
        archive_bit: Option<usize>,
        kind: FaultKind,
        detail: impl Into<String>,
    ) -> Self {
        FaultReport {
            operation: operation.to_string(),
            archive_code: archive_code.to_string(),
            archive_bit,
            kind,
            detail: detail.into(),
            timestamp: Utc::now(),
        }
    }
}

impl fmt::Display for FaultReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} in {} of archive {}: {}",
            self.kind, self.operation, self.archive_code, self.detail
        )
    }
}

/// Receiver of fault reports.
pub trait FaultSink: Send + Sync {
    fn report(&self, fault: &FaultReport);
}

/// Forwards faults to `tracing` under the `archive.fault` target.
#[derive(Debug, Clone, Default)]
pub struct TracingFaultSink {
    run_id: Option<String>,
}

impl TracingFaultSink {
    pub fn new() -> Self {
        TracingFaultSink::default()
    }

    /// Attach a run identifier to every emitted record.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }
}

impl FaultSink for TracingFaultSink {
    fn report(&self, fault: &FaultReport) {
        let run_id = self.run_id.as_deref().unwrap_or("");
        let bit = fault.archive_bit.map(|b| b as i64).unwrap_or(-1);
        match fault.kind {
            FaultKind::SlowCall => tracing::warn!(
                target: "archive.fault",
                event = "archive.fault",
                run_id = run_id,
                operation = %fault.operation,
                archive = %fault.archive_code,
                bit = bit,
                kind = %fault.kind,
                "{}",
                fault.detail
            ),
            FaultKind::Error | FaultKind::Panic => tracing::error!(
                target: "archive.fault",
                event = "archive.fault",
                run_id = run_id,
                operation = %fault.operation,
                archive = %fault.archive_code,
                bit = bit,
                kind = %fault.kind,
                "{}",
                fault.detail
            ),
        }
    }
}

/// Collects fault reports in memory.
#[derive(Debug, Default)]
pub struct MemoryFaultSink {
    reports: Mutex<Vec<FaultReport>>,
}

impl MemoryFaultSink {
    pub fn new() -> Self {
        MemoryFaultSink::default()
    }

    /// Copy of every report received so far.
    pub fn reports(&self) -> Vec<FaultReport> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of reports naming the given archive.
    pub fn count_for(&self, archive_code: &str) -> usize {
        self.lock()
            .iter()
            .filter(|r| r.archive_code == archive_code)
            .count()
    }

    /// Number of reports of the given kind.
    pub fn count_kind(&self, kind: FaultKind) -> usize {
        self.lock().iter().filter(|r| r.kind == kind).count()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<FaultReport>> {
        self.reports.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FaultSink for MemoryFaultSink {
    fn report(&self, fault: &FaultReport) {
        self.lock().push(fault.clone());
    }
}
