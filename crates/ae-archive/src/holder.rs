//! Archive holder: registry of archives and the fault-contained dispatch surface.
//!
//! Archives are registered once per bit into a fixed-size table and, by
//! capability, into one of three lists. Every call into an archive goes
//! through [`ArchiveHolder::contain`], which turns an `Err` or a panic into a
//! [`FaultReport`] and a default value. Callers of the holder never see an
//! archive failure.
//!
//! Locking:
//! - the bit table is written only during registration and read lock-free
//! - each capability list has its own mutex, held for the whole fan-out
//! - registration is serialized by a separate mutex

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use ae_common::{
    ArchiveKind, ArchiveMask, CurrentData, DataFilter, Error, Event, EventId, Result, Slice,
    Trend, TrendBundle, MAX_ARCHIVE_COUNT,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::context::{CallContext, CancelToken};
use crate::contract::{
    ArchiveHandle, Capability, CurrentArchive, EventArchive, HistoricalArchive,
};
use crate::error::ArchiveResult;
use crate::fault::{FaultKind, FaultReport, FaultSink, TracingFaultSink};

/// Archive registered at a bit.
struct Registered<A: ?Sized> {
    bit: usize,
    archive: Arc<A>,
}

impl<A: ?Sized> Clone for Registered<A> {
    fn clone(&self) -> Self {
        Registered {
            bit: self.bit,
            archive: Arc::clone(&self.archive),
        }
    }
}

/// Diagnostic summary of one registered archive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchiveInfo {
    pub bit: usize,
    pub code: String,
    pub kind: ArchiveKind,
    pub last_write_time: Option<DateTime<Utc>>,
    pub last_cleanup_time: Option<DateTime<Utc>>,
    pub cleanup_period_secs: u64,
}

/// Registry and dispatcher for all archives.
pub struct ArchiveHolder {
    slots: [OnceLock<ArchiveHandle>; MAX_ARCHIVE_COUNT],
    current: Mutex<Vec<Registered<dyn CurrentArchive>>>,
    historical: Mutex<Vec<Registered<dyn HistoricalArchive>>>,
    event: Mutex<Vec<Registered<dyn EventArchive>>>,
    registration: Mutex<()>,
    fault_sink: Arc<dyn FaultSink>,
    call_budget: Option<Duration>,
    cancel: CancelToken,
}

impl ArchiveHolder {
    /// Empty holder reporting faults to `fault_sink`.
    ///
    /// `call_budget` bounds every archive call: it sets the context deadline
    /// and calls running longer are reported as slow.
    pub fn new(fault_sink: Arc<dyn FaultSink>, call_budget: Option<Duration>) -> Self {
        ArchiveHolder {
            slots: std::array::from_fn(|_| OnceLock::new()),
            current: Mutex::new(Vec::new()),
            historical: Mutex::new(Vec::new()),
            event: Mutex::new(Vec::new()),
            registration: Mutex::new(()),
            fault_sink,
            call_budget,
            cancel: CancelToken::new(),
        }
    }

    /// Holder logging faults through `tracing`, without a call budget.
    pub fn with_defaults() -> Self {
        ArchiveHolder::new(Arc::new(TracingFaultSink::new()), None)
    }

    // ------------------------------------------------------------------
    // Registration and lookup
    // ------------------------------------------------------------------

    /// Register `archive` at `bit`.
    ///
    /// Fails without touching any state when the bit is out of range, already
    /// taken, or the archive code is already registered.
    pub fn add_archive(&self, archive: ArchiveHandle, bit: usize) -> Result<()> {
        if bit >= MAX_ARCHIVE_COUNT {
            return Err(Error::InvalidArchiveBit {
                bit,
                max: MAX_ARCHIVE_COUNT,
            });
        }

        let _registration = lock(&self.registration);

        if let Some(existing) = self.slots[bit].get() {
            return Err(Error::DuplicateArchiveBit {
                bit,
                existing: existing.code().to_string(),
            });
        }
        let code = archive.code().to_string();
        let code_taken = self
            .slots
            .iter()
            .filter_map(OnceLock::get)
            .any(|h| h.code().eq_ignore_ascii_case(&code));
        if code_taken {
            return Err(Error::DuplicateArchiveCode(code));
        }

        if let Err(rejected) = self.slots[bit].set(archive.clone()) {
            return Err(Error::DuplicateArchiveBit {
                bit,
                existing: rejected.code().to_string(),
            });
        }

        match &archive {
            ArchiveHandle::Current(a) => lock(&self.current).push(Registered {
                bit,
                archive: Arc::clone(a),
            }),
            ArchiveHandle::Historical(a) => lock(&self.historical).push(Registered {
                bit,
                archive: Arc::clone(a),
            }),
            ArchiveHandle::Event(a) => lock(&self.event).push(Registered {
                bit,
                archive: Arc::clone(a),
            }),
        }

        tracing::info!(
            event = "archive.registered",
            archive = %code,
            bit = bit,
            kind = %archive.kind(),
            "registered archive"
        );
        Ok(())
    }

    /// Archive at `bit` if it implements capability `C`.
    ///
    /// ```ignore
    /// let hist = holder.get_archive::<dyn HistoricalArchive>(1);
    /// ```
    pub fn get_archive<C: Capability + ?Sized>(&self, bit: usize) -> Option<Arc<C>> {
        self.slots.get(bit)?.get().and_then(C::select)
    }

    /// Capability kind of the archive at `bit`.
    pub fn archive_kind(&self, bit: usize) -> Option<ArchiveKind> {
        self.slots.get(bit)?.get().map(ArchiveHandle::kind)
    }

    pub fn archive_count(&self) -> usize {
        self.slots.iter().filter(|s| s.get().is_some()).count()
    }

    /// Bits with a registered archive, ascending.
    pub fn registered_bits(&self) -> ArchiveMask {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.get().is_some())
            .map(|(bit, _)| bit)
            .collect()
    }

    /// Summary of every registered archive in bit order.
    pub fn describe(&self) -> Vec<ArchiveInfo> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(bit, slot)| slot.get().map(|h| (bit, h)))
            .map(|(bit, handle)| {
                let state = handle.state();
                ArchiveInfo {
                    bit,
                    code: handle.code().to_string(),
                    kind: handle.kind(),
                    last_write_time: state.last_write_time(),
                    last_cleanup_time: state.last_cleanup_time(),
                    cleanup_period_secs: state.cleanup_period().as_secs(),
                }
            })
            .collect()
    }

    /// Trip the shared cancellation token. In-flight and later calls see it
    /// through their [`CallContext`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    // ------------------------------------------------------------------
    // Fan-out operations
    // ------------------------------------------------------------------

    /// Let current archives restore values into `cur`.
    ///
    /// Archives are asked in registration order until one returns true. A
    /// failing archive is reported and skipped.
    pub fn read_current_data(&self, cur: &mut CurrentData) -> bool {
        let archives = lock(&self.current);
        for entry in archives.iter() {
            let supplied = self.contain(
                "read_current_data",
                entry.archive.code(),
                Some(entry.bit),
                Utc::now(),
                |ctx| entry.archive.read_data(cur, ctx),
            );
            if supplied == Some(true) {
                return true;
            }
        }
        false
    }

    /// Hand the snapshot to every current archive, then every historical one.
    pub fn process_data(&self, cur: &CurrentData) {
        {
            let archives = lock(&self.current);
            for entry in archives.iter() {
                self.contain(
                    "process_data",
                    entry.archive.code(),
                    Some(entry.bit),
                    Utc::now(),
                    |ctx| entry.archive.process_data(cur, ctx),
                );
            }
        }
        let archives = lock(&self.historical);
        for entry in archives.iter() {
            self.contain(
                "process_data",
                entry.archive.code(),
                Some(entry.bit),
                Utc::now(),
                |ctx| entry.archive.process_data(cur, ctx),
            );
        }
    }

    /// Run retention on every archive whose cleanup period has elapsed.
    pub fn delete_outdated_data(&self) -> usize {
        self.delete_outdated_data_at(Utc::now())
    }

    /// Run retention as of `now`. Returns the number of cleanups started.
    ///
    /// The last cleanup time is stamped before the archive runs, so a failing
    /// cleanup is not retried until its period elapses again.
    pub fn delete_outdated_data_at(&self, now: DateTime<Utc>) -> usize {
        let mut started = 0;
        {
            let archives = lock(&self.current);
            for entry in archives.iter() {
                if entry.archive.state().begin_cleanup(now) {
                    started += 1;
                    self.cleanup(entry.archive.code(), entry.bit, now, |ctx| {
                        entry.archive.delete_outdated_data(ctx)
                    });
                }
            }
        }
        {
            let archives = lock(&self.historical);
            for entry in archives.iter() {
                if entry.archive.state().begin_cleanup(now) {
                    started += 1;
                    self.cleanup(entry.archive.code(), entry.bit, now, |ctx| {
                        entry.archive.delete_outdated_data(ctx)
                    });
                }
            }
        }
        let archives = lock(&self.event);
        for entry in archives.iter() {
            if entry.archive.state().begin_cleanup(now) {
                started += 1;
                self.cleanup(entry.archive.code(), entry.bit, now, |ctx| {
                    entry.archive.delete_outdated_data(ctx)
                });
            }
        }
        started
    }

    /// Persist pending snapshots of every current archive.
    pub fn flush_current_all(&self) {
        let archives = lock(&self.current);
        for entry in archives.iter() {
            self.contain(
                "flush",
                entry.archive.code(),
                Some(entry.bit),
                Utc::now(),
                |ctx| entry.archive.flush(ctx),
            );
        }
    }

    /// Invoke the flush hook of one historical archive.
    pub fn end_update(&self, archive: &Arc<dyn HistoricalArchive>) {
        let code = archive.code();
        let bit = lock(&self.historical)
            .iter()
            .find(|e| e.archive.code() == code)
            .map(|e| e.bit);
        self.contain("end_update", code, bit, Utc::now(), |ctx| {
            archive.end_update(ctx)
        });
    }

    /// Invoke the flush hook of every historical archive.
    pub fn end_update_all(&self) {
        let archives = lock(&self.historical);
        for entry in archives.iter() {
            self.contain(
                "end_update",
                entry.archive.code(),
                Some(entry.bit),
                Utc::now(),
                |ctx| entry.archive.end_update(ctx),
            );
        }
    }

    /// Write `event` to every event archive selected by `mask`.
    ///
    /// Returns the number of archives that stored it.
    pub fn write_event(&self, event: &Event, mask: ArchiveMask) -> usize {
        let archives = lock(&self.event);
        archives
            .iter()
            .filter(|e| mask.contains(e.bit))
            .filter_map(|entry| {
                self.contain(
                    "write_event",
                    entry.archive.code(),
                    Some(entry.bit),
                    Utc::now(),
                    |ctx| entry.archive.write_event(event, ctx),
                )
            })
            .count()
    }

    /// Acknowledge event `id` in every registered event archive.
    ///
    /// Returns the number of archives that held the event.
    pub fn ack_event(&self, id: EventId, timestamp: DateTime<Utc>, user_id: i32) -> usize {
        let archives = lock(&self.event);
        archives
            .iter()
            .filter_map(|entry| {
                self.contain(
                    "ack_event",
                    entry.archive.code(),
                    Some(entry.bit),
                    Utc::now(),
                    |ctx| entry.archive.ack_event(id, timestamp, user_id, ctx),
                )
            })
            .filter(|&held| held)
            .count()
    }

    // ------------------------------------------------------------------
    // Single-archive queries
    // ------------------------------------------------------------------

    /// Trends of `cnl_nums` from the historical archive at `bit`.
    ///
    /// Returns an empty bundle for the requested channels when nothing is
    /// registered there, the archive fails, or its result is misaligned,
    /// unordered, or outside the range.
    pub fn get_trends(
        &self,
        cnl_nums: &[i32],
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        bit: usize,
    ) -> TrendBundle {
        let Some(archive) = self.get_archive::<dyn HistoricalArchive>(bit) else {
            return TrendBundle::empty(cnl_nums);
        };
        let bundle = self.contain("get_trends", archive.code(), Some(bit), Utc::now(), |ctx| {
            archive.get_trends(cnl_nums, start_time, end_time, ctx)
        });
        let Some(bundle) = bundle else {
            return TrendBundle::empty(cnl_nums);
        };

        let violation = if !bundle.is_aligned() || bundle.cnl_nums.as_slice() != cnl_nums {
            Some(format!(
                "misaligned bundle: {} channels, {} timestamps",
                bundle.cnl_nums.len(),
                bundle.len()
            ))
        } else {
            range_violation(bundle.timestamps().iter().copied(), start_time, end_time)
        };
        match violation {
            None => bundle,
            Some(message) => {
                self.reject("get_trends", archive.code(), bit, message);
                TrendBundle::empty(cnl_nums)
            }
        }
    }

    /// Trend of one channel from the historical archive at `bit`.
    ///
    /// A trend for another channel, with unordered points, or with points
    /// outside the range is reported and replaced by an empty one.
    pub fn get_trend(
        &self,
        cnl_num: i32,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        bit: usize,
    ) -> Trend {
        let empty = || Trend::empty(cnl_num, start_time, end_time);
        let Some(archive) = self.get_archive::<dyn HistoricalArchive>(bit) else {
            return empty();
        };
        let trend = self.contain("get_trend", archive.code(), Some(bit), Utc::now(), |ctx| {
            archive.get_trend(cnl_num, start_time, end_time, ctx)
        });
        let Some(trend) = trend else {
            return empty();
        };

        let violation = if trend.cnl_num != cnl_num {
            Some(format!(
                "trend for channel {} instead of {}",
                trend.cnl_num, cnl_num
            ))
        } else {
            range_violation(
                trend.points().iter().map(|p| p.timestamp),
                start_time,
                end_time,
            )
        };
        match violation {
            None => trend,
            Some(message) => {
                self.reject("get_trend", archive.code(), bit, message);
                empty()
            }
        }
    }

    /// Row timestamps in range from the historical archive at `bit`.
    pub fn get_timestamps(
        &self,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        bit: usize,
    ) -> Vec<DateTime<Utc>> {
        self.get_archive::<dyn HistoricalArchive>(bit)
            .and_then(|archive| {
                self.contain("get_timestamps", archive.code(), Some(bit), Utc::now(), |ctx| {
                    archive.get_timestamps(start_time, end_time, ctx)
                })
            })
            .unwrap_or_default()
    }

    /// Values of `cnl_nums` at `timestamp` from the historical archive at `bit`.
    ///
    /// The default is a slice of undefined values, one per requested channel.
    pub fn get_slice(&self, cnl_nums: &[i32], timestamp: DateTime<Utc>, bit: usize) -> Slice {
        self.get_archive::<dyn HistoricalArchive>(bit)
            .and_then(|archive| {
                self.contain("get_slice", archive.code(), Some(bit), Utc::now(), |ctx| {
                    archive.get_slice(cnl_nums, timestamp, ctx)
                })
            })
            .unwrap_or_else(|| Slice::undefined(cnl_nums, timestamp))
    }

    /// Event `id` from the event archive at `bit`.
    pub fn get_event_by_id(&self, id: EventId, bit: usize) -> Option<Event> {
        let archive = self.get_archive::<dyn EventArchive>(bit)?;
        self.contain("get_event_by_id", archive.code(), Some(bit), Utc::now(), |ctx| {
            archive.get_event_by_id(id, ctx)
        })
        .flatten()
    }

    /// Events in range matching `filter` from the event archive at `bit`.
    pub fn get_events(
        &self,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        filter: &DataFilter,
        bit: usize,
    ) -> Vec<Event> {
        self.get_archive::<dyn EventArchive>(bit)
            .and_then(|archive| {
                self.contain("get_events", archive.code(), Some(bit), Utc::now(), |ctx| {
                    archive.get_events(start_time, end_time, filter, ctx)
                })
            })
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Containment
    // ------------------------------------------------------------------

    fn context(&self, now: DateTime<Utc>) -> CallContext {
        CallContext::new(now, self.call_budget, self.cancel.clone())
    }

    fn cleanup(
        &self,
        code: &str,
        bit: usize,
        now: DateTime<Utc>,
        call: impl FnOnce(&CallContext) -> ArchiveResult<()>,
    ) {
        tracing::debug!(
            event = "cleanup.started",
            archive = %code,
            bit = bit,
            "running retention cleanup"
        );
        self.contain("delete_outdated_data", code, Some(bit), now, call);
    }

    /// Run one archive call, converting `Err` and panics into fault reports.
    fn contain<T>(
        &self,
        operation: &str,
        code: &str,
        bit: Option<usize>,
        now: DateTime<Utc>,
        call: impl FnOnce(&CallContext) -> ArchiveResult<T>,
    ) -> Option<T> {
        let ctx = self.context(now);
        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| call(&ctx)));
        let elapsed = started.elapsed();

        match outcome {
            Ok(Ok(value)) => {
                if let Some(budget) = self.call_budget {
                    if elapsed > budget {
                        self.report(FaultReport::new(
                            operation,
                            code,
                            bit,
                            FaultKind::SlowCall,
                            format!(
                                "call took {} ms, budget {} ms",
                                elapsed.as_millis(),
                                budget.as_millis()
                            ),
                        ));
                    }
                }
                Some(value)
            }
            Ok(Err(err)) => {
                self.report(FaultReport::new(
                    operation,
                    code,
                    bit,
                    FaultKind::Error,
                    err.to_string(),
                ));
                None
            }
            Err(payload) => {
                self.report(FaultReport::new(
                    operation,
                    code,
                    bit,
                    FaultKind::Panic,
                    panic_message(payload.as_ref()),
                ));
                None
            }
        }
    }

    fn reject(&self, operation: &str, code: &str, bit: usize, message: String) {
        self.report(FaultReport::new(
            operation,
            code,
            Some(bit),
            FaultKind::Error,
            message,
        ));
    }

    /// Forward a report to the sink. A panicking sink is swallowed.
    fn report(&self, fault: FaultReport) {
        let sink = &self.fault_sink;
        let _ = panic::catch_unwind(AssertUnwindSafe(|| sink.report(&fault)));
    }
}

impl std::fmt::Debug for ArchiveHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveHolder")
            .field("archives", &self.describe())
            .field("call_budget", &self.call_budget)
            .finish()
    }
}

/// First timestamp that is out of order or outside `[start, end]`.
fn range_violation(
    timestamps: impl Iterator<Item = DateTime<Utc>>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Option<String> {
    let mut previous: Option<DateTime<Utc>> = None;
    for ts in timestamps {
        if ts < start || ts > end {
            return Some(format!("timestamp {ts} outside {start}..={end}"));
        }
        if previous.is_some_and(|prev| ts < prev) {
            return Some(format!("timestamp {ts} out of order"));
        }
        previous = Some(ts);
    }
    None
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{Archive, ArchiveState};
    use crate::fault::MemoryFaultSink;

    struct NullEvents {
        code: String,
        state: ArchiveState,
    }

    impl NullEvents {
        fn new(code: &str) -> Self {
            NullEvents {
                code: code.to_string(),
                state: ArchiveState::new(Duration::from_secs(60)),
            }
        }
    }

    impl Archive for NullEvents {
        fn code(&self) -> &str {
            &self.code
        }
        fn state(&self) -> &ArchiveState {
            &self.state
        }
    }

    impl EventArchive for NullEvents {
        fn write_event(&self, _event: &Event, _ctx: &CallContext) -> ArchiveResult<()> {
            Ok(())
        }
        fn get_event_by_id(&self, _id: EventId, _ctx: &CallContext) -> ArchiveResult<Option<Event>> {
            Ok(None)
        }
        fn get_events(
            &self,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
            _filter: &DataFilter,
            _ctx: &CallContext,
        ) -> ArchiveResult<Vec<Event>> {
            Ok(Vec::new())
        }
        fn ack_event(
            &self,
            _id: EventId,
            _ts: DateTime<Utc>,
            _user: i32,
            _ctx: &CallContext,
        ) -> ArchiveResult<bool> {
            Ok(false)
        }
    }

    fn holder() -> ArchiveHolder {
        ArchiveHolder::new(Arc::new(MemoryFaultSink::new()), None)
    }

    #[test]
    fn test_add_archive_rejects_out_of_range_bit() {
        let holder = holder();
        let err = holder
            .add_archive(ArchiveHandle::event(NullEvents::new("E")), MAX_ARCHIVE_COUNT)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArchiveBit { .. }));
        assert_eq!(holder.archive_count(), 0);
        assert!(lock(&holder.event).is_empty());
    }

    #[test]
    fn test_add_archive_rejects_duplicate_bit_and_code() {
        let holder = holder();
        holder
            .add_archive(ArchiveHandle::event(NullEvents::new("E")), 3)
            .unwrap();
        let err = holder
            .add_archive(ArchiveHandle::event(NullEvents::new("F")), 3)
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateArchiveBit { bit: 3, .. }));
        let err = holder
            .add_archive(ArchiveHandle::event(NullEvents::new("e")), 4)
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateArchiveCode(_)));
        assert_eq!(lock(&holder.event).len(), 1);
    }

    #[test]
    fn test_registered_bits_and_describe() {
        let holder = holder();
        holder
            .add_archive(ArchiveHandle::event(NullEvents::new("A")), 5)
            .unwrap();
        holder
            .add_archive(ArchiveHandle::event(NullEvents::new("B")), 2)
            .unwrap();
        assert_eq!(holder.registered_bits().bits().collect::<Vec<_>>(), vec![2, 5]);
        let info = holder.describe();
        assert_eq!(info[0].code, "B");
        assert_eq!(info[1].kind, ArchiveKind::Event);
        assert_eq!(holder.archive_kind(5), Some(ArchiveKind::Event));
        assert_eq!(holder.archive_kind(6), None);
        assert_eq!(holder.archive_kind(999), None);
    }

    #[test]
    fn test_panic_message_extraction() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "panicked: boom");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "panicked: bang");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "panicked with non-string payload");
    }
}
