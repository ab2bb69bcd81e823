//! Acquisition service driving the archive holder.
//!
//! The service is the synchronous core of the acquisition loop:
//!
//! - **Start**: let current archives restore the live snapshot once.
//! - **Update**: hand every snapshot to the archives and flush historical
//!   archives at the end of the cycle.
//! - **Events**: assign ids, write by mask, acknowledge everywhere.
//! - **Heartbeat**: throttle retention cleanup to the configured period.
//!
//! Timing is driven by the caller (wall clock in production, feed time on
//! replay), which keeps the loop deterministic under test.

use std::sync::Arc;
use std::time::Duration;

use ae_archive::ArchiveHolder;
use ae_common::{ArchiveMask, CurrentData, Event, EventId, EventIdGenerator};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::log_event;
use crate::logging::{event_names, LogContext, Stage};

/// Counters of a service run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStats {
    /// Whether a current archive supplied values at start-up.
    pub restored: bool,
    /// Update cycles processed.
    pub cycles: u64,
    /// Events raised.
    pub events: u64,
    /// Event copies stored across all archives.
    pub event_writes: u64,
    /// Acknowledgments requested.
    pub acks: u64,
    /// Acknowledgments that found the event in at least one archive.
    pub acks_applied: u64,
    /// Heartbeats that ran the cleanup pass.
    pub heartbeats: u64,
    /// Archive cleanups started across all heartbeats.
    pub cleanups: u64,
    /// Snapshot time of the last update cycle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update_at: Option<DateTime<Utc>>,
}

/// Single-threaded acquisition loop over a shared [`ArchiveHolder`].
#[derive(Debug)]
pub struct AcquisitionService {
    holder: Arc<ArchiveHolder>,
    log: LogContext,
    ids: EventIdGenerator,
    heartbeat_period: Duration,
    last_heartbeat: Option<DateTime<Utc>>,
    started: bool,
    stats: ServiceStats,
}

impl AcquisitionService {
    pub fn new(holder: Arc<ArchiveHolder>, log: LogContext, heartbeat_period: Duration) -> Self {
        AcquisitionService {
            holder,
            log,
            ids: EventIdGenerator::new(),
            heartbeat_period,
            last_heartbeat: None,
            started: false,
            stats: ServiceStats::default(),
        }
    }

    /// Use `ids` for events raised without an id.
    pub fn with_id_generator(mut self, ids: EventIdGenerator) -> Self {
        self.ids = ids;
        self
    }

    pub fn holder(&self) -> &Arc<ArchiveHolder> {
        &self.holder
    }

    pub fn stats(&self) -> &ServiceStats {
        &self.stats
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Restore `cur` from the current archives.
    ///
    /// Only the first call asks the archives; later calls return false.
    pub fn start(&mut self, cur: &mut CurrentData) -> bool {
        if self.started {
            return false;
        }
        self.started = true;
        log_event!(
            self.log,
            INFO,
            event_names::SERVICE_STARTED,
            Stage::Init,
            "acquisition service started",
            archives = self.holder.archive_count()
        );

        let restored = self.holder.read_current_data(cur);
        self.stats.restored = restored;
        if restored {
            log_event!(
                self.log,
                INFO,
                event_names::CURRENT_RESTORED,
                Stage::Restore,
                "current data restored from archive",
                channels = cur.len()
            );
        }
        restored
    }

    /// Process one snapshot and flush historical archives.
    pub fn update(&mut self, cur: &CurrentData) {
        self.holder.process_data(cur);
        self.holder.end_update_all();
        self.stats.cycles += 1;
        self.stats.last_update_at = Some(cur.timestamp);
    }

    /// Write `event` to the event archives selected by `mask`.
    ///
    /// An event without an id gets the next generated one. Returns the id
    /// the event was written under.
    pub fn raise_event(&mut self, mut event: Event, mask: ArchiveMask) -> EventId {
        if !event.id.is_assigned() {
            event.id = self.ids.next_id();
        }
        let written = self.holder.write_event(&event, mask);
        self.stats.events += 1;
        self.stats.event_writes += written as u64;
        log_event!(
            self.log,
            DEBUG,
            event_names::EVENT_WRITTEN,
            Stage::Event,
            "event written",
            event_id = event.id.0,
            archives = written
        );
        event.id
    }

    /// Acknowledge `id` in every event archive. Returns how many held it.
    pub fn ack_event(&mut self, id: EventId, timestamp: DateTime<Utc>, user_id: i32) -> usize {
        let applied = self.holder.ack_event(id, timestamp, user_id);
        self.stats.acks += 1;
        if applied > 0 {
            self.stats.acks_applied += 1;
        }
        log_event!(
            self.log,
            DEBUG,
            event_names::EVENT_ACKED,
            Stage::Ack,
            "event acknowledged",
            event_id = id.0,
            user_id = user_id,
            archives = applied
        );
        applied
    }

    /// Run the cleanup pass when a heartbeat period has passed since the
    /// previous one. Returns whether it ran.
    pub fn heartbeat(&mut self, now: DateTime<Utc>) -> bool {
        if !self.heartbeat_due(now) {
            return false;
        }
        self.last_heartbeat = Some(now);
        let cleanups = self.holder.delete_outdated_data_at(now);
        self.stats.heartbeats += 1;
        self.stats.cleanups += cleanups as u64;
        log_event!(
            self.log,
            DEBUG,
            event_names::HEARTBEAT,
            Stage::Cleanup,
            "heartbeat",
            cleanups = cleanups
        );
        true
    }

    fn heartbeat_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_heartbeat {
            None => true,
            Some(last) => now
                .signed_duration_since(last)
                .to_std()
                .is_ok_and(|elapsed| elapsed >= self.heartbeat_period),
        }
    }

    /// Flush current and historical archives, then stop in-flight archive
    /// calls.
    pub fn stop(&mut self) -> ServiceStats {
        self.holder.flush_current_all();
        self.holder.end_update_all();
        self.holder.cancel();
        log_event!(
            self.log,
            INFO,
            event_names::SERVICE_STOPPED,
            Stage::Update,
            "acquisition service stopped",
            cycles = self.stats.cycles
        );
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ae_archive::archives::{MemoryEventArchive, MemoryTrendArchive, SnapshotArchive};
    use ae_archive::{ArchiveHandle, MemoryFaultSink};
    use ae_common::{CnlData, DataFilter};
    use chrono::TimeZone;

    fn t(sec: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(sec)
    }

    fn service() -> AcquisitionService {
        let holder = ArchiveHolder::new(Arc::new(MemoryFaultSink::new()), None);
        holder
            .add_archive(
                ArchiveHandle::current(SnapshotArchive::in_memory("Cur", Duration::from_secs(60))),
                0,
            )
            .unwrap();
        holder
            .add_archive(
                ArchiveHandle::historical(MemoryTrendArchive::new(
                    "Min",
                    Duration::from_secs(60),
                    Duration::from_secs(120),
                    Duration::ZERO,
                )),
                1,
            )
            .unwrap();
        holder
            .add_archive(
                ArchiveHandle::event(MemoryEventArchive::new(
                    "Ev",
                    Duration::from_secs(60),
                    Duration::from_secs(3600),
                )),
                2,
            )
            .unwrap();
        AcquisitionService::new(
            Arc::new(holder),
            LogContext::new("run-test", "host-test"),
            Duration::from_secs(30),
        )
        .with_id_generator(EventIdGenerator::starting_after(100))
    }

    fn snapshot(sec: i64, value: f64) -> CurrentData {
        let mut cur = CurrentData::new(t(sec));
        cur.set(10, CnlData::defined(value));
        cur
    }

    #[test]
    fn test_start_restores_only_once() {
        let mut svc = service();
        svc.holder().process_data(&snapshot(0, 7.0));

        let mut live = CurrentData::with_channels(t(5), &[10]);
        assert!(svc.start(&mut live));
        assert_eq!(live.get(10).val, 7.0);
        assert!(svc.stats().restored);

        let mut again = CurrentData::with_channels(t(6), &[10]);
        assert!(!svc.start(&mut again));
        assert!(again.get(10).is_undefined());
    }

    #[test]
    fn test_update_counts_cycles() {
        let mut svc = service();
        svc.update(&snapshot(0, 1.0));
        svc.update(&snapshot(10, 2.0));
        assert_eq!(svc.stats().cycles, 2);
        assert_eq!(svc.stats().last_update_at, Some(t(10)));
        assert_eq!(svc.holder().get_timestamps(t(0), t(10), 1).len(), 2);
    }

    #[test]
    fn test_raise_event_assigns_missing_id() {
        let mut svc = service();
        let id = svc.raise_event(Event::new(EventId::UNASSIGNED, t(1)), ArchiveMask::from_bit(2));
        assert!(id.0 > 100);
        assert!(svc.holder().get_event_by_id(id, 2).is_some());

        let kept = svc.raise_event(Event::new(EventId(7), t(2)), ArchiveMask::from_bit(2));
        assert_eq!(kept, EventId(7));
        assert_eq!(svc.stats().events, 2);
        assert_eq!(svc.stats().event_writes, 2);
    }

    #[test]
    fn test_event_outside_mask_is_not_stored() {
        let mut svc = service();
        let id = svc.raise_event(Event::new(EventId(9), t(1)), ArchiveMask::from_bit(5));
        assert!(svc.holder().get_event_by_id(id, 2).is_none());
        assert_eq!(svc.stats().event_writes, 0);
    }

    #[test]
    fn test_ack_event_counts_applied() {
        let mut svc = service();
        let id = svc.raise_event(Event::new(EventId(11), t(1)), ArchiveMask::from_bit(2));
        assert_eq!(svc.ack_event(id, t(2), 4), 1);
        assert_eq!(svc.ack_event(EventId(999), t(2), 4), 0);
        assert_eq!(svc.stats().acks, 2);
        assert_eq!(svc.stats().acks_applied, 1);

        let acked = svc
            .holder()
            .get_events(t(0), t(5), &DataFilter::visible().with_ack(true), 2);
        assert_eq!(acked.len(), 1);
    }

    #[test]
    fn test_heartbeat_is_throttled() {
        let mut svc = service();
        assert!(svc.heartbeat(t(0)));
        assert!(!svc.heartbeat(t(10)));
        assert!(!svc.heartbeat(t(29)));
        assert!(svc.heartbeat(t(30)));
        assert_eq!(svc.stats().heartbeats, 2);
    }

    #[test]
    fn test_heartbeat_runs_retention() {
        let mut svc = service();
        svc.update(&snapshot(0, 1.0));
        svc.update(&snapshot(200, 2.0));
        assert!(svc.heartbeat(t(300)));
        // Retention of 120s as of t(300) drops the first row.
        assert_eq!(svc.holder().get_timestamps(t(0), t(300), 1), vec![t(200)]);
        assert_eq!(svc.stats().cleanups, 3);
    }

    #[test]
    fn test_stop_cancels_holder() {
        let mut svc = service();
        svc.update(&snapshot(0, 1.0));
        let stats = svc.stop();
        assert_eq!(stats.cycles, 1);
        assert!(svc.holder().is_cancelled());
    }

    #[test]
    fn test_stop_persists_latest_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cur.json");
        let open = || {
            let holder = ArchiveHolder::new(Arc::new(MemoryFaultSink::new()), None);
            holder
                .add_archive(
                    ArchiveHandle::current(
                        SnapshotArchive::open(
                            "Cur",
                            &path,
                            Duration::from_secs(60),
                            Duration::from_secs(10),
                        )
                        .unwrap(),
                    ),
                    0,
                )
                .unwrap();
            AcquisitionService::new(
                Arc::new(holder),
                LogContext::new("run-test", "host-test"),
                Duration::from_secs(30),
            )
        };

        let mut svc = open();
        svc.update(&snapshot(0, 1.5));
        svc.update(&snapshot(5, 2.5));
        svc.stop();

        let mut restarted = open();
        let mut live = CurrentData::with_channels(t(60), &[10]);
        assert!(restarted.start(&mut live));
        assert_eq!(live.get(10).val, 2.5);
    }

    #[test]
    fn test_stats_serialize() {
        let mut svc = service();
        svc.update(&snapshot(0, 1.0));
        let json = serde_json::to_value(svc.stats()).unwrap();
        assert_eq!(json["cycles"], 1);
        assert_eq!(json["restored"], false);
    }
}
