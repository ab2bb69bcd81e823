//! Property tests for holder registration and trend alignment.

use std::sync::Arc;
use std::time::Duration;

use ae_archive::archives::{MemoryEventArchive, MemoryTrendArchive};
use ae_archive::{ArchiveHandle, ArchiveHolder, EventArchive, HistoricalArchive, MemoryFaultSink};
use ae_common::{CnlData, CurrentData, MAX_ARCHIVE_COUNT};
use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap()
}

fn holder() -> ArchiveHolder {
    ArchiveHolder::new(Arc::new(MemoryFaultSink::new()), None)
}

proptest! {
    #[test]
    fn registration_respects_bit_bounds(bit in 0usize..(MAX_ARCHIVE_COUNT * 2)) {
        let holder = holder();
        let archive = MemoryEventArchive::new("Ev", Duration::from_secs(60), Duration::from_secs(60));
        let result = holder.add_archive(ArchiveHandle::event(archive), bit);

        if bit < MAX_ARCHIVE_COUNT {
            prop_assert!(result.is_ok());
            prop_assert!(holder.get_archive::<dyn EventArchive>(bit).is_some());
            prop_assert!(holder.get_archive::<dyn HistoricalArchive>(bit).is_none());
            prop_assert_eq!(holder.archive_count(), 1);
        } else {
            prop_assert!(result.is_err());
            prop_assert_eq!(holder.archive_count(), 0);
        }
    }

    #[test]
    fn trend_queries_stay_aligned(
        offsets in proptest::collection::btree_set(0i64..10_000, 0..40),
        cnl_nums in proptest::collection::vec(1i32..50, 0..6),
        window in (0i64..10_000, 0i64..10_000),
    ) {
        let holder = holder();
        let archive = MemoryTrendArchive::new(
            "Min",
            Duration::from_secs(60),
            Duration::from_secs(86_400),
            Duration::ZERO,
        );
        holder.add_archive(ArchiveHandle::historical(archive), 0).unwrap();

        for offset in &offsets {
            let mut cur = CurrentData::new(base() + chrono::Duration::seconds(*offset));
            cur.set((*offset % 50) as i32, CnlData::defined(*offset as f64));
            holder.process_data(&cur);
        }

        let (a, b) = window;
        let start = base() + chrono::Duration::seconds(a.min(b));
        let end = base() + chrono::Duration::seconds(a.max(b));
        let bundle = holder.get_trends(&cnl_nums, start, end, 0);
        let expected = offsets.iter().filter(|&&o| o >= a.min(b) && o <= a.max(b)).count();

        prop_assert!(bundle.is_aligned());
        prop_assert_eq!(bundle.len(), expected);
        prop_assert_eq!(&bundle.cnl_nums, &cnl_nums);
        prop_assert!(bundle.timestamps().windows(2).all(|w| w[0] <= w[1]));
        prop_assert!(bundle.timestamps().iter().all(|ts| *ts >= start && *ts <= end));
    }
}
