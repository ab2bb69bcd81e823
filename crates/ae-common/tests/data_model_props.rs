//! Property tests for data model invariants.

use ae_common::{ArchiveMask, CnlData, TrendBundle, MAX_ARCHIVE_COUNT};
use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

proptest! {
    #[test]
    fn bundle_series_stay_aligned(
        channels in proptest::collection::vec(any::<i32>(), 0..8),
        rows in proptest::collection::vec((0i64..10_000, any::<bool>()), 0..50),
    ) {
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut offsets: Vec<i64> = rows.iter().map(|(o, _)| *o).collect();
        offsets.sort();

        let mut bundle = TrendBundle::empty(&channels);
        for (offset, (_, short_row)) in offsets.iter().zip(rows.iter()) {
            let width = if *short_row && !channels.is_empty() {
                channels.len() - 1
            } else {
                channels.len()
            };
            let values = vec![CnlData::defined(*offset as f64); width];
            let _ = bundle.push_row(base + Duration::seconds(*offset), &values);
        }

        prop_assert!(bundle.is_aligned());
        for (i, _) in channels.iter().enumerate() {
            prop_assert_eq!(bundle.series(i).unwrap().len(), bundle.len());
        }
    }

    #[test]
    fn mask_roundtrips_bits(bits in proptest::collection::btree_set(0usize..MAX_ARCHIVE_COUNT, 0..MAX_ARCHIVE_COUNT)) {
        let mask: ArchiveMask = bits.iter().copied().collect();
        let back: Vec<usize> = mask.bits().collect();
        prop_assert_eq!(back, bits.into_iter().collect::<Vec<_>>());
    }
}
