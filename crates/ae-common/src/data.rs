//! Channel values and the live current-data snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Channel status codes.
///
/// Status `UNDEFINED` means the channel holds no data.
pub mod cnl_status {
    pub const UNDEFINED: i32 = 0;
    pub const DEFINED: i32 = 1;
    pub const ARCHIVAL: i32 = 2;
    pub const FORMULA_ERROR: i32 = 3;
    pub const UNRELIABLE: i32 = 4;

    // Limit statuses
    pub const LOW_CRASH: i32 = 11;
    pub const LOW: i32 = 12;
    pub const NORMAL: i32 = 13;
    pub const HIGH: i32 = 14;
    pub const HIGH_CRASH: i32 = 15;
}

/// Channel value: a number plus a status code.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CnlData {
    pub val: f64,
    pub stat: i32,
}

impl CnlData {
    /// Undefined value.
    pub const EMPTY: CnlData = CnlData {
        val: 0.0,
        stat: cnl_status::UNDEFINED,
    };

    pub const fn new(val: f64, stat: i32) -> Self {
        CnlData { val, stat }
    }

    /// Defined value with status [`cnl_status::DEFINED`].
    pub const fn defined(val: f64) -> Self {
        CnlData {
            val,
            stat: cnl_status::DEFINED,
        }
    }

    /// True when the status indicates no data.
    pub fn is_undefined(&self) -> bool {
        self.stat == cnl_status::UNDEFINED
    }
}

impl Default for CnlData {
    fn default() -> Self {
        CnlData::EMPTY
    }
}

/// Live snapshot of all channel values, pushed once per poll cycle.
///
/// Current archives may fill values into it during start-up; every archive
/// receives it read-only during processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentData {
    /// Time the snapshot was taken (UTC).
    pub timestamp: DateTime<Utc>,

    /// Channel number to value.
    #[serde(default)]
    values: BTreeMap<i32, CnlData>,
}

impl CurrentData {
    /// Empty snapshot at `timestamp`.
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        CurrentData {
            timestamp,
            values: BTreeMap::new(),
        }
    }

    /// Snapshot declaring `cnl_nums` as undefined channels.
    pub fn with_channels(timestamp: DateTime<Utc>, cnl_nums: &[i32]) -> Self {
        let values = cnl_nums.iter().map(|&n| (n, CnlData::EMPTY)).collect();
        CurrentData { timestamp, values }
    }

    /// Value of a channel. Unknown channels read as undefined.
    pub fn get(&self, cnl_num: i32) -> CnlData {
        self.values.get(&cnl_num).copied().unwrap_or(CnlData::EMPTY)
    }

    pub fn contains(&self, cnl_num: i32) -> bool {
        self.values.contains_key(&cnl_num)
    }

    pub fn set(&mut self, cnl_num: i32, data: CnlData) {
        self.values.insert(cnl_num, data);
    }

    /// Channel numbers in ascending order.
    pub fn cnl_nums(&self) -> Vec<i32> {
        self.values.keys().copied().collect()
    }

    /// Channels currently holding no data.
    pub fn undefined_cnl_nums(&self) -> Vec<i32> {
        self.values
            .iter()
            .filter(|(_, d)| d.is_undefined())
            .map(|(&n, _)| n)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, CnlData)> + '_ {
        self.values.iter().map(|(&n, &d)| (n, d))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(i32, CnlData)> for CurrentData {
    fn from_iter<I: IntoIterator<Item = (i32, CnlData)>>(iter: I) -> Self {
        CurrentData {
            timestamp: Utc::now(),
            values: iter.into_iter().collect(),
        }
    }
}
