//! Trend, trend bundle and slice query results.
//!
//! All three shapes have a well-defined empty form so that queries can
//! answer with a zero-length container instead of failing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::CnlData;
use crate::error::{Error, Result};

/// A single timestamped value of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub timestamp: DateTime<Utc>,
    pub data: CnlData,
}

/// Time series of one channel over a time span.
///
/// Points are ordered by non-decreasing timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub cnl_num: i32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    points: Vec<TrendPoint>,
}

impl Trend {
    /// Zero-length trend for `cnl_num`.
    pub fn empty(cnl_num: i32, start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Trend {
            cnl_num,
            start_time,
            end_time,
            points: Vec::new(),
        }
    }

    /// Append a point. A timestamp earlier than the last point is rejected.
    pub fn push(&mut self, timestamp: DateTime<Utc>, data: CnlData) -> Result<()> {
        if let Some(last) = self.points.last() {
            if timestamp < last.timestamp {
                return Err(Error::Alignment(format!(
                    "trend point {} precedes last point {} for channel {}",
                    timestamp, last.timestamp, self.cnl_num
                )));
            }
        }
        self.points.push(TrendPoint { timestamp, data });
        Ok(())
    }

    pub fn points(&self) -> &[TrendPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Several channels' time series sharing one timestamp axis.
///
/// `series[i]` holds the values of `cnl_nums[i]` and always has the same
/// length as `timestamps`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendBundle {
    pub cnl_nums: Vec<i32>,
    timestamps: Vec<DateTime<Utc>>,
    series: Vec<Vec<CnlData>>,
}

impl TrendBundle {
    /// Zero-length bundle with one empty series per requested channel.
    pub fn empty(cnl_nums: &[i32]) -> Self {
        TrendBundle {
            cnl_nums: cnl_nums.to_vec(),
            timestamps: Vec::new(),
            series: vec![Vec::new(); cnl_nums.len()],
        }
    }

    /// Append one row. `values` must hold one value per channel, in channel order.
    pub fn push_row(&mut self, timestamp: DateTime<Utc>, values: &[CnlData]) -> Result<()> {
        if values.len() != self.cnl_nums.len() {
            return Err(Error::Alignment(format!(
                "row has {} values for {} channels",
                values.len(),
                self.cnl_nums.len()
            )));
        }
        if let Some(&last) = self.timestamps.last() {
            if timestamp < last {
                return Err(Error::Alignment(format!(
                    "bundle row {} precedes last row {}",
                    timestamp, last
                )));
            }
        }
        self.timestamps.push(timestamp);
        for (column, &value) in self.series.iter_mut().zip(values) {
            column.push(value);
        }
        Ok(())
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    /// Series by position in `cnl_nums`.
    pub fn series(&self, index: usize) -> Option<&[CnlData]> {
        self.series.get(index).map(Vec::as_slice)
    }

    /// Series by channel number.
    pub fn series_for(&self, cnl_num: i32) -> Option<&[CnlData]> {
        let index = self.cnl_nums.iter().position(|&n| n == cnl_num)?;
        self.series(index)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Every series has exactly one value per timestamp.
    pub fn is_aligned(&self) -> bool {
        self.series.len() == self.cnl_nums.len()
            && self.series.iter().all(|s| s.len() == self.timestamps.len())
    }
}

/// Cross-channel values at one timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slice {
    pub timestamp: DateTime<Utc>,
    pub cnl_nums: Vec<i32>,
    pub values: Vec<CnlData>,
}

impl Slice {
    /// Slice with every requested channel undefined.
    pub fn undefined(cnl_nums: &[i32], timestamp: DateTime<Utc>) -> Self {
        Slice {
            timestamp,
            cnl_nums: cnl_nums.to_vec(),
            values: vec![CnlData::EMPTY; cnl_nums.len()],
        }
    }

    /// Value for a channel, if it was requested.
    pub fn get(&self, cnl_num: i32) -> Option<CnlData> {
        let index = self.cnl_nums.iter().position(|&n| n == cnl_num)?;
        self.values.get(index).copied()
    }

    /// True when no requested channel has data.
    pub fn is_undefined(&self) -> bool {
        self.values.iter().all(CnlData::is_undefined)
    }
}
