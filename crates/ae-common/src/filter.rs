//! Event query filter.
//!
//! A [`DataFilter`] only describes which events a caller wants. Each event
//! archive evaluates it against its own storage.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::event::Severity;

/// Description of an event query filter. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFilter {
    /// Originating channel numbers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cnl_nums: Option<BTreeSet<i32>>,

    /// Originating object numbers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obj_nums: Option<BTreeSet<i32>>,

    /// Originating device numbers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_nums: Option<BTreeSet<i32>>,

    /// Inclusive lower severity bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_severity: Option<i32>,

    /// Inclusive upper severity bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_severity: Option<i32>,

    /// Acknowledged state to match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<bool>,

    /// Include events flagged hidden.
    #[serde(default)]
    pub include_hidden: bool,

    /// Maximum number of events returned, applied after ordering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    /// Newest events first.
    #[serde(default)]
    pub descending: bool,
}

impl DataFilter {
    /// Filter matching every event not flagged hidden.
    ///
    /// Hidden events need [`DataFilter::with_hidden`].
    pub fn visible() -> Self {
        DataFilter::default()
    }

    pub fn with_cnl_nums(mut self, cnl_nums: impl IntoIterator<Item = i32>) -> Self {
        self.cnl_nums = Some(cnl_nums.into_iter().collect());
        self
    }

    pub fn with_obj_nums(mut self, obj_nums: impl IntoIterator<Item = i32>) -> Self {
        self.obj_nums = Some(obj_nums.into_iter().collect());
        self
    }

    pub fn with_device_nums(mut self, device_nums: impl IntoIterator<Item = i32>) -> Self {
        self.device_nums = Some(device_nums.into_iter().collect());
        self
    }

    pub fn with_severity_range(mut self, min: Option<i32>, max: Option<i32>) -> Self {
        self.min_severity = min;
        self.max_severity = max;
        self
    }

    /// Raise the lower severity bound to the start of `band`.
    ///
    /// A tighter bound already set is kept.
    pub fn with_min_band(mut self, band: Severity) -> Self {
        let floor = band.min_level();
        self.min_severity = Some(self.min_severity.map_or(floor, |min| min.max(floor)));
        self
    }

    pub fn with_ack(mut self, ack: bool) -> Self {
        self.ack = Some(ack);
        self
    }

    pub fn with_hidden(mut self, include_hidden: bool) -> Self {
        self.include_hidden = include_hidden;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }

    /// True when no field narrows the result.
    pub fn is_unrestricted(&self) -> bool {
        self.cnl_nums.is_none()
            && self.obj_nums.is_none()
            && self.device_nums.is_none()
            && self.min_severity.is_none()
            && self.max_severity.is_none()
            && self.ack.is_none()
            && self.limit.is_none()
    }
}
