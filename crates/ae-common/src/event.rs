//! Event records.
//!
//! An event is an incident detected by the acquisition process. Everything
//! except the acknowledgment sub-state is fixed once the event is raised.

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::data::CnlData;
use crate::id::EventId;

/// Acknowledgment sub-state of an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckState {
    pub ack: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ack_user_id: i32,
}

/// Coarse severity band derived from the numeric severity level.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Minor,
    Major,
    Critical,
}

impl Severity {
    /// Band for a numeric level (1-249 info, 250-499 minor, 500-749 major, 750+ critical).
    pub fn from_level(level: i32) -> Self {
        match level {
            i32::MIN..=249 => Severity::Info,
            250..=499 => Severity::Minor,
            500..=749 => Severity::Major,
            _ => Severity::Critical,
        }
    }

    /// Lowest numeric level in this band.
    pub fn min_level(&self) -> i32 {
        match self {
            Severity::Info => 1,
            Severity::Minor => 250,
            Severity::Major => 500,
            Severity::Critical => 750,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Minor => write!(f, "minor"),
            Severity::Major => write!(f, "major"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Incident record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub cnl_num: i32,
    #[serde(default)]
    pub obj_num: i32,
    #[serde(default)]
    pub device_num: i32,
    #[serde(default)]
    pub prev_cnl_data: CnlData,
    #[serde(default)]
    pub cnl_data: CnlData,
    #[serde(default)]
    pub severity: i32,
    #[serde(default)]
    pub ack_required: bool,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    #[serde(default)]
    ack: AckState,
}

impl Event {
    /// Unacknowledged event with default payload.
    pub fn new(id: EventId, timestamp: DateTime<Utc>) -> Self {
        Event {
            id,
            timestamp,
            hidden: false,
            cnl_num: 0,
            obj_num: 0,
            device_num: 0,
            prev_cnl_data: CnlData::EMPTY,
            cnl_data: CnlData::EMPTY,
            severity: 0,
            ack_required: false,
            text: String::new(),
            description: String::new(),
            data: None,
            ack: AckState::default(),
        }
    }

    pub fn with_id(mut self, id: EventId) -> Self {
        self.id = id;
        self
    }

    /// Set the originating channel and its value change.
    pub fn with_channel(mut self, cnl_num: i32, prev: CnlData, new: CnlData) -> Self {
        self.cnl_num = cnl_num;
        self.prev_cnl_data = prev;
        self.cnl_data = new;
        self
    }

    pub fn with_source(mut self, obj_num: i32, device_num: i32) -> Self {
        self.obj_num = obj_num;
        self.device_num = device_num;
        self
    }

    pub fn with_severity(mut self, severity: i32) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_ack_required(mut self, ack_required: bool) -> Self {
        self.ack_required = ack_required;
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn severity_band(&self) -> Severity {
        Severity::from_level(self.severity)
    }

    pub fn ack_state(&self) -> &AckState {
        &self.ack
    }

    pub fn is_acknowledged(&self) -> bool {
        self.ack.ack
    }

    /// Record an acknowledgment. The only mutation allowed after creation.
    pub fn acknowledge(&mut self, timestamp: DateTime<Utc>, user_id: i32) {
        self.ack = AckState {
            ack: true,
            ack_timestamp: Some(timestamp),
            ack_user_id: user_id,
        };
    }

    /// Compare write-once fields, ignoring the acknowledgment sub-state.
    pub fn same_record(&self, other: &Event) -> bool {
        self.id == other.id
            && self.timestamp == other.timestamp
            && self.hidden == other.hidden
            && self.cnl_num == other.cnl_num
            && self.obj_num == other.obj_num
            && self.device_num == other.device_num
            && self.prev_cnl_data == other.prev_cnl_data
            && self.cnl_data == other.cnl_data
            && self.severity == other.severity
            && self.ack_required == other.ack_required
            && self.text == other.text
            && self.description == other.description
            && self.data == other.data
    }
}
