//! Event filter evaluation shared by the built-in event archives.

use ae_common::{DataFilter, Event};
use chrono::{DateTime, Utc};

/// Whether `event` passes every restriction set on `filter`.
pub fn event_matches(filter: &DataFilter, event: &Event) -> bool {
    if event.hidden && !filter.include_hidden {
        return false;
    }
    if let Some(cnl_nums) = &filter.cnl_nums {
        if !cnl_nums.contains(&event.cnl_num) {
            return false;
        }
    }
    if let Some(obj_nums) = &filter.obj_nums {
        if !obj_nums.contains(&event.obj_num) {
            return false;
        }
    }
    if let Some(device_nums) = &filter.device_nums {
        if !device_nums.contains(&event.device_num) {
            return false;
        }
    }
    if filter.min_severity.is_some_and(|min| event.severity < min) {
        return false;
    }
    if filter.max_severity.is_some_and(|max| event.severity > max) {
        return false;
    }
    if filter.ack.is_some_and(|ack| event.is_acknowledged() != ack) {
        return false;
    }
    true
}

/// Select events in `[start_time, end_time]` matching `filter`.
///
/// `events` must already be in ascending time order. The result honours the
/// filter's ordering and limit.
pub fn select_events<'a>(
    events: impl Iterator<Item = &'a Event>,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    filter: &DataFilter,
) -> Vec<Event> {
    if start_time > end_time {
        return Vec::new();
    }
    let mut selected: Vec<Event> = events
        .filter(|e| e.timestamp >= start_time && e.timestamp <= end_time)
        .filter(|e| event_matches(filter, e))
        .cloned()
        .collect();
    if filter.descending {
        selected.reverse();
    }
    if let Some(limit) = filter.limit {
        selected.truncate(limit);
    }
    selected
}
