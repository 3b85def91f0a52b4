//! Dispatcher: pick the best still-feasible slot and schedule the call
//!
//! Given a function name and an optional deadline, loads the persisted
//! schedule, walks an explicit decision tree over the sorted slots and
//! enqueues a deferred HTTP task for the chosen instant.

pub mod queue;

#[cfg(test)]
mod selection_test;

pub use queue::TaskQueue;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::error::{Error, Result};
use crate::planner::schedule::{Schedule, SlotRecommendation};
use crate::storage::{keys, ObjectStore};

/// Incoming dispatch request.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct DispatchEvent {
    #[serde(default)]
    pub function_name: Option<String>,
    /// Passed through as the invocation body
    #[serde(default)]
    pub function_param: Option<Value>,
    /// "false" forces immediate execution and wins over any deadline
    #[serde(default)]
    pub delay: Option<String>,
    /// ISO-8601 UTC
    #[serde(default)]
    pub deadline: Option<String>,
}

/// The slot the dispatcher settled on.
#[derive(Clone, Debug, PartialEq)]
pub struct SlotSelection {
    pub region: String,
    pub target_time: DateTime<Utc>,
    /// 0 marks a synthesized immediate slot
    pub priority: u32,
    pub carbon_intensity: i64,
    pub function_url: Option<String>,
    pub delayed: bool,
}

/// Response shape returned to the caller.
#[derive(Clone, Debug, Serialize)]
pub struct DispatchResponse {
    pub status: String,
    pub function: String,
    /// "true" | "false"
    pub delay: String,
    pub target_region: String,
    pub target_time: DateTime<Utc>,
    pub priority: u32,
    pub carbon_intensity: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_url: Option<String>,
}

fn truncate_to_hour(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.date_naive()
        .and_hms_opt(dt.hour(), 0, 0)
        .expect("hour truncation is always a valid time")
        .and_utc()
}

struct ParsedSlot<'a> {
    datetime: DateTime<Utc>,
    slot: &'a SlotRecommendation,
}

fn parsed_sorted_slots(schedule: &Schedule) -> Result<Vec<ParsedSlot<'_>>> {
    let mut slots = Vec::with_capacity(schedule.recommendations.len());
    for slot in &schedule.recommendations {
        slots.push(ParsedSlot {
            datetime: slot.parsed_datetime()?,
            slot,
        });
    }
    slots.sort_by_key(|s| s.datetime);
    if slots.is_empty() {
        return Err(Error::NotFound("schedule has no slots".into()));
    }
    Ok(slots)
}

fn selection_from(slot: &SlotRecommendation, target_time: DateTime<Utc>, priority: u32, delayed: bool) -> SlotSelection {
    SlotSelection {
        region: slot.region.clone(),
        target_time,
        priority,
        carbon_intensity: slot.carbon_intensity,
        function_url: slot.function_url.clone(),
        delayed,
    }
}

/// The slot whose hour covers `now`: the latest slot not after `now`,
/// or the earliest slot when the schedule has not started yet.
fn immediate_selection(slots: &[ParsedSlot<'_>], now: DateTime<Utc>) -> SlotSelection {
    let current = slots
        .iter()
        .rev()
        .find(|s| s.datetime <= now)
        .unwrap_or(&slots[0]);
    selection_from(current.slot, truncate_to_hour(now), 0, false)
}

/// Select the optimal feasible slot.
///
/// Decision tree, applied to the slots sorted ascending by datetime:
/// immediate execution (delay disabled, or a deadline already in the
/// past) resolves to the slot covering the current hour; a deadline
/// before the earliest slot takes the earliest slot at the deadline
/// instant; otherwise the best-priority slot between now and the
/// deadline wins, and when none exists the last slot runs at the
/// deadline truncated to the hour. A slot earlier than `now` is never
/// feasible, even within the current hour.
pub fn find_optimal_slot(
    schedule: &Schedule,
    deadline: Option<DateTime<Utc>>,
    delay_disabled: bool,
    now: DateTime<Utc>,
) -> Result<SlotSelection> {
    let slots = parsed_sorted_slots(schedule)?;

    if delay_disabled {
        return Ok(immediate_selection(&slots, now));
    }

    let deadline =
        deadline.ok_or_else(|| Error::Dispatch("deadline required unless delay=false".into()))?;

    // A deadline in the past clamps to now: execute immediately.
    if deadline < now {
        return Ok(immediate_selection(&slots, now));
    }

    let earliest = &slots[0];
    if deadline < earliest.datetime {
        let delayed = deadline > now;
        return Ok(selection_from(
            earliest.slot,
            deadline,
            earliest.slot.priority,
            delayed,
        ));
    }

    let feasible: Vec<&ParsedSlot<'_>> = slots
        .iter()
        .filter(|s| s.datetime >= now && s.datetime <= deadline)
        .collect();

    if feasible.is_empty() {
        let last = slots.last().expect("checked non-empty");
        let target = truncate_to_hour(deadline);
        return Ok(selection_from(
            last.slot,
            target,
            last.slot.priority,
            target > now,
        ));
    }

    let best = feasible
        .iter()
        .min_by_key(|s| (s.slot.priority, s.datetime))
        .expect("checked non-empty");
    Ok(selection_from(
        best.slot,
        best.datetime,
        best.slot.priority,
        best.datetime > now,
    ))
}

fn parse_deadline(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    // Tolerate a naive ISO timestamp, interpreted as UTC.
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|_| Error::Dispatch(format!("invalid deadline '{}', use ISO 8601", raw)))
}

/// Validate an event into its inputs: function name, immediate flag,
/// optional deadline.
pub fn validate_event(event: &DispatchEvent) -> Result<(String, bool, Option<DateTime<Utc>>)> {
    let function_name = event
        .function_name
        .clone()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| Error::Dispatch("missing 'function_name'".into()))?;

    let delay_disabled = match event.delay.as_deref() {
        None | Some("true") => false,
        Some("false") => true,
        Some(other) => {
            return Err(Error::Dispatch(format!(
                "invalid 'delay' value '{}', expected \"true\" or \"false\"",
                other
            )))
        }
    };

    let deadline = match (&event.deadline, delay_disabled) {
        // delay=false wins over any deadline.
        (_, true) => None,
        (Some(raw), false) => Some(parse_deadline(raw)?),
        (None, false) => return Err(Error::Dispatch("missing 'deadline'".into())),
    };

    Ok((function_name, delay_disabled, deadline))
}

/// Full dispatch path: validate, load the schedule, select a slot and
/// (when a queue is configured) enqueue the deferred invocation.
pub async fn handle_event(
    event: DispatchEvent,
    store: &dyn ObjectStore,
    task_queue: Option<&TaskQueue>,
) -> Result<DispatchResponse> {
    let (function_name, delay_disabled, deadline) = validate_event(&event)?;

    let value = store.read(&keys::schedule(&function_name)).await?;
    let schedule: Schedule = serde_json::from_value(value)
        .map_err(|e| Error::NotFound(format!("schedule for '{}' unreadable: {}", function_name, e)))?;

    let selection = find_optimal_slot(&schedule, deadline, delay_disabled, Utc::now())?;
    info!(
        function = %function_name,
        region = %selection.region,
        target_time = %selection.target_time,
        "Dispatching"
    );

    if let (Some(queue), Some(url)) = (task_queue, selection.function_url.as_deref()) {
        let body = event.function_param.clone().unwrap_or(Value::Null);
        queue.create_task(url, &body, selection.target_time).await?;
    }

    Ok(DispatchResponse {
        status: "scheduled".to_string(),
        function: function_name,
        delay: if selection.delayed { "true" } else { "false" }.to_string(),
        target_region: selection.region,
        target_time: selection.target_time,
        priority: selection.priority,
        carbon_intensity: selection.carbon_intensity,
        function_url: selection.function_url,
    })
}
