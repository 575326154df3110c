//! Event logging for simulation output and auditing.
//!
//! Every realized occurrence in an agent's timeline is an [`Event`]. The
//! [`EventLog`] is append-only and keeps a per-agent index so timelines can
//! be read back without scanning the whole log.
//!
//! # Event Types
//!
//! - **Start** / **End**: entry at time zero and reaching the horizon
//! - **Annual**: yearly bookkeeping boundary
//! - **SmokingCessation**: a smoker quits
//! - **Exacerbation**: acute worsening (payload 1 = severe, 0 = moderate)
//! - **Admission** / **AdmissionBlocked** / **Discharge**: hospital bed use
//! - **Death**: payload 0 = background, 1 = exacerbation-related
//!
//! # Ordering
//!
//! The log is stable in recording order. Within an agent, recorded times
//! never decrease (enforced by [`EventLog::record`]). A global timeline
//! across agents is produced by [`EventLog::time_ordered`].
//!
//! # Example
//!
//! ```rust
//! use hemsim_core::models::event::{EventLog, EventType};
//!
//! let mut log = EventLog::new();
//! log.record(0, EventType::Start, 0.0, None).unwrap();
//! log.record(0, EventType::Exacerbation, 1.5, Some(1.0)).unwrap();
//!
//! assert_eq!(log.len(), 2);
//! assert_eq!(log.agent_events(0).len(), 2);
//! assert!(log.record(0, EventType::Annual, 1.0, None).is_err());
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised by the event log
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EventLogError {
    #[error("Event index {index} out of range (log has {len} events)")]
    NotFound { index: usize, len: usize },

    #[error("Event at {time} for agent {agent_id} precedes its last event at {last}")]
    NonMonotonic { agent_id: usize, time: f64, last: f64 },

    #[error("Event time {0} is not finite")]
    NonFiniteTime(f64),
}

/// Kind of a recorded event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventType {
    Start,
    Annual,
    SmokingCessation,
    Exacerbation,
    Admission,
    AdmissionBlocked,
    Discharge,
    Death,
    End,
}

impl EventType {
    /// All types in code order
    pub const ALL: [EventType; 9] = [
        EventType::Start,
        EventType::Annual,
        EventType::SmokingCessation,
        EventType::Exacerbation,
        EventType::Admission,
        EventType::AdmissionBlocked,
        EventType::Discharge,
        EventType::Death,
        EventType::End,
    ];

    /// Stable numeric code used in tabular export
    pub fn code(self) -> u8 {
        match self {
            EventType::Start => 0,
            EventType::Annual => 1,
            EventType::SmokingCessation => 2,
            EventType::Exacerbation => 3,
            EventType::Admission => 4,
            EventType::AdmissionBlocked => 5,
            EventType::Discharge => 6,
            EventType::Death => 7,
            EventType::End => 8,
        }
    }

    /// Inverse of [`EventType::code`]
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// Name of the event type
    pub fn name(self) -> &'static str {
        match self {
            EventType::Start => "Start",
            EventType::Annual => "Annual",
            EventType::SmokingCessation => "SmokingCessation",
            EventType::Exacerbation => "Exacerbation",
            EventType::Admission => "Admission",
            EventType::AdmissionBlocked => "AdmissionBlocked",
            EventType::Discharge => "Discharge",
            EventType::Death => "Death",
            EventType::End => "End",
        }
    }

    /// Kept when only milestones are recorded
    pub fn is_milestone(self) -> bool {
        matches!(self, EventType::Start | EventType::Death | EventType::End)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown event type '{}'", s))
    }
}

/// A recorded event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Agent the event belongs to (reference, not ownership)
    pub agent_id: usize,
    pub event_type: EventType,
    /// Years since session start
    pub time: f64,
    pub payload: Option<f64>,
}

/// Tabular projection of the log for bulk export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMatrix {
    pub columns: Vec<String>,
    /// One row per event: agent id, type code, time, payload (NaN if absent)
    pub rows: Vec<[f64; 4]>,
}

/// Append-only event log
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<Event>,

    /// Agent id → indices into `events`, in recording order
    by_agent: HashMap<usize, Vec<usize>>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event
    ///
    /// # Errors
    /// `NonFiniteTime` for NaN/infinite times; `NonMonotonic` if `time` is
    /// earlier than the agent's last recorded event.
    pub fn record(
        &mut self,
        agent_id: usize,
        event_type: EventType,
        time: f64,
        payload: Option<f64>,
    ) -> Result<usize, EventLogError> {
        if !time.is_finite() {
            return Err(EventLogError::NonFiniteTime(time));
        }

        let indices = self.by_agent.entry(agent_id).or_default();
        if let Some(&last_index) = indices.last() {
            let last = self.events[last_index].time;
            if time < last {
                return Err(EventLogError::NonMonotonic {
                    agent_id,
                    time,
                    last,
                });
            }
        }

        let index = self.events.len();
        indices.push(index);
        self.events.push(Event {
            agent_id,
            event_type,
            time,
            payload,
        });
        Ok(index)
    }

    /// Number of events logged
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if the log is empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// All events in recording order
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Event at a global index
    pub fn get(&self, index: usize) -> Result<&Event, EventLogError> {
        self.events.get(index).ok_or(EventLogError::NotFound {
            index,
            len: self.events.len(),
        })
    }

    /// Chronological timeline of one agent
    pub fn agent_events(&self, agent_id: usize) -> Vec<&Event> {
        self.by_agent
            .get(&agent_id)
            .map(|indices| indices.iter().map(|&i| &self.events[i]).collect())
            .unwrap_or_default()
    }

    /// Events of a specific type, in recording order
    pub fn events_of_type(&self, event_type: EventType) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    /// Count of events per type
    pub fn type_histogram(&self) -> HashMap<EventType, usize> {
        let mut histogram = HashMap::new();
        for event in &self.events {
            *histogram.entry(event.event_type).or_insert(0) += 1;
        }
        histogram
    }

    /// Tabular projection in recording order
    pub fn matrix(&self) -> EventMatrix {
        EventMatrix {
            columns: ["agent_id", "event_type", "time", "payload"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            rows: self
                .events
                .iter()
                .map(|e| {
                    [
                        e.agent_id as f64,
                        f64::from(e.event_type.code()),
                        e.time,
                        e.payload.unwrap_or(f64::NAN),
                    ]
                })
                .collect(),
        }
    }

    /// Global timeline by stable merge of the per-agent sequences
    ///
    /// Ties in time are broken by agent id, then by recording order.
    pub fn time_ordered(&self) -> Vec<&Event> {
        let mut agents: Vec<(&usize, &Vec<usize>)> = self.by_agent.iter().collect();
        agents.sort_by_key(|(id, _)| **id);

        // Heap entries: (time, agent id, position within that agent's sequence)
        let mut heap = BinaryHeap::new();
        for (slot, (_, indices)) in agents.iter().enumerate() {
            if let Some(&first) = indices.first() {
                heap.push(Reverse(MergeKey::new(self.events[first].time, slot, 0)));
            }
        }

        let mut merged = Vec::with_capacity(self.events.len());
        while let Some(Reverse(key)) = heap.pop() {
            let indices = agents[key.slot].1;
            merged.push(&self.events[indices[key.position]]);
            let next = key.position + 1;
            if let Some(&index) = indices.get(next) {
                heap.push(Reverse(MergeKey::new(self.events[index].time, key.slot, next)));
            }
        }
        merged
    }

    /// Clear all events
    pub fn clear(&mut self) {
        self.events.clear();
        self.by_agent.clear();
    }
}

/// Merge cursor ordered by (time, agent slot, position)
#[derive(Debug, Clone, Copy)]
struct MergeKey {
    time: f64,
    slot: usize,
    position: usize,
}

impl MergeKey {
    fn new(time: f64, slot: usize, position: usize) -> Self {
        Self {
            time,
            slot,
            position,
        }
    }
}

impl PartialEq for MergeKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for MergeKey {}

impl PartialOrd for MergeKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MergeKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.time
            .total_cmp(&other.time)
            .then(self.slot.cmp(&other.slot))
            .then(self.position.cmp(&other.position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_codes_round_trip() {
        for t in EventType::ALL {
            assert_eq!(EventType::from_code(t.code()), Some(t));
            assert_eq!(t.name().parse::<EventType>(), Ok(t));
        }
        assert_eq!(EventType::from_code(9), None);
        assert!("Arrival".parse::<EventType>().is_err());
    }

    #[test]
    fn test_event_log_basic() {
        let mut log = EventLog::new();

        assert_eq!(log.len(), 0);
        assert!(log.is_empty());

        log.record(1, EventType::Start, 0.0, None).unwrap();

        assert_eq!(log.len(), 1);
        assert!(!log.is_empty());
    }

    #[test]
    fn test_event_log_rejects_backwards_time() {
        let mut log = EventLog::new();
        log.record(4, EventType::Annual, 2.0, None).unwrap();

        let err = log.record(4, EventType::Annual, 1.0, None).unwrap_err();
        assert!(matches!(err, EventLogError::NonMonotonic { agent_id: 4, .. }));

        // Other agents are independent
        log.record(5, EventType::Start, 0.0, None).unwrap();
        // Equal times are fine
        log.record(4, EventType::Death, 2.0, Some(0.0)).unwrap();
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_event_log_rejects_nan() {
        let mut log = EventLog::new();
        assert!(matches!(
            log.record(0, EventType::Start, f64::NAN, None),
            Err(EventLogError::NonFiniteTime(_))
        ));
        assert!(log.is_empty());
    }

    #[test]
    fn test_event_log_query_by_type() {
        let mut log = EventLog::new();
        log.record(0, EventType::Start, 0.0, None).unwrap();
        log.record(0, EventType::Exacerbation, 0.5, Some(1.0)).unwrap();
        log.record(1, EventType::Start, 0.0, None).unwrap();

        assert_eq!(log.events_of_type(EventType::Start).len(), 2);
        assert_eq!(log.events_of_type(EventType::Exacerbation).len(), 1);
        assert_eq!(log.type_histogram()[&EventType::Start], 2);
    }

    #[test]
    fn test_matrix_uses_nan_for_missing_payload() {
        let mut log = EventLog::new();
        log.record(2, EventType::Exacerbation, 1.0, Some(2.0)).unwrap();
        log.record(2, EventType::End, 3.0, None).unwrap();

        let matrix = log.matrix();
        assert_eq!(matrix.columns, vec!["agent_id", "event_type", "time", "payload"]);
        assert_eq!(matrix.rows[0], [2.0, 3.0, 1.0, 2.0]);
        assert!(matrix.rows[1][3].is_nan());
    }

    #[test]
    fn test_time_ordered_merges_agents_stably() {
        let mut log = EventLog::new();
        // Agent 1 recorded fully before agent 0
        log.record(1, EventType::Start, 0.0, None).unwrap();
        log.record(1, EventType::Annual, 1.0, None).unwrap();
        log.record(1, EventType::End, 2.0, None).unwrap();
        log.record(0, EventType::Start, 0.0, None).unwrap();
        log.record(0, EventType::Exacerbation, 1.0, Some(1.0)).unwrap();
        log.record(0, EventType::Exacerbation, 1.0, Some(2.0)).unwrap();

        let merged: Vec<(usize, f64, EventType)> = log
            .time_ordered()
            .iter()
            .map(|e| (e.agent_id, e.time, e.event_type))
            .collect();

        assert_eq!(
            merged,
            vec![
                (0, 0.0, EventType::Start),
                (1, 0.0, EventType::Start),
                (0, 1.0, EventType::Exacerbation),
                (0, 1.0, EventType::Exacerbation),
                (1, 1.0, EventType::Annual),
                (1, 2.0, EventType::End),
            ]
        );
    }

    #[test]
    fn test_event_log_clear() {
        let mut log = EventLog::new();
        log.record(0, EventType::Start, 0.0, None).unwrap();
        log.clear();
        assert!(log.is_empty());
        assert!(log.agent_events(0).is_empty());
    }
}
