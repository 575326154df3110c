//! Tests for the append-only event log

use hemsim_core::models::event::{EventLog, EventLogError, EventType};
use proptest::prelude::*;

#[test]
fn test_record_returns_global_index() {
    let mut log = EventLog::new();
    assert_eq!(log.record(0, EventType::Start, 0.0, None).unwrap(), 0);
    assert_eq!(log.record(1, EventType::Start, 0.0, None).unwrap(), 1);
    assert_eq!(log.record(0, EventType::Annual, 1.0, Some(1.0)).unwrap(), 2);
    assert_eq!(log.len(), 3);
    assert_eq!(log.get(2).unwrap().payload, Some(1.0));
}

#[test]
fn test_agent_timeline_in_order() {
    let mut log = EventLog::new();
    log.record(3, EventType::Start, 0.0, None).unwrap();
    log.record(1, EventType::Start, 0.0, None).unwrap();
    log.record(3, EventType::Exacerbation, 0.4, Some(0.0)).unwrap();
    log.record(3, EventType::Exacerbation, 0.4, Some(1.0)).unwrap();
    log.record(3, EventType::End, 2.0, None).unwrap();

    let timeline: Vec<EventType> = log.agent_events(3).iter().map(|e| e.event_type).collect();
    assert_eq!(
        timeline,
        vec![
            EventType::Start,
            EventType::Exacerbation,
            EventType::Exacerbation,
            EventType::End
        ]
    );
    assert_eq!(log.agent_events(1).len(), 1);
    assert!(log.agent_events(99).is_empty());
}

#[test]
fn test_non_monotonic_rejected() {
    let mut log = EventLog::new();
    log.record(0, EventType::Start, 0.0, None).unwrap();
    log.record(0, EventType::Exacerbation, 2.0, Some(0.0)).unwrap();

    assert_eq!(
        log.record(0, EventType::Annual, 1.0, Some(1.0)),
        Err(EventLogError::NonMonotonic {
            agent_id: 0,
            time: 1.0,
            last: 2.0
        })
    );
    // Other agents are unaffected
    log.record(1, EventType::Start, 0.0, None).unwrap();
    assert_eq!(log.len(), 3);
}

#[test]
fn test_non_finite_time_rejected() {
    let mut log = EventLog::new();
    assert!(matches!(
        log.record(0, EventType::Start, f64::NAN, None),
        Err(EventLogError::NonFiniteTime(_))
    ));
    assert!(log.is_empty());
}

#[test]
fn test_get_out_of_range() {
    let log = EventLog::new();
    assert_eq!(log.get(0), Err(EventLogError::NotFound { index: 0, len: 0 }));
}

#[test]
fn test_events_of_type_and_histogram() {
    let mut log = EventLog::new();
    log.record(0, EventType::Start, 0.0, None).unwrap();
    log.record(0, EventType::Exacerbation, 0.5, Some(1.0)).unwrap();
    log.record(0, EventType::AdmissionBlocked, 0.5, None).unwrap();
    log.record(0, EventType::Death, 0.5, Some(1.0)).unwrap();

    assert_eq!(log.events_of_type(EventType::Death).len(), 1);
    assert!(log.events_of_type(EventType::Admission).is_empty());

    let histogram = log.type_histogram();
    assert_eq!(histogram[&EventType::AdmissionBlocked], 1);
    assert_eq!(histogram.values().sum::<usize>(), 4);
}

#[test]
fn test_matrix_projection() {
    let mut log = EventLog::new();
    log.record(7, EventType::Start, 0.0, None).unwrap();
    log.record(7, EventType::Admission, 1.25, Some(1.3)).unwrap();

    let matrix = log.matrix();
    assert_eq!(matrix.columns, vec!["agent_id", "event_type", "time", "payload"]);
    assert_eq!(matrix.rows.len(), 2);

    let start = matrix.rows[0];
    assert_eq!(start[0], 7.0);
    assert_eq!(start[1], f64::from(EventType::Start.code()));
    assert!(start[3].is_nan());

    assert_eq!(matrix.rows[1], [7.0, f64::from(EventType::Admission.code()), 1.25, 1.3]);
}

#[test]
fn test_time_ordered_breaks_ties_by_agent() {
    let mut log = EventLog::new();
    log.record(2, EventType::Start, 0.0, None).unwrap();
    log.record(0, EventType::Start, 0.0, None).unwrap();
    log.record(2, EventType::Annual, 1.0, Some(1.0)).unwrap();
    log.record(0, EventType::Exacerbation, 0.3, Some(0.0)).unwrap();
    log.record(0, EventType::Annual, 1.0, Some(1.0)).unwrap();

    let ordered: Vec<(usize, f64)> = log
        .time_ordered()
        .iter()
        .map(|e| (e.agent_id, e.time))
        .collect();
    assert_eq!(
        ordered,
        vec![(0, 0.0), (2, 0.0), (0, 0.3), (0, 1.0), (2, 1.0)]
    );
}

#[test]
fn test_clear() {
    let mut log = EventLog::new();
    log.record(0, EventType::Start, 0.0, None).unwrap();
    log.clear();
    assert!(log.is_empty());
    assert!(log.agent_events(0).is_empty());
    // A cleared log accepts earlier times again
    log.record(0, EventType::Start, 0.0, None).unwrap();
}

#[test]
fn test_event_type_names_and_codes() {
    for event_type in EventType::ALL {
        assert_eq!(EventType::from_code(event_type.code()), Some(event_type));
        assert_eq!(event_type.name().parse::<EventType>().unwrap(), event_type);
        assert_eq!(
            event_type.name().to_uppercase().parse::<EventType>().unwrap(),
            event_type
        );
    }
    assert!("Hospitalisation".parse::<EventType>().is_err());
}

proptest! {
    #[test]
    fn prop_timelines_sorted(
        steps in prop::collection::vec((0usize..6, 0.0f64..2.0), 1..200)
    ) {
        let mut log = EventLog::new();
        let mut clocks = [0.0f64; 6];
        for (agent, dt) in steps {
            clocks[agent] += dt;
            log.record(agent, EventType::Annual, clocks[agent], None).unwrap();
        }

        for agent in 0..6 {
            let times: Vec<f64> = log.agent_events(agent).iter().map(|e| e.time).collect();
            prop_assert!(times.windows(2).all(|w| w[0] <= w[1]));
        }

        let merged = log.time_ordered();
        prop_assert_eq!(merged.len(), log.len());
        for pair in merged.windows(2) {
            let ordered = pair[0].time < pair[1].time
                || (pair[0].time == pair[1].time && pair[0].agent_id <= pair[1].agent_id);
            prop_assert!(ordered);
        }
    }
}
