//! Run outputs and diagnostics
//!
//! Everything here is a plain serializable value computed from the
//! session's stores after a run. Reductions never mutate the stores.

use crate::core::time::SimClock;
use crate::models::{Agent, AgentStore, AgentTally, EventLog, EventType};
use crate::orchestrator::session::{SessionError, SessionState};
use crate::resources::PoolSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Aggregate summary of a completed run
///
/// Counts and totals cover simulated agents that did not fail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    pub n_agents: usize,
    pub n_failed: usize,
    pub n_deaths: u64,
    pub n_exacerbations: u64,
    pub n_severe_exacerbations: u64,
    pub n_admissions: u64,
    pub n_blocked_admissions: u64,
    pub n_smoking_cessations: u64,
    pub person_years: f64,

    /// Discounted
    pub total_cost: f64,
    pub mean_cost: f64,
    pub total_qaly: f64,
    pub mean_qaly: f64,

    /// Per person-year
    pub exacerbation_rate: f64,
    pub mortality_rate: f64,

    pub bed_capacity: usize,
    pub peak_bed_occupancy: usize,
    pub bed_years: f64,
    /// `bed_years / (bed_capacity * horizon)`, zero without beds
    pub bed_utilization: f64,

    pub horizon_years: f64,
    pub seed: u64,
    pub config_fingerprint: String,
}

fn per(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

impl Output {
    /// Reduce agent tallies and bed usage into a summary
    pub(crate) fn reduce(
        agents: &AgentStore,
        beds: Option<&PoolSnapshot>,
        horizon_years: f64,
        seed: u64,
        config_fingerprint: String,
    ) -> Self {
        let mut total = AgentTally::default();
        let mut n_agents = 0;
        let mut n_deaths = 0u64;

        for agent in agents.reportable() {
            let t = agent.tally();
            n_agents += 1;
            if !agent.is_alive() {
                n_deaths += 1;
            }
            total.n_exacerbations += t.n_exacerbations;
            total.n_severe_exacerbations += t.n_severe_exacerbations;
            total.n_admissions += t.n_admissions;
            total.n_blocked_admissions += t.n_blocked_admissions;
            total.n_smoking_cessations += t.n_smoking_cessations;
            total.person_years += t.person_years;
            total.cost += t.cost;
            total.qaly += t.qaly;
        }

        let n_failed = agents
            .iter()
            .filter(|a| a.was_simulated() && a.is_failed())
            .count();

        let (bed_capacity, peak_bed_occupancy, bed_years) = beds
            .map(|b| (b.capacity, b.peak_allocated, b.unit_time))
            .unwrap_or((0, 0, 0.0));

        Output {
            n_agents,
            n_failed,
            n_deaths,
            n_exacerbations: u64::from(total.n_exacerbations),
            n_severe_exacerbations: u64::from(total.n_severe_exacerbations),
            n_admissions: u64::from(total.n_admissions),
            n_blocked_admissions: u64::from(total.n_blocked_admissions),
            n_smoking_cessations: u64::from(total.n_smoking_cessations),
            person_years: total.person_years,
            total_cost: total.cost,
            mean_cost: per(total.cost, n_agents as f64),
            total_qaly: total.qaly,
            mean_qaly: per(total.qaly, n_agents as f64),
            exacerbation_rate: per(f64::from(total.n_exacerbations), total.person_years),
            mortality_rate: per(n_deaths as f64, total.person_years),
            bed_capacity,
            peak_bed_occupancy,
            bed_years,
            bed_utilization: per(bed_years, bed_capacity as f64 * horizon_years),
            horizon_years,
            seed,
            config_fingerprint,
        }
    }
}

/// One row of per-agent outcomes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutcome {
    pub id: usize,
    pub age_at_entry: f64,
    pub male: bool,
    pub smoker_at_entry: bool,
    pub alive: bool,
    pub death_time: Option<f64>,
    pub failed: bool,
    pub tally: AgentTally,
}

impl From<&Agent> for AgentOutcome {
    fn from(agent: &Agent) -> Self {
        AgentOutcome {
            id: agent.id(),
            age_at_entry: agent.baseline().age,
            male: agent.baseline().male,
            smoker_at_entry: agent.baseline().smoker,
            alive: agent.is_alive(),
            death_time: agent.death_time(),
            failed: agent.is_failed(),
            tally: agent.tally().clone(),
        }
    }
}

/// Event counts within one simulated year
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct YearRow {
    pub year: usize,
    pub deaths: usize,
    pub exacerbations: usize,
    pub admissions: usize,
    pub blocked_admissions: usize,
}

/// Summary plus per-agent rows and event-log reductions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputEx {
    pub summary: Output,
    pub agents: Vec<AgentOutcome>,
    /// Event type name → count (empty when events were not recorded)
    pub event_histogram: BTreeMap<String, usize>,
    pub per_year: Vec<YearRow>,
}

impl OutputEx {
    pub(crate) fn reduce(
        summary: Output,
        agents: &AgentStore,
        events: &EventLog,
        clock: &SimClock,
    ) -> Self {
        let event_histogram = events
            .type_histogram()
            .into_iter()
            .map(|(event_type, n)| (event_type.name().to_string(), n))
            .collect();

        let mut per_year: Vec<YearRow> = (0..clock.num_years())
            .map(|year| YearRow {
                year,
                ..YearRow::default()
            })
            .collect();

        for event in events.events() {
            let Some(row) = per_year.get_mut(clock.year_index(event.time)) else {
                continue;
            };
            match event.event_type {
                EventType::Death => row.deaths += 1,
                EventType::Exacerbation => row.exacerbations += 1,
                EventType::Admission => row.admissions += 1,
                EventType::AdmissionBlocked => row.blocked_admissions += 1,
                _ => {}
            }
        }

        OutputEx {
            summary,
            agents: agents
                .iter()
                .filter(|a| a.was_simulated())
                .map(AgentOutcome::from)
                .collect(),
            event_histogram,
            per_year,
        }
    }
}

/// Why an agent was dropped from aggregate output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDiagnostic {
    pub agent_id: usize,
    /// Simulated time at which the failure was detected
    pub time: f64,
    pub events_processed: u32,
    pub reason: String,
}

impl AgentDiagnostic {
    /// The failure as an API error value
    pub fn error(&self) -> SessionError {
        SessionError::SimulationDiverged {
            agent_id: self.agent_id,
            reason: self.reason.clone(),
        }
    }
}

/// Wall-clock and calendar statistics of the last operations
///
/// Timings are informational only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeStats {
    pub create_agents_ms: f64,
    pub model_ms: f64,
    pub calendar_pops: u64,
    pub peak_calendar_len: usize,
    pub events_recorded: usize,
    pub events_dropped: usize,
    pub diagnostics: Vec<AgentDiagnostic>,
}

/// Storage view returned in place of raw store handles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageDiagnostics {
    pub session_id: Option<Uuid>,
    pub state: SessionState,
    pub n_agents: usize,
    pub agent_capacity: usize,
    pub n_events: usize,
    pub event_capacity: usize,
    pub pools: Vec<PoolSnapshot>,
}

/// Random stream view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomStreamDiagnostics {
    pub seed: u64,
    pub state: u64,
    pub draws: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Baseline;

    fn store_with(n: usize) -> AgentStore {
        let inputs = crate::config::ConfigStore::default().model_inputs();
        let mut rng = crate::rng::RngManager::new(3);
        let mut store = AgentStore::new();
        store.populate(n, &inputs, &mut rng).unwrap();
        store
    }

    #[test]
    fn test_reduce_skips_unsimulated_agents() {
        let store = store_with(4);
        let output = Output::reduce(&store, None, 10.0, 1, String::new());
        assert_eq!(output.n_agents, 0);
        assert_eq!(output.mean_cost, 0.0);
        assert_eq!(output.bed_utilization, 0.0);
    }

    #[test]
    fn test_reduce_excludes_failed_agents() {
        let mut store = store_with(3);
        for id in 0..3 {
            let agent = store.get_mut(id).unwrap();
            agent.mark_simulated();
            agent.advance_to(2.0, 0.0);
            agent.tally_mut().cost = 100.0;
        }
        store.get_mut(1).unwrap().mark_failed();

        let output = Output::reduce(&store, None, 10.0, 1, String::new());
        assert_eq!(output.n_agents, 2);
        assert_eq!(output.n_failed, 1);
        assert_eq!(output.total_cost, 200.0);
        assert_eq!(output.mean_cost, 100.0);
        assert_eq!(output.person_years, 4.0);
    }

    #[test]
    fn test_per_year_rows() {
        let store = AgentStore::new();
        let mut events = EventLog::new();
        events.record(0, EventType::Exacerbation, 0.5, Some(0.0)).unwrap();
        events.record(0, EventType::Exacerbation, 1.5, Some(1.0)).unwrap();
        events.record(0, EventType::Death, 1.5, Some(1.0)).unwrap();

        let clock = SimClock::new(3.0, 0.0);
        let summary = Output::reduce(&store, None, 3.0, 1, String::new());
        let ex = OutputEx::reduce(summary, &store, &events, &clock);

        assert_eq!(ex.per_year.len(), 3);
        assert_eq!(ex.per_year[0].exacerbations, 1);
        assert_eq!(ex.per_year[1].exacerbations, 1);
        assert_eq!(ex.per_year[1].deaths, 1);
        assert_eq!(ex.event_histogram["Exacerbation"], 2);
    }

    #[test]
    fn test_agent_outcome_row() {
        let agent = Agent::new(
            9,
            Baseline {
                age: 50.0,
                male: true,
                smoker: false,
                severity: 0.5,
                bmi: 30.0,
            },
        );
        let row = AgentOutcome::from(&agent);
        assert_eq!(row.id, 9);
        assert!(row.alive);
        assert_eq!(row.death_time, None);
    }
}
