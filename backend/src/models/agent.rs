//! Agent (simulated individual) model
//!
//! Each agent carries:
//! - Baseline attributes drawn once at creation (age, sex, smoking, severity, BMI)
//! - Mutable simulation state advanced only by the engine (time cursor,
//!   current age and severity, smoking, hospitalisation, vital status)
//! - Outcome tallies reduced into aggregate output after a run
//!
//! Identity and baseline attributes never change after creation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Baseline attributes drawn at creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    /// Age at entry (years)
    pub age: f64,

    /// Sex (true = male)
    pub male: bool,

    /// Smoking at entry
    pub smoker: bool,

    /// Disease severity at entry (0 = none)
    pub severity: f64,

    /// Body-mass index at entry
    pub bmi: f64,
}

/// Per-agent outcome tallies
///
/// Costs and QALYs are discounted to the session start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentTally {
    pub n_exacerbations: u32,
    pub n_severe_exacerbations: u32,
    pub n_admissions: u32,
    pub n_blocked_admissions: u32,
    pub n_smoking_cessations: u32,
    pub n_events: u32,
    pub person_years: f64,
    pub cost: f64,
    pub qaly: f64,
}

/// A simulated individual
///
/// # Example
/// ```
/// use hemsim_core::models::agent::{Agent, Baseline};
///
/// let agent = Agent::new(
///     7,
///     Baseline { age: 62.0, male: true, smoker: false, severity: 1.2, bmi: 26.0 },
/// );
/// assert_eq!(agent.id(), 7);
/// assert_eq!(agent.age(), 62.0);
/// assert!(agent.is_alive());
/// assert_eq!(agent.local_time(), 0.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    /// Stable identity (index in the agent store)
    id: usize,

    baseline: Baseline,

    /// Simulation-time cursor (years since session start)
    local_time: f64,

    /// Current age
    age: f64,

    /// Current severity
    severity: f64,

    /// Currently smoking
    smoker: bool,

    alive: bool,

    /// Holding a hospital bed
    hospitalised: bool,

    /// Scheduled discharge time while hospitalised
    discharge_at: Option<f64>,

    /// Time of death, if it happened within the horizon
    death_time: Option<f64>,

    /// Excluded from aggregate output after a numeric failure
    failed: bool,

    /// Included in the last run (`max_agents` may cut the population)
    simulated: bool,

    tally: AgentTally,
}

impl Agent {
    /// Create a new agent at time zero
    pub fn new(id: usize, baseline: Baseline) -> Self {
        Self {
            id,
            local_time: 0.0,
            age: baseline.age,
            severity: baseline.severity,
            smoker: baseline.smoker,
            alive: true,
            hospitalised: false,
            discharge_at: None,
            death_time: None,
            failed: false,
            simulated: false,
            tally: AgentTally::default(),
            baseline,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn baseline(&self) -> &Baseline {
        &self.baseline
    }

    pub fn local_time(&self) -> f64 {
        self.local_time
    }

    pub fn age(&self) -> f64 {
        self.age
    }

    pub fn severity(&self) -> f64 {
        self.severity
    }

    pub fn is_smoker(&self) -> bool {
        self.smoker
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn is_hospitalised(&self) -> bool {
        self.hospitalised
    }

    pub fn discharge_at(&self) -> Option<f64> {
        self.discharge_at
    }

    pub fn death_time(&self) -> Option<f64> {
        self.death_time
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn was_simulated(&self) -> bool {
        self.simulated
    }

    /// Counted in aggregate output: simulated and not failed
    pub fn is_reportable(&self) -> bool {
        self.simulated && !self.failed
    }

    pub fn tally(&self) -> &AgentTally {
        &self.tally
    }

    // ========================================================================
    // Engine-driven mutation
    // ========================================================================

    pub(crate) fn tally_mut(&mut self) -> &mut AgentTally {
        &mut self.tally
    }

    pub(crate) fn mark_simulated(&mut self) {
        self.simulated = true;
    }

    /// Move the cursor to `t`, ageing and progressing severity
    ///
    /// Returns the elapsed time. The cursor never moves backwards.
    pub(crate) fn advance_to(&mut self, t: f64, severity_progression_rate: f64) -> f64 {
        let dt = (t - self.local_time).max(0.0);
        self.age += dt;
        self.severity = (self.severity + severity_progression_rate * dt).max(0.0);
        self.tally.person_years += dt;
        self.local_time = self.local_time.max(t);
        dt
    }

    pub(crate) fn quit_smoking(&mut self) {
        self.smoker = false;
    }

    pub(crate) fn admit(&mut self, discharge_at: f64) {
        self.hospitalised = true;
        self.discharge_at = Some(discharge_at);
    }

    pub(crate) fn discharge(&mut self) {
        self.hospitalised = false;
        self.discharge_at = None;
    }

    pub(crate) fn die(&mut self, t: f64) {
        self.alive = false;
        self.death_time = Some(t);
    }

    pub(crate) fn mark_failed(&mut self) {
        self.failed = true;
    }

    /// Attribute-name → numeric value view (booleans as 0/1)
    pub fn attributes(&self) -> BTreeMap<String, f64> {
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        let mut map = BTreeMap::new();
        map.insert("age_at_entry".to_string(), self.baseline.age);
        map.insert("male".to_string(), flag(self.baseline.male));
        map.insert("smoker_at_entry".to_string(), flag(self.baseline.smoker));
        map.insert("severity_at_entry".to_string(), self.baseline.severity);
        map.insert("bmi".to_string(), self.baseline.bmi);
        map.insert("age".to_string(), self.age);
        map.insert("severity".to_string(), self.severity);
        map.insert("smoker".to_string(), flag(self.smoker));
        map.insert("alive".to_string(), flag(self.alive));
        map.insert("hospitalised".to_string(), flag(self.hospitalised));
        map.insert("local_time".to_string(), self.local_time);
        map.insert(
            "death_time".to_string(),
            self.death_time.unwrap_or(f64::NAN),
        );
        map
    }
}

/// Caller-facing copy of an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: usize,
    pub attributes: BTreeMap<String, f64>,
    pub failed: bool,
    pub simulated: bool,
    pub tally: AgentTally,
}

impl From<&Agent> for AgentRecord {
    fn from(agent: &Agent) -> Self {
        AgentRecord {
            id: agent.id(),
            attributes: agent.attributes(),
            failed: agent.is_failed(),
            simulated: agent.was_simulated(),
            tally: agent.tally().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline() -> Baseline {
        Baseline {
            age: 60.0,
            male: false,
            smoker: true,
            severity: 1.0,
            bmi: 25.0,
        }
    }

    #[test]
    fn test_advance_ages_and_progresses() {
        let mut agent = Agent::new(0, baseline());
        let dt = agent.advance_to(2.5, 0.1);
        assert_eq!(dt, 2.5);
        assert_eq!(agent.age(), 62.5);
        assert!((agent.severity() - 1.25).abs() < 1e-12);
        assert_eq!(agent.tally().person_years, 2.5);
        assert_eq!(agent.baseline().age, 60.0);
    }

    #[test]
    fn test_advance_never_moves_backwards() {
        let mut agent = Agent::new(0, baseline());
        agent.advance_to(3.0, 0.0);
        assert_eq!(agent.advance_to(1.0, 0.0), 0.0);
        assert_eq!(agent.local_time(), 3.0);
    }

    #[test]
    fn test_severity_floored_at_zero() {
        let mut agent = Agent::new(0, baseline());
        agent.advance_to(5.0, -1.0);
        assert_eq!(agent.severity(), 0.0);
    }

    #[test]
    fn test_reportable_requires_simulated_and_not_failed() {
        let mut agent = Agent::new(0, baseline());
        assert!(!agent.is_reportable());
        agent.mark_simulated();
        assert!(agent.is_reportable());
        agent.mark_failed();
        assert!(!agent.is_reportable());
    }

    #[test]
    fn test_attribute_view() {
        let mut agent = Agent::new(3, baseline());
        agent.die(4.0);
        let attrs = agent.attributes();
        assert_eq!(attrs["smoker_at_entry"], 1.0);
        assert_eq!(attrs["alive"], 0.0);
        assert_eq!(attrs["death_time"], 4.0);
    }
}
