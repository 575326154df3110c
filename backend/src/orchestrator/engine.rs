//! Simulation engine
//!
//! Advances every simulated agent through continuous time using a single
//! global event calendar. The calendar holds exactly one pending event per
//! live agent, so events across the population are processed in global time
//! order and agents compete for hospital beds as they would in reality.
//!
//! # Event step
//!
//! ```text
//! pop (time, agent, seq)
//! 1. Divergence guard (events per agent)
//! 2. Accrue discounted background cost and QALYs over [cursor, time]
//! 3. Advance the agent (age, severity progression)
//! 4. Handle the event (admission, blocked policy, death, discharge, ...)
//! 5. Schedule the agent's next event: minimum over competing candidates
//!    exacerbation | smoking cessation | death | annual | discharge | end
//! ```
//!
//! Competing risks are resampled after every event; exponential waiting
//! times make this equivalent to keeping the earlier draws.
//!
//! # Determinism
//!
//! All randomness comes from the session's [`RngManager`]. Draw order is
//! fixed per event type, and calendar ties are broken by agent id, then by
//! scheduling sequence, so a given seed always yields the same run.

use crate::config::{ModelInputs, RecordMode, RunSettings};
use crate::core::time::SimClock;
use crate::models::{AgentStore, EventLog, EventType};
use crate::orchestrator::output::AgentDiagnostic;
use crate::resources::{ResourceManager, EVENT_SLOTS, HOSPITAL_BEDS};
use crate::rng::RngManager;
use crate::sampling;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use tracing::{debug, warn};

/// Age at which `mortality_base_rate` applies
const REFERENCE_AGE: f64 = 60.0;

/// Death payload: background mortality
const DEATH_BACKGROUND: f64 = 0.0;
/// Death payload: severe exacerbation
const DEATH_EXACERBATION: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Start,
    Annual,
    SmokingCessation,
    Exacerbation,
    Discharge,
    Death,
    End,
}

/// Calendar entry, ordered by (time, agent id, sequence)
#[derive(Debug, Clone, Copy)]
struct Scheduled {
    time: f64,
    agent_id: usize,
    seq: u64,
    kind: Pending,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .total_cmp(&other.time)
            .then(self.agent_id.cmp(&other.agent_id))
            .then(self.seq.cmp(&other.seq))
    }
}

/// Counters produced by one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub agents_simulated: usize,
    pub agents_failed: usize,
    pub events_recorded: usize,
    pub events_dropped: usize,
    pub calendar_pops: u64,
    pub peak_calendar_len: usize,
    pub diagnostics: Vec<AgentDiagnostic>,
}

/// Borrowed view of the session stores for the duration of one run
pub struct Engine<'a> {
    inputs: &'a ModelInputs,
    settings: &'a RunSettings,
    clock: SimClock,
    agents: &'a mut AgentStore,
    events: &'a mut EventLog,
    resources: &'a mut ResourceManager,
    rng: &'a mut RngManager,

    calendar: BinaryHeap<Reverse<Scheduled>>,
    next_seq: u64,

    /// Cleared once the event_slots pool is exhausted
    recording: bool,
    report: RunReport,
}

impl<'a> Engine<'a> {
    pub fn new(
        inputs: &'a ModelInputs,
        settings: &'a RunSettings,
        agents: &'a mut AgentStore,
        events: &'a mut EventLog,
        resources: &'a mut ResourceManager,
        rng: &'a mut RngManager,
    ) -> Self {
        Self {
            clock: SimClock::new(settings.horizon_years, inputs.discount_rate),
            inputs,
            settings,
            agents,
            events,
            resources,
            rng,
            calendar: BinaryHeap::new(),
            next_seq: 0,
            recording: settings.record_mode != RecordMode::None,
            report: RunReport::default(),
        }
    }

    /// Simulate the first `limit` agents to the horizon
    pub fn run(mut self, limit: usize) -> RunReport {
        let limit = limit.min(self.agents.len());
        for id in 0..limit {
            if let Some(agent) = self.agents.get_mut(id) {
                agent.mark_simulated();
            }
            self.schedule(id, 0.0, Pending::Start);
        }
        self.report.agents_simulated = limit;

        while let Some(Reverse(next)) = self.calendar.pop() {
            self.report.calendar_pops += 1;
            self.step(next);
        }

        self.resources.settle(self.clock.horizon());

        if self.report.events_dropped > 0 {
            warn!(
                dropped = self.report.events_dropped,
                recorded = self.report.events_recorded,
                "event storage exhausted; later events were not recorded"
            );
        }
        self.report
    }

    fn schedule(&mut self, agent_id: usize, time: f64, kind: Pending) {
        self.calendar.push(Reverse(Scheduled {
            time,
            agent_id,
            seq: self.next_seq,
            kind,
        }));
        self.next_seq += 1;
        self.report.peak_calendar_len = self.report.peak_calendar_len.max(self.calendar.len());
    }

    fn step(&mut self, event: Scheduled) {
        let id = event.agent_id;
        let t = event.time;
        let inputs = self.inputs;

        let events_processed = {
            let Some(agent) = self.agents.get_mut(id) else {
                return;
            };
            if !agent.is_alive() || agent.is_failed() {
                return;
            }

            let span = self.clock.discounted_duration(agent.local_time(), t);
            let utility =
                inputs.utility_background - inputs.utility_severity_decrement * agent.severity();
            let tally = agent.tally_mut();
            tally.n_events += 1;
            tally.cost += inputs.cost_background * span;
            tally.qaly += utility * span;
            let processed = tally.n_events;

            agent.advance_to(t, inputs.severity_progression_rate);
            processed
        };

        if events_processed as usize > self.settings.max_events_per_agent {
            self.fail(
                id,
                t,
                format!(
                    "exceeded {} events per agent",
                    self.settings.max_events_per_agent
                ),
            );
            return;
        }

        match event.kind {
            Pending::Start => self.record(id, EventType::Start, t, None),
            Pending::Annual => {
                let year = self.clock.year_index(t) as f64;
                self.record(id, EventType::Annual, t, Some(year));
            }
            Pending::SmokingCessation => {
                if let Some(agent) = self.agents.get_mut(id) {
                    agent.quit_smoking();
                    agent.tally_mut().n_smoking_cessations += 1;
                }
                self.record(id, EventType::SmokingCessation, t, None);
            }
            Pending::Exacerbation => self.exacerbation(id, t),
            Pending::Discharge => {
                self.release_bed(id, t);
                self.record(id, EventType::Discharge, t, None);
            }
            Pending::Death => self.die(id, t, DEATH_BACKGROUND),
            Pending::End => {
                self.release_bed(id, t);
                self.record(id, EventType::End, t, None);
                debug!(agent_id = id, "agent reached horizon");
                return;
            }
        }

        let active = self
            .agents
            .get(id)
            .map_or(false, |a| a.is_alive() && !a.is_failed());
        if active {
            self.schedule_next(id, t);
        }
    }

    fn exacerbation(&mut self, id: usize, t: f64) {
        let inputs = self.inputs;
        let discount = self.clock.discount_factor(t);
        let severe = sampling::sample_bernoulli(self.rng, inputs.p_severe_exacerbation);

        let already_admitted = {
            let Some(agent) = self.agents.get_mut(id) else {
                return;
            };
            let tally = agent.tally_mut();
            tally.n_exacerbations += 1;
            tally.cost += inputs.cost_exacerbation * discount;
            if severe {
                tally.n_severe_exacerbations += 1;
            }
            agent.is_hospitalised()
        };
        self.record(
            id,
            EventType::Exacerbation,
            t,
            Some(if severe { 1.0 } else { 0.0 }),
        );
        if !severe {
            return;
        }

        let mut p_death = inputs.p_death_severe_exacerbation;
        if !already_admitted {
            let admitted = match self.resources.try_acquire(HOSPITAL_BEDS, t) {
                Ok(admitted) => admitted,
                Err(err) => {
                    warn!(agent_id = id, error = %err, "bed pool unavailable");
                    false
                }
            };

            if admitted {
                let discharge_at = t + inputs.hospital_stay_years;
                if let Some(agent) = self.agents.get_mut(id) {
                    agent.admit(discharge_at);
                    let tally = agent.tally_mut();
                    tally.n_admissions += 1;
                    tally.cost += inputs.cost_admission * discount;
                }
                self.record(id, EventType::Admission, t, Some(discharge_at));
            } else {
                // Blocked policy: no bed held, raised death risk
                if let Some(agent) = self.agents.get_mut(id) {
                    agent.tally_mut().n_blocked_admissions += 1;
                }
                self.record(id, EventType::AdmissionBlocked, t, None);
                p_death = (p_death * inputs.blocked_mortality_multiplier).min(1.0);
            }
        }

        if sampling::sample_bernoulli(self.rng, p_death) {
            self.die(id, t, DEATH_EXACERBATION);
        }
    }

    fn die(&mut self, id: usize, t: f64, cause: f64) {
        if let Some(agent) = self.agents.get_mut(id) {
            agent.die(t);
        }
        self.release_bed(id, t);
        self.record(id, EventType::Death, t, Some(cause));
    }

    fn release_bed(&mut self, id: usize, t: f64) {
        let Some(agent) = self.agents.get_mut(id) else {
            return;
        };
        if !agent.is_hospitalised() {
            return;
        }
        agent.discharge();
        if let Err(err) = self.resources.release(HOSPITAL_BEDS, t) {
            warn!(agent_id = id, error = %err, "failed to release bed");
        }
    }

    /// Draw the competing candidates and schedule the earliest
    fn schedule_next(&mut self, id: usize, t: f64) {
        let inputs = self.inputs;
        let Some(agent) = self.agents.get(id) else {
            return;
        };
        let severity = agent.severity();
        let smoker = agent.is_smoker();
        let age = agent.age();
        let discharge_at = agent.discharge_at();

        let smoker_term = if smoker {
            inputs.exacerbation_smoker_coeff
        } else {
            0.0
        };
        let exacerbation_hazard = inputs.exacerbation_rate
            * (inputs.exacerbation_severity_coeff * severity + smoker_term).exp();
        let death_hazard = inputs.mortality_base_rate
            * (inputs.mortality_age_coeff * (age - REFERENCE_AGE)
                + inputs.mortality_severity_coeff * severity)
                .exp();
        let cessation_hazard = if smoker {
            inputs.smoking_cessation_rate
        } else {
            0.0
        };

        for (name, hazard) in [
            ("exacerbation", exacerbation_hazard),
            ("smoking cessation", cessation_hazard),
            ("death", death_hazard),
        ] {
            if !hazard.is_finite() {
                self.fail(id, t, format!("{} hazard is not finite ({})", name, hazard));
                return;
            }
        }

        let mut next = (self.clock.horizon(), Pending::End);
        let mut consider = |time: Option<f64>, kind: Pending| {
            if let Some(time) = time {
                if time < next.0 {
                    next = (time, kind);
                }
            }
        };

        consider(discharge_at, Pending::Discharge);
        consider(self.clock.next_annual_boundary(t), Pending::Annual);
        consider(
            sampling::time_to_event(self.rng, exacerbation_hazard).map(|dt| t + dt),
            Pending::Exacerbation,
        );
        consider(
            sampling::time_to_event(self.rng, cessation_hazard).map(|dt| t + dt),
            Pending::SmokingCessation,
        );
        consider(
            sampling::time_to_event(self.rng, death_hazard).map(|dt| t + dt),
            Pending::Death,
        );

        let (time, kind) = next;
        if !(time > t) {
            self.fail(
                id,
                t,
                format!("next event time {} does not advance past {}", time, t),
            );
            return;
        }
        self.schedule(id, time, kind);
    }

    fn record(&mut self, id: usize, event_type: EventType, t: f64, payload: Option<f64>) {
        let wanted = match self.settings.record_mode {
            RecordMode::None => false,
            RecordMode::Milestones => event_type.is_milestone(),
            RecordMode::All => true,
        };
        if !wanted {
            return;
        }
        if !self.recording {
            self.report.events_dropped += 1;
            return;
        }

        if !matches!(self.resources.try_acquire(EVENT_SLOTS, t), Ok(true)) {
            self.recording = false;
            self.report.events_dropped += 1;
            warn!(
                recorded = self.report.events_recorded,
                "event_slots pool exhausted; recording stopped"
            );
            return;
        }

        match self.events.record(id, event_type, t, payload) {
            Ok(_) => self.report.events_recorded += 1,
            Err(err) => {
                let _ = self.resources.release(EVENT_SLOTS, t);
                self.fail(id, t, err.to_string());
            }
        }
    }

    fn fail(&mut self, id: usize, t: f64, reason: String) {
        self.release_bed(id, t);
        let Some(agent) = self.agents.get_mut(id) else {
            return;
        };
        if agent.is_failed() {
            return;
        }
        agent.mark_failed();

        warn!(agent_id = id, time = t, reason = %reason, "agent diverged; excluded from output");
        self.report.agents_failed += 1;
        self.report.diagnostics.push(AgentDiagnostic {
            agent_id: id,
            time: t,
            events_processed: agent.tally().n_events,
            reason,
        });
    }
}
