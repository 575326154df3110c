//! Simulation session
//!
//! A [`Session`] owns every store of one simulation context: configuration,
//! random stream, agents, events, resource pools and run statistics. There
//! is no process-wide state; independent sessions share nothing.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized --init_session--> Initialized --allocate_resources--> ResourcesAllocated
//!   --create_agents--> Populated --model--> (Running) --> ResultsAvailable
//!   --deallocate_resources[2]--> TornDown --init_session--> Initialized
//! ```
//!
//! Out-of-order calls fail with [`SessionError::InvalidState`] (or the more
//! specific `SessionNotInitialized`, `AlreadyAllocated`, `AlreadyPopulated`).
//! `init_session` is valid from any state and always yields clean stores;
//! configuration survives re-initialisation.
//!
//! # Example
//!
//! ```
//! use hemsim_core::config::ConfigValue;
//! use hemsim_core::orchestrator::{RunParams, Session};
//!
//! let mut session = Session::new();
//! session.set_settings_var("population_size", ConfigValue::Scalar(50.0)).unwrap();
//! session.set_settings_var("horizon_years", ConfigValue::Scalar(5.0)).unwrap();
//!
//! session.init_session();
//! session.allocate_resources().unwrap();
//! assert_eq!(session.create_agents().unwrap(), 50);
//!
//! let status = session.model(RunParams::default()).unwrap();
//! assert_eq!(status.agents_simulated, 50);
//!
//! let output = session.get_output().unwrap();
//! assert_eq!(output.n_agents + output.n_failed, 50);
//!
//! session.deallocate_resources();
//! ```

use crate::config::{ConfigError, ConfigFile, ConfigStore, ConfigValue};
use crate::core::time::SimClock;
use crate::models::{
    AgentRecord, AgentStore, Event, EventLog, EventLogError, EventMatrix, EventType,
};
use crate::orchestrator::engine::Engine;
use crate::orchestrator::output::{
    Output, OutputEx, RandomStreamDiagnostics, RuntimeStats, StorageDiagnostics,
};
use crate::orchestrator::replicates::{self, SampleOutput, SampleSpec};
use crate::resources::{
    PoolHandle, PoolSnapshot, PoolSpec, ResourceError, ResourceManager, AGENT_SLOTS, EVENT_SLOTS,
    HOSPITAL_BEDS,
};
use crate::rng::RngManager;
use crate::sampling::{self, SamplerError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

// ============================================================================
// State and Errors
// ============================================================================

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Uninitialized,
    Initialized,
    ResourcesAllocated,
    Populated,
    Running,
    ResultsAvailable,
    TornDown,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "Uninitialized",
            SessionState::Initialized => "Initialized",
            SessionState::ResourcesAllocated => "ResourcesAllocated",
            SessionState::Populated => "Populated",
            SessionState::Running => "Running",
            SessionState::ResultsAvailable => "ResultsAvailable",
            SessionState::TornDown => "TornDown",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by session operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    #[error("{operation} is not valid in state {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("Session is not initialised; call init_session first")]
    SessionNotInitialized,

    #[error("Agents have already been created for this session")]
    AlreadyPopulated,

    #[error("Resources are already allocated for this session")]
    AlreadyAllocated,

    #[error("Unknown key: {0}")]
    UnknownKey(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration is locked in the current state: {0}")]
    SessionLocked(String),

    #[error("Invalid covariance: {0}")]
    InvalidCovariance(String),

    #[error("Simulation diverged for agent {agent_id}: {reason}")]
    SimulationDiverged { agent_id: usize, reason: String },

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),
}

impl From<ConfigError> for SessionError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::UnknownKey(key) => SessionError::UnknownKey(key),
            ConfigError::InvalidParameter { key, reason } => {
                SessionError::InvalidParameter(format!("{}: {}", key, reason))
            }
        }
    }
}

impl From<SamplerError> for SessionError {
    fn from(err: SamplerError) -> Self {
        match err {
            SamplerError::InvalidCovariance(msg) => SessionError::InvalidCovariance(msg),
            SamplerError::InvalidParameter(msg) => SessionError::InvalidParameter(msg),
        }
    }
}

impl From<EventLogError> for SessionError {
    fn from(err: EventLogError) -> Self {
        match err {
            EventLogError::NotFound { .. } => SessionError::NotFound(err.to_string()),
            other => SessionError::InvalidParameter(other.to_string()),
        }
    }
}

impl From<ResourceError> for SessionError {
    fn from(err: ResourceError) -> Self {
        match err {
            ResourceError::AlreadyAllocated => SessionError::AlreadyAllocated,
            ResourceError::UnknownPool(_) => SessionError::NotFound(err.to_string()),
            ResourceError::ResourceExhausted { .. } => {
                SessionError::ResourceExhausted(err.to_string())
            }
        }
    }
}

// ============================================================================
// Call Parameters and Results
// ============================================================================

/// Parameters of a model run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunParams {
    /// Simulate only the first `max_agents` agents (all when `None`)
    #[serde(default)]
    pub max_agents: Option<usize>,
}

/// Result of a model run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    pub agents_simulated: usize,
    pub agents_failed: usize,
    pub events_recorded: usize,
}

/// Result of `init_session`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub session_id: Uuid,
    pub state: SessionState,
    pub config_fingerprint: String,
}

/// Result of a teardown call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeardownStatus {
    pub previous_state: SessionState,
    pub pools_released: usize,
    pub units_released: usize,
    pub agents_freed: usize,
    pub events_freed: usize,
}

/// What the last run needs to produce its outputs
#[derive(Debug, Clone)]
struct RunContext {
    horizon_years: f64,
    discount_rate: f64,
    seed: u64,
    fingerprint: String,
    beds: Option<PoolSnapshot>,
}

// ============================================================================
// Session
// ============================================================================

/// One simulation context from initialisation to teardown
#[derive(Debug)]
pub struct Session {
    id: Option<Uuid>,
    state: SessionState,
    config: ConfigStore,
    rng: RngManager,
    agents: AgentStore,
    events: EventLog,
    resources: ResourceManager,
    stats: RuntimeStats,
    last_run: Option<RunContext>,
}

impl Default for Session {
    fn default() -> Self {
        Self::with_config(ConfigStore::default())
    }
}

impl Session {
    /// Uninitialised session with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Uninitialised session with the given configuration
    pub fn with_config(config: ConfigStore) -> Self {
        let seed = config.run_settings().seed;
        Self {
            id: None,
            state: SessionState::Uninitialized,
            rng: RngManager::new(seed),
            config,
            agents: AgentStore::new(),
            events: EventLog::new(),
            resources: ResourceManager::new(),
            stats: RuntimeStats::default(),
            last_run: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.id
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    /// Fail with the error appropriate to the current state unless it is `expected`
    fn require(&self, operation: &'static str, expected: SessionState) -> Result<(), SessionError> {
        match self.state {
            s if s == expected => Ok(()),
            SessionState::Uninitialized => Err(SessionError::SessionNotInitialized),
            state => Err(SessionError::InvalidState { operation, state }),
        }
    }

    pub(crate) fn reseed(&mut self, seed: u64) {
        self.rng = RngManager::new(seed);
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start a fresh session
    ///
    /// Valid from any state. Force-releases resources, clears agents, events
    /// and statistics, reseeds the random stream from the `seed` setting and
    /// issues a new session id. Configuration is kept.
    pub fn init_session(&mut self) -> SessionStatus {
        let cleanup = self.resources.deallocate2();
        self.agents.clear();
        self.events.clear();
        self.stats = RuntimeStats::default();
        self.last_run = None;
        self.rng = RngManager::new(self.config.run_settings().seed);

        let id = Uuid::new_v4();
        self.id = Some(id);
        self.state = SessionState::Initialized;

        info!(
            session_id = %id,
            released_units = cleanup.units_force_released,
            "session initialised"
        );

        SessionStatus {
            session_id: id,
            state: self.state,
            config_fingerprint: self.config.fingerprint(),
        }
    }

    /// Reserve the agent, event and bed pools
    ///
    /// Pool sizes come from the `agent_capacity` and `event_capacity`
    /// settings and the `hospital_capacity` input. Settings are locked from
    /// here until the next `init_session`.
    pub fn allocate_resources(&mut self) -> Result<Vec<PoolHandle>, SessionError> {
        match self.state {
            SessionState::Initialized => {}
            SessionState::ResourcesAllocated
            | SessionState::Populated
            | SessionState::ResultsAvailable => return Err(SessionError::AlreadyAllocated),
            _ => self.require("allocate_resources", SessionState::Initialized)?,
        }

        let settings = self.config.run_settings();
        let inputs = self.config.model_inputs();
        let handles = self.resources.allocate(&[
            PoolSpec::new(AGENT_SLOTS, settings.agent_capacity),
            PoolSpec::new(EVENT_SLOTS, settings.event_capacity),
            PoolSpec::new(HOSPITAL_BEDS, inputs.hospital_capacity),
        ])?;

        self.state = SessionState::ResourcesAllocated;
        info!(
            agent_capacity = settings.agent_capacity,
            event_capacity = settings.event_capacity,
            hospital_capacity = inputs.hospital_capacity,
            "resources allocated"
        );
        Ok(handles)
    }

    /// Normal teardown: release every pool and free agents and events
    ///
    /// Never fails; a no-op on a session that holds nothing.
    pub fn deallocate_resources(&mut self) -> TeardownStatus {
        let previous_state = self.state;
        let report = self.resources.deallocate();
        let agents_freed = self.agents.len();
        let events_freed = self.events.len();
        self.agents.clear();
        self.events.clear();

        if previous_state != SessionState::Uninitialized {
            self.state = SessionState::TornDown;
        }
        info!(
            previous = %previous_state,
            agents_freed,
            events_freed,
            "resources deallocated"
        );

        TeardownStatus {
            previous_state,
            pools_released: report.pools_released,
            units_released: report.units_force_released,
            agents_freed,
            events_freed,
        }
    }

    /// Error-path teardown
    ///
    /// Force-releases whatever pool units are held, keeping agents and
    /// events inspectable. Never fails, even on partially initialised state.
    pub fn deallocate_resources2(&mut self) -> TeardownStatus {
        let previous_state = self.state;
        let report = self.resources.deallocate2();

        if previous_state != SessionState::Uninitialized {
            self.state = SessionState::TornDown;
        }
        info!(
            previous = %previous_state,
            units = report.units_force_released,
            "resources force-released"
        );

        TeardownStatus {
            previous_state,
            pools_released: report.pools_released,
            units_released: report.units_force_released,
            agents_freed: 0,
            events_freed: 0,
        }
    }

    /// Create `population_size` agents from the baseline distributions
    ///
    /// # Errors
    /// - `ResourceExhausted` if the agent_slots pool cannot hold them
    /// - `InvalidCovariance` if the baseline covariance is not PSD (the
    ///   random stream is left untouched)
    pub fn create_agents(&mut self) -> Result<usize, SessionError> {
        match self.state {
            SessionState::ResourcesAllocated => {}
            SessionState::Populated | SessionState::ResultsAvailable => {
                return Err(SessionError::AlreadyPopulated)
            }
            _ => self.require("create_agents", SessionState::ResourcesAllocated)?,
        }

        let count = self.config.run_settings().population_size;
        let available = self
            .resources
            .pool(AGENT_SLOTS)
            .map_or(0, |pool| pool.available());
        if count > available {
            return Err(ResourceError::ResourceExhausted {
                pool: AGENT_SLOTS.to_string(),
                capacity: available,
                requested: count,
            }
            .into());
        }

        let started = Instant::now();
        let inputs = self.config.model_inputs();
        self.agents.populate(count, &inputs, &mut self.rng)?;
        self.resources.acquire_many(AGENT_SLOTS, count, 0.0)?;
        self.stats.create_agents_ms = started.elapsed().as_secs_f64() * 1000.0;

        self.state = SessionState::Populated;
        info!(agents = count, "agents created");
        Ok(count)
    }

    /// Run the simulation
    pub fn model(&mut self, params: RunParams) -> Result<RunStatus, SessionError> {
        self.require("Cmodel", SessionState::Populated)?;

        let settings = self.config.run_settings();
        let inputs = self.config.model_inputs();
        let limit = params.max_agents.unwrap_or(usize::MAX);

        self.state = SessionState::Running;
        info!(
            agents = limit.min(self.agents.len()),
            horizon = settings.horizon_years,
            seed = self.rng.seed(),
            "model run started"
        );

        let started = Instant::now();
        let report = Engine::new(
            &inputs,
            &settings,
            &mut self.agents,
            &mut self.events,
            &mut self.resources,
            &mut self.rng,
        )
        .run(limit);

        self.stats.model_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.stats.calendar_pops = report.calendar_pops;
        self.stats.peak_calendar_len = report.peak_calendar_len;
        self.stats.events_recorded = report.events_recorded;
        self.stats.events_dropped = report.events_dropped;
        self.stats.diagnostics = report.diagnostics;

        self.last_run = Some(RunContext {
            horizon_years: settings.horizon_years,
            discount_rate: inputs.discount_rate,
            seed: self.rng.seed(),
            fingerprint: self.config.fingerprint(),
            beds: self
                .resources
                .snapshots()
                .into_iter()
                .find(|pool| pool.name == HOSPITAL_BEDS),
        });
        self.state = SessionState::ResultsAvailable;

        info!(
            simulated = report.agents_simulated,
            failed = report.agents_failed,
            events = report.events_recorded,
            elapsed_ms = self.stats.model_ms,
            "model run finished"
        );

        Ok(RunStatus {
            agents_simulated: report.agents_simulated,
            agents_failed: report.agents_failed,
            events_recorded: report.events_recorded,
        })
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    fn check_inputs_unlocked(&self, name: &str) -> Result<(), SessionError> {
        match self.state {
            SessionState::Running | SessionState::ResultsAvailable => Err(
                SessionError::SessionLocked(format!("input '{}' cannot change after a run", name)),
            ),
            _ => Ok(()),
        }
    }

    fn check_settings_unlocked(&self, name: &str) -> Result<(), SessionError> {
        match self.state {
            SessionState::ResourcesAllocated
            | SessionState::Populated
            | SessionState::Running
            | SessionState::ResultsAvailable => Err(SessionError::SessionLocked(format!(
                "setting '{}' cannot change once resources are allocated",
                name
            ))),
            _ => Ok(()),
        }
    }

    pub fn set_input_var(&mut self, name: &str, value: ConfigValue) -> Result<(), SessionError> {
        self.check_inputs_unlocked(name)?;
        self.config.set_input(name, value)?;
        debug!(key = name, "input updated");
        Ok(())
    }

    /// Update a setting
    ///
    /// Changing `seed` on an initialised session reseeds its random stream.
    pub fn set_settings_var(&mut self, name: &str, value: ConfigValue) -> Result<(), SessionError> {
        self.check_settings_unlocked(name)?;
        self.config.set_setting(name, value)?;
        if name == "seed" && self.state == SessionState::Initialized {
            self.rng = RngManager::new(self.config.run_settings().seed);
        }
        debug!(key = name, "setting updated");
        Ok(())
    }

    /// Apply a configuration file, settings first
    pub fn configure(&mut self, file: &ConfigFile) -> Result<(), SessionError> {
        for (name, value) in &file.settings {
            self.set_settings_var(name, value.clone())?;
        }
        for (name, value) in &file.inputs {
            self.set_input_var(name, value.clone())?;
        }
        Ok(())
    }

    pub fn get_inputs(&self) -> BTreeMap<String, ConfigValue> {
        self.config.inputs().clone()
    }

    pub fn get_settings(&self) -> BTreeMap<String, ConfigValue> {
        self.config.settings().clone()
    }

    // ========================================================================
    // Agent and Event Queries
    // ========================================================================

    pub fn get_agent(&self, id: usize) -> Result<AgentRecord, SessionError> {
        self.agents
            .get(id)
            .map(AgentRecord::from)
            .ok_or_else(|| self.agent_not_found(id))
    }

    /// Chronological events of one agent
    pub fn get_agent_events(&self, id: usize) -> Result<Vec<Event>, SessionError> {
        if id >= self.agents.len() {
            return Err(self.agent_not_found(id));
        }
        Ok(self.events.agent_events(id).into_iter().cloned().collect())
    }

    fn agent_not_found(&self, id: usize) -> SessionError {
        SessionError::NotFound(format!(
            "agent {} (session has {} agents)",
            id,
            self.agents.len()
        ))
    }

    pub fn get_event(&self, index: usize) -> Result<Event, SessionError> {
        Ok(self.events.get(index)?.clone())
    }

    pub fn get_events_by_type(&self, event_type: EventType) -> Vec<Event> {
        self.events
            .events_of_type(event_type)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Every event on the global timeline
    pub fn get_all_events(&self) -> Vec<Event> {
        self.events.time_ordered().into_iter().cloned().collect()
    }

    pub fn get_all_events_matrix(&self) -> EventMatrix {
        self.events.matrix()
    }

    pub fn get_n_events(&self) -> usize {
        self.events.len()
    }

    // ========================================================================
    // Outputs
    // ========================================================================

    fn run_context(&self, operation: &'static str) -> Result<&RunContext, SessionError> {
        self.require(operation, SessionState::ResultsAvailable)?;
        self.last_run.as_ref().ok_or(SessionError::InvalidState {
            operation,
            state: self.state,
        })
    }

    /// Aggregate summary of the last run
    pub fn get_output(&self) -> Result<Output, SessionError> {
        let run = self.run_context("get_output")?;
        Ok(Output::reduce(
            &self.agents,
            run.beds.as_ref(),
            run.horizon_years,
            run.seed,
            run.fingerprint.clone(),
        ))
    }

    /// Summary plus per-agent rows and event-log tables
    pub fn get_output_ex(&self) -> Result<OutputEx, SessionError> {
        let run = self.run_context("get_output_ex")?;
        let summary = self.get_output()?;
        let clock = SimClock::new(run.horizon_years, run.discount_rate);
        Ok(OutputEx::reduce(summary, &self.agents, &self.events, &clock))
    }

    pub fn get_runtime_stats(&self) -> RuntimeStats {
        self.stats.clone()
    }

    /// Distribution of a statistic over independent replicates
    ///
    /// Replicates run in their own sessions; this session is not touched.
    pub fn get_sample_output(
        &self,
        spec: &SampleSpec,
        n: usize,
    ) -> Result<SampleOutput, SessionError> {
        replicates::sample_output(&self.config, spec, n)
    }

    // ========================================================================
    // Sampler Access
    // ========================================================================

    /// `n` multivariate normal draws from the session stream
    pub fn mvrnorm(
        &mut self,
        mean: &[f64],
        covariance: &[Vec<f64>],
        n: usize,
    ) -> Result<Vec<Vec<f64>>, SessionError> {
        Ok(sampling::sample_multivariate_normal(
            &mut self.rng,
            mean,
            covariance,
            n,
        )?)
    }

    /// `n` transformed exponential draws from the session stream
    pub fn xrexp(&mut self, params: &[f64], n: usize) -> Result<Vec<f64>, SessionError> {
        Ok(sampling::sample_exponential(&mut self.rng, params, n)?)
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    pub fn get_pointers(&self) -> StorageDiagnostics {
        let settings = self.config.run_settings();
        let pools = self.resources.snapshots();
        let capacity = |name: &str, fallback: usize| {
            pools
                .iter()
                .find(|p| p.name == name)
                .map_or(fallback, |p| p.capacity)
        };

        StorageDiagnostics {
            session_id: self.id,
            state: self.state,
            n_agents: self.agents.len(),
            agent_capacity: capacity(AGENT_SLOTS, settings.agent_capacity),
            n_events: self.events.len(),
            event_capacity: capacity(EVENT_SLOTS, settings.event_capacity),
            pools: pools.clone(),
        }
    }

    pub fn get_smith(&self) -> RandomStreamDiagnostics {
        RandomStreamDiagnostics {
            seed: self.rng.seed(),
            state: self.rng.get_state(),
            draws: self.rng.draws(),
        }
    }
}
