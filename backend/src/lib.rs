//! hemsim core - health-economic microsimulation engine
//!
//! Agent-based discrete-event microsimulation with deterministic execution.
//!
//! # Architecture
//!
//! - **rng**: Seedable xorshift64* stream, the only source of randomness
//! - **sampling**: Multivariate normal, exponential and Bernoulli draws
//! - **core**: Simulated time, annual boundaries and discounting
//! - **config**: Fixed input/setting keys with validation
//! - **models**: Agents, agent store and event log
//! - **resources**: Named capacity pools (agent slots, event slots, beds)
//! - **orchestrator**: Session lifecycle, event calendar engine, outputs
//! - **api**: One method per host call, plus a name-based router
//!
//! # Critical Invariants
//!
//! 1. All randomness is deterministic (seeded stream per session)
//! 2. No process-wide state: every store is owned by a `Session`
//! 3. Per-agent numeric failures never abort a run

// Module declarations
pub mod api;
pub mod config;
pub mod core;
pub mod models;
pub mod orchestrator;
pub mod resources;
pub mod rng;
pub mod sampling;

// Re-exports for convenience
pub use api::{dispatch, RouterError, SimulationApi};
pub use config::{ConfigError, ConfigFile, ConfigStore, ConfigValue, ModelInputs, RunSettings};
pub use crate::core::time::SimClock;
pub use models::{
    agent::{Agent, AgentRecord, Baseline},
    event::{Event, EventLog, EventLogError, EventType},
    AgentStore,
};
pub use orchestrator::{
    Output, OutputEx, OutputStatistic, RunParams, RunStatus, SampleOutput, SampleSpec, Session,
    SessionError, SessionState,
};
pub use resources::{ResourceError, ResourceManager};
pub use rng::RngManager;
pub use sampling::SamplerError;

// FFI module (when feature enabled)
#[cfg(feature = "pyo3")]
pub mod ffi;

// PyO3 exports (when feature enabled)
#[cfg(feature = "pyo3")]
use pyo3::prelude::*;

#[cfg(feature = "pyo3")]
#[pymodule]
fn hemsim_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<ffi::session::PySession>()?;
    Ok(())
}
