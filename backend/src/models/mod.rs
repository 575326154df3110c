//! Domain models for the microsimulation

pub mod agent;
pub mod agent_store;
pub mod event;

// Re-exports
pub use agent::{Agent, AgentRecord, AgentTally, Baseline};
pub use agent_store::AgentStore;
pub use event::{Event, EventLog, EventLogError, EventMatrix, EventType};
