//! Orchestrator - session lifecycle and simulation engine
//!
//! See `session.rs` for the lifecycle state machine and `engine.rs` for the
//! event calendar.

pub mod engine;
pub mod output;
pub mod replicates;
pub mod session;

// Re-export main types for convenience
pub use engine::{Engine, RunReport};
pub use output::{
    AgentDiagnostic, AgentOutcome, Output, OutputEx, RandomStreamDiagnostics, RuntimeStats,
    StorageDiagnostics, YearRow,
};
pub use replicates::{OutputStatistic, SampleOutput, SampleSpec};
pub use session::{
    RunParams, RunStatus, Session, SessionError, SessionState, SessionStatus, TeardownStatus,
};
