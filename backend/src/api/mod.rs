//! Call-per-method API
//!
//! [`SimulationApi`] lists every operation a host can invoke on a session,
//! one method per host call. [`Session`] is the implementation; the
//! [`router`] maps host call names onto it for hosts that dispatch by name.

pub mod router;

use crate::config::ConfigValue;
use crate::models::{AgentRecord, Event, EventMatrix, EventType};
use crate::orchestrator::{
    Output, OutputEx, RandomStreamDiagnostics, RunParams, RunStatus, RuntimeStats, SampleOutput,
    SampleSpec, Session, SessionError, SessionStatus, StorageDiagnostics, TeardownStatus,
};
use crate::resources::PoolHandle;
use std::collections::BTreeMap;

pub use router::{dispatch, RouterError, CALLS};

/// Operations exposed to hosts
pub trait SimulationApi {
    fn init_session(&mut self) -> SessionStatus;
    fn allocate_resources(&mut self) -> Result<Vec<PoolHandle>, SessionError>;
    fn deallocate_resources(&mut self) -> TeardownStatus;
    fn deallocate_resources2(&mut self) -> TeardownStatus;
    fn create_agents(&mut self) -> Result<usize, SessionError>;

    fn set_input_var(&mut self, name: &str, value: ConfigValue) -> Result<(), SessionError>;
    fn set_settings_var(&mut self, name: &str, value: ConfigValue) -> Result<(), SessionError>;
    fn get_inputs(&self) -> BTreeMap<String, ConfigValue>;
    fn get_settings(&self) -> BTreeMap<String, ConfigValue>;

    /// Run the model (host name `Cmodel`)
    fn model(&mut self, params: RunParams) -> Result<RunStatus, SessionError>;

    fn get_agent(&self, id: usize) -> Result<AgentRecord, SessionError>;
    fn get_agent_events(&self, id: usize) -> Result<Vec<Event>, SessionError>;
    fn get_event(&self, index: usize) -> Result<Event, SessionError>;
    fn get_events_by_type(&self, event_type: EventType) -> Vec<Event>;
    fn get_all_events(&self) -> Vec<Event>;
    fn get_all_events_matrix(&self) -> EventMatrix;
    fn get_n_events(&self) -> usize;

    fn get_output(&self) -> Result<Output, SessionError>;
    fn get_output_ex(&self) -> Result<OutputEx, SessionError>;
    fn get_runtime_stats(&self) -> RuntimeStats;
    fn get_sample_output(&self, spec: &SampleSpec, n: usize) -> Result<SampleOutput, SessionError>;

    /// Multivariate normal draws (host name `mvrnormArma`)
    fn mvrnorm(
        &mut self,
        mean: &[f64],
        covariance: &[Vec<f64>],
        n: usize,
    ) -> Result<Vec<Vec<f64>>, SessionError>;

    /// Exponential draws (host name `Xrexp`)
    fn xrexp(&mut self, params: &[f64], n: usize) -> Result<Vec<f64>, SessionError>;

    fn get_pointers(&self) -> StorageDiagnostics;
    fn get_smith(&self) -> RandomStreamDiagnostics;
}

impl SimulationApi for Session {
    fn init_session(&mut self) -> SessionStatus {
        Session::init_session(self)
    }

    fn allocate_resources(&mut self) -> Result<Vec<PoolHandle>, SessionError> {
        Session::allocate_resources(self)
    }

    fn deallocate_resources(&mut self) -> TeardownStatus {
        Session::deallocate_resources(self)
    }

    fn deallocate_resources2(&mut self) -> TeardownStatus {
        Session::deallocate_resources2(self)
    }

    fn create_agents(&mut self) -> Result<usize, SessionError> {
        Session::create_agents(self)
    }

    fn set_input_var(&mut self, name: &str, value: ConfigValue) -> Result<(), SessionError> {
        Session::set_input_var(self, name, value)
    }

    fn set_settings_var(&mut self, name: &str, value: ConfigValue) -> Result<(), SessionError> {
        Session::set_settings_var(self, name, value)
    }

    fn get_inputs(&self) -> BTreeMap<String, ConfigValue> {
        Session::get_inputs(self)
    }

    fn get_settings(&self) -> BTreeMap<String, ConfigValue> {
        Session::get_settings(self)
    }

    fn model(&mut self, params: RunParams) -> Result<RunStatus, SessionError> {
        Session::model(self, params)
    }

    fn get_agent(&self, id: usize) -> Result<AgentRecord, SessionError> {
        Session::get_agent(self, id)
    }

    fn get_agent_events(&self, id: usize) -> Result<Vec<Event>, SessionError> {
        Session::get_agent_events(self, id)
    }

    fn get_event(&self, index: usize) -> Result<Event, SessionError> {
        Session::get_event(self, index)
    }

    fn get_events_by_type(&self, event_type: EventType) -> Vec<Event> {
        Session::get_events_by_type(self, event_type)
    }

    fn get_all_events(&self) -> Vec<Event> {
        Session::get_all_events(self)
    }

    fn get_all_events_matrix(&self) -> EventMatrix {
        Session::get_all_events_matrix(self)
    }

    fn get_n_events(&self) -> usize {
        Session::get_n_events(self)
    }

    fn get_output(&self) -> Result<Output, SessionError> {
        Session::get_output(self)
    }

    fn get_output_ex(&self) -> Result<OutputEx, SessionError> {
        Session::get_output_ex(self)
    }

    fn get_runtime_stats(&self) -> RuntimeStats {
        Session::get_runtime_stats(self)
    }

    fn get_sample_output(&self, spec: &SampleSpec, n: usize) -> Result<SampleOutput, SessionError> {
        Session::get_sample_output(self, spec, n)
    }

    fn mvrnorm(
        &mut self,
        mean: &[f64],
        covariance: &[Vec<f64>],
        n: usize,
    ) -> Result<Vec<Vec<f64>>, SessionError> {
        Session::mvrnorm(self, mean, covariance, n)
    }

    fn xrexp(&mut self, params: &[f64], n: usize) -> Result<Vec<f64>, SessionError> {
        Session::xrexp(self, params, n)
    }

    fn get_pointers(&self) -> StorageDiagnostics {
        Session::get_pointers(self)
    }

    fn get_smith(&self) -> RandomStreamDiagnostics {
        Session::get_smith(self)
    }
}
