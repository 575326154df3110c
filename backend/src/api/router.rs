//! Name-based call router
//!
//! Maps host call names (with their fixed arity) onto [`SimulationApi`],
//! taking arguments and returning results as `serde_json::Value`. Hosts
//! that dispatch by name (scripts, the Python binding) go through here.
//!
//! # Example
//!
//! ```
//! use hemsim_core::api::dispatch;
//! use hemsim_core::orchestrator::Session;
//! use serde_json::json;
//!
//! let mut session = Session::new();
//! dispatch(&mut session, "set_settings_var", &[json!("population_size"), json!(10)]).unwrap();
//! dispatch(&mut session, "init_session", &[]).unwrap();
//!
//! let n = dispatch(&mut session, "get_n_events", &[]).unwrap();
//! assert_eq!(n, json!(0));
//! assert!(dispatch(&mut session, "no_such_call", &[]).is_err());
//! ```

use crate::api::SimulationApi;
use crate::config::ConfigValue;
use crate::models::EventType;
use crate::orchestrator::{OutputStatistic, RunParams, SampleSpec, SessionError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Every routable call and its arity
pub const CALLS: &[(&str, usize)] = &[
    ("init_session", 0),
    ("allocate_resources", 0),
    ("deallocate_resources", 0),
    ("deallocate_resources2", 0),
    ("create_agents", 0),
    ("set_input_var", 2),
    ("set_settings_var", 2),
    ("get_inputs", 0),
    ("get_settings", 0),
    ("Cmodel", 1),
    ("get_agent", 1),
    ("get_agent_events", 1),
    ("get_event", 1),
    ("get_events_by_type", 1),
    ("get_all_events", 0),
    ("get_all_events_matrix", 0),
    ("get_n_events", 0),
    ("get_output", 0),
    ("get_output_ex", 0),
    ("get_runtime_stats", 0),
    ("get_sample_output", 2),
    ("mvrnormArma", 3),
    ("Xrexp", 2),
    ("get_pointers", 0),
    ("get_smith", 0),
];

/// Errors raised by [`dispatch`]
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RouterError {
    #[error("Unknown call: {0}")]
    UnknownCall(String),

    #[error("{call} takes {expected} argument(s), got {got}")]
    Arity {
        call: String,
        expected: usize,
        got: usize,
    },

    #[error("{call}: bad argument {index}: {reason}")]
    BadArgument {
        call: String,
        index: usize,
        reason: String,
    },

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Failed to encode result: {0}")]
    Encode(String),
}

/// Arity of a known call
pub fn arity(call: &str) -> Option<usize> {
    CALLS
        .iter()
        .find(|(name, _)| *name == call)
        .map(|(_, n)| *n)
}

/// Invoke `call` with JSON arguments
pub fn dispatch<A: SimulationApi + ?Sized>(
    api: &mut A,
    call: &str,
    args: &[Value],
) -> Result<Value, RouterError> {
    let expected = arity(call).ok_or_else(|| RouterError::UnknownCall(call.to_string()))?;
    if args.len() != expected {
        return Err(RouterError::Arity {
            call: call.to_string(),
            expected,
            got: args.len(),
        });
    }
    let a = Args { call, args };

    match call {
        "init_session" => encode(api.init_session()),
        "allocate_resources" => encode(api.allocate_resources()?),
        "deallocate_resources" => encode(api.deallocate_resources()),
        "deallocate_resources2" => encode(api.deallocate_resources2()),
        "create_agents" => encode(api.create_agents()?),
        "set_input_var" => encode(api.set_input_var(&a.string(0)?, a.decode::<ConfigValue>(1)?)?),
        "set_settings_var" => {
            encode(api.set_settings_var(&a.string(0)?, a.decode::<ConfigValue>(1)?)?)
        }
        "get_inputs" => encode(api.get_inputs()),
        "get_settings" => encode(api.get_settings()),
        "Cmodel" => encode(api.model(a.run_params(0)?)?),
        "get_agent" => encode(api.get_agent(a.index(0)?)?),
        "get_agent_events" => encode(api.get_agent_events(a.index(0)?)?),
        "get_event" => encode(api.get_event(a.index(0)?)?),
        "get_events_by_type" => encode(api.get_events_by_type(a.event_type(0)?)),
        "get_all_events" => encode(api.get_all_events()),
        "get_all_events_matrix" => encode(api.get_all_events_matrix()),
        "get_n_events" => encode(api.get_n_events()),
        "get_output" => encode(api.get_output()?),
        "get_output_ex" => encode(api.get_output_ex()?),
        "get_runtime_stats" => encode(api.get_runtime_stats()),
        "get_sample_output" => {
            encode(api.get_sample_output(&a.sample_spec(0)?, a.index(1)?)?)
        }
        "mvrnormArma" => encode(api.mvrnorm(
            &a.decode::<Vec<f64>>(0)?,
            &a.decode::<Vec<Vec<f64>>>(1)?,
            a.index(2)?,
        )?),
        "Xrexp" => encode(api.xrexp(&a.decode::<Vec<f64>>(0)?, a.index(1)?)?),
        "get_pointers" => encode(api.get_pointers()),
        "get_smith" => encode(api.get_smith()),
        _ => Err(RouterError::UnknownCall(call.to_string())),
    }
}

fn encode<T: Serialize>(value: T) -> Result<Value, RouterError> {
    serde_json::to_value(value).map_err(|e| RouterError::Encode(e.to_string()))
}

/// Positional argument decoding for one call
struct Args<'a> {
    call: &'a str,
    args: &'a [Value],
}

impl<'a> Args<'a> {
    fn bad(&self, index: usize, reason: impl Into<String>) -> RouterError {
        RouterError::BadArgument {
            call: self.call.to_string(),
            index,
            reason: reason.into(),
        }
    }

    fn decode<T: DeserializeOwned>(&self, index: usize) -> Result<T, RouterError> {
        serde_json::from_value(self.args[index].clone()).map_err(|e| self.bad(index, e.to_string()))
    }

    fn string(&self, index: usize) -> Result<String, RouterError> {
        self.args[index]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.bad(index, "expected a string"))
    }

    /// Non-negative integer; integral floats are accepted
    fn index(&self, index: usize) -> Result<usize, RouterError> {
        let value = &self.args[index];
        value
            .as_u64()
            .or_else(|| {
                value
                    .as_f64()
                    .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
                    .map(|f| f as u64)
            })
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| {
                self.bad(index, format!("expected a non-negative integer, got {}", value))
            })
    }

    /// Event type by name or numeric code
    fn event_type(&self, index: usize) -> Result<EventType, RouterError> {
        match &self.args[index] {
            Value::String(name) => name.parse().map_err(|e: String| self.bad(index, e)),
            Value::Number(_) => {
                let code = self.index(index)?;
                u8::try_from(code)
                    .ok()
                    .and_then(EventType::from_code)
                    .ok_or_else(|| self.bad(index, format!("unknown event type code {}", code)))
            }
            other => Err(self.bad(index, format!("expected an event type, got {}", other))),
        }
    }

    /// `null`, an agent limit, or `{"max_agents": n}`
    fn run_params(&self, index: usize) -> Result<RunParams, RouterError> {
        match &self.args[index] {
            Value::Null => Ok(RunParams::default()),
            Value::Number(_) => Ok(RunParams {
                max_agents: Some(self.index(index)?),
            }),
            _ => self.decode(index),
        }
    }

    /// A statistic name or `{"statistic": name, "base_seed": s}`
    fn sample_spec(&self, index: usize) -> Result<SampleSpec, RouterError> {
        match &self.args[index] {
            Value::String(name) => name
                .parse::<OutputStatistic>()
                .map(SampleSpec::new)
                .map_err(|e| self.bad(index, e)),
            _ => self.decode(index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::Session;
    use serde_json::json;

    #[test]
    fn test_calls_table_is_complete() {
        assert_eq!(CALLS.len(), 25);
        assert_eq!(arity("mvrnormArma"), Some(3));
        assert_eq!(arity("Cmodel"), Some(1));
        assert_eq!(arity("cmodel"), None);
    }

    #[test]
    fn test_arity_checked_before_dispatch() {
        let mut session = Session::new();
        assert_eq!(
            dispatch(&mut session, "get_agent", &[]),
            Err(RouterError::Arity {
                call: "get_agent".to_string(),
                expected: 1,
                got: 0,
            })
        );
    }

    #[test]
    fn test_bad_argument() {
        let mut session = Session::new();
        let err = dispatch(&mut session, "get_agent", &[json!("seven")]).unwrap_err();
        assert!(matches!(err, RouterError::BadArgument { index: 0, .. }));

        let err = dispatch(&mut session, "get_events_by_type", &[json!(42)]).unwrap_err();
        assert!(matches!(err, RouterError::BadArgument { .. }));
    }

    #[test]
    fn test_session_errors_are_wrapped() {
        let mut session = Session::new();
        let err = dispatch(&mut session, "create_agents", &[]).unwrap_err();
        assert_eq!(err, RouterError::Session(SessionError::SessionNotInitialized));
    }

    #[test]
    fn test_event_type_by_name_or_code() {
        let mut session = Session::new();
        dispatch(&mut session, "init_session", &[]).unwrap();
        let by_name = dispatch(&mut session, "get_events_by_type", &[json!("death")]).unwrap();
        let by_code = dispatch(&mut session, "get_events_by_type", &[json!(7)]).unwrap();
        assert_eq!(by_name, by_code);
    }

    #[test]
    fn test_integral_float_index_accepted() {
        let mut session = Session::new();
        let draws = dispatch(&mut session, "Xrexp", &[json!([1.0]), json!(4.0)]).unwrap();
        assert_eq!(draws.as_array().unwrap().len(), 4);
    }
}
