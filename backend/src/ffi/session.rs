//! PyO3 wrapper for Session
//!
//! Every method forwards through the name-based router, so Python sees the
//! same call names, arities and result shapes as any other host.

use pyo3::prelude::*;
use pyo3::types::PyTuple;
use serde_json::Value;

use super::types::{json_to_py, py_to_json, router_error_to_py};
use crate::api::dispatch;
use crate::orchestrator::Session as RustSession;

/// Python wrapper for a simulation session
///
/// # Example (from Python)
///
/// ```python
/// from hemsim_core import Session
///
/// s = Session()
/// s.set_settings_var("population_size", 500)
/// s.init_session()
/// s.allocate_resources()
/// s.create_agents()
/// s.Cmodel(None)
/// print(s.get_output()["mean_cost"])
/// s.deallocate_resources()
/// ```
#[pyclass(name = "Session")]
pub struct PySession {
    inner: RustSession,
}

impl PySession {
    fn invoke<'py>(
        &mut self,
        py: Python<'py>,
        call: &str,
        args: Vec<Value>,
    ) -> PyResult<Bound<'py, PyAny>> {
        let result = dispatch(&mut self.inner, call, &args).map_err(router_error_to_py)?;
        json_to_py(py, &result)
    }
}

#[pymethods]
impl PySession {
    #[new]
    fn new() -> Self {
        PySession {
            inner: RustSession::new(),
        }
    }

    /// Invoke any call by name
    #[pyo3(signature = (name, *args))]
    fn call<'py>(
        &mut self,
        py: Python<'py>,
        name: &str,
        args: &Bound<'py, PyTuple>,
    ) -> PyResult<Bound<'py, PyAny>> {
        let args = args
            .iter()
            .map(|arg| py_to_json(&arg))
            .collect::<PyResult<Vec<_>>>()?;
        self.invoke(py, name, args)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    fn init_session<'py>(&mut self, py: Python<'py>) -> PyResult<Bound<'py, PyAny>> {
        self.invoke(py, "init_session", vec![])
    }

    fn allocate_resources<'py>(&mut self, py: Python<'py>) -> PyResult<Bound<'py, PyAny>> {
        self.invoke(py, "allocate_resources", vec![])
    }

    fn deallocate_resources<'py>(&mut self, py: Python<'py>) -> PyResult<Bound<'py, PyAny>> {
        self.invoke(py, "deallocate_resources", vec![])
    }

    fn deallocate_resources2<'py>(&mut self, py: Python<'py>) -> PyResult<Bound<'py, PyAny>> {
        self.invoke(py, "deallocate_resources2", vec![])
    }

    fn create_agents<'py>(&mut self, py: Python<'py>) -> PyResult<Bound<'py, PyAny>> {
        self.invoke(py, "create_agents", vec![])
    }

    #[pyo3(name = "Cmodel", signature = (params=None))]
    fn cmodel<'py>(
        &mut self,
        py: Python<'py>,
        params: Option<&Bound<'py, PyAny>>,
    ) -> PyResult<Bound<'py, PyAny>> {
        let params = params.map(py_to_json).transpose()?.unwrap_or(Value::Null);
        self.invoke(py, "Cmodel", vec![params])
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    fn set_input_var<'py>(
        &mut self,
        py: Python<'py>,
        name: &str,
        value: &Bound<'py, PyAny>,
    ) -> PyResult<Bound<'py, PyAny>> {
        self.invoke(py, "set_input_var", vec![Value::from(name), py_to_json(value)?])
    }

    fn set_settings_var<'py>(
        &mut self,
        py: Python<'py>,
        name: &str,
        value: &Bound<'py, PyAny>,
    ) -> PyResult<Bound<'py, PyAny>> {
        self.invoke(py, "set_settings_var", vec![Value::from(name), py_to_json(value)?])
    }

    fn get_inputs<'py>(&mut self, py: Python<'py>) -> PyResult<Bound<'py, PyAny>> {
        self.invoke(py, "get_inputs", vec![])
    }

    fn get_settings<'py>(&mut self, py: Python<'py>) -> PyResult<Bound<'py, PyAny>> {
        self.invoke(py, "get_settings", vec![])
    }

    // ========================================================================
    // Queries
    // ========================================================================

    fn get_agent<'py>(&mut self, py: Python<'py>, id: usize) -> PyResult<Bound<'py, PyAny>> {
        self.invoke(py, "get_agent", vec![Value::from(id)])
    }

    fn get_agent_events<'py>(&mut self, py: Python<'py>, id: usize) -> PyResult<Bound<'py, PyAny>> {
        self.invoke(py, "get_agent_events", vec![Value::from(id)])
    }

    fn get_event<'py>(&mut self, py: Python<'py>, index: usize) -> PyResult<Bound<'py, PyAny>> {
        self.invoke(py, "get_event", vec![Value::from(index)])
    }

    /// Event type by name (`"Exacerbation"`) or numeric code
    fn get_events_by_type<'py>(
        &mut self,
        py: Python<'py>,
        event_type: &Bound<'py, PyAny>,
    ) -> PyResult<Bound<'py, PyAny>> {
        self.invoke(py, "get_events_by_type", vec![py_to_json(event_type)?])
    }

    fn get_all_events<'py>(&mut self, py: Python<'py>) -> PyResult<Bound<'py, PyAny>> {
        self.invoke(py, "get_all_events", vec![])
    }

    fn get_all_events_matrix<'py>(&mut self, py: Python<'py>) -> PyResult<Bound<'py, PyAny>> {
        self.invoke(py, "get_all_events_matrix", vec![])
    }

    fn get_n_events<'py>(&mut self, py: Python<'py>) -> PyResult<Bound<'py, PyAny>> {
        self.invoke(py, "get_n_events", vec![])
    }

    // ========================================================================
    // Outputs
    // ========================================================================

    fn get_output<'py>(&mut self, py: Python<'py>) -> PyResult<Bound<'py, PyAny>> {
        self.invoke(py, "get_output", vec![])
    }

    fn get_output_ex<'py>(&mut self, py: Python<'py>) -> PyResult<Bound<'py, PyAny>> {
        self.invoke(py, "get_output_ex", vec![])
    }

    fn get_runtime_stats<'py>(&mut self, py: Python<'py>) -> PyResult<Bound<'py, PyAny>> {
        self.invoke(py, "get_runtime_stats", vec![])
    }

    fn get_sample_output<'py>(
        &mut self,
        py: Python<'py>,
        spec: &Bound<'py, PyAny>,
        n: usize,
    ) -> PyResult<Bound<'py, PyAny>> {
        self.invoke(py, "get_sample_output", vec![py_to_json(spec)?, Value::from(n)])
    }

    // ========================================================================
    // Sampler and Diagnostics
    // ========================================================================

    #[pyo3(name = "mvrnormArma")]
    fn mvrnorm_arma<'py>(
        &mut self,
        py: Python<'py>,
        mean: &Bound<'py, PyAny>,
        covariance: &Bound<'py, PyAny>,
        n: usize,
    ) -> PyResult<Bound<'py, PyAny>> {
        self.invoke(
            py,
            "mvrnormArma",
            vec![py_to_json(mean)?, py_to_json(covariance)?, Value::from(n)],
        )
    }

    #[pyo3(name = "Xrexp")]
    fn xrexp<'py>(
        &mut self,
        py: Python<'py>,
        params: &Bound<'py, PyAny>,
        n: usize,
    ) -> PyResult<Bound<'py, PyAny>> {
        self.invoke(py, "Xrexp", vec![py_to_json(params)?, Value::from(n)])
    }

    fn get_pointers<'py>(&mut self, py: Python<'py>) -> PyResult<Bound<'py, PyAny>> {
        self.invoke(py, "get_pointers", vec![])
    }

    fn get_smith<'py>(&mut self, py: Python<'py>) -> PyResult<Bound<'py, PyAny>> {
        self.invoke(py, "get_smith", vec![])
    }
}
