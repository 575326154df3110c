//! Conversions between Python objects and JSON values
//!
//! The router speaks `serde_json::Value`; these helpers translate at the
//! Python boundary so every call shares one argument decoder.

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyBool, PyDict, PyFloat, PyInt, PyList, PyString, PyTuple};
use serde_json::{Map, Number, Value};

use crate::api::RouterError;
use crate::orchestrator::SessionError;

// ========================================================================
// Python → JSON
// ========================================================================

/// Convert a Python argument to a JSON value
///
/// Accepts `None`, bool, int, float, str, list/tuple and str-keyed dicts.
pub fn py_to_json(obj: &Bound<'_, PyAny>) -> PyResult<Value> {
    if obj.is_none() {
        return Ok(Value::Null);
    }
    // bool is a subclass of int; check it first
    if let Ok(b) = obj.downcast::<PyBool>() {
        return Ok(Value::Bool(b.is_true()));
    }
    if obj.is_instance_of::<PyInt>() {
        if let Ok(i) = obj.extract::<i64>() {
            return Ok(Value::from(i));
        }
        return Ok(Value::from(obj.extract::<u64>()?));
    }
    if obj.is_instance_of::<PyFloat>() {
        let f: f64 = obj.extract()?;
        return Number::from_f64(f).map(Value::Number).ok_or_else(|| {
            PyErr::new::<PyValueError, _>(format!("non-finite number {} is not supported", f))
        });
    }
    if let Ok(s) = obj.downcast::<PyString>() {
        return Ok(Value::String(s.to_str()?.to_string()));
    }
    if let Ok(list) = obj.downcast::<PyList>() {
        return list
            .iter()
            .map(|item| py_to_json(&item))
            .collect::<PyResult<Vec<_>>>()
            .map(Value::Array);
    }
    if let Ok(tuple) = obj.downcast::<PyTuple>() {
        return tuple
            .iter()
            .map(|item| py_to_json(&item))
            .collect::<PyResult<Vec<_>>>()
            .map(Value::Array);
    }
    if let Ok(dict) = obj.downcast::<PyDict>() {
        let mut map = Map::new();
        for (key, value) in dict.iter() {
            let key: String = key.extract().map_err(|_| {
                PyErr::new::<PyValueError, _>("dictionary keys must be strings")
            })?;
            map.insert(key, py_to_json(&value)?);
        }
        return Ok(Value::Object(map));
    }

    Err(PyErr::new::<PyValueError, _>(format!(
        "unsupported argument type: {}",
        obj.get_type().name()?
    )))
}

// ========================================================================
// JSON → Python
// ========================================================================

/// Convert a JSON result to Python dicts, lists and scalars
pub fn json_to_py<'py>(py: Python<'py>, value: &Value) -> PyResult<Bound<'py, PyAny>> {
    let obj = match value {
        Value::Null => py.None().into_bound(py),
        Value::Bool(b) => PyBool::new(py, *b).to_owned().into_any(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.into_pyobject(py)?.into_any()
            } else if let Some(u) = n.as_u64() {
                u.into_pyobject(py)?.into_any()
            } else {
                n.as_f64().unwrap_or(f64::NAN).into_pyobject(py)?.into_any()
            }
        }
        Value::String(s) => PyString::new(py, s).into_any(),
        Value::Array(items) => {
            let list = PyList::empty(py);
            for item in items {
                list.append(json_to_py(py, item)?)?;
            }
            list.into_any()
        }
        Value::Object(map) => {
            let dict = PyDict::new(py);
            for (key, item) in map {
                dict.set_item(key, json_to_py(py, item)?)?;
            }
            dict.into_any()
        }
    };
    Ok(obj)
}

// ========================================================================
// Errors
// ========================================================================

/// Map router errors to Python exceptions
///
/// Configuration and argument problems raise `ValueError`; lifecycle and
/// resource failures raise `RuntimeError`.
pub fn router_error_to_py(err: RouterError) -> PyErr {
    let message = err.to_string();
    match err {
        RouterError::UnknownCall(_)
        | RouterError::Arity { .. }
        | RouterError::BadArgument { .. }
        | RouterError::Session(SessionError::UnknownKey(_))
        | RouterError::Session(SessionError::InvalidParameter(_))
        | RouterError::Session(SessionError::InvalidCovariance(_))
        | RouterError::Session(SessionError::NotFound(_)) => PyErr::new::<PyValueError, _>(message),
        _ => PyErr::new::<PyRuntimeError, _>(message),
    }
}
