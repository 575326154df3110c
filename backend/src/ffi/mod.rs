//! Python bindings (feature `pyo3`)
//!
//! Exposes a `Session` class whose methods carry the host call names and
//! forward to [`crate::api::dispatch`].

pub mod session;
pub mod types;
