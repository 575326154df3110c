//! Configuration store
//!
//! Holds model **inputs** (epidemiological, cost and utility parameters)
//! and run **settings** (population size, horizon, seed, storage limits)
//! as key-addressable variables. The recognized keys are fixed at build
//! time in [`INPUT_KEYS`] and [`SETTING_KEYS`]; every write is validated
//! against its key's shape and range.
//!
//! The engine never reads the raw maps. It takes typed snapshots
//! ([`ModelInputs`], [`RunSettings`]) when a run is prepared.
//!
//! # Example
//!
//! ```
//! use hemsim_core::config::{ConfigStore, ConfigValue};
//!
//! let mut config = ConfigStore::default();
//! config.set_setting("population_size", ConfigValue::Scalar(250.0)).unwrap();
//! config.set_input("p_smoker", ConfigValue::Scalar(0.4)).unwrap();
//!
//! assert_eq!(config.run_settings().population_size, 250);
//! assert!(config.set_input("no_such_key", ConfigValue::Scalar(1.0)).is_err());
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use thiserror::Error;

/// Number of jointly sampled baseline attributes (age, severity, BMI)
pub const BASELINE_DIM: usize = 3;

/// Errors raised by configuration writes
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    #[error("Invalid value for '{key}': {reason}")]
    InvalidParameter { key: String, reason: String },
}

/// A configuration value: a single number or a vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl ConfigValue {
    /// Scalar value, if this is one
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            ConfigValue::Scalar(v) => Some(*v),
            ConfigValue::Vector(_) => None,
        }
    }

    /// Vector value, if this is one
    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            ConfigValue::Scalar(_) => None,
            ConfigValue::Vector(v) => Some(v),
        }
    }
}

/// Expected shape of a configuration key
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueShape {
    /// Real number in `[min, max]`
    Scalar { min: f64, max: f64 },
    /// Non-negative integer in `[min, max]`
    Count { min: f64, max: f64 },
    /// Vector of exactly this length
    Vector(usize),
}

/// Definition of one recognized key
#[derive(Debug, Clone, Copy)]
pub struct KeySpec {
    pub name: &'static str,
    pub shape: ValueShape,
    pub default: &'static [f64],
    pub description: &'static str,
}

const fn scalar(
    name: &'static str,
    min: f64,
    max: f64,
    default: &'static [f64],
    description: &'static str,
) -> KeySpec {
    KeySpec {
        name,
        shape: ValueShape::Scalar { min, max },
        default,
        description,
    }
}

const fn count(
    name: &'static str,
    min: f64,
    max: f64,
    default: &'static [f64],
    description: &'static str,
) -> KeySpec {
    KeySpec {
        name,
        shape: ValueShape::Count { min, max },
        default,
        description,
    }
}

/// Run settings (runtime controls)
pub const SETTING_KEYS: &[KeySpec] = &[
    count("population_size", 0.0, 1.0e7, &[1000.0], "number of agents"),
    scalar("horizon_years", 1.0e-6, 200.0, &[20.0], "simulated duration in years"),
    count("seed", 0.0, 9.007_199_254_740_991e15, &[12345.0], "random stream seed"),
    count("record_mode", 0.0, 2.0, &[2.0], "0 = none, 1 = milestones, 2 = all events"),
    count("agent_capacity", 0.0, 1.0e7, &[100_000.0], "capacity of the agent_slots pool"),
    count("event_capacity", 0.0, 1.0e9, &[5_000_000.0], "capacity of the event_slots pool"),
    count("max_events_per_agent", 1.0, 1.0e9, &[10_000.0], "divergence guard per agent"),
];

/// Model inputs (parameters)
pub const INPUT_KEYS: &[KeySpec] = &[
    KeySpec {
        name: "baseline_mean",
        shape: ValueShape::Vector(BASELINE_DIM),
        default: &[60.0, 1.0, 27.0],
        description: "mean of (age, severity, BMI) at entry",
    },
    KeySpec {
        name: "baseline_cov",
        shape: ValueShape::Vector(BASELINE_DIM * BASELINE_DIM),
        default: &[64.0, 0.8, 0.0, 0.8, 0.25, 0.1, 0.0, 0.1, 16.0],
        description: "row-major covariance of (age, severity, BMI)",
    },
    scalar("p_male", 0.0, 1.0, &[0.5], "probability an agent is male"),
    scalar("p_smoker", 0.0, 1.0, &[0.3], "probability an agent smokes at entry"),
    scalar("exacerbation_rate", 0.0, f64::MAX, &[0.5], "base exacerbations per year"),
    scalar("exacerbation_severity_coeff", -50.0, 1000.0, &[0.3], "log-hazard per severity unit"),
    scalar("exacerbation_smoker_coeff", -50.0, 1000.0, &[0.2], "log-hazard for current smokers"),
    scalar("p_severe_exacerbation", 0.0, 1.0, &[0.2], "probability an exacerbation is severe"),
    scalar("hospital_stay_years", 1.0e-6, 10.0, &[7.0 / 365.0], "length of a hospital admission"),
    count("hospital_capacity", 0.0, 1.0e7, &[50.0], "capacity of the hospital_beds pool"),
    scalar("mortality_base_rate", 0.0, f64::MAX, &[0.01], "background death rate at age 60"),
    scalar("mortality_age_coeff", -10.0, 10.0, &[0.07], "log-hazard per year of age over 60"),
    scalar("mortality_severity_coeff", -50.0, 1000.0, &[0.2], "log-hazard per severity unit"),
    scalar("p_death_severe_exacerbation", 0.0, 1.0, &[0.05], "death probability on admission"),
    scalar(
        "blocked_mortality_multiplier",
        0.0,
        1000.0,
        &[2.0],
        "death risk multiplier without a bed",
    ),
    scalar("smoking_cessation_rate", 0.0, f64::MAX, &[0.05], "quits per smoker-year"),
    scalar("severity_progression_rate", -10.0, 10.0, &[0.03], "severity units gained per year"),
    scalar("cost_background", 0.0, f64::MAX, &[1000.0], "annual background cost"),
    scalar("cost_exacerbation", 0.0, f64::MAX, &[500.0], "cost per exacerbation"),
    scalar("cost_admission", 0.0, f64::MAX, &[8000.0], "cost per hospital admission"),
    scalar("utility_background", -1.0, 1.0, &[0.85], "utility at zero severity"),
    scalar("utility_severity_decrement", 0.0, 10.0, &[0.05], "utility lost per severity unit"),
    scalar("discount_rate", 0.0, 1.0, &[0.03], "annual continuous discount rate"),
];

fn find_spec(table: &'static [KeySpec], name: &str) -> Option<&'static KeySpec> {
    table.iter().find(|spec| spec.name == name)
}

/// Scalar under `name`, falling back to the key's default
fn lookup_scalar(
    map: &BTreeMap<String, ConfigValue>,
    table: &'static [KeySpec],
    name: &str,
) -> f64 {
    map.get(name)
        .and_then(ConfigValue::as_scalar)
        .or_else(|| find_spec(table, name).map(|spec| spec.default[0]))
        .unwrap_or(0.0)
}

fn default_value(spec: &KeySpec) -> ConfigValue {
    match spec.shape {
        ValueShape::Vector(_) => ConfigValue::Vector(spec.default.to_vec()),
        _ => ConfigValue::Scalar(spec.default[0]),
    }
}

fn validate(spec: &KeySpec, value: &ConfigValue) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidParameter {
        key: spec.name.to_string(),
        reason,
    };

    match (spec.shape, value) {
        (ValueShape::Scalar { min, max }, ConfigValue::Scalar(v)) => {
            if !v.is_finite() {
                return Err(invalid(format!("{} is not finite", v)));
            }
            if *v < min || *v > max {
                return Err(invalid(format!("{} outside [{}, {}]", v, min, max)));
            }
            Ok(())
        }
        (ValueShape::Count { min, max }, ConfigValue::Scalar(v)) => {
            if !v.is_finite() || v.fract() != 0.0 {
                return Err(invalid(format!("{} is not an integer", v)));
            }
            if *v < min || *v > max {
                return Err(invalid(format!("{} outside [{}, {}]", v, min, max)));
            }
            Ok(())
        }
        (ValueShape::Vector(len), ConfigValue::Vector(values)) => {
            if values.len() != len {
                return Err(invalid(format!(
                    "expected a vector of length {}, got {}",
                    len,
                    values.len()
                )));
            }
            if values.iter().any(|v| !v.is_finite()) {
                return Err(invalid("vector contains non-finite values".to_string()));
            }
            Ok(())
        }
        (ValueShape::Vector(len), ConfigValue::Scalar(_)) => Err(invalid(format!(
            "expected a vector of length {}, got a scalar",
            len
        ))),
        (_, ConfigValue::Vector(_)) => Err(invalid("expected a scalar, got a vector".to_string())),
    }
}

/// Key-addressable inputs and settings
///
/// Deserializes through [`ConfigFile`], so every stored value has passed
/// the same validation as `set_input`/`set_setting`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ConfigFile")]
pub struct ConfigStore {
    inputs: BTreeMap<String, ConfigValue>,
    settings: BTreeMap<String, ConfigValue>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self {
            inputs: INPUT_KEYS
                .iter()
                .map(|spec| (spec.name.to_string(), default_value(spec)))
                .collect(),
            settings: SETTING_KEYS
                .iter()
                .map(|spec| (spec.name.to_string(), default_value(spec)))
                .collect(),
        }
    }
}

impl ConfigStore {
    /// Store populated with every key's default
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a model input
    ///
    /// # Errors
    /// `UnknownKey` if `name` is not an input; `InvalidParameter` if the
    /// value has the wrong shape or range.
    pub fn set_input(&mut self, name: &str, value: ConfigValue) -> Result<(), ConfigError> {
        let spec =
            find_spec(INPUT_KEYS, name).ok_or_else(|| ConfigError::UnknownKey(name.to_string()))?;
        validate(spec, &value)?;

        if spec.name == "baseline_cov" {
            if let ConfigValue::Vector(values) = &value {
                check_symmetric(values)?;
            }
        }

        self.inputs.insert(spec.name.to_string(), value);
        Ok(())
    }

    /// Set a run setting
    ///
    /// # Errors
    /// `UnknownKey` if `name` is not a setting; `InvalidParameter` if the
    /// value has the wrong shape or range.
    pub fn set_setting(&mut self, name: &str, value: ConfigValue) -> Result<(), ConfigError> {
        let spec = find_spec(SETTING_KEYS, name)
            .ok_or_else(|| ConfigError::UnknownKey(name.to_string()))?;
        validate(spec, &value)?;
        self.settings.insert(spec.name.to_string(), value);
        Ok(())
    }

    /// All inputs by name
    pub fn inputs(&self) -> &BTreeMap<String, ConfigValue> {
        &self.inputs
    }

    /// All settings by name
    pub fn settings(&self) -> &BTreeMap<String, ConfigValue> {
        &self.settings
    }

    fn vector(&self, name: &str) -> Vec<f64> {
        self.inputs
            .get(name)
            .and_then(ConfigValue::as_vector)
            .map(<[f64]>::to_vec)
            .or_else(|| find_spec(INPUT_KEYS, name).map(|spec| spec.default.to_vec()))
            .unwrap_or_default()
    }

    /// Typed snapshot of the settings
    pub fn run_settings(&self) -> RunSettings {
        let s = |name: &str| lookup_scalar(&self.settings, SETTING_KEYS, name);
        RunSettings {
            population_size: s("population_size") as usize,
            horizon_years: s("horizon_years"),
            seed: s("seed") as u64,
            record_mode: RecordMode::from_code(s("record_mode") as u8),
            agent_capacity: s("agent_capacity") as usize,
            event_capacity: s("event_capacity") as usize,
            max_events_per_agent: s("max_events_per_agent") as usize,
        }
    }

    /// Typed snapshot of the inputs
    pub fn model_inputs(&self) -> ModelInputs {
        let s = |name: &str| lookup_scalar(&self.inputs, INPUT_KEYS, name);

        let mean = self.vector("baseline_mean");
        let flat_cov = self.vector("baseline_cov");
        let baseline_cov = flat_cov
            .chunks(BASELINE_DIM)
            .map(<[f64]>::to_vec)
            .collect();

        ModelInputs {
            baseline_mean: mean,
            baseline_cov,
            p_male: s("p_male"),
            p_smoker: s("p_smoker"),
            exacerbation_rate: s("exacerbation_rate"),
            exacerbation_severity_coeff: s("exacerbation_severity_coeff"),
            exacerbation_smoker_coeff: s("exacerbation_smoker_coeff"),
            p_severe_exacerbation: s("p_severe_exacerbation"),
            hospital_stay_years: s("hospital_stay_years"),
            hospital_capacity: s("hospital_capacity") as usize,
            mortality_base_rate: s("mortality_base_rate"),
            mortality_age_coeff: s("mortality_age_coeff"),
            mortality_severity_coeff: s("mortality_severity_coeff"),
            p_death_severe_exacerbation: s("p_death_severe_exacerbation"),
            blocked_mortality_multiplier: s("blocked_mortality_multiplier"),
            smoking_cessation_rate: s("smoking_cessation_rate"),
            severity_progression_rate: s("severity_progression_rate"),
            cost_background: s("cost_background"),
            cost_exacerbation: s("cost_exacerbation"),
            cost_admission: s("cost_admission"),
            utility_background: s("utility_background"),
            utility_severity_decrement: s("utility_severity_decrement"),
            discount_rate: s("discount_rate"),
        }
    }

    /// SHA-256 of the canonical JSON form of every input and setting
    ///
    /// Two stores with the same values always produce the same fingerprint;
    /// `BTreeMap` keeps the key order canonical.
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Apply every entry of a configuration file
    ///
    /// Stops at the first rejected entry.
    pub fn apply(&mut self, file: &ConfigFile) -> Result<(), ConfigError> {
        for (name, value) in &file.settings {
            self.set_setting(name, value.clone())?;
        }
        for (name, value) in &file.inputs {
            self.set_input(name, value.clone())?;
        }
        Ok(())
    }
}

impl TryFrom<ConfigFile> for ConfigStore {
    type Error = ConfigError;

    fn try_from(file: ConfigFile) -> Result<Self, Self::Error> {
        let mut store = Self::default();
        store.apply(&file)?;
        Ok(store)
    }
}

fn check_symmetric(flat: &[f64]) -> Result<(), ConfigError> {
    for i in 0..BASELINE_DIM {
        for j in (i + 1)..BASELINE_DIM {
            let a = flat[i * BASELINE_DIM + j];
            let b = flat[j * BASELINE_DIM + i];
            if (a - b).abs() > 1e-9 * a.abs().max(b.abs()).max(1.0) {
                return Err(ConfigError::InvalidParameter {
                    key: "baseline_cov".to_string(),
                    reason: format!("matrix is not symmetric at ({}, {})", i, j),
                });
            }
        }
    }
    Ok(())
}

/// Partial configuration as read from a JSON file
///
/// ```json
/// { "settings": { "population_size": 500, "seed": 42 },
///   "inputs": { "hospital_capacity": 10 } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub inputs: BTreeMap<String, ConfigValue>,
    #[serde(default)]
    pub settings: BTreeMap<String, ConfigValue>,
}

/// What the event log keeps during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordMode {
    /// Nothing is recorded; outputs come from agent tallies
    None,
    /// Start, Death and End only
    Milestones,
    /// Every realized event
    All,
}

impl RecordMode {
    fn from_code(code: u8) -> Self {
        match code {
            0 => RecordMode::None,
            1 => RecordMode::Milestones,
            _ => RecordMode::All,
        }
    }
}

/// Typed view of the run settings
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub population_size: usize,
    pub horizon_years: f64,
    pub seed: u64,
    pub record_mode: RecordMode,
    pub agent_capacity: usize,
    pub event_capacity: usize,
    pub max_events_per_agent: usize,
}

/// Typed view of the model inputs
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInputs {
    pub baseline_mean: Vec<f64>,
    pub baseline_cov: Vec<Vec<f64>>,
    pub p_male: f64,
    pub p_smoker: f64,
    pub exacerbation_rate: f64,
    pub exacerbation_severity_coeff: f64,
    pub exacerbation_smoker_coeff: f64,
    pub p_severe_exacerbation: f64,
    pub hospital_stay_years: f64,
    pub hospital_capacity: usize,
    pub mortality_base_rate: f64,
    pub mortality_age_coeff: f64,
    pub mortality_severity_coeff: f64,
    pub p_death_severe_exacerbation: f64,
    pub blocked_mortality_multiplier: f64,
    pub smoking_cessation_rate: f64,
    pub severity_progression_rate: f64,
    pub cost_background: f64,
    pub cost_exacerbation: f64,
    pub cost_admission: f64,
    pub utility_background: f64,
    pub utility_severity_decrement: f64,
    pub discount_rate: f64,
}
