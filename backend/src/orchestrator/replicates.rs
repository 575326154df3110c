//! Probabilistic sensitivity analysis
//!
//! Samples the distribution of one output statistic by running `n`
//! independent replicate sessions. Replicate `i` is seeded with
//! `base_seed + i` (wrapping) and runs a copy of the caller's configuration
//! with event recording disabled. Replicates own all of their stores, so the
//! calling session is never touched. At most [`MAX_REPLICATES`] replicates
//! run per call.

use crate::config::{ConfigStore, ConfigValue};
use crate::orchestrator::output::Output;
use crate::orchestrator::session::{RunParams, Session, SessionError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Most replicates a single call may request
pub const MAX_REPLICATES: usize = 100_000;

/// Statistic read from each replicate's [`Output`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStatistic {
    MeanCost,
    MeanQaly,
    TotalCost,
    TotalQaly,
    Deaths,
    Exacerbations,
    SevereExacerbations,
    Admissions,
    BlockedAdmissions,
    MortalityRate,
    ExacerbationRate,
    BedUtilization,
    PersonYears,
}

impl OutputStatistic {
    pub const ALL: [OutputStatistic; 13] = [
        OutputStatistic::MeanCost,
        OutputStatistic::MeanQaly,
        OutputStatistic::TotalCost,
        OutputStatistic::TotalQaly,
        OutputStatistic::Deaths,
        OutputStatistic::Exacerbations,
        OutputStatistic::SevereExacerbations,
        OutputStatistic::Admissions,
        OutputStatistic::BlockedAdmissions,
        OutputStatistic::MortalityRate,
        OutputStatistic::ExacerbationRate,
        OutputStatistic::BedUtilization,
        OutputStatistic::PersonYears,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OutputStatistic::MeanCost => "mean_cost",
            OutputStatistic::MeanQaly => "mean_qaly",
            OutputStatistic::TotalCost => "total_cost",
            OutputStatistic::TotalQaly => "total_qaly",
            OutputStatistic::Deaths => "deaths",
            OutputStatistic::Exacerbations => "exacerbations",
            OutputStatistic::SevereExacerbations => "severe_exacerbations",
            OutputStatistic::Admissions => "admissions",
            OutputStatistic::BlockedAdmissions => "blocked_admissions",
            OutputStatistic::MortalityRate => "mortality_rate",
            OutputStatistic::ExacerbationRate => "exacerbation_rate",
            OutputStatistic::BedUtilization => "bed_utilization",
            OutputStatistic::PersonYears => "person_years",
        }
    }

    /// Read the statistic from a summary
    pub fn value(self, output: &Output) -> f64 {
        match self {
            OutputStatistic::MeanCost => output.mean_cost,
            OutputStatistic::MeanQaly => output.mean_qaly,
            OutputStatistic::TotalCost => output.total_cost,
            OutputStatistic::TotalQaly => output.total_qaly,
            OutputStatistic::Deaths => output.n_deaths as f64,
            OutputStatistic::Exacerbations => output.n_exacerbations as f64,
            OutputStatistic::SevereExacerbations => output.n_severe_exacerbations as f64,
            OutputStatistic::Admissions => output.n_admissions as f64,
            OutputStatistic::BlockedAdmissions => output.n_blocked_admissions as f64,
            OutputStatistic::MortalityRate => output.mortality_rate,
            OutputStatistic::ExacerbationRate => output.exacerbation_rate,
            OutputStatistic::BedUtilization => output.bed_utilization,
            OutputStatistic::PersonYears => output.person_years,
        }
    }
}

impl fmt::Display for OutputStatistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OutputStatistic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        OutputStatistic::ALL
            .iter()
            .copied()
            .find(|stat| stat.name() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = OutputStatistic::ALL.iter().map(|s| s.name()).collect();
                format!("unknown statistic '{}' (expected one of {})", s, known.join(", "))
            })
    }
}

/// What to sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSpec {
    pub statistic: OutputStatistic,

    /// First replicate seed; defaults to the `seed` setting
    #[serde(default)]
    pub base_seed: Option<u64>,
}

impl SampleSpec {
    pub fn new(statistic: OutputStatistic) -> Self {
        Self {
            statistic,
            base_seed: None,
        }
    }

    pub fn with_base_seed(mut self, seed: u64) -> Self {
        self.base_seed = Some(seed);
        self
    }
}

/// Sampled distribution of one statistic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleOutput {
    pub statistic: OutputStatistic,
    pub seeds: Vec<u64>,
    pub values: Vec<f64>,
    pub mean: f64,
    /// Sample standard deviation (zero for a single replicate)
    pub sd: f64,
    pub p2_5: f64,
    pub p50: f64,
    pub p97_5: f64,
}

/// Run `n` replicates of `config` and summarise `spec.statistic`
pub fn sample_output(
    config: &ConfigStore,
    spec: &SampleSpec,
    n: usize,
) -> Result<SampleOutput, SessionError> {
    if n == 0 {
        return Err(SessionError::InvalidParameter(
            "number of replicates must be positive".to_string(),
        ));
    }
    if n > MAX_REPLICATES {
        return Err(SessionError::InvalidParameter(format!(
            "{} replicates requested, the limit is {}",
            n, MAX_REPLICATES
        )));
    }

    let mut replicate_config = config.clone();
    replicate_config.set_setting("record_mode", ConfigValue::Scalar(0.0))?;
    let base_seed = spec
        .base_seed
        .unwrap_or_else(|| config.run_settings().seed);

    info!(
        statistic = %spec.statistic,
        replicates = n,
        base_seed,
        "sampling output distribution"
    );

    let mut seeds = Vec::with_capacity(n);
    let mut values = Vec::with_capacity(n);
    for i in 0..n {
        let seed = base_seed.wrapping_add(i as u64);
        let output = run_replicate(&replicate_config, seed)?;
        let value = spec.statistic.value(&output);
        debug!(replicate = i, seed, value, "replicate finished");
        seeds.push(seed);
        values.push(value);
    }

    let (mean, sd) = mean_sd(&values);
    let mut sorted = values.clone();
    sorted.sort_by(f64::total_cmp);

    Ok(SampleOutput {
        statistic: spec.statistic,
        seeds,
        mean,
        sd,
        p2_5: quantile(&sorted, 0.025),
        p50: quantile(&sorted, 0.5),
        p97_5: quantile(&sorted, 0.975),
        values,
    })
}

fn run_replicate(config: &ConfigStore, seed: u64) -> Result<Output, SessionError> {
    let mut session = Session::with_config(config.clone());
    session.init_session();
    session.reseed(seed);
    session.allocate_resources()?;
    session.create_agents()?;
    session.model(RunParams::default())?;
    let output = session.get_output();
    session.deallocate_resources();
    output
}

fn mean_sd(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}

/// Linear-interpolation quantile of sorted values
fn quantile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        len => {
            let pos = q * (len - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
        }
    }
}
