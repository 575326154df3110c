//! Agent store
//!
//! Owns every agent of a session. Agents are created in bulk from the
//! configured baseline distributions and live until the session is reset
//! or torn down.
//!
//! # Critical Invariants
//!
//! 1. **Dense identity**: agent `i` is stored at index `i`, ids are `0..len`
//! 2. **Fixed population**: no agent is added or removed once populated

use crate::config::ModelInputs;
use crate::models::agent::{Agent, Baseline};
use crate::rng::RngManager;
use crate::sampling::{self, SamplerError};

/// Age bounds applied to sampled baselines
const MIN_AGE: f64 = 18.0;
const MAX_AGE: f64 = 110.0;
/// Lower BMI bound applied to sampled baselines
const MIN_BMI: f64 = 10.0;

/// Container for all agents of a session
#[derive(Debug, Clone, Default)]
pub struct AgentStore {
    agents: Vec<Agent>,
}

impl AgentStore {
    pub fn new() -> Self {
        Self { agents: Vec::new() }
    }

    /// Draw `count` agents from the baseline distributions
    ///
    /// Age, severity and BMI are drawn jointly from the configured
    /// multivariate normal (then clamped to plausible ranges); sex and
    /// smoking are Bernoulli draws.
    ///
    /// # Errors
    /// `SamplerError` if the configured baseline covariance is invalid. The
    /// store and the random stream are untouched in that case.
    pub fn populate(
        &mut self,
        count: usize,
        inputs: &ModelInputs,
        rng: &mut RngManager,
    ) -> Result<usize, SamplerError> {
        let draws = sampling::sample_multivariate_normal(
            rng,
            &inputs.baseline_mean,
            &inputs.baseline_cov,
            count,
        )?;

        self.agents.reserve(count);
        for (offset, draw) in draws.into_iter().enumerate() {
            let male = sampling::sample_bernoulli(rng, inputs.p_male);
            let smoker = sampling::sample_bernoulli(rng, inputs.p_smoker);
            let baseline = Baseline {
                age: draw[0].clamp(MIN_AGE, MAX_AGE),
                male,
                smoker,
                severity: draw[1].max(0.0),
                bmi: draw[2].max(MIN_BMI),
            };
            let id = self.agents.len();
            debug_assert_eq!(id, offset);
            self.agents.push(Agent::new(id, baseline));
        }

        Ok(count)
    }

    /// Get an agent by id
    pub fn get(&self, id: usize) -> Option<&Agent> {
        self.agents.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: usize) -> Option<&mut Agent> {
        self.agents.get_mut(id)
    }

    /// Number of agents
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Iterate over agents in id order
    pub fn iter(&self) -> impl Iterator<Item = &Agent> {
        self.agents.iter()
    }

    /// Agents counted in aggregate output
    pub fn reportable(&self) -> impl Iterator<Item = &Agent> {
        self.agents.iter().filter(|a| a.is_reportable())
    }

    /// Remove every agent
    pub fn clear(&mut self) {
        self.agents.clear();
    }
}
