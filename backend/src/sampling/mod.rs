//! Statistical sampling routines
//!
//! Every stochastic component draws through these functions:
//!
//! - **Multivariate normal**: correlated baseline attributes (age,
//!   severity, BMI) via a Cholesky factor of the covariance matrix
//! - **Exponential**: time-to-event draws with a log-hazard-ratio transform
//!   and an optional shift
//! - **Bernoulli**: binary attributes and event branching
//!
//! All inputs are validated before the first draw, so a rejected call never
//! advances the random stream.

use crate::rng::RngManager;
use rand::Rng;
use rand_distr::{Distribution, Exp, StandardNormal};
use thiserror::Error;

/// Relative tolerance for symmetry checks and zero pivots
const PSD_TOLERANCE: f64 = 1e-9;

/// Most values a single sampler call may return
///
/// For multivariate draws this bounds `count × dimension`. Checked before
/// anything is allocated.
pub const MAX_DRAWS: usize = 10_000_000;

/// Errors raised by the sampler
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SamplerError {
    #[error("Invalid covariance matrix: {0}")]
    InvalidCovariance(String),

    #[error("Invalid sampling parameter: {0}")]
    InvalidParameter(String),
}

/// Lower-triangular Cholesky factor of a covariance matrix
#[derive(Debug, Clone, PartialEq)]
pub struct CholeskyFactor {
    dim: usize,
    /// Row-major `dim × dim`, zero above the diagonal
    lower: Vec<f64>,
}

impl CholeskyFactor {
    /// Decompose a positive semi-definite matrix
    ///
    /// Zero pivots (within tolerance) are accepted and produce a zero
    /// column, which covers degenerate dimensions such as a fixed
    /// attribute with zero variance.
    ///
    /// # Errors
    /// `InvalidCovariance` if the matrix is empty, non-square, asymmetric,
    /// non-finite, or not positive semi-definite.
    pub fn decompose(covariance: &[Vec<f64>]) -> Result<Self, SamplerError> {
        let dim = covariance.len();
        if dim == 0 {
            return Err(SamplerError::InvalidCovariance(
                "matrix is empty".to_string(),
            ));
        }
        for (i, row) in covariance.iter().enumerate() {
            if row.len() != dim {
                return Err(SamplerError::InvalidCovariance(format!(
                    "row {} has {} columns, expected {}",
                    i,
                    row.len(),
                    dim
                )));
            }
            if let Some(j) = row.iter().position(|v| !v.is_finite()) {
                return Err(SamplerError::InvalidCovariance(format!(
                    "entry ({}, {}) is not finite",
                    i, j
                )));
            }
        }

        let scale = covariance
            .iter()
            .flat_map(|row| row.iter())
            .fold(0.0_f64, |acc, v| acc.max(v.abs()))
            .max(1.0);

        for i in 0..dim {
            for j in (i + 1)..dim {
                if (covariance[i][j] - covariance[j][i]).abs() > PSD_TOLERANCE * scale {
                    return Err(SamplerError::InvalidCovariance(format!(
                        "matrix is not symmetric at ({}, {})",
                        i, j
                    )));
                }
            }
        }

        let mut lower = vec![0.0; dim * dim];
        for j in 0..dim {
            let mut pivot = covariance[j][j];
            for k in 0..j {
                pivot -= lower[j * dim + k] * lower[j * dim + k];
            }

            if pivot < -PSD_TOLERANCE * scale {
                return Err(SamplerError::InvalidCovariance(format!(
                    "matrix is not positive semi-definite (pivot {} = {:e})",
                    j, pivot
                )));
            }

            if pivot <= PSD_TOLERANCE * scale {
                // Degenerate direction: the column stays zero
                continue;
            }

            let diag = pivot.sqrt();
            lower[j * dim + j] = diag;
            for i in (j + 1)..dim {
                let mut sum = covariance[i][j];
                for k in 0..j {
                    sum -= lower[i * dim + k] * lower[j * dim + k];
                }
                lower[i * dim + j] = sum / diag;
            }
        }

        Ok(Self { dim, lower })
    }

    /// Matrix dimension
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Entry `(row, col)` of the lower factor
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.lower[row * self.dim + col]
    }

    /// Draw one vector from N(mean, L Lᵀ)
    fn draw(&self, mean: &[f64], rng: &mut RngManager) -> Vec<f64> {
        let z: Vec<f64> = (0..self.dim)
            .map(|_| rng.sample::<f64, _>(StandardNormal))
            .collect();

        (0..self.dim)
            .map(|i| {
                let row = &self.lower[i * self.dim..i * self.dim + i + 1];
                mean[i] + row.iter().zip(&z).map(|(l, zk)| l * zk).sum::<f64>()
            })
            .collect()
    }
}

/// Draw `count` independent vectors from N(mean, covariance)
///
/// Returns a `count × n` matrix (one row per draw).
///
/// # Errors
/// `InvalidCovariance` if the covariance is not a valid PSD matrix of the
/// mean's dimension; `InvalidParameter` for a non-finite mean or when
/// `count × n` exceeds [`MAX_DRAWS`]. The random stream is untouched on
/// error.
///
/// # Example
/// ```
/// use hemsim_core::{sampling, RngManager};
///
/// let mut rng = RngManager::new(42);
/// let draws = sampling::sample_multivariate_normal(
///     &mut rng,
///     &[0.0, 10.0],
///     &[vec![1.0, 0.5], vec![0.5, 2.0]],
///     5,
/// )
/// .unwrap();
/// assert_eq!(draws.len(), 5);
/// assert_eq!(draws[0].len(), 2);
/// ```
pub fn sample_multivariate_normal(
    rng: &mut RngManager,
    mean: &[f64],
    covariance: &[Vec<f64>],
    count: usize,
) -> Result<Vec<Vec<f64>>, SamplerError> {
    if mean.iter().any(|m| !m.is_finite()) {
        return Err(SamplerError::InvalidParameter(
            "mean vector contains non-finite values".to_string(),
        ));
    }
    let factor = CholeskyFactor::decompose(covariance)?;
    if factor.dim() != mean.len() {
        return Err(SamplerError::InvalidCovariance(format!(
            "covariance is {}x{} but mean has length {}",
            factor.dim(),
            factor.dim(),
            mean.len()
        )));
    }
    check_draw_count(count, factor.dim())?;

    Ok((0..count).map(|_| factor.draw(mean, rng)).collect())
}

/// Parameters of a transformed exponential draw
///
/// `shift + Exp(rate * exp(log_hazard_ratio))`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialParams {
    pub rate: f64,
    pub log_hazard_ratio: f64,
    pub shift: f64,
}

impl ExponentialParams {
    /// Parse `[rate]`, `[rate, log_hazard_ratio]` or
    /// `[rate, log_hazard_ratio, shift]`
    pub fn from_slice(params: &[f64]) -> Result<Self, SamplerError> {
        let (rate, log_hazard_ratio, shift) = match *params {
            [rate] => (rate, 0.0, 0.0),
            [rate, lhr] => (rate, lhr, 0.0),
            [rate, lhr, shift] => (rate, lhr, shift),
            _ => {
                return Err(SamplerError::InvalidParameter(format!(
                    "expected 1 to 3 parameters (rate, log hazard ratio, shift), got {}",
                    params.len()
                )))
            }
        };

        let parsed = Self {
            rate,
            log_hazard_ratio,
            shift,
        };
        parsed.validate()?;
        Ok(parsed)
    }

    /// Hazard after applying the log-hazard-ratio transform
    pub fn effective_rate(&self) -> f64 {
        self.rate * self.log_hazard_ratio.exp()
    }

    fn validate(&self) -> Result<(), SamplerError> {
        if !(self.rate > 0.0) || !self.rate.is_finite() {
            return Err(SamplerError::InvalidParameter(format!(
                "rate must be positive and finite, got {}",
                self.rate
            )));
        }
        if !self.log_hazard_ratio.is_finite() {
            return Err(SamplerError::InvalidParameter(format!(
                "log hazard ratio must be finite, got {}",
                self.log_hazard_ratio
            )));
        }
        let effective = self.effective_rate();
        if !(effective > 0.0) || !effective.is_finite() {
            return Err(SamplerError::InvalidParameter(format!(
                "effective rate {} is not positive and finite",
                effective
            )));
        }
        if !(self.shift >= 0.0) || !self.shift.is_finite() {
            return Err(SamplerError::InvalidParameter(format!(
                "shift must be non-negative and finite, got {}",
                self.shift
            )));
        }
        Ok(())
    }
}

/// Draw `count` transformed exponential variates
///
/// # Errors
/// `InvalidParameter` if the parameter vector is malformed (see
/// [`ExponentialParams::from_slice`]) or `count` exceeds [`MAX_DRAWS`].
/// The random stream is untouched on error.
///
/// # Example
/// ```
/// use hemsim_core::{sampling, RngManager};
///
/// let mut rng = RngManager::new(42);
/// let draws = sampling::sample_exponential(&mut rng, &[2.0, 0.0, 1.0], 100).unwrap();
/// assert!(draws.iter().all(|t| *t >= 1.0));
/// ```
pub fn sample_exponential(
    rng: &mut RngManager,
    params: &[f64],
    count: usize,
) -> Result<Vec<f64>, SamplerError> {
    let params = ExponentialParams::from_slice(params)?;
    check_draw_count(count, 1)?;
    let exp = Exp::new(params.effective_rate())
        .map_err(|e| SamplerError::InvalidParameter(format!("{:?}", e)))?;

    Ok((0..count).map(|_| params.shift + exp.sample(rng)).collect())
}

fn check_draw_count(count: usize, dim: usize) -> Result<(), SamplerError> {
    match count.checked_mul(dim) {
        Some(total) if total <= MAX_DRAWS => Ok(()),
        _ => Err(SamplerError::InvalidParameter(format!(
            "{} draws of dimension {} exceed the limit of {} values",
            count, dim, MAX_DRAWS
        ))),
    }
}

/// Time to an event with the given hazard
///
/// Returns `None` for a zero hazard (the event never happens). Callers in
/// the engine treat a non-finite hazard as divergence before calling this.
pub fn time_to_event(rng: &mut RngManager, hazard: f64) -> Option<f64> {
    if hazard <= 0.0 {
        return None;
    }
    let exp = Exp::new(hazard).ok()?;
    Some(exp.sample(rng))
}

/// Bernoulli draw with success probability `p` (clamped to [0, 1])
pub fn sample_bernoulli(rng: &mut RngManager, p: f64) -> bool {
    rng.next_f64() < p.clamp(0.0, 1.0)
}
