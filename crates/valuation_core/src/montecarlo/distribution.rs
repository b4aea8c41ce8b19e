//! Marginal distributions for uncertain parameters

use rand::Rng;
use rand::distr::{Distribution, Uniform};
use rand_distr::{LogNormal, Normal, Triangular};
use serde::{Deserialize, Serialize};

use crate::error::DistributionError;

/// Marginal distribution of one uncertain parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Marginal {
    /// Always the same value
    Fixed { value: f64 },
    Uniform { min: f64, max: f64 },
    /// The usual choice: `min = low`, `mode = base`, `max = high`
    Triangular { min: f64, mode: f64, max: f64 },
    Normal { mean: f64, std_dev: f64 },
    /// `exp(N(mu, sigma))`
    LogNormal { mu: f64, sigma: f64 },
}

fn invalid(distribution: &'static str, reason: &'static str) -> DistributionError {
    DistributionError::InvalidParameters {
        distribution,
        reason,
    }
}

impl Marginal {
    #[must_use]
    pub fn triangular(min: f64, mode: f64, max: f64) -> Self {
        Marginal::Triangular { min, mode, max }
    }

    pub fn validate(&self) -> Result<(), DistributionError> {
        match *self {
            Marginal::Fixed { value } if !value.is_finite() => {
                Err(invalid("Fixed", "value must be finite"))
            }
            Marginal::Uniform { min, max } if !(min.is_finite() && max.is_finite() && min <= max) => {
                Err(invalid("Uniform", "bounds must be finite with min <= max"))
            }
            Marginal::Triangular { min, mode, max }
                if !(min.is_finite() && max.is_finite() && min <= mode && mode <= max) =>
            {
                Err(invalid("Triangular", "bounds must be finite with min <= mode <= max"))
            }
            Marginal::Normal { mean, std_dev }
                if !(mean.is_finite() && std_dev.is_finite() && std_dev >= 0.0) =>
            {
                Err(invalid("Normal", "std_dev must be non-negative and finite"))
            }
            Marginal::LogNormal { mu, sigma }
                if !(mu.is_finite() && sigma.is_finite() && sigma >= 0.0) =>
            {
                Err(invalid("LogNormal", "sigma must be non-negative and finite"))
            }
            _ => Ok(()),
        }
    }

    /// Draw `n` independent values
    pub fn sample_n<R: Rng + ?Sized>(&self, rng: &mut R, n: usize) -> Result<Vec<f64>, DistributionError> {
        self.validate()?;
        let values = match *self {
            Marginal::Fixed { value } => vec![value; n],
            Marginal::Uniform { min, max } if min == max => vec![min; n],
            Marginal::Uniform { min, max } => {
                let d = Uniform::new_inclusive(min, max)
                    .map_err(|_| invalid("Uniform", "bounds must be finite with min <= max"))?;
                (0..n).map(|_| d.sample(rng)).collect()
            }
            Marginal::Triangular { min, max, .. } if min == max => vec![min; n],
            Marginal::Triangular { min, mode, max } => {
                let d = Triangular::new(min, max, mode).map_err(|_| {
                    invalid("Triangular", "bounds must be finite with min <= mode <= max")
                })?;
                (0..n).map(|_| d.sample(rng)).collect()
            }
            Marginal::Normal { mean, std_dev } => {
                let d = Normal::new(mean, std_dev)
                    .map_err(|_| invalid("Normal", "std_dev must be non-negative and finite"))?;
                (0..n).map(|_| d.sample(rng)).collect()
            }
            Marginal::LogNormal { mu, sigma } => {
                let d = LogNormal::new(mu, sigma)
                    .map_err(|_| invalid("LogNormal", "sigma must be non-negative and finite"))?;
                (0..n).map(|_| d.sample(rng)).collect()
            }
        };
        Ok(values)
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64, DistributionError> {
        let mut values = self.sample_n(rng, 1)?;
        values.pop().ok_or_else(|| invalid("Marginal", "no value drawn"))
    }
}
