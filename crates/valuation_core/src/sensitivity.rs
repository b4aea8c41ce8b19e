//! One-way sensitivity analysis
//!
//! Each parameter is moved to its low and then its high bound with every
//! other parameter held at base, and the full pipeline is re-run for each
//! variant. Variants are built with [`Configuration::with_override`], so the
//! base configuration is never touched; the sweep proves it by comparing the
//! base fingerprint before and after.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use crate::compare::{BenefitCostRatio, IncrementalResult};
use crate::config::Configuration;
use crate::error::{Result, ValuationError};
use crate::evaluator::ScenarioEvaluator;
use crate::model::{ParamKey, ScenarioId};
use crate::montecarlo::Marginal;
use crate::pipeline::{PipelineOutput, ValuationPipeline};
use crate::progress::RunProgress;

/// Relative gap tolerated between a declared base and the configuration value
const BASE_TOLERANCE: f64 = 1e-9;

/// An uncertain parameter with its tested range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityParameter {
    pub key: ParamKey,
    #[serde(default)]
    pub label: Option<String>,
    pub base: f64,
    pub low: f64,
    pub high: f64,
    #[serde(default)]
    pub unit: Option<String>,
    /// Monte Carlo marginal; triangular over `[low, base, high]` when absent
    #[serde(default)]
    pub distribution: Option<Marginal>,
}

impl SensitivityParameter {
    pub fn new(key: impl Into<ParamKey>, base: f64, low: f64, high: f64) -> Self {
        Self {
            key: key.into(),
            label: None,
            base,
            low,
            high,
            unit: None,
            distribution: None,
        }
    }

    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    #[must_use]
    pub fn distribution(mut self, marginal: Marginal) -> Self {
        self.distribution = Some(marginal);
        self
    }

    /// Distribution used when this parameter is sampled
    #[must_use]
    pub fn marginal(&self) -> Marginal {
        self.distribution
            .unwrap_or(Marginal::triangular(self.low, self.base, self.high))
    }

    /// Derived fields recomputed when this parameter changes
    #[must_use]
    pub fn mutation_rule<'c>(&self, config: &'c Configuration) -> Vec<&'c ParamKey> {
        config.dependents_of(&self.key)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.low.is_finite() && self.high.is_finite() && self.base.is_finite()) {
            return Err(ValuationError::InvalidInput(format!(
                "sensitivity bounds of '{}' must be finite",
                self.key
            )));
        }
        if self.low > self.high {
            return Err(ValuationError::InvalidInput(format!(
                "low bound {} of '{}' exceeds high bound {}",
                self.low, self.key, self.high
            )));
        }
        Ok(())
    }
}

/// Metrics of one alternative at one tested value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensitivityPoint {
    pub value: f64,
    pub npv: f64,
    pub bcr: BenefitCostRatio,
    pub irr: Option<f64>,
}

impl SensitivityPoint {
    fn from_comparison(value: f64, comparison: &IncrementalResult) -> Self {
        Self {
            value,
            npv: comparison.npv,
            bcr: comparison.bcr,
            irr: comparison.irr,
        }
    }
}

/// One parameter against one (alternative, baseline) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityRow {
    pub parameter: ParamKey,
    pub label: Option<String>,
    pub unit: Option<String>,
    pub alternative: ScenarioId,
    pub baseline: ScenarioId,
    pub base: SensitivityPoint,
    pub low: SensitivityPoint,
    pub high: SensitivityPoint,
}

impl SensitivityRow {
    /// `(value, npv)` at the tested values, ordered by value. The configured
    /// base is included only when it lies within `[low, high]`.
    #[must_use]
    pub fn npv_points(&self) -> Vec<(f64, f64)> {
        let mut points = vec![(self.low.value, self.low.npv), (self.high.value, self.high.npv)];
        if (self.low.value..=self.high.value).contains(&self.base.value) {
            points.push((self.base.value, self.base.npv));
        }
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        points
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityTable {
    /// Fingerprint of the base configuration, identical before and after
    pub base_fingerprint: u64,
    pub rows: Vec<SensitivityRow>,
}

impl SensitivityTable {
    #[must_use]
    pub fn row(&self, parameter: &ParamKey, alternative: &ScenarioId) -> Option<&SensitivityRow> {
        self.rows
            .iter()
            .find(|r| &r.parameter == parameter && &r.alternative == alternative)
    }

    /// Parameters in first-appearance order
    #[must_use]
    pub fn parameters(&self) -> Vec<&ParamKey> {
        let mut keys: Vec<&ParamKey> = Vec::new();
        for row in &self.rows {
            if !keys.contains(&&row.parameter) {
                keys.push(&row.parameter);
            }
        }
        keys
    }
}

/// Pipeline outputs for one parameter at its three tested values
struct ParameterSweep {
    base_value: f64,
    low: PipelineOutput,
    high: PipelineOutput,
}

/// Run the one-way sweep over `parameters`.
///
/// Fails if any variant fails, if `progress` is cancelled, or if the base
/// configuration's fingerprint changes during the sweep.
pub fn run_sensitivity<E: ScenarioEvaluator + ?Sized>(
    pipeline: &ValuationPipeline<'_, E>,
    base: &Configuration,
    parameters: &[SensitivityParameter],
    progress: Option<&RunProgress>,
) -> Result<SensitivityTable> {
    let _span = info_span!("sensitivity", parameters = parameters.len()).entered();
    let before = base.fingerprint();

    for param in parameters {
        param.validate()?;
    }
    if let Some(progress) = progress {
        progress.reset(parameters.len());
    }

    let base_output = pipeline.run(base)?;

    let sweep_one = |param: &SensitivityParameter| -> Result<ParameterSweep> {
        if progress.is_some_and(RunProgress::is_cancelled) {
            return Err(ValuationError::Cancelled);
        }
        let base_value = base.number(&param.key)?;
        if (base_value - param.base).abs() > BASE_TOLERANCE * base_value.abs().max(1.0) {
            warn!(
                parameter = %param.key,
                declared = param.base,
                configured = base_value,
                "declared base differs from configuration; using configured value"
            );
        }

        let low = pipeline.run(&base.with_override(&param.key, param.low)?)?;
        let high = pipeline.run(&base.with_override(&param.key, param.high)?)?;
        debug!(parameter = %param.key, low = param.low, high = param.high, "sensitivity point done");

        if let Some(progress) = progress {
            progress.increment();
        }
        Ok(ParameterSweep {
            base_value,
            low,
            high,
        })
    };

    #[cfg(feature = "parallel")]
    let sweeps: Vec<ParameterSweep> = parameters
        .par_iter()
        .map(sweep_one)
        .collect::<Result<Vec<_>>>()?;

    #[cfg(not(feature = "parallel"))]
    let sweeps: Vec<ParameterSweep> = parameters
        .iter()
        .map(sweep_one)
        .collect::<Result<Vec<_>>>()?;

    let mut rows = Vec::with_capacity(parameters.len() * base_output.comparisons.len());
    for (param, sweep) in parameters.iter().zip(&sweeps) {
        let variants = base_output
            .comparisons
            .iter()
            .zip(&sweep.low.comparisons)
            .zip(&sweep.high.comparisons);
        for ((at_base, at_low), at_high) in variants {
            rows.push(SensitivityRow {
                parameter: param.key.clone(),
                label: param.label.clone(),
                unit: param.unit.clone(),
                alternative: at_base.alternative.clone(),
                baseline: at_base.baseline.clone(),
                base: SensitivityPoint::from_comparison(sweep.base_value, at_base),
                low: SensitivityPoint::from_comparison(param.low, at_low),
                high: SensitivityPoint::from_comparison(param.high, at_high),
            });
        }
    }

    let after = base.fingerprint();
    if before != after {
        return Err(ValuationError::BaseConfigurationModified { before, after });
    }

    info!(rows = rows.len(), "sensitivity sweep complete");
    Ok(SensitivityTable {
        base_fingerprint: before,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_marginal_is_triangular() {
        let param = SensitivityParameter::new("economics.fuel_price", 1.0, 0.8, 1.4);
        assert_eq!(param.marginal(), Marginal::triangular(0.8, 1.0, 1.4));

        let param = param.distribution(Marginal::Uniform { min: 0.5, max: 2.0 });
        assert_eq!(param.marginal(), Marginal::Uniform { min: 0.5, max: 2.0 });
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let param = SensitivityParameter::new("economics.fuel_price", 1.0, 1.4, 0.8);
        assert!(matches!(param.validate(), Err(ValuationError::InvalidInput(_))));
    }

    #[test]
    fn test_npv_points_sorted() {
        let point = |value, npv| SensitivityPoint {
            value,
            npv,
            bcr: BenefitCostRatio::Ratio(1.0),
            irr: None,
        };
        let row = SensitivityRow {
            parameter: ParamKey::from("economics.x"),
            label: None,
            unit: None,
            alternative: ScenarioId::from("a"),
            baseline: ScenarioId::from("b"),
            base: point(5.0, 10.0),
            low: point(0.0, 20.0),
            high: point(10.0, 0.0),
        };
        assert_eq!(row.npv_points(), [(0.0, 20.0), (5.0, 10.0), (10.0, 0.0)]);

        // A configured base outside the tested range is not a tested point
        let stale = SensitivityRow {
            base: point(12.0, -5.0),
            ..row
        };
        assert_eq!(stale.npv_points(), [(0.0, 20.0), (10.0, 0.0)]);
    }
}
