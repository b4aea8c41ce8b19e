//! Exported result tables
//!
//! [`ValuationReport`] bundles the four tables an analysis produces:
//! discounted totals and incremental metrics, the sensitivity table, the
//! Monte Carlo summary, and the switching values. Every map inside is a
//! `BTreeMap` and every list is in a fixed order, so the same inputs always
//! serialize to the same bytes.

use serde::{Deserialize, Serialize};
use tracing::info_span;

use crate::compare::IncrementalResult;
use crate::config::Configuration;
use crate::error::Result;
use crate::evaluator::ScenarioEvaluator;
use crate::montecarlo::{CorrelationSpec, MonteCarloSummary, run_monte_carlo};
use crate::pipeline::{PipelineOutput, ValuationPipeline};
use crate::progress::RunProgress;
use crate::sensitivity::{SensitivityParameter, SensitivityTable, run_sensitivity};
use crate::switching::{SwitchingValueResult, switching_table};
use crate::valuation::DiscountedTotals;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationReport {
    /// Baseline first
    pub scenarios: Vec<DiscountedTotals>,
    pub comparisons: Vec<IncrementalResult>,
    #[serde(default)]
    pub sensitivity: Option<SensitivityTable>,
    #[serde(default)]
    pub monte_carlo: Option<MonteCarloSummary>,
    #[serde(default)]
    pub switching_values: Vec<SwitchingValueResult>,
}

impl ValuationReport {
    /// Report holding only the deterministic results of one pipeline run
    #[must_use]
    pub fn from_output(output: &PipelineOutput) -> Self {
        Self {
            scenarios: output.valuations.iter().map(|v| v.totals.clone()).collect(),
            comparisons: output.comparisons.clone(),
            sensitivity: None,
            monte_carlo: None,
            switching_values: Vec::new(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Uncertain inputs of a full analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UncertaintyInputs {
    #[serde(default)]
    pub parameters: Vec<SensitivityParameter>,
    #[serde(default)]
    pub correlations: Vec<CorrelationSpec>,
}

/// Run everything: the base pipeline, the sensitivity sweep with its
/// switching values, then Monte Carlo.
///
/// With no uncertain parameters only the base results are filled in.
pub fn analyze<E: ScenarioEvaluator + ?Sized>(
    pipeline: &ValuationPipeline<'_, E>,
    base: &Configuration,
    inputs: &UncertaintyInputs,
    progress: Option<&RunProgress>,
) -> Result<ValuationReport> {
    let _span = info_span!("analyze").entered();
    let mut report = ValuationReport::from_output(&pipeline.run(base)?);
    if inputs.parameters.is_empty() {
        return Ok(report);
    }

    let sensitivity = run_sensitivity(pipeline, base, &inputs.parameters, progress)?;
    report.switching_values = switching_table(&sensitivity, pipeline.settings())?;
    report.sensitivity = Some(sensitivity);

    let monte_carlo = run_monte_carlo(
        pipeline,
        base,
        &inputs.parameters,
        &inputs.correlations,
        progress,
    )?;
    report.monte_carlo = Some(monte_carlo.summary);
    Ok(report)
}
