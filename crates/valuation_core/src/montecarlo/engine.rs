//! Monte Carlo iteration loop
//!
//! The sample matrix is drawn up front, then iterations are processed in
//! fixed-size batches. Each batch owns one clone of the base configuration
//! and applies every sample in place, restoring before the next one, so no
//! configuration is ever shared between workers. Batches are collected in
//! index order and aggregation happens once all of them are done.

use std::ops::Range;
use std::time::Duration;

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::{debug, info, info_span, warn};

use super::correlation::CorrelationSpec;
use super::sampler::SampleMatrix;
use super::stats::{FailedIteration, IterationRecord, MonteCarloSummary, ScenarioMetrics};
use crate::config::Configuration;
use crate::error::{Result, ValuationError};
use crate::evaluator::ScenarioEvaluator;
use crate::model::ScenarioId;
use crate::pipeline::{IterationGuard, PipelineOutput, ValuationPipeline};
use crate::progress::RunProgress;
use crate::sensitivity::SensitivityParameter;

/// What happened to one iteration
#[derive(Debug, Clone, PartialEq)]
pub enum IterationOutcome {
    Completed(IterationRecord),
    Failed(FailedIteration),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonteCarloResults {
    pub summary: MonteCarloSummary,
    /// Completed iterations in iteration order
    pub records: Vec<IterationRecord>,
    /// Failed iterations in iteration order, with their samples
    pub failures: Vec<FailedIteration>,
}

fn metrics(output: &PipelineOutput) -> Vec<ScenarioMetrics> {
    output
        .valuations
        .iter()
        .map(|valuation| {
            let scenario = valuation.scenario();
            let comparison = output.comparison(scenario);
            ScenarioMetrics {
                scenario: scenario.clone(),
                pv_net_cost: valuation.totals.pv_net_cost,
                npv: output.npv(scenario).unwrap_or(0.0),
                bcr: comparison.map(|c| c.bcr),
                irr: comparison.and_then(|c| c.irr),
            }
        })
        .collect()
}

/// Apply one sample to `config`, run the pipeline, and put `config` back
fn run_iteration<E: ScenarioEvaluator + ?Sized>(
    pipeline: &ValuationPipeline<'_, E>,
    config: &mut Configuration,
    matrix: &SampleMatrix,
    iteration: usize,
    timeout: Option<Duration>,
) -> IterationOutcome {
    let sample = matrix.sample(iteration);
    let failed = |error: ValuationError, sample| {
        IterationOutcome::Failed(FailedIteration {
            iteration,
            sample,
            timed_out: matches!(error, ValuationError::IterationTimeout { .. }),
            error: error.to_string(),
        })
    };

    let snapshot = match config.mutate_many_in_place(&matrix.overrides(iteration)) {
        Ok(snapshot) => snapshot,
        Err(e) => return failed(e.into(), sample),
    };
    let output = pipeline.run_guarded(config, timeout.map(IterationGuard::start));
    config.restore(snapshot);

    match output {
        Ok(output) => IterationOutcome::Completed(IterationRecord {
            iteration,
            sample,
            metrics: metrics(&output),
        }),
        Err(e) => failed(e, sample),
    }
}

fn run_batch<E: ScenarioEvaluator + ?Sized>(
    pipeline: &ValuationPipeline<'_, E>,
    base: &Configuration,
    matrix: &SampleMatrix,
    range: Range<usize>,
    timeout: Option<Duration>,
    progress: Option<&RunProgress>,
) -> Result<Vec<IterationOutcome>> {
    let mut config = base.clone();
    let mut outcomes = Vec::with_capacity(range.len());
    for iteration in range {
        if progress.is_some_and(RunProgress::is_cancelled) {
            return Err(ValuationError::Cancelled);
        }
        outcomes.push(run_iteration(pipeline, &mut config, matrix, iteration, timeout));
        if let Some(progress) = progress {
            progress.increment();
        }
    }
    Ok(outcomes)
}

/// Run a correlated Monte Carlo simulation of the full pipeline.
///
/// Iteration count, seed, batch size, percentiles and the optional
/// per-iteration timeout come from the pipeline's settings. Iterations that
/// fail are kept with their samples and left out of the summary. The whole
/// run fails only on invalid inputs or cancellation. A parameter key that
/// an override could not set is an invalid input.
pub fn run_monte_carlo<E: ScenarioEvaluator + ?Sized>(
    pipeline: &ValuationPipeline<'_, E>,
    base: &Configuration,
    parameters: &[SensitivityParameter],
    correlations: &[CorrelationSpec],
    progress: Option<&RunProgress>,
) -> Result<MonteCarloResults> {
    let settings = &pipeline.settings().monte_carlo;
    let num_iterations = settings.iterations;
    let batch_size = settings.batch_size.max(1);
    let _span = info_span!(
        "monte_carlo",
        iterations = num_iterations,
        parameters = parameters.len(),
        seed = settings.seed
    )
    .entered();

    for param in parameters {
        base.check_settable(&param.key)?;
    }
    let matrix = SampleMatrix::draw(parameters, correlations, num_iterations, settings.seed)?;
    let timeout = settings.iteration_timeout_ms.map(Duration::from_millis);
    if let Some(progress) = progress {
        progress.reset(num_iterations);
    }

    let num_batches = num_iterations.div_ceil(batch_size);
    let batch_range = |i: usize| i * batch_size..((i + 1) * batch_size).min(num_iterations);

    #[cfg(feature = "parallel")]
    let batches = (0..num_batches)
        .into_par_iter()
        .map(|i| run_batch(pipeline, base, &matrix, batch_range(i), timeout, progress))
        .collect::<Result<Vec<_>>>()?;

    #[cfg(not(feature = "parallel"))]
    let batches = (0..num_batches)
        .map(|i| run_batch(pipeline, base, &matrix, batch_range(i), timeout, progress))
        .collect::<Result<Vec<_>>>()?;

    let mut records = Vec::with_capacity(num_iterations);
    let mut failures = Vec::new();
    for outcome in batches.into_iter().flatten() {
        match outcome {
            IterationOutcome::Completed(record) => records.push(record),
            IterationOutcome::Failed(failure) => {
                debug!(iteration = failure.iteration, error = %failure.error, "iteration failed");
                failures.push(failure);
            }
        }
    }

    if !failures.is_empty() {
        warn!(
            failed = failures.len(),
            first_error = %failures[0].error,
            "Monte Carlo iterations failed and were excluded from the summary"
        );
    }
    let not_converged = records
        .iter()
        .flat_map(|r| r.metrics.iter().skip(1))
        .filter(|m| m.irr.is_none())
        .count();
    if not_converged > 0 {
        warn!(count = not_converged, "IRR did not converge; excluded from IRR statistics");
    }

    let scenarios: Vec<ScenarioId> = pipeline.settings().scenarios().cloned().collect();
    let summary = MonteCarloSummary::aggregate(
        &scenarios,
        num_iterations,
        &records,
        &failures,
        &settings.percentiles,
        settings.seed,
        matrix.achieved_correlations(correlations),
    );

    info!(
        completed = summary.completed,
        failed = summary.failed,
        "Monte Carlo run complete"
    );
    Ok(MonteCarloResults {
        summary,
        records,
        failures,
    })
}
