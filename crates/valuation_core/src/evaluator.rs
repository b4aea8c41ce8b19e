//! Scenario evaluator seam
//!
//! The engine treats the domain model as a black box: given a configuration,
//! a scenario id, and a year it returns that year's [`AnnualRecord`].
//! Implementations must be pure (no interior mutation of the configuration,
//! same inputs give the same record) so that results are reproducible across
//! threads and runs.

use crate::config::Configuration;
use crate::error::EvaluationError;
use crate::model::{AnnualRecord, Horizon, ScenarioId, ScenarioResult};

/// Computes one year of one scenario from a configuration snapshot
pub trait ScenarioEvaluator: Send + Sync {
    fn evaluate(
        &self,
        config: &Configuration,
        scenario: &ScenarioId,
        year: i32,
    ) -> Result<AnnualRecord, EvaluationError>;
}

impl<F> ScenarioEvaluator for F
where
    F: Fn(&Configuration, &ScenarioId, i32) -> Result<AnnualRecord, EvaluationError> + Send + Sync,
{
    fn evaluate(
        &self,
        config: &Configuration,
        scenario: &ScenarioId,
        year: i32,
    ) -> Result<AnnualRecord, EvaluationError> {
        self(config, scenario, year)
    }
}

/// Evaluate every year of `horizon` for one scenario
pub fn run_scenario<E: ScenarioEvaluator + ?Sized>(
    evaluator: &E,
    config: &Configuration,
    scenario: &ScenarioId,
    horizon: Horizon,
) -> Result<ScenarioResult, EvaluationError> {
    let mut records = Vec::with_capacity(horizon.len());
    for year in horizon.years() {
        let record = evaluator.evaluate(config, scenario, year)?;
        if record.year != year {
            return Err(EvaluationError::YearMismatch {
                requested: year,
                returned: record.year,
            });
        }
        records.push(record);
    }
    Ok(ScenarioResult {
        scenario: scenario.clone(),
        records,
    })
}
