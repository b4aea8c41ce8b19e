//! The full valuation pipeline for one configuration
//!
//! evaluate every scenario → discount and credit salvage → compare each
//! alternative with the baseline. The sensitivity, Monte Carlo, and switching
//! engines all call [`ValuationPipeline::run`] (or its guarded form) and
//! differ only in the configurations they feed it.

use std::time::{Duration, Instant};

use crate::compare::{IncrementalResult, compare};
use crate::config::Configuration;
use crate::error::{Result, ValuationError};
use crate::evaluator::{ScenarioEvaluator, run_scenario};
use crate::model::ScenarioId;
use crate::settings::ValuationSettings;
use crate::valuation::{ScenarioValuation, value_scenario};

/// Outputs of one pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    /// Baseline first, then alternatives in declared order
    pub valuations: Vec<ScenarioValuation>,
    /// One per alternative, in declared order
    pub comparisons: Vec<IncrementalResult>,
}

impl PipelineOutput {
    #[must_use]
    pub fn valuation(&self, scenario: &ScenarioId) -> Option<&ScenarioValuation> {
        self.valuations.iter().find(|v| v.scenario() == scenario)
    }

    #[must_use]
    pub fn comparison(&self, alternative: &ScenarioId) -> Option<&IncrementalResult> {
        self.comparisons
            .iter()
            .find(|c| &c.alternative == alternative)
    }

    /// NPV of `scenario` relative to the baseline; the baseline itself is 0
    #[must_use]
    pub fn npv(&self, scenario: &ScenarioId) -> Option<f64> {
        match self.valuations.first() {
            Some(base) if base.scenario() == scenario => Some(0.0),
            _ => self.comparison(scenario).map(|c| c.npv),
        }
    }
}

/// Wall-clock budget for one guarded run
#[derive(Debug, Clone, Copy)]
pub struct IterationGuard {
    pub started: Instant,
    pub budget: Duration,
}

impl IterationGuard {
    #[must_use]
    pub fn start(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    fn check(&self) -> Result<()> {
        if self.started.elapsed() > self.budget {
            Err(ValuationError::IterationTimeout {
                budget_ms: u64::try_from(self.budget.as_millis()).unwrap_or(u64::MAX),
            })
        } else {
            Ok(())
        }
    }
}

/// Evaluator plus settings; cheap to copy into worker closures
pub struct ValuationPipeline<'a, E: ScenarioEvaluator + ?Sized> {
    evaluator: &'a E,
    settings: &'a ValuationSettings,
}

impl<E: ScenarioEvaluator + ?Sized> Clone for ValuationPipeline<'_, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E: ScenarioEvaluator + ?Sized> Copy for ValuationPipeline<'_, E> {}

impl<'a, E: ScenarioEvaluator + ?Sized> ValuationPipeline<'a, E> {
    /// Validate `settings` and bind them to `evaluator`
    pub fn new(evaluator: &'a E, settings: &'a ValuationSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            evaluator,
            settings,
        })
    }

    #[must_use]
    pub fn settings(&self) -> &'a ValuationSettings {
        self.settings
    }

    /// Evaluate and discount a single scenario
    pub fn value_scenario(
        &self,
        config: &Configuration,
        scenario: &ScenarioId,
    ) -> Result<ScenarioValuation> {
        let result = run_scenario(self.evaluator, config, scenario, self.settings.horizon)
            .map_err(|source| ValuationError::Evaluation {
                scenario: scenario.clone(),
                source,
            })?;

        let lifetimes = self
            .settings
            .assets
            .iter()
            .map(|a| -> Result<(String, f64)> { Ok((a.class.clone(), a.lifetime.resolve(config)?)) })
            .collect::<Result<Vec<_>>>()?;

        Ok(value_scenario(result, &self.settings.discount, &lifetimes))
    }

    /// Run every scenario and every comparison
    pub fn run(&self, config: &Configuration) -> Result<PipelineOutput> {
        self.run_guarded(config, None)
    }

    /// Like [`run`](Self::run), failing with
    /// [`ValuationError::IterationTimeout`] if `guard`'s budget is spent
    /// after any scenario evaluation
    pub fn run_guarded(
        &self,
        config: &Configuration,
        guard: Option<IterationGuard>,
    ) -> Result<PipelineOutput> {
        let mut valuations = Vec::with_capacity(1 + self.settings.alternatives.len());
        for scenario in self.settings.scenarios() {
            valuations.push(self.value_scenario(config, scenario)?);
            if let Some(guard) = &guard {
                guard.check()?;
            }
        }

        let (baseline, alternatives) = match valuations.split_first() {
            Some(split) => split,
            None => {
                return Err(ValuationError::InvalidInput(
                    "no scenarios to evaluate".to_string(),
                ));
            }
        };
        let comparisons = alternatives
            .iter()
            .map(|alt| {
                compare(
                    alt,
                    baseline,
                    &self.settings.benefit_streams,
                    &self.settings.irr,
                    &self.settings.discount,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(PipelineOutput {
            valuations,
            comparisons,
        })
    }
}
