//! Aggregation of completed Monte Carlo iterations
//!
//! Runs after every iteration has finished, over the completed iterations
//! only, in iteration order. Failed iterations and non-finite metrics (a
//! "dominant" BCR, a non-converged IRR) are counted but never averaged in.

use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, OrderStatistics, Statistics};

use super::sampler::{AchievedCorrelation, Sample};
use crate::compare::BenefitCostRatio;
use crate::model::ScenarioId;

/// Value of one percentile of a metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentileValue {
    pub percentile: f64,
    pub value: f64,
}

/// Summary statistics of one metric across iterations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionStats {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; 0 for a single value
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub percentiles: Vec<PercentileValue>,
}

impl DistributionStats {
    /// `None` when there are no values
    #[must_use]
    pub fn from_values(values: &[f64], percentiles: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mean = values.mean();
        let std_dev = if values.len() > 1 { values.std_dev() } else { 0.0 };
        let mut data = Data::new(values.to_vec());
        let percentiles = percentiles
            .iter()
            .map(|&p| PercentileValue {
                percentile: p,
                value: data.quantile(p),
            })
            .collect();
        Some(Self {
            count: values.len(),
            mean,
            std_dev,
            min: values.min(),
            max: values.max(),
            percentiles,
        })
    }

    #[must_use]
    pub fn percentile(&self, p: f64) -> Option<f64> {
        self.percentiles
            .iter()
            .find(|v| (v.percentile - p).abs() < 1e-12)
            .map(|v| v.value)
    }
}

// =========================================================================
// Per-iteration records
// =========================================================================

/// Metrics of one scenario in one iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioMetrics {
    pub scenario: ScenarioId,
    pub pv_net_cost: f64,
    /// Relative to the baseline; 0 for the baseline itself
    pub npv: f64,
    /// `None` for the baseline
    pub bcr: Option<BenefitCostRatio>,
    pub irr: Option<f64>,
}

/// Outputs of one completed iteration, scenarios in baseline-first order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub sample: Sample,
    pub metrics: Vec<ScenarioMetrics>,
}

impl IterationRecord {
    /// Index of the cheapest scenario; earliest wins ties
    #[must_use]
    pub fn least_cost(&self) -> Option<usize> {
        argbest(self.metrics.iter().map(|m| -m.pv_net_cost))
    }

    /// Index of the scenario with the highest NPV; earliest wins ties
    #[must_use]
    pub fn highest_npv(&self) -> Option<usize> {
        argbest(self.metrics.iter().map(|m| m.npv))
    }
}

fn argbest(values: impl Iterator<Item = f64>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, v) in values.enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// An iteration that did not complete; its sample is kept for diagnosis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedIteration {
    pub iteration: usize,
    pub sample: Sample,
    pub error: String,
    pub timed_out: bool,
}

// =========================================================================
// Summary tables
// =========================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioStats {
    pub scenario: ScenarioId,
    pub pv_net_cost: Option<DistributionStats>,
    pub probability_least_cost: f64,
    pub probability_highest_npv: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativeStats {
    pub alternative: ScenarioId,
    pub baseline: ScenarioId,
    pub npv: Option<DistributionStats>,
    /// Finite ratios only
    pub bcr: Option<DistributionStats>,
    pub bcr_dominant_count: usize,
    /// Converged IRRs only
    pub irr: Option<DistributionStats>,
    pub irr_not_converged: usize,
    pub probability_beats_baseline: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloSummary {
    pub iterations_requested: usize,
    pub completed: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub seed: u64,
    pub scenarios: Vec<ScenarioStats>,
    pub alternatives: Vec<AlternativeStats>,
    pub achieved_rank_correlations: Vec<AchievedCorrelation>,
}

/// Share of `hits` in `total`; 0 when nothing completed
fn probability(hits: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

impl MonteCarloSummary {
    /// Aggregate `records` (completed iterations in iteration order).
    ///
    /// `scenarios` lists the baseline first, then the alternatives, matching
    /// the order of every record's metrics.
    #[must_use]
    pub fn aggregate(
        scenarios: &[ScenarioId],
        iterations_requested: usize,
        records: &[IterationRecord],
        failures: &[FailedIteration],
        percentiles: &[f64],
        seed: u64,
        achieved_rank_correlations: Vec<AchievedCorrelation>,
    ) -> Self {
        let completed = records.len();
        let mut least_cost_hits = vec![0usize; scenarios.len()];
        let mut highest_npv_hits = vec![0usize; scenarios.len()];
        for record in records {
            if let Some(i) = record.least_cost() {
                least_cost_hits[i] += 1;
            }
            if let Some(i) = record.highest_npv() {
                highest_npv_hits[i] += 1;
            }
        }

        let column = |i: usize| records.iter().filter_map(move |r| r.metrics.get(i));

        let scenario_stats = scenarios
            .iter()
            .enumerate()
            .map(|(i, scenario)| {
                let costs: Vec<f64> = column(i).map(|m| m.pv_net_cost).collect();
                ScenarioStats {
                    scenario: scenario.clone(),
                    pv_net_cost: DistributionStats::from_values(&costs, percentiles),
                    probability_least_cost: probability(least_cost_hits[i], completed),
                    probability_highest_npv: probability(highest_npv_hits[i], completed),
                }
            })
            .collect();

        let alternative_stats = match scenarios.split_first() {
            Some((baseline, alternatives)) => alternatives
                .iter()
                .enumerate()
                .map(|(offset, alternative)| {
                    let i = offset + 1;
                    let npv: Vec<f64> = column(i).map(|m| m.npv).collect();
                    let bcr: Vec<f64> = column(i)
                        .filter_map(|m| m.bcr.and_then(BenefitCostRatio::finite))
                        .collect();
                    let bcr_dominant_count = column(i)
                        .filter(|m| m.bcr.is_some_and(BenefitCostRatio::is_dominant))
                        .count();
                    let irr: Vec<f64> = column(i).filter_map(|m| m.irr).collect();
                    let beats = npv.iter().filter(|v| **v > 0.0).count();
                    AlternativeStats {
                        alternative: alternative.clone(),
                        baseline: baseline.clone(),
                        npv: DistributionStats::from_values(&npv, percentiles),
                        bcr: DistributionStats::from_values(&bcr, percentiles),
                        bcr_dominant_count,
                        irr_not_converged: completed - irr.len(),
                        irr: DistributionStats::from_values(&irr, percentiles),
                        probability_beats_baseline: probability(beats, completed),
                    }
                })
                .collect(),
            None => Vec::new(),
        };

        Self {
            iterations_requested,
            completed,
            failed: failures.len(),
            timed_out: failures.iter().filter(|f| f.timed_out).count(),
            seed,
            scenarios: scenario_stats,
            alternatives: alternative_stats,
            achieved_rank_correlations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn record(iteration: usize, costs: [f64; 2], npv: f64, irr: Option<f64>) -> IterationRecord {
        IterationRecord {
            iteration,
            sample: Sample {
                iteration,
                values: BTreeMap::new(),
            },
            metrics: vec![
                ScenarioMetrics {
                    scenario: ScenarioId::from("diesel"),
                    pv_net_cost: costs[0],
                    npv: 0.0,
                    bcr: None,
                    irr: None,
                },
                ScenarioMetrics {
                    scenario: ScenarioId::from("solar"),
                    pv_net_cost: costs[1],
                    npv,
                    bcr: Some(if npv > 0.0 {
                        BenefitCostRatio::Dominant
                    } else {
                        BenefitCostRatio::Ratio(0.8)
                    }),
                    irr,
                },
            ],
        }
    }

    #[test]
    fn test_distribution_stats() {
        let values: Vec<f64> = (1..=101).map(f64::from).collect();
        let stats = DistributionStats::from_values(&values, &[0.5]).unwrap();
        assert_eq!(stats.count, 101);
        assert!((stats.mean - 51.0).abs() < 1e-12);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 101.0);
        assert!((stats.percentile(0.5).unwrap() - 51.0).abs() < 1e-9);
        assert!(DistributionStats::from_values(&[], &[0.5]).is_none());

        let single = DistributionStats::from_values(&[3.0], &[0.5]).unwrap();
        assert_eq!(single.std_dev, 0.0);
    }

    #[test]
    fn test_rankings_and_exclusions() {
        let scenarios = [ScenarioId::from("diesel"), ScenarioId::from("solar")];
        let records = vec![
            record(0, [100.0, 80.0], 20.0, Some(0.1)),
            record(1, [100.0, 120.0], -20.0, None),
            record(2, [100.0, 90.0], 10.0, Some(0.05)),
            // Tie goes to the baseline
            record(3, [100.0, 100.0], 0.0, None),
        ];
        let failures = vec![FailedIteration {
            iteration: 4,
            sample: Sample {
                iteration: 4,
                values: BTreeMap::new(),
            },
            error: "model failure".to_string(),
            timed_out: true,
        }];

        let summary =
            MonteCarloSummary::aggregate(&scenarios, 6, &records, &failures, &[0.5], 42, Vec::new());

        assert_eq!(summary.iterations_requested, 6);
        assert_eq!(summary.completed, 4);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.timed_out, 1);

        assert!((summary.scenarios[0].probability_least_cost - 0.5).abs() < 1e-12);
        assert!((summary.scenarios[1].probability_least_cost - 0.5).abs() < 1e-12);
        assert!((summary.scenarios[1].probability_highest_npv - 0.5).abs() < 1e-12);

        let solar = &summary.alternatives[0];
        assert_eq!(solar.baseline.as_str(), "diesel");
        assert!((solar.probability_beats_baseline - 0.5).abs() < 1e-12);
        assert_eq!(solar.bcr_dominant_count, 2);
        assert_eq!(solar.bcr.as_ref().unwrap().count, 2);
        assert_eq!(solar.irr_not_converged, 2);
        assert_eq!(solar.irr.as_ref().unwrap().count, 2);
        assert_eq!(solar.npv.as_ref().unwrap().count, 4);
    }
}
