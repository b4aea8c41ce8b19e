//! Correlated Monte Carlo simulation
//!
//! - [`distribution`]: per-parameter marginals
//! - [`correlation`]: Iman–Conover rank reordering
//! - [`sampler`]: the seeded sample matrix
//! - [`engine`]: the batched iteration loop
//! - [`stats`]: aggregation into percentile and ranking tables

pub mod correlation;
pub mod distribution;
pub mod engine;
pub mod sampler;
pub mod stats;

pub use correlation::{CorrelationSpec, spearman};
pub use distribution::Marginal;
pub use engine::{IterationOutcome, MonteCarloResults, run_monte_carlo};
pub use sampler::{AchievedCorrelation, Sample, SampleMatrix};
pub use stats::{
    AlternativeStats, DistributionStats, FailedIteration, IterationRecord, MonteCarloSummary,
    PercentileValue, ScenarioMetrics, ScenarioStats,
};
