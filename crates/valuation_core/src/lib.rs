//! Scenario valuation and uncertainty engine
//!
//! This crate turns the yearly costs, impacts and generation of candidate
//! investment pathways into economic decision metrics, and measures how those
//! metrics move under parameter uncertainty. It supports:
//! - Discounting with flat or multi-tier declining rate schedules
//! - End-of-horizon salvage value with per-asset-class vintage tracking
//! - Incremental comparison of alternatives against a baseline (NPV, BCR,
//!   IRR, payback, levelized cost)
//! - One-way sensitivity sweeps over independently copied configurations
//! - Correlated Monte Carlo simulation (Iman–Conover rank correlation)
//! - Switching values where two scenarios' NPVs are equal
//!
//! The domain model itself is supplied by the caller as a
//! [`ScenarioEvaluator`].
//!
//! ```ignore
//! use valuation_core::{ValuationPipeline, ValuationSettings, run_monte_carlo};
//!
//! let settings = ValuationSettings::from_yaml(&std::fs::read_to_string("valuation.yaml")?)?;
//! let pipeline = ValuationPipeline::new(&my_evaluator, &settings)?;
//!
//! let output = pipeline.run(&config)?;
//! let results = run_monte_carlo(&pipeline, &config, &parameters, &correlations, None)?;
//! ```

#![warn(clippy::all)]

// ============================================================================
// Core modules
// ============================================================================

pub mod compare;
pub mod discount;
pub mod error;
pub mod evaluator;
pub mod pipeline;
pub mod progress;
pub mod salvage;
pub mod valuation;

// ============================================================================
// Uncertainty engines
// ============================================================================

pub mod montecarlo;
pub mod sensitivity;
pub mod switching;

// ============================================================================
// Type definition modules
// ============================================================================

pub mod config;
pub mod model;
pub mod report;
pub mod settings;

// ============================================================================
// Test modules
// ============================================================================

#[cfg(test)]
mod tests;

// ============================================================================
// Public re-exports for convenience
// ============================================================================

pub use compare::{BenefitCostRatio, BenefitStream, IncrementalResult, IrrSettings, compare};
pub use config::{Configuration, ConfigurationBuilder, DerivedField, HardBound, ParamValue};
pub use discount::{DiscountRates, DiscountSchedule, DiscountTier};
pub use error::{Result, ValuationError};
pub use evaluator::{ScenarioEvaluator, run_scenario};
pub use model::{AnnualRecord, Horizon, ParamKey, ScenarioId, ScenarioResult};
pub use montecarlo::{CorrelationSpec, Marginal, MonteCarloResults, run_monte_carlo};
pub use pipeline::{PipelineOutput, ValuationPipeline};
pub use progress::RunProgress;
pub use report::{UncertaintyInputs, ValuationReport, analyze};
pub use salvage::{AssetLifetime, AssetVintageLedger};
pub use sensitivity::{SensitivityParameter, SensitivityTable, run_sensitivity};
pub use settings::ValuationSettings;
pub use switching::{SwitchingStatus, SwitchingValueResult, switching_table};
pub use valuation::{DiscountedTotals, ScenarioValuation};
