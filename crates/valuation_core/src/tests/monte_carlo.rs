//! Tests for the Monte Carlo engine
//!
//! These tests verify that:
//! - Inducing rank correlation leaves every marginal untouched
//! - Achieved rank correlations land near their targets
//! - A fixed seed gives byte-identical output, whatever the batch size
//! - Failed and timed-out iterations are recorded with their samples and excluded
//! - The base configuration is never modified

use super::fixtures::{
    VillageModel, correlations, uncertain_parameters, village_config, village_settings,
};
use super::init_tracing;
use crate::error::{ConfigError, CorrelationError, ValuationError};
use crate::model::ParamKey;
use crate::montecarlo::{CorrelationSpec, SampleMatrix, run_monte_carlo};
use crate::pipeline::ValuationPipeline;
use crate::progress::RunProgress;
use crate::report::{UncertaintyInputs, analyze};
use crate::sensitivity::SensitivityParameter;

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut values = values.to_vec();
    values.sort_by(f64::total_cmp);
    values
}

#[test]
fn test_correlation_preserves_marginals() {
    let parameters = uncertain_parameters();
    let independent = SampleMatrix::draw(&parameters, &[], 2_000, 11).unwrap();
    let correlated = SampleMatrix::draw(&parameters, &correlations(), 2_000, 11).unwrap();

    for param in &parameters {
        let a = independent.column(&param.key).unwrap();
        let b = correlated.column(&param.key).unwrap();
        assert_eq!(sorted(a), sorted(b), "marginal of '{}' changed", param.key);
    }
}

#[test]
fn test_achieved_correlation_near_target() {
    let matrix = SampleMatrix::draw(&uncertain_parameters(), &correlations(), 2_000, 11).unwrap();
    for achieved in matrix.achieved_correlations(&correlations()) {
        assert!(
            (achieved.achieved - achieved.target).abs() < 0.05,
            "{} ~ {}: target {} achieved {}",
            achieved.first,
            achieved.second,
            achieved.target,
            achieved.achieved
        );
    }
}

#[test]
fn test_inconsistent_correlations_rejected() {
    let parameters = [
        SensitivityParameter::new("economics.fuel_price", 1.1, 0.8, 1.6),
        SensitivityParameter::new("economics.grid_tariff", 0.15, 0.10, 0.24),
        SensitivityParameter::new("economics.carbon_price", 50.0, 0.0, 120.0),
    ];
    let specs = [
        CorrelationSpec::new("economics.fuel_price", "economics.grid_tariff", 0.9),
        CorrelationSpec::new("economics.fuel_price", "economics.carbon_price", 0.9),
        CorrelationSpec::new("economics.grid_tariff", "economics.carbon_price", -0.9),
    ];
    assert!(matches!(
        SampleMatrix::draw(&parameters, &specs, 100, 1),
        Err(ValuationError::Correlation(CorrelationError::NotPositiveDefinite))
    ));
}

#[test]
fn test_unsettable_parameters_rejected_before_sampling() {
    let model = VillageModel::default();
    let settings = village_settings();
    let pipeline = ValuationPipeline::new(&model, &settings).unwrap();
    let base = village_config();

    let mut unknown = uncertain_parameters();
    unknown.push(SensitivityParameter::new("economics.wind_cost", 1.0, 0.5, 2.0));
    let progress = RunProgress::default();
    assert!(matches!(
        run_monte_carlo(&pipeline, &base, &unknown, &[], Some(&progress)),
        Err(ValuationError::Config(ConfigError::UnknownParameter(_)))
    ));
    assert_eq!(progress.completed(), 0);

    let derived = [SensitivityParameter::new("economics.pv_capex", 1.0, 0.5, 2.0)];
    assert!(matches!(
        run_monte_carlo(&pipeline, &base, &derived, &[], None),
        Err(ValuationError::Config(ConfigError::DerivedParameter(_)))
    ));
}

#[test]
fn test_reproducible_across_runs_and_batch_sizes() {
    init_tracing();
    let model = VillageModel::default();
    let base = village_config();
    let parameters = uncertain_parameters();

    let settings = village_settings();
    let pipeline = ValuationPipeline::new(&model, &settings).unwrap();
    let first = run_monte_carlo(&pipeline, &base, &parameters, &correlations(), None).unwrap();
    let second = run_monte_carlo(&pipeline, &base, &parameters, &correlations(), None).unwrap();
    assert_eq!(
        serde_json::to_string(&first.summary).unwrap(),
        serde_json::to_string(&second.summary).unwrap()
    );

    let mut rebatched = village_settings();
    rebatched.monte_carlo.batch_size = 7;
    let pipeline = ValuationPipeline::new(&model, &rebatched).unwrap();
    let third = run_monte_carlo(&pipeline, &base, &parameters, &correlations(), None).unwrap();
    assert_eq!(first.summary, third.summary);
    assert_eq!(first.records, third.records);

    let mut reseeded = village_settings();
    reseeded.monte_carlo.seed += 1;
    let pipeline = ValuationPipeline::new(&model, &reseeded).unwrap();
    let fourth = run_monte_carlo(&pipeline, &base, &parameters, &correlations(), None).unwrap();
    assert_ne!(first.summary, fourth.summary);
}

#[test]
fn test_summary_tables() {
    let model = VillageModel::default();
    let settings = village_settings();
    let pipeline = ValuationPipeline::new(&model, &settings).unwrap();
    let base = village_config();
    let pristine = base.clone();

    let results =
        run_monte_carlo(&pipeline, &base, &uncertain_parameters(), &correlations(), None).unwrap();
    assert_eq!(base, pristine);

    let summary = &results.summary;
    assert_eq!(summary.completed, settings.monte_carlo.iterations);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.scenarios.len(), 3);
    assert_eq!(summary.alternatives.len(), 2);
    assert_eq!(summary.achieved_rank_correlations.len(), 2);

    let least_cost: f64 = summary.scenarios.iter().map(|s| s.probability_least_cost).sum();
    let highest_npv: f64 = summary.scenarios.iter().map(|s| s.probability_highest_npv).sum();
    assert!((least_cost - 1.0).abs() < 1e-12);
    assert!((highest_npv - 1.0).abs() < 1e-12);

    for alternative in &summary.alternatives {
        let npv = alternative.npv.as_ref().unwrap();
        assert_eq!(npv.count, settings.monte_carlo.iterations);
        assert_eq!(npv.percentiles.len(), settings.monte_carlo.percentiles.len());
        assert!(npv.percentile(0.05).unwrap() <= npv.percentile(0.95).unwrap());
        assert!(npv.min <= npv.mean && npv.mean <= npv.max);
        assert!((0.0..=1.0).contains(&alternative.probability_beats_baseline));
    }

    for record in &results.records {
        assert_eq!(record.metrics[0].npv, 0.0);
        assert_eq!(record.sample.values.len(), uncertain_parameters().len());
    }
}

#[test]
fn test_failed_iterations_are_retained() {
    let model = VillageModel::failing_above(0.8);
    let settings = village_settings();
    let pipeline = ValuationPipeline::new(&model, &settings).unwrap();
    let base = village_config();

    let results =
        run_monte_carlo(&pipeline, &base, &uncertain_parameters(), &correlations(), None).unwrap();
    let summary = &results.summary;
    assert!(summary.failed > 0);
    assert!(summary.completed > 0);
    assert_eq!(summary.completed + summary.failed, settings.monte_carlo.iterations);
    assert_eq!(summary.iterations_requested, settings.monte_carlo.iterations);
    assert_eq!(summary.timed_out, 0);
    assert_eq!(results.records.len(), summary.completed);

    let solar_fraction = ParamKey::from("technology.solar_fraction");
    for failure in &results.failures {
        assert!(failure.sample.values[&solar_fraction] > 0.8);
        assert!(failure.error.contains("storage capacity"), "{}", failure.error);
        assert!(!failure.timed_out);
    }
    for record in &results.records {
        assert!(record.sample.values[&solar_fraction] <= 0.8);
    }
    assert!(results.failures.windows(2).all(|w| w[0].iteration < w[1].iteration));
}

#[test]
fn test_timeout_marks_iterations() {
    let model = VillageModel::default();
    let mut settings = village_settings();
    settings.monte_carlo.iterations = 20;
    settings.monte_carlo.iteration_timeout_ms = Some(0);
    let pipeline = ValuationPipeline::new(&model, &settings).unwrap();

    let results =
        run_monte_carlo(&pipeline, &village_config(), &uncertain_parameters(), &[], None).unwrap();
    assert_eq!(results.summary.completed, 0);
    assert_eq!(results.summary.timed_out, 20);
    assert!(results.summary.alternatives[0].npv.is_none());
}

#[test]
fn test_progress_and_cancellation() {
    let model = VillageModel::default();
    let settings = village_settings();
    let pipeline = ValuationPipeline::new(&model, &settings).unwrap();
    let base = village_config();

    let progress = RunProgress::default();
    run_monte_carlo(&pipeline, &base, &uncertain_parameters(), &[], Some(&progress)).unwrap();
    assert_eq!(progress.completed(), settings.monte_carlo.iterations);

    let cancelled = RunProgress::default();
    cancelled.cancel();
    assert!(matches!(
        run_monte_carlo(&pipeline, &base, &uncertain_parameters(), &[], Some(&cancelled)),
        Err(ValuationError::Cancelled)
    ));
}

#[test]
fn test_full_analysis_report() {
    let model = VillageModel::default();
    let mut settings = village_settings();
    settings.monte_carlo.iterations = 100;
    let pipeline = ValuationPipeline::new(&model, &settings).unwrap();
    let inputs = UncertaintyInputs {
        parameters: uncertain_parameters(),
        correlations: correlations(),
    };

    let report = analyze(&pipeline, &village_config(), &inputs, None).unwrap();
    assert_eq!(report.scenarios.len(), 3);
    assert!(report.sensitivity.is_some());
    assert_eq!(report.monte_carlo.as_ref().unwrap().completed, 100);
    // Three scenario pairs per parameter
    assert_eq!(report.switching_values.len(), inputs.parameters.len() * 3);

    let again = analyze(&pipeline, &village_config(), &inputs, None).unwrap();
    assert_eq!(report.to_json().unwrap(), again.to_json().unwrap());
}
