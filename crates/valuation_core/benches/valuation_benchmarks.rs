//! Criterion benchmarks for valuation_core
//!
//! Run with: cargo bench -p valuation_core

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use valuation_core::{
    AnnualRecord, AssetLifetime, BenefitStream, Configuration, ConfigurationBuilder,
    CorrelationSpec, DerivedField, DiscountSchedule, DiscountTier, Horizon, ScenarioId,
    SensitivityParameter, ValuationPipeline, ValuationSettings, error::EvaluationError,
    run_monte_carlo, run_sensitivity,
};

fn evaluate(
    config: &Configuration,
    scenario: &ScenarioId,
    year: i32,
) -> Result<AnnualRecord, EvaluationError> {
    let t = year - 2025;
    let load = config.number("demand.load_kwh")? * 1.02_f64.powi(t);
    let liters = load / 3.0;
    let fuel_price = config.number("economics.fuel_price")?;
    match scenario.as_str() {
        "diesel" => Ok(AnnualRecord::new(year)
            .with_cost("fuel", liters * fuel_price)
            .with_impact("emissions", liters * 0.134)
            .with_generation(load)),
        "solar_hybrid" => {
            let share = config.number("technology.solar_fraction")?;
            let mut record = AnnualRecord::new(year)
                .with_cost("fuel", liters * (1.0 - share) * fuel_price)
                .with_impact("emissions", liters * (1.0 - share) * 0.134)
                .with_generation(load)
                .with_asset("pv", config.number("technology.pv_kw")?, config.number("economics.pv_cost_per_kw")?);
            if t == 0 {
                record = record.with_cost("capital", config.number("economics.pv_capex")?);
            }
            Ok(record)
        }
        _ => Err(EvaluationError::UnknownScenario(scenario.clone())),
    }
}

fn create_config() -> Configuration {
    ConfigurationBuilder::new()
        .number("demand.load_kwh", 120_000.0)
        .number("economics.fuel_price", 1.1)
        .number("economics.pv_cost_per_kw", 900.0)
        .number("technology.pv_kw", 80.0)
        .number("technology.solar_fraction", 0.7)
        .number("technology.pv_lifetime", 25.0)
        .derived(DerivedField::new(
            "economics.pv_capex",
            &["technology.pv_kw", "economics.pv_cost_per_kw"],
            |c| Ok(c.number("technology.pv_kw")? * c.number("economics.pv_cost_per_kw")?),
        ))
        .build()
        .expect("benchmark configuration is valid")
}

fn create_settings(iterations: usize) -> ValuationSettings {
    let discount = DiscountSchedule::declining(
        2025,
        vec![
            DiscountTier {
                start_offset: 0,
                end_offset: Some(9),
                rate: 0.08,
            },
            DiscountTier {
                start_offset: 10,
                end_offset: None,
                rate: 0.05,
            },
        ],
    );
    let mut settings = ValuationSettings::new(Horizon::new(2025, 2054), discount, "diesel")
        .alternative("solar_hybrid")
        .benefit(BenefitStream::avoided("emissions"))
        .asset("pv", AssetLifetime::Parameter("technology.pv_lifetime".into()));
    settings.monte_carlo.iterations = iterations;
    settings
}

fn create_parameters() -> Vec<SensitivityParameter> {
    vec![
        SensitivityParameter::new("economics.fuel_price", 1.1, 0.8, 1.6),
        SensitivityParameter::new("economics.pv_cost_per_kw", 900.0, 650.0, 1_300.0),
        SensitivityParameter::new("technology.solar_fraction", 0.7, 0.5, 0.9),
        SensitivityParameter::new("technology.pv_lifetime", 25.0, 20.0, 30.0),
    ]
}

fn bench_pipeline(c: &mut Criterion) {
    let settings = create_settings(0);
    let pipeline = ValuationPipeline::new(&evaluate, &settings).expect("valid settings");
    let config = create_config();
    c.bench_function("pipeline_30yr_two_scenarios", |b| {
        b.iter(|| pipeline.run(black_box(&config)))
    });
}

fn bench_sensitivity(c: &mut Criterion) {
    let settings = create_settings(0);
    let pipeline = ValuationPipeline::new(&evaluate, &settings).expect("valid settings");
    let config = create_config();
    let parameters = create_parameters();
    c.bench_function("sensitivity_4_parameters", |b| {
        b.iter(|| run_sensitivity(&pipeline, black_box(&config), black_box(&parameters), None))
    });
}

fn bench_monte_carlo(c: &mut Criterion) {
    let mut group = c.benchmark_group("monte_carlo");
    let config = create_config();
    let parameters = create_parameters();
    let correlations = [CorrelationSpec::new(
        "economics.fuel_price",
        "economics.pv_cost_per_kw",
        -0.4,
    )];

    for iterations in [100, 500, 1000].iter() {
        let settings = create_settings(*iterations);
        let pipeline = ValuationPipeline::new(&evaluate, &settings).expect("valid settings");
        group.bench_with_input(
            BenchmarkId::new("iterations", iterations),
            iterations,
            |b, _| {
                b.iter(|| {
                    run_monte_carlo(
                        &pipeline,
                        black_box(&config),
                        black_box(&parameters),
                        &correlations,
                        None,
                    )
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_pipeline, bench_sensitivity, bench_monte_carlo);
criterion_main!(benches);
