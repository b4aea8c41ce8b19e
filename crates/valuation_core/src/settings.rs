//! Run settings
//!
//! Everything an analysis needs besides the model parameters themselves:
//! the horizon, the discount schedule, which scenarios to compare and how,
//! and the knobs of the Monte Carlo and switching-value engines. Settings are
//! usually loaded from YAML and validated once before any engine runs.
//!
//! ```yaml
//! horizon: { start_year: 2025, end_year: 2054 }
//! discount:
//!   base_year: 2025
//!   rates: { type: Flat, rate: 0.08 }
//! baseline: diesel
//! alternatives: [solar_hybrid, grid_extension]
//! benefit_streams:
//!   - { name: fuel, direction: Avoided }
//! assets:
//!   - { class: pv, lifetime: 25 }
//!   - { class: genset, lifetime: technology.genset_lifetime }
//! monte_carlo: { iterations: 2000, seed: 7 }
//! ```

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::compare::{BenefitStream, IrrSettings};
use crate::discount::DiscountSchedule;
use crate::error::SettingsError;
use crate::model::{Horizon, ScenarioId};
use crate::salvage::{AssetClassSpec, AssetLifetime};

fn default_iterations() -> usize {
    1000
}

fn default_seed() -> u64 {
    42
}

fn default_percentiles() -> Vec<f64> {
    vec![0.05, 0.25, 0.50, 0.75, 0.95]
}

fn default_batch_size() -> usize {
    100
}

/// Monte Carlo run settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloSettings {
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Percentiles reported for every metric, each in [0, 1]
    #[serde(default = "default_percentiles")]
    pub percentiles: Vec<f64>,
    /// Iterations per worker batch; each batch owns one configuration copy
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Wall-clock budget per iteration, checked between scenario evaluations
    #[serde(default)]
    pub iteration_timeout_ms: Option<u64>,
}

impl Default for MonteCarloSettings {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            seed: default_seed(),
            percentiles: default_percentiles(),
            batch_size: default_batch_size(),
            iteration_timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SwitchingSettings {
    /// Report a value projected from the tested endpoints when NPVs never
    /// cross inside the tested range. Such values are always flagged.
    #[serde(default)]
    pub allow_extrapolation: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationSettings {
    pub horizon: Horizon,
    pub discount: DiscountSchedule,
    pub baseline: ScenarioId,
    #[serde(default)]
    pub alternatives: Vec<ScenarioId>,
    #[serde(default)]
    pub benefit_streams: Vec<BenefitStream>,
    #[serde(default)]
    pub assets: Vec<AssetClassSpec>,
    #[serde(default)]
    pub irr: IrrSettings,
    #[serde(default)]
    pub monte_carlo: MonteCarloSettings,
    #[serde(default)]
    pub switching: SwitchingSettings,
}

impl ValuationSettings {
    #[must_use]
    pub fn new(horizon: Horizon, discount: DiscountSchedule, baseline: impl Into<ScenarioId>) -> Self {
        Self {
            horizon,
            discount,
            baseline: baseline.into(),
            alternatives: Vec::new(),
            benefit_streams: Vec::new(),
            assets: Vec::new(),
            irr: IrrSettings::default(),
            monte_carlo: MonteCarloSettings::default(),
            switching: SwitchingSettings::default(),
        }
    }

    #[must_use]
    pub fn alternative(mut self, scenario: impl Into<ScenarioId>) -> Self {
        self.alternatives.push(scenario.into());
        self
    }

    #[must_use]
    pub fn benefit(mut self, stream: BenefitStream) -> Self {
        self.benefit_streams.push(stream);
        self
    }

    #[must_use]
    pub fn asset(mut self, class: &str, lifetime: AssetLifetime) -> Self {
        self.assets.push(AssetClassSpec {
            class: class.to_string(),
            lifetime,
        });
        self
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, SettingsError> {
        let settings: Self = serde_saphyr::from_str(yaml)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_yaml(&self) -> Result<String, SettingsError> {
        Ok(serde_saphyr::to_string(self)?)
    }

    /// Baseline first, then alternatives in declared order
    pub fn scenarios(&self) -> impl Iterator<Item = &ScenarioId> {
        std::iter::once(&self.baseline).chain(self.alternatives.iter())
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.horizon.is_empty() {
            return Err(SettingsError::Invalid(format!(
                "horizon {}..={} is empty",
                self.horizon.start_year, self.horizon.end_year
            )));
        }
        self.discount.validate()?;

        let mut seen = BTreeSet::new();
        for scenario in self.scenarios() {
            if !seen.insert(scenario) {
                return Err(SettingsError::Invalid(format!(
                    "scenario '{scenario}' is listed more than once"
                )));
            }
        }

        let mut streams = BTreeSet::new();
        for stream in &self.benefit_streams {
            if !streams.insert(stream.name.as_str()) {
                return Err(SettingsError::Invalid(format!(
                    "benefit stream '{}' is declared more than once",
                    stream.name
                )));
            }
        }

        let mut classes = BTreeSet::new();
        for asset in &self.assets {
            if !classes.insert(asset.class.as_str()) {
                return Err(SettingsError::Invalid(format!(
                    "asset class '{}' is declared more than once",
                    asset.class
                )));
            }
            if let AssetLifetime::Years(years) = asset.lifetime {
                if !(years.is_finite() && years > 0.0) {
                    return Err(SettingsError::Invalid(format!(
                        "asset class '{}' has non-positive lifetime {years}",
                        asset.class
                    )));
                }
            }
        }

        let irr = &self.irr;
        if !(irr.lower > -1.0 && irr.lower < irr.upper && irr.upper.is_finite()) {
            return Err(SettingsError::Invalid(format!(
                "IRR bracket [{}, {}] must satisfy -1 < lower < upper",
                irr.lower, irr.upper
            )));
        }
        if !(irr.tolerance > 0.0) || irr.max_iterations == 0 {
            return Err(SettingsError::Invalid(
                "IRR tolerance and iteration cap must be positive".to_string(),
            ));
        }

        let mc = &self.monte_carlo;
        if mc.batch_size == 0 {
            return Err(SettingsError::Invalid(
                "Monte Carlo batch size must be positive".to_string(),
            ));
        }
        if let Some(p) = mc.percentiles.iter().find(|p| !(0.0..=1.0).contains(*p)) {
            return Err(SettingsError::Invalid(format!(
                "percentile {p} is outside [0, 1]"
            )));
        }
        Ok(())
    }
}
