//! End-of-horizon residual value
//!
//! Assets still in service at the end of the horizon carry value the analysis
//! would otherwise ignore. Each asset class is tracked as a ledger of install
//! vintages rebuilt from a scenario's cumulative installed quantities, and
//! every vintage is written down straight-line over the class lifetime.

use serde::{Deserialize, Serialize};

use crate::config::Configuration;
use crate::discount::DiscountSchedule;
use crate::error::ConfigError;
use crate::model::{AnnualRecord, ParamKey, ScenarioResult};

/// Quantity changes smaller than this are treated as noise
const QUANTITY_EPSILON: f64 = 1e-9;

/// Lifetime of an asset class: a fixed number of years or a configuration
/// parameter, so that lifetimes can be perturbed like any other input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AssetLifetime {
    Years(f64),
    Parameter(ParamKey),
}

impl AssetLifetime {
    pub fn resolve(&self, config: &Configuration) -> Result<f64, ConfigError> {
        let (years, key) = match self {
            AssetLifetime::Years(years) => (*years, None),
            AssetLifetime::Parameter(key) => (config.number(key)?, Some(key)),
        };
        if years.is_finite() && years > 0.0 {
            Ok(years)
        } else {
            Err(ConfigError::InvalidParameterValue {
                key: key.cloned().unwrap_or_else(|| ParamKey::from("assets.lifetime")),
                value: years,
                reason: "asset lifetime must be positive".to_string(),
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetClassSpec {
    pub class: String,
    pub lifetime: AssetLifetime,
}

/// Quantity installed in one year at that year's unit cost
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VintageCohort {
    pub install_year: i32,
    pub quantity: f64,
    pub unit_cost: f64,
}

/// Install vintages still in service for one asset class
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AssetVintageLedger {
    pub asset_class: String,
    cohorts: Vec<VintageCohort>,
}

impl AssetVintageLedger {
    /// Rebuild the ledger from reported cumulative stock.
    ///
    /// Growth opens a new cohort at the year's unit cost; shrinkage retires
    /// the oldest cohorts first.
    #[must_use]
    pub fn from_records(records: &[AnnualRecord], asset_class: &str) -> Self {
        let mut ledger = Self {
            asset_class: asset_class.to_string(),
            cohorts: Vec::new(),
        };
        let mut previous = 0.0;
        for record in records {
            let Some(position) = record.assets.get(asset_class) else {
                continue;
            };
            let delta = position.installed - previous;
            if delta > QUANTITY_EPSILON {
                ledger.cohorts.push(VintageCohort {
                    install_year: record.year,
                    quantity: delta,
                    unit_cost: position.unit_cost,
                });
            } else if delta < -QUANTITY_EPSILON {
                ledger.retire(-delta);
            }
            previous = position.installed;
        }
        ledger
    }

    #[must_use]
    pub fn from_result(result: &ScenarioResult, asset_class: &str) -> Self {
        Self::from_records(&result.records, asset_class)
    }

    fn retire(&mut self, mut quantity: f64) {
        while quantity > QUANTITY_EPSILON {
            let Some(oldest) = self.cohorts.first_mut() else {
                break;
            };
            if oldest.quantity > quantity {
                oldest.quantity -= quantity;
                break;
            }
            quantity -= oldest.quantity;
            self.cohorts.remove(0);
        }
    }

    #[must_use]
    pub fn cohorts(&self) -> &[VintageCohort] {
        &self.cohorts
    }

    /// Total quantity across all cohorts
    #[must_use]
    pub fn installed(&self) -> f64 {
        self.cohorts.iter().map(|c| c.quantity).sum()
    }

    /// Undiscounted straight-line residual value at `end_year`
    #[must_use]
    pub fn residual_value(&self, end_year: i32, lifetime: f64) -> f64 {
        self.cohorts
            .iter()
            .map(|c| c.quantity * c.unit_cost * remaining_fraction(c.install_year, end_year, lifetime))
            .sum()
    }
}

/// Share of useful life left at `end_year` for an asset installed in
/// `install_year`; zero once the asset is `lifetime` years old.
#[must_use]
pub fn remaining_fraction(install_year: i32, end_year: i32, lifetime: f64) -> f64 {
    if lifetime <= 0.0 {
        return 0.0;
    }
    let age = f64::from(end_year - install_year);
    (1.0 - age / lifetime).clamp(0.0, 1.0)
}

/// Residual value of one asset class at the end of the horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalvageValue {
    pub asset_class: String,
    pub undiscounted: f64,
    pub discounted: f64,
}

/// Residual value of `ledger` at `end_year`, discounted to the base year
#[must_use]
pub fn salvage_value(
    ledger: &AssetVintageLedger,
    end_year: i32,
    lifetime: f64,
    schedule: &DiscountSchedule,
) -> SalvageValue {
    let undiscounted = ledger.residual_value(end_year, lifetime);
    SalvageValue {
        asset_class: ledger.asset_class.clone(),
        undiscounted,
        discounted: undiscounted * schedule.discount_factor(end_year),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pv_records() -> Vec<AnnualRecord> {
        vec![
            AnnualRecord::new(2025).with_asset("pv", 10.0, 1_000.0),
            AnnualRecord::new(2026).with_asset("pv", 10.0, 900.0),
            AnnualRecord::new(2027).with_asset("pv", 25.0, 800.0),
            AnnualRecord::new(2028).with_asset("pv", 20.0, 700.0),
            AnnualRecord::new(2029).with_asset("pv", 30.0, 600.0),
        ]
    }

    #[test]
    fn test_exactly_lifetime_old_is_worthless() {
        assert_eq!(remaining_fraction(2030, 2050, 20.0), 0.0);
        assert_eq!(remaining_fraction(2020, 2050, 20.0), 0.0);
        assert!((remaining_fraction(2040, 2050, 20.0) - 0.5).abs() < 1e-12);
        assert_eq!(remaining_fraction(2050, 2050, 20.0), 1.0);
    }

    #[test]
    fn test_vintages_sum_to_reported_stock() {
        let records = pv_records();
        for n in 1..=records.len() {
            let ledger = AssetVintageLedger::from_records(&records[..n], "pv");
            let reported = records[n - 1].installed("pv");
            assert!(
                (ledger.installed() - reported).abs() < 1e-9,
                "year {}: {} vs {}",
                records[n - 1].year,
                ledger.installed(),
                reported
            );
        }
    }

    #[test]
    fn test_retirement_is_oldest_first() {
        let ledger = AssetVintageLedger::from_records(&pv_records(), "pv");
        let cohorts = ledger.cohorts();
        // 2025 cohort shrinks from 10 to 5 when stock drops in 2028
        assert_eq!(cohorts.len(), 3);
        assert_eq!(cohorts[0].install_year, 2025);
        assert!((cohorts[0].quantity - 5.0).abs() < 1e-9);
        assert_eq!(cohorts[1].install_year, 2027);
        assert_eq!(cohorts[2].install_year, 2029);
        assert_eq!(cohorts[2].unit_cost, 600.0);
    }

    #[test]
    fn test_salvage_value_discounted() {
        let records = vec![
            AnnualRecord::new(2025).with_asset("genset", 2.0, 10_000.0),
            AnnualRecord::new(2026).with_asset("genset", 2.0, 10_000.0),
        ];
        let ledger = AssetVintageLedger::from_records(&records, "genset");
        let schedule = DiscountSchedule::flat(2025, 0.10);

        let salvage = salvage_value(&ledger, 2026, 4.0, &schedule);
        // One year of a four-year life used
        assert!((salvage.undiscounted - 15_000.0).abs() < 1e-9);
        assert!((salvage.discounted - 15_000.0 / 1.1).abs() < 1e-9);
    }

    #[test]
    fn test_lifetime_from_parameter() {
        let config = crate::config::ConfigurationBuilder::new()
            .number("assets.pv_lifetime", 25.0)
            .number("assets.bad_lifetime", 0.0)
            .build()
            .unwrap();
        assert_eq!(
            AssetLifetime::Parameter(ParamKey::from("assets.pv_lifetime"))
                .resolve(&config)
                .unwrap(),
            25.0
        );
        assert!(
            AssetLifetime::Parameter(ParamKey::from("assets.bad_lifetime"))
                .resolve(&config)
                .is_err()
        );
        assert_eq!(AssetLifetime::Years(15.0).resolve(&config).unwrap(), 15.0);
    }
}
