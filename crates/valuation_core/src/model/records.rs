//! Yearly records produced by the scenario evaluator
//!
//! Contains the per-year output of one scenario evaluation and the ordered
//! sequence of those records that makes up a scenario result.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ids::ScenarioId;

/// Inclusive range of calendar years covered by an analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Horizon {
    pub start_year: i32,
    pub end_year: i32,
}

impl Horizon {
    #[must_use]
    pub fn new(start_year: i32, end_year: i32) -> Self {
        Self {
            start_year,
            end_year,
        }
    }

    #[must_use]
    pub fn years(&self) -> std::ops::RangeInclusive<i32> {
        self.start_year..=self.end_year
    }

    #[must_use]
    pub fn len(&self) -> usize {
        if self.end_year < self.start_year {
            0
        } else {
            (self.end_year - self.start_year) as usize + 1
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Installed stock of one asset class as reported for a year
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssetPosition {
    /// Cumulative installed quantity at the end of the year
    pub installed: f64,
    /// Cost per unit of anything installed during this year
    pub unit_cost: f64,
}

/// One calendar year's figures for one scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnualRecord {
    pub year: i32,
    /// Cost categories that make up the scenario's cost (capital, operating, ...)
    #[serde(default)]
    pub costs: BTreeMap<String, f64>,
    /// Levels of benefit-bearing quantities (fuel spend, emissions damages, ...)
    /// compared against the baseline to form benefit streams
    #[serde(default)]
    pub impacts: BTreeMap<String, f64>,
    /// Energy generated or served
    #[serde(default)]
    pub generation: f64,
    #[serde(default)]
    pub assets: BTreeMap<String, AssetPosition>,
}

impl AnnualRecord {
    #[must_use]
    pub fn new(year: i32) -> Self {
        Self {
            year,
            costs: BTreeMap::new(),
            impacts: BTreeMap::new(),
            generation: 0.0,
            assets: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_cost(mut self, category: &str, amount: f64) -> Self {
        *self.costs.entry(category.to_string()).or_insert(0.0) += amount;
        self
    }

    #[must_use]
    pub fn with_impact(mut self, stream: &str, level: f64) -> Self {
        *self.impacts.entry(stream.to_string()).or_insert(0.0) += level;
        self
    }

    #[must_use]
    pub fn with_generation(mut self, generation: f64) -> Self {
        self.generation = generation;
        self
    }

    #[must_use]
    pub fn with_asset(mut self, class: &str, installed: f64, unit_cost: f64) -> Self {
        self.assets.insert(
            class.to_string(),
            AssetPosition {
                installed,
                unit_cost,
            },
        );
        self
    }

    /// Sum of all cost categories
    #[must_use]
    pub fn total_cost(&self) -> f64 {
        self.costs.values().sum()
    }

    #[must_use]
    pub fn impact(&self, stream: &str) -> f64 {
        self.impacts.get(stream).copied().unwrap_or(0.0)
    }

    /// Cumulative installed quantity for an asset class (0 when not reported)
    #[must_use]
    pub fn installed(&self, class: &str) -> f64 {
        self.assets.get(class).map_or(0.0, |a| a.installed)
    }
}

/// Chronological records of one scenario under one configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario: ScenarioId,
    pub records: Vec<AnnualRecord>,
}

impl ScenarioResult {
    #[must_use]
    pub fn first_year(&self) -> Option<i32> {
        self.records.first().map(|r| r.year)
    }

    #[must_use]
    pub fn last_year(&self) -> Option<i32> {
        self.records.last().map(|r| r.year)
    }

    #[must_use]
    pub fn record(&self, year: i32) -> Option<&AnnualRecord> {
        let first = self.first_year()?;
        let idx = usize::try_from(year - first).ok()?;
        self.records.get(idx).filter(|r| r.year == year)
    }

    #[must_use]
    pub fn years(&self) -> Vec<i32> {
        self.records.iter().map(|r| r.year).collect()
    }

    /// All asset classes reported in any year, in sorted order
    #[must_use]
    pub fn asset_classes(&self) -> Vec<&str> {
        let mut classes: Vec<&str> = self
            .records
            .iter()
            .flat_map(|r| r.assets.keys().map(String::as_str))
            .collect();
        classes.sort_unstable();
        classes.dedup();
        classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_horizon_len() {
        assert_eq!(Horizon::new(2025, 2025).len(), 1);
        assert_eq!(Horizon::new(2025, 2054).len(), 30);
        assert!(Horizon::new(2030, 2025).is_empty());
        assert_eq!(Horizon::new(2025, 2027).years().collect::<Vec<_>>(), [2025, 2026, 2027]);
    }

    #[test]
    fn test_record_builders_accumulate() {
        let record = AnnualRecord::new(2025)
            .with_cost("capital", 100.0)
            .with_cost("capital", 50.0)
            .with_cost("operating", 10.0)
            .with_impact("fuel", 7.0)
            .with_asset("pv", 20.0, 1_500.0);

        assert_eq!(record.total_cost(), 160.0);
        assert_eq!(record.impact("fuel"), 7.0);
        assert_eq!(record.impact("emissions"), 0.0);
        assert_eq!(record.installed("pv"), 20.0);
        assert_eq!(record.installed("cable"), 0.0);
    }

    #[test]
    fn test_scenario_result_lookup() {
        let result = ScenarioResult {
            scenario: ScenarioId::from("hybrid"),
            records: vec![
                AnnualRecord::new(2025).with_asset("pv", 1.0, 1.0),
                AnnualRecord::new(2026).with_asset("battery", 1.0, 1.0),
            ],
        };
        assert_eq!(result.first_year(), Some(2025));
        assert_eq!(result.last_year(), Some(2026));
        assert_eq!(result.record(2026).map(|r| r.year), Some(2026));
        assert!(result.record(2024).is_none());
        assert!(result.record(2027).is_none());
        assert_eq!(result.asset_classes(), ["battery", "pv"]);
    }
}
