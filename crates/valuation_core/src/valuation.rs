//! Present-value totals for one scenario

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::discount::DiscountSchedule;
use crate::model::{AnnualRecord, ScenarioId, ScenarioResult};
use crate::salvage::{AssetVintageLedger, SalvageValue, salvage_value};

/// Σ `selector(record) × discount_factor(record.year)`
pub fn present_value<F>(records: &[AnnualRecord], schedule: &DiscountSchedule, selector: F) -> f64
where
    F: Fn(&AnnualRecord) -> f64,
{
    records
        .iter()
        .map(|r| selector(r) * schedule.discount_factor(r.year))
        .sum()
}

/// Discounted totals of a scenario, all values at the base year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountedTotals {
    pub scenario: ScenarioId,
    pub pv_costs: BTreeMap<String, f64>,
    pub pv_cost_total: f64,
    pub pv_impacts: BTreeMap<String, f64>,
    pub pv_salvage: BTreeMap<String, f64>,
    pub pv_salvage_total: f64,
    /// Costs less salvage credit
    pub pv_net_cost: f64,
    pub pv_generation: f64,
    /// PV cost per unit of PV generation; `None` when nothing is generated
    pub levelized_cost: Option<f64>,
}

/// A scenario's yearly records together with its discounted totals
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioValuation {
    pub result: ScenarioResult,
    pub totals: DiscountedTotals,
    pub salvage: Vec<SalvageValue>,
}

impl ScenarioValuation {
    #[must_use]
    pub fn scenario(&self) -> &ScenarioId {
        &self.result.scenario
    }

    /// Salvage credited in the final horizon year, before discounting
    #[must_use]
    pub fn salvage_undiscounted(&self) -> f64 {
        self.salvage.iter().map(|s| s.undiscounted).sum()
    }
}

/// Discount a scenario result and credit salvage for the asset classes in
/// `lifetimes` (`(class, years)` pairs).
pub fn value_scenario(
    result: ScenarioResult,
    schedule: &DiscountSchedule,
    lifetimes: &[(String, f64)],
) -> ScenarioValuation {
    let records = &result.records;

    let mut pv_costs: BTreeMap<String, f64> = BTreeMap::new();
    let mut pv_impacts: BTreeMap<String, f64> = BTreeMap::new();
    let mut pv_generation = 0.0;
    for record in records {
        let factor = schedule.discount_factor(record.year);
        for (category, amount) in &record.costs {
            *pv_costs.entry(category.clone()).or_insert(0.0) += amount * factor;
        }
        for (stream, level) in &record.impacts {
            *pv_impacts.entry(stream.clone()).or_insert(0.0) += level * factor;
        }
        pv_generation += record.generation * factor;
    }
    let pv_cost_total: f64 = pv_costs.values().sum();

    let salvage: Vec<SalvageValue> = match result.last_year() {
        Some(end_year) => lifetimes
            .iter()
            .map(|(class, lifetime)| {
                let ledger = AssetVintageLedger::from_result(&result, class);
                salvage_value(&ledger, end_year, *lifetime, schedule)
            })
            .collect(),
        None => Vec::new(),
    };
    let pv_salvage: BTreeMap<String, f64> = salvage
        .iter()
        .map(|s| (s.asset_class.clone(), s.discounted))
        .collect();
    let pv_salvage_total: f64 = pv_salvage.values().sum();

    let levelized_cost = (pv_generation > 0.0).then(|| pv_cost_total / pv_generation);

    let totals = DiscountedTotals {
        scenario: result.scenario.clone(),
        pv_costs,
        pv_cost_total,
        pv_impacts,
        pv_salvage,
        pv_salvage_total,
        pv_net_cost: pv_cost_total - pv_salvage_total,
        pv_generation,
        levelized_cost,
    };

    ScenarioValuation {
        result,
        totals,
        salvage,
    }
}
