//! Incremental comparison of an alternative against a baseline
//!
//! Benefits are always relative to the baseline: each named benefit stream
//! compares the alternative's level of an impact (fuel spend, emissions
//! damages, ...) with the baseline's level of the same impact. The metrics
//! follow the usual project appraisal conventions:
//!
//! - `NPV = PV(benefits) - PV(incremental cost)`
//! - `BCR = PV(benefits) / PV(incremental cost)`, with a "dominant" outcome
//!   when the alternative is no more expensive and still delivers benefits
//! - `IRR` from the undiscounted yearly incremental cash flows by bisection
//! - payback as the first year cumulative benefits cover cumulative cost

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::discount::DiscountSchedule;
use crate::error::{Result, ValuationError};
use crate::model::ScenarioId;
use crate::valuation::ScenarioValuation;

/// Cost-category key used for the salvage credit in breakdowns
pub const SALVAGE_CATEGORY: &str = "salvage_credit";

// =========================================================================
// Benefit streams
// =========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BenefitDirection {
    /// Benefit is the baseline level minus the alternative level
    Avoided,
    /// Benefit is the alternative level minus the baseline level
    Added,
}

impl BenefitDirection {
    #[must_use]
    pub fn benefit(self, alternative: f64, baseline: f64) -> f64 {
        match self {
            BenefitDirection::Avoided => baseline - alternative,
            BenefitDirection::Added => alternative - baseline,
        }
    }
}

/// A named impact compared between scenarios to form a benefit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenefitStream {
    pub name: String,
    pub direction: BenefitDirection,
}

impl BenefitStream {
    #[must_use]
    pub fn avoided(name: &str) -> Self {
        Self {
            name: name.to_string(),
            direction: BenefitDirection::Avoided,
        }
    }

    #[must_use]
    pub fn added(name: &str) -> Self {
        Self {
            name: name.to_string(),
            direction: BenefitDirection::Added,
        }
    }
}

// =========================================================================
// Benefit-cost ratio
// =========================================================================

/// Benefit-cost ratio, with a sentinel for alternatives that cost no more
/// than the baseline yet still deliver benefits
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenefitCostRatio {
    Ratio(f64),
    Dominant,
}

impl BenefitCostRatio {
    #[must_use]
    pub fn compute(pv_incremental_cost: f64, pv_benefits: f64) -> Self {
        if pv_incremental_cost > 0.0 {
            BenefitCostRatio::Ratio(pv_benefits / pv_incremental_cost)
        } else if pv_benefits > 0.0 {
            BenefitCostRatio::Dominant
        } else {
            BenefitCostRatio::Ratio(0.0)
        }
    }

    /// The ratio when it is a finite number
    #[must_use]
    pub fn finite(self) -> Option<f64> {
        match self {
            BenefitCostRatio::Ratio(r) if r.is_finite() => Some(r),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_dominant(self) -> bool {
        matches!(self, BenefitCostRatio::Dominant)
    }
}

// =========================================================================
// IRR
// =========================================================================

/// Bracket and stopping rule for the IRR bisection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IrrSettings {
    #[serde(default = "default_irr_lower")]
    pub lower: f64,
    #[serde(default = "default_irr_upper")]
    pub upper: f64,
    #[serde(default = "default_irr_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_irr_max_iterations")]
    pub max_iterations: usize,
}

fn default_irr_lower() -> f64 {
    -0.5
}

fn default_irr_upper() -> f64 {
    2.0
}

fn default_irr_tolerance() -> f64 {
    1e-7
}

fn default_irr_max_iterations() -> usize {
    100
}

impl Default for IrrSettings {
    fn default() -> Self {
        Self {
            lower: default_irr_lower(),
            upper: default_irr_upper(),
            tolerance: default_irr_tolerance(),
            max_iterations: default_irr_max_iterations(),
        }
    }
}

/// NPV of `cash_flows` with the first entry at t = 0
#[must_use]
pub fn npv_at_rate(cash_flows: &[f64], rate: f64) -> f64 {
    let one_plus_r = 1.0 + rate;
    let mut discount = 1.0;
    let mut total = 0.0;
    for (t, cf) in cash_flows.iter().enumerate() {
        if t > 0 {
            discount *= one_plus_r;
        }
        total += cf / discount;
    }
    total
}

/// Internal rate of return by bisection over `[settings.lower, settings.upper]`.
///
/// Returns `None` when the bracket has no sign change, every flow is zero, or
/// the iteration cap is reached first.
#[must_use]
pub fn internal_rate_of_return(cash_flows: &[f64], settings: &IrrSettings) -> Option<f64> {
    if cash_flows.iter().all(|cf| *cf == 0.0) {
        return None;
    }

    let mut low = settings.lower;
    let mut high = settings.upper;
    let mut f_low = npv_at_rate(cash_flows, low);
    let f_high = npv_at_rate(cash_flows, high);
    if !f_low.is_finite() || !f_high.is_finite() {
        return None;
    }
    if f_low == 0.0 {
        return Some(low);
    }
    if f_high == 0.0 {
        return Some(high);
    }
    if f_low.signum() == f_high.signum() {
        return None;
    }

    for _ in 0..settings.max_iterations {
        let mid = f64::midpoint(low, high);
        let f_mid = npv_at_rate(cash_flows, mid);
        if f_mid == 0.0 || (high - low) / 2.0 < settings.tolerance {
            return Some(mid);
        }
        if f_mid.signum() == f_low.signum() {
            low = mid;
            f_low = f_mid;
        } else {
            high = mid;
        }
    }
    None
}

/// First year in which cumulative benefits reach cumulative cost.
///
/// `flows` holds `(year, cost, benefit)`; years where both running totals are
/// still zero do not count.
#[must_use]
pub fn payback_year(flows: impl IntoIterator<Item = (i32, f64, f64)>) -> Option<i32> {
    let mut cumulative_cost = 0.0;
    let mut cumulative_benefit = 0.0;
    for (year, cost, benefit) in flows {
        cumulative_cost += cost;
        cumulative_benefit += benefit;
        let started = cumulative_cost != 0.0 || cumulative_benefit != 0.0;
        if started && cumulative_benefit >= cumulative_cost {
            return Some(year);
        }
    }
    None
}

// =========================================================================
// Incremental result
// =========================================================================

/// Undiscounted incremental figures for one year
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IncrementalYear {
    pub year: i32,
    /// Alternative cost less baseline cost, net of any salvage credit
    pub incremental_cost: f64,
    pub benefits: f64,
}

impl IncrementalYear {
    #[must_use]
    pub fn net(&self) -> f64 {
        self.benefits - self.incremental_cost
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncrementalResult {
    pub alternative: ScenarioId,
    pub baseline: ScenarioId,
    pub npv: f64,
    pub bcr: BenefitCostRatio,
    /// `None` when the IRR search did not converge
    pub irr: Option<f64>,
    pub payback_year: Option<i32>,
    pub discounted_payback_year: Option<i32>,
    pub pv_incremental_cost: f64,
    pub pv_total_benefits: f64,
    /// Per cost category, alternative less baseline, including the salvage credit
    pub pv_cost_breakdown: BTreeMap<String, f64>,
    pub pv_benefit_breakdown: BTreeMap<String, f64>,
    pub annual: Vec<IncrementalYear>,
}

/// Compare `alternative` against `baseline` over their shared horizon
pub fn compare(
    alternative: &ScenarioValuation,
    baseline: &ScenarioValuation,
    streams: &[BenefitStream],
    irr_settings: &IrrSettings,
    schedule: &DiscountSchedule,
) -> Result<IncrementalResult> {
    let alt_records = &alternative.result.records;
    let base_records = &baseline.result.records;
    let same_years = alt_records.len() == base_records.len()
        && alt_records
            .iter()
            .zip(base_records)
            .all(|(a, b)| a.year == b.year);
    if !same_years {
        return Err(ValuationError::HorizonMismatch {
            first: alternative.scenario().clone(),
            second: baseline.scenario().clone(),
        });
    }

    let salvage_delta = alternative.salvage_undiscounted() - baseline.salvage_undiscounted();
    let last = alt_records.len().saturating_sub(1);
    let annual: Vec<IncrementalYear> = alt_records
        .iter()
        .zip(base_records)
        .enumerate()
        .map(|(i, (a, b))| {
            let mut incremental_cost = a.total_cost() - b.total_cost();
            if i == last {
                incremental_cost -= salvage_delta;
            }
            let benefits = streams
                .iter()
                .map(|s| s.direction.benefit(a.impact(&s.name), b.impact(&s.name)))
                .sum();
            IncrementalYear {
                year: a.year,
                incremental_cost,
                benefits,
            }
        })
        .collect();

    let alt_totals = &alternative.totals;
    let base_totals = &baseline.totals;

    let mut pv_cost_breakdown: BTreeMap<String, f64> = BTreeMap::new();
    for (category, pv) in &alt_totals.pv_costs {
        *pv_cost_breakdown.entry(category.clone()).or_insert(0.0) += pv;
    }
    for (category, pv) in &base_totals.pv_costs {
        *pv_cost_breakdown.entry(category.clone()).or_insert(0.0) -= pv;
    }
    pv_cost_breakdown.insert(
        SALVAGE_CATEGORY.to_string(),
        -(alt_totals.pv_salvage_total - base_totals.pv_salvage_total),
    );
    let pv_incremental_cost = alt_totals.pv_net_cost - base_totals.pv_net_cost;

    let pv_benefit_breakdown: BTreeMap<String, f64> = streams
        .iter()
        .map(|s| {
            let alt = alt_totals.pv_impacts.get(&s.name).copied().unwrap_or(0.0);
            let base = base_totals.pv_impacts.get(&s.name).copied().unwrap_or(0.0);
            (s.name.clone(), s.direction.benefit(alt, base))
        })
        .collect();
    let pv_total_benefits: f64 = pv_benefit_breakdown.values().sum();

    let cash_flows: Vec<f64> = annual.iter().map(IncrementalYear::net).collect();
    let irr = internal_rate_of_return(&cash_flows, irr_settings);
    if irr.is_none() {
        debug!(
            alternative = %alternative.scenario(),
            baseline = %baseline.scenario(),
            "IRR did not converge"
        );
    }

    let payback = payback_year(annual.iter().map(|y| (y.year, y.incremental_cost, y.benefits)));
    let discounted_payback = payback_year(annual.iter().map(|y| {
        let factor = schedule.discount_factor(y.year);
        (y.year, y.incremental_cost * factor, y.benefits * factor)
    }));

    Ok(IncrementalResult {
        alternative: alternative.scenario().clone(),
        baseline: baseline.scenario().clone(),
        npv: pv_total_benefits - pv_incremental_cost,
        bcr: BenefitCostRatio::compute(pv_incremental_cost, pv_total_benefits),
        irr,
        payback_year: payback,
        discounted_payback_year: discounted_payback,
        pv_incremental_cost,
        pv_total_benefits,
        pv_cost_breakdown,
        pv_benefit_breakdown,
        annual,
    })
}
