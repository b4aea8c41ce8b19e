//! Switching values
//!
//! The switching value of a parameter for a pair of scenarios is the value at
//! which their NPVs are equal. It is found from the points already tested by
//! the sensitivity sweep: the difference ΔNPV(x) is linearly interpolated
//! between the adjacent tested values that bracket a sign change. Linear
//! interpolation is an approximation that is only as good as NPV is close to
//! linear in the parameter over that interval.
//!
//! When no tested pair brackets a sign change the result says so. A value
//! projected beyond the tested range is only reported on request and is
//! always marked [`SwitchingStatus::Extrapolated`].

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, ValuationError};
use crate::model::{ParamKey, ScenarioId};
use crate::sensitivity::SensitivityTable;
use crate::settings::ValuationSettings;

/// ΔNPV magnitudes below this are treated as zero
const EQUALITY_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchingStatus {
    /// Found between two tested values
    WithinRange,
    /// Projected outside the tested range from its endpoints
    Extrapolated,
    /// ΔNPV keeps one sign over the tested range
    NoSwitchInRange,
    /// The scenarios have equal NPV at every tested value
    AlwaysEqual,
}

/// Outcome of one switching-value search
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwitchingSolution {
    pub value: Option<f64>,
    pub status: SwitchingStatus,
    /// True when a tested value itself gives equal NPVs
    pub exact: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchingValueResult {
    pub first: ScenarioId,
    pub second: ScenarioId,
    pub parameter: ParamKey,
    pub switching_value: Option<f64>,
    /// Whether `switching_value` lies inside `[tested_low, tested_high]`
    pub in_range: bool,
    pub status: SwitchingStatus,
    pub exact: bool,
    pub tested_low: f64,
    pub tested_high: f64,
}

/// Solve ΔNPV(x) = NPV_first(x) - NPV_second(x) = 0.
///
/// Both point sets are `(value, npv)` at the same tested values, sorted by
/// value.
pub fn solve_switching_value(
    first: &[(f64, f64)],
    second: &[(f64, f64)],
    allow_extrapolation: bool,
) -> Result<SwitchingSolution> {
    if first.len() != second.len() || first.iter().zip(second).any(|(a, b)| a.0 != b.0) {
        return Err(ValuationError::InvalidInput(
            "switching value needs NPVs at the same tested values".to_string(),
        ));
    }
    let delta: Vec<(f64, f64)> = first
        .iter()
        .zip(second)
        .map(|(a, b)| (a.0, a.1 - b.1))
        .collect();

    let not_found = SwitchingSolution {
        value: None,
        status: SwitchingStatus::NoSwitchInRange,
        exact: false,
    };
    if delta.is_empty() {
        return Ok(not_found);
    }
    if delta.iter().all(|(_, d)| d.abs() < EQUALITY_TOLERANCE) {
        return Ok(SwitchingSolution {
            value: None,
            status: SwitchingStatus::AlwaysEqual,
            exact: false,
        });
    }

    for (i, &(x, d)) in delta.iter().enumerate() {
        if d.abs() < EQUALITY_TOLERANCE {
            return Ok(SwitchingSolution {
                value: Some(x),
                status: SwitchingStatus::WithinRange,
                exact: true,
            });
        }
        if let Some(&(x_next, d_next)) = delta.get(i + 1) {
            if x_next > x && d.signum() != d_next.signum() && d_next.abs() >= EQUALITY_TOLERANCE {
                return Ok(SwitchingSolution {
                    value: Some(x + (x_next - x) * d / (d - d_next)),
                    status: SwitchingStatus::WithinRange,
                    exact: false,
                });
            }
        }
    }

    if !allow_extrapolation {
        return Ok(not_found);
    }
    let (x0, d0) = delta[0];
    let (xn, dn) = delta[delta.len() - 1];
    if xn <= x0 || dn == d0 {
        return Ok(not_found);
    }
    Ok(SwitchingSolution {
        value: Some(x0 - d0 * (xn - x0) / (dn - d0)),
        status: SwitchingStatus::Extrapolated,
        exact: false,
    })
}

/// Switching values for every parameter of `table` and every pair of
/// scenarios (baseline first, then alternatives in order).
///
/// The baseline's NPV against itself is zero at every tested value, so pairs
/// involving the baseline give the break-even value of the alternative.
pub fn switching_table(
    table: &SensitivityTable,
    settings: &ValuationSettings,
) -> Result<Vec<SwitchingValueResult>> {
    let allow_extrapolation = settings.switching.allow_extrapolation;
    let scenarios: Vec<&ScenarioId> = settings.scenarios().collect();
    let mut results = Vec::new();

    for parameter in table.parameters() {
        let mut curves: Vec<(&ScenarioId, Vec<(f64, f64)>)> = Vec::with_capacity(scenarios.len());
        let mut tested = None;
        for &scenario in &scenarios[1..] {
            if let Some(row) = table.row(parameter, scenario) {
                tested = Some((row.low.value, row.high.value));
                curves.push((scenario, row.npv_points()));
            }
        }
        let Some((tested_low, tested_high)) = tested else {
            continue;
        };
        let baseline_curve = curves[0].1.iter().map(|&(x, _)| (x, 0.0)).collect();
        curves.insert(0, (scenarios[0], baseline_curve));

        for (i, (first, first_points)) in curves.iter().enumerate() {
            for (second, second_points) in &curves[i + 1..] {
                let solution = solve_switching_value(first_points, second_points, allow_extrapolation)?;
                let in_range = solution
                    .value
                    .is_some_and(|x| tested_low <= x && x <= tested_high);
                debug!(
                    parameter = %parameter,
                    first = %first,
                    second = %second,
                    status = ?solution.status,
                    "switching value"
                );
                results.push(SwitchingValueResult {
                    first: (*first).clone(),
                    second: (*second).clone(),
                    parameter: parameter.clone(),
                    switching_value: solution.value,
                    in_range,
                    status: solution.status,
                    exact: solution.exact,
                    tested_low,
                    tested_high,
                });
            }
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpolates_between_bracketing_points() {
        let a = [(0.0, 100.0), (5.0, 25.0), (10.0, -50.0)];
        let b = [(0.0, 20.0), (5.0, 20.0), (10.0, 20.0)];
        let solution = solve_switching_value(&a, &b, false).unwrap();
        assert_eq!(solution.status, SwitchingStatus::WithinRange);
        let x = solution.value.unwrap();
        assert!((x - 16.0 / 3.0).abs() < 1e-12, "x = {x}");
        assert!(!solution.exact);
    }

    #[test]
    fn test_no_silent_extrapolation() {
        let a = [(0.0, 100.0), (5.0, 80.0), (10.0, 60.0)];
        let b = [(0.0, 20.0), (5.0, 20.0), (10.0, 20.0)];
        let solution = solve_switching_value(&a, &b, false).unwrap();
        assert_eq!(solution.status, SwitchingStatus::NoSwitchInRange);
        assert_eq!(solution.value, None);

        // Δ goes 80 -> 40 over [0, 10], reaching zero at 20
        let solution = solve_switching_value(&a, &b, true).unwrap();
        assert_eq!(solution.status, SwitchingStatus::Extrapolated);
        assert!((solution.value.unwrap() - 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_exact_hit_and_always_equal() {
        let a = [(1.0, 10.0), (2.0, 20.0), (3.0, 30.0)];
        let b = [(1.0, 0.0), (2.0, 20.0), (3.0, 50.0)];
        let solution = solve_switching_value(&a, &b, false).unwrap();
        assert_eq!(solution.value, Some(2.0));
        assert!(solution.exact);

        let solution = solve_switching_value(&a, &a, true).unwrap();
        assert_eq!(solution.status, SwitchingStatus::AlwaysEqual);
        assert_eq!(solution.value, None);
    }

    #[test]
    fn test_mismatched_points_rejected() {
        let a = [(0.0, 1.0), (1.0, 2.0)];
        let b = [(0.0, 1.0), (2.0, 2.0)];
        assert!(matches!(
            solve_switching_value(&a, &b, false),
            Err(ValuationError::InvalidInput(_))
        ));
    }
}
