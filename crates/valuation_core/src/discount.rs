//! Discount schedules
//!
//! A schedule converts a calendar year into the factor that brings a value in
//! that year back to the base year. Two shapes are supported:
//!
//! - **Flat**: `1 / (1 + r)^(year - base_year)`
//! - **Declining**: ordered tiers of year offsets, each with its own rate. The
//!   step from offset `k - 1` to offset `k` is discounted at the rate of the
//!   tier containing `k`, and the factor is the product of those steps.
//!
//! Two routes compute the same numbers: [`DiscountSchedule::discount_factor`]
//! multiplies one power per tier segment, while [`DiscountSchedule::curve`]
//! walks the horizon one year at a time. Both return exactly `1.0` at the base
//! year.

use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;

/// One band of a declining schedule, in whole-year offsets from the base year
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiscountTier {
    pub start_offset: u32,
    /// Inclusive; `None` means the tier never ends
    #[serde(default)]
    pub end_offset: Option<u32>,
    pub rate: f64,
}

impl DiscountTier {
    fn contains(&self, offset: u32) -> bool {
        offset >= self.start_offset && self.end_offset.is_none_or(|end| offset <= end)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DiscountRates {
    Flat { rate: f64 },
    Declining { tiers: Vec<DiscountTier> },
}

/// Discount rates relative to a base year.
///
/// Constructors and deserialization do not check the tiers. Factor and rate
/// lookups assume a schedule that passed [`DiscountSchedule::validate`];
/// `ValuationSettings::validate` runs it before any engine uses the schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountSchedule {
    pub base_year: i32,
    pub rates: DiscountRates,
}

/// Factors for a contiguous range of years
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountCurve {
    pub start_year: i32,
    pub factors: Vec<f64>,
}

impl DiscountCurve {
    #[must_use]
    pub fn factor(&self, year: i32) -> Option<f64> {
        let idx = usize::try_from(year - self.start_year).ok()?;
        self.factors.get(idx).copied()
    }

    #[must_use]
    pub fn end_year(&self) -> i32 {
        self.start_year + self.factors.len() as i32 - 1
    }
}

impl DiscountSchedule {
    #[must_use]
    pub fn flat(base_year: i32, rate: f64) -> Self {
        Self {
            base_year,
            rates: DiscountRates::Flat { rate },
        }
    }

    /// Unchecked; call [`DiscountSchedule::validate`] before use
    #[must_use]
    pub fn declining(base_year: i32, tiers: Vec<DiscountTier>) -> Self {
        Self {
            base_year,
            rates: DiscountRates::Declining { tiers },
        }
    }

    /// Check that tiers start at offset 0, are contiguous, and every rate is
    /// finite and greater than -100%.
    pub fn validate(&self) -> Result<(), ScheduleError> {
        let tiers = match &self.rates {
            DiscountRates::Flat { rate } => return check_rate(*rate),
            DiscountRates::Declining { tiers } => tiers,
        };

        let first = tiers.first().ok_or(ScheduleError::EmptyTiers)?;
        if first.start_offset != 0 {
            return Err(ScheduleError::FirstTierOffset(first.start_offset));
        }

        let mut expected = 0u32;
        for (i, tier) in tiers.iter().enumerate() {
            check_rate(tier.rate)?;
            if tier.start_offset != expected {
                return Err(ScheduleError::NonContiguous {
                    expected,
                    found: tier.start_offset,
                });
            }
            match tier.end_offset {
                Some(end) if end < tier.start_offset => {
                    return Err(ScheduleError::InvertedTier {
                        start: tier.start_offset,
                        end,
                    });
                }
                Some(end) => expected = end.saturating_add(1),
                None if i + 1 < tiers.len() => {
                    return Err(ScheduleError::OpenEndedTier(tier.start_offset));
                }
                None => {}
            }
        }
        Ok(())
    }

    /// Rate applied to the step that arrives at `offset` years after the base.
    ///
    /// Offsets at or before the base year use the first tier; offsets past the
    /// last tier keep its rate. A declining schedule with no tiers has no
    /// rate and gives 0, which `validate` rejects as `EmptyTiers`.
    #[must_use]
    pub fn rate_for_step(&self, offset: i64) -> f64 {
        match &self.rates {
            DiscountRates::Flat { rate } => *rate,
            DiscountRates::Declining { tiers } => {
                let Some(first) = tiers.first() else {
                    return 0.0;
                };
                if offset <= 0 {
                    return first.rate;
                }
                let offset = u32::try_from(offset).unwrap_or(u32::MAX);
                tiers
                    .iter()
                    .find(|t| t.contains(offset))
                    .or(tiers.last())
                    .map_or(first.rate, |t| t.rate)
            }
        }
    }

    /// Factor for `year`, computed in closed form per tier segment
    #[must_use]
    pub fn discount_factor(&self, year: i32) -> f64 {
        let offset = i64::from(year) - i64::from(self.base_year);
        if offset == 0 {
            return 1.0;
        }

        match &self.rates {
            DiscountRates::Flat { rate } => (1.0 + rate).powf(-(offset as f64)),
            DiscountRates::Declining { tiers } => {
                if offset < 0 {
                    return (1.0 + self.rate_for_step(0)).powf(-(offset as f64));
                }
                let mut factor = 1.0;
                let mut covered: i64 = 0;
                for (i, tier) in tiers.iter().enumerate() {
                    let from = i64::from(tier.start_offset).max(1);
                    let to = match tier.end_offset {
                        Some(end) if i + 1 < tiers.len() => i64::from(end).min(offset),
                        _ => offset,
                    };
                    if to >= from {
                        let steps = to - from + 1;
                        factor *= (1.0 + tier.rate).powf(-(steps as f64));
                        covered = to;
                    }
                    if covered >= offset {
                        break;
                    }
                }
                factor
            }
        }
    }

    /// Factors for `start..=end`, built year by year as a running product from
    /// the base year.
    #[must_use]
    pub fn curve(&self, start: i32, end: i32) -> DiscountCurve {
        if end < start {
            return DiscountCurve {
                start_year: start,
                factors: Vec::new(),
            };
        }

        let mut factors = vec![0.0; (end - start) as usize + 1];
        let mut put = |year: i32, value: f64| {
            if (start..=end).contains(&year) {
                factors[(year - start) as usize] = value;
            }
        };

        put(self.base_year, 1.0);

        let mut factor = 1.0;
        for year in (self.base_year + 1)..=end {
            let offset = i64::from(year) - i64::from(self.base_year);
            factor /= 1.0 + self.rate_for_step(offset);
            put(year, factor);
        }

        let mut factor = 1.0;
        let back_rate = self.rate_for_step(0);
        for year in (start..self.base_year).rev() {
            factor *= 1.0 + back_rate;
            put(year, factor);
        }

        DiscountCurve {
            start_year: start,
            factors,
        }
    }
}

fn check_rate(rate: f64) -> Result<(), ScheduleError> {
    if rate.is_finite() && rate > -1.0 {
        Ok(())
    } else {
        Err(ScheduleError::InvalidRate(rate))
    }
}
