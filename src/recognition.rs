//! Commission recognition: `AmortizedTail` books the in-horizon tail as one lump in
//! the closing month, `StraightLineDeferred` spreads it after a two-month lag.

use serde::{Deserialize, Serialize};

use crate::catalog::DealType;

pub const DEFERRAL_LAG_MONTHS: usize = 2;
pub const RECOGNITION_WINDOW_MONTHS: usize = 12;

/// 2^63, the first magnitude an `f64` cannot be truncated into `i64` from.
pub(crate) const I64_LIMIT: f64 = 9_223_372_036_854_775_808.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionPolicy {
    AmortizedTail,
    StraightLineDeferred,
}

impl RecognitionPolicy {
    /// Months of the horizon in which a deal closed at `closed_month` earns revenue.
    pub fn recognized_months(self, closed_month: usize, horizon: usize) -> usize {
        let tail = horizon.saturating_sub(closed_month + DEFERRAL_LAG_MONTHS);
        match self {
            Self::AmortizedTail => tail,
            Self::StraightLineDeferred => tail.min(RECOGNITION_WINDOW_MONTHS),
        }
    }
}

/// `(commission / 12) * max(0, horizon - closed_month - 2)`
pub fn amortized_tail(commission: f64, closed_month: usize, horizon: usize) -> f64 {
    let months = RecognitionPolicy::AmortizedTail.recognized_months(closed_month, horizon);
    commission / 12.0 * months as f64
}

pub fn straight_line_schedule(commission: f64, closed_month: usize, horizon: usize) -> Vec<f64> {
    let mut schedule = vec![0.0; horizon];
    let start = closed_month + DEFERRAL_LAG_MONTHS;
    let end = (start + RECOGNITION_WINDOW_MONTHS).min(horizon);
    let monthly = commission / 12.0;
    for slot in schedule.iter_mut().take(end).skip(start) {
        *slot += monthly;
    }
    schedule
}

/// Revenue recognized in each month of the horizon for `count` deals of one type.
pub fn recognize(
    deal: &DealType,
    count: u32,
    closed_month: usize,
    horizon: usize,
    policy: RecognitionPolicy,
) -> Vec<f64> {
    if count == 0 {
        return vec![0.0; horizon];
    }
    let commission = deal.commission() * f64::from(count);
    match policy {
        RecognitionPolicy::AmortizedTail => {
            let mut schedule = vec![0.0; horizon];
            if let Some(slot) = schedule.get_mut(closed_month) {
                *slot = amortized_tail(commission, closed_month, horizon);
            }
            schedule
        }
        RecognitionPolicy::StraightLineDeferred => {
            straight_line_schedule(commission, closed_month, horizon)
        }
    }
}

pub fn recognized_total(
    deal: &DealType,
    count: u32,
    closed_month: usize,
    horizon: usize,
    policy: RecognitionPolicy,
) -> f64 {
    if count == 0 {
        return 0.0;
    }
    let commission = deal.commission() * f64::from(count);
    commission / 12.0 * policy.recognized_months(closed_month, horizon) as f64
}

/// Whole-unit revenue for one deal, as fed to the integer solver. The monthly
/// slice is truncated before it is multiplied out. `None` when it does not fit in `i64`.
pub fn integer_recognized_total(
    deal: &DealType,
    closed_month: usize,
    horizon: usize,
    policy: RecognitionPolicy,
) -> Option<i64> {
    let monthly = (deal.commission() / 12.0).trunc();
    if !monthly.is_finite() || monthly.abs() >= I64_LIMIT {
        return None;
    }
    let months = i64::try_from(policy.recognized_months(closed_month, horizon)).ok()?;
    (monthly as i64).checked_mul(months)
}
