use std::ops::RangeInclusive;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::catalog::DealCatalog;
use crate::error::{PlannerError, PlannerResult};
use crate::ledger::ExpenseItem;

pub const MAX_HORIZON_MONTHS: usize = 12;

/// Inclusive count bounds. Construction rejects negative and inverted bounds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CountRange {
    pub min: u32,
    pub max: u32,
}

impl CountRange {
    pub fn new(name: &str, min: i64, max: i64) -> PlannerResult<Self> {
        if min < 0 || max < 0 {
            return Err(PlannerError::invalid(format!(
                "{name} bounds must be non-negative, got {min}..={max}"
            )));
        }
        if min > max {
            return Err(PlannerError::invalid(format!(
                "{name} range is empty: min {min} > max {max}"
            )));
        }
        let to_u32 = |v: i64| {
            u32::try_from(v)
                .map_err(|_| PlannerError::invalid(format!("{name} bound {v} is too large")))
        };
        Ok(Self {
            min: to_u32(min)?,
            max: to_u32(max)?,
        })
    }

    pub fn values(&self) -> RangeInclusive<u32> {
        self.min..=self.max
    }

    pub fn contains(&self, value: u32) -> bool {
        self.values().contains(&value)
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        rng.gen_range(self.values())
    }
}

/// Validated, frozen parameters shared by every strategy for one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanningInputs {
    pub horizon: usize,
    pub net_target: f64,
    pub coaching_price: f64,
    pub coaching: CountRange,
    pub deals: CountRange,
    pub catalog: DealCatalog,
    pub expenses: Vec<ExpenseItem>,
    pub monthly_expense: f64,
}

impl PlanningInputs {
    pub fn new(
        horizon: i64,
        net_target: f64,
        coaching_price: f64,
        coaching: CountRange,
        deals: CountRange,
        catalog: DealCatalog,
        expenses: Vec<ExpenseItem>,
    ) -> PlannerResult<Self> {
        if horizon < 1 || horizon > MAX_HORIZON_MONTHS as i64 {
            return Err(PlannerError::invalid(format!(
                "forecast horizon must be between 1 and {MAX_HORIZON_MONTHS} months, got {horizon}"
            )));
        }
        if !net_target.is_finite() {
            return Err(PlannerError::invalid("net profit target must be finite"));
        }
        if !coaching_price.is_finite() || coaching_price < 0.0 {
            return Err(PlannerError::invalid(format!(
                "coaching price must be non-negative, got {coaching_price}"
            )));
        }
        if catalog.is_empty() {
            return Err(PlannerError::invalid("deal catalog is empty"));
        }
        if let Some(bad) = expenses
            .iter()
            .find(|e| !e.amount.is_finite() || e.amount < 0.0)
        {
            return Err(PlannerError::invalid(format!(
                "expense '{}' must have a non-negative amount, got {}",
                bad.label, bad.amount
            )));
        }
        let monthly_expense = expenses.iter().map(|e| e.amount).sum();
        Ok(Self {
            horizon: horizon as usize,
            net_target,
            coaching_price,
            coaching,
            deals,
            catalog,
            expenses,
            monthly_expense,
        })
    }

    pub fn total_expense(&self) -> f64 {
        self.monthly_expense * self.horizon as f64
    }

    /// Per-month bar for the exhaustive search: an even share of the target plus
    /// the month's expenses. Expenses are also deducted from the month's net, so
    /// they weigh twice against the bar.
    pub fn monthly_target(&self) -> f64 {
        self.net_target / self.horizon as f64 + self.monthly_expense
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{CountRange, PlanningInputs};
    use crate::catalog::DealCatalog;
    use crate::ledger::ExpenseItem;

    pub(crate) fn inputs(
        horizon: i64,
        net_target: f64,
        coaching: (i64, i64),
        deals: (i64, i64),
        values: &[f64],
        rates: &[f64],
        monthly_expense: f64,
    ) -> PlanningInputs {
        PlanningInputs::new(
            horizon,
            net_target,
            8750.0,
            CountRange::new("coaching", coaching.0, coaching.1).unwrap(),
            CountRange::new("deals", deals.0, deals.1).unwrap(),
            DealCatalog::product(values, rates).unwrap(),
            vec![ExpenseItem::new("Fixed", monthly_expense)],
        )
        .unwrap()
    }

    #[test]
    fn rejects_bad_ranges() {
        assert!(CountRange::new("deals", -1, 3).is_err());
        assert!(CountRange::new("deals", 3, 1).is_err());
        let single = CountRange::new("deals", 2, 2).unwrap();
        assert_eq!(single.values().count(), 1);
    }

    #[test]
    fn rejects_out_of_range_horizon() {
        let range = CountRange::new("c", 0, 1).unwrap();
        let catalog = DealCatalog::product(&[500_000.0], &[0.05]).unwrap();
        for months in [0, 13, -2] {
            assert!(PlanningInputs::new(
                months,
                0.0,
                8750.0,
                range,
                range,
                catalog.clone(),
                vec![]
            )
            .is_err());
        }
    }

    #[test]
    fn monthly_target_adds_expense_to_target_share() {
        let inputs = inputs(4, 100_000.0, (0, 3), (0, 3), &[500_000.0], &[0.05], 1000.0);
        assert_eq!(inputs.monthly_target(), 26_000.0);
        assert_eq!(inputs.total_expense(), 4000.0);
    }
}
