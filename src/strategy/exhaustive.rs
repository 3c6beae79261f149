use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::DealType;
use crate::inputs::PlanningInputs;
use crate::plan::{ForecastPlan, MonthlyPlan, ScenarioResult};
use crate::recognition::{recognized_total, RecognitionPolicy};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExhaustiveSettings {
    pub policy: RecognitionPolicy,
}

impl Default for ExhaustiveSettings {
    fn default() -> Self {
        Self {
            policy: RecognitionPolicy::AmortizedTail,
        }
    }
}

/// One month's combination: a coaching count plus `deal_count` deals of one type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonthChoice {
    pub month: usize,
    pub coaching: u32,
    pub deal_count: u32,
    pub deal: DealType,
    pub coaching_revenue: f64,
    pub deal_revenue: f64,
    pub total_revenue: f64,
    pub net: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExhaustiveOutcome {
    Feasible {
        months: Vec<MonthChoice>,
        summary: ScenarioResult,
    },
    /// No combination met the monthly target in `month`; earlier months are dropped.
    Infeasible { month: usize, monthly_target: f64 },
}

pub fn evaluate_combination(
    inputs: &PlanningInputs,
    month: usize,
    coaching: u32,
    deal_count: u32,
    deal: DealType,
    policy: RecognitionPolicy,
) -> MonthChoice {
    let coaching_revenue = f64::from(coaching) * inputs.coaching_price;
    let deal_revenue = recognized_total(&deal, deal_count, month, inputs.horizon, policy);
    let total_revenue = coaching_revenue + deal_revenue;
    MonthChoice {
        month,
        coaching,
        deal_count,
        deal,
        coaching_revenue,
        deal_revenue,
        total_revenue,
        net: total_revenue - inputs.monthly_expense,
    }
}

/// Coaching count, then deal count, then catalog order.
pub fn enumerate_month(
    inputs: &PlanningInputs,
    month: usize,
    policy: RecognitionPolicy,
) -> Vec<MonthChoice> {
    let deal_types = inputs.catalog.deal_types();
    let mut out = Vec::new();
    for coaching in inputs.coaching.values() {
        for deal_count in inputs.deals.values() {
            for deal in &deal_types {
                out.push(evaluate_combination(
                    inputs, month, coaching, deal_count, *deal, policy,
                ));
            }
        }
    }
    out
}

/// Highest-net combination clearing the monthly target; the first one seen wins ties.
pub fn best_for_month(
    inputs: &PlanningInputs,
    month: usize,
    policy: RecognitionPolicy,
) -> Option<MonthChoice> {
    let target = inputs.monthly_target();
    let mut feasible = 0usize;
    let mut best: Option<MonthChoice> = None;
    for choice in enumerate_month(inputs, month, policy) {
        if choice.net < target {
            continue;
        }
        feasible += 1;
        let improves = best
            .as_ref()
            .map(|current| choice.net > current.net)
            .unwrap_or(true);
        if improves {
            best = Some(choice);
        }
    }
    debug!(month = month + 1, feasible, "evaluated month");
    best
}

pub fn run_exhaustive(inputs: &PlanningInputs, settings: &ExhaustiveSettings) -> ExhaustiveOutcome {
    let monthly_target = inputs.monthly_target();
    info!(
        months = inputs.horizon,
        monthly_target,
        policy = ?settings.policy,
        "running exhaustive monthly search"
    );

    let mut months = Vec::with_capacity(inputs.horizon);
    for month in 0..inputs.horizon {
        match best_for_month(inputs, month, settings.policy) {
            Some(choice) => months.push(choice),
            None => {
                warn!(month = month + 1, "no combination meets the monthly target");
                return ExhaustiveOutcome::Infeasible {
                    month,
                    monthly_target,
                };
            }
        }
    }

    let plan = ForecastPlan {
        months: months
            .iter()
            .map(|choice| {
                let mut monthly = MonthlyPlan::new(choice.month, choice.coaching);
                monthly.add_deals(choice.deal, choice.deal_count);
                monthly
            })
            .collect(),
    };
    let revenue = months.iter().map(|c| c.total_revenue).collect();
    let summary = ScenarioResult::new(plan, revenue, inputs.total_expense());
    ExhaustiveOutcome::Feasible { months, summary }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::tests::inputs;

    #[test]
    fn single_month_zero_target_prefers_coaching() {
        let inputs = inputs(1, 0.0, (0, 1), (0, 1), &[500_000.0], &[0.05], 0.0);
        assert_eq!(inputs.monthly_target(), 0.0);

        let outcome = run_exhaustive(&inputs, &ExhaustiveSettings::default());
        let ExhaustiveOutcome::Feasible { months, summary } = outcome else {
            panic!("expected a feasible plan");
        };
        assert_eq!(months.len(), 1);
        let best = &months[0];
        // Deals closed in the only month recognize nothing: max(0, 1 - 0 - 2) = 0.
        assert_eq!(best.deal_revenue, 0.0);
        assert_eq!(best.coaching, 1);
        assert_eq!(best.deal_count, 0);
        assert_eq!(best.net, 8750.0);
        assert_eq!(summary.net_profit, 8750.0);
    }

    #[test]
    fn ties_keep_the_first_combination_seen() {
        let inputs = inputs(1, 0.0, (0, 0), (0, 1), &[500_000.0, 1_000_000.0], &[0.05], 0.0);
        let best = best_for_month(&inputs, 0, RecognitionPolicy::AmortizedTail).unwrap();
        assert_eq!(best.coaching, 0);
        assert_eq!(best.deal_count, 0);
        assert_eq!(best.deal, DealType::new(500_000.0, 0.05));
        assert_eq!(best.net, 0.0);
    }

    #[test]
    fn best_beats_every_other_feasible_combination() {
        let inputs = inputs(
            6,
            300_000.0,
            (0, 3),
            (0, 3),
            &[500_000.0, 1_500_000.0, 2_500_000.0],
            &[0.05, 0.11, 0.17],
            13_050.0,
        );
        for month in 0..6 {
            let all = enumerate_month(&inputs, month, RecognitionPolicy::AmortizedTail);
            let Some(best) = best_for_month(&inputs, month, RecognitionPolicy::AmortizedTail)
            else {
                continue;
            };
            assert!(best.net >= inputs.monthly_target());
            for other in all.iter().filter(|c| c.net >= inputs.monthly_target()) {
                assert!(best.net >= other.net);
            }
        }
    }

    #[test]
    fn first_infeasible_month_aborts_the_plan() {
        // Month 1 can still recognize deal revenue; months 2+ only have coaching.
        let inputs = inputs(3, 60_000.0, (0, 1), (0, 3), &[2_500_000.0], &[0.17], 0.0);
        assert!(best_for_month(&inputs, 0, RecognitionPolicy::AmortizedTail).is_some());
        let outcome = run_exhaustive(&inputs, &ExhaustiveSettings::default());
        assert_eq!(
            outcome,
            ExhaustiveOutcome::Infeasible {
                month: 1,
                monthly_target: 20_000.0
            }
        );
    }

    #[test]
    fn straight_line_policy_credits_in_horizon_total() {
        let inputs = inputs(6, 0.0, (0, 0), (1, 1), &[1_200_000.0], &[0.1], 0.0);
        let choice = evaluate_combination(
            &inputs,
            0,
            0,
            1,
            DealType::new(1_200_000.0, 0.1),
            RecognitionPolicy::StraightLineDeferred,
        );
        assert!((choice.deal_revenue - 40_000.0).abs() < 1e-6);
    }
}
