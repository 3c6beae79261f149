//! Whole-horizon plan as an integer program. Money is truncated to whole units
//! first, so profit here can trail the floating-point strategies by a few units.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::catalog::DealType;
use crate::error::{PlannerError, PlannerResult};
use crate::inputs::{CountRange, PlanningInputs};
use crate::plan::{DealLine, ForecastPlan, MonthlyPlan};
use crate::recognition::{integer_recognized_total, RecognitionPolicy, I64_LIMIT};
use crate::solver::{Comparison, IntegerSolver, LinearExpr, Model, SolveStatus, VarId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SolveMode {
    /// Any plan meeting the target.
    Feasibility,
    /// The plan meeting the target with the fewest coaching clients plus deals.
    MinimizeWorkload,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ConstraintSettings {
    pub mode: SolveMode,
    pub coaching: CountRange,
    pub max_deals_per_month: u32,
    pub policy: RecognitionPolicy,
}

pub struct ConstraintModel {
    pub model: Model,
    pub coaching_vars: Vec<VarId>,
    pub deal_vars: Vec<Vec<VarId>>,
    pub deal_types: Vec<DealType>,
    /// Whole-unit recognized revenue per deal, by month then deal type.
    pub deal_revenue: Vec<Vec<i64>>,
    pub coaching_price: i64,
    pub total_expense: i64,
    pub net_target: i64,
}

fn whole_units(name: &str, amount: f64) -> PlannerResult<i64> {
    let whole = amount.trunc();
    if !whole.is_finite() || whole.abs() >= I64_LIMIT {
        return Err(PlannerError::invalid(format!(
            "{name} {amount} is too large for the integer model"
        )));
    }
    Ok(whole as i64)
}

pub fn build_model(
    inputs: &PlanningInputs,
    settings: &ConstraintSettings,
) -> PlannerResult<ConstraintModel> {
    let deal_types = inputs.catalog.deal_types();
    let coaching_price = whole_units("coaching price", inputs.coaching_price)?;
    let total_expense = whole_units("total expense", inputs.total_expense())?;
    let net_target = whole_units("net profit target", inputs.net_target)?;
    let max_deals = i64::from(settings.max_deals_per_month);

    let mut model = Model::new();
    let mut coaching_vars = Vec::with_capacity(inputs.horizon);
    let mut deal_vars = Vec::with_capacity(inputs.horizon);
    let mut deal_revenue = Vec::with_capacity(inputs.horizon);
    let mut profit = LinearExpr::new().constant(-total_expense);
    let mut workload = LinearExpr::new();

    for month in 0..inputs.horizon {
        let coaching = model.new_int_var(
            format!("coaching_{month}"),
            i64::from(settings.coaching.min),
            i64::from(settings.coaching.max),
        );
        profit.push(coaching, coaching_price);
        workload.push(coaching, 1);
        coaching_vars.push(coaching);

        let mut month_count = LinearExpr::new();
        let mut month_vars = Vec::with_capacity(deal_types.len());
        let mut month_revenue = Vec::with_capacity(deal_types.len());
        for (d, deal) in deal_types.iter().enumerate() {
            let var = model.new_int_var(format!("deal_m{month}_d{d}"), 0, max_deals);
            let recognized = integer_recognized_total(deal, month, inputs.horizon, settings.policy)
                .ok_or_else(|| {
                    PlannerError::invalid(format!(
                        "recognized commission for {deal} is too large for the integer model"
                    ))
                })?;
            profit.push(var, recognized);
            workload.push(var, 1);
            month_count.push(var, 1);
            month_vars.push(var);
            month_revenue.push(recognized);
        }
        if inputs.deals.min > 0 {
            model.add(
                format!("min_deals_{month}"),
                month_count.clone(),
                Comparison::GreaterEq,
                i64::from(inputs.deals.min),
            );
        }
        model.add(
            format!("max_deals_{month}"),
            month_count,
            Comparison::LessEq,
            max_deals,
        );
        deal_vars.push(month_vars);
        deal_revenue.push(month_revenue);
    }

    // Every revenue and profit figure read back from a solution is bounded by this.
    let reach = profit
        .terms
        .iter()
        .map(|(var, coef)| {
            let domain = &model.vars[var.0];
            i128::from(*coef).abs() * i128::from(domain.lower.abs().max(domain.upper.abs()))
        })
        .sum::<i128>()
        + i128::from(total_expense);
    if reach > i128::from(i64::MAX) {
        return Err(PlannerError::invalid(
            "plan revenue can exceed the integer model's range; reduce deal values or counts",
        ));
    }

    model.add("net_profit", profit, Comparison::GreaterEq, net_target);
    if settings.mode == SolveMode::MinimizeWorkload {
        model.minimize(workload);
    }

    Ok(ConstraintModel {
        model,
        coaching_vars,
        deal_vars,
        deal_types,
        deal_revenue,
        coaching_price,
        total_expense,
        net_target,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SolvedMonth {
    pub month: usize,
    pub coaching: u32,
    pub deals: Vec<DealLine>,
    pub coaching_revenue: i64,
    pub deal_revenue: i64,
    pub total_revenue: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SolvedPlan {
    pub status: SolveStatus,
    pub mode: SolveMode,
    pub months: Vec<SolvedMonth>,
    pub plan: ForecastPlan,
    pub total_revenue: i64,
    pub total_expense: i64,
    pub net_profit: i64,
    pub net_target: i64,
    pub workload_score: u32,
    pub nodes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConstraintOutcome {
    Solved(SolvedPlan),
    /// The solver proved no plan meets the target.
    Infeasible { nodes: u64 },
    /// The search budget ran out before a plan or a proof was found.
    Undecided { nodes: u64 },
}

pub fn run_constraint(
    inputs: &PlanningInputs,
    settings: &ConstraintSettings,
    solver: &dyn IntegerSolver,
) -> PlannerResult<ConstraintOutcome> {
    if settings.max_deals_per_month < inputs.deals.min {
        return Err(PlannerError::invalid(format!(
            "max deals per month ({}) is below the minimum deal count ({})",
            settings.max_deals_per_month, inputs.deals.min
        )));
    }
    let built = build_model(inputs, settings)?;
    info!(
        mode = ?settings.mode,
        variables = built.model.vars.len(),
        constraints = built.model.constraints.len(),
        net_target = built.net_target,
        "solving constrained forecast"
    );

    let solution = solver.solve(&built.model);
    match solution.status {
        SolveStatus::Infeasible => {
            warn!(nodes = solution.nodes, "no plan can meet the net profit target");
            return Ok(ConstraintOutcome::Infeasible {
                nodes: solution.nodes,
            });
        }
        SolveStatus::Unknown => {
            warn!(nodes = solution.nodes, "search budget exhausted without a plan");
            return Ok(ConstraintOutcome::Undecided {
                nodes: solution.nodes,
            });
        }
        SolveStatus::Optimal | SolveStatus::Feasible => {}
    }
    if !built.model.is_satisfied(&solution.values) {
        return Err(PlannerError::Solver(format!(
            "solver reported {} but the assignment violates the model",
            solution.status
        )));
    }

    let mut months = Vec::with_capacity(inputs.horizon);
    for month in 0..inputs.horizon {
        let coaching = solution.value(built.coaching_vars[month]) as u32;
        let mut deals = Vec::new();
        let mut deal_revenue = 0i64;
        for (d, var) in built.deal_vars[month].iter().enumerate() {
            let count = solution.value(*var);
            if count > 0 {
                deals.push(DealLine {
                    deal: built.deal_types[d],
                    count: count as u32,
                });
                deal_revenue += count * built.deal_revenue[month][d];
            }
        }
        let coaching_revenue = i64::from(coaching) * built.coaching_price;
        months.push(SolvedMonth {
            month,
            coaching,
            deals,
            coaching_revenue,
            deal_revenue,
            total_revenue: coaching_revenue + deal_revenue,
        });
    }

    let plan = ForecastPlan {
        months: months
            .iter()
            .map(|m| MonthlyPlan {
                month: m.month,
                coaching: m.coaching,
                deals: m.deals.clone(),
            })
            .collect(),
    };
    let total_revenue = months.iter().map(|m| m.total_revenue).sum::<i64>();
    let net_profit = total_revenue - built.total_expense;
    info!(
        status = %solution.status,
        net_profit,
        workload = plan.workload(),
        nodes = solution.nodes,
        "constrained forecast solved"
    );
    Ok(ConstraintOutcome::Solved(SolvedPlan {
        status: solution.status,
        mode: settings.mode,
        workload_score: plan.workload(),
        months,
        plan,
        total_revenue,
        total_expense: built.total_expense,
        net_profit,
        net_target: built.net_target,
        nodes: solution.nodes,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::tests::inputs;
    use crate::solver::{BranchAndBound, Solution};

    fn settings(mode: SolveMode, inputs: &PlanningInputs) -> ConstraintSettings {
        ConstraintSettings {
            mode,
            coaching: inputs.coaching,
            max_deals_per_month: inputs.deals.max,
            policy: RecognitionPolicy::AmortizedTail,
        }
    }

    fn default_inputs(target: f64) -> PlanningInputs {
        inputs(
            6,
            target,
            (0, 3),
            (0, 3),
            &[500_000.0, 1_500_000.0, 2_500_000.0],
            &[0.05, 0.11, 0.17],
            13_050.0,
        )
    }

    fn solved(outcome: ConstraintOutcome) -> SolvedPlan {
        match outcome {
            ConstraintOutcome::Solved(plan) => plan,
            other => panic!("expected a plan, got {other:?}"),
        }
    }

    #[test]
    fn feasible_plan_meets_target_in_integer_arithmetic() {
        let inputs = default_inputs(1_000_000.0);
        let plan = solved(
            run_constraint(
                &inputs,
                &settings(SolveMode::Feasibility, &inputs),
                &BranchAndBound::default(),
            )
            .unwrap(),
        );
        assert!(plan.status.has_solution());
        assert_eq!(plan.total_expense, 78_300);
        assert!(plan.net_profit >= 1_000_000);
        assert_eq!(plan.net_profit, plan.total_revenue - plan.total_expense);
        for month in &plan.plan.months {
            assert!(month.deal_count() <= 3);
        }
    }

    #[test]
    fn minimized_workload_is_proven_optimal() {
        let inputs = default_inputs(1_000_000.0);
        let plan = solved(
            run_constraint(
                &inputs,
                &settings(SolveMode::MinimizeWorkload, &inputs),
                &BranchAndBound::default(),
            )
            .unwrap(),
        );
        assert_eq!(plan.status, SolveStatus::Optimal);
        assert!(plan.net_profit >= 1_000_000);
        // Twelve top deals in months 1-4 bring 1_062_480 against the 1_078_300
        // needed; two coaching clients close the gap, one does not.
        assert_eq!(plan.workload_score, 14);
    }

    #[test]
    fn unreachable_target_is_infeasible() {
        let inputs = default_inputs(10_000_000.0);
        let outcome = run_constraint(
            &inputs,
            &settings(SolveMode::Feasibility, &inputs),
            &BranchAndBound::default(),
        )
        .unwrap();
        assert!(matches!(outcome, ConstraintOutcome::Infeasible { .. }));
    }

    #[test]
    fn minimum_deals_per_month_is_enforced() {
        let inputs = inputs(3, 0.0, (0, 1), (1, 2), &[500_000.0], &[0.05], 0.0);
        let plan = solved(
            run_constraint(
                &inputs,
                &settings(SolveMode::MinimizeWorkload, &inputs),
                &BranchAndBound::default(),
            )
            .unwrap(),
        );
        assert!(plan.plan.months.iter().all(|m| m.deal_count() >= 1));
        assert_eq!(plan.workload_score, 3);
    }

    struct LyingSolver;

    impl IntegerSolver for LyingSolver {
        fn solve(&self, model: &Model) -> Solution {
            Solution {
                status: SolveStatus::Optimal,
                values: vec![0; model.vars.len()],
                objective: Some(0),
                nodes: 1,
            }
        }
    }

    #[test]
    fn rejects_assignments_that_break_the_model() {
        let inputs = default_inputs(1_000_000.0);
        let result = run_constraint(
            &inputs,
            &settings(SolveMode::Feasibility, &inputs),
            &LyingSolver,
        );
        assert!(matches!(result, Err(PlannerError::Solver(_))));
    }

    #[test]
    fn coefficients_use_truncated_monthly_commission() {
        let inputs = default_inputs(0.0);
        let built = build_model(&inputs, &settings(SolveMode::Feasibility, &inputs)).unwrap();
        // 500_000 * 0.05 / 12 = 2083.33.. truncated, four months of tail in month 0
        assert_eq!(built.deal_revenue[0][0], 2083 * 4);
        assert_eq!(built.deal_revenue[4][0], 0);
        assert_eq!(built.coaching_price, 8750);
        assert_eq!(built.model.vars.len(), 6 * 10);
    }

    #[test]
    fn oversized_money_is_rejected_instead_of_wrapping() {
        let inputs = inputs(12, 0.0, (0, 1), (0, 3), &[1e20], &[1.0], 0.0);
        let result = run_constraint(
            &inputs,
            &settings(SolveMode::Feasibility, &inputs),
            &BranchAndBound::default(),
        );
        assert!(matches!(result, Err(PlannerError::InvalidConfig(_))));

        // Each coefficient fits, but three deals a month over the horizon do not.
        let inputs = inputs_with_deal(1e18);
        let result = build_model(&inputs, &settings(SolveMode::Feasibility, &inputs));
        assert!(matches!(result, Err(PlannerError::InvalidConfig(_))));

        let mut inputs = default_inputs(0.0);
        inputs.net_target = 1e19;
        let result = build_model(&inputs, &settings(SolveMode::Feasibility, &inputs));
        assert!(matches!(result, Err(PlannerError::InvalidConfig(_))));
    }

    fn inputs_with_deal(value: f64) -> PlanningInputs {
        inputs(12, 0.0, (0, 1), (0, 3), &[value], &[1.0], 0.0)
    }
}
