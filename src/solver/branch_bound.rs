//! Depth-first branch and bound. Prunes on constraint activity bounds and, for
//! non-negative objectives, a fractional knapsack bound per `>=` row.

use tracing::debug;

use super::{Comparison, IntegerSolver, Model, Solution, SolveStatus};

pub const DEFAULT_MAX_NODES: u64 = 2_000_000;

const BOUND_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy)]
pub struct BranchAndBound {
    pub max_nodes: u64,
}

impl BranchAndBound {
    pub fn new(max_nodes: u64) -> Self {
        Self { max_nodes }
    }
}

impl Default for BranchAndBound {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_NODES)
    }
}

impl IntegerSolver for BranchAndBound {
    fn solve(&self, model: &Model) -> Solution {
        if model.vars.iter().any(|v| v.lower > v.upper) {
            return Solution {
                status: SolveStatus::Infeasible,
                values: Vec::new(),
                objective: None,
                nodes: 0,
            };
        }
        let mut search = Search::new(model, self.max_nodes);
        if search.root_consistent() {
            search.dive(0);
        }
        let solution = search.finish();
        debug!(
            status = %solution.status,
            nodes = solution.nodes,
            objective = ?solution.objective,
            "branch and bound finished"
        );
        solution
    }
}

struct Objective {
    weights: Vec<i64>,
    constant: i64,
    nonnegative: bool,
    /// Least objective contribution of the variables at positions >= d.
    suffix_floor: Vec<i128>,
    fixed: i128,
}

struct Search<'m> {
    model: &'m Model,
    order: Vec<usize>,
    position: Vec<usize>,
    ascending: Vec<bool>,
    values: Vec<i64>,
    touches: Vec<Vec<usize>>,
    fixed: Vec<i128>,
    suffix_min: Vec<Vec<i128>>,
    suffix_max: Vec<Vec<i128>>,
    suffix_lower: Vec<Vec<i128>>,
    cover_rows: Vec<usize>,
    /// Cardinality cap each variable is collapsed into for the knapsack bound.
    group_of: Vec<Option<usize>>,
    objective: Option<Objective>,
    incumbent: Option<(Vec<i64>, i128)>,
    nodes: u64,
    budget: u64,
    exhausted: bool,
}

impl<'m> Search<'m> {
    fn new(model: &'m Model, budget: u64) -> Self {
        let n = model.vars.len();
        let mut touches = vec![Vec::new(); n];
        let mut contributes = vec![false; n];
        let mut best_coef = vec![0i64; n];
        let mut cover_rows = Vec::new();
        for (ci, constraint) in model.constraints.iter().enumerate() {
            let covers = constraint.comparison != Comparison::LessEq;
            if covers {
                cover_rows.push(ci);
            }
            for (var, coef) in &constraint.terms {
                touches[var.0].push(ci);
                if covers && *coef > 0 {
                    contributes[var.0] = true;
                    best_coef[var.0] = best_coef[var.0].max(*coef);
                }
            }
        }
        for list in &mut touches {
            list.dedup();
        }

        let objective = model.objective.as_ref().map(|expr| {
            let mut weights = vec![0i64; n];
            for (var, coef) in &expr.terms {
                weights[var.0] += coef;
            }
            Objective {
                nonnegative: weights.iter().all(|w| *w >= 0),
                weights,
                constant: expr.constant,
                suffix_floor: Vec::new(),
                fixed: 0,
            }
        });

        let key = |var: usize| -> f64 {
            let coef = best_coef[var] as f64;
            match &objective {
                Some(obj) if obj.weights[var] > 0 => coef / obj.weights[var] as f64,
                Some(_) if coef > 0.0 => f64::INFINITY,
                _ => coef,
            }
        };
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|a, b| key(*b).total_cmp(&key(*a)));
        let mut position = vec![0usize; n];
        for (pos, var) in order.iter().enumerate() {
            position[*var] = pos;
        }

        let constraint_count = model.constraints.len();
        let mut suffix_min = vec![vec![0i128; n + 1]; constraint_count];
        let mut suffix_max = vec![vec![0i128; n + 1]; constraint_count];
        let mut suffix_lower = vec![vec![0i128; n + 1]; constraint_count];
        for (ci, constraint) in model.constraints.iter().enumerate() {
            for (var, coef) in &constraint.terms {
                let domain = &model.vars[var.0];
                let at_lower = i128::from(*coef) * i128::from(domain.lower);
                let at_upper = i128::from(*coef) * i128::from(domain.upper);
                let pos = position[var.0];
                suffix_min[ci][pos] += at_lower.min(at_upper);
                suffix_max[ci][pos] += at_lower.max(at_upper);
                suffix_lower[ci][pos] += at_lower;
            }
            for pos in (0..n).rev() {
                suffix_min[ci][pos] += suffix_min[ci][pos + 1];
                suffix_max[ci][pos] += suffix_max[ci][pos + 1];
                suffix_lower[ci][pos] += suffix_lower[ci][pos + 1];
            }
        }

        let objective = objective.map(|mut obj| {
            let mut floor = vec![0i128; n + 1];
            for (var, weight) in obj.weights.iter().enumerate() {
                let domain = &model.vars[var];
                let a = i128::from(*weight) * i128::from(domain.lower);
                let b = i128::from(*weight) * i128::from(domain.upper);
                floor[position[var]] += a.min(b);
            }
            for pos in (0..n).rev() {
                floor[pos] += floor[pos + 1];
            }
            obj.suffix_floor = floor;
            obj
        });

        let mut group_of = vec![None; n];
        for (ci, constraint) in model.constraints.iter().enumerate() {
            let is_cap = constraint.comparison == Comparison::LessEq
                && !constraint.terms.is_empty()
                && constraint
                    .terms
                    .iter()
                    .all(|(var, coef)| *coef == 1 && model.vars[var.0].lower >= 0);
            let disjoint = constraint
                .terms
                .iter()
                .all(|(var, _)| group_of[var.0].is_none());
            if is_cap && disjoint {
                for (var, _) in &constraint.terms {
                    group_of[var.0] = Some(ci);
                }
            }
        }

        let ascending = (0..n)
            .map(|var| match &objective {
                Some(obj) if !contributes[var] => obj.weights[var] >= 0,
                _ => !contributes[var],
            })
            .collect();

        Self {
            model,
            order,
            position,
            ascending,
            values: model.vars.iter().map(|v| v.lower).collect(),
            touches,
            fixed: vec![0; constraint_count],
            suffix_min,
            suffix_max,
            suffix_lower,
            cover_rows,
            group_of,
            objective,
            incumbent: None,
            nodes: 0,
            budget: budget.max(1),
            exhausted: false,
        }
    }

    fn root_consistent(&self) -> bool {
        (0..self.model.constraints.len()).all(|ci| self.constraint_open(ci, 0))
    }

    fn dive(&mut self, depth: usize) {
        if self.exhausted {
            return;
        }
        self.nodes += 1;
        if self.nodes > self.budget {
            self.exhausted = true;
            return;
        }
        if !self.within_bound(depth) {
            return;
        }
        if depth == self.order.len() {
            self.record();
            return;
        }

        let var = self.order[depth];
        let domain = &self.model.vars[var];
        let (lower, upper) = (domain.lower, domain.upper);
        let ascending = self.ascending[var];
        for step in 0..=(upper - lower) {
            let value = if ascending { lower + step } else { upper - step };
            self.assign(var, value, 1);
            if self.touches[var]
                .iter()
                .all(|ci| self.constraint_open(*ci, depth + 1))
            {
                self.dive(depth + 1);
            }
            self.assign(var, value, -1);
            if self.exhausted || self.satisfied_early() {
                return;
            }
        }
    }

    fn assign(&mut self, var: usize, value: i64, sign: i128) {
        let model = self.model;
        for ci in &self.touches[var] {
            for (v, coef) in &model.constraints[*ci].terms {
                if v.0 == var {
                    self.fixed[*ci] += sign * i128::from(*coef) * i128::from(value);
                }
            }
        }
        if let Some(obj) = self.objective.as_mut() {
            obj.fixed += sign * i128::from(obj.weights[var]) * i128::from(value);
        }
        self.values[var] = if sign > 0 {
            value
        } else {
            model.vars[var].lower
        };
    }

    fn constraint_open(&self, ci: usize, depth: usize) -> bool {
        let constraint = &self.model.constraints[ci];
        let low = self.fixed[ci] + self.suffix_min[ci][depth];
        let high = self.fixed[ci] + self.suffix_max[ci][depth];
        match constraint.comparison {
            Comparison::LessEq => low <= constraint.rhs,
            Comparison::GreaterEq => high >= constraint.rhs,
            Comparison::Equal => low <= constraint.rhs && constraint.rhs <= high,
        }
    }

    fn satisfied_early(&self) -> bool {
        self.objective.is_none() && self.incumbent.is_some()
    }

    fn record(&mut self) {
        let value = self
            .objective
            .as_ref()
            .map(|obj| obj.fixed + i128::from(obj.constant))
            .unwrap_or(0);
        let improves = self
            .incumbent
            .as_ref()
            .map(|(_, best)| value < *best)
            .unwrap_or(true);
        if improves {
            debug_assert!(self.model.is_satisfied(&self.values));
            debug!(objective = %value, nodes = self.nodes, "new incumbent");
            self.incumbent = Some((self.values.clone(), value));
        }
    }

    fn within_bound(&self, depth: usize) -> bool {
        let Some(obj) = &self.objective else {
            return true;
        };
        let mut floor = obj.fixed + obj.suffix_floor[depth] + i128::from(obj.constant);
        if obj.nonnegative {
            let mut extra = 0.0f64;
            for ci in &self.cover_rows {
                match self.cover_cost(*ci, depth, obj) {
                    Some(cost) => extra = extra.max(cost),
                    None => return false,
                }
            }
            floor += (extra - BOUND_EPSILON).ceil().max(0.0) as i128;
        }
        match &self.incumbent {
            Some((_, best)) => floor < *best,
            None => true,
        }
    }

    /// Least extra objective needed to lift row `ci` from its all-lower activity
    /// to its right-hand side, or `None` when the free variables cannot reach it.
    fn cover_cost(&self, ci: usize, depth: usize, obj: &Objective) -> Option<f64> {
        let constraint = &self.model.constraints[ci];
        let mut need = constraint.rhs - (self.fixed[ci] + self.suffix_lower[ci][depth]);
        if need <= 0 {
            return Some(0.0);
        }

        // (units, activity per unit, cost per unit)
        let mut items: Vec<(i128, i128, i64)> = Vec::new();
        let mut groups: Vec<(usize, i128, i128, i64)> = Vec::new();
        for (var, coef) in &constraint.terms {
            if *coef <= 0 || self.position[var.0] < depth {
                continue;
            }
            let domain = &self.model.vars[var.0];
            let span = i128::from(domain.upper - domain.lower);
            if span <= 0 {
                continue;
            }
            let weight = obj.weights[var.0];
            match self.group_of[var.0] {
                Some(group) => match groups.iter_mut().find(|g| g.0 == group) {
                    Some(entry) => {
                        entry.1 += span;
                        entry.2 = entry.2.max(i128::from(*coef));
                        entry.3 = entry.3.min(weight);
                    }
                    None => groups.push((group, span, i128::from(*coef), weight)),
                },
                None => items.push((span, i128::from(*coef), weight)),
            }
        }
        for (group, span, coef, weight) in groups {
            let cap = &self.model.constraints[group];
            let slack = cap.rhs - self.fixed[group] - self.suffix_lower[group][depth];
            let units = span.min(slack.max(0));
            if units > 0 {
                items.push((units, coef, weight));
            }
        }
        items.sort_by(|a, b| {
            let left = i128::from(a.2) * b.1;
            let right = i128::from(b.2) * a.1;
            left.cmp(&right)
        });

        let mut cost = 0.0f64;
        for (units, coef, weight) in items {
            let capacity = units * coef;
            if capacity >= need {
                cost += need as f64 * weight as f64 / coef as f64;
                return Some(cost);
            }
            cost += units as f64 * weight as f64;
            need -= capacity;
        }
        None
    }

    fn finish(self) -> Solution {
        let status = match (&self.incumbent, self.exhausted) {
            (Some(_), false) => SolveStatus::Optimal,
            (Some(_), true) => SolveStatus::Feasible,
            (None, false) => SolveStatus::Infeasible,
            (None, true) => SolveStatus::Unknown,
        };
        let has_objective = self.objective.is_some();
        match self.incumbent {
            Some((values, objective)) => Solution {
                status,
                values,
                objective: has_objective.then(|| objective as i64),
                nodes: self.nodes,
            },
            None => Solution {
                status,
                values: Vec::new(),
                objective: None,
                nodes: self.nodes,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::BranchAndBound;
    use crate::solver::{Comparison, IntegerSolver, LinearExpr, Model, SolveStatus};

    /// Every assignment of a small model, for checking optimality.
    fn brute_force_min(model: &Model) -> Option<i128> {
        let mut best: Option<i128> = None;
        let mut values: Vec<i64> = model.vars.iter().map(|v| v.lower).collect();
        loop {
            if model.is_satisfied(&values) {
                let objective = model
                    .objective
                    .as_ref()
                    .map(|o| o.evaluate(&values))
                    .unwrap_or(0);
                best = Some(best.map_or(objective, |b| b.min(objective)));
            }
            let mut idx = 0;
            loop {
                if idx == values.len() {
                    return best;
                }
                if values[idx] < model.vars[idx].upper {
                    values[idx] += 1;
                    break;
                }
                values[idx] = model.vars[idx].lower;
                idx += 1;
            }
        }
    }

    /// Two "months" of three deal types capped at two deals each, plus coaching.
    fn planning_like_model(target: i64) -> Model {
        let mut model = Model::new();
        let mut profit = LinearExpr::new();
        let mut workload = LinearExpr::new();
        let revenue = [[9, 5, 2], [4, 3, 1]];
        for (month, per_deal) in revenue.iter().enumerate() {
            let coaching = model.new_int_var(format!("coaching_{month}"), 0, 2);
            profit.push(coaching, 3);
            workload.push(coaching, 1);
            let mut count = LinearExpr::new();
            for (d, rev) in per_deal.iter().enumerate() {
                let var = model.new_int_var(format!("deal_m{month}_d{d}"), 0, 2);
                profit.push(var, *rev);
                workload.push(var, 1);
                count.push(var, 1);
            }
            model.add(format!("max_deals_{month}"), count, Comparison::LessEq, 2);
        }
        model.add("profit", profit.constant(-4), Comparison::GreaterEq, target);
        model.minimize(workload);
        model
    }

    #[test]
    fn finds_proven_optimum_matching_brute_force() {
        for target in [0, 5, 11, 17, 23, 30] {
            let model = planning_like_model(target);
            let expected = brute_force_min(&model).expect("feasible");
            let solution = BranchAndBound::default().solve(&model);
            assert_eq!(solution.status, SolveStatus::Optimal, "target {target}");
            assert!(model.is_satisfied(&solution.values));
            assert_eq!(solution.objective.map(i128::from), Some(expected));
        }
    }

    #[test]
    fn proves_infeasibility() {
        // max profit = 2*3 + 2*9 + 2*3 + 2*4 - 4 = 34
        let model = planning_like_model(35);
        assert_eq!(brute_force_min(&model), None);
        let solution = BranchAndBound::default().solve(&model);
        assert_eq!(solution.status, SolveStatus::Infeasible);
        assert!(solution.values.is_empty());
    }

    #[test]
    fn feasibility_mode_returns_first_satisfying_assignment() {
        let mut model = planning_like_model(20);
        model.objective = None;
        let solution = BranchAndBound::default().solve(&model);
        assert_eq!(solution.status, SolveStatus::Optimal);
        assert!(model.is_satisfied(&solution.values));
        assert_eq!(solution.objective, None);
    }

    #[test]
    fn budget_exhaustion_is_not_reported_as_infeasible() {
        let mut model = planning_like_model(35);
        model.objective = None;
        let solution = BranchAndBound::new(3).solve(&model);
        assert_eq!(solution.status, SolveStatus::Unknown);
        assert!(solution.values.is_empty());

        let model = planning_like_model(0);
        let solution = BranchAndBound::new(2_000_000).solve(&model);
        assert!(solution.status.has_solution());
    }

    #[test]
    fn handles_negative_weights_and_equality() {
        let mut model = Model::new();
        let x = model.new_int_var("x", 0, 4);
        let y = model.new_int_var("y", -2, 3);
        model.add(
            "sum",
            LinearExpr::new().term(x, 1).term(y, 1),
            Comparison::Equal,
            3,
        );
        model.minimize(LinearExpr::new().term(x, 2).term(y, -1));
        let expected = brute_force_min(&model).expect("feasible");
        let solution = BranchAndBound::default().solve(&model);
        assert_eq!(solution.status, SolveStatus::Optimal);
        assert_eq!(solution.objective.map(i128::from), Some(expected));
    }
}
