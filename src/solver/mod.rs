pub mod branch_bound;

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

pub use branch_bound::BranchAndBound;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VarId(pub usize);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntVar {
    pub name: String,
    pub lower: i64,
    pub upper: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    LessEq,
    GreaterEq,
    Equal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinearExpr {
    pub terms: Vec<(VarId, i64)>,
    pub constant: i64,
}

impl LinearExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn term(mut self, var: VarId, coef: i64) -> Self {
        self.push(var, coef);
        self
    }

    pub fn push(&mut self, var: VarId, coef: i64) {
        if coef != 0 {
            self.terms.push((var, coef));
        }
    }

    pub fn constant(mut self, constant: i64) -> Self {
        self.constant += constant;
        self
    }

    pub fn evaluate(&self, values: &[i64]) -> i128 {
        self.terms
            .iter()
            .map(|(var, coef)| i128::from(*coef) * i128::from(values[var.0]))
            .sum::<i128>()
            + i128::from(self.constant)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearConstraint {
    pub name: String,
    pub terms: Vec<(VarId, i64)>,
    pub comparison: Comparison,
    pub rhs: i128,
}

impl LinearConstraint {
    pub fn holds(&self, values: &[i64]) -> bool {
        let activity = self
            .terms
            .iter()
            .map(|(var, coef)| i128::from(*coef) * i128::from(values[var.0]))
            .sum::<i128>();
        match self.comparison {
            Comparison::LessEq => activity <= self.rhs,
            Comparison::GreaterEq => activity >= self.rhs,
            Comparison::Equal => activity == self.rhs,
        }
    }
}

/// Bounded integer variables, linear constraints and an optional objective to minimize.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Model {
    pub vars: Vec<IntVar>,
    pub constraints: Vec<LinearConstraint>,
    pub objective: Option<LinearExpr>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_int_var(&mut self, name: impl Into<String>, lower: i64, upper: i64) -> VarId {
        self.vars.push(IntVar {
            name: name.into(),
            lower,
            upper,
        });
        VarId(self.vars.len() - 1)
    }

    /// Adds `expr <cmp> rhs`; the expression's constant moves to the right-hand side.
    pub fn add(&mut self, name: impl Into<String>, expr: LinearExpr, comparison: Comparison, rhs: i64) {
        self.constraints.push(LinearConstraint {
            name: name.into(),
            rhs: i128::from(rhs) - i128::from(expr.constant),
            terms: expr.terms,
            comparison,
        });
    }

    pub fn minimize(&mut self, expr: LinearExpr) {
        self.objective = Some(expr);
    }

    pub fn is_satisfied(&self, values: &[i64]) -> bool {
        values.len() == self.vars.len()
            && self
                .vars
                .iter()
                .zip(values)
                .all(|(var, v)| (var.lower..=var.upper).contains(v))
            && self.constraints.iter().all(|c| c.holds(values))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    /// Proven best for the objective, or any satisfying assignment when there is none.
    Optimal,
    /// Satisfies every constraint; the search stopped before proving optimality.
    Feasible,
    /// The search space was exhausted without a satisfying assignment.
    Infeasible,
    /// The search stopped before finding an assignment or proving there is none.
    Unknown,
}

impl SolveStatus {
    pub fn has_solution(self) -> bool {
        matches!(self, Self::Optimal | Self::Feasible)
    }
}

impl Display for SolveStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Optimal => "optimal",
            Self::Feasible => "feasible",
            Self::Infeasible => "infeasible",
            Self::Unknown => "unknown",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    pub status: SolveStatus,
    pub values: Vec<i64>,
    pub objective: Option<i64>,
    pub nodes: u64,
}

impl Solution {
    pub fn value(&self, var: VarId) -> i64 {
        self.values.get(var.0).copied().unwrap_or_default()
    }
}

pub trait IntegerSolver {
    fn solve(&self, model: &Model) -> Solution;
}

#[cfg(test)]
mod tests {
    use super::{Comparison, LinearExpr, Model};

    #[test]
    fn constant_moves_to_rhs() {
        let mut model = Model::new();
        let x = model.new_int_var("x", 0, 10);
        model.add(
            "x_minus_3_ge_2",
            LinearExpr::new().term(x, 1).constant(-3),
            Comparison::GreaterEq,
            2,
        );
        assert!(!model.is_satisfied(&[4]));
        assert!(model.is_satisfied(&[5]));
        assert!(!model.is_satisfied(&[11]));
    }
}
