//! Declarative mixed-integer problems and the solver capability trait.
//!
//! The optimization builders never talk to a solver library directly. They
//! describe a [`MipProblem`] (binary variables, linear rows, indicator rows,
//! a primary objective and an optional lexicographic secondary objective) and
//! hand it to any [`MipSolver`]. The crate ships one backend,
//! [`good_lp_backend::GoodLpSolver`].

pub mod good_lp_backend;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Values strictly above this are read as a set binary decision.
///
/// Solvers return values such as `0.9999999` for a true `1`.
pub const DECISION_THRESHOLD: f64 = 0.9;

/// Handle to a variable declared on a [`MipProblem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarId(usize);

impl VarId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A linear expression `Σ coef·var + constant`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearExpr {
    terms: Vec<(VarId, f64)>,
    constant: f64,
}

impl LinearExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constant(value: f64) -> Self {
        Self {
            terms: Vec::new(),
            constant: value,
        }
    }

    pub fn add_term(&mut self, var: VarId, coef: f64) {
        if coef != 0.0 {
            self.terms.push((var, coef));
        }
    }

    pub fn add_constant(&mut self, value: f64) {
        self.constant += value;
    }

    /// Append every term of `other`, scaled by `factor`.
    pub fn add_scaled(&mut self, other: &LinearExpr, factor: f64) {
        for &(var, coef) in &other.terms {
            self.add_term(var, coef * factor);
        }
        self.constant += other.constant * factor;
    }

    pub fn with_term(mut self, var: VarId, coef: f64) -> Self {
        self.add_term(var, coef);
        self
    }

    pub fn terms(&self) -> &[(VarId, f64)] {
        &self.terms
    }

    pub fn constant_term(&self) -> f64 {
        self.constant
    }

    pub fn is_constant(&self) -> bool {
        self.terms.is_empty()
    }

    /// Largest value the expression can take with every variable in `[0, 1]`.
    pub fn upper_bound(&self) -> f64 {
        self.constant + self.terms.iter().map(|&(_, c)| c.max(0.0)).sum::<f64>()
    }

    /// Smallest value the expression can take with every variable in `[0, 1]`.
    pub fn lower_bound(&self) -> f64 {
        self.constant + self.terms.iter().map(|&(_, c)| c.min(0.0)).sum::<f64>()
    }

    /// Evaluate against one value per declared variable.
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.constant
            + self
                .terms
                .iter()
                .map(|&(var, coef)| coef * values.get(var.0).copied().unwrap_or(0.0))
                .sum::<f64>()
    }

    pub fn leq(self, rhs: f64) -> LinearConstraint {
        LinearConstraint::new(self, Relation::LessEq, rhs)
    }

    pub fn geq(self, rhs: f64) -> LinearConstraint {
        LinearConstraint::new(self, Relation::GreaterEq, rhs)
    }

    pub fn equals(self, rhs: f64) -> LinearConstraint {
        LinearConstraint::new(self, Relation::Equal, rhs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Relation {
    LessEq,
    Equal,
    GreaterEq,
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Relation::LessEq => write!(f, "<="),
            Relation::Equal => write!(f, "=="),
            Relation::GreaterEq => write!(f, ">="),
        }
    }
}

/// `expr <relation> rhs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearConstraint {
    pub expr: LinearExpr,
    pub relation: Relation,
    pub rhs: f64,
}

impl LinearConstraint {
    pub fn new(expr: LinearExpr, relation: Relation, rhs: f64) -> Self {
        Self { expr, relation, rhs }
    }

    pub fn is_satisfied(&self, values: &[f64], tolerance: f64) -> bool {
        let lhs = self.expr.evaluate(values);
        match self.relation {
            Relation::LessEq => lhs <= self.rhs + tolerance,
            Relation::Equal => (lhs - self.rhs).abs() <= tolerance,
            Relation::GreaterEq => lhs + tolerance >= self.rhs,
        }
    }
}

/// `indicator = 1  ⇒  constraint`. When the indicator is 0 nothing is imposed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorConstraint {
    pub indicator: VarId,
    pub constraint: LinearConstraint,
}

impl IndicatorConstraint {
    /// Rewrite as big-M rows valid over binary variables.
    ///
    /// For `b ⇒ expr ≤ rhs` with `M = ub(expr) − rhs` this yields
    /// `expr + M·b ≤ rhs + M`. Rows that can never bind are dropped.
    pub fn linearize(&self) -> Vec<LinearConstraint> {
        let c = &self.constraint;
        let mut rows = Vec::with_capacity(2);
        if matches!(c.relation, Relation::LessEq | Relation::Equal) {
            let big_m = c.expr.upper_bound() - c.rhs;
            if big_m > 0.0 {
                let expr = c.expr.clone().with_term(self.indicator, big_m);
                rows.push(expr.leq(c.rhs + big_m));
            }
        }
        if matches!(c.relation, Relation::GreaterEq | Relation::Equal) {
            let big_m = c.rhs - c.expr.lower_bound();
            if big_m > 0.0 {
                let expr = c.expr.clone().with_term(self.indicator, -big_m);
                rows.push(expr.geq(c.rhs - big_m));
            }
        }
        rows
    }
}

/// A maximization problem over binary variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MipProblem {
    name: String,
    variables: Vec<String>,
    constraints: Vec<LinearConstraint>,
    indicators: Vec<IndicatorConstraint>,
    primary: LinearExpr,
    secondary: Option<LinearExpr>,
    time_limit: Option<Duration>,
}

impl MipProblem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Declare a new binary variable.
    pub fn add_binary(&mut self, name: impl Into<String>) -> VarId {
        self.variables.push(name.into());
        VarId(self.variables.len() - 1)
    }

    pub fn add_constraint(&mut self, constraint: LinearConstraint) {
        self.constraints.push(constraint);
    }

    pub fn add_indicator(&mut self, indicator: VarId, constraint: LinearConstraint) {
        self.indicators.push(IndicatorConstraint {
            indicator,
            constraint,
        });
    }

    pub fn maximize(&mut self, objective: LinearExpr) {
        self.primary = objective;
    }

    /// Secondary objective, maximized among primary-optimal assignments.
    pub fn then_maximize(&mut self, objective: LinearExpr) {
        self.secondary = Some(objective);
    }

    pub fn set_time_limit(&mut self, limit: Duration) {
        self.time_limit = Some(limit);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    pub fn variable_name(&self, var: VarId) -> Option<&str> {
        self.variables.get(var.0).map(String::as_str)
    }

    pub fn variables(&self) -> impl Iterator<Item = (VarId, &str)> {
        self.variables
            .iter()
            .enumerate()
            .map(|(i, name)| (VarId(i), name.as_str()))
    }

    pub fn constraints(&self) -> &[LinearConstraint] {
        &self.constraints
    }

    pub fn indicators(&self) -> &[IndicatorConstraint] {
        &self.indicators
    }

    pub fn primary(&self) -> &LinearExpr {
        &self.primary
    }

    pub fn secondary(&self) -> Option<&LinearExpr> {
        self.secondary.as_ref()
    }

    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit
    }

    /// Check an assignment against every row, indicators included.
    pub fn is_feasible(&self, values: &[f64], tolerance: f64) -> bool {
        self.constraints
            .iter()
            .all(|c| c.is_satisfied(values, tolerance))
            && self.indicators.iter().all(|ind| {
                values.get(ind.indicator.0).copied().unwrap_or(0.0) <= DECISION_THRESHOLD
                    || ind.constraint.is_satisfied(values, tolerance)
            })
    }
}

/// Optimal assignment returned by a [`MipSolver`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MipSolution {
    objective: f64,
    secondary_objective: Option<f64>,
    values: Vec<f64>,
}

impl MipSolution {
    pub fn new(objective: f64, secondary_objective: Option<f64>, values: Vec<f64>) -> Self {
        Self {
            objective,
            secondary_objective,
            values,
        }
    }

    pub fn objective(&self) -> f64 {
        self.objective
    }

    pub fn secondary_objective(&self) -> Option<f64> {
        self.secondary_objective
    }

    pub fn value(&self, var: VarId) -> f64 {
        self.values.get(var.0).copied().unwrap_or(0.0)
    }

    /// Binary decision recovered with [`DECISION_THRESHOLD`].
    pub fn is_set(&self, var: VarId) -> bool {
        self.value(var) > DECISION_THRESHOLD
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// Errors a solver backend can report.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    #[error("problem has no feasible assignment")]
    Infeasible,
    #[error("problem objective is unbounded")]
    Unbounded,
    #[error("time budget exhausted before the solve could complete")]
    TimeLimitExhausted,
    #[error("solver backend failure: {0}")]
    Backend(String),
}

/// Capability interface for anything that can solve a [`MipProblem`].
pub trait MipSolver {
    fn solve(&self, problem: &MipProblem) -> Result<MipSolution, SolverError>;
}

impl<S: MipSolver + ?Sized> MipSolver for &S {
    fn solve(&self, problem: &MipProblem) -> Result<MipSolution, SolverError> {
        (**self).solve(problem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expression_bounds() {
        let mut p = MipProblem::new("bounds");
        let x = p.add_binary("x");
        let y = p.add_binary("y");
        let expr = LinearExpr::constant(1.0).with_term(x, 3.0).with_term(y, -2.0);
        assert_eq!(expr.upper_bound(), 4.0);
        assert_eq!(expr.lower_bound(), -1.0);
        assert_eq!(expr.evaluate(&[1.0, 1.0]), 2.0);
    }

    #[test]
    fn test_zero_coefficients_dropped() {
        let mut p = MipProblem::new("zero");
        let x = p.add_binary("x");
        let expr = LinearExpr::new().with_term(x, 0.0);
        assert!(expr.is_constant());
    }

    #[test]
    fn test_indicator_linearization_binds_only_when_set() {
        let mut p = MipProblem::new("indicator");
        let f = p.add_binary("f");
        let b = p.add_binary("b");
        // b = 1  ⇒  4f ≤ 1
        let ind = IndicatorConstraint {
            indicator: b,
            constraint: LinearExpr::new().with_term(f, 4.0).leq(1.0),
        };
        let rows = ind.linearize();
        assert_eq!(rows.len(), 1);
        // f = 1, b = 0 is allowed
        assert!(rows[0].is_satisfied(&[1.0, 0.0], 1e-9));
        // f = 1, b = 1 is not
        assert!(!rows[0].is_satisfied(&[1.0, 1.0], 1e-9));
        // f = 0, b = 1 is allowed
        assert!(rows[0].is_satisfied(&[0.0, 1.0], 1e-9));
    }

    #[test]
    fn test_redundant_indicator_dropped() {
        let mut p = MipProblem::new("redundant");
        let f = p.add_binary("f");
        let b = p.add_binary("b");
        let ind = IndicatorConstraint {
            indicator: b,
            constraint: LinearExpr::new().with_term(f, 2.0).leq(5.0),
        };
        assert!(ind.linearize().is_empty());
    }

    #[test]
    fn test_threshold() {
        let mut p = MipProblem::new("threshold");
        let x = p.add_binary("x");
        let y = p.add_binary("y");
        let sol = MipSolution::new(0.0, None, vec![0.999_999, 0.5]);
        assert!(sol.is_set(x));
        assert!(!sol.is_set(y));
        assert_eq!(p.variable_name(x), Some("x"));
    }
}
