//! [`MipSolver`] backed by `good_lp` and its pure-Rust `microlp` solver.

use crate::solver::{
    LinearConstraint, LinearExpr, MipProblem, MipSolution, MipSolver, Relation, SolverError,
};
use good_lp::{
    default_solver, variable, variables, Expression, ResolutionError, Solution, SolverModel,
    Variable,
};
use std::time::{Duration, Instant};

impl From<ResolutionError> for SolverError {
    fn from(err: ResolutionError) -> Self {
        match err {
            ResolutionError::Infeasible => SolverError::Infeasible,
            ResolutionError::Unbounded => SolverError::Unbounded,
            other => SolverError::Backend(other.to_string()),
        }
    }
}

/// Renders a [`MipProblem`] into a `good_lp` model.
///
/// Indicator rows are linearized with big-M terms. A secondary objective is
/// solved as a second stage with the primary objective pinned to its optimum
/// (minus `lexicographic_tolerance`). The deadline is checked before every
/// stage; the backend cannot interrupt a stage already running.
#[derive(Debug, Clone)]
pub struct GoodLpSolver {
    lexicographic_tolerance: f64,
}

impl Default for GoodLpSolver {
    fn default() -> Self {
        Self {
            lexicographic_tolerance: 1e-6,
        }
    }
}

impl GoodLpSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lexicographic_tolerance(mut self, tolerance: f64) -> Self {
        self.lexicographic_tolerance = tolerance;
        self
    }

    fn solve_stage(
        &self,
        problem: &MipProblem,
        objective: &LinearExpr,
        primary_floor: Option<f64>,
    ) -> Result<Vec<f64>, SolverError> {
        let mut vars = variables!();
        let handles: Vec<Variable> = (0..problem.variable_count())
            .map(|_| vars.add(variable().binary()))
            .collect();

        let mut model = vars
            .maximise(to_expression(objective, &handles))
            .using(default_solver);

        for row in problem.constraints() {
            if let Some(constraint) = to_constraint(row, &handles)? {
                model = model.with(constraint);
            }
        }
        for indicator in problem.indicators() {
            for row in indicator.linearize() {
                if let Some(constraint) = to_constraint(&row, &handles)? {
                    model = model.with(constraint);
                }
            }
        }
        if let Some(floor) = primary_floor.filter(|_| !problem.primary().is_constant()) {
            let primary = problem.primary();
            model = model.with(
                to_expression(primary, &handles).geq(floor - primary.constant_term()),
            );
        }

        let solution = model.solve()?;
        Ok(handles.iter().map(|&v| solution.value(v)).collect())
    }
}

impl MipSolver for GoodLpSolver {
    fn solve(&self, problem: &MipProblem) -> Result<MipSolution, SolverError> {
        let started = Instant::now();
        let deadline = problem.time_limit();
        ensure_budget(deadline, started)?;

        if problem.variable_count() == 0 {
            if let Some(row) = problem.constraints().iter().find(|c| !c.is_satisfied(&[], 1e-9)) {
                log::debug!(
                    "{}: constant row {} {} violated",
                    problem.name(),
                    row.relation,
                    row.rhs
                );
                return Err(SolverError::Infeasible);
            }
            return Ok(MipSolution::new(
                problem.primary().constant_term(),
                problem.secondary().map(LinearExpr::constant_term),
                Vec::new(),
            ));
        }

        let values = self.solve_stage(problem, problem.primary(), None)?;
        let objective = problem.primary().evaluate(&values);
        log::debug!(
            "{}: primary stage objective {:.6} ({} vars, {} rows) in {:?}",
            problem.name(),
            objective,
            problem.variable_count(),
            problem.constraints().len() + problem.indicators().len(),
            started.elapsed()
        );

        let Some(secondary) = problem.secondary() else {
            return Ok(MipSolution::new(objective, None, values));
        };

        ensure_budget(deadline, started)?;
        let floor = objective - self.lexicographic_tolerance;
        let values = self.solve_stage(problem, secondary, Some(floor))?;
        let secondary_objective = secondary.evaluate(&values);
        log::debug!(
            "{}: secondary stage objective {:.6} in {:?}",
            problem.name(),
            secondary_objective,
            started.elapsed()
        );
        Ok(MipSolution::new(
            problem.primary().evaluate(&values),
            Some(secondary_objective),
            values,
        ))
    }
}

fn ensure_budget(limit: Option<Duration>, started: Instant) -> Result<(), SolverError> {
    match limit {
        Some(limit) if started.elapsed() >= limit => Err(SolverError::TimeLimitExhausted),
        _ => Ok(()),
    }
}

/// Variable terms only; constants are folded into right-hand sides.
fn to_expression(expr: &LinearExpr, handles: &[Variable]) -> Expression {
    let mut out = Expression::with_capacity(expr.terms().len());
    for &(var, coef) in expr.terms() {
        out.add_mul(coef, handles[var.index()]);
    }
    out
}

/// Rows without variables are checked here instead of being sent to the
/// backend: a satisfied one is dropped, a violated one is infeasible.
fn to_constraint(
    row: &LinearConstraint,
    handles: &[Variable],
) -> Result<Option<good_lp::Constraint>, SolverError> {
    if row.expr.is_constant() {
        return if row.is_satisfied(&[], 1e-9) {
            Ok(None)
        } else {
            Err(SolverError::Infeasible)
        };
    }
    let lhs = to_expression(&row.expr, handles);
    let rhs = row.rhs - row.expr.constant_term();
    Ok(Some(match row.relation {
        Relation::LessEq => lhs.leq(rhs),
        Relation::Equal => lhs.eq(rhs),
        Relation::GreaterEq => lhs.geq(rhs),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_knapsack() {
        let mut p = MipProblem::new("knapsack");
        let a = p.add_binary("a");
        let b = p.add_binary("b");
        let c = p.add_binary("c");
        p.add_constraint(
            LinearExpr::new()
                .with_term(a, 3.0)
                .with_term(b, 4.0)
                .with_term(c, 2.0)
                .leq(6.0),
        );
        p.maximize(
            LinearExpr::new()
                .with_term(a, 4.0)
                .with_term(b, 5.0)
                .with_term(c, 3.0),
        );

        let sol = GoodLpSolver::new().solve(&p).unwrap();
        assert_relative_eq!(sol.objective(), 8.0, epsilon = 1e-6);
        assert!(sol.is_set(b));
        assert!(sol.is_set(c));
        assert!(!sol.is_set(a));
    }

    #[test]
    fn test_infeasible() {
        let mut p = MipProblem::new("infeasible");
        let a = p.add_binary("a");
        p.add_constraint(LinearExpr::new().with_term(a, 1.0).geq(2.0));
        p.maximize(LinearExpr::new().with_term(a, 1.0));
        assert_eq!(GoodLpSolver::new().solve(&p), Err(SolverError::Infeasible));
    }

    #[test]
    fn test_lexicographic_secondary() {
        // Both a and b reach the primary optimum; the secondary prefers b.
        let mut p = MipProblem::new("lex");
        let a = p.add_binary("a");
        let b = p.add_binary("b");
        p.add_constraint(LinearExpr::new().with_term(a, 1.0).with_term(b, 1.0).leq(1.0));
        p.maximize(LinearExpr::new().with_term(a, 2.0).with_term(b, 2.0));
        p.then_maximize(LinearExpr::constant(10.0).with_term(b, 1.0));

        let sol = GoodLpSolver::new().solve(&p).unwrap();
        assert_relative_eq!(sol.objective(), 2.0, epsilon = 1e-6);
        assert_relative_eq!(sol.secondary_objective().unwrap(), 11.0, epsilon = 1e-6);
        assert!(sol.is_set(b));
    }

    #[test]
    fn test_lexicographic_tolerance_trades_primary() {
        // a is better on the primary, b on the secondary.
        let mut p = MipProblem::new("tolerance");
        let a = p.add_binary("a");
        let b = p.add_binary("b");
        p.add_constraint(LinearExpr::new().with_term(a, 1.0).with_term(b, 1.0).leq(1.0));
        p.maximize(LinearExpr::new().with_term(a, 2.0).with_term(b, 1.5));
        p.then_maximize(LinearExpr::new().with_term(b, 1.0));

        let strict = GoodLpSolver::new().solve(&p).unwrap();
        assert!(strict.is_set(a));
        assert_relative_eq!(strict.objective(), 2.0, epsilon = 1e-6);

        let loose = GoodLpSolver::new()
            .with_lexicographic_tolerance(1.0)
            .solve(&p)
            .unwrap();
        assert!(loose.is_set(b));
        assert_relative_eq!(loose.objective(), 1.5, epsilon = 1e-6);
    }

    #[test]
    fn test_indicator_enforced() {
        // Committing (b) pays 1 but forbids using f, which pays 3.
        let mut p = MipProblem::new("indicator");
        let f = p.add_binary("f");
        let b = p.add_binary("b");
        p.add_indicator(b, LinearExpr::new().with_term(f, 1.0).leq(0.0));
        p.maximize(LinearExpr::new().with_term(f, 3.0).with_term(b, 1.0));

        let sol = GoodLpSolver::new().solve(&p).unwrap();
        assert_relative_eq!(sol.objective(), 3.0, epsilon = 1e-6);
        assert!(sol.is_set(f));
        assert!(!sol.is_set(b));
    }

    #[test]
    fn test_empty_problem() {
        let mut p = MipProblem::new("empty");
        p.maximize(LinearExpr::constant(3.0));
        let sol = GoodLpSolver::new().solve(&p).unwrap();
        assert_relative_eq!(sol.objective(), 3.0);
        assert!(sol.values().is_empty());

        p.add_constraint(LinearExpr::new().geq(1.0));
        assert_eq!(GoodLpSolver::new().solve(&p), Err(SolverError::Infeasible));
    }

    #[test]
    fn test_zero_time_limit() {
        let mut p = MipProblem::new("no-time");
        let a = p.add_binary("a");
        p.maximize(LinearExpr::new().with_term(a, 1.0));
        p.set_time_limit(Duration::ZERO);
        assert_eq!(
            GoodLpSolver::new().solve(&p),
            Err(SolverError::TimeLimitExhausted)
        );
    }
}
