use crate::core::agent::AgentId;
use crate::core::instance::Instance;
use crate::negotiation::driver::{
    Equilibrium, NegotiationConfig, NegotiationFailure, NegotiationSession,
};
use crate::solver::MipSolver;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::fmt;
use std::panic;
use std::thread;

/// Outcome of negotiating the same instance under both processing orders.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderComparison {
    pub forward_order: [AgentId; 2],
    pub forward: Result<Equilibrium, NegotiationFailure>,
    pub reverse: Result<Equilibrium, NegotiationFailure>,
}

impl OrderComparison {
    pub fn reverse_order(&self) -> [AgentId; 2] {
        let [a, b] = self.forward_order;
        [b, a]
    }

    /// Forward minus reverse total payoff, when both converged.
    pub fn payoff_difference(&self) -> Option<Decimal> {
        match (&self.forward, &self.reverse) {
            (Ok(f), Ok(r)) => Some(f.total_payoff - r.total_payoff),
            _ => None,
        }
    }

    /// Payoff difference relative to the reverse payoff, in percent. `None`
    /// when either order failed or the reverse payoff is zero.
    pub fn payoff_difference_percent(&self) -> Option<f64> {
        let reverse = self.reverse.as_ref().ok()?.total_payoff;
        if reverse == Decimal::ZERO {
            return None;
        }
        let diff = self.payoff_difference()?;
        (diff * Decimal::from(100) / reverse).to_f64()
    }

    /// Forward minus reverse rounds, failures included.
    pub fn round_difference(&self) -> i64 {
        rounds(&self.forward) as i64 - rounds(&self.reverse) as i64
    }

    pub fn order_matters(&self) -> bool {
        self.payoff_difference()
            .map(|d| d != Decimal::ZERO)
            .unwrap_or(true)
    }
}

fn rounds(result: &Result<Equilibrium, NegotiationFailure>) -> usize {
    match result {
        Ok(eq) => eq.rounds,
        Err(failure) => failure.rounds_used(),
    }
}

fn describe(
    f: &mut fmt::Formatter<'_>,
    order: [AgentId; 2],
    result: &Result<Equilibrium, NegotiationFailure>,
) -> fmt::Result {
    match result {
        Ok(eq) => writeln!(
            f,
            "  [{}, {}]: total payoff {} after {} rounds",
            order[0], order[1], eq.total_payoff, eq.rounds
        ),
        Err(failure) => writeln!(f, "  [{}, {}]: {}", order[0], order[1], failure),
    }
}

impl fmt::Display for OrderComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Processing Order Comparison ===")?;
        describe(f, self.forward_order, &self.forward)?;
        describe(f, self.reverse_order(), &self.reverse)?;
        match (self.payoff_difference(), self.payoff_difference_percent()) {
            (Some(d), Some(pct)) => writeln!(f, "Payoff difference: {} ({:+.1}%)", d, pct)?,
            (Some(d), None) => writeln!(f, "Payoff difference: {}", d)?,
            (None, _) => writeln!(f, "Payoff difference: n/a")?,
        }
        writeln!(f, "Round difference:  {}", self.round_difference())
    }
}

/// Negotiate under `order` and its reverse, each session on its own thread.
pub fn compare_orders<S: MipSolver + Sync>(
    instance: &Instance,
    order: [AgentId; 2],
    config: &NegotiationConfig,
    solver: &S,
) -> OrderComparison {
    let [a, b] = order;
    let negotiate = |order: [AgentId; 2]| {
        NegotiationSession::new(instance, order, solver, config.clone())?.run()
    };

    let (forward, reverse) = thread::scope(|scope| {
        let forward = scope.spawn(|| negotiate([a, b]));
        let reverse = scope.spawn(|| negotiate([b, a]));
        (
            forward.join().unwrap_or_else(|payload| panic::resume_unwind(payload)),
            reverse.join().unwrap_or_else(|payload| panic::resume_unwind(payload)),
        )
    });

    OrderComparison {
        forward_order: order,
        forward,
        reverse,
    }
}
