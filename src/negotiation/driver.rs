use crate::core::agent::{Agent, AgentId};
use crate::core::edge::Vertex;
use crate::core::error::ModelError;
use crate::core::instance::Instance;
use crate::core::platform::InformationPlatform;
use crate::core::solution::Solution;
use crate::optimization::iterative::{IterativeModel, IterativeOutcome};
use crate::solver::{MipSolver, SolverError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

/// Limits of one negotiation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationConfig {
    /// Rounds played before giving up.
    pub max_rounds: usize,
    /// Wall-clock budget for the whole session.
    pub time_limit: Duration,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            max_rounds: 100,
            time_limit: Duration::from_secs(5400),
        }
    }
}

/// Why a negotiation ended without an equilibrium.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NegotiationFailure {
    #[error("no equilibrium reached within {rounds} rounds")]
    RoundLimitExceeded { rounds: usize },
    #[error("agent {agent} has no feasible best response in round {round}")]
    Infeasible { agent: AgentId, round: usize },
    #[error("time budget exhausted before agent {agent} could solve in round {round}")]
    TimeBudgetExhausted { agent: AgentId, round: usize },
    #[error("solver failed for agent {agent} in round {round}: {source}")]
    Solver {
        agent: AgentId,
        round: usize,
        #[source]
        source: SolverError,
    },
    #[error("invalid model in round {round}: {source}")]
    Model {
        round: usize,
        #[source]
        source: ModelError,
    },
    #[error("processing order must name two distinct instance agents, got {first} and {second}")]
    InvalidOrder { first: AgentId, second: AgentId },
}

impl NegotiationFailure {
    /// Rounds started before the failure.
    pub fn rounds_used(&self) -> usize {
        match self {
            NegotiationFailure::RoundLimitExceeded { rounds } => *rounds,
            NegotiationFailure::Infeasible { round, .. }
            | NegotiationFailure::TimeBudgetExhausted { round, .. }
            | NegotiationFailure::Solver { round, .. }
            | NegotiationFailure::Model { round, .. } => *round,
            NegotiationFailure::InvalidOrder { .. } => 0,
        }
    }
}

/// A fixed point of the best-response process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equilibrium {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub order: [AgentId; 2],
    pub rounds: usize,
    pub total_payoff: Decimal,
    pub payoffs: BTreeMap<AgentId, Decimal>,
    pub solutions: BTreeMap<AgentId, Solution>,
}

/// Summary of one completed round.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundReport {
    pub round: usize,
    pub outcomes: [IterativeOutcome; 2],
    pub converged: bool,
}

impl RoundReport {
    pub fn total_payoff(&self) -> Decimal {
        self.outcomes.iter().map(|o| o.payoff).sum()
    }
}

/// State of one two-agent negotiation.
///
/// Each round the first agent of the order best-responds to the second
/// agent's published state, then the second to the first. The session
/// converges once both agents' last two snapshots are identical, which
/// takes at least two rounds. The order never rotates.
pub struct NegotiationSession<S> {
    id: Uuid,
    started_at: DateTime<Utc>,
    clock: Instant,
    order: [AgentId; 2],
    vertices: BTreeSet<Vertex>,
    agents: BTreeMap<AgentId, Agent>,
    platform: InformationPlatform,
    round: usize,
    solver: S,
    config: NegotiationConfig,
}

impl<S: MipSolver> NegotiationSession<S> {
    /// Set up fresh agents and an empty platform. Agents of the instance
    /// that are not in `order` take no part.
    pub fn new(
        instance: &Instance,
        order: [AgentId; 2],
        solver: S,
        config: NegotiationConfig,
    ) -> Result<Self, NegotiationFailure> {
        let [first, second] = order;
        if first == second || !instance.contains_agent(first) || !instance.contains_agent(second) {
            return Err(NegotiationFailure::InvalidOrder { first, second });
        }
        let mut agents = instance
            .build_agents()
            .map_err(|source| NegotiationFailure::Model { round: 0, source })?;
        agents.retain(|id, _| order.contains(id));

        let session = Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            clock: Instant::now(),
            order,
            vertices: instance.vertex_set().clone(),
            agents,
            platform: InformationPlatform::new(order),
            round: 0,
            solver,
            config,
        };
        log::info!(
            "session {}: negotiating {} then {} (max {} rounds, {:?} budget)",
            session.id,
            first,
            second,
            session.config.max_rounds,
            session.config.time_limit
        );
        Ok(session)
    }

    // --- Accessors ---

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn order(&self) -> [AgentId; 2] {
        self.order
    }

    pub fn round(&self) -> usize {
        self.round
    }

    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(&id)
    }

    pub fn platform(&self) -> &InformationPlatform {
        &self.platform
    }

    pub fn config(&self) -> &NegotiationConfig {
        &self.config
    }

    /// Both agents repeated their previous snapshot.
    pub fn is_converged(&self) -> bool {
        self.round >= 2 && self.agents.values().all(Agent::is_stable)
    }

    /// Play one round: both agents solve in order, then convergence is checked.
    pub fn play_round(&mut self) -> Result<RoundReport, NegotiationFailure> {
        self.round += 1;
        let [first, second] = self.order;
        let first_outcome = self.turn(first, second)?;
        let second_outcome = self.turn(second, first)?;

        let converged = self.is_converged();
        log::debug!(
            "session {} round {}: {} earns {}, {} earns {}{}",
            self.id,
            self.round,
            first,
            first_outcome.payoff,
            second,
            second_outcome.payoff,
            if converged { " (stable)" } else { "" }
        );
        Ok(RoundReport {
            round: self.round,
            outcomes: [first_outcome, second_outcome],
            converged,
        })
    }

    /// Play rounds until an equilibrium or a failure.
    pub fn run(mut self) -> Result<Equilibrium, NegotiationFailure> {
        while self.round < self.config.max_rounds {
            let report = self.play_round()?;
            if report.converged {
                let equilibrium = self.equilibrium();
                log::info!(
                    "session {}: equilibrium after {} rounds, total payoff {}",
                    self.id,
                    equilibrium.rounds,
                    equilibrium.total_payoff
                );
                return Ok(equilibrium);
            }
        }
        log::warn!(
            "session {}: no equilibrium within {} rounds",
            self.id,
            self.config.max_rounds
        );
        Err(NegotiationFailure::RoundLimitExceeded {
            rounds: self.config.max_rounds,
        })
    }

    fn equilibrium(&self) -> Equilibrium {
        let solutions: BTreeMap<AgentId, Solution> = self
            .agents
            .iter()
            .filter_map(|(id, agent)| agent.latest_solution().map(|s| (*id, s.clone())))
            .collect();
        let payoffs: BTreeMap<AgentId, Decimal> =
            solutions.iter().map(|(id, s)| (*id, s.payoff())).collect();
        Equilibrium {
            session_id: self.id,
            started_at: self.started_at,
            order: self.order,
            rounds: self.round,
            total_payoff: payoffs.values().sum(),
            payoffs,
            solutions,
        }
    }

    fn turn(
        &mut self,
        id: AgentId,
        rival: AgentId,
    ) -> Result<IterativeOutcome, NegotiationFailure> {
        let round = self.round;
        let remaining = self
            .config
            .time_limit
            .checked_sub(self.clock.elapsed())
            .filter(|left| !left.is_zero())
            .ok_or(NegotiationFailure::TimeBudgetExhausted { agent: id, round })?;
        let model_error = |source| NegotiationFailure::Model { round, source };

        let agent = self
            .agents
            .get_mut(&id)
            .ok_or(ModelError::UnknownAgent { agent: id })
            .map_err(model_error)?;
        agent.restore_commodities();
        agent.restore_edges();
        self.platform.restore(id);

        let mut model = IterativeModel::build(&self.vertices, agent, &self.platform, rival)
            .map_err(model_error)?;
        model.set_time_limit(remaining);

        let solution = self.solver.solve(model.problem()).map_err(|err| match err {
            SolverError::Infeasible => {
                log::warn!("session {}: agent {} infeasible in round {}", self.id, id, round);
                NegotiationFailure::Infeasible { agent: id, round }
            }
            SolverError::TimeLimitExhausted => {
                NegotiationFailure::TimeBudgetExhausted { agent: id, round }
            }
            source => NegotiationFailure::Solver {
                agent: id,
                round,
                source,
            },
        })?;

        let outcome = model
            .apply(&solution, agent, &mut self.platform)
            .map_err(model_error)?;
        agent.record_solution(outcome.snapshot().clone());
        Ok(outcome)
    }
}

/// Run a complete negotiation between the two agents of `order`.
pub fn run_negotiation<S: MipSolver>(
    instance: &Instance,
    order: [AgentId; 2],
    max_rounds: usize,
    max_wall_clock: Duration,
    solver: S,
) -> Result<Equilibrium, NegotiationFailure> {
    let config = NegotiationConfig {
        max_rounds,
        time_limit: max_wall_clock,
    };
    NegotiationSession::new(instance, order, solver, config)?.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::instance::AgentData;
    use crate::solver::good_lp_backend::GoodLpSolver;
    use crate::solver::{MipProblem, MipSolution};
    use rust_decimal_macros::dec;
    use std::cell::Cell;

    fn borrowing_instance() -> Instance {
        Instance::new(0..4)
            .with_agent(
                AgentData::new(0)
                    .with_edge(2, 3, dec!(3), 5)
                    .with_commodity(0, 1, 4, dec!(2)),
            )
            .with_agent(
                AgentData::new(1)
                    .with_edge(0, 1, dec!(3), 5)
                    .with_commodity(0, 1, 1, dec!(5)),
            )
    }

    fn ids() -> [AgentId; 2] {
        [AgentId::new(0), AgentId::new(1)]
    }

    struct Infeasible;

    impl MipSolver for Infeasible {
        fn solve(&self, _: &MipProblem) -> Result<MipSolution, SolverError> {
            Err(SolverError::Infeasible)
        }
    }

    struct OutOfTime;

    impl MipSolver for OutOfTime {
        fn solve(&self, _: &MipProblem) -> Result<MipSolution, SolverError> {
            Err(SolverError::TimeLimitExhausted)
        }
    }

    /// Alternates every activation variable between calls, so snapshots
    /// never repeat.
    struct Toggling {
        calls: Cell<usize>,
    }

    impl MipSolver for Toggling {
        fn solve(&self, problem: &MipProblem) -> Result<MipSolution, SolverError> {
            let call = self.calls.get();
            self.calls.set(call + 1);
            let on = (call / 2) % 2 == 0;
            let values = problem
                .variables()
                .map(|(_, name)| if on && name.starts_with("u[") { 1.0 } else { 0.0 })
                .collect();
            Ok(MipSolution::new(0.0, None, values))
        }
    }

    #[test]
    fn test_borrowing_converges_in_three_rounds() {
        let eq = run_negotiation(
            &borrowing_instance(),
            ids(),
            10,
            Duration::from_secs(60),
            GoodLpSolver::new(),
        )
        .unwrap();
        assert_eq!(eq.rounds, 3);
        assert_eq!(eq.total_payoff, dec!(10.0));
        assert_eq!(eq.payoffs[&AgentId::new(0)], dec!(5.6));
        assert_eq!(eq.payoffs[&AgentId::new(1)], dec!(4.4));
        assert_eq!(eq.solutions[&AgentId::new(1)].in_payments(), dec!(2.4));
    }

    #[test]
    fn test_step_by_step() {
        let mut session = NegotiationSession::new(
            &borrowing_instance(),
            ids(),
            GoodLpSolver::new(),
            NegotiationConfig::default(),
        )
        .unwrap();
        let first = session.play_round().unwrap();
        assert_eq!(first.round, 1);
        assert!(!first.converged);
        // nothing is shared yet, so agent 0 cannot ship
        assert_eq!(first.outcomes[0].payoff, Decimal::ZERO);
        assert_eq!(first.outcomes[1].payoff, dec!(2));
        assert_eq!(
            session.agent(AgentId::new(1)).unwrap().payoff_cooperation(),
            dec!(2)
        );

        let second = session.play_round().unwrap();
        assert!(!second.converged);
        assert_eq!(second.total_payoff(), dec!(10.0));

        let third = session.play_round().unwrap();
        assert!(third.converged);
        assert!(session.is_converged());
    }

    #[test]
    fn test_infeasible_first_agent() {
        let result = run_negotiation(
            &borrowing_instance(),
            ids(),
            10,
            Duration::from_secs(60),
            Infeasible,
        );
        assert_eq!(
            result,
            Err(NegotiationFailure::Infeasible {
                agent: AgentId::new(0),
                round: 1
            })
        );
        assert_eq!(result.unwrap_err().rounds_used(), 1);
    }

    #[test]
    fn test_round_limit() {
        let solver = Toggling { calls: Cell::new(0) };
        let result =
            run_negotiation(&borrowing_instance(), ids(), 5, Duration::from_secs(60), solver);
        assert_eq!(result, Err(NegotiationFailure::RoundLimitExceeded { rounds: 5 }));
    }

    #[test]
    fn test_converges_on_last_allowed_round() {
        let eq = run_negotiation(
            &borrowing_instance(),
            ids(),
            3,
            Duration::from_secs(60),
            GoodLpSolver::new(),
        )
        .unwrap();
        assert_eq!(eq.rounds, 3);
        assert_eq!(eq.total_payoff, dec!(10.0));
    }

    #[test]
    fn test_solver_time_limit_maps_to_budget_failure() {
        let result = run_negotiation(
            &borrowing_instance(),
            ids(),
            10,
            Duration::from_secs(60),
            OutOfTime,
        );
        assert_eq!(
            result,
            Err(NegotiationFailure::TimeBudgetExhausted {
                agent: AgentId::new(0),
                round: 1
            })
        );
    }

    #[test]
    fn test_zero_budget() {
        let result = run_negotiation(
            &borrowing_instance(),
            ids(),
            10,
            Duration::ZERO,
            GoodLpSolver::new(),
        );
        assert_eq!(
            result,
            Err(NegotiationFailure::TimeBudgetExhausted {
                agent: AgentId::new(0),
                round: 1
            })
        );
    }

    #[test]
    fn test_invalid_orders() {
        let instance = borrowing_instance();
        let same = [AgentId::new(0), AgentId::new(0)];
        let config = NegotiationConfig::default();
        assert!(matches!(
            NegotiationSession::new(&instance, same, GoodLpSolver::new(), config.clone()),
            Err(NegotiationFailure::InvalidOrder { .. })
        ));
        let missing = [AgentId::new(0), AgentId::new(7)];
        assert!(matches!(
            NegotiationSession::new(&instance, missing, GoodLpSolver::new(), config),
            Err(NegotiationFailure::InvalidOrder { .. })
        ));
    }

    #[test]
    fn test_zero_rounds() {
        let result = run_negotiation(
            &borrowing_instance(),
            ids(),
            0,
            Duration::from_secs(60),
            GoodLpSolver::new(),
        );
        assert_eq!(result, Err(NegotiationFailure::RoundLimitExceeded { rounds: 0 }));
    }
}
