use crate::core::agent::{Agent, AgentId};
use crate::core::edge::{EdgeKey, Vertex};
use crate::core::error::ModelError;
use crate::graph::route::is_valid_route;
use crate::optimization::flow_model::{coefficient, FlowModel};
use crate::optimization::OptimizationError;
use crate::solver::{LinearExpr, MipProblem, MipSolution, MipSolver, VarId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Result of an agent optimizing alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleAgentOutcome {
    pub agent: AgentId,
    pub payoff: Decimal,
    pub revenue: Decimal,
    pub edge_costs: Decimal,
    pub free_capacity: u32,
    pub solver_objective: f64,
}

/// The standalone problem of one agent over its own edges.
///
/// Maximizes `revenue − activation costs` first and, among the optimal
/// routings, the total capacity left unused on its edges.
#[derive(Debug, Clone)]
pub struct SingleAgentModel {
    agent: AgentId,
    problem: MipProblem,
    flow: FlowModel,
    activations: BTreeMap<EdgeKey, VarId>,
}

impl SingleAgentModel {
    pub fn build(vertices: &BTreeSet<Vertex>, agent: &Agent) -> Result<Self, ModelError> {
        let mut problem = MipProblem::new(format!("single-agent-{}", agent.id()));
        let edges: BTreeSet<EdgeKey> = agent.edges().keys().copied().collect();
        let flow = FlowModel::build(&mut problem, vertices, &edges, agent.commodities().values())?;

        let mut activations = BTreeMap::new();
        let mut costs = LinearExpr::new();
        let mut free_capacity = LinearExpr::new();
        for (key, edge) in agent.edges() {
            let u = problem.add_binary(format!("u[{}]", key));
            activations.insert(*key, u);

            let capacity = f64::from(edge.original_capacity());
            let load = flow.load(key);
            let mut row = load.clone();
            row.add_term(u, -capacity);
            problem.add_constraint(row.leq(0.0));

            costs.add_term(u, coefficient(edge.cost()));
            free_capacity.add_constant(capacity);
            free_capacity.add_scaled(&load, -1.0);
        }

        let mut profit = flow.revenue();
        profit.add_scaled(&costs, -1.0);
        problem.maximize(profit);
        problem.then_maximize(free_capacity);

        Ok(Self {
            agent: agent.id(),
            problem,
            flow,
            activations,
        })
    }

    pub fn problem(&self) -> &MipProblem {
        &self.problem
    }

    pub fn set_time_limit(&mut self, limit: Duration) {
        self.problem.set_time_limit(limit);
    }

    /// Write the decisions of `solution` into a restored `agent`.
    pub fn apply(
        &self,
        solution: &MipSolution,
        agent: &mut Agent,
    ) -> Result<SingleAgentOutcome, ModelError> {
        if agent.id() != self.agent {
            return Err(ModelError::UnknownAgent { agent: agent.id() });
        }
        let active: BTreeSet<EdgeKey> = self
            .activations
            .iter()
            .filter(|(_, &u)| solution.is_set(u))
            .map(|(key, _)| *key)
            .collect();
        let routes = self.flow.routes(solution);
        for (key, route) in &routes {
            if !is_valid_route(key.origin, key.terminal, route) {
                log::warn!("agent {}: decoded route of {} is not a simple path", agent.id(), key);
            }
        }
        agent.apply_routing(active, routes)?;

        let revenue = agent.served_revenue();
        let edge_costs = agent.active_edge_costs();
        let payoff = revenue - edge_costs;
        agent.set_payoff_no_cooperation(payoff);

        let outcome = SingleAgentOutcome {
            agent: agent.id(),
            payoff,
            revenue,
            edge_costs,
            free_capacity: agent.total_free_capacity(),
            solver_objective: solution.objective(),
        };
        if (coefficient(payoff) - outcome.solver_objective).abs() > 1e-6 {
            log::warn!(
                "agent {}: exact payoff {} differs from solver objective {:.6}",
                agent.id(),
                payoff,
                outcome.solver_objective
            );
        }
        Ok(outcome)
    }
}

/// Restore `agent`, solve its standalone problem and apply the result.
pub fn solve_single_agent<S: MipSolver>(
    solver: &S,
    vertices: &BTreeSet<Vertex>,
    agent: &mut Agent,
    time_limit: Option<Duration>,
) -> Result<SingleAgentOutcome, OptimizationError> {
    agent.restore_edges();
    agent.restore_commodities();

    let mut model = SingleAgentModel::build(vertices, agent)?;
    if let Some(limit) = time_limit {
        model.set_time_limit(limit);
    }
    let solution = solver.solve(model.problem())?;
    let outcome = model.apply(&solution, agent)?;
    log::debug!(
        "agent {} alone: payoff {} (revenue {}, costs {})",
        outcome.agent,
        outcome.payoff,
        outcome.revenue,
        outcome.edge_costs
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::commodity::CommodityKey;
    use crate::core::instance::{AgentData, Instance};
    use crate::solver::good_lp_backend::GoodLpSolver;
    use crate::solver::SolverError;
    use rust_decimal_macros::dec;

    struct Infeasible;

    impl MipSolver for Infeasible {
        fn solve(&self, _: &MipProblem) -> Result<MipSolution, SolverError> {
            Err(SolverError::Infeasible)
        }
    }

    fn two_hop() -> Instance {
        // direct edge is pricier than the two-hop path
        Instance::new(0..3).with_agent(
            AgentData::new(0)
                .with_edge(0, 2, dec!(9), 4)
                .with_edge(0, 1, dec!(2), 4)
                .with_edge(1, 2, dec!(2), 4)
                .with_commodity(0, 2, 3, dec!(3)),
        )
    }

    #[test]
    fn test_cheapest_route_chosen() {
        let instance = two_hop();
        let mut agents = instance.build_agents().unwrap();
        let agent = agents.get_mut(&AgentId::new(0)).unwrap();

        let outcome =
            solve_single_agent(&GoodLpSolver::new(), instance.vertex_set(), agent, None).unwrap();

        assert_eq!(outcome.payoff, dec!(5));
        assert_eq!(outcome.revenue, dec!(9));
        assert_eq!(outcome.edge_costs, dec!(4));
        assert_eq!(agent.payoff_no_cooperation(), dec!(5));
        let route = agent.commodity(&CommodityKey::new(0, 2, 0)).unwrap().route().unwrap();
        assert!(route.contains(&EdgeKey::new(0, 1, 0)));
        assert!(route.contains(&EdgeKey::new(1, 2, 0)));
        assert_eq!(agent.edges_with_capacity().len(), 2);
    }

    #[test]
    fn test_unprofitable_commodity_unserved() {
        let instance = Instance::new(0..2).with_agent(
            AgentData::new(0)
                .with_edge(0, 1, dec!(10), 5)
                .with_commodity(0, 1, 2, dec!(1)),
        );
        let mut agents = instance.build_agents().unwrap();
        let agent = agents.get_mut(&AgentId::new(0)).unwrap();

        let outcome =
            solve_single_agent(&GoodLpSolver::new(), instance.vertex_set(), agent, None).unwrap();

        assert_eq!(outcome.payoff, Decimal::ZERO);
        assert!(agent.active_edges().is_empty());
        assert_eq!(agent.unserved().len(), 1);
        assert_eq!(outcome.free_capacity, 5);
    }

    #[test]
    fn test_secondary_objective_keeps_capacity_free() {
        // both routes earn 7; the direct one leaves 12 units free instead of 10
        let instance = Instance::new(0..3).with_agent(
            AgentData::new(0)
                .with_edge(0, 1, dec!(1), 2)
                .with_edge(0, 2, dec!(0.5), 6)
                .with_edge(2, 1, dec!(0.5), 6)
                .with_commodity(0, 1, 2, dec!(4)),
        );
        let mut agents = instance.build_agents().unwrap();
        let agent = agents.get_mut(&AgentId::new(0)).unwrap();

        let outcome =
            solve_single_agent(&GoodLpSolver::new(), instance.vertex_set(), agent, None).unwrap();

        assert_eq!(outcome.payoff, dec!(7));
        assert_eq!(outcome.free_capacity, 12);
    }

    #[test]
    fn test_infeasible_reported() {
        let instance = two_hop();
        let mut agents = instance.build_agents().unwrap();
        let agent = agents.get_mut(&AgentId::new(0)).unwrap();
        let result = solve_single_agent(&Infeasible, instance.vertex_set(), agent, None);
        assert!(matches!(
            result,
            Err(OptimizationError::Solver(SolverError::Infeasible))
        ));
        assert!(agent.served().is_empty());
    }
}
