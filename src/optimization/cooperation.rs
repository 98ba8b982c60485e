use crate::core::agent::{Agent, AgentId, PayoffScheme};
use crate::core::commodity::{Commodity, CommodityKey};
use crate::core::edge::{Edge, EdgeKey, Vertex};
use crate::core::error::ModelError;
use crate::core::ledger::SidePaymentLedger;
use crate::optimization::flow_model::{coefficient, FlowModel};
use crate::optimization::single_agent::solve_single_agent;
use crate::optimization::OptimizationError;
use crate::solver::{LinearExpr, MipProblem, MipSolution, MipSolver, VarId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

/// How much of the agents' data a central planner pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CooperationRegime {
    /// Unserved commodities over the spare capacity of active edges.
    Residual,
    /// Every commodity over the edges already activated alone.
    Partial,
    /// Every commodity over every edge.
    Full,
}

impl CooperationRegime {
    pub const ALL: [CooperationRegime; 3] = [
        CooperationRegime::Residual,
        CooperationRegime::Partial,
        CooperationRegime::Full,
    ];

    pub fn payoff_scheme(self) -> PayoffScheme {
        match self {
            CooperationRegime::Residual => PayoffScheme::Residual,
            CooperationRegime::Partial | CooperationRegime::Full => PayoffScheme::Cooperative,
        }
    }
}

impl fmt::Display for CooperationRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CooperationRegime::Residual => write!(f, "residual"),
            CooperationRegime::Partial => write!(f, "partial"),
            CooperationRegime::Full => write!(f, "full"),
        }
    }
}

/// What one agent ends up with under a cooperation regime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentAllocation {
    pub agent: AgentId,
    pub payoff_no_cooperation: Decimal,
    pub revenue: Decimal,
    pub side_payments_paid: Decimal,
    pub side_payments_received: Decimal,
    /// Activation costs the agent carries in the pooled solution.
    pub edge_costs: Decimal,
    /// Payoff reported for the regime.
    pub total_payoff: Decimal,
}

impl AgentAllocation {
    pub fn gain(&self) -> Decimal {
        self.total_payoff - self.payoff_no_cooperation
    }
}

/// Result of a central-planner regime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooperationResult {
    regime: CooperationRegime,
    allocations: BTreeMap<AgentId, AgentAllocation>,
    ledger: SidePaymentLedger,
    active_edges: BTreeSet<EdgeKey>,
    served: usize,
    coalition_payoff: Decimal,
    solver_objective: f64,
}

impl CooperationResult {
    pub fn regime(&self) -> CooperationRegime {
        self.regime
    }

    pub fn allocations(&self) -> &BTreeMap<AgentId, AgentAllocation> {
        &self.allocations
    }

    pub fn allocation(&self, agent: AgentId) -> Option<&AgentAllocation> {
        self.allocations.get(&agent)
    }

    pub fn ledger(&self) -> &SidePaymentLedger {
        &self.ledger
    }

    /// Edges activated by the planner. Only the full regime activates edges.
    pub fn active_edges(&self) -> &BTreeSet<EdgeKey> {
        &self.active_edges
    }

    /// Number of commodities routed by the planner.
    pub fn served_count(&self) -> usize {
        self.served
    }

    pub fn coalition_payoff(&self) -> Decimal {
        self.coalition_payoff
    }

    pub fn solver_objective(&self) -> f64 {
        self.solver_objective
    }

    /// Verify the result is valid (side-payment ledger is balanced).
    pub fn is_valid(&self) -> bool {
        self.ledger.is_balanced()
    }
}

/// Central-planner problem over data pooled from several agents.
///
/// Every agent must already hold its standalone solution: the residual and
/// partial regimes read the served/active state it left behind, and the
/// participation rows read its `payoff_no_cooperation`.
#[derive(Debug, Clone)]
pub struct CooperationModel {
    regime: CooperationRegime,
    problem: MipProblem,
    flow: FlowModel,
    edges: BTreeMap<EdgeKey, Edge>,
    commodities: BTreeMap<CommodityKey, Commodity>,
    activations: BTreeMap<EdgeKey, VarId>,
}

impl CooperationModel {
    pub fn build(
        vertices: &BTreeSet<Vertex>,
        agents: &BTreeMap<AgentId, Agent>,
        regime: CooperationRegime,
    ) -> Result<Self, ModelError> {
        let mut problem = MipProblem::new(format!("{}-cooperation", regime));
        let (edges, commodities) = pooled_data(agents, regime);
        let universe: BTreeSet<EdgeKey> = edges.keys().copied().collect();
        let flow = FlowModel::build(&mut problem, vertices, &universe, commodities.values())?;

        let mut activations = BTreeMap::new();
        for (key, edge) in &edges {
            let load = flow.load(key);
            match regime {
                CooperationRegime::Residual => {
                    problem.add_constraint(load.leq(f64::from(edge.free_capacity())));
                }
                CooperationRegime::Partial => {
                    problem.add_constraint(load.leq(f64::from(edge.original_capacity())));
                }
                CooperationRegime::Full => {
                    let u = problem.add_binary(format!("u[{}]", key));
                    activations.insert(*key, u);
                    let row = load.with_term(u, -f64::from(edge.original_capacity()));
                    problem.add_constraint(row.leq(0.0));
                }
            }
        }

        let mut model = Self {
            regime,
            problem,
            flow,
            edges,
            commodities,
            activations,
        };

        for agent in agents.values() {
            let id = agent.id();
            let floor = match regime {
                CooperationRegime::Residual => continue,
                CooperationRegime::Partial => agent.served_revenue(),
                CooperationRegime::Full => agent.payoff_no_cooperation(),
            };
            let profit = model.pooled_profit(id);
            model.problem.add_constraint(profit.geq(coefficient(floor)));
        }

        let mut objective = model.flow.revenue();
        match regime {
            CooperationRegime::Residual | CooperationRegime::Partial => {
                for id in agents.keys() {
                    objective.add_scaled(&model.side_payments_paid(*id), -1.0);
                }
            }
            CooperationRegime::Full => {
                for (key, &u) in &model.activations {
                    objective.add_term(u, -coefficient(model.edges[key].cost()));
                }
            }
        }
        model.problem.maximize(objective);
        Ok(model)
    }

    /// `Σ_{e not owned by i} load_of(e, i) · cost_per_unit_e`.
    fn side_payments_paid(&self, agent: AgentId) -> LinearExpr {
        let mut expr = LinearExpr::new();
        for (key, edge) in self.edges.iter().filter(|(k, _)| k.owner != agent) {
            expr.add_scaled(&self.flow.load_of(key, agent), coefficient(edge.cost_per_unit()));
        }
        expr
    }

    fn side_payments_received(&self, agent: AgentId) -> LinearExpr {
        let mut expr = LinearExpr::new();
        for (key, edge) in self.edges.iter().filter(|(k, _)| k.owner == agent) {
            let mut foreign = self.flow.load(key);
            foreign.add_scaled(&self.flow.load_of(key, agent), -1.0);
            expr.add_scaled(&foreign, coefficient(edge.cost_per_unit()));
        }
        expr
    }

    fn pooled_profit(&self, agent: AgentId) -> LinearExpr {
        let mut profit = self.flow.revenue_of(agent);
        profit.add_scaled(&self.side_payments_paid(agent), -1.0);
        profit.add_scaled(&self.side_payments_received(agent), 1.0);
        for (key, &u) in self.activations.iter().filter(|(k, _)| k.owner == agent) {
            profit.add_term(u, -coefficient(self.edges[key].cost()));
        }
        profit
    }

    pub fn regime(&self) -> CooperationRegime {
        self.regime
    }

    pub fn problem(&self) -> &MipProblem {
        &self.problem
    }

    pub fn set_time_limit(&mut self, limit: Duration) {
        self.problem.set_time_limit(limit);
    }

    /// Split the pooled solution between the agents and record their
    /// cooperative payoffs.
    pub fn apply(
        &self,
        solution: &MipSolution,
        agents: &mut BTreeMap<AgentId, Agent>,
    ) -> Result<CooperationResult, ModelError> {
        let routes = self.flow.routes(solution);
        let active_edges: BTreeSet<EdgeKey> = self
            .activations
            .iter()
            .filter(|(_, &u)| solution.is_set(u))
            .map(|(key, _)| *key)
            .collect();

        let mut ledger = SidePaymentLedger::new();
        let mut revenue: BTreeMap<AgentId, Decimal> = BTreeMap::new();
        for (key, route) in &routes {
            let commodity = self
                .commodities
                .get(key)
                .ok_or(ModelError::UnknownCommodity { commodity: *key })?;
            *revenue.entry(key.owner).or_insert(Decimal::ZERO) += commodity.gross_revenue();
            for edge_key in route.iter().filter(|e| e.owner != key.owner) {
                let edge = self
                    .edges
                    .get(edge_key)
                    .ok_or(ModelError::UnknownEdge { edge: *edge_key })?;
                let amount = Decimal::from(commodity.units()) * edge.cost_per_unit();
                ledger.transfer(key.owner, edge_key.owner, *edge_key, amount);
            }
        }

        let mut allocations = BTreeMap::new();
        for (id, agent) in agents.iter_mut() {
            let edge_costs: Decimal = active_edges
                .iter()
                .filter(|e| e.owner == *id)
                .map(|e| self.edges.get(e).map(Edge::cost).unwrap_or(Decimal::ZERO))
                .sum();
            let earned = revenue.get(id).copied().unwrap_or(Decimal::ZERO);
            let pooled = earned + ledger.position(*id) - edge_costs;
            let cooperative = match self.regime {
                CooperationRegime::Partial => pooled - agent.active_edge_costs(),
                CooperationRegime::Residual | CooperationRegime::Full => pooled,
            };
            agent.set_payoff_cooperation(cooperative);

            allocations.insert(
                *id,
                AgentAllocation {
                    agent: *id,
                    payoff_no_cooperation: agent.payoff_no_cooperation(),
                    revenue: earned,
                    side_payments_paid: ledger.paid_by(*id),
                    side_payments_received: ledger.received_by(*id),
                    edge_costs,
                    total_payoff: agent.total_payoff(self.regime.payoff_scheme()),
                },
            );
        }

        let coalition_payoff = allocations.values().map(|a| a.total_payoff).sum();
        Ok(CooperationResult {
            regime: self.regime,
            allocations,
            ledger,
            active_edges,
            served: routes.len(),
            coalition_payoff,
            solver_objective: solution.objective(),
        })
    }
}

fn pooled_data(
    agents: &BTreeMap<AgentId, Agent>,
    regime: CooperationRegime,
) -> (BTreeMap<EdgeKey, Edge>, BTreeMap<CommodityKey, Commodity>) {
    let mut edges = BTreeMap::new();
    let mut commodities = BTreeMap::new();
    for agent in agents.values() {
        let edge_keys: Box<dyn Iterator<Item = &EdgeKey>> = match regime {
            CooperationRegime::Residual => Box::new(agent.edges_with_capacity().iter()),
            CooperationRegime::Partial => Box::new(agent.active_edges().iter()),
            CooperationRegime::Full => Box::new(agent.edges().keys()),
        };
        for key in edge_keys {
            if let Some(edge) = agent.edge(key) {
                edges.insert(*key, edge.clone());
            }
        }
        for (key, commodity) in agent.commodities() {
            if regime != CooperationRegime::Residual || agent.unserved().contains(key) {
                commodities.insert(*key, commodity.clone());
            }
        }
    }
    (edges, commodities)
}

/// Pool agents that already solved alone and solve the planner problem.
pub fn cooperate<S: MipSolver>(
    solver: &S,
    vertices: &BTreeSet<Vertex>,
    agents: &mut BTreeMap<AgentId, Agent>,
    regime: CooperationRegime,
    time_limit: Option<Duration>,
) -> Result<CooperationResult, OptimizationError> {
    let mut model = CooperationModel::build(vertices, agents, regime)?;
    if let Some(limit) = time_limit {
        model.set_time_limit(limit);
    }
    let solution = solver.solve(model.problem())?;
    let result = model.apply(&solution, agents)?;
    log::info!(
        "{} cooperation: coalition payoff {} ({} commodities served, {} moved in side payments)",
        regime,
        result.coalition_payoff(),
        result.served_count(),
        result.ledger().total_transferred()
    );
    Ok(result)
}

/// Solve every agent alone, then pool them under `regime`.
pub fn solve_cooperation<S: MipSolver>(
    solver: &S,
    vertices: &BTreeSet<Vertex>,
    agents: &mut BTreeMap<AgentId, Agent>,
    regime: CooperationRegime,
    time_limit: Option<Duration>,
) -> Result<CooperationResult, OptimizationError> {
    for agent in agents.values_mut() {
        solve_single_agent(solver, vertices, agent, time_limit)?;
    }
    cooperate(solver, vertices, agents, regime, time_limit)
}
