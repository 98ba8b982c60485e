use crate::core::agent::{Agent, AgentId};
use crate::core::commodity::CommodityKey;
use crate::core::edge::{Edge, EdgeKey, Vertex};
use crate::core::error::ModelError;
use crate::core::platform::{EdgeUsageCondition, InformationPlatform};
use crate::core::solution::Solution;
use crate::graph::route::is_valid_route;
use crate::optimization::flow_model::{coefficient, FlowModel};
use crate::solver::{LinearExpr, MipProblem, MipSolution, VarId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Result of one negotiation turn of one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterativeOutcome {
    pub agent: AgentId,
    pub payoff: Decimal,
    pub revenue: Decimal,
    pub edge_costs: Decimal,
    /// Paid to the rival for borrowed capacity.
    pub out_payments: Decimal,
    /// Received from the rival for keeping its demanded capacity free.
    pub in_payments: Decimal,
    /// Own edges on which the agent keeps room for the rival.
    pub committed_edges: BTreeSet<EdgeKey>,
    pub solver_objective: f64,
    snapshot: Solution,
}

impl IterativeOutcome {
    /// The round snapshot recorded in the agent's history.
    pub fn snapshot(&self) -> &Solution {
        &self.snapshot
    }

    pub fn into_snapshot(self) -> Solution {
        self.snapshot
    }
}

/// The best-response problem of `agent` against the published state of
/// `rival`.
///
/// Flows may use the agent's own edges and the rival's shared edges. Borrowed
/// capacity is paid at the edge's cost per unit. For every own edge the rival
/// demanded, a binary `b[e]` commits the agent to leave that demand free, and
/// a rival condition pays out only when all of its edges are committed.
#[derive(Debug, Clone)]
pub struct IterativeModel {
    agent: AgentId,
    rival: AgentId,
    problem: MipProblem,
    flow: FlowModel,
    activations: BTreeMap<EdgeKey, VarId>,
    commitments: BTreeMap<EdgeKey, VarId>,
    borrowed: BTreeMap<EdgeKey, Edge>,
}

impl IterativeModel {
    pub fn build(
        vertices: &BTreeSet<Vertex>,
        agent: &Agent,
        platform: &InformationPlatform,
        rival: AgentId,
    ) -> Result<Self, ModelError> {
        let mut problem = MipProblem::new(format!("iterative-{}-vs-{}", agent.id(), rival));

        let borrowed: BTreeMap<EdgeKey, Edge> = platform
            .shared_edges(rival)
            .map(|e| (e.key(), e.clone()))
            .collect();
        let universe: BTreeSet<EdgeKey> = agent
            .edges()
            .keys()
            .chain(borrowed.keys())
            .copied()
            .collect();
        let flow = FlowModel::build(
            &mut problem,
            vertices,
            &universe,
            agent.commodities().values(),
        )?;

        let mut objective = flow.revenue();

        let mut activations = BTreeMap::new();
        for (key, edge) in agent.edges() {
            let u = problem.add_binary(format!("u[{}]", key));
            activations.insert(*key, u);
            let row = flow
                .load(key)
                .with_term(u, -f64::from(edge.original_capacity()));
            problem.add_constraint(row.leq(0.0));
            objective.add_term(u, -coefficient(edge.cost()));
        }

        for (key, edge) in &borrowed {
            let load = flow.load(key);
            objective.add_scaled(&load, -coefficient(edge.cost_per_unit()));
            problem.add_constraint(load.leq(f64::from(edge.free_capacity())));
        }

        let mut commitments = BTreeMap::new();
        for (key, units) in platform.demanded_edges(rival) {
            let edge = agent.edge(&key).ok_or(ModelError::UnknownEdge { edge: key })?;
            let b = problem.add_binary(format!("b[{}]", key));
            commitments.insert(key, b);
            let room = f64::from(edge.original_capacity()) - f64::from(units);
            problem.add_indicator(b, flow.load(&key).leq(room));
        }

        for (k, condition) in platform.conditions(rival).iter().enumerate() {
            let y = problem.add_binary(format!("y[{}]", k));
            for key in &condition.edges {
                let row = match commitments.get(key) {
                    Some(&b) => LinearExpr::new().with_term(y, 1.0).with_term(b, -1.0),
                    None => LinearExpr::new().with_term(y, 1.0),
                };
                problem.add_constraint(row.leq(0.0));
            }
            objective.add_term(y, coefficient(condition.price));
        }

        problem.maximize(objective);

        Ok(Self {
            agent: agent.id(),
            rival,
            problem,
            flow,
            activations,
            commitments,
            borrowed,
        })
    }

    pub fn problem(&self) -> &MipProblem {
        &self.problem
    }

    pub fn rival(&self) -> AgentId {
        self.rival
    }

    pub fn set_time_limit(&mut self, limit: Duration) {
        self.problem.set_time_limit(limit);
    }

    /// Write the decisions of `solution` into a restored `agent` and publish
    /// the agent's demands, conditions and shared edges on `platform`.
    pub fn apply(
        &self,
        solution: &MipSolution,
        agent: &mut Agent,
        platform: &mut InformationPlatform,
    ) -> Result<IterativeOutcome, ModelError> {
        let id = agent.id();
        if id != self.agent {
            return Err(ModelError::UnknownAgent { agent: id });
        }

        let active: BTreeSet<EdgeKey> = self
            .activations
            .iter()
            .filter(|(_, &u)| solution.is_set(u))
            .map(|(key, _)| *key)
            .collect();
        let committed: BTreeSet<EdgeKey> = self
            .commitments
            .iter()
            .filter(|(_, &b)| solution.is_set(b))
            .map(|(key, _)| *key)
            .collect();
        let routes = self.flow.routes(solution);

        let mut out_payments = Decimal::ZERO;
        for (key, route) in &routes {
            if !is_valid_route(key.origin, key.terminal, route) {
                log::warn!("agent {}: decoded route of {} is not a simple path", id, key);
            }
            let price = self.borrow(platform, id, key, route, agent)?;
            out_payments += price;
        }
        agent.apply_routing(active, routes)?;

        let in_payments: Decimal = platform
            .conditions(self.rival)
            .iter()
            .filter(|c| c.is_met_by(&committed))
            .map(|c| c.price)
            .sum();
        let revenue = agent.served_revenue();
        let edge_costs = agent.active_edge_costs();
        let payoff = revenue - edge_costs - out_payments + in_payments;

        platform.publish_shared(id, agent.share_edges());
        agent.set_payoff_cooperation(payoff);

        if (coefficient(payoff) - solution.objective()).abs() > 1e-6 {
            log::warn!(
                "agent {}: exact payoff {} differs from solver objective {:.6}",
                id,
                payoff,
                solution.objective()
            );
        }

        let snapshot = Solution::new(
            payoff,
            out_payments,
            in_payments,
            agent.served_routes(),
            agent.active_edges().clone(),
        );
        Ok(IterativeOutcome {
            agent: id,
            payoff,
            revenue,
            edge_costs,
            out_payments,
            in_payments,
            committed_edges: committed,
            solver_objective: solution.objective(),
            snapshot,
        })
    }

    /// Record the demand of one served commodity on borrowed edges and post
    /// the matching condition. Returns the price owed to the rival.
    fn borrow(
        &self,
        platform: &mut InformationPlatform,
        id: AgentId,
        commodity: &CommodityKey,
        route: &BTreeSet<EdgeKey>,
        agent: &Agent,
    ) -> Result<Decimal, ModelError> {
        let units = agent
            .commodity(commodity)
            .ok_or(ModelError::UnknownCommodity {
                commodity: *commodity,
            })?
            .units();
        let mut bundle = BTreeSet::new();
        let mut price = Decimal::ZERO;
        for key in route.iter().filter(|e| e.owner != id) {
            let edge = self
                .borrowed
                .get(key)
                .ok_or(ModelError::UnknownEdge { edge: *key })?;
            price += Decimal::from(units) * edge.cost_per_unit();
            platform.record_demand(id, *key, units);
            bundle.insert(*key);
        }
        if !bundle.is_empty() {
            platform.add_condition(id, EdgeUsageCondition::new(bundle, price));
        }
        Ok(price)
    }
}
