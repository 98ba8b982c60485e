use crate::core::commodity::{Commodity, CommodityKey};
use crate::core::edge::{Edge, EdgeKey};
use crate::core::error::ModelError;
use crate::core::solution::Solution;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Unique identifier for an agent (player) of the flow game.
///
/// # Examples
///
/// ```
/// use coalition_flow::core::agent::AgentId;
///
/// let a = AgentId::new(0);
/// let b = AgentId::new(1);
/// assert_ne!(a, b);
/// assert!(a < b);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(u32);

impl AgentId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for AgentId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// The payoff bookkeeping a cooperation regime reports for an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayoffScheme {
    /// Standalone payoff plus whatever the pooled residual stage adds.
    Residual,
    /// Only the payoff accumulated while cooperating.
    Cooperative,
}

/// A self-interested player owning edges and commodities.
///
/// Besides its static data the agent keeps the state derived from the last
/// solved problem (served/unserved commodities, active edges, edges with
/// spare capacity) and the history of its round snapshots.
#[derive(Debug, Clone)]
pub struct Agent {
    id: AgentId,
    edges: BTreeMap<EdgeKey, Edge>,
    commodities: BTreeMap<CommodityKey, Commodity>,
    served: BTreeSet<CommodityKey>,
    unserved: BTreeSet<CommodityKey>,
    active_edges: BTreeSet<EdgeKey>,
    edges_with_capacity: BTreeSet<EdgeKey>,
    payoff_no_cooperation: Decimal,
    payoff_cooperation: Decimal,
    history: Vec<Solution>,
}

impl Agent {
    /// Create an agent. Every edge and commodity must be keyed to `id`.
    pub fn new(
        id: AgentId,
        edges: impl IntoIterator<Item = Edge>,
        commodities: impl IntoIterator<Item = Commodity>,
    ) -> Result<Self, ModelError> {
        let mut agent = Self {
            id,
            edges: BTreeMap::new(),
            commodities: BTreeMap::new(),
            served: BTreeSet::new(),
            unserved: BTreeSet::new(),
            active_edges: BTreeSet::new(),
            edges_with_capacity: BTreeSet::new(),
            payoff_no_cooperation: Decimal::ZERO,
            payoff_cooperation: Decimal::ZERO,
            history: Vec::new(),
        };
        for edge in edges {
            if edge.owner() != id {
                return Err(ModelError::OwnerMismatch {
                    item: format!("edge {}", edge.key()),
                    owner: edge.owner(),
                    agent: id,
                });
            }
            if agent.edges.insert(edge.key(), edge.clone()).is_some() {
                return Err(ModelError::Duplicate {
                    item: format!("edge {}", edge.key()),
                });
            }
        }
        for commodity in commodities {
            if commodity.owner() != id {
                return Err(ModelError::OwnerMismatch {
                    item: format!("commodity {}", commodity.key()),
                    owner: commodity.owner(),
                    agent: id,
                });
            }
            if agent
                .commodities
                .insert(commodity.key(), commodity.clone())
                .is_some()
            {
                return Err(ModelError::Duplicate {
                    item: format!("commodity {}", commodity.key()),
                });
            }
        }
        Ok(agent)
    }

    // --- Accessors ---

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn edges(&self) -> &BTreeMap<EdgeKey, Edge> {
        &self.edges
    }

    pub fn edge(&self, key: &EdgeKey) -> Option<&Edge> {
        self.edges.get(key)
    }

    pub fn commodities(&self) -> &BTreeMap<CommodityKey, Commodity> {
        &self.commodities
    }

    pub fn commodity(&self, key: &CommodityKey) -> Option<&Commodity> {
        self.commodities.get(key)
    }

    pub fn served(&self) -> &BTreeSet<CommodityKey> {
        &self.served
    }

    pub fn unserved(&self) -> &BTreeSet<CommodityKey> {
        &self.unserved
    }

    pub fn active_edges(&self) -> &BTreeSet<EdgeKey> {
        &self.active_edges
    }

    pub fn edges_with_capacity(&self) -> &BTreeSet<EdgeKey> {
        &self.edges_with_capacity
    }

    pub fn payoff_no_cooperation(&self) -> Decimal {
        self.payoff_no_cooperation
    }

    pub fn payoff_cooperation(&self) -> Decimal {
        self.payoff_cooperation
    }

    pub fn history(&self) -> &[Solution] {
        &self.history
    }

    pub fn latest_solution(&self) -> Option<&Solution> {
        self.history.last()
    }

    /// Total activation cost of the currently active edges.
    pub fn active_edge_costs(&self) -> Decimal {
        self.active_edges
            .iter()
            .filter_map(|key| self.edges.get(key))
            .map(Edge::cost)
            .sum()
    }

    /// Revenue of every served commodity.
    pub fn served_revenue(&self) -> Decimal {
        self.served
            .iter()
            .filter_map(|key| self.commodities.get(key))
            .map(Commodity::gross_revenue)
            .sum()
    }

    /// Units still free over all owned edges.
    pub fn total_free_capacity(&self) -> u32 {
        self.edges.values().map(Edge::free_capacity).sum()
    }

    /// Copies of the active edges that still have free capacity.
    pub fn share_edges(&self) -> BTreeMap<EdgeKey, Edge> {
        self.edges_with_capacity
            .iter()
            .filter_map(|key| self.edges.get(key).map(|e| (*key, e.clone())))
            .collect()
    }

    pub fn total_payoff(&self, scheme: PayoffScheme) -> Decimal {
        match scheme {
            PayoffScheme::Residual => self.payoff_no_cooperation + self.payoff_cooperation,
            PayoffScheme::Cooperative => self.payoff_cooperation,
        }
    }

    // --- State updates ---

    /// Reset every edge to full capacity and forget active/shared sets.
    pub fn restore_edges(&mut self) {
        for edge in self.edges.values_mut() {
            edge.restore();
        }
        self.active_edges.clear();
        self.edges_with_capacity.clear();
    }

    /// Forget every route and the served/unserved sets.
    pub fn restore_commodities(&mut self) {
        for commodity in self.commodities.values_mut() {
            commodity.clear_route();
        }
        self.served.clear();
        self.unserved.clear();
    }

    pub fn set_payoff_no_cooperation(&mut self, payoff: Decimal) {
        self.payoff_no_cooperation = payoff;
    }

    pub fn set_payoff_cooperation(&mut self, payoff: Decimal) {
        self.payoff_cooperation = payoff;
    }

    /// Apply decoded decisions: activate edges, route served commodities
    /// and consume capacity on the agent's own edges.
    ///
    /// Route edges owned by other agents are kept in the route but consume
    /// nothing here. The unserved and spare-capacity sets are derived last.
    pub(crate) fn apply_routing(
        &mut self,
        active_edges: BTreeSet<EdgeKey>,
        routes: BTreeMap<CommodityKey, BTreeSet<EdgeKey>>,
    ) -> Result<(), ModelError> {
        for key in &active_edges {
            if !self.edges.contains_key(key) {
                return Err(ModelError::UnknownEdge { edge: *key });
            }
        }
        self.active_edges = active_edges;

        for (key, route) in routes {
            let commodity = self
                .commodities
                .get_mut(&key)
                .ok_or(ModelError::UnknownCommodity { commodity: key })?;
            let units = commodity.units();
            for edge_key in route.iter().filter(|e| e.owner == self.id) {
                self.edges
                    .get_mut(edge_key)
                    .ok_or(ModelError::UnknownEdge { edge: *edge_key })?
                    .consume(units)?;
            }
            commodity.set_route(route);
            self.served.insert(key);
        }

        self.unserved = self
            .commodities
            .values()
            .filter(|c| c.has_demand() && !self.served.contains(&c.key()))
            .map(Commodity::key)
            .collect();
        self.edges_with_capacity = self
            .active_edges
            .iter()
            .filter(|key| self.edges.get(key).is_some_and(Edge::has_spare_capacity))
            .copied()
            .collect();
        Ok(())
    }

    /// Served commodities with their routes.
    pub fn served_routes(&self) -> BTreeMap<CommodityKey, BTreeSet<EdgeKey>> {
        self.served
            .iter()
            .filter_map(|key| {
                self.commodities
                    .get(key)
                    .and_then(|c| c.route().map(|r| (*key, r.clone())))
            })
            .collect()
    }

    pub fn record_solution(&mut self, solution: Solution) {
        self.history.push(solution);
    }

    /// True when the two most recent snapshots are identical.
    pub fn is_stable(&self) -> bool {
        match self.history.as_slice() {
            [.., previous, latest] => previous == latest,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_agent() -> Agent {
        let id = AgentId::new(0);
        Agent::new(
            id,
            vec![
                Edge::new(EdgeKey::new(0, 1, 0), dec!(3), 5).unwrap(),
                Edge::new(EdgeKey::new(1, 2, 0), dec!(4), 2).unwrap(),
            ],
            vec![
                Commodity::new(CommodityKey::new(0, 2, 0), 2, dec!(5)).unwrap(),
                Commodity::new(CommodityKey::new(2, 0, 0), 3, dec!(1)).unwrap(),
                Commodity::new(CommodityKey::new(1, 0, 0), 0, dec!(1)).unwrap(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_agent_id_ordering() {
        assert!(AgentId::new(0) < AgentId::new(1));
        assert_eq!(format!("{}", AgentId::new(7)), "7");
    }

    #[test]
    fn test_owner_mismatch_rejected() {
        let result = Agent::new(
            AgentId::new(1),
            vec![Edge::new(EdgeKey::new(0, 1, 0), dec!(3), 5).unwrap()],
            Vec::new(),
        );
        assert!(matches!(result, Err(ModelError::OwnerMismatch { .. })));
    }

    #[test]
    fn test_apply_routing_derives_sets() {
        let mut agent = sample_agent();
        let route: BTreeSet<_> = [EdgeKey::new(0, 1, 0), EdgeKey::new(1, 2, 0)].into();
        let active: BTreeSet<_> = route.clone();
        agent
            .apply_routing(active, [(CommodityKey::new(0, 2, 0), route)].into())
            .unwrap();

        assert_eq!(agent.edge(&EdgeKey::new(0, 1, 0)).unwrap().free_capacity(), 3);
        assert_eq!(agent.edge(&EdgeKey::new(1, 2, 0)).unwrap().free_capacity(), 0);
        // only the non-saturated edge is shared
        assert_eq!(
            agent.edges_with_capacity().iter().copied().collect::<Vec<_>>(),
            vec![EdgeKey::new(0, 1, 0)]
        );
        // zero-unit commodity is neither served nor unserved
        assert_eq!(
            agent.unserved().iter().copied().collect::<Vec<_>>(),
            vec![CommodityKey::new(2, 0, 0)]
        );
        assert_eq!(agent.active_edge_costs(), dec!(7));
        assert_eq!(agent.share_edges().len(), 1);
    }

    #[test]
    fn test_restore_resets_state() {
        let mut agent = sample_agent();
        let route: BTreeSet<_> = [EdgeKey::new(0, 1, 0), EdgeKey::new(1, 2, 0)].into();
        agent
            .apply_routing(route.clone(), [(CommodityKey::new(0, 2, 0), route)].into())
            .unwrap();

        agent.restore_commodities();
        agent.restore_edges();

        assert!(agent.served().is_empty());
        assert!(agent.unserved().is_empty());
        assert!(agent.active_edges().is_empty());
        assert!(agent.edges_with_capacity().is_empty());
        assert!(agent.commodities().values().all(|c| c.route().is_none()));
        assert!(agent
            .edges()
            .values()
            .all(|e| e.free_capacity() == e.original_capacity()));
    }

    #[test]
    fn test_over_capacity_route_rejected() {
        let mut agent = sample_agent();
        // 3 units through an edge of capacity 2
        let route: BTreeSet<_> = [EdgeKey::new(1, 2, 0)].into();
        let result =
            agent.apply_routing(route.clone(), [(CommodityKey::new(2, 0, 0), route)].into());
        assert!(matches!(result, Err(ModelError::CapacityExceeded { .. })));
    }

    #[test]
    fn test_payoff_schemes() {
        let mut agent = sample_agent();
        agent.set_payoff_no_cooperation(dec!(4));
        agent.set_payoff_cooperation(dec!(1.5));
        assert_eq!(agent.total_payoff(PayoffScheme::Residual), dec!(5.5));
        assert_eq!(agent.total_payoff(PayoffScheme::Cooperative), dec!(1.5));
    }
}
