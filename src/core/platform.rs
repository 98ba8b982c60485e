use crate::core::agent::AgentId;
use crate::core::edge::{Edge, EdgeKey};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A rival's offer: pay `price` if every edge in `edges` keeps room for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeUsageCondition {
    pub edges: BTreeSet<EdgeKey>,
    pub price: Decimal,
}

impl EdgeUsageCondition {
    pub fn new(edges: BTreeSet<EdgeKey>, price: Decimal) -> Self {
        Self { edges, price }
    }

    /// True when every edge of the bundle is in `committed`.
    pub fn is_met_by(&self, committed: &BTreeSet<EdgeKey>) -> bool {
        self.edges.is_subset(committed)
    }
}

/// Per-session blackboard through which the two negotiating agents exchange
/// information.
///
/// For every agent it holds the edges it shares (with the free capacity at
/// publication), the rival edges it demanded and how many units went through
/// each, and the conditions it posted. An agent's entries are wiped by
/// [`InformationPlatform::restore`] right before its problem is rebuilt.
#[derive(Debug, Clone, Default)]
pub struct InformationPlatform {
    shared_edges: BTreeMap<AgentId, BTreeMap<EdgeKey, Edge>>,
    demanded_edges: BTreeMap<AgentId, BTreeMap<EdgeKey, u32>>,
    conditions: BTreeMap<AgentId, Vec<EdgeUsageCondition>>,
}

impl InformationPlatform {
    pub fn new(agents: impl IntoIterator<Item = AgentId>) -> Self {
        let mut platform = Self::default();
        for agent in agents {
            platform.shared_edges.insert(agent, BTreeMap::new());
            platform.demanded_edges.insert(agent, BTreeMap::new());
            platform.conditions.insert(agent, Vec::new());
        }
        platform
    }

    /// Clear everything `agent` published.
    pub fn restore(&mut self, agent: AgentId) {
        self.shared_edges.insert(agent, BTreeMap::new());
        self.demanded_edges.insert(agent, BTreeMap::new());
        self.conditions.insert(agent, Vec::new());
    }

    pub fn publish_shared(&mut self, agent: AgentId, edges: BTreeMap<EdgeKey, Edge>) {
        self.shared_edges.insert(agent, edges);
    }

    /// Add `units` to the tally of `agent` on the rival edge `edge`.
    pub fn record_demand(&mut self, agent: AgentId, edge: EdgeKey, units: u32) {
        *self
            .demanded_edges
            .entry(agent)
            .or_default()
            .entry(edge)
            .or_insert(0) += units;
    }

    pub fn add_condition(&mut self, agent: AgentId, condition: EdgeUsageCondition) {
        self.conditions.entry(agent).or_default().push(condition);
    }

    pub fn shared_edges(&self, agent: AgentId) -> impl Iterator<Item = &Edge> {
        self.shared_edges
            .get(&agent)
            .into_iter()
            .flat_map(BTreeMap::values)
    }

    pub fn shared_edge(&self, agent: AgentId, key: &EdgeKey) -> Option<&Edge> {
        self.shared_edges.get(&agent).and_then(|m| m.get(key))
    }

    /// Rival edges `agent` routed through in its last turn, with units.
    pub fn demanded_edges(&self, agent: AgentId) -> impl Iterator<Item = (EdgeKey, u32)> + '_ {
        self.demanded_edges
            .get(&agent)
            .into_iter()
            .flat_map(|m| m.iter().map(|(k, &v)| (*k, v)))
    }

    pub fn conditions(&self, agent: AgentId) -> &[EdgeUsageCondition] {
        self.conditions
            .get(&agent)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
