use crate::core::agent::{Agent, AgentId};
use crate::core::commodity::{Commodity, CommodityKey};
use crate::core::edge::{Edge, EdgeKey, Vertex};
use crate::core::error::ModelError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstanceError {
    #[error("malformed instance file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid instance: {0}")]
    Model(#[from] ModelError),
}

/// Shipment demand of one agent, as read from an instance file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommoditySpec {
    pub origin: Vertex,
    pub terminal: Vertex,
    pub units: u32,
    pub revenue: Decimal,
}

/// Edge owned by one agent, as read from an instance file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub head: Vertex,
    pub tail: Vertex,
    pub cost: Decimal,
    pub capacity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentData {
    pub id: AgentId,
    #[serde(default)]
    pub commodities: Vec<CommoditySpec>,
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
}

impl AgentData {
    pub fn new(id: u32) -> Self {
        Self {
            id: AgentId::new(id),
            commodities: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn with_commodity(
        mut self,
        origin: u32,
        terminal: u32,
        units: u32,
        revenue: Decimal,
    ) -> Self {
        self.commodities.push(CommoditySpec {
            origin: Vertex::new(origin),
            terminal: Vertex::new(terminal),
            units,
            revenue,
        });
        self
    }

    pub fn with_edge(mut self, head: u32, tail: u32, cost: Decimal, capacity: u32) -> Self {
        self.edges.push(EdgeSpec {
            head: Vertex::new(head),
            tail: Vertex::new(tail),
            cost,
            capacity,
        });
        self
    }

    fn build(&self, vertices: &BTreeSet<Vertex>) -> Result<Agent, ModelError> {
        let check = |v: Vertex| {
            if vertices.contains(&v) {
                Ok(v)
            } else {
                Err(ModelError::UnknownVertex { vertex: v })
            }
        };
        let edges = self
            .edges
            .iter()
            .map(|spec| {
                let key = EdgeKey {
                    head: check(spec.head)?,
                    tail: check(spec.tail)?,
                    owner: self.id,
                };
                Edge::new(key, spec.cost, spec.capacity)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let commodities = self
            .commodities
            .iter()
            .map(|spec| {
                let key = CommodityKey {
                    origin: check(spec.origin)?,
                    terminal: check(spec.terminal)?,
                    owner: self.id,
                };
                Commodity::new(key, spec.units, spec.revenue)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Agent::new(self.id, edges, commodities)
    }
}

/// Static description of a game: the vertex set and every agent's data.
///
/// # Examples
///
/// ```
/// use coalition_flow::core::instance::{AgentData, Instance};
/// use rust_decimal_macros::dec;
///
/// let instance = Instance::new(0..4)
///     .with_agent(AgentData::new(0).with_edge(2, 3, dec!(3), 5).with_commodity(0, 1, 4, dec!(2)))
///     .with_agent(AgentData::new(1).with_edge(0, 1, dec!(3), 5).with_commodity(0, 1, 1, dec!(5)));
/// assert!(instance.validate().is_ok());
/// assert_eq!(instance.agent_ids().len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub vertices: BTreeSet<Vertex>,
    pub agents: Vec<AgentData>,
}

impl Instance {
    pub fn new(vertices: impl IntoIterator<Item = u32>) -> Self {
        Self {
            vertices: vertices.into_iter().map(Vertex::new).collect(),
            agents: Vec::new(),
        }
    }

    pub fn with_agent(mut self, agent: AgentData) -> Self {
        self.agents.push(agent);
        self
    }

    pub fn from_json(json: &str) -> Result<Self, InstanceError> {
        let instance: Instance = serde_json::from_str(json)?;
        instance.validate()?;
        Ok(instance)
    }

    pub fn to_json(&self) -> Result<String, InstanceError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn vertex_set(&self) -> &BTreeSet<Vertex> {
        &self.vertices
    }

    pub fn agent_ids(&self) -> Vec<AgentId> {
        self.agents.iter().map(|a| a.id).collect()
    }

    pub fn contains_agent(&self, agent: AgentId) -> bool {
        self.agents.iter().any(|a| a.id == agent)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        self.build_agents().map(|_| ())
    }

    /// Build fresh agents, all at full capacity with no routes.
    pub fn build_agents(&self) -> Result<BTreeMap<AgentId, Agent>, ModelError> {
        let mut agents = BTreeMap::new();
        for data in &self.agents {
            let agent = data.build(&self.vertices)?;
            if agents.insert(data.id, agent).is_some() {
                return Err(ModelError::Duplicate {
                    item: format!("agent {}", data.id),
                });
            }
        }
        Ok(agents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample() -> Instance {
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

    #[test]
    fn test_build_agents() {
        let agents = sample().build_agents().unwrap();
        let a = &agents[&AgentId::new(0)];
        assert_eq!(a.edges().len(), 1);
        assert!(a.edge(&EdgeKey::new(2, 3, 0)).is_some());
        assert!(a.commodity(&CommodityKey::new(0, 1, 0)).is_some());
    }

    #[test]
    fn test_unknown_vertex_rejected() {
        let instance =
            Instance::new(0..2).with_agent(AgentData::new(0).with_edge(0, 5, dec!(1), 1));
        assert_eq!(
            instance.validate(),
            Err(ModelError::UnknownVertex {
                vertex: Vertex::new(5)
            })
        );
    }

    #[test]
    fn test_duplicate_agent_rejected() {
        let instance = Instance::new(0..2)
            .with_agent(AgentData::new(0))
            .with_agent(AgentData::new(0));
        assert!(matches!(instance.validate(), Err(ModelError::Duplicate { .. })));
    }

    #[test]
    fn test_duplicate_edge_rejected() {
        let instance = Instance::new(0..2).with_agent(
            AgentData::new(0)
                .with_edge(0, 1, dec!(1), 1)
                .with_edge(0, 1, dec!(2), 3),
        );
        assert!(matches!(instance.validate(), Err(ModelError::Duplicate { .. })));
    }

    #[test]
    fn test_json_round_trip() {
        let json = sample().to_json().unwrap();
        let back = Instance::from_json(&json).unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn test_json_rejects_zero_capacity() {
        let json = r#"{"vertices":[0,1],"agents":[{"id":0,"edges":[
            {"head":0,"tail":1,"cost":"3","capacity":0}]}]}"#;
        assert!(matches!(
            Instance::from_json(json),
            Err(InstanceError::Model(ModelError::ZeroCapacity { .. }))
        ));
    }
}
