use crate::core::agent::AgentId;
use crate::core::commodity::CommodityKey;
use crate::core::edge::{EdgeKey, Vertex};
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors arising from invalid domain data or broken state invariants.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("edge {edge} must have positive capacity")]
    ZeroCapacity { edge: EdgeKey },
    #[error("edge {edge} has negative cost {cost}")]
    NegativeCost { edge: EdgeKey, cost: Decimal },
    #[error("edge {edge} is a self-loop")]
    SelfLoop { edge: EdgeKey },
    #[error("commodity {commodity} has negative revenue {revenue}")]
    NegativeRevenue {
        commodity: CommodityKey,
        revenue: Decimal,
    },
    #[error("commodity {commodity} starts and ends at the same vertex")]
    DegenerateCommodity { commodity: CommodityKey },
    #[error("{item} is keyed to agent {owner} but handed to agent {agent}")]
    OwnerMismatch {
        item: String,
        owner: AgentId,
        agent: AgentId,
    },
    #[error("duplicate {item}")]
    Duplicate { item: String },
    #[error("vertex {vertex} is not part of the instance")]
    UnknownVertex { vertex: Vertex },
    #[error("agent {agent} is not part of the instance")]
    UnknownAgent { agent: AgentId },
    #[error("edge {edge} is not owned by the agent")]
    UnknownEdge { edge: EdgeKey },
    #[error("commodity {commodity} is not owned by the agent")]
    UnknownCommodity { commodity: CommodityKey },
    #[error("edge {edge} has {available} free units, cannot route {requested}")]
    CapacityExceeded {
        edge: EdgeKey,
        requested: u32,
        available: u32,
    },
    #[error("subtour elimination over {count} vertices is not supported (max {max})")]
    TooManyVertices { count: usize, max: usize },
}
