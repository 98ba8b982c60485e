use crate::core::agent::AgentId;
use crate::core::error::ModelError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A vertex of the shared network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vertex(u32);

impl Vertex {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Vertex {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Identity of an edge: `(head, tail, owner)`.
///
/// Flow leaves `head` and enters `tail`. The owner is part of the key, so two
/// agents may both own an edge between the same pair of vertices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKey {
    pub head: Vertex,
    pub tail: Vertex,
    pub owner: AgentId,
}

impl EdgeKey {
    pub fn new(head: u32, tail: u32, owner: u32) -> Self {
        Self {
            head: Vertex(head),
            tail: Vertex(tail),
            owner: AgentId::new(owner),
        }
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.head, self.tail, self.owner)
    }
}

/// A directed edge with a fixed activation cost and an integral capacity.
///
/// `free_capacity` is the only mutable field. It always stays within
/// `[0, original_capacity]`: [`Edge::consume`] refuses to go below zero and
/// [`Edge::restore`] resets it to the original capacity.
///
/// # Examples
///
/// ```
/// use coalition_flow::core::edge::{Edge, EdgeKey};
/// use rust_decimal_macros::dec;
///
/// let mut edge = Edge::new(EdgeKey::new(0, 1, 1), dec!(3), 5).unwrap();
/// assert_eq!(edge.cost_per_unit(), dec!(0.6));
///
/// edge.consume(4).unwrap();
/// assert_eq!(edge.free_capacity(), 1);
/// assert!(edge.consume(2).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    key: EdgeKey,
    cost: Decimal,
    original_capacity: u32,
    free_capacity: u32,
}

impl Edge {
    pub fn new(key: EdgeKey, cost: Decimal, capacity: u32) -> Result<Self, ModelError> {
        if key.head == key.tail {
            return Err(ModelError::SelfLoop { edge: key });
        }
        if capacity == 0 {
            return Err(ModelError::ZeroCapacity { edge: key });
        }
        if cost < Decimal::ZERO {
            return Err(ModelError::NegativeCost { edge: key, cost });
        }
        Ok(Self {
            key,
            cost,
            original_capacity: capacity,
            free_capacity: capacity,
        })
    }

    // --- Accessors ---

    pub fn key(&self) -> EdgeKey {
        self.key
    }

    pub fn head(&self) -> Vertex {
        self.key.head
    }

    pub fn tail(&self) -> Vertex {
        self.key.tail
    }

    pub fn owner(&self) -> AgentId {
        self.key.owner
    }

    pub fn cost(&self) -> Decimal {
        self.cost
    }

    pub fn original_capacity(&self) -> u32 {
        self.original_capacity
    }

    pub fn free_capacity(&self) -> u32 {
        self.free_capacity
    }

    /// Activation cost spread over the full capacity.
    pub fn cost_per_unit(&self) -> Decimal {
        self.cost / Decimal::from(self.original_capacity)
    }

    pub fn used_capacity(&self) -> u32 {
        self.original_capacity - self.free_capacity
    }

    pub fn has_spare_capacity(&self) -> bool {
        self.free_capacity > 0
    }

    /// Route `units` through this edge.
    pub fn consume(&mut self, units: u32) -> Result<(), ModelError> {
        if units > self.free_capacity {
            return Err(ModelError::CapacityExceeded {
                edge: self.key,
                requested: units,
                available: self.free_capacity,
            });
        }
        self.free_capacity -= units;
        Ok(())
    }

    pub fn restore(&mut self) {
        self.free_capacity = self.original_capacity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_cost_per_unit() {
        let edge = Edge::new(EdgeKey::new(0, 1, 0), dec!(3), 5).unwrap();
        assert_eq!(edge.cost_per_unit(), dec!(0.6));
    }

    #[test]
    fn test_consume_and_restore() {
        let mut edge = Edge::new(EdgeKey::new(0, 1, 0), dec!(3), 5).unwrap();
        edge.consume(5).unwrap();
        assert_eq!(edge.free_capacity(), 0);
        assert!(!edge.has_spare_capacity());
        assert_eq!(edge.used_capacity(), 5);

        let err = edge.consume(1).unwrap_err();
        assert_eq!(
            err,
            ModelError::CapacityExceeded {
                edge: EdgeKey::new(0, 1, 0),
                requested: 1,
                available: 0,
            }
        );

        edge.restore();
        assert_eq!(edge.free_capacity(), 5);
    }

    #[test]
    fn test_invalid_edges() {
        assert!(matches!(
            Edge::new(EdgeKey::new(0, 1, 0), dec!(3), 0),
            Err(ModelError::ZeroCapacity { .. })
        ));
        assert!(matches!(
            Edge::new(EdgeKey::new(2, 2, 0), dec!(3), 4),
            Err(ModelError::SelfLoop { .. })
        ));
        assert!(matches!(
            Edge::new(EdgeKey::new(0, 1, 0), dec!(-1), 4),
            Err(ModelError::NegativeCost { .. })
        ));
    }

    #[test]
    fn test_key_ordering_and_display() {
        let a = EdgeKey::new(0, 1, 0);
        let b = EdgeKey::new(0, 1, 1);
        assert!(a < b);
        assert_ne!(a, b);
        assert_eq!(format!("{}", b), "(0,1,1)");
    }
}
