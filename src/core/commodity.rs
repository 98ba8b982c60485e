use crate::core::agent::AgentId;
use crate::core::edge::{EdgeKey, Vertex};
use crate::core::error::ModelError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Identity of a commodity: `(origin, terminal, owner)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommodityKey {
    pub origin: Vertex,
    pub terminal: Vertex,
    pub owner: AgentId,
}

impl CommodityKey {
    pub fn new(origin: u32, terminal: u32, owner: u32) -> Self {
        Self {
            origin: Vertex::new(origin),
            terminal: Vertex::new(terminal),
            owner: AgentId::new(owner),
        }
    }
}

impl fmt::Display for CommodityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}->{},{}]", self.origin, self.terminal, self.owner)
    }
}

/// A point-to-point shipment demand owned by one agent.
///
/// Serving the commodity earns `units × revenue` once it reaches its
/// terminal. The route is an unordered edge set; use
/// [`crate::graph::route::order_route`] to recover traversal order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commodity {
    key: CommodityKey,
    units: u32,
    revenue: Decimal,
    route: Option<BTreeSet<EdgeKey>>,
}

impl Commodity {
    pub fn new(key: CommodityKey, units: u32, revenue: Decimal) -> Result<Self, ModelError> {
        if key.origin == key.terminal {
            return Err(ModelError::DegenerateCommodity { commodity: key });
        }
        if revenue < Decimal::ZERO {
            return Err(ModelError::NegativeRevenue {
                commodity: key,
                revenue,
            });
        }
        Ok(Self {
            key,
            units,
            revenue,
            route: None,
        })
    }

    // --- Accessors ---

    pub fn key(&self) -> CommodityKey {
        self.key
    }

    pub fn origin(&self) -> Vertex {
        self.key.origin
    }

    pub fn terminal(&self) -> Vertex {
        self.key.terminal
    }

    pub fn owner(&self) -> AgentId {
        self.key.owner
    }

    pub fn units(&self) -> u32 {
        self.units
    }

    /// Revenue per unit delivered.
    pub fn revenue(&self) -> Decimal {
        self.revenue
    }

    /// Revenue of delivering every unit.
    pub fn gross_revenue(&self) -> Decimal {
        Decimal::from(self.units) * self.revenue
    }

    pub fn route(&self) -> Option<&BTreeSet<EdgeKey>> {
        self.route.as_ref()
    }

    pub fn is_served(&self) -> bool {
        self.route.is_some()
    }

    /// Zero-unit commodities never enter a formulation.
    pub fn has_demand(&self) -> bool {
        self.units > 0
    }

    pub fn set_route(&mut self, route: BTreeSet<EdgeKey>) {
        self.route = Some(route);
    }

    pub fn clear_route(&mut self) {
        self.route = None;
    }
}
