use crate::core::commodity::CommodityKey;
use crate::core::edge::EdgeKey;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Immutable snapshot of one agent's decision in one round.
///
/// Equality is exact on every field. Two snapshots taken from the same
/// binary decisions are always equal because payoffs are recomputed in
/// [`Decimal`] rather than read back from the solver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution {
    payoff: Decimal,
    out_payments: Decimal,
    in_payments: Decimal,
    #[serde(with = "routes_serde")]
    served: BTreeMap<CommodityKey, BTreeSet<EdgeKey>>,
    active_edges: BTreeSet<EdgeKey>,
}

mod routes_serde {
    use super::*;
    use crate::core::agent::AgentId;
    use crate::core::edge::Vertex;
    use serde::de::{self, MapAccess, Visitor};
    use serde::ser::SerializeMap;

    pub fn serialize<S: serde::Serializer>(
        served: &BTreeMap<CommodityKey, BTreeSet<EdgeKey>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(served.len()))?;
        for (key, route) in served {
            map.serialize_entry(
                &format!("{}:{}:{}", key.origin, key.terminal, key.owner),
                route,
            )?;
        }
        map.end()
    }

    fn parse_key(key: &str) -> Option<CommodityKey> {
        let mut parts = key.split(':').map(str::parse::<u32>);
        let origin = parts.next()?.ok()?;
        let terminal = parts.next()?.ok()?;
        let owner = parts.next()?.ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(CommodityKey {
            origin: Vertex::new(origin),
            terminal: Vertex::new(terminal),
            owner: AgentId::new(owner),
        })
    }

    pub fn deserialize<'de, D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<CommodityKey, BTreeSet<EdgeKey>>, D::Error> {
        struct V;
        impl<'de> Visitor<'de> for V {
            type Value = BTreeMap<CommodityKey, BTreeSet<EdgeKey>>;
            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a map with \"origin:terminal:owner\" keys")
            }
            fn visit_map<M: MapAccess<'de>>(self, mut access: M) -> Result<Self::Value, M::Error> {
                let mut map = BTreeMap::new();
                while let Some((key, route)) = access.next_entry::<String, BTreeSet<EdgeKey>>()? {
                    let parsed = parse_key(&key)
                        .ok_or_else(|| de::Error::custom(format!("invalid key: {key}")))?;
                    map.insert(parsed, route);
                }
                Ok(map)
            }
        }
        deserializer.deserialize_map(V)
    }
}

impl Solution {
    pub fn new(
        payoff: Decimal,
        out_payments: Decimal,
        in_payments: Decimal,
        served: BTreeMap<CommodityKey, BTreeSet<EdgeKey>>,
        active_edges: BTreeSet<EdgeKey>,
    ) -> Self {
        Self {
            payoff,
            out_payments,
            in_payments,
            served,
            active_edges,
        }
    }

    pub fn payoff(&self) -> Decimal {
        self.payoff
    }

    pub fn out_payments(&self) -> Decimal {
        self.out_payments
    }

    pub fn in_payments(&self) -> Decimal {
        self.in_payments
    }

    pub fn served(&self) -> &BTreeMap<CommodityKey, BTreeSet<EdgeKey>> {
        &self.served
    }

    pub fn active_edges(&self) -> &BTreeSet<EdgeKey> {
        &self.active_edges
    }
}

impl fmt::Display for Solution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "payoff {} (out {}, in {}), {} served, {} active edges",
            self.payoff,
            self.out_payments,
            self.in_payments,
            self.served.len(),
            self.active_edges.len()
        )
    }
}
