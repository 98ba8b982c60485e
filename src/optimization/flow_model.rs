use crate::core::agent::AgentId;
use crate::core::commodity::{Commodity, CommodityKey};
use crate::core::edge::{EdgeKey, Vertex};
use crate::core::error::ModelError;
use crate::graph::subtour::subtour_cuts;
use crate::solver::{LinearExpr, MipProblem, MipSolution, VarId};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};

/// Convert a monetary amount into a solver coefficient.
pub(crate) fn coefficient(amount: Decimal) -> f64 {
    amount.to_f64().unwrap_or(0.0)
}

#[derive(Debug, Clone, Copy)]
struct CommodityTerms {
    units: u32,
    revenue: Decimal,
}

/// Routing variables and structural rows shared by every formulation.
///
/// One binary `f[e,c]` is declared per (edge, commodity) pair over the given
/// edge universe. The rows added are transit-vertex flow conservation, at
/// most one unit of flow leaving the origin, no flow leaving the terminal and
/// subtour elimination. Capacity rows differ per formulation and are left
/// to the caller, which builds them from [`FlowModel::load`].
#[derive(Debug, Clone)]
pub struct FlowModel {
    edges: BTreeSet<EdgeKey>,
    commodities: BTreeMap<CommodityKey, CommodityTerms>,
    flows: BTreeMap<(EdgeKey, CommodityKey), VarId>,
}

impl FlowModel {
    /// Declare the routing of `commodities` over `edges` on `problem`.
    ///
    /// Commodities without demand are left out.
    pub fn build<'a>(
        problem: &mut MipProblem,
        vertices: &BTreeSet<Vertex>,
        edges: &BTreeSet<EdgeKey>,
        commodities: impl IntoIterator<Item = &'a Commodity>,
    ) -> Result<Self, ModelError> {
        for edge in edges {
            for v in [edge.head, edge.tail] {
                if !vertices.contains(&v) {
                    return Err(ModelError::UnknownVertex { vertex: v });
                }
            }
        }
        let mut terms = BTreeMap::new();
        for commodity in commodities.into_iter().filter(|c| c.has_demand()) {
            for v in [commodity.origin(), commodity.terminal()] {
                if !vertices.contains(&v) {
                    return Err(ModelError::UnknownVertex { vertex: v });
                }
            }
            terms.insert(
                commodity.key(),
                CommodityTerms {
                    units: commodity.units(),
                    revenue: commodity.revenue(),
                },
            );
        }

        let mut flows = BTreeMap::new();
        for edge in edges {
            for key in terms.keys() {
                let var = problem.add_binary(format!("f[{}|{}]", edge, key));
                flows.insert((*edge, *key), var);
            }
        }

        let model = Self {
            edges: edges.clone(),
            commodities: terms,
            flows,
        };
        model.add_structural_rows(problem, vertices)?;
        Ok(model)
    }

    fn add_structural_rows(
        &self,
        problem: &mut MipProblem,
        vertices: &BTreeSet<Vertex>,
    ) -> Result<(), ModelError> {
        let cuts = subtour_cuts(&self.edges)?;

        for key in self.commodities.keys() {
            for &v in vertices {
                if v == key.origin || v == key.terminal {
                    continue;
                }
                let mut balance = LinearExpr::new();
                for edge in &self.edges {
                    let var = self.flows[&(*edge, *key)];
                    if edge.tail == v {
                        balance.add_term(var, 1.0);
                    }
                    if edge.head == v {
                        balance.add_term(var, -1.0);
                    }
                }
                if !balance.is_constant() {
                    problem.add_constraint(balance.equals(0.0));
                }
            }

            let leaving_origin = self.leaving(key.origin, key);
            if !leaving_origin.is_constant() {
                problem.add_constraint(leaving_origin.leq(1.0));
            }
            let leaving_terminal = self.leaving(key.terminal, key);
            if !leaving_terminal.is_constant() {
                problem.add_constraint(leaving_terminal.equals(0.0));
            }

            for cut in &cuts {
                let mut inside = LinearExpr::new();
                for edge in &cut.edges {
                    inside.add_term(self.flows[&(*edge, *key)], 1.0);
                }
                problem.add_constraint(inside.leq(cut.max_internal_edges() as f64));
            }
        }
        Ok(())
    }

    fn leaving(&self, vertex: Vertex, commodity: &CommodityKey) -> LinearExpr {
        let mut expr = LinearExpr::new();
        for edge in self.edges.iter().filter(|e| e.head == vertex) {
            expr.add_term(self.flows[&(*edge, *commodity)], 1.0);
        }
        expr
    }

    pub fn edges(&self) -> &BTreeSet<EdgeKey> {
        &self.edges
    }

    pub fn commodity_keys(&self) -> impl Iterator<Item = &CommodityKey> {
        self.commodities.keys()
    }

    pub fn flow(&self, edge: &EdgeKey, commodity: &CommodityKey) -> Option<VarId> {
        self.flows.get(&(*edge, *commodity)).copied()
    }

    /// Units routed through `edge`: `Σ_c units_c · f[e,c]`.
    pub fn load(&self, edge: &EdgeKey) -> LinearExpr {
        let mut expr = LinearExpr::new();
        for (key, terms) in &self.commodities {
            if let Some(var) = self.flow(edge, key) {
                expr.add_term(var, f64::from(terms.units));
            }
        }
        expr
    }

    /// Units of commodities owned by `owner` routed through `edge`.
    pub fn load_of(&self, edge: &EdgeKey, owner: AgentId) -> LinearExpr {
        let mut expr = LinearExpr::new();
        for (key, terms) in self.commodities.iter().filter(|(k, _)| k.owner == owner) {
            if let Some(var) = self.flow(edge, key) {
                expr.add_term(var, f64::from(terms.units));
            }
        }
        expr
    }

    /// Revenue of one commodity: `units · revenue` times its flow into the terminal.
    pub fn commodity_revenue(&self, key: &CommodityKey) -> LinearExpr {
        let mut expr = LinearExpr::new();
        let Some(terms) = self.commodities.get(key) else {
            return expr;
        };
        let gross = coefficient(Decimal::from(terms.units) * terms.revenue);
        for edge in self.edges.iter().filter(|e| e.tail == key.terminal) {
            expr.add_term(self.flows[&(*edge, *key)], gross);
        }
        expr
    }

    pub fn revenue(&self) -> LinearExpr {
        let mut expr = LinearExpr::new();
        for key in self.commodities.keys() {
            expr.add_scaled(&self.commodity_revenue(key), 1.0);
        }
        expr
    }

    pub fn revenue_of(&self, owner: AgentId) -> LinearExpr {
        let mut expr = LinearExpr::new();
        for key in self.commodities.keys().filter(|k| k.owner == owner) {
            expr.add_scaled(&self.commodity_revenue(key), 1.0);
        }
        expr
    }

    /// Routes of every commodity with at least one flow variable set.
    pub fn routes(&self, solution: &MipSolution) -> BTreeMap<CommodityKey, BTreeSet<EdgeKey>> {
        let mut routes: BTreeMap<CommodityKey, BTreeSet<EdgeKey>> = BTreeMap::new();
        for (&(edge, key), &var) in &self.flows {
            if solution.is_set(var) {
                routes.entry(key).or_default().insert(edge);
            }
        }
        routes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn vertices(n: u32) -> BTreeSet<Vertex> {
        (0..n).map(Vertex::new).collect()
    }

    #[test]
    fn test_variables_per_edge_and_commodity() {
        let mut p = MipProblem::new("flow");
        let edges: BTreeSet<_> = [EdgeKey::new(0, 1, 0), EdgeKey::new(1, 2, 0)].into();
        let commodities = [
            Commodity::new(CommodityKey::new(0, 2, 0), 2, dec!(3)).unwrap(),
            Commodity::new(CommodityKey::new(1, 2, 0), 0, dec!(3)).unwrap(),
        ];
        let model = FlowModel::build(&mut p, &vertices(3), &edges, &commodities).unwrap();

        // the zero-unit commodity is not modelled
        assert_eq!(p.variable_count(), 2);
        assert_eq!(model.commodity_keys().count(), 1);

        let load = model.load(&EdgeKey::new(0, 1, 0));
        assert_eq!(load.terms().len(), 1);
        assert_eq!(load.terms()[0].1, 2.0);

        // revenue only counts the edge entering the terminal
        let revenue = model.revenue();
        assert_eq!(revenue.terms().len(), 1);
        assert_eq!(revenue.terms()[0].1, 6.0);
    }

    #[test]
    fn test_conservation_rejects_broken_path() {
        let mut p = MipProblem::new("flow");
        let edges: BTreeSet<_> = [EdgeKey::new(0, 1, 0), EdgeKey::new(1, 2, 0)].into();
        let commodities = [Commodity::new(CommodityKey::new(0, 2, 0), 1, dec!(1)).unwrap()];
        let model = FlowModel::build(&mut p, &vertices(3), &edges, &commodities).unwrap();
        let key = CommodityKey::new(0, 2, 0);
        let first = model.flow(&EdgeKey::new(0, 1, 0), &key).unwrap();
        let second = model.flow(&EdgeKey::new(1, 2, 0), &key).unwrap();

        let mut values = vec![0.0; p.variable_count()];
        values[first.index()] = 1.0;
        assert!(!p.is_feasible(&values, 1e-9));
        values[second.index()] = 1.0;
        assert!(p.is_feasible(&values, 1e-9));
    }

    #[test]
    fn test_unknown_vertex_rejected() {
        let mut p = MipProblem::new("flow");
        let edges: BTreeSet<_> = [EdgeKey::new(0, 7, 0)].into();
        let result = FlowModel::build(&mut p, &vertices(3), &edges, std::iter::empty());
        assert!(matches!(result, Err(ModelError::UnknownVertex { .. })));
    }

    #[test]
    fn test_routes_decoded_with_threshold() {
        let mut p = MipProblem::new("flow");
        let edges: BTreeSet<_> = [EdgeKey::new(0, 1, 0)].into();
        let commodities = [Commodity::new(CommodityKey::new(0, 1, 0), 1, dec!(1)).unwrap()];
        let model = FlowModel::build(&mut p, &vertices(2), &edges, &commodities).unwrap();

        let solution = MipSolution::new(1.0, None, vec![0.999_9]);
        let routes = model.routes(&solution);
        assert_eq!(routes[&CommodityKey::new(0, 1, 0)].len(), 1);

        let solution = MipSolution::new(0.0, None, vec![0.4]);
        assert!(model.routes(&solution).is_empty());
    }
}
