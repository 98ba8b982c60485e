use crate::core::edge::{EdgeKey, Vertex};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("route leaves vertex {vertex} on more than one edge")]
    Branching { vertex: Vertex },
    #[error("route stops at vertex {vertex} before reaching the terminal")]
    DeadEnd { vertex: Vertex },
    #[error("route revisits vertex {vertex}")]
    Cycle { vertex: Vertex },
    #[error("{count} route edges are not on the origin-terminal walk")]
    Disconnected { count: usize },
}

/// Recover the traversal order of an unordered route.
///
/// Starting at `origin`, follows the single route edge leaving each vertex
/// until `terminal` is reached. Every edge of the route must be used exactly
/// once and no vertex may be visited twice.
pub fn order_route(
    origin: Vertex,
    terminal: Vertex,
    route: &BTreeSet<EdgeKey>,
) -> Result<Vec<EdgeKey>, RouteError> {
    let mut ordered = Vec::with_capacity(route.len());
    let mut visited = BTreeSet::from([origin]);
    let mut current = origin;

    while current != terminal {
        let mut leaving = route.iter().filter(|e| e.head == current);
        let next = leaving.next().ok_or(RouteError::DeadEnd { vertex: current })?;
        if leaving.next().is_some() {
            return Err(RouteError::Branching { vertex: current });
        }
        if !visited.insert(next.tail) {
            return Err(RouteError::Cycle { vertex: next.tail });
        }
        ordered.push(*next);
        current = next.tail;
    }

    if ordered.len() != route.len() {
        return Err(RouteError::Disconnected {
            count: route.len() - ordered.len(),
        });
    }
    Ok(ordered)
}

pub fn is_valid_route(origin: Vertex, terminal: Vertex, route: &BTreeSet<EdgeKey>) -> bool {
    order_route(origin, terminal, route).is_ok()
}

/// Vertices visited by an ordered route, origin first.
pub fn route_vertices(ordered: &[EdgeKey]) -> Vec<Vertex> {
    let mut vertices: Vec<Vertex> = ordered.first().map(|e| e.head).into_iter().collect();
    vertices.extend(ordered.iter().map(|e| e.tail));
    vertices
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(id: u32) -> Vertex {
        Vertex::new(id)
    }

    #[test]
    fn test_order_simple_path() {
        let route: BTreeSet<_> = [
            EdgeKey::new(2, 3, 0),
            EdgeKey::new(0, 1, 1),
            EdgeKey::new(1, 2, 0),
        ]
        .into();
        let ordered = order_route(v(0), v(3), &route).unwrap();
        assert_eq!(
            ordered,
            vec![EdgeKey::new(0, 1, 1), EdgeKey::new(1, 2, 0), EdgeKey::new(2, 3, 0)]
        );
        assert_eq!(route_vertices(&ordered), vec![v(0), v(1), v(2), v(3)]);
    }

    #[test]
    fn test_branching_rejected() {
        let route: BTreeSet<_> = [EdgeKey::new(0, 1, 0), EdgeKey::new(0, 1, 1)].into();
        assert_eq!(
            order_route(v(0), v(1), &route),
            Err(RouteError::Branching { vertex: v(0) })
        );
    }

    #[test]
    fn test_detached_cycle_rejected() {
        let route: BTreeSet<_> = [
            EdgeKey::new(0, 1, 0),
            EdgeKey::new(2, 3, 0),
            EdgeKey::new(3, 2, 0),
        ]
        .into();
        assert_eq!(
            order_route(v(0), v(1), &route),
            Err(RouteError::Disconnected { count: 2 })
        );
    }

    #[test]
    fn test_dead_end_rejected() {
        let route: BTreeSet<_> = [EdgeKey::new(0, 1, 0)].into();
        assert!(!is_valid_route(v(0), v(2), &route));
    }

    #[test]
    fn test_cycle_rejected() {
        let route: BTreeSet<_> = [EdgeKey::new(0, 1, 0), EdgeKey::new(1, 0, 0)].into();
        assert_eq!(
            order_route(v(0), v(2), &route),
            Err(RouteError::Cycle { vertex: v(0) })
        );
    }
}
