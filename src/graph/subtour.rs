use crate::core::edge::{EdgeKey, Vertex};
use crate::core::error::ModelError;
use std::collections::BTreeSet;

/// Largest number of edge-incident vertices whose subsets are enumerated.
pub const MAX_SUBTOUR_VERTICES: usize = 16;

/// A vertex subset `S` together with the edges that lie inside it.
///
/// A commodity's flow may use at most `|S| − 1` of these edges, otherwise its
/// route contains a cycle within `S`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtourCut {
    pub vertices: BTreeSet<Vertex>,
    pub edges: Vec<EdgeKey>,
}

impl SubtourCut {
    /// `|S| − 1`.
    pub fn max_internal_edges(&self) -> usize {
        self.vertices.len().saturating_sub(1)
    }
}

/// Enumerate every vertex subset `S` with `|S| ≥ 2` whose internal edges
/// could form a cycle.
///
/// Only vertices incident to some edge are considered; a subset containing
/// at most `|S| − 1` internal edges can never be violated and is skipped.
///
/// # Algorithm
///
/// Incident vertices are indexed and every bitmask over them is a subset.
/// For each subset the edges with both endpoints inside are collected.
pub fn subtour_cuts<'a>(
    edges: impl IntoIterator<Item = &'a EdgeKey>,
) -> Result<Vec<SubtourCut>, ModelError> {
    let edges: Vec<EdgeKey> = edges.into_iter().copied().collect();
    let vertices: Vec<Vertex> = edges
        .iter()
        .flat_map(|e| [e.head, e.tail])
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if vertices.len() > MAX_SUBTOUR_VERTICES {
        return Err(ModelError::TooManyVertices {
            count: vertices.len(),
            max: MAX_SUBTOUR_VERTICES,
        });
    }

    // (head index, tail index) as bitmasks
    let endpoint_masks: Vec<(u32, u32)> = edges
        .iter()
        .map(|e| {
            let index = |v: Vertex| vertices.iter().position(|&w| w == v).unwrap_or(0);
            (1u32 << index(e.head), 1u32 << index(e.tail))
        })
        .collect();

    let mut cuts = Vec::new();
    for mask in 1u32..(1u32 << vertices.len()) {
        let size = mask.count_ones() as usize;
        if size < 2 {
            continue;
        }
        let internal: Vec<EdgeKey> = edges
            .iter()
            .zip(&endpoint_masks)
            .filter(|(_, &(h, t))| mask & h != 0 && mask & t != 0)
            .map(|(e, _)| *e)
            .collect();
        if internal.len() < size {
            continue;
        }
        let members = vertices
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(_, v)| *v)
            .collect();
        cuts.push(SubtourCut {
            vertices: members,
            edges: internal,
        });
    }
    Ok(cuts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_needs_no_cuts() {
        let edges = [EdgeKey::new(0, 1, 0), EdgeKey::new(1, 2, 0)];
        assert!(subtour_cuts(&edges).unwrap().is_empty());
    }

    #[test]
    fn test_two_cycle_cut() {
        let edges = [EdgeKey::new(0, 1, 0), EdgeKey::new(1, 0, 1)];
        let cuts = subtour_cuts(&edges).unwrap();
        assert_eq!(cuts.len(), 1);
        assert_eq!(cuts[0].edges.len(), 2);
        assert_eq!(cuts[0].max_internal_edges(), 1);
    }

    #[test]
    fn test_triangle_cuts() {
        let edges = [
            EdgeKey::new(0, 1, 0),
            EdgeKey::new(1, 2, 0),
            EdgeKey::new(2, 0, 0),
        ];
        let cuts = subtour_cuts(&edges).unwrap();
        // only the full vertex set carries three internal edges
        assert_eq!(cuts.len(), 1);
        assert_eq!(cuts[0].vertices.len(), 3);
    }

    #[test]
    fn test_parallel_edges_of_different_owners() {
        let edges = [EdgeKey::new(0, 1, 0), EdgeKey::new(0, 1, 1)];
        let cuts = subtour_cuts(&edges).unwrap();
        assert_eq!(cuts.len(), 1);
    }

    #[test]
    fn test_too_many_vertices() {
        let edges: Vec<EdgeKey> = (0..17).map(|v| EdgeKey::new(v, v + 1, 0)).collect();
        assert_eq!(
            subtour_cuts(&edges),
            Err(ModelError::TooManyVertices { count: 18, max: 16 })
        );
    }
}
