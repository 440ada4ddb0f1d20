//! Graph of views connected by candidate stereo pairs.
//!
//! Vertices get a dense index when they are added. Everything derived from
//! the graph during a run is stored in flat arrays addressed by that index;
//! the id to index map is only consulted at the boundary.

use super::{MvsError, Result};
use std::collections::HashMap;

/// A view in the graph.
#[derive(Debug, Clone)]
pub struct Vertex {
    pub id: String,
    /// Dense index of this vertex inside the graph
    pub index: usize,
    /// Index of the view inside the scene structure
    pub scene_index: usize,
    edges: Vec<usize>,
}

impl Vertex {
    /// Indices of the edges touching this vertex, in insertion order.
    pub fn edges(&self) -> &[usize] {
        &self.edges
    }
}

/// Candidate stereo pair between two views.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StereoEdge {
    va: usize,
    vb: usize,
    quality_3d: f64,
}

impl StereoEdge {
    pub fn endpoints(&self) -> (usize, usize) {
        (self.va, self.vb)
    }

    /// How much reliable 3D information the pair yields, always in `[0, 1]`.
    pub fn quality_3d(&self) -> f64 {
        self.quality_3d
    }

    /// The endpoint opposite to `vertex`.
    ///
    /// # Panics
    /// If `vertex` is not an endpoint of this edge.
    pub fn other(&self, vertex: usize) -> usize {
        if vertex == self.va {
            self.vb
        } else if vertex == self.vb {
            self.va
        } else {
            panic!("vertex {vertex} is not an endpoint of edge ({}, {})", self.va, self.vb)
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StereoPairGraph {
    vertices: Vec<Vertex>,
    edges: Vec<StereoEdge>,
    id_to_index: HashMap<String, usize>,
}

impl StereoPairGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a view and returns its dense index.
    pub fn add_vertex(&mut self, id: impl Into<String>, scene_index: usize) -> Result<usize> {
        let id = id.into();
        if self.id_to_index.contains_key(&id) {
            return Err(MvsError::validation(format!("duplicate view id '{id}'")));
        }
        let index = self.vertices.len();
        self.id_to_index.insert(id.clone(), index);
        self.vertices.push(Vertex {
            id,
            index,
            scene_index,
            edges: Vec::new(),
        });
        Ok(index)
    }

    /// Connects two views. `quality_3d` outside `[0, 1]` is rejected.
    pub fn connect(&mut self, id_a: &str, id_b: &str, quality_3d: f64) -> Result<usize> {
        if !(0.0..=1.0).contains(&quality_3d) {
            return Err(MvsError::validation(format!(
                "quality_3d of pair ('{id_a}', '{id_b}') must be in [0, 1], got {quality_3d}"
            )));
        }
        let va = self.require(id_a)?;
        let vb = self.require(id_b)?;
        if va == vb {
            return Err(MvsError::validation(format!("view '{id_a}' cannot pair with itself")));
        }

        let index = self.edges.len();
        self.edges.push(StereoEdge { va, vb, quality_3d });
        self.vertices[va].edges.push(index);
        self.vertices[vb].edges.push(index);
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn vertex(&self, index: usize) -> &Vertex {
        &self.vertices[index]
    }

    pub fn edge(&self, index: usize) -> &StereoEdge {
        &self.edges[index]
    }

    pub fn find(&self, id: &str) -> Option<usize> {
        self.id_to_index.get(id).copied()
    }

    /// Edges of `vertex` whose quality is at least `minimum_quality_3d`.
    pub fn qualifying_edges(
        &self,
        vertex: usize,
        minimum_quality_3d: f64,
    ) -> impl Iterator<Item = &StereoEdge> + '_ {
        self.vertices[vertex]
            .edges
            .iter()
            .map(move |&e| &self.edges[e])
            .filter(move |e| e.quality_3d >= minimum_quality_3d)
    }

    /// Neighbors reachable through qualifying edges, in edge insertion order.
    pub fn qualifying_neighbors(&self, vertex: usize, minimum_quality_3d: f64) -> Vec<usize> {
        self.qualifying_edges(vertex, minimum_quality_3d)
            .map(|e| e.other(vertex))
            .collect()
    }

    fn require(&self, id: &str) -> Result<usize> {
        self.find(id)
            .ok_or_else(|| MvsError::validation(format!("unknown view id '{id}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> StereoPairGraph {
        let mut graph = StereoPairGraph::new();
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            graph.add_vertex(*id, i).unwrap();
        }
        graph.connect("a", "b", 0.9).unwrap();
        graph.connect("b", "c", 0.3).unwrap();
        graph.connect("a", "c", 0.1).unwrap();
        graph
    }

    #[test]
    fn test_dense_indices() {
        let graph = triangle();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.find("c"), Some(2));
        assert_eq!(graph.vertex(1).id, "b");
        assert_eq!(graph.find("missing"), None);
    }

    #[test]
    fn test_edge_other_is_symmetric() {
        let graph = triangle();
        let edge = graph.edge(0);
        assert_eq!(edge.endpoints(), (0, 1));
        assert_eq!(edge.other(0), 1);
        assert_eq!(edge.other(1), 0);
    }

    #[test]
    fn test_quality_out_of_range_rejected() {
        let mut graph = triangle();
        let err = graph.connect("a", "b", 1.5).unwrap_err();
        assert!(matches!(err, MvsError::Validation(_)));
        assert!(graph.connect("a", "b", -0.01).is_err());
        assert!(graph.connect("a", "b", f64::NAN).is_err());
        assert_eq!(graph.edge_count(), 3);
    }

    #[test]
    fn test_bad_topology_rejected() {
        let mut graph = triangle();
        assert!(graph.add_vertex("a", 7).is_err());
        assert!(graph.connect("a", "a", 0.5).is_err());
        assert!(graph.connect("a", "zz", 0.5).is_err());
    }

    #[test]
    fn test_qualifying_neighbors_threshold() {
        let graph = triangle();
        assert_eq!(graph.qualifying_neighbors(0, 0.05), vec![1, 2]);
        assert_eq!(graph.qualifying_neighbors(0, 0.25), vec![1]);
        assert_eq!(graph.qualifying_neighbors(2, 0.25), vec![1]);
        assert!(graph.qualifying_neighbors(2, 0.95).is_empty());

        // Raising the threshold never adds qualifying edges
        for v in 0..graph.len() {
            let mut previous = usize::MAX;
            for step in 0..=20 {
                let count = graph.qualifying_neighbors(v, step as f64 * 0.05).len();
                assert!(count <= previous);
                previous = count;
            }
        }
    }
}
