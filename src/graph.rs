//! Street network representation.
//!
//! A directed multigraph of street intersections (nodes with latitude and
//! longitude) joined by street segments weighted with their length in meters.
//! Nodes are indexed in an R-tree so arbitrary coordinates can be snapped to
//! the closest intersection, and shortest paths are computed with Dijkstra.
//!
//! The R-tree holds points on the unit sphere. Chord length grows with
//! great-circle distance, so the closest point in the tree is also the
//! closest node by haversine distance, at any latitude.

use crate::error::{Result, TourError};
use log::debug;
use petgraph::algo::{astar, dijkstra};
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Version of the JSON graph format. Bump when `GraphData` changes.
pub const GRAPH_FORMAT_VERSION: u32 = 1;

/// Mean Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Street intersection (or way vertex)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreetNode {
    /// External identifier (OSM node id when loaded from OpenStreetMap)
    pub osm_id: i64,
    pub lat: f64,
    pub lon: f64,
}

/// Directed street segment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreetEdge {
    /// Length in meters
    pub length: f64,
}

/// Point stored in the spatial index, as a unit vector.
#[derive(Clone, Copy, Debug, PartialEq)]
struct IndexedNode {
    coords: [f64; 3],
    node: NodeIndex,
}

/// Position of `(lat, lon)` on the unit sphere.
fn unit_vector(lat: f64, lon: f64) -> [f64; 3] {
    let (lat, lon) = (lat.to_radians(), lon.to_radians());
    [lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin()]
}

impl RTreeObject for IndexedNode {
    type Envelope = AABB<[f64; 3]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.coords)
    }
}

impl PointDistance for IndexedNode {
    fn distance_2(&self, point: &[f64; 3]) -> f64 {
        self.coords
            .iter()
            .zip(point)
            .map(|(a, b)| (a - b) * (a - b))
            .sum()
    }

    fn contains_point(&self, point: &[f64; 3]) -> bool {
        self.coords == *point
    }
}

/// Weighted, directed street network.
#[derive(Clone)]
pub struct StreetGraph {
    graph: DiGraph<StreetNode, StreetEdge>,
    index: RTree<IndexedNode>,
}

impl StreetGraph {
    /// Creates an empty street graph.
    pub fn new() -> Self {
        StreetGraph {
            graph: DiGraph::new(),
            index: RTree::new(),
        }
    }

    /// Adds a node and registers it in the spatial index.
    pub fn add_node(&mut self, osm_id: i64, lat: f64, lon: f64) -> NodeIndex {
        let node = self.graph.add_node(StreetNode { osm_id, lat, lon });
        self.index.insert(IndexedNode {
            coords: unit_vector(lat, lon),
            node,
        });
        node
    }

    /// Adds a directed edge. Lengths must be finite and non-negative.
    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, length: f64) -> Result<EdgeIndex> {
        if !length.is_finite() || length < 0.0 {
            return Err(TourError::InvalidEdgeLength(length));
        }
        if from.index() >= self.graph.node_count() || to.index() >= self.graph.node_count() {
            return Err(TourError::InvalidInput(format!(
                "edge {} -> {} references a missing node",
                from.index(),
                to.index()
            )));
        }
        Ok(self.graph.add_edge(from, to, StreetEdge { length }))
    }

    /// Adds an edge in both directions (two-way street).
    pub fn add_two_way_edge(&mut self, a: NodeIndex, b: NodeIndex, length: f64) -> Result<()> {
        self.add_edge(a, b, length)?;
        self.add_edge(b, a, length)?;
        Ok(())
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn node(&self, node: NodeIndex) -> Option<&StreetNode> {
        self.graph.node_weight(node)
    }

    /// Iterates over all nodes with their indices.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &StreetNode)> + '_ {
        self.graph
            .node_indices()
            .filter_map(move |idx| self.graph.node_weight(idx).map(|n| (idx, n)))
    }

    /// Iterates over all edges as `(from, to, length)`.
    pub fn edges(&self) -> impl Iterator<Item = (NodeIndex, NodeIndex, f64)> + '_ {
        self.graph
            .edge_references()
            .map(|e| (e.source(), e.target(), e.weight().length))
    }

    /// Finds the node closest to `(lat, lon)` by haversine distance. Nodes at
    /// the same distance resolve to the lowest index.
    pub fn nearest_node(&self, lat: f64, lon: f64) -> Result<NodeIndex> {
        if !lat.is_finite() || !lon.is_finite() {
            return Err(TourError::InvalidInput(format!(
                "coordinate ({}, {}) is not finite",
                lat, lon
            )));
        }

        let query = unit_vector(lat, lon);
        let mut candidates = self.index.nearest_neighbor_iter_with_distance_2(&query);
        let (first, best) = candidates.next().ok_or(TourError::NoNearestNode)?;

        let tied = candidates
            .take_while(|(_, d)| *d <= best)
            .map(|(p, _)| p.node)
            .min();
        Ok(tied.map_or(first.node, |node| node.min(first.node)))
    }

    /// Shortest path lengths from `source` to every reachable node.
    pub fn shortest_path_lengths(&self, source: NodeIndex) -> HashMap<NodeIndex, f64> {
        dijkstra(&self.graph, source, None, |e| e.weight().length)
    }

    /// Shortest path between two nodes with its node sequence.
    pub fn shortest_path(&self, from: NodeIndex, to: NodeIndex) -> Option<(f64, Vec<NodeIndex>)> {
        if from == to {
            return Some((0.0, vec![from]));
        }
        // A* with a zero estimate is Dijkstra that keeps the path
        astar(
            &self.graph,
            from,
            |n| n == to,
            |e| e.weight().length,
            |_| 0.0,
        )
    }

    /// `(lat, lon)` pairs along a node path.
    pub fn path_coordinates(&self, path: &[NodeIndex]) -> Vec<(f64, f64)> {
        path.iter()
            .filter_map(|&idx| self.graph.node_weight(idx).map(|n| (n.lat, n.lon)))
            .collect()
    }

    /// Bounding box as `(min_lat, max_lat, min_lon, max_lon)`.
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        if self.is_empty() {
            return None;
        }
        let mut bounds = (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY);
        for node in self.graph.node_weights() {
            bounds.0 = bounds.0.min(node.lat);
            bounds.1 = bounds.1.max(node.lat);
            bounds.2 = bounds.2.min(node.lon);
            bounds.3 = bounds.3.max(node.lon);
        }
        Some(bounds)
    }

    /// Converts the graph into its serializable form.
    pub fn to_data(&self) -> GraphData {
        let nodes = self
            .graph
            .node_weights()
            .map(|n| NodeData { id: n.osm_id, lat: n.lat, lon: n.lon })
            .collect();
        let edges = self
            .graph
            .edge_references()
            .map(|e| EdgeData {
                from: e.source().index(),
                to: e.target().index(),
                length: e.weight().length,
            })
            .collect();

        GraphData {
            version: GRAPH_FORMAT_VERSION,
            nodes,
            edges,
        }
    }

    /// Rebuilds a graph from its serialized form, validating every edge.
    pub fn from_data(data: &GraphData) -> Result<Self> {
        if data.version != GRAPH_FORMAT_VERSION {
            return Err(TourError::InvalidInput(format!(
                "graph format version {} (expected {})",
                data.version, GRAPH_FORMAT_VERSION
            )));
        }

        let mut graph = StreetGraph::new();
        for node in &data.nodes {
            graph.add_node(node.id, node.lat, node.lon);
        }
        for edge in &data.edges {
            graph.add_edge(NodeIndex::new(edge.from), NodeIndex::new(edge.to), edge.length)?;
        }

        debug!(
            "Rebuilt street graph with {} nodes and {} edges",
            graph.node_count(),
            graph.edge_count()
        );
        Ok(graph)
    }

    /// Loads a graph saved with [`StreetGraph::save_json`].
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let data: GraphData = serde_json::from_reader(reader)?;
        Self::from_data(&data)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, &self.to_data())?;
        Ok(())
    }
}

impl std::fmt::Debug for StreetGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreetGraph")
            .field("nodes", &self.graph.node_count())
            .field("edges", &self.graph.edge_count())
            .finish()
    }
}

impl Default for StreetGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable street graph (cache and offline file format).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphData {
    pub version: u32,
    pub nodes: Vec<NodeData>,
    pub edges: Vec<EdgeData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeData {
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
}

/// Edge between positions in `GraphData::nodes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeData {
    pub from: usize,
    pub to: usize,
    pub length: f64,
}

/// Haversine distance between two points in meters.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let a = (dlat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_M * c
}

#[cfg(test)]
mod tests {
    use super::*;

    fn length(graph: &StreetGraph, from: NodeIndex, to: NodeIndex) -> Option<f64> {
        graph.shortest_path(from, to).map(|(length, _)| length)
    }

    /// A -5- B -7- C, two-way, laid out along a parallel.
    fn path_graph() -> (StreetGraph, [NodeIndex; 3]) {
        let mut graph = StreetGraph::new();
        let a = graph.add_node(1, 48.8566, 2.3500);
        let b = graph.add_node(2, 48.8566, 2.3510);
        let c = graph.add_node(3, 48.8566, 2.3520);
        graph.add_two_way_edge(a, b, 5.0).unwrap();
        graph.add_two_way_edge(b, c, 7.0).unwrap();
        (graph, [a, b, c])
    }

    #[test]
    fn test_haversine_distance() {
        // One degree of latitude is about 111.2 km
        let dist = haversine_distance(0.0, 0.0, 1.0, 0.0);
        assert!((dist - 111_195.0).abs() < 100.0);
        assert_eq!(haversine_distance(10.0, 20.0, 10.0, 20.0), 0.0);
    }

    #[test]
    fn test_nearest_node() {
        let (graph, [a, b, c]) = path_graph();
        assert_eq!(graph.nearest_node(48.8566, 2.3499).unwrap(), a);
        assert_eq!(graph.nearest_node(48.8570, 2.3511).unwrap(), b);
        assert_eq!(graph.nearest_node(48.8500, 2.3600).unwrap(), c);
    }

    #[test]
    fn test_nearest_node_at_high_latitude() {
        // At 70°N a degree of longitude is about a third of a degree of
        // latitude: eight nodes due north are farther than one node due east
        let (lat, lon) = (70.0, 20.0);
        let mut graph = StreetGraph::new();
        for k in 0..8 {
            graph.add_node(k, lat + 0.001 + 0.00002 * k as f64, lon);
        }
        let east = graph.add_node(8, lat, lon + 0.0025);

        let nearest = graph.nearest_node(lat, lon).unwrap();
        assert_eq!(nearest, east);

        let brute = graph
            .nodes()
            .map(|(idx, n)| (haversine_distance(lat, lon, n.lat, n.lon), idx))
            .fold((f64::INFINITY, east), |best, c| if c.0 < best.0 { c } else { best });
        assert_eq!(nearest, brute.1);
        assert!((brute.0 - 95.1).abs() < 0.5);
    }

    #[test]
    fn test_nearest_node_ties_go_to_lowest_index() {
        let mut graph = StreetGraph::new();
        let first = graph.add_node(1, 10.0, 10.001);
        graph.add_node(2, 10.0, 10.001);
        assert_eq!(graph.nearest_node(10.0, 10.0).unwrap(), first);
    }

    #[test]
    fn test_nearest_node_empty_graph() {
        let graph = StreetGraph::new();
        assert!(matches!(graph.nearest_node(48.0, 2.0), Err(TourError::NoNearestNode)));
    }

    #[test]
    fn test_nearest_node_rejects_nan() {
        let (graph, _) = path_graph();
        assert!(matches!(
            graph.nearest_node(f64::NAN, 2.0),
            Err(TourError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_shortest_path() {
        let (graph, [a, b, c]) = path_graph();
        assert_eq!(length(&graph, a, c), Some(12.0));
        assert_eq!(length(&graph, c, b), Some(7.0));

        let (cost, path) = graph.shortest_path(a, c).unwrap();
        assert_eq!(cost, 12.0);
        assert_eq!(path, vec![a, b, c]);
        assert_eq!(graph.path_coordinates(&path).len(), 3);
    }

    #[test]
    fn test_one_way_edge_is_not_traversed_backwards() {
        let mut graph = StreetGraph::new();
        let a = graph.add_node(1, 0.0, 0.0);
        let b = graph.add_node(2, 0.0, 0.001);
        graph.add_edge(a, b, 10.0).unwrap();

        assert_eq!(length(&graph, a, b), Some(10.0));
        assert_eq!(length(&graph, b, a), None);
        assert!(graph.shortest_path(b, a).is_none());
    }

    #[test]
    fn test_parallel_edges_use_shortest() {
        let mut graph = StreetGraph::new();
        let a = graph.add_node(1, 0.0, 0.0);
        let b = graph.add_node(2, 0.0, 0.001);
        graph.add_edge(a, b, 30.0).unwrap();
        graph.add_edge(a, b, 20.0).unwrap();

        assert_eq!(graph.edge_count(), 2);
        assert_eq!(length(&graph, a, b), Some(20.0));
    }

    #[test]
    fn test_invalid_edge_lengths() {
        let mut graph = StreetGraph::new();
        let a = graph.add_node(1, 0.0, 0.0);
        let b = graph.add_node(2, 0.0, 0.001);
        assert!(matches!(graph.add_edge(a, b, -1.0), Err(TourError::InvalidEdgeLength(_))));
        assert!(matches!(graph.add_edge(a, b, f64::NAN), Err(TourError::InvalidEdgeLength(_))));
        assert!(matches!(
            graph.add_edge(a, NodeIndex::new(7), 1.0),
            Err(TourError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_json_file_preserves_graph() {
        let (graph, [a, _, c]) = path_graph();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");

        graph.save_json(&path).unwrap();
        let loaded = StreetGraph::load_json(&path).unwrap();

        assert_eq!(loaded.node_count(), 3);
        assert_eq!(loaded.edge_count(), 4);
        assert_eq!(length(&loaded, a, c), Some(12.0));
        assert_eq!(loaded.node(c).unwrap().osm_id, 3);
    }

    #[test]
    fn test_from_data_rejects_other_versions() {
        let (graph, _) = path_graph();
        let mut data = graph.to_data();
        data.version = GRAPH_FORMAT_VERSION + 1;
        assert!(StreetGraph::from_data(&data).is_err());
    }

    #[test]
    fn test_bounds() {
        let (graph, _) = path_graph();
        let (min_lat, max_lat, min_lon, max_lon) = graph.bounds().unwrap();
        assert_eq!(min_lat, max_lat);
        assert!((min_lon - 2.35).abs() < 1e-9);
        assert!((max_lon - 2.352).abs() < 1e-9);
        assert!(StreetGraph::new().bounds().is_none());
    }
}
