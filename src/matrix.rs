//! Distance matrix construction over a street graph.
//!
//! Every location is snapped to its nearest street node, then one Dijkstra
//! search per location yields a full row of shortest walking distances. Rows
//! are independent, so they can be computed on the rayon pool.

use crate::error::{Result, TourError};
use crate::graph::StreetGraph;
use crate::instance::Location;
use log::{debug, info};
use petgraph::graph::NodeIndex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Square matrix of whole-meter distances; `get(i, j)` is the distance from
/// location `i` to location `j`. Not necessarily symmetric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DistanceMatrix {
    rows: Vec<Vec<u64>>,
}

impl DistanceMatrix {
    /// Builds a matrix from rows, rejecting non-square input.
    pub fn from_rows(rows: Vec<Vec<u64>>) -> Result<Self> {
        let n = rows.len();
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, row)| row.len() != n) {
            return Err(TourError::InfeasibleRoute(format!(
                "distance matrix is not square: row {} has {} entries, expected {}",
                i,
                row.len(),
                n
            )));
        }
        Ok(DistanceMatrix { rows })
    }

    /// Matrix with `value` everywhere off the diagonal.
    pub fn constant(n: usize, value: u64) -> Self {
        let rows = (0..n)
            .map(|i| (0..n).map(|j| if i == j { 0 } else { value }).collect())
            .collect();
        DistanceMatrix { rows }
    }

    /// Number of locations
    pub fn dimension(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> u64 {
        self.rows[i][j]
    }

    pub fn rows(&self) -> &[Vec<u64>] {
        &self.rows
    }

    pub fn is_symmetric(&self) -> bool {
        let n = self.dimension();
        (0..n).all(|i| (i + 1..n).all(|j| self.rows[i][j] == self.rows[j][i]))
    }

    /// Writes the matrix as CSV, one row per line, no header.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
        for row in &self.rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl std::fmt::Display for DistanceMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let width = self
            .rows
            .iter()
            .flatten()
            .map(|d| d.to_string().len())
            .max()
            .unwrap_or(1)
            .max(3);

        write!(f, "{:>4}", "")?;
        for j in 0..self.dimension() {
            write!(f, " {:>width$}", j, width = width)?;
        }
        writeln!(f)?;
        for (i, row) in self.rows.iter().enumerate() {
            write!(f, "{:>4}", i)?;
            for d in row {
                write!(f, " {:>width$}", d, width = width)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Options for [`DistanceMatrixBuilder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixBuilderConfig {
    /// Compute rows on the rayon thread pool
    pub parallel: bool,
}

impl Default for MatrixBuilderConfig {
    fn default() -> Self {
        MatrixBuilderConfig { parallel: true }
    }
}

/// A distance matrix together with the street node each location was snapped to.
#[derive(Debug, Clone)]
pub struct BuiltMatrix {
    pub matrix: DistanceMatrix,
    pub nodes: Vec<NodeIndex>,
}

/// Builds shortest-path distance matrices over a street graph.
pub struct DistanceMatrixBuilder<'a> {
    graph: &'a StreetGraph,
    config: MatrixBuilderConfig,
}

impl<'a> DistanceMatrixBuilder<'a> {
    pub fn new(graph: &'a StreetGraph) -> Self {
        DistanceMatrixBuilder {
            graph,
            config: MatrixBuilderConfig::default(),
        }
    }

    pub fn with_config(graph: &'a StreetGraph, config: MatrixBuilderConfig) -> Self {
        DistanceMatrixBuilder { graph, config }
    }

    /// Snaps every location to its nearest street node.
    pub fn resolve_nodes(&self, locations: &[Location]) -> Result<Vec<NodeIndex>> {
        locations
            .iter()
            .map(|loc| self.graph.nearest_node(loc.lat, loc.lon))
            .collect()
    }

    pub fn build(&self, locations: &[Location]) -> Result<BuiltMatrix> {
        self.build_with_progress(locations, |_, _| {})
    }

    /// Builds the matrix, calling `on_row_complete(completed, total)` after
    /// each finished row.
    pub fn build_with_progress<F>(&self, locations: &[Location], on_row_complete: F) -> Result<BuiltMatrix>
    where
        F: Fn(usize, usize) + Sync,
    {
        if locations.is_empty() {
            return Err(TourError::InvalidInput("at least one location is required".to_string()));
        }

        let nodes = self.resolve_nodes(locations)?;
        let n = nodes.len();
        let completed = AtomicUsize::new(0);

        let compute = |i: usize| -> Result<Vec<u64>> {
            let row = self.compute_row(i, &nodes);
            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            on_row_complete(done, n);
            row
        };

        let rows: Vec<Vec<u64>> = if self.config.parallel && n > 1 {
            (0..n).into_par_iter().map(compute).collect::<Result<_>>()?
        } else {
            (0..n).map(compute).collect::<Result<_>>()?
        };

        info!("Built {}x{} distance matrix", n, n);
        Ok(BuiltMatrix {
            matrix: DistanceMatrix { rows },
            nodes,
        })
    }

    /// One Dijkstra search from location `i`, read out for every target.
    fn compute_row(&self, i: usize, nodes: &[NodeIndex]) -> Result<Vec<u64>> {
        let lengths = self.graph.shortest_path_lengths(nodes[i]);
        debug!("Row {}: {} nodes reachable", i, lengths.len());

        nodes
            .iter()
            .enumerate()
            .map(|(j, target)| {
                if i == j {
                    return Ok(0);
                }
                lengths
                    .get(target)
                    .map(|&length| length.round() as u64)
                    .ok_or(TourError::Unreachable { from: i, to: j })
            })
            .collect()
    }
}

/// Shortest walking distances between `locations` on `graph`.
pub fn create_distance_matrix(graph: &StreetGraph, locations: &[Location]) -> Result<DistanceMatrix> {
    DistanceMatrixBuilder::new(graph)
        .build(locations)
        .map(|built| built.matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// A -5- B -7- C plus an isolated island node D.
    fn graph_with_island() -> StreetGraph {
        let mut graph = StreetGraph::new();
        let a = graph.add_node(1, 0.0, 0.000);
        let b = graph.add_node(2, 0.0, 0.001);
        let c = graph.add_node(3, 0.0, 0.002);
        let d = graph.add_node(4, 0.0, 0.050);
        graph.add_two_way_edge(a, b, 5.0).unwrap();
        graph.add_two_way_edge(b, c, 7.0).unwrap();
        let _ = d;
        graph
    }

    fn abc() -> Vec<Location> {
        vec![
            Location::new(0.0, 0.000),
            Location::new(0.0, 0.001),
            Location::new(0.0, 0.002),
        ]
    }

    #[test]
    fn test_path_graph_matrix() {
        let graph = graph_with_island();
        let matrix = create_distance_matrix(&graph, &abc()).unwrap();

        let expected = DistanceMatrix::from_rows(vec![
            vec![0, 5, 12],
            vec![5, 0, 7],
            vec![12, 7, 0],
        ])
        .unwrap();
        assert_eq!(matrix, expected);
        assert!(matrix.is_symmetric());
    }

    #[test]
    fn test_disconnected_location_is_unreachable() {
        let graph = graph_with_island();
        let mut locations = abc();
        locations.push(Location::new(0.0, 0.0501));

        for parallel in [false, true] {
            let builder = DistanceMatrixBuilder::with_config(&graph, MatrixBuilderConfig { parallel });
            let err = builder.build(&locations).unwrap_err();
            assert!(matches!(err, TourError::Unreachable { .. }), "got {:?}", err);
        }

        let sequential = DistanceMatrixBuilder::with_config(&graph, MatrixBuilderConfig { parallel: false });
        assert!(matches!(
            sequential.build(&locations),
            Err(TourError::Unreachable { from: 0, to: 3 })
        ));
    }

    #[test]
    fn test_empty_graph_has_no_nearest_node() {
        let graph = StreetGraph::new();
        let err = create_distance_matrix(&graph, &abc()).unwrap_err();
        assert!(matches!(err, TourError::NoNearestNode));
    }

    #[test]
    fn test_no_locations_is_rejected() {
        let graph = graph_with_island();
        assert!(matches!(
            create_distance_matrix(&graph, &[]),
            Err(TourError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_one_way_street_gives_asymmetric_matrix() {
        let mut graph = StreetGraph::new();
        let a = graph.add_node(1, 0.0, 0.000);
        let b = graph.add_node(2, 0.0, 0.001);
        let c = graph.add_node(3, 0.0, 0.002);
        // a -> b is one-way, the way back goes around through c
        graph.add_edge(a, b, 10.0).unwrap();
        graph.add_two_way_edge(b, c, 4.0).unwrap();
        graph.add_two_way_edge(c, a, 9.0).unwrap();

        let locations = vec![Location::new(0.0, 0.000), Location::new(0.0, 0.001)];
        let matrix = create_distance_matrix(&graph, &locations).unwrap();

        assert_eq!(matrix.get(0, 1), 10);
        assert_eq!(matrix.get(1, 0), 13);
        assert!(!matrix.is_symmetric());
    }

    #[test]
    fn test_lengths_round_to_whole_meters() {
        let mut graph = StreetGraph::new();
        let a = graph.add_node(1, 0.0, 0.000);
        let b = graph.add_node(2, 0.0, 0.001);
        graph.add_two_way_edge(a, b, 12.6).unwrap();

        let locations = vec![Location::new(0.0, 0.000), Location::new(0.0, 0.001)];
        let matrix = create_distance_matrix(&graph, &locations).unwrap();
        assert_eq!(matrix.get(0, 1), 13);
    }

    #[test]
    fn test_duplicate_locations_are_kept() {
        let graph = graph_with_island();
        let locations = vec![
            Location::new(0.0, 0.000),
            Location::new(0.0, 0.000),
            Location::new(0.0, 0.002),
        ];
        let built = DistanceMatrixBuilder::new(&graph).build(&locations).unwrap();

        assert_eq!(built.matrix.dimension(), 3);
        assert_eq!(built.nodes[0], built.nodes[1]);
        assert_eq!(built.matrix.get(0, 1), 0);
        assert_eq!(built.matrix.get(1, 2), 12);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let graph = graph_with_island();
        let locations = abc();
        let parallel = DistanceMatrixBuilder::with_config(&graph, MatrixBuilderConfig { parallel: true })
            .build(&locations)
            .unwrap();
        let sequential = DistanceMatrixBuilder::with_config(&graph, MatrixBuilderConfig { parallel: false })
            .build(&locations)
            .unwrap();
        assert_eq!(parallel.matrix, sequential.matrix);
        assert_eq!(parallel.nodes, sequential.nodes);
    }

    #[test]
    fn test_progress_reports_every_row() {
        let graph = graph_with_island();
        let seen = Mutex::new(Vec::new());
        DistanceMatrixBuilder::with_config(&graph, MatrixBuilderConfig { parallel: false })
            .build_with_progress(&abc(), |done, total| seen.lock().unwrap().push((done, total)))
            .unwrap();
        assert_eq!(seen.into_inner().unwrap(), vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[test]
    fn test_from_rows_rejects_ragged_input() {
        let err = DistanceMatrix::from_rows(vec![vec![0, 1], vec![1]]).unwrap_err();
        assert!(matches!(err, TourError::InfeasibleRoute(_)));
    }

    #[test]
    fn test_write_csv() {
        let matrix = DistanceMatrix::constant(2, 4);
        let mut out = Vec::new();
        matrix.write_csv(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "0,4\n4,0\n");
    }
}
