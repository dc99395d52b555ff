//! Tourist Route Optimizer Library
//!
//! Plans the shortest walking tour through a set of points of interest in a
//! city.
//!
//! # Features
//!
//! - Street networks downloaded from OpenStreetMap (Nominatim + Overpass) with
//!   an on-disk cache, or loaded from a JSON file
//! - Walking distance matrices from shortest paths over the street graph
//! - Construction heuristics (Path Cheapest Arc, Nearest Neighbor, Cheapest
//!   and Farthest Insertion, Multi-start)
//! - Local search methods (2-opt, Or-opt, Swap, Relocation, VND) and
//!   metaheuristics (Simulated Annealing, ILS)
//! - HTML map, SVG and PNG rendering of the route
//! - Strategy comparison and benchmarking tools
//!
//! # Example
//!
//! ```no_run
//! use tourist_route_optimizer::instance::{Location, TourInstance};
//! use tourist_route_optimizer::matrix::create_distance_matrix;
//! use tourist_route_optimizer::provider::{GraphProvider, OverpassProvider};
//! use tourist_route_optimizer::solver::{RouteSolver, SolverConfig};
//! use tourist_route_optimizer::termination::CancellationToken;
//! use tourist_route_optimizer::visualization::Visualizer;
//!
//! let graph = OverpassProvider::default().load_graph("Paris, France")?;
//! let locations = vec![
//!     Location::named("Eiffel Tower", 48.8584, 2.2945),
//!     Location::named("Louvre", 48.8606, 2.3376),
//!     Location::named("Notre-Dame", 48.8530, 2.3499),
//! ];
//!
//! let matrix = create_distance_matrix(&graph, &locations)?;
//! let instance = TourInstance::new("Paris", locations, matrix)?;
//! let solution = RouteSolver::new(SolverConfig::default())
//!     .solve_instance(&instance, &CancellationToken::new())?;
//!
//! println!("Tour length: {} m", solution.cost);
//! Visualizer::new().plot_route(&graph, &instance, &solution, "route.html")?;
//! # Ok::<(), tourist_route_optimizer::TourError>(())
//! ```

pub mod error;
pub mod graph;
pub mod matrix;
pub mod instance;
pub mod solution;
pub mod termination;
pub mod heuristics;
pub mod solver;
pub mod provider;
pub mod config;
pub mod benchmark;
pub mod visualization;

pub use error::{Result, TourError};
pub use graph::StreetGraph;
pub use instance::{Location, TourInstance};
pub use matrix::DistanceMatrix;
pub use solution::Solution;
pub use solver::{solve_tsp, RouteSolver, SolverConfig};
