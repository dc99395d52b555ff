//! Error type shared by graph loading, matrix construction, solving and rendering.

use thiserror::Error;

/// Errors produced by the tour optimizer.
#[derive(Debug, Error)]
pub enum TourError {
    /// The geocoder returned no match for the requested place.
    #[error("place not found: {0}")]
    PlaceNotFound(String),

    /// Street network data could not be downloaded or decoded.
    #[error("network fetch failed: {0}")]
    NetworkFetch(String),

    /// The street graph has no node a location could be mapped to.
    #[error("no nearest node: the street graph is empty")]
    NoNearestNode,

    /// No path exists between the nodes of two locations.
    #[error("location {to} is unreachable from location {from}")]
    Unreachable { from: usize, to: usize },

    /// The distance matrix (or start index) cannot describe a tour.
    #[error("infeasible route: {0}")]
    InfeasibleRoute(String),

    /// The search budget ran out before any tour was constructed.
    #[error("no solution found within the search budget")]
    NoSolutionFound,

    /// Edge weights must be finite and non-negative.
    #[error("invalid edge length: {0}")]
    InvalidEdgeLength(f64),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl From<reqwest::Error> for TourError {
    fn from(e: reqwest::Error) -> Self {
        TourError::NetworkFetch(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TourError>;
