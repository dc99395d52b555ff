//! Locations and tour instances.
//!
//! A [`TourInstance`] ties the points of interest to the distance matrix
//! computed between them and fixes where the tour starts and whether it
//! returns to the origin.

use crate::error::{Result, TourError};
use crate::matrix::DistanceMatrix;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// A point of interest to visit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Display name (optional)
    #[serde(default)]
    pub name: Option<String>,
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lon: f64,
}

impl Location {
    pub fn new(lat: f64, lon: f64) -> Self {
        Location { name: None, lat, lon }
    }

    pub fn named(name: &str, lat: f64, lon: f64) -> Self {
        Location {
            name: Some(name.to_string()),
            lat,
            lon,
        }
    }

    /// Name to show for the location at `index` in the input list.
    pub fn label(&self, index: usize) -> String {
        match &self.name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => format!("Location {}", index),
        }
    }

    /// Check that the coordinate is a valid WGS84 position
    pub fn validate(&self) -> Result<()> {
        if !self.lat.is_finite() || !self.lon.is_finite() {
            return Err(TourError::InvalidInput(format!(
                "coordinate ({}, {}) is not finite",
                self.lat, self.lon
            )));
        }
        if !(-90.0..=90.0).contains(&self.lat) || !(-180.0..=180.0).contains(&self.lon) {
            return Err(TourError::InvalidInput(format!(
                "coordinate ({}, {}) is out of range",
                self.lat, self.lon
            )));
        }
        Ok(())
    }

    /// Read locations from a CSV file with `name,lat,lon` columns.
    pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Location>> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)?;

        let mut locations = Vec::new();
        for record in reader.deserialize() {
            let location: Location = record?;
            location.validate()?;
            locations.push(location);
        }
        Ok(locations)
    }
}

/// Parses `"lat,lon"` as used on the command line.
impl FromStr for Location {
    type Err = TourError;

    fn from_str(s: &str) -> Result<Self> {
        let (lat, lon) = s
            .split_once(',')
            .ok_or_else(|| TourError::InvalidInput(format!("expected \"lat,lon\", got \"{}\"", s)))?;
        let lat: f64 = lat
            .trim()
            .parse()
            .map_err(|_| TourError::InvalidInput(format!("invalid latitude \"{}\"", lat)))?;
        let lon: f64 = lon
            .trim()
            .parse()
            .map_err(|_| TourError::InvalidInput(format!("invalid longitude \"{}\"", lon)))?;

        let location = Location::new(lat, lon);
        location.validate()?;
        Ok(location)
    }
}

/// A tour problem: locations, distances between them, origin and route shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TourInstance {
    /// Name of the instance (usually the place name)
    pub name: String,
    /// Points of interest; empty when the instance was built from a bare matrix
    pub locations: Vec<Location>,
    /// Pairwise walking distances in meters
    pub distance_matrix: DistanceMatrix,
    /// Index of the fixed origin
    pub start: usize,
    /// Whether the tour returns to the origin
    pub close_loop: bool,
    #[serde(skip)]
    symmetric: bool,
}

impl TourInstance {
    /// Creates an instance, checking that the matrix matches the locations.
    pub fn new(name: &str, locations: Vec<Location>, distance_matrix: DistanceMatrix) -> Result<Self> {
        if locations.len() != distance_matrix.dimension() {
            return Err(TourError::InvalidInput(format!(
                "{} locations but a {}x{} distance matrix",
                locations.len(),
                distance_matrix.dimension(),
                distance_matrix.dimension()
            )));
        }
        Ok(TourInstance {
            name: name.to_string(),
            locations,
            symmetric: distance_matrix.is_symmetric(),
            distance_matrix,
            start: 0,
            close_loop: true,
        })
    }

    /// Instance over a bare matrix, without coordinates.
    pub fn from_matrix(distance_matrix: DistanceMatrix, start: usize, close_loop: bool) -> Result<Self> {
        let n = distance_matrix.dimension();
        if n == 0 {
            return Err(TourError::InfeasibleRoute("distance matrix is empty".to_string()));
        }
        if start >= n {
            return Err(TourError::InfeasibleRoute(format!(
                "start index {} is out of range for {} locations",
                start, n
            )));
        }
        Ok(TourInstance {
            name: "matrix".to_string(),
            locations: Vec::new(),
            symmetric: distance_matrix.is_symmetric(),
            distance_matrix,
            start,
            close_loop,
        })
    }

    /// Sets the origin and whether the tour returns to it. The solver
    /// rejects an out-of-range origin.
    pub fn with_route_shape(mut self, start: usize, close_loop: bool) -> Self {
        self.start = start;
        self.close_loop = close_loop;
        self
    }

    /// Number of locations
    #[inline]
    pub fn dimension(&self) -> usize {
        self.distance_matrix.dimension()
    }

    /// Whether `distance(i, j) == distance(j, i)` for every pair. Instances
    /// read back from JSON report `false` and take the slower move evaluation.
    pub fn is_symmetric(&self) -> bool {
        self.symmetric
    }

    #[inline]
    pub fn distance(&self, i: usize, j: usize) -> u64 {
        self.distance_matrix.get(i, j)
    }

    /// Cost of a tour given as a permutation starting at the origin.
    /// Closed instances add the arc from the last stop back to the first.
    pub fn tour_cost(&self, tour: &[usize]) -> u64 {
        if tour.is_empty() {
            return 0;
        }

        let mut cost: u64 = tour.windows(2).map(|w| self.distance(w[0], w[1])).sum();
        if self.close_loop {
            cost += self.distance(tour[tour.len() - 1], tour[0]);
        }
        cost
    }

    /// Sum of distances along consecutive entries of a route as handed to
    /// the renderer (closing repeat included, if any).
    pub fn route_length(&self, route: &[usize]) -> u64 {
        route.windows(2).map(|w| self.distance(w[0], w[1])).sum()
    }

    /// Mean latitude and longitude of the locations.
    pub fn centroid(&self) -> Option<(f64, f64)> {
        if self.locations.is_empty() {
            return None;
        }
        let n = self.locations.len() as f64;
        let lat = self.locations.iter().map(|l| l.lat).sum::<f64>() / n;
        let lon = self.locations.iter().map(|l| l.lon).sum::<f64>() / n;
        Some((lat, lon))
    }

    /// Get statistics about the instance
    pub fn statistics(&self) -> InstanceStatistics {
        let n = self.dimension();
        let mut distances: Vec<u64> = Vec::new();
        for i in 0..n {
            for j in 0..n {
                if i != j {
                    distances.push(self.distance(i, j));
                }
            }
        }

        let avg_distance = if distances.is_empty() {
            0.0
        } else {
            distances.iter().sum::<u64>() as f64 / distances.len() as f64
        };

        InstanceStatistics {
            name: self.name.clone(),
            dimension: n,
            start: self.start,
            close_loop: self.close_loop,
            symmetric: self.distance_matrix.is_symmetric(),
            avg_distance,
            min_distance: distances.iter().copied().min().unwrap_or(0),
            max_distance: distances.iter().copied().max().unwrap_or(0),
        }
    }
}

/// Statistics about a tour instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceStatistics {
    pub name: String,
    pub dimension: usize,
    pub start: usize,
    pub close_loop: bool,
    pub symmetric: bool,
    pub avg_distance: f64,
    pub min_distance: u64,
    pub max_distance: u64,
}

impl std::fmt::Display for InstanceStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Instance: {}", self.name)?;
        writeln!(f, "  Locations: {} (origin {})", self.dimension, self.start)?;
        writeln!(f, "  Tour: {}", if self.close_loop { "closed loop" } else { "open path" })?;
        writeln!(f, "  Symmetric distances: {}", self.symmetric)?;
        writeln!(f, "  Avg distance: {:.1} m", self.avg_distance)?;
        writeln!(f, "  Min distance: {} m", self.min_distance)?;
        writeln!(f, "  Max distance: {} m", self.max_distance)
    }
}
