//! Tour configuration files.
//!
//! A JSON file describing a whole run: where the street network comes from,
//! which locations to visit, solver parameters and the output path. Command
//! line flags override the values read from the file.

use crate::error::{Result, TourError};
use crate::instance::Location;
use crate::provider::{NetworkType, DEFAULT_CACHE_DIR};
use crate::solver::SolverConfig;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Default path of the rendered map.
pub const DEFAULT_OUTPUT: &str = "route.html";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TourConfig {
    /// Place whose street network is downloaded, e.g. "Paris, France"
    pub place: Option<String>,
    /// Locations to visit; the first one is the origin unless `solver.start` says otherwise
    pub locations: Vec<Location>,
    pub solver: SolverConfig,
    /// Rendered HTML map
    pub output: PathBuf,
    /// Street graph JSON file used instead of downloading
    pub graph_file: Option<PathBuf>,
    pub network_type: NetworkType,
    /// Download cache; `None` disables caching
    pub cache_dir: Option<PathBuf>,
}

impl Default for TourConfig {
    fn default() -> Self {
        TourConfig {
            place: None,
            locations: Vec::new(),
            solver: SolverConfig::default(),
            output: PathBuf::from(DEFAULT_OUTPUT),
            graph_file: None,
            network_type: NetworkType::Walk,
            cache_dir: Some(PathBuf::from(DEFAULT_CACHE_DIR)),
        }
    }
}

impl TourConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: TourConfig = serde_json::from_reader(reader)?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    /// Checks that the configuration describes a run that can be attempted.
    pub fn validate(&self) -> Result<()> {
        if self.place.is_none() && self.graph_file.is_none() {
            return Err(TourError::InvalidInput(
                "either a place name or a graph file is required".to_string(),
            ));
        }
        if self.locations.is_empty() {
            return Err(TourError::InvalidInput("no locations to visit".to_string()));
        }
        for location in &self.locations {
            location.validate()?;
        }
        Ok(())
    }

    /// Name used for the instance and the map title
    pub fn title(&self) -> String {
        match (&self.place, &self.graph_file) {
            (Some(place), _) => place.clone(),
            (None, Some(file)) => file
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "tour".to_string()),
            (None, None) => "tour".to_string(),
        }
    }
}
