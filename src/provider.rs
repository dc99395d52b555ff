//! Street network providers.
//!
//! [`OverpassProvider`] geocodes a place name with Nominatim, downloads the
//! ways inside its bounding box from the Overpass API and builds a
//! [`StreetGraph`]. Downloads are cached as JSON under `.osm_cache/`.
//! [`FileGraphProvider`] reads a graph saved in the same format.

use crate::error::{Result, TourError};
use crate::graph::{haversine_distance, StreetGraph};
use clap::ValueEnum;
use log::{debug, info, warn};
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/search";
const OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

/// Default directory for downloaded street networks.
pub const DEFAULT_CACHE_DIR: &str = ".osm_cache";

const USER_AGENT: &str = concat!("tourist-route-optimizer/", env!("CARGO_PKG_VERSION"));

/// Supplies the street network of a named place.
pub trait GraphProvider {
    fn load_graph(&self, place: &str) -> Result<StreetGraph>;
}

/// Which ways are part of the network and how they may be traversed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum NetworkType {
    /// Footways, paths and streets, all walkable in both directions
    #[default]
    Walk,
    /// Roads open to cars, respecting one-way restrictions
    Drive,
}

impl NetworkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkType::Walk => "walk",
            NetworkType::Drive => "drive",
        }
    }

    /// Overpass tag filter selecting the ways of this network
    fn way_filter(&self) -> &'static str {
        match self {
            NetworkType::Walk => concat!(
                r#"["highway"]["area"!~"yes"]["access"!~"private"]"#,
                r#"["highway"!~"abandoned|bus_guideway|construction|cycleway|motor|no|planned|platform|proposed|raceway|razed"]"#,
                r#"["foot"!~"no"]["service"!~"private"]"#
            ),
            NetworkType::Drive => concat!(
                r#"["highway"]["area"!~"yes"]["access"!~"private"]"#,
                r#"["highway"!~"abandoned|bridleway|bus_guideway|construction|corridor|cycleway|elevator|escalator|footway|no|path|pedestrian|planned|platform|proposed|raceway|razed|service|steps|track"]"#,
                r#"["motor_vehicle"!~"no"]["motorcar"!~"no"]"#,
                r#"["service"!~"alley|driveway|emergency_access|parking|parking_aisle|private"]"#
            ),
        }
    }

    /// Directions in which a way with these tags may be traversed
    fn directions(&self, tags: Option<&OsmTags>) -> Directions {
        if *self == NetworkType::Walk {
            return Directions::Both;
        }

        let oneway = tags.and_then(|t| t.oneway.as_deref());
        let roundabout = tags.and_then(|t| t.junction.as_deref()) == Some("roundabout");
        match oneway {
            Some("yes") | Some("1") | Some("true") => Directions::Forward,
            Some("-1") | Some("reverse") => Directions::Backward,
            _ if roundabout => Directions::Forward,
            _ => Directions::Both,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Directions {
    Forward,
    Backward,
    Both,
}

/// Bounding box for OSM queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        BoundingBox {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        }
    }

    /// Overpass bbox syntax: south,west,north,east
    fn to_overpass(self) -> String {
        format!("{},{},{},{}", self.min_lat, self.min_lon, self.max_lat, self.max_lon)
    }
}

/// Downloads street networks from OpenStreetMap.
#[derive(Debug, Clone)]
pub struct OverpassProvider {
    pub network_type: NetworkType,
    /// Where downloaded graphs are cached; `None` disables the cache
    pub cache_dir: Option<PathBuf>,
    pub nominatim_url: String,
    pub overpass_url: String,
    pub timeout: Duration,
}

impl OverpassProvider {
    pub fn new(network_type: NetworkType) -> Self {
        OverpassProvider {
            network_type,
            cache_dir: Some(PathBuf::from(DEFAULT_CACHE_DIR)),
            nominatim_url: NOMINATIM_URL.to_string(),
            overpass_url: OVERPASS_URL.to_string(),
            timeout: Duration::from_secs(180),
        }
    }

    pub fn with_cache_dir(mut self, cache_dir: Option<PathBuf>) -> Self {
        self.cache_dir = cache_dir;
        self
    }

    fn client(&self) -> Result<reqwest::blocking::Client> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(30))
            .timeout(self.timeout)
            .build()?;
        Ok(client)
    }

    /// Cache file for a place, if caching is enabled
    pub fn cache_path(&self, place: &str) -> Option<PathBuf> {
        let slug: String = place
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();
        self.cache_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}_{}.json", slug, self.network_type.as_str())))
    }

    /// Reads a cached graph; a corrupt or outdated file is deleted.
    fn load_cached(&self, path: &Path) -> Option<StreetGraph> {
        if !path.exists() {
            return None;
        }
        match StreetGraph::load_json(path) {
            Ok(graph) => {
                info!("Loaded street network from cache {:?}", path);
                Some(graph)
            }
            Err(e) => {
                warn!("Discarding street network cache {:?}: {}", path, e);
                let _ = std::fs::remove_file(path);
                None
            }
        }
    }

    /// Looks up the bounding box of a place with Nominatim.
    pub fn geocode(&self, place: &str) -> Result<BoundingBox> {
        let url = reqwest::Url::parse_with_params(
            &self.nominatim_url,
            &[("q", place), ("format", "json"), ("limit", "1")],
        )
        .map_err(|e| TourError::NetworkFetch(e.to_string()))?;

        debug!("Geocoding {:?}", place);
        let response = self.client()?.get(url).send()?;
        if !response.status().is_success() {
            return Err(TourError::NetworkFetch(format!(
                "Nominatim returned status {}",
                response.status()
            )));
        }

        let places: Vec<NominatimPlace> = response.json()?;
        let found = places
            .into_iter()
            .next()
            .ok_or_else(|| TourError::PlaceNotFound(place.to_string()))?;
        info!("Geocoded {:?} as {}", place, found.display_name);
        found.bounding_box()
    }

    /// Downloads the ways of the network inside `bbox`.
    pub fn fetch_network(&self, bbox: BoundingBox) -> Result<OverpassResponse> {
        let query = format!(
            "[out:json][timeout:{}];\n(\n  way{}({});\n);\n(._;>;);\nout body;",
            self.timeout.as_secs(),
            self.network_type.way_filter(),
            bbox.to_overpass()
        );
        debug!("Overpass query:\n{}", query);

        info!("Downloading {} network from Overpass API", self.network_type.as_str());
        let response = self
            .client()?
            .post(&self.overpass_url)
            .header("Content-Type", "text/plain")
            .body(query)
            .send()?;

        if !response.status().is_success() {
            return Err(TourError::NetworkFetch(format!(
                "Overpass API returned status {}",
                response.status()
            )));
        }

        let osm: OverpassResponse = response.json()?;
        info!("Downloaded {} OSM elements", osm.elements.len());
        Ok(osm)
    }
}

impl Default for OverpassProvider {
    fn default() -> Self {
        Self::new(NetworkType::Walk)
    }
}

impl GraphProvider for OverpassProvider {
    fn load_graph(&self, place: &str) -> Result<StreetGraph> {
        let cache_path = self.cache_path(place);
        if let Some(graph) = cache_path.as_deref().and_then(|p| self.load_cached(p)) {
            return Ok(graph);
        }

        let bbox = self.geocode(place)?;
        let osm = self.fetch_network(bbox)?;
        let graph = build_from_osm(&osm, self.network_type)?;

        if let Some(path) = cache_path {
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            graph.save_json(&path)?;
            info!("Saved street network to cache {:?}", path);
        }

        Ok(graph)
    }
}

/// Loads a street graph from a JSON file, whatever the place name.
#[derive(Debug, Clone)]
pub struct FileGraphProvider {
    pub path: PathBuf,
}

impl FileGraphProvider {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        FileGraphProvider { path: path.into() }
    }
}

impl GraphProvider for FileGraphProvider {
    fn load_graph(&self, _place: &str) -> Result<StreetGraph> {
        let graph = StreetGraph::load_json(&self.path)?;
        info!(
            "Loaded street network from {:?} ({} nodes, {} edges)",
            self.path,
            graph.node_count(),
            graph.edge_count()
        );
        Ok(graph)
    }
}

/// Builds the street graph from parsed Overpass data.
///
/// Only nodes referenced by a way become graph nodes. Edge lengths are the
/// haversine distance between consecutive way nodes.
pub fn build_from_osm(osm: &OverpassResponse, network_type: NetworkType) -> Result<StreetGraph> {
    let mut coords: HashMap<i64, (f64, f64)> = HashMap::new();
    for elem in &osm.elements {
        if elem.elem_type == "node" {
            if let (Some(lat), Some(lon)) = (elem.lat, elem.lon) {
                coords.insert(elem.id, (lat, lon));
            }
        }
    }

    let mut graph = StreetGraph::new();
    let mut indices: HashMap<i64, NodeIndex> = HashMap::new();
    let mut way_count = 0;

    for elem in osm.elements.iter().filter(|e| e.elem_type == "way") {
        let Some(ref node_ids) = elem.nodes else {
            continue;
        };
        let directions = network_type.directions(elem.tags.as_ref());

        for window in node_ids.windows(2) {
            let (Some(&(lat1, lon1)), Some(&(lat2, lon2))) = (coords.get(&window[0]), coords.get(&window[1])) else {
                continue;
            };

            let a = *indices
                .entry(window[0])
                .or_insert_with(|| graph.add_node(window[0], lat1, lon1));
            let b = *indices
                .entry(window[1])
                .or_insert_with(|| graph.add_node(window[1], lat2, lon2));
            let length = haversine_distance(lat1, lon1, lat2, lon2);

            match directions {
                Directions::Forward => {
                    graph.add_edge(a, b, length)?;
                }
                Directions::Backward => {
                    graph.add_edge(b, a, length)?;
                }
                Directions::Both => graph.add_two_way_edge(a, b, length)?,
            }
        }
        way_count += 1;
    }

    if graph.is_empty() {
        warn!("Overpass response contained no usable ways");
    }
    info!(
        "Built street graph with {} nodes and {} edges from {} ways",
        graph.node_count(),
        graph.edge_count(),
        way_count
    );
    Ok(graph)
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    display_name: String,
    /// south, north, west, east
    boundingbox: Vec<String>,
}

impl NominatimPlace {
    fn bounding_box(&self) -> Result<BoundingBox> {
        let values: Vec<f64> = self
            .boundingbox
            .iter()
            .map(|v| v.parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| TourError::NetworkFetch(format!("invalid bounding box: {}", e)))?;

        match values[..] {
            [south, north, west, east] => Ok(BoundingBox::new(south, west, north, east)),
            _ => Err(TourError::NetworkFetch(format!(
                "invalid bounding box {:?}",
                self.boundingbox
            ))),
        }
    }
}

/// Overpass API JSON response.
#[derive(Debug, Clone, Deserialize)]
pub struct OverpassResponse {
    pub elements: Vec<OsmElement>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsmElement {
    #[serde(rename = "type")]
    pub elem_type: String,
    pub id: i64,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub nodes: Option<Vec<i64>>,
    pub tags: Option<OsmTags>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsmTags {
    pub highway: Option<String>,
    pub oneway: Option<String>,
    pub junction: Option<String>,
}
