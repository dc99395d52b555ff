//! Visualization utilities for tour solutions.
//!
//! Renders the route on an interactive Leaflet map (HTML), draws it over the
//! street network as SVG, and exports plain data for external plotting.

use crate::error::{Result, TourError};
use crate::graph::StreetGraph;
use crate::instance::TourInstance;
use crate::matrix::DistanceMatrixBuilder;
use crate::solution::Solution;
use log::info;
use petgraph::graph::NodeIndex;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
#[cfg(not(feature = "resvg"))]
use std::process::Command;
#[cfg(feature = "resvg")]
use resvg::render;
#[cfg(feature = "resvg")]
use resvg::tiny_skia::{Pixmap, Transform};
#[cfg(feature = "resvg")]
use resvg::usvg;
#[cfg(feature = "resvg")]
use resvg::usvg::TreeParsing;
#[cfg(feature = "resvg")]
use resvg::FitTo;

const MAP_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8"/>
<title>__TITLE__</title>
<meta name="viewport" content="width=device-width, initial-scale=1.0"/>
<link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css"/>
<script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
<style>
    html, body, #map { height: 100%; margin: 0; }
    .stop { font-size: 12pt; color: white; background: __COLOR__; border-radius: 50%;
            width: 28px; height: 28px; text-align: center; line-height: 28px; }
    .footer { position: absolute; bottom: 4px; left: 8px; z-index: 1000;
              font-family: Arial; font-size: 11px; background: rgba(255,255,255,0.8); padding: 2px 6px; }
</style>
</head>
<body>
<div id="map"></div>
<div class="footer">__FOOTER__</div>
<script>
const data = __DATA__;
const map = L.map('map').setView(data.center, data.zoom);
L.tileLayer('https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png', {
    maxZoom: 19,
    attribution: '&copy; OpenStreetMap contributors'
}).addTo(map);
data.legs.forEach(function (leg) {
    L.polyline(leg, {color: data.color, weight: data.weight}).addTo(map);
});
data.stops.forEach(function (stop) {
    const icon = L.divIcon({
        className: '',
        html: '<div class="stop">' + stop.order + '</div>',
        iconSize: [28, 28],
        iconAnchor: [14, 14]
    });
    L.marker([stop.lat, stop.lon], {icon: icon}).bindPopup(stop.popup).addTo(map);
});
</script>
</body>
</html>
"#;

/// Data embedded in the HTML map
#[derive(Debug, Serialize)]
struct MapData {
    center: [f64; 2],
    zoom: u8,
    color: String,
    weight: f64,
    legs: Vec<Vec<[f64; 2]>>,
    stops: Vec<MapStop>,
}

#[derive(Debug, Serialize)]
struct MapStop {
    order: usize,
    lat: f64,
    lon: f64,
    popup: String,
}

/// Map and SVG rendering of routes
pub struct Visualizer {
    /// Canvas width
    pub width: f64,
    /// Canvas height
    pub height: f64,
    /// Margin
    pub margin: f64,
    /// Node radius
    pub node_radius: f64,
    /// Initial zoom level of the HTML map
    pub zoom_start: u8,
    /// Route line color
    pub route_color: String,
    /// Route line weight in pixels
    pub route_weight: f64,
}

impl Default for Visualizer {
    fn default() -> Self {
        Visualizer {
            width: 800.0,
            height: 800.0,
            margin: 50.0,
            node_radius: 10.0,
            zoom_start: 14,
            route_color: "blue".to_string(),
            route_weight: 3.0,
        }
    }
}

impl Visualizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render the route to an HTML map at `path`.
    ///
    /// Locations are snapped to the street graph again to draw the street
    /// path of every leg.
    pub fn plot_route<P: AsRef<Path>>(
        &self,
        graph: &StreetGraph,
        instance: &TourInstance,
        solution: &Solution,
        path: P,
    ) -> Result<PathBuf> {
        if instance.locations.is_empty() {
            return Err(TourError::InvalidInput(
                "cannot draw a route without location coordinates".to_string(),
            ));
        }
        let nodes = DistanceMatrixBuilder::new(graph).resolve_nodes(&instance.locations)?;
        let html = self.generate_html(graph, &nodes, instance, solution)?;

        let path = path.as_ref();
        let mut file = File::create(path)?;
        file.write_all(html.as_bytes())?;
        info!("Map saved to {:?}", path);
        Ok(path.to_path_buf())
    }

    /// Generate the HTML map of a solution
    pub fn generate_html(
        &self,
        graph: &StreetGraph,
        nodes: &[NodeIndex],
        instance: &TourInstance,
        solution: &Solution,
    ) -> Result<String> {
        let stops = stop_coordinates(graph, nodes, instance);
        let center = instance
            .centroid()
            .or_else(|| mean_coordinate(&stops))
            .unwrap_or((0.0, 0.0));

        let legs = route_legs(graph, nodes, &solution.route())?
            .into_iter()
            .map(|leg| leg.into_iter().map(|(lat, lon)| [lat, lon]).collect())
            .collect();

        let markers = solution
            .tour
            .iter()
            .enumerate()
            .filter_map(|(order, &index)| {
                stops.get(index).map(|&(lat, lon)| MapStop {
                    order: order + 1,
                    lat,
                    lon,
                    popup: match instance.locations.get(index) {
                        Some(location) => {
                            format!("Stop {}: {}", order + 1, escape_html(&location.label(index)))
                        }
                        None => format!("Stop {}", order + 1),
                    },
                })
            })
            .collect();

        let data = MapData {
            center: [center.0, center.1],
            zoom: self.zoom_start,
            color: self.route_color.clone(),
            weight: self.route_weight,
            legs,
            stops: markers,
        };
        // Keep the embedded JSON from closing the script element
        let json = serde_json::to_string(&data)?.replace("</", "<\\/");

        let footer = format!(
            "{} | {} | {} m | generated {}",
            escape_html(&instance.name),
            escape_html(&solution.algorithm),
            solution.cost,
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        );

        Ok(MAP_TEMPLATE
            .replace("__TITLE__", &escape_html(&instance.name))
            .replace("__COLOR__", &escape_html(&self.route_color))
            .replace("__FOOTER__", &footer)
            .replace("__DATA__", &json))
    }

    /// Generate SVG of the route drawn over the street network
    pub fn generate_svg(
        &self,
        graph: &StreetGraph,
        nodes: &[NodeIndex],
        instance: &TourInstance,
        solution: &Solution,
    ) -> Result<String> {
        let stops = stop_coordinates(graph, nodes, instance);
        let legs = route_legs(graph, nodes, &solution.route())?;

        let (min_lat, max_lat, min_lon, max_lon) = self.get_bounds(graph, &stops);
        // Equirectangular projection around the middle latitude
        let lon_factor = ((min_lat + max_lat) / 2.0).to_radians().cos();
        let span_x = ((max_lon - min_lon) * lon_factor).max(1e-9);
        let span_y = (max_lat - min_lat).max(1e-9);
        let scale = ((self.width - 2.0 * self.margin) / span_x).min((self.height - 2.0 * self.margin) / span_y);

        let transform = |lat: f64, lon: f64| -> (f64, f64) {
            let x = self.margin + (lon - min_lon) * lon_factor * scale;
            let y = self.height - self.margin - (lat - min_lat) * scale;
            (x, y)
        };

        let mut svg = String::new();
        svg.push_str(&format!(
            r##"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}" viewBox="0 0 {} {}">
<style>
    .street {{ stroke: #bdc3c7; stroke-width: 1; fill: none; }}
    .route {{ stroke: {}; stroke-width: {}; fill: none; stroke-linejoin: round; }}
    .stop {{ fill: {}; stroke: #ffffff; stroke-width: 2; }}
    .origin {{ fill: #e74c3c; stroke: #ffffff; stroke-width: 2; }}
    .label {{ font-family: Arial; font-size: 10px; fill: #ffffff; font-weight: bold; }}
    .title {{ font-family: Arial; font-size: 14px; fill: #2c3e50; font-weight: bold; }}
</style>
<rect width="100%" height="100%" fill="#ecf0f1"/>
"##,
            self.width,
            self.height,
            self.width,
            self.height,
            escape_html(&self.route_color),
            self.route_weight,
            escape_html(&self.route_color)
        ));

        svg.push_str(&format!(
            r##"<text x="{}" y="25" class="title">{} | {} | {} m</text>
"##,
            self.margin,
            escape_html(&instance.name),
            escape_html(&solution.algorithm),
            solution.cost
        ));

        for (from, to, _) in graph.edges() {
            if let (Some(a), Some(b)) = (graph.node(from), graph.node(to)) {
                let (x1, y1) = transform(a.lat, a.lon);
                let (x2, y2) = transform(b.lat, b.lon);
                svg.push_str(&format!(
                    r#"<line x1="{:.2}" y1="{:.2}" x2="{:.2}" y2="{:.2}" class="street"/>
"#,
                    x1, y1, x2, y2
                ));
            }
        }

        for leg in &legs {
            let points: Vec<String> = leg
                .iter()
                .map(|&(lat, lon)| {
                    let (x, y) = transform(lat, lon);
                    format!("{:.2},{:.2}", x, y)
                })
                .collect();
            svg.push_str(&format!(
                r#"<polyline points="{}" class="route"/>
"#,
                points.join(" ")
            ));
        }

        for (order, &index) in solution.tour.iter().enumerate() {
            let Some(&(lat, lon)) = stops.get(index) else {
                continue;
            };
            let (x, y) = transform(lat, lon);
            let class = if order == 0 { "origin" } else { "stop" };

            svg.push_str(&format!(
                r##"<circle cx="{:.2}" cy="{:.2}" r="{}" class="{}"/>
"##,
                x, y, self.node_radius, class
            ));
            svg.push_str(&format!(
                r##"<text x="{:.2}" y="{:.2}" class="label" text-anchor="middle">{}</text>
"##,
                x,
                y + 3.5,
                order + 1
            ));
        }

        svg.push_str("</svg>");
        Ok(svg)
    }

    /// Save SVG to file
    pub fn save_svg<P: AsRef<Path>>(&self, svg: &str, path: P) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(svg.as_bytes())?;
        Ok(())
    }

    /// Save SVG as PNG.
    ///
    /// Uses the native renderer when built with the `resvg` feature, and
    /// otherwise tries `rsvg-convert`, then `magick convert`, then `inkscape`.
    pub fn save_png<P: AsRef<Path>>(&self, svg: &str, path: P) -> Result<()> {
        rasterize(svg, path.as_ref(), self.width as u32, self.height as u32)
    }

    /// Get coordinate bounds (min_lat, max_lat, min_lon, max_lon)
    fn get_bounds(&self, graph: &StreetGraph, stops: &[(f64, f64)]) -> (f64, f64, f64, f64) {
        let mut bounds = graph.bounds().unwrap_or((
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::INFINITY,
            f64::NEG_INFINITY,
        ));

        for &(lat, lon) in stops {
            bounds.0 = bounds.0.min(lat);
            bounds.1 = bounds.1.max(lat);
            bounds.2 = bounds.2.min(lon);
            bounds.3 = bounds.3.max(lon);
        }

        if !bounds.0.is_finite() {
            return (0.0, 0.0, 0.0, 0.0);
        }
        bounds
    }

    /// Export data for external plotting (e.g., matplotlib)
    pub fn export_plot_data(&self, instance: &TourInstance, solution: &Solution) -> String {
        let mut data = String::new();

        data.push_str("# Tour Solution Data\n");
        data.push_str(&format!("# Instance: {}\n", instance.name));
        data.push_str(&format!("# Algorithm: {}\n", solution.algorithm));
        data.push_str(&format!("# Distance: {} m\n", solution.cost));
        data.push_str(&format!("# Closed: {}\n\n", solution.closed));

        data.push_str("# Locations: index, name, lat, lon\n");
        for (i, location) in instance.locations.iter().enumerate() {
            data.push_str(&format!("{},{},{},{}\n", i, location.label(i), location.lat, location.lon));
        }

        data.push_str("\n# Route: sequence of location indices\n");
        let route_str: Vec<String> = solution.route().iter().map(|n| n.to_string()).collect();
        data.push_str(&route_str.join(","));
        data.push('\n');

        data.push_str("\n# Leg distances (m)\n");
        let legs: Vec<String> = solution
            .route()
            .windows(2)
            .map(|w| instance.distance(w[0], w[1]).to_string())
            .collect();
        data.push_str(&legs.join(","));
        data.push('\n');

        data
    }
}

/// Street geometry (lat, lon) of every leg of `route`, following the
/// shortest path between the nodes the locations were snapped to.
pub fn route_legs(graph: &StreetGraph, nodes: &[NodeIndex], route: &[usize]) -> Result<Vec<Vec<(f64, f64)>>> {
    route
        .windows(2)
        .map(|w| {
            let (from, to) = (w[0], w[1]);
            let (source, target) = match (nodes.get(from), nodes.get(to)) {
                (Some(&s), Some(&t)) => (s, t),
                _ => {
                    return Err(TourError::InvalidInput(format!(
                        "route index out of range for {} mapped locations",
                        nodes.len()
                    )))
                }
            };
            let (_, path) = graph
                .shortest_path(source, target)
                .ok_or(TourError::Unreachable { from, to })?;
            Ok(graph.path_coordinates(&path))
        })
        .collect()
}

/// Coordinates of every location, falling back to the snapped graph node
/// when the instance has no coordinates.
fn stop_coordinates(graph: &StreetGraph, nodes: &[NodeIndex], instance: &TourInstance) -> Vec<(f64, f64)> {
    if !instance.locations.is_empty() {
        return instance.locations.iter().map(|l| (l.lat, l.lon)).collect();
    }
    nodes
        .iter()
        .filter_map(|&n| graph.node(n).map(|node| (node.lat, node.lon)))
        .collect()
}

fn mean_coordinate(points: &[(f64, f64)]) -> Option<(f64, f64)> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    Some((
        points.iter().map(|p| p.0).sum::<f64>() / n,
        points.iter().map(|p| p.1).sum::<f64>() / n,
    ))
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(feature = "resvg")]
fn rasterize(svg: &str, path: &Path, width: u32, height: u32) -> Result<()> {
    let to_io = |msg: String| TourError::Io(std::io::Error::new(std::io::ErrorKind::Other, msg));

    let opt = usvg::Options::default();
    let rtree = usvg::Tree::from_str(svg, &opt).map_err(|e| to_io(format!("usvg parse error: {}", e)))?;
    let mut pixmap = Pixmap::new(width.max(1), height.max(1)).ok_or_else(|| to_io("Failed to create pixmap".to_string()))?;
    render(&rtree, FitTo::Original, Transform::default(), pixmap.as_mut())
        .ok_or_else(|| to_io("resvg render failed".to_string()))?;
    pixmap
        .save_png(path)
        .map_err(|e| to_io(format!("save_png failed: {}", e)))?;
    Ok(())
}

#[cfg(not(feature = "resvg"))]
fn rasterize(svg: &str, path: &Path, _width: u32, _height: u32) -> Result<()> {
    let tmp_svg = path.with_extension("svg.tmp");
    std::fs::write(&tmp_svg, svg)?;

    let out = path.to_string_lossy().into_owned();
    let input = tmp_svg.to_string_lossy().into_owned();
    let converters: [(&str, Vec<&str>); 3] = [
        ("rsvg-convert", vec!["-o", out.as_str(), input.as_str()]),
        ("magick", vec!["convert", input.as_str(), out.as_str()]),
        ("inkscape", vec![input.as_str(), "--export-type=png", "--export-filename", out.as_str()]),
    ];

    for (program, args) in &converters {
        if let Ok(status) = Command::new(program).args(args).status() {
            if status.success() {
                let _ = std::fs::remove_file(&tmp_svg);
                return Ok(());
            }
        }
    }

    let _ = std::fs::remove_file(&tmp_svg);
    Err(TourError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        "No SVG->PNG converter succeeded (tried rsvg-convert, magick, inkscape)",
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::Location;
    use crate::matrix::DistanceMatrix;
    use tempfile::TempDir;

    /// Three intersections on a street, plus an unreachable one
    fn create_test_graph() -> StreetGraph {
        let mut graph = StreetGraph::new();
        let a = graph.add_node(1, 48.8580, 2.2940);
        let b = graph.add_node(2, 48.8580, 2.2950);
        let c = graph.add_node(3, 48.8580, 2.2960);
        graph.add_node(4, 48.8700, 2.3100);
        graph.add_two_way_edge(a, b, 73.0).unwrap();
        graph.add_two_way_edge(b, c, 73.0).unwrap();
        graph
    }

    fn create_test_instance() -> TourInstance {
        let locations = vec![
            Location::named("Start", 48.8580, 2.2940),
            Location::named("Café <Centre>", 48.8581, 2.2950),
            Location::new(48.8580, 2.2961),
        ];
        let matrix = DistanceMatrix::from_rows(vec![vec![0, 73, 146], vec![73, 0, 73], vec![146, 73, 0]]).unwrap();
        TourInstance::new("Test walk", locations, matrix).unwrap()
    }

    fn create_test_solution(instance: &TourInstance) -> Solution {
        Solution::from_tour(instance, vec![0, 1, 2], "test")
    }

    #[test]
    fn test_route_legs_follow_streets() {
        let graph = create_test_graph();
        let nodes = vec![NodeIndex::new(0), NodeIndex::new(1), NodeIndex::new(2)];

        let legs = route_legs(&graph, &nodes, &[0, 2, 0]).unwrap();
        assert_eq!(legs.len(), 2);
        assert_eq!(legs[0].len(), 3);
        assert_eq!(legs[0][0], (48.8580, 2.2940));
        assert_eq!(legs[0][2], (48.8580, 2.2960));
    }

    #[test]
    fn test_route_legs_unreachable() {
        let graph = create_test_graph();
        let nodes = vec![NodeIndex::new(0), NodeIndex::new(3)];
        assert!(matches!(
            route_legs(&graph, &nodes, &[0, 1]),
            Err(TourError::Unreachable { from: 0, to: 1 })
        ));
    }

    #[test]
    fn test_html_map() {
        let graph = create_test_graph();
        let instance = create_test_instance();
        let solution = create_test_solution(&instance);
        let nodes = DistanceMatrixBuilder::new(&graph).resolve_nodes(&instance.locations).unwrap();

        let html = Visualizer::new().generate_html(&graph, &nodes, &instance, &solution).unwrap();

        assert!(html.contains("<title>Test walk</title>"));
        assert!(html.contains(r#""zoom":14"#));
        assert!(html.contains(r#""color":"blue","weight":3.0"#));
        assert!(html.contains("Stop 1: Start"));
        assert!(html.contains("Stop 3: Location 2"));
        // The closing return to the origin gets no marker of its own
        assert!(!html.contains("Stop 4"));
        assert!(html.contains("Café &lt;Centre&gt;"));
        assert_eq!(html.matches("</script>").count(), 2);
    }

    #[test]
    fn test_plot_route_writes_file() {
        let dir = TempDir::new().unwrap();
        let graph = create_test_graph();
        let instance = create_test_instance();
        let solution = create_test_solution(&instance);

        let path = Visualizer::new()
            .plot_route(&graph, &instance, &solution, dir.path().join("route.html"))
            .unwrap();
        let html = std::fs::read_to_string(&path).unwrap();
        assert!(html.contains("L.polyline"));
    }

    #[test]
    fn test_plot_route_without_locations() {
        let graph = create_test_graph();
        let instance = TourInstance::from_matrix(DistanceMatrix::constant(2, 5), 0, true).unwrap();
        let solution = Solution::from_tour(&instance, vec![0, 1], "test");
        assert!(matches!(
            Visualizer::new().plot_route(&graph, &instance, &solution, "unused.html"),
            Err(TourError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_svg() {
        let graph = create_test_graph();
        let instance = create_test_instance();
        let solution = create_test_solution(&instance);
        let nodes = DistanceMatrixBuilder::new(&graph).resolve_nodes(&instance.locations).unwrap();

        let svg = Visualizer::new().generate_svg(&graph, &nodes, &instance, &solution).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert_eq!(svg.matches("<circle").count(), 3);
        assert_eq!(svg.matches("class=\"street\"").count(), 4);
        assert_eq!(svg.matches("<polyline").count(), 3);
    }

    #[test]
    fn test_export_plot_data() {
        let instance = create_test_instance();
        let solution = create_test_solution(&instance);
        let data = Visualizer::new().export_plot_data(&instance, &solution);

        assert!(data.contains("# Distance: 292 m"));
        assert!(data.contains("0,1,2,0\n"));
        assert!(data.contains("73,73,146\n"));
    }
}
