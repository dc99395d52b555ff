//! Tourist Route Optimizer - Command Line Interface
//!
//! Plans a walking tour through a set of locations over a city's street network.

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tourist_route_optimizer::benchmark::{Benchmark, BenchmarkConfig, StrategyCombination};
use tourist_route_optimizer::config::TourConfig;
use tourist_route_optimizer::graph::StreetGraph;
use tourist_route_optimizer::instance::{Location, TourInstance};
use tourist_route_optimizer::matrix::{BuiltMatrix, DistanceMatrixBuilder};
use tourist_route_optimizer::provider::{FileGraphProvider, GraphProvider, NetworkType, OverpassProvider};
use tourist_route_optimizer::solver::{FirstSolutionStrategy, LocalSearchStrategy, RouteSolver};
use tourist_route_optimizer::termination::CancellationToken;
use tourist_route_optimizer::visualization::Visualizer;
use tourist_route_optimizer::{Result, TourError};

use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tourist-route-optimizer")]
#[command(version)]
#[command(about = "Plans the shortest walking tour through a set of locations")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Where the street network and the locations come from
#[derive(Args)]
struct SourceArgs {
    /// Place whose street network is downloaded, e.g. "Paris, France"
    place: Option<String>,

    /// Street graph JSON file used instead of downloading
    #[arg(short, long)]
    graph: Option<PathBuf>,

    /// CSV file with name,lat,lon columns
    #[arg(short, long)]
    locations: Option<PathBuf>,

    /// Additional location as "lat,lon" (repeatable)
    #[arg(long = "at", value_name = "LAT,LON")]
    at: Vec<Location>,

    /// JSON tour configuration; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Street network type
    #[arg(long, value_enum)]
    network: Option<NetworkType>,

    /// Directory for downloaded street networks
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Always download the street network
    #[arg(long)]
    no_cache: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute a tour and render it as an HTML map
    Solve {
        #[command(flatten)]
        source: SourceArgs,

        /// First-solution strategy
        #[arg(long, value_enum)]
        strategy: Option<FirstSolutionStrategy>,

        /// Local search applied after construction
        #[arg(long, value_enum)]
        local_search: Option<LocalSearchStrategy>,

        /// Time limit in seconds
        #[arg(short, long)]
        time_limit: Option<f64>,

        /// Random seed
        #[arg(short, long)]
        seed: Option<u64>,

        /// Index of the origin location
        #[arg(long)]
        start: Option<usize>,

        /// End at the last stop instead of returning to the origin
        #[arg(long)]
        open: bool,

        /// HTML map output
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also write an SVG drawing of the route
        #[arg(long)]
        svg: Option<PathBuf>,

        /// Also write a PNG drawing of the route
        #[arg(long)]
        png: Option<PathBuf>,

        /// Write the solution as JSON
        #[arg(long)]
        json: Option<PathBuf>,

        /// Write locations, route and leg distances for external plotting
        #[arg(long)]
        plot_data: Option<PathBuf>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print the walking distance matrix between the locations
    Matrix {
        #[command(flatten)]
        source: SourceArgs,

        /// Write the matrix as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Compare strategy combinations on the same locations
    Compare {
        #[command(flatten)]
        source: SourceArgs,

        /// Number of seeds for the stochastic searches
        #[arg(short, long, default_value = "5")]
        runs: usize,

        /// Time limit per run in seconds
        #[arg(short, long, default_value = "10")]
        time_limit: f64,

        /// Try every strategy combination
        #[arg(long)]
        all: bool,

        /// Output directory for CSV results and the report
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Solve {
            source,
            strategy,
            local_search,
            time_limit,
            seed,
            start,
            open,
            output,
            svg,
            png,
            json,
            plot_data,
            verbose,
        } => load_config(&source).and_then(|mut config| {
            let solver = &mut config.solver;
            if let Some(strategy) = strategy {
                solver.first_solution_strategy = strategy;
            }
            if let Some(local_search) = local_search {
                solver.local_search = local_search;
            }
            if time_limit.is_some() {
                solver.time_limit_secs = time_limit;
            }
            if let Some(seed) = seed {
                solver.seed = seed;
            }
            if let Some(start) = start {
                solver.start = start;
            }
            if open {
                solver.close_loop = false;
            }
            if let Some(output) = output {
                config.output = output;
            }
            solve_tour(&config, Exports { svg, png, json, plot_data }, verbose)
        }),

        Commands::Matrix { source, csv } => load_config(&source).and_then(|config| print_matrix(&config, csv)),

        Commands::Compare {
            source,
            runs,
            time_limit,
            all,
            output,
        } => load_config(&source).and_then(|config| compare_strategies(&config, runs, time_limit, all, output)),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Merges the configuration file with the command line flags.
fn load_config(source: &SourceArgs) -> Result<TourConfig> {
    let mut config = match &source.config {
        Some(path) => TourConfig::from_file(path)?,
        None => TourConfig::default(),
    };

    if source.place.is_some() {
        config.place = source.place.clone();
    }
    if source.graph.is_some() {
        config.graph_file = source.graph.clone();
    }
    if source.locations.is_some() || !source.at.is_empty() {
        let mut locations = match &source.locations {
            Some(path) => Location::load_csv(path)?,
            None => Vec::new(),
        };
        locations.extend(source.at.iter().cloned());
        config.locations = locations;
    }
    if let Some(network) = source.network {
        config.network_type = network;
    }
    if source.cache_dir.is_some() {
        config.cache_dir = source.cache_dir.clone();
    }
    if source.no_cache {
        config.cache_dir = None;
    }

    config.validate()?;
    Ok(config)
}

fn load_graph(config: &TourConfig) -> Result<StreetGraph> {
    let place = config.title();
    let graph = match &config.graph_file {
        Some(path) => FileGraphProvider::new(path).load_graph(&place)?,
        None => {
            println!("Loading {} network for {}...", config.network_type.as_str(), place);
            OverpassProvider::new(config.network_type)
                .with_cache_dir(config.cache_dir.clone())
                .load_graph(&place)?
        }
    };
    println!(
        "Street network: {} nodes, {} edges",
        graph.node_count(),
        graph.edge_count()
    );
    Ok(graph)
}

/// Builds the distance matrix with a progress bar and wraps it in an instance.
fn build_instance(graph: &StreetGraph, config: &TourConfig) -> Result<(TourInstance, BuiltMatrix)> {
    let n = config.locations.len();
    let progress = ProgressBar::new(n as u64);
    progress.set_style(
        ProgressStyle::with_template("Distance matrix [{bar:40}] {pos}/{len} rows")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let built = DistanceMatrixBuilder::new(graph)
        .build_with_progress(&config.locations, |done, _| progress.set_position(done as u64));
    progress.finish_and_clear();
    let built = built?;

    let instance = TourInstance::new(&config.title(), config.locations.clone(), built.matrix.clone())?
        .with_route_shape(config.solver.start, config.solver.close_loop);
    Ok((instance, built))
}

/// Optional files written next to the HTML map
struct Exports {
    svg: Option<PathBuf>,
    png: Option<PathBuf>,
    json: Option<PathBuf>,
    plot_data: Option<PathBuf>,
}

fn solve_tour(config: &TourConfig, exports: Exports, verbose: bool) -> Result<()> {
    let graph = load_graph(config)?;
    let (instance, built) = build_instance(&graph, config)?;

    if verbose {
        println!("{}", instance.statistics());
    }

    println!(
        "Solving with {:?} + {:?}...",
        config.solver.first_solution_strategy, config.solver.local_search
    );
    let solver = RouteSolver::new(config.solver.clone());
    let solution = solver.solve_instance(&instance, &CancellationToken::new())?;

    println!("\n========== Tour ==========");
    for (order, &stop) in solution.tour.iter().enumerate() {
        println!("  {:>2}. {}", order + 1, instance.locations[stop].label(stop));
    }
    if solution.closed && solution.tour.len() > 1 {
        println!("      back to {}", instance.locations[solution.tour[0]].label(solution.tour[0]));
    }
    println!("Total distance: {} m", solution.cost);
    println!("Algorithm: {}", solution.algorithm);
    println!("Time: {:.4}s", solution.computation_time);
    if let Some(iter) = solution.iterations {
        println!("Iterations: {}", iter);
    }
    if verbose {
        println!("\nRoute: {:?}", solution.route());
    }

    let viz = Visualizer::new();
    let map = viz.plot_route(&graph, &instance, &solution, &config.output)?;
    println!("\nMap saved to {:?}", map);

    if exports.svg.is_some() || exports.png.is_some() {
        let drawing = viz.generate_svg(&graph, &built.nodes, &instance, &solution)?;
        if let Some(path) = exports.svg {
            viz.save_svg(&drawing, &path)?;
            println!("SVG saved to {:?}", path);
        }
        if let Some(path) = exports.png {
            match viz.save_png(&drawing, &path) {
                Ok(()) => println!("PNG saved to {:?}", path),
                Err(e) => {
                    let fallback = path.with_extension("svg");
                    viz.save_svg(&drawing, &fallback)?;
                    println!("PNG conversion failed ({}). Saved SVG to {:?}", e, fallback);
                }
            }
        }
    }

    if let Some(path) = exports.json {
        std::fs::write(&path, serde_json::to_string_pretty(&solution)?)?;
        println!("Solution saved to {:?}", path);
    }

    if let Some(path) = exports.plot_data {
        std::fs::write(&path, viz.export_plot_data(&instance, &solution))?;
        println!("Plot data saved to {:?}", path);
    }

    Ok(())
}

fn print_matrix(config: &TourConfig, csv: Option<PathBuf>) -> Result<()> {
    let graph = load_graph(config)?;
    let (instance, _) = build_instance(&graph, config)?;

    println!();
    for (i, location) in instance.locations.iter().enumerate() {
        println!("  [{}] {}", i, location.label(i));
    }
    println!("\n{}", instance.distance_matrix);
    if !instance.distance_matrix.is_symmetric() {
        println!("Note: the matrix is asymmetric (one-way streets)");
    }

    if let Some(path) = csv {
        instance.distance_matrix.write_csv(std::fs::File::create(&path)?)?;
        println!("Matrix exported to {:?}", path);
    }
    Ok(())
}

fn compare_strategies(
    config: &TourConfig,
    runs: usize,
    time_limit: f64,
    all: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    if runs == 0 {
        return Err(TourError::InvalidInput("at least one run is required".to_string()));
    }

    let graph = load_graph(config)?;
    let (instance, _) = build_instance(&graph, config)?;

    let mut benchmark_config = BenchmarkConfig {
        num_runs: runs,
        base_seed: config.solver.seed,
        time_limit: Some(time_limit),
        max_iterations: config.solver.max_iterations,
        ..BenchmarkConfig::default()
    };
    if all {
        benchmark_config.combinations = StrategyCombination::all();
    }

    println!(
        "Comparing {} strategy combinations on {} (n={})...",
        benchmark_config.combinations.len(),
        instance.name,
        instance.dimension()
    );

    let mut benchmark = Benchmark::new(benchmark_config);
    benchmark.run_on_instance(&instance)?;

    let report = benchmark.generate_report();
    println!("\n{}", report);

    if let Some(dir) = output {
        std::fs::create_dir_all(&dir)?;

        let results_path = dir.join("results.csv");
        benchmark.export_to_csv(&results_path)?;
        println!("Results exported to {:?}", results_path);

        let stats_path = dir.join("statistics.csv");
        benchmark.export_statistics_csv(&stats_path)?;
        println!("Statistics exported to {:?}", stats_path);

        let report_path = dir.join("report.txt");
        std::fs::write(&report_path, &report)?;
        println!("Report saved to {:?}", report_path);
    }
    Ok(())
}
