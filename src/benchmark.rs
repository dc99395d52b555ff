//! Benchmarking and comparison of solver strategies.
//!
//! Runs combinations of first-solution and local-search strategies over
//! several seeds, collects statistics and compares their tour lengths.

use crate::error::Result;
use crate::instance::TourInstance;
use crate::solver::{FirstSolutionStrategy, LocalSearchStrategy, RouteSolver, SolverConfig};
use crate::termination::CancellationToken;

use log::info;
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

/// A first-solution strategy paired with a local search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyCombination {
    pub first_solution: FirstSolutionStrategy,
    pub local_search: LocalSearchStrategy,
}

impl StrategyCombination {
    pub fn new(first_solution: FirstSolutionStrategy, local_search: LocalSearchStrategy) -> Self {
        StrategyCombination {
            first_solution,
            local_search,
        }
    }

    /// Every first-solution strategy with every local search
    pub fn all() -> Vec<Self> {
        let firsts = [
            FirstSolutionStrategy::PathCheapestArc,
            FirstSolutionStrategy::NearestNeighbor,
            FirstSolutionStrategy::CheapestInsertion,
            FirstSolutionStrategy::FarthestInsertion,
            FirstSolutionStrategy::MultiStart,
        ];
        let searches = [
            LocalSearchStrategy::None,
            LocalSearchStrategy::TwoOpt,
            LocalSearchStrategy::OrOpt,
            LocalSearchStrategy::Vnd,
            LocalSearchStrategy::SimulatedAnnealing,
            LocalSearchStrategy::IteratedLocalSearch,
        ];
        firsts
            .iter()
            .flat_map(|&f| searches.iter().map(move |&l| Self::new(f, l)))
            .collect()
    }

    /// Only the stochastic local searches depend on the seed
    pub fn is_stochastic(&self) -> bool {
        matches!(
            self.local_search,
            LocalSearchStrategy::SimulatedAnnealing | LocalSearchStrategy::IteratedLocalSearch
        )
    }

    pub fn name(&self) -> String {
        format!("{:?}+{:?}", self.first_solution, self.local_search)
    }
}

/// Result of running a single strategy combination on an instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgorithmResult {
    /// Strategy combination name
    pub algorithm: String,
    /// Instance name
    pub instance: String,
    /// Number of locations
    pub dimension: usize,
    pub seed: u64,
    /// Tour length in meters
    pub cost: u64,
    /// Whether every location was visited
    pub complete: bool,
    /// Computation time in seconds
    pub time: f64,
    /// Number of iterations (if applicable)
    pub iterations: Option<usize>,
    /// Gap to the best tour found on this instance, in percent
    pub gap_to_best: Option<f64>,
}

/// Aggregated statistics for a strategy combination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgorithmStatistics {
    pub algorithm: String,
    /// Number of runs
    pub num_runs: usize,
    pub avg_cost: f64,
    pub best_cost: f64,
    pub worst_cost: f64,
    /// Population standard deviation of the cost
    pub std_cost: f64,
    pub avg_time: f64,
    pub total_time: f64,
    pub avg_gap: Option<f64>,
}

/// Benchmark configuration
#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    /// Number of seeds per stochastic combination
    pub num_runs: usize,
    /// First seed; run `k` uses `base_seed + k`
    pub base_seed: u64,
    /// Time limit per run in seconds
    pub time_limit: Option<f64>,
    /// Iteration budget per run
    pub max_iterations: Option<usize>,
    /// Run in parallel
    pub parallel: bool,
    pub combinations: Vec<StrategyCombination>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        use FirstSolutionStrategy as F;
        use LocalSearchStrategy as L;

        BenchmarkConfig {
            num_runs: 5,
            base_seed: 42,
            time_limit: Some(10.0),
            max_iterations: None,
            parallel: true,
            combinations: vec![
                StrategyCombination::new(F::PathCheapestArc, L::None),
                StrategyCombination::new(F::PathCheapestArc, L::TwoOpt),
                StrategyCombination::new(F::PathCheapestArc, L::Vnd),
                StrategyCombination::new(F::CheapestInsertion, L::Vnd),
                StrategyCombination::new(F::FarthestInsertion, L::Vnd),
                StrategyCombination::new(F::MultiStart, L::SimulatedAnnealing),
                StrategyCombination::new(F::MultiStart, L::IteratedLocalSearch),
            ],
        }
    }
}

/// Benchmarking engine
pub struct Benchmark {
    config: BenchmarkConfig,
    results: Vec<AlgorithmResult>,
    best_known: HashMap<String, u64>,
}

impl Benchmark {
    pub fn new(config: BenchmarkConfig) -> Self {
        Benchmark {
            config,
            results: Vec::new(),
            best_known: HashMap::new(),
        }
    }

    /// Run every configured combination on an instance
    pub fn run_on_instance(&mut self, instance: &TourInstance) -> Result<()> {
        let jobs: Vec<(StrategyCombination, u64)> = self
            .config
            .combinations
            .iter()
            .flat_map(|&combo| {
                let runs = if combo.is_stochastic() { self.config.num_runs.max(1) } else { 1 };
                (0..runs as u64).map(move |k| (combo, k))
            })
            .map(|(combo, k)| (combo, self.config.base_seed + k))
            .collect();

        info!("Benchmarking {} runs on {}", jobs.len(), instance.name);

        let run = |&(combo, seed): &(StrategyCombination, u64)| -> Result<AlgorithmResult> {
            let solver = RouteSolver::new(SolverConfig {
                first_solution_strategy: combo.first_solution,
                local_search: combo.local_search,
                time_limit_secs: self.config.time_limit,
                max_iterations: self.config.max_iterations,
                seed,
                start: instance.start,
                close_loop: instance.close_loop,
            });
            let solution = solver.solve_instance(instance, &CancellationToken::new())?;

            Ok(AlgorithmResult {
                algorithm: combo.name(),
                instance: instance.name.clone(),
                dimension: instance.dimension(),
                seed,
                cost: solution.cost,
                complete: solution.complete,
                time: solution.computation_time,
                iterations: solution.iterations,
                gap_to_best: None,
            })
        };

        let mut results: Vec<AlgorithmResult> = if self.config.parallel {
            jobs.par_iter().map(run).collect::<Result<_>>()?
        } else {
            jobs.iter().map(run).collect::<Result<_>>()?
        };

        if let Some(best) = results.iter().filter(|r| r.complete).map(|r| r.cost).min() {
            let best = self
                .best_known
                .get(&instance.name)
                .map_or(best, |&known| known.min(best));
            self.best_known.insert(instance.name.clone(), best);

            for result in &mut results {
                result.gap_to_best = Some(gap_percent(result.cost, best));
            }
        }

        self.results.extend(results);
        Ok(())
    }

    /// Compute statistics for each strategy combination
    pub fn compute_statistics(&self) -> Vec<AlgorithmStatistics> {
        use statrs::statistics::Statistics;

        let mut stats_map: HashMap<String, Vec<&AlgorithmResult>> = HashMap::new();

        for result in self.results.iter().filter(|r| r.complete) {
            stats_map.entry(result.algorithm.clone()).or_default().push(result);
        }

        let mut statistics: Vec<AlgorithmStatistics> = stats_map
            .into_iter()
            .map(|(algorithm, results)| {
                let costs: Vec<f64> = results.iter().map(|r| r.cost as f64).collect();
                let times: Vec<f64> = results.iter().map(|r| r.time).collect();
                let gaps: Vec<f64> = results.iter().filter_map(|r| r.gap_to_best).collect();

                AlgorithmStatistics {
                    algorithm,
                    num_runs: results.len(),
                    avg_cost: costs.iter().mean(),
                    best_cost: costs.iter().cloned().fold(f64::INFINITY, f64::min),
                    worst_cost: costs.iter().cloned().fold(0.0, f64::max),
                    std_cost: costs.iter().population_std_dev(),
                    avg_time: times.iter().mean(),
                    total_time: times.iter().sum(),
                    avg_gap: if gaps.is_empty() { None } else { Some(gaps.iter().mean()) },
                }
            })
            .collect();

        statistics.sort_by(|a, b| {
            (OrderedFloat(a.avg_cost), &a.algorithm).cmp(&(OrderedFloat(b.avg_cost), &b.algorithm))
        });
        statistics
    }

    /// Export results to CSV
    pub fn export_to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = csv::Writer::from_writer(file);

        for result in &self.results {
            writer.serialize(result)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Export statistics to CSV
    pub fn export_statistics_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = csv::Writer::from_writer(file);

        for stat in self.compute_statistics() {
            writer.serialize(stat)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Generate summary report
    pub fn generate_report(&self) -> String {
        let mut report = String::new();

        report.push_str("========================================\n");
        report.push_str("       Tour Strategy Comparison\n");
        report.push_str("========================================\n");
        report.push_str(&format!("Generated: {}\n\n", chrono::Local::now().format("%Y-%m-%d %H:%M:%S")));

        report.push_str("Strategy Performance Summary:\n");
        report.push_str("-".repeat(92).as_str());
        report.push('\n');
        report.push_str(&format!(
            "{:<40} {:>6} {:>10} {:>10} {:>9} {:>8} {:>8}\n",
            "Strategy", "Runs", "Avg (m)", "Best (m)", "Std", "Gap%", "Time"
        ));
        report.push_str("-".repeat(92).as_str());
        report.push('\n');

        for stat in self.compute_statistics() {
            let gap_str = stat
                .avg_gap
                .map(|g| format!("{:.2}%", g))
                .unwrap_or_else(|| "-".to_string());

            report.push_str(&format!(
                "{:<40} {:>6} {:>10.1} {:>10.0} {:>9.1} {:>8} {:>8.4}\n",
                stat.algorithm, stat.num_runs, stat.avg_cost, stat.best_cost, stat.std_cost, gap_str, stat.avg_time
            ));
        }

        report.push_str("-".repeat(92).as_str());
        report.push('\n');

        report.push_str("\nBest tour per instance:\n");
        let mut names: Vec<&String> = self.best_known.keys().collect();
        names.sort();
        for name in names {
            let best = self.best_known[name];
            let by = self
                .results
                .iter()
                .find(|r| &r.instance == name && r.cost == best)
                .map(|r| r.algorithm.as_str())
                .unwrap_or("-");
            report.push_str(&format!("  {}: {} m ({})\n", name, best, by));
        }

        report
    }

    /// Get all results
    pub fn results(&self) -> &[AlgorithmResult] {
        &self.results
    }

    /// Get best known values
    pub fn best_known(&self) -> &HashMap<String, u64> {
        &self.best_known
    }
}

fn gap_percent(cost: u64, best: u64) -> f64 {
    if best == 0 {
        return if cost == 0 { 0.0 } else { 100.0 };
    }
    (cost as f64 - best as f64) / best as f64 * 100.0
}
