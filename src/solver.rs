//! Route solver: first-solution construction followed by optional local search.
//!
//! ```no_run
//! use tourist_route_optimizer::matrix::DistanceMatrix;
//! use tourist_route_optimizer::solver::{RouteSolver, SolverConfig};
//!
//! let matrix = DistanceMatrix::from_rows(vec![
//!     vec![0, 5, 12],
//!     vec![5, 0, 7],
//!     vec![12, 7, 0],
//! ])?;
//! let solution = RouteSolver::new(SolverConfig::default()).solve(&matrix)?;
//! println!("{:?} ({} m)", solution.route(), solution.cost);
//! # Ok::<(), tourist_route_optimizer::TourError>(())
//! ```

use crate::error::{Result, TourError};
use crate::heuristics::construction::*;
use crate::heuristics::local_search::*;
use crate::instance::TourInstance;
use crate::matrix::DistanceMatrix;
use crate::solution::Solution;
use crate::termination::{CancellationToken, Termination};
use clap::ValueEnum;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// How the initial tour is built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FirstSolutionStrategy {
    /// Extend the path with the cheapest arc from its end
    #[default]
    PathCheapestArc,
    /// Visit the nearest unvisited location next
    NearestNeighbor,
    /// Insert the location with the cheapest insertion cost
    CheapestInsertion,
    /// Insert the location farthest from the tour
    FarthestInsertion,
    /// Best of all construction heuristics
    MultiStart,
}

/// How the initial tour is improved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LocalSearchStrategy {
    /// Keep the constructed tour
    None,
    /// 2-opt segment reversal
    TwoOpt,
    /// Or-opt segment relocation
    OrOpt,
    /// Variable neighbourhood descent over 2-opt, swap, relocation and or-opt
    #[default]
    Vnd,
    /// Simulated annealing
    SimulatedAnnealing,
    /// Iterated local search
    IteratedLocalSearch,
}

/// Solver parameters, passed explicitly at call time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub first_solution_strategy: FirstSolutionStrategy,
    pub local_search: LocalSearchStrategy,
    /// Wall-clock budget for the whole solve, in seconds
    pub time_limit_secs: Option<f64>,
    /// Iteration budget for the metaheuristics
    pub max_iterations: Option<usize>,
    /// Seed for the stochastic local searches
    pub seed: u64,
    /// Index of the origin location
    pub start: usize,
    /// Return to the origin at the end of the tour
    pub close_loop: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            first_solution_strategy: FirstSolutionStrategy::PathCheapestArc,
            local_search: LocalSearchStrategy::Vnd,
            time_limit_secs: None,
            max_iterations: None,
            seed: 42,
            start: 0,
            close_loop: true,
        }
    }
}

impl SolverConfig {
    fn time_limit(&self) -> Result<Option<Duration>> {
        self.time_limit_secs
            .map(|secs| {
                Duration::try_from_secs_f64(secs)
                    .map_err(|_| TourError::InvalidInput(format!("invalid time limit {}", secs)))
            })
            .transpose()
    }
}

/// Orders locations with a construction heuristic and an optional local search
pub struct RouteSolver {
    config: SolverConfig,
}

impl RouteSolver {
    pub fn new(config: SolverConfig) -> Self {
        RouteSolver { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Solve over a bare matrix, using the configured origin and route shape.
    pub fn solve(&self, matrix: &DistanceMatrix) -> Result<Solution> {
        self.solve_with_cancel(matrix, &CancellationToken::new())
    }

    pub fn solve_with_cancel(&self, matrix: &DistanceMatrix, token: &CancellationToken) -> Result<Solution> {
        let instance = TourInstance::from_matrix(matrix.clone(), self.config.start, self.config.close_loop)?;
        self.solve_instance(&instance, token)
    }

    /// Solve an instance using its own origin and route shape.
    pub fn solve_instance(&self, instance: &TourInstance, token: &CancellationToken) -> Result<Solution> {
        let started = Instant::now();
        let n = instance.dimension();

        if n == 0 {
            return Err(TourError::InfeasibleRoute("distance matrix is empty".to_string()));
        }
        if instance.start >= n {
            return Err(TourError::InfeasibleRoute(format!(
                "start index {} is out of range for {} locations",
                instance.start, n
            )));
        }

        let termination = Termination::new(self.config.time_limit()?, self.config.max_iterations, token.clone());
        if termination.is_terminated() {
            return Err(TourError::NoSolutionFound);
        }

        let construction = self.construction_heuristic();
        let mut solution = construction.construct(instance);
        if !solution.complete {
            return Err(TourError::NoSolutionFound);
        }
        debug!("{} built a {} m tour", construction.name(), solution.cost);

        if let Some(local_search) = self.local_search() {
            let constructed_cost = solution.cost;
            local_search.improve(instance, &mut solution, &termination);
            debug!(
                "{} improved the tour from {} m to {} m",
                local_search.name(),
                constructed_cost,
                solution.cost
            );
            solution.algorithm = format!("{}+{}", construction.name(), local_search.name());
        }

        solution.computation_time = started.elapsed().as_secs_f64();
        info!(
            "Solved {} locations with {}: {} m in {:.3}s",
            n, solution.algorithm, solution.cost, solution.computation_time
        );
        Ok(solution)
    }

    fn construction_heuristic(&self) -> Box<dyn ConstructionHeuristic> {
        match self.config.first_solution_strategy {
            FirstSolutionStrategy::PathCheapestArc => Box::new(PathCheapestArc::new()),
            FirstSolutionStrategy::NearestNeighbor => Box::new(NearestNeighborHeuristic::new()),
            FirstSolutionStrategy::CheapestInsertion => Box::new(GreedyInsertionHeuristic::new()),
            FirstSolutionStrategy::FarthestInsertion => Box::new(GreedyInsertionHeuristic::farthest()),
            FirstSolutionStrategy::MultiStart => Box::new(MultiStartConstruction::with_all_heuristics()),
        }
    }

    fn local_search(&self) -> Option<Box<dyn LocalSearch>> {
        let seed = self.config.seed;
        match self.config.local_search {
            LocalSearchStrategy::None => None,
            LocalSearchStrategy::TwoOpt => Some(Box::new(TwoOptSearch::new())),
            LocalSearchStrategy::OrOpt => Some(Box::new(OrOptSearch::new())),
            LocalSearchStrategy::Vnd => Some(Box::new(VND::with_standard_operators())),
            LocalSearchStrategy::SimulatedAnnealing => Some(Box::new(SimulatedAnnealing::new().with_seed(seed))),
            LocalSearchStrategy::IteratedLocalSearch => {
                Some(Box::new(IteratedLocalSearch::new().with_seed(seed)))
            }
        }
    }
}

/// Solve with the default configuration and return the route, closing
/// repeat of the origin included.
pub fn solve_tsp(matrix: &DistanceMatrix) -> Result<Vec<usize>> {
    Ok(RouteSolver::new(SolverConfig::default()).solve(matrix)?.route())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;

    fn random_matrix(n: usize, seed: u64, symmetric: bool) -> DistanceMatrix {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut rows = vec![vec![0u64; n]; n];
        for i in 0..n {
            for j in 0..n {
                if i == j || (symmetric && j < i) {
                    continue;
                }
                rows[i][j] = rng.gen_range(50..2000);
                if symmetric {
                    rows[j][i] = rows[i][j];
                }
            }
        }
        DistanceMatrix::from_rows(rows).unwrap()
    }

    fn brute_force(matrix: &DistanceMatrix, close_loop: bool) -> u64 {
        let instance = TourInstance::from_matrix(matrix.clone(), 0, close_loop).unwrap();
        let mut rest: Vec<usize> = (1..matrix.dimension()).collect();
        let mut best = u64::MAX;
        heap_permutations(&mut rest, matrix.dimension() - 1, &mut |perm| {
            let tour: Vec<usize> = std::iter::once(0).chain(perm.iter().cloned()).collect();
            best = best.min(instance.tour_cost(&tour));
        });
        best
    }

    fn heap_permutations<F: FnMut(&[usize])>(items: &mut Vec<usize>, k: usize, visit: &mut F) {
        if k <= 1 {
            visit(items);
            return;
        }
        for i in 0..k - 1 {
            heap_permutations(items, k - 1, visit);
            if k % 2 == 0 {
                items.swap(i, k - 1);
            } else {
                items.swap(0, k - 1);
            }
        }
        heap_permutations(items, k - 1, visit);
    }

    fn config(close_loop: bool) -> SolverConfig {
        SolverConfig {
            close_loop,
            ..SolverConfig::default()
        }
    }

    #[test]
    fn test_single_location() {
        let matrix = DistanceMatrix::constant(1, 0);

        let closed = RouteSolver::new(config(true)).solve(&matrix).unwrap();
        assert_eq!(closed.route(), vec![0, 0]);
        assert_eq!(closed.cost, 0);

        let open = RouteSolver::new(config(false)).solve(&matrix).unwrap();
        assert_eq!(open.route(), vec![0]);
        assert_eq!(open.cost, 0);
    }

    #[test]
    fn test_constant_matrix() {
        for n in 2..7u64 {
            let matrix = DistanceMatrix::constant(n as usize, 250);
            let open = RouteSolver::new(config(false)).solve(&matrix).unwrap();
            assert_eq!(open.cost, (n - 1) * 250);
            let closed = RouteSolver::new(config(true)).solve(&matrix).unwrap();
            assert_eq!(closed.cost, n * 250);
        }
    }

    #[test]
    fn test_route_shape() {
        let matrix = random_matrix(6, 3, true);
        let solution = RouteSolver::new(config(true)).solve(&matrix).unwrap();
        let route = solution.route();

        assert_eq!(route.len(), 7);
        assert_eq!(route[0], 0);
        assert_eq!(route[6], 0);
        let mut visited = route[..6].to_vec();
        visited.sort_unstable();
        assert_eq!(visited, (0..6).collect::<Vec<_>>());
    }

    #[test]
    fn test_reported_cost_matches_route() {
        for seed in 0..5 {
            for close_loop in [true, false] {
                let matrix = random_matrix(8, seed, false);
                let instance = TourInstance::from_matrix(matrix.clone(), 0, close_loop).unwrap();
                let solution = RouteSolver::new(config(close_loop)).solve(&matrix).unwrap();
                assert_eq!(solution.cost, instance.route_length(&solution.route()));
            }
        }
    }

    #[test]
    fn test_symmetric_reverse_has_same_cost() {
        let matrix = random_matrix(7, 11, true);
        let instance = TourInstance::from_matrix(matrix.clone(), 0, true).unwrap();
        let solution = RouteSolver::new(config(true)).solve(&matrix).unwrap();
        assert_eq!(instance.tour_cost(&solution.reversed_tour()), solution.cost);
    }

    #[test]
    fn test_custom_start() {
        let matrix = random_matrix(5, 2, true);
        let solver = RouteSolver::new(SolverConfig {
            start: 3,
            ..SolverConfig::default()
        });
        let route = solver.solve(&matrix).unwrap().route();
        assert_eq!(route.first(), Some(&3));
        assert_eq!(route.last(), Some(&3));
    }

    #[test]
    fn test_malformed_input() {
        let empty = DistanceMatrix::from_rows(Vec::new()).unwrap();
        assert!(matches!(
            RouteSolver::new(SolverConfig::default()).solve(&empty),
            Err(TourError::InfeasibleRoute(_))
        ));

        let bad_start = RouteSolver::new(SolverConfig {
            start: 4,
            ..SolverConfig::default()
        });
        assert!(matches!(
            bad_start.solve(&DistanceMatrix::constant(4, 1)),
            Err(TourError::InfeasibleRoute(_))
        ));

        let bad_limit = RouteSolver::new(SolverConfig {
            time_limit_secs: Some(-1.0),
            ..SolverConfig::default()
        });
        assert!(matches!(
            bad_limit.solve(&DistanceMatrix::constant(4, 1)),
            Err(TourError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let result = RouteSolver::new(SolverConfig::default()).solve_with_cancel(&random_matrix(5, 1, true), &token);
        assert!(matches!(result, Err(TourError::NoSolutionFound)));

        let zero_budget = RouteSolver::new(SolverConfig {
            time_limit_secs: Some(0.0),
            ..SolverConfig::default()
        });
        assert!(matches!(
            zero_budget.solve(&random_matrix(5, 1, true)),
            Err(TourError::NoSolutionFound)
        ));
    }

    #[test]
    fn test_seeded_search_is_reproducible() {
        let matrix = random_matrix(10, 5, false);
        for strategy in [LocalSearchStrategy::SimulatedAnnealing, LocalSearchStrategy::IteratedLocalSearch] {
            let cfg = SolverConfig {
                local_search: strategy,
                seed: 9,
                max_iterations: Some(2_000),
                ..SolverConfig::default()
            };
            let a = RouteSolver::new(cfg.clone()).solve(&matrix).unwrap();
            let b = RouteSolver::new(cfg).solve(&matrix).unwrap();
            assert_eq!(a.tour, b.tour);
        }
    }

    #[test]
    fn test_optimal_on_small_instances() {
        for n in 2..=4 {
            for seed in 0..10 {
                for close_loop in [true, false] {
                    let matrix = random_matrix(n, seed, false);
                    let solution = RouteSolver::new(config(close_loop)).solve(&matrix).unwrap();
                    assert_eq!(solution.cost, brute_force(&matrix, close_loop), "n={} seed={}", n, seed);
                }
            }
        }
    }

    #[test]
    fn test_local_search_never_worse_than_construction() {
        for strategy in [
            FirstSolutionStrategy::PathCheapestArc,
            FirstSolutionStrategy::NearestNeighbor,
            FirstSolutionStrategy::CheapestInsertion,
            FirstSolutionStrategy::FarthestInsertion,
            FirstSolutionStrategy::MultiStart,
        ] {
            let matrix = random_matrix(9, 21, true);
            let base = SolverConfig {
                first_solution_strategy: strategy,
                local_search: LocalSearchStrategy::None,
                ..SolverConfig::default()
            };
            let constructed = RouteSolver::new(base.clone()).solve(&matrix).unwrap();
            let improved = RouteSolver::new(SolverConfig {
                local_search: LocalSearchStrategy::Vnd,
                ..base
            })
            .solve(&matrix)
            .unwrap();
            assert!(improved.cost <= constructed.cost);
            assert!(improved.cost >= brute_force(&matrix, true));
        }
    }

    #[test]
    fn test_solve_tsp() {
        let matrix = DistanceMatrix::from_rows(vec![vec![0, 5, 12], vec![5, 0, 7], vec![12, 7, 0]]).unwrap();
        let route = solve_tsp(&matrix).unwrap();
        assert_eq!(route, vec![0, 1, 2, 0]);
    }

    #[test]
    fn test_config_serde_defaults() {
        let cfg: SolverConfig = serde_json::from_str(r#"{"local_search": "two_opt", "close_loop": false}"#).unwrap();
        assert_eq!(cfg.local_search, LocalSearchStrategy::TwoOpt);
        assert_eq!(cfg.first_solution_strategy, FirstSolutionStrategy::PathCheapestArc);
        assert!(!cfg.close_loop);
        assert_eq!(cfg.seed, 42);
    }
}
