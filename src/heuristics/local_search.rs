//! Local search improvement heuristics for tour problems.
//!
//! This module implements various local search algorithms:
//! - 2-opt (segment reversal)
//! - Or-opt (segment relocation)
//! - Location swap
//! - Location relocation
//! - Variable neighbourhood descent, simulated annealing and iterated local search
//!
//! The origin always stays at position 0. Every search checks its
//! [`Termination`] and keeps the best tour seen when it fires.

use crate::instance::TourInstance;
use crate::solution::{Move, Solution};
use crate::termination::Termination;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Trait for local search improvement methods
pub trait LocalSearch {
    fn improve(&self, instance: &TourInstance, solution: &mut Solution, termination: &Termination) -> bool;
    fn name(&self) -> &str;
}

/// Repeatedly applies the most improving (or first improving) move of a
/// neighbourhood until none improves.
fn descend<I, F>(
    instance: &TourInstance,
    solution: &mut Solution,
    termination: &Termination,
    first_improvement: bool,
    neighbourhood: F,
) -> bool
where
    I: Iterator<Item = Move>,
    F: Fn(usize) -> I,
{
    let n = solution.tour.len();
    let mut total_improved = false;
    let mut passes = 0;

    while !termination.is_terminated() {
        let mut best: Option<(Move, i64)> = None;

        for mv in neighbourhood(n) {
            let delta = mv.delta(solution, instance);
            if delta < 0 && best.map_or(true, |(_, d)| delta < d) {
                best = Some((mv, delta));
                if first_improvement {
                    break;
                }
            }
        }

        match best {
            Some((mv, delta)) => {
                mv.apply(solution);
                solution.cost = (solution.cost as i64 + delta) as u64;
                total_improved = true;
                passes += 1;
            }
            None => break,
        }
    }

    log::trace!("descent finished after {} improving moves", passes);
    solution.validate(instance);
    total_improved
}

fn two_opt_moves(n: usize) -> impl Iterator<Item = Move> {
    (0..n.saturating_sub(2)).flat_map(move |i| (i + 2..n).map(move |j| Move::TwoOpt(i, j)))
}

fn swap_moves(n: usize) -> impl Iterator<Item = Move> {
    (1..n).flat_map(move |i| (i + 1..n).map(move |j| Move::Swap(i, j)))
}

fn relocation_moves(n: usize) -> impl Iterator<Item = Move> {
    (1..n).flat_map(move |from| {
        (1..=n)
            .filter(move |&to| to != from && to != from + 1)
            .map(move |to| Move::Insertion(from, to))
    })
}

fn or_opt_moves(n: usize, max_segment: usize) -> impl Iterator<Item = Move> {
    (2..=max_segment).flat_map(move |len| {
        (1..n)
            .filter(move |&start| start + len <= n)
            .flat_map(move |start| {
                (1..=n)
                    .filter(move |&to| to < start || to > start + len)
                    .map(move |to| Move::OrOpt(start, len, to))
            })
    })
}

/// 2-Opt Local Search
///
/// Reverses segments of the tour to reduce total distance.
pub struct TwoOptSearch {
    /// Use first improvement instead of best improvement
    pub first_improvement: bool,
}

impl TwoOptSearch {
    pub fn new() -> Self {
        TwoOptSearch {
            first_improvement: false,
        }
    }

    pub fn first_improvement() -> Self {
        TwoOptSearch {
            first_improvement: true,
        }
    }
}

impl Default for TwoOptSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalSearch for TwoOptSearch {
    fn improve(&self, instance: &TourInstance, solution: &mut Solution, termination: &Termination) -> bool {
        if solution.tour.len() < 3 {
            return false;
        }
        descend(instance, solution, termination, self.first_improvement, two_opt_moves)
    }

    fn name(&self) -> &str {
        if self.first_improvement {
            "2-Opt-FI"
        } else {
            "2-Opt-BI"
        }
    }
}

/// Or-Opt Local Search
///
/// Relocates segments of 2 or more consecutive locations to other positions.
/// Single-location moves are covered by [`RelocationSearch`].
pub struct OrOptSearch {
    pub first_improvement: bool,
    /// Longest segment to move
    pub max_segment: usize,
}

impl OrOptSearch {
    pub fn new() -> Self {
        OrOptSearch {
            first_improvement: false,
            max_segment: 3,
        }
    }

    pub fn first_improvement() -> Self {
        OrOptSearch {
            first_improvement: true,
            max_segment: 3,
        }
    }
}

impl Default for OrOptSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalSearch for OrOptSearch {
    fn improve(&self, instance: &TourInstance, solution: &mut Solution, termination: &Termination) -> bool {
        if solution.tour.len() < 4 {
            return false;
        }
        let max_segment = self.max_segment;
        descend(instance, solution, termination, self.first_improvement, move |n| {
            or_opt_moves(n, max_segment)
        })
    }

    fn name(&self) -> &str {
        if self.first_improvement {
            "OrOpt-FI"
        } else {
            "OrOpt-BI"
        }
    }
}

/// Swap Local Search
///
/// Exchanges the positions of two locations.
pub struct SwapSearch {
    pub first_improvement: bool,
}

impl SwapSearch {
    pub fn new() -> Self {
        SwapSearch {
            first_improvement: false,
        }
    }

    pub fn first_improvement() -> Self {
        SwapSearch {
            first_improvement: true,
        }
    }
}

impl Default for SwapSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalSearch for SwapSearch {
    fn improve(&self, instance: &TourInstance, solution: &mut Solution, termination: &Termination) -> bool {
        if solution.tour.len() < 3 {
            return false;
        }
        descend(instance, solution, termination, self.first_improvement, swap_moves)
    }

    fn name(&self) -> &str {
        if self.first_improvement {
            "Swap-FI"
        } else {
            "Swap-BI"
        }
    }
}

/// Relocation Local Search
///
/// Moves a single location to another position in the tour.
pub struct RelocationSearch {
    pub first_improvement: bool,
}

impl RelocationSearch {
    pub fn new() -> Self {
        RelocationSearch {
            first_improvement: false,
        }
    }

    pub fn first_improvement() -> Self {
        RelocationSearch {
            first_improvement: true,
        }
    }
}

impl Default for RelocationSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalSearch for RelocationSearch {
    fn improve(&self, instance: &TourInstance, solution: &mut Solution, termination: &Termination) -> bool {
        if solution.tour.len() < 3 {
            return false;
        }
        descend(instance, solution, termination, self.first_improvement, relocation_moves)
    }

    fn name(&self) -> &str {
        if self.first_improvement {
            "Relocation-FI"
        } else {
            "Relocation-BI"
        }
    }
}

/// Variable Neighborhood Descent (VND)
///
/// Applies multiple local search operators in a systematic way.
pub struct VND {
    /// List of local search operators
    operators: Vec<Box<dyn LocalSearch + Send + Sync>>,
}

impl VND {
    pub fn with_standard_operators() -> Self {
        let operators: Vec<Box<dyn LocalSearch + Send + Sync>> = vec![
            Box::new(TwoOptSearch::first_improvement()),
            Box::new(SwapSearch::first_improvement()),
            Box::new(RelocationSearch::first_improvement()),
            Box::new(OrOptSearch::first_improvement()),
        ];

        VND { operators }
    }
}

impl Default for VND {
    fn default() -> Self {
        Self::with_standard_operators()
    }
}

impl LocalSearch for VND {
    fn improve(&self, instance: &TourInstance, solution: &mut Solution, termination: &Termination) -> bool {
        let mut total_improved = false;
        let mut k = 0;

        while k < self.operators.len() && !termination.is_terminated() {
            if self.operators[k].improve(instance, solution, termination) {
                total_improved = true;
                k = 0; // Restart from first operator
            } else {
                k += 1;
            }
        }

        total_improved
    }

    fn name(&self) -> &str {
        "VND"
    }
}

/// Simulated Annealing
///
/// Metaheuristic that accepts worse solutions with decreasing probability.
pub struct SimulatedAnnealing {
    /// Initial temperature (meters)
    pub initial_temp: f64,
    /// Final temperature
    pub final_temp: f64,
    /// Cooling rate
    pub cooling_rate: f64,
    /// Iterations per temperature
    pub iterations_per_temp: usize,
    /// Random seed
    pub seed: u64,
}

impl SimulatedAnnealing {
    pub fn new() -> Self {
        SimulatedAnnealing {
            initial_temp: 1000.0,
            final_temp: 0.1,
            cooling_rate: 0.995,
            iterations_per_temp: 100,
            seed: 42,
        }
    }

    pub fn with_params(initial_temp: f64, final_temp: f64, cooling_rate: f64, iterations_per_temp: usize) -> Self {
        SimulatedAnnealing {
            initial_temp,
            final_temp,
            cooling_rate,
            iterations_per_temp,
            seed: 42,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Draw a random move that keeps the origin in place
    fn generate_neighbor(&self, n: usize, rng: &mut ChaCha8Rng) -> Option<Move> {
        match rng.gen_range(0..4) {
            0 => {
                let i = rng.gen_range(0..n - 2);
                let j = rng.gen_range(i + 2..n);
                Some(Move::TwoOpt(i, j))
            }
            1 => {
                let i = rng.gen_range(1..n);
                let j = rng.gen_range(1..n);
                if i == j {
                    return None;
                }
                Some(Move::Swap(i, j))
            }
            2 => {
                let from = rng.gen_range(1..n);
                let to = rng.gen_range(1..=n);
                if to == from || to == from + 1 {
                    return None;
                }
                Some(Move::Insertion(from, to))
            }
            _ => {
                // Or-opt (segment of length 2)
                if n < 4 {
                    return None;
                }
                let start = rng.gen_range(1..n - 1);
                let to = rng.gen_range(1..=n);
                if to >= start && to <= start + 2 {
                    return None;
                }
                Some(Move::OrOpt(start, 2, to))
            }
        }
    }
}

impl Default for SimulatedAnnealing {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalSearch for SimulatedAnnealing {
    fn improve(&self, instance: &TourInstance, solution: &mut Solution, termination: &Termination) -> bool {
        let n = solution.tour.len();
        if n < 3 {
            return false;
        }
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        let initial_cost = solution.cost;
        let mut current = solution.clone();
        let mut best_tour = current.tour.clone();
        let mut best_cost = current.cost;

        let mut temp = self.initial_temp;
        let mut iterations = 0;

        'cooling: while temp > self.final_temp {
            for _ in 0..self.iterations_per_temp {
                if termination.is_terminated_at(iterations) {
                    break 'cooling;
                }
                iterations += 1;

                let mv = match self.generate_neighbor(n, &mut rng) {
                    Some(mv) => mv,
                    None => continue,
                };
                let delta = mv.delta(&current, instance);

                // Accept if better or with probability
                let accept = if delta < 0 {
                    true
                } else {
                    let prob = (-(delta as f64) / temp).exp();
                    rng.gen::<f64>() < prob
                };

                if accept {
                    mv.apply(&mut current);
                    current.cost = (current.cost as i64 + delta) as u64;

                    if current.cost < best_cost {
                        best_tour = current.tour.clone();
                        best_cost = current.cost;
                    }
                }
            }

            temp *= self.cooling_rate;
        }

        log::debug!("SA: {} iterations, {} m -> {} m", iterations, initial_cost, best_cost);

        solution.tour = best_tour;
        solution.iterations = Some(iterations);
        solution.validate(instance);

        solution.cost < initial_cost
    }

    fn name(&self) -> &str {
        "SimulatedAnnealing"
    }
}

/// Iterated Local Search
///
/// Applies local search, then perturbation, then local search again.
pub struct IteratedLocalSearch {
    /// Number of perturbation moves
    pub perturbation_strength: usize,
    /// Maximum iterations
    pub max_iterations: usize,
    /// Maximum iterations without improvement
    pub max_no_improve: usize,
    /// Random seed
    pub seed: u64,
}

impl IteratedLocalSearch {
    pub fn new() -> Self {
        IteratedLocalSearch {
            perturbation_strength: 3,
            max_iterations: 100,
            max_no_improve: 20,
            seed: 42,
        }
    }

    pub fn with_params(perturbation_strength: usize, max_iterations: usize, max_no_improve: usize) -> Self {
        IteratedLocalSearch {
            perturbation_strength,
            max_iterations,
            max_no_improve,
            seed: 42,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Perturb the tour with random 2-opt and swap moves behind the origin
    fn perturb(&self, tour: &mut [usize], rng: &mut ChaCha8Rng) {
        let n = tour.len();

        for _ in 0..self.perturbation_strength {
            if rng.gen_bool(0.5) {
                let i = rng.gen_range(0..n - 2);
                let j = rng.gen_range(i + 2..n);
                tour[i + 1..=j].reverse();
            } else {
                let i = rng.gen_range(1..n);
                let j = rng.gen_range(1..n);
                tour.swap(i, j);
            }
        }
    }
}

impl Default for IteratedLocalSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalSearch for IteratedLocalSearch {
    fn improve(&self, instance: &TourInstance, solution: &mut Solution, termination: &Termination) -> bool {
        let n = solution.tour.len();
        if n < 3 {
            return false;
        }
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let vnd = VND::with_standard_operators();
        let initial_cost = solution.cost;

        // Apply initial local search
        vnd.improve(instance, solution, termination);

        let mut best_tour = solution.tour.clone();
        let mut best_cost = solution.cost;

        let mut current_tour = solution.tour.clone();
        let mut current_cost = solution.cost;

        let mut no_improve = 0;
        let mut iteration = 0;

        while iteration < self.max_iterations
            && no_improve < self.max_no_improve
            && !termination.is_terminated_at(iteration)
        {
            let mut perturbed = current_tour.clone();
            self.perturb(&mut perturbed, &mut rng);

            let mut perturbed_solution = Solution::from_tour(instance, perturbed, "ILS-temp");
            vnd.improve(instance, &mut perturbed_solution, termination);

            // Acceptance criterion (accept if better than current)
            if perturbed_solution.cost < current_cost {
                current_tour = perturbed_solution.tour;
                current_cost = perturbed_solution.cost;

                if current_cost < best_cost {
                    best_tour = current_tour.clone();
                    best_cost = current_cost;
                    no_improve = 0;
                } else {
                    no_improve += 1;
                }
            } else {
                no_improve += 1;
            }

            iteration += 1;
        }

        log::debug!("ILS: {} iterations, {} m -> {} m", iteration, initial_cost, best_cost);

        solution.tour = best_tour;
        solution.iterations = Some(iteration);
        solution.validate(instance);

        solution.cost < initial_cost
    }

    fn name(&self) -> &str {
        "ILS"
    }
}
