//! Solution representation and manipulation for tour problems.
//!
//! A solution stores the visiting order as a permutation that starts at the
//! origin. The route handed to the renderer repeats the origin at the end
//! when the instance is a closed loop.

use crate::instance::TourInstance;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Represents a solution to a tour instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    /// Visiting order, starting at the origin, without a closing repeat
    pub tour: Vec<usize>,
    /// Total distance in meters (includes the return leg for closed tours)
    pub cost: u64,
    /// Whether the tour returns to the origin
    pub closed: bool,
    /// Whether every location is visited exactly once
    pub complete: bool,
    /// Algorithm that generated this solution
    pub algorithm: String,
    /// Computation time in seconds
    pub computation_time: f64,
    /// Number of iterations (if applicable)
    pub iterations: Option<usize>,
}

impl Solution {
    /// Create a new empty solution
    pub fn new() -> Self {
        Solution {
            tour: Vec::new(),
            cost: u64::MAX,
            closed: true,
            complete: false,
            algorithm: String::new(),
            computation_time: 0.0,
            iterations: None,
        }
    }

    /// Create a solution from a tour
    pub fn from_tour(instance: &TourInstance, tour: Vec<usize>, algorithm: &str) -> Self {
        let mut solution = Solution {
            tour,
            cost: 0,
            closed: instance.close_loop,
            complete: false,
            algorithm: algorithm.to_string(),
            computation_time: 0.0,
            iterations: None,
        };
        solution.validate(instance);
        solution
    }

    /// Recompute cost and completeness
    pub fn validate(&mut self, instance: &TourInstance) {
        self.cost = instance.tour_cost(&self.tour);
        self.closed = instance.close_loop;
        self.complete = self.is_complete(instance);
    }

    /// Check if all locations are visited exactly once, starting at the origin
    pub fn is_complete(&self, instance: &TourInstance) -> bool {
        if self.tour.len() != instance.dimension() || self.tour.first() != Some(&instance.start) {
            return false;
        }

        let unique: HashSet<usize> = self.tour.iter().cloned().collect();
        unique.len() == instance.dimension() && unique.iter().all(|&i| i < instance.dimension())
    }

    /// The route as consumed by the renderer: the tour, followed by the
    /// origin again when the tour is closed.
    pub fn route(&self) -> Vec<usize> {
        let mut route = self.tour.clone();
        if self.closed {
            if let Some(&first) = self.tour.first() {
                route.push(first);
            }
        }
        route
    }

    /// The same tour driven in the opposite direction, origin kept first.
    pub fn reversed_tour(&self) -> Vec<usize> {
        match self.tour.split_first() {
            Some((&first, rest)) if self.closed => {
                std::iter::once(first).chain(rest.iter().rev().cloned()).collect()
            }
            _ => self.tour.iter().rev().cloned().collect(),
        }
    }

    /// Location visited after position `pos`: the origin again after the
    /// last stop of a closed tour, nothing after the last stop of an open one.
    fn successor(&self, instance: &TourInstance, pos: usize) -> Option<usize> {
        if pos + 1 < self.tour.len() {
            Some(self.tour[pos + 1])
        } else if instance.close_loop {
            self.tour.first().copied()
        } else {
            None
        }
    }

    /// Calculate the delta cost of swapping two positions after the origin
    pub fn swap_delta(&self, instance: &TourInstance, i: usize, j: usize) -> i64 {
        if i == j {
            return 0;
        }
        let (i, j) = (i.min(j), i.max(j));
        let a = self.tour[i];
        let b = self.tour[j];
        let before_a = self.tour[i - 1];
        let after_b = self.successor(instance, j);

        if j == i + 1 {
            let old = arc(instance, before_a, Some(a)) + arc(instance, a, Some(b)) + arc(instance, b, after_b);
            let new = arc(instance, before_a, Some(b)) + arc(instance, b, Some(a)) + arc(instance, a, after_b);
            return new - old;
        }

        let after_a = self.tour[i + 1];
        let before_b = self.tour[j - 1];
        let old = arc(instance, before_a, Some(a))
            + arc(instance, a, Some(after_a))
            + arc(instance, before_b, Some(b))
            + arc(instance, b, after_b);
        let new = arc(instance, before_a, Some(b))
            + arc(instance, b, Some(after_a))
            + arc(instance, before_b, Some(a))
            + arc(instance, a, after_b);
        new - old
    }

    /// Calculate the delta cost of a 2-opt move
    pub fn two_opt_delta(&self, instance: &TourInstance, i: usize, j: usize) -> i64 {
        let n = self.tour.len();
        if i >= j || j >= n {
            return 0;
        }

        let a = self.tour[i];
        let b = self.tour[i + 1];
        let c = self.tour[j];
        let d = self.successor(instance, j);

        let mut delta = arc(instance, a, Some(c)) + arc(instance, b, d) - arc(instance, a, Some(b)) - arc(instance, c, d);

        // The reversed segment is walked backwards
        if !instance.is_symmetric() {
            delta += self.tour[i + 1..=j]
                .windows(2)
                .map(|w| arc(instance, w[1], Some(w[0])) - arc(instance, w[0], Some(w[1])))
                .sum::<i64>();
        }
        delta
    }

    /// Apply a 2-opt move (reverse segment between i+1 and j)
    pub fn apply_two_opt(&mut self, i: usize, j: usize) {
        self.tour[i + 1..=j].reverse();
    }

    /// Apply a swap move
    pub fn apply_swap(&mut self, i: usize, j: usize) {
        self.tour.swap(i, j);
    }

    /// Apply an insertion move (remove location at from_pos and insert at to_pos)
    pub fn apply_insertion(&mut self, from_pos: usize, to_pos: usize) {
        relocate(&mut self.tour, from_pos, 1, to_pos);
    }

    /// Calculate insertion delta (remove from from_pos, insert at to_pos)
    pub fn insertion_delta(&self, instance: &TourInstance, from_pos: usize, to_pos: usize) -> i64 {
        self.or_opt_delta(instance, from_pos, 1, to_pos)
    }

    /// Calculate the delta of moving `len` locations starting at `start`
    /// before position `to`. Both positions lie after the origin.
    pub fn or_opt_delta(&self, instance: &TourInstance, start: usize, len: usize, to: usize) -> i64 {
        if len == 0 || (to >= start && to <= start + len) {
            return 0;
        }

        let first = self.tour[start];
        let last = self.tour[start + len - 1];
        let before = self.tour[start - 1];
        let after = self.successor(instance, start + len - 1);

        // Arc the segment is inserted into
        let into_from = self.tour[to - 1];
        let into_to = if to < self.tour.len() {
            Some(self.tour[to])
        } else {
            self.successor(instance, to - 1)
        };

        let removed = arc(instance, before, Some(first)) + arc(instance, last, after) + arc(instance, into_from, into_to);
        let added = arc(instance, before, after) + arc(instance, into_from, Some(first)) + arc(instance, last, into_to);
        added - removed
    }

    pub fn apply_or_opt(&mut self, start: usize, len: usize, to: usize) {
        relocate(&mut self.tour, start, len, to);
    }
}

/// Distance of the arc `from -> to`, zero when there is no next location.
fn arc(instance: &TourInstance, from: usize, to: Option<usize>) -> i64 {
    to.map_or(0, |to| instance.distance(from, to) as i64)
}

/// Moves `tour[start..start + len]` so that it sits before what was `tour[to]`.
pub(crate) fn relocate(tour: &mut Vec<usize>, start: usize, len: usize, to: usize) {
    let segment: Vec<usize> = tour.drain(start..start + len).collect();
    let insert_pos = if to > start { to - len } else { to };
    for (i, node) in segment.into_iter().enumerate() {
        tour.insert(insert_pos + i, node);
    }
}

impl Default for Solution {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Solution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Solution ({})", self.algorithm)?;
        writeln!(f, "  Distance: {} m", self.cost)?;
        writeln!(f, "  Complete: {}", self.complete)?;
        writeln!(f, "  Time: {:.4}s", self.computation_time)?;
        if let Some(iter) = self.iterations {
            writeln!(f, "  Iterations: {}", iter)?;
        }
        writeln!(f, "  Route: {:?}", self.route())
    }
}

/// Represents a move in local search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Move {
    Swap(usize, usize),
    TwoOpt(usize, usize),
    Insertion(usize, usize),
    OrOpt(usize, usize, usize), // segment start, length, insertion position
}

impl Move {
    pub fn delta(&self, solution: &Solution, instance: &TourInstance) -> i64 {
        match *self {
            Move::Swap(i, j) => solution.swap_delta(instance, i, j),
            Move::TwoOpt(i, j) => solution.two_opt_delta(instance, i, j),
            Move::Insertion(from, to) => solution.insertion_delta(instance, from, to),
            Move::OrOpt(start, len, to) => solution.or_opt_delta(instance, start, len, to),
        }
    }

    pub fn apply(&self, solution: &mut Solution) {
        match *self {
            Move::Swap(i, j) => solution.apply_swap(i, j),
            Move::TwoOpt(i, j) => solution.apply_two_opt(i, j),
            Move::Insertion(from, to) => solution.apply_insertion(from, to),
            Move::OrOpt(start, len, to) => solution.apply_or_opt(start, len, to),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::DistanceMatrix;

    fn line_instance(close_loop: bool) -> TourInstance {
        // Four stops on a line, 10 m apart
        let rows = (0..4u64)
            .map(|i| (0..4u64).map(|j| 10 * i.abs_diff(j)).collect())
            .collect();
        TourInstance::from_matrix(DistanceMatrix::from_rows(rows).unwrap(), 0, close_loop).unwrap()
    }

    #[test]
    fn test_solution_creation() {
        let sol = Solution::new();
        assert!(sol.tour.is_empty());
        assert!(!sol.complete);
        assert_eq!(sol.cost, u64::MAX);
    }

    #[test]
    fn test_route_closing_convention() {
        let closed = Solution::from_tour(&line_instance(true), vec![0, 1, 2, 3], "test");
        assert_eq!(closed.route(), vec![0, 1, 2, 3, 0]);
        assert_eq!(closed.cost, 60);
        assert!(closed.complete);

        let open = Solution::from_tour(&line_instance(false), vec![0, 1, 2, 3], "test");
        assert_eq!(open.route(), vec![0, 1, 2, 3]);
        assert_eq!(open.cost, 30);
    }

    #[test]
    fn test_incomplete_tour() {
        let instance = line_instance(true);
        assert!(!Solution::from_tour(&instance, vec![0, 1, 2], "test").complete);
        assert!(!Solution::from_tour(&instance, vec![1, 0, 2, 3], "test").complete);
        assert!(!Solution::from_tour(&instance, vec![0, 1, 1, 3], "test").complete);
    }

    #[test]
    fn test_reversed_tour_keeps_origin_first() {
        let closed = Solution::from_tour(&line_instance(true), vec![0, 2, 1, 3], "test");
        assert_eq!(closed.reversed_tour(), vec![0, 3, 1, 2]);
    }

    #[test]
    fn test_move_deltas_match_applied_cost() {
        let instance = line_instance(false);
        let base = Solution::from_tour(&instance, vec![0, 2, 1, 3], "test");

        for mv in [Move::Swap(1, 2), Move::TwoOpt(0, 2), Move::Insertion(1, 3), Move::OrOpt(2, 2, 1)] {
            let mut moved = base.clone();
            let delta = mv.delta(&moved, &instance);
            mv.apply(&mut moved);
            let new_cost = instance.tour_cost(&moved.tour) as i64;
            assert_eq!(new_cost - base.cost as i64, delta, "{:?}", mv);
        }
    }

    #[test]
    fn test_arc_deltas_on_one_way_distances() {
        // Asymmetric distances, as produced by one-way streets
        let rows = (0..6u64)
            .map(|i| (0..6u64).map(|j| if i == j { 0 } else { (i * 7 + j * 13) % 23 + 1 }).collect())
            .collect();
        let matrix = DistanceMatrix::from_rows(rows).unwrap();

        for close_loop in [true, false] {
            let instance = TourInstance::from_matrix(matrix.clone(), 0, close_loop).unwrap();
            assert!(!instance.is_symmetric());
            let base = Solution::from_tour(&instance, vec![0, 3, 1, 5, 2, 4], "test");
            let n = base.tour.len();

            let mut moves = Vec::new();
            for i in 0..n {
                for j in i + 1..n {
                    moves.push(Move::TwoOpt(i, j));
                    if i > 0 {
                        moves.push(Move::Swap(i, j));
                    }
                }
            }
            for start in 1..n {
                for len in 1..=3 {
                    if start + len > n {
                        continue;
                    }
                    for to in (1..=n).filter(|&to| to < start || to > start + len) {
                        moves.push(Move::OrOpt(start, len, to));
                    }
                }
            }

            for mv in moves {
                let mut moved = base.clone();
                let delta = mv.delta(&moved, &instance);
                mv.apply(&mut moved);
                assert_eq!(moved.tour[0], 0, "{:?}", mv);
                let new_cost = instance.tour_cost(&moved.tour) as i64;
                assert_eq!(new_cost - base.cost as i64, delta, "{:?} close_loop={}", mv, close_loop);
            }
        }
    }

    #[test]
    fn test_relocate_segment() {
        let mut tour = vec![0, 1, 2, 3, 4, 5];
        relocate(&mut tour, 1, 2, 5);
        assert_eq!(tour, vec![0, 3, 4, 1, 2, 5]);

        let mut tour = vec![0, 1, 2, 3, 4, 5];
        relocate(&mut tour, 3, 2, 1);
        assert_eq!(tour, vec![0, 3, 4, 1, 2, 5]);
    }
}
